//! Entity creation hook.
//!
//! Runs before an entity row is inserted: a supplied reference id is kept
//! verbatim without consulting the allocator, otherwise one is allocated on
//! the in-flight transaction.

use crate::model::family::FamilyTag;
use crate::refid::{AllocResult, Allocator};
use rusqlite::Transaction;

/// Entity carrying a reference-id slot.
pub trait HasReferenceId {
    fn reference_id(&self) -> Option<&str>;
    fn set_reference_id(&mut self, reference_id: String);
}

/// What the hook did to the entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome {
    /// The caller-supplied id was kept.
    Preserved,
    /// A new id was allocated and installed.
    Allocated(String),
}

/// Ensures `entity` carries a reference id before it is persisted.
///
/// # Errors
/// - Allocator errors abort the creation; the caller rolls back.
pub fn before_create<E: HasReferenceId + ?Sized>(
    allocator: &Allocator,
    tx: &Transaction<'_>,
    family: FamilyTag,
    entity: &mut E,
) -> AllocResult<HookOutcome> {
    if entity.reference_id().is_some_and(|value| !value.is_empty()) {
        return Ok(HookOutcome::Preserved);
    }

    let reference_id = allocator.generate(tx, family)?;
    entity.set_reference_id(reference_id.clone());
    Ok(HookOutcome::Allocated(reference_id))
}
