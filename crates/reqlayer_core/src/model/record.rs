//! Reference-tagged record model.
//!
//! # Responsibility
//! - Carry the minimal shape shared by every family's entity rows.
//! - Expose the reference-id slot to the creation hook.
//!
//! # Invariants
//! - `uuid` is the opaque primary key and never changes.
//! - `reference_id` is written once and never reassigned after persistence.

use crate::model::family::FamilyTag;
use crate::refid::HasReferenceId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque primary key of one record.
pub type RecordId = Uuid;

/// One epic, story, requirement, criterion, steering document or prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceRecord {
    pub uuid: RecordId,
    pub family: FamilyTag,
    /// `None` until the creation hook assigns one, unless supplied by import.
    pub reference_id: Option<String>,
    pub title: String,
    /// Epoch milliseconds; `None` for drafts not yet persisted.
    pub created_at: Option<i64>,
}

impl ReferenceRecord {
    /// Creates a draft whose reference id is assigned on insert.
    pub fn new(family: FamilyTag, title: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            family,
            reference_id: None,
            title: title.into(),
            created_at: None,
        }
    }

    /// Creates a draft carrying a caller-supplied reference id.
    ///
    /// Used by import paths; the id is stored verbatim.
    pub fn with_reference_id(
        family: FamilyTag,
        reference_id: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            reference_id: Some(reference_id.into()),
            ..Self::new(family, title)
        }
    }
}

impl HasReferenceId for ReferenceRecord {
    fn reference_id(&self) -> Option<&str> {
        self.reference_id.as_deref()
    }

    fn set_reference_id(&mut self, reference_id: String) {
        self.reference_id = Some(reference_id);
    }
}
