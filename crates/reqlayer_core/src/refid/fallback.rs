//! Non-sequential fallback identifiers.

use crate::model::family::Family;
use crate::model::reference_id::ReferenceId;
use uuid::Uuid;

/// Emits `{prefix}-{8 lowercase hex}` from the low 32 bits of a fresh
/// random 128-bit value. Consults no shared state.
pub fn fallback_reference_id(family: &Family) -> String {
    let low_bits = (Uuid::new_v4().as_u128() & 0xFFFF_FFFF) as u32;
    ReferenceId::fallback(family.tag, low_bits).to_string()
}
