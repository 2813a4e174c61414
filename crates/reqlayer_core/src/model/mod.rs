//! Domain model for reference-tagged entities.
//!
//! # Responsibility
//! - Define entity families and their reference-id grammar.
//! - Define the record shape persisted by every family table.
//!
//! # Invariants
//! - Every record has a stable opaque `uuid` distinct from its reference id.
//! - Reference ids are immutable once issued.

pub mod family;
pub mod record;
pub mod reference_id;
