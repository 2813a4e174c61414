//! Repository layer for reference-tagged records.
//!
//! # Responsibility
//! - Persist family records through the reference-id creation hook.
//! - Isolate SQLite query details from allocation orchestration.
//!
//! # Invariants
//! - Every insert runs the creation hook on the inserting transaction.
//! - Repository APIs return semantic errors (`DuplicateReferenceId`) in
//!   addition to DB transport errors.

pub mod record_repo;
