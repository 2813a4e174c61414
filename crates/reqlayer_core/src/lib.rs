//! Core data layer for requirements management.
//! Owns reference-id allocation for epics, stories, requirements, acceptance
//! criteria, steering documents and prompts.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod refid;
pub mod repo;

pub use config::StoreConfig;
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::family::{Family, FamilyTag};
pub use model::record::{RecordId, ReferenceRecord};
pub use model::reference_id::{ReferenceId, ReferenceIdParseError, ReferenceTail};
pub use refid::{
    before_create, AllocError, AllocPath, AllocResult, Allocation, Allocator, CounterStore,
    FallbackReason, FamilyRegistry, HasReferenceId, HookOutcome,
};
pub use repo::record_repo::{
    RecordRepoError, RecordRepoResult, RecordRepository, SqliteRecordRepository,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
