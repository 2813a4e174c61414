//! Reference-id allocation.
//!
//! # Responsibility
//! - Issue human-readable, per-family reference ids (`EP-001`, `REQ-123`).
//! - Stay unique across threads and processes sharing one store.
//! - Degrade to random fallback ids instead of failing entity creation.
//!
//! # Invariants
//! - Only `UnknownFamily` and `InternalFormat` reach callers; every other
//!   failure becomes a fallback id.
//! - The allocator holds no state across calls besides immutable config.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod allocator;
mod coordinator;
mod counter;
mod dialect;
mod fallback;
mod hook;
mod registry;

pub use allocator::{AllocPath, Allocation, Allocator, FallbackReason};
pub use coordinator::{CoordinationError, CoordinationGuard, CoordinationResult, Coordinator};
#[cfg(any(test, feature = "test-support"))]
pub use counter::InMemoryCounter;
pub use counter::{CountStore, CounterError, CounterResult, CounterStore, SequenceStore};
pub(crate) use dialect::table_exists;
pub use dialect::{probe_dialect, Dialect};
pub use fallback::fallback_reference_id;
pub use hook::{before_create, HasReferenceId, HookOutcome};
pub use registry::{FamilyRegistry, RegistryError};

pub type AllocResult<T> = Result<T, AllocError>;

/// Allocation failures visible to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocError {
    /// The requested prefix is not registered; a programming error.
    UnknownFamily(String),
    /// A counter produced a value that cannot be rendered.
    InternalFormat(String),
}

impl Display for AllocError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownFamily(prefix) => write!(f, "unknown reference family: {prefix}"),
            Self::InternalFormat(message) => {
                write!(f, "reference id formatting failed: {message}")
            }
        }
    }
}

impl Error for AllocError {}
