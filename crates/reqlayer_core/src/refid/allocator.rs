//! Reference-id allocator entry point.
//!
//! # Responsibility
//! - Resolve the family, pick the atomic or coordinated path, and format.
//! - Convert coordination and counter failures into fallback ids.
//!
//! # Invariants
//! - Each successful call issues a new id; there is no retry loop.
//! - `UnknownFamily` is never converted into a fallback id.
//! - Path per call: resolve, then exactly one of atomic, coordinated or
//!   fallback, then emit.

use crate::config::StoreConfig;
use crate::model::family::{Family, FamilyTag};
use crate::model::reference_id::ReferenceId;
use crate::refid::coordinator::{CoordinationError, Coordinator};
use crate::refid::counter::{
    CountStore, CounterError, CounterResult, CounterStore, SequenceStore,
};
use crate::refid::dialect::{probe_dialect, Dialect};
use crate::refid::fallback::fallback_reference_id;
use crate::refid::registry::FamilyRegistry;
use crate::refid::{AllocError, AllocResult};
use log::{debug, error, info, warn};
use rusqlite::{Connection, Transaction};
use std::time::Instant;

/// Why an allocation fell back to a random tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    UnknownDialect,
    CounterUnavailable,
    CoordinationTimeout,
    CoordinationUnavailable,
}

impl FallbackReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnknownDialect => "unknown_dialect",
            Self::CounterUnavailable => "counter_unavailable",
            Self::CoordinationTimeout => "coordination_timeout",
            Self::CoordinationUnavailable => "coordination_unavailable",
        }
    }
}

/// Path one allocation took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocPath {
    /// Counter store advanced without coordination.
    Atomic,
    /// Counter store advanced under the family's cooperative lock.
    Coordinated,
    /// No counter value was obtained.
    Fallback(FallbackReason),
}

impl AllocPath {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Atomic => "atomic",
            Self::Coordinated => "coordinated",
            Self::Fallback(_) => "fallback",
        }
    }
}

/// Result of one traced allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub reference_id: String,
    pub family: FamilyTag,
    pub path: AllocPath,
}

/// Process-wide reference-id allocator.
///
/// Shareable across threads; every call runs on the caller's transaction.
pub struct Allocator {
    registry: &'static FamilyRegistry,
    store: Option<Box<dyn CounterStore>>,
    coordinator: Coordinator,
}

impl Allocator {
    /// Probes `conn` and selects the matching counter store.
    ///
    /// `Dialect::Unknown` yields an allocator that always falls back.
    pub fn from_probe(conn: &Connection, config: &StoreConfig) -> CounterResult<Self> {
        let dialect = probe_dialect(conn).map_err(CounterError::Probe)?;
        let store: Option<Box<dyn CounterStore>> = match dialect {
            Dialect::Sequences => Some(Box::new(SequenceStore::new())),
            Dialect::RowCount => Some(Box::new(CountStore::try_new(conn)?)),
            Dialect::Unknown => None,
        };

        info!(
            "event=ref_alloc_init module=refid status=ok dialect={} store={} lock_budget_ms={}",
            dialect.as_str(),
            store.as_ref().map_or("none", |store| store.kind()),
            config.lock_budget_ms
        );

        Ok(Self {
            registry: FamilyRegistry::global(),
            store,
            coordinator: Coordinator::new(config),
        })
    }

    /// Uses an explicit counter store instead of probing.
    pub fn with_store(store: impl CounterStore + 'static, config: &StoreConfig) -> Self {
        Self {
            registry: FamilyRegistry::global(),
            store: Some(Box::new(store)),
            coordinator: Coordinator::new(config),
        }
    }

    /// Label of the active counter store, `none` when always falling back.
    pub fn store_kind(&self) -> &'static str {
        self.store.as_ref().map_or("none", |store| store.kind())
    }

    /// Allocates a new reference id for the family registered as `prefix`.
    ///
    /// # Errors
    /// - `UnknownFamily` when `prefix` is not registered; nothing is emitted.
    /// - `InternalFormat` when the counter returned a non-positive value.
    pub fn allocate(&self, prefix: &str, tx: &Transaction<'_>) -> AllocResult<String> {
        self.allocate_traced(prefix, tx)
            .map(|allocation| allocation.reference_id)
    }

    /// Collaborator-facing form of `allocate` keyed by family tag.
    pub fn generate(&self, tx: &Transaction<'_>, family: FamilyTag) -> AllocResult<String> {
        let family = self.registry.family(family)?;
        self.allocate_family(family, tx)
            .map(|allocation| allocation.reference_id)
    }

    /// Like `allocate`, also reporting which path produced the id.
    pub fn allocate_traced(&self, prefix: &str, tx: &Transaction<'_>) -> AllocResult<Allocation> {
        let family = match self.registry.resolve(prefix) {
            Ok(family) => family,
            Err(err) => {
                error!(
                    "event=ref_alloc module=refid status=error error_code=unknown_family prefix_len={}",
                    prefix.len()
                );
                return Err(err);
            }
        };
        self.allocate_family(family, tx)
    }

    fn allocate_family(&self, family: &Family, tx: &Transaction<'_>) -> AllocResult<Allocation> {
        let started_at = Instant::now();

        let outcome = match self.store.as_deref() {
            None => Err(FallbackReason::UnknownDialect),
            Some(store) if store.is_atomic() => store
                .advance(family, tx)
                .map(|number| (number, AllocPath::Atomic))
                .map_err(|err| counter_fallback(family, &err)),
            Some(store) => {
                match self
                    .coordinator
                    .with_lock(tx, family.coord_key, || store.advance(family, tx))
                {
                    Ok(Ok(number)) => Ok((number, AllocPath::Coordinated)),
                    Ok(Err(err)) => Err(counter_fallback(family, &err)),
                    Err(err) => Err(coordination_fallback(family, &err)),
                }
            }
        };

        let (reference_id, path) = match outcome {
            Ok((number, path)) => (format_sequential(family, number)?, path),
            Err(reason) => (
                fallback_reference_id(family),
                AllocPath::Fallback(reason),
            ),
        };

        match path {
            AllocPath::Fallback(reason) => warn!(
                "event=ref_alloc module=refid status=fallback family={} path=fallback reason={} duration_us={}",
                family.prefix,
                reason.as_str(),
                started_at.elapsed().as_micros()
            ),
            _ => debug!(
                "event=ref_alloc module=refid status=ok family={} path={} duration_us={}",
                family.prefix,
                path.as_str(),
                started_at.elapsed().as_micros()
            ),
        }

        Ok(Allocation {
            reference_id,
            family: family.tag,
            path,
        })
    }
}

/// Renders `number` as the family's sequential id.
fn format_sequential(family: &Family, number: i64) -> AllocResult<String> {
    let number = u64::try_from(number)
        .ok()
        .filter(|number| *number >= 1)
        .ok_or_else(|| {
            error!(
                "event=ref_alloc module=refid status=error family={} error_code=internal_format value={}",
                family.prefix, number
            );
            AllocError::InternalFormat(format!(
                "counter `{}` returned non-positive value {number}",
                family.counter_name
            ))
        })?;
    Ok(ReferenceId::sequential(family.tag, number).to_string())
}

fn counter_fallback(family: &Family, err: &CounterError) -> FallbackReason {
    warn!(
        "event=ref_counter module=refid status=error family={} error_code=counter_unavailable error={}",
        family.prefix, err
    );
    FallbackReason::CounterUnavailable
}

fn coordination_fallback(family: &Family, err: &CoordinationError) -> FallbackReason {
    warn!(
        "event=coord_lock module=refid status=error family={} error={}",
        family.prefix, err
    );
    match err {
        CoordinationError::Timeout { .. } => FallbackReason::CoordinationTimeout,
        CoordinationError::Unavailable { .. } => FallbackReason::CoordinationUnavailable,
    }
}
