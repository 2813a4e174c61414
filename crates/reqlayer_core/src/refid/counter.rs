//! Per-family counter stores.
//!
//! # Responsibility
//! - Advance a family's counter under the caller's transaction.
//! - Hide the dialect-specific strategy behind `CounterStore`.
//!
//! # Invariants
//! - `advance` returns values `>= 1`.
//! - `SequenceStore` advances with one atomic statement and never re-issues
//!   a committed value.
//! - `CountStore` is only constructed for stores without sequences.

use crate::db::DbError;
use crate::model::family::Family;
use crate::refid::dialect::{probe_dialect, Dialect};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

#[cfg(any(test, feature = "test-support"))]
use crate::model::family::FamilyTag;
#[cfg(any(test, feature = "test-support"))]
use std::collections::HashMap;
#[cfg(any(test, feature = "test-support"))]
use std::sync::{Mutex, MutexGuard, PoisonError};

pub type CounterResult<T> = Result<T, CounterError>;

/// Counter store failures.
#[derive(Debug)]
pub enum CounterError {
    /// The underlying store call failed.
    Unavailable {
        counter: &'static str,
        source: rusqlite::Error,
    },
    /// The family has no counter row.
    MissingCounter(&'static str),
    /// The counter already holds the largest storable value.
    Exhausted(&'static str),
    /// Row-count numbering was requested on a store that has sequences.
    SequencesAvailable,
    /// The dialect probe itself failed.
    Probe(DbError),
}

impl Display for CounterError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable { counter, source } => {
                write!(f, "counter `{counter}` unavailable: {source}")
            }
            Self::MissingCounter(counter) => write!(f, "counter `{counter}` does not exist"),
            Self::Exhausted(counter) => write!(f, "counter `{counter}` is exhausted"),
            Self::SequencesAvailable => write!(
                f,
                "store supports sequences; row-count numbering is not allowed"
            ),
            Self::Probe(err) => write!(f, "dialect probe failed: {err}"),
        }
    }
}

impl Error for CounterError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Unavailable { source, .. } => Some(source),
            Self::MissingCounter(_) => None,
            Self::Exhausted(_) => None,
            Self::SequencesAvailable => None,
            Self::Probe(err) => Some(err),
        }
    }
}

/// Strategy for obtaining the next number of a family.
pub trait CounterStore: Send + Sync {
    /// Short label used in logs.
    fn kind(&self) -> &'static str;

    /// Whether `advance` is atomic on its own, without the coordinator.
    fn is_atomic(&self) -> bool;

    /// Returns the next unused number for `family`.
    fn advance(&self, family: &Family, tx: &Transaction<'_>) -> CounterResult<i64>;
}

impl<S: CounterStore + ?Sized> CounterStore for Arc<S> {
    fn kind(&self) -> &'static str {
        (**self).kind()
    }

    fn is_atomic(&self) -> bool {
        (**self).is_atomic()
    }

    fn advance(&self, family: &Family, tx: &Transaction<'_>) -> CounterResult<i64> {
        (**self).advance(family, tx)
    }
}

/// Counters backed by the `ref_sequences` table.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequenceStore;

impl SequenceStore {
    pub fn new() -> Self {
        Self
    }

    /// Reads the last value issued for `family` without advancing it.
    pub fn current(conn: &Connection, family: &Family) -> CounterResult<i64> {
        conn.query_row(
            "SELECT value FROM ref_sequences WHERE name = ?1;",
            [family.counter_name],
            |row| row.get::<_, i64>(0),
        )
        .optional()
        .map_err(|source| CounterError::Unavailable {
            counter: family.counter_name,
            source,
        })?
        .ok_or(CounterError::MissingCounter(family.counter_name))
    }
}

impl CounterStore for SequenceStore {
    fn kind(&self) -> &'static str {
        "sequence"
    }

    fn is_atomic(&self) -> bool {
        true
    }

    fn advance(&self, family: &Family, tx: &Transaction<'_>) -> CounterResult<i64> {
        let advanced = tx
            .query_row(
                "UPDATE ref_sequences
                 SET value = value + 1
                 WHERE name = ?1 AND value < ?2
                 RETURNING value;",
                params![family.counter_name, i64::MAX],
                |row| row.get::<_, i64>(0),
            )
            .optional()
            .map_err(|source| CounterError::Unavailable {
                counter: family.counter_name,
                source,
            })?;

        match advanced {
            Some(value) => Ok(value),
            None => {
                // Either the row is missing or it already holds i64::MAX.
                Self::current(tx, family)?;
                Err(CounterError::Exhausted(family.counter_name))
            }
        }
    }
}

/// Row-count numbering for stores without sequences.
///
/// Not atomic: concurrent writers must be serialized by the coordinator.
#[derive(Debug)]
pub struct CountStore {
    _probed: (),
}

impl CountStore {
    /// Creates a row-count store after confirming `conn` lacks sequences.
    ///
    /// # Errors
    /// - `SequencesAvailable` when the store supports `SequenceStore`.
    pub fn try_new(conn: &Connection) -> CounterResult<Self> {
        match probe_dialect(conn).map_err(CounterError::Probe)? {
            Dialect::Sequences => Err(CounterError::SequencesAvailable),
            Dialect::RowCount | Dialect::Unknown => Ok(Self { _probed: () }),
        }
    }
}

impl CounterStore for CountStore {
    fn kind(&self) -> &'static str {
        "row_count"
    }

    fn is_atomic(&self) -> bool {
        false
    }

    fn advance(&self, family: &Family, tx: &Transaction<'_>) -> CounterResult<i64> {
        // Table names come from the static family set, never from callers.
        let count: i64 = tx
            .query_row(&format!("SELECT COUNT(*) FROM {};", family.table), [], |row| {
                row.get(0)
            })
            .map_err(|source| CounterError::Unavailable {
                counter: family.counter_name,
                source,
            })?;
        Ok(count + 1)
    }
}

/// Process-local counters for unit tests.
///
/// Values are not rolled back with transactions, mirroring native sequences.
#[cfg(any(test, feature = "test-support"))]
#[derive(Debug, Default)]
pub struct InMemoryCounter {
    counters: Mutex<HashMap<FamilyTag, i64>>,
}

#[cfg(any(test, feature = "test-support"))]
impl InMemoryCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets every issued value.
    pub fn reset(&self) {
        self.lock().clear();
    }

    /// Sets the last issued value for `tag`.
    pub fn set_counter(&self, tag: FamilyTag, value: i64) {
        self.lock().insert(tag, value);
    }

    pub fn current(&self, tag: FamilyTag) -> i64 {
        self.lock().get(&tag).copied().unwrap_or(0)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<FamilyTag, i64>> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(any(test, feature = "test-support"))]
impl CounterStore for InMemoryCounter {
    fn kind(&self) -> &'static str {
        "in_memory"
    }

    fn is_atomic(&self) -> bool {
        true
    }

    fn advance(&self, family: &Family, _tx: &Transaction<'_>) -> CounterResult<i64> {
        let mut counters = self.lock();
        let value = counters.entry(family.tag).or_insert(0);
        *value += 1;
        Ok(*value)
    }
}
