//! Cooperative per-family allocation lock.
//!
//! # Responsibility
//! - Serialize allocations of one family when the counter store is not
//!   atomic on its own.
//! - Bound the wait by the configured budget.
//!
//! # Invariants
//! - A lock is a row in `ref_coordination_locks` written inside the caller's
//!   transaction, so it is held until release or transaction end.
//! - Reentry from the same transaction increments `depth` instead of waiting.
//! - Release runs on every exit path, including unwinding.
//! - The connection's own busy timeout is restored after every attempt.
//! - Keys never share a lock row, but writing any lock row takes SQLite's
//!   store-wide write lock, so an attempt on one key still waits out a
//!   transaction holding another key.

use crate::config::StoreConfig;
use log::{debug, warn};
use rusqlite::{params, Connection, ErrorCode, Transaction};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant};

pub type CoordinationResult<T> = Result<T, CoordinationError>;

/// Lock acquisition failures.
#[derive(Debug)]
pub enum CoordinationError {
    /// The lock stayed contended for the whole budget.
    Timeout { coord_key: i64, waited: Duration },
    /// The lock row could not be written for a non-contention reason.
    Unavailable { coord_key: i64, source: rusqlite::Error },
}

impl Display for CoordinationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout { coord_key, waited } => write!(
                f,
                "coordination lock {coord_key} not acquired within {}ms",
                waited.as_millis()
            ),
            Self::Unavailable { coord_key, source } => {
                write!(f, "coordination lock {coord_key} unavailable: {source}")
            }
        }
    }
}

impl Error for CoordinationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Timeout { .. } => None,
            Self::Unavailable { source, .. } => Some(source),
        }
    }
}

/// Cooperative lock manager keyed by family coordination keys.
#[derive(Debug, Clone, Copy)]
pub struct Coordinator {
    budget: Duration,
    poll_interval: Duration,
}

impl Coordinator {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            budget: config.lock_budget(),
            poll_interval: config.lock_poll_interval(),
        }
    }

    /// Runs `f` while holding the lock for `coord_key`.
    ///
    /// `f` is not invoked when the lock cannot be acquired.
    pub fn with_lock<T>(
        &self,
        tx: &Transaction<'_>,
        coord_key: i64,
        f: impl FnOnce() -> T,
    ) -> CoordinationResult<T> {
        let _guard = self.acquire(tx, coord_key)?;
        Ok(f())
    }

    /// Acquires the lock for `coord_key` and returns a guard releasing it.
    pub fn acquire<'tx>(
        &self,
        tx: &'tx Transaction<'_>,
        coord_key: i64,
    ) -> CoordinationResult<CoordinationGuard<'tx>> {
        let conn: &'tx Connection = tx;
        let started_at = Instant::now();

        let previous_timeout = current_busy_timeout(conn)
            .map_err(|source| CoordinationError::Unavailable { coord_key, source })?;
        // The busy handler would otherwise sleep past the budget.
        conn.busy_timeout(Duration::ZERO)
            .map_err(|source| CoordinationError::Unavailable { coord_key, source })?;
        let attempt = self.poll_lock_row(conn, coord_key, started_at);
        if let Err(err) = conn.busy_timeout(previous_timeout) {
            warn!(
                "event=coord_lock module=refid status=warn coord_key={} error_code=busy_timeout_restore_failed error={}",
                coord_key, err
            );
        }

        let depth = attempt?;
        debug!(
            "event=coord_lock module=refid status=acquired coord_key={} depth={} waited_ms={}",
            coord_key,
            depth,
            started_at.elapsed().as_millis()
        );
        Ok(CoordinationGuard { conn, coord_key })
    }

    fn poll_lock_row(
        &self,
        conn: &Connection,
        coord_key: i64,
        started_at: Instant,
    ) -> CoordinationResult<i64> {
        let holder = holder_label();
        loop {
            match insert_or_reenter(conn, coord_key, holder.as_str()) {
                Ok(depth) => return Ok(depth),
                Err(err) if is_contention(&err) => {
                    let waited = started_at.elapsed();
                    if waited >= self.budget {
                        return Err(CoordinationError::Timeout { coord_key, waited });
                    }
                    std::thread::sleep(self.poll_interval.min(self.budget - waited));
                }
                Err(source) => return Err(CoordinationError::Unavailable { coord_key, source }),
            }
        }
    }
}

/// Held cooperative lock; releases one level of depth on drop.
#[derive(Debug)]
pub struct CoordinationGuard<'tx> {
    conn: &'tx Connection,
    coord_key: i64,
}

impl CoordinationGuard<'_> {
    pub fn coord_key(&self) -> i64 {
        self.coord_key
    }

    /// Releases the lock now and reports store errors to the caller.
    pub fn release(self) -> rusqlite::Result<()> {
        let result = release_lock_row(self.conn, self.coord_key);
        std::mem::forget(self);
        result
    }
}

impl Drop for CoordinationGuard<'_> {
    fn drop(&mut self) {
        // A failed release is harmless once the transaction ends.
        if let Err(err) = release_lock_row(self.conn, self.coord_key) {
            warn!(
                "event=coord_lock module=refid status=warn coord_key={} error_code=release_failed error={}",
                self.coord_key, err
            );
        }
    }
}

fn insert_or_reenter(conn: &Connection, coord_key: i64, holder: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        "INSERT INTO ref_coordination_locks (coord_key, holder, depth, acquired_at)
         VALUES (?1, ?2, 1, strftime('%s', 'now') * 1000)
         ON CONFLICT(coord_key) DO UPDATE SET depth = depth + 1
         RETURNING depth;",
        params![coord_key, holder],
        |row| row.get(0),
    )
}

fn release_lock_row(conn: &Connection, coord_key: i64) -> rusqlite::Result<()> {
    let decremented = conn.execute(
        "UPDATE ref_coordination_locks
         SET depth = depth - 1
         WHERE coord_key = ?1 AND depth > 1;",
        [coord_key],
    )?;
    if decremented == 0 {
        conn.execute(
            "DELETE FROM ref_coordination_locks WHERE coord_key = ?1;",
            [coord_key],
        )?;
    }
    Ok(())
}

fn is_contention(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if matches!(failure.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

fn current_busy_timeout(conn: &Connection) -> rusqlite::Result<Duration> {
    let millis: i64 = conn.query_row("PRAGMA busy_timeout;", [], |row| row.get(0))?;
    Ok(Duration::from_millis(u64::try_from(millis).unwrap_or(0)))
}

fn holder_label() -> String {
    format!(
        "pid={} thread={:?}",
        std::process::id(),
        std::thread::current().id()
    )
}
