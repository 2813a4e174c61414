//! Store and allocator tuning knobs.
//!
//! # Responsibility
//! - Hold the timing budgets shared by connection bootstrap and allocation.
//! - Deserialize from a host-provided config document.
//!
//! # Invariants
//! - Missing fields fall back to documented defaults.
//! - The coordination budget is the only internal cancellation source.

use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_LOCK_BUDGET_MS: u64 = 100;
const DEFAULT_LOCK_POLL_INTERVAL_MS: u64 = 5;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Timing configuration for one store handle and its allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Maximum wait for a family's cooperative lock before falling back.
    pub lock_budget_ms: u64,
    /// Sleep between lock attempts while the budget lasts.
    pub lock_poll_interval_ms: u64,
    /// SQLite busy handler timeout for ordinary statements.
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_budget_ms: DEFAULT_LOCK_BUDGET_MS,
            lock_poll_interval_ms: DEFAULT_LOCK_POLL_INTERVAL_MS,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl StoreConfig {
    pub fn lock_budget(&self) -> Duration {
        Duration::from_millis(self.lock_budget_ms)
    }

    /// Poll interval, never zero so waiting threads yield.
    pub fn lock_poll_interval(&self) -> Duration {
        Duration::from_millis(self.lock_poll_interval_ms.max(1))
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}
