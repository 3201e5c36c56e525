//! Moves newly observed steps into the durable lifetime total.
//!
//! The persisted cursor counts every step already credited. Its remainder
//! modulo `day_window` is the part attributable to today, so
//!
//! ```text
//! delta = current_steps - (cursor % day_window)
//! ```
//!
//! is the uncommitted growth. A commit writes the new lifetime stats and the
//! advanced cursor in one atomic batch; the in-memory cursor only moves after
//! that write succeeded, so a failed sync recomputes the same delta next time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::StorageError;
use crate::storage::{Config, Journal};

/// Tunables of the sync loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncPolicy {
    pub min_delta: u64,
    pub eager_delta: u64,
    pub day_window: u64,
    pub step_length_m: f64,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl SyncPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_delta: config.sync.min_delta,
            eager_delta: config.sync.eager_delta,
            day_window: config.sync.day_window.max(1),
            step_length_m: config.mission.step_length_m,
        }
    }
}

/// What a single `sync` call did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Another sync was running; this trigger was dropped.
    Skipped,
    /// Below the threshold and not forced.
    Debounced { delta: u64 },
    Unchanged,
    /// The count went backwards: a new day started.
    DayBoundary { cursor: u64 },
    Committed { delta: u64, total_steps: u64 },
    /// The store rejected the write. Nothing moved.
    Failed,
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct StepSyncEngine {
    journal: Journal,
    policy: SyncPolicy,
    cursor: Mutex<u64>,
    in_flight: AtomicBool,
}

impl StepSyncEngine {
    /// Read the persisted cursor and build the engine.
    ///
    /// # Errors
    /// Returns an error when the cursor cannot be read.
    pub fn load(journal: Journal, policy: SyncPolicy) -> Result<Self, StorageError> {
        let cursor = journal.sync_cursor()?;
        debug!(cursor, "loaded sync cursor");
        Ok(Self {
            journal,
            policy,
            cursor: Mutex::new(cursor),
            in_flight: AtomicBool::new(false),
        })
    }

    fn cursor_guard(&self) -> MutexGuard<'_, u64> {
        self.cursor.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Every step ever credited, plus the day-window offsets.
    pub fn cursor(&self) -> u64 {
        *self.cursor_guard()
    }

    /// Portion of the cursor credited today.
    pub fn synced_today(&self) -> u64 {
        self.cursor() % self.policy.day_window
    }

    pub fn policy(&self) -> &SyncPolicy {
        &self.policy
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn is_syncing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Whether `current_steps` has grown enough since the last sync to
    /// trigger one right away.
    pub fn should_sync_eagerly(&self, current_steps: u64) -> bool {
        current_steps.saturating_sub(self.synced_today()) >= self.policy.eager_delta
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Credit the steps observed since the last successful sync.
    ///
    /// A call made while another is running returns
    /// [`SyncOutcome::Skipped`] without touching the store.
    pub fn sync(&self, current_steps: u64, force: bool) -> SyncOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(current_steps, "sync already in flight, skipping");
            return SyncOutcome::Skipped;
        }
        let _guard = InFlight(&self.in_flight);

        let cursor = self.cursor();
        let window = self.policy.day_window;
        let today = cursor % window;

        if current_steps < today {
            let next = (cursor / window + 1) * window + current_steps;
            return match self.journal.save_sync_cursor(next) {
                Ok(()) => {
                    *self.cursor_guard() = next;
                    info!(previous = cursor, cursor = next, "sync cursor moved to new day");
                    SyncOutcome::DayBoundary { cursor: next }
                }
                Err(e) => {
                    warn!(error = %e, "failed to persist day-boundary cursor");
                    SyncOutcome::Failed
                }
            };
        }

        let delta = current_steps - today;
        if delta == 0 {
            return SyncOutcome::Unchanged;
        }
        if delta < self.policy.min_delta && !force {
            debug!(delta, "sync debounced");
            return SyncOutcome::Debounced { delta };
        }

        let next = cursor + delta;
        match self
            .journal
            .commit_steps(delta, next, self.policy.step_length_m)
        {
            Ok(stats) => {
                *self.cursor_guard() = next;
                info!(delta, total_steps = stats.total_steps, "synced steps");
                SyncOutcome::Committed {
                    delta,
                    total_steps: stats.total_steps,
                }
            }
            Err(e) => {
                warn!(delta, error = %e, "step sync failed, will retry");
                SyncOutcome::Failed
            }
        }
    }

    /// Credit what is left of a finished day and open the next day window.
    ///
    /// `previous_steps` is the final count of the day that just ended. The
    /// remaining delta and the cursor of the new window are written in one
    /// batch; with nothing left to credit only the cursor moves.
    pub fn close_day(&self, previous_steps: u64) -> SyncOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(previous_steps, "sync already in flight, day close deferred");
            return SyncOutcome::Skipped;
        }
        let _guard = InFlight(&self.in_flight);

        let cursor = self.cursor();
        let window = self.policy.day_window;
        let next = (cursor / window + 1) * window;
        let delta = previous_steps.saturating_sub(cursor % window);

        if delta == 0 {
            return match self.journal.save_sync_cursor(next) {
                Ok(()) => {
                    *self.cursor_guard() = next;
                    info!(previous = cursor, cursor = next, "day closed");
                    SyncOutcome::DayBoundary { cursor: next }
                }
                Err(e) => {
                    warn!(error = %e, "failed to persist day-close cursor");
                    SyncOutcome::Failed
                }
            };
        }

        match self
            .journal
            .commit_steps(delta, next, self.policy.step_length_m)
        {
            Ok(stats) => {
                *self.cursor_guard() = next;
                info!(delta, cursor = next, total_steps = stats.total_steps, "day closed");
                SyncOutcome::Committed {
                    delta,
                    total_steps: stats.total_steps,
                }
            }
            Err(e) => {
                warn!(delta, error = %e, "day close failed, will retry");
                SyncOutcome::Failed
            }
        }
    }
}

impl std::fmt::Debug for StepSyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepSyncEngine")
            .field("policy", &self.policy)
            .field("cursor", &self.cursor())
            .field("in_flight", &self.is_syncing())
            .finish()
    }
}
