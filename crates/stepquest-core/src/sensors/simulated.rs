//! History-backed pedometer used by tests and the CLI simulation.
//!
//! Every simulated step is recorded with the clock's current time so that
//! since-midnight queries answer from the same data the live subscriptions
//! saw. Steps recorded with [`SimulatedPedometer::walk_unobserved`] reach the
//! history but no subscription, which is how a platform behaves while the app
//! is suspended.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Local};

use super::{Pedometer, PermissionStatus, Subscription};
use crate::clock::Clock;
use crate::error::SensorError;

struct Watcher {
    sink: Sender<u64>,
    counted: u64,
    active: Arc<AtomicBool>,
}

#[derive(Default)]
struct SimState {
    history: Vec<(DateTime<Local>, u64)>,
    watchers: Vec<Watcher>,
    fail_queries: bool,
    queries: usize,
}

pub struct SimulatedPedometer {
    clock: Arc<dyn Clock>,
    available: bool,
    permission: PermissionStatus,
    state: Mutex<SimState>,
}

struct SimSubscription {
    active: Arc<AtomicBool>,
}

impl Subscription for SimSubscription {
    fn remove(&mut self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

impl SimulatedPedometer {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            available: true,
            permission: PermissionStatus::Granted,
            state: Mutex::new(SimState::default()),
        }
    }

    /// A device without step-counting hardware.
    pub fn unavailable(clock: Arc<dyn Clock>) -> Self {
        Self {
            available: false,
            ..Self::new(clock)
        }
    }

    /// A device where the user declined motion permission.
    pub fn denied(clock: Arc<dyn Clock>) -> Self {
        Self {
            permission: PermissionStatus::Denied,
            ..Self::new(clock)
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record steps at an explicit time without notifying subscribers.
    pub fn record_at(&self, at: DateTime<Local>, steps: u64) {
        self.state().history.push((at, steps));
    }

    /// Take steps now, notifying every live subscription.
    pub fn walk(&self, steps: u64) {
        let now = self.clock.now();
        let mut state = self.state();
        state.history.push((now, steps));
        state.watchers.retain_mut(|w| {
            if !w.active.load(Ordering::SeqCst) {
                return false;
            }
            w.counted += steps;
            w.sink.send(w.counted).is_ok()
        });
    }

    /// Take steps now while no subscription is delivering.
    pub fn walk_unobserved(&self, steps: u64) {
        let now = self.clock.now();
        self.state().history.push((now, steps));
    }

    pub fn set_fail_queries(&self, fail: bool) {
        self.state().fail_queries = fail;
    }

    /// Number of subscriptions that are still delivering.
    pub fn active_watchers(&self) -> usize {
        self.state()
            .watchers
            .iter()
            .filter(|w| w.active.load(Ordering::SeqCst))
            .count()
    }

    /// Number of historical queries answered so far.
    pub fn query_count(&self) -> usize {
        self.state().queries
    }
}

impl Pedometer for SimulatedPedometer {
    fn is_available(&self) -> bool {
        self.available
    }

    fn request_permission(&self) -> PermissionStatus {
        self.permission
    }

    fn query_step_count(
        &self,
        start: DateTime<Local>,
        end: DateTime<Local>,
    ) -> Result<u64, SensorError> {
        let mut state = self.state();
        if state.fail_queries {
            return Err(SensorError::QueryFailed("simulated query failure".into()));
        }
        state.queries += 1;
        Ok(state
            .history
            .iter()
            .filter(|(at, _)| *at >= start && *at <= end)
            .map(|(_, steps)| steps)
            .sum())
    }

    fn watch_step_count(&self, sink: Sender<u64>) -> Result<Box<dyn Subscription>, SensorError> {
        if !self.available {
            return Err(SensorError::Unavailable);
        }
        let active = Arc::new(AtomicBool::new(true));
        self.state().watchers.push(Watcher {
            sink,
            counted: 0,
            active: Arc::clone(&active),
        });
        Ok(Box::new(SimSubscription { active }))
    }
}
