//! Authoritative "steps taken today" counter.
//!
//! Two sources feed the count:
//!
//! - the **since-midnight query**, which is ground truth and is consulted at
//!   start-up, on every foreground transition and at each local midnight;
//! - the **live watch**, a subscription that reports a cumulative count
//!   relative to its own start and only animates the value between
//!   reconciliation points.
//!
//! ```text
//! displayed = daily_baseline + (raw - watch_start_raw)
//! ```
//!
//! `watch_start_raw` is captured from the first callback of every
//! subscription. Reconciliation re-anchors it to the last raw value seen so
//! the live delta restarts from the freshly queried baseline.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::{local_midnight, Clock};
use crate::error::SensorError;
use crate::sensors::{Pedometer, PermissionStatus, SensorStatus, StepWatch};

/// What happened at a local-midnight boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayRollover {
    pub previous_date: NaiveDate,
    pub date: NaiveDate,
    pub previous_steps: u64,
    pub steps: u64,
}

pub struct StepCounter {
    pedometer: Arc<dyn Pedometer>,
    clock: Arc<dyn Clock>,
    status: SensorStatus,
    error: Option<SensorError>,
    displayed: u64,
    daily_baseline: u64,
    watch_start_raw: Option<u64>,
    last_raw: Option<u64>,
    last_reset_date: NaiveDate,
    watch: Option<StepWatch>,
}

impl StepCounter {
    pub fn new(pedometer: Arc<dyn Pedometer>, clock: Arc<dyn Clock>) -> Self {
        let last_reset_date = clock.today();
        Self {
            pedometer,
            clock,
            status: SensorStatus::Checking,
            error: None,
            displayed: 0,
            daily_baseline: 0,
            watch_start_raw: None,
            last_raw: None,
            last_reset_date,
            watch: None,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Steps taken today.
    pub fn steps(&self) -> u64 {
        self.displayed
    }

    pub fn status(&self) -> SensorStatus {
        self.status
    }

    pub fn is_available(&self) -> bool {
        self.status.is_available()
    }

    /// The terminal error for this session, if any.
    pub fn error(&self) -> Option<&SensorError> {
        self.error.as_ref()
    }

    pub fn last_reset_date(&self) -> NaiveDate {
        self.last_reset_date
    }

    pub fn daily_baseline(&self) -> u64 {
        self.daily_baseline
    }

    pub fn is_watching(&self) -> bool {
        self.watch.is_some()
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Check availability and permission, then load today's count.
    ///
    /// Unavailability and a denied permission are terminal: the count stays
    /// at zero and later calls return the same error without touching the
    /// sensor again.
    pub fn initialize(&mut self) -> Result<u64, SensorError> {
        if let Some(err) = self.terminal_error() {
            return Err(err);
        }
        if !self.pedometer.is_available() {
            return Err(self.fail(SensorError::Unavailable));
        }
        if self.pedometer.request_permission() != PermissionStatus::Granted {
            return Err(self.fail(SensorError::PermissionDenied));
        }

        self.status = SensorStatus::Available;
        self.last_reset_date = self.clock.today();
        match self.query_today() {
            Ok(steps) => {
                info!(steps, "loaded today's steps from midnight");
                self.daily_baseline = steps;
                self.displayed = steps;
            }
            Err(e) => {
                warn!(error = %e, "could not fetch today's step data");
                self.daily_baseline = 0;
                self.displayed = 0;
            }
        }
        Ok(self.displayed)
    }

    /// Initialize and open a live subscription.
    pub fn start(&mut self) -> Result<u64, SensorError> {
        let steps = self.initialize()?;
        self.subscribe()?;
        Ok(steps)
    }

    /// Drop the live subscription.
    pub fn stop(&mut self) {
        if self.watch.take().is_some() {
            debug!("step watch stopped");
        }
    }

    /// Replace the live subscription with a fresh one.
    ///
    /// A new subscription reports counts relative to its own start, so the
    /// baseline is captured again from its first callback.
    fn subscribe(&mut self) -> Result<(), SensorError> {
        self.watch = None;
        self.watch_start_raw = None;
        self.last_raw = None;
        match StepWatch::open(self.pedometer.as_ref()) {
            Ok(watch) => {
                self.watch = Some(watch);
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    // ── Events ───────────────────────────────────────────────────────

    /// Apply one live-watch value. Returns the new count when it changed.
    pub fn on_sensor_update(&mut self, raw: u64) -> Option<u64> {
        if !self.is_available() {
            return None;
        }
        let start = *self.watch_start_raw.get_or_insert(raw);
        self.last_raw = Some(raw);

        let delta = raw.saturating_sub(start);
        let total = self.daily_baseline + delta;
        debug!(
            baseline = self.daily_baseline,
            delta, total, "live step update"
        );
        if total <= self.displayed {
            return None;
        }
        self.displayed = total;
        Some(total)
    }

    /// Drain pending live-watch values. Returns the new count when it changed.
    pub fn pump(&mut self) -> Option<u64> {
        let values = match &self.watch {
            Some(watch) => watch.drain(),
            None => return None,
        };
        let mut changed = None;
        for raw in values {
            if let Some(total) = self.on_sensor_update(raw) {
                changed = Some(total);
            }
        }
        changed
    }

    /// Reset to the new day's since-midnight count if the local date moved.
    pub fn check_midnight_rollover(&mut self) -> Option<DayRollover> {
        if !self.is_available() {
            return None;
        }
        let today = self.clock.today();
        if today == self.last_reset_date {
            return None;
        }

        self.pump();
        let previous_date = self.last_reset_date;
        let previous_steps = self.displayed;
        self.last_reset_date = today;
        if let Err(e) = self.reconcile() {
            warn!(error = %e, "since-midnight query failed at day change; starting from zero");
            self.daily_baseline = 0;
            self.displayed = 0;
            self.watch_start_raw = self.last_raw;
        }
        info!(
            %previous_date,
            date = %today,
            previous_steps,
            steps = self.displayed,
            "day changed, steps reset"
        );
        Some(DayRollover {
            previous_date,
            date: today,
            previous_steps,
            steps: self.displayed,
        })
    }

    /// Resync with the since-midnight query and reopen the live watch.
    ///
    /// Subscriptions can be suspended in the background and silently miss
    /// deltas, so the query wins over whatever the live watch reported.
    pub fn on_app_foreground(&mut self) -> Option<u64> {
        if !self.is_available() {
            return None;
        }
        if let Err(e) = self.reconcile() {
            warn!(error = %e, "foreground resync failed; keeping current count");
        }
        if let Err(e) = self.subscribe() {
            warn!(error = %e, "could not reopen step watch");
        }
        Some(self.displayed)
    }

    /// Align the count with the since-midnight query.
    pub fn reconcile(&mut self) -> Result<u64, SensorError> {
        // Fold in anything already delivered so the anchor below is current.
        self.pump();
        let steps = self.query_today()?;
        if steps != self.displayed {
            info!(from = self.displayed, to = steps, "steps reconciled");
        }
        self.daily_baseline = steps;
        self.displayed = steps;
        self.watch_start_raw = self.last_raw;
        Ok(steps)
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn query_today(&self) -> Result<u64, SensorError> {
        let now = self.clock.now();
        self.pedometer.query_step_count(local_midnight(now), now)
    }

    fn terminal_error(&self) -> Option<SensorError> {
        if self.status.is_terminal() {
            Some(self.error.clone().unwrap_or(SensorError::Unavailable))
        } else {
            None
        }
    }

    fn fail(&mut self, err: SensorError) -> SensorError {
        warn!(code = err.code(), "pedometer disabled for this session");
        self.status = match err {
            SensorError::PermissionDenied => SensorStatus::PermissionDenied,
            _ => SensorStatus::Unavailable,
        };
        self.error = Some(err.clone());
        self.watch = None;
        self.displayed = 0;
        self.daily_baseline = 0;
        err
    }
}

impl std::fmt::Debug for StepCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepCounter")
            .field("status", &self.status)
            .field("displayed", &self.displayed)
            .field("daily_baseline", &self.daily_baseline)
            .field("watch_start_raw", &self.watch_start_raw)
            .field("last_reset_date", &self.last_reset_date)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::sensors::SimulatedPedometer;
    use chrono::Duration;

    fn setup() -> (Arc<ManualClock>, Arc<SimulatedPedometer>, StepCounter) {
        let clock = Arc::new(ManualClock::at(2026, 4, 14, 9, 0, 0));
        let pedometer = Arc::new(SimulatedPedometer::new(clock.clone()));
        let counter = StepCounter::new(pedometer.clone(), clock.clone());
        (clock, pedometer, counter)
    }

    #[test]
    fn start_loads_steps_since_midnight() {
        let (clock, pedometer, mut counter) = setup();
        pedometer.record_at(clock.now() - Duration::hours(2), 1_500);
        pedometer.record_at(clock.now() - Duration::days(1), 8_000);

        assert_eq!(counter.start().unwrap(), 1_500);
        assert_eq!(counter.steps(), 1_500);
        assert_eq!(counter.daily_baseline(), 1_500);
        assert!(counter.is_watching());
    }

    #[test]
    fn first_callback_captures_baseline() {
        let (_clock, _pedometer, mut counter) = setup();
        counter.start().unwrap();

        assert_eq!(counter.on_sensor_update(40), None);
        assert_eq!(counter.on_sensor_update(55), Some(15));
        assert_eq!(counter.on_sensor_update(70), Some(30));
    }

    #[test]
    fn live_steps_add_to_daily_base() {
        let (clock, pedometer, mut counter) = setup();
        pedometer.record_at(clock.now() - Duration::hours(1), 2_000);
        counter.start().unwrap();

        pedometer.walk(10);
        pedometer.walk(25);
        assert_eq!(counter.pump(), Some(2_025));
        assert_eq!(counter.steps(), 2_025);
    }

    #[test]
    fn new_subscription_recaptures_baseline() {
        let (_clock, pedometer, mut counter) = setup();
        counter.start().unwrap();
        pedometer.walk(100);
        pedometer.walk(100);
        counter.pump();
        assert_eq!(counter.steps(), 100);

        // Foreground reopens the watch; its counts restart from zero.
        assert_eq!(counter.on_app_foreground(), Some(200));
        pedometer.walk(5);
        pedometer.walk(5);
        assert_eq!(counter.pump(), Some(205));
        assert_eq!(pedometer.active_watchers(), 1);
    }

    #[test]
    fn foreground_recovers_missed_steps() {
        let (_clock, pedometer, mut counter) = setup();
        counter.start().unwrap();
        pedometer.walk(5);
        pedometer.walk(45);
        counter.pump();
        assert_eq!(counter.steps(), 45);

        pedometer.walk_unobserved(300);
        assert_eq!(counter.steps(), 45);
        assert_eq!(counter.on_app_foreground(), Some(350));
    }

    #[test]
    fn query_wins_over_live_watch() {
        let (_clock, _pedometer, mut counter) = setup();
        counter.start().unwrap();
        // The live watch reports steps the history never saw.
        counter.on_sensor_update(1_000);
        assert_eq!(counter.on_sensor_update(1_500), Some(500));

        assert_eq!(counter.reconcile().unwrap(), 0);
        assert_eq!(counter.steps(), 0);
        assert_eq!(counter.on_sensor_update(1_510), Some(10));
    }

    #[test]
    fn unavailable_sensor_is_terminal() {
        let clock = Arc::new(ManualClock::at(2026, 4, 14, 9, 0, 0));
        let pedometer = Arc::new(SimulatedPedometer::unavailable(clock.clone()));
        let mut counter = StepCounter::new(pedometer.clone(), clock);

        assert_eq!(counter.start(), Err(SensorError::Unavailable));
        assert_eq!(counter.status(), SensorStatus::Unavailable);
        assert_eq!(counter.steps(), 0);
        assert_eq!(counter.on_sensor_update(100), None);
        assert_eq!(counter.on_app_foreground(), None);

        // No retry loop.
        assert_eq!(counter.start(), Err(SensorError::Unavailable));
        assert_eq!(pedometer.query_count(), 0);
    }

    #[test]
    fn denied_permission_has_its_own_status() {
        let clock = Arc::new(ManualClock::at(2026, 4, 14, 9, 0, 0));
        let pedometer = Arc::new(SimulatedPedometer::denied(clock.clone()));
        let mut counter = StepCounter::new(pedometer, clock);

        assert_eq!(counter.start(), Err(SensorError::PermissionDenied));
        assert_eq!(counter.status(), SensorStatus::PermissionDenied);
        assert_eq!(counter.error(), Some(&SensorError::PermissionDenied));
        assert_eq!(counter.steps(), 0);
    }

    #[test]
    fn failed_initial_query_starts_from_zero() {
        let (_clock, pedometer, mut counter) = setup();
        pedometer.walk_unobserved(700);
        pedometer.set_fail_queries(true);

        assert_eq!(counter.start(), Ok(0));
        assert!(counter.is_available());
        pedometer.walk(12);
        pedometer.walk(20);
        assert_eq!(counter.pump(), Some(20));
    }

    #[test]
    fn midnight_rollover_resets_to_new_day() {
        let clock = Arc::new(ManualClock::at(2026, 4, 14, 23, 59, 0));
        let pedometer = Arc::new(SimulatedPedometer::new(clock.clone()));
        pedometer.record_at(clock.now() - Duration::hours(3), 6_000);
        let mut counter = StepCounter::new(pedometer.clone(), clock.clone());
        counter.start().unwrap();
        pedometer.walk(1);
        pedometer.walk(40);
        counter.pump();
        assert_eq!(counter.steps(), 6_040);

        clock.advance(Duration::minutes(2));
        pedometer.walk(25);
        let rollover = counter.check_midnight_rollover().unwrap();
        assert_eq!(rollover.previous_steps, 6_065);
        assert_eq!(rollover.steps, 25);
        assert_eq!(rollover.date, clock.today());
        assert_eq!(counter.steps(), 25);

        pedometer.walk(10);
        assert_eq!(counter.pump(), Some(35));
    }

    #[test]
    fn rollover_then_foreground_resets_once() {
        let clock = Arc::new(ManualClock::at(2026, 4, 14, 23, 59, 0));
        let pedometer = Arc::new(SimulatedPedometer::new(clock.clone()));
        let mut counter = StepCounter::new(pedometer.clone(), clock.clone());
        counter.start().unwrap();
        pedometer.walk(1);
        pedometer.walk(900);
        counter.pump();

        clock.advance(Duration::minutes(5));
        pedometer.walk_unobserved(30);

        assert!(counter.check_midnight_rollover().is_some());
        assert_eq!(counter.on_app_foreground(), Some(30));
        assert!(counter.check_midnight_rollover().is_none());
        assert_eq!(counter.steps(), 30);
        assert_eq!(counter.last_reset_date(), clock.today());
    }

    #[test]
    fn same_day_check_is_a_no_op() {
        let (clock, _pedometer, mut counter) = setup();
        counter.start().unwrap();
        clock.advance(Duration::minutes(10));
        assert!(counter.check_midnight_rollover().is_none());
    }

    #[test]
    fn stop_drops_subscription() {
        let (_clock, pedometer, mut counter) = setup();
        counter.start().unwrap();
        assert_eq!(pedometer.active_watchers(), 1);
        counter.stop();
        assert!(!counter.is_watching());
        assert_eq!(pedometer.active_watchers(), 0);
    }
}
