//! A running quest session.
//!
//! Wires the pedometer into the step counter and fans the daily count out to
//! the lifetime sync and the mission engine. The host drives it from three
//! sources: [`QuestSession::tick`] on a coarse timer, lifecycle transitions,
//! and location fixes. Every state change is published as an [`Event`] to
//! the receivers handed out by [`QuestSession::subscribe`].
//!
//! Reward text is generated on a worker thread so completion never waits on
//! the network; finished rewards are folded back in on the next `pump`.

use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

use chrono::{DateTime, Duration, Local, Utc};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::{CoreError, MissionError, SensorError, StorageError};
use crate::events::Event;
use crate::generation::TextGenerator;
use crate::mission::{
    Mission, MissionEngine, MissionGenerator, RewardGenerator, RewardTicket, ScanContext,
    FALLBACK_REWARD,
};
use crate::sensors::{LocationFix, Pedometer};
use crate::steps::{StepCounter, StepSyncEngine, SyncOutcome, SyncPolicy};
use crate::storage::{Config, Journal};

struct PendingReward {
    ticket: RewardTicket,
    handle: JoinHandle<String>,
}

fn interval(secs: u64) -> Duration {
    Duration::seconds(secs.min(u32::MAX as u64) as i64)
}

/// Owns the step, sync and mission state of one running app.
///
/// Call [`QuestSession::stop`] to flush steps before shutting down. Dropping
/// the session without it still waits for pending rewards so completed
/// missions are saved.
pub struct QuestSession {
    clock: Arc<dyn Clock>,
    counter: StepCounter,
    sync: StepSyncEngine,
    engine: MissionEngine,
    generator: MissionGenerator,
    rewards: Arc<RewardGenerator>,
    journal: Journal,
    midnight_check_interval: Duration,
    sync_interval: Duration,
    last_midnight_check: DateTime<Local>,
    last_sync: DateTime<Local>,
    /// Final counts of finished days whose remaining steps are not yet credited.
    unclosed_days: VecDeque<u64>,
    pending: Vec<PendingReward>,
    subscribers: Vec<Sender<Event>>,
}

impl QuestSession {
    /// # Errors
    /// Returns an error when the persisted sync cursor cannot be read.
    pub fn new(
        pedometer: Arc<dyn Pedometer>,
        clock: Arc<dyn Clock>,
        journal: Journal,
        text: Arc<dyn TextGenerator>,
        config: &Config,
    ) -> Result<Self, StorageError> {
        let sync = StepSyncEngine::load(journal.clone(), SyncPolicy::from_config(config))?;
        let now = clock.now();
        Ok(Self {
            counter: StepCounter::new(pedometer, Arc::clone(&clock)),
            sync,
            engine: MissionEngine::new(Arc::clone(&clock))
                .with_min_route_distance(config.mission.min_route_distance_m),
            generator: MissionGenerator::new(Arc::clone(&text), Arc::clone(&clock)),
            rewards: Arc::new(RewardGenerator::new(text)),
            journal,
            midnight_check_interval: interval(config.steps.midnight_check_interval_secs),
            sync_interval: interval(config.sync.interval_secs),
            last_midnight_check: now,
            last_sync: now,
            unclosed_days: VecDeque::new(),
            pending: Vec::new(),
            subscribers: Vec::new(),
            clock,
        })
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Steps taken today.
    pub fn steps(&self) -> u64 {
        self.counter.steps()
    }

    pub fn counter(&self) -> &StepCounter {
        &self.counter
    }

    pub fn missions(&self) -> &MissionEngine {
        &self.engine
    }

    pub fn sync_engine(&self) -> &StepSyncEngine {
        &self.sync
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Rewards still being generated.
    pub fn pending_rewards(&self) -> usize {
        self.pending.len()
    }

    /// Receive every event published from now on.
    pub fn subscribe(&mut self) -> Receiver<Event> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Load today's steps and start watching the pedometer.
    pub fn start(&mut self) -> Result<u64, SensorError> {
        let now = self.clock.now();
        self.last_midnight_check = now;
        self.last_sync = now;
        match self.counter.start() {
            Ok(steps) => {
                self.emit(Event::StepsUpdated {
                    steps,
                    at: self.utc_now(),
                });
                self.update_missions(steps);
                self.flush();
                Ok(steps)
            }
            Err(e) => {
                self.emit(Event::SensorStatusChanged {
                    status: self.counter.status(),
                    message: Some(e.user_message().to_string()),
                    at: self.utc_now(),
                });
                Err(e)
            }
        }
    }

    /// Flush steps, wait for pending rewards and drop the live watch.
    pub fn stop(&mut self) {
        self.pump();
        self.sync(true);
        self.wait_for_rewards();
        self.counter.stop();
        self.flush();
    }

    /// Drain live sensor values and finished rewards.
    pub fn pump(&mut self) -> Option<u64> {
        let changed = self.counter.pump();
        if let Some(steps) = changed {
            self.emit(Event::StepsUpdated {
                steps,
                at: self.utc_now(),
            });
            self.update_missions(steps);
            if self.sync.should_sync_eagerly(steps) {
                self.sync(false);
            }
        }
        self.poll_rewards();
        self.flush();
        changed
    }

    /// Periodic work: midnight check and interval sync.
    pub fn tick(&mut self) {
        self.pump();
        let now = self.clock.now();
        if now - self.last_midnight_check >= self.midnight_check_interval {
            self.last_midnight_check = now;
            self.check_rollover();
        }
        if now - self.last_sync >= self.sync_interval {
            self.sync(false);
        }
        self.flush();
    }

    pub fn on_app_foreground(&mut self) {
        self.check_rollover();
        if let Some(steps) = self.counter.on_app_foreground() {
            self.emit(Event::StepsReconciled {
                steps,
                at: self.utc_now(),
            });
            self.update_missions(steps);
        }
        self.last_midnight_check = self.clock.now();
        self.flush();
    }

    /// Flush uncommitted steps before the app is suspended.
    pub fn on_app_background(&mut self) {
        self.pump();
        self.sync(true);
        self.flush();
    }

    pub fn on_location(&mut self, fix: &LocationFix) -> bool {
        let recorded = self.engine.add_route_point(fix);
        self.flush();
        recorded
    }

    /// Credit new steps to the lifetime total.
    ///
    /// A day that ended since the last sync is closed first; today's steps
    /// are only counted once it is.
    pub fn sync(&mut self, force: bool) -> SyncOutcome {
        while let Some(&previous_steps) = self.unclosed_days.front() {
            let outcome = self.sync.close_day(previous_steps);
            self.publish_sync(&outcome);
            if matches!(outcome, SyncOutcome::Skipped | SyncOutcome::Failed) {
                return outcome;
            }
            self.unclosed_days.pop_front();
        }
        let outcome = self.sync.sync(self.counter.steps(), force);
        self.publish_sync(&outcome);
        outcome
    }

    // ── Missions ─────────────────────────────────────────────────────

    /// # Errors
    /// Fails when a scan is not allowed now or the generator failed; the
    /// latter leaves the engine idle so the user can retry.
    pub fn scan(&mut self, context: &ScanContext) -> Result<Vec<Mission>, CoreError> {
        let result = self
            .engine
            .scan(&self.generator, context)
            .map(<[Mission]>::to_vec);
        self.flush();
        result
    }

    pub fn select(&mut self, mission_id: &str) -> Result<(), MissionError> {
        let result = self.engine.select(mission_id, self.counter.steps());
        self.flush();
        result
    }

    pub fn dismiss(&mut self) -> Result<(), MissionError> {
        let result = self.engine.dismiss();
        self.flush();
        result
    }

    pub fn cancel(&mut self) -> Result<(), MissionError> {
        let result = self.engine.cancel();
        self.flush();
        result
    }

    /// Complete the active mission now, whatever its progress.
    pub fn complete(&mut self) -> Result<(), MissionError> {
        let ticket = self.engine.complete()?;
        self.spawn_reward(ticket);
        self.flush();
        Ok(())
    }

    /// Block until every pending reward has been generated and persisted.
    pub fn wait_for_rewards(&mut self) {
        for pending in std::mem::take(&mut self.pending) {
            let text = pending.handle.join().unwrap_or_else(|_| {
                warn!(mission_id = pending.ticket.mission_id(), "reward worker panicked");
                FALLBACK_REWARD.to_string()
            });
            self.engine.resolve_reward(pending.ticket, text, &self.journal);
        }
        self.flush();
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn utc_now(&self) -> DateTime<Utc> {
        self.clock.now().with_timezone(&Utc)
    }

    fn check_rollover(&mut self) {
        if let Some(rollover) = self.counter.check_midnight_rollover() {
            self.emit(Event::DayRolledOver {
                previous_date: rollover.previous_date,
                date: rollover.date,
                previous_steps: rollover.previous_steps,
                steps: rollover.steps,
                at: self.utc_now(),
            });
            self.unclosed_days.push_back(rollover.previous_steps);
            self.sync(true);
            self.update_missions(rollover.steps);
        }
    }

    fn publish_sync(&mut self, outcome: &SyncOutcome) {
        match outcome {
            SyncOutcome::Committed { delta, total_steps } => {
                self.last_sync = self.clock.now();
                self.emit(Event::StepsSynced {
                    delta: *delta,
                    total_steps: *total_steps,
                    at: self.utc_now(),
                });
            }
            SyncOutcome::DayBoundary { cursor } => {
                self.last_sync = self.clock.now();
                self.emit(Event::SyncCursorReset {
                    cursor: *cursor,
                    at: self.utc_now(),
                });
            }
            SyncOutcome::Unchanged | SyncOutcome::Debounced { .. } => {
                self.last_sync = self.clock.now();
            }
            SyncOutcome::Skipped | SyncOutcome::Failed => {}
        }
    }

    fn update_missions(&mut self, steps: u64) {
        if let Some(ticket) = self.engine.update_steps(steps) {
            self.spawn_reward(ticket);
        }
    }

    fn spawn_reward(&mut self, ticket: RewardTicket) {
        let rewards = Arc::clone(&self.rewards);
        let worker_ticket = ticket.clone();
        let spawned = std::thread::Builder::new()
            .name("stepquest-reward".into())
            .spawn(move || MissionEngine::generate_reward(&rewards, &worker_ticket));
        match spawned {
            Ok(handle) => {
                debug!(mission_id = ticket.mission_id(), "reward generation started");
                self.pending.push(PendingReward { ticket, handle });
            }
            Err(e) => {
                warn!(error = %e, "could not start reward worker, generating inline");
                let text = MissionEngine::generate_reward(&self.rewards, &ticket);
                self.engine.resolve_reward(ticket, text, &self.journal);
            }
        }
    }

    fn poll_rewards(&mut self) {
        if self.pending.iter().all(|p| !p.handle.is_finished()) {
            return;
        }
        let (done, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|p| p.handle.is_finished());
        self.pending = waiting;
        for pending in done {
            let text = pending
                .handle
                .join()
                .unwrap_or_else(|_| FALLBACK_REWARD.to_string());
            self.engine.resolve_reward(pending.ticket, text, &self.journal);
        }
    }

    fn flush(&mut self) {
        for event in self.engine.take_events() {
            self.emit(event);
        }
    }

    fn emit(&mut self, event: Event) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl Drop for QuestSession {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            debug!(pending = self.pending.len(), "waiting for rewards before drop");
            self.wait_for_rewards();
        }
    }
}

impl std::fmt::Debug for QuestSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuestSession")
            .field("counter", &self.counter)
            .field("sync", &self.sync)
            .field("engine", &self.engine)
            .field("pending_rewards", &self.pending.len())
            .finish()
    }
}
