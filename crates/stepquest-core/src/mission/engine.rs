//! Mission lifecycle state machine.
//!
//! ```text
//! idle ──scan──▶ scanning ──ok──▶ selecting ──select──▶ active ──target met──▶ completed
//!  ▲               │ err             │ dismiss             │ cancel               │ dismiss
//!  └───────────────┴─────────────────┴─────────────────────┴──────────────────────┘
//! ```
//!
//! Commands validate the current state and queue [`Event`]s that the caller
//! drains with [`MissionEngine::take_events`]. Completion is immediate; the
//! reward text is produced afterwards from a [`RewardTicket`] and merged back
//! with [`MissionEngine::resolve_reward`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::generator::{MissionGenerator, ScanContext};
use super::reward::{RewardGenerator, FALLBACK_REWARD};
use super::route::RouteFilter;
use super::types::{ActiveMission, CompletedMission, Mission, MissionState, RouteCoordinate, Vibe};
use crate::clock::Clock;
use crate::error::{CoreError, GenerationError, MissionError};
use crate::events::Event;
use crate::sensors::LocationFix;
use crate::storage::Journal;

/// Banner text after a failed scan. The user may scan again.
pub const SCAN_FAILED_MESSAGE: &str = "Failed to generate missions. Please try again.";

/// Snapshot of a just-completed mission, waiting for its reward text.
#[derive(Debug, Clone, PartialEq)]
pub struct RewardTicket {
    record: CompletedMission,
}

impl RewardTicket {
    pub fn mission_id(&self) -> &str {
        &self.record.id
    }

    pub fn title(&self) -> &str {
        &self.record.title
    }

    pub fn vibe(&self) -> Vibe {
        self.record.vibe
    }

    pub fn steps_completed(&self) -> u64 {
        self.record.steps_completed
    }

    /// The history record this ticket will persist.
    pub fn into_record(self, reward_text: String) -> CompletedMission {
        CompletedMission {
            reward_text,
            ..self.record
        }
    }
}

pub struct MissionEngine {
    clock: Arc<dyn Clock>,
    state: MissionState,
    missions: Vec<Mission>,
    active: Option<ActiveMission>,
    error: Option<String>,
    route_filter: RouteFilter,
    events: Vec<Event>,
}

impl MissionEngine {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: MissionState::Idle,
            missions: Vec::new(),
            active: None,
            error: None,
            route_filter: RouteFilter::default(),
            events: Vec::new(),
        }
    }

    /// Use a different minimum spacing between recorded route points.
    pub fn with_min_route_distance(mut self, meters: f64) -> Self {
        self.route_filter = RouteFilter::new(meters);
        self
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now().with_timezone(&Utc)
    }

    fn invalid(&self, action: &'static str) -> MissionError {
        MissionError::InvalidTransition {
            state: self.state,
            action,
        }
    }

    fn transition(&mut self, to: MissionState) {
        if self.state != to {
            debug!(from = %self.state, to = %to, "mission state");
            self.state = to;
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> MissionState {
        self.state
    }

    /// Missions offered while selecting.
    pub fn missions(&self) -> &[Mission] {
        &self.missions
    }

    pub fn active_mission(&self) -> Option<&ActiveMission> {
        self.active.as_ref()
    }

    /// Last scan error, cleared by the next scan.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn progress(&self) -> Option<f64> {
        self.active.as_ref().map(ActiveMission::progress)
    }

    /// Drain the events queued since the last call.
    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    // ── Scanning ─────────────────────────────────────────────────────

    /// Enter `scanning`. A scan from `selecting` supersedes the offered missions.
    pub fn begin_scan(&mut self) -> Result<(), MissionError> {
        if !matches!(self.state, MissionState::Idle | MissionState::Selecting) {
            return Err(self.invalid("scan"));
        }
        self.missions.clear();
        self.error = None;
        self.transition(MissionState::Scanning);
        let at = self.now();
        self.events.push(Event::ScanStarted { at });
        Ok(())
    }

    /// Apply the generator's answer to a scan started with [`begin_scan`].
    ///
    /// [`begin_scan`]: MissionEngine::begin_scan
    pub fn finish_scan(
        &mut self,
        result: Result<Vec<Mission>, GenerationError>,
    ) -> Result<(), MissionError> {
        if self.state != MissionState::Scanning {
            return Err(self.invalid("finish a scan"));
        }
        let at = self.now();
        match result {
            Ok(missions) => {
                info!(count = missions.len(), "missions generated");
                self.events.push(Event::MissionsGenerated {
                    mission_ids: missions.iter().map(|m| m.id.clone()).collect(),
                    at,
                });
                self.missions = missions;
                self.transition(MissionState::Selecting);
            }
            Err(e) => {
                warn!(error = %e, "mission scan failed");
                self.error = Some(SCAN_FAILED_MESSAGE.to_string());
                self.events.push(Event::ScanFailed {
                    message: SCAN_FAILED_MESSAGE.to_string(),
                    at,
                });
                self.transition(MissionState::Idle);
            }
        }
        Ok(())
    }

    /// Scan and wait for the generator.
    ///
    /// # Errors
    /// A generation failure returns the engine to idle and is returned so
    /// the caller can offer a retry.
    pub fn scan(
        &mut self,
        generator: &MissionGenerator,
        context: &ScanContext,
    ) -> Result<&[Mission], CoreError> {
        self.begin_scan()?;
        let result = generator.generate(context);
        let failure = result.as_ref().err().cloned();
        self.finish_scan(result)?;
        match failure {
            Some(e) => Err(e.into()),
            None => Ok(self.missions.as_slice()),
        }
    }

    pub fn dismiss(&mut self) -> Result<(), MissionError> {
        let at = self.now();
        match self.state {
            MissionState::Selecting => {
                self.missions.clear();
                self.events.push(Event::MissionsDismissed { at });
            }
            MissionState::Completed => {
                if let Some(active) = self.active.take() {
                    self.events.push(Event::MissionClosed {
                        mission_id: active.mission.id,
                        at,
                    });
                }
            }
            _ => return Err(self.invalid("dismiss")),
        }
        self.transition(MissionState::Idle);
        Ok(())
    }

    // ── Active mission ───────────────────────────────────────────────

    /// Start the offered mission `mission_id` with `current_steps` as its
    /// starting point.
    pub fn select(&mut self, mission_id: &str, current_steps: u64) -> Result<(), MissionError> {
        if self.state != MissionState::Selecting {
            return Err(self.invalid("select a mission"));
        }
        let index = self
            .missions
            .iter()
            .position(|m| m.id == mission_id)
            .ok_or_else(|| MissionError::UnknownMission(mission_id.to_string()))?;

        let mission = self.missions.swap_remove(index);
        self.missions.clear();
        let at = self.now();
        info!(mission_id, vibe = %mission.vibe, target = mission.step_target, "mission selected");
        self.events.push(Event::MissionSelected {
            mission_id: mission.id.clone(),
            vibe: mission.vibe,
            step_target: mission.step_target,
            steps_at_start: current_steps,
            at,
        });
        self.active = Some(ActiveMission::start(mission, current_steps, at));
        self.route_filter.reset();
        self.transition(MissionState::Active);
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), MissionError> {
        if self.state != MissionState::Active {
            return Err(self.invalid("cancel"));
        }
        let at = self.now();
        if let Some(active) = self.active.take() {
            info!(mission_id = %active.mission.id, "mission cancelled");
            self.events.push(Event::MissionCancelled {
                mission_id: active.mission.id,
                at,
            });
        }
        self.route_filter.reset();
        self.transition(MissionState::Idle);
        Ok(())
    }

    /// Feed the latest daily step count.
    ///
    /// Returns a ticket exactly once, on the update that meets the target.
    pub fn update_steps(&mut self, current_steps: u64) -> Option<RewardTicket> {
        if self.state != MissionState::Active {
            return None;
        }
        let at = self.now();
        let active = self.active.as_mut()?;
        if active.current_steps != current_steps {
            active.current_steps = current_steps;
            self.events.push(Event::MissionProgress {
                mission_id: active.mission.id.clone(),
                steps_in_mission: active.steps_in_mission(),
                progress: active.progress(),
                at,
            });
        }
        if active.target_met() {
            return self.complete_active();
        }
        None
    }

    /// Complete the active mission before its target is reached.
    pub fn complete(&mut self) -> Result<RewardTicket, MissionError> {
        if self.state != MissionState::Active {
            return Err(self.invalid("complete"));
        }
        self.complete_active().ok_or_else(|| self.invalid("complete"))
    }

    fn complete_active(&mut self) -> Option<RewardTicket> {
        let at = self.now();
        let active = self.active.as_mut()?;
        active.is_completed = true;
        active.is_generating_reward = true;
        let record = active.to_completed(String::new(), at);
        info!(mission_id = %record.id, steps = record.steps_completed, "mission completed");
        self.events.push(Event::MissionCompleted {
            mission_id: record.id.clone(),
            steps_completed: record.steps_completed,
            at,
        });
        self.transition(MissionState::Completed);
        Some(RewardTicket { record })
    }

    /// Ask the collaborator for reward text. Never fails: a collaborator
    /// error yields [`FALLBACK_REWARD`].
    pub fn generate_reward(generator: &RewardGenerator, ticket: &RewardTicket) -> String {
        generator
            .generate(ticket.title(), ticket.vibe(), ticket.steps_completed())
            .unwrap_or_else(|e| {
                warn!(mission_id = ticket.mission_id(), error = %e, "reward generation failed");
                FALLBACK_REWARD.to_string()
            })
    }

    /// Persist the completed mission with its reward and attach the text to
    /// the active mission if it is still the one shown.
    ///
    /// Returns whether the history record is in the store. A persistence
    /// failure is logged and never undoes the completion.
    pub fn resolve_reward(
        &mut self,
        ticket: RewardTicket,
        reward_text: String,
        journal: &Journal,
    ) -> bool {
        let record = ticket.into_record(reward_text.clone());
        let persisted = match journal.record_completed_mission(&record) {
            Ok(_) => true,
            Err(e) => {
                warn!(mission_id = %record.id, error = %e, "failed to persist completed mission");
                false
            }
        };

        match self.active.as_mut() {
            Some(active) if active.mission.id == record.id => {
                active.reward_text = Some(reward_text.clone());
                active.is_generating_reward = false;
            }
            _ => debug!(mission_id = %record.id, "reward arrived after mission was closed"),
        }

        let at = self.now();
        self.events.push(Event::RewardReady {
            mission_id: record.id,
            reward_text,
            persisted,
            at,
        });
        persisted
    }

    /// Generate the reward and resolve it in one blocking call.
    pub fn finish_completion(
        &mut self,
        ticket: RewardTicket,
        generator: &RewardGenerator,
        journal: &Journal,
    ) -> bool {
        let text = Self::generate_reward(generator, &ticket);
        self.resolve_reward(ticket, text, journal)
    }

    /// Record a GPS fix on the active mission when it is far enough from the
    /// previous one.
    pub fn add_route_point(&mut self, fix: &LocationFix) -> bool {
        if self.state != MissionState::Active {
            return false;
        }
        if !self.route_filter.accept(fix.latitude, fix.longitude) {
            return false;
        }
        let at = self.now();
        let Some(active) = self.active.as_mut() else {
            return false;
        };
        active.route_coordinates.push(RouteCoordinate {
            latitude: fix.latitude,
            longitude: fix.longitude,
            timestamp: fix.timestamp,
        });
        self.events.push(Event::RoutePointRecorded {
            mission_id: active.mission.id.clone(),
            points: active.route_coordinates.len(),
            at,
        });
        true
    }
}

impl std::fmt::Debug for MissionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MissionEngine")
            .field("state", &self.state)
            .field("missions", &self.missions.len())
            .field("active", &self.active.as_ref().map(|a| a.mission.id.as_str()))
            .finish()
    }
}
