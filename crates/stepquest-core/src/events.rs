use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::mission::Vibe;
use crate::sensors::SensorStatus;

/// Every state change in the system produces an Event.
/// Observers receive them through `QuestSession::subscribe`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// The pedometer could not be used for this session.
    SensorStatusChanged {
        status: SensorStatus,
        message: Option<String>,
        at: DateTime<Utc>,
    },
    StepsUpdated {
        steps: u64,
        at: DateTime<Utc>,
    },
    /// Steps were reset to the since-midnight query at a day change.
    DayRolledOver {
        previous_date: NaiveDate,
        date: NaiveDate,
        previous_steps: u64,
        steps: u64,
        at: DateTime<Utc>,
    },
    /// Steps were realigned with the since-midnight query.
    StepsReconciled {
        steps: u64,
        at: DateTime<Utc>,
    },
    StepsSynced {
        delta: u64,
        total_steps: u64,
        at: DateTime<Utc>,
    },
    SyncCursorReset {
        cursor: u64,
        at: DateTime<Utc>,
    },
    ScanStarted {
        at: DateTime<Utc>,
    },
    MissionsGenerated {
        mission_ids: Vec<String>,
        at: DateTime<Utc>,
    },
    ScanFailed {
        message: String,
        at: DateTime<Utc>,
    },
    MissionsDismissed {
        at: DateTime<Utc>,
    },
    MissionSelected {
        mission_id: String,
        vibe: Vibe,
        step_target: u32,
        steps_at_start: u64,
        at: DateTime<Utc>,
    },
    MissionProgress {
        mission_id: String,
        steps_in_mission: u64,
        progress: f64,
        at: DateTime<Utc>,
    },
    RoutePointRecorded {
        mission_id: String,
        points: usize,
        at: DateTime<Utc>,
    },
    MissionCompleted {
        mission_id: String,
        steps_completed: u64,
        at: DateTime<Utc>,
    },
    /// Reward text is attached; `persisted` tells whether the history
    /// record made it to the store.
    RewardReady {
        mission_id: String,
        reward_text: String,
        persisted: bool,
        at: DateTime<Utc>,
    },
    MissionCancelled {
        mission_id: String,
        at: DateTime<Utc>,
    },
    /// A completed mission was closed by the user.
    MissionClosed {
        mission_id: String,
        at: DateTime<Utc>,
    },
}
