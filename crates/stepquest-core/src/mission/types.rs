use std::fmt;
use std::ops::RangeInclusive;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::route;

/// Mission category. Decides the step range and the narrative tone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vibe {
    Chill,
    Discovery,
    Workout,
}

impl Vibe {
    /// Presentation order; the selection screen offers one mission of each.
    pub const ALL: [Vibe; 3] = [Vibe::Chill, Vibe::Discovery, Vibe::Workout];

    pub fn as_str(self) -> &'static str {
        match self {
            Vibe::Chill => "chill",
            Vibe::Discovery => "discovery",
            Vibe::Workout => "workout",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Vibe::Chill => "Chill",
            Vibe::Discovery => "Discovery",
            Vibe::Workout => "Challenge",
        }
    }

    /// Step targets a generated mission of this vibe should fall in.
    pub fn step_range(self) -> RangeInclusive<u32> {
        match self {
            Vibe::Chill => 800..=1500,
            Vibe::Discovery => 2000..=3500,
            Vibe::Workout => 4000..=7000,
        }
    }
}

impl fmt::Display for Vibe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Vibe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chill" => Ok(Vibe::Chill),
            "discovery" => Ok(Vibe::Discovery),
            "workout" => Ok(Vibe::Workout),
            other => Err(format!("unknown vibe '{other}' (expected chill, discovery or workout)")),
        }
    }
}

/// A generated walking challenge. Immutable once generated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mission {
    pub id: String,
    pub vibe: Vibe,
    pub title: String,
    pub description: String,
    pub step_target: u32,
    pub generated_at: DateTime<Utc>,
}

/// One recorded GPS fix. `timestamp` is milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteCoordinate {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: i64,
}

/// The mission being walked, owned by the engine while active or completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveMission {
    #[serde(flatten)]
    pub mission: Mission,
    pub started_at: DateTime<Utc>,
    pub steps_at_start: u64,
    pub current_steps: u64,
    pub is_completed: bool,
    pub reward_text: Option<String>,
    pub is_generating_reward: bool,
    pub route_coordinates: Vec<RouteCoordinate>,
}

impl ActiveMission {
    pub fn start(mission: Mission, steps_at_start: u64, started_at: DateTime<Utc>) -> Self {
        Self {
            mission,
            started_at,
            steps_at_start,
            current_steps: steps_at_start,
            is_completed: false,
            reward_text: None,
            is_generating_reward: false,
            route_coordinates: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.mission.id
    }

    /// Steps walked since selection. A count below the start snapshot (day
    /// rollover) reads as zero.
    pub fn steps_in_mission(&self) -> u64 {
        self.current_steps.saturating_sub(self.steps_at_start)
    }

    /// Fraction of the target walked, clamped to `0.0..=1.0`.
    pub fn progress(&self) -> f64 {
        if self.mission.step_target == 0 {
            return 1.0;
        }
        (self.steps_in_mission() as f64 / f64::from(self.mission.step_target)).clamp(0.0, 1.0)
    }

    pub fn target_met(&self) -> bool {
        self.steps_in_mission() >= u64::from(self.mission.step_target)
    }

    /// Whole minutes between selection and `at`, rounded.
    pub fn duration_minutes(&self, at: DateTime<Utc>) -> u64 {
        let ms = (at - self.started_at).num_milliseconds().max(0);
        ((ms as f64) / 60_000.0).round() as u64
    }

    pub fn to_completed(&self, reward_text: String, completed_at: DateTime<Utc>) -> CompletedMission {
        CompletedMission {
            id: self.mission.id.clone(),
            title: self.mission.title.clone(),
            description: self.mission.description.clone(),
            vibe: self.mission.vibe,
            step_target: self.mission.step_target,
            steps_completed: self.steps_in_mission(),
            reward_text,
            completed_at,
            duration_minutes: self.duration_minutes(completed_at),
            route_coordinates: self.route_coordinates.clone(),
        }
    }
}

/// Persisted history record. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedMission {
    pub id: String,
    pub title: String,
    pub description: String,
    pub vibe: Vibe,
    pub step_target: u32,
    pub steps_completed: u64,
    pub reward_text: String,
    pub completed_at: DateTime<Utc>,
    pub duration_minutes: u64,
    #[serde(default)]
    pub route_coordinates: Vec<RouteCoordinate>,
}

impl CompletedMission {
    pub fn route_length_km(&self) -> f64 {
        route::route_length_km(&self.route_coordinates)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissionState {
    #[default]
    Idle,
    Scanning,
    Selecting,
    Active,
    Completed,
}

impl MissionState {
    pub fn as_str(self) -> &'static str {
        match self {
            MissionState::Idle => "idle",
            MissionState::Scanning => "scanning",
            MissionState::Selecting => "selecting",
            MissionState::Active => "active",
            MissionState::Completed => "completed",
        }
    }
}

impl fmt::Display for MissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
