//! # Stepquest Core Library
//!
//! Core logic for Stepquest, a walking game that turns daily steps into
//! short missions. Everything the app does is available through this crate
//! and the `stepquest-cli` binary; a mobile shell only has to supply a
//! pedometer, location fixes and a timer.
//!
//! ## Architecture
//!
//! - **Steps**: a daily counter fed by the platform pedometer, reset at
//!   local midnight, and a sync engine that credits each step to the
//!   lifetime total exactly once
//! - **Missions**: a state machine from scanning through selection and
//!   progress to completion, with AI-written missions and rewards
//! - **Storage**: a SQLite key-value store holding lifetime stats and
//!   mission history, plus TOML configuration
//! - **Session**: the event loop that ties the above together and publishes
//!   an [`Event`] for every change
//!
//! ## Key Components
//!
//! - [`StepCounter`]: today's step count
//! - [`StepSyncEngine`]: lifetime total and sync cursor
//! - [`MissionEngine`]: mission lifecycle
//! - [`QuestSession`]: wiring and event fan-out
//! - [`Journal`]: persisted stats and history

pub mod clock;
pub mod error;
pub mod events;
pub mod generation;
pub mod mission;
pub mod sensors;
pub mod session;
pub mod steps;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{
    ConfigError, CoreError, GenerationError, MissionError, SensorError, StorageError,
};
pub use events::Event;
pub use generation::{HttpTextGenerator, OfflineGenerator, TextGenerator};
pub use mission::{
    ActiveMission, CompletedMission, Mission, MissionEngine, MissionGenerator, MissionState,
    RewardGenerator, ScanContext, Vibe,
};
pub use sensors::{LocationFix, Pedometer, PermissionStatus, SensorStatus, SimulatedPedometer};
pub use session::QuestSession;
pub use steps::{StepCounter, StepSyncEngine, SyncOutcome, SyncPolicy};
pub use storage::{Config, Database, Journal, KvStore, LifetimeStats, MemoryStore};
