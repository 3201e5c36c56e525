//! Walking missions: generation, progress, completion and rewards.

pub mod engine;
pub mod generator;
pub mod reward;
pub mod route;
mod types;

pub use engine::{MissionEngine, RewardTicket, SCAN_FAILED_MESSAGE};
pub use generator::{MissionGenerator, ScanContext, TimeContext};
pub use reward::{RewardGenerator, FALLBACK_REWARD};
pub use route::{haversine_m, route_length_km, RouteFilter};
pub use types::{ActiveMission, CompletedMission, Mission, MissionState, RouteCoordinate, Vibe};
