//! Daily step counting and lifetime step sync.

pub mod counter;
pub mod sync;

pub use counter::{DayRollover, StepCounter};
pub use sync::{StepSyncEngine, SyncOutcome, SyncPolicy};
