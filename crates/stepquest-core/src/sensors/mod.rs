//! Sensor collaborators.
//!
//! The pedometer is callback-driven on every platform: a live subscription
//! pushes a cumulative count relative to its own start. Here the push side is
//! an `mpsc::Sender` handed to the platform adapter and the pull side is a
//! [`StepWatch`] that the step counter drains whenever the caller pumps it.

pub mod simulated;

use std::sync::mpsc::{self, Receiver, Sender};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::SensorError;

pub use simulated::SimulatedPedometer;

/// Outcome of a permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionStatus {
    Granted,
    Denied,
    Undetermined,
}

/// Availability of the pedometer for the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorStatus {
    Checking,
    Available,
    Unavailable,
    PermissionDenied,
}

impl SensorStatus {
    pub fn is_available(self) -> bool {
        self == SensorStatus::Available
    }

    /// Whether the session has given up on the sensor.
    pub fn is_terminal(self) -> bool {
        matches!(self, SensorStatus::Unavailable | SensorStatus::PermissionDenied)
    }
}

/// Handle to a live platform subscription.
pub trait Subscription: Send {
    /// Stop delivering updates. Must be idempotent.
    fn remove(&mut self);
}

/// Platform pedometer.
pub trait Pedometer: Send + Sync {
    fn is_available(&self) -> bool;

    fn request_permission(&self) -> PermissionStatus;

    /// Steps taken between `start` and `end`, both inclusive.
    fn query_step_count(
        &self,
        start: DateTime<Local>,
        end: DateTime<Local>,
    ) -> Result<u64, SensorError>;

    /// Start a live subscription. Each message on `sink` is the cumulative
    /// step count since this subscription started.
    fn watch_step_count(&self, sink: Sender<u64>) -> Result<Box<dyn Subscription>, SensorError>;
}

/// An open live-step subscription.
///
/// Dropping the watch removes the platform subscription.
pub struct StepWatch {
    receiver: Receiver<u64>,
    handle: Box<dyn Subscription>,
}

impl StepWatch {
    pub fn open(pedometer: &dyn Pedometer) -> Result<Self, SensorError> {
        let (sink, receiver) = mpsc::channel();
        let handle = pedometer.watch_step_count(sink)?;
        Ok(Self { receiver, handle })
    }

    /// Raw values delivered since the last drain, oldest first.
    pub fn drain(&self) -> Vec<u64> {
        self.receiver.try_iter().collect()
    }
}

impl Drop for StepWatch {
    fn drop(&mut self) {
        self.handle.remove();
    }
}

impl std::fmt::Debug for StepWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepWatch").finish_non_exhaustive()
    }
}

/// A single GPS fix pushed by the location sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    /// Unix timestamp in milliseconds.
    pub timestamp: i64,
}

impl LocationFix {
    pub fn new(latitude: f64, longitude: f64, timestamp: i64) -> Self {
        Self {
            latitude,
            longitude,
            timestamp,
        }
    }
}
