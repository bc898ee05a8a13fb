//! # Equipment interface
//!
//! The drivers for the wheel encoders, inertial sensor, auxiliary analog sensors and the motors
//! live outside this crate. They are consumed through the [`Sensors`] and [`Drive`] traits.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::trace;
use serde::Serialize;

use crate::loc::{InertialSample, OdometryDelta};
use util::maths::clamp;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Sensor drivers.
///
/// Reads are bounded-latency blocking calls.
pub trait Sensors: Send {
    /// Distance and heading change since the previous call. Each read consumes the increment.
    fn read_odometry_delta(&mut self) -> Result<OdometryDelta, SensorError>;

    fn read_inertial_sample(&mut self) -> Result<InertialSample, SensorError>;

    fn read_auxiliary(&mut self) -> Result<Vec<f64>, SensorError>;
}

/// Motor drivers.
pub trait Drive: Send {
    fn command_turn(&mut self, dir: TurnDirection, speed_ms: f64) -> Result<(), DriveError>;

    fn command_drive(&mut self, speed_ms: f64) -> Result<(), DriveError>;

    fn command_stop(&mut self) -> Result<(), DriveError>;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Speed range the drive accepts.
#[derive(Debug, Clone, Copy)]
pub struct SpeedLimits {
    pub min_speed_ms: f64,
    pub max_speed_ms: f64
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TurnDirection {
    /// Counter-clockwise
    Left,

    /// Clockwise
    Right
}

/// The actuation the motion controller wants this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum ActuationIntent {
    TurnLeft { speed_ms: f64 },
    TurnRight { speed_ms: f64 },
    Drive { speed_ms: f64 },
    Stop
}

#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("The {0} sensor is not available: {1}")]
    NotAvailable(&'static str, String),

    #[error("The {0} reading is not finite")]
    NonFinite(&'static str),

    #[error("The {quantity} reading ({value}) is outside the plausible range (limit {limit})")]
    OutOfRange {
        quantity: &'static str,
        value: f64,
        limit: f64
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    #[error("The drive rejected the command: {0}")]
    CommandFailed(String)
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for ActuationIntent {
    fn default() -> Self {
        ActuationIntent::Stop
    }
}

impl SpeedLimits {
    /// Clamp a speed magnitude into the drive's range.
    pub fn limit(&self, speed_ms: f64) -> f64 {
        clamp(speed_ms.abs(), self.min_speed_ms, self.max_speed_ms)
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Issue an actuation intent to the drive.
pub fn apply_intent<D>(
    drive: &mut D,
    intent: ActuationIntent,
    limits: &SpeedLimits
) -> Result<(), DriveError>
where
    D: Drive + ?Sized
{
    trace!("Applying {:?}", intent);

    match intent {
        ActuationIntent::TurnLeft { speed_ms } =>
            drive.command_turn(TurnDirection::Left, limits.limit(speed_ms)),
        ActuationIntent::TurnRight { speed_ms } =>
            drive.command_turn(TurnDirection::Right, limits.limit(speed_ms)),
        ActuationIntent::Drive { speed_ms } =>
            drive.command_drive(limits.limit(speed_ms)),
        ActuationIntent::Stop => drive.command_stop()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Default)]
    struct Recorder(Vec<String>);

    impl Drive for Recorder {
        fn command_turn(&mut self, dir: TurnDirection, speed_ms: f64) -> Result<(), DriveError> {
            self.0.push(format!("turn {:?} {}", dir, speed_ms));
            Ok(())
        }

        fn command_drive(&mut self, speed_ms: f64) -> Result<(), DriveError> {
            self.0.push(format!("drive {}", speed_ms));
            Ok(())
        }

        fn command_stop(&mut self) -> Result<(), DriveError> {
            self.0.push("stop".into());
            Ok(())
        }
    }

    #[test]
    fn test_apply_intent() {
        let limits = SpeedLimits { min_speed_ms: 0.1, max_speed_ms: 1.0 };
        let mut rec = Recorder::default();

        apply_intent(&mut rec, ActuationIntent::Drive { speed_ms: 5.0 }, &limits).unwrap();
        apply_intent(&mut rec, ActuationIntent::Drive { speed_ms: 0.01 }, &limits).unwrap();
        apply_intent(&mut rec, ActuationIntent::TurnLeft { speed_ms: 0.5 }, &limits).unwrap();
        apply_intent(&mut rec, ActuationIntent::TurnRight { speed_ms: 0.5 }, &limits).unwrap();
        apply_intent(&mut rec, ActuationIntent::Stop, &limits).unwrap();

        assert_eq!(rec.0, vec![
            "drive 1",
            "drive 0.1",
            "turn Left 0.5",
            "turn Right 0.5",
            "stop"
        ]);
    }
}
