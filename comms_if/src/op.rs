//! # Operator channel
//!
//! Messages exchanged between the robot and the remote operator. The robot is always the
//! requester: each cycle it sends one [`RobotMsg`] and the operator replies with exactly one
//! [`PeerMsg`]. Every message is a single JSON-encoded zmq frame.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::{serde::ts_milliseconds, DateTime, Utc};
use serde::{Deserialize, Serialize};
use structopt::{clap::AppSettings, StructOpt};
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Position and heading of the robot in the fixed world frame.
#[derive(Debug, Default, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x_m: f64,
    pub y_m: f64,

    /// Heading from the world X axis, counter-clockwise positive, in (-pi, pi].
    pub theta_rad: f64
}

/// Velocity of the robot in the world frame.
#[derive(Debug, Default, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct VelocityEstimate {
    pub vx_ms: f64,
    pub vy_ms: f64
}

/// The velocity the operator wants the robot to move at, in the world frame.
///
/// The default is the zero vector, so the robot holds still until the first goal arrives.
#[derive(Debug, Default, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalVelocity {
    pub vx_ms: f64,
    pub vy_ms: f64
}

/// A snapshot of the robot's state sent to the operator once per cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    /// Cycle number the record was produced in
    pub cycle: u64,

    /// UTC time the record was built at
    #[serde(with = "ts_milliseconds")]
    pub timestamp: DateTime<Utc>,

    pub pose: Pose,

    pub velocity: VelocityEstimate,

    /// Raw readings of the auxiliary analog sensors
    pub aux: Vec<f64>,

    pub ctrl_state: ControllerState,

    /// True if the robot is currently holding itself stopped because of a fault
    pub safe: bool
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// State of the heading-then-drive motion controller.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerState {
    Aligning,
    Driving,
    Stopped
}

/// Messages sent from the robot to the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RobotMsg {
    /// Sent first on every (re)connection.
    Hello {
        robot_id: String
    },

    Telemetry(TelemetryRecord),

    /// Sent in response to a `PeerMsg::Terminate`, after which the robot closes the connection.
    TerminateAck
}

/// Messages sent from the operator to the robot.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub enum PeerMsg {
    /// A new goal velocity.
    Goal {
        vx_ms: f64,
        vy_ms: f64
    },

    /// Stop and shut the robot down.
    Terminate,

    /// Acknowledge a message without changing the goal.
    Ack
}

/// Commands an operator can type into the console.
#[derive(Debug, Clone, StructOpt)]
pub enum OpCmd {
    /// Set the goal velocity of the robot.
    #[structopt(name = "goal", setting = AppSettings::AllowNegativeNumbers)]
    Goal {
        /// Velocity along the world X axis in meters/second.
        vx_ms: f64,

        /// Velocity along the world Y axis in meters/second.
        vy_ms: f64
    },

    /// Set the goal velocity to zero.
    #[structopt(name = "stop")]
    Stop,

    /// Terminate the robot.
    #[structopt(name = "terminate")]
    Terminate,

    /// Print the last telemetry received.
    #[structopt(name = "status")]
    Status
}

#[derive(Debug, Error)]
pub enum MsgError {
    #[error("Could not serialise the message: {0}")]
    SerializationError(serde_json::Error),

    #[error("Could not deserialise the message: {0}")]
    DeserializationError(serde_json::Error),

    #[error("Message is not valid UTF-8")]
    NonUtf8
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl VelocityEstimate {
    pub fn speed_ms(&self) -> f64 {
        self.vx_ms.hypot(self.vy_ms)
    }
}

impl GoalVelocity {
    pub fn is_zero(&self) -> bool {
        self.vx_ms == 0.0 && self.vy_ms == 0.0
    }
}

impl Default for ControllerState {
    fn default() -> Self {
        ControllerState::Stopped
    }
}

impl RobotMsg {
    pub fn to_json(&self) -> Result<String, MsgError> {
        serde_json::to_string(self).map_err(MsgError::SerializationError)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MsgError> {
        let s = std::str::from_utf8(bytes).map_err(|_| MsgError::NonUtf8)?;
        serde_json::from_str(s).map_err(MsgError::DeserializationError)
    }
}

impl PeerMsg {
    pub fn to_json(&self) -> Result<String, MsgError> {
        serde_json::to_string(self).map_err(MsgError::SerializationError)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MsgError> {
        let s = std::str::from_utf8(bytes).map_err(|_| MsgError::NonUtf8)?;
        serde_json::from_str(s).map_err(MsgError::DeserializationError)
    }
}

impl From<GoalVelocity> for PeerMsg {
    fn from(goal: GoalVelocity) -> Self {
        PeerMsg::Goal {
            vx_ms: goal.vx_ms,
            vy_ms: goal.vy_ms
        }
    }
}

impl OpCmd {
    /// Apply this command to the goal the console is serving.
    ///
    /// Returns the message to send in reply to the robot's next request, or `None` if the
    /// command does not affect the robot.
    pub fn to_peer_msg(&self) -> Option<PeerMsg> {
        match self {
            OpCmd::Goal { vx_ms, vy_ms } => Some(PeerMsg::Goal {
                vx_ms: *vx_ms,
                vy_ms: *vy_ms
            }),
            OpCmd::Stop => Some(PeerMsg::Goal {
                vx_ms: 0.0,
                vy_ms: 0.0
            }),
            OpCmd::Terminate => Some(PeerMsg::Terminate),
            OpCmd::Status => None
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_peer_msg_json() {
        let goal = PeerMsg::from_bytes(br#"{"Goal":{"vx_ms":1.5,"vy_ms":-2.0}}"#).unwrap();
        assert_eq!(goal, PeerMsg::Goal { vx_ms: 1.5, vy_ms: -2.0 });

        assert_eq!(PeerMsg::from_bytes(br#""Terminate""#).unwrap(), PeerMsg::Terminate);

        assert!(matches!(
            PeerMsg::from_bytes(b"\"Fly\""),
            Err(MsgError::DeserializationError(_))
        ));
        assert!(matches!(
            PeerMsg::from_bytes(&[0xff, 0xfe]),
            Err(MsgError::NonUtf8)
        ));
    }

    #[test]
    fn test_telemetry_json() {
        let record = TelemetryRecord {
            cycle: 12,
            timestamp: Utc::now(),
            pose: Pose { x_m: 1.0, y_m: 2.0, theta_rad: 0.5 },
            velocity: VelocityEstimate { vx_ms: 0.3, vy_ms: 0.4 },
            aux: vec![0.1, 0.2],
            ctrl_state: ControllerState::Driving,
            safe: false
        };
        let msg = RobotMsg::Telemetry(record);

        let json = msg.to_json().unwrap();
        assert!(json.contains("\"Driving\""));

        match RobotMsg::from_bytes(json.as_bytes()).unwrap() {
            RobotMsg::Telemetry(r) => {
                assert_eq!(r.cycle, 12);
                assert_eq!(r.pose, Pose { x_m: 1.0, y_m: 2.0, theta_rad: 0.5 });
                assert!((r.velocity.speed_ms() - 0.5).abs() < 1e-12);
            },
            m => panic!("Expected telemetry, got {:?}", m)
        }
    }

    #[test]
    fn test_op_cmd() {
        let cmd = OpCmd::from_iter_safe(&["op", "goal", "1.0", "-0.5"]).unwrap();
        assert_eq!(cmd.to_peer_msg(), Some(PeerMsg::Goal { vx_ms: 1.0, vy_ms: -0.5 }));

        let cmd = OpCmd::from_iter_safe(&["op", "stop"]).unwrap();
        assert_eq!(cmd.to_peer_msg(), Some(PeerMsg::Goal { vx_ms: 0.0, vy_ms: 0.0 }));

        let cmd = OpCmd::from_iter_safe(&["op", "status"]).unwrap();
        assert_eq!(cmd.to_peer_msg(), None);

        assert!(OpCmd::from_iter_safe(&["op", "fly"]).is_err());
    }
}
