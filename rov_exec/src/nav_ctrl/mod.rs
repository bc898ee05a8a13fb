//! # Navigation control module
//!
//! Converts the operator's goal velocity into turn and drive actuation. The goal is first
//! decomposed into a desired heading and speed, then a heading-then-drive controller decides
//! whether the robot should turn towards the heading or drive along it.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod decompose;
mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

pub use comms_if::op::{ControllerState, GoalVelocity};
pub use decompose::*;
pub use params::*;
pub use state::*;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during NavCtrl operation.
#[derive(Debug, thiserror::Error)]
pub enum NavCtrlError {
    #[error("NavCtrl has not been initialised")]
    NotInitialised,

    #[error("Invalid navigation control parameters: {0}")]
    InvalidParams(util::params::InvalidParam),

    #[error("Could not create the navigation control archive: {0}")]
    ArchiveInitError(String)
}
