//! # Localisation module
//!
//! This module provides localisation for the robot by fusing wheel odometry with inertial
//! measurements in an Extended Kalman Filter.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod ekf;
mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

pub use comms_if::op::{Pose, VelocityEstimate};
pub use ekf::*;
pub use params::*;
pub use state::*;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Distance and heading change reported by the wheel encoders since the previous read.
#[derive(Debug, Default, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct OdometryDelta {
    /// Units: meters
    pub dist_m: f64,

    /// Units: radians, counter-clockwise positive
    pub heading_rad: f64
}

/// A single sample from the inertial sensor, in the robot body frame.
#[derive(Debug, Default, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct InertialSample {
    /// Units: meters/second^2
    pub accel_x_ms2: f64,

    /// Units: meters/second^2
    pub accel_y_ms2: f64,

    /// Units: radians/second
    pub gyro_z_rads: f64
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during Loc operation.
#[derive(Debug, thiserror::Error)]
pub enum LocError {
    #[error("Loc has not been initialised")]
    NotInitialised,

    #[error("Invalid localisation parameters: {0}")]
    InvalidParams(util::params::InvalidParam),

    #[error("Could not create the localisation archive: {0}")]
    ArchiveInitError(String)
}

/// Numerical problems which cause a filter step to be rejected.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum NumericalFault {
    #[error("The innovation covariance is not positive definite")]
    InnovationNotPositiveDefinite,

    #[error("The candidate state contains a non-finite value")]
    NonFinite,

    #[error("The candidate covariance is not symmetric (asymmetry norm {0})")]
    NotSymmetric(f64),

    #[error("The candidate covariance is not positive semi-definite (min eigenvalue {0})")]
    NotPositiveSemiDefinite(f64),

    #[error("Cannot update with a time step of {0} s")]
    InvalidTimeStep(f64)
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl OdometryDelta {
    pub fn is_finite(&self) -> bool {
        self.dist_m.is_finite() && self.heading_rad.is_finite()
    }
}

impl InertialSample {
    pub fn is_finite(&self) -> bool {
        self.accel_x_ms2.is_finite()
            && self.accel_y_ms2.is_finite()
            && self.gyro_z_rads.is_finite()
    }

    /// Return this sample with the given `[ax, ay, gz]` offset removed.
    pub fn minus_offset(&self, offset: &[f64; 3]) -> Self {
        Self {
            accel_x_ms2: self.accel_x_ms2 - offset[0],
            accel_y_ms2: self.accel_y_ms2 - offset[1],
            gyro_z_rads: self.gyro_z_rads - offset[2]
        }
    }
}
