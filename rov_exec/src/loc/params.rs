//! Parameters structure for Loc

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;
use util::params::{check_non_negative, check_positive, InvalidParam, Validate};

use super::NoiseModel;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for localisation.
#[derive(Debug, Clone, Deserialize)]
pub struct Params {

    /// Whether the inertial sensor is fused or only odometry is used.
    pub mode: EstimatorMode,

    // ---- PROCESS NOISE ----

    /// Standard deviation of the heading change.
    ///
    /// Units: radians
    pub std_theta: f64,

    /// Standard deviation of the speed.
    ///
    /// Units: meters/second
    pub std_v: f64,

    /// Standard deviation of the distance travelled in one step.
    ///
    /// Units: meters
    pub std_d: f64,

    // ---- MEASUREMENT NOISE ----

    /// Units: meters/second^2
    pub std_accel_delta: f64,

    /// Units: meters/second
    pub std_vel_delta: f64,

    /// Units: radians/second
    pub std_gyro_delta: f64,

    // ---- INITIAL UNCERTAINTY ----

    pub init_std_pos_m: f64,
    pub init_std_vel_ms: f64,
    pub init_std_theta_rad: f64,

    // ---- SENSORS ----

    /// Constant `[ax, ay, gz]` offset removed from every inertial sample.
    pub inertial_offset: [f64; 3],

    /// Odometry deltas longer than this are rejected.
    ///
    /// Units: meters
    pub max_step_dist_m: f64,

    /// Inertial samples with a larger acceleration magnitude on either axis are rejected.
    ///
    /// Units: meters/second^2
    pub max_accel_ms2: f64,

    /// Units: radians/second
    pub max_gyro_rads: f64
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum EstimatorMode {
    /// Odometry predicts, inertial samples update.
    Ekf,

    /// Odometry only, inertial samples are ignored.
    OdometryOnly
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Params {
    pub fn noise_model(&self) -> NoiseModel {
        NoiseModel {
            std_d: self.std_d,
            std_v: self.std_v,
            std_theta: self.std_theta,
            std_accel_delta: self.std_accel_delta,
            std_vel_delta: self.std_vel_delta,
            std_gyro_delta: self.std_gyro_delta
        }
    }
}

impl Validate for Params {
    fn validate(&self) -> Result<(), InvalidParam> {
        check_non_negative("std_theta", self.std_theta)?;
        check_non_negative("std_v", self.std_v)?;
        check_non_negative("std_d", self.std_d)?;

        // The measurement noise keeps the innovation covariance invertible
        if self.mode == EstimatorMode::Ekf {
            check_positive("std_accel_delta", self.std_accel_delta)?;
            check_positive("std_gyro_delta", self.std_gyro_delta)?;
        }
        check_non_negative("std_vel_delta", self.std_vel_delta)?;

        check_non_negative("init_std_pos_m", self.init_std_pos_m)?;
        check_non_negative("init_std_vel_ms", self.init_std_vel_ms)?;
        check_non_negative("init_std_theta_rad", self.init_std_theta_rad)?;

        if self.inertial_offset.iter().any(|v| !v.is_finite()) {
            return Err(InvalidParam::new("inertial_offset", "all components must be finite"))
        }

        check_positive("max_step_dist_m", self.max_step_dist_m)?;
        check_positive("max_accel_ms2", self.max_accel_ms2)?;
        check_positive("max_gyro_rads", self.max_gyro_rads)
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    pub(crate) const LOC_TOML: &str = r#"
        mode = "Ekf"
        std_theta = 0.01
        std_v = 0.05
        std_d = 0.01
        std_accel_delta = 0.2
        std_vel_delta = 0.01
        std_gyro_delta = 0.02
        init_std_pos_m = 0.01
        init_std_vel_ms = 0.01
        init_std_theta_rad = 0.01
        inertial_offset = [0.0, 0.0, 0.0]
        max_step_dist_m = 1.0
        max_accel_ms2 = 20.0
        max_gyro_rads = 10.0
    "#;

    pub(crate) fn params() -> Params {
        util::params::from_str(LOC_TOML).unwrap()
    }

    #[test]
    fn test_validate() {
        let p = params();
        assert!(p.validate().is_ok());

        let mut bad = p.clone();
        bad.std_gyro_delta = 0.0;
        assert_eq!(bad.validate().unwrap_err().name, "std_gyro_delta");

        // Zero measurement noise is fine when the inertial sensor is not used
        bad.mode = EstimatorMode::OdometryOnly;
        assert!(bad.validate().is_ok());

        let mut bad = p;
        bad.inertial_offset[2] = f64::NAN;
        assert_eq!(bad.validate().unwrap_err().name, "inertial_offset");
    }
}
