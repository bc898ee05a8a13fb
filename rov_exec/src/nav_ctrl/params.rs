//! Parameters structure for NavCtrl

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;
use util::params::{check_non_negative, check_positive, InvalidParam, Validate};

use crate::eqpt::SpeedLimits;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for navigation control.
#[derive(Debug, Clone, Deserialize)]
pub struct Params {

    // ---- ALIGNMENT ----

    /// Heading error above which the robot turns on the spot rather than driving.
    ///
    /// Units: radians
    pub angle_margin_rad: f64,

    /// Heading error needed to go back to turning once driving.
    ///
    /// Set this larger than `angle_margin_rad` to stop the controller switching back and forth
    /// when the error sits on the margin. When unset `angle_margin_rad` is used.
    ///
    /// Units: radians
    #[serde(default)]
    pub realign_margin_rad: Option<f64>,

    // ---- SPEEDS ----

    /// Speed of the turn-on-the-spot manouvre.
    ///
    /// Units: meters/second
    pub turn_speed_ms: f64,

    /// Units: meters/second
    pub min_speed_ms: f64,

    /// Units: meters/second
    pub max_speed_ms: f64
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Params {
    pub fn speed_limits(&self) -> SpeedLimits {
        SpeedLimits {
            min_speed_ms: self.min_speed_ms,
            max_speed_ms: self.max_speed_ms
        }
    }
}

impl Validate for Params {
    fn validate(&self) -> Result<(), InvalidParam> {
        check_positive("angle_margin_rad", self.angle_margin_rad)?;
        if self.angle_margin_rad >= std::f64::consts::PI {
            return Err(InvalidParam::new("angle_margin_rad", "must be less than pi"))
        }

        if let Some(realign) = self.realign_margin_rad {
            if !(realign >= self.angle_margin_rad && realign < std::f64::consts::PI) {
                return Err(InvalidParam::new(
                    "realign_margin_rad",
                    "must be between angle_margin_rad and pi"
                ))
            }
        }

        check_non_negative("min_speed_ms", self.min_speed_ms)?;
        check_positive("max_speed_ms", self.max_speed_ms)?;
        if self.min_speed_ms > self.max_speed_ms {
            return Err(InvalidParam::new("min_speed_ms", "must not exceed max_speed_ms"))
        }

        check_positive("turn_speed_ms", self.turn_speed_ms)?;
        if self.turn_speed_ms > self.max_speed_ms {
            return Err(InvalidParam::new("turn_speed_ms", "must not exceed max_speed_ms"))
        }

        Ok(())
    }
}
