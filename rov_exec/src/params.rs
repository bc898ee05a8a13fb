//! # Robot Executable Parameters
//!
//! This module provide parameters for the robot executable.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;

use crate::link::LinkParams;
use util::params::{check_positive, InvalidParam, Validate};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RovExecParams {

    /// Identifier sent to the operator on every connection
    pub robot_id: String,

    /// How the cycle activities are scheduled
    pub scheduling: Scheduling,

    /// Rate of the cooperative cycle, and of the communication activity.
    ///
    /// Units: Hertz
    pub cycle_rate_hz: f64,

    /// Rate of the sensing activity when running concurrently.
    ///
    /// Units: Hertz
    pub sensing_rate_hz: f64,

    /// Rate of the actuation activity when running concurrently.
    ///
    /// Units: Hertz
    pub actuation_rate_hz: f64,

    /// Reconnection policy of the operator link
    pub link: LinkParams,

    /// Write per-cycle archives into the session directory
    pub archive: bool
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Scheduling {
    /// One loop runs sense, estimate, communicate, decide and act back to back.
    Cooperative,

    /// Sensing, communication and actuation run in their own threads.
    MultiActivity
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl RovExecParams {
    pub fn cycle_period_s(&self) -> f64 {
        1.0 / self.cycle_rate_hz
    }
}

impl Validate for RovExecParams {
    fn validate(&self) -> Result<(), InvalidParam> {
        if self.robot_id.trim().is_empty() {
            return Err(InvalidParam::new("robot_id", "must not be empty"))
        }
        check_positive("cycle_rate_hz", self.cycle_rate_hz)?;
        check_positive("sensing_rate_hz", self.sensing_rate_hz)?;
        check_positive("actuation_rate_hz", self.actuation_rate_hz)?;
        self.link.validate()
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    pub(crate) const ROV_EXEC_TOML: &str = r#"
        robot_id = "ugv-01"
        scheduling = "Cooperative"
        cycle_rate_hz = 10.0
        sensing_rate_hz = 50.0
        actuation_rate_hz = 20.0
        archive = false

        [link]
        retry_budget = 5
        backoff_initial_s = 0.2
        backoff_max_s = 2.0
    "#;

    #[test]
    fn test_params() {
        let p: RovExecParams = util::params::from_str(ROV_EXEC_TOML).unwrap();
        assert!(p.validate().is_ok());
        assert_eq!(p.scheduling, Scheduling::Cooperative);
        assert!((p.cycle_period_s() - 0.1).abs() < 1e-12);

        let mut bad = p;
        bad.link.retry_budget = 0;
        assert_eq!(bad.validate().unwrap_err().name, "retry_budget");
    }
}
