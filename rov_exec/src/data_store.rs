//! # Data Store
//!
//! Per-cycle data of the cooperative coordinator.

use log::{info, warn};

use crate::{
    eqpt::ActuationIntent,
    loc,
    nav_ctrl::{self, GoalVelocity}
};

// ---------------------------------------------------------------------------
// ENUMS
// ---------------------------------------------------------------------------

/// Gives the reason the robot has been put into safe mode
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum SafeModeCause {
    /// The operator link is down
    LinkDown,

    /// The robot has been terminated
    Terminated
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Global data store for the executable.
#[derive(Default)]
pub struct DataStore {
    // Cycle management
    /// Number of cycles already executed
    pub num_cycles: u64,

    /// True if this cycle falls on a 1Hz boundary
    pub is_1_hz_cycle: bool,

    // Safe mode variables
    /// Determines if the robot is in safe mode, holding itself stopped.
    pub safe: bool,

    /// Gives the reason for the robot being in safe mode.
    pub safe_cause: Option<SafeModeCause>,

    // Operator
    /// Latest goal from the operator, zero until the first goal arrives
    pub goal: GoalVelocity,

    /// Auxiliary sensor readings from this cycle
    pub aux: Vec<f64>,

    // Loc
    pub loc: loc::LocMgr,
    pub loc_input: loc::InputData,
    pub loc_output: loc::OutputData,
    pub loc_status_rpt: loc::StatusReport,

    // NavCtrl
    pub nav_ctrl: nav_ctrl::NavCtrl,
    pub nav_ctrl_output: ActuationIntent,
    pub nav_ctrl_status_rpt: nav_ctrl::StatusReport,

    // Monitoring Counters
    /// Number of consecutive cycle overruns
    pub num_consec_cycle_overruns: u64,

    /// Number of consecutive cycles in which no sensor could be read
    pub num_consec_sensor_faults: u64
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl DataStore {
    /// Puts the robot into safe mode with the given cause.
    ///
    /// The goal is cleared so the robot does not resume moving until the operator sends a new
    /// one.
    pub fn make_safe(&mut self, cause: SafeModeCause) {
        if !self.safe {
            warn!("Make safe requested, cause: {:?}", cause);
            self.safe = true;
            self.safe_cause = Some(cause);
        }

        self.goal = GoalVelocity::default();
    }

    /// Attempts to disable the safe mode by clearing the given cause.
    ///
    /// Returns `Ok(())` if this cause was cleared and safe mode was disabled, or `Err(())`
    /// otherwise. To remove safe mode the provided cause must match the initial reason for safe
    /// mode being enabled.
    ///
    /// If safe mode was not enabled `Ok(())` is returned
    pub fn make_unsafe(&mut self, cause: SafeModeCause) -> Result<(), ()> {
        if !self.safe {
            return Ok(());
        }

        match self.safe_cause {
            Some(root_cause) if root_cause == cause => {
                self.safe = false;
                self.safe_cause = None;
                info!("Make unsafe requested, root cause match, safe mode disabled");
                Ok(())
            },
            Some(_) => Err(()),
            None => Ok(())
        }
    }

    /// Perform actions required at the start of a cycle.
    ///
    /// Clears those items that need clearing at the start of a cycle, and sets the 1Hz cycle flag.
    pub fn cycle_start(&mut self, cycle_frequency_hz: f64) {
        let cycles_per_s = (cycle_frequency_hz.round() as u64).max(1);
        self.is_1_hz_cycle = self.num_cycles % cycles_per_s == 0;

        self.loc_input = loc::InputData::default();
        self.nav_ctrl_output = ActuationIntent::Stop;
        self.aux.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_safe_mode() {
        let mut ds = DataStore::default();
        ds.goal = GoalVelocity { vx_ms: 1.0, vy_ms: 0.0 };

        ds.make_safe(SafeModeCause::LinkDown);
        assert!(ds.safe);
        assert!(ds.goal.is_zero());

        // A different cause cannot clear safe mode
        assert!(ds.make_unsafe(SafeModeCause::Terminated).is_err());
        assert!(ds.safe);

        assert!(ds.make_unsafe(SafeModeCause::LinkDown).is_ok());
        assert!(!ds.safe);
        assert!(ds.make_unsafe(SafeModeCause::LinkDown).is_ok());
    }

    #[test]
    fn test_1_hz_cycle() {
        let mut ds = DataStore::default();
        let mut flags = vec![];
        for _ in 0..21 {
            ds.cycle_start(10.0);
            flags.push(ds.is_1_hz_cycle);
            ds.num_cycles += 1;
        }
        assert_eq!(flags.iter().filter(|f| **f).count(), 3);
        assert!(flags[0] && flags[10] && flags[20]);
    }
}
