//! Implementations for the NavCtrl state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, trace};
use serde::Serialize;

// Internal
use super::{decompose, ControllerState, DesiredMotion, GoalVelocity, NavCtrlError, Params};
use crate::{eqpt::ActuationIntent, loc::Pose};
use util::{
    archive::{Archived, Archiver},
    maths::ang_dist,
    module::State,
    params::Validate,
    session::{self, Session}
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Navigation control module state
#[derive(Default)]
pub struct NavCtrl {
    params: Option<Params>,

    ctrl_state: ControllerState,

    pub(crate) report: StatusReport,
    arch_status: Archiver
}

/// Input data to navigation control.
#[derive(Debug, Default, Clone, Copy)]
pub struct InputData {
    pub goal: GoalVelocity,

    /// The pose estimate from this cycle
    pub pose: Pose
}

/// Status report for navigation control processing.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct StatusReport {
    pub ctrl_state: ControllerState,
    pub desired: DesiredMotion,
    pub heading_error_rad: f64,
    pub intent: ActuationIntent
}

/// One row of the status archive.
#[derive(Serialize)]
struct StatusRecord {
    time_s: f64,
    ctrl_state: ControllerState,
    desired_heading_rad: f64,
    desired_speed_ms: f64,
    heading_error_rad: f64,
    intent: String
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl NavCtrl {
    pub fn ctrl_state(&self) -> ControllerState {
        self.ctrl_state
    }

    /// Evaluate the heading-then-drive state machine for one cycle.
    ///
    /// The new state depends only on the inputs and, when a realign margin is configured,
    /// on whether the robot was already driving.
    pub fn step(
        &mut self,
        current_heading_rad: f64,
        desired: &DesiredMotion
    ) -> Result<(ControllerState, ActuationIntent, f64), NavCtrlError> {
        let params = self.params.as_ref().ok_or(NavCtrlError::NotInitialised)?;

        let error_rad = ang_dist(current_heading_rad, desired.heading_rad);

        let margin = match (self.ctrl_state, params.realign_margin_rad) {
            (ControllerState::Driving, Some(m)) => m,
            _ => params.angle_margin_rad
        };

        let (state, intent) = if desired.speed_ms == 0.0 {
            (ControllerState::Stopped, ActuationIntent::Stop)
        }
        else if error_rad.abs() > margin {
            let speed_ms = params.turn_speed_ms;
            let intent = if error_rad > 0.0 {
                ActuationIntent::TurnLeft { speed_ms }
            }
            else {
                ActuationIntent::TurnRight { speed_ms }
            };
            (ControllerState::Aligning, intent)
        }
        else {
            (ControllerState::Driving, ActuationIntent::Drive { speed_ms: desired.speed_ms })
        };

        if state != self.ctrl_state {
            debug!("NavCtrl {:?} -> {:?} (error {:.4} rad)", self.ctrl_state, state, error_rad);
        }
        self.ctrl_state = state;

        Ok((state, intent, error_rad))
    }
}

impl State for NavCtrl {
    type InitData = Params;
    type InitError = NavCtrlError;

    type InputData = InputData;
    type OutputData = ActuationIntent;
    type StatusReport = StatusReport;
    type ProcError = NavCtrlError;

    /// Initialise the NavCtrl module.
    ///
    /// The controller always starts stopped.
    fn init(&mut self, init_data: Self::InitData, session: Option<&Session>)
        -> Result<(), Self::InitError>
    {
        init_data.validate().map_err(NavCtrlError::InvalidParams)?;

        if let Some(session) = session {
            self.arch_status = Archiver::from_path(session, "nav_ctrl/status.csv")
                .map_err(|e| NavCtrlError::ArchiveInitError(e.to_string()))?;
        }

        self.params = Some(init_data);
        self.ctrl_state = ControllerState::Stopped;
        self.report = StatusReport::default();

        Ok(())
    }

    /// Decompose the goal and run the controller.
    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>
    {
        let max_speed_ms = self.params.as_ref()
            .ok_or(NavCtrlError::NotInitialised)?
            .max_speed_ms;

        let current_heading_rad = input_data.pose.theta_rad;
        let desired = decompose(&input_data.goal, current_heading_rad, max_speed_ms);

        let (ctrl_state, intent, heading_error_rad) = self.step(current_heading_rad, &desired)?;

        trace!("NavCtrl: desired {:?}, intent {:?}", desired, intent);

        self.report = StatusReport {
            ctrl_state,
            desired,
            heading_error_rad,
            intent
        };

        Ok((intent, self.report))
    }
}

impl Archived for NavCtrl {
    fn write(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if !self.arch_status.is_enabled() {
            return Ok(())
        }

        let record = StatusRecord {
            time_s: session::try_get_elapsed_seconds().unwrap_or(0.0),
            ctrl_state: self.report.ctrl_state,
            desired_heading_rad: self.report.desired.heading_rad,
            desired_speed_ms: self.report.desired.speed_ms,
            heading_error_rad: self.report.heading_error_rad,
            intent: format!("{:?}", self.report.intent)
        };

        self.arch_status.serialise(record)
    }
}
