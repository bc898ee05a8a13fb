//! Implementations for the LocMgr state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, warn};
use serde::Serialize;

// Internal
use super::{
    Ekf, EstimatorMode, EstimatorState, InertialSample, LocError, OdometryDelta, Params, Pose,
    VelocityEstimate
};
use crate::eqpt::SensorError;
use util::{
    archive::{Archived, Archiver},
    module::State,
    params::Validate,
    session::{self, Session}
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Localisation module state
#[derive(Default)]
pub struct LocMgr {
    params: Option<Params>,

    ekf: Option<Ekf>,

    pub(crate) report: StatusReport,

    output: OutputData,

    arch_estimate: Archiver
}

/// Input data to localisation.
///
/// A sensor which could not be read this cycle is `None`.
#[derive(Debug, Default, Clone, Copy)]
pub struct InputData {
    pub odom: Option<OdometryDelta>,
    pub inertial: Option<InertialSample>,

    /// Time since the previous step
    pub dt_s: f64
}

/// The estimate produced by one localisation step.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct OutputData {
    pub pose: Pose,
    pub velocity: VelocityEstimate
}

/// Status report for localisation processing.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct StatusReport {
    pub odom_rejected: bool,
    pub inertial_rejected: bool,
    pub predicted: bool,
    pub dead_reckoned: bool,
    pub updated: bool,
    pub numerical_fault: bool
}

/// One row of the estimate archive.
#[derive(Serialize)]
struct EstimateRecord {
    time_s: f64,
    x_m: f64,
    y_m: f64,
    vx_ms: f64,
    vy_ms: f64,
    theta_rad: f64,
    var_x: f64,
    var_y: f64,
    var_theta: f64,
    predicted: bool,
    updated: bool
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl LocMgr {
    /// The filter's full belief, or `None` before initialisation.
    pub fn estimator_state(&self) -> Option<&EstimatorState> {
        self.ekf.as_ref().map(|e| e.state())
    }

    /// The estimate from the most recent step.
    pub fn output(&self) -> OutputData {
        self.output
    }

    fn check_odometry(&self, params: &Params, odom: &OdometryDelta) -> Result<(), SensorError> {
        if !odom.is_finite() {
            return Err(SensorError::NonFinite("odometry"))
        }
        if odom.dist_m.abs() > params.max_step_dist_m {
            return Err(SensorError::OutOfRange {
                quantity: "odometry distance",
                value: odom.dist_m,
                limit: params.max_step_dist_m
            })
        }

        Ok(())
    }

    fn check_inertial(
        &self,
        params: &Params,
        sample: &InertialSample
    ) -> Result<(), SensorError> {
        if !sample.is_finite() {
            return Err(SensorError::NonFinite("inertial"))
        }

        let accel = sample.accel_x_ms2.abs().max(sample.accel_y_ms2.abs());
        if accel > params.max_accel_ms2 {
            return Err(SensorError::OutOfRange {
                quantity: "acceleration",
                value: accel,
                limit: params.max_accel_ms2
            })
        }
        if sample.gyro_z_rads.abs() > params.max_gyro_rads {
            return Err(SensorError::OutOfRange {
                quantity: "yaw rate",
                value: sample.gyro_z_rads,
                limit: params.max_gyro_rads
            })
        }

        Ok(())
    }
}

impl State for LocMgr {
    type InitData = Params;
    type InitError = LocError;

    type InputData = InputData;
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = LocError;

    /// Initialise the localisation module.
    ///
    /// The filter starts at the origin with the configured initial uncertainty.
    fn init(&mut self, init_data: Self::InitData, session: Option<&Session>)
        -> Result<(), Self::InitError>
    {
        init_data.validate().map_err(LocError::InvalidParams)?;

        let initial = EstimatorState::at_origin(
            init_data.init_std_pos_m,
            init_data.init_std_vel_ms,
            init_data.init_std_theta_rad
        );
        self.ekf = Some(Ekf::new(initial, init_data.noise_model()));

        if let Some(session) = session {
            self.arch_estimate = Archiver::from_path(session, "loc/estimate.csv")
                .map_err(|e| LocError::ArchiveInitError(e.to_string()))?;
        }

        debug!("Loc initialised in {:?} mode", init_data.mode);

        self.params = Some(init_data);
        self.output = OutputData::default();

        Ok(())
    }

    /// Run one estimator step.
    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>
    {
        let params = self.params.as_ref().ok_or(LocError::NotInitialised)?;

        let mut report = StatusReport::default();

        let odom = match input_data.odom {
            Some(o) => match self.check_odometry(params, &o) {
                Ok(()) => Some(o),
                Err(e) => {
                    warn!("Odometry rejected: {}", e);
                    report.odom_rejected = true;
                    None
                }
            },
            None => None
        };

        let inertial = match (params.mode, input_data.inertial) {
            (EstimatorMode::Ekf, Some(i)) => {
                let i = i.minus_offset(&params.inertial_offset);
                match self.check_inertial(params, &i) {
                    Ok(()) => Some(i),
                    Err(e) => {
                        warn!("Inertial sample rejected: {}", e);
                        report.inertial_rejected = true;
                        None
                    }
                }
            },
            _ => None
        };

        let ekf = self.ekf.as_mut().ok_or(LocError::NotInitialised)?;
        let (pose, velocity, step) = ekf.predict_and_update(odom, inertial, input_data.dt_s);

        if let Some(fault) = step.fault {
            warn!("Estimator step degraded: {}", fault);
            report.numerical_fault = true;
        }

        report.predicted = step.predicted;
        report.dead_reckoned = step.dead_reckoned;
        report.updated = step.updated;

        self.report = report;
        self.output = OutputData { pose, velocity };

        Ok((self.output, report))
    }
}

impl Archived for LocMgr {
    fn write(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if !self.arch_estimate.is_enabled() {
            return Ok(())
        }

        let state = match self.ekf {
            Some(ref e) => e.state(),
            None => return Ok(())
        };

        let record = EstimateRecord {
            time_s: session::try_get_elapsed_seconds().unwrap_or(0.0),
            x_m: state.x[0],
            y_m: state.x[1],
            vx_ms: state.x[2],
            vy_ms: state.x[3],
            theta_rad: state.x[4],
            var_x: state.p[(0, 0)],
            var_y: state.p[(1, 1)],
            var_theta: state.p[(4, 4)],
            predicted: self.report.predicted,
            updated: self.report.updated
        };

        self.arch_estimate.serialise(record)
    }
}
