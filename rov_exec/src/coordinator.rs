//! # Cycle Coordinator
//!
//! Runs one cooperative cycle of the robot: acquire the sensors, run the estimator, exchange
//! telemetry for operator commands, run the controller and issue the result to the drive.
//!
//! Whenever the operator link is lost the drive is commanded to stop in the same cycle, before
//! the link is allowed to attempt a reconnection on a later cycle.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::time::{Duration, Instant};
use chrono::Utc;
use log::{debug, error, info, warn};

use crate::{
    data_store::{DataStore, SafeModeCause},
    eqpt::{apply_intent, ActuationIntent, Drive, DriveError, Sensors, SpeedLimits},
    link::{ChannelLink, Exchange, LinkError},
    loc::{self, LocError},
    nav_ctrl::{self, GoalVelocity, NavCtrlError},
    op_client::Channel
};
use comms_if::op::{PeerMsg, TelemetryRecord};
use util::{archive::Archived, module::State};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Consecutive cycles with no odometry or inertial reading before the fault is escalated in the
/// log.
pub const SENSOR_FAULT_WARN_LIMIT: u64 = 10;

/// Consecutive overrunning cycles before the overrun is escalated in the log.
pub const CYCLE_OVERRUN_WARN_LIMIT: u64 = 10;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct Coordinator<S: Sensors, D: Drive, C: Channel> {
    sensors: S,
    drive: D,
    link: ChannelLink<C>,

    ds: DataStore,

    limits: SpeedLimits,

    cycle_rate_hz: f64,

    archive: bool,

    last_cycle: Option<Instant>
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Keep cycling
    Continue,

    /// The operator terminated the robot, which is now stopped with the channel closed.
    Terminated
}

#[derive(Debug, thiserror::Error)]
pub enum CoordError {
    #[error("Operator link failed: {0}")]
    Link(LinkError),

    #[error("Localisation error: {0}")]
    Loc(LocError),

    #[error("Navigation control error: {0}")]
    NavCtrl(NavCtrlError),

    #[error("Drive error: {0}")]
    Drive(DriveError),

    #[error("The {0} activity panicked")]
    ActivityPanicked(&'static str),

    #[error("The {0} activity could not be started")]
    ActivityNotStarted(&'static str)
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<S: Sensors, D: Drive, C: Channel> Coordinator<S, D, C> {
    /// Create a new coordinator.
    ///
    /// `loc` and `nav_ctrl` must already be initialised.
    pub fn new(
        sensors: S,
        drive: D,
        link: ChannelLink<C>,
        loc: loc::LocMgr,
        nav_ctrl: nav_ctrl::NavCtrl,
        limits: SpeedLimits,
        cycle_rate_hz: f64,
        archive: bool
    ) -> Self {
        let ds = DataStore {
            loc,
            nav_ctrl,
            ..Default::default()
        };

        Self {
            sensors,
            drive,
            link,
            ds,
            limits,
            cycle_rate_hz,
            archive,
            last_cycle: None
        }
    }

    pub fn data_store(&self) -> &DataStore {
        &self.ds
    }

    pub fn link(&self) -> &ChannelLink<C> {
        &self.link
    }

    pub fn drive(&self) -> &D {
        &self.drive
    }

    pub fn sensors(&self) -> &S {
        &self.sensors
    }

    /// Run one cycle timed by the wall clock.
    pub fn run_cycle(&mut self) -> Result<CycleOutcome, CoordError> {
        self.run_cycle_at(Instant::now())
    }

    /// Run one cycle as if it started at `now`.
    ///
    /// The estimator time step is the time since the previous cycle, or the nominal cycle
    /// period on the first cycle. Any error is fatal: the drive is stopped and the channel closed
    /// before it is returned.
    pub fn run_cycle_at(&mut self, now: Instant) -> Result<CycleOutcome, CoordError> {
        let result = self.cycle(now);

        if let Err(ref e) = result {
            error!("Fatal cycle error: {}", e);
            self.shutdown();
        }

        result
    }

    fn cycle(&mut self, now: Instant) -> Result<CycleOutcome, CoordError> {
        self.ds.cycle_start(self.cycle_rate_hz);

        let dt_s = match self.last_cycle {
            Some(last) => now.saturating_duration_since(last).as_secs_f64(),
            None => 1.0 / self.cycle_rate_hz
        };
        self.last_cycle = Some(now);

        // ---- SENSING ----

        self.sense(dt_s);

        // ---- LOCALISATION ----

        let (loc_output, loc_report) = self.ds.loc.proc(&self.ds.loc_input)
            .map_err(CoordError::Loc)?;
        self.ds.loc_output = loc_output;
        self.ds.loc_status_rpt = loc_report;

        // ---- OPERATOR EXCHANGE ----

        let record = TelemetryRecord {
            cycle: self.ds.num_cycles,
            timestamp: Utc::now(),
            pose: loc_output.pose,
            velocity: loc_output.velocity,
            aux: self.ds.aux.clone(),
            ctrl_state: self.ds.nav_ctrl.ctrl_state(),
            safe: self.ds.safe
        };

        match self.link.exchange(&record, now) {
            Ok(Exchange::Reply(PeerMsg::Goal { vx_ms, vy_ms })) => {
                self.ds.make_unsafe(SafeModeCause::LinkDown).ok();
                self.ds.goal = GoalVelocity { vx_ms, vy_ms };
                debug!("New goal: {:?}", self.ds.goal);
            },
            Ok(Exchange::Reply(PeerMsg::Ack)) => {
                self.ds.make_unsafe(SafeModeCause::LinkDown).ok();
            },
            Ok(Exchange::Reply(PeerMsg::Terminate)) => {
                info!("Terminate recieved from the operator");
                self.ds.make_safe(SafeModeCause::Terminated);
                self.halt();
                self.link.close(true);
                self.ds.num_cycles += 1;
                return Ok(CycleOutcome::Terminated)
            },
            Ok(Exchange::LinkLost(_)) => {
                self.ds.make_safe(SafeModeCause::LinkDown);
                self.drive.command_stop().map_err(CoordError::Drive)?;
            },
            Ok(Exchange::Down) => (),
            Err(e) => return Err(CoordError::Link(e))
        }

        // ---- NAVIGATION CONTROL ----

        let nav_ctrl_input = nav_ctrl::InputData {
            goal: self.ds.goal,
            pose: loc_output.pose
        };
        let (intent, nav_ctrl_report) = self.ds.nav_ctrl.proc(&nav_ctrl_input)
            .map_err(CoordError::NavCtrl)?;
        self.ds.nav_ctrl_status_rpt = nav_ctrl_report;

        // Safe mode holds the drive stopped whatever the controller wants
        self.ds.nav_ctrl_output = match self.ds.safe {
            true => ActuationIntent::Stop,
            false => intent
        };

        // ---- ACTUATION ----

        apply_intent(&mut self.drive, self.ds.nav_ctrl_output, &self.limits)
            .map_err(CoordError::Drive)?;

        // ---- ARCHIVING ----

        if self.archive {
            if let Err(e) = self.ds.loc.write() {
                warn!("Could not archive the estimate: {}", e);
            }
            if let Err(e) = self.ds.nav_ctrl.write() {
                warn!("Could not archive the controller status: {}", e);
            }
        }

        if self.ds.is_1_hz_cycle {
            info!(
                "Pose ({:.3}, {:.3}, {:.3}), {:?}, safe: {}",
                loc_output.pose.x_m,
                loc_output.pose.y_m,
                loc_output.pose.theta_rad,
                nav_ctrl_report.ctrl_state,
                self.ds.safe
            );
        }

        self.ds.num_cycles += 1;

        Ok(CycleOutcome::Continue)
    }

    /// Stop the drive and close the channel.
    fn shutdown(&mut self) {
        self.halt();
        self.link.close(false);
    }

    /// Record the time a cycle took, returning the time left until the next cycle should start,
    /// or `None` if the cycle overran.
    pub fn cycle_end(&mut self, cycle_dur: Duration) -> Option<Duration> {
        let period = Duration::from_secs_f64(1.0 / self.cycle_rate_hz);

        match period.checked_sub(cycle_dur) {
            Some(d) => {
                self.ds.num_consec_cycle_overruns = 0;
                Some(d)
            },
            None => {
                warn!(
                    "Cycle overran by {:.06} s",
                    cycle_dur.as_secs_f64() - period.as_secs_f64()
                );
                self.ds.num_consec_cycle_overruns += 1;
                if self.ds.num_consec_cycle_overruns == CYCLE_OVERRUN_WARN_LIMIT {
                    error!(
                        "{} consecutive cycle overruns, the cycle rate cannot be held",
                        CYCLE_OVERRUN_WARN_LIMIT
                    );
                }
                None
            }
        }
    }

    /// Read every sensor into the data store, dropping any that fail.
    fn sense(&mut self, dt_s: f64) {
        let odom = match self.sensors.read_odometry_delta() {
            Ok(o) => Some(o),
            Err(e) => {
                warn!("Could not read odometry: {}", e);
                None
            }
        };

        let inertial = match self.sensors.read_inertial_sample() {
            Ok(i) => Some(i),
            Err(e) => {
                warn!("Could not read the inertial sensor: {}", e);
                None
            }
        };

        match self.sensors.read_auxiliary() {
            Ok(a) => self.ds.aux = a,
            Err(e) => warn!("Could not read the auxiliary sensors: {}", e)
        }

        if odom.is_none() && inertial.is_none() {
            self.ds.num_consec_sensor_faults += 1;
            if self.ds.num_consec_sensor_faults == SENSOR_FAULT_WARN_LIMIT {
                error!(
                    "No odometry or inertial reading for {} consecutive cycles",
                    SENSOR_FAULT_WARN_LIMIT
                );
            }
        }
        else {
            self.ds.num_consec_sensor_faults = 0;
        }

        self.ds.loc_input = loc::InputData {
            odom,
            inertial,
            dt_s
        };
    }

    /// Command a stop, logging rather than returning any failure.
    fn halt(&mut self) {
        if let Err(e) = self.drive.command_stop() {
            error!("Could not stop the drive: {}", e);
        }
    }
}

impl From<LinkError> for CoordError {
    fn from(e: LinkError) -> Self {
        CoordError::Link(e)
    }
}
