//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{atomic::{AtomicBool, Ordering}, Arc, Mutex}
};

use comms_if::op::{PeerMsg, TelemetryRecord};
use rov_lib::{
    eqpt::{Drive, DriveError, SensorError, Sensors, TurnDirection},
    link::LinkParams,
    loc::{self, InertialSample, LocMgr, OdometryDelta},
    nav_ctrl::{self, NavCtrl},
    op_client::{Channel, OpClientError},
    sim_robot::SimRobotParams
};
use util::module::State;

/// Everything the robot did, in the order it did it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    Exchange { ok: bool },
    Reconnect { ok: bool },
    Close { ack: bool },
    Drive(f64),
    Turn(TurnDirection),
    Stop
}

pub type EventLog = Arc<Mutex<Vec<Event>>>;

/// A channel which replays scripted replies, repeating `default_reply` once they run out.
///
/// A `None` reply fails the exchange.
pub struct MockChannel {
    pub replies: VecDeque<Option<PeerMsg>>,
    pub reconnects: VecDeque<bool>,
    pub default_reply: PeerMsg,
    pub log: EventLog
}

/// Wraps a drive, recording every command.
pub struct RecordingDrive<D: Drive> {
    pub inner: D,
    pub log: EventLog,

    /// Reject every drive command, turns and stops still succeed
    pub fail_drive: bool
}

/// Which sensors of a [`FaultySensors`] fail, switchable while the robot runs.
#[derive(Debug, Default)]
pub struct SensorFaults {
    pub odom: AtomicBool,
    pub inertial: AtomicBool
}

/// Wraps some sensors, failing reads on demand.
///
/// A failed read still consumes the inner reading so the simulated world keeps moving.
pub struct FaultySensors<S: Sensors> {
    pub inner: S,
    pub faults: Arc<SensorFaults>,
    pub failed_reads: u64
}

impl MockChannel {
    pub fn new(replies: Vec<Option<PeerMsg>>, log: &EventLog) -> Self {
        Self {
            replies: replies.into(),
            reconnects: VecDeque::new(),
            default_reply: PeerMsg::Ack,
            log: log.clone()
        }
    }

    fn push(&self, e: Event) {
        self.log.lock().unwrap().push(e);
    }
}

impl Channel for MockChannel {
    fn exchange(&mut self, _record: &TelemetryRecord) -> Result<PeerMsg, OpClientError> {
        let reply = self.replies.pop_front().unwrap_or(Some(self.default_reply));
        self.push(Event::Exchange { ok: reply.is_some() });
        reply.ok_or(OpClientError::NotConnected)
    }

    fn reconnect(&mut self) -> Result<(), OpClientError> {
        let ok = self.reconnects.pop_front().unwrap_or(true);
        self.push(Event::Reconnect { ok });
        match ok {
            true => Ok(()),
            false => Err(OpClientError::NotConnected)
        }
    }

    fn close(&mut self, ack: bool) {
        self.push(Event::Close { ack });
    }
}

impl<D: Drive> RecordingDrive<D> {
    pub fn new(inner: D, log: &EventLog) -> Self {
        Self {
            inner,
            log: log.clone(),
            fail_drive: false
        }
    }

    fn push(&self, e: Event) {
        self.log.lock().unwrap().push(e);
    }
}

impl<D: Drive> Drive for RecordingDrive<D> {
    fn command_turn(&mut self, dir: TurnDirection, speed_ms: f64) -> Result<(), DriveError> {
        self.push(Event::Turn(dir));
        self.inner.command_turn(dir, speed_ms)
    }

    fn command_drive(&mut self, speed_ms: f64) -> Result<(), DriveError> {
        self.push(Event::Drive(speed_ms));
        if self.fail_drive {
            return Err(DriveError::CommandFailed("motor controller fault".into()))
        }
        self.inner.command_drive(speed_ms)
    }

    fn command_stop(&mut self) -> Result<(), DriveError> {
        self.push(Event::Stop);
        self.inner.command_stop()
    }
}

impl<S: Sensors> FaultySensors<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            faults: Arc::new(SensorFaults::default()),
            failed_reads: 0
        }
    }

    fn fail<T>(&mut self, flag: &AtomicBool, reading: Result<T, SensorError>, name: &'static str)
        -> Result<T, SensorError>
    {
        match flag.load(Ordering::Relaxed) {
            true => {
                self.failed_reads += 1;
                Err(SensorError::NotAvailable(name, "injected fault".into()))
            },
            false => reading
        }
    }
}

impl<S: Sensors> Sensors for FaultySensors<S> {
    fn read_odometry_delta(&mut self) -> Result<OdometryDelta, SensorError> {
        let reading = self.inner.read_odometry_delta();
        let faults = self.faults.clone();
        self.fail(&faults.odom, reading, "odometry")
    }

    fn read_inertial_sample(&mut self) -> Result<InertialSample, SensorError> {
        let reading = self.inner.read_inertial_sample();
        let faults = self.faults.clone();
        self.fail(&faults.inertial, reading, "inertial")
    }

    fn read_auxiliary(&mut self) -> Result<Vec<f64>, SensorError> {
        self.inner.read_auxiliary()
    }
}

pub fn events(log: &EventLog) -> Vec<Event> {
    log.lock().unwrap().clone()
}

pub fn position(events: &[Event], pred: impl Fn(&Event) -> bool) -> Option<usize> {
    events.iter().position(pred)
}

/// The last command sent to the drive.
pub fn last_drive_event(events: &[Event]) -> Option<Event> {
    events.iter()
        .rev()
        .find(|e| matches!(e, Event::Drive(_) | Event::Turn(_) | Event::Stop))
        .copied()
}

pub fn goal(vx_ms: f64, vy_ms: f64) -> Option<PeerMsg> {
    Some(PeerMsg::Goal { vx_ms, vy_ms })
}

pub fn loc() -> LocMgr {
    let params: loc::Params = util::params::from_str(r#"
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
        max_step_dist_m = 5.0
        max_accel_ms2 = 200.0
        max_gyro_rads = 10.0
    "#).unwrap();

    let mut loc = LocMgr::default();
    loc.init(params, None).unwrap();
    loc
}

pub fn nav_ctrl_params() -> nav_ctrl::Params {
    util::params::from_str(r#"
        angle_margin_rad = 0.05
        turn_speed_ms = 0.3
        min_speed_ms = 0.0
        max_speed_ms = 20.0
    "#).unwrap()
}

pub fn nav_ctrl() -> NavCtrl {
    let mut nav_ctrl = NavCtrl::default();
    nav_ctrl.init(nav_ctrl_params(), None).unwrap();
    nav_ctrl
}

pub fn link_params(retry_budget: u32) -> LinkParams {
    LinkParams {
        retry_budget,
        backoff_initial_s: 0.1,
        backoff_max_s: 1.0
    }
}

pub fn sim_params(fixed_step_s: Option<f64>) -> SimRobotParams {
    SimRobotParams {
        track_width_m: 0.5,
        fixed_step_s,
        odom_scale_error: 0.0,
        gyro_bias_rads: 0.0,
        aux_readings: vec![3.3]
    }
}
