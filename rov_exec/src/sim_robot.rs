//! # Simulated robot
//!
//! A differential drive robot on a flat plane, providing the [`Sensors`] and [`Drive`]
//! interfaces so the executable can be run without hardware. It is to be used for testing and
//! development rather than actual driving of the robot.
//!
//! The sensor and drive halves share one simulated world behind a mutex. The world is advanced
//! every time odometry is read, either by the wall clock time since the last read or by a fixed
//! step.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{sync::{Arc, Mutex, MutexGuard}, time::Instant};
use log::trace;
use serde::Deserialize;

use crate::{
    eqpt::{Drive, DriveError, Sensors, SensorError, TurnDirection},
    loc::{InertialSample, OdometryDelta, Pose}
};
use util::{maths::wrap_pi, params::{check_positive, InvalidParam, Validate}};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters of the simulated robot.
#[derive(Debug, Clone, Deserialize)]
pub struct SimRobotParams {
    /// Distance between the left and right wheels.
    ///
    /// Units: meters
    pub track_width_m: f64,

    /// If set the world advances by this much on every odometry read, otherwise by the wall
    /// clock time since the previous read.
    ///
    /// Units: seconds
    #[serde(default)]
    pub fixed_step_s: Option<f64>,

    /// Fractional error of the wheel encoders, 0.01 reports 1% more distance than travelled.
    #[serde(default)]
    pub odom_scale_error: f64,

    /// Constant bias on the gyro.
    ///
    /// Units: radians/second
    #[serde(default)]
    pub gyro_bias_rads: f64,

    /// Constant readings of the auxiliary sensors.
    #[serde(default)]
    pub aux_readings: Vec<f64>
}

/// Handle onto the simulated world, used to inspect the true state.
#[derive(Clone)]
pub struct SimRobot {
    world: Arc<Mutex<World>>
}

/// The sensor half of the simulated robot.
pub struct SimSensors {
    world: Arc<Mutex<World>>
}

/// The drive half of the simulated robot.
pub struct SimDrive {
    world: Arc<Mutex<World>>
}

struct World {
    params: SimRobotParams,

    pose: Pose,

    /// Forward speed in the body frame
    speed_ms: f64,

    yaw_rate_rads: f64,

    cmd: Cmd,

    /// Encoder increments since the last odometry read
    odom_accum: OdometryDelta,

    last_inertial: InertialSample,

    last_advance: Option<Instant>,

    num_cmds: u64
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
enum Cmd {
    Stop,
    Drive(f64),
    Turn(TurnDirection, f64)
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimRobot {
    /// Create a new simulated robot at the origin, returning the handle and the two equipment
    /// halves.
    pub fn new(params: SimRobotParams) -> (Self, SimSensors, SimDrive) {
        let world = Arc::new(Mutex::new(World {
            params,
            pose: Pose::default(),
            speed_ms: 0.0,
            yaw_rate_rads: 0.0,
            cmd: Cmd::Stop,
            odom_accum: OdometryDelta::default(),
            last_inertial: InertialSample::default(),
            last_advance: None,
            num_cmds: 0
        }));

        (
            Self { world: world.clone() },
            SimSensors { world: world.clone() },
            SimDrive { world }
        )
    }

    /// The true pose of the robot, or `None` if the world has been poisoned.
    pub fn true_pose(&self) -> Option<Pose> {
        self.world.lock().ok().map(|w| w.pose)
    }

    /// Number of drive commands received so far.
    pub fn num_cmds(&self) -> u64 {
        self.world.lock().map(|w| w.num_cmds).unwrap_or(0)
    }
}

impl World {
    /// Advance the world by `dt_s` under the current command.
    fn advance(&mut self, dt_s: f64) {
        if dt_s <= 0.0 {
            return
        }

        let (speed_ms, yaw_rate_rads) = match self.cmd {
            Cmd::Stop => (0.0, 0.0),
            Cmd::Drive(s) => (s, 0.0),
            Cmd::Turn(TurnDirection::Left, s) => (0.0, 2.0 * s / self.params.track_width_m),
            Cmd::Turn(TurnDirection::Right, s) => (0.0, -2.0 * s / self.params.track_width_m)
        };

        // Velocity changes are instantaneous at the start of the step, which shows up as an
        // acceleration along the body X axis.
        self.last_inertial = InertialSample {
            accel_x_ms2: (speed_ms - self.speed_ms) / dt_s,
            accel_y_ms2: speed_ms * yaw_rate_rads,
            gyro_z_rads: yaw_rate_rads + self.params.gyro_bias_rads
        };
        self.speed_ms = speed_ms;
        self.yaw_rate_rads = yaw_rate_rads;

        let dist_m = speed_ms * dt_s;
        let dtheta_rad = yaw_rate_rads * dt_s;
        let heading_rad = self.pose.theta_rad + dtheta_rad;

        self.pose = Pose {
            x_m: self.pose.x_m + dist_m * heading_rad.cos(),
            y_m: self.pose.y_m + dist_m * heading_rad.sin(),
            theta_rad: wrap_pi(heading_rad)
        };

        self.odom_accum.dist_m += dist_m * (1.0 + self.params.odom_scale_error);
        self.odom_accum.heading_rad += dtheta_rad;
    }

    fn step_dt(&mut self) -> f64 {
        let now = Instant::now();
        let dt_s = match (self.params.fixed_step_s, self.last_advance) {
            (Some(s), _) => s,
            (None, Some(last)) => now.duration_since(last).as_secs_f64(),
            (None, None) => 0.0
        };
        self.last_advance = Some(now);
        dt_s
    }

    fn set_cmd(&mut self, cmd: Cmd) {
        if cmd != self.cmd {
            trace!("SimRobot command {:?}", cmd);
        }
        self.cmd = cmd;
        self.num_cmds += 1;
    }
}

impl SimSensors {
    fn world(&self) -> Result<MutexGuard<World>, SensorError> {
        self.world.lock()
            .map_err(|_| SensorError::NotAvailable("sim", "world mutex poisoned".into()))
    }
}

impl Sensors for SimSensors {
    fn read_odometry_delta(&mut self) -> Result<OdometryDelta, SensorError> {
        let mut world = self.world()?;
        let dt_s = world.step_dt();
        world.advance(dt_s);

        Ok(std::mem::take(&mut world.odom_accum))
    }

    fn read_inertial_sample(&mut self) -> Result<InertialSample, SensorError> {
        Ok(self.world()?.last_inertial)
    }

    fn read_auxiliary(&mut self) -> Result<Vec<f64>, SensorError> {
        Ok(self.world()?.params.aux_readings.clone())
    }
}

impl SimDrive {
    fn set_cmd(&mut self, cmd: Cmd) -> Result<(), DriveError> {
        self.world.lock()
            .map_err(|_| DriveError::CommandFailed("sim world mutex poisoned".into()))?
            .set_cmd(cmd);
        Ok(())
    }
}

impl Drive for SimDrive {
    fn command_turn(&mut self, dir: TurnDirection, speed_ms: f64) -> Result<(), DriveError> {
        self.set_cmd(Cmd::Turn(dir, speed_ms))
    }

    fn command_drive(&mut self, speed_ms: f64) -> Result<(), DriveError> {
        self.set_cmd(Cmd::Drive(speed_ms))
    }

    fn command_stop(&mut self) -> Result<(), DriveError> {
        self.set_cmd(Cmd::Stop)
    }
}

impl Validate for SimRobotParams {
    fn validate(&self) -> Result<(), InvalidParam> {
        check_positive("track_width_m", self.track_width_m)?;
        if let Some(s) = self.fixed_step_s {
            check_positive("fixed_step_s", s)?;
        }
        if !self.odom_scale_error.is_finite() || self.odom_scale_error <= -1.0 {
            return Err(InvalidParam::new("odom_scale_error", "must be finite and above -1"))
        }
        if !self.gyro_bias_rads.is_finite() {
            return Err(InvalidParam::new("gyro_bias_rads", "must be finite"))
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use approx::assert_relative_eq;

    pub(crate) fn params() -> SimRobotParams {
        SimRobotParams {
            track_width_m: 0.5,
            fixed_step_s: Some(0.1),
            odom_scale_error: 0.0,
            gyro_bias_rads: 0.0,
            aux_readings: vec![12.1, 0.5]
        }
    }

    #[test]
    fn test_drive_and_turn() {
        let (robot, mut sensors, mut drive) = SimRobot::new(params());

        drive.command_drive(1.0).unwrap();
        let odom = sensors.read_odometry_delta().unwrap();
        assert_relative_eq!(odom.dist_m, 0.1, epsilon = 1e-12);
        assert_relative_eq!(sensors.read_inertial_sample().unwrap().accel_x_ms2, 10.0);

        // Odometry is consumed by each read
        let odom = sensors.read_odometry_delta().unwrap();
        assert_relative_eq!(odom.dist_m, 0.1, epsilon = 1e-12);
        assert_relative_eq!(sensors.read_inertial_sample().unwrap().accel_x_ms2, 0.0);

        drive.command_turn(TurnDirection::Left, 0.25).unwrap();
        let odom = sensors.read_odometry_delta().unwrap();
        assert_relative_eq!(odom.dist_m, 0.0);
        assert_relative_eq!(odom.heading_rad, 0.1, epsilon = 1e-12);
        assert_relative_eq!(sensors.read_inertial_sample().unwrap().gyro_z_rads, 1.0);

        let pose = robot.true_pose().unwrap();
        assert_relative_eq!(pose.x_m, 0.2, epsilon = 1e-12);
        assert_relative_eq!(pose.theta_rad, 0.1, epsilon = 1e-12);
        assert_eq!(robot.num_cmds(), 2);

        assert_eq!(sensors.read_auxiliary().unwrap(), vec![12.1, 0.5]);
    }
}
