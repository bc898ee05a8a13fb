//! Extended Kalman Filter over the planar state `[x, y, vx, vy, theta]`
//!
//! The filter is driven by the control `u = [d, v, dtheta]`, where `d` is the distance
//! travelled since the last step, `v = d/dt` and `dtheta` the heading change. Inertial samples
//! (body frame acceleration and yaw rate) are fused in the update step.
//!
//! Every step computes candidate values first and only commits them once they are finite and
//! the covariance is symmetric positive semi-definite.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::trace;
use nalgebra::{Matrix3, Matrix3x5, Matrix5, Matrix5x3, Vector3, Vector5};
use serde::{Deserialize, Serialize};

use super::{InertialSample, NumericalFault, OdometryDelta, Pose, VelocityEstimate};
use util::maths::wrap_pi;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Allowed negative eigenvalue of the covariance, relative to its largest eigenvalue.
const PSD_TOLERANCE: f64 = 1e-9;

/// Allowed norm of `P - P^T`, relative to the norm of `P`.
const SYMMETRY_TOLERANCE: f64 = 1e-9;

const IX: usize = 0;
const IY: usize = 1;
const IVX: usize = 2;
const IVY: usize = 3;
const ITHETA: usize = 4;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Standard deviations of the process and measurement noise.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NoiseModel {
    /// Distance travelled, meters
    pub std_d: f64,

    /// Speed, meters/second
    pub std_v: f64,

    /// Heading change, radians
    pub std_theta: f64,

    /// Accelerometer, meters/second^2
    pub std_accel_delta: f64,

    /// Velocity change between two steps, meters/second
    pub std_vel_delta: f64,

    /// Gyro, radians/second
    pub std_gyro_delta: f64
}

/// The full belief of the filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorState {
    /// `[x, y, vx, vy, theta]`
    pub x: Vector5<f64>,

    pub p: Matrix5<f64>
}

/// What happened during one call to [`Ekf::predict_and_update`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct StepReport {
    /// A predict step was committed
    pub predicted: bool,

    /// The predict used inertial dead reckoning because odometry was missing
    pub dead_reckoned: bool,

    /// An update step was committed
    pub updated: bool,

    /// The step (or part of it) that was rejected
    #[serde(skip)]
    pub fault: Option<NumericalFault>
}

/// Extended Kalman Filter fusing odometry with inertial samples.
#[derive(Debug, Clone)]
pub struct Ekf {
    state: EstimatorState,
    noise: NoiseModel
}

/// Values of the state before a predict, which the measurement model differences against.
#[derive(Debug, Clone, Copy)]
struct Prior {
    vx: f64,
    vy: f64,
    theta: f64
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl EstimatorState {
    /// A state at the origin with a diagonal covariance built from the given standard deviations
    /// of position, velocity and heading.
    pub fn at_origin(std_pos_m: f64, std_vel_ms: f64, std_theta_rad: f64) -> Self {
        let (p2, v2, t2) = (std_pos_m.powi(2), std_vel_ms.powi(2), std_theta_rad.powi(2));
        Self {
            x: Vector5::zeros(),
            p: Matrix5::from_diagonal(&Vector5::new(p2, p2, v2, v2, t2))
        }
    }

    pub fn pose(&self) -> Pose {
        Pose {
            x_m: self.x[IX],
            y_m: self.x[IY],
            theta_rad: self.x[ITHETA]
        }
    }

    pub fn velocity(&self) -> VelocityEstimate {
        VelocityEstimate {
            vx_ms: self.x[IVX],
            vy_ms: self.x[IVY]
        }
    }

    /// Check the state can be committed.
    pub fn validate(&self) -> Result<(), NumericalFault> {
        if self.x.iter().chain(self.p.iter()).any(|v| !v.is_finite()) {
            return Err(NumericalFault::NonFinite)
        }

        let asym = (self.p - self.p.transpose()).norm();
        if asym > SYMMETRY_TOLERANCE * self.p.norm().max(1.0) {
            return Err(NumericalFault::NotSymmetric(asym))
        }

        // Only one triangle is read here, so symmetry must be checked first
        let eigs = self.p.symmetric_eigenvalues();
        let max_abs = eigs.iter().fold(1.0f64, |m, e| m.max(e.abs()));
        let min = eigs.min();

        if min < -PSD_TOLERANCE * max_abs {
            return Err(NumericalFault::NotPositiveSemiDefinite(min))
        }

        Ok(())
    }
}

impl Ekf {
    pub fn new(initial: EstimatorState, noise: NoiseModel) -> Self {
        Self {
            state: initial,
            noise
        }
    }

    pub fn state(&self) -> &EstimatorState {
        &self.state
    }

    pub fn pose(&self) -> Pose {
        self.state.pose()
    }

    pub fn velocity(&self) -> VelocityEstimate {
        self.state.velocity()
    }

    /// Run one filter step.
    ///
    /// Missing inputs degrade the step rather than failing it:
    /// - no odometry: the heading is propagated from the gyro and the distance from the previous
    ///   speed, with no update,
    /// - no inertial sample: predict only,
    /// - neither: the state is left untouched.
    ///
    /// If the update is rejected the predict result is kept. If the predict is rejected the
    /// previous state is kept.
    pub fn predict_and_update(
        &mut self,
        odom: Option<OdometryDelta>,
        inertial: Option<InertialSample>,
        dt_s: f64
    ) -> (Pose, VelocityEstimate, StepReport) {
        let mut report = StepReport::default();

        let prior = Prior {
            vx: self.state.x[IVX],
            vy: self.state.x[IVY],
            theta: self.state.x[ITHETA]
        };

        let control = match (odom, inertial) {
            (Some(o), _) => Some((o.dist_m, o.heading_rad)),
            (None, Some(i)) => {
                report.dead_reckoned = true;
                let dt = if dt_s > 0.0 { dt_s } else { 0.0 };
                Some((self.velocity().speed_ms() * dt, i.gyro_z_rads * dt))
            },
            (None, None) => None
        };

        if let Some((d, dtheta)) = control {
            match self.predict(d, dtheta, dt_s) {
                Ok(()) => report.predicted = true,
                Err(e) => report.fault = Some(e)
            }
        }

        // The dead reckoned step already used the gyro, so it is not fused twice
        if let (true, false, Some(i)) = (report.predicted, report.dead_reckoned, inertial) {
            match self.update(&i, &prior, dt_s) {
                Ok(()) => report.updated = true,
                Err(e) => report.fault = Some(e)
            }
        }

        trace!("Ekf step: {:?}, x = {:?}", report, self.state.x.as_slice());

        (self.pose(), self.velocity(), report)
    }

    /// Propagate the state through the motion model.
    pub fn predict(&mut self, d: f64, dtheta: f64, dt_s: f64) -> Result<(), NumericalFault> {
        let v = if dt_s > 0.0 { d / dt_s } else { 0.0 };

        let x = &self.state.x;
        let phi = x[ITHETA] + dtheta;
        let (s, c) = phi.sin_cos();

        let x_new = Vector5::new(
            x[IX] + d * c,
            x[IY] + d * s,
            v * c,
            v * s,
            wrap_pi(phi)
        );

        // Jacobians at the current estimate
        #[rustfmt::skip]
        let fx = Matrix5::new(
            1.0, 0.0, 0.0, 0.0, -d * s,
            0.0, 1.0, 0.0, 0.0,  d * c,
            0.0, 0.0, 0.0, 0.0, -v * s,
            0.0, 0.0, 0.0, 0.0,  v * c,
            0.0, 0.0, 0.0, 0.0,  1.0
        );

        #[rustfmt::skip]
        let fu = Matrix5x3::new(
            c,   0.0, -d * s,
            s,   0.0,  d * c,
            0.0, c,   -v * s,
            0.0, s,    v * c,
            0.0, 0.0,  1.0
        );

        let q = fu * self.process_noise() * fu.transpose();
        let p_new = symmetrise(fx * self.state.p * fx.transpose() + q);

        self.commit(EstimatorState { x: x_new, p: p_new })
    }

    /// Correct the predicted state with an inertial sample.
    fn update(
        &mut self,
        sample: &InertialSample,
        prior: &Prior,
        dt_s: f64
    ) -> Result<(), NumericalFault> {
        if !(dt_s.is_finite() && dt_s > 0.0) {
            return Err(NumericalFault::InvalidTimeStep(dt_s))
        }

        let x = self.state.x;
        let p = self.state.p;
        let (s, c) = x[ITHETA].sin_cos();

        let dvx = x[IVX] - prior.vx;
        let dvy = x[IVY] - prior.vy;

        // Predicted body frame acceleration and yaw rate
        let h1 = (c * dvx + s * dvy) / dt_s;
        let h2 = (-s * dvx + c * dvy) / dt_s;
        let h3 = wrap_pi(x[ITHETA] - prior.theta) / dt_s;

        #[rustfmt::skip]
        let h = Matrix3x5::new(
            0.0, 0.0,  c / dt_s, s / dt_s,  h2,
            0.0, 0.0, -s / dt_s, c / dt_s, -h1,
            0.0, 0.0,  0.0,      0.0,       1.0 / dt_s
        );

        let r = self.measurement_noise(dt_s);
        let s_mat = h * p * h.transpose() + r;

        let s_inv = s_mat.cholesky()
            .ok_or(NumericalFault::InnovationNotPositiveDefinite)?
            .inverse();

        let k = p * h.transpose() * s_inv;

        let z = Vector3::new(sample.accel_x_ms2, sample.accel_y_ms2, sample.gyro_z_rads);
        let innovation = z - Vector3::new(h1, h2, h3);

        let mut x_new = x + k * innovation;
        x_new[ITHETA] = wrap_pi(x_new[ITHETA]);

        // Joseph form
        let i_kh = Matrix5::identity() - k * h;
        let p_new = symmetrise(i_kh * p * i_kh.transpose() + k * r * k.transpose());

        self.commit(EstimatorState { x: x_new, p: p_new })
    }

    fn commit(&mut self, candidate: EstimatorState) -> Result<(), NumericalFault> {
        candidate.validate()?;
        self.state = candidate;
        Ok(())
    }

    /// Covariance of the control `[d, v, dtheta]`.
    fn process_noise(&self) -> Matrix3<f64> {
        Matrix3::from_diagonal(&Vector3::new(
            self.noise.std_d.powi(2),
            self.noise.std_v.powi(2),
            self.noise.std_theta.powi(2)
        ))
    }

    /// Covariance of the measurement `[ax, ay, gz]`.
    ///
    /// The acceleration terms include the velocity change noise since the predicted
    /// acceleration is a finite difference over `dt_s`.
    fn measurement_noise(&self, dt_s: f64) -> Matrix3<f64> {
        let var_a = self.noise.std_accel_delta.powi(2) + (self.noise.std_vel_delta / dt_s).powi(2);
        Matrix3::from_diagonal(&Vector3::new(var_a, var_a, self.noise.std_gyro_delta.powi(2)))
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn symmetrise(p: Matrix5<f64>) -> Matrix5<f64> {
    (p + p.transpose()) * 0.5
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn noise() -> NoiseModel {
        NoiseModel {
            std_d: 0.01,
            std_v: 0.05,
            std_theta: 0.01,
            std_accel_delta: 0.2,
            std_vel_delta: 0.01,
            std_gyro_delta: 0.02
        }
    }

    fn ekf() -> Ekf {
        Ekf::new(EstimatorState::at_origin(0.01, 0.01, 0.01), noise())
    }

    fn assert_cov_ok(ekf: &Ekf) {
        let p = ekf.state().p;
        assert!((p - p.transpose()).norm() < 1e-12);
        assert!(p.symmetric_eigenvalues().min() >= -1e-12);
    }

    #[test]
    fn test_zero_motion() {
        let mut ekf = ekf();
        let start = ekf.pose();

        for _ in 0..20 {
            let (pose, vel, report) = ekf.predict_and_update(
                Some(OdometryDelta::default()),
                Some(InertialSample::default()),
                0.1
            );
            assert!(report.predicted && report.updated);
            assert_relative_eq!(pose.x_m, start.x_m, epsilon = 1e-12);
            assert_relative_eq!(pose.y_m, start.y_m, epsilon = 1e-12);
            assert_relative_eq!(pose.theta_rad, start.theta_rad, epsilon = 1e-12);
            assert_relative_eq!(vel.speed_ms(), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_predict_straight_and_turn() {
        let mut ekf = ekf();

        ekf.predict(1.0, 0.0, 0.5).unwrap();
        assert_relative_eq!(ekf.pose().x_m, 1.0, epsilon = 1e-12);
        assert_relative_eq!(ekf.velocity().vx_ms, 2.0, epsilon = 1e-12);

        ekf.predict(1.0, PI / 2.0, 0.5).unwrap();
        let pose = ekf.pose();
        assert_relative_eq!(pose.x_m, 1.0, epsilon = 1e-9);
        assert_relative_eq!(pose.y_m, 1.0, epsilon = 1e-9);
        assert_relative_eq!(pose.theta_rad, PI / 2.0, epsilon = 1e-12);
        assert_relative_eq!(ekf.velocity().vy_ms, 2.0, epsilon = 1e-9);

        // Heading stays wrapped
        for _ in 0..10 {
            ekf.predict(0.0, 1.0, 0.5).unwrap();
            let t = ekf.pose().theta_rad;
            assert!(t > -PI && t <= PI);
        }
    }

    #[test]
    fn test_zero_time_step() {
        let mut ekf = ekf();
        let (pose, vel, report) = ekf.predict_and_update(
            Some(OdometryDelta { dist_m: 0.1, heading_rad: 0.0 }),
            Some(InertialSample::default()),
            0.0
        );

        assert!(report.predicted);
        assert!(!report.updated);
        assert_eq!(report.fault, Some(NumericalFault::InvalidTimeStep(0.0)));
        assert_relative_eq!(pose.x_m, 0.1, epsilon = 1e-12);
        assert_eq!(vel.speed_ms(), 0.0);
    }

    #[test]
    fn test_covariance_invariants() {
        let mut ekf = ekf();

        for i in 0..200 {
            let t = i as f64 * 0.1;
            let odom = match i % 7 {
                3 => None,
                _ => Some(OdometryDelta {
                    dist_m: 0.05 + 0.02 * t.sin(),
                    heading_rad: 0.03 * (0.7 * t).cos()
                })
            };
            let inertial = match i % 5 {
                2 => None,
                _ => Some(InertialSample {
                    accel_x_ms2: 0.3 * t.cos(),
                    accel_y_ms2: -0.1 * t.sin(),
                    gyro_z_rads: 0.3 * (0.7 * t).cos()
                })
            };

            ekf.predict_and_update(odom, inertial, 0.1);
            assert_cov_ok(&ekf);
        }
    }

    #[test]
    fn test_rejected_update_keeps_predict() {
        // A zero covariance and zero measurement noise make the innovation covariance singular
        let zero = NoiseModel {
            std_d: 0.0,
            std_v: 0.0,
            std_theta: 0.0,
            std_accel_delta: 0.0,
            std_vel_delta: 0.0,
            std_gyro_delta: 0.0
        };
        let mut ekf = Ekf::new(EstimatorState::at_origin(0.0, 0.0, 0.0), zero);

        let (pose, _, report) = ekf.predict_and_update(
            Some(OdometryDelta { dist_m: 0.2, heading_rad: 0.0 }),
            Some(InertialSample { accel_x_ms2: 5.0, accel_y_ms2: 0.0, gyro_z_rads: 0.0 }),
            0.1
        );

        assert!(report.predicted);
        assert!(!report.updated);
        assert_eq!(report.fault, Some(NumericalFault::InnovationNotPositiveDefinite));
        assert_relative_eq!(pose.x_m, 0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_validate_asymmetric_covariance() {
        let mut state = EstimatorState::at_origin(1.0, 1.0, 1.0);
        assert_eq!(state.validate(), Ok(()));

        state.p[(IX, ITHETA)] = 5.0;
        assert!(matches!(state.validate(), Err(NumericalFault::NotSymmetric(a)) if a > 7.0));

        // Restoring symmetry makes it acceptable again
        state.p[(ITHETA, IX)] = 0.5;
        state.p[(IX, ITHETA)] = 0.5;
        assert_eq!(state.validate(), Ok(()));
    }

    #[test]
    fn test_rejected_predict_keeps_state() {
        let mut ekf = ekf();
        ekf.predict(0.5, 0.0, 0.5).unwrap();
        let before = ekf.state().clone();

        let (_, _, report) = ekf.predict_and_update(
            Some(OdometryDelta { dist_m: f64::NAN, heading_rad: 0.0 }),
            None,
            0.1
        );

        assert!(!report.predicted);
        assert_eq!(report.fault, Some(NumericalFault::NonFinite));
        assert_eq!(ekf.state(), &before);
    }

    #[test]
    fn test_dead_reckoning() {
        let mut ekf = ekf();
        ekf.predict(0.1, 0.0, 0.1).unwrap();

        let (pose, _, report) = ekf.predict_and_update(
            None,
            Some(InertialSample { accel_x_ms2: 0.0, accel_y_ms2: 0.0, gyro_z_rads: 1.0 }),
            0.1
        );

        assert!(report.predicted && report.dead_reckoned && !report.updated);
        assert_relative_eq!(pose.theta_rad, 0.1, epsilon = 1e-12);
        assert_relative_eq!(pose.x_m, 0.1 + 0.1 * 0.1f64.cos(), epsilon = 1e-12);
    }

    #[test]
    fn test_no_inputs() {
        let mut ekf = ekf();
        let before = ekf.state().clone();
        let (_, _, report) = ekf.predict_and_update(None, None, 0.1);
        assert_eq!(report, StepReport::default());
        assert_eq!(ekf.state(), &before);
    }

    #[test]
    fn test_gyro_update_corrects_heading() {
        let mut ekf = ekf();

        // Odometry reports no turn but the gyro sees a steady rotation, the heading estimate
        // should move towards the gyro.
        for _ in 0..10 {
            ekf.predict_and_update(
                Some(OdometryDelta { dist_m: 0.0, heading_rad: 0.0 }),
                Some(InertialSample { accel_x_ms2: 0.0, accel_y_ms2: 0.0, gyro_z_rads: 0.2 }),
                0.1
            );
        }

        assert!(ekf.pose().theta_rad > 0.0);
        assert_cov_ok(&ekf);
    }
}
