//! # Shared state
//!
//! State shared between the sensing, communication and actuation activities when they run
//! concurrently. The estimate and the goal are separate lock groups, neither is ever needed
//! together with the other, and no lock is held across a driver call or a network wait.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering},
    Mutex, MutexGuard
};

use comms_if::op::{ControllerState, GoalVelocity, Pose, VelocityEstimate};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// One published output of the estimator.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct EstSnapshot {
    pub pose: Pose,
    pub velocity: VelocityEstimate,
    pub aux: Vec<f64>,

    /// Incremented on every publish, 0 means nothing has been published yet
    pub generation: u64
}

#[derive(Debug)]
pub struct Shared {
    est: Mutex<EstSnapshot>,
    goal: Mutex<GoalVelocity>,

    ctrl_state: AtomicU8,

    /// Cleared to stop every activity
    run: AtomicBool,

    link_up: AtomicBool,

    /// Set once the operator has asked the robot to terminate, or the link has failed for good
    terminate: AtomicBool,

    /// Number of stops issued by actuation while holding the robot safe
    safe_stops: AtomicU64
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Shared {
    pub fn new() -> Self {
        Self {
            est: Mutex::new(EstSnapshot::default()),
            goal: Mutex::new(GoalVelocity::default()),
            ctrl_state: AtomicU8::new(encode_state(ControllerState::Stopped)),
            run: AtomicBool::new(true),
            link_up: AtomicBool::new(true),
            terminate: AtomicBool::new(false),
            safe_stops: AtomicU64::new(0)
        }
    }

    /// Publish a new estimate, returning its generation.
    pub fn publish_estimate(&self, pose: Pose, velocity: VelocityEstimate, aux: Vec<f64>) -> u64 {
        let mut est = lock(&self.est);
        est.pose = pose;
        est.velocity = velocity;
        est.aux = aux;
        est.generation += 1;
        est.generation
    }

    /// Copy of the latest estimate.
    pub fn snapshot(&self) -> EstSnapshot {
        lock(&self.est).clone()
    }

    pub fn set_goal(&self, goal: GoalVelocity) {
        *lock(&self.goal) = goal;
    }

    pub fn goal(&self) -> GoalVelocity {
        *lock(&self.goal)
    }

    pub fn set_ctrl_state(&self, state: ControllerState) {
        self.ctrl_state.store(encode_state(state), Ordering::Release);
    }

    pub fn ctrl_state(&self) -> ControllerState {
        decode_state(self.ctrl_state.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.run.load(Ordering::Acquire)
    }

    pub fn stop_running(&self) {
        self.run.store(false, Ordering::Release);
    }

    pub fn is_link_up(&self) -> bool {
        self.link_up.load(Ordering::Acquire)
    }

    pub fn set_link_up(&self, up: bool) {
        self.link_up.store(up, Ordering::Release);
    }

    pub fn is_terminating(&self) -> bool {
        self.terminate.load(Ordering::Acquire)
    }

    pub fn request_terminate(&self) {
        self.terminate.store(true, Ordering::Release);
    }

    pub fn safe_stops(&self) -> u64 {
        self.safe_stops.load(Ordering::Acquire)
    }

    /// Record that actuation has commanded a stop because the link is down or the robot is
    /// terminating.
    pub fn note_safe_stop(&self) {
        self.safe_stops.fetch_add(1, Ordering::AcqRel);
    }
}

impl Default for Shared {
    fn default() -> Self {
        Self::new()
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Lock a mutex, recovering the data if another activity panicked while holding it.
///
/// Every critical section here is a plain copy, so the data is always consistent.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn encode_state(state: ControllerState) -> u8 {
    match state {
        ControllerState::Stopped => 0,
        ControllerState::Aligning => 1,
        ControllerState::Driving => 2
    }
}

fn decode_state(v: u8) -> ControllerState {
    match v {
        1 => ControllerState::Aligning,
        2 => ControllerState::Driving,
        _ => ControllerState::Stopped
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::{sync::Arc, thread};

    #[test]
    fn test_generation() {
        let shared = Shared::new();
        assert_eq!(shared.snapshot().generation, 0);

        let pose = Pose { x_m: 1.0, y_m: 0.0, theta_rad: 0.0 };
        assert_eq!(shared.publish_estimate(pose, VelocityEstimate::default(), vec![1.0]), 1);

        let snap = shared.snapshot();
        assert_eq!(snap.generation, 1);
        assert_eq!(snap.pose, pose);
        assert_eq!(snap.aux, vec![1.0]);
    }

    #[test]
    fn test_snapshots_are_consistent() {
        let shared = Arc::new(Shared::new());
        let writer = {
            let shared = shared.clone();
            thread::spawn(move || {
                for i in 1..=1000 {
                    let v = i as f64;
                    shared.publish_estimate(
                        Pose { x_m: v, y_m: v, theta_rad: 0.0 },
                        VelocityEstimate { vx_ms: v, vy_ms: v },
                        vec![v]
                    );
                }
            })
        };

        let mut last_gen = 0;
        for _ in 0..1000 {
            let snap = shared.snapshot();

            // Every field of a snapshot comes from the same publish
            if snap.generation > 0 {
                let v = snap.generation as f64;
                assert_eq!(snap.pose.x_m, v);
                assert_eq!(snap.velocity.vy_ms, v);
                assert_eq!(snap.aux, vec![v]);
            }
            assert!(snap.generation >= last_gen);
            last_gen = snap.generation;
        }

        writer.join().unwrap();
        assert_eq!(shared.snapshot().generation, 1000);
    }

    #[test]
    fn test_flags() {
        let shared = Shared::new();
        assert!(shared.is_running() && shared.is_link_up() && !shared.is_terminating());

        shared.set_link_up(false);
        shared.note_safe_stop();
        shared.request_terminate();
        shared.stop_running();

        assert!(!shared.is_running() && !shared.is_link_up() && shared.is_terminating());
        assert_eq!(shared.safe_stops(), 1);
    }

    #[test]
    fn test_ctrl_state() {
        let shared = Shared::new();
        assert_eq!(shared.ctrl_state(), ControllerState::Stopped);
        shared.set_ctrl_state(ControllerState::Driving);
        assert_eq!(shared.ctrl_state(), ControllerState::Driving);
    }
}
