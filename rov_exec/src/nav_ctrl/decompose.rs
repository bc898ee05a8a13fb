//! Goal velocity decomposition

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Serialize;

use super::GoalVelocity;
use util::maths::clamp;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The heading and speed the robot should move at.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct DesiredMotion {
    /// Units: radians, in (-pi, pi]
    pub heading_rad: f64,

    /// Units: meters/second
    pub speed_ms: f64
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Split a goal velocity into a heading and a speed no larger than `max_speed_ms`.
///
/// A zero (or non-finite) goal has no direction, so the robot holds its current heading with
/// zero speed.
pub fn decompose(
    goal: &GoalVelocity,
    current_heading_rad: f64,
    max_speed_ms: f64
) -> DesiredMotion {
    if goal.is_zero() || !goal.vx_ms.is_finite() || !goal.vy_ms.is_finite() {
        return DesiredMotion {
            heading_rad: current_heading_rad,
            speed_ms: 0.0
        }
    }

    DesiredMotion {
        heading_rad: goal.vy_ms.atan2(goal.vx_ms),
        speed_ms: clamp(goal.vx_ms.hypot(goal.vy_ms), 0.0, max_speed_ms)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn goal(vx_ms: f64, vy_ms: f64) -> GoalVelocity {
        GoalVelocity { vx_ms, vy_ms }
    }

    #[test]
    fn test_decompose() {
        assert_eq!(
            decompose(&goal(0.0, 0.0), 1.2, 10.0),
            DesiredMotion { heading_rad: 1.2, speed_ms: 0.0 }
        );

        let m = decompose(&goal(1.0, 0.0), 0.7, 10.0);
        assert_relative_eq!(m.heading_rad, 0.0);
        assert_relative_eq!(m.speed_ms, 1.0);

        let m = decompose(&goal(0.0, 1.0), 0.0, 10.0);
        assert_relative_eq!(m.heading_rad, PI / 2.0);
        assert_relative_eq!(m.speed_ms, 1.0);

        let m = decompose(&goal(-1.0, -1.0), 0.0, 10.0);
        assert_relative_eq!(m.heading_rad, -3.0 * PI / 4.0);
        assert_relative_eq!(m.speed_ms, 2f64.sqrt());

        // Second quadrant, where a single quadrant arctangent would point the wrong way
        let m = decompose(&goal(-1.0, 1.0), 0.0, 10.0);
        assert_relative_eq!(m.heading_rad, 3.0 * PI / 4.0);
    }

    #[test]
    fn test_speed_clamped() {
        let m = decompose(&goal(3.0, 4.0), 0.0, 2.0);
        assert_relative_eq!(m.speed_ms, 2.0);
        assert_relative_eq!(m.heading_rad, 4f64.atan2(3.0));
    }

    #[test]
    fn test_non_finite_goal() {
        assert_eq!(
            decompose(&goal(f64::NAN, 1.0), -0.3, 2.0),
            DesiredMotion { heading_rad: -0.3, speed_ms: 0.0 }
        );
    }
}
