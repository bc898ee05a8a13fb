//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::{Float, FloatConst};

/// Clamp a value into the range `[min, max]`.
pub fn clamp<T>(value: T, min: T, max: T) -> T
where
    T: Float
{
    value.max(min).min(max)
}

/// Wrap an angle into the range (-pi, pi].
///
/// Angles already in the range are returned unchanged, so that `wrap_pi(wrap_pi(a)) ==
/// wrap_pi(a)` holds exactly.
pub fn wrap_pi<T>(value: T) -> T
where
    T: Float + FloatConst
{
    let pi_t = T::PI();
    let tau_t = pi_t + pi_t;

    if value > -pi_t && value <= pi_t {
        return value
    }

    let r = rem_euclid(value + pi_t, tau_t) - pi_t;

    if r <= -pi_t {
        r + tau_t
    }
    else {
        r
    }
}

/// Get the signed shortest angular distance from `from` to `to`, in the range (-pi, pi].
///
/// A positive result is a counter-clockwise rotation.
pub fn ang_dist<T>(from: T, to: T) -> T
where
    T: Float + FloatConst
{
    wrap_pi(to - from)
}

/// Calculates the least nonnegative remainder of `lhs (mod rhs)`.
///
/// This function is taken from the std library as num is missing it.
///
/// In particular, the return value `r` satisfies `0.0 <= r < rhs.abs()` in
/// most cases. However, due to a floating point round-off error it can
/// result in `r == rhs.abs()`, violating the mathematical definition, if
/// `self` is much smaller than `rhs.abs()` in magnitude and `self < 0.0`.
pub fn rem_euclid<T>(lhs: T, rhs: T) -> T
where
    T: Float
{
    let r = lhs % rhs;
    if r < T::zero() { r + rhs.abs() } else { r }
}
