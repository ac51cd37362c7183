//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Calculates the least nonnegative remainder of `lhs (mod rhs)`.
///
/// This function is taken from the std library as num is missing it.
///
/// In particular, the return value `r` satisfies `0.0 <= r < rhs.abs()` in
/// most cases. However, due to a floating point round-off error it can
/// result in `r == rhs.abs()` if `lhs` is much smaller than `rhs.abs()` in
/// magnitude and `lhs < 0.0`.
pub fn rem_euclid<T>(lhs: T, rhs: T) -> T
where
    T: Float,
{
    let r = lhs % rhs;
    if r < T::zero() {
        r + rhs.abs()
    } else {
        r
    }
}

/// Wrap an angle in degrees into the range (-180, 180].
pub fn normalize_angle_deg<T>(angle_deg: T) -> T
where
    T: Float,
{
    let full_turn = T::from(360.0).unwrap_or_else(T::zero);
    let half_turn = T::from(180.0).unwrap_or_else(T::zero);

    let wrapped = rem_euclid(angle_deg, full_turn);

    if wrapped > half_turn {
        wrapped - full_turn
    } else {
        wrapped
    }
}

/// Wrap an angle in radians into the range (-pi, pi].
///
/// The wrap is performed in degrees so that both units share the same
/// boundary behaviour.
pub fn normalize_angle_rad<T>(angle_rad: T) -> T
where
    T: Float,
{
    normalize_angle_deg(angle_rad.to_degrees()).to_radians()
}

/// Return `1` with the sign of `value`, `-0.0` counting as negative.
pub fn sign<T>(value: T) -> T
where
    T: Float,
{
    T::one().copysign(value)
}
