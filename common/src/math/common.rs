//! Common

use num_traits::Num;

/// Use 32-bit precision for floating point numbers.
pub type Float = f32;

/// Infinty (∞)
pub const INFINITY: Float = Float::INFINITY;

/// PI (π)
pub const PI: Float = std::f32::consts::PI;

/// Returns the minimum of 2 numbers.
///
/// * `a` - First number.
/// * `b` - Second number.
#[inline(always)]
pub fn min<T>(a: T, b: T) -> T
where
    T: Num + PartialOrd + Copy,
{
    if a < b {
        a
    } else {
        b
    }
}

/// Returns the maximum of 2 numbers.
///
/// * `a` - First number.
/// * `b` - Second number.
#[inline(always)]
pub fn max<T>(a: T, b: T) -> T
where
    T: Num + PartialOrd + Copy,
{
    if a > b {
        a
    } else {
        b
    }
}

/// Clamps a value to the range `[low, high]`.
///
/// * `val`  - The value.
/// * `low`  - Lower bound.
/// * `high` - Upper bound.
#[inline(always)]
pub fn clamp<T>(val: T, low: T, high: T) -> T
where
    T: PartialOrd + Copy,
{
    if val < low {
        low
    } else if val > high {
        high
    } else {
        val
    }
}

/// Returns the bit representation of a 32-bit floating point value.
///
/// * `f` - The 32-bit floating point number.
#[inline(always)]
pub fn float_to_bits(f: f32) -> u32 {
    f.to_bits()
}

/// Returns the 32-bit floating point value with the given bit representation.
///
/// * `i` - The 32-bit unsigned interger.
#[inline(always)]
pub fn bits_to_float(i: u32) -> f32 {
    f32::from_bits(i)
}

/// Returns the area of a disc, used for the acceptance probability of a merge.
///
/// * `radius` - Radius of the disc.
#[inline(always)]
pub fn disc_area(radius: Float) -> Float {
    PI * radius * radius
}

/// Rounds a fractional count to one of its two neighbouring integers so that
/// the expected value equals `value`. The fractional part rounds up with
/// probability equal to the fractional part.
///
/// * `value` - Non-negative fractional count.
/// * `u`     - Uniform random number in [0, 1).
#[inline]
pub fn stochastic_round(value: Float, u: Float) -> u32 {
    let value = max(value, 0.0);
    let floor = value.floor();
    if u < value - floor {
        floor as u32 + 1
    } else {
        floor as u32
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn clamp_returns_bounds_outside_range() {
        assert_eq!(clamp(-1.0, 0.0, 1.0), 0.0);
        assert_eq!(clamp(2.0, 0.0, 1.0), 1.0);
        assert_eq!(clamp(0.5, 0.0, 1.0), 0.5);
        assert_eq!(clamp(7_usize, 2, 4), 4);
    }

    #[test]
    fn stochastic_round_of_integer_is_exact() {
        assert_eq!(stochastic_round(3.0, 0.0), 3);
        assert_eq!(stochastic_round(3.0, 0.999), 3);
        assert_eq!(stochastic_round(-2.0, 0.5), 0);
    }

    proptest! {
        #[test]
        fn stochastic_round_picks_a_neighbour(v in 0.0..32.0f32, u in 0.0..1.0f32) {
            let r = stochastic_round(v, u);
            prop_assert!(r == v.floor() as u32 || r == v.floor() as u32 + 1);
        }

        #[test]
        fn bits_round_trip_preserves_value(v in -1e6..1e6f32) {
            prop_assert_eq!(bits_to_float(float_to_bits(v)), v);
        }
    }
}
