//! Wraparound-aware arithmetic for 16-bit energy counters.
//!
//! Meters expose energy as a 16-bit register that wraps back to zero after
//! 65535 Wh. Consecutive samples are turned into a forward delta that is
//! always non-negative, assuming the counter wrapped at most once between the
//! two samples.
//!
//! ```
//! use powerman_types::counter::delta;
//!
//! assert_eq!(delta(150, 100), 50);
//! assert_eq!(delta(5, 65530), 11);
//! assert_eq!(delta(42, 42), 0);
//! ```

use crate::error::CounterError;

/// Number of distinct values a raw counter can take before it wraps.
pub const COUNTER_MODULUS: u32 = 65_536;

/// Forward distance from `old` to `new` on a 16-bit wrapping counter.
///
/// If `new >= old` the counter progressed normally (this includes the
/// first-reading case where `old` is 0). Otherwise the counter is assumed to
/// have wrapped exactly once and the result is `(65536 - old) + new`.
///
/// More than one wrap between samples cannot be detected and is undercounted.
#[must_use]
pub fn delta(new: u16, old: u16) -> u32 {
    if new >= old {
        u32::from(new - old)
    } else {
        (COUNTER_MODULUS - u32::from(old)) + u32::from(new)
    }
}

/// Validate a counter value read back from storage or an external source.
///
/// # Errors
///
/// Returns [`CounterError::OutOfRange`] if `value` is not a valid 16-bit
/// counter.
pub fn checked_counter(value: i64) -> Result<u16, CounterError> {
    u16::try_from(value).map_err(|_| CounterError::OutOfRange(value))
}

/// [`delta`] over values that have not been validated yet.
///
/// # Errors
///
/// Returns [`CounterError::OutOfRange`] if either side is outside
/// `[0, 65535]`. Such values are treated as corruption and never folded into
/// a result.
pub fn checked_delta(new: i64, old: i64) -> Result<u32, CounterError> {
    Ok(delta(checked_counter(new)?, checked_counter(old)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_forward_progress() {
        assert_eq!(delta(150, 100), 50);
        assert_eq!(delta(65535, 0), 65535);
    }

    #[test]
    fn test_single_wrap() {
        assert_eq!(delta(5, 65530), 11);
        assert_eq!(delta(0, 65535), 1);
        assert_eq!(delta(50, 200), 65386);
    }

    #[test]
    fn test_stalled_meter() {
        assert_eq!(delta(1234, 1234), 0);
    }

    #[test]
    fn test_checked_counter_rejects_out_of_range() {
        assert_eq!(checked_counter(65535), Ok(65535));
        assert_eq!(checked_counter(65536), Err(CounterError::OutOfRange(65536)));
        assert_eq!(checked_counter(-1), Err(CounterError::OutOfRange(-1)));
    }

    #[test]
    fn test_checked_delta() {
        assert_eq!(checked_delta(5, 65530), Ok(11));
        assert!(checked_delta(5, 70_000).is_err());
        assert!(checked_delta(-3, 10).is_err());
    }

    proptest! {
        #[test]
        fn prop_delta_of_equal_values_is_zero(n in any::<u16>()) {
            prop_assert_eq!(delta(n, n), 0);
        }

        #[test]
        fn prop_delta_from_zero_is_identity(n in any::<u16>()) {
            prop_assert_eq!(delta(n, 0), u32::from(n));
        }

        #[test]
        fn prop_delta_below_modulus(new in any::<u16>(), old in any::<u16>()) {
            prop_assert!(delta(new, old) < COUNTER_MODULUS);
        }

        #[test]
        fn prop_delta_inverts_wrapping_add(old in any::<u16>(), step in any::<u16>()) {
            let new = old.wrapping_add(step);
            prop_assert_eq!(delta(new, old), u32::from(step));
        }
    }
}
