//! Constant-power pan law
//!
//! A group's (macro_level, balance) pair drives its two members through a
//! quarter-turn of cosine/sine, so perceived loudness stays constant across
//! the balance range. Going back from two raw levels is only approximate:
//! [`initial_group_values`] uses a linear ratio, which does not invert the
//! trigonometric law for arbitrary pairs.

use crate::backend::MAX_LEVEL;
use std::f64::consts::FRAC_PI_2;

/// Balance that splits a group equally
pub const CENTER_BALANCE: u8 = 50;

/// Gain ratios (a, b) for a balance position 0-100
///
/// 0 sends everything to A, 100 everything to B, 50 gives both
/// `cos(pi/4)`.
pub fn pan_ratios(balance: u8) -> (f64, f64) {
    let pan = f64::from(balance.min(MAX_LEVEL)) / 100.0;
    let angle = pan * FRAC_PI_2;
    (angle.cos(), angle.sin())
}

/// Member levels (a, b) for a group setting
pub fn derive_levels(macro_level: u8, balance: u8) -> (u8, u8) {
    let (ratio_a, ratio_b) = pan_ratios(balance);
    let macro_level = f64::from(macro_level.min(MAX_LEVEL));
    (to_level(macro_level * ratio_a), to_level(macro_level * ratio_b))
}

/// Group setting (macro_level, balance) seeded from two raw levels
///
/// `macro_level` is the floored mean; `balance` is A's share of the sum,
/// rounded, or center when both are silent.
pub fn initial_group_values(level_a: u8, level_b: u8) -> (u8, u8) {
    let a = u16::from(level_a.min(MAX_LEVEL));
    let b = u16::from(level_b.min(MAX_LEVEL));
    let sum = a + b;

    let macro_level = (sum / 2) as u8;
    let balance = if sum > 0 {
        to_level(100.0 * f64::from(a) / f64::from(sum))
    } else {
        CENTER_BALANCE
    };
    (macro_level, balance)
}

fn to_level(value: f64) -> u8 {
    value.round().clamp(0.0, f64::from(MAX_LEVEL)) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_ratio_boundaries() {
        let (a, b) = pan_ratios(0);
        assert!((a - 1.0).abs() < EPS);
        assert!(b.abs() < EPS);

        let (a, b) = pan_ratios(100);
        assert!(a.abs() < EPS);
        assert!((b - 1.0).abs() < EPS);

        let (a, b) = pan_ratios(50);
        assert!((a - b).abs() < EPS);
        assert!((a - 0.7071).abs() < 1e-4);
    }

    #[test]
    fn test_center_is_constant_power_not_linear() {
        assert_eq!(derive_levels(100, 50), (71, 71));
        assert_eq!(derive_levels(100, 0), (100, 0));
        assert_eq!(derive_levels(100, 100), (0, 100));
        assert_eq!(derive_levels(0, 30), (0, 0));
    }

    #[test]
    fn test_initial_values() {
        assert_eq!(initial_group_values(80, 40), (60, 67));
        assert_eq!(initial_group_values(0, 0), (0, CENTER_BALANCE));
        assert_eq!(initial_group_values(0, 90), (45, 0));
        assert_eq!(initial_group_values(99, 100), (99, 50));
    }

    #[test]
    fn test_initial_values_do_not_invert_pan_law() {
        let (macro_level, balance) = initial_group_values(80, 40);
        assert_eq!(derive_levels(macro_level, balance), (30, 52));
    }

    proptest! {
        #[test]
        fn prop_ratios_have_unit_power(balance in 0u8..=100) {
            let (a, b) = pan_ratios(balance);
            prop_assert!((a * a + b * b - 1.0).abs() < 1e-9);
            prop_assert!(a >= -EPS && b >= -EPS);
        }

        #[test]
        fn prop_derived_levels_never_exceed_macro(macro_level in 0u8..=100, balance in 0u8..=100) {
            let (a, b) = derive_levels(macro_level, balance);
            prop_assert!(a <= macro_level);
            prop_assert!(b <= macro_level);
        }

        #[test]
        fn prop_moving_balance_towards_b_never_raises_a(macro_level in 0u8..=100, balance in 0u8..100) {
            let (a_before, b_before) = derive_levels(macro_level, balance);
            let (a_after, b_after) = derive_levels(macro_level, balance + 1);
            prop_assert!(a_after <= a_before);
            prop_assert!(b_after >= b_before);
        }

        #[test]
        fn prop_initial_values_in_range(a in any::<u8>(), b in any::<u8>()) {
            let (macro_level, balance) = initial_group_values(a, b);
            prop_assert!(macro_level <= MAX_LEVEL);
            prop_assert!(balance <= MAX_LEVEL);
        }
    }
}
