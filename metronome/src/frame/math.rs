/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Integer helpers for period arithmetic.

use super::FrameError;

/// Euclidean GCD.  `gcd(0, n) == n`.
pub fn gcd(a: u64, b: u64) -> u64 {
    let (mut x, mut y) = (a, b);
    while y != 0 {
        (x, y) = (y, x % y);
    }
    x
}

/// LCM of two non-zero periods, or [`FrameError::Overflow`].
pub fn lcm(a: u64, b: u64) -> Result<u64, FrameError> {
    if a == 0 || b == 0 {
        return Ok(0);
    }
    (a / gcd(a, b))
        .checked_mul(b)
        .ok_or(FrameError::Overflow { a, b })
}

/// GCD of all periods; `0` for an empty slice.
pub fn gcd_all(periods: &[u64]) -> u64 {
    periods.iter().fold(0, |acc, &p| gcd(acc, p))
}

/// LCM of all periods; `0` for an empty slice.
pub fn lcm_all(periods: &[u64]) -> Result<u64, FrameError> {
    let Some((&first, rest)) = periods.split_first() else {
        return Ok(0);
    };
    rest.iter().try_fold(first, |acc, &p| lcm(acc, p))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gcd_cases() {
        assert_eq!(gcd(12, 8), 4);
        assert_eq!(gcd(17, 13), 1);
        assert_eq!(gcd(0, 5), 5);
    }

    #[test]
    fn gcd_all_of_control_periods() {
        // 1 ms, 2.5 ms and 10 ms share a 500 µs tick.
        assert_eq!(gcd_all(&[1_000, 2_500, 10_000]), 500);
        assert_eq!(gcd_all(&[]), 0);
    }

    #[test]
    fn lcm_all_of_control_periods() {
        assert_eq!(lcm_all(&[1_000, 2_000, 5_000]).unwrap(), 10_000);
        assert_eq!(lcm_all(&[4_000]).unwrap(), 4_000);
        assert_eq!(lcm_all(&[]).unwrap(), 0);
    }

    #[test]
    fn lcm_overflow_is_reported_with_operands() {
        let a = u64::MAX / 2 + 1;
        let b = a - 1;
        assert_eq!(lcm(a, b), Err(FrameError::Overflow { a, b }));
    }
}
