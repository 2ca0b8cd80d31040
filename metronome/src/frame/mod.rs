//! Per-State cycle frame: base tick and hyperperiod.
//!
//! A State may hold Thread Plans with different periods.  The scheduler
//! ticks at the GCD of those periods (the *base period*) and runs a plan on
//! every tick that is a multiple of `period / base`, counting from the tick
//! the State was entered.  The pattern repeats every hyperperiod (LCM).
//!
//! | Plans | Base | Divisors | Hyperperiod |
//! |-------|------|----------|-------------|
//! | 1 ms | 1 ms | 1 | 1 ms |
//! | 1 ms, 2 ms, 5 ms | 1 ms | 1, 2, 5 | 10 ms |
//! | 2 ms, 3 ms | 1 ms | 2, 3 | 6 ms |

pub mod math;

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use math::{gcd_all, lcm_all};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Default upper bound on a State's hyperperiod (1 hour in microseconds).
pub const DEFAULT_HYPERPERIOD_LIMIT_US: u64 = 3_600_000_000;

// ── Error type ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("no thread plans to schedule")]
    NoPlans,

    #[error("thread plan '{plan}' has a zero period")]
    ZeroPeriod { plan: String },

    #[error("LCM overflow computing lcm({a}, {b})")]
    Overflow { a: u64, b: u64 },

    #[error("hyperperiod {value_us}µs exceeds limit {limit_us}µs")]
    TooLarge { value_us: u64, limit_us: u64 },
}

// ── CycleFrame ────────────────────────────────────────────────────────────────

/// Tick layout of one State.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleFrame {
    base_period_us: u64,
    hyperperiod_us: u64,
    /// Per plan, in declaration order: run every `divisor` ticks.
    divisors: Vec<u64>,
}

impl CycleFrame {
    /// Computes the frame for `(plan name, period µs)` pairs.
    ///
    /// # Errors
    /// * [`FrameError::NoPlans`] – `plans` is empty.
    /// * [`FrameError::ZeroPeriod`] – some plan has period 0.
    /// * [`FrameError::Overflow`] / [`FrameError::TooLarge`] – the
    ///   hyperperiod is not representable or exceeds `limit_us`.
    pub fn compute(plans: &[(&str, u64)], limit_us: u64) -> Result<Self, FrameError> {
        if plans.is_empty() {
            return Err(FrameError::NoPlans);
        }
        if let Some((name, _)) = plans.iter().find(|(_, p)| *p == 0) {
            return Err(FrameError::ZeroPeriod {
                plan: name.to_string(),
            });
        }

        let periods: Vec<u64> = plans.iter().map(|(_, p)| *p).collect();
        let base_period_us = gcd_all(&periods);
        let hyperperiod_us = lcm_all(&periods)?;

        if hyperperiod_us > limit_us {
            warn!(hyperperiod_us, limit_us, "hyperperiod exceeds configured limit");
            return Err(FrameError::TooLarge {
                value_us: hyperperiod_us,
                limit_us,
            });
        }

        let divisors = periods.iter().map(|p| p / base_period_us).collect();
        debug!(base_period_us, hyperperiod_us, ?divisors, "cycle frame");

        Ok(Self {
            base_period_us,
            hyperperiod_us,
            divisors,
        })
    }

    pub fn base_period_us(&self) -> u64 {
        self.base_period_us
    }

    pub fn base_period(&self) -> Duration {
        Duration::from_micros(self.base_period_us)
    }

    pub fn hyperperiod_us(&self) -> u64 {
        self.hyperperiod_us
    }

    pub fn ticks_per_hyperperiod(&self) -> u64 {
        self.hyperperiod_us / self.base_period_us
    }

    pub fn divisor(&self, plan: usize) -> Option<u64> {
        self.divisors.get(plan).copied()
    }

    /// Whether plan `plan` runs on tick `tick` (counted from State entry).
    pub fn is_due(&self, plan: usize, tick: u64) -> bool {
        self.divisor(plan).is_some_and(|d| tick % d == 0)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
