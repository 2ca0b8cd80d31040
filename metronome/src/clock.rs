/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Time sources for the scheduler.
//!
//! Time is expressed as a [`Duration`] since the clock's origin.  The
//! scheduler only ever asks for "now" and "sleep until", which lets tests
//! drive it with a [`ManualClock`] and exercise overrun handling
//! deterministically.

use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// Monotonic time source used by the scheduler and the timing signals.
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock's origin.
    fn now(&self) -> Duration;

    /// Blocks until `now() >= deadline`.  Returns immediately when the
    /// deadline has already passed.
    fn sleep_until(&self, deadline: Duration);
}

// ── MonotonicClock ────────────────────────────────────────────────────────────

/// Wall-clock implementation backed by [`Instant`].
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep_until(&self, deadline: Duration) {
        let now = self.now();
        if deadline > now {
            thread::sleep(deadline - now);
        }
    }
}

// ── ManualClock ───────────────────────────────────────────────────────────────

/// Clock that only moves when told to.
///
/// `sleep_until` jumps straight to the deadline, so a scheduler driven by
/// this clock never waits; [`advance`](Self::advance) simulates work that
/// takes longer than planned.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) += by;
    }

    pub fn set(&self, to: Duration) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sleep_until(&self, deadline: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        if deadline > *now {
            *now = deadline;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
