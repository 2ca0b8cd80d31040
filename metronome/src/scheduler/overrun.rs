/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Execution policies and deadline tracking.
//!
//! The scheduler starts each cycle at a deadline that advances by the active
//! State's base period.  If "now" is already past the deadline (plus
//! tolerance) the cycle is late: one overrun is recorded and the deadline is
//! re-anchored at "now".  Missed ticks are not replayed, so one long cycle
//! costs exactly one overrun rather than a burst of back-to-back catch-up
//! cycles.

use std::time::Duration;

use crate::clock::Clock;

// ── Policies ──────────────────────────────────────────────────────────────────

/// What a plan does after one of its modules fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModuleFailurePolicy {
    /// Run the remaining modules of the plan anyway.
    #[default]
    Continue,
    /// Skip the rest of that plan for this cycle.
    SkipRemaining,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OverrunPolicy {
    /// Lateness that is not counted as an overrun.
    pub tolerance: Duration,
    /// Stop the scheduler once more than this many consecutive cycles
    /// overrun.  `None` never stops.
    pub max_consecutive: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecutionPolicy {
    pub module_failure: ModuleFailurePolicy,
    pub overrun: OverrunPolicy,
}

// ── DeadlineTracker ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wake {
    OnTime,
    Late { late_by: Duration },
}

#[derive(Debug)]
pub(crate) struct DeadlineTracker {
    policy: OverrunPolicy,
    next: Option<Duration>,
    consecutive: u32,
}

impl DeadlineTracker {
    pub(crate) fn new(policy: OverrunPolicy) -> Self {
        Self {
            policy,
            next: None,
            consecutive: 0,
        }
    }

    /// Blocks until the next deadline.  The first call anchors the schedule
    /// at the current time.
    pub(crate) fn wait(&mut self, clock: &dyn Clock) -> Wake {
        let now = clock.now();
        match self.next {
            None => {
                self.next = Some(now);
                Wake::OnTime
            }
            Some(deadline) if now > deadline + self.policy.tolerance => {
                self.next = Some(now);
                self.consecutive += 1;
                Wake::Late {
                    late_by: now - deadline,
                }
            }
            Some(deadline) => {
                clock.sleep_until(deadline);
                self.consecutive = 0;
                Wake::OnTime
            }
        }
    }

    /// Moves the deadline one base period forward.
    pub(crate) fn advance(&mut self, period: Duration) {
        if let Some(next) = self.next.as_mut() {
            *next += period;
        }
    }

    pub(crate) fn consecutive(&self) -> u32 {
        self.consecutive
    }

    /// `Some(limit)` once the consecutive-overrun limit is exceeded.
    pub(crate) fn limit_exceeded(&self) -> Option<u32> {
        self.policy
            .max_consecutive
            .filter(|limit| self.consecutive > *limit)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const P: Duration = Duration::from_millis(1);

    #[test]
    fn on_time_cycles_sleep_to_the_deadline() {
        let clock = ManualClock::new();
        let mut t = DeadlineTracker::new(OverrunPolicy::default());
        for i in 0..4u32 {
            assert_eq!(t.wait(&clock), Wake::OnTime);
            assert_eq!(clock.now(), P * i);
            t.advance(P);
        }
    }

    #[test]
    fn a_long_cycle_costs_exactly_one_overrun() {
        let clock = ManualClock::new();
        let mut t = DeadlineTracker::new(OverrunPolicy::default());

        t.wait(&clock);
        t.advance(P);
        clock.advance(P * 3); // work took three periods

        assert_eq!(t.wait(&clock), Wake::Late { late_by: P * 2 });
        t.advance(P);
        // Re-anchored: the next cycle is on time again.
        assert_eq!(t.wait(&clock), Wake::OnTime);
        assert_eq!(clock.now(), P * 4);
        assert_eq!(t.consecutive(), 0);
    }

    #[test]
    fn tolerance_absorbs_small_lateness() {
        let clock = ManualClock::new();
        let mut t = DeadlineTracker::new(OverrunPolicy {
            tolerance: Duration::from_micros(200),
            max_consecutive: None,
        });
        t.wait(&clock);
        t.advance(P);
        clock.advance(P + Duration::from_micros(150));
        assert_eq!(t.wait(&clock), Wake::OnTime);
    }

    #[test]
    fn consecutive_limit() {
        let clock = ManualClock::new();
        let mut t = DeadlineTracker::new(OverrunPolicy {
            tolerance: Duration::ZERO,
            max_consecutive: Some(1),
        });
        t.wait(&clock);
        for _ in 0..2 {
            t.advance(P);
            clock.advance(P * 2);
            assert!(matches!(t.wait(&clock), Wake::Late { .. }));
        }
        assert_eq!(t.limit_exceeded(), Some(1));
    }
}
