/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Fault reporting for the hot path.
//!
//! Counters are plain atomics.  Events go into a bounded channel with
//! `try_send`; when the channel is full the event is dropped and
//! `dropped_events` is incremented, so reporting never blocks a worker.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::error::SignalError;
use crate::module::ModuleFailure;

/// Default capacity of the event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

// ── Events ────────────────────────────────────────────────────────────────────

/// A cycle started later than its deadline plus the configured tolerance.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("state '{state}': cycle {cycle} started {late_by:?} late (plans {plans:?})")]
pub struct CycleOverrun {
    pub state: String,
    /// The cycle that started late.
    pub cycle: u64,
    pub late_by: Duration,
    /// Plans that ran in the cycle before, i.e. the ones that overran.
    pub plans: Vec<String>,
}

/// Why a queued State change never took effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// A later request arrived before the same boundary.
    Superseded,
    /// The scheduler stopped first.
    Stopped,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosticEvent {
    CycleOverrun(CycleOverrun),
    ModuleFailed {
        state: String,
        plan: String,
        module: String,
        cycle: u64,
        failure: ModuleFailure,
    },
    SignalAccess {
        module: String,
        cycle: u64,
        error: SignalError,
    },
    TransitionCompleted {
        from: String,
        to: String,
        cycle: u64,
    },
    TransitionDiscarded {
        target: String,
        reason: DiscardReason,
    },
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiagnosticsSnapshot {
    pub cycles: u64,
    pub overruns: u64,
    pub module_failures: u64,
    pub signal_errors: u64,
    pub transitions: u64,
    pub dropped_events: u64,
}

// ── Diagnostics ───────────────────────────────────────────────────────────────

pub struct Diagnostics {
    cycles: AtomicU64,
    overruns: AtomicU64,
    module_failures: AtomicU64,
    signal_errors: AtomicU64,
    transitions: AtomicU64,
    dropped_events: AtomicU64,
    tx: SyncSender<DiagnosticEvent>,
    rx: Mutex<Receiver<DiagnosticEvent>>,
}

impl std::fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Diagnostics")
            .field("counters", &self.snapshot())
            .finish_non_exhaustive()
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl Diagnostics {
    /// `capacity` is the number of undrained events kept (at least one).
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::sync_channel(capacity.max(1));
        Self {
            cycles: AtomicU64::new(0),
            overruns: AtomicU64::new(0),
            module_failures: AtomicU64::new(0),
            signal_errors: AtomicU64::new(0),
            transitions: AtomicU64::new(0),
            dropped_events: AtomicU64::new(0),
            tx,
            rx: Mutex::new(rx),
        }
    }

    fn publish(&self, event: DiagnosticEvent) {
        if self.tx.try_send(event).is_err() {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn cycle_completed(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn overrun(&self, overrun: CycleOverrun) {
        self.overruns.fetch_add(1, Ordering::Relaxed);
        warn!(
            state = %overrun.state,
            cycle = overrun.cycle,
            late_us = overrun.late_by.as_micros() as u64,
            "✗ cycle overrun"
        );
        self.publish(DiagnosticEvent::CycleOverrun(overrun));
    }

    pub(crate) fn module_failed(
        &self,
        state: &str,
        plan: &str,
        module: &str,
        cycle: u64,
        failure: ModuleFailure,
    ) {
        self.module_failures.fetch_add(1, Ordering::Relaxed);
        warn!(state, plan, module, cycle, reason = %failure, "✗ module failed");
        self.publish(DiagnosticEvent::ModuleFailed {
            state: state.to_string(),
            plan: plan.to_string(),
            module: module.to_string(),
            cycle,
            failure,
        });
    }

    pub(crate) fn signal_error(&self, module: &str, cycle: u64, error: &SignalError) {
        self.signal_errors.fetch_add(1, Ordering::Relaxed);
        warn!(module, cycle, %error, "signal access rejected");
        self.publish(DiagnosticEvent::SignalAccess {
            module: module.to_string(),
            cycle,
            error: error.clone(),
        });
    }

    pub(crate) fn transition_completed(&self, from: &str, to: &str, cycle: u64) {
        self.transitions.fetch_add(1, Ordering::Relaxed);
        self.publish(DiagnosticEvent::TransitionCompleted {
            from: from.to_string(),
            to: to.to_string(),
            cycle,
        });
    }

    pub(crate) fn transition_discarded(&self, target: &str, reason: DiscardReason) {
        self.publish(DiagnosticEvent::TransitionDiscarded {
            target: target.to_string(),
            reason,
        });
    }

    /// Takes every queued event, oldest first.
    pub fn drain(&self) -> Vec<DiagnosticEvent> {
        let rx = self.rx.lock().unwrap_or_else(PoisonError::into_inner);
        rx.try_iter().collect()
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            module_failures: self.module_failures.load(Ordering::Relaxed),
            signal_errors: self.signal_errors.load(Ordering::Relaxed),
            transitions: self.transitions.load(Ordering::Relaxed),
            dropped_events: self.dropped_events.load(Ordering::Relaxed),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
