/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Cyclic executive.
//!
//! One worker thread per Thread Plan slot (the largest number of plans any
//! State has).  Worker *i* runs plan *i* of whichever State is active.  A
//! controller – the thread calling [`Scheduler::step`] / [`Scheduler::run`]
//! – paces the cycles:
//!
//! ```text
//! controller                               workers
//! ──────────                               ───────
//! wait for deadline (overrun check)
//! start barrier ─────────────────────────▶ run due plan (modules in order)
//! end barrier   ◀───────────────────────── done
//! swap signal buffers
//! cycle += 1, deadline += base period
//! handover queued State change
//! ```
//!
//! Modules never run during the swap or the handover, so both are atomic
//! with respect to every module.  Failures inside a cycle are contained:
//! a failing or panicking module is reported through [`Diagnostics`] and the
//! cycle completes.
//!
//! # Design decisions
//!
//! | Topic | Choice |
//! |---|---|
//! | Pacing | Single controller, barrier per cycle; all plans of a State share its GCD tick |
//! | Late cycle | One [`CycleOverrun`] event, deadline re-anchored at "now" (no catch-up burst) |
//! | Failing module | Reported; plan continues or skips its remainder per [`ModuleFailurePolicy`] |
//! | Panicking module | Caught with `catch_unwind`, reported as a module failure |
//! | Stop | Observed at a cycle boundary; queued State changes are discarded |

pub mod diagnostics;
pub mod error;
pub mod overrun;
pub mod transition;

pub use diagnostics::{
    CycleOverrun, DiagnosticEvent, Diagnostics, DiagnosticsSnapshot, DiscardReason,
    DEFAULT_EVENT_CAPACITY,
};
pub use error::{SchedulerError, TransitionError};
pub use overrun::{ExecutionPolicy, ModuleFailurePolicy, OverrunPolicy};
pub use transition::TransitionOutcome;

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Barrier};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, trace};

use crate::application::Runtime;
use crate::clock::Clock;
use crate::module::{lock, IoContext, ModuleFailure};
use crate::plan::ThreadPlan;
use crate::signal::{SignalHandle, Value};
use crate::state::State;
use overrun::{DeadlineTracker, Wake};

// ── Shared state ──────────────────────────────────────────────────────────────

struct Shared {
    runtime: Arc<Runtime>,
    clock: Arc<dyn Clock>,
    start: Barrier,
    end: Barrier,
    /// Tells workers to exit at the next start barrier.
    shutdown: AtomicBool,
}

fn micros(d: Duration) -> u32 {
    d.as_micros().min(u32::MAX as u128) as u32
}

fn record_time(rt: &Runtime, handle: SignalHandle, d: Duration, module: &str, cycle: u64) {
    if let Err(e) = rt.store.write_at(handle, Value::UInt32(micros(d))) {
        rt.diagnostics.signal_error(module, cycle, &e);
    }
}

// ── Worker ────────────────────────────────────────────────────────────────────

fn worker_loop(shared: &Shared, slot: usize) {
    let rt = &shared.runtime;
    // Per State: when this worker last started its plan.
    let mut last_start: Vec<Option<Duration>> = vec![None; rt.states.len()];

    loop {
        shared.start.wait();
        if shared.shutdown.load(Ordering::Acquire) {
            break;
        }

        let active = rt.active.load(Ordering::Acquire);
        let cycle = rt.cycle.load(Ordering::Acquire);
        let tick = cycle.saturating_sub(rt.entered_at.load(Ordering::Acquire));

        if let (Some(state), Some(started)) = (rt.states.get(active), last_start.get_mut(active)) {
            if tick == 0 {
                *started = None;
            }
            if let Some(plan) = state.plans.get(slot) {
                if state.frame.is_due(slot, tick) {
                    run_plan(shared, state, plan, cycle, started);
                }
            }
        }

        shared.end.wait();
    }
    trace!(worker = slot, "worker exiting");
}

fn run_plan(
    shared: &Shared,
    state: &State,
    plan: &ThreadPlan,
    cycle: u64,
    last_start: &mut Option<Duration>,
) {
    let rt = &shared.runtime;
    let start = shared.clock.now();
    if let (Some(h), Some(prev)) = (plan.cycle_time, *last_start) {
        record_time(rt, h, start.saturating_sub(prev), &plan.name, cycle);
    }
    *last_start = Some(start);

    let ctx = IoContext::new(&rt.store, &rt.diagnostics, cycle);
    for entry in &plan.entries {
        let Some(slot) = rt.modules.get(entry.module) else {
            continue;
        };
        let mut module = lock(slot);

        let t0 = shared.clock.now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            module.execute(ctx, &entry.input_views)
        }))
        .unwrap_or_else(|_| Err(ModuleFailure::new("module panicked")));
        if let Some(h) = module.exec_time_signal() {
            record_time(rt, h, shared.clock.now().saturating_sub(t0), module.name(), cycle);
        }

        match result {
            Ok(()) => trace!(module = module.name(), cycle, "✓ executed"),
            Err(failure) => {
                rt.diagnostics
                    .module_failed(&state.name, &plan.name, module.name(), cycle, failure);
                if rt.policy.module_failure == ModuleFailurePolicy::SkipRemaining {
                    break;
                }
            }
        }
    }
}

// ── Scheduler ─────────────────────────────────────────────────────────────────

/// Drives an application's cycles.  Obtained from
/// [`Application::scheduler`](crate::Application::scheduler).
pub struct Scheduler {
    shared: Arc<Shared>,
    workers: Vec<(String, JoinHandle<()>)>,
    deadline: DeadlineTracker,
    /// State index and tick of the last completed cycle.
    last: Option<(usize, u64)>,
    finished: bool,
}

impl Scheduler {
    pub(crate) fn new(runtime: Arc<Runtime>, clock: Arc<dyn Clock>) -> Result<Self, SchedulerError> {
        if runtime.scheduler_claimed.swap(true, Ordering::AcqRel) {
            return Err(SchedulerError::AlreadyRunning);
        }

        let slots = runtime.states.iter().map(|s| s.plans.len()).max().unwrap_or(0);
        let deadline = DeadlineTracker::new(runtime.policy.overrun);
        let shared = Arc::new(Shared {
            runtime,
            clock,
            start: Barrier::new(slots + 1),
            end: Barrier::new(slots + 1),
            shutdown: AtomicBool::new(false),
        });

        // Workers wait on a gate so that a failed spawn can release the ones
        // already started without them ever reaching the barrier.
        let mut gates = Vec::with_capacity(slots);
        let mut workers = Vec::with_capacity(slots);
        for slot in 0..slots {
            let name = format!("metronome-w{slot}");
            let (go, gate) = mpsc::channel::<()>();
            let worker_shared = Arc::clone(&shared);
            let spawned = thread::Builder::new().name(name.clone()).spawn(move || {
                if gate.recv().is_ok() {
                    worker_loop(&worker_shared, slot);
                }
            });
            match spawned {
                Ok(handle) => {
                    gates.push(go);
                    workers.push((name, handle));
                }
                Err(source) => {
                    drop(gates);
                    for (_, h) in workers {
                        let _ = h.join();
                    }
                    shared
                        .runtime
                        .scheduler_claimed
                        .store(false, Ordering::Release);
                    error!(worker = %name, %source, "✗ worker spawn failed");
                    return Err(SchedulerError::Spawn { name, source });
                }
            }
        }
        for go in gates {
            let _ = go.send(());
        }

        let rt = &shared.runtime;
        for slot in 0..slots {
            for state in &rt.states {
                if let Some(plan) = state.plans.get(slot) {
                    debug!(
                        worker = slot,
                        state = %state.name,
                        plan = %plan.name,
                        period_us = plan.period_us,
                        cpus = ?plan.affinity.cpus(),
                        "worker plan"
                    );
                }
            }
        }
        info!(
            application = %rt.name,
            workers = slots,
            state = %rt.active_state().name,
            "scheduler ready"
        );

        Ok(Self {
            shared,
            workers,
            deadline,
            last: None,
            finished: false,
        })
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle::new(Arc::clone(&self.shared.runtime))
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Runs one cycle of the active State, then swaps the signal buffers and
    /// hands over to a requested State.  If a stop was requested, the
    /// scheduler shuts down instead of running the cycle.
    ///
    /// # Errors
    /// * [`SchedulerError::Stopped`] – called after shutdown.
    /// * [`SchedulerError::OverrunLimitExceeded`] – this cycle started late
    ///   once too often; the scheduler has shut down.
    pub fn step(&mut self) -> Result<(), SchedulerError> {
        if self.finished {
            return Err(SchedulerError::Stopped);
        }
        let rt = Arc::clone(&self.shared.runtime);
        if rt.stop_requested.load(Ordering::Acquire) {
            return self.finish();
        }

        let active = rt.active.load(Ordering::Acquire);
        let state = &rt.states[active];
        let cycle = rt.cycle.load(Ordering::Acquire);

        if let Wake::Late { late_by } = self.deadline.wait(self.shared.clock.as_ref()) {
            rt.diagnostics.overrun(CycleOverrun {
                state: state.name.clone(),
                cycle,
                late_by,
                plans: self.last_plans(),
            });
            if let Some(limit) = self.deadline.limit_exceeded() {
                let consecutive = self.deadline.consecutive();
                error!(state = %state.name, consecutive, limit, "✗ overrun limit exceeded, stopping");
                self.finish()?;
                return Err(SchedulerError::OverrunLimitExceeded {
                    state: state.name.clone(),
                    consecutive,
                    limit,
                });
            }
        }

        trace!(cycle, state = %state.name, "cycle start");
        self.shared.start.wait();
        self.shared.end.wait();

        rt.store.swap_buffers();
        let tick = cycle.saturating_sub(rt.entered_at.load(Ordering::Acquire));
        self.last = Some((active, tick));
        rt.cycle.store(cycle + 1, Ordering::Release);
        rt.diagnostics.cycle_completed();
        self.deadline.advance(state.frame.base_period());

        if rt.stop_requested.load(Ordering::Acquire) {
            return self.finish();
        }
        transition::handover(&rt, cycle + 1);
        Ok(())
    }

    /// Runs at most `n` cycles; fewer if the scheduler stops.  Returns the
    /// number of cycles executed.
    pub fn run_cycles(&mut self, n: u64) -> Result<u64, SchedulerError> {
        let before = self.shared.runtime.cycle.load(Ordering::Acquire);
        for _ in 0..n {
            if self.finished {
                break;
            }
            self.step()?;
        }
        Ok(self.shared.runtime.cycle.load(Ordering::Acquire) - before)
    }

    /// Runs until a stop is requested through a [`SchedulerHandle`].
    pub fn run(&mut self) -> Result<(), SchedulerError> {
        while !self.finished {
            self.step()?;
        }
        Ok(())
    }

    /// Runs on a dedicated controller thread.
    pub fn start(self) -> Result<RunningScheduler, SchedulerError> {
        let handle = self.handle();
        let name = String::from("metronome-ctl");
        let join = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let mut scheduler = self;
                scheduler.run()
            })
            .map_err(|source| SchedulerError::Spawn { name, source })?;
        Ok(RunningScheduler { handle, join })
    }

    /// Stops at once (between cycles) and joins the workers.
    pub fn stop(mut self) -> Result<(), SchedulerError> {
        self.finish()
    }

    fn last_plans(&self) -> Vec<String> {
        let Some((s, tick)) = self.last else {
            return Vec::new();
        };
        let state = &self.shared.runtime.states[s];
        state
            .plans
            .iter()
            .enumerate()
            .filter(|(i, _)| state.frame.is_due(*i, tick))
            .map(|(_, p)| p.name.clone())
            .collect()
    }

    fn finish(&mut self) -> Result<(), SchedulerError> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        let rt = &self.shared.runtime;
        rt.stopped.store(true, Ordering::Release);
        transition::discard_pending(rt);

        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.start.wait();

        let mut result = Ok(());
        for (name, handle) in self.workers.drain(..) {
            if handle.join().is_err() {
                error!(worker = %name, "✗ worker panicked");
                result = Err(SchedulerError::WorkerPanicked(name));
            }
        }
        info!(
            cycles = rt.cycle.load(Ordering::Acquire),
            state = %rt.active_state().name,
            "scheduler stopped"
        );
        result
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}

// ── Handles ───────────────────────────────────────────────────────────────────

/// Cloneable, thread-safe control surface of a running application.
#[derive(Clone)]
pub struct SchedulerHandle {
    runtime: Arc<Runtime>,
}

impl std::fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerHandle")
            .field("state", &self.current_state())
            .field("cycle", &self.cycle())
            .finish()
    }
}

impl SchedulerHandle {
    pub(crate) fn new(runtime: Arc<Runtime>) -> Self {
        Self { runtime }
    }

    /// See [`Application::request_state_change`](crate::Application::request_state_change).
    pub fn request_state_change(&self, state: &str) -> Result<TransitionOutcome, TransitionError> {
        transition::request(&self.runtime, state)
    }

    /// Asks the scheduler to stop at the next cycle boundary.
    pub fn request_stop(&self) {
        if !self.runtime.stop_requested.swap(true, Ordering::AcqRel) {
            info!("stop requested");
        }
    }

    pub fn current_state(&self) -> &str {
        self.runtime.active_state().name()
    }

    pub fn cycle(&self) -> u64 {
        self.runtime.cycle.load(Ordering::Acquire)
    }

    pub fn is_stopped(&self) -> bool {
        self.runtime.stopped.load(Ordering::Acquire)
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.runtime.diagnostics
    }
}

/// A scheduler running on its own controller thread.
pub struct RunningScheduler {
    handle: SchedulerHandle,
    join: JoinHandle<Result<(), SchedulerError>>,
}

impl RunningScheduler {
    pub fn handle(&self) -> &SchedulerHandle {
        &self.handle
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Requests a stop and waits for the controller to finish.
    pub fn stop(self) -> Result<(), SchedulerError> {
        self.handle.request_stop();
        self.wait()
    }

    /// Waits for the controller without requesting a stop.
    pub fn wait(self) -> Result<(), SchedulerError> {
        self.join
            .join()
            .map_err(|_| SchedulerError::WorkerPanicked("metronome-ctl".into()))?
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
