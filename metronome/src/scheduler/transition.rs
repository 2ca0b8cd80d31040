/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! State-transition protocol.
//!
//! | Phase | Thread | Work |
//! |-------|--------|------|
//! | request | caller | name lookup, no-op detection, enqueue |
//! | handover | scheduler controller, workers parked | signal resets, `prepare_next_state`, active-index store |
//!
//! Everything a handover needs (the reset set for each State pair) is
//! computed when the application is built, so the handover is bounded by
//! the size of the incoming State.
//!
//! Several requests reaching the same boundary: the last one wins and the
//! earlier ones are reported as [`DiscardReason::Superseded`].

use std::sync::atomic::Ordering;

use tracing::{debug, info, warn};

use super::diagnostics::DiscardReason;
use super::error::TransitionError;
use crate::application::Runtime;
use crate::module::{lock, StateChange};
use crate::signal::Value;

/// Result of an accepted [`request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// Takes effect at the next cycle boundary.
    Queued,
    /// The State is already active and nothing else is queued.
    AlreadyActive,
}

/// Pending requests plus the State a handover in progress is entering.
/// A request made during a handover is compared against `incoming`.
#[derive(Debug, Default)]
pub(crate) struct RequestQueue {
    /// Queued State indices, oldest first.
    queued: Vec<usize>,
    /// Set from the moment a handover picks its target until `active` holds it.
    incoming: Option<usize>,
}

pub(crate) fn request(rt: &Runtime, name: &str) -> Result<TransitionOutcome, TransitionError> {
    let target = rt
        .state_index(name)
        .ok_or_else(|| TransitionError::UnknownState(name.to_string()))?;
    if rt.stopped.load(Ordering::Acquire) {
        return Err(TransitionError::NotRunning);
    }

    let mut queue = lock(&rt.requests);
    let settled = queue
        .incoming
        .unwrap_or_else(|| rt.active.load(Ordering::Acquire));
    if queue.queued.is_empty() && target == settled {
        debug!(state = name, "state already active");
        return Ok(TransitionOutcome::AlreadyActive);
    }
    queue.queued.push(target);
    info!(state = name, queued = queue.queued.len(), "state change requested");
    Ok(TransitionOutcome::Queued)
}

/// Applies the newest queued request.  `next_cycle` is the index of the
/// first cycle that will run in the new State.
///
/// Must only run while no worker is executing.
pub(crate) fn handover(rt: &Runtime, next_cycle: u64) {
    let (from, target) = {
        let mut queue = lock(&rt.requests);
        let queued = std::mem::take(&mut queue.queued);
        let Some((&target, superseded)) = queued.split_last() else {
            return;
        };
        for &s in superseded {
            info!(state = %rt.states[s].name, "state change superseded");
            rt.diagnostics
                .transition_discarded(&rt.states[s].name, DiscardReason::Superseded);
        }

        let from = rt.active.load(Ordering::Acquire);
        if from == target {
            debug!(state = %rt.states[target].name, "state change resolved to the active state");
            return;
        }
        queue.incoming = Some(target);
        (from, target)
    };
    let (from_state, to_state) = (&rt.states[from], &rt.states[target]);

    for &id in &rt.resets[from][target] {
        if let Err(e) = rt.store.reset_to_default(id) {
            warn!(error = %e, "signal reset failed");
        }
    }

    let change = StateChange {
        from: Some(&from_state.name),
        to: &to_state.name,
    };
    for m in to_state.module_indices() {
        lock(&rt.modules[m]).prepare_next_state(&change);
    }

    if let Some(h) = rt.current_state_signal {
        let _ = rt.store.overwrite_at(h, &[Value::UInt32(target as u32)]);
    }
    {
        let mut queue = lock(&rt.requests);
        rt.entered_at.store(next_cycle, Ordering::Release);
        rt.active.store(target, Ordering::Release);
        queue.incoming = None;
    }

    rt.diagnostics
        .transition_completed(&from_state.name, &to_state.name, next_cycle);
    info!(
        from = %from_state.name,
        to = %to_state.name,
        cycle = next_cycle,
        resets = rt.resets[from][target].len(),
        "✓ state change"
    );
}

/// Drops every queued request; used when the scheduler stops.
pub(crate) fn discard_pending(rt: &Runtime) {
    let queued = std::mem::take(&mut lock(&rt.requests).queued);
    for s in queued {
        info!(state = %rt.states[s].name, "state change discarded at stop");
        rt.diagnostics
            .transition_discarded(&rt.states[s].name, DiscardReason::Stopped);
    }
}
