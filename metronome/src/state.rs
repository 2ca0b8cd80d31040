/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! States: named sets of Thread Plans, exactly one of which is active.
//!
//! Switching States changes which modules produce which signals.  At the
//! switching boundary a buffered signal is restored to its declared default
//! when
//!
//! * the incoming State produces it and the outgoing State did not, or
//! * it is marked `reset_on_exit` and the outgoing State produced it.
//!
//! Every other signal keeps the value of the last generation.  Persistent
//! signals are never touched.

use std::collections::BTreeSet;

use crate::frame::CycleFrame;
use crate::plan::ThreadPlan;
use crate::signal::{SignalId, SignalStore};

#[derive(Debug, Clone)]
pub struct State {
    pub(crate) name: String,
    pub(crate) plans: Vec<ThreadPlan>,
    pub(crate) frame: CycleFrame,
    /// Signals written by some module of this State.
    pub(crate) produced: BTreeSet<SignalId>,
}

impl State {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn plans(&self) -> &[ThreadPlan] {
        &self.plans
    }

    pub fn frame(&self) -> &CycleFrame {
        &self.frame
    }

    pub fn produces(&self, id: SignalId) -> bool {
        self.produced.contains(&id)
    }

    /// Module-table indices of every module scheduled in this State.
    pub fn module_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.plans
            .iter()
            .flat_map(|p| p.entries.iter().map(|e| e.module))
    }
}

/// Signals to restore to their defaults when switching from `from` to `to`.
pub fn transition_resets(from: &State, to: &State, store: &SignalStore) -> Vec<SignalId> {
    store
        .decls()
        .filter(|(id, decl)| {
            if decl.is_persistent() {
                return false;
            }
            let newly_produced = to.produces(*id) && !from.produces(*id);
            let released = decl.reset_on_exit && from.produces(*id);
            newly_produced || released
        })
        .map(|(id, _)| id)
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::DEFAULT_HYPERPERIOD_LIMIT_US;
    use crate::signal::{SignalDecl, SignalType};

    fn state(name: &str, store: &SignalStore, produced: &[&str]) -> State {
        State {
            name: name.into(),
            plans: Vec::new(),
            frame: CycleFrame::compute(&[("P", 1_000)], DEFAULT_HYPERPERIOD_LIMIT_US).unwrap(),
            produced: produced.iter().map(|p| store.id_of(p).unwrap()).collect(),
        }
    }

    fn store() -> SignalStore {
        SignalStore::new(vec![
            SignalDecl::scalar("Shared", SignalType::UInt32),
            SignalDecl::scalar("OnlyB", SignalType::UInt32),
            SignalDecl::scalar("Volatile", SignalType::UInt32).reset_on_exit(),
            SignalDecl::scalar("Kept", SignalType::Float64).persistent("M"),
        ])
        .unwrap()
    }

    #[test]
    fn newly_produced_signals_are_reset() {
        let s = store();
        let a = state("A", &s, &["Shared"]);
        let b = state("B", &s, &["Shared", "OnlyB"]);
        let resets = transition_resets(&a, &b, &s);
        assert_eq!(resets, vec![s.id_of("OnlyB").unwrap()]);
    }

    #[test]
    fn reset_on_exit_applies_when_leaving_a_producer() {
        let s = store();
        let a = state("A", &s, &["Volatile"]);
        let b = state("B", &s, &["Volatile"]);
        assert_eq!(transition_resets(&a, &b, &s), vec![s.id_of("Volatile").unwrap()]);
        // Not produced by the outgoing State: nothing to release.
        let c = state("C", &s, &[]);
        assert!(transition_resets(&c, &c, &s).is_empty());
    }

    #[test]
    fn persistent_signals_are_never_reset() {
        let s = store();
        let a = state("A", &s, &[]);
        let b = state("B", &s, &["Kept"]);
        assert!(transition_resets(&a, &b, &s).is_empty());
    }
}
