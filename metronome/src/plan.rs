/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Thread Plans: ordered module sequences executed periodically by one
//! scheduler worker.
//!
//! Within a plan, modules run strictly in declaration order.  An input whose
//! producer is an earlier module of the same plan is read from the current
//! generation ([`View::Current`]); every other input is read from the
//! generation published at the last swap.

use std::time::Duration;

use crate::signal::{SignalHandle, View};

// ── CpuAffinity ───────────────────────────────────────────────────────────────

/// CPU placement hint for a plan's worker.
///
/// Recorded and logged when the worker starts; binding the thread to cores
/// is left to the deployment (e.g. `taskset` on the process).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CpuAffinity {
    /// No preference.
    #[default]
    Any,

    /// Bit N set means CPU N is preferred.  E.g. `0x0C` = CPUs 2 and 3.
    Mask(u64),
}

impl CpuAffinity {
    /// `0` and all-ones mean "no preference".
    pub fn from_mask(mask: u64) -> Self {
        if mask == 0 || mask == u64::MAX {
            CpuAffinity::Any
        } else {
            CpuAffinity::Mask(mask)
        }
    }

    pub fn allows_cpu(&self, cpu: u32) -> bool {
        match self {
            CpuAffinity::Any => true,
            CpuAffinity::Mask(mask) => cpu < 64 && (mask >> cpu) & 1 == 1,
        }
    }

    /// Preferred CPUs in ascending order; empty for [`CpuAffinity::Any`].
    pub fn cpus(&self) -> Vec<u32> {
        match self {
            CpuAffinity::Any => Vec::new(),
            CpuAffinity::Mask(mask) => (0..64).filter(|c| (mask >> c) & 1 == 1).collect(),
        }
    }
}

// ── ThreadPlan ────────────────────────────────────────────────────────────────

/// One scheduled module and the generation each of its inputs is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    /// Index into the application's module table.
    pub(crate) module: usize,
    pub(crate) input_views: Vec<View>,
}

impl PlanEntry {
    pub fn module_index(&self) -> usize {
        self.module
    }

    pub fn input_views(&self) -> &[View] {
        &self.input_views
    }
}

#[derive(Debug, Clone)]
pub struct ThreadPlan {
    pub(crate) name: String,
    pub(crate) period_us: u64,
    pub(crate) affinity: CpuAffinity,
    pub(crate) entries: Vec<PlanEntry>,
    /// `<State>.<Plan>_CycleTime` timing signal, when enabled.
    pub(crate) cycle_time: Option<SignalHandle>,
}

impl ThreadPlan {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn period_us(&self) -> u64 {
        self.period_us
    }

    pub fn period(&self) -> Duration {
        Duration::from_micros(self.period_us)
    }

    pub fn affinity(&self) -> CpuAffinity {
        self.affinity
    }

    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
