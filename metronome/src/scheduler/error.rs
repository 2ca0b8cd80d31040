/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Error types of the cyclic executive.
//!
//! * [`SchedulerError`] – the scheduler itself cannot continue (or start).
//! * [`TransitionError`] – a State change request was refused; the running
//!   State is unaffected.
//!
//! Faults that do not stop the scheduler (cycle overruns, module failures,
//! rejected signal accesses) are reported through
//! [`Diagnostics`](super::Diagnostics) instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    /// [`Application::scheduler`](crate::Application::scheduler) was called
    /// twice.
    #[error("the application already has a scheduler")]
    AlreadyRunning,

    #[error("the scheduler has been shut down")]
    Stopped,

    /// [`Application::shutdown`](crate::Application::shutdown) was called
    /// before the scheduler was shut down.
    #[error("the scheduler is still running")]
    StillRunning,

    #[error("failed to spawn worker thread '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("worker thread '{0}' panicked")]
    WorkerPanicked(String),

    /// The [`OverrunPolicy`](super::OverrunPolicy) limit was exceeded; the
    /// scheduler stopped at the boundary that detected it.
    #[error("state '{state}' overran {consecutive} consecutive cycles (limit {limit})")]
    OverrunLimitExceeded {
        state: String,
        consecutive: u32,
        limit: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("unknown state '{0}'")]
    UnknownState(String),

    #[error("the scheduler is not running")]
    NotRunning,
}
