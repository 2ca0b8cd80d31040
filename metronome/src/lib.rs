/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Metronome – cyclic real-time application executive
//!
//! An application is a set of [`module::Module`]s exchanging typed values
//! through a double-buffered [`signal::SignalStore`].  Modules are grouped
//! into periodic Thread Plans, plans into named States, and a
//! [`scheduler::Scheduler`] executes the active State once per cycle, swapping
//! the store at every cycle boundary and switching States only there.
//!
//! ```text
//! lib.rs
//! ├── error.rs        – startup error union
//! ├── signal/         – signal types, values and the double-buffered store
//! ├── module/         – Module trait, lifecycle, bindings, registry, built-ins
//! ├── plan.rs         – Thread Plans (periodic module sequences)
//! ├── state.rs        – States and signal ownership across transitions
//! ├── frame/          – per-State base tick / hyperperiod (GCD / LCM)
//! ├── clock.rs        – monotonic and manual clocks
//! ├── config/         – application description (builder + YAML) and checks
//! ├── scheduler/      – cyclic executive, transitions, overruns, diagnostics
//! └── application.rs  – assembly of everything above
//! ```

pub mod application;
pub mod clock;
pub mod config;
pub mod error;
pub mod frame;
pub mod module;
pub mod plan;
pub mod scheduler;
pub mod signal;
pub mod state;

pub use application::Application;
pub use error::StartupError;
