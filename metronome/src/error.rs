/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error types for application assembly and signal access.
//!
//! | Enum | Raised by | When |
//! |------|-----------|------|
//! | [`ConfigurationError`] | config checks, [`SignalStore::new`], module initialise | before any cycle runs |
//! | [`BindingError`] | module setup | resolving a module's signal names against the store |
//! | [`SignalError`] | [`SignalStore`] accessors, module I/O | at any time, including the hot path |
//! | [`StartupError`] | [`Application::build`] | union of the first two |
//!
//! Scheduler-side errors live in [`crate::scheduler::error`].
//!
//! [`SignalStore`]: crate::signal::SignalStore
//! [`SignalStore::new`]: crate::signal::SignalStore::new
//! [`Application::build`]: crate::application::Application::build

use std::fmt;

use thiserror::Error;

use crate::frame::FrameError;
use crate::module::Lifecycle;
use crate::signal::SignalType;

// ── Signal access ─────────────────────────────────────────────────────────────

/// Which side of a module binding an access referred to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => f.write_str("input"),
            Direction::Output => f.write_str("output"),
        }
    }
}

/// A rejected read or write.  The store is never modified by a failed access.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SignalError {
    #[error("unknown signal '{0}'")]
    UnknownSignal(String),

    #[error("signal '{path}' is declared {expected} but was accessed as {found}")]
    TypeMismatch {
        path: String,
        expected: SignalType,
        found: SignalType,
    },

    #[error("signal '{path}' has {expected} element(s) but the access used {found}")]
    ElementCountMismatch {
        path: String,
        expected: usize,
        found: usize,
    },

    #[error("element {index} is out of range for signal '{path}' ({elements} element(s))")]
    IndexOutOfRange {
        path: String,
        index: usize,
        elements: usize,
    },

    #[error("no {direction} bound at index {index}")]
    Unbound { direction: Direction, index: usize },
}

// ── Configuration ─────────────────────────────────────────────────────────────

/// Structural problems in an application description.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("signal '{0}' is declared more than once")]
    DuplicateSignal(String),

    #[error("signal '{path}' is invalid: {reason}")]
    InvalidSignal { path: String, reason: String },

    #[error("persistent signal '{signal}' names owner '{owner}', which is not a declared module")]
    UnknownOwner { signal: String, owner: String },

    #[error("module '{0}' is declared more than once")]
    DuplicateModule(String),

    #[error("module '{module}' uses class '{class}', which is not registered")]
    UnknownModuleClass { module: String, class: String },

    #[error("module '{module}': parameter '{param}' {reason}")]
    InvalidParameter {
        module: String,
        param: String,
        reason: String,
    },

    #[error("module '{module}' is {found}, expected {expected}")]
    Lifecycle {
        module: String,
        expected: Lifecycle,
        found: Lifecycle,
    },

    #[error("the application declares no states")]
    NoStates,

    #[error("state '{0}' is declared more than once")]
    DuplicateState(String),

    #[error("initial state '{0}' is not declared")]
    UnknownInitialState(String),

    #[error("state '{0}' has no thread plans")]
    EmptyState(String),

    #[error("state '{state}' declares thread plan '{plan}' more than once")]
    DuplicatePlan { state: String, plan: String },

    #[error("thread plan '{state}.{plan}' has no modules")]
    EmptyPlan { state: String, plan: String },

    #[error("thread plan '{state}.{plan}' has a zero period")]
    InvalidPeriod { state: String, plan: String },

    #[error("thread plan '{state}.{plan}' references undeclared module '{module}'")]
    UnknownModule {
        state: String,
        plan: String,
        module: String,
    },

    #[error("module '{module}' is scheduled more than once in state '{state}'")]
    ModuleScheduledTwice { state: String, module: String },

    #[error("signal '{signal}' has two producers in state '{state}': '{first}' and '{second}'")]
    MultipleProducers {
        state: String,
        signal: String,
        first: String,
        second: String,
    },

    #[error("state '{state}': {source}")]
    Frame {
        state: String,
        #[source]
        source: FrameError,
    },
}

// ── Binding ───────────────────────────────────────────────────────────────────

/// Failures while resolving a module's declared inputs/outputs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BindingError {
    #[error("module '{module}' binds unknown signal '{signal}'")]
    UnknownSignal { module: String, signal: String },

    #[error("module '{module}' expects '{signal}' to be {expected}, but it is declared {found}")]
    TypeMismatch {
        module: String,
        signal: String,
        expected: SignalType,
        found: SignalType,
    },

    #[error(
        "module '{module}' expects '{signal}' to have {expected} element(s), but it has {found}"
    )]
    ElementCountMismatch {
        module: String,
        signal: String,
        expected: usize,
        found: usize,
    },

    #[error("module '{module}' cannot bind persistent signal '{signal}' owned by '{owner}'")]
    PersistentNotOwned {
        module: String,
        signal: String,
        owner: String,
    },

    #[error("module '{module}' is {found}, expected {expected}")]
    Lifecycle {
        module: String,
        expected: Lifecycle,
        found: Lifecycle,
    },

    #[error("module '{module}' rejected its bindings: {reason}")]
    Rejected { module: String, reason: String },
}

// ── Startup ───────────────────────────────────────────────────────────────────

/// Everything that can stop an application from being assembled.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StartupError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Binding(#[from] BindingError),
}
