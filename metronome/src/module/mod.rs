/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Modules: the units of computation scheduled inside Thread Plans.
//!
//! A module implements the [`Module`] trait and is wrapped by the framework
//! in a [`ModuleInstance`], which enforces the lifecycle
//!
//! ```text
//! Unconfigured ──initialise──▶ Initialised ──setup──▶ Ready ──execute──▶ Executing ─┐
//!                                                                         ▲          │
//!                                                                         └─execute──┘
//!                                                            any ──terminate──▶ Terminated
//! ```
//!
//! and owns the module's resolved [`SignalBindings`].  Destruction is plain
//! `Drop`.

pub mod binding;
pub mod builtin;
pub mod context;
pub mod registry;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::debug;

use crate::error::{BindingError, ConfigurationError, SignalError};
use crate::signal::{SignalHandle, SignalStore, View};

pub use binding::{Binding, BindingSpec, IoContext, ModuleIo, SignalBindings};
pub use context::DoubleSlot;
pub use registry::ModuleRegistry;

// ── Module trait ──────────────────────────────────────────────────────────────

/// User-defined computation.
///
/// `execute` runs on a scheduler worker thread once per activation of the
/// owning Thread Plan.  It must not block and should not allocate; buffers
/// belong in `setup`.
pub trait Module: Send {
    /// Reads parameters.  Called once, before any signal exists.
    fn initialise(&mut self, config: &ModuleConfig) -> Result<(), ConfigurationError>;

    /// Checks the resolved bindings (types, element counts, arity) and sizes
    /// any working buffers.
    fn setup(&mut self, _bindings: &SignalBindings) -> Result<(), BindingError> {
        Ok(())
    }

    /// One cycle of work.
    fn execute(&mut self, io: &mut ModuleIo<'_>) -> Result<(), ModuleFailure>;

    /// Called at the cycle boundary that switches States, for every module
    /// scheduled in the incoming State, while no plan is executing.
    fn prepare_next_state(&mut self, _change: &StateChange<'_>) {}
}

/// A module's report that its cycle failed.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{reason}")]
pub struct ModuleFailure {
    reason: String,
}

impl ModuleFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl From<SignalError> for ModuleFailure {
    fn from(e: SignalError) -> Self {
        Self::new(e.to_string())
    }
}

/// The State switch announced to [`Module::prepare_next_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange<'a> {
    /// `None` when the application enters its initial State.
    pub from: Option<&'a str>,
    pub to: &'a str,
}

// ── Configuration ─────────────────────────────────────────────────────────────

/// Free-form module parameters, as written in the configuration file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(BTreeMap<String, serde_yaml::Value>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<serde_yaml::Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&serde_yaml::Value> {
        self.0.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Optional numeric parameter.
    pub fn f64(&self, module: &str, key: &str) -> Result<Option<f64>, ConfigurationError> {
        match self.get(key) {
            None => Ok(None),
            Some(v) => v
                .as_f64()
                .map(Some)
                .ok_or_else(|| invalid(module, key, "must be a number")),
        }
    }

    pub fn f64_or(&self, module: &str, key: &str, default: f64) -> Result<f64, ConfigurationError> {
        Ok(self.f64(module, key)?.unwrap_or(default))
    }

    /// Accepts either a single number or a list of numbers.
    pub fn f64_list(&self, module: &str, key: &str) -> Result<Option<Vec<f64>>, ConfigurationError> {
        match self.get(key) {
            None => Ok(None),
            Some(serde_yaml::Value::Sequence(items)) => items
                .iter()
                .map(|v| v.as_f64().ok_or_else(|| invalid(module, key, "must only hold numbers")))
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            Some(v) => v
                .as_f64()
                .map(|x| Some(vec![x]))
                .ok_or_else(|| invalid(module, key, "must be a number or a list of numbers")),
        }
    }

    /// A `name: number` mapping; empty when absent.
    pub fn f64_map(&self, module: &str, key: &str) -> Result<BTreeMap<String, f64>, ConfigurationError> {
        let Some(value) = self.get(key) else {
            return Ok(BTreeMap::new());
        };
        let map = value
            .as_mapping()
            .ok_or_else(|| invalid(module, key, "must be a mapping of names to numbers"))?;
        map.iter()
            .map(|(k, v)| {
                let name = k
                    .as_str()
                    .ok_or_else(|| invalid(module, key, "keys must be strings"))?;
                let x = v
                    .as_f64()
                    .ok_or_else(|| invalid(module, key, "values must be numbers"))?;
                Ok((name.to_string(), x))
            })
            .collect()
    }
}

fn invalid(module: &str, key: &str, reason: &str) -> ConfigurationError {
    ConfigurationError::InvalidParameter {
        module: module.to_string(),
        param: key.to_string(),
        reason: reason.to_string(),
    }
}

/// Declaration of one module instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleConfig {
    pub name: String,
    /// Registry key of the implementation.
    pub class: String,
    pub inputs: Vec<BindingSpec>,
    pub outputs: Vec<BindingSpec>,
    pub params: Params,
}

impl ModuleConfig {
    pub fn new(name: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            class: class.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            params: Params::new(),
        }
    }

    pub fn input(mut self, spec: impl Into<BindingSpec>) -> Self {
        self.inputs.push(spec.into());
        self
    }

    pub fn output(mut self, spec: impl Into<BindingSpec>) -> Self {
        self.outputs.push(spec.into());
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<serde_yaml::Value>) -> Self {
        self.params.insert(key, value);
        self
    }
}

// ── Lifecycle ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Unconfigured,
    Initialised,
    Ready,
    Executing,
    Terminated,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Lifecycle::Unconfigured => "unconfigured",
            Lifecycle::Initialised => "initialised",
            Lifecycle::Ready => "ready",
            Lifecycle::Executing => "executing",
            Lifecycle::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// Locks a module slot.  A module that panicked mid-`execute` has already
/// been reported as failed, so a poisoned lock is recovered.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── ModuleInstance ────────────────────────────────────────────────────────────

/// A module plus its framework-side state.
pub struct ModuleInstance {
    name: String,
    class: String,
    lifecycle: Lifecycle,
    bindings: SignalBindings,
    exec_time: Option<SignalHandle>,
    logic: Box<dyn Module>,
}

impl fmt::Debug for ModuleInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleInstance")
            .field("name", &self.name)
            .field("class", &self.class)
            .field("lifecycle", &self.lifecycle)
            .finish_non_exhaustive()
    }
}

impl ModuleInstance {
    pub fn new(name: impl Into<String>, class: impl Into<String>, logic: Box<dyn Module>) -> Self {
        let name = name.into();
        Self {
            bindings: SignalBindings::empty(&name),
            name,
            class: class.into(),
            lifecycle: Lifecycle::Unconfigured,
            exec_time: None,
            logic,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn bindings(&self) -> &SignalBindings {
        &self.bindings
    }

    /// `Unconfigured → Initialised`.
    pub fn initialise(&mut self, config: &ModuleConfig) -> Result<(), ConfigurationError> {
        if self.lifecycle != Lifecycle::Unconfigured {
            return Err(ConfigurationError::Lifecycle {
                module: self.name.clone(),
                expected: Lifecycle::Unconfigured,
                found: self.lifecycle,
            });
        }
        self.logic.initialise(config)?;
        self.bindings = SignalBindings::declare(&self.name, &config.inputs, &config.outputs);
        self.lifecycle = Lifecycle::Initialised;
        debug!(module = %self.name, class = %self.class, "initialised");
        Ok(())
    }

    /// `Initialised → Ready`: resolves bindings against `store` and lets the
    /// module check them.
    pub fn setup(&mut self, store: &SignalStore) -> Result<(), BindingError> {
        if self.lifecycle != Lifecycle::Initialised {
            return Err(BindingError::Lifecycle {
                module: self.name.clone(),
                expected: Lifecycle::Initialised,
                found: self.lifecycle,
            });
        }
        self.bindings.resolve(store)?;
        self.logic.setup(&self.bindings)?;
        self.lifecycle = Lifecycle::Ready;
        debug!(
            module = %self.name,
            inputs = self.bindings.inputs().len(),
            outputs = self.bindings.outputs().len(),
            "ready"
        );
        Ok(())
    }

    /// Runs one cycle.  `views` gives the generation each input is read from.
    pub fn execute(&mut self, ctx: IoContext<'_>, views: &[View]) -> Result<(), ModuleFailure> {
        match self.lifecycle {
            Lifecycle::Ready | Lifecycle::Executing => {}
            other => {
                return Err(ModuleFailure::new(format!(
                    "module '{}' is {other} and cannot execute",
                    self.name
                )))
            }
        }
        self.lifecycle = Lifecycle::Executing;
        let mut io = ModuleIo::new(&self.name, &self.bindings, views, ctx);
        self.logic.execute(&mut io)
    }

    pub fn prepare_next_state(&mut self, change: &StateChange<'_>) {
        if self.lifecycle != Lifecycle::Terminated {
            self.logic.prepare_next_state(change);
        }
    }

    pub fn terminate(&mut self) {
        if self.lifecycle != Lifecycle::Terminated {
            debug!(module = %self.name, "terminated");
            self.lifecycle = Lifecycle::Terminated;
        }
    }

    pub(crate) fn set_exec_time_signal(&mut self, handle: SignalHandle) {
        self.exec_time = Some(handle);
    }

    pub(crate) fn exec_time_signal(&self) -> Option<SignalHandle> {
        self.exec_time
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Diagnostics;
    use crate::signal::{SignalDecl, SignalType, Value};

    struct Echo;

    impl Module for Echo {
        fn initialise(&mut self, _config: &ModuleConfig) -> Result<(), ConfigurationError> {
            Ok(())
        }

        fn execute(&mut self, io: &mut ModuleIo<'_>) -> Result<(), ModuleFailure> {
            let v = io.input(0)?;
            io.set_output(0, v)?;
            Ok(())
        }
    }

    fn store() -> SignalStore {
        SignalStore::new(vec![
            SignalDecl::scalar("In", SignalType::UInt32).with_default(4u32),
            SignalDecl::scalar("Out", SignalType::UInt32),
        ])
        .unwrap()
    }

    fn config() -> ModuleConfig {
        ModuleConfig::new("Echo", "Echo").input("In").output("Out")
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    #[test]
    fn full_lifecycle() {
        let store = store();
        let diagnostics = Diagnostics::new(8);
        let mut m = ModuleInstance::new("Echo", "Echo", Box::new(Echo));
        assert_eq!(m.lifecycle(), Lifecycle::Unconfigured);

        m.initialise(&config()).unwrap();
        assert_eq!(m.lifecycle(), Lifecycle::Initialised);

        m.setup(&store).unwrap();
        assert_eq!(m.lifecycle(), Lifecycle::Ready);

        let ctx = IoContext::new(&store, &diagnostics, 0);
        m.execute(ctx, &[View::Previous]).unwrap();
        assert_eq!(m.lifecycle(), Lifecycle::Executing);
        assert_eq!(store.read_current("Out").unwrap(), Value::UInt32(4));

        m.terminate();
        assert_eq!(m.lifecycle(), Lifecycle::Terminated);
        assert!(m.execute(ctx, &[View::Previous]).is_err());
    }

    #[test]
    fn setup_before_initialise_is_rejected() {
        let mut m = ModuleInstance::new("Echo", "Echo", Box::new(Echo));
        let err = m.setup(&store()).unwrap_err();
        assert!(matches!(
            err,
            BindingError::Lifecycle {
                expected: Lifecycle::Initialised,
                found: Lifecycle::Unconfigured,
                ..
            }
        ));
    }

    #[test]
    fn initialise_twice_is_rejected() {
        let mut m = ModuleInstance::new("Echo", "Echo", Box::new(Echo));
        m.initialise(&config()).unwrap();
        assert!(matches!(
            m.initialise(&config()),
            Err(ConfigurationError::Lifecycle { .. })
        ));
    }

    #[test]
    fn execute_before_setup_fails() {
        let store = store();
        let diagnostics = Diagnostics::new(8);
        let mut m = ModuleInstance::new("Echo", "Echo", Box::new(Echo));
        m.initialise(&config()).unwrap();
        let ctx = IoContext::new(&store, &diagnostics, 0);
        assert!(m.execute(ctx, &[]).is_err());
    }

    // ── Params ────────────────────────────────────────────────────────────────

    #[test]
    fn params_accept_scalars_lists_and_maps() {
        let mut p = Params::new();
        p.insert("gain", 2);
        p.insert("values", vec![1.0, 2.5]);
        let mut gains = serde_yaml::Mapping::new();
        gains.insert("Run".into(), 3.0.into());
        p.insert("gains", gains);

        assert_eq!(p.f64("m", "gain").unwrap(), Some(2.0));
        assert_eq!(p.f64_list("m", "gain").unwrap(), Some(vec![2.0]));
        assert_eq!(p.f64_list("m", "values").unwrap(), Some(vec![1.0, 2.5]));
        assert_eq!(p.f64_map("m", "gains").unwrap().get("Run"), Some(&3.0));
        assert_eq!(p.f64_or("m", "missing", 7.0).unwrap(), 7.0);
    }

    #[test]
    fn non_numeric_param_is_an_error() {
        let mut p = Params::new();
        p.insert("gain", "high");
        assert!(matches!(
            p.f64("m", "gain"),
            Err(ConfigurationError::InvalidParameter { .. })
        ));
    }
}
