/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Application description: signals, modules, States and execution policy.
//!
//! An [`ApplicationConfig`] is either built in code (builder methods) or
//! loaded from YAML with [`ApplicationConfig::load_from_file`].  The expected
//! YAML structure is:
//! ```yaml
//! application:
//!   name: demo
//!   initial_state: State1
//!   module_failure: continue        # continue | skip_remaining
//!   overrun:
//!     tolerance_us: 200
//!     max_consecutive: 10
//!   timing_signals: true
//! data:
//!   DDB:
//!     X:     { type: uint32, default: 0 }
//!     Gains: { type: float64, elements: 3, default: [1.0, 2.0, 3.0] }
//!     Acc:   { type: float64, storage: persistent, owner: Integrator }
//! functions:
//!   ModA: { class: Adder, inputs: [DDB.X_in], outputs: [DDB.X], params: { offset: 1 } }
//! states:
//!   State1:
//!     threads:
//!       - name: Thread1
//!         period_us: 1000
//!         cpu_mask: 0x2
//!         functions: [ModA]
//! ```
//!
//! Signal paths are `<container>.<name>`.  Loading a file also runs
//! [`validate`]; [`Application::build`](crate::Application::build) runs it
//! again for configurations built in code.

pub mod validate;

pub use validate::validate;

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

use crate::frame::DEFAULT_HYPERPERIOD_LIMIT_US;
use crate::module::{BindingSpec, ModuleConfig, Params};
use crate::plan::CpuAffinity;
use crate::scheduler::{ExecutionPolicy, ModuleFailurePolicy, DEFAULT_EVENT_CAPACITY};
use crate::signal::{SignalDecl, SignalType, StorageClass, Value};

// ── Private YAML deserialization types ────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ApplicationFile {
    application: ApplicationEntry,
    #[serde(default)]
    data: BTreeMap<String, BTreeMap<String, SignalEntry>>,
    #[serde(default)]
    functions: BTreeMap<String, FunctionEntry>,
    #[serde(default)]
    states: BTreeMap<String, StateEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ApplicationEntry {
    name: String,
    initial_state: String,
    #[serde(default)]
    module_failure: FailureEntry,
    #[serde(default)]
    overrun: OverrunEntry,
    #[serde(default)]
    timing_signals: bool,
    #[serde(default = "default_hyperperiod_limit_us")]
    hyperperiod_limit_us: u64,
    #[serde(default = "default_event_capacity")]
    event_capacity: usize,
}

fn default_hyperperiod_limit_us() -> u64 {
    DEFAULT_HYPERPERIOD_LIMIT_US
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum FailureEntry {
    #[default]
    Continue,
    SkipRemaining,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct OverrunEntry {
    #[serde(default)]
    tolerance_us: u64,
    max_consecutive: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum StorageEntry {
    #[default]
    Buffered,
    Persistent,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SignalEntry {
    #[serde(rename = "type")]
    ty: String,
    #[serde(default = "default_elements")]
    elements: usize,
    /// A scalar (applied to every element) or one value per element.
    default: Option<serde_yaml::Value>,
    #[serde(default)]
    storage: StorageEntry,
    owner: Option<String>,
    #[serde(default)]
    reset_on_exit: bool,
}

fn default_elements() -> usize {
    1
}

/// A binding is either a bare signal path or a map with the expected shape.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BindingEntry {
    Path(String),
    Typed {
        signal: String,
        #[serde(rename = "type")]
        ty: Option<String>,
        elements: Option<usize>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FunctionEntry {
    class: String,
    #[serde(default)]
    inputs: Vec<BindingEntry>,
    #[serde(default)]
    outputs: Vec<BindingEntry>,
    #[serde(default)]
    params: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StateEntry {
    #[serde(default)]
    threads: Vec<ThreadEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ThreadEntry {
    name: String,
    period_us: u64,
    cpu_mask: Option<u64>,
    #[serde(default)]
    functions: Vec<String>,
}

// ── Public data structures ────────────────────────────────────────────────────

/// One Thread Plan as described: a period and an ordered module list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanConfig {
    pub name: String,
    pub period_us: u64,
    pub affinity: CpuAffinity,
    /// Module names, in execution order.
    pub modules: Vec<String>,
}

impl PlanConfig {
    pub fn new(name: impl Into<String>, period_us: u64) -> Self {
        Self {
            name: name.into(),
            period_us,
            affinity: CpuAffinity::Any,
            modules: Vec::new(),
        }
    }

    pub fn modules<I>(mut self, modules: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.modules.extend(modules.into_iter().map(Into::into));
        self
    }

    pub fn affinity(mut self, affinity: CpuAffinity) -> Self {
        self.affinity = affinity;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateConfig {
    pub name: String,
    pub plans: Vec<PlanConfig>,
}

impl StateConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            plans: Vec::new(),
        }
    }

    pub fn plan(mut self, plan: PlanConfig) -> Self {
        self.plans.push(plan);
        self
    }
}

/// Complete, unvalidated application description.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationConfig {
    pub name: String,
    pub initial_state: String,
    pub policy: ExecutionPolicy,
    /// Declare and maintain the `Timings.*` signals.
    pub timing_signals: bool,
    /// Upper bound for any State's hyperperiod, in µs.
    pub hyperperiod_limit_us: u64,
    /// Undrained diagnostic events kept before new ones are dropped.
    pub event_capacity: usize,
    pub signals: Vec<SignalDecl>,
    pub modules: Vec<ModuleConfig>,
    pub states: Vec<StateConfig>,
}

impl ApplicationConfig {
    pub fn new(name: impl Into<String>, initial_state: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            initial_state: initial_state.into(),
            policy: ExecutionPolicy::default(),
            timing_signals: false,
            hyperperiod_limit_us: DEFAULT_HYPERPERIOD_LIMIT_US,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            signals: Vec::new(),
            modules: Vec::new(),
            states: Vec::new(),
        }
    }

    pub fn signal(mut self, decl: SignalDecl) -> Self {
        self.signals.push(decl);
        self
    }

    pub fn module(mut self, module: ModuleConfig) -> Self {
        self.modules.push(module);
        self
    }

    pub fn state(mut self, state: StateConfig) -> Self {
        self.states.push(state);
        self
    }

    /// Parses and validates the YAML file at `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, the YAML is structurally
    /// invalid, a type name or default value is malformed, or the description
    /// fails [`validate`].
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading application description from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;
        let config = Self::from_yaml_str(&content)
            .with_context(|| format!("Invalid configuration file: {}", path.display()))?;

        info!(
            application = %config.name,
            signals = config.signals.len(),
            modules = config.modules.len(),
            states = config.states.len(),
            "✓ application description loaded"
        );
        Ok(config)
    }

    /// Same as [`load_from_file`](Self::load_from_file) for in-memory YAML.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let file: ApplicationFile =
            serde_yaml::from_str(yaml).context("Failed to parse YAML")?;
        let config = convert(file)?;
        validate(&config)?;
        Ok(config)
    }
}

// ── Conversion ────────────────────────────────────────────────────────────────

fn convert(file: ApplicationFile) -> Result<ApplicationConfig> {
    let app = file.application;
    let mut config = ApplicationConfig::new(app.name, app.initial_state);
    config.policy.module_failure = match app.module_failure {
        FailureEntry::Continue => ModuleFailurePolicy::Continue,
        FailureEntry::SkipRemaining => ModuleFailurePolicy::SkipRemaining,
    };
    config.policy.overrun.tolerance = std::time::Duration::from_micros(app.overrun.tolerance_us);
    config.policy.overrun.max_consecutive = app.overrun.max_consecutive;
    config.timing_signals = app.timing_signals;
    config.hyperperiod_limit_us = app.hyperperiod_limit_us;
    config.event_capacity = app.event_capacity;

    for (container, entries) in file.data {
        for (name, entry) in entries {
            let path = format!("{container}.{name}");
            let decl = signal_decl(&path, entry).with_context(|| format!("signal '{path}'"))?;
            debug!("  Signal: {} | {} x{}", decl.path, decl.ty, decl.elements);
            config.signals.push(decl);
        }
    }

    for (name, entry) in file.functions {
        let mut module = ModuleConfig::new(name.as_str(), entry.class);
        for b in entry.inputs {
            module.inputs.push(binding_spec(b).with_context(|| format!("module '{name}'"))?);
        }
        for b in entry.outputs {
            module.outputs.push(binding_spec(b).with_context(|| format!("module '{name}'"))?);
        }
        let mut params = Params::new();
        for (key, value) in entry.params {
            params.insert(key, value);
        }
        module.params = params;
        debug!(
            "  Module: {} | class {} | {} in / {} out",
            module.name,
            module.class,
            module.inputs.len(),
            module.outputs.len()
        );
        config.modules.push(module);
    }

    for (name, entry) in file.states {
        let mut state = StateConfig::new(name);
        for t in entry.threads {
            let affinity = t.cpu_mask.map_or(CpuAffinity::Any, CpuAffinity::from_mask);
            state = state.plan(
                PlanConfig::new(t.name, t.period_us)
                    .affinity(affinity)
                    .modules(t.functions),
            );
        }
        config.states.push(state);
    }

    Ok(config)
}

fn signal_type(name: &str) -> Result<SignalType> {
    SignalType::from_name(name).ok_or_else(|| anyhow!("unknown signal type '{name}'"))
}

fn signal_decl(path: &str, entry: SignalEntry) -> Result<SignalDecl> {
    let ty = signal_type(&entry.ty)?;
    let mut decl = SignalDecl::array(path, ty, entry.elements);

    match entry.default {
        None => {}
        Some(serde_yaml::Value::Sequence(items)) => {
            decl.default = items
                .iter()
                .map(|v| parse_value(ty, v))
                .collect::<Result<_>>()?;
        }
        Some(v) => decl = decl.with_default(parse_value(ty, &v)?),
    }

    match (entry.storage, entry.owner) {
        (StorageEntry::Persistent, Some(owner)) => {
            decl.storage = StorageClass::Persistent { owner };
        }
        (StorageEntry::Persistent, None) => bail!("persistent storage requires an owner"),
        (StorageEntry::Buffered, Some(_)) => bail!("only persistent signals have an owner"),
        (StorageEntry::Buffered, None) => {}
    }
    decl.reset_on_exit = entry.reset_on_exit;
    Ok(decl)
}

fn binding_spec(entry: BindingEntry) -> Result<BindingSpec> {
    Ok(match entry {
        BindingEntry::Path(signal) => BindingSpec::new(signal),
        BindingEntry::Typed {
            signal,
            ty,
            elements,
        } => BindingSpec {
            signal,
            ty: ty.as_deref().map(signal_type).transpose()?,
            elements,
        },
    })
}

/// Converts one YAML scalar into a value of type `ty`.  Integers must fit the
/// declared width; floats are accepted for float types only.
pub fn parse_value(ty: SignalType, v: &serde_yaml::Value) -> Result<Value> {
    let int = || {
        v.as_i64()
            .map(i128::from)
            .or_else(|| v.as_u64().map(i128::from))
            .ok_or_else(|| anyhow!("expected an integer, found {v:?}"))
    };
    Ok(match ty {
        SignalType::Bool => Value::Bool(
            v.as_bool()
                .ok_or_else(|| anyhow!("expected a boolean, found {v:?}"))?,
        ),
        SignalType::Float32 | SignalType::Float64 => Value::from_f64(
            ty,
            v.as_f64()
                .ok_or_else(|| anyhow!("expected a number, found {v:?}"))?,
        ),
        SignalType::UInt8 => Value::UInt8(narrow(int()?, ty)?),
        SignalType::UInt16 => Value::UInt16(narrow(int()?, ty)?),
        SignalType::UInt32 => Value::UInt32(narrow(int()?, ty)?),
        SignalType::UInt64 => Value::UInt64(narrow(int()?, ty)?),
        SignalType::Int8 => Value::Int8(narrow(int()?, ty)?),
        SignalType::Int16 => Value::Int16(narrow(int()?, ty)?),
        SignalType::Int32 => Value::Int32(narrow(int()?, ty)?),
        SignalType::Int64 => Value::Int64(narrow(int()?, ty)?),
    })
}

fn narrow<T: TryFrom<i128>>(n: i128, ty: SignalType) -> Result<T> {
    T::try_from(n).map_err(|_| anyhow!("{n} does not fit {ty}"))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    /// Helper: write a YAML string to a temp file and return it.
    fn yaml_tempfile(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    const DEMO: &str = r#"
application:
  name: demo
  initial_state: State1
  module_failure: skip_remaining
  overrun:
    tolerance_us: 200
    max_consecutive: 10
  timing_signals: true
data:
  DDB:
    X:     { type: uint32, default: 0 }
    X_in:  { type: uint32 }
    Gains: { type: float64, elements: 3, default: [1.0, 2.0, 3.0] }
    Acc:   { type: float64, storage: persistent, owner: Integrator }
    Mode:  { type: uint8, reset_on_exit: true }
functions:
  ModA: { class: Adder, inputs: [DDB.X_in], outputs: [DDB.X], params: { offset: 1 } }
  ModB:
    class: Copy
    inputs: [{ signal: DDB.X, type: uint32 }]
    outputs: [DDB.X_in]
  Integrator: { class: Integrator, inputs: [DDB.X], outputs: [DDB.Acc] }
states:
  State1:
    threads:
      - name: Thread1
        period_us: 1000
        cpu_mask: 0x2
        functions: [ModA, ModB]
  State2:
    threads:
      - name: Thread1
        period_us: 2000
        functions: [ModA, ModB, Integrator]
"#;

    // ── load_from_file ────────────────────────────────────────────────────────

    #[test]
    fn load_demo_yaml() {
        let f = yaml_tempfile(DEMO);
        let config = ApplicationConfig::load_from_file(f.path()).unwrap();

        assert_eq!(config.name, "demo");
        assert_eq!(config.initial_state, "State1");
        assert!(config.timing_signals);
        assert_eq!(config.policy.module_failure, ModuleFailurePolicy::SkipRemaining);
        assert_eq!(config.policy.overrun.tolerance, Duration::from_micros(200));
        assert_eq!(config.policy.overrun.max_consecutive, Some(10));

        assert_eq!(config.signals.len(), 5);
        let gains = config.signals.iter().find(|s| s.path == "DDB.Gains").unwrap();
        assert_eq!(gains.elements, 3);
        assert_eq!(
            gains.default,
            vec![Value::Float64(1.0), Value::Float64(2.0), Value::Float64(3.0)]
        );
        let acc = config.signals.iter().find(|s| s.path == "DDB.Acc").unwrap();
        assert_eq!(acc.owner(), Some("Integrator"));
        assert!(config.signals.iter().any(|s| s.path == "DDB.Mode" && s.reset_on_exit));

        let mod_b = config.modules.iter().find(|m| m.name == "ModB").unwrap();
        assert_eq!(mod_b.inputs[0].ty, Some(SignalType::UInt32));

        let s1 = config.states.iter().find(|s| s.name == "State1").unwrap();
        assert_eq!(s1.plans[0].modules, vec!["ModA", "ModB"]);
        assert_eq!(s1.plans[0].affinity, CpuAffinity::Mask(0x2));
    }

    #[test]
    fn optional_sections_use_defaults() {
        let yaml = r#"
application: { name: tiny, initial_state: Only }
data:
  D: { N: { type: u32 } }
functions:
  Count: { class: Counter, outputs: [D.N] }
states:
  Only: { threads: [{ name: T, period_us: 500, functions: [Count] }] }
"#;
        let config = ApplicationConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.policy, ExecutionPolicy::default());
        assert!(!config.timing_signals);
        assert_eq!(config.hyperperiod_limit_us, DEFAULT_HYPERPERIOD_LIMIT_US);
        assert_eq!(config.event_capacity, DEFAULT_EVENT_CAPACITY);
        assert_eq!(config.signals[0].default, vec![Value::UInt32(0)]);
        assert_eq!(config.states[0].plans[0].affinity, CpuAffinity::Any);
    }

    #[test]
    fn missing_file_returns_error() {
        let err = ApplicationConfig::load_from_file(Path::new("/nonexistent/app.yaml"));
        assert!(err.is_err());
    }

    #[test]
    fn malformed_yaml_returns_error() {
        let f = yaml_tempfile("application: [not, a, map");
        assert!(ApplicationConfig::load_from_file(f.path()).is_err());
    }

    // ── Conversion errors ─────────────────────────────────────────────────────

    #[test]
    fn unknown_type_name_is_rejected() {
        let yaml = r#"
application: { name: t, initial_state: S }
data: { D: { X: { type: complex } } }
"#;
        let err = ApplicationConfig::from_yaml_str(yaml).unwrap_err();
        assert!(format!("{err:#}").contains("unknown signal type 'complex'"));
    }

    #[test]
    fn persistent_signal_needs_an_owner() {
        let yaml = r#"
application: { name: t, initial_state: S }
data: { D: { X: { type: f64, storage: persistent } } }
"#;
        let err = ApplicationConfig::from_yaml_str(yaml).unwrap_err();
        assert!(format!("{err:#}").contains("requires an owner"));
    }

    #[test]
    fn structural_errors_surface_from_validation() {
        let yaml = r#"
application: { name: t, initial_state: Missing }
data: { D: { X: { type: u8 } } }
functions: { M: { class: Counter, outputs: [D.X] } }
states:
  S: { threads: [{ name: T, period_us: 1000, functions: [M] }] }
"#;
        let err = ApplicationConfig::from_yaml_str(yaml).unwrap_err();
        assert!(format!("{err:#}").contains("initial state 'Missing'"));
    }

    // ── parse_value ───────────────────────────────────────────────────────────

    #[test]
    fn integer_defaults_must_fit_the_declared_width() {
        let v: serde_yaml::Value = serde_yaml::from_str("300").unwrap();
        assert!(parse_value(SignalType::UInt8, &v).is_err());
        assert_eq!(parse_value(SignalType::UInt16, &v).unwrap(), Value::UInt16(300));

        let neg: serde_yaml::Value = serde_yaml::from_str("-1").unwrap();
        assert!(parse_value(SignalType::UInt32, &neg).is_err());
        assert_eq!(parse_value(SignalType::Int8, &neg).unwrap(), Value::Int8(-1));
    }

    #[test]
    fn float_and_bool_defaults() {
        let f: serde_yaml::Value = serde_yaml::from_str("2.5").unwrap();
        assert_eq!(parse_value(SignalType::Float32, &f).unwrap(), Value::Float32(2.5));
        assert!(parse_value(SignalType::Int32, &f).is_err());

        let b: serde_yaml::Value = serde_yaml::from_str("true").unwrap();
        assert_eq!(parse_value(SignalType::Bool, &b).unwrap(), Value::Bool(true));
    }
}
