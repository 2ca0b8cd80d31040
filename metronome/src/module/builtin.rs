/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Built-in module classes.
//!
//! | Class | Inputs → outputs | Parameters |
//! |-------|------------------|------------|
//! | `Constant` | – → 1 | `value` (number or list, default 0) |
//! | `Adder` | n → 1, element-wise sum | `offset` (default 0) |
//! | `Copy` | n → n, pairwise copy | – |
//! | `Gain` | 1 → 1, element-wise product | `gain` (required) |
//! | `Integrator` | 1 → 1 scalar, `y += u·dt` | `dt` (default 1) |
//! | `Counter` | – → 1 scalar | `start` (0), `step` (1) |
//! | `ScheduledGain` | 1 → 1 | `gain` (default 1), `gains` (State → gain) |
//!
//! Arithmetic is done in `f64` and converted to the output's declared type.
//! Working buffers are sized in `setup`; `execute` never allocates.

use std::collections::BTreeMap;

use tracing::debug;

use super::{
    Binding, DoubleSlot, Module, ModuleConfig, ModuleFailure, ModuleIo, ModuleRegistry,
    SignalBindings, StateChange,
};
use crate::error::{BindingError, ConfigurationError};
use crate::signal::{SignalType, Value};

/// Boxes a default-constructed module; usable directly as a registry factory.
pub fn boxed<M: Module + Default + 'static>() -> Box<dyn Module> {
    Box::<M>::default()
}

/// Registers every class of this module under its table name.
pub fn register_all(registry: &mut ModuleRegistry) {
    registry.register("Constant", boxed::<Constant>);
    registry.register("Adder", boxed::<Adder>);
    registry.register("Copy", boxed::<CopySignals>);
    registry.register("Gain", boxed::<Gain>);
    registry.register("Integrator", boxed::<Integrator>);
    registry.register("Counter", boxed::<Counter>);
    registry.register("ScheduledGain", boxed::<ScheduledGain>);
}

// ── Shared checks ─────────────────────────────────────────────────────────────

fn shape(bindings: &SignalBindings, binding: &Binding) -> Result<(SignalType, usize), BindingError> {
    match (binding.signal_type(), binding.elements()) {
        (Some(ty), Some(n)) => Ok((ty, n)),
        _ => Err(bindings.reject(format!("'{}' is not resolved", binding.path()))),
    }
}

fn arity(bindings: &SignalBindings, inputs: usize, outputs: usize) -> Result<(), BindingError> {
    if bindings.inputs().len() != inputs || bindings.outputs().len() != outputs {
        return Err(bindings.reject(format!(
            "needs {inputs} input(s) and {outputs} output(s), has {} and {}",
            bindings.inputs().len(),
            bindings.outputs().len()
        )));
    }
    Ok(())
}

fn scalar_output(bindings: &SignalBindings) -> Result<(), BindingError> {
    for b in bindings.outputs() {
        if shape(bindings, b)?.1 != 1 {
            return Err(bindings.reject(format!("output '{}' must be scalar", b.path())));
        }
    }
    Ok(())
}

/// Element buffers for a one-in, one-out element-wise module.
#[derive(Debug, Default)]
struct ElementWise {
    input: Vec<Value>,
    output: Vec<Value>,
}

impl ElementWise {
    fn setup(&mut self, bindings: &SignalBindings) -> Result<(), BindingError> {
        arity(bindings, 1, 1)?;
        let (_, n_in) = shape(bindings, &bindings.inputs()[0])?;
        let (ty, n_out) = shape(bindings, &bindings.outputs()[0])?;
        if n_in != n_out {
            return Err(bindings.reject(format!(
                "input has {n_in} element(s), output has {n_out}"
            )));
        }
        self.input = vec![Value::Bool(false); n_in];
        self.output = vec![ty.zero(); n_out];
        Ok(())
    }

    fn scale(&mut self, io: &mut ModuleIo<'_>, gain: f64) -> Result<(), ModuleFailure> {
        io.read_input(0, &mut self.input)?;
        for (o, i) in self.output.iter_mut().zip(&self.input) {
            *o = Value::from_f64(o.signal_type(), i.as_f64() * gain);
        }
        io.write_output(0, &self.output)?;
        Ok(())
    }
}

// ── Constant ──────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct Constant {
    values: Vec<f64>,
    output: Vec<Value>,
}

impl Module for Constant {
    fn initialise(&mut self, config: &ModuleConfig) -> Result<(), ConfigurationError> {
        self.values = config
            .params
            .f64_list(&config.name, "value")?
            .unwrap_or_else(|| vec![0.0]);
        Ok(())
    }

    fn setup(&mut self, bindings: &SignalBindings) -> Result<(), BindingError> {
        arity(bindings, 0, 1)?;
        let (ty, n) = shape(bindings, &bindings.outputs()[0])?;
        self.output = match self.values.as_slice() {
            [v] => vec![Value::from_f64(ty, *v); n],
            vs if vs.len() == n => vs.iter().map(|v| Value::from_f64(ty, *v)).collect(),
            vs => {
                return Err(bindings.reject(format!(
                    "{} value(s) given for {n} element(s)",
                    vs.len()
                )))
            }
        };
        Ok(())
    }

    fn execute(&mut self, io: &mut ModuleIo<'_>) -> Result<(), ModuleFailure> {
        io.write_output(0, &self.output)?;
        Ok(())
    }
}

// ── Adder ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct Adder {
    offset: f64,
    sum: Vec<f64>,
    scratch: Vec<Value>,
    output: Vec<Value>,
}

impl Module for Adder {
    fn initialise(&mut self, config: &ModuleConfig) -> Result<(), ConfigurationError> {
        self.offset = config.params.f64_or(&config.name, "offset", 0.0)?;
        Ok(())
    }

    fn setup(&mut self, bindings: &SignalBindings) -> Result<(), BindingError> {
        if bindings.inputs().is_empty() || bindings.outputs().len() != 1 {
            return Err(bindings.reject("needs at least one input and exactly one output"));
        }
        let (ty, n) = shape(bindings, &bindings.outputs()[0])?;
        for input in bindings.inputs() {
            if shape(bindings, input)?.1 != n {
                return Err(bindings.reject(format!(
                    "input '{}' does not have {n} element(s)",
                    input.path()
                )));
            }
        }
        self.sum = vec![0.0; n];
        self.scratch = vec![Value::Bool(false); n];
        self.output = vec![ty.zero(); n];
        Ok(())
    }

    fn execute(&mut self, io: &mut ModuleIo<'_>) -> Result<(), ModuleFailure> {
        self.sum.fill(self.offset);
        for i in 0..io.num_inputs() {
            io.read_input(i, &mut self.scratch)?;
            for (acc, v) in self.sum.iter_mut().zip(&self.scratch) {
                *acc += v.as_f64();
            }
        }
        for (o, s) in self.output.iter_mut().zip(&self.sum) {
            *o = Value::from_f64(o.signal_type(), *s);
        }
        io.write_output(0, &self.output)?;
        Ok(())
    }
}

// ── Copy ──────────────────────────────────────────────────────────────────────

/// Copies input `i` to output `i` unchanged (class `Copy`).
#[derive(Debug, Default)]
pub struct CopySignals {
    sizes: Vec<usize>,
    scratch: Vec<Value>,
}

impl Module for CopySignals {
    fn initialise(&mut self, _config: &ModuleConfig) -> Result<(), ConfigurationError> {
        Ok(())
    }

    fn setup(&mut self, bindings: &SignalBindings) -> Result<(), BindingError> {
        let n = bindings.inputs().len();
        if n == 0 || bindings.outputs().len() != n {
            return Err(bindings.reject("needs as many outputs as inputs, and at least one"));
        }
        self.sizes.clear();
        for (i, o) in bindings.inputs().iter().zip(bindings.outputs()) {
            let (si, so) = (shape(bindings, i)?, shape(bindings, o)?);
            if si != so {
                return Err(bindings.reject(format!(
                    "'{}' ({} × {}) cannot be copied to '{}' ({} × {})",
                    i.path(),
                    si.0,
                    si.1,
                    o.path(),
                    so.0,
                    so.1
                )));
            }
            self.sizes.push(si.1);
        }
        let widest = self.sizes.iter().copied().max().unwrap_or(1);
        self.scratch = vec![Value::Bool(false); widest];
        Ok(())
    }

    fn execute(&mut self, io: &mut ModuleIo<'_>) -> Result<(), ModuleFailure> {
        for (i, &n) in self.sizes.iter().enumerate() {
            let buf = &mut self.scratch[..n];
            io.read_input(i, buf)?;
            io.write_output(i, buf)?;
        }
        Ok(())
    }
}

// ── Gain ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct Gain {
    gain: f64,
    buffers: ElementWise,
}

impl Module for Gain {
    fn initialise(&mut self, config: &ModuleConfig) -> Result<(), ConfigurationError> {
        self.gain = config.params.f64(&config.name, "gain")?.ok_or_else(|| {
            ConfigurationError::InvalidParameter {
                module: config.name.clone(),
                param: "gain".into(),
                reason: "is required".into(),
            }
        })?;
        Ok(())
    }

    fn setup(&mut self, bindings: &SignalBindings) -> Result<(), BindingError> {
        self.buffers.setup(bindings)
    }

    fn execute(&mut self, io: &mut ModuleIo<'_>) -> Result<(), ModuleFailure> {
        self.buffers.scale(io, self.gain)
    }
}

// ── Integrator ────────────────────────────────────────────────────────────────

/// Accumulates its input.  The output is usually a persistent signal so the
/// integral survives State changes untouched.
#[derive(Debug, Default)]
pub struct Integrator {
    dt: f64,
}

impl Module for Integrator {
    fn initialise(&mut self, config: &ModuleConfig) -> Result<(), ConfigurationError> {
        self.dt = config.params.f64_or(&config.name, "dt", 1.0)?;
        Ok(())
    }

    fn setup(&mut self, bindings: &SignalBindings) -> Result<(), BindingError> {
        arity(bindings, 1, 1)?;
        scalar_output(bindings)
    }

    fn execute(&mut self, io: &mut ModuleIo<'_>) -> Result<(), ModuleFailure> {
        let y = io.output(0)?.as_f64() + io.input_f64(0)? * self.dt;
        io.set_output_f64(0, y)?;
        Ok(())
    }
}

// ── Counter ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct Counter {
    next: f64,
    step: f64,
}

impl Module for Counter {
    fn initialise(&mut self, config: &ModuleConfig) -> Result<(), ConfigurationError> {
        self.next = config.params.f64_or(&config.name, "start", 0.0)?;
        self.step = config.params.f64_or(&config.name, "step", 1.0)?;
        Ok(())
    }

    fn setup(&mut self, bindings: &SignalBindings) -> Result<(), BindingError> {
        arity(bindings, 0, 1)?;
        scalar_output(bindings)
    }

    fn execute(&mut self, io: &mut ModuleIo<'_>) -> Result<(), ModuleFailure> {
        io.set_output_f64(0, self.next)?;
        self.next += self.step;
        Ok(())
    }
}

// ── ScheduledGain ─────────────────────────────────────────────────────────────

/// Gain chosen per State.  The gain for the incoming State is staged and
/// flipped in at the transition boundary.
#[derive(Debug, Default)]
pub struct ScheduledGain {
    default_gain: f64,
    gains: BTreeMap<String, f64>,
    active: DoubleSlot<f64>,
    buffers: ElementWise,
}

impl Module for ScheduledGain {
    fn initialise(&mut self, config: &ModuleConfig) -> Result<(), ConfigurationError> {
        self.default_gain = config.params.f64_or(&config.name, "gain", 1.0)?;
        self.gains = config.params.f64_map(&config.name, "gains")?;
        self.active = DoubleSlot::new(self.default_gain);
        Ok(())
    }

    fn setup(&mut self, bindings: &SignalBindings) -> Result<(), BindingError> {
        self.buffers.setup(bindings)
    }

    fn execute(&mut self, io: &mut ModuleIo<'_>) -> Result<(), ModuleFailure> {
        let gain = *self.active.active();
        self.buffers.scale(io, gain)
    }

    fn prepare_next_state(&mut self, change: &StateChange<'_>) {
        let gain = self
            .gains
            .get(change.to)
            .copied()
            .unwrap_or(self.default_gain);
        *self.active.staging_mut() = gain;
        self.active.flip();
        debug!(state = change.to, gain, "scheduled gain selected");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{IoContext, ModuleInstance};
    use crate::scheduler::Diagnostics;
    use crate::signal::{SignalDecl, SignalStore, View};

    fn instance(store: &SignalStore, config: ModuleConfig) -> ModuleInstance {
        let registry = ModuleRegistry::with_builtins();
        let mut m = ModuleInstance::new(
            config.name.clone(),
            config.class.clone(),
            registry.create(&config.class).unwrap(),
        );
        m.initialise(&config).unwrap();
        m.setup(store).unwrap();
        m
    }

    fn run(m: &mut ModuleInstance, store: &SignalStore, cycle: u64) {
        let d = Diagnostics::new(8);
        let views = vec![View::Previous; m.bindings().inputs().len()];
        m.execute(IoContext::new(store, &d, cycle), &views).unwrap();
        store.swap_buffers();
    }

    // ── Constant / Adder / Copy ───────────────────────────────────────────────

    #[test]
    fn constant_fills_arrays() {
        let s = SignalStore::new(vec![SignalDecl::array("C", SignalType::Int32, 3)]).unwrap();
        let mut m = instance(&s, ModuleConfig::new("K", "Constant").output("C").param("value", vec![1, -2, 3]));
        run(&mut m, &s, 0);
        assert_eq!(
            s.read_vec("C").unwrap(),
            vec![Value::Int32(1), Value::Int32(-2), Value::Int32(3)]
        );
    }

    #[test]
    fn constant_rejects_wrong_value_count() {
        let s = SignalStore::new(vec![SignalDecl::array("C", SignalType::Int32, 3)]).unwrap();
        let config = ModuleConfig::new("K", "Constant").output("C").param("value", vec![1, 2]);
        let mut m = ModuleInstance::new("K", "Constant", boxed::<Constant>());
        m.initialise(&config).unwrap();
        assert!(matches!(m.setup(&s), Err(BindingError::Rejected { .. })));
    }

    #[test]
    fn adder_sums_inputs_plus_offset() {
        let s = SignalStore::new(vec![
            SignalDecl::scalar("A", SignalType::UInt32).with_default(2u32),
            SignalDecl::scalar("B", SignalType::Float64).with_default(0.5),
            SignalDecl::scalar("Sum", SignalType::Float64),
        ])
        .unwrap();
        let mut m = instance(
            &s,
            ModuleConfig::new("Add", "Adder").input("A").input("B").output("Sum").param("offset", 1),
        );
        run(&mut m, &s, 0);
        assert_eq!(s.read("Sum").unwrap(), Value::Float64(3.5));
    }

    #[test]
    fn copy_requires_matching_shapes() {
        let s = SignalStore::new(vec![
            SignalDecl::scalar("A", SignalType::UInt32),
            SignalDecl::scalar("B", SignalType::Int32),
        ])
        .unwrap();
        let config = ModuleConfig::new("Cp", "Copy").input("A").output("B");
        let mut m = ModuleInstance::new("Cp", "Copy", boxed::<CopySignals>());
        m.initialise(&config).unwrap();
        assert!(matches!(m.setup(&s), Err(BindingError::Rejected { .. })));
    }

    #[test]
    fn copy_moves_arrays() {
        let s = SignalStore::new(vec![
            SignalDecl::array("A", SignalType::Int16, 2).with_default(7i16),
            SignalDecl::array("B", SignalType::Int16, 2),
        ])
        .unwrap();
        let mut m = instance(&s, ModuleConfig::new("Cp", "Copy").input("A").output("B"));
        run(&mut m, &s, 0);
        assert_eq!(s.read_vec("B").unwrap(), vec![Value::Int16(7); 2]);
    }

    // ── Gain family ───────────────────────────────────────────────────────────

    #[test]
    fn gain_is_required() {
        let mut m = ModuleInstance::new("G", "Gain", boxed::<Gain>());
        let err = m.initialise(&ModuleConfig::new("G", "Gain")).unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidParameter { .. }));
    }

    #[test]
    fn scheduled_gain_switches_at_prepare() {
        let s = SignalStore::new(vec![
            SignalDecl::scalar("U", SignalType::Float64).with_default(10.0),
            SignalDecl::scalar("Y", SignalType::Float64),
        ])
        .unwrap();
        let mut gains = serde_yaml::Mapping::new();
        gains.insert("Fast".into(), 3.0.into());
        let mut m = instance(
            &s,
            ModuleConfig::new("SG", "ScheduledGain")
                .input("U")
                .output("Y")
                .param("gain", 0.5)
                .param("gains", gains),
        );

        run(&mut m, &s, 0);
        assert_eq!(s.read("Y").unwrap(), Value::Float64(5.0));

        m.prepare_next_state(&StateChange { from: Some("Slow"), to: "Fast" });
        run(&mut m, &s, 1);
        assert_eq!(s.read("Y").unwrap(), Value::Float64(30.0));

        m.prepare_next_state(&StateChange { from: Some("Fast"), to: "Other" });
        run(&mut m, &s, 2);
        assert_eq!(s.read("Y").unwrap(), Value::Float64(5.0));
    }

    // ── Stateful ──────────────────────────────────────────────────────────────

    #[test]
    fn integrator_accumulates_in_persistent_storage() {
        let s = SignalStore::new(vec![
            SignalDecl::scalar("U", SignalType::Float64).with_default(2.0),
            SignalDecl::scalar("Acc", SignalType::Float64).persistent("Int"),
        ])
        .unwrap();
        let mut m = instance(
            &s,
            ModuleConfig::new("Int", "Integrator").input("U").output("Acc").param("dt", 0.5),
        );
        for cycle in 0..4 {
            run(&mut m, &s, cycle);
        }
        assert_eq!(s.read("Acc").unwrap(), Value::Float64(4.0));
    }

    #[test]
    fn counter_counts_from_start() {
        let s = SignalStore::new(vec![SignalDecl::scalar("N", SignalType::UInt32)]).unwrap();
        let mut m = instance(
            &s,
            ModuleConfig::new("Cnt", "Counter").output("N").param("start", 10).param("step", 5),
        );
        run(&mut m, &s, 0);
        run(&mut m, &s, 1);
        assert_eq!(s.read("N").unwrap(), Value::UInt32(15));
    }

    #[test]
    fn counter_output_must_be_scalar() {
        let s = SignalStore::new(vec![SignalDecl::array("N", SignalType::UInt32, 2)]).unwrap();
        let mut m = ModuleInstance::new("Cnt", "Counter", boxed::<Counter>());
        m.initialise(&ModuleConfig::new("Cnt", "Counter").output("N")).unwrap();
        assert!(m.setup(&s).is_err());
    }
}
