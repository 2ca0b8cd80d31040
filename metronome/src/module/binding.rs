/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Signal bindings and the per-cycle I/O view handed to modules.
//!
//! Names are resolved once, in `setup`; during `execute` a module addresses
//! its signals by input/output index only.  Every access goes through
//! [`ModuleIo`], which reports a failed access to the diagnostics channel
//! and returns the error without touching the store.

use crate::error::{BindingError, Direction, SignalError};
use crate::scheduler::Diagnostics;
use crate::signal::{SignalHandle, SignalStore, SignalType, Value, View};

// ── Declaration ───────────────────────────────────────────────────────────────

/// A signal a module wants, optionally with the shape it expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingSpec {
    pub signal: String,
    pub ty: Option<SignalType>,
    pub elements: Option<usize>,
}

impl BindingSpec {
    pub fn new(signal: impl Into<String>) -> Self {
        Self {
            signal: signal.into(),
            ty: None,
            elements: None,
        }
    }

    pub fn typed(signal: impl Into<String>, ty: SignalType) -> Self {
        Self {
            ty: Some(ty),
            ..Self::new(signal)
        }
    }

    pub fn with_elements(mut self, elements: usize) -> Self {
        self.elements = Some(elements);
        self
    }
}

impl From<&str> for BindingSpec {
    fn from(signal: &str) -> Self {
        Self::new(signal)
    }
}

impl From<String> for BindingSpec {
    fn from(signal: String) -> Self {
        Self::new(signal)
    }
}

/// One declared binding and, after setup, its handle.
#[derive(Debug, Clone)]
pub struct Binding {
    spec: BindingSpec,
    handle: Option<SignalHandle>,
}

impl Binding {
    pub fn path(&self) -> &str {
        &self.spec.signal
    }

    pub fn handle(&self) -> Option<SignalHandle> {
        self.handle
    }

    pub fn signal_type(&self) -> Option<SignalType> {
        self.handle.map(|h| h.signal_type())
    }

    pub fn elements(&self) -> Option<usize> {
        self.handle.map(|h| h.elements())
    }
}

/// All inputs and outputs of one module.
#[derive(Debug, Clone)]
pub struct SignalBindings {
    module: String,
    inputs: Vec<Binding>,
    outputs: Vec<Binding>,
}

impl SignalBindings {
    pub(crate) fn empty(module: &str) -> Self {
        Self::declare(module, &[], &[])
    }

    pub(crate) fn declare(module: &str, inputs: &[BindingSpec], outputs: &[BindingSpec]) -> Self {
        let wrap = |specs: &[BindingSpec]| {
            specs
                .iter()
                .map(|spec| Binding {
                    spec: spec.clone(),
                    handle: None,
                })
                .collect()
        };
        Self {
            module: module.to_string(),
            inputs: wrap(inputs),
            outputs: wrap(outputs),
        }
    }

    /// Looks every binding up in `store` and checks declared shapes and
    /// persistent-signal ownership.
    pub(crate) fn resolve(&mut self, store: &SignalStore) -> Result<(), BindingError> {
        let module = self.module.clone();
        for binding in self.inputs.iter_mut().chain(self.outputs.iter_mut()) {
            binding.handle = Some(resolve_one(&module, &binding.spec, store)?);
        }
        Ok(())
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn inputs(&self) -> &[Binding] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Binding] {
        &self.outputs
    }

    pub fn input(&self, index: usize) -> Option<&Binding> {
        self.inputs.get(index)
    }

    pub fn output(&self, index: usize) -> Option<&Binding> {
        self.outputs.get(index)
    }

    /// Builds the error a module returns from `setup` when it dislikes its
    /// bindings.
    pub fn reject(&self, reason: impl Into<String>) -> BindingError {
        BindingError::Rejected {
            module: self.module.clone(),
            reason: reason.into(),
        }
    }
}

fn resolve_one(
    module: &str,
    spec: &BindingSpec,
    store: &SignalStore,
) -> Result<SignalHandle, BindingError> {
    let handle = store
        .handle(&spec.signal)
        .map_err(|_| BindingError::UnknownSignal {
            module: module.to_string(),
            signal: spec.signal.clone(),
        })?;

    if let Some(expected) = spec.ty {
        if expected != handle.signal_type() {
            return Err(BindingError::TypeMismatch {
                module: module.to_string(),
                signal: spec.signal.clone(),
                expected,
                found: handle.signal_type(),
            });
        }
    }
    if let Some(expected) = spec.elements {
        if expected != handle.elements() {
            return Err(BindingError::ElementCountMismatch {
                module: module.to_string(),
                signal: spec.signal.clone(),
                expected,
                found: handle.elements(),
            });
        }
    }
    if let Some(owner) = store.decl(handle.id()).and_then(|d| d.owner()) {
        if owner != module {
            return Err(BindingError::PersistentNotOwned {
                module: module.to_string(),
                signal: spec.signal.clone(),
                owner: owner.to_string(),
            });
        }
    }
    Ok(handle)
}

// ── Per-cycle I/O ─────────────────────────────────────────────────────────────

/// What a running module can reach besides its own bindings.
#[derive(Debug, Clone, Copy)]
pub struct IoContext<'a> {
    pub store: &'a SignalStore,
    pub diagnostics: &'a Diagnostics,
    /// Scheduler cycle counter at the start of this cycle.
    pub cycle: u64,
}

impl<'a> IoContext<'a> {
    pub fn new(store: &'a SignalStore, diagnostics: &'a Diagnostics, cycle: u64) -> Self {
        Self {
            store,
            diagnostics,
            cycle,
        }
    }
}

/// Index-based signal access for one module during one `execute`.
pub struct ModuleIo<'a> {
    module: &'a str,
    bindings: &'a SignalBindings,
    views: &'a [View],
    ctx: IoContext<'a>,
}

impl<'a> ModuleIo<'a> {
    pub(crate) fn new(
        module: &'a str,
        bindings: &'a SignalBindings,
        views: &'a [View],
        ctx: IoContext<'a>,
    ) -> Self {
        Self {
            module,
            bindings,
            views,
            ctx,
        }
    }

    pub fn cycle(&self) -> u64 {
        self.ctx.cycle
    }

    pub fn num_inputs(&self) -> usize {
        self.bindings.inputs.len()
    }

    pub fn num_outputs(&self) -> usize {
        self.bindings.outputs.len()
    }

    pub fn output_type(&self, index: usize) -> Option<SignalType> {
        self.bindings.output(index).and_then(Binding::signal_type)
    }

    fn handle(&self, direction: Direction, index: usize) -> Result<SignalHandle, SignalError> {
        let list = match direction {
            Direction::Input => &self.bindings.inputs,
            Direction::Output => &self.bindings.outputs,
        };
        list.get(index)
            .and_then(Binding::handle)
            .ok_or(SignalError::Unbound { direction, index })
    }

    fn view(&self, index: usize) -> View {
        self.views.get(index).copied().unwrap_or_default()
    }

    fn report<T>(&self, result: Result<T, SignalError>) -> Result<T, SignalError> {
        if let Err(e) = &result {
            self.ctx.diagnostics.signal_error(self.module, self.ctx.cycle, e);
        }
        result
    }

    // ── Inputs ────────────────────────────────────────────────────────────────

    /// Scalar input `index`.
    pub fn input(&self, index: usize) -> Result<Value, SignalError> {
        let r = self
            .handle(Direction::Input, index)
            .and_then(|h| self.ctx.store.read_at(h, self.view(index)));
        self.report(r)
    }

    pub fn input_f64(&self, index: usize) -> Result<f64, SignalError> {
        self.input(index).map(|v| v.as_f64())
    }

    pub fn input_element(&self, index: usize, element: usize) -> Result<Value, SignalError> {
        let r = self
            .handle(Direction::Input, index)
            .and_then(|h| self.ctx.store.read_element_at(h, self.view(index), element));
        self.report(r)
    }

    /// Copies every element of input `index` into `out`.
    pub fn read_input(&self, index: usize, out: &mut [Value]) -> Result<(), SignalError> {
        let r = self
            .handle(Direction::Input, index)
            .and_then(|h| self.ctx.store.read_into_at(h, self.view(index), out));
        self.report(r)
    }

    // ── Outputs ───────────────────────────────────────────────────────────────

    /// The value output `index` currently holds: the last value written, or
    /// the value written earlier in this cycle.
    pub fn output(&self, index: usize) -> Result<Value, SignalError> {
        let r = self
            .handle(Direction::Output, index)
            .and_then(|h| self.ctx.store.read_at(h, View::Current));
        self.report(r)
    }

    pub fn set_output(&mut self, index: usize, value: Value) -> Result<(), SignalError> {
        let r = self
            .handle(Direction::Output, index)
            .and_then(|h| self.ctx.store.write_at(h, value));
        self.report(r)
    }

    /// Converts `value` to the output's declared type before writing.
    pub fn set_output_f64(&mut self, index: usize, value: f64) -> Result<(), SignalError> {
        let r = self.handle(Direction::Output, index).and_then(|h| {
            self.ctx
                .store
                .write_at(h, Value::from_f64(h.signal_type(), value))
        });
        self.report(r)
    }

    pub fn write_output(&mut self, index: usize, values: &[Value]) -> Result<(), SignalError> {
        let r = self
            .handle(Direction::Output, index)
            .and_then(|h| self.ctx.store.write_slice_at(h, values));
        self.report(r)
    }

    pub fn write_output_element(
        &mut self,
        index: usize,
        element: usize,
        value: Value,
    ) -> Result<(), SignalError> {
        let r = self
            .handle(Direction::Output, index)
            .and_then(|h| self.ctx.store.write_element_at(h, element, value));
        self.report(r)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::SignalDecl;

    fn store() -> SignalStore {
        SignalStore::new(vec![
            SignalDecl::scalar("A", SignalType::UInt32),
            SignalDecl::array("V", SignalType::Float32, 3),
            SignalDecl::scalar("P", SignalType::Float64).persistent("Owner"),
        ])
        .unwrap()
    }

    // ── Resolution ────────────────────────────────────────────────────────────

    #[test]
    fn resolves_names_and_checks_declared_shape() {
        let s = store();
        let mut b = SignalBindings::declare(
            "M",
            &[BindingSpec::typed("A", SignalType::UInt32)],
            &[BindingSpec::new("V").with_elements(3)],
        );
        b.resolve(&s).unwrap();
        assert_eq!(b.input(0).unwrap().signal_type(), Some(SignalType::UInt32));
        assert_eq!(b.output(0).unwrap().elements(), Some(3));
    }

    #[test]
    fn unknown_signal() {
        let mut b = SignalBindings::declare("M", &["Nope".into()], &[]);
        assert_eq!(
            b.resolve(&store()).unwrap_err(),
            BindingError::UnknownSignal {
                module: "M".into(),
                signal: "Nope".into()
            }
        );
    }

    #[test]
    fn declared_type_must_match() {
        let mut b = SignalBindings::declare("M", &[BindingSpec::typed("A", SignalType::Int32)], &[]);
        assert!(matches!(
            b.resolve(&store()),
            Err(BindingError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn declared_element_count_must_match() {
        let mut b = SignalBindings::declare("M", &[], &[BindingSpec::new("V").with_elements(2)]);
        assert!(matches!(
            b.resolve(&store()),
            Err(BindingError::ElementCountMismatch { expected: 2, found: 3, .. })
        ));
    }

    #[test]
    fn persistent_signal_is_private_to_its_owner() {
        let s = store();
        let mut other = SignalBindings::declare("Intruder", &["P".into()], &[]);
        assert!(matches!(
            other.resolve(&s),
            Err(BindingError::PersistentNotOwned { .. })
        ));

        let mut owner = SignalBindings::declare("Owner", &[], &["P".into()]);
        owner.resolve(&s).unwrap();
    }

    // ── ModuleIo ──────────────────────────────────────────────────────────────

    #[test]
    fn failed_accesses_are_reported_and_store_is_untouched() {
        let s = store();
        let d = Diagnostics::new(8);
        let mut b = SignalBindings::declare("M", &["A".into()], &["A".into()]);
        b.resolve(&s).unwrap();

        let mut io = ModuleIo::new("M", &b, &[], IoContext::new(&s, &d, 3));
        assert!(io.set_output(0, Value::Float32(1.0)).is_err());
        assert!(io.input(1).is_err());
        assert_eq!(s.read_current("A").unwrap(), Value::UInt32(0));
        assert_eq!(d.snapshot().signal_errors, 2);
    }

    #[test]
    fn set_output_f64_converts_to_declared_type() {
        let s = store();
        let d = Diagnostics::new(8);
        let mut b = SignalBindings::declare("M", &[], &["A".into()]);
        b.resolve(&s).unwrap();

        let mut io = ModuleIo::new("M", &b, &[], IoContext::new(&s, &d, 0));
        io.set_output_f64(0, 41.6).unwrap();
        assert_eq!(io.output(0).unwrap(), Value::UInt32(42));
    }

    #[test]
    fn views_select_the_generation_read() {
        let s = store();
        let d = Diagnostics::new(8);
        s.write("A", 1u32).unwrap();
        s.swap_buffers();
        s.write("A", 2u32).unwrap();

        let mut b = SignalBindings::declare("M", &["A".into(), "A".into()], &[]);
        b.resolve(&s).unwrap();
        let views = [View::Previous, View::Current];
        let io = ModuleIo::new("M", &b, &views, IoContext::new(&s, &d, 0));
        assert_eq!(io.input(0).unwrap(), Value::UInt32(1));
        assert_eq!(io.input(1).unwrap(), Value::UInt32(2));
    }
}
