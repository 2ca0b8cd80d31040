/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! The double-buffered signal store.
//!
//! # Memory layout
//!
//! Every element of every buffered signal has two `AtomicU64` words, one per
//! slot.  A single `read_index` selects which slot is "previous" (read) and
//! which is "current" (write).
//!
//! # Swap protocol
//!
//! [`SignalStore::swap_buffers`] must only be called while no module is
//! writing – the scheduler calls it between its end-of-cycle and
//! start-of-cycle barriers.  It
//!
//! 1. flips `read_index` with `Release` ordering (readers load it with
//!    `Acquire`), so the freshly written slot becomes the read slot in one
//!    word store;
//! 2. copies the new read slot into the new write slot, so a producer that
//!    skips a cycle leaves its last value in place instead of exposing the
//!    generation before it.
//!
//! Element accesses use `Relaxed` ordering: the barriers around a cycle and
//! the index flip provide the happens-before edges.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tracing::debug;

use super::{SignalDecl, SignalType, StorageClass, Value};
use crate::error::{ConfigurationError, SignalError};

// ── Identifiers ───────────────────────────────────────────────────────────────

/// Dense index of a signal inside one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignalId(usize);

impl SignalId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A resolved signal reference: id plus the shape needed to check accesses
/// without a name lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalHandle {
    id: SignalId,
    ty: SignalType,
    elements: usize,
    persistent: bool,
}

impl SignalHandle {
    pub fn id(&self) -> SignalId {
        self.id
    }

    pub fn signal_type(&self) -> SignalType {
        self.ty
    }

    pub fn elements(&self) -> usize {
        self.elements
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }
}

/// Which generation a read observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum View {
    /// The generation published at the last swap.
    #[default]
    Previous,
    /// The generation being written in the running cycle.
    Current,
}

// ── Store ─────────────────────────────────────────────────────────────────────

struct Entry {
    decl: SignalDecl,
    /// Persistent signals only use `slots[0]`.
    slots: [Box<[AtomicU64]>; 2],
}

impl Entry {
    fn new(decl: SignalDecl) -> Self {
        let fill = |decl: &SignalDecl| -> Box<[AtomicU64]> {
            decl.default
                .iter()
                .map(|v| AtomicU64::new(v.to_bits()))
                .collect()
        };
        let second = if decl.is_persistent() {
            Box::default()
        } else {
            fill(&decl)
        };
        Self {
            slots: [fill(&decl), second],
            decl,
        }
    }

    fn handle(&self, id: SignalId) -> SignalHandle {
        SignalHandle {
            id,
            ty: self.decl.ty,
            elements: self.decl.elements,
            persistent: self.decl.is_persistent(),
        }
    }

    fn store_all(&self, values: &[Value]) {
        let slots = if self.decl.is_persistent() { 1 } else { 2 };
        for slot in &self.slots[..slots] {
            for (word, v) in slot.iter().zip(values) {
                word.store(v.to_bits(), Ordering::Relaxed);
            }
        }
    }
}

/// Fixed set of signals shared by every module of an application.
pub struct SignalStore {
    entries: Vec<Entry>,
    index: HashMap<String, SignalId>,
    read_index: AtomicUsize,
    generation: AtomicU64,
}

impl fmt::Debug for SignalStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalStore")
            .field("signals", &self.entries.len())
            .field("generation", &self.generation())
            .finish()
    }
}

impl SignalStore {
    /// Allocates every declared signal and fills both slots with its default.
    ///
    /// # Errors
    /// * [`ConfigurationError::DuplicateSignal`] – a path is declared twice.
    /// * [`ConfigurationError::InvalidSignal`] – empty path, zero elements,
    ///   or defaults that do not match the declared type or element count.
    pub fn new(decls: Vec<SignalDecl>) -> Result<Self, ConfigurationError> {
        let mut entries = Vec::with_capacity(decls.len());
        let mut index = HashMap::with_capacity(decls.len());

        for decl in decls {
            validate_decl(&decl)?;
            let id = SignalId(entries.len());
            if index.insert(decl.path.clone(), id).is_some() {
                return Err(ConfigurationError::DuplicateSignal(decl.path));
            }
            entries.push(Entry::new(decl));
        }

        debug!(signals = entries.len(), "signal store allocated");

        Ok(Self {
            entries,
            index,
            read_index: AtomicUsize::new(0),
            generation: AtomicU64::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of swaps performed so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn id_of(&self, path: &str) -> Option<SignalId> {
        self.index.get(path).copied()
    }

    /// Resolves `path` into a handle for the index-based accessors.
    pub fn handle(&self, path: &str) -> Result<SignalHandle, SignalError> {
        let id = self
            .id_of(path)
            .ok_or_else(|| SignalError::UnknownSignal(path.to_string()))?;
        Ok(self.entries[id.0].handle(id))
    }

    pub fn handle_of(&self, id: SignalId) -> Option<SignalHandle> {
        self.entries.get(id.0).map(|e| e.handle(id))
    }

    pub fn decl(&self, id: SignalId) -> Option<&SignalDecl> {
        self.entries.get(id.0).map(|e| &e.decl)
    }

    /// All declarations in declaration order.
    pub fn decls(&self) -> impl Iterator<Item = (SignalId, &SignalDecl)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| (SignalId(i), &e.decl))
    }

    // ── Index-based access (hot path) ─────────────────────────────────────────

    fn entry(&self, handle: SignalHandle) -> Result<&Entry, SignalError> {
        self.entries
            .get(handle.id.0)
            .ok_or_else(|| SignalError::UnknownSignal(format!("#{}", handle.id.0)))
    }

    fn slot<'a>(&self, entry: &'a Entry, view: View) -> &'a [AtomicU64] {
        if entry.decl.is_persistent() {
            return &entry.slots[0];
        }
        let read = self.read_index.load(Ordering::Acquire);
        match view {
            View::Previous => &entry.slots[read],
            View::Current => &entry.slots[read ^ 1],
        }
    }

    fn decode(entry: &Entry, word: &AtomicU64) -> Value {
        Value::from_bits(entry.decl.ty, word.load(Ordering::Relaxed))
    }

    fn check_type(entry: &Entry, value: &Value) -> Result<(), SignalError> {
        if value.signal_type() != entry.decl.ty {
            return Err(SignalError::TypeMismatch {
                path: entry.decl.path.clone(),
                expected: entry.decl.ty,
                found: value.signal_type(),
            });
        }
        Ok(())
    }

    fn check_count(entry: &Entry, found: usize) -> Result<(), SignalError> {
        if found != entry.decl.elements {
            return Err(SignalError::ElementCountMismatch {
                path: entry.decl.path.clone(),
                expected: entry.decl.elements,
                found,
            });
        }
        Ok(())
    }

    fn check_index(entry: &Entry, index: usize) -> Result<(), SignalError> {
        if index >= entry.decl.elements {
            return Err(SignalError::IndexOutOfRange {
                path: entry.decl.path.clone(),
                index,
                elements: entry.decl.elements,
            });
        }
        Ok(())
    }

    /// Reads a scalar signal.
    pub fn read_at(&self, handle: SignalHandle, view: View) -> Result<Value, SignalError> {
        let entry = self.entry(handle)?;
        Self::check_count(entry, 1)?;
        Ok(Self::decode(entry, &self.slot(entry, view)[0]))
    }

    /// Reads one element of an array signal.
    pub fn read_element_at(
        &self,
        handle: SignalHandle,
        view: View,
        index: usize,
    ) -> Result<Value, SignalError> {
        let entry = self.entry(handle)?;
        Self::check_index(entry, index)?;
        Ok(Self::decode(entry, &self.slot(entry, view)[index]))
    }

    /// Copies every element into `out`, whose length must match.
    pub fn read_into_at(
        &self,
        handle: SignalHandle,
        view: View,
        out: &mut [Value],
    ) -> Result<(), SignalError> {
        let entry = self.entry(handle)?;
        Self::check_count(entry, out.len())?;
        for (dst, word) in out.iter_mut().zip(self.slot(entry, view).iter()) {
            *dst = Self::decode(entry, word);
        }
        Ok(())
    }

    /// Writes a scalar signal into the current generation.
    pub fn write_at(&self, handle: SignalHandle, value: Value) -> Result<(), SignalError> {
        let entry = self.entry(handle)?;
        Self::check_type(entry, &value)?;
        Self::check_count(entry, 1)?;
        self.slot(entry, View::Current)[0].store(value.to_bits(), Ordering::Relaxed);
        Ok(())
    }

    pub fn write_element_at(
        &self,
        handle: SignalHandle,
        index: usize,
        value: Value,
    ) -> Result<(), SignalError> {
        let entry = self.entry(handle)?;
        Self::check_type(entry, &value)?;
        Self::check_index(entry, index)?;
        self.slot(entry, View::Current)[index].store(value.to_bits(), Ordering::Relaxed);
        Ok(())
    }

    /// Writes every element.  Nothing is stored unless all values match the
    /// declared type and the element count is exact.
    pub fn write_slice_at(&self, handle: SignalHandle, values: &[Value]) -> Result<(), SignalError> {
        let entry = self.entry(handle)?;
        Self::check_count(entry, values.len())?;
        for v in values {
            Self::check_type(entry, v)?;
        }
        for (word, v) in self.slot(entry, View::Current).iter().zip(values) {
            word.store(v.to_bits(), Ordering::Relaxed);
        }
        Ok(())
    }

    /// Writes `values` into both slots.  Only valid at a cycle boundary.
    pub(crate) fn overwrite_at(&self, handle: SignalHandle, values: &[Value]) -> Result<(), SignalError> {
        let entry = self.entry(handle)?;
        Self::check_count(entry, values.len())?;
        for v in values {
            Self::check_type(entry, v)?;
        }
        entry.store_all(values);
        Ok(())
    }

    /// Restores the declared default in every slot of `id`.  Only valid at a
    /// cycle boundary.
    pub fn reset_to_default(&self, id: SignalId) -> Result<(), SignalError> {
        let entry = self
            .entries
            .get(id.0)
            .ok_or_else(|| SignalError::UnknownSignal(format!("#{}", id.0)))?;
        entry.store_all(&entry.decl.default);
        Ok(())
    }

    /// Publishes the current generation and returns the new generation number.
    ///
    /// Must not run concurrently with module writes (see the module docs).
    pub fn swap_buffers(&self) -> u64 {
        let old_read = self.read_index.load(Ordering::Relaxed);
        let new_read = old_read ^ 1;
        self.read_index.store(new_read, Ordering::Release);

        for entry in self.entries.iter().filter(|e| !e.decl.is_persistent()) {
            let (src, dst) = (&entry.slots[new_read], &entry.slots[old_read]);
            for (s, d) in src.iter().zip(dst.iter()) {
                d.store(s.load(Ordering::Relaxed), Ordering::Relaxed);
            }
        }

        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    // ── Path-based access ─────────────────────────────────────────────────────

    /// Reads a scalar from the previous generation.
    pub fn read(&self, path: &str) -> Result<Value, SignalError> {
        self.read_at(self.handle(path)?, View::Previous)
    }

    /// Reads a scalar from the generation being written this cycle.
    pub fn read_current(&self, path: &str) -> Result<Value, SignalError> {
        self.read_at(self.handle(path)?, View::Current)
    }

    pub fn read_into(&self, path: &str, out: &mut [Value]) -> Result<(), SignalError> {
        self.read_into_at(self.handle(path)?, View::Previous, out)
    }

    /// Allocating convenience for diagnostics and tests.
    pub fn read_vec(&self, path: &str) -> Result<Vec<Value>, SignalError> {
        let handle = self.handle(path)?;
        let mut out = vec![handle.ty.zero(); handle.elements];
        self.read_into_at(handle, View::Previous, &mut out)?;
        Ok(out)
    }

    pub fn write(&self, path: &str, value: impl Into<Value>) -> Result<(), SignalError> {
        self.write_at(self.handle(path)?, value.into())
    }

    pub fn write_slice(&self, path: &str, values: &[Value]) -> Result<(), SignalError> {
        self.write_slice_at(self.handle(path)?, values)
    }
}

fn validate_decl(decl: &SignalDecl) -> Result<(), ConfigurationError> {
    let invalid = |reason: String| ConfigurationError::InvalidSignal {
        path: decl.path.clone(),
        reason,
    };

    if decl.path.trim().is_empty() {
        return Err(invalid("path is empty".into()));
    }
    if decl.elements == 0 {
        return Err(invalid("must have at least one element".into()));
    }
    if decl.default.len() != decl.elements {
        return Err(invalid(format!(
            "has {} default value(s) for {} element(s)",
            decl.default.len(),
            decl.elements
        )));
    }
    if let Some(bad) = decl.default.iter().find(|v| v.signal_type() != decl.ty) {
        return Err(invalid(format!(
            "default {bad} is {}, expected {}",
            bad.signal_type(),
            decl.ty
        )));
    }
    if let StorageClass::Persistent { owner } = &decl.storage {
        if owner.trim().is_empty() {
            return Err(invalid("persistent storage needs an owner".into()));
        }
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::thread;

    use super::*;

    fn store() -> SignalStore {
        SignalStore::new(vec![
            SignalDecl::scalar("DDB.X", SignalType::UInt32),
            SignalDecl::scalar("DDB.Gain", SignalType::Float64).with_default(2.5),
            SignalDecl::array("DDB.Vec", SignalType::Int16, 4),
            SignalDecl::scalar("DDB.Acc", SignalType::Float64).persistent("Integrator"),
        ])
        .unwrap()
    }

    // ── Construction ──────────────────────────────────────────────────────────

    #[test]
    fn defaults_are_visible_before_the_first_swap() {
        let s = store();
        assert_eq!(s.read("DDB.Gain").unwrap(), Value::Float64(2.5));
        assert_eq!(s.read_current("DDB.Gain").unwrap(), Value::Float64(2.5));
        assert_eq!(s.generation(), 0);
    }

    #[test]
    fn duplicate_paths_are_rejected() {
        let err = SignalStore::new(vec![
            SignalDecl::scalar("A", SignalType::Bool),
            SignalDecl::scalar("A", SignalType::UInt8),
        ])
        .unwrap_err();
        assert_eq!(err, ConfigurationError::DuplicateSignal("A".into()));
    }

    #[test]
    fn zero_elements_and_bad_defaults_are_rejected() {
        let zero = SignalDecl::array("Z", SignalType::UInt8, 0);
        assert!(matches!(
            SignalStore::new(vec![zero]),
            Err(ConfigurationError::InvalidSignal { .. })
        ));

        let wrong_type = SignalDecl::scalar("W", SignalType::UInt8).with_default(1.0f64);
        assert!(matches!(
            SignalStore::new(vec![wrong_type]),
            Err(ConfigurationError::InvalidSignal { .. })
        ));

        let wrong_len = SignalDecl::array("L", SignalType::UInt8, 3)
            .with_defaults(vec![Value::UInt8(1)]);
        assert!(matches!(
            SignalStore::new(vec![wrong_len]),
            Err(ConfigurationError::InvalidSignal { .. })
        ));
    }

    // ── Double buffering ──────────────────────────────────────────────────────

    #[test]
    fn write_is_invisible_until_swap() {
        let s = store();
        s.write("DDB.X", 7u32).unwrap();
        assert_eq!(s.read("DDB.X").unwrap(), Value::UInt32(0));
        assert_eq!(s.read_current("DDB.X").unwrap(), Value::UInt32(7));

        assert_eq!(s.swap_buffers(), 1);
        assert_eq!(s.read("DDB.X").unwrap(), Value::UInt32(7));
    }

    #[test]
    fn last_write_before_swap_wins() {
        let s = store();
        s.write("DDB.X", 1u32).unwrap();
        s.write("DDB.X", 2u32).unwrap();
        s.swap_buffers();
        assert_eq!(s.read("DDB.X").unwrap(), Value::UInt32(2));
    }

    #[test]
    fn unwritten_signals_keep_their_value_across_swaps() {
        let s = store();
        s.write("DDB.X", 9u32).unwrap();
        s.swap_buffers();
        s.swap_buffers();
        s.swap_buffers();
        assert_eq!(s.read("DDB.X").unwrap(), Value::UInt32(9));
        assert_eq!(s.read_current("DDB.X").unwrap(), Value::UInt32(9));
    }

    #[test]
    fn persistent_signals_ignore_the_swap() {
        let s = store();
        s.write("DDB.Acc", 1.5f64).unwrap();
        // Single slot: visible immediately, and stays put.
        assert_eq!(s.read("DDB.Acc").unwrap(), Value::Float64(1.5));
        s.swap_buffers();
        assert_eq!(s.read("DDB.Acc").unwrap(), Value::Float64(1.5));
    }

    // ── Rejected accesses ─────────────────────────────────────────────────────

    #[test]
    fn type_mismatch_leaves_value_unchanged() {
        let s = store();
        s.write("DDB.X", 3u32).unwrap();
        s.swap_buffers();

        let err = s.write("DDB.X", 4.0f32).unwrap_err();
        assert_eq!(
            err,
            SignalError::TypeMismatch {
                path: "DDB.X".into(),
                expected: SignalType::UInt32,
                found: SignalType::Float32,
            }
        );

        s.swap_buffers();
        assert_eq!(s.read("DDB.X").unwrap(), Value::UInt32(3));
    }

    #[test]
    fn partial_slice_write_stores_nothing() {
        let s = store();
        let err = s
            .write_slice(
                "DDB.Vec",
                &[Value::Int16(1), Value::Int16(2), Value::UInt8(3), Value::Int16(4)],
            )
            .unwrap_err();
        assert!(matches!(err, SignalError::TypeMismatch { .. }));
        s.swap_buffers();
        assert_eq!(s.read_vec("DDB.Vec").unwrap(), vec![Value::Int16(0); 4]);
    }

    #[test]
    fn element_count_is_checked() {
        let s = store();
        assert!(matches!(
            s.read("DDB.Vec"),
            Err(SignalError::ElementCountMismatch { expected: 4, found: 1, .. })
        ));
        let mut short = [Value::Int16(0); 2];
        assert!(s.read_into("DDB.Vec", &mut short).is_err());

        let h = s.handle("DDB.Vec").unwrap();
        assert!(matches!(
            s.write_element_at(h, 4, Value::Int16(1)),
            Err(SignalError::IndexOutOfRange { index: 4, elements: 4, .. })
        ));
    }

    #[test]
    fn unknown_path() {
        let s = store();
        assert_eq!(
            s.read("DDB.Nope").unwrap_err(),
            SignalError::UnknownSignal("DDB.Nope".into())
        );
    }

    // ── Boundary operations ───────────────────────────────────────────────────

    #[test]
    fn reset_to_default_clears_both_generations() {
        let s = store();
        s.write("DDB.Gain", 9.0f64).unwrap();
        s.swap_buffers();
        s.write("DDB.Gain", 10.0f64).unwrap();

        s.reset_to_default(s.id_of("DDB.Gain").unwrap()).unwrap();
        assert_eq!(s.read("DDB.Gain").unwrap(), Value::Float64(2.5));
        assert_eq!(s.read_current("DDB.Gain").unwrap(), Value::Float64(2.5));
    }

    // ── Concurrency ───────────────────────────────────────────────────────────

    #[test]
    fn readers_never_observe_a_partially_written_array() {
        let s = Arc::new(store());
        let h = s.handle("DDB.Vec").unwrap();
        s.write_slice_at(h, &[Value::Int16(5); 4]).unwrap();
        s.swap_buffers();

        let done = Arc::new(AtomicBool::new(false));
        let reader = {
            let (s, done) = (Arc::clone(&s), Arc::clone(&done));
            thread::spawn(move || {
                let mut buf = [Value::Int16(0); 4];
                while !done.load(Ordering::Acquire) {
                    s.read_into_at(h, View::Previous, &mut buf).unwrap();
                    assert!(buf.iter().all(|v| *v == Value::Int16(5)));
                }
            })
        };

        for i in 0..10_000i16 {
            s.write_element_at(h, (i % 4) as usize, Value::Int16(i)).unwrap();
        }
        done.store(true, Ordering::Release);
        reader.join().unwrap();
    }
}
