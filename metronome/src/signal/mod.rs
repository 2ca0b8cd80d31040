/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Signals: named, typed, fixed-size values shared between modules.
//!
//! A signal is declared once with a [`SignalDecl`] and lives in the
//! [`SignalStore`] for the lifetime of the application.  The store keeps two
//! generations of every buffered signal:
//!
//! | Slot | Written by | Read by |
//! |------|------------|---------|
//! | write (current) | producers during the running cycle | later modules of the producer's own plan |
//! | read (previous) | nobody – frozen since the last swap | every other consumer |
//!
//! Persistent signals ([`StorageClass::Persistent`]) have a single slot that
//! only their owning module touches.

pub mod store;
pub mod value;

pub use store::{SignalHandle, SignalId, SignalStore, View};
pub use value::{SignalType, Value};

// ── Declarations ──────────────────────────────────────────────────────────────

/// How a signal is stored.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StorageClass {
    /// Double-buffered; swapped at every cycle boundary.
    #[default]
    Buffered,

    /// Single slot, private to `owner`, retained across cycles and States.
    Persistent { owner: String },
}

/// Declaration of one signal.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalDecl {
    /// Fully qualified path, e.g. `DDB.X`.
    pub path: String,
    pub ty: SignalType,
    /// Number of elements; `1` for scalars.
    pub elements: usize,
    /// One default per element.
    pub default: Vec<Value>,
    pub storage: StorageClass,
    /// Restore the default when leaving a State that produces this signal.
    pub reset_on_exit: bool,
}

impl SignalDecl {
    /// Scalar signal with a zero default.
    pub fn scalar(path: impl Into<String>, ty: SignalType) -> Self {
        Self::array(path, ty, 1)
    }

    /// Array signal of `elements` zeroes.
    pub fn array(path: impl Into<String>, ty: SignalType, elements: usize) -> Self {
        Self {
            path: path.into(),
            ty,
            elements,
            default: vec![ty.zero(); elements],
            storage: StorageClass::Buffered,
            reset_on_exit: false,
        }
    }

    /// Sets every element's default to `value`.
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = vec![value.into(); self.elements];
        self
    }

    /// Sets per-element defaults.  The length is checked by the store.
    pub fn with_defaults(mut self, values: Vec<Value>) -> Self {
        self.default = values;
        self
    }

    pub fn persistent(mut self, owner: impl Into<String>) -> Self {
        self.storage = StorageClass::Persistent {
            owner: owner.into(),
        };
        self
    }

    pub fn reset_on_exit(mut self) -> Self {
        self.reset_on_exit = true;
        self
    }

    pub fn owner(&self) -> Option<&str> {
        match &self.storage {
            StorageClass::Persistent { owner } => Some(owner),
            StorageClass::Buffered => None,
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.owner().is_some()
    }
}
