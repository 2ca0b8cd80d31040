/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Element types and scalar values carried by signals.
//!
//! Every element, whatever its declared type, is stored as a 64-bit word so
//! the store can use one `AtomicU64` per element.  [`Value::to_bits`] and
//! [`Value::from_bits`] define that encoding; it is lossless for every type.

use std::fmt;

// ── SignalType ────────────────────────────────────────────────────────────────

/// Declared element type of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalType {
    Bool,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
}

impl SignalType {
    /// Canonical lower-case name as used in configuration files.
    pub fn name(self) -> &'static str {
        match self {
            SignalType::Bool => "bool",
            SignalType::UInt8 => "uint8",
            SignalType::UInt16 => "uint16",
            SignalType::UInt32 => "uint32",
            SignalType::UInt64 => "uint64",
            SignalType::Int8 => "int8",
            SignalType::Int16 => "int16",
            SignalType::Int32 => "int32",
            SignalType::Int64 => "int64",
            SignalType::Float32 => "float32",
            SignalType::Float64 => "float64",
        }
    }

    /// Parses a type name.  Both the long form (`uint32`) and the Rust
    /// primitive spelling (`u32`) are accepted, case-insensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        let ty = match name.to_ascii_lowercase().as_str() {
            "bool" | "boolean" => SignalType::Bool,
            "uint8" | "u8" => SignalType::UInt8,
            "uint16" | "u16" => SignalType::UInt16,
            "uint32" | "u32" => SignalType::UInt32,
            "uint64" | "u64" => SignalType::UInt64,
            "int8" | "i8" => SignalType::Int8,
            "int16" | "i16" => SignalType::Int16,
            "int32" | "i32" => SignalType::Int32,
            "int64" | "i64" => SignalType::Int64,
            "float32" | "f32" => SignalType::Float32,
            "float64" | "f64" => SignalType::Float64,
            _ => return None,
        };
        Some(ty)
    }

    /// The zero value of this type (`false` for [`SignalType::Bool`]).
    pub fn zero(self) -> Value {
        Value::from_bits(self, 0)
    }

    pub fn is_float(self) -> bool {
        matches!(self, SignalType::Float32 | SignalType::Float64)
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Value ─────────────────────────────────────────────────────────────────────

/// A single typed element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Bool(bool),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
}

impl Value {
    pub fn signal_type(&self) -> SignalType {
        match self {
            Value::Bool(_) => SignalType::Bool,
            Value::UInt8(_) => SignalType::UInt8,
            Value::UInt16(_) => SignalType::UInt16,
            Value::UInt32(_) => SignalType::UInt32,
            Value::UInt64(_) => SignalType::UInt64,
            Value::Int8(_) => SignalType::Int8,
            Value::Int16(_) => SignalType::Int16,
            Value::Int32(_) => SignalType::Int32,
            Value::Int64(_) => SignalType::Int64,
            Value::Float32(_) => SignalType::Float32,
            Value::Float64(_) => SignalType::Float64,
        }
    }

    /// Storage encoding.  Signed integers are sign-extended, floats keep
    /// their IEEE-754 bit pattern.
    pub(crate) fn to_bits(self) -> u64 {
        match self {
            Value::Bool(v) => v as u64,
            Value::UInt8(v) => v as u64,
            Value::UInt16(v) => v as u64,
            Value::UInt32(v) => v as u64,
            Value::UInt64(v) => v,
            Value::Int8(v) => v as i64 as u64,
            Value::Int16(v) => v as i64 as u64,
            Value::Int32(v) => v as i64 as u64,
            Value::Int64(v) => v as u64,
            Value::Float32(v) => v.to_bits() as u64,
            Value::Float64(v) => v.to_bits(),
        }
    }

    /// Inverse of [`to_bits`](Self::to_bits).
    pub(crate) fn from_bits(ty: SignalType, bits: u64) -> Value {
        match ty {
            SignalType::Bool => Value::Bool(bits != 0),
            SignalType::UInt8 => Value::UInt8(bits as u8),
            SignalType::UInt16 => Value::UInt16(bits as u16),
            SignalType::UInt32 => Value::UInt32(bits as u32),
            SignalType::UInt64 => Value::UInt64(bits),
            SignalType::Int8 => Value::Int8(bits as i8),
            SignalType::Int16 => Value::Int16(bits as i16),
            SignalType::Int32 => Value::Int32(bits as i32),
            SignalType::Int64 => Value::Int64(bits as i64),
            SignalType::Float32 => Value::Float32(f32::from_bits(bits as u32)),
            SignalType::Float64 => Value::Float64(f64::from_bits(bits)),
        }
    }

    /// Numeric view used by the arithmetic built-in modules.
    ///
    /// `u64`/`i64` values above 2^53 lose precision.
    pub fn as_f64(&self) -> f64 {
        match *self {
            Value::Bool(v) => {
                if v {
                    1.0
                } else {
                    0.0
                }
            }
            Value::UInt8(v) => v as f64,
            Value::UInt16(v) => v as f64,
            Value::UInt32(v) => v as f64,
            Value::UInt64(v) => v as f64,
            Value::Int8(v) => v as f64,
            Value::Int16(v) => v as f64,
            Value::Int32(v) => v as f64,
            Value::Int64(v) => v as f64,
            Value::Float32(v) => v as f64,
            Value::Float64(v) => v,
        }
    }

    /// Converts a numeric result into a value of type `ty`.
    ///
    /// Integer targets round to nearest and saturate at the type bounds
    /// (NaN becomes 0), matching the semantics of Rust's `as` casts.
    pub fn from_f64(ty: SignalType, v: f64) -> Value {
        let r = v.round();
        match ty {
            SignalType::Bool => Value::Bool(v != 0.0 && !v.is_nan()),
            SignalType::UInt8 => Value::UInt8(r as u8),
            SignalType::UInt16 => Value::UInt16(r as u16),
            SignalType::UInt32 => Value::UInt32(r as u32),
            SignalType::UInt64 => Value::UInt64(r as u64),
            SignalType::Int8 => Value::Int8(r as i8),
            SignalType::Int16 => Value::Int16(r as i16),
            SignalType::Int32 => Value::Int32(r as i32),
            SignalType::Int64 => Value::Int64(r as i64),
            SignalType::Float32 => Value::Float32(v as f32),
            SignalType::Float64 => Value::Float64(v),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            Value::UInt8(v) => write!(f, "{v}"),
            Value::UInt16(v) => write!(f, "{v}"),
            Value::UInt32(v) => write!(f, "{v}"),
            Value::UInt64(v) => write!(f, "{v}"),
            Value::Int8(v) => write!(f, "{v}"),
            Value::Int16(v) => write!(f, "{v}"),
            Value::Int32(v) => write!(f, "{v}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::Float32(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{v}"),
        }
    }
}

macro_rules! impl_from_primitive {
    ($($prim:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$prim> for Value {
                fn from(v: $prim) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from_primitive! {
    bool => Bool,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f32 => Float32,
    f64 => Float64,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
