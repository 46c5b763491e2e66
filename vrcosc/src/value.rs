//! vrcosc/src/value.rs
//!
//! The argument values an OSC message can carry. Only the subset VRChat uses is
//! supported: int32 (`i`), float32 (`f`), string (`s`) and booleans (`T`/`F`).

use std::fmt;

use crate::{OscError, Result};

/// The wire type of an [`OscValue`], independent of its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OscValueType {
    Int,
    Float,
    String,
    Bool,
}

impl OscValueType {
    pub fn name(&self) -> &'static str {
        match self {
            OscValueType::Int => "int32",
            OscValueType::Float => "float32",
            OscValueType::String => "string",
            OscValueType::Bool => "bool",
        }
    }
}

impl fmt::Display for OscValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single OSC argument.
///
/// The variant is the wire type. The `as_*` accessors never coerce: asking for
/// a float from an `Int` is a [`OscError::TypeMismatch`]. Use [`OscValue::convert`]
/// for the best-effort conversion instead.
#[derive(Debug, Clone, PartialEq)]
pub enum OscValue {
    Int(i32),
    Float(f32),
    String(String),
    Bool(bool),
}

impl OscValue {
    pub fn value_type(&self) -> OscValueType {
        match self {
            OscValue::Int(_) => OscValueType::Int,
            OscValue::Float(_) => OscValueType::Float,
            OscValue::String(_) => OscValueType::String,
            OscValue::Bool(_) => OscValueType::Bool,
        }
    }

    /// The character this value contributes to the type-tag string.
    pub fn type_tag(&self) -> char {
        match self {
            OscValue::Int(_) => 'i',
            OscValue::Float(_) => 'f',
            OscValue::String(_) => 's',
            OscValue::Bool(true) => 'T',
            OscValue::Bool(false) => 'F',
        }
    }

    pub fn as_int(&self) -> Result<i32> {
        match self {
            OscValue::Int(v) => Ok(*v),
            other => Err(mismatch(OscValueType::Int, other)),
        }
    }

    pub fn as_float(&self) -> Result<f32> {
        match self {
            OscValue::Float(v) => Ok(*v),
            other => Err(mismatch(OscValueType::Float, other)),
        }
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            OscValue::Bool(v) => Ok(*v),
            other => Err(mismatch(OscValueType::Bool, other)),
        }
    }

    pub fn as_str(&self) -> Result<&str> {
        match self {
            OscValue::String(v) => Ok(v.as_str()),
            other => Err(mismatch(OscValueType::String, other)),
        }
    }

    /// Best-effort conversion to `T`, failing only when no sensible conversion exists.
    pub fn convert<T: FromOscValue>(&self) -> Result<T> {
        T::from_osc_value(self)
    }
}

fn mismatch(expected: OscValueType, found: &OscValue) -> OscError {
    OscError::TypeMismatch {
        expected,
        found: found.value_type(),
    }
}

impl fmt::Display for OscValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OscValue::Int(v) => write!(f, "{v}"),
            OscValue::Float(v) => write!(f, "{v}"),
            OscValue::String(v) => f.write_str(v),
            OscValue::Bool(v) => write!(f, "{v}"),
        }
    }
}

/// Types an [`OscValue`] can be converted into with [`OscValue::convert`].
///
/// Conversions are lenient where the meaning is unambiguous (an `Int(1)` is a
/// `true`, a `"0.5"` string is a float) and fail with
/// [`OscError::TypeMismatch`] everywhere else.
pub trait FromOscValue: Sized {
    const TYPE: OscValueType;

    fn from_osc_value(value: &OscValue) -> Result<Self>;
}

impl FromOscValue for i32 {
    const TYPE: OscValueType = OscValueType::Int;

    fn from_osc_value(value: &OscValue) -> Result<Self> {
        match value {
            OscValue::Int(v) => Ok(*v),
            OscValue::Float(v) if v.is_finite() && *v >= i32::MIN as f32 && *v < i32::MAX as f32 => {
                Ok(v.round() as i32)
            }
            OscValue::Bool(v) => Ok(i32::from(*v)),
            OscValue::String(s) => s.trim().parse().map_err(|_| mismatch(Self::TYPE, value)),
            other => Err(mismatch(Self::TYPE, other)),
        }
    }
}

impl FromOscValue for f32 {
    const TYPE: OscValueType = OscValueType::Float;

    fn from_osc_value(value: &OscValue) -> Result<Self> {
        match value {
            OscValue::Float(v) => Ok(*v),
            OscValue::Int(v) => Ok(*v as f32),
            OscValue::Bool(v) => Ok(if *v { 1.0 } else { 0.0 }),
            OscValue::String(s) => s.trim().parse().map_err(|_| mismatch(Self::TYPE, value)),
        }
    }
}

impl FromOscValue for bool {
    const TYPE: OscValueType = OscValueType::Bool;

    fn from_osc_value(value: &OscValue) -> Result<Self> {
        match value {
            OscValue::Bool(v) => Ok(*v),
            OscValue::Int(v) => Ok(*v != 0),
            OscValue::Float(v) if !v.is_nan() => Ok(*v != 0.0),
            OscValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(true),
                "false" | "0" => Ok(false),
                _ => Err(mismatch(Self::TYPE, value)),
            },
            other => Err(mismatch(Self::TYPE, other)),
        }
    }
}

impl FromOscValue for String {
    const TYPE: OscValueType = OscValueType::String;

    fn from_osc_value(value: &OscValue) -> Result<Self> {
        Ok(value.to_string())
    }
}

impl From<bool> for OscValue {
    fn from(v: bool) -> Self {
        OscValue::Bool(v)
    }
}

impl From<i32> for OscValue {
    fn from(v: i32) -> Self {
        OscValue::Int(v)
    }
}

impl From<i16> for OscValue {
    fn from(v: i16) -> Self {
        OscValue::Int(v.into())
    }
}

impl From<u16> for OscValue {
    fn from(v: u16) -> Self {
        OscValue::Int(v.into())
    }
}

impl From<i8> for OscValue {
    fn from(v: i8) -> Self {
        OscValue::Int(v.into())
    }
}

impl From<u8> for OscValue {
    fn from(v: u8) -> Self {
        OscValue::Int(v.into())
    }
}

// Wider integers saturate at the int32 bounds; the wire has no 64-bit int.
impl From<u32> for OscValue {
    fn from(v: u32) -> Self {
        OscValue::Int(i32::try_from(v).unwrap_or(i32::MAX))
    }
}

impl From<i64> for OscValue {
    fn from(v: i64) -> Self {
        OscValue::Int(v.clamp(i32::MIN.into(), i32::MAX.into()) as i32)
    }
}

impl From<u64> for OscValue {
    fn from(v: u64) -> Self {
        OscValue::Int(i32::try_from(v).unwrap_or(i32::MAX))
    }
}

impl From<f32> for OscValue {
    fn from(v: f32) -> Self {
        OscValue::Float(v)
    }
}

// OSC 1.0 has no double in the VRChat subset, so f64 narrows.
impl From<f64> for OscValue {
    fn from(v: f64) -> Self {
        OscValue::Float(v as f32)
    }
}

impl From<&str> for OscValue {
    fn from(v: &str) -> Self {
        OscValue::String(v.to_string())
    }
}

impl From<String> for OscValue {
    fn from(v: String) -> Self {
        OscValue::String(v)
    }
}

impl From<&String> for OscValue {
    fn from(v: &String) -> Self {
        OscValue::String(v.clone())
    }
}
