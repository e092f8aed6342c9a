//! Element types of measurement arrays.
//!
//! Promotion follows the numpy rules the data cube has always used:
//! widen within a kind, mixing signed and unsigned integers moves to a signed
//! type wide enough for both, and mixing integers with floats yields float32
//! only for integers of at most 16 bits.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CubeError;

/// Storage dtype of a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    Float32,
    Float64,
}

/// Broad category of a dtype; decides the in-memory array representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DTypeKind {
    Bool,
    Int,
    Float,
}

impl DType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DType::Bool => "bool",
            DType::Int8 => "int8",
            DType::Int16 => "int16",
            DType::Int32 => "int32",
            DType::Int64 => "int64",
            DType::UInt8 => "uint8",
            DType::UInt16 => "uint16",
            DType::UInt32 => "uint32",
            DType::Float32 => "float32",
            DType::Float64 => "float64",
        }
    }

    pub fn kind(&self) -> DTypeKind {
        match self {
            DType::Bool => DTypeKind::Bool,
            DType::Float32 | DType::Float64 => DTypeKind::Float,
            _ => DTypeKind::Int,
        }
    }

    pub fn is_bool(&self) -> bool {
        self.kind() == DTypeKind::Bool
    }

    pub fn is_integer(&self) -> bool {
        self.kind() == DTypeKind::Int
    }

    pub fn is_float(&self) -> bool {
        self.kind() == DTypeKind::Float
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            DType::Int8 | DType::Int16 | DType::Int32 | DType::Int64 | DType::Float32 | DType::Float64
        )
    }

    /// Width in bits (bool counts as 8).
    pub fn bits(&self) -> u32 {
        match self {
            DType::Bool | DType::Int8 | DType::UInt8 => 8,
            DType::Int16 | DType::UInt16 => 16,
            DType::Int32 | DType::UInt32 | DType::Float32 => 32,
            DType::Int64 | DType::Float64 => 64,
        }
    }

    /// Result dtype of a binary operation between two arrays.
    pub fn promote(self, other: DType) -> DType {
        if self == other {
            return self;
        }
        match (self.kind(), other.kind()) {
            (DTypeKind::Bool, _) => other,
            (_, DTypeKind::Bool) => self,
            (DTypeKind::Float, DTypeKind::Float) => {
                if self.bits() >= other.bits() {
                    self
                } else {
                    other
                }
            }
            (DTypeKind::Float, DTypeKind::Int) => float_with_int(self, other),
            (DTypeKind::Int, DTypeKind::Float) => float_with_int(other, self),
            (DTypeKind::Int, DTypeKind::Int) => promote_integers(self, other),
        }
    }

    /// Wrap an integer into the range of this dtype.
    pub fn cast_int(&self, value: i64) -> i64 {
        match self {
            DType::Bool => (value != 0) as i64,
            DType::Int8 => value as i8 as i64,
            DType::Int16 => value as i16 as i64,
            DType::Int32 => value as i32 as i64,
            DType::UInt8 => value as u8 as i64,
            DType::UInt16 => value as u16 as i64,
            DType::UInt32 => value as u32 as i64,
            DType::Int64 | DType::Float32 | DType::Float64 => value,
        }
    }

    /// Round a float to the precision of this dtype.
    pub fn cast_float(&self, value: f64) -> f64 {
        match self {
            DType::Float32 => value as f32 as f64,
            _ => value,
        }
    }

    /// Whether `value` is exactly representable by this dtype.
    pub fn can_hold(&self, value: f64) -> bool {
        match self.kind() {
            DTypeKind::Float => true,
            DTypeKind::Bool => false,
            DTypeKind::Int => {
                value.is_finite()
                    && value.fract() == 0.0
                    && self.cast_int(value as i64) as f64 == value
            }
        }
    }
}

fn float_with_int(float: DType, int: DType) -> DType {
    if float == DType::Float32 && int.bits() <= 16 {
        DType::Float32
    } else {
        DType::Float64
    }
}

fn promote_integers(a: DType, b: DType) -> DType {
    match (a.is_signed(), b.is_signed()) {
        (true, true) | (false, false) => {
            if a.bits() >= b.bits() {
                a
            } else {
                b
            }
        }
        (true, false) => mixed_sign(a, b),
        (false, true) => mixed_sign(b, a),
    }
}

fn mixed_sign(signed: DType, unsigned: DType) -> DType {
    if signed.bits() > unsigned.bits() {
        return signed;
    }
    match unsigned.bits() * 2 {
        16 => DType::Int16,
        32 => DType::Int32,
        _ => DType::Int64,
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DType {
    type Err = CubeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bool" | "boolean" => Ok(DType::Bool),
            "int8" => Ok(DType::Int8),
            "int16" => Ok(DType::Int16),
            "int32" => Ok(DType::Int32),
            "int64" => Ok(DType::Int64),
            "uint8" => Ok(DType::UInt8),
            "uint16" => Ok(DType::UInt16),
            "uint32" => Ok(DType::UInt32),
            "float32" => Ok(DType::Float32),
            "float64" => Ok(DType::Float64),
            other => Err(CubeError::recipe(format!("unknown dtype '{}'", other))),
        }
    }
}
