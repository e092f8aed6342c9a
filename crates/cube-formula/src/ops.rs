//! Element-wise operator semantics.
//!
//! Operands broadcast against each other numpy style; the result dtype
//! follows [`DType::promote`] except that literals are "weak" and adopt the
//! dtype of the array they meet, unless they would change its kind
//! (an integer array meeting a float literal becomes float64).
//!
//! Integer results wrap to the result dtype. Booleans take part in
//! arithmetic as uint8. Integer `//` and `%` follow floor semantics and
//! yield 0 on division by zero; `/` always produces floats.

use cube_common::{ArrayData, DType, DTypeKind};
use ndarray::{ArrayD, IxDyn, Zip};

use crate::ast::{BinaryOp, UnaryOp};
use crate::error::{FormulaError, FormulaResult};
use crate::eval::Operand;

/// Apply a unary operator.
pub fn unary(op: UnaryOp, operand: Operand) -> FormulaResult<Operand> {
    let Operand { dtype, weak, data } = operand;
    let (dtype, data) = match op {
        UnaryOp::Neg => match data {
            ArrayData::Bool(_) => return Err(FormulaError::unsupported("-", dtype)),
            ArrayData::Int(a) => (dtype, ArrayData::Int(a.mapv(|v| dtype.cast_int(v.wrapping_neg())))),
            ArrayData::Float(a) => (dtype, ArrayData::Float(a.mapv(|v| -v))),
        },
        UnaryOp::Pos => match data {
            ArrayData::Bool(_) => return Err(FormulaError::unsupported("+", dtype)),
            other => (dtype, other),
        },
        UnaryOp::Invert => match data {
            ArrayData::Bool(a) => (dtype, ArrayData::Bool(a.mapv(|v| !v))),
            ArrayData::Int(a) => (dtype, ArrayData::Int(a.mapv(|v| dtype.cast_int(!v)))),
            ArrayData::Float(_) => return Err(FormulaError::unsupported("~", dtype)),
        },
        UnaryOp::Not => (DType::Bool, ArrayData::Bool(data.to_bool().mapv(|v| !v))),
    };
    Ok(Operand { dtype, weak, data })
}

/// Apply a binary operator.
pub fn binary(op: BinaryOp, lhs: Operand, rhs: Operand) -> FormulaResult<Operand> {
    let weak = lhs.weak && rhs.weak;
    let promoted = result_dtype(&lhs, &rhs);
    let arithmetic_dtype = if promoted.is_bool() {
        DType::UInt8
    } else {
        promoted
    };

    let (dtype, data) = match op {
        BinaryOp::Add => arithmetic(&lhs, &rhs, arithmetic_dtype, |a, b| a + b, i64::wrapping_add)?,
        BinaryOp::Sub => arithmetic(&lhs, &rhs, arithmetic_dtype, |a, b| a - b, i64::wrapping_sub)?,
        BinaryOp::Mul => arithmetic(&lhs, &rhs, arithmetic_dtype, |a, b| a * b, i64::wrapping_mul)?,
        BinaryOp::FloorDiv => {
            arithmetic(&lhs, &rhs, arithmetic_dtype, |a, b| (a / b).floor(), floor_div)?
        }
        BinaryOp::Mod => arithmetic(&lhs, &rhs, arithmetic_dtype, float_mod, floor_mod)?,
        BinaryOp::Pow => {
            if !arithmetic_dtype.is_float() && rhs.data.to_i64().iter().any(|&v| v < 0) {
                return Err(FormulaError::NegativePower);
            }
            arithmetic(&lhs, &rhs, arithmetic_dtype, f64::powf, int_pow)?
        }
        BinaryOp::Div => {
            let dtype = if promoted.is_float() {
                promoted
            } else {
                DType::Float64
            };
            let data = zip_with(&lhs.data.to_f64(), &rhs.data.to_f64(), |a, b| {
                dtype.cast_float(a / b)
            })?;
            (dtype, ArrayData::Float(data))
        }
        BinaryOp::Shl => shift(&lhs, &rhs, arithmetic_dtype, "<<", |a, b| {
            if (0..64).contains(&b) {
                a.wrapping_shl(b as u32)
            } else {
                0
            }
        })?,
        BinaryOp::Shr => shift(&lhs, &rhs, arithmetic_dtype, ">>", |a, b| {
            if (0..64).contains(&b) {
                a >> b
            } else if a < 0 {
                -1
            } else {
                0
            }
        })?,
        BinaryOp::And => bitwise(&lhs, &rhs, promoted, "&", |a, b| a & b, |a, b| a & b)?,
        BinaryOp::Or => bitwise(&lhs, &rhs, promoted, "|", |a, b| a | b, |a, b| a | b)?,
        BinaryOp::Xor => bitwise(&lhs, &rhs, promoted, "^", |a, b| a ^ b, |a, b| a ^ b)?,
        BinaryOp::Eq => compare(&lhs, &rhs, promoted, |o| o == std::cmp::Ordering::Equal)?,
        BinaryOp::Ne => compare_ne(&lhs, &rhs, promoted)?,
        BinaryOp::Le => compare(&lhs, &rhs, promoted, |o| o != std::cmp::Ordering::Greater)?,
        BinaryOp::Ge => compare(&lhs, &rhs, promoted, |o| o != std::cmp::Ordering::Less)?,
        BinaryOp::Lt => compare(&lhs, &rhs, promoted, |o| o == std::cmp::Ordering::Less)?,
        BinaryOp::Gt => compare(&lhs, &rhs, promoted, |o| o == std::cmp::Ordering::Greater)?,
    };

    Ok(Operand { dtype, weak, data })
}

/// Result dtype of combining two operands, honouring weak literals.
pub fn result_dtype(lhs: &Operand, rhs: &Operand) -> DType {
    match (lhs.weak, rhs.weak) {
        (false, true) => with_weak(lhs.dtype, rhs.dtype),
        (true, false) => with_weak(rhs.dtype, lhs.dtype),
        _ => lhs.dtype.promote(rhs.dtype),
    }
}

fn with_weak(strong: DType, weak: DType) -> DType {
    match (strong.kind(), weak.kind()) {
        (DTypeKind::Bool, DTypeKind::Bool) => DType::Bool,
        (DTypeKind::Bool, _) => weak,
        (DTypeKind::Int, DTypeKind::Float) => DType::Float64,
        _ => strong,
    }
}

/// Numpy broadcast of two shapes.
pub fn broadcast_shape(left: &[usize], right: &[usize]) -> FormulaResult<Vec<usize>> {
    let ndim = left.len().max(right.len());
    let dim = |shape: &[usize], axis: usize| {
        let offset = ndim - shape.len();
        if axis < offset {
            1
        } else {
            shape[axis - offset]
        }
    };

    (0..ndim)
        .map(|axis| match (dim(left, axis), dim(right, axis)) {
            (a, b) if a == b => Ok(a),
            (1, b) => Ok(b),
            (a, 1) => Ok(a),
            _ => Err(FormulaError::Shape {
                left: left.to_vec(),
                right: right.to_vec(),
            }),
        })
        .collect()
}

/// Element-wise combination of two broadcastable arrays.
pub fn zip_with<A, B, C, F>(lhs: &ArrayD<A>, rhs: &ArrayD<B>, f: F) -> FormulaResult<ArrayD<C>>
where
    A: Copy,
    B: Copy,
    F: Fn(A, B) -> C,
{
    let shape = broadcast_shape(lhs.shape(), rhs.shape())?;
    let shape_error = || FormulaError::Shape {
        left: lhs.shape().to_vec(),
        right: rhs.shape().to_vec(),
    };
    let left = lhs.broadcast(IxDyn(&shape)).ok_or_else(shape_error)?;
    let right = rhs.broadcast(IxDyn(&shape)).ok_or_else(shape_error)?;
    Ok(Zip::from(&left).and(&right).map_collect(|&a, &b| f(a, b)))
}

fn arithmetic(
    lhs: &Operand,
    rhs: &Operand,
    dtype: DType,
    float_fn: fn(f64, f64) -> f64,
    int_fn: fn(i64, i64) -> i64,
) -> FormulaResult<(DType, ArrayData)> {
    let data = if dtype.is_float() {
        ArrayData::Float(zip_with(&lhs.data.to_f64(), &rhs.data.to_f64(), |a, b| {
            dtype.cast_float(float_fn(a, b))
        })?)
    } else {
        ArrayData::Int(zip_with(&lhs.data.to_i64(), &rhs.data.to_i64(), |a, b| {
            dtype.cast_int(int_fn(a, b))
        })?)
    };
    Ok((dtype, data))
}

fn shift(
    lhs: &Operand,
    rhs: &Operand,
    dtype: DType,
    symbol: &'static str,
    int_fn: fn(i64, i64) -> i64,
) -> FormulaResult<(DType, ArrayData)> {
    for operand in [lhs, rhs] {
        if operand.dtype.is_float() {
            return Err(FormulaError::unsupported(symbol, operand.dtype));
        }
    }
    let data = zip_with(&lhs.data.to_i64(), &rhs.data.to_i64(), |a, b| {
        dtype.cast_int(int_fn(a, b))
    })?;
    Ok((dtype, ArrayData::Int(data)))
}

fn bitwise(
    lhs: &Operand,
    rhs: &Operand,
    dtype: DType,
    symbol: &'static str,
    bool_fn: fn(bool, bool) -> bool,
    int_fn: fn(i64, i64) -> i64,
) -> FormulaResult<(DType, ArrayData)> {
    for operand in [lhs, rhs] {
        if operand.dtype.is_float() {
            return Err(FormulaError::unsupported(symbol, operand.dtype));
        }
    }
    if dtype.is_bool() {
        let data = zip_with(&lhs.data.to_bool(), &rhs.data.to_bool(), bool_fn)?;
        return Ok((DType::Bool, ArrayData::Bool(data)));
    }
    let data = zip_with(&lhs.data.to_i64(), &rhs.data.to_i64(), |a, b| {
        dtype.cast_int(int_fn(a, b))
    })?;
    Ok((dtype, ArrayData::Int(data)))
}

fn compare(
    lhs: &Operand,
    rhs: &Operand,
    promoted: DType,
    accept: fn(std::cmp::Ordering) -> bool,
) -> FormulaResult<(DType, ArrayData)> {
    let data = if promoted.is_float() {
        // NaN compares false against everything
        zip_with(&lhs.data.to_f64(), &rhs.data.to_f64(), |a, b| {
            a.partial_cmp(&b).map_or(false, accept)
        })?
    } else {
        zip_with(&lhs.data.to_i64(), &rhs.data.to_i64(), |a, b| accept(a.cmp(&b)))?
    };
    Ok((DType::Bool, ArrayData::Bool(data)))
}

fn compare_ne(lhs: &Operand, rhs: &Operand, promoted: DType) -> FormulaResult<(DType, ArrayData)> {
    let (dtype, data) = compare(lhs, rhs, promoted, |o| o == std::cmp::Ordering::Equal)?;
    Ok((dtype, ArrayData::Bool(data.to_bool().mapv(|v| !v))))
}

fn floor_div(a: i64, b: i64) -> i64 {
    if b == 0 {
        return 0;
    }
    let quotient = a.wrapping_div(b);
    if a.wrapping_rem(b) != 0 && ((a < 0) != (b < 0)) {
        quotient - 1
    } else {
        quotient
    }
}

fn floor_mod(a: i64, b: i64) -> i64 {
    if b == 0 {
        return 0;
    }
    let remainder = a.wrapping_rem(b);
    if remainder != 0 && ((remainder < 0) != (b < 0)) {
        remainder + b
    } else {
        remainder
    }
}

fn float_mod(a: f64, b: f64) -> f64 {
    let remainder = a % b;
    if remainder != 0.0 && ((remainder < 0.0) != (b < 0.0)) {
        remainder + b
    } else {
        remainder
    }
}

fn int_pow(base: i64, exponent: i64) -> i64 {
    base.wrapping_pow(exponent.clamp(0, u32::MAX as i64) as u32)
}
