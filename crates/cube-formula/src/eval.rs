//! Interpretation passes over a parsed formula.

use cube_common::{ArrayData, Band, DType, Measurements, RasterData};
use ndarray::{arr0, ArrayD, IxDyn};

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::error::{FormulaError, FormulaResult};
use crate::ops;

/// A typed intermediate value of the value pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Operand {
    pub dtype: DType,
    /// Literal-derived values adopt the dtype of the arrays they meet.
    pub weak: bool,
    pub data: ArrayData,
}

impl Operand {
    pub fn new(dtype: DType, data: ArrayData) -> Self {
        Self {
            dtype,
            weak: false,
            data,
        }
    }

    pub fn int_literal(value: i64) -> Self {
        Self {
            dtype: DType::Int64,
            weak: true,
            data: ArrayData::Int(arr0(value).into_dyn()),
        }
    }

    pub fn float_literal(value: f64) -> Self {
        Self {
            dtype: DType::Float64,
            weak: true,
            data: ArrayData::Float(arr0(value).into_dyn()),
        }
    }

    pub fn from_band(band: &Band) -> Self {
        Self::new(band.measurement.dtype, band.data.clone())
    }
}

/// Source of variable values for the interpretation passes.
pub trait Inputs {
    /// Value of a variable, `None` when unknown.
    fn operand(&self, name: &str) -> Option<Operand>;

    /// No-data mask of a variable, `None` when unknown.
    fn invalid(&self, name: &str) -> Option<ArrayD<bool>>;
}

impl Inputs for RasterData {
    fn operand(&self, name: &str) -> Option<Operand> {
        self.band(name).map(Operand::from_band)
    }

    fn invalid(&self, name: &str) -> Option<ArrayD<bool>> {
        self.band(name).map(Band::invalid_mask)
    }
}

/// Zero-length stand-ins for declared measurements, used to infer the
/// output dtype of a formula without data.
pub struct Placeholders<'a> {
    measurements: &'a Measurements,
}

impl<'a> Placeholders<'a> {
    pub fn new(measurements: &'a Measurements) -> Self {
        Self { measurements }
    }
}

impl Inputs for Placeholders<'_> {
    fn operand(&self, name: &str) -> Option<Operand> {
        self.measurements
            .get(name)
            .map(|m| Operand::new(m.dtype, ArrayData::empty(m.dtype)))
    }

    fn invalid(&self, name: &str) -> Option<ArrayD<bool>> {
        self.measurements
            .get(name)
            .map(|_| ArrayD::from_elem(IxDyn(&[0]), false))
    }
}

/// Value pass.
pub fn evaluate(expr: &Expr, inputs: &dyn Inputs) -> FormulaResult<Operand> {
    match expr {
        Expr::Var(name) => inputs
            .operand(name)
            .ok_or_else(|| FormulaError::UnknownVariable(name.clone())),
        Expr::Int(value) => Ok(Operand::int_literal(*value)),
        Expr::Float(value) => Ok(Operand::float_literal(*value)),
        Expr::Unary(op, operand) => ops::unary(*op, evaluate(operand, inputs)?),
        Expr::Binary(op, lhs, rhs) => {
            let lhs = evaluate(lhs, inputs)?;
            let rhs = evaluate(rhs, inputs)?;
            ops::binary(*op, lhs, rhs)
        }
    }
}

/// Validity pass: true where the result depends on a no-data input pixel.
///
/// Every operator propagates the union of its operands' masks; literals are
/// always valid.
pub fn invalid_mask(expr: &Expr, inputs: &dyn Inputs) -> FormulaResult<ArrayD<bool>> {
    match expr {
        Expr::Var(name) => inputs
            .invalid(name)
            .ok_or_else(|| FormulaError::UnknownVariable(name.clone())),
        Expr::Int(_) | Expr::Float(_) => Ok(arr0(false).into_dyn()),
        Expr::Unary(op, operand) => match op {
            UnaryOp::Neg | UnaryOp::Pos | UnaryOp::Invert | UnaryOp::Not => {
                invalid_mask(operand, inputs)
            }
        },
        Expr::Binary(op, lhs, rhs) => match op {
            BinaryOp::Or
            | BinaryOp::Xor
            | BinaryOp::And
            | BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Le
            | BinaryOp::Ge
            | BinaryOp::Lt
            | BinaryOp::Gt
            | BinaryOp::Shl
            | BinaryOp::Shr
            | BinaryOp::Add
            | BinaryOp::Sub
            | BinaryOp::Mul
            | BinaryOp::Div
            | BinaryOp::FloorDiv
            | BinaryOp::Mod
            | BinaryOp::Pow => {
                let lhs = invalid_mask(lhs, inputs)?;
                let rhs = invalid_mask(rhs, inputs)?;
                ops::zip_with(&lhs, &rhs, |a, b| a || b)
            }
        },
    }
}
