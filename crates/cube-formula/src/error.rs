//! Error types for formula parsing and evaluation.

use cube_common::{CubeError, DType};
use thiserror::Error;

pub type FormulaResult<T> = Result<T, FormulaError>;

#[derive(Debug, Error)]
pub enum FormulaError {
    #[error("Cannot parse formula '{formula}' near '{near}'")]
    Parse { formula: String, near: String },

    #[error("Unknown variable '{0}' in formula")]
    UnknownVariable(String),

    #[error("Operator '{op}' does not support {dtype} operands")]
    UnsupportedOperand { op: &'static str, dtype: DType },

    #[error("Operand shapes {left:?} and {right:?} cannot be broadcast together")]
    Shape { left: Vec<usize>, right: Vec<usize> },

    #[error("Integers to negative integer powers are not allowed")]
    NegativePower,
}

impl FormulaError {
    pub fn unsupported(op: &'static str, dtype: DType) -> Self {
        FormulaError::UnsupportedOperand { op, dtype }
    }
}

impl From<FormulaError> for CubeError {
    fn from(err: FormulaError) -> Self {
        CubeError::Evaluation(err.to_string())
    }
}
