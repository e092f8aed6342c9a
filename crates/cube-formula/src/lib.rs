//! Band-math formulas for data cube expressions.
//!
//! A formula such as `(nir - red) / (nir + red)` is parsed once into an
//! [`Expr`] tree and then interpreted by independent passes:
//!
//! - **value pass** ([`eval::evaluate`]): computes the result array with
//!   numpy-like dtype promotion,
//! - **validity pass** ([`eval::invalid_mask`]): computes which output pixels
//!   depend on a no-data input pixel,
//! - **dtype inference** ([`Formula::infer_dtype`]): runs the value pass over
//!   zero-length placeholders so no real data is touched.
//!
//! # Example
//!
//! ```rust
//! use cube_common::{DType, Measurement, Measurements};
//! use cube_formula::Formula;
//!
//! let formula = Formula::parse("(nir - red) / (nir + red)").unwrap();
//! let inputs: Measurements = vec![
//!     Measurement::new("red", DType::Int16),
//!     Measurement::new("nir", DType::Int16),
//! ]
//! .into_iter()
//! .collect();
//!
//! assert_eq!(formula.infer_dtype(&inputs).unwrap(), DType::Float64);
//! ```

pub mod ast;
pub mod error;
pub mod eval;
pub mod ops;
pub mod parser;

use std::collections::BTreeSet;
use std::fmt;

use cube_common::{DType, Measurements};
use ndarray::ArrayD;
use tracing::trace;

pub use ast::{BinaryOp, Expr, UnaryOp};
pub use error::{FormulaError, FormulaResult};
pub use eval::{Inputs, Operand, Placeholders};

/// A parsed formula together with its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    source: String,
    expr: Expr,
}

impl Formula {
    pub fn parse(source: &str) -> FormulaResult<Self> {
        let expr = parser::parse(source)?;
        trace!(formula = source, parsed = %expr, "Parsed formula");
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Names of all variables the formula references.
    pub fn variables(&self) -> BTreeSet<String> {
        self.expr.variables()
    }

    /// Output dtype given the declared input measurements.
    pub fn infer_dtype(&self, inputs: &Measurements) -> FormulaResult<DType> {
        Ok(eval::evaluate(&self.expr, &Placeholders::new(inputs))?.dtype)
    }

    pub fn evaluate(&self, inputs: &dyn Inputs) -> FormulaResult<Operand> {
        eval::evaluate(&self.expr, inputs)
    }

    pub fn invalid_mask(&self, inputs: &dyn Inputs) -> FormulaResult<ArrayD<bool>> {
        eval::invalid_mask(&self.expr, inputs)
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
