//! Shared test utilities for the data cube workspace.
//!
//! This crate provides common testing infrastructure including:
//! - In-memory catalog and storage collaborators
//! - Raster plane generators
//! - Common test fixtures
//! - Tracing setup for tests
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{MemoryCatalog, MemoryStorage, fixtures};
//! ```

pub mod fixtures;
pub mod generators;
pub mod memory;

// Re-export commonly used items at the crate root
pub use fixtures::*;
pub use generators::*;
pub use memory::{MemoryCatalog, MemoryStorage};

use cube_common::ArrayData;

/// Install a test subscriber honouring `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Whether two floats agree within `epsilon`. Two NaNs agree.
pub fn approx_eq(left: f64, right: f64, epsilon: f64) -> bool {
    if left.is_nan() || right.is_nan() {
        return left.is_nan() && right.is_nan();
    }
    (left - right).abs() <= epsilon
}

/// Assert two floats agree within an epsilon, treating NaN as equal to NaN
/// so no-data pixels of float bands compare naturally.
///
/// ```
/// test_utils::assert_approx_eq!(0.1_f32, 0.1, 1e-6);
/// test_utils::assert_approx_eq!(f64::NAN, f64::NAN, 1e-6);
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let (left, right, epsilon) = ($left as f64, $right as f64, $epsilon as f64);
        if !$crate::approx_eq(left, right, epsilon) {
            panic!("{} is not within {} of {}", left, epsilon, right);
        }
    }};
}

/// Compare a band's values, in row-major order, against `expected` with
/// [`assert_approx_eq!`].
pub fn assert_values_approx_eq(actual: &ArrayData, expected: &[f64], epsilon: f64) {
    let values = actual.to_f64();
    assert_eq!(values.len(), expected.len(), "band has {} values", values.len());
    for (index, (&value, &wanted)) in values.iter().zip(expected).enumerate() {
        if !approx_eq(value, wanted, epsilon) {
            panic!("value {} is {}, expected {} within {}", index, value, wanted, epsilon);
        }
    }
}
