//! Built-in transformations.
//!
//! Each transformation is built from the keys of its `transform` recipe
//! (everything except `transform` and `source`) and registered under a
//! short name and a qualified name.

pub mod apply_mask;
pub mod expressions;
pub mod make_mask;
pub mod rename;
pub mod to_float;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_yaml::{Mapping, Value};

use cube_common::{CubeError, CubeResult, Measurements};

use crate::registry::{Registry, TransformFactory};
use crate::transform::Transformation;

pub use apply_mask::{ApplyMask, ApplyMaskSettings};
pub use expressions::{Expressions, FormulaSpec, OutputSpec};
pub use make_mask::{MakeMask, MakeMaskSettings};
pub use rename::{Rename, Select};
pub use to_float::{ToFloat, ToFloatSettings};

/// Register every built-in transformation.
pub fn register_builtins(registry: &mut Registry) {
    registry.register_transform("expressions", expressions::QUALIFIED_NAME, factory(Expressions::from_args));
    registry.register_transform("apply_mask", apply_mask::QUALIFIED_NAME, factory(ApplyMask::from_args));
    registry.register_transform("make_mask", make_mask::QUALIFIED_NAME, factory(MakeMask::from_args));
    registry.register_transform("to_float", to_float::QUALIFIED_NAME, factory(ToFloat::from_args));
    registry.register_transform("rename", rename::RENAME_QUALIFIED_NAME, factory(Rename::from_args));
    registry.register_transform("select", rename::SELECT_QUALIFIED_NAME, factory(Select::from_args));
}

fn factory<T, F>(build: F) -> TransformFactory
where
    T: Transformation + 'static,
    F: Fn(&Mapping) -> CubeResult<T> + Send + Sync + 'static,
{
    Arc::new(move |args: &Mapping| Ok(Box::new(build(args)?) as Box<dyn Transformation>))
}

/// Deserialize the arguments of a `transform` recipe.
pub(crate) fn parse_args<T: DeserializeOwned>(transform: &str, args: &Mapping) -> CubeResult<T> {
    serde_yaml::from_value(Value::Mapping(args.clone()))
        .map_err(|e| CubeError::recipe(format!("invalid arguments for {}: {}", transform, e)))
}

/// Arguments in recipe form, for `reconstruct`.
pub(crate) fn to_args<T: Serialize>(settings: &T) -> Mapping {
    match serde_yaml::to_value(settings) {
        Ok(Value::Mapping(mapping)) => mapping,
        _ => Mapping::new(),
    }
}

/// Measurements named in `names`, or every measurement when `names` is
/// absent. A name the input lacks is a missing input.
pub(crate) fn targets(
    input: &Measurements,
    names: Option<&[String]>,
    transform: &str,
) -> CubeResult<Vec<String>> {
    match names {
        None => Ok(input.names()),
        Some(names) => {
            for name in names {
                if !input.contains(name) {
                    return Err(CubeError::missing_input(format!(
                        "{} refers to unknown measurement '{}'",
                        transform, name
                    )));
                }
            }
            Ok(names.to_vec())
        }
    }
}

fn default_true() -> bool {
    true
}
