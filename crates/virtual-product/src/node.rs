//! Parsed recipe documents.
//!
//! A recipe is a nested mapping with exactly one discriminating key:
//!
//! ```yaml
//! transform: expressions
//! output:
//!   ndvi:
//!     formula: (nir - red) / (nir + red)
//! source:
//!   collate:
//!     - product: ls8_nbart
//!     - product: ls9_nbart
//! ```
//!
//! Documents are parsed once into the closed [`RecipeNode`] enum; every
//! later stage matches on it exhaustively.

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use cube_common::{CubeError, CubeResult};

const DISCRIMINATORS: [&str; 6] = [
    "product",
    "transform",
    "collate",
    "juxtapose",
    "aggregate",
    "reproject",
];

/// Settings of a `product` leaf.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductSpec {
    pub product: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurements: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_predicate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuse_func: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resampling: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<String>,
}

/// Target grid of a `reproject` node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReprojectSpec {
    pub output_crs: String,
    /// Pixel size as `[y, x]`.
    pub resolution: (f64, f64),
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resampling: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecipeNode {
    Product(ProductSpec),
    Transform {
        transform: String,
        /// `None` only inside catalog transform templates.
        source: Option<Box<RecipeNode>>,
        args: Mapping,
    },
    Collate {
        children: Vec<RecipeNode>,
        index_measurement_name: Option<String>,
    },
    Juxtapose {
        children: Vec<RecipeNode>,
    },
    Aggregate {
        aggregation: String,
        group_by: String,
        source: Box<RecipeNode>,
        args: Mapping,
    },
    Reproject {
        spec: ReprojectSpec,
        source: Box<RecipeNode>,
    },
}

impl RecipeNode {
    pub fn from_yaml_str(text: &str) -> CubeResult<Self> {
        let value: Value = serde_yaml::from_str(text)?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> CubeResult<Self> {
        let mapping = value
            .as_mapping()
            .ok_or_else(|| CubeError::recipe(format!("recipe must be a mapping, got {}", describe(value))))?;

        let present: Vec<&str> = DISCRIMINATORS
            .iter()
            .copied()
            .filter(|key| mapping.contains_key(*key))
            .collect();

        match present.as_slice() {
            [] => Err(CubeError::recipe(format!(
                "recipe needs one of the keys {}; found {}",
                DISCRIMINATORS.join(", "),
                key_list(mapping)
            ))),
            ["product"] => parse_product(value),
            ["transform"] => parse_transform(mapping),
            ["collate"] => parse_collate(mapping),
            ["juxtapose"] => parse_juxtapose(mapping),
            ["aggregate"] => parse_aggregate(mapping),
            ["reproject"] => parse_reproject(mapping),
            many => Err(CubeError::recipe(format!(
                "recipe is ambiguous, it has the keys {}",
                many.join(", ")
            ))),
        }
    }

    /// Canonical document form.
    pub fn to_value(&self) -> Value {
        let mut mapping = Mapping::new();
        match self {
            RecipeNode::Product(spec) => {
                return serde_yaml::to_value(spec).unwrap_or_else(|_| {
                    let mut mapping = Mapping::new();
                    mapping.insert("product".into(), spec.product.clone().into());
                    Value::Mapping(mapping)
                });
            }
            RecipeNode::Transform {
                transform,
                source,
                args,
            } => {
                mapping.insert("transform".into(), transform.clone().into());
                for (key, value) in args {
                    mapping.insert(key.clone(), value.clone());
                }
                if let Some(source) = source {
                    mapping.insert("source".into(), source.to_value());
                }
            }
            RecipeNode::Collate {
                children,
                index_measurement_name,
            } => {
                mapping.insert(
                    "collate".into(),
                    Value::Sequence(children.iter().map(RecipeNode::to_value).collect()),
                );
                if let Some(name) = index_measurement_name {
                    mapping.insert("index_measurement_name".into(), name.clone().into());
                }
            }
            RecipeNode::Juxtapose { children } => {
                mapping.insert(
                    "juxtapose".into(),
                    Value::Sequence(children.iter().map(RecipeNode::to_value).collect()),
                );
            }
            RecipeNode::Aggregate {
                aggregation,
                group_by,
                source,
                args,
            } => {
                mapping.insert("aggregate".into(), aggregation.clone().into());
                mapping.insert("group_by".into(), group_by.clone().into());
                for (key, value) in args {
                    mapping.insert(key.clone(), value.clone());
                }
                mapping.insert("source".into(), source.to_value());
            }
            RecipeNode::Reproject { spec, source } => {
                let spec = serde_yaml::to_value(spec).unwrap_or(Value::Null);
                mapping.insert("reproject".into(), spec);
                mapping.insert("source".into(), source.to_value());
            }
        }
        Value::Mapping(mapping)
    }

    pub fn to_yaml_string(&self) -> CubeResult<String> {
        Ok(serde_yaml::to_string(&self.to_value())?)
    }

    /// Number of `transform` nodes without a source.
    pub fn open_sources(&self) -> usize {
        match self {
            RecipeNode::Product(_) => 0,
            RecipeNode::Transform { source, .. } => {
                source.as_ref().map_or(1, |source| source.open_sources())
            }
            RecipeNode::Collate { children, .. } | RecipeNode::Juxtapose { children } => {
                children.iter().map(RecipeNode::open_sources).sum()
            }
            RecipeNode::Aggregate { source, .. } | RecipeNode::Reproject { source, .. } => {
                source.open_sources()
            }
        }
    }
}

// ============================================================================
// Parsing helpers
// ============================================================================

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

fn key_list(mapping: &Mapping) -> String {
    let keys: Vec<String> = mapping
        .keys()
        .map(|key| key.as_str().map_or_else(|| format!("{:?}", key), str::to_string))
        .collect();
    if keys.is_empty() {
        "no keys".to_string()
    } else {
        keys.join(", ")
    }
}

fn key_str(key: &Value) -> CubeResult<&str> {
    key.as_str()
        .ok_or_else(|| CubeError::recipe(format!("recipe keys must be strings, got {}", describe(key))))
}

fn required_str<'a>(mapping: &'a Mapping, key: &str, node: &str) -> CubeResult<&'a str> {
    match mapping.get(key) {
        Some(Value::String(text)) => Ok(text),
        Some(other) => Err(CubeError::recipe(format!(
            "'{}' of a {} recipe must be a string, got {}",
            key,
            node,
            describe(other)
        ))),
        None => Err(CubeError::recipe(format!("{} recipe requires '{}'", node, key))),
    }
}

fn required_source(mapping: &Mapping, node: &str) -> CubeResult<Box<RecipeNode>> {
    let source = mapping
        .get("source")
        .ok_or_else(|| CubeError::recipe(format!("{} recipe requires a 'source'", node)))?;
    Ok(Box::new(RecipeNode::from_value(source)?))
}

fn reject_unknown_keys(mapping: &Mapping, allowed: &[&str], node: &str) -> CubeResult<()> {
    for key in mapping.keys() {
        let key = key_str(key)?;
        if !allowed.contains(&key) {
            return Err(CubeError::recipe(format!(
                "unexpected key '{}' in {} recipe",
                key, node
            )));
        }
    }
    Ok(())
}

fn children(mapping: &Mapping, key: &str) -> CubeResult<Vec<RecipeNode>> {
    let items = mapping
        .get(key)
        .and_then(Value::as_sequence)
        .ok_or_else(|| CubeError::recipe(format!("'{}' must be a list of recipes", key)))?;
    if items.is_empty() {
        return Err(CubeError::recipe(format!("'{}' needs at least one source", key)));
    }
    items.iter().map(RecipeNode::from_value).collect()
}

fn parse_product(value: &Value) -> CubeResult<RecipeNode> {
    let spec: ProductSpec = serde_yaml::from_value(value.clone())
        .map_err(|e| CubeError::recipe(format!("invalid product recipe: {}", e)))?;
    if let Some(measurements) = &spec.measurements {
        if measurements.is_empty() {
            return Err(CubeError::EmptyMeasurementSet(spec.product.clone()));
        }
    }
    Ok(RecipeNode::Product(spec))
}

fn parse_transform(mapping: &Mapping) -> CubeResult<RecipeNode> {
    let transform = required_str(mapping, "transform", "transform")?.to_string();
    let source = match mapping.get("source") {
        Some(source) => Some(Box::new(RecipeNode::from_value(source)?)),
        None => None,
    };

    let mut args = Mapping::new();
    for (key, value) in mapping {
        if !matches!(key_str(key)?, "transform" | "source") {
            args.insert(key.clone(), value.clone());
        }
    }

    Ok(RecipeNode::Transform {
        transform,
        source,
        args,
    })
}

fn parse_collate(mapping: &Mapping) -> CubeResult<RecipeNode> {
    reject_unknown_keys(mapping, &["collate", "index_measurement_name"], "collate")?;
    let index_measurement_name = match mapping.get("index_measurement_name") {
        Some(_) => Some(required_str(mapping, "index_measurement_name", "collate")?.to_string()),
        None => None,
    };
    Ok(RecipeNode::Collate {
        children: children(mapping, "collate")?,
        index_measurement_name,
    })
}

fn parse_juxtapose(mapping: &Mapping) -> CubeResult<RecipeNode> {
    reject_unknown_keys(mapping, &["juxtapose"], "juxtapose")?;
    Ok(RecipeNode::Juxtapose {
        children: children(mapping, "juxtapose")?,
    })
}

fn parse_aggregate(mapping: &Mapping) -> CubeResult<RecipeNode> {
    let aggregation = required_str(mapping, "aggregate", "aggregate")?.to_string();
    let group_by = required_str(mapping, "group_by", "aggregate")?.to_string();
    let source = required_source(mapping, "aggregate")?;

    let mut args = Mapping::new();
    for (key, value) in mapping {
        if !matches!(key_str(key)?, "aggregate" | "group_by" | "source") {
            args.insert(key.clone(), value.clone());
        }
    }

    Ok(RecipeNode::Aggregate {
        aggregation,
        group_by,
        source,
        args,
    })
}

fn parse_reproject(mapping: &Mapping) -> CubeResult<RecipeNode> {
    reject_unknown_keys(mapping, &["reproject", "source"], "reproject")?;
    let spec = mapping
        .get("reproject")
        .cloned()
        .unwrap_or(Value::Null);
    let spec: ReprojectSpec = serde_yaml::from_value(spec)
        .map_err(|e| CubeError::recipe(format!("invalid reproject settings: {}", e)))?;
    Ok(RecipeNode::Reproject {
        spec,
        source: required_source(mapping, "reproject")?,
    })
}
