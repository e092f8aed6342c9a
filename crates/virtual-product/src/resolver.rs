//! Turning recipe documents into product trees.

use serde_yaml::Value;
use tracing::debug;

use cube_common::{CubeError, CubeResult, TimeGrouping};

use crate::aggregate::Aggregate;
use crate::basic::Basic;
use crate::collate::Collate;
use crate::config::LoadConfig;
use crate::juxtapose::Juxtapose;
use crate::node::{ProductSpec, RecipeNode};
use crate::product::{BoxedProduct, VirtualProduct};
use crate::registry::Registry;
use crate::reproject::Reproject;
use crate::transform::Transform;

/// Builds products from recipes using an explicit [`Registry`].
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    registry: Registry,
    config: LoadConfig,
}

impl Resolver {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            config: LoadConfig::default(),
        }
    }

    /// Defaults for product settings a recipe leaves out.
    pub fn with_config(mut self, config: LoadConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &LoadConfig {
        &self.config
    }

    pub fn resolve(&self, node: &RecipeNode) -> CubeResult<BoxedProduct> {
        if node.open_sources() > 0 {
            return Err(CubeError::recipe(
                "recipe has a transform without a source; apply it to a product instead",
            ));
        }
        let product = self.build(node, &mut None)?;
        debug!(recipe = %describe(node), "Resolved recipe");
        Ok(product)
    }

    pub fn resolve_value(&self, value: &Value) -> CubeResult<BoxedProduct> {
        self.resolve(&RecipeNode::from_value(value)?)
    }

    pub fn resolve_yaml(&self, text: &str) -> CubeResult<BoxedProduct> {
        self.resolve(&RecipeNode::from_yaml_str(text)?)
    }

    /// Resolve a transform template, plugging `input` into its one open
    /// source.
    pub(crate) fn resolve_template(&self, node: &RecipeNode, input: BoxedProduct) -> CubeResult<BoxedProduct> {
        match node.open_sources() {
            1 => {}
            n => {
                return Err(CubeError::recipe(format!(
                    "a transform template needs exactly one open source, found {}",
                    n
                )))
            }
        }
        let mut input = Some(input);
        self.build(node, &mut input)
    }

    fn build(&self, node: &RecipeNode, input: &mut Option<BoxedProduct>) -> CubeResult<BoxedProduct> {
        match node {
            RecipeNode::Product(spec) => Ok(Box::new(self.build_basic(spec)?)),
            RecipeNode::Transform {
                transform,
                source,
                args,
            } => {
                let factory = self.registry.transform(transform)?;
                let transformation = factory(args)?;
                let source = match source {
                    Some(source) => self.build(source, input)?,
                    None => input.take().ok_or_else(|| {
                        CubeError::recipe(format!("transform '{}' requires a source", transform))
                    })?,
                };
                Ok(Box::new(Transform::new(source, transformation)))
            }
            RecipeNode::Collate {
                children,
                index_measurement_name,
            } => {
                let children = self.build_all(children, input)?;
                let mut collate = Collate::new(children)?;
                if let Some(name) = index_measurement_name {
                    collate = collate.with_index_measurement(name.clone());
                }
                Ok(Box::new(collate))
            }
            RecipeNode::Juxtapose { children } => {
                Ok(Box::new(Juxtapose::new(self.build_all(children, input)?)?))
            }
            RecipeNode::Aggregate {
                aggregation,
                group_by,
                source,
                args,
            } => {
                let aggregation = self.registry.aggregation(aggregation)?;
                let group_by = self.registry.group_by(group_by)?;
                let source = self.build(source, input)?;
                Ok(Box::new(
                    Aggregate::new(source, aggregation, group_by).with_args(args.clone()),
                ))
            }
            RecipeNode::Reproject { spec, source } => {
                let mut reproject = Reproject::new(
                    self.build(source, input)?,
                    spec.output_crs.clone(),
                    spec.resolution,
                );
                if let Some(resampling) = &spec.resampling {
                    reproject = reproject.with_resampling(resampling.clone());
                }
                Ok(Box::new(reproject))
            }
        }
    }

    fn build_all(&self, children: &[RecipeNode], input: &mut Option<BoxedProduct>) -> CubeResult<Vec<BoxedProduct>> {
        children.iter().map(|child| self.build(child, input)).collect()
    }

    fn build_basic(&self, spec: &ProductSpec) -> CubeResult<Basic> {
        let mut basic = Basic::new(spec.product.clone()).with_defaults(
            self.config.default_group_by,
            self.config.default_resampling.clone(),
        );
        if let Some(measurements) = &spec.measurements {
            basic = basic.with_measurements(measurements.iter().cloned())?;
        }
        if let Some(name) = &spec.dataset_predicate {
            basic = basic.with_predicate(self.registry.predicate(name)?);
        }
        if let Some(name) = &spec.fuse_func {
            basic = basic.with_fuser(self.registry.fuser(name)?);
        }
        if let Some(resampling) = &spec.resampling {
            basic = basic.with_resampling(resampling.clone());
        }
        if let Some(group_by) = &spec.group_by {
            let group_by: TimeGrouping = group_by
                .parse()
                .map_err(|e| CubeError::recipe(format!("product '{}': {}", spec.product, e)))?;
            basic = basic.with_group_by(group_by);
        }
        Ok(basic)
    }
}

fn describe(node: &RecipeNode) -> &'static str {
    match node {
        RecipeNode::Product(_) => "product",
        RecipeNode::Transform { .. } => "transform",
        RecipeNode::Collate { .. } => "collate",
        RecipeNode::Juxtapose { .. } => "juxtapose",
        RecipeNode::Aggregate { .. } => "aggregate",
        RecipeNode::Reproject { .. } => "reproject",
    }
}

/// Recipe document describing `product`.
pub fn reconstruct(product: &dyn VirtualProduct) -> Value {
    product.reconstruct().to_value()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_names_are_recipe_errors() {
        let resolver = Resolver::default();
        for recipe in [
            "transform: sharpen\nsource: {product: ls8}",
            "product: ls8\ndataset_predicate: low_cloud",
            "product: ls8\nfuse_func: median",
            "product: ls8\ngroup_by: fortnight",
            "aggregate: median\ngroup_by: month\nsource: {product: ls8}",
            "aggregate: mean\ngroup_by: decade\nsource: {product: ls8}",
        ] {
            match resolver.resolve_yaml(recipe) {
                Err(CubeError::Recipe(_)) => {}
                other => panic!("expected a recipe error for {:?}, got {:?}", recipe, other),
            }
        }
    }

    #[test]
    fn test_open_source_rejected_outside_catalog() {
        let resolver = Resolver::default();
        assert!(matches!(
            resolver.resolve_yaml("transform: to_float"),
            Err(CubeError::Recipe(_))
        ));
    }

    #[test]
    fn test_template_plugs_input() {
        let resolver = Resolver::default();
        let template = RecipeNode::from_yaml_str("transform: to_float\ndtype: float64").unwrap();
        let product = resolver
            .resolve_template(&template, Box::new(Basic::new("ls8")))
            .unwrap();

        match product.reconstruct() {
            RecipeNode::Transform { source: Some(source), .. } => {
                assert!(matches!(*source, RecipeNode::Product(ref spec) if spec.product == "ls8"));
            }
            other => panic!("unexpected node {:?}", other),
        }

        let complete = RecipeNode::from_yaml_str("transform: to_float\nsource: {product: ls8}").unwrap();
        assert!(resolver.resolve_template(&complete, Box::new(Basic::new("ls8"))).is_err());
    }

    #[test]
    fn test_config_defaults_reach_products() {
        let config = LoadConfig {
            default_group_by: TimeGrouping::SolarDay,
            ..LoadConfig::default()
        };
        let resolver = Resolver::default().with_config(config);
        let basic = resolver
            .build_basic(&ProductSpec {
                product: "ls8".into(),
                ..ProductSpec::default()
            })
            .unwrap();
        assert_eq!(basic.group_by(), TimeGrouping::SolarDay);
    }

    #[test]
    fn test_registry_extensions_are_used() {
        let registry = Registry::builtin().with_predicate("always", |_: &cube_common::DatasetRecord| true);
        let resolver = Resolver::new(registry);
        assert!(resolver
            .resolve_yaml("product: ls8\ndataset_predicate: always")
            .is_ok());
    }
}
