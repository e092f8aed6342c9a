//! Named recipe catalog.
//!
//! A catalog document has two sections:
//!
//! ```yaml
//! products:
//!   ls8_nbart:
//!     recipe:
//!       product: ls8_ard
//!       measurements: [red, nir]
//! transforms:
//!   ndvi:
//!     description: NDVI of any red/nir product
//!     recipe:
//!       transform: expressions
//!       output:
//!         ndvi: {formula: (nir - red) / (nir + red), dtype: float32}
//! ```
//!
//! Products are complete recipes. Transforms are templates whose innermost
//! `transform` has no `source`; [`UnappliedTransform::apply`] fills it in.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use serde_yaml::Value;
use tracing::info;

use cube_common::{CubeError, CubeResult};

use crate::basic::Basic;
use crate::node::RecipeNode;
use crate::product::BoxedProduct;
use crate::resolver::Resolver;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogDocument {
    #[serde(default)]
    products: BTreeMap<String, EntryDocument>,
    #[serde(default)]
    transforms: BTreeMap<String, EntryDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EntryDocument {
    recipe: Value,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Clone)]
struct Entry {
    recipe: RecipeNode,
    description: Option<String>,
    template: bool,
}

/// Read-only set of named recipes.
#[derive(Debug, Clone)]
pub struct Catalog {
    resolver: Resolver,
    entries: BTreeMap<String, Entry>,
}

/// What a catalog name refers to.
#[derive(Debug)]
pub enum CatalogItem<'a> {
    Product(BoxedProduct),
    Transform(UnappliedTransform<'a>),
}

/// A catalog transform waiting for its input product.
#[derive(Debug, Clone, Copy)]
pub struct UnappliedTransform<'a> {
    name: &'a str,
    recipe: &'a RecipeNode,
    resolver: &'a Resolver,
}

impl UnappliedTransform<'_> {
    pub fn name(&self) -> &str {
        self.name
    }

    pub fn recipe(&self) -> &RecipeNode {
        self.recipe
    }

    /// Complete the template with `input` as its source.
    pub fn apply(&self, input: BoxedProduct) -> CubeResult<BoxedProduct> {
        self.resolver.resolve_template(self.recipe, input)
    }
}

impl Catalog {
    pub fn from_yaml_str(text: &str, resolver: Resolver) -> CubeResult<Self> {
        let value: Value = serde_yaml::from_str(text)?;
        Self::from_value(&value, resolver)
    }

    pub fn from_path(path: impl AsRef<Path>, resolver: Resolver) -> CubeResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| CubeError::Document(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_yaml_str(&text, resolver)
    }

    pub fn from_value(value: &Value, resolver: Resolver) -> CubeResult<Self> {
        let document: CatalogDocument = serde_yaml::from_value(value.clone())
            .map_err(|e| CubeError::recipe(format!("invalid catalog document: {}", e)))?;

        let mut entries = BTreeMap::new();
        for (name, entry) in &document.products {
            let recipe = RecipeNode::from_value(&entry.recipe)
                .map_err(|e| in_entry(name, e))?;
            // Resolve once so that broken entries fail at load.
            resolver.resolve(&recipe).map_err(|e| in_entry(name, e))?;
            entries.insert(
                name.clone(),
                Entry {
                    recipe,
                    description: entry.description.clone(),
                    template: false,
                },
            );
        }

        for (name, entry) in &document.transforms {
            if entries.contains_key(name) {
                return Err(CubeError::recipe(format!(
                    "catalog name '{}' appears in both products and transforms",
                    name
                )));
            }
            let recipe = RecipeNode::from_value(&entry.recipe)
                .map_err(|e| in_entry(name, e))?;
            if recipe.open_sources() != 1 {
                return Err(CubeError::recipe(format!(
                    "catalog transform '{}' must leave exactly one transform without a source",
                    name
                )));
            }
            resolver
                .resolve_template(&recipe, Box::new(Basic::new("input")))
                .map_err(|e| in_entry(name, e))?;
            entries.insert(
                name.clone(),
                Entry {
                    recipe,
                    description: entry.description.clone(),
                    template: true,
                },
            );
        }

        info!(
            products = document.products.len(),
            transforms = document.transforms.len(),
            "Loaded recipe catalog"
        );

        Ok(Self { resolver, entries })
    }

    pub fn get(&self, name: &str) -> CubeResult<CatalogItem<'_>> {
        let (name, entry) = self
            .entries
            .get_key_value(name)
            .ok_or_else(|| CubeError::recipe(format!("no catalog entry named '{}'", name)))?;

        if entry.template {
            Ok(CatalogItem::Transform(UnappliedTransform {
                name,
                recipe: &entry.recipe,
                resolver: &self.resolver,
            }))
        } else {
            Ok(CatalogItem::Product(self.resolver.resolve(&entry.recipe)?))
        }
    }

    /// Resolve a named product.
    pub fn product(&self, name: &str) -> CubeResult<BoxedProduct> {
        match self.get(name)? {
            CatalogItem::Product(product) => Ok(product),
            CatalogItem::Transform(_) => Err(CubeError::recipe(format!(
                "catalog entry '{}' is a transform; apply it to a product",
                name
            ))),
        }
    }

    pub fn transform(&self, name: &str) -> CubeResult<UnappliedTransform<'_>> {
        match self.get(name)? {
            CatalogItem::Transform(transform) => Ok(transform),
            CatalogItem::Product(_) => Err(CubeError::recipe(format!(
                "catalog entry '{}' is a product, not a transform",
                name
            ))),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn description(&self, name: &str) -> Option<&str> {
        self.entries.get(name)?.description.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }
}

fn in_entry(name: &str, error: CubeError) -> CubeError {
    match error {
        CubeError::Recipe(message) => CubeError::Recipe(format!("catalog entry '{}': {}", name, message)),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = r#"
products:
  ls8_visible:
    description: Landsat 8 visible bands
    recipe:
      product: ls8_ard
      measurements: [red, green, blue]
transforms:
  floats:
    recipe:
      transform: to_float
      dtype: float64
"#;

    #[test]
    fn test_products_and_templates() {
        let catalog = Catalog::from_yaml_str(DOCUMENT, Resolver::default()).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.names().collect::<Vec<_>>(), vec!["floats", "ls8_visible"]);
        assert_eq!(catalog.description("ls8_visible"), Some("Landsat 8 visible bands"));

        assert!(matches!(catalog.get("ls8_visible"), Ok(CatalogItem::Product(_))));
        let template = catalog.transform("floats").unwrap();
        assert_eq!(template.name(), "floats");

        let applied = template.apply(catalog.product("ls8_visible").unwrap()).unwrap();
        match applied.reconstruct() {
            RecipeNode::Transform { source: Some(source), .. } => {
                assert!(matches!(*source, RecipeNode::Product(ref spec) if spec.product == "ls8_ard"));
            }
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn test_wrong_kind_lookups() {
        let catalog = Catalog::from_yaml_str(DOCUMENT, Resolver::default()).unwrap();
        assert!(matches!(catalog.product("floats"), Err(CubeError::Recipe(_))));
        assert!(matches!(catalog.transform("ls8_visible"), Err(CubeError::Recipe(_))));
        assert!(matches!(catalog.get("sentinel"), Err(CubeError::Recipe(_))));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let document = r#"
products:
  clear:
    recipe: {product: ls8_ard}
transforms:
  clear:
    recipe: {transform: to_float}
"#;
        let result = Catalog::from_yaml_str(document, Resolver::default());
        assert!(matches!(result, Err(CubeError::Recipe(message)) if message.contains("clear")));
    }

    #[test]
    fn test_entry_shape_checked_at_load() {
        let complete_template = r#"
transforms:
  floats:
    recipe:
      transform: to_float
      source: {product: ls8_ard}
"#;
        assert!(Catalog::from_yaml_str(complete_template, Resolver::default()).is_err());

        let open_product = r#"
products:
  floats:
    recipe: {transform: to_float}
"#;
        assert!(Catalog::from_yaml_str(open_product, Resolver::default()).is_err());

        let unknown_section = "layers: {}\n";
        assert!(Catalog::from_yaml_str(unknown_section, Resolver::default()).is_err());
    }
}
