//! Virtual products over a data cube.
//!
//! A virtual product is a tree of combinators that describes how stored
//! products are searched, grouped in time, read and combined:
//!
//! - [`Basic`]: one stored product, optionally a measurement subset
//! - [`Transform`]: a per-time-slot [`Transformation`] of one child
//! - [`Collate`]: children with one schema, concatenated along time
//! - [`Juxtapose`]: children with disjoint schemas, merged at shared times
//! - [`Reproject`] and [`Aggregate`]: target grid and temporal reductions
//!
//! # Architecture
//!
//! ```text
//! recipe (YAML) ──► RecipeNode ──► Resolver + Registry ──► BoxedProduct
//!                                                               │
//!      ┌────────────────────────────────────────────────────────┘
//!      │
//!      ├─► find_datasets(catalog, query)   ─► DatasetPile
//!      │
//!      ├─► build_raster(pile, query)       ─► RasterRecipe (no pixels)
//!      │         │
//!      │         └─► time_slices(n)        ─► smaller RasterRecipes
//!      │
//!      └─► fetch_data(recipe, storage)     ─► RasterData
//! ```
//!
//! # Example
//!
//! ```ignore
//! use virtual_product::{load, LoadConfig, Resolver};
//!
//! let product = Resolver::default().resolve_yaml(
//!     "transform: expressions\n\
//!      output:\n  ndvi: {formula: (nir - red) / (nir + red), dtype: float32}\n\
//!      source: {product: ls8_ard, measurements: [red, nir]}",
//! )?;
//! let data = load(product.as_ref(), &catalog, &storage, &query, &LoadConfig::from_env())?;
//! ```

pub mod aggregate;
pub mod basic;
pub mod catalog;
pub mod collate;
pub mod config;
pub mod dilation;
pub mod juxtapose;
pub mod load;
pub mod node;
pub mod pile;
pub mod product;
pub mod recipe;
pub mod registry;
pub mod reproject;
pub mod resolver;
pub mod transform;
pub mod transforms;

// Re-export commonly used types at crate root
pub use aggregate::Aggregate;
pub use basic::Basic;
pub use catalog::{Catalog, CatalogItem, UnappliedTransform};
pub use collate::Collate;
pub use config::LoadConfig;
pub use juxtapose::Juxtapose;
pub use load::load;
pub use node::{ProductSpec, RecipeNode, ReprojectSpec};
pub use pile::{DatasetPile, PileKind};
pub use product::{BoxedProduct, VirtualProduct};
pub use recipe::{RasterRecipe, RecipeLayout, Slot};
pub use registry::{Named, Registry};
pub use reproject::Reproject;
pub use resolver::{reconstruct, Resolver};
pub use transform::{FnTransformation, Transform, Transformation};
