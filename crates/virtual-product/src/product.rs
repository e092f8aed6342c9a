//! The virtual product contract.

use std::fmt;

use cube_common::{
    CubeResult, DatasetCatalog, Measurements, ProductDefinitions, Query, RasterData, StorageDriver,
};

use crate::node::RecipeNode;
use crate::pile::DatasetPile;
use crate::recipe::RasterRecipe;

pub(crate) mod sealed {
    pub trait Sealed {}
}

/// A node of a virtual product tree.
///
/// Loading runs three phases:
///
/// 1. [`find_datasets`](Self::find_datasets) searches the catalog,
/// 2. [`build_raster`](Self::build_raster) groups the datasets into time
///    slots without touching pixels,
/// 3. [`fetch_data`](Self::fetch_data) reads and combines arrays for a
///    (possibly sliced) recipe.
///
/// The set of implementations is closed; trees are built from the
/// combinators of this crate, usually through the recipe resolver.
pub trait VirtualProduct: sealed::Sealed + Send + Sync + fmt::Debug {
    /// Output schema. Depends only on product definitions, never on a
    /// search or on storage.
    fn output_measurements(&self, definitions: &ProductDefinitions) -> CubeResult<Measurements>;

    fn find_datasets(&self, catalog: &dyn DatasetCatalog, query: &Query) -> CubeResult<DatasetPile>;

    fn build_raster(&self, pile: &DatasetPile, query: &Query) -> CubeResult<RasterRecipe>;

    fn fetch_data(&self, recipe: &RasterRecipe, storage: &dyn StorageDriver) -> CubeResult<RasterData>;

    /// Recipe that resolves back to an equivalent product.
    fn reconstruct(&self) -> RecipeNode;
}

pub type BoxedProduct = Box<dyn VirtualProduct>;
