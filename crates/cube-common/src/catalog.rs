//! Dataset catalog interface.
//!
//! The catalog owns product definitions and the spatial/temporal index.
//! Virtual products only talk to it through [`DatasetCatalog`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::dataset::DatasetRecord;
use crate::error::CubeResult;
use crate::geobox::GeoBox;
use crate::measurement::Measurements;
use crate::query::Query;

/// Filter applied to individual dataset records.
pub type DatasetPredicate = dyn Fn(&DatasetRecord) -> bool + Send + Sync;

/// Declared metadata of a stored product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDefinition {
    pub name: String,
    pub measurements: Measurements,
    /// Native grid, when the product has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid: Option<GeoBox>,
}

impl ProductDefinition {
    pub fn new(name: impl Into<String>, measurements: Measurements) -> Self {
        Self {
            name: name.into(),
            measurements,
            grid: None,
        }
    }

    pub fn with_grid(mut self, grid: GeoBox) -> Self {
        self.grid = Some(grid);
        self
    }
}

/// Product definitions keyed by product name.
pub type ProductDefinitions = BTreeMap<String, ProductDefinition>;

/// Parameters of a single product search.
pub struct SearchRequest<'a> {
    pub product: &'a str,
    pub query: &'a Query,
    /// Measurement subset the caller will read, if restricted.
    pub measurements: Option<&'a [String]>,
    pub predicate: Option<&'a DatasetPredicate>,
}

impl std::fmt::Debug for SearchRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchRequest")
            .field("product", &self.product)
            .field("query", &self.query)
            .field("measurements", &self.measurements)
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

/// Outcome of a product search.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub datasets: Vec<DatasetRecord>,
    /// Output grid implied by the query and the product.
    pub geobox: GeoBox,
    /// Declared measurements of the product.
    pub measurements: Measurements,
}

/// Search interface implemented by catalog collaborators.
pub trait DatasetCatalog: Send + Sync {
    /// Declared metadata of every known product. Must not perform a
    /// dataset search.
    fn product_definitions(&self) -> CubeResult<ProductDefinitions>;

    /// Find datasets of one product matching the request.
    fn search(&self, request: &SearchRequest<'_>) -> CubeResult<SearchResult>;
}
