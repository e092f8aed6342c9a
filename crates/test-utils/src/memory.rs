//! In-memory catalog and storage collaborators.
//!
//! Both count their calls so tests can check which phases touched them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use cube_common::{
    ArrayData, CubeError, CubeResult, DatasetCatalog, DatasetRecord, GeoBox, Measurement,
    ProductDefinition, ProductDefinitions, SearchRequest, SearchResult, StorageDriver,
};
use uuid::Uuid;

// ============================================================================
// Catalog
// ============================================================================

/// Catalog over a fixed list of products and dataset records.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    definitions: ProductDefinitions,
    datasets: Vec<DatasetRecord>,
    searches: AtomicUsize,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_product(mut self, definition: ProductDefinition) -> Self {
        self.definitions.insert(definition.name.clone(), definition);
        self
    }

    pub fn with_products(self, definitions: impl IntoIterator<Item = ProductDefinition>) -> Self {
        definitions
            .into_iter()
            .fold(self, |catalog, definition| catalog.with_product(definition))
    }

    pub fn with_dataset(mut self, dataset: DatasetRecord) -> Self {
        self.datasets.push(dataset);
        self
    }

    /// Number of `search` calls so far.
    pub fn search_count(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

impl DatasetCatalog for MemoryCatalog {
    fn product_definitions(&self) -> CubeResult<ProductDefinitions> {
        Ok(self.definitions.clone())
    }

    fn search(&self, request: &SearchRequest<'_>) -> CubeResult<SearchResult> {
        self.searches.fetch_add(1, Ordering::SeqCst);

        let definition = self
            .definitions
            .get(request.product)
            .ok_or_else(|| CubeError::Catalog(format!("unknown product '{}'", request.product)))?;
        let geobox = definition.grid.clone().ok_or_else(|| {
            CubeError::Catalog(format!("product '{}' has no native grid", request.product))
        })?;

        let datasets = self
            .datasets
            .iter()
            .filter(|dataset| dataset.product == request.product)
            .filter(|dataset| request.query.matches(dataset))
            .filter(|dataset| request.predicate.map_or(true, |predicate| predicate(*dataset)))
            .cloned()
            .collect();

        Ok(SearchResult {
            datasets,
            geobox,
            measurements: definition.measurements.clone(),
        })
    }
}

// ============================================================================
// Storage
// ============================================================================

/// Storage holding one 2-D plane per (dataset, measurement).
///
/// Planes are looked up by the measurement's name, then by its aliases.
/// Missing planes read as no-data.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    planes: HashMap<(Uuid, String), ArrayData>,
    reads: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plane(mut self, dataset: &DatasetRecord, measurement: impl Into<String>, plane: ArrayData) -> Self {
        self.insert(dataset, measurement, plane);
        self
    }

    pub fn insert(&mut self, dataset: &DatasetRecord, measurement: impl Into<String>, plane: ArrayData) {
        self.planes.insert((dataset.id, measurement.into()), plane);
    }

    /// Number of `read` calls so far.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl StorageDriver for MemoryStorage {
    fn read(
        &self,
        dataset: &DatasetRecord,
        measurement: &Measurement,
        geobox: &GeoBox,
        _resampling: Option<&str>,
    ) -> CubeResult<ArrayData> {
        self.reads.fetch_add(1, Ordering::SeqCst);

        let stored = std::iter::once(&measurement.name)
            .chain(measurement.aliases.iter())
            .find_map(|name| self.planes.get(&(dataset.id, name.clone())));

        let (height, width) = geobox.shape();
        match stored {
            Some(plane) => Ok(plane.clone()),
            None => Ok(ArrayData::filled(
                measurement.dtype,
                &[height, width],
                measurement.nodata,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{day, product_definitions, products, tile_footprint, tile_geobox};
    use crate::generators::create_constant_plane;
    use cube_common::{DType, Query};

    #[test]
    fn test_search_filters_product_and_time() {
        let early = DatasetRecord::new(products::LS8, day(2021, 1, 1), tile_footprint());
        let late = DatasetRecord::new(products::LS8, day(2021, 6, 1), tile_footprint());
        let other = DatasetRecord::new(products::S2, day(2021, 1, 1), tile_footprint());
        let catalog = MemoryCatalog::new()
            .with_products(product_definitions())
            .with_dataset(early.clone())
            .with_dataset(late)
            .with_dataset(other);

        let query = Query::new().during(cube_common::TimeRange::new(day(2020, 12, 1), day(2021, 2, 1)));
        let result = catalog
            .search(&SearchRequest {
                product: products::LS8,
                query: &query,
                measurements: None,
                predicate: None,
            })
            .unwrap();

        assert_eq!(result.datasets, vec![early]);
        assert_eq!(result.geobox, tile_geobox());
        assert_eq!(catalog.search_count(), 1);
    }

    #[test]
    fn test_storage_alias_lookup_and_missing_planes() {
        let dataset = DatasetRecord::new(products::LS8, day(2021, 1, 1), tile_footprint());
        let storage = MemoryStorage::new().with_plane(&dataset, "nir", create_constant_plane(3, 2, 42));

        let aliased = Measurement::new("near_infrared", DType::Int16).with_aliases(["nir"]);
        let plane = storage.read(&dataset, &aliased, &tile_geobox(), None).unwrap();
        assert!(plane.to_i64().iter().all(|&v| v == 42));

        let missing = Measurement::new("red", DType::Int16).with_nodata(-999.0);
        let plane = storage.read(&dataset, &missing, &tile_geobox(), None).unwrap();
        assert!(plane.to_i64().iter().all(|&v| v == -999));
        assert_eq!(storage.read_count(), 2);
    }
}
