//! One-call loading: search, group, then fetch slice by slice.

use std::time::Instant;

use tracing::{debug, info};

use cube_common::{CubeError, CubeResult, DatasetCatalog, Query, RasterData, StorageDriver};

use crate::config::LoadConfig;
use crate::product::VirtualProduct;

/// Run all three phases of `product` for `query`.
///
/// The recipe is fetched `config.slice_size` time steps at a time and the
/// parts are concatenated in ascending time order.
pub fn load(
    product: &dyn VirtualProduct,
    catalog: &dyn DatasetCatalog,
    storage: &dyn StorageDriver,
    query: &Query,
    config: &LoadConfig,
) -> CubeResult<RasterData> {
    config
        .validate()
        .map_err(|e| CubeError::recipe(format!("invalid load configuration: {}", e)))?;

    let start = Instant::now();
    let pile = product.find_datasets(catalog, query)?;
    debug!(datasets = pile.dataset_count(), "Found datasets");

    let recipe = product.build_raster(&pile, query)?;
    debug!(
        times = recipe.len(),
        width = recipe.geobox().width,
        height = recipe.geobox().height,
        "Built raster recipe"
    );

    if recipe.is_empty() {
        return product.fetch_data(&recipe, storage);
    }

    let parts = recipe
        .time_slices(config.slice_size)
        .map(|slice| product.fetch_data(&slice, storage))
        .collect::<CubeResult<Vec<_>>>()?;
    let slices = parts.len();
    let data = RasterData::concat_time(parts)?;

    info!(
        times = data.len(),
        bands = data.bands().len(),
        slices,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Loaded virtual product"
    );
    Ok(data)
}
