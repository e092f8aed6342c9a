//! `Reproject`: load a product onto a different output grid.
//!
//! The resampling itself belongs to the catalog and storage collaborators;
//! this node only hands the target grid settings down in the query.

use cube_common::{
    CubeResult, DatasetCatalog, Measurements, ProductDefinitions, Query, RasterData, StorageDriver,
};

use crate::node::{RecipeNode, ReprojectSpec};
use crate::pile::DatasetPile;
use crate::product::{sealed, BoxedProduct, VirtualProduct};
use crate::recipe::RasterRecipe;

#[derive(Debug)]
pub struct Reproject {
    source: BoxedProduct,
    output_crs: String,
    resolution: (f64, f64),
    resampling: Option<String>,
}

impl Reproject {
    /// Reproject `source` onto `output_crs` with pixel size `(y, x)`.
    pub fn new(source: BoxedProduct, output_crs: impl Into<String>, resolution: (f64, f64)) -> Self {
        Self {
            source,
            output_crs: output_crs.into(),
            resolution,
            resampling: None,
        }
    }

    pub fn with_resampling(mut self, resampling: impl Into<String>) -> Self {
        self.resampling = Some(resampling.into());
        self
    }

    fn target_query(&self, query: &Query) -> Query {
        let mut target = query
            .clone()
            .with_output_crs(self.output_crs.clone())
            .with_resolution(self.resolution.0, self.resolution.1);
        if let Some(resampling) = &self.resampling {
            target = target.with_resampling(resampling.clone());
        }
        target
    }
}

impl sealed::Sealed for Reproject {}

impl VirtualProduct for Reproject {
    fn output_measurements(&self, definitions: &ProductDefinitions) -> CubeResult<Measurements> {
        self.source.output_measurements(definitions)
    }

    fn find_datasets(&self, catalog: &dyn DatasetCatalog, query: &Query) -> CubeResult<DatasetPile> {
        self.source.find_datasets(catalog, &self.target_query(query))
    }

    fn build_raster(&self, pile: &DatasetPile, query: &Query) -> CubeResult<RasterRecipe> {
        self.source.build_raster(pile, &self.target_query(query))
    }

    fn fetch_data(&self, recipe: &RasterRecipe, storage: &dyn StorageDriver) -> CubeResult<RasterData> {
        self.source.fetch_data(recipe, storage)
    }

    fn reconstruct(&self) -> RecipeNode {
        RecipeNode::Reproject {
            spec: ReprojectSpec {
                output_crs: self.output_crs.clone(),
                resolution: self.resolution,
                resampling: self.resampling.clone(),
            },
            source: Box::new(self.source.reconstruct()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::Basic;

    #[test]
    fn test_target_query_overrides_grid() {
        let reproject = Reproject::new(Box::new(Basic::new("ls8")), "EPSG:3577", (-30.0, 30.0))
            .with_resampling("bilinear");
        let query = Query::new().with_output_crs("EPSG:4326");
        let target = reproject.target_query(&query);

        assert_eq!(target.output_crs.as_deref(), Some("EPSG:3577"));
        assert_eq!(target.resolution, Some((-30.0, 30.0)));
        assert_eq!(target.resampling.as_deref(), Some("bilinear"));
    }

    #[test]
    fn test_query_resampling_kept_without_override() {
        let reproject = Reproject::new(Box::new(Basic::new("ls8")), "EPSG:3577", (-30.0, 30.0));
        let target = reproject.target_query(&Query::new().with_resampling("cubic"));
        assert_eq!(target.resampling.as_deref(), Some("cubic"));
    }
}
