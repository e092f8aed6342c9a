//! `Aggregate`: a statistic over groups of time steps.
//!
//! The recipe form resolves and reconstructs, and the schema passes through,
//! but no data can be built yet.

use serde_yaml::Mapping;

use cube_common::{
    CubeError, CubeResult, DatasetCatalog, Measurements, ProductDefinitions, Query, RasterData,
    StorageDriver,
};

use crate::node::RecipeNode;
use crate::pile::DatasetPile;
use crate::product::{sealed, BoxedProduct, VirtualProduct};
use crate::recipe::RasterRecipe;
use crate::registry::{AggregationFn, GroupByFn, Named};

#[derive(Debug)]
pub struct Aggregate {
    source: BoxedProduct,
    aggregation: Named<AggregationFn>,
    group_by: Named<GroupByFn>,
    args: Mapping,
}

impl Aggregate {
    pub fn new(source: BoxedProduct, aggregation: Named<AggregationFn>, group_by: Named<GroupByFn>) -> Self {
        Self {
            source,
            aggregation,
            group_by,
            args: Mapping::new(),
        }
    }

    pub fn with_args(mut self, args: Mapping) -> Self {
        self.args = args;
        self
    }

    fn unimplemented(&self) -> CubeError {
        CubeError::Unimplemented(format!(
            "aggregate '{}' grouped by '{}'",
            self.aggregation.name, self.group_by.name
        ))
    }
}

impl sealed::Sealed for Aggregate {}

impl VirtualProduct for Aggregate {
    fn output_measurements(&self, definitions: &ProductDefinitions) -> CubeResult<Measurements> {
        self.source.output_measurements(definitions)
    }

    fn find_datasets(&self, catalog: &dyn DatasetCatalog, query: &Query) -> CubeResult<DatasetPile> {
        self.source.find_datasets(catalog, query)
    }

    fn build_raster(&self, _pile: &DatasetPile, _query: &Query) -> CubeResult<RasterRecipe> {
        Err(self.unimplemented())
    }

    fn fetch_data(&self, _recipe: &RasterRecipe, _storage: &dyn StorageDriver) -> CubeResult<RasterData> {
        Err(self.unimplemented())
    }

    fn reconstruct(&self) -> RecipeNode {
        RecipeNode::Aggregate {
            aggregation: self.aggregation.name.clone(),
            group_by: self.group_by.name.clone(),
            source: Box::new(self.source.reconstruct()),
            args: self.args.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::Basic;
    use crate::registry::Registry;
    use cube_common::{BoundingBox, GeoBox};

    #[test]
    fn test_data_phases_are_unimplemented() {
        let registry = Registry::builtin();
        let aggregate = Aggregate::new(
            Box::new(Basic::new("ls8")),
            registry.aggregation("mean").unwrap(),
            registry.group_by("month").unwrap(),
        );
        let pile = DatasetPile::basic(
            vec![],
            GeoBox::new("EPSG:4326", 1, 1, BoundingBox::new(0.0, 0.0, 1.0, 1.0)),
            Measurements::new(),
        );

        match aggregate.build_raster(&pile, &Query::new()) {
            Err(error) => assert_eq!(error.kind(), "Unimplemented"),
            Ok(_) => panic!("aggregate built a recipe"),
        }
    }
}
