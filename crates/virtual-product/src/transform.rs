//! The `Transform` combinator and the `Transformation` trait it wraps.

use std::fmt;
use std::sync::Arc;

use serde_yaml::Mapping;
use tracing::debug;

use cube_common::{
    CubeError, CubeResult, DatasetCatalog, Measurements, ProductDefinitions, Query, RasterData,
    StorageDriver,
};

use crate::node::RecipeNode;
use crate::pile::DatasetPile;
use crate::product::{sealed, BoxedProduct, VirtualProduct};
use crate::recipe::{RasterRecipe, RecipeLayout};

/// Per-band computation applied on top of a child product.
///
/// All three hooks default to the identity, so an implementation only
/// overrides what it changes.
pub trait Transformation: Send + Sync + fmt::Debug {
    /// Output schema given the child's schema.
    fn measurements(&self, input: &Measurements) -> CubeResult<Measurements> {
        Ok(input.clone())
    }

    /// Output data given the child's fetched data.
    fn compute(&self, data: RasterData) -> CubeResult<RasterData> {
        Ok(data)
    }

    /// Recipe handed back to the child at fetch time, given the child's
    /// recipe.
    fn raster(&self, recipe: RasterRecipe) -> CubeResult<RasterRecipe> {
        Ok(recipe)
    }

    /// Name the transformation is registered under, used by `reconstruct`.
    fn name(&self) -> &str;

    /// Arguments that rebuild this transformation from the registry.
    fn settings(&self) -> Mapping {
        Mapping::new()
    }
}

type MeasurementsFn = Arc<dyn Fn(&Measurements) -> anyhow::Result<Measurements> + Send + Sync>;
type ComputeFn = Arc<dyn Fn(RasterData) -> anyhow::Result<RasterData> + Send + Sync>;

/// A transformation built from closures.
///
/// Closure failures surface as [`CubeError::Evaluation`]. Such a
/// transformation has no registry name and reconstructs as `<anonymous>`.
#[derive(Clone, Default)]
pub struct FnTransformation {
    measurements: Option<MeasurementsFn>,
    compute: Option<ComputeFn>,
}

impl FnTransformation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_measurements<F>(mut self, f: F) -> Self
    where
        F: Fn(&Measurements) -> anyhow::Result<Measurements> + Send + Sync + 'static,
    {
        self.measurements = Some(Arc::new(f));
        self
    }

    pub fn with_compute<F>(mut self, f: F) -> Self
    where
        F: Fn(RasterData) -> anyhow::Result<RasterData> + Send + Sync + 'static,
    {
        self.compute = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for FnTransformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTransformation")
            .field("measurements", &self.measurements.is_some())
            .field("compute", &self.compute.is_some())
            .finish()
    }
}

fn closure_error(error: anyhow::Error) -> CubeError {
    CubeError::evaluation(format!("{:#}", error))
}

impl Transformation for FnTransformation {
    fn measurements(&self, input: &Measurements) -> CubeResult<Measurements> {
        match &self.measurements {
            Some(f) => f(input).map_err(closure_error),
            None => Ok(input.clone()),
        }
    }

    fn compute(&self, data: RasterData) -> CubeResult<RasterData> {
        match &self.compute {
            Some(f) => f(data).map_err(closure_error),
            None => Ok(data),
        }
    }

    fn name(&self) -> &str {
        "<anonymous>"
    }
}

#[derive(Debug)]
pub struct Transform {
    source: BoxedProduct,
    transformation: Box<dyn Transformation>,
}

impl Transform {
    pub fn new(source: BoxedProduct, transformation: Box<dyn Transformation>) -> Self {
        Self {
            source,
            transformation,
        }
    }

    pub fn source(&self) -> &dyn VirtualProduct {
        self.source.as_ref()
    }

    pub fn transformation(&self) -> &dyn Transformation {
        self.transformation.as_ref()
    }
}

impl sealed::Sealed for Transform {}

impl VirtualProduct for Transform {
    fn output_measurements(&self, definitions: &ProductDefinitions) -> CubeResult<Measurements> {
        let input = self.source.output_measurements(definitions)?;
        self.transformation.measurements(&input)
    }

    fn find_datasets(&self, catalog: &dyn DatasetCatalog, query: &Query) -> CubeResult<DatasetPile> {
        let source = self.source.find_datasets(catalog, query)?;
        let measurements = self.transformation.measurements(&source.measurements)?;
        Ok(DatasetPile::transform(source, measurements))
    }

    fn build_raster(&self, pile: &DatasetPile, query: &Query) -> CubeResult<RasterRecipe> {
        let source = self.source.build_raster(pile.transform_source()?, query)?;
        // Schema errors surface here rather than after the reads.
        let measurements = self.transformation.measurements(source.measurements())?;
        let source = self.transformation.raster(source)?;

        let (layout, times, slots) = source.into_parts();
        let layout = RecipeLayout::with_branches(layout.geobox.clone(), measurements, vec![layout]);
        RasterRecipe::new(layout, times, slots)
    }

    fn fetch_data(&self, recipe: &RasterRecipe, storage: &dyn StorageDriver) -> CubeResult<RasterData> {
        let source = recipe.branch(0, recipe.times().to_vec(), recipe.slots().to_vec())?;
        let input = self.source.fetch_data(&source, storage)?;
        debug!(
            transform = self.transformation.name(),
            time_steps = input.len(),
            "Applying transformation"
        );
        self.transformation.compute(input)
    }

    fn reconstruct(&self) -> RecipeNode {
        RecipeNode::Transform {
            transform: self.transformation.name().to_string(),
            source: Some(Box::new(self.source.reconstruct())),
            args: self.transformation.settings(),
        }
    }
}
