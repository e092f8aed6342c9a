//! `Collate`: several products with the same measurements, interleaved
//! along time.

use tracing::debug;

use cube_common::{
    ArrayData, Band, CubeError, CubeResult, DType, DatasetCatalog, Measurement, Measurements,
    ProductDefinitions, Query, RasterData, StorageDriver,
};

use crate::node::RecipeNode;
use crate::pile::DatasetPile;
use crate::product::{sealed, BoxedProduct, VirtualProduct};
use crate::recipe::{RasterRecipe, RecipeLayout, Slot};

#[derive(Debug)]
pub struct Collate {
    children: Vec<BoxedProduct>,
    index_measurement_name: Option<String>,
}

impl Collate {
    pub fn new(children: Vec<BoxedProduct>) -> CubeResult<Self> {
        if children.is_empty() {
            return Err(CubeError::recipe("collate needs at least one source"));
        }
        Ok(Self {
            children,
            index_measurement_name: None,
        })
    }

    /// Add an int8 band recording which source each time step came from.
    pub fn with_index_measurement(mut self, name: impl Into<String>) -> Self {
        self.index_measurement_name = Some(name.into());
        self
    }

    pub fn children(&self) -> &[BoxedProduct] {
        &self.children
    }

    fn index_measurement(&self) -> Option<Measurement> {
        self.index_measurement_name
            .as_ref()
            .map(|name| Measurement::new(name.clone(), DType::Int8).with_nodata(-1.0))
    }

    /// Output schema from the schemas of the sources.
    fn merge_measurements(&self, inputs: &[Measurements]) -> CubeResult<Measurements> {
        let first = inputs
            .first()
            .ok_or_else(|| CubeError::recipe("collate needs at least one source"))?;
        let expected = first.name_set();
        for other in &inputs[1..] {
            let names = other.name_set();
            if names != expected {
                return Err(CubeError::SchemaMismatch {
                    left: expected.into_iter().collect(),
                    right: names.into_iter().collect(),
                });
            }
        }

        let mut output = first.clone();
        if let Some(index) = self.index_measurement() {
            if output.contains(&index.name) {
                return Err(CubeError::NameCollision(vec![index.name]));
            }
            output.insert(index);
        }
        Ok(output)
    }

    fn conform(
        &self,
        data: RasterData,
        branch: usize,
        recipe: &RasterRecipe,
    ) -> CubeResult<RasterData> {
        let mut part = RasterData::new(data.times().to_vec(), recipe.geobox().clone());
        let shape = part.shape();
        for measurement in recipe.measurements() {
            if Some(&measurement.name) == self.index_measurement_name.as_ref() {
                let index = ArrayData::filled(DType::Int8, &shape, Some(branch as f64));
                part.insert_band(Band::new(measurement.clone(), index)?)?;
                continue;
            }
            let band = data.band(&measurement.name).ok_or_else(|| {
                CubeError::missing_input(format!(
                    "collate source {} did not produce '{}'",
                    branch, measurement.name
                ))
            })?;
            part.insert_band(band.clone().conform(measurement))?;
        }
        Ok(part)
    }
}

impl sealed::Sealed for Collate {}

impl VirtualProduct for Collate {
    fn output_measurements(&self, definitions: &ProductDefinitions) -> CubeResult<Measurements> {
        let inputs = self
            .children
            .iter()
            .map(|child| child.output_measurements(definitions))
            .collect::<CubeResult<Vec<_>>>()?;
        self.merge_measurements(&inputs)
    }

    fn find_datasets(&self, catalog: &dyn DatasetCatalog, query: &Query) -> CubeResult<DatasetPile> {
        let piles = self
            .children
            .iter()
            .map(|child| child.find_datasets(catalog, query))
            .collect::<CubeResult<Vec<_>>>()?;
        let inputs: Vec<Measurements> = piles.iter().map(|pile| pile.measurements.clone()).collect();
        let measurements = self.merge_measurements(&inputs)?;
        let geobox = piles[0].geobox.clone();
        Ok(DatasetPile::collate(piles, geobox, measurements))
    }

    fn build_raster(&self, pile: &DatasetPile, query: &Query) -> CubeResult<RasterRecipe> {
        let branches = pile.collate_branches(self.children.len())?;
        let width = self.children.len();

        let mut steps = Vec::new();
        let mut layouts = Vec::with_capacity(width);
        for (index, (child, branch)) in self.children.iter().zip(branches).enumerate() {
            let (layout, times, slots) = child.build_raster(branch, query)?.into_parts();
            layouts.push(layout);
            for (time, slot) in times.into_iter().zip(slots) {
                let mut tagged = vec![None; width];
                tagged[index] = Some(slot);
                steps.push((time, Slot::Collate(tagged)));
            }
        }
        steps.sort_by_key(|(time, _)| *time);

        debug!(sources = width, time_steps = steps.len(), "Collated raster recipes");

        let (times, slots) = steps.into_iter().unzip();
        let layout = RecipeLayout::with_branches(pile.geobox.clone(), pile.measurements.clone(), layouts);
        RasterRecipe::new(layout, times, slots)
    }

    fn fetch_data(&self, recipe: &RasterRecipe, storage: &dyn StorageDriver) -> CubeResult<RasterData> {
        let width = self.children.len();
        let mut positions: Vec<Vec<usize>> = vec![Vec::new(); width];
        let mut branch_slots: Vec<Vec<Slot>> = vec![Vec::new(); width];
        let mut empty = Vec::new();

        for (position, slot) in recipe.slots().iter().enumerate() {
            match slot {
                Slot::Collate(tagged) if tagged.len() == width => {
                    let mut populated = tagged
                        .iter()
                        .enumerate()
                        .filter_map(|(branch, slot)| slot.as_ref().map(|slot| (branch, slot)));
                    match (populated.next(), populated.next()) {
                        (Some((branch, slot)), None) => {
                            positions[branch].push(position);
                            branch_slots[branch].push(slot.clone());
                        }
                        (first, _) => {
                            return Err(CubeError::recipe(format!(
                                "collate slot at {} has {} populated sources, expected exactly one",
                                recipe.times()[position],
                                if first.is_some() { "several" } else { "no" }
                            )))
                        }
                    }
                }
                Slot::Empty => empty.push(position),
                other => {
                    return Err(CubeError::recipe(format!(
                        "collate of {} sources cannot fetch a {} slot",
                        width,
                        other.kind_name()
                    )))
                }
            }
        }

        let mut order = Vec::with_capacity(recipe.len());
        let mut parts = Vec::new();
        for (branch, (child, slots)) in self.children.iter().zip(branch_slots).enumerate() {
            if slots.is_empty() {
                continue;
            }
            let times = positions[branch].iter().map(|&p| recipe.times()[p]).collect();
            let sub_recipe = recipe.branch(branch, times, slots)?;
            let data = child.fetch_data(&sub_recipe, storage)?;
            parts.push(self.conform(data, branch, recipe)?);
            order.extend_from_slice(&positions[branch]);
        }

        if !empty.is_empty() {
            debug!(time_steps = empty.len(), "Filling collate time steps without data");
            let times = empty.iter().map(|&p| recipe.times()[p]).collect();
            parts.push(RasterData::filled(times, recipe.geobox().clone(), recipe.measurements()));
            order.extend_from_slice(&empty);
        }

        if parts.is_empty() {
            return Ok(RasterData::filled(Vec::new(), recipe.geobox().clone(), recipe.measurements()));
        }

        let joined = RasterData::concat_time(parts)?;
        let mut inverse = vec![0; order.len()];
        for (joined_index, &position) in order.iter().enumerate() {
            inverse[position] = joined_index;
        }
        Ok(joined.select_time(&inverse))
    }

    fn reconstruct(&self) -> RecipeNode {
        RecipeNode::Collate {
            children: self.children.iter().map(|child| child.reconstruct()).collect(),
            index_measurement_name: self.index_measurement_name.clone(),
        }
    }
}
