//! `Juxtapose`: products with disjoint measurements, side by side on a
//! shared time axis.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use cube_common::{
    CubeError, CubeResult, DatasetCatalog, Measurements, ProductDefinitions, Query, RasterData,
    StorageDriver,
};

use crate::node::RecipeNode;
use crate::pile::DatasetPile;
use crate::product::{sealed, BoxedProduct, VirtualProduct};
use crate::recipe::{RasterRecipe, RecipeLayout, Slot};

#[derive(Debug)]
pub struct Juxtapose {
    children: Vec<BoxedProduct>,
}

impl Juxtapose {
    pub fn new(children: Vec<BoxedProduct>) -> CubeResult<Self> {
        if children.is_empty() {
            return Err(CubeError::recipe("juxtapose needs at least one source"));
        }
        Ok(Self { children })
    }

    pub fn children(&self) -> &[BoxedProduct] {
        &self.children
    }
}

/// Union of disjoint schemas, in source order.
fn merge_measurements(inputs: Vec<Measurements>) -> CubeResult<Measurements> {
    let mut seen = BTreeSet::new();
    let mut common = BTreeSet::new();
    for input in &inputs {
        for name in input.names() {
            if !seen.insert(name.clone()) {
                common.insert(name);
            }
        }
    }
    if !common.is_empty() {
        return Err(CubeError::NameCollision(common.into_iter().collect()));
    }
    Ok(inputs.into_iter().flatten().collect())
}

impl sealed::Sealed for Juxtapose {}

impl VirtualProduct for Juxtapose {
    fn output_measurements(&self, definitions: &ProductDefinitions) -> CubeResult<Measurements> {
        let inputs = self
            .children
            .iter()
            .map(|child| child.output_measurements(definitions))
            .collect::<CubeResult<Vec<_>>>()?;
        merge_measurements(inputs)
    }

    fn find_datasets(&self, catalog: &dyn DatasetCatalog, query: &Query) -> CubeResult<DatasetPile> {
        let piles = self
            .children
            .iter()
            .map(|child| child.find_datasets(catalog, query))
            .collect::<CubeResult<Vec<_>>>()?;
        let measurements = merge_measurements(piles.iter().map(|pile| pile.measurements.clone()).collect())?;
        let geobox = piles[0].geobox.clone();
        Ok(DatasetPile::juxtapose(piles, geobox, measurements))
    }

    fn build_raster(&self, pile: &DatasetPile, query: &Query) -> CubeResult<RasterRecipe> {
        let branches = pile.juxtapose_branches(self.children.len())?;

        let mut layouts = Vec::with_capacity(branches.len());
        let mut by_time: Vec<BTreeMap<DateTime<Utc>, Slot>> = Vec::with_capacity(branches.len());
        for (index, (child, branch)) in self.children.iter().zip(branches).enumerate() {
            let (layout, times, slots) = child.build_raster(branch, query)?.into_parts();
            layouts.push(layout);
            let mut slots_by_time = BTreeMap::new();
            for (time, slot) in times.into_iter().zip(slots) {
                if slots_by_time.contains_key(&time) {
                    warn!(source = index, time = %time, "Dropping duplicate time step");
                    continue;
                }
                slots_by_time.insert(time, slot);
            }
            by_time.push(slots_by_time);
        }

        let times: Vec<DateTime<Utc>> = by_time
            .iter()
            .flat_map(|slots| slots.keys().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let slots = times
            .iter()
            .map(|time| {
                Slot::Juxtapose(
                    by_time
                        .iter_mut()
                        .map(|slots| slots.remove(time).unwrap_or(Slot::Empty))
                        .collect(),
                )
            })
            .collect();

        debug!(sources = self.children.len(), time_steps = times.len(), "Aligned raster recipes");

        let layout = RecipeLayout::with_branches(pile.geobox.clone(), pile.measurements.clone(), layouts);
        RasterRecipe::new(layout, times, slots)
    }

    fn fetch_data(&self, recipe: &RasterRecipe, storage: &dyn StorageDriver) -> CubeResult<RasterData> {
        let width = self.children.len();
        let mut branch_slots: Vec<Vec<Slot>> = vec![Vec::with_capacity(recipe.len()); width];
        for slot in recipe.slots() {
            match slot {
                Slot::Juxtapose(parts) if parts.len() == width => {
                    for (branch, part) in branch_slots.iter_mut().zip(parts) {
                        branch.push(part.clone());
                    }
                }
                Slot::Empty => {
                    for branch in branch_slots.iter_mut() {
                        branch.push(Slot::Empty);
                    }
                }
                other => {
                    return Err(CubeError::recipe(format!(
                        "juxtapose of {} sources cannot fetch a {} slot",
                        width,
                        other.kind_name()
                    )))
                }
            }
        }

        let mut result = RasterData::new(recipe.times().to_vec(), recipe.geobox().clone());
        for (index, (child, slots)) in self.children.iter().zip(branch_slots).enumerate() {
            let sub_recipe = recipe.branch(index, recipe.times().to_vec(), slots)?;
            let data = child.fetch_data(&sub_recipe, storage)?;

            let mut part = RasterData::new(recipe.times().to_vec(), recipe.geobox().clone());
            for band in data.into_bands() {
                part.insert_band(band)?;
            }
            result = result.merge(part)?;
        }
        Ok(result)
    }

    fn reconstruct(&self) -> RecipeNode {
        RecipeNode::Juxtapose {
            children: self.children.iter().map(|child| child.reconstruct()).collect(),
        }
    }
}
