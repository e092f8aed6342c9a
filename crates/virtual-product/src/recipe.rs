//! Raster recipes: the output of `build_raster`.
//!
//! A recipe is a time-indexed list of slots that reference datasets but hold
//! no pixels. Its [`RecipeLayout`] carries the grid and measurements of every
//! level of the product tree, so any time subset of a recipe is itself a
//! complete recipe that can be fetched independently.

use std::ops::Range;

use chrono::{DateTime, Utc};
use cube_common::{CubeError, CubeResult, DatasetRecord, GeoBox, Measurements};

/// Contents of one time step.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    /// Nothing to read; fetches as no-data.
    Empty,
    /// Datasets fused into this time step.
    Basic(Vec<DatasetRecord>),
    /// One position per collate branch, exactly one populated.
    Collate(Vec<Option<Slot>>),
    /// One sub-slot per juxtapose branch.
    Juxtapose(Vec<Slot>),
}

impl Slot {
    pub fn is_empty(&self) -> bool {
        match self {
            Slot::Empty => true,
            Slot::Basic(datasets) => datasets.is_empty(),
            Slot::Collate(branches) => branches.iter().flatten().all(Slot::is_empty),
            Slot::Juxtapose(branches) => branches.iter().all(Slot::is_empty),
        }
    }

    pub fn dataset_count(&self) -> usize {
        match self {
            Slot::Empty => 0,
            Slot::Basic(datasets) => datasets.len(),
            Slot::Collate(branches) => branches.iter().flatten().map(Slot::dataset_count).sum(),
            Slot::Juxtapose(branches) => branches.iter().map(Slot::dataset_count).sum(),
        }
    }

    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            Slot::Empty => "empty",
            Slot::Basic(_) => "basic",
            Slot::Collate(_) => "collate",
            Slot::Juxtapose(_) => "juxtapose",
        }
    }
}

/// Grid and measurements of one level of the product tree, with the layouts
/// of its branches.
#[derive(Debug, Clone, PartialEq)]
pub struct RecipeLayout {
    pub geobox: GeoBox,
    pub measurements: Measurements,
    /// Resampling passed to storage reads at this level, if any.
    pub resampling: Option<String>,
    pub branches: Vec<RecipeLayout>,
}

impl RecipeLayout {
    pub fn leaf(geobox: GeoBox, measurements: Measurements) -> Self {
        Self {
            geobox,
            measurements,
            resampling: None,
            branches: Vec::new(),
        }
    }

    pub fn with_resampling(mut self, resampling: Option<String>) -> Self {
        self.resampling = resampling;
        self
    }

    pub fn with_branches(geobox: GeoBox, measurements: Measurements, branches: Vec<RecipeLayout>) -> Self {
        Self {
            geobox,
            measurements,
            resampling: None,
            branches,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RasterRecipe {
    layout: RecipeLayout,
    times: Vec<DateTime<Utc>>,
    slots: Vec<Slot>,
}

impl RasterRecipe {
    pub fn new(layout: RecipeLayout, times: Vec<DateTime<Utc>>, slots: Vec<Slot>) -> CubeResult<Self> {
        if times.len() != slots.len() {
            return Err(CubeError::recipe(format!(
                "raster recipe has {} times but {} slots",
                times.len(),
                slots.len()
            )));
        }
        Ok(Self {
            layout,
            times,
            slots,
        })
    }

    pub fn layout(&self) -> &RecipeLayout {
        &self.layout
    }

    pub fn geobox(&self) -> &GeoBox {
        &self.layout.geobox
    }

    pub fn measurements(&self) -> &Measurements {
        &self.layout.measurements
    }

    pub fn times(&self) -> &[DateTime<Utc>] {
        &self.times
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DateTime<Utc>, &Slot)> {
        self.times.iter().zip(self.slots.iter())
    }

    pub fn into_parts(self) -> (RecipeLayout, Vec<DateTime<Utc>>, Vec<Slot>) {
        (self.layout, self.times, self.slots)
    }

    /// Contiguous time range; out-of-range bounds are clamped.
    pub fn slice(&self, range: Range<usize>) -> RasterRecipe {
        let end = range.end.min(self.len());
        let start = range.start.min(end);
        Self {
            layout: self.layout.clone(),
            times: self.times[start..end].to_vec(),
            slots: self.slots[start..end].to_vec(),
        }
    }

    /// Arbitrary time steps, in the order given.
    pub fn select(&self, indices: &[usize]) -> CubeResult<RasterRecipe> {
        let mut times = Vec::with_capacity(indices.len());
        let mut slots = Vec::with_capacity(indices.len());
        for &index in indices {
            if index >= self.len() {
                return Err(CubeError::recipe(format!(
                    "time index {} out of range for a recipe of {} steps",
                    index,
                    self.len()
                )));
            }
            times.push(self.times[index]);
            slots.push(self.slots[index].clone());
        }
        Ok(Self {
            layout: self.layout.clone(),
            times,
            slots,
        })
    }

    /// Consecutive sub-recipes of at most `size` time steps each.
    pub fn time_slices(&self, size: usize) -> impl Iterator<Item = RasterRecipe> + '_ {
        let size = size.max(1);
        (0..self.len())
            .step_by(size)
            .map(move |start| self.slice(start..start + size))
    }

    /// Recipe for branch `index` of this level over the given steps.
    pub(crate) fn branch(
        &self,
        index: usize,
        times: Vec<DateTime<Utc>>,
        slots: Vec<Slot>,
    ) -> CubeResult<RasterRecipe> {
        let layout = self.layout.branches.get(index).cloned().ok_or_else(|| {
            CubeError::recipe(format!(
                "recipe has {} branch layouts, branch {} requested",
                self.layout.branches.len(),
                index
            ))
        })?;
        RasterRecipe::new(layout, times, slots)
    }
}
