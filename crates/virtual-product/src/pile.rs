//! Dataset piles: the output of `find_datasets`.
//!
//! A pile mirrors the shape of the product tree that produced it. Each level
//! carries the grid and measurements it was found with, so `build_raster`
//! never has to consult the catalog again.

use cube_common::{CubeError, CubeResult, DatasetRecord, GeoBox, Measurements};

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetPile {
    pub geobox: GeoBox,
    pub measurements: Measurements,
    pub kind: PileKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PileKind {
    Basic(Vec<DatasetRecord>),
    Collate(Vec<DatasetPile>),
    Juxtapose(Vec<DatasetPile>),
    /// The source pile of a transformation, one level down.
    Transform(Box<DatasetPile>),
}

impl PileKind {
    fn name(&self) -> &'static str {
        match self {
            PileKind::Basic(_) => "basic",
            PileKind::Collate(_) => "collate",
            PileKind::Juxtapose(_) => "juxtapose",
            PileKind::Transform(_) => "transform",
        }
    }
}

impl DatasetPile {
    pub fn basic(datasets: Vec<DatasetRecord>, geobox: GeoBox, measurements: Measurements) -> Self {
        Self {
            geobox,
            measurements,
            kind: PileKind::Basic(datasets),
        }
    }

    pub fn collate(children: Vec<DatasetPile>, geobox: GeoBox, measurements: Measurements) -> Self {
        Self {
            geobox,
            measurements,
            kind: PileKind::Collate(children),
        }
    }

    pub fn juxtapose(children: Vec<DatasetPile>, geobox: GeoBox, measurements: Measurements) -> Self {
        Self {
            geobox,
            measurements,
            kind: PileKind::Juxtapose(children),
        }
    }

    /// Wrap a source pile under the measurements a transformation produces
    /// from it.
    pub fn transform(source: DatasetPile, measurements: Measurements) -> Self {
        Self {
            geobox: source.geobox.clone(),
            measurements,
            kind: PileKind::Transform(Box::new(source)),
        }
    }

    pub fn dataset_count(&self) -> usize {
        match &self.kind {
            PileKind::Basic(datasets) => datasets.len(),
            PileKind::Collate(children) | PileKind::Juxtapose(children) => {
                children.iter().map(DatasetPile::dataset_count).sum()
            }
            PileKind::Transform(source) => source.dataset_count(),
        }
    }

    pub(crate) fn basic_datasets(&self) -> CubeResult<&[DatasetRecord]> {
        match &self.kind {
            PileKind::Basic(datasets) => Ok(datasets),
            other => Err(CubeError::recipe(format!(
                "expected a basic dataset pile, got a {} pile",
                other.name()
            ))),
        }
    }

    pub(crate) fn collate_branches(&self, expected: usize) -> CubeResult<&[DatasetPile]> {
        match &self.kind {
            PileKind::Collate(children) if children.len() == expected => Ok(children),
            other => Err(mismatched(other, "collate", expected)),
        }
    }

    pub(crate) fn transform_source(&self) -> CubeResult<&DatasetPile> {
        match &self.kind {
            PileKind::Transform(source) => Ok(source),
            other => Err(mismatched(other, "transform", 1)),
        }
    }

    pub(crate) fn juxtapose_branches(&self, expected: usize) -> CubeResult<&[DatasetPile]> {
        match &self.kind {
            PileKind::Juxtapose(children) if children.len() == expected => Ok(children),
            other => Err(mismatched(other, "juxtapose", expected)),
        }
    }
}

fn mismatched(actual: &PileKind, expected_kind: &str, expected: usize) -> CubeError {
    let found = match actual {
        PileKind::Basic(_) | PileKind::Transform(_) => 1,
        PileKind::Collate(children) | PileKind::Juxtapose(children) => children.len(),
    };
    CubeError::recipe(format!(
        "expected a {} pile with {} branches, got a {} pile with {}",
        expected_kind,
        expected,
        actual.name(),
        found
    ))
}
