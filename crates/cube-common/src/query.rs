//! Spatial and temporal query parameters.
//!
//! This module provides a fluent builder API describing which part of the
//! cube a load covers and, optionally, the output grid it should land on.
//!
//! # Examples
//!
//! ```rust
//! use cube_common::{BoundingBox, Query, TimeRange};
//!
//! let query = Query::new()
//!     .within(BoundingBox::new(148.0, -36.0, 149.0, -35.0))
//!     .during(TimeRange::parse("2021-01-01/2021-03-31").unwrap())
//!     .with_output_crs("EPSG:3577")
//!     .with_resolution(-30.0, 30.0);
//! ```

use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;
use crate::dataset::DatasetRecord;
use crate::time::TimeRange;

/// Query parameters for searching and loading a product.
///
/// Every field is optional; an empty query matches everything the catalog
/// holds for a product.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Spatial extent, in the catalog's search CRS.
    pub bbox: Option<BoundingBox>,

    /// Inclusive acquisition time range.
    pub time: Option<TimeRange>,

    /// Target CRS of the output grid (e.g., "EPSG:3577").
    pub output_crs: Option<String>,

    /// Target (y, x) pixel size of the output grid.
    pub resolution: Option<(f64, f64)>,

    /// Resampling method name, passed opaquely to storage.
    pub resampling: Option<String>,
}

impl Query {
    /// Create an unrestricted query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict the query to a spatial extent.
    pub fn within(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    /// Restrict the query to a time range.
    pub fn during(mut self, time: TimeRange) -> Self {
        self.time = Some(time);
        self
    }

    pub fn with_output_crs(mut self, crs: impl Into<String>) -> Self {
        self.output_crs = Some(crs.into());
        self
    }

    pub fn with_resolution(mut self, y: f64, x: f64) -> Self {
        self.resolution = Some((y, x));
        self
    }

    pub fn with_resampling(mut self, resampling: impl Into<String>) -> Self {
        self.resampling = Some(resampling.into());
        self
    }

    /// Whether a dataset falls inside the query extent and time range.
    pub fn matches(&self, dataset: &DatasetRecord) -> bool {
        let in_space = self
            .bbox
            .map_or(true, |bbox| bbox.intersects(&dataset.bbox));
        let in_time = self
            .time
            .map_or(true, |range| range.contains(&dataset.time));
        in_space && in_time
    }
}
