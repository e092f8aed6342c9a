//! Storage driver interface.

use crate::array::ArrayData;
use crate::dataset::DatasetRecord;
use crate::error::CubeResult;
use crate::geobox::GeoBox;
use crate::measurement::Measurement;

/// Reads one measurement of one dataset onto an output grid.
pub trait StorageDriver: Send + Sync {
    /// Returns a 2-D `(height, width)` array on `geobox`. Pixels the dataset
    /// does not cover hold the measurement's no-data value.
    fn read(
        &self,
        dataset: &DatasetRecord,
        measurement: &Measurement,
        geobox: &GeoBox,
        resampling: Option<&str>,
    ) -> CubeResult<ArrayData>;
}
