//! Common types and utilities shared across all data cube crates.

pub mod array;
pub mod bbox;
pub mod catalog;
pub mod dataset;
pub mod dtype;
pub mod error;
pub mod geobox;
pub mod measurement;
pub mod query;
pub mod storage;
pub mod time;

pub use array::{ArrayData, Band, RasterData};
pub use bbox::BoundingBox;
pub use catalog::{
    DatasetCatalog, DatasetPredicate, ProductDefinition, ProductDefinitions, SearchRequest,
    SearchResult,
};
pub use dataset::DatasetRecord;
pub use dtype::{DType, DTypeKind};
pub use error::{CubeError, CubeResult};
pub use geobox::GeoBox;
pub use measurement::{FlagBits, FlagDefinition, FlagValue, Measurement, Measurements};
pub use query::Query;
pub use storage::StorageDriver;
pub use time::{TimeGrouping, TimeRange};
