//! Dataset records returned by catalog searches.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::bbox::BoundingBox;

/// Opaque handle to one stored granule.
///
/// The algebra only groups and filters records; reading pixels out of them
/// is the storage driver's business.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub id: Uuid,
    pub product: String,
    pub time: DateTime<Utc>,
    pub bbox: BoundingBox,
    /// Storage locator per measurement name.
    #[serde(default)]
    pub locations: BTreeMap<String, String>,
    /// Free-form metadata (cloud cover, platform, processing level, ...).
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl DatasetRecord {
    pub fn new(product: impl Into<String>, time: DateTime<Utc>, bbox: BoundingBox) -> Self {
        Self {
            id: Uuid::new_v4(),
            product: product.into(),
            time,
            bbox,
            locations: BTreeMap::new(),
            properties: Map::new(),
        }
    }

    pub fn with_location(mut self, measurement: impl Into<String>, uri: impl Into<String>) -> Self {
        self.locations.insert(measurement.into(), uri.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn location(&self, measurement: &str) -> Option<&str> {
        self.locations.get(measurement).map(String::as_str)
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}
