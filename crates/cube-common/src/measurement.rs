//! Measurement (band) metadata.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::dtype::DType;

fn default_units() -> String {
    "1".to_string()
}

/// Metadata describing one named band of a product.
///
/// Measurements are values: transformations derive new ones with the
/// `renamed`/`retyped` helpers instead of editing them in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Measurement {
    pub name: String,
    pub dtype: DType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodata: Option<f64>,
    #[serde(default = "default_units")]
    pub units: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flags_definition: Option<BTreeMap<String, FlagDefinition>>,
}

impl Measurement {
    pub fn new(name: impl Into<String>, dtype: DType) -> Self {
        Self {
            name: name.into(),
            dtype,
            nodata: None,
            units: default_units(),
            aliases: Vec::new(),
            flags_definition: None,
        }
    }

    pub fn with_nodata(mut self, nodata: f64) -> Self {
        self.nodata = Some(nodata);
        self
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = units.into();
        self
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_flag(mut self, name: impl Into<String>, definition: FlagDefinition) -> Self {
        self.flags_definition
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), definition);
        self
    }

    /// Copy of this measurement under a different name.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        let mut measurement = self.clone();
        measurement.name = name.into();
        measurement
    }

    /// Copy of this measurement with a new dtype and no-data value.
    /// Flag definitions do not survive a change of dtype.
    pub fn retyped(&self, dtype: DType, nodata: Option<f64>) -> Self {
        let mut measurement = self.clone();
        measurement.dtype = dtype;
        measurement.nodata = nodata;
        measurement.flags_definition = None;
        measurement
    }

    /// Whether `name` refers to this measurement, directly or by alias.
    pub fn answers_to(&self, name: &str) -> bool {
        self.name == name || self.aliases.iter().any(|alias| alias == name)
    }
}

impl PartialEq for Measurement {
    fn eq(&self, other: &Self) -> bool {
        let nodata_eq = match (self.nodata, other.nodata) {
            (Some(a), Some(b)) => a == b || (a.is_nan() && b.is_nan()),
            (None, None) => true,
            _ => false,
        };
        nodata_eq
            && self.name == other.name
            && self.dtype == other.dtype
            && self.units == other.units
            && self.aliases == other.aliases
            && self.flags_definition == other.flags_definition
    }
}

/// Bit positions of a flag, either one bit or a contiguous run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagBits {
    One(u32),
    Many(Vec<u32>),
}

impl FlagBits {
    pub fn positions(&self) -> Vec<u32> {
        match self {
            FlagBits::One(bit) => vec![*bit],
            FlagBits::Many(bits) => {
                let mut bits = bits.clone();
                bits.sort_unstable();
                bits
            }
        }
    }
}

/// A named flag value, as written in product definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Bool(bool),
    Name(String),
}

impl std::fmt::Display for FlagValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlagValue::Bool(value) => write!(f, "{}", value),
            FlagValue::Name(value) => f.write_str(value),
        }
    }
}

/// One entry of a measurement's `flags_definition`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagDefinition {
    pub bits: FlagBits,
    pub values: BTreeMap<i64, FlagValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FlagDefinition {
    /// Bit mask and expected masked value selecting pixels where this flag
    /// equals `value`, or `None` when the value is not defined.
    pub fn mask_for(&self, value: &FlagValue) -> Option<(i64, i64)> {
        let code = self
            .values
            .iter()
            .find(|(_, candidate)| *candidate == value)
            .map(|(code, _)| *code)?;

        let positions = self.bits.positions();
        let lowest = *positions.first()?;
        let mask = positions.iter().fold(0i64, |mask, bit| mask | (1i64 << bit));
        Some((mask, code << lowest))
    }
}

/// Ordered collection of measurements keyed by name.
///
/// Iteration order is insertion order; it is the band order of every raster
/// produced with this collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Measurements(Vec<Measurement>);

impl Measurements {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn get(&self, name: &str) -> Option<&Measurement> {
        self.0.iter().find(|m| m.name == name)
    }

    /// Look up by name first, then by alias.
    pub fn resolve(&self, name: &str) -> Option<&Measurement> {
        self.get(name)
            .or_else(|| self.0.iter().find(|m| m.answers_to(name)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Insert a measurement, replacing one with the same name in place.
    pub fn insert(&mut self, measurement: Measurement) {
        match self.0.iter_mut().find(|m| m.name == measurement.name) {
            Some(existing) => *existing = measurement,
            None => self.0.push(measurement),
        }
    }

    /// Replace the measurement called `name` keeping its position.
    /// Returns false when no such measurement exists.
    pub fn replace(&mut self, name: &str, measurement: Measurement) -> bool {
        match self.0.iter_mut().find(|m| m.name == name) {
            Some(existing) => {
                *existing = measurement;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Measurement> {
        let index = self.0.iter().position(|m| m.name == name)?;
        Some(self.0.remove(index))
    }

    pub fn names(&self) -> Vec<String> {
        self.0.iter().map(|m| m.name.clone()).collect()
    }

    pub fn name_set(&self) -> BTreeSet<String> {
        self.0.iter().map(|m| m.name.clone()).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Measurement> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Measurement> for Measurements {
    fn from_iter<I: IntoIterator<Item = Measurement>>(iter: I) -> Self {
        let mut measurements = Measurements::new();
        for measurement in iter {
            measurements.insert(measurement);
        }
        measurements
    }
}

impl IntoIterator for Measurements {
    type Item = Measurement;
    type IntoIter = std::vec::IntoIter<Measurement>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Measurements {
    type Item = &'a Measurement;
    type IntoIter = std::slice::Iter<'a, Measurement>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel_quality() -> FlagDefinition {
        FlagDefinition {
            bits: FlagBits::Many(vec![1, 0]),
            values: BTreeMap::from([
                (0, FlagValue::Name("clear".into())),
                (1, FlagValue::Name("cloud".into())),
                (2, FlagValue::Name("shadow".into())),
            ]),
            description: None,
        }
    }

    #[test]
    fn test_insertion_order_is_preserved() {
        let measurements: Measurements = vec![
            Measurement::new("red", DType::Int16),
            Measurement::new("green", DType::Int16),
            Measurement::new("blue", DType::Int16),
        ]
        .into_iter()
        .collect();

        assert_eq!(measurements.names(), vec!["red", "green", "blue"]);
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut measurements: Measurements = vec![
            Measurement::new("red", DType::Int16),
            Measurement::new("nir", DType::Int16),
        ]
        .into_iter()
        .collect();

        measurements.insert(Measurement::new("red", DType::Float32));
        assert_eq!(measurements.names(), vec!["red", "nir"]);
        assert_eq!(measurements.get("red").unwrap().dtype, DType::Float32);
    }

    #[test]
    fn test_resolve_by_alias() {
        let measurements: Measurements =
            vec![Measurement::new("nbart_red", DType::Int16).with_aliases(["red", "band_3"])]
                .into_iter()
                .collect();

        assert_eq!(measurements.resolve("band_3").unwrap().name, "nbart_red");
        assert!(measurements.get("band_3").is_none());
    }

    #[test]
    fn test_nan_nodata_equality() {
        let a = Measurement::new("ndvi", DType::Float32).with_nodata(f64::NAN);
        let b = Measurement::new("ndvi", DType::Float32).with_nodata(f64::NAN);
        assert_eq!(a, b);
        assert_ne!(a, Measurement::new("ndvi", DType::Float32));
    }

    #[test]
    fn test_flag_mask() {
        let flag = pixel_quality();
        assert_eq!(flag.mask_for(&FlagValue::Name("shadow".into())), Some((0b11, 0b10)));
        assert_eq!(flag.mask_for(&FlagValue::Name("snow".into())), None);

        let saturated = FlagDefinition {
            bits: FlagBits::One(4),
            values: BTreeMap::from([(0, FlagValue::Bool(false)), (1, FlagValue::Bool(true))]),
            description: Some("Band saturated".into()),
        };
        assert_eq!(saturated.mask_for(&FlagValue::Bool(true)), Some((0b1_0000, 0b1_0000)));
    }

    #[test]
    fn test_deserialize_from_yaml() {
        let yaml = r#"
name: fmask
dtype: uint8
nodata: 0
flags_definition:
  fmask:
    bits: [0, 1, 2]
    values:
      0: nodata
      1: valid
      2: cloud
"#;
        let measurement: Measurement = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(measurement.dtype, DType::UInt8);
        assert_eq!(measurement.units, "1");
        let flags = measurement.flags_definition.unwrap();
        assert_eq!(
            flags["fmask"].mask_for(&FlagValue::Name("cloud".into())),
            Some((0b111, 2))
        );
    }
}
