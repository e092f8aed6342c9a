//! Turn a bit-flag band into a boolean mask.
//!
//! ```yaml
//! transform: make_mask
//! mask_measurement_name: fmask
//! flags:
//!   fmask: valid
//!   cloud_shadow: false
//! ```

use std::collections::BTreeMap;

use ndarray::{ArrayD, Zip};
use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;

use cube_common::{
    ArrayData, Band, CubeError, CubeResult, DType, FlagValue, Measurement, Measurements, RasterData,
};

use super::{parse_args, to_args};
use crate::transform::Transformation;

pub const QUALIFIED_NAME: &str = "virtual_product::transforms::MakeMask";

fn default_output_name() -> String {
    "mask".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MakeMaskSettings {
    pub mask_measurement_name: String,
    /// Flag name to required value; a pixel is true when every flag matches.
    pub flags: BTreeMap<String, FlagValue>,
    #[serde(default = "default_output_name")]
    pub output_name: String,
}

#[derive(Debug, Clone)]
pub struct MakeMask {
    settings: MakeMaskSettings,
}

impl MakeMask {
    pub fn new(settings: MakeMaskSettings) -> CubeResult<Self> {
        if settings.flags.is_empty() {
            return Err(CubeError::recipe("make_mask needs at least one flag"));
        }
        Ok(Self { settings })
    }

    pub fn from_args(args: &Mapping) -> CubeResult<Self> {
        Self::new(parse_args("make_mask", args)?)
    }

    /// `(bit mask, expected value)` pairs selecting the requested flags.
    fn bit_tests(&self, measurement: &Measurement) -> CubeResult<Vec<(i64, i64)>> {
        let definitions = measurement.flags_definition.as_ref().ok_or_else(|| {
            CubeError::recipe(format!(
                "measurement '{}' has no flags definition",
                measurement.name
            ))
        })?;

        self.settings
            .flags
            .iter()
            .map(|(flag, value)| {
                let definition = definitions.get(flag).ok_or_else(|| {
                    CubeError::missing_input(format!(
                        "flag '{}' not defined for '{}'",
                        flag, measurement.name
                    ))
                })?;
                definition.mask_for(value).ok_or_else(|| {
                    CubeError::missing_input(format!("flag '{}' has no value '{}'", flag, value))
                })
            })
            .collect()
    }

    fn flags_measurement<'a>(&self, input: &'a Measurements) -> CubeResult<&'a Measurement> {
        let name = &self.settings.mask_measurement_name;
        input
            .get(name)
            .ok_or_else(|| CubeError::missing_input(format!("flags measurement '{}' not found", name)))
    }
}

impl Transformation for MakeMask {
    fn measurements(&self, input: &Measurements) -> CubeResult<Measurements> {
        let flags = self.flags_measurement(input)?;
        self.bit_tests(flags)?;

        let output_name = &self.settings.output_name;
        if output_name != &flags.name && input.contains(output_name) {
            return Err(CubeError::NameCollision(vec![output_name.clone()]));
        }

        let mut output = input.clone();
        output.replace(&flags.name, Measurement::new(output_name.clone(), DType::Bool));
        Ok(output)
    }

    fn compute(&self, data: RasterData) -> CubeResult<RasterData> {
        let input = data.measurements();
        let flags = self.flags_measurement(&input)?.clone();
        let tests = self.bit_tests(&flags)?;

        data.map_bands(|band| {
            if band.name() != flags.name {
                return Ok(band);
            }
            let values = band.data.to_i64();
            let mut mask = ArrayD::from_elem(values.raw_dim(), true);
            for &(bits, expected) in &tests {
                Zip::from(&mut mask)
                    .and(&values)
                    .for_each(|m, &v| *m = *m && (v & bits) == expected);
            }
            // No-data flag pixels never pass.
            Zip::from(&mut mask)
                .and(&band.invalid_mask())
                .for_each(|m, &invalid| *m = *m && !invalid);

            Band::new(
                Measurement::new(self.settings.output_name.clone(), DType::Bool),
                ArrayData::Bool(mask),
            )
        })
    }

    fn name(&self) -> &str {
        QUALIFIED_NAME
    }

    fn settings(&self) -> Mapping {
        to_args(&self.settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use cube_common::{BoundingBox, FlagBits, FlagDefinition, GeoBox};
    use ndarray::arr3;

    fn pixel_quality() -> Measurement {
        Measurement::new("pq", DType::UInt8)
            .with_nodata(255.0)
            .with_flag(
                "cloud",
                FlagDefinition {
                    bits: FlagBits::One(0),
                    values: [(0, FlagValue::Bool(false)), (1, FlagValue::Bool(true))]
                        .into_iter()
                        .collect(),
                    description: None,
                },
            )
            .with_flag(
                "land_class",
                FlagDefinition {
                    bits: FlagBits::Many(vec![1, 2]),
                    values: [
                        (0, FlagValue::Name("water".into())),
                        (1, FlagValue::Name("land".into())),
                        (2, FlagValue::Name("snow".into())),
                    ]
                    .into_iter()
                    .collect(),
                    description: None,
                },
            )
    }

    fn settings(yaml: &str) -> MakeMaskSettings {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_flags_band_replaced_in_place() {
        let inputs: Measurements = vec![
            Measurement::new("red", DType::Int16),
            pixel_quality(),
            Measurement::new("nir", DType::Int16),
        ]
        .into_iter()
        .collect();
        let transform = MakeMask::new(settings(
            "mask_measurement_name: pq\nflags: {cloud: false}\noutput_name: clear",
        ))
        .unwrap();

        let output = transform.measurements(&inputs).unwrap();
        assert_eq!(output.names(), vec!["red", "clear", "nir"]);
        assert_eq!(output.get("clear").unwrap().dtype, DType::Bool);
    }

    #[test]
    fn test_compute_combines_flags() {
        let transform = MakeMask::new(settings(
            "mask_measurement_name: pq\nflags: {cloud: false, land_class: land}",
        ))
        .unwrap();
        let geobox = GeoBox::new("EPSG:4326", 5, 1, BoundingBox::new(0.0, 0.0, 5.0, 1.0));
        // bit 0 cloud, bits 1-2 land class
        let pq = ArrayData::Int(arr3(&[[[0b010, 0b011, 0b000, 0b100, 255]]]).into_dyn());
        let data = RasterData::new(vec![Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap()], geobox)
            .with_band(Band::new(pixel_quality(), pq).unwrap())
            .unwrap();

        let masked = transform.compute(data).unwrap();
        let mask = masked.band("mask").unwrap();
        assert_eq!(
            mask.data,
            ArrayData::Bool(arr3(&[[[true, false, false, false, false]]]).into_dyn())
        );
    }

    #[test]
    fn test_unknown_flags() {
        let inputs: Measurements = vec![pixel_quality(), Measurement::new("red", DType::Int16)]
            .into_iter()
            .collect();

        let unknown_flag = MakeMask::new(settings("mask_measurement_name: pq\nflags: {haze: true}")).unwrap();
        assert!(matches!(unknown_flag.measurements(&inputs), Err(CubeError::MissingInput(_))));

        let unknown_value =
            MakeMask::new(settings("mask_measurement_name: pq\nflags: {land_class: lava}")).unwrap();
        assert!(matches!(unknown_value.measurements(&inputs), Err(CubeError::MissingInput(_))));

        let no_definition = MakeMask::new(settings("mask_measurement_name: red\nflags: {cloud: true}")).unwrap();
        assert!(matches!(no_definition.measurements(&inputs), Err(CubeError::Recipe(_))));
    }
}
