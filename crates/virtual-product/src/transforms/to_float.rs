//! Convert bands to a float dtype, turning no-data pixels into NaN.

use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;

use cube_common::{Band, CubeError, CubeResult, DType, Measurements, RasterData};

use super::{parse_args, targets, to_args};
use crate::transform::Transformation;

pub const QUALIFIED_NAME: &str = "virtual_product::transforms::ToFloat";

fn default_dtype() -> DType {
    DType::Float32
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToFloatSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply_to: Option<Vec<String>>,
    #[serde(default = "default_dtype")]
    pub dtype: DType,
}

impl Default for ToFloatSettings {
    fn default() -> Self {
        Self {
            apply_to: None,
            dtype: default_dtype(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToFloat {
    settings: ToFloatSettings,
}

impl ToFloat {
    pub fn new(settings: ToFloatSettings) -> CubeResult<Self> {
        if !settings.dtype.is_float() {
            return Err(CubeError::recipe(format!(
                "to_float dtype must be a float type, got {}",
                settings.dtype
            )));
        }
        Ok(Self { settings })
    }

    pub fn from_args(args: &Mapping) -> CubeResult<Self> {
        Self::new(parse_args("to_float", args)?)
    }
}

impl Transformation for ToFloat {
    fn measurements(&self, input: &Measurements) -> CubeResult<Measurements> {
        let targets = targets(input, self.settings.apply_to.as_deref(), "to_float")?;
        Ok(input
            .iter()
            .map(|measurement| {
                if targets.contains(&measurement.name) {
                    measurement.retyped(self.settings.dtype, Some(f64::NAN))
                } else {
                    measurement.clone()
                }
            })
            .collect())
    }

    fn compute(&self, data: RasterData) -> CubeResult<RasterData> {
        let output = self.measurements(&data.measurements())?;
        let targets = targets(&output, self.settings.apply_to.as_deref(), "to_float")?;
        data.map_bands(|band| {
            if !targets.iter().any(|name| name == band.name()) {
                return Ok(band);
            }
            let measurement = output.get(band.name()).cloned().ok_or_else(|| {
                CubeError::missing_input(format!("measurement '{}' not loaded", band.name()))
            })?;
            let invalid = band.invalid_mask();
            let mut values = band.data.cast(measurement.dtype);
            values.fill_where(&invalid, f64::NAN)?;
            Band::new(measurement, values)
        })
    }

    fn name(&self) -> &str {
        QUALIFIED_NAME
    }

    fn settings(&self) -> Mapping {
        to_args(&self.settings)
    }
}
