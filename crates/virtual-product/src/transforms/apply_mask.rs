//! Blank out pixels where a boolean mask band is false.

use ndarray::Zip;
use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;

use cube_common::{Band, CubeError, CubeResult, DType, Measurement, Measurements, RasterData};

use super::{default_true, parse_args, targets, to_args};
use crate::dilation::erode_stack;
use crate::transform::Transformation;

pub const QUALIFIED_NAME: &str = "virtual_product::transforms::ApplyMask";

fn default_fallback_dtype() -> DType {
    DType::Float32
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApplyMaskSettings {
    /// Boolean band; true marks pixels to keep.
    pub mask_measurement_name: String,
    /// Bands to mask. All bands except the mask when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply_to: Option<Vec<String>>,
    /// Keep each band's dtype and write its nodata value into masked pixels.
    #[serde(default = "default_true")]
    pub preserve_dtype: bool,
    /// Float dtype used when `preserve_dtype` is false.
    #[serde(default = "default_fallback_dtype")]
    pub fallback_dtype: DType,
    /// Radius by which the valid region is shrunk before masking.
    #[serde(default)]
    pub dilation: usize,
}

impl ApplyMaskSettings {
    pub fn new(mask_measurement_name: impl Into<String>) -> Self {
        Self {
            mask_measurement_name: mask_measurement_name.into(),
            apply_to: None,
            preserve_dtype: true,
            fallback_dtype: default_fallback_dtype(),
            dilation: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApplyMask {
    settings: ApplyMaskSettings,
}

impl ApplyMask {
    pub fn new(settings: ApplyMaskSettings) -> CubeResult<Self> {
        if !settings.preserve_dtype && !settings.fallback_dtype.is_float() {
            return Err(CubeError::recipe(format!(
                "apply_mask fallback_dtype must be a float type, got {}",
                settings.fallback_dtype
            )));
        }
        Ok(Self { settings })
    }

    pub fn from_args(args: &Mapping) -> CubeResult<Self> {
        Self::new(parse_args("apply_mask", args)?)
    }

    fn targets(&self, name: &str) -> bool {
        match &self.settings.apply_to {
            Some(names) => names.iter().any(|n| n == name),
            None => name != self.settings.mask_measurement_name,
        }
    }

    fn masked_measurement(&self, measurement: &Measurement) -> CubeResult<Measurement> {
        if !self.settings.preserve_dtype {
            return Ok(measurement.retyped(self.settings.fallback_dtype, Some(f64::NAN)));
        }
        if measurement.nodata.is_some() || !measurement.dtype.is_integer() {
            return Ok(measurement.clone());
        }
        Err(CubeError::no_data_policy(
            &measurement.name,
            format!(
                "cannot mask {} data without a nodata value; set preserve_dtype: false",
                measurement.dtype
            ),
        ))
    }
}

impl Transformation for ApplyMask {
    fn measurements(&self, input: &Measurements) -> CubeResult<Measurements> {
        let mask_name = &self.settings.mask_measurement_name;
        let mask = input.get(mask_name).ok_or_else(|| {
            CubeError::missing_input(format!("mask measurement '{}' not found", mask_name))
        })?;
        if !mask.dtype.is_bool() {
            return Err(CubeError::recipe(format!(
                "mask measurement '{}' must be bool, got {}",
                mask_name, mask.dtype
            )));
        }

        let targets = targets(input, self.settings.apply_to.as_deref(), "apply_mask")?;
        let mut output = Measurements::new();
        for measurement in input {
            if &measurement.name == mask_name {
                continue;
            }
            if targets.contains(&measurement.name) {
                output.insert(self.masked_measurement(measurement)?);
            } else {
                output.insert(measurement.clone());
            }
        }
        Ok(output)
    }

    fn compute(&self, mut data: RasterData) -> CubeResult<RasterData> {
        let output = self.measurements(&data.measurements())?;
        let mask_name = &self.settings.mask_measurement_name;
        let mask = data.remove_band(mask_name).ok_or_else(|| {
            CubeError::missing_input(format!("mask measurement '{}' not loaded", mask_name))
        })?;
        let keep = erode_stack(&mask.data.to_bool(), self.settings.dilation)?;

        data.map_bands(|band| {
            if !self.targets(band.name()) {
                return Ok(band);
            }
            let measurement = output.get(band.name()).ok_or_else(|| {
                CubeError::missing_input(format!("measurement '{}' not loaded", band.name()))
            })?;

            let mut drop = keep.mapv(|k| !k);
            if measurement.dtype != band.measurement.dtype {
                // No-data pixels of the source become NaN too.
                Zip::from(&mut drop)
                    .and(&band.invalid_mask())
                    .for_each(|d, &invalid| *d = *d || invalid);
            }

            let mut values = band.data.cast(measurement.dtype);
            let fill = if measurement.dtype.is_bool() {
                0.0
            } else {
                measurement.nodata.unwrap_or(f64::NAN)
            };
            values.fill_where(&drop, fill)?;
            Band::new(measurement.clone(), values)
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
    use cube_common::{ArrayData, BoundingBox, GeoBox};
    use ndarray::{arr3, Array3};

    fn raster(mask: Array3<bool>, red: Array3<i64>) -> RasterData {
        let (_, height, width) = mask.dim();
        let geobox = GeoBox::new(
            "EPSG:4326",
            width,
            height,
            BoundingBox::new(0.0, 0.0, width as f64, height as f64),
        );
        RasterData::new(vec![Utc.with_ymd_and_hms(2021, 3, 1, 0, 0, 0).unwrap()], geobox)
            .with_band(
                Band::new(
                    Measurement::new("red", DType::Int16).with_nodata(-999.0),
                    ArrayData::Int(red.into_dyn()),
                )
                .unwrap(),
            )
            .unwrap()
            .with_band(Band::new(Measurement::new("clear", DType::Bool), ArrayData::Bool(mask.into_dyn())).unwrap())
            .unwrap()
    }

    #[test]
    fn test_preserve_dtype_uses_nodata() {
        let transform = ApplyMask::new(ApplyMaskSettings::new("clear")).unwrap();
        let data = raster(
            arr3(&[[[true, false, true]]]),
            arr3(&[[[10, 20, 30]]]),
        );

        let masked = transform.compute(data).unwrap();

        assert!(masked.band("clear").is_none());
        let red = masked.band("red").unwrap();
        assert_eq!(red.measurement.dtype, DType::Int16);
        assert_eq!(red.data, ArrayData::Int(arr3(&[[[10, -999, 30]]]).into_dyn()));
    }

    #[test]
    fn test_fallback_dtype_converts_nodata_to_nan() {
        let mut settings = ApplyMaskSettings::new("clear");
        settings.preserve_dtype = false;
        let transform = ApplyMask::new(settings).unwrap();
        let data = raster(
            arr3(&[[[true, false, true]]]),
            arr3(&[[[-999, 20, 30]]]),
        );

        let masked = transform.compute(data).unwrap();
        let red = masked.band("red").unwrap();
        assert_eq!(red.measurement.dtype, DType::Float32);
        let values = red.data.to_f64();
        assert!(values[[0, 0, 0]].is_nan());
        assert!(values[[0, 0, 1]].is_nan());
        assert_eq!(values[[0, 0, 2]], 30.0);
    }

    #[test]
    fn test_dilation_shrinks_valid_region() {
        let mut settings = ApplyMaskSettings::new("clear");
        settings.dilation = 1;
        let transform = ApplyMask::new(settings).unwrap();
        let data = raster(
            arr3(&[[[true, true, true, true, false]]]),
            arr3(&[[[1, 2, 3, 4, 5]]]),
        );

        let masked = transform.compute(data).unwrap();
        assert_eq!(
            masked.band("red").unwrap().data,
            ArrayData::Int(arr3(&[[[1, 2, 3, -999, -999]]]).into_dyn())
        );
    }

    #[test]
    fn test_schema_errors() {
        let inputs: Measurements = vec![
            Measurement::new("red", DType::Int16),
            Measurement::new("clear", DType::Bool),
            Measurement::new("fmask", DType::UInt8),
        ]
        .into_iter()
        .collect();

        let transform = ApplyMask::new(ApplyMaskSettings::new("cloud")).unwrap();
        assert!(matches!(transform.measurements(&inputs), Err(CubeError::MissingInput(_))));

        let transform = ApplyMask::new(ApplyMaskSettings::new("fmask")).unwrap();
        assert!(matches!(transform.measurements(&inputs), Err(CubeError::Recipe(_))));

        let transform = ApplyMask::new(ApplyMaskSettings::new("clear")).unwrap();
        assert!(matches!(
            transform.measurements(&inputs),
            Err(CubeError::NoDataPolicy { measurement, .. }) if measurement == "red"
        ));

        let mut settings = ApplyMaskSettings::new("clear");
        settings.preserve_dtype = false;
        settings.fallback_dtype = DType::Int32;
        assert!(ApplyMask::new(settings).is_err());
    }
}
