//! In-memory arrays: typed array data, bands and materialized rasters.

use chrono::{DateTime, Utc};
use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn, Zip};

use crate::dtype::{DType, DTypeKind};
use crate::error::{CubeError, CubeResult};
use crate::geobox::GeoBox;
use crate::measurement::{Measurement, Measurements};

/// N-dimensional array in one of the three in-memory representations.
///
/// Integer dtypes of every width are held as `i64` and wrapped to their
/// declared range on cast; float32 is held as `f64` rounded to f32 precision.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    Bool(ArrayD<bool>),
    Int(ArrayD<i64>),
    Float(ArrayD<f64>),
}

impl ArrayData {
    /// Array of `shape` holding `nodata` (false, 0 or NaN when absent).
    pub fn filled(dtype: DType, shape: &[usize], nodata: Option<f64>) -> Self {
        let shape = IxDyn(shape);
        match dtype.kind() {
            DTypeKind::Bool => ArrayData::Bool(ArrayD::from_elem(shape, false)),
            DTypeKind::Int => {
                let fill = dtype.cast_int(nodata.map_or(0, |value| value as i64));
                ArrayData::Int(ArrayD::from_elem(shape, fill))
            }
            DTypeKind::Float => {
                ArrayData::Float(ArrayD::from_elem(shape, nodata.unwrap_or(f64::NAN)))
            }
        }
    }

    /// Zero-length 1-D array of the given dtype.
    pub fn empty(dtype: DType) -> Self {
        Self::filled(dtype, &[0], None)
    }

    pub fn kind(&self) -> DTypeKind {
        match self {
            ArrayData::Bool(_) => DTypeKind::Bool,
            ArrayData::Int(_) => DTypeKind::Int,
            ArrayData::Float(_) => DTypeKind::Float,
        }
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            ArrayData::Bool(a) => a.shape(),
            ArrayData::Int(a) => a.shape(),
            ArrayData::Float(a) => a.shape(),
        }
    }

    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_f64(&self) -> ArrayD<f64> {
        match self {
            ArrayData::Bool(a) => a.mapv(|v| if v { 1.0 } else { 0.0 }),
            ArrayData::Int(a) => a.mapv(|v| v as f64),
            ArrayData::Float(a) => a.clone(),
        }
    }

    /// Integer view of the data; floats truncate toward zero, NaN becomes 0.
    pub fn to_i64(&self) -> ArrayD<i64> {
        match self {
            ArrayData::Bool(a) => a.mapv(i64::from),
            ArrayData::Int(a) => a.clone(),
            ArrayData::Float(a) => a.mapv(|v| v as i64),
        }
    }

    /// Truthiness of every element; NaN counts as true.
    pub fn to_bool(&self) -> ArrayD<bool> {
        match self {
            ArrayData::Bool(a) => a.clone(),
            ArrayData::Int(a) => a.mapv(|v| v != 0),
            ArrayData::Float(a) => a.mapv(|v| v != 0.0),
        }
    }

    /// Convert to the representation of `dtype`, wrapping integers and
    /// rounding floats to the target width.
    pub fn cast(&self, dtype: DType) -> ArrayData {
        match dtype.kind() {
            DTypeKind::Bool => ArrayData::Bool(self.to_bool()),
            DTypeKind::Int => match self {
                ArrayData::Int(a) => ArrayData::Int(a.mapv(|v| dtype.cast_int(v))),
                other => ArrayData::Int(other.to_i64().mapv(|v| dtype.cast_int(v))),
            },
            DTypeKind::Float => match self {
                ArrayData::Float(a) => ArrayData::Float(a.mapv(|v| dtype.cast_float(v))),
                other => ArrayData::Float(other.to_f64().mapv(|v| dtype.cast_float(v))),
            },
        }
    }

    /// Positions holding no-data: equal to `nodata`, or NaN for floats.
    /// Boolean arrays never hold no-data.
    pub fn invalid_mask(&self, nodata: Option<f64>) -> ArrayD<bool> {
        match self {
            ArrayData::Bool(a) => ArrayD::from_elem(a.raw_dim(), false),
            ArrayData::Int(a) => match nodata {
                Some(value) if value.is_finite() && value.fract() == 0.0 => {
                    let value = value as i64;
                    a.mapv(|v| v == value)
                }
                _ => ArrayD::from_elem(a.raw_dim(), false),
            },
            ArrayData::Float(a) => {
                a.mapv(|v| v.is_nan() || nodata.map_or(false, |value| v == value))
            }
        }
    }

    /// Set every position where `mask` is true to `value`.
    pub fn fill_where(&mut self, mask: &ArrayD<bool>, value: f64) -> CubeResult<()> {
        check_same_shape(self.shape(), mask.shape())?;
        match self {
            ArrayData::Bool(a) => {
                let value = value != 0.0 && !value.is_nan();
                Zip::from(a).and(mask).for_each(|v, &m| {
                    if m {
                        *v = value;
                    }
                });
            }
            ArrayData::Int(a) => {
                let value = value as i64;
                Zip::from(a).and(mask).for_each(|v, &m| {
                    if m {
                        *v = value;
                    }
                });
            }
            ArrayData::Float(a) => {
                Zip::from(a).and(mask).for_each(|v, &m| {
                    if m {
                        *v = value;
                    }
                });
            }
        }
        Ok(())
    }

    /// Copy elements of `source` into `self` where `mask` is true.
    pub fn copy_where(&mut self, mask: &ArrayD<bool>, source: &ArrayData) -> CubeResult<()> {
        check_same_shape(self.shape(), mask.shape())?;
        check_same_shape(self.shape(), source.shape())?;
        match (self, source) {
            (ArrayData::Bool(dst), ArrayData::Bool(src)) => copy_masked(dst, src, mask),
            (ArrayData::Int(dst), ArrayData::Int(src)) => copy_masked(dst, src, mask),
            (ArrayData::Float(dst), ArrayData::Float(src)) => copy_masked(dst, src, mask),
            (dst, src) => {
                return Err(CubeError::evaluation(format!(
                    "cannot copy {:?} elements into a {:?} array",
                    src.kind(),
                    dst.kind()
                )))
            }
        }
        Ok(())
    }

    /// Stack equally shaped planes along a new leading axis. With no planes
    /// the result has shape `[0, plane_shape..]`.
    pub fn stack(dtype: DType, planes: &[ArrayData], plane_shape: &[usize]) -> CubeResult<ArrayData> {
        if planes.is_empty() {
            let mut shape = vec![0];
            shape.extend_from_slice(plane_shape);
            return Ok(ArrayData::filled(dtype, &shape, None));
        }
        join(planes, true)
    }

    /// Concatenate arrays along their leading axis.
    pub fn concatenate(parts: &[ArrayData]) -> CubeResult<ArrayData> {
        if parts.is_empty() {
            return Err(CubeError::evaluation("nothing to concatenate"));
        }
        join(parts, false)
    }

    /// Pick entries along the leading axis.
    pub fn select_leading(&self, indices: &[usize]) -> ArrayData {
        match self {
            ArrayData::Bool(a) => ArrayData::Bool(a.select(Axis(0), indices)),
            ArrayData::Int(a) => ArrayData::Int(a.select(Axis(0), indices)),
            ArrayData::Float(a) => ArrayData::Float(a.select(Axis(0), indices)),
        }
    }
}

fn check_same_shape(expected: &[usize], actual: &[usize]) -> CubeResult<()> {
    if expected != actual {
        return Err(CubeError::evaluation(format!(
            "array shape {:?} does not match {:?}",
            actual, expected
        )));
    }
    Ok(())
}

fn copy_masked<A: Copy>(dst: &mut ArrayD<A>, src: &ArrayD<A>, mask: &ArrayD<bool>) {
    Zip::from(dst).and(src).and(mask).for_each(|d, &s, &m| {
        if m {
            *d = s;
        }
    });
}

fn join_views<A: Clone>(views: &[ArrayViewD<'_, A>], new_axis: bool) -> CubeResult<ArrayD<A>> {
    let joined = if new_axis {
        ndarray::stack(Axis(0), views)
    } else {
        ndarray::concatenate(Axis(0), views)
    };
    joined.map_err(|e| CubeError::evaluation(format!("cannot join arrays: {}", e)))
}

macro_rules! views_of {
    ($parts:expr, $variant:ident) => {
        $parts
            .iter()
            .map(|part| match part {
                ArrayData::$variant(a) => Ok(a.view()),
                other => Err(CubeError::evaluation(format!(
                    "cannot join {:?} array with {:?} arrays",
                    other.kind(),
                    DTypeKind::$variant
                ))),
            })
            .collect::<CubeResult<Vec<_>>>()
    };
}

fn join(parts: &[ArrayData], new_axis: bool) -> CubeResult<ArrayData> {
    match parts[0].kind() {
        DTypeKind::Bool => Ok(ArrayData::Bool(join_views(&views_of!(parts, Bool)?, new_axis)?)),
        DTypeKind::Int => Ok(ArrayData::Int(join_views(&views_of!(parts, Int)?, new_axis)?)),
        DTypeKind::Float => Ok(ArrayData::Float(join_views(&views_of!(parts, Float)?, new_axis)?)),
    }
}

/// One named band: its measurement metadata and its pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Band {
    pub measurement: Measurement,
    pub data: ArrayData,
}

impl Band {
    /// Pair data with its measurement; the representation must match the
    /// measurement's dtype.
    pub fn new(measurement: Measurement, data: ArrayData) -> CubeResult<Self> {
        if data.kind() != measurement.dtype.kind() {
            return Err(CubeError::evaluation(format!(
                "band '{}' declared {} but holds {:?} data",
                measurement.name,
                measurement.dtype,
                data.kind()
            )));
        }
        Ok(Self { measurement, data })
    }

    /// Band of `shape` holding only no-data.
    pub fn filled(measurement: Measurement, shape: &[usize]) -> Self {
        let data = ArrayData::filled(measurement.dtype, shape, measurement.nodata);
        Self { measurement, data }
    }

    pub fn name(&self) -> &str {
        &self.measurement.name
    }

    pub fn invalid_mask(&self) -> ArrayD<bool> {
        self.data.invalid_mask(self.measurement.nodata)
    }

    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.measurement.name = name.into();
        self
    }

    /// Cast to `measurement`'s dtype and adopt its metadata.
    pub fn conform(self, measurement: &Measurement) -> Band {
        let data = if self.measurement.dtype == measurement.dtype {
            self.data
        } else {
            self.data.cast(measurement.dtype)
        };
        Band {
            measurement: measurement.clone(),
            data,
        }
    }
}

/// A materialized `(time, y, x)` raster: the result of `fetch_data`.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterData {
    times: Vec<DateTime<Utc>>,
    geobox: GeoBox,
    bands: Vec<Band>,
}

impl RasterData {
    /// Raster with no bands yet.
    pub fn new(times: Vec<DateTime<Utc>>, geobox: GeoBox) -> Self {
        Self {
            times,
            geobox,
            bands: Vec::new(),
        }
    }

    /// Raster holding only no-data for every measurement.
    pub fn filled(times: Vec<DateTime<Utc>>, geobox: GeoBox, measurements: &Measurements) -> Self {
        let (height, width) = geobox.shape();
        let shape = [times.len(), height, width];
        let bands = measurements
            .iter()
            .map(|m| Band::filled(m.clone(), &shape))
            .collect();
        Self {
            times,
            geobox,
            bands,
        }
    }

    pub fn with_band(mut self, band: Band) -> CubeResult<Self> {
        self.insert_band(band)?;
        Ok(self)
    }

    /// Add a band, replacing one of the same name in place.
    pub fn insert_band(&mut self, band: Band) -> CubeResult<()> {
        check_same_shape(&self.shape(), band.data.shape())?;
        match self.bands.iter_mut().find(|b| b.name() == band.name()) {
            Some(existing) => *existing = band,
            None => self.bands.push(band),
        }
        Ok(())
    }

    pub fn band(&self, name: &str) -> Option<&Band> {
        self.bands.iter().find(|b| b.name() == name)
    }

    pub fn remove_band(&mut self, name: &str) -> Option<Band> {
        let index = self.bands.iter().position(|b| b.name() == name)?;
        Some(self.bands.remove(index))
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    pub fn into_bands(self) -> Vec<Band> {
        self.bands
    }

    pub fn times(&self) -> &[DateTime<Utc>] {
        &self.times
    }

    pub fn geobox(&self) -> &GeoBox {
        &self.geobox
    }

    pub fn measurements(&self) -> Measurements {
        self.bands.iter().map(|b| b.measurement.clone()).collect()
    }

    /// Expected band shape `[time, height, width]`.
    pub fn shape(&self) -> Vec<usize> {
        let (height, width) = self.geobox.shape();
        vec![self.times.len(), height, width]
    }

    /// Number of time steps.
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Same raster with bands rebuilt by `f`, keeping times and grid.
    pub fn map_bands<F>(self, mut f: F) -> CubeResult<Self>
    where
        F: FnMut(Band) -> CubeResult<Band>,
    {
        let mut result = RasterData::new(self.times, self.geobox);
        for band in self.bands {
            result.insert_band(f(band)?)?;
        }
        Ok(result)
    }

    /// Pick time steps by index.
    pub fn select_time(&self, indices: &[usize]) -> Self {
        Self {
            times: indices.iter().map(|&i| self.times[i]).collect(),
            geobox: self.geobox.clone(),
            bands: self
                .bands
                .iter()
                .map(|band| Band {
                    measurement: band.measurement.clone(),
                    data: band.data.select_leading(indices),
                })
                .collect(),
        }
    }

    /// Join rasters along time. All parts must carry the same bands; band
    /// order and metadata follow the first part.
    pub fn concat_time(parts: Vec<RasterData>) -> CubeResult<Self> {
        let mut parts = parts.into_iter();
        let first = parts
            .next()
            .ok_or_else(|| CubeError::evaluation("nothing to concatenate"))?;
        let rest: Vec<RasterData> = parts.collect();
        if rest.is_empty() {
            return Ok(first);
        }

        let mut times = first.times.clone();
        for part in &rest {
            times.extend_from_slice(&part.times);
        }

        let mut bands = Vec::with_capacity(first.bands.len());
        for band in &first.bands {
            let mut pieces = vec![band.data.clone()];
            for part in &rest {
                let other = part.band(band.name()).ok_or_else(|| {
                    CubeError::evaluation(format!(
                        "band '{}' missing from a time slice",
                        band.name()
                    ))
                })?;
                pieces.push(other.data.cast(band.measurement.dtype));
            }
            bands.push(Band {
                measurement: band.measurement.clone(),
                data: ArrayData::concatenate(&pieces)?,
            });
        }

        Ok(Self {
            times,
            geobox: first.geobox,
            bands,
        })
    }

    /// Union of the bands of two rasters over the same time steps.
    pub fn merge(mut self, other: RasterData) -> CubeResult<Self> {
        if self.times != other.times {
            return Err(CubeError::evaluation(format!(
                "cannot merge rasters over {} and {} time steps",
                self.times.len(),
                other.times.len()
            )));
        }
        let common: Vec<String> = other
            .bands
            .iter()
            .filter(|b| self.band(b.name()).is_some())
            .map(|b| b.name().to_string())
            .collect();
        if !common.is_empty() {
            return Err(CubeError::NameCollision(common));
        }
        for band in other.bands {
            self.insert_band(band)?;
        }
        Ok(self)
    }
}
