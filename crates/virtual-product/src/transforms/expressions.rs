//! Band math: outputs defined by formulas over the input measurements.
//!
//! ```yaml
//! transform: expressions
//! output:
//!   ndvi:
//!     formula: (nir - red) / (nir + red)
//!     dtype: float32
//!   water: water          # copied unchanged, renamed to the key
//! masked: true
//! ```
//!
//! Formula outputs are masked by default: any pixel whose value depends on
//! a no-data input pixel becomes no-data in the output.

use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;

use cube_common::{
    ArrayData, Band, CubeError, CubeResult, DType, Measurement, Measurements, RasterData,
};
use cube_formula::Formula;

use super::{default_true, parse_args};
use crate::transform::Transformation;

pub const QUALIFIED_NAME: &str = "virtual_product::transforms::Expressions";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FormulaSpec {
    pub formula: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dtype: Option<DType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodata: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub masked: Option<bool>,
}

/// One output: a copy of an input measurement or a formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputSpec {
    Copy(String),
    Formula(FormulaSpec),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExpressionsArgs {
    output: Mapping,
    #[serde(default = "default_true")]
    masked: bool,
}

#[derive(Debug, Clone)]
enum Output {
    Copy(String),
    Formula { formula: Formula, spec: FormulaSpec },
}

#[derive(Debug, Clone)]
pub struct Expressions {
    outputs: Vec<(String, Output)>,
    masked: bool,
}

impl Expressions {
    /// Outputs in the given order; formulas are parsed here.
    pub fn new<I, S>(outputs: I) -> CubeResult<Self>
    where
        I: IntoIterator<Item = (S, OutputSpec)>,
        S: Into<String>,
    {
        let outputs = outputs
            .into_iter()
            .map(|(name, spec)| -> CubeResult<(String, Output)> {
                let output = match spec {
                    OutputSpec::Copy(source) => Output::Copy(source),
                    OutputSpec::Formula(spec) => Output::Formula {
                        formula: Formula::parse(&spec.formula)?,
                        spec,
                    },
                };
                Ok((name.into(), output))
            })
            .collect::<CubeResult<Vec<_>>>()?;
        if outputs.is_empty() {
            return Err(CubeError::recipe("expressions needs at least one output"));
        }
        Ok(Self {
            outputs,
            masked: true,
        })
    }

    /// Default masking for outputs that do not set `masked` themselves.
    pub fn with_masked(mut self, masked: bool) -> Self {
        self.masked = masked;
        self
    }

    pub fn from_args(args: &Mapping) -> CubeResult<Self> {
        let args: ExpressionsArgs = parse_args("expressions", args)?;
        let mut outputs = Vec::with_capacity(args.output.len());
        for (key, value) in args.output {
            let name = key
                .as_str()
                .ok_or_else(|| CubeError::recipe("expression output names must be strings"))?
                .to_string();
            let spec: OutputSpec = serde_yaml::from_value(value).map_err(|e| {
                CubeError::recipe(format!("invalid definition of output '{}': {}", name, e))
            })?;
            outputs.push((name, spec));
        }
        Ok(Self::new(outputs)?.with_masked(args.masked))
    }

    fn output_measurement(&self, name: &str, output: &Output, input: &Measurements) -> CubeResult<Measurement> {
        match output {
            Output::Copy(source) => input
                .get(source)
                .map(|measurement| measurement.renamed(name))
                .ok_or_else(|| {
                    CubeError::missing_input(format!(
                        "output '{}' copies unknown measurement '{}'",
                        name, source
                    ))
                }),
            Output::Formula { formula, spec } => {
                let inferred = formula.infer_dtype(input)?;
                let dtype = spec.dtype.unwrap_or(inferred);
                let masked = spec.masked.unwrap_or(self.masked);
                let mut measurement = Measurement::new(name, dtype);
                measurement.nodata = resolve_nodata(name, dtype, spec.nodata, masked)?;
                if let Some(units) = &spec.units {
                    measurement.units = units.clone();
                }
                Ok(measurement)
            }
        }
    }
}

/// No-data value of a formula output.
fn resolve_nodata(name: &str, dtype: DType, declared: Option<f64>, masked: bool) -> CubeResult<Option<f64>> {
    if dtype.is_bool() {
        return Ok(None);
    }
    if let Some(value) = declared {
        if !dtype.can_hold(value) {
            return Err(CubeError::no_data_policy(
                name,
                format!("nodata {} does not fit a {} output", value, dtype),
            ));
        }
        return Ok(declared);
    }
    if !masked {
        return Ok(None);
    }
    if dtype.is_float() {
        return Ok(Some(f64::NAN));
    }
    Err(CubeError::no_data_policy(
        name,
        format!("masked {} output needs an explicit nodata value", dtype),
    ))
}

fn broadcast_to(data: ArrayData, shape: &[usize]) -> CubeResult<ArrayData> {
    if data.shape() == shape {
        return Ok(data);
    }
    let error = || {
        CubeError::evaluation(format!(
            "formula result of shape {:?} does not fit bands of shape {:?}",
            data.shape(),
            shape
        ))
    };
    let target = IxDyn(shape);
    let broadcast = match &data {
        ArrayData::Bool(a) => a.broadcast(target).map(|v| ArrayData::Bool(v.to_owned())),
        ArrayData::Int(a) => a.broadcast(target).map(|v| ArrayData::Int(v.to_owned())),
        ArrayData::Float(a) => a.broadcast(target).map(|v| ArrayData::Float(v.to_owned())),
    };
    broadcast.ok_or_else(error)
}

fn broadcast_mask(mask: ArrayD<bool>, shape: &[usize]) -> CubeResult<ArrayD<bool>> {
    if mask.shape() == shape {
        return Ok(mask);
    }
    mask.broadcast(IxDyn(shape))
        .map(|view| view.to_owned())
        .ok_or_else(|| {
            CubeError::evaluation(format!(
                "validity mask of shape {:?} does not fit bands of shape {:?}",
                mask.shape(),
                shape
            ))
        })
}

impl Transformation for Expressions {
    fn measurements(&self, input: &Measurements) -> CubeResult<Measurements> {
        self.outputs
            .iter()
            .map(|(name, output)| self.output_measurement(name, output, input))
            .collect()
    }

    fn compute(&self, data: RasterData) -> CubeResult<RasterData> {
        let input = data.measurements();
        let shape = data.shape();
        let mut result = RasterData::new(data.times().to_vec(), data.geobox().clone());

        for (name, output) in &self.outputs {
            let measurement = self.output_measurement(name, output, &input)?;
            let band = match output {
                Output::Copy(source) => data
                    .band(source)
                    .cloned()
                    .ok_or_else(|| {
                        CubeError::missing_input(format!("measurement '{}' not loaded", source))
                    })?
                    .renamed(name.clone()),
                Output::Formula { formula, spec } => {
                    let value = formula.evaluate(&data)?;
                    let mut values = broadcast_to(value.data.cast(measurement.dtype), &shape)?;
                    if spec.masked.unwrap_or(self.masked) {
                        let invalid = broadcast_mask(formula.invalid_mask(&data)?, &shape)?;
                        let fill = if measurement.dtype.is_bool() {
                            0.0
                        } else {
                            measurement.nodata.unwrap_or(f64::NAN)
                        };
                        values.fill_where(&invalid, fill)?;
                    }
                    Band::new(measurement, values)?
                }
            };
            result.insert_band(band)?;
        }

        Ok(result)
    }

    fn name(&self) -> &str {
        QUALIFIED_NAME
    }

    fn settings(&self) -> Mapping {
        let mut output = Mapping::new();
        for (name, spec) in &self.outputs {
            let value = match spec {
                Output::Copy(source) => source.clone().into(),
                Output::Formula { spec, .. } => {
                    serde_yaml::to_value(spec).unwrap_or_else(|_| spec.formula.clone().into())
                }
            };
            output.insert(name.clone().into(), value);
        }
        let mut settings = Mapping::new();
        settings.insert("output".into(), output.into());
        if !self.masked {
            settings.insert("masked".into(), false.into());
        }
        settings
    }
}
