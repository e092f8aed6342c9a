//! `rename` and `select`: change measurement names or pick a subset.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;

use cube_common::{CubeError, CubeResult, Measurements, RasterData};

use super::{parse_args, targets, to_args};
use crate::transform::Transformation;

pub const RENAME_QUALIFIED_NAME: &str = "virtual_product::transforms::Rename";
pub const SELECT_QUALIFIED_NAME: &str = "virtual_product::transforms::Select";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RenameArgs {
    measurement_names: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct Rename {
    args: RenameArgs,
}

impl Rename {
    /// Rename according to `old -> new` pairs; unlisted bands keep their names.
    pub fn new<I, K, V>(names: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            args: RenameArgs {
                measurement_names: names
                    .into_iter()
                    .map(|(old, new)| (old.into(), new.into()))
                    .collect(),
            },
        }
    }

    pub fn from_args(args: &Mapping) -> CubeResult<Self> {
        Ok(Self {
            args: parse_args("rename", args)?,
        })
    }

    fn new_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.args
            .measurement_names
            .get(name)
            .map_or(name, String::as_str)
    }
}

impl Transformation for Rename {
    fn measurements(&self, input: &Measurements) -> CubeResult<Measurements> {
        let renamed: Vec<String> = self.args.measurement_names.keys().cloned().collect();
        targets(input, Some(renamed.as_slice()), "rename")?;

        let mut seen = BTreeSet::new();
        let mut common = BTreeSet::new();
        let mut output = Measurements::new();
        for measurement in input {
            let name = self.new_name(&measurement.name);
            if !seen.insert(name.to_string()) {
                common.insert(name.to_string());
            }
            output.insert(measurement.renamed(name));
        }
        if !common.is_empty() {
            return Err(CubeError::NameCollision(common.into_iter().collect()));
        }
        Ok(output)
    }

    fn compute(&self, data: RasterData) -> CubeResult<RasterData> {
        self.measurements(&data.measurements())?;
        data.map_bands(|band| {
            let name = self.new_name(band.name()).to_string();
            Ok(band.renamed(name))
        })
    }

    fn name(&self) -> &str {
        RENAME_QUALIFIED_NAME
    }

    fn settings(&self) -> Mapping {
        to_args(&self.args)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct SelectArgs {
    measurement_names: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Select {
    args: SelectArgs,
}

impl Select {
    pub fn new<I, S>(names: I) -> CubeResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::checked(SelectArgs {
            measurement_names: names.into_iter().map(Into::into).collect(),
        })
    }

    pub fn from_args(args: &Mapping) -> CubeResult<Self> {
        Self::checked(parse_args("select", args)?)
    }

    fn checked(args: SelectArgs) -> CubeResult<Self> {
        if args.measurement_names.is_empty() {
            return Err(CubeError::recipe("select needs at least one measurement"));
        }
        Ok(Self { args })
    }
}

impl Transformation for Select {
    fn measurements(&self, input: &Measurements) -> CubeResult<Measurements> {
        let names = targets(input, Some(self.args.measurement_names.as_slice()), "select")?;
        Ok(names
            .iter()
            .filter_map(|name| input.get(name).cloned())
            .collect())
    }

    fn compute(&self, mut data: RasterData) -> CubeResult<RasterData> {
        self.measurements(&data.measurements())?;
        let mut result = RasterData::new(data.times().to_vec(), data.geobox().clone());
        for name in &self.args.measurement_names {
            if let Some(band) = data.remove_band(name) {
                result.insert_band(band)?;
            }
        }
        Ok(result)
    }

    fn name(&self) -> &str {
        SELECT_QUALIFIED_NAME
    }

    fn settings(&self) -> Mapping {
        to_args(&self.args)
    }
}
