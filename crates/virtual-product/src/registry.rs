//! Named functions and transformations that recipes may refer to.
//!
//! Recipes are plain data; anything executable they mention is looked up in
//! a [`Registry`] by namespace and name. Registries are cheap to clone, so a
//! caller can extend a copy for one resolution without affecting others.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Datelike, TimeZone, Utc};
use cube_common::{
    ArrayData, CubeError, CubeResult, DatasetRecord, Measurement,
};
use serde_yaml::Mapping;

use crate::transform::Transformation;
use crate::transforms;

/// Builds a transformation from the remaining keys of a `transform` recipe.
pub type TransformFactory =
    Arc<dyn Fn(&Mapping) -> CubeResult<Box<dyn Transformation>> + Send + Sync>;

/// Keeps or drops one dataset record.
pub type PredicateFn = Arc<dyn Fn(&DatasetRecord) -> bool + Send + Sync>;

/// Folds the plane read from one dataset into the plane of its time slot.
pub type FuseFn = Arc<dyn Fn(&mut ArrayData, &ArrayData, &Measurement) -> CubeResult<()> + Send + Sync>;

/// Maps a timestamp to the label of its aggregation group.
pub type GroupByFn = Arc<dyn Fn(DateTime<Utc>) -> DateTime<Utc> + Send + Sync>;

/// Reduces the valid values of one pixel's time series.
pub type AggregationFn = Arc<dyn Fn(&[f64]) -> f64 + Send + Sync>;

/// A registered function together with the name it was looked up by.
#[derive(Clone)]
pub struct Named<F> {
    pub name: String,
    pub func: F,
}

impl<F> Named<F> {
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> fmt::Debug for Named<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.name)
    }
}

#[derive(Clone)]
struct TransformEntry {
    qualified_name: String,
    factory: TransformFactory,
}

#[derive(Clone)]
pub struct Registry {
    transforms: BTreeMap<String, TransformEntry>,
    aggregations: BTreeMap<String, AggregationFn>,
    group_by: BTreeMap<String, GroupByFn>,
    predicates: BTreeMap<String, PredicateFn>,
    fusers: BTreeMap<String, FuseFn>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("transforms", &self.transforms.keys().collect::<Vec<_>>())
            .field("aggregations", &self.aggregations.keys().collect::<Vec<_>>())
            .field("group_by", &self.group_by.keys().collect::<Vec<_>>())
            .field("predicates", &self.predicates.keys().collect::<Vec<_>>())
            .field("fusers", &self.fusers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Registry {
    /// A registry with nothing in it.
    pub fn empty() -> Self {
        Self {
            transforms: BTreeMap::new(),
            aggregations: BTreeMap::new(),
            group_by: BTreeMap::new(),
            predicates: BTreeMap::new(),
            fusers: BTreeMap::new(),
        }
    }

    /// The built-in transformations, fusers, groupings and aggregations.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        transforms::register_builtins(&mut registry);

        registry.register_fuser("first_valid", Arc::new(crate::basic::fuse_first_valid));
        registry.register_fuser("last_valid", Arc::new(fuse_last_valid));

        registry.register_group_by("time", Arc::new(|t: DateTime<Utc>| t));
        registry.register_group_by("day", Arc::new(|t: DateTime<Utc>| {
            floor_to(t.year(), t.month(), t.day()).unwrap_or(t)
        }));
        registry.register_group_by("month", Arc::new(|t: DateTime<Utc>| {
            floor_to(t.year(), t.month(), 1).unwrap_or(t)
        }));
        registry.register_group_by("year", Arc::new(|t: DateTime<Utc>| {
            floor_to(t.year(), 1, 1).unwrap_or(t)
        }));

        registry.register_aggregation("mean", Arc::new(|values: &[f64]| {
            if values.is_empty() {
                f64::NAN
            } else {
                values.iter().sum::<f64>() / values.len() as f64
            }
        }));
        registry.register_aggregation("min", Arc::new(|values: &[f64]| {
            values.iter().copied().fold(f64::NAN, f64::min)
        }));
        registry.register_aggregation("max", Arc::new(|values: &[f64]| {
            values.iter().copied().fold(f64::NAN, f64::max)
        }));
        registry.register_aggregation("sum", Arc::new(|values: &[f64]| values.iter().sum()));

        registry
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Register a transformation under a short name and a qualified name.
    pub fn register_transform(
        &mut self,
        name: impl Into<String>,
        qualified_name: impl Into<String>,
        factory: TransformFactory,
    ) {
        self.transforms.insert(
            name.into(),
            TransformEntry {
                qualified_name: qualified_name.into(),
                factory,
            },
        );
    }

    pub fn register_predicate(&mut self, name: impl Into<String>, predicate: PredicateFn) {
        self.predicates.insert(name.into(), predicate);
    }

    pub fn register_fuser(&mut self, name: impl Into<String>, fuser: FuseFn) {
        self.fusers.insert(name.into(), fuser);
    }

    pub fn register_group_by(&mut self, name: impl Into<String>, group_by: GroupByFn) {
        self.group_by.insert(name.into(), group_by);
    }

    pub fn register_aggregation(&mut self, name: impl Into<String>, aggregation: AggregationFn) {
        self.aggregations.insert(name.into(), aggregation);
    }

    pub fn with_transform(
        mut self,
        name: impl Into<String>,
        qualified_name: impl Into<String>,
        factory: TransformFactory,
    ) -> Self {
        self.register_transform(name, qualified_name, factory);
        self
    }

    pub fn with_predicate<F>(mut self, name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&DatasetRecord) -> bool + Send + Sync + 'static,
    {
        self.register_predicate(name, Arc::new(predicate));
        self
    }

    pub fn with_fuser<F>(mut self, name: impl Into<String>, fuser: F) -> Self
    where
        F: Fn(&mut ArrayData, &ArrayData, &Measurement) -> CubeResult<()> + Send + Sync + 'static,
    {
        self.register_fuser(name, Arc::new(fuser));
        self
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Factory for a transformation, by short name first, then by
    /// qualified name.
    pub fn transform(&self, name: &str) -> CubeResult<&TransformFactory> {
        self.transforms
            .get(name)
            .or_else(|| {
                self.transforms
                    .values()
                    .find(|entry| entry.qualified_name == name)
            })
            .map(|entry| &entry.factory)
            .ok_or_else(|| CubeError::recipe(format!("unknown transform '{}'", name)))
    }

    /// Qualified name registered for a short transformation name.
    pub fn qualified_transform_name(&self, name: &str) -> Option<&str> {
        self.transforms.get(name).map(|entry| entry.qualified_name.as_str())
    }

    pub fn predicate(&self, name: &str) -> CubeResult<Named<PredicateFn>> {
        lookup(&self.predicates, "dataset_predicate", name)
    }

    pub fn fuser(&self, name: &str) -> CubeResult<Named<FuseFn>> {
        lookup(&self.fusers, "fuse_func", name)
    }

    pub fn group_by(&self, name: &str) -> CubeResult<Named<GroupByFn>> {
        lookup(&self.group_by, "group_by", name)
    }

    pub fn aggregation(&self, name: &str) -> CubeResult<Named<AggregationFn>> {
        lookup(&self.aggregations, "aggregate", name)
    }
}

fn lookup<F: Clone>(table: &BTreeMap<String, F>, namespace: &str, name: &str) -> CubeResult<Named<F>> {
    table
        .get(name)
        .map(|func| Named::new(name, func.clone()))
        .ok_or_else(|| CubeError::recipe(format!("unknown {} '{}'", namespace, name)))
}

fn floor_to(year: i32, month: u32, day: u32) -> Option<DateTime<Utc>> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).single()
}

/// Later datasets overwrite earlier ones wherever they hold valid data.
fn fuse_last_valid(dest: &mut ArrayData, src: &ArrayData, measurement: &Measurement) -> CubeResult<()> {
    if measurement.dtype.is_bool() {
        *dest = src.clone();
        return Ok(());
    }
    let valid = src.invalid_mask(measurement.nodata).mapv(|invalid| !invalid);
    dest.copy_where(&valid, src)
}
