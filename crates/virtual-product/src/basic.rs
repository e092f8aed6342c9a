//! The leaf product: one stored product, optionally narrowed to a subset of
//! its measurements.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ndarray::Zip;
use tracing::debug;

use cube_common::{
    ArrayData, Band, CubeError, CubeResult, DatasetCatalog, DatasetRecord, GeoBox, Measurement,
    Measurements, ProductDefinitions, Query, RasterData, SearchRequest, StorageDriver,
    TimeGrouping,
};

use crate::node::{ProductSpec, RecipeNode};
use crate::pile::DatasetPile;
use crate::product::{sealed, VirtualProduct};
use crate::recipe::{RasterRecipe, RecipeLayout, Slot};
use crate::registry::{FuseFn, Named, PredicateFn};

#[derive(Debug, Clone)]
pub struct Basic {
    product: String,
    measurements: Option<Vec<String>>,
    dataset_predicate: Option<Named<PredicateFn>>,
    fuse_func: Option<Named<FuseFn>>,
    resampling: Option<String>,
    default_resampling: Option<String>,
    group_by: Option<TimeGrouping>,
    default_group_by: TimeGrouping,
}

impl Basic {
    /// All measurements of `product`, grouped by exact acquisition time.
    pub fn new(product: impl Into<String>) -> Self {
        Self {
            product: product.into(),
            measurements: None,
            dataset_predicate: None,
            fuse_func: None,
            resampling: None,
            default_resampling: None,
            group_by: None,
            default_group_by: TimeGrouping::Time,
        }
    }

    /// Restrict the output to `names`, in that order.
    pub fn with_measurements<I, S>(mut self, names: I) -> CubeResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(CubeError::EmptyMeasurementSet(self.product));
        }
        self.measurements = Some(names);
        Ok(self)
    }

    pub fn with_predicate(mut self, predicate: Named<PredicateFn>) -> Self {
        self.dataset_predicate = Some(predicate);
        self
    }

    pub fn with_fuser(mut self, fuser: Named<FuseFn>) -> Self {
        self.fuse_func = Some(fuser);
        self
    }

    pub fn with_resampling(mut self, resampling: impl Into<String>) -> Self {
        self.resampling = Some(resampling.into());
        self
    }

    pub fn with_group_by(mut self, group_by: TimeGrouping) -> Self {
        self.group_by = Some(group_by);
        self
    }

    /// Fallbacks for settings the recipe leaves out. They are not part of
    /// the reconstructed recipe.
    pub fn with_defaults(mut self, group_by: TimeGrouping, resampling: Option<String>) -> Self {
        self.default_group_by = group_by;
        self.default_resampling = resampling;
        self
    }

    pub fn product(&self) -> &str {
        &self.product
    }

    pub fn group_by(&self) -> TimeGrouping {
        self.group_by.unwrap_or(self.default_group_by)
    }

    fn select_measurements(&self, declared: &Measurements) -> CubeResult<Measurements> {
        let names = match &self.measurements {
            None => return Ok(declared.clone()),
            Some(names) => names,
        };

        let mut selected = Measurements::new();
        for name in names {
            let measurement = declared.resolve(name).ok_or_else(|| {
                CubeError::missing_input(format!(
                    "measurement '{}' not found in product '{}'",
                    name, self.product
                ))
            })?;
            if measurement.name == *name {
                selected.insert(measurement.clone());
            } else {
                // Requested by alias; the canonical name stays reachable for storage.
                let mut aliased = measurement.renamed(name.clone());
                aliased.aliases = vec![measurement.name.clone()];
                selected.insert(aliased);
            }
        }
        Ok(selected)
    }

    fn fuse_slot(
        &self,
        datasets: &[DatasetRecord],
        measurement: &Measurement,
        geobox: &GeoBox,
        resampling: Option<&str>,
        storage: &dyn StorageDriver,
    ) -> CubeResult<ArrayData> {
        let (height, width) = geobox.shape();
        let mut plane = ArrayData::filled(measurement.dtype, &[height, width], measurement.nodata);

        for dataset in datasets {
            let read = storage.read(dataset, measurement, geobox, resampling)?;
            if read.shape() != [height, width] {
                return Err(CubeError::Storage(format!(
                    "dataset {} returned a {:?} plane for '{}', expected [{}, {}]",
                    dataset.id,
                    read.shape(),
                    measurement.name,
                    height,
                    width
                )));
            }
            let read = read.cast(measurement.dtype);
            match &self.fuse_func {
                Some(fuser) => (fuser.func)(&mut plane, &read, measurement)?,
                None => fuse_first_valid(&mut plane, &read, measurement)?,
            }
        }

        Ok(plane)
    }
}

impl sealed::Sealed for Basic {}

impl VirtualProduct for Basic {
    fn output_measurements(&self, definitions: &ProductDefinitions) -> CubeResult<Measurements> {
        let definition = definitions.get(&self.product).ok_or_else(|| {
            CubeError::missing_input(format!("product '{}' not found", self.product))
        })?;
        self.select_measurements(&definition.measurements)
    }

    fn find_datasets(&self, catalog: &dyn DatasetCatalog, query: &Query) -> CubeResult<DatasetPile> {
        let definitions = catalog.product_definitions()?;
        let measurements = self.output_measurements(&definitions)?;

        let request = SearchRequest {
            product: &self.product,
            query,
            measurements: self.measurements.as_deref(),
            predicate: self.dataset_predicate.as_ref().map(|predicate| &*predicate.func),
        };
        let result = catalog.search(&request)?;

        let found = result.datasets.len();
        let datasets: Vec<DatasetRecord> = match &self.dataset_predicate {
            Some(predicate) => result
                .datasets
                .into_iter()
                .filter(|dataset| (predicate.func)(dataset))
                .collect(),
            None => result.datasets,
        };

        debug!(
            product = %self.product,
            found = found,
            kept = datasets.len(),
            "Found datasets"
        );

        Ok(DatasetPile::basic(datasets, result.geobox, measurements))
    }

    fn build_raster(&self, pile: &DatasetPile, query: &Query) -> CubeResult<RasterRecipe> {
        let group_by = self.group_by();
        let mut buckets: BTreeMap<DateTime<Utc>, Vec<DatasetRecord>> = BTreeMap::new();

        let mut datasets: Vec<&DatasetRecord> = pile
            .basic_datasets()?
            .iter()
            .filter(|dataset| query.matches(dataset))
            .collect();
        datasets.sort_by_key(|dataset| dataset.time);

        for dataset in datasets {
            buckets
                .entry(group_by.bucket(dataset.time, &dataset.bbox))
                .or_default()
                .push(dataset.clone());
        }

        let resampling = self
            .resampling
            .clone()
            .or_else(|| query.resampling.clone())
            .or_else(|| self.default_resampling.clone());

        debug!(
            product = %self.product,
            group_by = %group_by,
            time_steps = buckets.len(),
            "Built raster recipe"
        );

        let (times, slots): (Vec<_>, Vec<_>) = buckets
            .into_iter()
            .map(|(time, datasets)| (time, Slot::Basic(datasets)))
            .unzip();
        let layout = RecipeLayout::leaf(pile.geobox.clone(), pile.measurements.clone())
            .with_resampling(resampling);
        RasterRecipe::new(layout, times, slots)
    }

    fn fetch_data(&self, recipe: &RasterRecipe, storage: &dyn StorageDriver) -> CubeResult<RasterData> {
        let empty: &[DatasetRecord] = &[];
        let slots = recipe
            .slots()
            .iter()
            .map(|slot| match slot {
                Slot::Basic(datasets) => Ok(datasets.as_slice()),
                Slot::Empty => Ok(empty),
                other => Err(CubeError::recipe(format!(
                    "product '{}' cannot fetch a {} slot",
                    self.product,
                    other.kind_name()
                ))),
            })
            .collect::<CubeResult<Vec<_>>>()?;

        let geobox = recipe.geobox();
        let (height, width) = geobox.shape();
        let resampling = recipe.layout().resampling.as_deref();
        let mut raster = RasterData::new(recipe.times().to_vec(), geobox.clone());

        for measurement in recipe.measurements() {
            let planes = slots
                .iter()
                .map(|datasets| self.fuse_slot(datasets, measurement, geobox, resampling, storage))
                .collect::<CubeResult<Vec<_>>>()?;
            let data = ArrayData::stack(measurement.dtype, &planes, &[height, width])?;
            raster.insert_band(Band::new(measurement.clone(), data)?)?;
        }

        debug!(
            product = %self.product,
            time_steps = recipe.len(),
            bands = raster.bands().len(),
            "Fetched data"
        );

        Ok(raster)
    }

    fn reconstruct(&self) -> RecipeNode {
        RecipeNode::Product(ProductSpec {
            product: self.product.clone(),
            measurements: self.measurements.clone(),
            dataset_predicate: self.dataset_predicate.as_ref().map(|p| p.name.clone()),
            fuse_func: self.fuse_func.as_ref().map(|f| f.name.clone()),
            resampling: self.resampling.clone(),
            group_by: self.group_by.map(|g| g.as_str().to_string()),
        })
    }
}

/// Earlier datasets win; later ones only fill pixels still holding no-data.
/// Boolean planes are combined with a logical OR.
pub(crate) fn fuse_first_valid(
    dest: &mut ArrayData,
    src: &ArrayData,
    measurement: &Measurement,
) -> CubeResult<()> {
    if let (ArrayData::Bool(dest), ArrayData::Bool(src)) = (&mut *dest, src) {
        Zip::from(dest).and(src).for_each(|d, &s| *d = *d || s);
        return Ok(());
    }

    let nodata = measurement.nodata;
    let mut fill = dest.invalid_mask(nodata);
    let src_invalid = src.invalid_mask(nodata);
    Zip::from(&mut fill)
        .and(&src_invalid)
        .for_each(|f, &invalid| *f = *f && !invalid);
    dest.copy_where(&fill, src)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use cube_common::{BoundingBox, DType, ProductDefinition};
    use ndarray::arr2;

    fn definitions() -> ProductDefinitions {
        let measurements: Measurements = vec![
            Measurement::new("red", DType::Int16).with_nodata(-999.0),
            Measurement::new("nir", DType::Int16)
                .with_nodata(-999.0)
                .with_aliases(["near_infrared"]),
            Measurement::new("fmask", DType::UInt8).with_nodata(0.0),
        ]
        .into_iter()
        .collect();
        let mut definitions = ProductDefinitions::new();
        definitions.insert("ls8".into(), ProductDefinition::new("ls8", measurements));
        definitions
    }

    #[test]
    fn test_measurement_subset_in_request_order() {
        let product = Basic::new("ls8").with_measurements(["nir", "red"]).unwrap();
        let measurements = product.output_measurements(&definitions()).unwrap();
        assert_eq!(measurements.names(), vec!["nir", "red"]);
    }

    #[test]
    fn test_alias_selection() {
        let product = Basic::new("ls8").with_measurements(["near_infrared"]).unwrap();
        let measurements = product.output_measurements(&definitions()).unwrap();
        let selected = measurements.get("near_infrared").unwrap();
        assert_eq!(selected.dtype, DType::Int16);
        assert!(selected.answers_to("nir"));
    }

    #[test]
    fn test_unknown_names() {
        let product = Basic::new("ls8").with_measurements(["swir3"]).unwrap();
        assert!(matches!(
            product.output_measurements(&definitions()),
            Err(CubeError::MissingInput(message)) if message.contains("swir3")
        ));
        assert!(matches!(
            Basic::new("ls5").output_measurements(&definitions()),
            Err(CubeError::MissingInput(_))
        ));
    }

    #[test]
    fn test_empty_subset_rejected_at_construction() {
        let result = Basic::new("ls8").with_measurements(Vec::<String>::new());
        assert!(matches!(result, Err(CubeError::EmptyMeasurementSet(name)) if name == "ls8"));
    }

    #[test]
    fn test_fuse_first_valid_keeps_earlier_pixels() {
        let measurement = Measurement::new("red", DType::Int16).with_nodata(-999.0);
        let mut dest = ArrayData::Int(arr2(&[[1, -999], [-999, 4]]).into_dyn());
        let src = ArrayData::Int(arr2(&[[9, 9], [-999, 9]]).into_dyn());
        fuse_first_valid(&mut dest, &src, &measurement).unwrap();
        assert_eq!(dest, ArrayData::Int(arr2(&[[1, 9], [-999, 4]]).into_dyn()));
    }

    #[test]
    fn test_fuse_bool_is_logical_or() {
        let measurement = Measurement::new("cloud", DType::Bool);
        let mut dest = ArrayData::Bool(arr2(&[[true, false]]).into_dyn());
        let src = ArrayData::Bool(arr2(&[[false, true]]).into_dyn());
        fuse_first_valid(&mut dest, &src, &measurement).unwrap();
        assert_eq!(dest, ArrayData::Bool(arr2(&[[true, true]]).into_dyn()));
    }

    #[test]
    fn test_build_raster_groups_by_day() {
        let geobox = GeoBox::new("EPSG:4326", 2, 2, BoundingBox::new(0.0, 0.0, 2.0, 2.0));
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        let datasets = vec![
            DatasetRecord::new("ls8", Utc.with_ymd_and_hms(2021, 1, 2, 10, 0, 0).unwrap(), bbox),
            DatasetRecord::new("ls8", Utc.with_ymd_and_hms(2021, 1, 1, 10, 0, 0).unwrap(), bbox),
            DatasetRecord::new("ls8", Utc.with_ymd_and_hms(2021, 1, 1, 10, 1, 0).unwrap(), bbox),
        ];
        let measurements = definitions()["ls8"].measurements.clone();
        let pile = DatasetPile::basic(datasets, geobox, measurements);

        let product = Basic::new("ls8").with_group_by(TimeGrouping::Day);
        let recipe = product.build_raster(&pile, &Query::new()).unwrap();

        assert_eq!(
            recipe.times(),
            &[
                Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2021, 1, 2, 0, 0, 0).unwrap(),
            ]
        );
        assert_eq!(recipe.slots()[0].dataset_count(), 2);
        assert_eq!(recipe.slots()[1].dataset_count(), 1);
    }

    #[test]
    fn test_reconstruct_omits_defaults() {
        let product = Basic::new("ls8").with_defaults(TimeGrouping::Day, Some("bilinear".into()));
        assert_eq!(
            product.reconstruct(),
            RecipeNode::Product(ProductSpec {
                product: "ls8".into(),
                ..ProductSpec::default()
            })
        );
        assert_eq!(product.group_by(), TimeGrouping::Day);
    }
}
