//! Integration tests: searching, grouping and fetching combinator trees
//! against the in-memory catalog and storage.

use cube_common::{
    ArrayData, DType, DatasetCatalog, DatasetRecord, Measurement, Measurements, ProductDefinition,
    Query, RasterData, TimeGrouping, TimeRange,
};
use ndarray::arr3;
use test_utils::{
    at, create_constant_plane, create_plane_with_nodata, day, product_definitions, products,
    tile_footprint, tile_geobox, MemoryCatalog, MemoryStorage,
};
use virtual_product::{
    load, Basic, BoxedProduct, Collate, Juxtapose, LoadConfig, Resolver, Slot, VirtualProduct,
};

/// Three Landsat-like and two pixel quality datasets plus one Sentinel-2-like.
struct Scene {
    catalog: MemoryCatalog,
    storage: MemoryStorage,
}

fn scene() -> Scene {
    let ls8 = |d: u32| DatasetRecord::new(products::LS8, day(2021, 3, d), tile_footprint());
    let ls8_day1 = ls8(1);
    let ls8_day5 = ls8(5);
    let s2_day3 = DatasetRecord::new(products::S2, day(2021, 3, 3), tile_footprint());
    let pq_day1 = DatasetRecord::new(products::PQ, day(2021, 3, 1), tile_footprint());
    let pq_day3 = DatasetRecord::new(products::PQ, day(2021, 3, 3), tile_footprint());

    let storage = MemoryStorage::new()
        .with_plane(&ls8_day1, "red", create_constant_plane(3, 2, 100))
        .with_plane(&ls8_day5, "red", create_constant_plane(3, 2, 500))
        .with_plane(&s2_day3, "red", create_constant_plane(3, 2, 300))
        .with_plane(&pq_day1, "pixelquality", create_constant_plane(3, 2, 0))
        .with_plane(&pq_day3, "pixelquality", create_constant_plane(3, 2, 1));

    let catalog = MemoryCatalog::new()
        .with_products(product_definitions())
        .with_dataset(ls8_day1)
        .with_dataset(ls8_day5)
        .with_dataset(s2_day3)
        .with_dataset(pq_day1)
        .with_dataset(pq_day3);

    Scene { catalog, storage }
}

fn red_of(product: &str) -> BoxedProduct {
    Box::new(Basic::new(product).with_measurements(["red"]).unwrap())
}

fn constant(value: i64) -> [[i64; 3]; 2] {
    [[value; 3]; 2]
}

fn stack(planes: &[[[i64; 3]; 2]]) -> ArrayData {
    ArrayData::Int(arr3(planes).into_dyn())
}

// =============================================================================
// Collate
// =============================================================================

#[test]
fn test_collate_interleaves_sources_in_time() {
    test_utils::init_tracing();
    let Scene { catalog, storage } = scene();
    let product = Collate::new(vec![red_of(products::LS8), red_of(products::S2)])
        .unwrap()
        .with_index_measurement("source");

    let data = load(&product, &catalog, &storage, &Query::new(), &LoadConfig::default()).unwrap();

    assert_eq!(data.times(), &[day(2021, 3, 1), day(2021, 3, 3), day(2021, 3, 5)]);
    assert_eq!(
        data.band("red").unwrap().data,
        stack(&[constant(100), constant(300), constant(500)])
    );
    assert_eq!(
        data.band("source").unwrap().data,
        stack(&[constant(0), constant(1), constant(0)])
    );
}

#[test]
fn test_collate_recipe_tags_one_source_per_step() {
    let Scene { catalog, .. } = scene();
    let product = Collate::new(vec![red_of(products::LS8), red_of(products::S2)]).unwrap();

    let query = Query::new();
    let pile = product.find_datasets(&catalog, &query).unwrap();
    assert_eq!(pile.dataset_count(), 3);

    let recipe = product.build_raster(&pile, &query).unwrap();
    let tags: Vec<usize> = recipe
        .slots()
        .iter()
        .map(|slot| match slot {
            Slot::Collate(tagged) => tagged.iter().position(Option::is_some).unwrap(),
            other => panic!("unexpected slot {:?}", other),
        })
        .collect();
    assert_eq!(tags, vec![0, 1, 0]);
}

// =============================================================================
// Juxtapose
// =============================================================================

#[test]
fn test_juxtapose_pads_missing_times_with_nodata() {
    let Scene { catalog, storage } = scene();
    let product = Juxtapose::new(vec![red_of(products::LS8), Box::new(Basic::new(products::PQ)) as BoxedProduct])
        .unwrap();

    let data = load(&product, &catalog, &storage, &Query::new(), &LoadConfig::default()).unwrap();

    assert_eq!(data.times(), &[day(2021, 3, 1), day(2021, 3, 3), day(2021, 3, 5)]);
    assert_eq!(data.measurements().names(), vec!["red", "pixelquality"]);
    assert_eq!(
        data.band("red").unwrap().data,
        stack(&[constant(100), constant(-999), constant(500)])
    );
    assert_eq!(
        data.band("pixelquality").unwrap().data,
        stack(&[constant(0), constant(1), constant(255)])
    );
}

// =============================================================================
// Grouping and fusing
// =============================================================================

#[test]
fn test_day_grouping_fuses_first_valid() {
    let early = DatasetRecord::new(products::LS8, at(2021, 3, 7, 1), tile_footprint());
    let late = DatasetRecord::new(products::LS8, at(2021, 3, 7, 2), tile_footprint());
    let storage = MemoryStorage::new()
        .with_plane(&early, "red", create_plane_with_nodata(3, 2, 111, -999, 2))
        .with_plane(&late, "red", create_constant_plane(3, 2, 700));
    let catalog = MemoryCatalog::new()
        .with_products(product_definitions())
        .with_dataset(late)
        .with_dataset(early);

    let product = Basic::new(products::LS8)
        .with_measurements(["red"])
        .unwrap()
        .with_group_by(TimeGrouping::Day);
    let data = load(&product, &catalog, &storage, &Query::new(), &LoadConfig::default()).unwrap();

    assert_eq!(data.times(), &[day(2021, 3, 7)]);
    assert_eq!(
        data.band("red").unwrap().data,
        stack(&[[[700, 111, 700], [111, 700, 111]]])
    );
}

#[test]
fn test_query_time_range_limits_steps() {
    let Scene { catalog, storage } = scene();
    let query = Query::new().during(TimeRange::new(day(2021, 3, 2), day(2021, 3, 6)));
    let data = load(red_of(products::LS8).as_ref(), &catalog, &storage, &query, &LoadConfig::default()).unwrap();

    assert_eq!(data.times(), &[day(2021, 3, 5)]);
}

// =============================================================================
// Slicing
// =============================================================================

#[test]
fn test_sliced_loads_reassemble_in_time_order() {
    let Scene { catalog, storage } = scene();
    let product = Collate::new(vec![red_of(products::LS8), red_of(products::S2)])
        .unwrap()
        .with_index_measurement("source");

    let loads: Vec<RasterData> = [1, 2, 10]
        .into_iter()
        .map(|slice_size| {
            let config = LoadConfig {
                slice_size,
                ..LoadConfig::default()
            };
            load(&product, &catalog, &storage, &Query::new(), &config).unwrap()
        })
        .collect();

    assert_eq!(loads[0], loads[1]);
    assert_eq!(loads[0], loads[2]);
}

#[test]
fn test_recipe_slices_fetch_independently() {
    let Scene { catalog, storage } = scene();
    let product = red_of(products::LS8);
    let query = Query::new();
    let recipe = product
        .build_raster(&product.find_datasets(&catalog, &query).unwrap(), &query)
        .unwrap();

    let second = recipe.slice(1..2);
    let data = product.fetch_data(&second, &storage).unwrap();
    assert_eq!(data.times(), &[day(2021, 3, 5)]);
    assert_eq!(data.band("red").unwrap().data, stack(&[constant(500)]));
}

#[test]
fn test_empty_search_loads_empty_raster() {
    let Scene { catalog, storage } = scene();
    let query = Query::new().during(TimeRange::new(day(2022, 1, 1), day(2022, 2, 1)));
    let data = load(red_of(products::LS8).as_ref(), &catalog, &storage, &query, &LoadConfig::default()).unwrap();

    assert!(data.times().is_empty());
    assert_eq!(data.measurements().names(), vec!["red"]);
}

#[test]
fn test_invalid_config_rejected() {
    let Scene { catalog, storage } = scene();
    let config = LoadConfig {
        slice_size: 0,
        ..LoadConfig::default()
    };
    assert!(load(red_of(products::LS8).as_ref(), &catalog, &storage, &Query::new(), &config).is_err());
}

// =============================================================================
// Transformations under combinators
// =============================================================================

/// `ab` holds bands a=5, b=2 on day 1; `cd` holds c=7, d=1 on day 2.
fn band_math_scene() -> Scene {
    let product = |name: &str, bands: [&str; 2]| {
        let measurements: Measurements = bands
            .into_iter()
            .map(|band| Measurement::new(band, DType::Int16).with_nodata(-999.0))
            .collect();
        ProductDefinition::new(name, measurements).with_grid(tile_geobox())
    };
    let ab = DatasetRecord::new("ab", day(2021, 6, 1), tile_footprint());
    let cd = DatasetRecord::new("cd", day(2021, 6, 2), tile_footprint());

    let storage = MemoryStorage::new()
        .with_plane(&ab, "a", create_constant_plane(3, 2, 5))
        .with_plane(&ab, "b", create_constant_plane(3, 2, 2))
        .with_plane(&cd, "c", create_constant_plane(3, 2, 7))
        .with_plane(&cd, "d", create_constant_plane(3, 2, 1));
    let catalog = MemoryCatalog::new()
        .with_product(product("ab", ["a", "b"]))
        .with_product(product("cd", ["c", "d"]))
        .with_dataset(ab)
        .with_dataset(cd);
    Scene { catalog, storage }
}

/// Load a recipe and check the loaded bands match its declared schema.
fn load_recipe(scene: &Scene, recipe: &str) -> RasterData {
    let product = Resolver::default().resolve_yaml(recipe).unwrap();
    let declared = product
        .output_measurements(&scene.catalog.product_definitions().unwrap())
        .unwrap();
    let data = load(product.as_ref(), &scene.catalog, &scene.storage, &Query::new(), &LoadConfig::default())
        .unwrap();
    assert_eq!(data.measurements().names(), declared.names());
    data
}

#[test]
fn test_juxtapose_of_expressions_over_one_source() {
    let scene = band_math_scene();
    let data = load_recipe(
        &scene,
        r#"
juxtapose:
  - transform: expressions
    output: {s: {formula: a + b, dtype: int16, nodata: -1}}
    source: {product: ab}
  - transform: expressions
    output: {t: {formula: a - b, dtype: int16, nodata: -1}}
    source: {product: ab}
"#,
    );

    assert_eq!(data.times(), &[day(2021, 6, 1)]);
    assert_eq!(data.band("s").unwrap().data, stack(&[constant(7)]));
    assert_eq!(data.band("t").unwrap().data, stack(&[constant(3)]));
}

#[test]
fn test_collate_of_expressions_with_different_inputs() {
    let scene = band_math_scene();
    let data = load_recipe(
        &scene,
        r#"
collate:
  - transform: expressions
    output: {s: {formula: a + b, dtype: int16, nodata: -1}}
    source: {product: ab}
  - transform: expressions
    output: {s: {formula: c + d, dtype: int16, nodata: -1}}
    source: {product: cd}
"#,
    );

    assert_eq!(data.times(), &[day(2021, 6, 1), day(2021, 6, 2)]);
    assert_eq!(data.band("s").unwrap().data, stack(&[constant(7), constant(8)]));
}

#[test]
fn test_transform_of_transform() {
    let scene = band_math_scene();
    let data = load_recipe(
        &scene,
        r#"
transform: rename
measurement_names: {s: total}
source:
  transform: expressions
  output: {s: {formula: a + b, dtype: int16, nodata: -1}}
  source: {product: ab}
"#,
    );

    assert_eq!(data.band("total").unwrap().data, stack(&[constant(7)]));
    assert!(data.band("s").is_none());
}

#[test]
fn test_transform_pile_and_recipe_carry_transformed_schema() {
    let scene = band_math_scene();
    let product = Resolver::default()
        .resolve_yaml("transform: expressions
output: {s: {formula: a + b, dtype: int16, nodata: -1}}
source: {product: ab}")
        .unwrap();
    let query = Query::new();

    let pile = product.find_datasets(&scene.catalog, &query).unwrap();
    assert_eq!(pile.measurements.names(), vec!["s"]);
    assert_eq!(pile.dataset_count(), 1);

    let recipe = product.build_raster(&pile, &query).unwrap();
    assert_eq!(recipe.measurements().names(), vec!["s"]);
    assert_eq!(recipe.layout().branches[0].measurements.names(), vec!["a", "b"]);
}
