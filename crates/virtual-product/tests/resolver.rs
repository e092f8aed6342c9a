//! Integration tests: recipes, the recipe catalog and reconstruction.

use std::io::Write;

use cube_common::{CubeError, DatasetCatalog, DatasetRecord, Query};
use ndarray::arr3;
use test_utils::{
    create_constant_plane, day, product_definitions, products, tile_footprint, MemoryCatalog,
    MemoryStorage,
};
use virtual_product::transforms::expressions;
use virtual_product::{
    load, reconstruct, Basic, Catalog, CatalogItem, LoadConfig, RecipeNode, Registry, Resolver,
    VirtualProduct,
};

const CATALOG: &str = r#"
products:
  ls8_with_pq:
    description: Landsat red band next to its pixel quality
    recipe:
      juxtapose:
        - {product: ls8_ard, measurements: [red]}
        - {product: ls8_pq}
transforms:
  cloud_free:
    description: Drop cloudy pixels using the pixel quality band
    recipe:
      transform: apply_mask
      mask_measurement_name: clear
      source:
        transform: make_mask
        mask_measurement_name: pixelquality
        flags: {cloud: false}
        output_name: clear
"#;

/// Red is 100 on both days; day 3 is flagged cloudy.
fn scene() -> (MemoryCatalog, MemoryStorage) {
    let ls8_day1 = DatasetRecord::new(products::LS8, day(2021, 3, 1), tile_footprint());
    let ls8_day3 = DatasetRecord::new(products::LS8, day(2021, 3, 3), tile_footprint());
    let pq_day1 = DatasetRecord::new(products::PQ, day(2021, 3, 1), tile_footprint());
    let pq_day3 = DatasetRecord::new(products::PQ, day(2021, 3, 3), tile_footprint());

    let storage = MemoryStorage::new()
        .with_plane(&ls8_day1, "red", create_constant_plane(3, 2, 100))
        .with_plane(&ls8_day3, "red", create_constant_plane(3, 2, 100))
        .with_plane(&pq_day1, "pixelquality", create_constant_plane(3, 2, 0))
        .with_plane(&pq_day3, "pixelquality", create_constant_plane(3, 2, 1));
    let catalog = MemoryCatalog::new()
        .with_products(product_definitions())
        .with_dataset(ls8_day1)
        .with_dataset(ls8_day3)
        .with_dataset(pq_day1)
        .with_dataset(pq_day3);
    (catalog, storage)
}

// =============================================================================
// Reconstruction
// =============================================================================

#[test]
fn test_reconstruct_round_trip() {
    let resolver = Resolver::default();
    let product = resolver
        .resolve_yaml(
            r#"
transform: expressions
output:
  ndvi: {formula: (nir - red) / (nir + red), dtype: float32}
source:
  product: ls8_ard
  measurements: [red, nir]
"#,
        )
        .unwrap();

    let document = reconstruct(product.as_ref());
    let node = RecipeNode::from_value(&document).unwrap();
    match &node {
        RecipeNode::Transform { transform, source, args } => {
            assert_eq!(transform, expressions::QUALIFIED_NAME);
            assert!(args.contains_key("output"));
            match source.as_deref() {
                Some(RecipeNode::Product(spec)) => {
                    assert_eq!(spec.product, "ls8_ard");
                    assert_eq!(spec.measurements, Some(vec!["red".to_string(), "nir".to_string()]));
                }
                other => panic!("unexpected source {:?}", other),
            }
        }
        other => panic!("unexpected node {:?}", other),
    }

    // The reconstructed document resolves to an equivalent product.
    let rebuilt = resolver.resolve_value(&document).unwrap();
    assert_eq!(rebuilt.reconstruct(), node);

    let catalog = MemoryCatalog::new().with_products(product_definitions());
    let definitions = catalog.product_definitions().unwrap();
    assert_eq!(
        rebuilt.output_measurements(&definitions).unwrap(),
        product.output_measurements(&definitions).unwrap()
    );
}

#[test]
fn test_reconstruct_combinators() {
    let recipe = r#"
collate:
  - product: ls8_ard
    group_by: solar_day
  - product: s2_ard
    resampling: bilinear
index_measurement_name: source
"#;
    let resolver = Resolver::default();
    let product = resolver.resolve_yaml(recipe).unwrap();
    assert_eq!(product.reconstruct(), RecipeNode::from_yaml_str(recipe).unwrap());
}

#[test]
fn test_config_defaults_are_not_reconstructed() {
    let config = LoadConfig {
        default_resampling: Some("cubic".into()),
        ..LoadConfig::default()
    };
    let product = Resolver::default()
        .with_config(config)
        .resolve_yaml("product: ls8_ard")
        .unwrap();
    let yaml = product.reconstruct().to_yaml_string().unwrap();
    assert!(!yaml.contains("cubic"));
}

// =============================================================================
// Registry
// =============================================================================

#[test]
fn test_registered_predicate_filters_datasets() {
    let clear = DatasetRecord::new(products::LS8, day(2021, 4, 1), tile_footprint())
        .with_property("eo:cloud_cover", 5.0);
    let cloudy = DatasetRecord::new(products::LS8, day(2021, 4, 2), tile_footprint())
        .with_property("eo:cloud_cover", 80.0);
    let catalog = MemoryCatalog::new()
        .with_products(product_definitions())
        .with_dataset(clear)
        .with_dataset(cloudy);

    let registry = Registry::builtin().with_predicate("low_cloud", |dataset: &DatasetRecord| {
        dataset
            .property("eo:cloud_cover")
            .and_then(|value| value.as_f64())
            .map_or(false, |cover| cover < 20.0)
    });
    let product = Resolver::new(registry)
        .resolve_yaml("product: ls8_ard\ndataset_predicate: low_cloud")
        .unwrap();

    let query = Query::new();
    let pile = product.find_datasets(&catalog, &query).unwrap();
    let recipe = product.build_raster(&pile, &query).unwrap();
    assert_eq!(recipe.times(), &[day(2021, 4, 1)]);

    // The default registry does not know the predicate.
    assert!(matches!(
        Resolver::default().resolve_yaml("product: ls8_ard\ndataset_predicate: low_cloud"),
        Err(CubeError::Recipe(_))
    ));
}

#[test]
fn test_aggregate_resolves_but_does_not_load() {
    let (catalog, storage) = scene();
    let product = Resolver::default()
        .resolve_yaml("aggregate: mean\ngroup_by: month\nsource: {product: ls8_ard}")
        .unwrap();

    let definitions = catalog.product_definitions().unwrap();
    assert_eq!(product.output_measurements(&definitions).unwrap().names(), vec!["red", "green", "nir"]);
    assert!(matches!(
        load(product.as_ref(), &catalog, &storage, &Query::new(), &LoadConfig::default()),
        Err(CubeError::Unimplemented(_))
    ));
}

// =============================================================================
// Catalog
// =============================================================================

#[test]
fn test_catalog_template_masks_clouds() {
    test_utils::init_tracing();
    let (catalog, storage) = scene();
    let recipes = Catalog::from_yaml_str(CATALOG, Resolver::default()).unwrap();

    let input = recipes.product("ls8_with_pq").unwrap();
    let product = match recipes.get("cloud_free").unwrap() {
        CatalogItem::Transform(template) => template.apply(input).unwrap(),
        CatalogItem::Product(_) => panic!("cloud_free should be a transform"),
    };

    let definitions = catalog.product_definitions().unwrap();
    assert_eq!(product.output_measurements(&definitions).unwrap().names(), vec!["red"]);

    let data = load(product.as_ref(), &catalog, &storage, &Query::new(), &LoadConfig::default()).unwrap();
    assert_eq!(data.times(), &[day(2021, 3, 1), day(2021, 3, 3)]);
    assert_eq!(
        data.band("red").unwrap().data,
        cube_common::ArrayData::Int(arr3(&[[[100; 3]; 2], [[-999; 3]; 2]]).into_dyn())
    );
}

#[test]
fn test_catalog_rejects_duplicate_names() {
    let document = r#"
products:
  cloud_free:
    recipe: {product: ls8_ard}
transforms:
  cloud_free:
    recipe: {transform: to_float}
"#;
    assert!(matches!(
        Catalog::from_yaml_str(document, Resolver::default()),
        Err(CubeError::Recipe(_))
    ));
}

#[test]
fn test_catalog_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(CATALOG.as_bytes()).unwrap();

    let recipes = Catalog::from_path(file.path(), Resolver::default()).unwrap();
    assert_eq!(recipes.names().collect::<Vec<_>>(), vec!["cloud_free", "ls8_with_pq"]);
    assert_eq!(
        recipes.description("cloud_free"),
        Some("Drop cloudy pixels using the pixel quality band")
    );

    let missing = Catalog::from_path(file.path().with_extension("missing"), Resolver::default());
    assert!(matches!(missing, Err(CubeError::Document(_))));
}

#[test]
fn test_template_applies_to_any_product() {
    let recipes = Catalog::from_yaml_str(CATALOG, Resolver::default()).unwrap();
    let template = recipes.transform("cloud_free").unwrap();

    // A product without the pixel quality band resolves, but its schema fails.
    let product = template.apply(Box::new(Basic::new(products::S2))).unwrap();
    let catalog = MemoryCatalog::new().with_products(product_definitions());
    assert!(matches!(
        product.output_measurements(&catalog.product_definitions().unwrap()),
        Err(CubeError::MissingInput(_))
    ));
}
