//! Common test fixtures for data cube tests.
//!
//! Small, fixed products that show up across the test suite: a Landsat-like
//! surface reflectance product, a Sentinel-2-like one with the same bands,
//! and a pixel quality product with bit flags.

use chrono::{DateTime, TimeZone, Utc};
use cube_common::{
    BoundingBox, DType, FlagBits, FlagDefinition, FlagValue, GeoBox, Measurement, Measurements,
    ProductDefinition,
};

/// Common bounding box definitions for testing.
pub mod bbox {
    use cube_common::BoundingBox;

    /// The 3x2 test tile, one unit per pixel.
    pub const TILE: BoundingBox = BoundingBox {
        min_x: 0.0,
        min_y: 0.0,
        max_x: 3.0,
        max_y: 2.0,
    };

    /// Entirely outside [`TILE`].
    pub const ELSEWHERE: BoundingBox = BoundingBox {
        min_x: 100.0,
        min_y: 50.0,
        max_x: 101.0,
        max_y: 51.0,
    };
}

/// Product names used by the fixtures.
pub mod products {
    pub const LS8: &str = "ls8_ard";
    pub const S2: &str = "s2_ard";
    pub const PQ: &str = "ls8_pq";
}

/// Midnight UTC on the given day.
pub fn day(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    at(year, month, day, 0)
}

/// The given day at `hour`:00 UTC.
pub fn at(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0)
        .single()
        .unwrap_or_else(|| panic!("invalid fixture date {}-{}-{} {}h", year, month, day, hour))
}

/// The 3 wide, 2 high grid every fixture product lives on.
pub fn tile_geobox() -> GeoBox {
    GeoBox::new("EPSG:4326", 3, 2, bbox::TILE)
}

/// `red`, `green` and `nir` surface reflectance bands, int16 with nodata -999.
///
/// `nir` also answers to the alias `near_infrared`.
pub fn reflectance_measurements() -> Measurements {
    vec![
        Measurement::new("red", DType::Int16).with_nodata(-999.0),
        Measurement::new("green", DType::Int16).with_nodata(-999.0),
        Measurement::new("nir", DType::Int16)
            .with_nodata(-999.0)
            .with_aliases(["near_infrared"]),
    ]
    .into_iter()
    .collect()
}

/// Pixel quality band: bit 0 cloud, bit 1 cloud shadow. Nodata 255.
pub fn pixel_quality_measurement() -> Measurement {
    let bool_values = || {
        [(0, FlagValue::Bool(false)), (1, FlagValue::Bool(true))]
            .into_iter()
            .collect()
    };
    Measurement::new("pixelquality", DType::UInt8)
        .with_nodata(255.0)
        .with_flag(
            "cloud",
            FlagDefinition {
                bits: FlagBits::One(0),
                values: bool_values(),
                description: Some("Cloud".into()),
            },
        )
        .with_flag(
            "cloud_shadow",
            FlagDefinition {
                bits: FlagBits::One(1),
                values: bool_values(),
                description: Some("Cloud shadow".into()),
            },
        )
}

/// Definitions of [`products::LS8`], [`products::S2`] and [`products::PQ`].
pub fn product_definitions() -> Vec<ProductDefinition> {
    vec![
        ProductDefinition::new(products::LS8, reflectance_measurements()).with_grid(tile_geobox()),
        ProductDefinition::new(products::S2, reflectance_measurements()).with_grid(tile_geobox()),
        ProductDefinition::new(
            products::PQ,
            vec![pixel_quality_measurement()].into_iter().collect(),
        )
        .with_grid(tile_geobox()),
    ]
}

/// Footprint of the tile, for dataset records.
pub fn tile_footprint() -> BoundingBox {
    bbox::TILE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_products_share_the_tile() {
        for definition in product_definitions() {
            assert_eq!(definition.grid, Some(tile_geobox()));
        }
    }

    #[test]
    fn test_alias_fixture() {
        let measurements = reflectance_measurements();
        assert_eq!(measurements.resolve("near_infrared").unwrap().name, "nir");
    }
}
