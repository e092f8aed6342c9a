//! Integration tests for the raster container shared by every crate.

use chrono::{DateTime, TimeZone, Utc};
use cube_common::{
    ArrayData, Band, BoundingBox, CubeError, DType, GeoBox, Measurement, Measurements, RasterData,
};
use ndarray::arr3;

fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 1, d, 0, 0, 0).unwrap()
}

fn geobox() -> GeoBox {
    GeoBox::new("EPSG:4326", 2, 1, BoundingBox::new(0.0, 0.0, 2.0, 1.0))
}

fn red(values: &[[[i64; 2]; 1]]) -> Band {
    Band::new(
        Measurement::new("red", DType::Int16).with_nodata(-999.0),
        ArrayData::Int(arr3(values).into_dyn()),
    )
    .unwrap()
}

// =============================================================================
// Time handling
// =============================================================================

#[test]
fn test_concat_then_select_restores_order() {
    let first = RasterData::new(vec![day(1), day(3)], geobox())
        .with_band(red(&[[[1, 1]], [[3, 3]]]))
        .unwrap();
    let second = RasterData::new(vec![day(2)], geobox())
        .with_band(red(&[[[2, 2]]]))
        .unwrap();

    let joined = RasterData::concat_time(vec![first, second]).unwrap();
    assert_eq!(joined.times(), &[day(1), day(3), day(2)]);

    let ordered = joined.select_time(&[0, 2, 1]);
    assert_eq!(ordered.times(), &[day(1), day(2), day(3)]);
    assert_eq!(
        ordered.band("red").unwrap().data,
        ArrayData::Int(arr3(&[[[1, 1]], [[2, 2]], [[3, 3]]]).into_dyn())
    );
}

#[test]
fn test_concat_requires_matching_bands() {
    let first = RasterData::new(vec![day(1)], geobox())
        .with_band(red(&[[[1, 1]]]))
        .unwrap();
    let second = RasterData::new(vec![day(2)], geobox());
    assert!(matches!(
        RasterData::concat_time(vec![first, second]),
        Err(CubeError::Evaluation(_))
    ));
}

// =============================================================================
// Bands
// =============================================================================

#[test]
fn test_filled_raster_holds_nodata() {
    let measurements: Measurements = vec![
        Measurement::new("red", DType::Int16).with_nodata(-999.0),
        Measurement::new("ratio", DType::Float32),
        Measurement::new("clear", DType::Bool),
    ]
    .into_iter()
    .collect();
    let raster = RasterData::filled(vec![day(1)], geobox(), &measurements);

    assert_eq!(raster.shape(), vec![1, 1, 2]);
    assert!(raster.band("red").unwrap().data.to_i64().iter().all(|&v| v == -999));
    assert!(raster.band("ratio").unwrap().data.to_f64().iter().all(|v| v.is_nan()));
    assert!(raster.band("clear").unwrap().data.to_bool().iter().all(|&v| !v));
}

#[test]
fn test_merge_rejects_shared_names() {
    let left = RasterData::new(vec![day(1)], geobox())
        .with_band(red(&[[[1, 1]]]))
        .unwrap();
    let right = left.clone();
    assert!(matches!(left.merge(right), Err(CubeError::NameCollision(names)) if names == vec!["red"]));
}

#[test]
fn test_insert_band_checks_shape() {
    let mut raster = RasterData::new(vec![day(1), day(2)], geobox());
    assert!(raster.insert_band(red(&[[[1, 1]]])).is_err());
    assert!(raster.insert_band(red(&[[[1, 1]], [[2, 2]]])).is_ok());
}
