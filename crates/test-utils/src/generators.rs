//! Generators for synthetic raster planes.
//!
//! Every generator returns a 2-D `ArrayData` plane in `(height, width)`
//! order, the shape a `StorageDriver::read` produces.

use cube_common::ArrayData;
use ndarray::Array2;

/// Integer plane with predictable values.
///
/// Each cell value is `col * 1000 + row`, which makes it easy to check
/// that a pixel ended up where it should.
///
/// # Example
///
/// ```
/// use test_utils::create_test_plane;
///
/// let plane = create_test_plane(3, 2).to_i64();
/// assert_eq!(plane.shape(), &[2, 3]);
/// assert_eq!(plane[[0, 1]], 1000); // row 0, col 1
/// assert_eq!(plane[[1, 0]], 1);    // row 1, col 0
/// ```
pub fn create_test_plane(width: usize, height: usize) -> ArrayData {
    let plane = Array2::from_shape_fn((height, width), |(row, col)| (col * 1000 + row) as i64);
    ArrayData::Int(plane.into_dyn())
}

/// Integer plane filled with `value`.
pub fn create_constant_plane(width: usize, height: usize, value: i64) -> ArrayData {
    ArrayData::Int(Array2::from_elem((height, width), value).into_dyn())
}

/// Float plane filled with `value`.
pub fn create_constant_float_plane(width: usize, height: usize, value: f64) -> ArrayData {
    ArrayData::Float(Array2::from_elem((height, width), value).into_dyn())
}

/// Integer plane of `value` where every `every_nth` cell (row-major) holds
/// `nodata` instead.
///
/// # Example
///
/// ```
/// use test_utils::create_plane_with_nodata;
///
/// let plane = create_plane_with_nodata(4, 1, 7, -999, 2).to_i64();
/// assert_eq!(plane.iter().copied().collect::<Vec<_>>(), vec![-999, 7, -999, 7]);
/// ```
pub fn create_plane_with_nodata(
    width: usize,
    height: usize,
    value: i64,
    nodata: i64,
    every_nth: usize,
) -> ArrayData {
    let every_nth = every_nth.max(1);
    let plane = Array2::from_shape_fn((height, width), |(row, col)| {
        if (row * width + col) % every_nth == 0 {
            nodata
        } else {
            value
        }
    });
    ArrayData::Int(plane.into_dyn())
}

/// Boolean plane that is false inside the `[row0, row1) x [col0, col1)`
/// window and true elsewhere.
pub fn create_mask_with_hole(
    width: usize,
    height: usize,
    rows: std::ops::Range<usize>,
    cols: std::ops::Range<usize>,
) -> ArrayData {
    let plane = Array2::from_shape_fn((height, width), |(row, col)| {
        !(rows.contains(&row) && cols.contains(&col))
    });
    ArrayData::Bool(plane.into_dyn())
}
