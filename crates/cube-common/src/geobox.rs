//! Output pixel grids.

use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;

/// A regular pixel grid: CRS, extent and shape.
///
/// Row 0 is the northern edge, column 0 the western edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoBox {
    pub crs: String,
    pub width: usize,
    pub height: usize,
    pub bbox: BoundingBox,
}

impl GeoBox {
    pub fn new(crs: impl Into<String>, width: usize, height: usize, bbox: BoundingBox) -> Self {
        Self {
            crs: crs.into(),
            width,
            height,
            bbox,
        }
    }

    /// Build a grid covering `bbox` at the given (y, x) resolution.
    /// Resolutions are absolute pixel sizes in CRS units.
    pub fn from_resolution(crs: impl Into<String>, bbox: BoundingBox, resolution: (f64, f64)) -> Self {
        let (res_y, res_x) = (resolution.0.abs(), resolution.1.abs());
        let width = (bbox.width() / res_x).ceil().max(1.0) as usize;
        let height = (bbox.height() / res_y).ceil().max(1.0) as usize;
        Self::new(crs, width, height, bbox)
    }

    /// Array shape as (height, width).
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Pixel size as (y, x), y negative for north-up grids.
    pub fn resolution(&self) -> (f64, f64) {
        (
            -self.bbox.height() / self.height.max(1) as f64,
            self.bbox.width() / self.width.max(1) as f64,
        )
    }

    /// Coordinates of the centre of pixel (row, col).
    pub fn index_to_coord(&self, row: usize, col: usize) -> Option<(f64, f64)> {
        if row >= self.height || col >= self.width {
            return None;
        }
        let (res_y, res_x) = self.resolution();
        Some((
            self.bbox.min_x + (col as f64 + 0.5) * res_x,
            self.bbox.max_y + (row as f64 + 0.5) * res_y,
        ))
    }

    /// Pixel (row, col) containing the given coordinates.
    pub fn coord_to_index(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        if !self.bbox.contains_point(x, y) {
            return None;
        }
        let (res_y, res_x) = self.resolution();
        let col = (((x - self.bbox.min_x) / res_x).floor() as usize).min(self.width.saturating_sub(1));
        let row = (((y - self.bbox.max_y) / res_y).floor() as usize).min(self.height.saturating_sub(1));
        Some((row, col))
    }

    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_resolution() {
        let geobox = GeoBox::from_resolution(
            "EPSG:3577",
            BoundingBox::new(0.0, 0.0, 250.0, 100.0),
            (-25.0, 25.0),
        );
        assert_eq!(geobox.shape(), (4, 10));
        assert_eq!(geobox.resolution(), (-25.0, 25.0));
    }

    #[test]
    fn test_index_coord_round_trip() {
        let geobox = GeoBox::new("EPSG:4326", 10, 5, BoundingBox::new(140.0, -40.0, 150.0, -35.0));

        let (x, y) = geobox.index_to_coord(0, 0).unwrap();
        assert_eq!((x, y), (140.5, -35.5));
        assert_eq!(geobox.coord_to_index(x, y), Some((0, 0)));
        assert_eq!(geobox.coord_to_index(150.0, -40.0), Some((4, 9)));
        assert_eq!(geobox.index_to_coord(5, 0), None);
        assert_eq!(geobox.coord_to_index(151.0, -36.0), None);
    }
}
