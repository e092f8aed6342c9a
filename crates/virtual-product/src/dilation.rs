//! Morphology on boolean masks.
//!
//! `apply_mask` shrinks the valid region of a mask by a disk of radius `r`
//! so that pixels close to an invalid one are dropped as well. That is
//! computed as the dilation of the mask's complement, complemented again:
//!
//! ```text
//! eroded = !dilate(!mask, disk(r))
//! ```

use ndarray::{Array2, ArrayD, ArrayView2, Axis, Ix2};

use cube_common::{CubeError, CubeResult};

/// Offsets `(dy, dx)` of a disk-shaped structuring element: every offset
/// with `dx² + dy² <= (r + 0.5)²`.
pub fn disk(radius: usize) -> Vec<(isize, isize)> {
    let r = radius as isize;
    let limit = (radius as f64 + 0.5).powi(2);
    let mut offsets = Vec::new();
    for dy in -r..=r {
        for dx in -r..=r {
            if ((dx * dx + dy * dy) as f64) <= limit {
                offsets.push((dy, dx));
            }
        }
    }
    offsets
}

/// Binary dilation of a 2-D mask. Positions outside the array are false.
pub fn dilate(mask: ArrayView2<'_, bool>, element: &[(isize, isize)]) -> Array2<bool> {
    let (height, width) = mask.dim();
    let mut output = Array2::from_elem((height, width), false);

    for ((row, col), &set) in mask.indexed_iter() {
        if !set {
            continue;
        }
        for &(dy, dx) in element {
            let y = row as isize + dy;
            let x = col as isize + dx;
            if y >= 0 && x >= 0 && (y as usize) < height && (x as usize) < width {
                output[[y as usize, x as usize]] = true;
            }
        }
    }
    output
}

/// Shrink the true region of a `(y, x)` mask by a disk of `radius`.
pub fn erode(mask: ArrayView2<'_, bool>, radius: usize) -> Array2<bool> {
    if radius == 0 {
        return mask.to_owned();
    }
    let complement = mask.mapv(|valid| !valid);
    dilate(complement.view(), &disk(radius)).mapv(|invalid| !invalid)
}

/// [`erode`] applied to a `(y, x)` mask or to every time slice of a
/// `(time, y, x)` mask.
pub fn erode_stack(mask: &ArrayD<bool>, radius: usize) -> CubeResult<ArrayD<bool>> {
    if radius == 0 {
        return Ok(mask.clone());
    }
    match mask.ndim() {
        2 => {
            let plane = mask
                .view()
                .into_dimensionality::<Ix2>()
                .map_err(|e| CubeError::evaluation(format!("mask is not 2-D: {}", e)))?;
            Ok(erode(plane, radius).into_dyn())
        }
        3 => {
            let mut output = mask.clone();
            for (mut target, source) in output.axis_iter_mut(Axis(0)).zip(mask.axis_iter(Axis(0))) {
                let plane = source
                    .into_dimensionality::<Ix2>()
                    .map_err(|e| CubeError::evaluation(format!("mask slice is not 2-D: {}", e)))?;
                target.assign(&erode(plane, radius).into_dyn());
            }
            Ok(output)
        }
        n => Err(CubeError::evaluation(format!(
            "cannot erode a {}-dimensional mask",
            n
        ))),
    }
}
