//! Mask edge feathering
//!
//! Softens the hard matte edge of a segmentation mask with a separable
//! Gaussian blur so the composite shows no cut-out line. The radius is the
//! Gaussian standard deviation in pixels, the same meaning as the CSS
//! `blur(<radius>px)` filter, so the result scales with image resolution.

use crate::{
    error::{PhotoError, Result},
    types::{FeatheredMask, Mask},
};
use ndarray::Array2;
use tracing::{debug, instrument};

/// Build a normalized 1-D Gaussian kernel for the given standard deviation
///
/// The kernel spans `±ceil(3·sigma)` taps, capped at `max_half`. With clamped
/// edge sampling every tap at or beyond the axis length reads the edge pixel,
/// so a capped kernel folds its tail mass into the two outermost taps. Weights
/// are computed in `f64` so tiny sigmas collapse to a single unit tap instead
/// of dividing by an underflowed variance.
pub(crate) fn gaussian_kernel_1d(sigma: f32, max_half: usize) -> Vec<f32> {
    let sigma = f64::from(sigma);
    let denom = 2.0 * sigma * sigma;
    if denom == 0.0 {
        return vec![1.0];
    }

    let full_half = (3.0 * sigma).ceil().max(1.0);
    let capped = full_half > max_half as f64;
    let half = if capped { max_half.max(1) } else { full_half as usize };
    let weight = |d: f64| (-(d * d) / denom).exp();

    let mut kernel: Vec<f64> = (0..=2 * half).map(|i| weight(i as f64 - half as f64)).collect();

    if capped {
        let central: f64 = kernel.iter().sum();
        // Discrete Gaussian mass; the continuous integral is exact to f64
        // precision once sigma is a few pixels wide
        let total = if sigma >= 4.0 {
            sigma * (2.0 * std::f64::consts::PI).sqrt()
        } else {
            let reach = full_half as i64;
            (-reach..=reach).map(|d| weight(d as f64)).sum()
        };
        let tail = ((total - central) / 2.0).max(0.0);
        if let Some(first) = kernel.first_mut() {
            *first += tail;
        }
        if let Some(last) = kernel.last_mut() {
            *last += tail;
        }
    }

    let sum: f64 = kernel.iter().sum();
    kernel.iter().map(|w| (w / sum) as f32).collect()
}

/// Feather a mask with a Gaussian of the given radius
///
/// A radius of zero returns the mask unchanged. Border pixels are sampled
/// with clamping, never wrapping, and the output is clamped to [0, 1].
///
/// # Errors
/// - `InvalidInput` when the mask has a zero dimension
/// - `InvalidInput` when the radius is negative or not finite
#[instrument(skip(mask), fields(width = mask.width(), height = mask.height()))]
pub fn feather(mask: &Mask, radius: f32) -> Result<FeatheredMask> {
    let (width, height) = mask.dimensions();
    if width == 0 || height == 0 {
        return Err(PhotoError::invalid_input(format!(
            "Cannot feather an empty {}x{} mask",
            width, height
        )));
    }
    if !radius.is_finite() || radius < 0.0 {
        return Err(PhotoError::invalid_input(format!(
            "Feather radius must be a non-negative number, got {}",
            radius
        )));
    }

    if radius == 0.0 {
        return Ok(FeatheredMask::new(mask.clone(), 0.0));
    }

    let row_kernel = gaussian_kernel_1d(radius, width as usize);
    let column_kernel = gaussian_kernel_1d(radius, height as usize);
    debug!(
        row_taps = row_kernel.len(),
        column_taps = column_kernel.len(),
        "feathering mask"
    );

    let horizontal = convolve_rows(mask.values(), &row_kernel);
    let vertical = convolve_rows(&horizontal.t().to_owned(), &column_kernel);
    let blurred = vertical.t().mapv(|v| v.clamp(0.0, 1.0));

    Ok(FeatheredMask::new(Mask::from_array(blurred), radius))
}

/// Convolve every row with `kernel`, replicating edge pixels
fn convolve_rows(values: &Array2<f32>, kernel: &[f32]) -> Array2<f32> {
    let (rows, cols) = values.dim();
    let half = (kernel.len() / 2) as isize;
    let last = cols as isize - 1;

    let mut out = Array2::<f32>::zeros((rows, cols));
    for (src_row, mut dst_row) in values.rows().into_iter().zip(out.rows_mut()) {
        for (x, dst) in dst_row.iter_mut().enumerate() {
            let mut sum = 0.0f32;
            for (k, weight) in kernel.iter().enumerate() {
                let sx = (x as isize + k as isize - half).clamp(0, last) as usize;
                sum += src_row[sx] * weight;
            }
            *dst = sum;
        }
    }
    out
}
