//! Frequency-domain sharpness scoring.
//!
//! In-focus frames keep a lot of energy in the high end of their spatial
//! spectrum; blur attenuates it. [`SharpnessScorer`] takes the magnitude of
//! the 2-D real FFT of a grayscale frame, looks at the strongest few percent
//! of frequency bins and reports the inverse of their median. The result is
//! a *blurriness* score: lower is sharper.
//!
//! The median over a top quantile, rather than the single largest bin, keeps
//! an isolated noise spike from deciding the score.
//!
//! # Example
//!
//! ```
//! use image::{DynamicImage, GrayImage, Luma};
//! use sharpsheet::SharpnessScorer;
//!
//! let stripes = GrayImage::from_fn(32, 32, |x, _| Luma([if x % 2 == 0 { 255 } else { 0 }]));
//! let score = SharpnessScorer::new().score_image(&DynamicImage::ImageLuma8(stripes));
//! assert!(score.is_finite() && score > 0.0);
//! ```

use image::{DynamicImage, GrayImage};
use ndarray::{Array2, ArrayView2, Axis};
use rustfft::{FftPlanner, num_complex::Complex};

/// Fraction of frequency bins used for the median when no other value is
/// configured.
pub const DEFAULT_TOP_QUANTILE: f64 = 0.05;

/// Scores frames by the inverse of a top-quantile spectral magnitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SharpnessScorer {
    top_quantile: f64,
}

impl Default for SharpnessScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl SharpnessScorer {
    /// Create a scorer using the top 5% of frequency bins.
    pub fn new() -> Self {
        Self {
            top_quantile: DEFAULT_TOP_QUANTILE,
        }
    }

    /// Use a different fraction of the spectrum for the median.
    ///
    /// Values are expected in `(0, 1]`; anything that selects no bins falls
    /// back to the single strongest bin.
    #[must_use]
    pub fn with_top_quantile(mut self, quantile: f64) -> Self {
        self.top_quantile = quantile;
        self
    }

    /// The configured top quantile.
    pub fn top_quantile(&self) -> f64 {
        self.top_quantile
    }

    /// Score a decoded frame after converting it to 8-bit luminance.
    pub fn score_image(&self, image: &DynamicImage) -> f64 {
        self.score_luma(&image.to_luma8())
    }

    /// Score an 8-bit grayscale frame.
    pub fn score_luma(&self, gray: &GrayImage) -> f64 {
        self.score(luma_to_array(gray).view())
    }

    /// Score a grayscale frame given as a `rows × columns` array.
    ///
    /// Returns `f64::INFINITY` for degenerate frames (empty, or with no
    /// spectral energy in the top quantile, e.g. an all-black frame).
    pub fn score(&self, pixels: ArrayView2<'_, f64>) -> f64 {
        let magnitudes: Vec<f64> = spectrum_magnitudes(pixels).iter().copied().collect();
        match top_quantile_median(magnitudes, self.top_quantile) {
            Some(max_frequency) if max_frequency > 0.0 => 1.0 / max_frequency,
            _ => {
                log::warn!(
                    "Degenerate {}x{} frame has no spectral energy; scoring as maximally blurry",
                    pixels.ncols(),
                    pixels.nrows()
                );
                f64::INFINITY
            }
        }
    }
}

/// Copy an 8-bit grayscale image into a `height × width` array of `f64`.
pub fn luma_to_array(gray: &GrayImage) -> Array2<f64> {
    let (width, height) = gray.dimensions();
    Array2::from_shape_fn((height as usize, width as usize), |(row, column)| {
        f64::from(gray.get_pixel(column as u32, row as u32)[0])
    })
}

/// Magnitude of the half-spectrum 2-D DFT of a real array.
///
/// Each row is transformed and truncated to its `columns / 2 + 1`
/// non-redundant bins, then each remaining column is transformed in full,
/// giving a `rows × (columns / 2 + 1)` result. This matches the layout of
/// `rfft2` in common numeric libraries.
pub fn spectrum_magnitudes(pixels: ArrayView2<'_, f64>) -> Array2<f64> {
    let (rows, columns) = pixels.dim();
    if rows == 0 || columns == 0 {
        return Array2::zeros((0, 0));
    }
    let half = columns / 2 + 1;

    let mut planner = FftPlanner::<f64>::new();
    let row_fft = planner.plan_fft_forward(columns);
    let column_fft = planner.plan_fft_forward(rows);

    let mut spectrum = Array2::from_elem((rows, half), Complex::new(0.0, 0.0));

    let mut row_buffer = vec![Complex::new(0.0, 0.0); columns];
    for (input, mut output) in pixels.outer_iter().zip(spectrum.outer_iter_mut()) {
        for (slot, value) in row_buffer.iter_mut().zip(input.iter()) {
            *slot = Complex::new(*value, 0.0);
        }
        row_fft.process(&mut row_buffer);
        for (slot, value) in output.iter_mut().zip(row_buffer.iter()) {
            *slot = *value;
        }
    }

    let mut column_buffer = vec![Complex::new(0.0, 0.0); rows];
    for mut column in spectrum.axis_iter_mut(Axis(1)) {
        for (slot, value) in column_buffer.iter_mut().zip(column.iter()) {
            *slot = *value;
        }
        column_fft.process(&mut column_buffer);
        for (slot, value) in column.iter_mut().zip(column_buffer.iter()) {
            *slot = *value;
        }
    }

    spectrum.mapv(|value| value.norm())
}

/// Median of the largest `floor(quantile × len)` values (at least one).
///
/// Returns `None` for an empty input.
pub fn top_quantile_median(mut values: Vec<f64>, quantile: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let count = values.len();
    let length = ((quantile * count as f64).floor() as usize).clamp(1, count);

    // Move the `length` largest values to the front, then order just those.
    values.select_nth_unstable_by(length - 1, |a, b| b.total_cmp(a));
    let top = &mut values[..length];
    top.sort_unstable_by(|a, b| b.total_cmp(a));

    let middle = length / 2;
    if length % 2 == 1 {
        Some(top[middle])
    } else {
        Some((top[middle - 1] + top[middle]) / 2.0)
    }
}
