//! Contact sheet composition.
//!
//! Pastes selected frames onto a single canvas, row by row in timeline
//! order. With the default single column the frames are stacked vertically
//! with a small gap, which is the classic sheet layout.

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

use image::{DynamicImage, GenericImage, Rgba, RgbaImage, imageops::FilterType};

use crate::error::SheetError;
use crate::progress::{NoOpProgress, OperationType, ProgressCallback, ProgressTracker};
use crate::selection::FrameSample;

/// Default gap between frames in pixels.
pub const DEFAULT_SPACING: u32 = 5;

/// Layout settings for a contact sheet.
///
/// # Example
///
/// ```
/// use image::Rgba;
/// use sharpsheet::SheetOptions;
///
/// let options = SheetOptions::new()
///     .with_columns(2)
///     .with_spacing(8)
///     .with_margin(16)
///     .with_background(Rgba([0, 0, 0, 255]));
/// assert_eq!(options.columns, 2);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct SheetOptions {
    /// Frames per row.
    pub columns: u32,
    /// Gap between neighbouring frames in pixels.
    pub spacing: u32,
    /// Border around the whole sheet in pixels.
    pub margin: u32,
    /// Canvas colour.
    pub background: Rgba<u8>,
    /// Scale every frame to this width (height follows the aspect ratio).
    /// `None` pastes frames at their own size.
    pub frame_width: Option<u32>,
}

impl Default for SheetOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl SheetOptions {
    /// A single white column with 5 pixel gaps and no margin.
    pub fn new() -> Self {
        Self {
            columns: 1,
            spacing: DEFAULT_SPACING,
            margin: 0,
            background: Rgba([255, 255, 255, 255]),
            frame_width: None,
        }
    }

    /// Set the number of frames per row. Zero is treated as one.
    pub fn with_columns(mut self, columns: u32) -> Self {
        self.columns = columns;
        self
    }

    /// Set the gap between frames.
    pub fn with_spacing(mut self, spacing: u32) -> Self {
        self.spacing = spacing;
        self
    }

    /// Set the border around the sheet.
    pub fn with_margin(mut self, margin: u32) -> Self {
        self.margin = margin;
        self
    }

    /// Set the canvas colour.
    pub fn with_background(mut self, background: Rgba<u8>) -> Self {
        self.background = background;
        self
    }

    /// Scale frames to a common width before pasting.
    pub fn with_frame_width(mut self, width: Option<u32>) -> Self {
        self.frame_width = width;
        self
    }
}

/// Composes selected frames into one image.
///
/// # Example
///
/// ```no_run
/// use sharpsheet::{
///     ContactSheet, FfmpegCapture, MediaInfo, SelectionOptions, SharpFrameSelector, SheetOptions,
/// };
///
/// let media = MediaInfo::probe("input.mp4")?;
/// let selection = SharpFrameSelector::new(SelectionOptions::new())
///     .select(&media, &FfmpegCapture::new(&media.path))?;
/// let sheet = ContactSheet::new(SheetOptions::new()).compose(&selection.frames)?;
/// sheet.save("input.mp4.png")?;
/// # Ok::<(), sharpsheet::SheetError>(())
/// ```
#[derive(Clone)]
pub struct ContactSheet {
    options: SheetOptions,
    progress: Arc<dyn ProgressCallback>,
}

impl Debug for ContactSheet {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ContactSheet")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Default for ContactSheet {
    fn default() -> Self {
        Self::new(SheetOptions::default())
    }
}

impl ContactSheet {
    /// Create a composer with the given layout.
    pub fn new(options: SheetOptions) -> Self {
        Self {
            options,
            progress: Arc::new(NoOpProgress),
        }
    }

    /// Report each pasted frame to `callback`.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// The layout this composer uses.
    pub fn options(&self) -> &SheetOptions {
        &self.options
    }

    /// Lay `frames` out in order, `columns` per row.
    ///
    /// Every cell is as large as the largest frame; smaller frames are
    /// centred in their cell. An empty frame list yields a canvas holding
    /// only the margin (at least 1x1).
    ///
    /// # Errors
    ///
    /// Returns [`SheetError::Image`] if a frame cannot be pasted.
    pub fn compose(&self, frames: &[FrameSample<DynamicImage>]) -> Result<DynamicImage, SheetError> {
        let SheetOptions {
            columns,
            spacing,
            margin,
            background,
            frame_width,
        } = self.options;

        let scaled: Vec<DynamicImage> = frames
            .iter()
            .map(|frame| match frame_width {
                Some(width) if width > 0 && width != frame.image.width() => {
                    let height = (u64::from(frame.image.height()) * u64::from(width))
                        / u64::from(frame.image.width().max(1));
                    frame
                        .image
                        .resize_exact(width, (height as u32).max(1), FilterType::Triangle)
                }
                _ => frame.image.clone(),
            })
            .collect();

        let count = scaled.len() as u32;
        let columns = columns.max(1).min(count.max(1));
        let rows = count.div_ceil(columns);
        let cell_width = scaled.iter().map(|image| image.width()).max().unwrap_or(0);
        let cell_height = scaled.iter().map(|image| image.height()).max().unwrap_or(0);

        let span = |cells: u32, cell: u32| {
            if cells == 0 {
                0
            } else {
                cells * cell + (cells - 1) * spacing
            }
        };
        let width = (2 * margin + span(columns.min(count), cell_width)).max(1);
        let height = (2 * margin + span(rows, cell_height)).max(1);

        log::debug!(
            "Composing {count} frame(s) into a {width}x{height} sheet ({columns} column(s))"
        );

        let mut canvas = DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, background));
        let mut tracker = ProgressTracker::new(
            self.progress.clone(),
            OperationType::SheetComposition,
            Some(u64::from(count)),
            1,
        );

        for ((index, image), frame) in scaled.iter().enumerate().zip(frames) {
            let index = index as u32;
            let (column, row) = (index % columns, index / columns);
            let x = margin + column * (cell_width + spacing) + (cell_width - image.width()) / 2;
            let y = margin + row * (cell_height + spacing) + (cell_height - image.height()) / 2;
            canvas.copy_from(image, x, y)?;
            tracker.advance(Some(frame.timestamp.offset_seconds));
        }

        Ok(canvas)
    }
}

#[cfg(test)]
mod tests {
    use image::{GenericImageView, Rgb, RgbImage};

    use super::*;
    use crate::window::Timestamp;

    fn frame(offset: u64, width: u32, height: u32, shade: u8) -> FrameSample<DynamicImage> {
        let image = RgbImage::from_pixel(width, height, Rgb([shade, shade, shade]));
        FrameSample::new(DynamicImage::ImageRgb8(image), 0.1, Timestamp::new(offset))
    }

    #[test]
    fn stacks_vertically_by_default() {
        let frames = vec![frame(5, 40, 30, 10), frame(34, 40, 30, 20), frame(63, 40, 30, 30)];
        let sheet = ContactSheet::default().compose(&frames).unwrap();

        // 3 frames of 30 rows with two 5 pixel gaps.
        assert_eq!(sheet.dimensions(), (40, 100));
        assert_eq!(sheet.get_pixel(0, 0), Rgba([10, 10, 10, 255]));
        assert_eq!(sheet.get_pixel(0, 32), Rgba([255, 255, 255, 255]));
        assert_eq!(sheet.get_pixel(0, 35), Rgba([20, 20, 20, 255]));
        assert_eq!(sheet.get_pixel(39, 99), Rgba([30, 30, 30, 255]));
    }

    #[test]
    fn grid_with_margin() {
        let frames = vec![frame(0, 10, 10, 0), frame(1, 10, 10, 0), frame(2, 10, 10, 0)];
        let options = SheetOptions::new()
            .with_columns(2)
            .with_spacing(2)
            .with_margin(3)
            .with_background(Rgba([1, 2, 3, 255]));
        let sheet = ContactSheet::new(options).compose(&frames).unwrap();

        // 2 columns x 2 rows: 3 + 10 + 2 + 10 + 3.
        assert_eq!(sheet.dimensions(), (28, 28));
        assert_eq!(sheet.get_pixel(0, 0), Rgba([1, 2, 3, 255]));
        assert_eq!(sheet.get_pixel(15, 5), Rgba([0, 0, 0, 255]));
        assert_eq!(sheet.get_pixel(5, 15), Rgba([0, 0, 0, 255]));
        // The fourth cell is empty.
        assert_eq!(sheet.get_pixel(20, 20), Rgba([1, 2, 3, 255]));
    }

    #[test]
    fn frames_are_scaled_to_common_width() {
        let frames = vec![frame(0, 80, 40, 50), frame(1, 20, 10, 50)];
        let options = SheetOptions::new().with_spacing(0).with_frame_width(Some(40));
        let sheet = ContactSheet::new(options).compose(&frames).unwrap();
        assert_eq!(sheet.dimensions(), (40, 40));
    }

    #[test]
    fn empty_selection_gives_blank_canvas() {
        let sheet = ContactSheet::default().compose(&[]).unwrap();
        assert_eq!(sheet.dimensions(), (1, 1));

        let sheet = ContactSheet::new(SheetOptions::new().with_margin(4))
            .compose(&[])
            .unwrap();
        assert_eq!(sheet.dimensions(), (8, 8));
    }
}
