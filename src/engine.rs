//! The selection pipeline.
//!
//! [`SharpFrameSelector`] drives one pass: plan timestamps over the sampling
//! window, capture and score a frame at each of them, then keep the
//! sharpest frame of each timeline group. Frame capture is delegated to a
//! [`FrameSource`]; everything else is deterministic.

use image::DynamicImage;

use crate::capture::{CaptureRequest, FrameArena, FrameSource, SeekMode};
use crate::configuration::{FailurePolicy, FrameSize, SelectionOptions};
use crate::error::SheetError;
use crate::probe::MediaInfo;
use crate::progress::{OperationType, ProgressTracker};
use crate::selection::{FrameSample, select_sharpest};
use crate::sharpness::SharpnessScorer;
use crate::window::{MediaWindow, Timestamp, TimestampPlan};

/// Outcome of a selection pass.
#[derive(Debug, Clone)]
pub struct Selection {
    /// Selected frames in timeline order.
    pub frames: Vec<FrameSample<DynamicImage>>,
    /// Timestamps that produced a scored frame.
    pub sampled: usize,
    /// Timestamps skipped because no frame could be extracted.
    pub failed: usize,
}

impl Selection {
    /// Number of selected frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Returns `true` if no frame was selected.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Picks a few sharp, temporally spread frames from a video.
///
/// # Example
///
/// ```no_run
/// use sharpsheet::{FfmpegCapture, MediaInfo, SelectionOptions, SharpFrameSelector};
///
/// let media = MediaInfo::probe("input.mp4")?;
/// let selector = SharpFrameSelector::new(SelectionOptions::new().with_selected(2));
/// let selection = selector.select(&media, &FfmpegCapture::new(&media.path))?;
/// for frame in &selection.frames {
///     println!("{} score {:.5}", frame.timestamp, frame.score);
/// }
/// # Ok::<(), sharpsheet::SheetError>(())
/// ```
#[derive(Debug, Clone)]
pub struct SharpFrameSelector {
    options: SelectionOptions,
    scorer: SharpnessScorer,
}

impl Default for SharpFrameSelector {
    fn default() -> Self {
        Self::new(SelectionOptions::default())
    }
}

impl SharpFrameSelector {
    /// Create a selector with the given options.
    pub fn new(options: SelectionOptions) -> Self {
        let scorer = SharpnessScorer::new().with_top_quantile(options.top_quantile);
        Self { options, scorer }
    }

    /// The options this selector runs with.
    pub fn options(&self) -> &SelectionOptions {
        &self.options
    }

    /// Run a selection pass over probed media.
    ///
    /// # Errors
    ///
    /// See [`select_window`](SharpFrameSelector::select_window).
    pub fn select<S>(&self, media: &MediaInfo, source: &S) -> Result<Selection, SheetError>
    where
        S: FrameSource + ?Sized,
    {
        let window = media.window(
            self.options.start_delay_seconds,
            self.options.end_delay_seconds,
        );
        self.select_window(window, media.display_width, media.display_height, source)
    }

    /// Run a selection pass over an explicit window of media whose frames
    /// display at `display_width` x `display_height`.
    ///
    /// # Errors
    ///
    /// - [`SheetError::InvalidConfiguration`] if the options are out of range.
    /// - [`SheetError::InvalidWindow`] if the window cannot hold the samples.
    /// - [`SheetError::Extraction`] under [`FailurePolicy::Abort`] when a
    ///   timestamp fails with both seek modes.
    /// - [`SheetError::InsufficientSamples`] if fewer frames were scored
    ///   than there are groups, or than the plan holds when it is shorter.
    /// - [`SheetError::Cancelled`] if the cancellation token fires.
    pub fn select_window<S>(
        &self,
        window: MediaWindow,
        display_width: u32,
        display_height: u32,
        source: &S,
    ) -> Result<Selection, SheetError>
    where
        S: FrameSource + ?Sized,
    {
        self.options.validate()?;
        let plan = window.plan(self.options.num_samples)?;
        let size = self
            .options
            .resolve_frame_size(display_width, display_height)?;

        if log::log_enabled!(log::Level::Debug) {
            let offsets: Vec<String> = plan.iter().map(|timestamp| timestamp.display).collect();
            log::debug!(
                "Sampling {} frame(s) at {}x{}: {}",
                plan.len(),
                size.width,
                size.height,
                offsets.join(", ")
            );
        }

        let arena = FrameArena::new()?;
        let (samples, failed) = self.sample(&plan, size, &arena, source)?;
        drop(arena);

        // A short plan groups what it has; only failed captures can starve it.
        let required = self.options.num_groups.min(plan.len()).max(1);
        let sampled = samples.len();
        if sampled < required {
            return Err(SheetError::InsufficientSamples {
                available: sampled,
                required,
            });
        }

        let mut tracker = ProgressTracker::new(
            self.options.progress.clone(),
            OperationType::Selection,
            Some(1),
            1,
        );
        let frames = select_sharpest(samples, self.options.num_groups, self.options.num_selected);
        tracker.advance(None);

        log::info!(
            "Selected {} frame(s) from {sampled} sample(s), {failed} failed",
            frames.len()
        );

        Ok(Selection {
            frames,
            sampled,
            failed,
        })
    }

    #[cfg(feature = "rayon")]
    fn sample<S>(
        &self,
        plan: &TimestampPlan,
        size: FrameSize,
        arena: &FrameArena,
        source: &S,
    ) -> Result<(Vec<FrameSample<DynamicImage>>, usize), SheetError>
    where
        S: FrameSource + ?Sized,
    {
        if self.options.parallel {
            crate::parallel::sample_parallel(self, plan, size, arena, source)
        } else {
            self.sample_sequential(plan, size, arena, source)
        }
    }

    #[cfg(not(feature = "rayon"))]
    fn sample<S>(
        &self,
        plan: &TimestampPlan,
        size: FrameSize,
        arena: &FrameArena,
        source: &S,
    ) -> Result<(Vec<FrameSample<DynamicImage>>, usize), SheetError>
    where
        S: FrameSource + ?Sized,
    {
        if self.options.parallel {
            log::debug!("Built without the rayon feature, sampling sequentially");
        }
        self.sample_sequential(plan, size, arena, source)
    }

    fn sample_sequential<S>(
        &self,
        plan: &TimestampPlan,
        size: FrameSize,
        arena: &FrameArena,
        source: &S,
    ) -> Result<(Vec<FrameSample<DynamicImage>>, usize), SheetError>
    where
        S: FrameSource + ?Sized,
    {
        let mut tracker = self.progress_tracker(plan.len());
        let mut samples = Vec::with_capacity(plan.len());
        let mut failed = 0;

        for timestamp in plan {
            if self.options.is_cancelled() {
                return Err(SheetError::Cancelled);
            }
            match self.sample_timestamp(&timestamp, size, arena, source) {
                Ok(sample) => samples.push(sample),
                Err(error) => {
                    self.absorb_failure(&timestamp, error)?;
                    failed += 1;
                }
            }
            tracker.advance(Some(timestamp.offset_seconds));
        }

        tracker.finish();
        Ok((samples, failed))
    }

    /// Capture and score the frame at `timestamp`, retrying once with
    /// accurate seeking when the fast seek fails.
    pub(crate) fn sample_timestamp<S>(
        &self,
        timestamp: &Timestamp,
        size: FrameSize,
        arena: &FrameArena,
        source: &S,
    ) -> Result<FrameSample<DynamicImage>, SheetError>
    where
        S: FrameSource + ?Sized,
    {
        let image = match self.capture(timestamp, size, SeekMode::Fast, arena, source) {
            Ok(image) => image,
            Err(SheetError::Cancelled) => return Err(SheetError::Cancelled),
            Err(error) => {
                log::warn!("Fast seek failed at {timestamp} ({error}), retrying with accurate seek");
                self.capture(timestamp, size, SeekMode::Accurate, arena, source)?
            }
        };

        let score = self.scorer.score_image(&image);
        log::debug!("Frame at {timestamp} scored {score:.6}");
        Ok(FrameSample::new(image, score, timestamp.clone()))
    }

    /// Apply the failure policy to an unrecoverable timestamp.
    pub(crate) fn absorb_failure(
        &self,
        timestamp: &Timestamp,
        error: SheetError,
    ) -> Result<(), SheetError> {
        match (self.options.failure_policy, error) {
            (_, SheetError::Cancelled) => Err(SheetError::Cancelled),
            (FailurePolicy::Abort, error) => Err(error),
            (FailurePolicy::Skip, error) => {
                log::warn!("Skipping {timestamp}: {error}");
                Ok(())
            }
        }
    }

    fn capture<S>(
        &self,
        timestamp: &Timestamp,
        size: FrameSize,
        seek: SeekMode,
        arena: &FrameArena,
        source: &S,
    ) -> Result<DynamicImage, SheetError>
    where
        S: FrameSource + ?Sized,
    {
        let scratch = arena.scratch(timestamp, seek);
        source.extract(&CaptureRequest {
            timestamp,
            size,
            seek,
            output: scratch.path(),
            timeout: self.options.extraction_timeout,
        })?;

        image::open(scratch.path()).map_err(|error| SheetError::Extraction {
            timestamp: timestamp.display.clone(),
            reason: format!("could not decode frame: {error}"),
        })
    }

    pub(crate) fn progress_tracker(&self, total: usize) -> ProgressTracker {
        ProgressTracker::new(
            self.options.progress.clone(),
            OperationType::FrameSampling,
            Some(total as u64),
            self.options.batch_size,
        )
    }
}
