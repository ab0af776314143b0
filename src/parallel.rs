//! Parallel frame sampling.
//!
//! Distributes the timestamps of a plan across [`rayon`] workers. Each
//! capture writes to its own scratch path, so workers share nothing but the
//! read-only selector, the frame source and the progress tracker.
//!
//! The public switch is
//! [`SelectionOptions::with_parallel`](crate::SelectionOptions::with_parallel);
//! this module contains only the internal implementation.

use std::sync::Mutex;

use image::DynamicImage;
use rayon::ThreadPoolBuilder;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::capture::{FrameArena, FrameSource};
use crate::configuration::FrameSize;
use crate::engine::SharpFrameSelector;
use crate::error::SheetError;
use crate::selection::FrameSample;
use crate::window::{Timestamp, TimestampPlan};

/// Sample every timestamp of `plan` in parallel.
///
/// Returns the scored samples in plan order and the number of timestamps
/// skipped under the failure policy. Runs on the global rayon pool unless
/// a thread count was configured, in which case a dedicated pool is built
/// for the pass.
pub(crate) fn sample_parallel<S>(
    selector: &SharpFrameSelector,
    plan: &TimestampPlan,
    size: FrameSize,
    arena: &FrameArena,
    source: &S,
) -> Result<(Vec<FrameSample<DynamicImage>>, usize), SheetError>
where
    S: FrameSource + ?Sized,
{
    let timestamps: Vec<Timestamp> = plan.iter().collect();
    let tracker = Mutex::new(selector.progress_tracker(timestamps.len()));

    let run = || {
        timestamps
            .par_iter()
            .map(|timestamp| {
                if selector.options().is_cancelled() {
                    return Err(SheetError::Cancelled);
                }
                let outcome = selector.sample_timestamp(timestamp, size, arena, source);
                if let Ok(mut tracker) = tracker.lock() {
                    tracker.advance(Some(timestamp.offset_seconds));
                }
                match outcome {
                    Ok(sample) => Ok(Some(sample)),
                    Err(error) => selector.absorb_failure(timestamp, error).map(|()| None),
                }
            })
            .collect::<Result<Vec<Option<FrameSample<DynamicImage>>>, SheetError>>()
    };

    let outcomes = match selector.options().threads {
        Some(threads) => {
            log::debug!("Sampling on a dedicated pool of {threads} thread(s)");
            ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map_err(|error| {
                    SheetError::InvalidConfiguration(format!("could not build thread pool: {error}"))
                })?
                .install(run)?
        }
        None => run()?,
    };

    if let Ok(mut tracker) = tracker.lock() {
        tracker.finish();
    }

    let total = outcomes.len();
    let samples: Vec<FrameSample<DynamicImage>> = outcomes.into_iter().flatten().collect();
    let failed = total - samples.len();
    Ok((samples, failed))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use image::{GrayImage, Luma};

    use crate::capture::CaptureRequest;
    use crate::configuration::SelectionOptions;
    use crate::window::MediaWindow;

    use super::*;

    fn checkerboard(request: &CaptureRequest<'_>) -> Result<(), SheetError> {
        let cell = (request.timestamp.offset_seconds % 4 + 1) as u32;
        let image = GrayImage::from_fn(request.size.width, request.size.height, |x, y| {
            Luma([if (x / cell + y / cell) % 2 == 0 { 30 } else { 220 }])
        });
        image.save(request.output)?;
        Ok(())
    }

    fn options() -> SelectionOptions {
        SelectionOptions::new()
            .with_samples(12)
            .with_groups(4)
            .with_selected(3)
            .with_delays(0.0, 0.0)
            .with_frame_size(Some(16), Some(16))
    }

    #[test]
    fn parallel_matches_sequential() {
        let window = MediaWindow::new(120.0, 0.0, 0.0);
        let sequential = SharpFrameSelector::new(options())
            .select_window(window, 16, 16, &checkerboard)
            .unwrap();
        let parallel = SharpFrameSelector::new(options().with_threads(3))
            .select_window(window, 16, 16, &checkerboard)
            .unwrap();

        let key = |frames: &[FrameSample<DynamicImage>]| -> Vec<(u64, f64)> {
            frames
                .iter()
                .map(|frame| (frame.timestamp.offset_seconds, frame.score))
                .collect()
        };
        assert_eq!(key(&sequential.frames), key(&parallel.frames));
        assert_eq!(parallel.sampled, 12);
    }

    #[test]
    fn parallel_skips_failed_timestamps() {
        let calls = AtomicUsize::new(0);
        let source = |request: &CaptureRequest<'_>| -> Result<(), SheetError> {
            calls.fetch_add(1, Ordering::Relaxed);
            if request.timestamp.offset_seconds == 30 {
                return Err(SheetError::Extraction {
                    timestamp: request.timestamp.display.clone(),
                    reason: "corrupt".to_string(),
                });
            }
            checkerboard(request)
        };
        let selection = SharpFrameSelector::new(options().with_parallel(true))
            .select_window(MediaWindow::new(120.0, 0.0, 0.0), 16, 16, &source)
            .unwrap();

        assert_eq!(selection.sampled, 11);
        assert_eq!(selection.failed, 1);
        // The failed timestamp was tried with both seek modes.
        assert_eq!(calls.load(Ordering::Relaxed), 13);
    }
}
