//! Progress reporting and cancellation support.
//!
//! A pass reports through a [`ProgressCallback`] set on the options and
//! stops early when its [`CancellationToken`] is cancelled.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use sharpsheet::{
//!     FfmpegCapture, MediaInfo, ProgressCallback, ProgressInfo, SelectionOptions,
//!     SharpFrameSelector, SheetError,
//! };
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         if let Some(pct) = info.percentage {
//!             println!("[{:?}] {pct:.1}% complete", info.operation);
//!         }
//!     }
//! }
//!
//! let media = MediaInfo::probe("input.mp4")?;
//! let options = SelectionOptions::new().with_progress(Arc::new(PrintProgress));
//! let selection = SharpFrameSelector::new(options).select(&media, &FfmpegCapture::new(&media.path))?;
//! # Ok::<(), SheetError>(())
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::{Duration, Instant};

/// Stage of a pass that a [`ProgressInfo`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum OperationType {
    /// Capturing and scoring the planned timestamps.
    FrameSampling,
    /// Grouping scored samples and picking the sharpest.
    Selection,
    /// Pasting selected frames into a contact sheet.
    SheetComposition,
}

/// Where a stage stands after its latest reported item.
///
/// Sampling reports every
/// [`batch_size`](crate::SelectionOptions::with_batch_size) timestamps.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    pub operation: OperationType,
    /// Items finished so far.
    pub current: u64,
    pub total: Option<u64>,
    /// `current / total` in percent; `None` without a known total.
    pub percentage: Option<f32>,
    pub elapsed: Duration,
    /// Linear extrapolation from the average time per finished item.
    pub estimated_remaining: Option<Duration>,
    /// Timestamp (in seconds) of the item that triggered this report.
    pub current_offset: Option<u64>,
}

/// Receives [`ProgressInfo`] snapshots.
///
/// With the `rayon` feature, sampling reports arrive from worker threads.
/// A callback only observes; stopping a pass goes through
/// [`CancellationToken`].
pub trait ProgressCallback: Send + Sync {
    fn on_progress(&self, info: &ProgressInfo);
}

/// Used when no callback is configured.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Shared stop flag for a selection pass.
///
/// Clones share one flag. The engine checks it before each timestamp and
/// returns [`SheetError::Cancelled`](crate::SheetError::Cancelled) once set.
///
/// ```
/// use sharpsheet::CancellationToken;
///
/// let token = CancellationToken::new();
/// let handle = token.clone();
/// handle.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Counts finished items of one stage and forwards every `batch_size`th
/// one to the callback.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    operation: OperationType,
    total: Option<u64>,
    done: u64,
    pending: u64,
    batch_size: u64,
    started: Instant,
}

impl ProgressTracker {
    pub(crate) fn new(
        callback: Arc<dyn ProgressCallback>,
        operation: OperationType,
        total: Option<u64>,
        batch_size: u64,
    ) -> Self {
        Self {
            callback,
            operation,
            total,
            done: 0,
            pending: 0,
            batch_size: batch_size.max(1),
            started: Instant::now(),
        }
    }

    pub(crate) fn advance(&mut self, offset: Option<u64>) {
        self.done += 1;
        self.pending += 1;
        if self.pending == self.batch_size {
            self.pending = 0;
            self.emit(offset);
        }
    }

    /// Report the final count even when it does not close a batch.
    pub(crate) fn finish(&mut self) {
        self.emit(None);
    }

    fn emit(&self, offset: Option<u64>) {
        let elapsed = self.started.elapsed();
        let total = self.total;
        let percentage = total
            .filter(|&total| total > 0)
            .map(|total| self.done as f32 * 100.0 / total as f32);
        let estimated_remaining = total.filter(|_| self.done > 0).map(|total| {
            let left = total.saturating_sub(self.done);
            elapsed.mul_f64(left as f64 / self.done as f64)
        });

        self.callback.on_progress(&ProgressInfo {
            operation: self.operation,
            current: self.done,
            total,
            percentage,
            elapsed,
            estimated_remaining,
            current_offset: offset,
        });
    }
}
