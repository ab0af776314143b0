//! Selection configuration.
//!
//! [`SelectionOptions`] is a builder that carries the sampling density,
//! grouping parameters, frame size, fault tolerance, progress callbacks and
//! cancellation tokens through a selection pass without polluting every
//! function signature.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use sharpsheet::{
//!     CancellationToken, FailurePolicy, ProgressCallback, ProgressInfo, SelectionOptions,
//! };
//!
//! struct LogProgress;
//! impl ProgressCallback for LogProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         println!("{:?}: {} done", info.operation, info.current);
//!     }
//! }
//!
//! let token = CancellationToken::new();
//! let options = SelectionOptions::new()
//!     .with_samples(40)
//!     .with_groups(6)
//!     .with_selected(4)
//!     .with_delays(10.0, 30.0)
//!     .with_failure_policy(FailurePolicy::Abort)
//!     .with_extraction_timeout(Duration::from_secs(10))
//!     .with_progress(Arc::new(LogProgress))
//!     .with_cancellation(token.clone());
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;
use std::time::Duration;

use crate::error::SheetError;
use crate::progress::{CancellationToken, NoOpProgress, ProgressCallback};
use crate::sharpness::DEFAULT_TOP_QUANTILE;

/// Default number of candidate timestamps.
pub const DEFAULT_SAMPLES: usize = 21;
/// Default number of timeline groups.
pub const DEFAULT_GROUPS: usize = 4;
/// Default number of frames kept for the sheet.
pub const DEFAULT_SELECTED: usize = 3;
/// Default seconds skipped at each end of the media.
pub const DEFAULT_DELAY_SECONDS: f64 = 5.0;
/// Default width of extracted frames when no size is configured.
pub const DEFAULT_TARGET_WIDTH: u32 = 600;
/// Default limit on a single frame extraction.
pub const DEFAULT_EXTRACTION_TIMEOUT: Duration = Duration::from_secs(30);

/// What to do with a timestamp whose frame could not be extracted, even
/// after retrying with accurate seeking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Drop the timestamp and keep sampling. The pass still fails if fewer
    /// samples than groups survive. This is the default.
    #[default]
    Skip,
    /// Fail the whole pass on the first unrecoverable extraction.
    Abort,
}

/// Pixel dimensions of an extracted frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl FrameSize {
    /// Create a frame size.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Configuration for a selection pass.
///
/// All fields have defaults; a default-constructed value reproduces the
/// classic behaviour: 21 samples, 4 groups, 3 selected frames, 5 seconds
/// skipped at both ends, 600 pixel wide frames.
#[derive(Clone)]
pub struct SelectionOptions {
    pub(crate) num_samples: usize,
    pub(crate) num_groups: usize,
    pub(crate) num_selected: usize,
    pub(crate) start_delay_seconds: f64,
    pub(crate) end_delay_seconds: f64,
    pub(crate) width: Option<u32>,
    pub(crate) height: Option<u32>,
    pub(crate) target_width: u32,
    pub(crate) top_quantile: f64,
    pub(crate) failure_policy: FailurePolicy,
    pub(crate) extraction_timeout: Duration,
    /// Progress callback. Defaults to a no-op.
    pub(crate) progress: Arc<dyn ProgressCallback>,
    /// Cancellation token. `None` means never cancelled.
    pub(crate) cancellation: Option<CancellationToken>,
    /// How often to fire the progress callback (every N timestamps).
    pub(crate) batch_size: u64,
    pub(crate) parallel: bool,
    pub(crate) threads: Option<usize>,
}

impl Debug for SelectionOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("SelectionOptions")
            .field("num_samples", &self.num_samples)
            .field("num_groups", &self.num_groups)
            .field("num_selected", &self.num_selected)
            .field("start_delay_seconds", &self.start_delay_seconds)
            .field("end_delay_seconds", &self.end_delay_seconds)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("target_width", &self.target_width)
            .field("top_quantile", &self.top_quantile)
            .field("failure_policy", &self.failure_policy)
            .field("extraction_timeout", &self.extraction_timeout)
            .field("has_cancellation", &self.cancellation.is_some())
            .field("batch_size", &self.batch_size)
            .field("parallel", &self.parallel)
            .field("threads", &self.threads)
            .finish()
    }
}

impl Default for SelectionOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self {
            num_samples: DEFAULT_SAMPLES,
            num_groups: DEFAULT_GROUPS,
            num_selected: DEFAULT_SELECTED,
            start_delay_seconds: DEFAULT_DELAY_SECONDS,
            end_delay_seconds: DEFAULT_DELAY_SECONDS,
            width: None,
            height: None,
            target_width: DEFAULT_TARGET_WIDTH,
            top_quantile: DEFAULT_TOP_QUANTILE,
            failure_policy: FailurePolicy::Skip,
            extraction_timeout: DEFAULT_EXTRACTION_TIMEOUT,
            progress: Arc::new(NoOpProgress),
            cancellation: None,
            batch_size: 1,
            parallel: false,
            threads: None,
        }
    }

    /// Number of candidate timestamps to sample.
    #[must_use]
    pub fn with_samples(mut self, num_samples: usize) -> Self {
        self.num_samples = num_samples;
        self
    }

    /// Number of contiguous timeline groups.
    #[must_use]
    pub fn with_groups(mut self, num_groups: usize) -> Self {
        self.num_groups = num_groups;
        self
    }

    /// Maximum number of frames to select.
    #[must_use]
    pub fn with_selected(mut self, num_selected: usize) -> Self {
        self.num_selected = num_selected;
        self
    }

    /// Seconds to skip at the start and at the end of the media.
    #[must_use]
    pub fn with_delays(mut self, start_seconds: f64, end_seconds: f64) -> Self {
        self.start_delay_seconds = start_seconds;
        self.end_delay_seconds = end_seconds;
        self
    }

    /// Fix the size of extracted frames.
    ///
    /// Pass `None` for either dimension to derive it from the display
    /// aspect ratio of the media.
    #[must_use]
    pub fn with_frame_size(mut self, width: Option<u32>, height: Option<u32>) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Width used when neither dimension is fixed. Defaults to 600.
    #[must_use]
    pub fn with_target_width(mut self, width: u32) -> Self {
        self.target_width = width;
        self
    }

    /// Fraction of the spectrum used by the sharpness metric. Defaults to
    /// 0.05.
    #[must_use]
    pub fn with_top_quantile(mut self, quantile: f64) -> Self {
        self.top_quantile = quantile;
        self
    }

    /// What to do when a timestamp cannot be extracted.
    #[must_use]
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Time limit for one extraction attempt. Defaults to 30 seconds.
    #[must_use]
    pub fn with_extraction_timeout(mut self, timeout: Duration) -> Self {
        self.extraction_timeout = timeout;
        self
    }

    /// Attach a progress callback.
    ///
    /// The callback is invoked every [`batch_size`](SelectionOptions::with_batch_size)
    /// timestamps.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Attach a cancellation token.
    ///
    /// When the token is cancelled, the sampling loop stops and returns
    /// [`SheetError::Cancelled`].
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Set how often the progress callback fires.
    ///
    /// A value of 1 means every timestamp. Clamped to a minimum of 1.
    #[must_use]
    pub fn with_batch_size(mut self, size: u64) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Extract and score timestamps on a rayon thread pool.
    ///
    /// Has no effect unless the crate is built with the `rayon` feature.
    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Use a dedicated pool of `threads` workers for parallel sampling.
    /// Implies [`with_parallel(true)`](SelectionOptions::with_parallel).
    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self.parallel = true;
        self
    }

    /// Number of candidate timestamps.
    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    /// Number of timeline groups.
    pub fn num_groups(&self) -> usize {
        self.num_groups
    }

    /// Maximum number of selected frames.
    pub fn num_selected(&self) -> usize {
        self.num_selected
    }

    /// Seconds skipped at the start of the media.
    pub fn start_delay_seconds(&self) -> f64 {
        self.start_delay_seconds
    }

    /// Seconds skipped at the end of the media.
    pub fn end_delay_seconds(&self) -> f64 {
        self.end_delay_seconds
    }

    /// The configured failure policy.
    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    /// The configured extraction timeout.
    pub fn extraction_timeout(&self) -> Duration {
        self.extraction_timeout
    }

    /// Check that every setting is in range.
    ///
    /// # Errors
    ///
    /// Returns [`SheetError::InvalidConfiguration`] naming the first
    /// offending setting.
    pub fn validate(&self) -> Result<(), SheetError> {
        let invalid = |message: String| Err(SheetError::InvalidConfiguration(message));

        if self.num_groups == 0 {
            return invalid("group count must be at least 1".to_string());
        }
        if self.num_selected == 0 || self.num_selected > self.num_groups {
            return invalid(format!(
                "selected count must be between 1 and the group count ({}), got {}",
                self.num_groups, self.num_selected
            ));
        }
        if self.num_samples < self.num_groups {
            return invalid(format!(
                "sample count ({}) must be at least the group count ({})",
                self.num_samples, self.num_groups
            ));
        }
        for (name, value) in [
            ("start delay", self.start_delay_seconds),
            ("end delay", self.end_delay_seconds),
        ] {
            if !value.is_finite() || value < 0.0 {
                return invalid(format!("{name} must be a non-negative number, got {value}"));
            }
        }
        if !(self.top_quantile > 0.0 && self.top_quantile <= 1.0) {
            return invalid(format!(
                "top quantile must be in (0, 1], got {}",
                self.top_quantile
            ));
        }
        if self.width == Some(0) || self.height == Some(0) || self.target_width == 0 {
            return invalid("frame dimensions must be non-zero".to_string());
        }
        if self.extraction_timeout.is_zero() {
            return invalid("extraction timeout must be non-zero".to_string());
        }
        if self.threads == Some(0) {
            return invalid("thread count must be at least 1".to_string());
        }
        Ok(())
    }

    /// Resolve the extraction size for media with the given display size.
    ///
    /// Fixed dimensions win; a missing dimension is derived from the display
    /// aspect ratio (rounding down); with neither fixed, the target width is
    /// used.
    ///
    /// # Errors
    ///
    /// Returns [`SheetError::InvalidConfiguration`] if a dimension has to be
    /// derived from a zero display size.
    pub fn resolve_frame_size(
        &self,
        display_width: u32,
        display_height: u32,
    ) -> Result<FrameSize, SheetError> {
        let derive = |numerator: u32, known: u32, denominator: u32| {
            if denominator == 0 || numerator == 0 {
                return Err(SheetError::InvalidConfiguration(format!(
                    "cannot derive frame size from display size {display_width}x{display_height}"
                )));
            }
            let derived = (u64::from(numerator) * u64::from(known)) / u64::from(denominator);
            Ok(derived.clamp(1, u64::from(u32::MAX)) as u32)
        };

        match (self.width, self.height) {
            (Some(width), Some(height)) => Ok(FrameSize::new(width, height)),
            (Some(width), None) => Ok(FrameSize::new(
                width,
                derive(display_height, width, display_width)?,
            )),
            (None, Some(height)) => Ok(FrameSize::new(
                derive(display_width, height, display_height)?,
                height,
            )),
            (None, None) => Ok(FrameSize::new(
                self.target_width,
                derive(display_height, self.target_width, display_width)?,
            )),
        }
    }

    /// Returns `true` if cancellation has been requested.
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
    }
}
