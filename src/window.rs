//! Sampling window and timestamp planning.
//!
//! A [`MediaWindow`] is the part of a video that is eligible for sampling:
//! the full duration minus a configurable number of seconds at the start
//! (intros, logos) and at the end (credits). [`TimestampPlan`] spreads a
//! fixed number of candidate timestamps evenly across that window.
//!
//! # Example
//!
//! ```
//! use sharpsheet::{MediaWindow, SheetError};
//!
//! let window = MediaWindow::new(600.0, 5.0, 5.0);
//! let plan = window.plan(20)?;
//! assert_eq!(plan.capture_interval(), 29);
//!
//! let offsets: Vec<u64> = plan.iter().map(|t| t.offset_seconds).collect();
//! assert_eq!(offsets.first(), Some(&5));
//! assert_eq!(offsets.len(), 20);
//! # Ok::<(), SheetError>(())
//! ```

use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::error::SheetError;

/// The portion of a media timeline eligible for sampling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaWindow {
    /// Total media duration in seconds, as reported by the prober.
    pub duration_seconds: f64,
    /// Seconds skipped at the beginning of the media.
    pub start_delay: f64,
    /// Seconds skipped at the end of the media.
    pub end_delay: f64,
}

impl MediaWindow {
    /// Create a window from a duration and the two delays.
    pub fn new(duration_seconds: f64, start_delay: f64, end_delay: f64) -> Self {
        Self {
            duration_seconds,
            start_delay,
            end_delay,
        }
    }

    /// Length of the sampling window in seconds. May be negative for an
    /// empty window.
    pub fn span(&self) -> f64 {
        self.duration_seconds - self.start_delay - self.end_delay
    }

    /// Returns `true` if no sample can be taken from this window.
    pub fn is_empty(&self) -> bool {
        !(self.span() > 0.0)
    }

    /// Build a timestamp plan with `num_samples` evenly spaced samples.
    ///
    /// # Errors
    ///
    /// Returns [`SheetError::InvalidWindow`] when the window is empty, any
    /// input is negative or not finite, `num_samples` is zero, or the
    /// resulting capture interval would be shorter than one second.
    pub fn plan(&self, num_samples: usize) -> Result<TimestampPlan, SheetError> {
        TimestampPlan::new(*self, num_samples)
    }

    fn invalid(&self, num_samples: usize) -> SheetError {
        SheetError::InvalidWindow {
            duration_seconds: self.duration_seconds,
            start_delay: self.start_delay,
            end_delay: self.end_delay,
            num_samples,
        }
    }
}

/// A sampled position on the media timeline.
///
/// Ordering and equality follow `offset_seconds`; `display` is derived from
/// it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    /// Whole seconds from the start of the media.
    pub offset_seconds: u64,
    /// Human-readable rendering, `MM:SS` or `H:MM:SS`.
    pub display: String,
}

impl Timestamp {
    /// Create a timestamp at a whole-second offset.
    pub fn new(offset_seconds: u64) -> Self {
        Self {
            offset_seconds,
            display: format_timestamp(offset_seconds as f64),
        }
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.display)
    }
}

/// An evenly spaced, restartable set of sampling timestamps.
///
/// The plan stores only its bounds, so [`iter`](TimestampPlan::iter) can be
/// called any number of times and always yields the same sequence. The
/// engine relies on this: it walks the plan once to log it and again to
/// drive extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampPlan {
    start: u64,
    end: u64,
    capture_interval: u64,
    num_samples: usize,
}

impl TimestampPlan {
    /// Compute the plan for `window` with `num_samples` samples.
    ///
    /// `capture_interval = floor(span / num_samples)`, the first offset is
    /// `ceil(start_delay)` and every offset is strictly below
    /// `floor(duration - end_delay)`. Flooring the interval can leave room
    /// for extra steps before the end; the plan never yields more than
    /// `num_samples` timestamps.
    ///
    /// # Errors
    ///
    /// See [`MediaWindow::plan`].
    pub fn new(window: MediaWindow, num_samples: usize) -> Result<Self, SheetError> {
        let inputs_valid = [window.duration_seconds, window.start_delay, window.end_delay]
            .iter()
            .all(|value| value.is_finite() && *value >= 0.0);
        if !inputs_valid || num_samples == 0 || window.is_empty() {
            return Err(window.invalid(num_samples));
        }

        let capture_interval = (window.span() / num_samples as f64).floor();
        if capture_interval <= 0.0 {
            return Err(window.invalid(num_samples));
        }

        let start = window.start_delay.ceil() as u64;
        let end = (window.duration_seconds - window.end_delay).floor() as u64;

        log::debug!(
            "Planned sampling window [{start}s, {end}s) every {capture_interval}s ({num_samples} samples requested)"
        );

        Ok(Self {
            start,
            end,
            capture_interval: capture_interval as u64,
            num_samples,
        })
    }

    /// Seconds between consecutive timestamps.
    pub fn capture_interval(&self) -> u64 {
        self.capture_interval
    }

    /// First offset of the plan, in seconds.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Exclusive upper bound of the plan, in seconds.
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Number of timestamps the plan yields.
    pub fn len(&self) -> usize {
        self.iter().len()
    }

    /// Returns `true` if the plan yields no timestamps.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over the planned timestamps in ascending order.
    pub fn iter(&self) -> Timestamps {
        Timestamps {
            next: self.start,
            end: self.end,
            step: self.capture_interval,
            remaining: self.num_samples,
        }
    }
}

impl IntoIterator for &TimestampPlan {
    type Item = Timestamp;
    type IntoIter = Timestamps;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the timestamps of a [`TimestampPlan`].
#[derive(Debug, Clone)]
pub struct Timestamps {
    next: u64,
    end: u64,
    step: u64,
    remaining: usize,
}

impl Iterator for Timestamps {
    type Item = Timestamp;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 || self.next >= self.end {
            return None;
        }
        let offset = self.next;
        self.next = self.next.saturating_add(self.step);
        self.remaining -= 1;
        Some(Timestamp::new(offset))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let in_range = if self.next >= self.end {
            0
        } else {
            (self.end - self.next).div_ceil(self.step) as usize
        };
        let remaining = in_range.min(self.remaining);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Timestamps {}

/// Render a number of seconds as `MM:SS`, or `H:MM:SS` past the hour.
///
/// Seconds are rounded to the nearest whole second before splitting, so the
/// seconds field never reads `60`.
///
/// ```
/// use sharpsheet::format_timestamp;
///
/// assert_eq!(format_timestamp(5.0), "00:05");
/// assert_eq!(format_timestamp(754.0), "12:34");
/// assert_eq!(format_timestamp(3725.0), "1:02:05");
/// ```
pub fn format_timestamp(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.round() as u64
    } else {
        0
    };
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes:02}:{secs:02}")
    }
}
