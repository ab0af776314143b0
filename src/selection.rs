//! Grouped sharpest-frame selection.
//!
//! Picking the N best-scoring frames outright tends to return N neighbours
//! from the one well-lit, static shot of a video. Instead, scored samples
//! are split into contiguous groups along the timeline, the sharpest sample
//! of each group is kept, and only then are the group winners ranked.
//!
//! Everything here is a pure function over owned or borrowed samples. The
//! image handle type `I` is opaque: it is carried along, never inspected.
//!
//! # Example
//!
//! ```
//! use sharpsheet::{FrameSample, Timestamp, select_sharpest};
//!
//! let samples: Vec<FrameSample<&str>> = [(10, 0.5), (20, 0.1), (30, 0.3), (40, 0.2)]
//!     .into_iter()
//!     .map(|(offset, score)| FrameSample::new("frame", score, Timestamp::new(offset)))
//!     .collect();
//!
//! let selected = select_sharpest(samples, 2, 2);
//! let offsets: Vec<u64> = selected.iter().map(|s| s.timestamp.offset_seconds).collect();
//! assert_eq!(offsets, vec![20, 40]);
//! ```

use std::cmp::Ordering;

use crate::window::Timestamp;

/// A scored frame at a point on the timeline.
///
/// `score` is a blurriness value: lower is sharper, `f64::INFINITY` marks a
/// degenerate frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSample<I> {
    /// Handle to the frame's image data.
    pub image: I,
    /// Blurriness score of the frame.
    pub score: f64,
    /// Where on the timeline the frame was taken.
    pub timestamp: Timestamp,
}

impl<I> FrameSample<I> {
    /// Create a sample.
    pub fn new(image: I, score: f64, timestamp: Timestamp) -> Self {
        Self {
            image,
            score,
            timestamp,
        }
    }

    /// Replace the image handle, keeping score and timestamp.
    pub fn map_image<J>(self, f: impl FnOnce(I) -> J) -> FrameSample<J> {
        FrameSample {
            image: f(self.image),
            score: self.score,
            timestamp: self.timestamp,
        }
    }
}

/// Sharper first; equal scores resolve to the earlier timestamp.
fn by_score_then_time<I>(a: &FrameSample<I>, b: &FrameSample<I>) -> Ordering {
    a.score
        .total_cmp(&b.score)
        .then_with(|| a.timestamp.offset_seconds.cmp(&b.timestamp.offset_seconds))
}

/// Number of samples per group when splitting `len` samples into
/// `num_groups` contiguous groups (`ceil(len / num_groups)`).
///
/// A group count of zero is treated as one group.
pub fn chunk_size(len: usize, num_groups: usize) -> usize {
    len.div_ceil(num_groups.max(1))
}

/// The sharpest sample of a group, or `None` for an empty group.
///
/// Ties on score go to the sample with the smaller offset.
pub fn sharpest<I>(group: &[FrameSample<I>]) -> Option<&FrameSample<I>> {
    group.iter().min_by(|a, b| by_score_then_time(a, b))
}

/// Select up to `num_selected` temporally spread sharp samples.
///
/// 1. Samples are ordered by timestamp.
/// 2. They are split into contiguous groups of [`chunk_size`] samples; the
///    last group may be shorter.
/// 3. The [`sharpest`] sample of each group is kept.
/// 4. Group winners are ranked by score and the best `num_selected` kept.
/// 5. The result is returned in timeline order.
///
/// The result holds `min(num_selected, number of groups)` samples, and is
/// empty for empty input.
pub fn select_sharpest<I>(
    mut samples: Vec<FrameSample<I>>,
    num_groups: usize,
    num_selected: usize,
) -> Vec<FrameSample<I>> {
    if samples.is_empty() || num_selected == 0 {
        return Vec::new();
    }

    samples.sort_by_key(|sample| sample.timestamp.offset_seconds);
    let size = chunk_size(samples.len(), num_groups);

    let mut winners: Vec<FrameSample<I>> = Vec::with_capacity(num_groups.max(1));
    let mut remaining = samples.into_iter();
    while let Some(winner) = remaining.by_ref().take(size).min_by(by_score_then_time) {
        winners.push(winner);
    }

    log::debug!(
        "Selected {} group winner(s) from groups of {}",
        winners.len(),
        size
    );

    winners.sort_by(by_score_then_time);
    winners.truncate(num_selected);
    winners.sort_by_key(|sample| sample.timestamp.offset_seconds);
    winners
}
