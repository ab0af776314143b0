//! # sharpsheet
//!
//! Pick a few sharp, representative frames from a video and lay them out as
//! a contact sheet.
//!
//! A selection pass samples evenly spaced timestamps inside the media (minus
//! a delay at each end), scores the frame at each timestamp with a
//! frequency-domain blurriness metric, splits the samples into contiguous
//! timeline groups, keeps the sharpest frame of each group and finally the
//! best few of those, in timeline order. Probing and frame capture go
//! through the `ffprobe` and `ffmpeg` command-line tools by default, behind
//! the [`FrameSource`] trait.
//!
//! ## Quick Start
//!
//! ```no_run
//! use sharpsheet::{
//!     ContactSheet, FfmpegCapture, MediaInfo, SelectionOptions, SharpFrameSelector, SheetOptions,
//! };
//!
//! let media = MediaInfo::probe("input.mp4")?;
//! let selector = SharpFrameSelector::new(SelectionOptions::new());
//! let selection = selector.select(&media, &FfmpegCapture::new(&media.path))?;
//!
//! let sheet = ContactSheet::new(SheetOptions::new()).compose(&selection.frames)?;
//! sheet.save("input.mp4.png")?;
//! # Ok::<(), sharpsheet::SheetError>(())
//! ```
//!
//! ### Scoring a Single Image
//!
//! ```no_run
//! use sharpsheet::SharpnessScorer;
//!
//! let image = image::open("frame.png")?;
//! let score = SharpnessScorer::new().score_image(&image);
//! println!("blurriness: {score:.6} (lower is sharper)");
//! # Ok::<(), image::ImageError>(())
//! ```
//!
//! ## Features
//!
//! - **Timestamp planning**: evenly spaced, restartable sample plans with
//!   configurable start and end delays
//! - **Sharpness scoring**: inverse median of the strongest spectral
//!   magnitudes of the frame's luma
//! - **Grouped selection**: one candidate per timeline group, so the
//!   result is spread over the whole video
//! - **Fault tolerance**: fast seek with an accurate-seek retry, skip or
//!   abort policies, per-capture timeouts
//! - **Progress & cancellation**: cooperative callbacks and
//!   [`CancellationToken`]
//! - **Contact sheets**: vertical stacks or grids of the selected frames
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `rayon` | Capture and score timestamps across rayon threads |
//! | `full` | Enables all of the above |
//!
//! ## Requirements
//!
//! `ffmpeg` and `ffprobe` must be on `PATH` for [`MediaInfo::probe`] and
//! [`FfmpegCapture`]. Custom [`FrameSource`] implementations need neither.

pub mod capture;
pub mod configuration;
pub mod engine;
pub mod error;
#[cfg(feature = "rayon")]
mod parallel;
pub mod probe;
pub mod progress;
pub mod selection;
pub mod sharpness;
pub mod sheet;
pub mod window;

pub use capture::{CaptureRequest, FfmpegCapture, FrameArena, FrameSource, ScratchFrame, SeekMode};
pub use configuration::{FailurePolicy, FrameSize, SelectionOptions};
pub use engine::{Selection, SharpFrameSelector};
pub use error::SheetError;
pub use probe::MediaInfo;
pub use progress::{CancellationToken, OperationType, ProgressCallback, ProgressInfo};
pub use selection::{FrameSample, chunk_size, select_sharpest, sharpest};
pub use sharpness::{DEFAULT_TOP_QUANTILE, SharpnessScorer};
pub use sheet::{ContactSheet, SheetOptions};
pub use window::{MediaWindow, Timestamp, TimestampPlan, Timestamps, format_timestamp};
