//! Error types for the `sharpsheet` crate.
//!
//! This module defines [`SheetError`], the unified error type returned by all
//! fallible operations in the crate. Errors carry enough context to explain
//! what went wrong without extra logging at the call site: the sampling
//! window that was rejected, the timestamp whose extraction failed, or how
//! many samples survived versus how many were required.

use std::io::Error as IoError;

use image::ImageError;
use serde_json::Error as JsonError;
use thiserror::Error;

/// The unified error type for all `sharpsheet` operations.
///
/// Degenerate (perfectly uniform) frames are deliberately absent: they are
/// scored as maximally blurry instead of aborting a selection pass.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SheetError {
    /// The sampling window left after removing the start and end delays is
    /// empty, or too short for the requested number of samples.
    #[error(
        "Invalid sampling window: duration {duration_seconds:.3}s with start delay \
         {start_delay}s and end delay {end_delay}s cannot hold {num_samples} samples"
    )]
    InvalidWindow {
        /// Media duration in seconds.
        duration_seconds: f64,
        /// Seconds skipped at the start.
        start_delay: f64,
        /// Seconds skipped at the end.
        end_delay: f64,
        /// Number of samples that was requested.
        num_samples: usize,
    },

    /// A frame could not be extracted at the given timestamp.
    #[error("Failed to extract frame at {timestamp}: {reason}")]
    Extraction {
        /// Display form of the timestamp (`MM:SS` or `H:MM:SS`).
        timestamp: String,
        /// Why the extraction failed (exit status, timeout, decode error).
        reason: String,
    },

    /// Too few samples survived extraction to fill every group.
    #[error("Insufficient samples: {available} available, {required} required")]
    InsufficientSamples {
        /// Samples that were extracted and scored successfully.
        available: usize,
        /// Minimum number of samples needed (the group count).
        required: usize,
    },

    /// A [`SelectionOptions`](crate::SelectionOptions) value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Media probing failed or produced output that could not be understood.
    #[error("Failed to probe media: {0}")]
    Probe(String),

    /// The probed file does not contain a video stream.
    #[error("No video stream found in file")]
    NoVideoStream,

    /// The operation was cancelled via a [`CancellationToken`](crate::CancellationToken).
    #[error("Operation cancelled")]
    Cancelled,

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// An error from the `image` crate while decoding or encoding frames.
    #[error("Image processing error: {0}")]
    Image(#[from] ImageError),

    /// Probe output was not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] JsonError),
}
