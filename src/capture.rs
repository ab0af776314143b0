//! Frame capture at a timestamp.
//!
//! The engine does not decode video itself. It asks a [`FrameSource`] to
//! write a still image for a timestamp to a path it chooses, then decodes
//! that file. [`FfmpegCapture`] is the stock source and shells out to the
//! `ffmpeg` binary; tests and embedders can plug in anything else,
//! including a plain closure.
//!
//! Two seek strategies are available. [`SeekMode::Fast`] seeks on the input
//! (`-ss` before `-i`), which jumps to the nearest keyframe and is cheap but
//! occasionally fails or lands on a broken frame. [`SeekMode::Accurate`]
//! decodes from the start up to the timestamp (`-ss` after `-i`), which is
//! slow but reliable. The engine tries them in that order.
//!
//! Scratch files live in a [`FrameArena`], a private temporary directory
//! that is removed when the arena is dropped.

use std::ffi::OsString;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::fs;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use crate::configuration::{DEFAULT_EXTRACTION_TIMEOUT, FrameSize};
use crate::error::SheetError;
use crate::window::Timestamp;

/// Name of the transcoding binary looked up on `PATH`.
pub const FFMPEG: &str = "ffmpeg";

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How a frame source seeks to the requested timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeekMode {
    /// Seek on the input to the nearest keyframe. Fast, less reliable.
    Fast,
    /// Decode up to the exact timestamp. Slow, reliable.
    Accurate,
}

impl Display for SeekMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            SeekMode::Fast => f.write_str("fast"),
            SeekMode::Accurate => f.write_str("accurate"),
        }
    }
}

/// One request to materialise a frame as an image file.
#[derive(Debug, Clone, Copy)]
pub struct CaptureRequest<'a> {
    /// Timestamp to capture.
    pub timestamp: &'a Timestamp,
    /// Output frame size.
    pub size: FrameSize,
    /// Seek strategy to use.
    pub seek: SeekMode,
    /// Where to write the image. The file does not exist yet and is owned
    /// by the caller.
    pub output: &'a Path,
    /// Upper bound on how long the capture may take.
    pub timeout: Duration,
}

/// Something that can write a still frame of a video to a file.
///
/// Implementations must leave a decodable image at `request.output` on
/// success, and return [`SheetError::Extraction`] (or any other error) on
/// failure. They must not touch any other scratch path, so the engine can
/// run several requests at once.
pub trait FrameSource: Send + Sync {
    /// Capture the frame described by `request`.
    fn extract(&self, request: &CaptureRequest<'_>) -> Result<(), SheetError>;
}

impl<F> FrameSource for F
where
    F: Fn(&CaptureRequest<'_>) -> Result<(), SheetError> + Send + Sync,
{
    fn extract(&self, request: &CaptureRequest<'_>) -> Result<(), SheetError> {
        self(request)
    }
}

/// Frame source backed by the `ffmpeg` command-line tool.
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use std::time::Duration;
///
/// use sharpsheet::{CaptureRequest, FfmpegCapture, FrameSize, FrameSource, SeekMode, Timestamp};
///
/// let capture = FfmpegCapture::new("input.mp4");
/// let timestamp = Timestamp::new(42);
/// capture.extract(&CaptureRequest {
///     timestamp: &timestamp,
///     size: FrameSize::new(600, 338),
///     seek: SeekMode::Fast,
///     output: Path::new("frame.png"),
///     timeout: Duration::from_secs(30),
/// })?;
/// # Ok::<(), sharpsheet::SheetError>(())
/// ```
#[derive(Debug, Clone)]
pub struct FfmpegCapture {
    input: PathBuf,
    program: OsString,
}

impl FfmpegCapture {
    /// Capture frames from `input` using `ffmpeg` from `PATH`.
    pub fn new<P: AsRef<Path>>(input: P) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            program: OsString::from(FFMPEG),
        }
    }

    /// Use a specific `ffmpeg` binary.
    #[must_use]
    pub fn with_program<S: Into<OsString>>(mut self, program: S) -> Self {
        self.program = program.into();
        self
    }

    /// The media file frames are captured from.
    pub fn input(&self) -> &Path {
        &self.input
    }

    /// Command-line arguments for `request`.
    pub fn arguments(&self, request: &CaptureRequest<'_>) -> Vec<OsString> {
        let mut arguments: Vec<OsString> = vec!["-y".into(), "-loglevel".into(), "error".into()];
        let seek = ["-ss".into(), OsString::from(&request.timestamp.display)];
        let input = ["-i".into(), self.input.clone().into_os_string()];

        match request.seek {
            SeekMode::Fast => {
                arguments.extend(seek);
                arguments.extend(input);
            }
            SeekMode::Accurate => {
                arguments.extend(input);
                arguments.extend(seek);
            }
        }

        arguments.extend([
            "-vframes".into(),
            "1".into(),
            "-s".into(),
            format!("{}x{}", request.size.width, request.size.height).into(),
            request.output.as_os_str().to_os_string(),
        ]);
        arguments
    }
}

impl FrameSource for FfmpegCapture {
    fn extract(&self, request: &CaptureRequest<'_>) -> Result<(), SheetError> {
        let failure = |reason: String| SheetError::Extraction {
            timestamp: request.timestamp.display.clone(),
            reason,
        };

        log::debug!(
            "Capturing {} ({} seek) to {}",
            request.timestamp,
            request.seek,
            request.output.display()
        );

        let mut child = Command::new(&self.program)
            .args(self.arguments(request))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|error| failure(format!("could not start ffmpeg: {error}")))?;

        // Drain stderr on a side thread so a chatty ffmpeg cannot fill the
        // pipe and stall while we wait on it.
        let stderr_reader = child.stderr.take().map(|mut stderr| {
            thread::spawn(move || {
                let mut text = String::new();
                let _ = stderr.read_to_string(&mut text);
                text
            })
        });

        let timeout = if request.timeout.is_zero() {
            DEFAULT_EXTRACTION_TIMEOUT
        } else {
            request.timeout
        };
        // A timeout too large to represent as an instant never expires.
        let deadline = Instant::now().checked_add(timeout);
        let status = loop {
            let expired = match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => deadline.is_some_and(|deadline| Instant::now() >= deadline),
                Err(error) => {
                    reap(&mut child);
                    return Err(failure(format!("could not wait on ffmpeg: {error}")));
                }
            };
            if expired {
                reap(&mut child);
                return Err(failure(format!("timed out after {timeout:?}")));
            }
            thread::sleep(POLL_INTERVAL);
        };

        let stderr = stderr_reader
            .and_then(|reader| reader.join().ok())
            .unwrap_or_default();

        if !status.success() {
            let detail = stderr.lines().last().unwrap_or("").trim();
            return Err(failure(if detail.is_empty() {
                format!("ffmpeg exited with {status}")
            } else {
                format!("ffmpeg exited with {status}: {detail}")
            }));
        }

        match fs::metadata(request.output) {
            Ok(metadata) if metadata.len() > 0 => Ok(()),
            _ => Err(failure("ffmpeg produced no image".to_string())),
        }
    }
}

/// Kill a child that is still running and collect its exit status.
fn reap(child: &mut Child) {
    if let Err(error) = child.kill() {
        log::debug!("Could not kill ffmpeg (pid {}): {error}", child.id());
    }
    let _ = child.wait();
}

/// Private scratch directory for the frames of one selection pass.
///
/// Every [`ScratchFrame`] handed out has a distinct path derived from its
/// timestamp and seek mode, so concurrent captures never share a file. The
/// directory and anything left in it are removed when the arena is dropped.
#[derive(Debug)]
pub struct FrameArena {
    directory: TempDir,
}

impl FrameArena {
    /// Create a scratch directory under the system temporary directory.
    ///
    /// # Errors
    ///
    /// Returns [`SheetError::Io`] if the directory cannot be created.
    pub fn new() -> Result<Self, SheetError> {
        let directory = tempfile::Builder::new().prefix("sharpsheet-").tempdir()?;
        Ok(Self { directory })
    }

    /// Create a scratch directory inside `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`SheetError::Io`] if the directory cannot be created.
    pub fn in_dir<P: AsRef<Path>>(parent: P) -> Result<Self, SheetError> {
        let directory = tempfile::Builder::new()
            .prefix("sharpsheet-")
            .tempdir_in(parent)?;
        Ok(Self { directory })
    }

    /// Location of the scratch directory.
    pub fn path(&self) -> &Path {
        self.directory.path()
    }

    /// Reserve the scratch path for one capture attempt.
    pub fn scratch(&self, timestamp: &Timestamp, seek: SeekMode) -> ScratchFrame {
        let name = format!("frame_{:06}_{seek}.png", timestamp.offset_seconds);
        ScratchFrame {
            path: self.directory.path().join(name),
        }
    }
}

/// A scratch image path that is deleted when dropped.
#[derive(Debug)]
pub struct ScratchFrame {
    path: PathBuf,
}

impl ScratchFrame {
    /// The reserved path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFrame {
    fn drop(&mut self) {
        if let Err(error) = fs::remove_file(&self.path) {
            if error.kind() != ErrorKind::NotFound {
                log::warn!("Could not remove {}: {error}", self.path.display());
            }
        }
    }
}
