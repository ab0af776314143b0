//! Media probing through `ffprobe`.
//!
//! [`MediaInfo`] holds the handful of facts the selection engine and the
//! sheet composer need: duration, stored ("sample") resolution, display
//! resolution after applying the sample aspect ratio, and file size. It is
//! built from the JSON that `ffprobe -show_format -show_streams` prints, so
//! it can also be constructed from canned output in tests.
//!
//! # Example
//!
//! ```no_run
//! use sharpsheet::MediaInfo;
//!
//! let media = MediaInfo::probe("input.mp4")?;
//! println!("{} ({}) {}", media.filename, media.human_readable_size(), media.display_duration());
//! println!("{}x{} displayed as {}x{}",
//!     media.sample_width, media.sample_height,
//!     media.display_width, media.display_height);
//! # Ok::<(), sharpsheet::SheetError>(())
//! ```

use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::Value;

use crate::error::SheetError;
use crate::window::{MediaWindow, format_timestamp};

/// Name of the probing binary looked up on `PATH`.
pub const FFPROBE: &str = "ffprobe";

/// Metadata for a media file with a video stream.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct MediaInfo {
    /// Path the media was probed from.
    pub path: PathBuf,
    /// File name shown in sheet headers.
    pub filename: String,
    /// Container duration in seconds.
    pub duration_seconds: f64,
    /// File size in bytes, if reported.
    pub size_bytes: Option<u64>,
    /// Stored frame width in pixels.
    pub sample_width: u32,
    /// Stored frame height in pixels.
    pub sample_height: u32,
    /// Width after applying the sample aspect ratio.
    pub display_width: u32,
    /// Display height (same as the stored height).
    pub display_height: u32,
}

impl MediaInfo {
    /// Probe `path` by running `ffprobe`.
    ///
    /// # Errors
    ///
    /// Returns [`SheetError::Io`] if `ffprobe` cannot be started,
    /// [`SheetError::Probe`] if it fails or prints unusable output, and
    /// [`SheetError::NoVideoStream`] if the file has no video stream.
    pub fn probe<P: AsRef<Path>>(path: P) -> Result<Self, SheetError> {
        Self::probe_with(FFPROBE, path)
    }

    /// Probe `path` with a specific `ffprobe` binary.
    ///
    /// # Errors
    ///
    /// Same as [`probe`](MediaInfo::probe).
    pub fn probe_with<P: AsRef<Path>>(program: &str, path: P) -> Result<Self, SheetError> {
        let path = path.as_ref();
        log::debug!("Probing {} with {program}", path.display());

        let output = Command::new(program)
            .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path)
            .output()?;

        if !output.status.success() {
            return Err(SheetError::Probe(format!(
                "{program} exited with {} for {}",
                output.status,
                path.display()
            )));
        }

        let json = String::from_utf8_lossy(&output.stdout);
        Self::from_ffprobe_json(path, &json)
    }

    /// Build media info from `ffprobe` JSON output.
    ///
    /// The last video stream listed is used. The display width is the stored
    /// width scaled by `sample_aspect_ratio` unless the ratio is missing,
    /// `1:1` or `0:1` (unknown).
    ///
    /// # Errors
    ///
    /// Returns [`SheetError::Json`] for invalid JSON,
    /// [`SheetError::NoVideoStream`] when no stream has
    /// `codec_type == "video"`, and [`SheetError::Probe`] when the duration
    /// or dimensions are missing or malformed.
    pub fn from_ffprobe_json<P: AsRef<Path>>(path: P, json: &str) -> Result<Self, SheetError> {
        let path = path.as_ref();
        let root: Value = serde_json::from_str(json)?;

        let video = root["streams"]
            .as_array()
            .and_then(|streams| {
                streams
                    .iter()
                    .rev()
                    .find(|stream| stream["codec_type"].as_str() == Some("video"))
            })
            .ok_or(SheetError::NoVideoStream)?;

        let sample_width = dimension(video, "width")?;
        let sample_height = dimension(video, "height")?;
        let display_width = match video["sample_aspect_ratio"]
            .as_str()
            .and_then(parse_ratio)
        {
            Some((numerator, denominator)) if numerator > 0 && numerator != denominator => {
                ((u64::from(sample_width) * numerator) / denominator) as u32
            }
            _ => sample_width,
        };

        let format = &root["format"];
        let duration_seconds = number(&format["duration"])
            .or_else(|| number(&video["duration"]))
            .filter(|duration| duration.is_finite() && *duration >= 0.0)
            .ok_or_else(|| SheetError::Probe("missing or invalid duration".to_string()))?;
        let size_bytes = number(&format["size"]).map(|size| size as u64);

        let filename = format["filename"]
            .as_str()
            .map(Path::new)
            .unwrap_or(path)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self {
            path: path.to_path_buf(),
            filename,
            duration_seconds,
            size_bytes,
            sample_width,
            sample_height,
            display_width,
            display_height: sample_height,
        })
    }

    /// Duration rendered as `MM:SS` or `H:MM:SS`.
    pub fn display_duration(&self) -> String {
        format_timestamp(self.duration_seconds)
    }

    /// File size with a binary unit suffix, e.g. `"12.3 MiB"`.
    pub fn human_readable_size(&self) -> String {
        match self.size_bytes {
            Some(bytes) => human_readable_size(bytes),
            None => "unknown".to_string(),
        }
    }

    /// Frame size at `width`, keeping the display aspect ratio (height
    /// rounded down).
    pub fn desired_size(&self, width: u32) -> (u32, u32) {
        if self.display_width == 0 {
            return (width, self.display_height);
        }
        let height = u64::from(self.display_height) * u64::from(width) / u64::from(self.display_width);
        (width, height as u32)
    }

    /// Sampling window for this media with the given delays.
    pub fn window(&self, start_delay: f64, end_delay: f64) -> MediaWindow {
        MediaWindow::new(self.duration_seconds, start_delay, end_delay)
    }
}

/// Format a byte count with binary units (`B`, `KiB`, `MiB`, ...).
pub fn human_readable_size(bytes: u64) -> String {
    const UNITS: [&str; 8] = ["", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei", "Zi"];
    let mut value = bytes as f64;
    for unit in UNITS {
        if value.abs() < 1024.0 {
            return format!("{value:.1} {unit}B");
        }
        value /= 1024.0;
    }
    format!("{value:.1} YiB")
}

/// `ffprobe` prints most numbers as strings; accept either form.
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn dimension(stream: &Value, key: &str) -> Result<u32, SheetError> {
    stream[key]
        .as_u64()
        .and_then(|value| u32::try_from(value).ok())
        .filter(|value| *value > 0)
        .ok_or_else(|| SheetError::Probe(format!("video stream has no valid {key}")))
}

fn parse_ratio(text: &str) -> Option<(u64, u64)> {
    let (numerator, denominator) = text.split_once(':')?;
    let numerator = numerator.trim().parse().ok()?;
    let denominator: u64 = denominator.trim().parse().ok()?;
    (denominator > 0).then_some((numerator, denominator))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROBE_OUTPUT: &str = r#"{
        "streams": [
            {
                "index": 0,
                "codec_type": "video",
                "codec_name": "mpeg2video",
                "width": 720,
                "height": 576,
                "sample_aspect_ratio": "16:15"
            },
            {
                "index": 1,
                "codec_type": "audio",
                "codec_name": "mp2"
            }
        ],
        "format": {
            "filename": "/videos/holiday.mpg",
            "duration": "1805.480000",
            "size": "52428800"
        }
    }"#;

    #[test]
    fn parses_anamorphic_stream() {
        let media = MediaInfo::from_ffprobe_json("holiday.mpg", PROBE_OUTPUT).unwrap();
        assert_eq!(media.filename, "holiday.mpg");
        assert_eq!((media.sample_width, media.sample_height), (720, 576));
        assert_eq!((media.display_width, media.display_height), (768, 576));
        assert!((media.duration_seconds - 1805.48).abs() < 1e-9);
        assert_eq!(media.size_bytes, Some(52_428_800));
        assert_eq!(media.human_readable_size(), "50.0 MiB");
        assert_eq!(media.display_duration(), "30:05");
        assert_eq!(media.desired_size(600), (600, 450));
    }

    #[test]
    fn square_pixels_keep_stored_width() {
        let json = r#"{
            "streams": [{"codec_type": "video", "width": 1920, "height": 1080,
                         "sample_aspect_ratio": "1:1"}],
            "format": {"duration": "60.0"}
        }"#;
        let media = MediaInfo::from_ffprobe_json("clip.mp4", json).unwrap();
        assert_eq!(media.display_width, 1920);
        assert_eq!(media.filename, "clip.mp4");
        assert_eq!(media.size_bytes, None);
        assert_eq!(media.human_readable_size(), "unknown");
    }

    #[test]
    fn unknown_aspect_ratio_is_ignored() {
        let json = r#"{
            "streams": [{"codec_type": "video", "width": 640, "height": 480,
                         "sample_aspect_ratio": "0:1"}],
            "format": {"duration": 12.5}
        }"#;
        let media = MediaInfo::from_ffprobe_json("a.webm", json).unwrap();
        assert_eq!(media.display_width, 640);
        assert_eq!(media.duration_seconds, 12.5);
    }

    #[test]
    fn audio_only_file_has_no_video_stream() {
        let json = r#"{"streams": [{"codec_type": "audio"}], "format": {"duration": "3.0"}}"#;
        assert!(matches!(
            MediaInfo::from_ffprobe_json("a.m4a", json),
            Err(SheetError::NoVideoStream)
        ));
    }

    #[test]
    fn missing_duration_is_a_probe_error() {
        let json = r#"{"streams": [{"codec_type": "video", "width": 2, "height": 2}], "format": {}}"#;
        assert!(matches!(
            MediaInfo::from_ffprobe_json("a.mp4", json),
            Err(SheetError::Probe(_))
        ));
        assert!(matches!(
            MediaInfo::from_ffprobe_json("a.mp4", "not json"),
            Err(SheetError::Json(_))
        ));
    }

    #[test]
    fn size_units() {
        assert_eq!(human_readable_size(0), "0.0 B");
        assert_eq!(human_readable_size(1023), "1023.0 B");
        assert_eq!(human_readable_size(1536), "1.5 KiB");
        assert_eq!(human_readable_size(3 * 1024 * 1024 * 1024), "3.0 GiB");
    }
}
