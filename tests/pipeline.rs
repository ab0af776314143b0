//! End-to-end selection tests against a synthetic frame source.
//!
//! The source writes noise frames whose amplitude is chosen per offset, so
//! the sharpest timestamps are known in advance. No ffmpeg is needed.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use image::{GrayImage, Luma};
use sharpsheet::{
    CancellationToken, CaptureRequest, ContactSheet, FailurePolicy, FrameSize, FrameSource,
    MediaInfo, MediaWindow, OperationType, ProgressCallback, ProgressInfo, SeekMode,
    SelectionOptions, SharpFrameSelector, SheetError, SheetOptions,
};

type Amplitude = Box<dyn Fn(u64) -> u8 + Send + Sync>;

#[derive(Debug, Clone)]
struct Request {
    offset: u64,
    seek: SeekMode,
    size: FrameSize,
    output: PathBuf,
}

struct SyntheticSource {
    amplitude: Amplitude,
    broken: Vec<u64>,
    fast_broken: Vec<u64>,
    cancel_after: Option<(usize, CancellationToken)>,
    requests: Mutex<Vec<Request>>,
}

impl SyntheticSource {
    fn new(amplitude: impl Fn(u64) -> u8 + Send + Sync + 'static) -> Self {
        Self {
            amplitude: Box::new(amplitude),
            broken: Vec::new(),
            fast_broken: Vec::new(),
            cancel_after: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }
}

impl FrameSource for SyntheticSource {
    fn extract(&self, request: &CaptureRequest<'_>) -> Result<(), SheetError> {
        let offset = request.timestamp.offset_seconds;
        let count = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(Request {
                offset,
                seek: request.seek,
                size: request.size,
                output: request.output.to_path_buf(),
            });
            requests.len()
        };
        if let Some((limit, token)) = &self.cancel_after {
            if count >= *limit {
                token.cancel();
            }
        }

        let broken = self.broken.contains(&offset)
            || (request.seek == SeekMode::Fast && self.fast_broken.contains(&offset));
        if broken {
            return Err(SheetError::Extraction {
                timestamp: request.timestamp.display.clone(),
                reason: "synthetic failure".to_string(),
            });
        }

        let amplitude = u64::from((self.amplitude)(offset).max(1));
        let mut state = offset.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
        let image = GrayImage::from_fn(request.size.width, request.size.height, |_, _| {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            Luma([20 + ((state >> 33) % amplitude) as u8])
        });
        image.save(request.output)?;
        Ok(())
    }
}

/// Offsets 5, 34, ..., 556; winners planted at indices 2, 6, 13 and 17.
fn scenario_amplitude(offset: u64) -> u8 {
    match (offset - 5) / 29 {
        2 => 200,
        6 => 160,
        13 => 40,
        17 => 120,
        _ => 10,
    }
}

fn scenario_options() -> SelectionOptions {
    SelectionOptions::new()
        .with_samples(20)
        .with_groups(4)
        .with_selected(3)
        .with_delays(5.0, 5.0)
        .with_frame_size(Some(32), Some(24))
}

fn scenario_window() -> MediaWindow {
    MediaWindow::new(600.0, 5.0, 5.0)
}

fn offsets(frames: &[sharpsheet::FrameSample<image::DynamicImage>]) -> Vec<u64> {
    frames
        .iter()
        .map(|frame| frame.timestamp.offset_seconds)
        .collect()
}

// ── Selection ─────────────────────────────────────────────────────

#[test]
fn scenario_picks_planted_winners_in_time_order() {
    let source = SyntheticSource::new(scenario_amplitude);
    let selection = SharpFrameSelector::new(scenario_options())
        .select_window(scenario_window(), 640, 480, &source)
        .unwrap();

    assert_eq!(selection.sampled, 20);
    assert_eq!(selection.failed, 0);
    // Group winners at 63, 179, 382 and 498; 382 is the blurriest of them.
    assert_eq!(offsets(&selection.frames), vec![63, 179, 498]);

    let requested: Vec<u64> = source.requests().iter().map(|r| r.offset).collect();
    assert_eq!(requested.len(), 20);
    assert_eq!(requested[..3], [5, 34, 63]);
    assert_eq!(requested[19], 556);
}

#[test]
fn repeated_passes_are_identical() {
    let run = || {
        let source = SyntheticSource::new(scenario_amplitude);
        SharpFrameSelector::new(scenario_options())
            .select_window(scenario_window(), 640, 480, &source)
            .unwrap()
            .frames
            .iter()
            .map(|frame| (frame.timestamp.offset_seconds, frame.score))
            .collect::<Vec<_>>()
    };
    assert_eq!(run(), run());
}

#[test]
fn cardinality_and_order_hold_across_configurations() {
    for (samples, groups, selected) in [(4, 4, 1), (10, 3, 3), (13, 5, 2), (21, 4, 3), (9, 9, 9)] {
        let source = SyntheticSource::new(|offset| (offset % 7 * 30 + 10) as u8);
        let options = SelectionOptions::new()
            .with_samples(samples)
            .with_groups(groups)
            .with_selected(selected)
            .with_delays(0.0, 0.0)
            .with_frame_size(Some(16), Some(16));
        let selection = SharpFrameSelector::new(options)
            .select_window(MediaWindow::new(300.0, 0.0, 0.0), 16, 16, &source)
            .unwrap();

        assert_eq!(selection.len(), selected.min(groups), "{samples}/{groups}/{selected}");
        let offsets = offsets(&selection.frames);
        assert!(offsets.windows(2).all(|pair| pair[0] < pair[1]));
    }
}

#[test]
fn empty_window_is_rejected_before_capturing() {
    let source = SyntheticSource::new(|_| 10);
    let options = SelectionOptions::new()
        .with_samples(5)
        .with_groups(1)
        .with_selected(1)
        .with_delays(6.0, 6.0);
    let result =
        SharpFrameSelector::new(options).select_window(MediaWindow::new(10.0, 6.0, 6.0), 16, 16, &source);

    assert!(matches!(result, Err(SheetError::InvalidWindow { .. })));
    assert!(source.requests().is_empty());
}

// ── Fault tolerance ───────────────────────────────────────────────

#[test]
fn fast_seek_failure_is_retried_accurately() {
    let mut source = SyntheticSource::new(scenario_amplitude);
    source.fast_broken = vec![63, 179];
    let selection = SharpFrameSelector::new(scenario_options())
        .select_window(scenario_window(), 640, 480, &source)
        .unwrap();

    assert_eq!(selection.failed, 0);
    assert_eq!(offsets(&selection.frames), vec![63, 179, 498]);

    let retried: Vec<u64> = source
        .requests()
        .iter()
        .filter(|request| request.seek == SeekMode::Accurate)
        .map(|request| request.offset)
        .collect();
    assert_eq!(retried, vec![63, 179]);
}

#[test]
fn skip_policy_drops_broken_timestamps() {
    let mut source = SyntheticSource::new(scenario_amplitude);
    source.broken = vec![63, 34];
    let selection = SharpFrameSelector::new(scenario_options())
        .select_window(scenario_window(), 640, 480, &source)
        .unwrap();

    assert_eq!(selection.sampled, 18);
    assert_eq!(selection.failed, 2);
    assert!(!offsets(&selection.frames).contains(&63));
    // Each broken timestamp was tried with both seek modes.
    assert_eq!(source.requests().len(), 22);
}

#[test]
fn abort_policy_fails_on_first_broken_timestamp() {
    let mut source = SyntheticSource::new(scenario_amplitude);
    source.broken = vec![34];
    let options = scenario_options().with_failure_policy(FailurePolicy::Abort);
    let result = SharpFrameSelector::new(options).select_window(scenario_window(), 640, 480, &source);

    match result {
        Err(SheetError::Extraction { timestamp, .. }) => assert_eq!(timestamp, "00:34"),
        other => panic!("unexpected result: {other:?}"),
    }
    let last = source.requests().last().map(|request| request.offset);
    assert_eq!(last, Some(34));
}

#[test]
fn too_few_survivors_is_an_error() {
    let mut source = SyntheticSource::new(|_| 50);
    source.broken = (0..100).filter(|offset| offset % 10 != 0 || *offset > 20).collect();
    let options = SelectionOptions::new()
        .with_samples(10)
        .with_groups(4)
        .with_selected(2)
        .with_delays(0.0, 0.0)
        .with_frame_size(Some(8), Some(8));
    // Offsets 0, 10, ..., 90; only 0, 10 and 20 survive.
    let result =
        SharpFrameSelector::new(options).select_window(MediaWindow::new(100.0, 0.0, 0.0), 8, 8, &source);

    match result {
        Err(SheetError::InsufficientSamples {
            available,
            required,
        }) => {
            assert_eq!(available, 3);
            assert_eq!(required, 4);
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

fn short_plan_options() -> SelectionOptions {
    SelectionOptions::new()
        .with_samples(4)
        .with_groups(4)
        .with_selected(1)
        .with_delays(0.9, 0.0)
        .with_frame_size(Some(8), Some(8))
}

#[test]
fn short_plan_is_grouped_as_is() {
    // Interval 1 from ceil(0.9) to floor(4.9): offsets 1, 2 and 3 only.
    let source = SyntheticSource::new(|offset| if offset == 2 { 200 } else { 10 });
    let selection = SharpFrameSelector::new(short_plan_options())
        .select_window(MediaWindow::new(4.9, 0.9, 0.0), 8, 8, &source)
        .unwrap();

    assert_eq!(selection.sampled, 3);
    assert_eq!(selection.failed, 0);
    assert_eq!(offsets(&selection.frames), vec![2]);
}

#[test]
fn short_plan_still_requires_every_planned_sample() {
    let mut source = SyntheticSource::new(|_| 50);
    source.broken = vec![2];
    let result = SharpFrameSelector::new(short_plan_options())
        .select_window(MediaWindow::new(4.9, 0.9, 0.0), 8, 8, &source);

    match result {
        Err(SheetError::InsufficientSamples {
            available,
            required,
        }) => {
            assert_eq!(available, 2);
            assert_eq!(required, 3);
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

// ── Scratch files ─────────────────────────────────────────────────

#[test]
fn scratch_files_are_unique_and_removed() {
    let mut source = SyntheticSource::new(scenario_amplitude);
    source.fast_broken = vec![92];
    SharpFrameSelector::new(scenario_options())
        .select_window(scenario_window(), 640, 480, &source)
        .unwrap();

    let requests = source.requests();
    let paths: HashSet<&PathBuf> = requests.iter().map(|request| &request.output).collect();
    assert_eq!(paths.len(), requests.len());

    for request in &requests {
        assert!(!request.output.exists(), "{} left behind", request.output.display());
    }
    let directory = requests[0].output.parent().unwrap();
    assert!(!directory.exists());
}

#[test]
fn scratch_directory_is_removed_on_error() {
    let mut source = SyntheticSource::new(scenario_amplitude);
    source.broken = vec![121];
    let options = scenario_options().with_failure_policy(FailurePolicy::Abort);
    assert!(SharpFrameSelector::new(options)
        .select_window(scenario_window(), 640, 480, &source)
        .is_err());

    let requests = source.requests();
    assert!(!requests[0].output.parent().unwrap().exists());
}

// ── Progress & cancellation ───────────────────────────────────────

#[derive(Default)]
struct Recorder {
    infos: Mutex<Vec<ProgressInfo>>,
}

impl ProgressCallback for Recorder {
    fn on_progress(&self, info: &ProgressInfo) {
        self.infos.lock().unwrap().push(info.clone());
    }
}

#[test]
fn progress_reports_sampling_then_selection() {
    let recorder = Arc::new(Recorder::default());
    let source = SyntheticSource::new(scenario_amplitude);
    SharpFrameSelector::new(scenario_options().with_progress(recorder.clone()).with_batch_size(5))
        .select_window(scenario_window(), 640, 480, &source)
        .unwrap();

    let infos = recorder.infos.lock().unwrap();
    let sampling: Vec<&ProgressInfo> = infos
        .iter()
        .filter(|info| info.operation == OperationType::FrameSampling)
        .collect();
    // Every fifth timestamp plus the final report.
    assert_eq!(sampling.len(), 5);
    assert_eq!(sampling[0].current, 5);
    assert_eq!(sampling[0].current_offset, Some(121));
    assert_eq!(sampling[4].percentage, Some(100.0));
    assert_eq!(infos.last().map(|info| info.operation), Some(OperationType::Selection));
}

#[test]
fn cancellation_stops_the_pass() {
    let token = CancellationToken::new();
    let mut source = SyntheticSource::new(scenario_amplitude);
    source.cancel_after = Some((3, token.clone()));
    let options = scenario_options().with_cancellation(token);
    let result = SharpFrameSelector::new(options).select_window(scenario_window(), 640, 480, &source);

    assert!(matches!(result, Err(SheetError::Cancelled)));
    assert_eq!(source.requests().len(), 3);
}

// ── Media info & sheet ────────────────────────────────────────────

#[test]
fn frame_size_follows_display_aspect_ratio() {
    let json = r#"{
        "streams": [{"codec_type": "video", "width": 720, "height": 576,
                     "sample_aspect_ratio": "16:15"}],
        "format": {"duration": "600.0", "size": "1048576"}
    }"#;
    let media = MediaInfo::from_ffprobe_json("dvd.mpg", json).unwrap();
    let source = SyntheticSource::new(scenario_amplitude);
    let options = SelectionOptions::new()
        .with_samples(20)
        .with_groups(4)
        .with_selected(3);
    let selection = SharpFrameSelector::new(options).select(&media, &source).unwrap();

    assert_eq!(offsets(&selection.frames), vec![63, 179, 498]);
    assert!(source
        .requests()
        .iter()
        .all(|request| request.size == FrameSize::new(600, 450)));
}

#[test]
fn selection_composes_into_vertical_sheet() {
    let source = SyntheticSource::new(scenario_amplitude);
    let selection = SharpFrameSelector::new(scenario_options())
        .select_window(scenario_window(), 640, 480, &source)
        .unwrap();

    let sheet = ContactSheet::new(SheetOptions::new())
        .compose(&selection.frames)
        .unwrap();
    assert_eq!((sheet.width(), sheet.height()), (32, 3 * 24 + 2 * 5));

    let directory = tempfile::tempdir().unwrap();
    let path = directory.path().join("sheet.png");
    sheet.save(&path).unwrap();
    assert!(path.exists());
}
