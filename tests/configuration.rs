//! SelectionOptions, FrameSize, and SheetOptions tests.

use std::sync::Arc;
use std::time::Duration;

use image::Rgba;
use sharpsheet::{
    FailurePolicy, FrameSize, ProgressCallback, ProgressInfo, SelectionOptions, SheetError,
    SheetOptions,
};

// ── SelectionOptions builder ──────────────────────────────────────

#[test]
fn config_defaults() {
    let config = SelectionOptions::new();
    assert_eq!(config.num_samples(), 21);
    assert_eq!(config.num_groups(), 4);
    assert_eq!(config.num_selected(), 3);
    assert_eq!(config.start_delay_seconds(), 5.0);
    assert_eq!(config.end_delay_seconds(), 5.0);
    assert_eq!(config.failure_policy(), FailurePolicy::Skip);
    assert_eq!(config.extraction_timeout(), Duration::from_secs(30));

    let debug = format!("{config:?}");
    assert!(debug.contains("SelectionOptions"));
    assert!(debug.contains("has_cancellation: false"));
    assert!(debug.contains("batch_size: 1"));
    assert!(debug.contains("top_quantile: 0.05"));
}

#[test]
fn config_with_batch_size() {
    let config = SelectionOptions::new().with_batch_size(10);
    let debug = format!("{config:?}");
    assert!(debug.contains("batch_size: 10"));
}

#[test]
fn config_with_batch_size_clamps_zero() {
    let config = SelectionOptions::new().with_batch_size(0);
    let debug = format!("{config:?}");
    // Clamped to 1.
    assert!(debug.contains("batch_size: 1"));
}

#[test]
fn config_with_threads_enables_parallel() {
    let config = SelectionOptions::new().with_threads(4);
    let debug = format!("{config:?}");
    assert!(debug.contains("parallel: true"));
    assert!(debug.contains("threads: Some(4)"));
}

#[test]
fn config_with_progress() {
    struct Silent;
    impl ProgressCallback for Silent {
        fn on_progress(&self, _info: &ProgressInfo) {}
    }

    let config = SelectionOptions::new().with_progress(Arc::new(Silent));
    assert!(config.validate().is_ok());
}

// ── Validation ────────────────────────────────────────────────────

#[test]
fn selected_may_equal_groups() {
    let config = SelectionOptions::new()
        .with_samples(4)
        .with_groups(4)
        .with_selected(4);
    assert!(config.validate().is_ok());
}

#[test]
fn samples_below_groups_are_rejected() {
    let config = SelectionOptions::new().with_samples(3).with_groups(4);
    let error = config.validate().unwrap_err();
    assert!(matches!(error, SheetError::InvalidConfiguration(_)));
    assert!(error.to_string().contains("sample count (3)"));
}

#[test]
fn zero_delays_are_allowed() {
    let config = SelectionOptions::new().with_delays(0.0, 0.0);
    assert!(config.validate().is_ok());
}

#[test]
fn full_spectrum_quantile_is_allowed() {
    assert!(SelectionOptions::new().with_top_quantile(1.0).validate().is_ok());
}

// ── Frame size resolution ─────────────────────────────────────────

#[test]
fn default_frame_size_uses_600_pixel_width() {
    let config = SelectionOptions::new();
    assert_eq!(
        config.resolve_frame_size(768, 576).unwrap(),
        FrameSize::new(600, 450)
    );
}

#[test]
fn target_width_is_configurable() {
    let config = SelectionOptions::new().with_target_width(320);
    assert_eq!(
        config.resolve_frame_size(1280, 720).unwrap(),
        FrameSize::new(320, 180)
    );
}

// ── SheetOptions ──────────────────────────────────────────────────

#[test]
fn sheet_defaults() {
    let options = SheetOptions::default();
    assert_eq!(options.columns, 1);
    assert_eq!(options.spacing, 5);
    assert_eq!(options.margin, 0);
    assert_eq!(options.background, Rgba([255, 255, 255, 255]));
    assert_eq!(options.frame_width, None);
}
