use crate::test_support::{FakeEncoder, FakeRenderer, TempDir, scene_with};
use crate::{CancellationToken, Codec, RenderError, generate_video};
use glam::UVec2;
use std::sync::atomic::Ordering;

#[test]
fn every_frame_reaches_the_encoder() {
    let dir = TempDir::new("pipeline-ok");
    let scene = scene_with(&[("a", &[("idle", 1.0)]), ("b", &[("idle", 0.5)])]);
    let renderer = FakeRenderer::default();
    let encoder = FakeEncoder::default();
    let output = dir.path().join("render/nested/idle.mp4");

    generate_video(
        &scene,
        "idle",
        &output,
        30.0,
        Codec::H264,
        &renderer,
        &encoder,
        &CancellationToken::new(),
    )
    .unwrap();

    assert_eq!(renderer.frames.load(Ordering::SeqCst), 30);
    assert_eq!(encoder.frames.load(Ordering::SeqCst), 30);
    assert_eq!(std::fs::read_to_string(&output).unwrap(), "30");

    let settings = encoder.settings.lock().unwrap().unwrap();
    assert_eq!(settings.input_size, UVec2::new(16, 8));
    assert_eq!(settings.output_size, UVec2::new(8, 4));
    assert_eq!(settings.codec, Codec::H264);
}

#[test]
fn encoder_failure_removes_the_partial_video() {
    let dir = TempDir::new("pipeline-encoder");
    let scene = scene_with(&[("a", &[("idle", 1.0)])]);
    let renderer = FakeRenderer::default();
    let encoder = FakeEncoder::failing_after(3);
    let output = dir.path().join("idle.vp9.webm");

    let err = generate_video(
        &scene,
        "idle",
        &output,
        30.0,
        Codec::Vp9,
        &renderer,
        &encoder,
        &CancellationToken::new(),
    )
    .unwrap_err();

    assert!(matches!(err, RenderError::Encoder { .. }), "{err}");
    assert!(!output.exists());
    // Production stops once the encoder hangs up, well before the last frame.
    assert!(renderer.frames.load(Ordering::SeqCst) < 30);
}

#[test]
fn renderer_failure_wins_over_the_encoder_result() {
    let dir = TempDir::new("pipeline-renderer");
    let scene = scene_with(&[("a", &[("idle", 1.0)])]);
    let renderer = FakeRenderer {
        fail_at: Some(4),
        ..FakeRenderer::default()
    };
    let encoder = FakeEncoder::default();
    let output = dir.path().join("idle.mov");

    let err = generate_video(
        &scene,
        "idle",
        &output,
        30.0,
        Codec::Mov,
        &renderer,
        &encoder,
        &CancellationToken::new(),
    )
    .unwrap_err();

    assert!(matches!(err, RenderError::PoolClosed), "{err}");
    assert!(!output.exists());
}

#[test]
fn empty_animation_writes_nothing() {
    let dir = TempDir::new("pipeline-empty");
    let scene = scene_with(&[("a", &[("idle", 0.0)])]);
    let encoder = FakeEncoder::default();
    let output = dir.path().join("idle.mp4");

    let err = generate_video(
        &scene,
        "idle",
        &output,
        30.0,
        Codec::H264,
        &FakeRenderer::default(),
        &encoder,
        &CancellationToken::new(),
    )
    .unwrap_err();

    assert!(matches!(err, RenderError::EmptyAnimation { .. }));
    assert!(!output.exists());
    assert_eq!(encoder.videos(), 0);
}

#[test]
fn cancellation_stops_production() {
    let dir = TempDir::new("pipeline-cancel");
    let scene = scene_with(&[("a", &[("idle", 1.0)])]);
    let renderer = FakeRenderer::default();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let output = dir.path().join("idle.mp4");

    let err = generate_video(
        &scene,
        "idle",
        &output,
        30.0,
        Codec::H264,
        &renderer,
        &FakeEncoder::default(),
        &cancel,
    )
    .unwrap_err();

    assert!(matches!(err, RenderError::Cancelled));
    assert_eq!(renderer.frames.load(Ordering::SeqCst), 0);
    assert!(!output.exists());
}
