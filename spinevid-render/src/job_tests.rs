use crate::test_support::{FakeEncoder, FakeRenderer, TempDir, rig_json, write_rig};
use crate::{
    CancellationToken, Codec, JobConfig, JobOutcome, RenderError, fingerprint, run_job, run_jobs,
};
use serde_json::json;
use std::path::{Path, PathBuf};

/// Writes an index of one `hero` rig plus any extra fields.
fn write_index(dir: &Path, animations: &[(&str, f32)], extra: serde_json::Value) -> PathBuf {
    write_rig(dir, "hero", &rig_json(animations));
    let mut index = json!({
        "name": "demo",
        "size": [8, 4],
        "spines": [ { "name": "hero" } ]
    });
    if let (Some(index), Some(extra)) = (index.as_object_mut(), extra.as_object()) {
        index.extend(extra.clone());
    }
    let path = dir.join("index.json");
    std::fs::write(&path, index.to_string()).unwrap();
    path
}

fn config(codec: Codec) -> JobConfig {
    JobConfig {
        fps: 10.0,
        codec,
        ..JobConfig::default()
    }
}

fn rendered(outcome: &JobOutcome) -> Vec<&str> {
    match outcome {
        JobOutcome::Rendered { rendered, .. } => rendered.iter().map(String::as_str).collect(),
        JobOutcome::Skipped => Vec::new(),
    }
}

#[test]
fn fingerprint_is_lowercase_sha256() {
    assert_eq!(
        fingerprint(b"abc"),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

#[test]
fn renders_every_shared_animation_and_links_idle() {
    let dir = TempDir::new("job-render");
    let index = write_index(dir.path(), &[("walk", 0.5), ("idle", 1.0), ("x", 1.0)], json!({}));
    let encoder = FakeEncoder::default();

    let outcome = run_job(
        &index,
        &config(Codec::Vp9),
        &FakeRenderer::default(),
        &encoder,
        &CancellationToken::new(),
    )
    .unwrap();

    assert!(outcome.is_success());
    assert_eq!(rendered(&outcome), ["idle", "walk"]);
    let out = dir.path().join("render");
    assert_eq!(std::fs::read_to_string(out.join("idle.vp9.webm")).unwrap(), "10");
    assert_eq!(std::fs::read_to_string(out.join("walk.vp9.webm")).unwrap(), "5");
    assert!(!out.join("x.vp9.webm").exists());

    let bytes = std::fs::read(&index).unwrap();
    assert_eq!(
        std::fs::read_to_string(out.join("vp9.sha256")).unwrap(),
        fingerprint(&bytes)
    );
    #[cfg(unix)]
    assert_eq!(
        std::fs::read_link(out.join("_default.vp9.webm")).unwrap(),
        Path::new("idle.vp9.webm")
    );
}

#[test]
fn unchanged_index_is_skipped_unless_forced() {
    let dir = TempDir::new("job-skip");
    let index = write_index(dir.path(), &[("idle", 1.0)], json!({}));
    let renderer = FakeRenderer::default();
    let encoder = FakeEncoder::default();
    let cancel = CancellationToken::new();

    let first = run_job(&index, &config(Codec::H264), &renderer, &encoder, &cancel).unwrap();
    assert_eq!(rendered(&first), ["idle"]);
    let second = run_job(&index, &config(Codec::H264), &renderer, &encoder, &cancel).unwrap();
    assert_eq!(second, JobOutcome::Skipped);
    // NVENC output shares the fingerprint of the software encoder.
    let nvenc = run_job(&index, &config(Codec::H264Nv), &renderer, &encoder, &cancel).unwrap();
    assert_eq!(nvenc, JobOutcome::Skipped);
    assert_eq!(encoder.videos(), 1);

    // A different codec has its own fingerprint.
    let mov = run_job(&index, &config(Codec::Mov), &renderer, &encoder, &cancel).unwrap();
    assert_eq!(rendered(&mov), ["idle"]);

    let forced = JobConfig {
        force: true,
        ..config(Codec::H264)
    };
    let third = run_job(&index, &forced, &renderer, &encoder, &cancel).unwrap();
    assert_eq!(rendered(&third), ["idle"]);
    assert_eq!(encoder.videos(), 3);

    // Editing the index invalidates the fingerprint.
    let mut bytes = std::fs::read(&index).unwrap();
    bytes.push(b'\n');
    std::fs::write(&index, bytes).unwrap();
    let edited = run_job(&index, &config(Codec::H264), &renderer, &encoder, &cancel).unwrap();
    assert_eq!(rendered(&edited), ["idle"]);
}

#[cfg(unix)]
#[test]
fn default_animation_picks_the_link_target() {
    let dir = TempDir::new("job-default");
    let out = dir.path().join("render");

    let index = write_index(
        dir.path(),
        &[("idle", 1.0), ("wave", 1.0)],
        json!({ "defaultAnimation": "wave" }),
    );
    run_job(
        &index,
        &config(Codec::Mov),
        &FakeRenderer::default(),
        &FakeEncoder::default(),
        &CancellationToken::new(),
    )
    .unwrap();
    assert_eq!(
        std::fs::read_link(out.join("_default.mov")).unwrap(),
        Path::new("wave.mov")
    );

    // Without idle the first animation is the default; the old link is replaced.
    let index = write_index(dir.path(), &[("run", 1.0), ("wave", 1.0)], json!({}));
    let forced = JobConfig {
        force: true,
        ..config(Codec::Mov)
    };
    run_job(
        &index,
        &forced,
        &FakeRenderer::default(),
        &FakeEncoder::default(),
        &CancellationToken::new(),
    )
    .unwrap();
    assert_eq!(
        std::fs::read_link(out.join("_default.mov")).unwrap(),
        Path::new("run.mov")
    );
}

#[test]
fn failed_animation_keeps_the_fingerprint_unwritten() {
    let dir = TempDir::new("job-failed");
    let index = write_index(dir.path(), &[("idle", 1.0), ("blank", 0.0)], json!({}));
    let encoder = FakeEncoder::default();

    let outcome = run_job(
        &index,
        &config(Codec::H264),
        &FakeRenderer::default(),
        &encoder,
        &CancellationToken::new(),
    )
    .unwrap();

    assert_eq!(
        outcome,
        JobOutcome::Rendered {
            rendered: vec!["idle".into()],
            failed: vec!["blank".into()],
        }
    );
    assert!(!outcome.is_success());
    let out = dir.path().join("render");
    assert!(out.join("idle.mp4").exists());
    assert!(!out.join("blank.mp4").exists());
    assert!(!out.join("h264.sha256").exists());
    assert!(std::fs::symlink_metadata(out.join("_default.mp4")).is_err());
}

#[test]
fn bad_index_and_cancellation_are_errors() {
    let dir = TempDir::new("job-errors");
    let renderer = FakeRenderer::default();
    let encoder = FakeEncoder::default();
    let cancel = CancellationToken::new();

    let missing = dir.path().join("missing.json");
    let err = run_job(&missing, &config(Codec::Vp9), &renderer, &encoder, &cancel).unwrap_err();
    assert!(matches!(err, RenderError::Index { .. }));

    let index = dir.path().join("unknown.json");
    std::fs::write(&index, r#"{ "name": "x", "spines": [ { "name": "nobody" } ] }"#).unwrap();
    let err = run_job(&index, &config(Codec::Vp9), &renderer, &encoder, &cancel).unwrap_err();
    assert!(matches!(err, RenderError::Index { .. }));

    let index = write_index(dir.path(), &[("idle", 1.0)], json!({}));
    cancel.cancel();
    let err = run_job(&index, &config(Codec::Vp9), &renderer, &encoder, &cancel).unwrap_err();
    assert!(matches!(err, RenderError::Cancelled));
    assert_eq!(encoder.videos(), 0);
}

#[test]
fn jobs_run_in_parallel_and_report_per_index() {
    let root = TempDir::new("job-many");
    let indexes: Vec<PathBuf> = ["one", "two", "three"]
        .iter()
        .map(|name| {
            let dir = root.path().join(name);
            std::fs::create_dir_all(&dir).unwrap();
            write_index(&dir, &[("idle", 0.5)], json!({ "name": name }))
        })
        .collect();
    let encoder = FakeEncoder::default();
    let config = JobConfig {
        encode_threads: 2,
        ..config(Codec::Vp9)
    };

    let reports = run_jobs(
        &indexes,
        &config,
        &FakeRenderer::default(),
        &encoder,
        &CancellationToken::new(),
    )
    .unwrap();

    assert_eq!(reports.len(), 3);
    for (report, index) in reports.iter().zip(&indexes) {
        assert_eq!(&report.index, index);
        assert!(report.result.as_ref().unwrap().is_success());
    }
    assert_eq!(encoder.videos(), 3);
}
