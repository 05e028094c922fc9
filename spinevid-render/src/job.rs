use crate::{
    CancellationToken, Codec, FrameEncoder, FrameRenderer, IndexFile, RenderError, Scene,
    generate_video,
};
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Directory next to the index file that receives the videos.
pub const OUTPUT_DIR: &str = "render";

#[derive(Clone, Debug, PartialEq)]
pub struct JobConfig {
    pub fps: f32,
    pub codec: Codec,
    /// Index files rendered concurrently.
    pub encode_threads: usize,
    /// Re-render even when the index fingerprint is unchanged.
    pub force: bool,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            fps: 30.0,
            codec: Codec::Vp9,
            encode_threads: 1,
            force: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobOutcome {
    /// The index fingerprint matched the last successful render.
    Skipped,
    Rendered {
        rendered: Vec<String>,
        failed: Vec<String>,
    },
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        match self {
            JobOutcome::Skipped => true,
            JobOutcome::Rendered { failed, .. } => failed.is_empty(),
        }
    }
}

#[derive(Debug)]
pub struct JobReport {
    pub index: PathBuf,
    pub result: Result<JobOutcome, RenderError>,
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn fingerprint(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

/// Runs one job per index file, `config.encode_threads` at a time.
pub fn run_jobs(
    indexes: &[PathBuf],
    config: &JobConfig,
    renderer: &dyn FrameRenderer,
    encoder: &dyn FrameEncoder,
    cancel: &CancellationToken,
) -> Result<Vec<JobReport>, RenderError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.encode_threads.max(1))
        .thread_name(|i| format!("spinevid-job-{i}"))
        .build()
        .map_err(|e| RenderError::ThreadPool {
            message: e.to_string(),
        })?;

    Ok(pool.install(|| {
        indexes
            .par_iter()
            .map(|index| JobReport {
                index: index.clone(),
                result: run_job(index, config, renderer, encoder, cancel),
            })
            .collect()
    }))
}

/// Renders every animation an index file's rigs share into `<index dir>/render`.
///
/// Animations fail independently. Only when all succeed is `_default.<ext>` linked to
/// the default animation and the fingerprint stored.
pub fn run_job(
    index_path: &Path,
    config: &JobConfig,
    renderer: &dyn FrameRenderer,
    encoder: &dyn FrameEncoder,
    cancel: &CancellationToken,
) -> Result<JobOutcome, RenderError> {
    if cancel.is_cancelled() {
        return Err(RenderError::Cancelled);
    }
    let bytes = std::fs::read(index_path).map_err(|e| RenderError::Index {
        path: index_path.to_path_buf(),
        message: e.to_string(),
    })?;
    let dir = index_path
        .parent()
        .filter(|d| !d.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let output_dir = dir.join(OUTPUT_DIR);
    let codec = config.codec;
    let hash = fingerprint(&bytes);
    let hash_path = output_dir.join(format!("{}.sha256", codec.hash_name()));

    if !config.force
        && std::fs::read_to_string(&hash_path).is_ok_and(|stored| stored.trim() == hash)
    {
        log::info!("{}: unchanged, skipping", index_path.display());
        return Ok(JobOutcome::Skipped);
    }

    let index = IndexFile::from_slice(&bytes, index_path)?;
    let scene = Scene::from_index(&index, dir)?;
    std::fs::create_dir_all(&output_dir)?;

    let mut rendered = Vec::new();
    let mut failed = Vec::new();
    for animation in scene.animations() {
        if cancel.is_cancelled() {
            return Err(RenderError::Cancelled);
        }
        let output = output_dir.join(format!("{animation}.{}", codec.extension()));
        let started = Instant::now();
        let before = renderer.stats().map(|s| s.snapshot());

        let result = generate_video(
            &scene, animation, &output, config.fps, codec, renderer, encoder, cancel,
        );
        match result {
            Ok(()) => {
                log::info!(
                    "Rendered {} - {animation} in {:.1}s",
                    index.name,
                    started.elapsed().as_secs_f32()
                );
                if let (Some(stats), Some(before)) = (renderer.stats(), before) {
                    let delta = stats.snapshot().since(&before);
                    log::debug!(
                        "{} - {animation}: {} frames, mean draw {:?}, total round trip {:?}",
                        index.name,
                        delta.frames_rendered,
                        delta.mean_draw_time(),
                        delta.round_trip_time
                    );
                }
                rendered.push(animation.clone());
            }
            Err(RenderError::Cancelled) => return Err(RenderError::Cancelled),
            Err(e) => {
                log::error!("Failed to render {} - {animation}: {e}", index.name);
                failed.push(animation.clone());
            }
        }
    }

    if failed.is_empty() {
        match default_animation(&index, scene.animations()) {
            Some(default) => link_default(&output_dir, default, codec)?,
            None => log::warn!("{}: rigs share no animations", index.name),
        }
        std::fs::write(&hash_path, &hash)?;
    }
    Ok(JobOutcome::Rendered { rendered, failed })
}

fn default_animation<'a>(index: &'a IndexFile, animations: &'a [String]) -> Option<&'a str> {
    index
        .default_animation
        .as_deref()
        .or_else(|| animations.iter().find(|a| *a == "idle").map(String::as_str))
        .or_else(|| animations.first().map(String::as_str))
}

/// Points `_default.<ext>` at `<animation>.<ext>`, replacing any previous link.
fn link_default(output_dir: &Path, animation: &str, codec: Codec) -> Result<(), RenderError> {
    let link = output_dir.join(format!("_default.{}", codec.extension()));
    let target = format!("{animation}.{}", codec.extension());
    match std::fs::remove_file(&link) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    #[cfg(unix)]
    std::os::unix::fs::symlink(&target, &link)?;
    #[cfg(not(unix))]
    std::fs::copy(output_dir.join(&target), &link)?;

    log::debug!("{} -> {target}", link.display());
    Ok(())
}
