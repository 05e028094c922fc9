use crate::{
    CancellationToken, Codec, EncodeSettings, Frame, FrameEncoder, FrameRenderer, FrameScheduler,
    RenderError, Scene,
};
use std::path::Path;
use std::sync::mpsc::{self, SyncSender};
use std::thread;

/// Frames allowed in flight between rasterization and the encoder.
pub const FRAME_QUEUE_DEPTH: usize = 5;

/// Renders one animation of `scene` to `output`.
///
/// Frames are produced on the calling thread and encoded on a scoped thread behind a
/// bounded queue. On any failure or cancellation the partially written output is removed.
#[allow(clippy::too_many_arguments)]
pub fn generate_video(
    scene: &Scene,
    animation: &str,
    output: &Path,
    fps: f32,
    codec: Codec,
    renderer: &dyn FrameRenderer,
    encoder: &dyn FrameEncoder,
    cancel: &CancellationToken,
) -> Result<(), RenderError> {
    if let Some(dir) = output.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }

    let result = produce_and_encode(scene, animation, output, fps, codec, renderer, encoder, cancel);
    if result.is_err() {
        match std::fs::remove_file(output) {
            Ok(()) => log::debug!("removed partial output {}", output.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("failed to remove {}: {e}", output.display()),
        }
    }
    result
}

#[allow(clippy::too_many_arguments)]
fn produce_and_encode(
    scene: &Scene,
    animation: &str,
    output: &Path,
    fps: f32,
    codec: Codec,
    renderer: &dyn FrameRenderer,
    encoder: &dyn FrameEncoder,
    cancel: &CancellationToken,
) -> Result<(), RenderError> {
    let scheduler = FrameScheduler::new(scene, animation, fps)?;
    log::debug!(
        "'{animation}': {:.3}s, {} frames",
        scheduler.duration(),
        scheduler.frame_count()
    );
    let settings = EncodeSettings {
        input_size: scene.canvas_size(),
        output_size: scene.output_size(),
        fps,
        codec,
    };

    let (sender, frames) = mpsc::sync_channel::<Frame>(FRAME_QUEUE_DEPTH);
    let (produced, encoded) = thread::scope(|s| {
        let settings = &settings;
        let encoding = s.spawn(move || encoder.encode(frames, output, settings));
        let produced = produce(scene, scheduler, renderer, sender, cancel);
        let encoded = encoding.join().unwrap_or_else(|_| {
            Err(RenderError::Encoder {
                message: "encoder thread panicked".to_string(),
            })
        });
        (produced, encoded)
    });

    // A producer failure explains an encoder that finished early, not the other way round.
    produced?;
    encoded?;
    if cancel.is_cancelled() {
        return Err(RenderError::Cancelled);
    }
    Ok(())
}

/// Rasterizes every frame and queues it; returns when done, cancelled or the encoder left.
/// Dropping `sender` on return tells the encoder the stream is over.
fn produce(
    scene: &Scene,
    scheduler: FrameScheduler<'_>,
    renderer: &dyn FrameRenderer,
    sender: SyncSender<Frame>,
    cancel: &CancellationToken,
) -> Result<(), RenderError> {
    let canvas = scene.canvas_size();
    let pages = scene.pages();
    for draw_list in scheduler {
        if cancel.is_cancelled() {
            return Err(RenderError::Cancelled);
        }
        let frame = renderer.render(canvas, &pages, draw_list)?;
        if sender.send(frame).is_err() {
            log::debug!("encoder stopped accepting frames");
            break;
        }
    }
    Ok(())
}
