use crate::{
    EncodeSettings, Entry, Frame, FrameEncoder, FrameRenderer, RenderError, RenderQuirk,
    RendererSettings, Scene,
};
use glam::{UVec2, Vec2};
use serde_json::json;
use spinevid::{Atlas, DrawList, SkeletonData};
use spinevid_wgpu::{PageImage, PageSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};

/// Video size of every test scene; frames are rasterized at twice this.
pub const SIZE: [f32; 2] = [8.0, 4.0];

pub const ATLAS: &str = "
square.png
size: 16,16
format: RGBA8888
filter: Linear,Linear
repeat: none
square
  rotate: false
  xy: 0, 0
  size: 16, 16
  orig: 16, 16
  offset: 0, 0
  index: -1
";

/// Removed with its contents on drop.
pub struct TempDir(PathBuf);

impl TempDir {
    pub fn new(label: &str) -> Self {
        static NEXT: AtomicUsize = AtomicUsize::new(0);
        let path = std::env::temp_dir().join(format!(
            "spinevid-{label}-{}-{}",
            std::process::id(),
            NEXT.fetch_add(1, Ordering::Relaxed)
        ));
        let _ = std::fs::remove_dir_all(&path);
        std::fs::create_dir_all(&path).unwrap();
        Self(path)
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

/// A rig with a root, a `hand` bone and one region slot. Each animation moves `hand` from
/// x 0 to x 100 over its duration; a zero duration gives an animation without keys.
pub fn rig_json(animations: &[(&str, f32)]) -> String {
    let animations: serde_json::Map<String, serde_json::Value> = animations
        .iter()
        .map(|&(name, duration)| {
            let animation = if duration > 0.0 {
                json!({
                    "bones": {
                        "hand": {
                            "translate": [ { "x": 0 }, { "time": duration, "x": 100 } ]
                        }
                    }
                })
            } else {
                json!({})
            };
            (name.to_string(), animation)
        })
        .collect();

    json!({
        "skeleton": { "spine": "3.8.99" },
        "bones": [ { "name": "root" }, { "name": "hand", "parent": "root" } ],
        "slots": [ { "name": "body", "bone": "root", "attachment": "square" } ],
        "skins": [
            {
                "name": "default",
                "attachments": { "body": { "square": { "width": 10, "height": 10 } } }
            }
        ],
        "animations": animations
    })
    .to_string()
}

/// Writes `<name>.json` and `<name>.atlas`; the page image is left out.
pub fn write_rig(dir: &Path, name: &str, json: &str) {
    std::fs::write(dir.join(format!("{name}.json")), json).unwrap();
    std::fs::write(dir.join(format!("{name}.atlas")), ATLAS).unwrap();
}

pub fn entry(name: &str) -> Entry {
    Entry {
        name: name.to_string(),
        position: None,
        size: None,
        scale: 1.0,
        pivot: Vec2::splat(0.5),
    }
}

pub fn scene_with(rigs: &[(&str, &[(&str, f32)])]) -> Scene {
    scene_with_quirk(None, rigs)
}

pub fn scene_with_quirk(quirk: Option<RenderQuirk>, rigs: &[(&str, &[(&str, f32)])]) -> Scene {
    let settings = RendererSettings {
        quirk,
        ..RendererSettings::default()
    };
    let mut scene = Scene::new(Some(Vec2::from_array(SIZE)), settings);
    for (name, animations) in rigs {
        let data = SkeletonData::from_json_str(&rig_json(animations)).unwrap();
        let atlas = Atlas::parse(ATLAS).unwrap();
        let pages = atlas.pages.iter().map(PageImage::blank).collect();
        scene.add_rig(entry(name), data, Arc::new(atlas), pages);
    }
    scene
}

/// Produces blank frames, optionally failing on the `fail_at`th one (counting from 1).
#[derive(Default)]
pub struct FakeRenderer {
    pub frames: AtomicUsize,
    pub fail_at: Option<usize>,
}

impl FrameRenderer for FakeRenderer {
    fn render(
        &self,
        canvas: UVec2,
        _pages: &Arc<PageSet>,
        _draw_list: DrawList,
    ) -> Result<Frame, RenderError> {
        let frame = self.frames.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_at == Some(frame) {
            return Err(RenderError::PoolClosed);
        }
        Ok(Frame {
            width: canvas.x,
            height: canvas.y,
            pixels: vec![0; (canvas.x * canvas.y * 4) as usize],
        })
    }
}

/// Writes the number of frames it received to the output file.
#[derive(Default)]
pub struct FakeEncoder {
    /// Give up after receiving this many frames of one video.
    pub fail_after: Option<usize>,
    pub frames: AtomicUsize,
    pub outputs: Mutex<Vec<PathBuf>>,
    pub settings: Mutex<Option<EncodeSettings>>,
}

impl FakeEncoder {
    pub fn failing_after(frames: usize) -> Self {
        Self {
            fail_after: Some(frames),
            ..Self::default()
        }
    }

    pub fn videos(&self) -> usize {
        self.outputs.lock().unwrap().len()
    }
}

impl FrameEncoder for FakeEncoder {
    fn encode(
        &self,
        frames: Receiver<Frame>,
        output: &Path,
        settings: &EncodeSettings,
    ) -> Result<(), RenderError> {
        *self.settings.lock().unwrap() = Some(*settings);
        std::fs::write(output, b"")?;
        let mut count = 0;
        for frame in frames {
            assert_eq!(UVec2::new(frame.width, frame.height), settings.input_size);
            count += 1;
            if self.fail_after == Some(count) {
                return Err(RenderError::Encoder {
                    message: format!("gave up after {count} frames"),
                });
            }
        }
        std::fs::write(output, count.to_string())?;
        self.frames.fetch_add(count, Ordering::SeqCst);
        self.outputs.lock().unwrap().push(output.to_path_buf());
        Ok(())
    }
}
