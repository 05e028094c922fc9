use crate::RenderError;
use glam::Vec2;
use serde::Deserialize;
use spinevid::{Atlas, SkeletonData};
use spinevid_wgpu::{PageImage, RasterError};
use std::path::Path;
use std::sync::Arc;

/// One index file: the rigs rendered together onto a shared canvas.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexFile {
    pub name: String,
    #[serde(default)]
    pub size: Option<Vec2>,
    pub spines: Vec<Entry>,
    #[serde(default)]
    pub bone_followers: Vec<BoneFollower>,
    #[serde(default)]
    pub render_quirk: Option<RenderQuirk>,
    #[serde(default)]
    pub default_animation: Option<String>,
}

impl IndexFile {
    pub fn from_slice(bytes: &[u8], path: &Path) -> Result<Self, RenderError> {
        serde_json::from_slice(bytes).map_err(|e| RenderError::Index {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

/// Placement of one rig. `name` is relative to the index file's directory.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub name: String,
    #[serde(default)]
    pub position: Option<Vec2>,
    #[serde(default)]
    pub size: Option<Vec2>,
    #[serde(default = "default_scale")]
    pub scale: f32,
    #[serde(default = "default_pivot")]
    pub pivot: Vec2,
}

fn default_scale() -> f32 {
    1.0
}

fn default_pivot() -> Vec2 {
    Vec2::splat(0.5)
}

/// Moves each of `spines` along with `bone` of `skeleton`.
#[derive(Clone, Debug, Deserialize)]
pub struct BoneFollower {
    pub bone: String,
    pub skeleton: String,
    pub spines: Vec<String>,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
pub enum RenderQuirk {
    /// Combine rigs by their shortest non-empty animation instead of the longest.
    Short,
}

/// A rig loaded from disk, with its atlas pages decoded.
#[derive(Debug)]
pub struct LoadedRig {
    pub data: Arc<SkeletonData>,
    pub atlas: Arc<Atlas>,
    pub pages: Vec<PageImage>,
}

/// Loads `<dir>/<name>` (binary when the name ends in `.skel`, else `<name>.json`) and its
/// atlas `<name>.atlas`, or `<name>.atlas.txt` when the former does not exist.
///
/// Page images that do not exist are replaced by a transparent texel; unreadable or
/// undecodable ones fail the load.
pub fn load_rig(dir: &Path, entry: &Entry) -> Result<LoadedRig, RenderError> {
    let base = entry.name.strip_suffix(".skel").unwrap_or(&entry.name);
    let binary = base.len() != entry.name.len();

    let atlas_path = {
        let plain = dir.join(format!("{base}.atlas"));
        if plain.exists() {
            plain
        } else {
            dir.join(format!("{base}.atlas.txt"))
        }
    };
    let atlas_text = std::fs::read_to_string(&atlas_path).map_err(|e| RenderError::Index {
        path: atlas_path.clone(),
        message: format!("cannot read atlas: {e}"),
    })?;
    let atlas = Atlas::parse(&atlas_text).map_err(|source| RenderError::Load {
        path: atlas_path.clone(),
        source,
    })?;

    let data = if binary {
        let path = dir.join(&entry.name);
        let bytes = read(&path)?;
        SkeletonData::from_skel_bytes(&bytes).map_err(|source| RenderError::Load { path, source })?
    } else {
        let path = dir.join(format!("{base}.json"));
        let bytes = read(&path)?;
        let text = std::str::from_utf8(&bytes).map_err(|e| RenderError::Index {
            path: path.clone(),
            message: format!("skeleton is not valid UTF-8: {e}"),
        })?;
        SkeletonData::from_json_str(text).map_err(|source| RenderError::Load { path, source })?
    };

    let page_dir = atlas_path.parent().map(Path::to_path_buf).unwrap_or_default();
    let mut pages = Vec::with_capacity(atlas.pages.len());
    for page in &atlas.pages {
        let path = page_dir.join(&page.name);
        let image = match PageImage::load(&path, page) {
            Ok(image) => image,
            Err(RasterError::PageRead { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                log::warn!("atlas page '{}' not found; drawing it transparent", path.display());
                PageImage::blank(page)
            }
            Err(e) => return Err(e.into()),
        };
        pages.push(image);
    }

    log::debug!(
        "loaded rig '{}': {} bones, {} animations, {} pages",
        entry.name,
        data.bones.len(),
        data.animations.len(),
        atlas.pages.len()
    );
    Ok(LoadedRig {
        data,
        atlas: Arc::new(atlas),
        pages,
    })
}

fn read(path: &Path) -> Result<Vec<u8>, RenderError> {
    std::fs::read(path).map_err(|e| RenderError::Index {
        path: path.to_path_buf(),
        message: format!("cannot read skeleton: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{TempDir, entry, rig_json, write_rig};

    #[test]
    fn entries_fill_in_defaults() {
        let index = IndexFile::from_slice(
            br#"{ "name": "demo", "spines": [ { "name": "hero" } ] }"#,
            Path::new("index.json"),
        )
        .unwrap();
        assert_eq!(index.name, "demo");
        assert_eq!(index.size, None);
        assert!(index.bone_followers.is_empty());
        assert_eq!(index.render_quirk, None);

        let entry = &index.spines[0];
        assert_eq!(entry.scale, 1.0);
        assert_eq!(entry.pivot, Vec2::splat(0.5));
        assert_eq!(entry.position, None);
    }

    #[test]
    fn camel_case_fields_parse() {
        let index = IndexFile::from_slice(
            br#"{
              "name": "duo",
              "size": [1280, 720],
              "spines": [
                { "name": "a", "position": [10, -20], "scale": 0.5, "pivot": [0, 1] },
                { "name": "b.skel" }
              ],
              "boneFollowers": [ { "bone": "hand", "skeleton": "a", "spines": ["b.skel"] } ],
              "renderQuirk": "Short",
              "defaultAnimation": "wave"
            }"#,
            Path::new("index.json"),
        )
        .unwrap();
        assert_eq!(index.size, Some(Vec2::new(1280.0, 720.0)));
        assert_eq!(index.spines[0].position, Some(Vec2::new(10.0, -20.0)));
        assert_eq!(index.spines[0].pivot, Vec2::new(0.0, 1.0));
        assert_eq!(index.bone_followers[0].spines, vec!["b.skel".to_string()]);
        assert_eq!(index.render_quirk, Some(RenderQuirk::Short));
        assert_eq!(index.default_animation.as_deref(), Some("wave"));
    }

    #[test]
    fn malformed_index_names_the_file() {
        let err = IndexFile::from_slice(b"{ \"spines\": [] }", Path::new("bad.json")).unwrap_err();
        assert!(matches!(err, RenderError::Index { ref path, .. } if path == Path::new("bad.json")));
    }

    #[test]
    fn rigs_load_with_atlas_fallback_and_blank_pages() {
        let dir = TempDir::new("load-rig");
        write_rig(dir.path(), "hero", &rig_json(&[("idle", 1.0)]));
        // Only the `.atlas.txt` spelling exists and its page image is missing.
        std::fs::rename(
            dir.path().join("hero.atlas"),
            dir.path().join("hero.atlas.txt"),
        )
        .unwrap();

        let entry = Entry {
            name: "hero".into(),
            position: None,
            size: None,
            scale: 1.0,
            pivot: Vec2::splat(0.5),
        };
        let rig = load_rig(dir.path(), &entry).unwrap();
        assert!(rig.data.animation("idle").is_some());
        assert_eq!(rig.atlas.pages.len(), 1);
        assert_eq!(rig.pages.len(), 1);
        assert_eq!((rig.pages[0].width, rig.pages[0].height), (1, 1));
    }

    #[test]
    fn corrupt_page_images_fail_the_load() {
        let dir = TempDir::new("load-corrupt-page");
        write_rig(dir.path(), "hero", &rig_json(&[("idle", 1.0)]));
        std::fs::write(dir.path().join("square.png"), b"not a png at all").unwrap();

        let err = load_rig(dir.path(), &entry("hero")).unwrap_err();
        assert!(
            matches!(
                err,
                RenderError::Raster(RasterError::PageDecode { ref path, .. })
                    if path.ends_with("square.png")
            ),
            "{err}"
        );
    }

    #[test]
    fn skeleton_json_must_be_utf8() {
        let dir = TempDir::new("load-bad-utf8");
        write_rig(dir.path(), "hero", &rig_json(&[("idle", 1.0)]));
        let mut bytes = std::fs::read(dir.path().join("hero.json")).unwrap();
        bytes.insert(1, 0xFF);
        std::fs::write(dir.path().join("hero.json"), bytes).unwrap();

        let err = load_rig(dir.path(), &entry("hero")).unwrap_err();
        assert!(
            matches!(err, RenderError::Index { ref message, .. } if message.contains("UTF-8")),
            "{err}"
        );
    }

    #[test]
    fn missing_skeleton_is_an_error() {
        let dir = TempDir::new("load-missing");
        std::fs::write(dir.path().join("ghost.atlas"), crate::test_support::ATLAS).unwrap();
        let entry = Entry {
            name: "ghost.skel".into(),
            position: None,
            size: None,
            scale: 1.0,
            pivot: Vec2::splat(0.5),
        };
        let err = load_rig(dir.path(), &entry).unwrap_err();
        assert!(matches!(err, RenderError::Index { ref path, .. } if path.ends_with("ghost.skel")));
    }
}
