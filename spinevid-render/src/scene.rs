use crate::{BoneFollower, Entry, IndexFile, RenderError, RenderQuirk, load_rig};
use glam::{UVec2, Vec2};
use spinevid::{Atlas, DrawList, Skeleton, SkeletonData, build_draw_list};
use spinevid_wgpu::{PageImage, PageSet};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, OnceLock};

/// Canvas size used when an index file does not specify one.
pub const DEFAULT_CANVAS_SIZE: Vec2 = Vec2::new(1920.0, 1080.0);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RendererSettings {
    pub quirk: Option<RenderQuirk>,
    /// Supersampling factor: frames are rasterized this many times larger than the video.
    pub scale: u32,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            quirk: None,
            scale: 2,
        }
    }
}

#[derive(Debug)]
pub struct SceneRig {
    pub entry: Entry,
    pub data: Arc<SkeletonData>,
    pub atlas: Arc<Atlas>,
    /// Index of this rig's first atlas page in the scene's page set.
    pub page_offset: usize,
}

#[derive(Clone, Debug)]
pub(crate) struct FollowerBinding {
    pub bone: String,
    pub source: usize,
    pub target: usize,
}

/// Root position and scale of one rig on the y-down canvas.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    pub position: Vec2,
    pub scale_x: f32,
    pub scale_y: f32,
}

impl Placement {
    /// The entry's pivot picks the anchor point on the canvas, measured from the bottom
    /// right; its position is an offset in y-up video pixels.
    pub fn for_entry(entry: &Entry, canvas: Vec2, scale: f32) -> Self {
        let offset = entry.position.unwrap_or(Vec2::ZERO) * Vec2::new(1.0, -1.0) * scale;
        let scale_x = entry.scale * scale;
        Self {
            position: canvas * (Vec2::ONE - entry.pivot) + offset,
            scale_x,
            scale_y: -scale_x,
        }
    }

    pub fn apply(&self, skeleton: &mut Skeleton) {
        skeleton.x = self.position.x;
        skeleton.y = self.position.y;
        skeleton.scale_x = self.scale_x;
        skeleton.scale_y = self.scale_y;
    }
}

/// The rigs of one index file, placed on a shared canvas.
#[derive(Debug)]
pub struct Scene {
    size: Vec2,
    settings: RendererSettings,
    rigs: Vec<SceneRig>,
    followers: Vec<FollowerBinding>,
    pages: Vec<PageImage>,
    page_set: OnceLock<Arc<PageSet>>,
    animations: Vec<String>,
}

impl Scene {
    pub fn new(size: Option<Vec2>, settings: RendererSettings) -> Self {
        Self {
            size: size.unwrap_or(DEFAULT_CANVAS_SIZE),
            settings,
            rigs: Vec::new(),
            followers: Vec::new(),
            pages: Vec::new(),
            page_set: OnceLock::new(),
            animations: Vec::new(),
        }
    }

    /// Loads every rig an index file lists, relative to `dir`, and binds its followers.
    pub fn from_index(index: &IndexFile, dir: &Path) -> Result<Self, RenderError> {
        let settings = RendererSettings {
            quirk: index.render_quirk,
            ..RendererSettings::default()
        };
        if let Some(quirk) = settings.quirk {
            log::info!("{}: using render quirk {quirk:?}", index.name);
        }

        let mut scene = Scene::new(index.size, settings);
        for entry in &index.spines {
            let rig = load_rig(dir, entry)?;
            scene.add_rig(entry.clone(), rig.data, rig.atlas, rig.pages);
        }
        for follower in &index.bone_followers {
            scene.add_bone_follower(follower)?;
        }
        Ok(scene)
    }

    /// Adds a rig drawn above the ones before it. `pages` pairs with `atlas.pages`; missing
    /// images are drawn transparent.
    pub fn add_rig(
        &mut self,
        entry: Entry,
        data: Arc<SkeletonData>,
        atlas: Arc<Atlas>,
        pages: Vec<PageImage>,
    ) {
        // Single-character names are editor scratch animations.
        let names = data
            .animations
            .iter()
            .map(|a| a.name.as_str())
            .filter(|name| name.chars().count() > 1);
        if self.rigs.is_empty() {
            self.animations = names.map(str::to_string).collect();
        } else {
            let names: HashSet<&str> = names.collect();
            self.animations.retain(|a| names.contains(a.as_str()));
        }

        let page_offset = self.pages.len();
        let mut images = pages.into_iter();
        for page in &atlas.pages {
            let image = images.next().unwrap_or_else(|| PageImage::blank(page));
            self.pages.push(image);
        }
        self.page_set = OnceLock::new();

        self.rigs.push(SceneRig {
            entry,
            data,
            atlas,
            page_offset,
        });
    }

    pub fn add_bone_follower(&mut self, follower: &BoneFollower) -> Result<(), RenderError> {
        let source = self.rig_index(&follower.skeleton)?;
        for target in &follower.spines {
            let target = self.rig_index(target)?;
            self.followers.push(FollowerBinding {
                bone: follower.bone.clone(),
                source,
                target,
            });
        }
        Ok(())
    }

    fn rig_index(&self, name: &str) -> Result<usize, RenderError> {
        self.rigs
            .iter()
            .position(|rig| rig.entry.name == name)
            .ok_or_else(|| RenderError::UnknownSkeleton {
                skeleton: name.to_string(),
            })
    }

    pub fn rigs(&self) -> &[SceneRig] {
        &self.rigs
    }

    pub(crate) fn followers(&self) -> &[FollowerBinding] {
        &self.followers
    }

    pub fn settings(&self) -> RendererSettings {
        self.settings
    }

    /// Animations every rig has, in the first rig's order.
    pub fn animations(&self) -> &[String] {
        &self.animations
    }

    /// Size of the encoded video.
    pub fn output_size(&self) -> UVec2 {
        self.size.round().as_uvec2()
    }

    /// Size frames are rasterized at.
    pub fn canvas_size(&self) -> UVec2 {
        (self.size * self.settings.scale as f32).round().as_uvec2()
    }

    /// Fresh setup-pose skeletons, placed and with world transforms computed.
    pub fn skeletons(&self) -> Vec<Skeleton> {
        let canvas = self.size * self.settings.scale as f32;
        self.rigs
            .iter()
            .map(|rig| {
                let mut skeleton = Skeleton::new(Arc::clone(&rig.data));
                Placement::for_entry(&rig.entry, canvas, self.settings.scale as f32)
                    .apply(&mut skeleton);
                skeleton.update_world_transform();
                skeleton
            })
            .collect()
    }

    /// One frame's geometry, rigs in scene order, pages indexed into [`Scene::pages`].
    pub fn draw_list(&self, skeletons: &[Skeleton]) -> DrawList {
        let mut list = DrawList::default();
        for (rig, skeleton) in self.rigs.iter().zip(skeletons) {
            list.append(build_draw_list(skeleton, &rig.atlas), rig.page_offset);
        }
        list
    }

    pub fn pages(&self) -> Arc<PageSet> {
        Arc::clone(
            self.page_set
                .get_or_init(|| Arc::new(PageSet::new(self.pages.clone()))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{entry, scene_with};

    #[test]
    fn placement_anchors_pivot_and_flips_y() {
        let mut hero = entry("hero");
        hero.position = Some(Vec2::new(10.0, 20.0));
        hero.pivot = Vec2::new(0.25, 1.0);
        hero.scale = 0.5;

        let placement = Placement::for_entry(&hero, Vec2::new(3840.0, 2160.0), 2.0);
        assert_eq!(placement.position, Vec2::new(2880.0 + 20.0, 0.0 - 40.0));
        assert_eq!(placement.scale_x, 1.0);
        assert_eq!(placement.scale_y, -1.0);
    }

    #[test]
    fn default_placement_centers_the_rig() {
        let placement = Placement::for_entry(&entry("hero"), Vec2::new(200.0, 100.0), 2.0);
        assert_eq!(placement.position, Vec2::new(100.0, 50.0));
        assert_eq!(placement.scale_y, -2.0);
    }

    #[test]
    fn canvas_and_output_sizes() {
        let scene = Scene::new(None, RendererSettings::default());
        assert_eq!(scene.output_size(), UVec2::new(1920, 1080));
        assert_eq!(scene.canvas_size(), UVec2::new(3840, 2160));
    }

    #[test]
    fn animations_intersect_in_first_rig_order() {
        let scene = scene_with(&[
            ("a", &[("walk", 1.0), ("idle", 1.0), ("x", 1.0), ("jump", 1.0)]),
            ("b", &[("jump", 1.0), ("walk", 2.0), ("x", 1.0)]),
        ]);
        // Animations load sorted by name.
        assert_eq!(scene.animations(), ["jump", "walk"]);
    }

    #[test]
    fn rigs_get_consecutive_page_offsets() {
        let scene = scene_with(&[("a", &[("idle", 1.0)]), ("b", &[("idle", 1.0)])]);
        assert_eq!(scene.rigs()[0].page_offset, 0);
        assert_eq!(scene.rigs()[1].page_offset, 1);
        assert_eq!(scene.pages().len(), 2);
        assert_eq!(scene.pages().id(), scene.pages().id());
    }

    #[test]
    fn draw_list_spans_all_rigs() {
        let scene = scene_with(&[("a", &[("idle", 1.0)]), ("b", &[("idle", 1.0)])]);
        let list = scene.draw_list(&scene.skeletons());
        let pages: Vec<_> = list.draws.iter().map(|d| d.texture_page).collect();
        assert_eq!(pages, vec![0, 1]);
        assert_eq!(list.vertices.len(), 8);
    }

    #[test]
    fn followers_must_name_known_rigs() {
        let mut scene = scene_with(&[("a", &[("idle", 1.0)]), ("b", &[("idle", 1.0)])]);
        let follower = BoneFollower {
            bone: "hand".into(),
            skeleton: "a".into(),
            spines: vec!["b".into(), "c".into()],
        };
        let err = scene.add_bone_follower(&follower).unwrap_err();
        assert!(matches!(err, RenderError::UnknownSkeleton { ref skeleton } if skeleton == "c"));

        let follower = BoneFollower {
            bone: "hand".into(),
            skeleton: "z".into(),
            spines: vec!["b".into()],
        };
        assert!(scene.add_bone_follower(&follower).is_err());
    }
}
