use crate::{RenderError, RenderQuirk, Scene};
use glam::Vec2;
use spinevid::{AnimationState, DrawList, Skeleton};
use std::sync::Arc;

/// How the durations of the rigs playing one animation combine into the video length.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum DurationPolicy {
    #[default]
    Longest,
    /// Shortest non-zero duration; empty members never shorten the video.
    Shortest,
}

impl DurationPolicy {
    pub fn for_quirk(quirk: Option<RenderQuirk>) -> Self {
        match quirk {
            Some(RenderQuirk::Short) => DurationPolicy::Shortest,
            None => DurationPolicy::Longest,
        }
    }

    pub fn combine(self, durations: impl IntoIterator<Item = f32>) -> f32 {
        durations.into_iter().fold(0.0, |combined, d| {
            if combined == 0.0 {
                return d;
            }
            match self {
                DurationPolicy::Longest => combined.max(d),
                DurationPolicy::Shortest if d > 0.0 => combined.min(d),
                DurationPolicy::Shortest => combined,
            }
        })
    }
}

/// Moves a target skeleton's root by a source bone's world motion since the last frame.
#[derive(Clone, Debug)]
struct BoneTracker {
    source: usize,
    bone: usize,
    target: usize,
    last: Vec2,
}

impl BoneTracker {
    fn current(&self, skeletons: &[Skeleton]) -> Vec2 {
        let bone = &skeletons[self.source].bones[self.bone];
        Vec2::new(bone.world_x, bone.world_y)
    }
}

/// Steps every rig of a scene through one animation at a fixed frame rate.
///
/// Frame 0 is the pose at `t = 0`; every later frame advances all tracks by `1 / fps`.
/// Tracks loop, so rigs shorter than the combined duration start over.
pub struct FrameScheduler<'a> {
    scene: &'a Scene,
    skeletons: Vec<Skeleton>,
    states: Vec<AnimationState>,
    trackers: Vec<BoneTracker>,
    duration: f32,
    frame_time: f32,
    frame_count: usize,
    next: usize,
}

impl<'a> FrameScheduler<'a> {
    /// Fails with [`RenderError::InvalidFrameRate`] unless `fps` is positive and finite.
    pub fn new(scene: &'a Scene, animation: &str, fps: f32) -> Result<Self, RenderError> {
        if !(fps.is_finite() && fps > 0.0) {
            return Err(RenderError::InvalidFrameRate { fps });
        }
        let mut skeletons = scene.skeletons();
        let mut states = Vec::with_capacity(skeletons.len());
        let mut durations = Vec::with_capacity(skeletons.len());

        for (rig, skeleton) in scene.rigs().iter().zip(skeletons.iter_mut()) {
            let mut state = AnimationState::new(Arc::clone(&rig.data));
            let index = state.set_animation(animation, true)?.animation_index();
            durations.push(rig.data.animations[index].duration);
            state.update(0.0);
            state.apply(skeleton);
            skeleton.update_world_transform();
            states.push(state);
        }

        let duration = DurationPolicy::for_quirk(scene.settings().quirk).combine(durations);
        if duration <= 0.0 {
            return Err(RenderError::EmptyAnimation {
                animation: animation.to_string(),
            });
        }

        // One tracker per target; a later binding replaces an earlier one.
        let mut trackers: Vec<BoneTracker> = Vec::new();
        for binding in scene.followers() {
            let source = &skeletons[binding.source];
            let Some(bone) = source.bone_index(&binding.bone) else {
                log::debug!(
                    "bone '{}' not found in '{}', follower ignored",
                    binding.bone,
                    scene.rigs()[binding.source].entry.name
                );
                continue;
            };
            let world = &source.bones[bone];
            let tracker = BoneTracker {
                source: binding.source,
                bone,
                target: binding.target,
                last: Vec2::new(world.world_x, world.world_y),
            };
            match trackers.iter_mut().find(|t| t.target == binding.target) {
                Some(existing) => *existing = tracker,
                None => trackers.push(tracker),
            }
        }

        Ok(Self {
            scene,
            skeletons,
            states,
            trackers,
            duration,
            frame_time: 1.0 / fps,
            frame_count: (duration * fps).ceil() as usize,
            next: 0,
        })
    }

    pub fn duration(&self) -> f32 {
        self.duration
    }

    pub fn frame_time(&self) -> f32 {
        self.frame_time
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Index of the frame the next call to [`FrameScheduler::next_frame`] produces.
    pub fn frame_index(&self) -> usize {
        self.next
    }

    pub fn skeletons(&self) -> &[Skeleton] {
        &self.skeletons
    }

    /// Poses the next frame, or `None` once every frame has been produced.
    pub fn next_frame(&mut self) -> Option<&[Skeleton]> {
        if self.next >= self.frame_count {
            return None;
        }
        let delta = if self.next == 0 { 0.0 } else { self.frame_time };
        for (state, skeleton) in self.states.iter_mut().zip(self.skeletons.iter_mut()) {
            state.update(delta);
            state.apply(skeleton);
            skeleton.update_world_transform();
        }

        for tracker in &self.trackers {
            let offset = tracker.current(&self.skeletons) - tracker.last;
            let target = &mut self.skeletons[tracker.target];
            target.x += offset.x;
            target.y += offset.y;
            target.update_world_transform();
        }
        for tracker in &mut self.trackers {
            tracker.last = tracker.current(&self.skeletons);
        }

        self.next += 1;
        Some(&self.skeletons)
    }
}

impl Iterator for FrameScheduler<'_> {
    type Item = DrawList;

    fn next(&mut self) -> Option<DrawList> {
        let scene = self.scene;
        self.next_frame().map(|skeletons| scene.draw_list(skeletons))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.frame_count - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for FrameScheduler<'_> {}
