use crate::{Error, Event, MixBlend, Skeleton, SkeletonData, apply_animation};
use std::sync::Arc;

/// Playback of the animation on the single track.
#[derive(Clone, Debug)]
pub struct TrackEntry {
    animation_index: usize,
    pub looped: bool,
    pub time_scale: f32,
    pub alpha: f32,
    pub animation_start: f32,
    pub animation_end: f32,
    track_time: f32,
    animation_last: f32,
    next_animation_last: f32,
}

impl TrackEntry {
    pub fn animation_index(&self) -> usize {
        self.animation_index
    }

    pub fn track_time(&self) -> f32 {
        self.track_time
    }

    /// Track time mapped into the animation: wrapped when looping, clamped otherwise.
    pub fn animation_time(&self) -> f32 {
        if self.looped {
            let duration = self.animation_end - self.animation_start;
            if duration == 0.0 {
                return self.animation_start;
            }
            return self.track_time % duration + self.animation_start;
        }
        (self.track_time + self.animation_start).min(self.animation_end)
    }

    /// True once at least one full pass of the animation has played.
    pub fn is_complete(&self) -> bool {
        self.track_time >= self.animation_end - self.animation_start
    }
}

/// Drives one skeleton from a single animation track.
///
/// Events are returned from [`AnimationState::apply`] instead of going through listeners;
/// there is no crossfading, so the track is always applied at full strength over the
/// current pose.
#[derive(Clone, Debug)]
pub struct AnimationState {
    data: Arc<SkeletonData>,
    track: Option<TrackEntry>,
    pub time_scale: f32,
}

impl AnimationState {
    pub fn new(data: Arc<SkeletonData>) -> Self {
        Self {
            data,
            track: None,
            time_scale: 1.0,
        }
    }

    pub fn set_animation(&mut self, name: &str, looped: bool) -> Result<&mut TrackEntry, Error> {
        let (animation_index, animation) =
            self.data
                .animation(name)
                .ok_or_else(|| Error::UnknownAnimation {
                    name: name.to_string(),
                })?;
        let entry = TrackEntry {
            animation_index,
            looped,
            time_scale: 1.0,
            alpha: 1.0,
            animation_start: 0.0,
            animation_end: animation.duration,
            track_time: 0.0,
            animation_last: -1.0,
            next_animation_last: -1.0,
        };
        Ok(self.track.insert(entry))
    }

    pub fn clear_track(&mut self) {
        self.track = None;
    }

    pub fn current(&self) -> Option<&TrackEntry> {
        self.track.as_ref()
    }

    /// Advances the track by `delta` seconds.
    pub fn update(&mut self, delta: f32) {
        let delta = delta * self.time_scale;
        let Some(entry) = self.track.as_mut() else {
            return;
        };
        entry.animation_last = entry.next_animation_last;
        entry.track_time += delta * entry.time_scale;
    }

    /// Poses `skeleton` at the current track time and returns the events crossed since the
    /// previous apply. World transforms are left for the caller to update.
    pub fn apply(&mut self, skeleton: &mut Skeleton) -> Vec<Event> {
        let mut events = Vec::new();
        let Some(entry) = self.track.as_mut() else {
            return events;
        };
        let animation = &self.data.animations[entry.animation_index];
        let animation_time = entry.animation_time();
        apply_animation(
            animation,
            skeleton,
            entry.animation_last,
            animation_time,
            entry.looped,
            &mut events,
            entry.alpha,
            MixBlend::First,
        );
        events.retain(|e| e.time <= entry.animation_end);

        entry.next_animation_last = animation_time;
        events
    }

    pub fn track_time(&self) -> f32 {
        self.track.as_ref().map(TrackEntry::track_time).unwrap_or(0.0)
    }

    pub fn animation_time(&self) -> f32 {
        self.track
            .as_ref()
            .map(TrackEntry::animation_time)
            .unwrap_or(0.0)
    }

    pub fn is_complete(&self) -> bool {
        self.track.as_ref().is_some_and(TrackEntry::is_complete)
    }
}
