use crate::geometry::wrap_degrees;
use crate::{
    Animation, AttachmentTimeline, BoneTimeline, ColorFrame, ColorTimeline, Curve, DeformFrame,
    DeformTimeline, DrawOrderTimeline, Event, EventTimeline, FloatFrame, IkConstraintTimeline,
    IkFrame, PathConstraintTimeline, PathMixFrame, RotateFrame, RotateTimeline, Skeleton,
    TransformConstraintTimeline, TransformFrame, TwoColorFrame, TwoColorTimeline, Vec2Frame,
    Vec2Timeline,
};

/// How a timeline value combines with the current pose.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MixBlend {
    /// Setup pose plus the timeline value; before the first key, the setup pose.
    Setup,
    /// Like `Replace`, but before the first key the pose mixes back to setup.
    First,
    /// Mix from the current pose toward setup pose plus the timeline value.
    Replace,
    /// Add the timeline value to the current pose.
    Add,
}

trait Keyframe {
    fn time(&self) -> f32;
    fn curve(&self) -> &Curve;
}

macro_rules! keyframe {
    ($($ty:ty),* $(,)?) => {$(
        impl Keyframe for $ty {
            fn time(&self) -> f32 {
                self.time
            }
            fn curve(&self) -> &Curve {
                &self.curve
            }
        }
    )*};
}

keyframe!(
    RotateFrame,
    Vec2Frame,
    ColorFrame,
    TwoColorFrame,
    DeformFrame,
    IkFrame,
    TransformFrame,
    FloatFrame,
    PathMixFrame,
);

/// Where `time` falls within a keyed timeline.
enum Span {
    BeforeFirst,
    /// At or after the last key.
    Last(usize),
    /// Between `prev` and `prev + 1`, with the eased fraction between them.
    Between { prev: usize, percent: f32 },
}

fn locate<F: Keyframe>(frames: &[F], time: f32) -> Option<Span> {
    let first = frames.first()?;
    if time < first.time() {
        return Some(Span::BeforeFirst);
    }
    let last = frames.len() - 1;
    if time >= frames[last].time() {
        return Some(Span::Last(last));
    }
    let next = frames.partition_point(|f| f.time() <= time);
    let prev = next - 1;
    let (t0, t1) = (frames[prev].time(), frames[next].time());
    let percent = frames[prev].curve().percent((time - t0) / (t1 - t0));
    Some(Span::Between { prev, percent })
}

/// Index of the last key at or before `time`, for timelines that hold values.
fn held_index(times: impl ExactSizeIterator<Item = f32>, time: f32) -> Option<usize> {
    let count = times.len();
    let keys_at_or_before = times.take_while(|&t| t <= time).count();
    (count > 0 && keys_at_or_before > 0).then(|| keys_at_or_before - 1)
}

fn lerp(from: f32, to: f32, t: f32) -> f32 {
    from + (to - from) * t
}

fn lerp4(from: [f32; 4], to: [f32; 4], t: f32) -> [f32; 4] {
    std::array::from_fn(|i| lerp(from[i], to[i], t))
}

fn lerp3(from: [f32; 3], to: [f32; 3], t: f32) -> [f32; 3] {
    std::array::from_fn(|i| lerp(from[i], to[i], t))
}

/// Poses `skeleton` with `animation` at `time`. Events keyed in `(last_time, time]` are
/// appended to `events`; when looping, a wrap past the end also fires the tail of the
/// previous iteration. Pass `last_time = -1` to include keys at zero.
#[allow(clippy::too_many_arguments)]
pub fn apply_animation(
    animation: &Animation,
    skeleton: &mut Skeleton,
    last_time: f32,
    time: f32,
    looped: bool,
    events: &mut Vec<Event>,
    alpha: f32,
    blend: MixBlend,
) {
    let mut time = time;
    let mut last_time = last_time;
    if looped && animation.duration != 0.0 {
        time %= animation.duration;
        if last_time > 0.0 {
            last_time %= animation.duration;
        }
    }

    for timeline in &animation.bone_timelines {
        match timeline {
            BoneTimeline::Rotate(t) => apply_rotate(t, skeleton, time, alpha, blend),
            BoneTimeline::Translate(t) => apply_translate(t, skeleton, time, alpha, blend),
            BoneTimeline::Scale(t) => apply_scale(t, skeleton, time, alpha, blend),
            BoneTimeline::Shear(t) => apply_shear(t, skeleton, time, alpha, blend),
        }
    }
    for timeline in &animation.attachment_timelines {
        apply_attachment(timeline, skeleton, time, blend);
    }
    for timeline in &animation.color_timelines {
        apply_color(timeline, skeleton, time, alpha, blend);
    }
    for timeline in &animation.two_color_timelines {
        apply_two_color(timeline, skeleton, time, alpha, blend);
    }
    for timeline in &animation.deform_timelines {
        apply_deform(timeline, skeleton, time, alpha, blend);
    }
    if let Some(timeline) = &animation.event_timeline {
        collect_events(timeline, last_time, time, events);
    }
    if let Some(timeline) = &animation.draw_order_timeline {
        apply_draw_order(timeline, skeleton, time, blend);
    }
    for timeline in &animation.ik_timelines {
        apply_ik(timeline, skeleton, time, alpha, blend);
    }
    for timeline in &animation.transform_timelines {
        apply_transform(timeline, skeleton, time, alpha, blend);
    }
    for timeline in &animation.path_timelines {
        apply_path(timeline, skeleton, time, alpha, blend);
    }
}

pub(crate) fn apply_rotate(
    timeline: &RotateTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    blend: MixBlend,
) {
    let Some(bone) = skeleton.bones.get_mut(timeline.bone_index) else {
        return;
    };
    if !bone.active {
        return;
    }
    let setup = skeleton.data.bones[timeline.bone_index].rotation;
    let frames = &timeline.frames;

    let r = match locate(frames, time) {
        None => return,
        Some(Span::BeforeFirst) => {
            match blend {
                MixBlend::Setup => bone.rotation = setup,
                MixBlend::First => bone.rotation += (setup - bone.rotation) * alpha,
                _ => {}
            }
            return;
        }
        Some(Span::Last(last)) => {
            let r = frames[last].angle;
            match blend {
                MixBlend::Setup => bone.rotation = setup + r * alpha,
                MixBlend::Add => bone.rotation += r * alpha,
                _ => {
                    bone.rotation += wrap_degrees(r + setup - bone.rotation) * alpha;
                }
            }
            return;
        }
        Some(Span::Between { prev, percent }) => {
            let from = frames[prev].angle;
            let r = from + wrap_degrees(frames[prev + 1].angle - from) * percent;
            if blend == MixBlend::Setup {
                bone.rotation = setup + wrap_degrees(r) * alpha;
                return;
            }
            r
        }
    };

    let r = match blend {
        MixBlend::First | MixBlend::Replace => r + setup - bone.rotation,
        _ => r,
    };
    bone.rotation += wrap_degrees(r) * alpha;
}

/// Sampled `(x, y)` of a two-value bone timeline, or `None` before the first key.
fn sample_vec2(frames: &[Vec2Frame], time: f32) -> Option<Option<(f32, f32)>> {
    Some(match locate(frames, time)? {
        Span::BeforeFirst => None,
        Span::Last(last) => Some((frames[last].x, frames[last].y)),
        Span::Between { prev, percent } => {
            let (a, b) = (&frames[prev], &frames[prev + 1]);
            Some((lerp(a.x, b.x, percent), lerp(a.y, b.y, percent)))
        }
    })
}

pub(crate) fn apply_translate(
    timeline: &Vec2Timeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    blend: MixBlend,
) {
    let Some(bone) = skeleton.bones.get_mut(timeline.bone_index) else {
        return;
    };
    if !bone.active {
        return;
    }
    let data = &skeleton.data.bones[timeline.bone_index];
    let Some(sample) = sample_vec2(&timeline.frames, time) else {
        return;
    };
    let Some((x, y)) = sample else {
        match blend {
            MixBlend::Setup => {
                bone.x = data.x;
                bone.y = data.y;
            }
            MixBlend::First => {
                bone.x += (data.x - bone.x) * alpha;
                bone.y += (data.y - bone.y) * alpha;
            }
            _ => {}
        }
        return;
    };
    match blend {
        MixBlend::Setup => {
            bone.x = data.x + x * alpha;
            bone.y = data.y + y * alpha;
        }
        MixBlend::First | MixBlend::Replace => {
            bone.x += (data.x + x - bone.x) * alpha;
            bone.y += (data.y + y - bone.y) * alpha;
        }
        MixBlend::Add => {
            bone.x += x * alpha;
            bone.y += y * alpha;
        }
    }
}

fn sign(value: f32) -> f32 {
    if value > 0.0 {
        1.0
    } else if value < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Scale keys are multipliers of the setup scale. Mixing keeps the sign of the key so a
/// flip happens at once instead of collapsing through zero.
pub(crate) fn apply_scale(
    timeline: &Vec2Timeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    blend: MixBlend,
) {
    let Some(bone) = skeleton.bones.get_mut(timeline.bone_index) else {
        return;
    };
    if !bone.active {
        return;
    }
    let data = &skeleton.data.bones[timeline.bone_index];
    let Some(sample) = sample_vec2(&timeline.frames, time) else {
        return;
    };
    let Some((x, y)) = sample else {
        match blend {
            MixBlend::Setup => {
                bone.scale_x = data.scale_x;
                bone.scale_y = data.scale_y;
            }
            MixBlend::First => {
                bone.scale_x += (data.scale_x - bone.scale_x) * alpha;
                bone.scale_y += (data.scale_y - bone.scale_y) * alpha;
            }
            _ => {}
        }
        return;
    };
    let x = x * data.scale_x;
    let y = y * data.scale_y;

    if alpha == 1.0 {
        if blend == MixBlend::Add {
            bone.scale_x += x - data.scale_x;
            bone.scale_y += y - data.scale_y;
        } else {
            bone.scale_x = x;
            bone.scale_y = y;
        }
        return;
    }

    match blend {
        MixBlend::Setup => {
            let bx = data.scale_x.abs() * sign(x);
            let by = data.scale_y.abs() * sign(y);
            bone.scale_x = bx + (x - bx) * alpha;
            bone.scale_y = by + (y - by) * alpha;
        }
        MixBlend::First | MixBlend::Replace => {
            let bx = bone.scale_x.abs() * sign(x);
            let by = bone.scale_y.abs() * sign(y);
            bone.scale_x = bx + (x - bx) * alpha;
            bone.scale_y = by + (y - by) * alpha;
        }
        MixBlend::Add => {
            let bx = sign(x);
            let by = sign(y);
            bone.scale_x = bone.scale_x.abs() * bx + (x - data.scale_x.abs() * bx) * alpha;
            bone.scale_y = bone.scale_y.abs() * by + (y - data.scale_y.abs() * by) * alpha;
        }
    }
}

pub(crate) fn apply_shear(
    timeline: &Vec2Timeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    blend: MixBlend,
) {
    let Some(bone) = skeleton.bones.get_mut(timeline.bone_index) else {
        return;
    };
    if !bone.active {
        return;
    }
    let data = &skeleton.data.bones[timeline.bone_index];
    let Some(sample) = sample_vec2(&timeline.frames, time) else {
        return;
    };
    let Some((x, y)) = sample else {
        match blend {
            MixBlend::Setup => {
                bone.shear_x = data.shear_x;
                bone.shear_y = data.shear_y;
            }
            MixBlend::First => {
                bone.shear_x += (data.shear_x - bone.shear_x) * alpha;
                bone.shear_y += (data.shear_y - bone.shear_y) * alpha;
            }
            _ => {}
        }
        return;
    };
    match blend {
        MixBlend::Setup => {
            bone.shear_x = data.shear_x + x * alpha;
            bone.shear_y = data.shear_y + y * alpha;
        }
        MixBlend::First | MixBlend::Replace => {
            bone.shear_x += (data.shear_x + x - bone.shear_x) * alpha;
            bone.shear_y += (data.shear_y + y - bone.shear_y) * alpha;
        }
        MixBlend::Add => {
            bone.shear_x += x * alpha;
            bone.shear_y += y * alpha;
        }
    }
}

fn slot_is_active(skeleton: &Skeleton, slot_index: usize) -> bool {
    skeleton
        .slots
        .get(slot_index)
        .is_some_and(|slot| skeleton.bones[slot.bone].active)
}

pub(crate) fn apply_attachment(
    timeline: &AttachmentTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    blend: MixBlend,
) {
    if !slot_is_active(skeleton, timeline.slot_index) {
        return;
    }
    let name = match held_index(timeline.frames.iter().map(|f| f.time), time) {
        Some(index) => timeline.frames[index].name.clone(),
        None => {
            if matches!(blend, MixBlend::Setup | MixBlend::First) {
                skeleton.data.slots[timeline.slot_index].attachment.clone()
            } else {
                return;
            }
        }
    };
    skeleton.slots[timeline.slot_index].set_attachment(name.as_deref());
}

pub(crate) fn apply_color(
    timeline: &ColorTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    blend: MixBlend,
) {
    if !slot_is_active(skeleton, timeline.slot_index) {
        return;
    }
    let setup = skeleton.data.slots[timeline.slot_index].color;
    let slot = &mut skeleton.slots[timeline.slot_index];
    let frames = &timeline.frames;
    let color = match locate(frames, time) {
        None => return,
        Some(Span::BeforeFirst) => {
            match blend {
                MixBlend::Setup => slot.color = setup,
                MixBlend::First => slot.color = lerp4(slot.color, setup, alpha),
                _ => {}
            }
            return;
        }
        Some(Span::Last(last)) => frames[last].color,
        Some(Span::Between { prev, percent }) => {
            lerp4(frames[prev].color, frames[prev + 1].color, percent)
        }
    };
    if alpha == 1.0 {
        slot.color = color;
    } else {
        if blend == MixBlend::Setup {
            slot.color = setup;
        }
        slot.color = lerp4(slot.color, color, alpha);
    }
}

pub(crate) fn apply_two_color(
    timeline: &TwoColorTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    blend: MixBlend,
) {
    if !slot_is_active(skeleton, timeline.slot_index) {
        return;
    }
    let slot_data = &skeleton.data.slots[timeline.slot_index];
    let setup_light = slot_data.color;
    let setup_dark = slot_data.dark_color.unwrap_or([0.0; 3]);
    let slot = &mut skeleton.slots[timeline.slot_index];
    let dark = slot.dark_color.get_or_insert(setup_dark);
    let frames = &timeline.frames;

    let (light_to, dark_to) = match locate(frames, time) {
        None => return,
        Some(Span::BeforeFirst) => {
            match blend {
                MixBlend::Setup => {
                    slot.color = setup_light;
                    *dark = setup_dark;
                }
                MixBlend::First => {
                    slot.color = lerp4(slot.color, setup_light, alpha);
                    *dark = lerp3(*dark, setup_dark, alpha);
                }
                _ => {}
            }
            return;
        }
        Some(Span::Last(last)) => (frames[last].light, frames[last].dark),
        Some(Span::Between { prev, percent }) => {
            let (a, b) = (&frames[prev], &frames[prev + 1]);
            (
                lerp4(a.light, b.light, percent),
                lerp3(a.dark, b.dark, percent),
            )
        }
    };
    if alpha == 1.0 {
        slot.color = light_to;
        *dark = dark_to;
    } else {
        if blend == MixBlend::Setup {
            slot.color = setup_light;
            *dark = setup_dark;
        }
        slot.color = lerp4(slot.color, light_to, alpha);
        *dark = lerp3(*dark, dark_to, alpha);
    }
}

/// Deform keys hold absolute positions for unweighted meshes and offsets for weighted ones.
pub(crate) fn apply_deform(
    timeline: &DeformTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    blend: MixBlend,
) {
    if !slot_is_active(skeleton, timeline.slot_index) {
        return;
    }
    let weighted = match skeleton.slot_attachment(timeline.slot_index) {
        Some(attachment) if attachment.deform_id() == Some(timeline.attachment) => attachment
            .vertices()
            .map(|v| v.is_weighted())
            .unwrap_or(false),
        _ => return,
    };
    let frames = &timeline.frames;
    let Some(span) = locate(frames, time) else {
        return;
    };
    let setup = timeline.setup_vertices.as_slice();
    let vertex_count = setup.len();
    let deform = &mut skeleton.slots[timeline.slot_index].deform;
    let blend = if deform.is_empty() {
        MixBlend::Setup
    } else {
        blend
    };

    let target: Vec<f32> = match span {
        Span::BeforeFirst => {
            match blend {
                MixBlend::Setup => deform.clear(),
                MixBlend::First => {
                    if alpha == 1.0 {
                        deform.clear();
                        return;
                    }
                    deform.resize(vertex_count, 0.0);
                    if weighted {
                        let keep = 1.0 - alpha;
                        deform.iter_mut().for_each(|v| *v *= keep);
                    } else {
                        for (v, s) in deform.iter_mut().zip(setup) {
                            *v += (s - *v) * alpha;
                        }
                    }
                }
                _ => {}
            }
            return;
        }
        Span::Last(last) => timeline.frame_vertices(&frames[last]).to_vec(),
        Span::Between { prev, percent } => {
            let from = timeline.frame_vertices(&frames[prev]);
            let to = timeline.frame_vertices(&frames[prev + 1]);
            from.iter()
                .zip(to)
                .map(|(&a, &b)| lerp(a, b, percent))
                .collect()
        }
    };

    deform.resize(vertex_count, 0.0);
    if alpha == 1.0 {
        if blend == MixBlend::Add {
            for ((v, t), s) in deform.iter_mut().zip(&target).zip(setup) {
                *v += if weighted { *t } else { t - s };
            }
        } else {
            deform.clear();
            deform.extend_from_slice(&target);
            deform.resize(vertex_count, 0.0);
        }
        return;
    }
    match blend {
        MixBlend::Setup => {
            for ((v, t), s) in deform.iter_mut().zip(&target).zip(setup) {
                *v = if weighted { t * alpha } else { s + (t - s) * alpha };
            }
        }
        MixBlend::First | MixBlend::Replace => {
            for (v, t) in deform.iter_mut().zip(&target) {
                *v += (t - *v) * alpha;
            }
        }
        MixBlend::Add => {
            for ((v, t), s) in deform.iter_mut().zip(&target).zip(setup) {
                *v += if weighted { t * alpha } else { (t - s) * alpha };
            }
        }
    }
}

pub(crate) fn apply_draw_order(
    timeline: &DrawOrderTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    blend: MixBlend,
) {
    let slot_count = skeleton.slots.len();
    let order = match held_index(timeline.frames.iter().map(|f| f.time), time) {
        Some(index) => timeline.frames[index].draw_order.as_ref(),
        None if matches!(blend, MixBlend::Setup | MixBlend::First) => None,
        None => return,
    };
    match order {
        Some(order) if order.len() == slot_count => skeleton.draw_order.clone_from(order),
        Some(_) => {}
        None => {
            skeleton.draw_order.clear();
            skeleton.draw_order.extend(0..slot_count);
        }
    }
}

/// Appends events keyed in `(last_time, time]`. A `last_time` past `time` means the
/// animation looped: the tail of the previous pass fires first.
pub(crate) fn collect_events(
    timeline: &EventTimeline,
    last_time: f32,
    time: f32,
    fired: &mut Vec<Event>,
) {
    let keys = &timeline.events;
    let Some(last_key) = keys.last() else {
        return;
    };
    let mut last_time = last_time;
    if last_time > time {
        collect_events(timeline, last_time, f32::MAX, fired);
        last_time = -1.0;
    } else if last_time >= last_key.time {
        return;
    }
    if time < keys[0].time {
        return;
    }
    let start = if last_time < keys[0].time {
        0
    } else {
        keys.partition_point(|e| e.time <= last_time)
    };
    fired.extend(
        keys[start..]
            .iter()
            .take_while(|e| time >= e.time)
            .cloned(),
    );
}

pub(crate) fn apply_ik(
    timeline: &IkConstraintTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    blend: MixBlend,
) {
    let Some(constraint) = skeleton.ik_constraints.get_mut(timeline.constraint_index) else {
        return;
    };
    if !constraint.active {
        return;
    }
    let data = &skeleton.data.ik_constraints[timeline.constraint_index];
    let frames = &timeline.frames;

    let (mix, softness, held) = match locate(frames, time) {
        None => return,
        Some(Span::BeforeFirst) => {
            match blend {
                MixBlend::Setup => {
                    constraint.mix = data.mix;
                    constraint.softness = data.softness;
                }
                MixBlend::First => {
                    constraint.mix += (data.mix - constraint.mix) * alpha;
                    constraint.softness += (data.softness - constraint.softness) * alpha;
                }
                _ => return,
            }
            constraint.bend_direction = data.bend_direction;
            constraint.compress = data.compress;
            constraint.stretch = data.stretch;
            return;
        }
        Some(Span::Last(last)) => (frames[last].mix, frames[last].softness, &frames[last]),
        Some(Span::Between { prev, percent }) => {
            let (a, b) = (&frames[prev], &frames[prev + 1]);
            (
                lerp(a.mix, b.mix, percent),
                lerp(a.softness, b.softness, percent),
                a,
            )
        }
    };

    if blend == MixBlend::Setup {
        constraint.mix = lerp(data.mix, mix, alpha);
        constraint.softness = lerp(data.softness, softness, alpha);
    } else {
        constraint.mix += (mix - constraint.mix) * alpha;
        constraint.softness += (softness - constraint.softness) * alpha;
    }
    constraint.bend_direction = held.bend_direction;
    constraint.compress = held.compress;
    constraint.stretch = held.stretch;
}

pub(crate) fn apply_transform(
    timeline: &TransformConstraintTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    blend: MixBlend,
) {
    let Some(constraint) = skeleton
        .transform_constraints
        .get_mut(timeline.constraint_index)
    else {
        return;
    };
    if !constraint.active {
        return;
    }
    let data = &skeleton.data.transform_constraints[timeline.constraint_index];
    let setup = [
        data.rotate_mix,
        data.translate_mix,
        data.scale_mix,
        data.shear_mix,
    ];
    let current = [
        constraint.rotate_mix,
        constraint.translate_mix,
        constraint.scale_mix,
        constraint.shear_mix,
    ];
    let mixes = |f: &TransformFrame| [f.rotate_mix, f.translate_mix, f.scale_mix, f.shear_mix];
    let frames = &timeline.frames;

    let next = match locate(frames, time) {
        None => return,
        Some(Span::BeforeFirst) => match blend {
            MixBlend::Setup => setup,
            MixBlend::First => lerp4(current, setup, alpha),
            _ => return,
        },
        Some(Span::Last(last)) => {
            let target = mixes(&frames[last]);
            mix_toward(blend, setup, current, target, alpha)
        }
        Some(Span::Between { prev, percent }) => {
            let target = lerp4(mixes(&frames[prev]), mixes(&frames[prev + 1]), percent);
            mix_toward(blend, setup, current, target, alpha)
        }
    };
    [
        constraint.rotate_mix,
        constraint.translate_mix,
        constraint.scale_mix,
        constraint.shear_mix,
    ] = next;
}

fn mix_toward(
    blend: MixBlend,
    setup: [f32; 4],
    current: [f32; 4],
    target: [f32; 4],
    alpha: f32,
) -> [f32; 4] {
    if blend == MixBlend::Setup {
        lerp4(setup, target, alpha)
    } else {
        lerp4(current, target, alpha)
    }
}

pub(crate) fn apply_path(
    timeline: &PathConstraintTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    blend: MixBlend,
) {
    let (index, frames) = match timeline {
        PathConstraintTimeline::Position {
            constraint_index,
            frames,
        }
        | PathConstraintTimeline::Spacing {
            constraint_index,
            frames,
        } => (*constraint_index, Some(frames)),
        PathConstraintTimeline::Mix {
            constraint_index, ..
        } => (*constraint_index, None),
    };
    let Some(constraint) = skeleton.path_constraints.get_mut(index) else {
        return;
    };
    if !constraint.active {
        return;
    }
    let data = &skeleton.data.path_constraints[index];

    if let Some(frames) = frames {
        let (setup, value) = match timeline {
            PathConstraintTimeline::Spacing { .. } => (data.spacing, &mut constraint.spacing),
            _ => (data.position, &mut constraint.position),
        };
        let target = match locate(frames, time) {
            None => return,
            Some(Span::BeforeFirst) => {
                match blend {
                    MixBlend::Setup => *value = setup,
                    MixBlend::First => *value += (setup - *value) * alpha,
                    _ => {}
                }
                return;
            }
            Some(Span::Last(last)) => frames[last].value,
            Some(Span::Between { prev, percent }) => {
                lerp(frames[prev].value, frames[prev + 1].value, percent)
            }
        };
        *value = if blend == MixBlend::Setup {
            lerp(setup, target, alpha)
        } else {
            lerp(*value, target, alpha)
        };
        return;
    }

    let PathConstraintTimeline::Mix { frames, .. } = timeline else {
        return;
    };
    let setup = (data.rotate_mix, data.translate_mix);
    let (rotate, translate) = match locate(frames, time) {
        None => return,
        Some(Span::BeforeFirst) => {
            match blend {
                MixBlend::Setup => {
                    constraint.rotate_mix = setup.0;
                    constraint.translate_mix = setup.1;
                }
                MixBlend::First => {
                    constraint.rotate_mix += (setup.0 - constraint.rotate_mix) * alpha;
                    constraint.translate_mix += (setup.1 - constraint.translate_mix) * alpha;
                }
                _ => {}
            }
            return;
        }
        Some(Span::Last(last)) => (frames[last].rotate_mix, frames[last].translate_mix),
        Some(Span::Between { prev, percent }) => {
            let (a, b) = (&frames[prev], &frames[prev + 1]);
            (
                lerp(a.rotate_mix, b.rotate_mix, percent),
                lerp(a.translate_mix, b.translate_mix, percent),
            )
        }
    };
    if blend == MixBlend::Setup {
        constraint.rotate_mix = lerp(setup.0, rotate, alpha);
        constraint.translate_mix = lerp(setup.1, translate, alpha);
    } else {
        constraint.rotate_mix += (rotate - constraint.rotate_mix) * alpha;
        constraint.translate_mix += (translate - constraint.translate_mix) * alpha;
    }
}
