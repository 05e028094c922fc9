use crate::ids::next_attachment_id;
use crate::loader::{PendingLinkedMesh, expand_deform, expand_draw_order, resolve_linked_meshes};
use crate::{
    Animation, AttachmentData, AttachmentFrame, AttachmentTimeline, BlendMode, BoneData,
    BoneTimeline, BoundingBoxAttachmentData, ClippingAttachmentData, ColorFrame, ColorTimeline,
    Curve, DeformFrame, DeformTimeline, DrawOrderFrame, DrawOrderTimeline, Error, Event,
    EventData, EventTimeline, FloatFrame, IkConstraintData, IkConstraintTimeline, IkFrame,
    MeshAttachmentData, MeshVertices, PathAttachmentData, PathConstraintData,
    PathConstraintTimeline, PathMixFrame, PointAttachmentData, PositionMode,
    RegionAttachmentData, RotateFrame, RotateMode, RotateTimeline, SkeletonData, SkinData,
    SlotData, SpacingMode, TransformConstraintData, TransformConstraintTimeline, TransformFrame,
    TransformMode, TwoColorFrame, TwoColorTimeline, Vec2Frame, Vec2Timeline, VertexWeight,
    check_spine_version,
};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct Root {
    skeleton: Option<SkeletonHeader>,
    #[serde(default)]
    bones: Vec<BoneDef>,
    #[serde(default)]
    slots: Vec<SlotDef>,
    #[serde(default)]
    ik: Vec<IkConstraintDef>,
    #[serde(default)]
    transform: Vec<TransformConstraintDef>,
    #[serde(default)]
    path: Vec<PathConstraintDef>,
    skins: Option<SkinsDef>,
    #[serde(default)]
    events: BTreeMap<String, EventDef>,
    #[serde(default)]
    animations: BTreeMap<String, AnimationDef>,
}

#[derive(Debug, Deserialize)]
struct SkeletonHeader {
    #[serde(default)]
    hash: String,
    spine: Option<String>,
    #[serde(default)]
    x: f32,
    #[serde(default)]
    y: f32,
    #[serde(default)]
    width: f32,
    #[serde(default)]
    height: f32,
    #[serde(default = "default_fps")]
    fps: f32,
    #[serde(default, rename = "images")]
    images_path: String,
    #[serde(default, rename = "audio")]
    audio_path: String,
}

#[derive(Debug, Deserialize)]
struct BoneDef {
    name: String,
    #[serde(default)]
    parent: Option<String>,
    #[serde(default)]
    length: f32,
    #[serde(default)]
    x: f32,
    #[serde(default)]
    y: f32,
    #[serde(default)]
    rotation: f32,
    #[serde(default = "default_one", rename = "scaleX")]
    scale_x: f32,
    #[serde(default = "default_one", rename = "scaleY")]
    scale_y: f32,
    #[serde(default, rename = "shearX")]
    shear_x: f32,
    #[serde(default, rename = "shearY")]
    shear_y: f32,
    #[serde(default)]
    transform: Option<String>,
    #[serde(default, rename = "skin")]
    skin_required: bool,
    #[serde(default)]
    color: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SlotDef {
    name: String,
    bone: String,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    dark: Option<String>,
    #[serde(default)]
    attachment: Option<String>,
    #[serde(default)]
    blend: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IkConstraintDef {
    name: String,
    #[serde(default)]
    order: i32,
    #[serde(default, rename = "skin")]
    skin_required: bool,
    #[serde(default)]
    bones: Vec<String>,
    target: String,
    #[serde(default = "default_one")]
    mix: f32,
    #[serde(default)]
    softness: f32,
    #[serde(default = "default_true", rename = "bendPositive")]
    bend_positive: bool,
    #[serde(default)]
    compress: bool,
    #[serde(default)]
    stretch: bool,
    #[serde(default)]
    uniform: bool,
}

#[derive(Debug, Deserialize)]
struct TransformConstraintDef {
    name: String,
    #[serde(default)]
    order: i32,
    #[serde(default, rename = "skin")]
    skin_required: bool,
    #[serde(default)]
    bones: Vec<String>,
    target: String,
    #[serde(default)]
    local: bool,
    #[serde(default)]
    relative: bool,
    #[serde(default)]
    rotation: f32,
    #[serde(default)]
    x: f32,
    #[serde(default)]
    y: f32,
    #[serde(default, rename = "scaleX")]
    scale_x: f32,
    #[serde(default, rename = "scaleY")]
    scale_y: f32,
    #[serde(default, rename = "shearY")]
    shear_y: f32,
    #[serde(default = "default_one", rename = "rotateMix")]
    rotate_mix: f32,
    #[serde(default = "default_one", rename = "translateMix")]
    translate_mix: f32,
    #[serde(default = "default_one", rename = "scaleMix")]
    scale_mix: f32,
    #[serde(default = "default_one", rename = "shearMix")]
    shear_mix: f32,
}

#[derive(Debug, Deserialize)]
struct PathConstraintDef {
    name: String,
    #[serde(default)]
    order: i32,
    #[serde(default, rename = "skin")]
    skin_required: bool,
    #[serde(default)]
    bones: Vec<String>,
    target: String,
    #[serde(default, rename = "positionMode")]
    position_mode: Option<String>,
    #[serde(default, rename = "spacingMode")]
    spacing_mode: Option<String>,
    #[serde(default, rename = "rotateMode")]
    rotate_mode: Option<String>,
    #[serde(default)]
    rotation: f32,
    #[serde(default)]
    position: f32,
    #[serde(default)]
    spacing: f32,
    #[serde(default = "default_one", rename = "rotateMix")]
    rotate_mix: f32,
    #[serde(default = "default_one", rename = "translateMix")]
    translate_mix: f32,
}

type SlotAttachmentsDef = BTreeMap<String, BTreeMap<String, AttachmentDef>>;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SkinsDef {
    Array(Vec<SkinDef>),
    Map(BTreeMap<String, SlotAttachmentsDef>),
}

#[derive(Debug, Deserialize)]
struct SkinDef {
    name: String,
    #[serde(default)]
    attachments: SlotAttachmentsDef,
    #[serde(default)]
    bones: Vec<String>,
    #[serde(default)]
    ik: Vec<String>,
    #[serde(default)]
    transform: Vec<String>,
    #[serde(default)]
    path: Vec<String>,
}

/// Every attachment type's fields in one bag; `type` decides which are read.
#[derive(Debug, Deserialize)]
struct AttachmentDef {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    x: f32,
    #[serde(default)]
    y: f32,
    #[serde(default)]
    rotation: f32,
    #[serde(default = "default_one", rename = "scaleX")]
    scale_x: f32,
    #[serde(default = "default_one", rename = "scaleY")]
    scale_y: f32,
    #[serde(default)]
    width: Option<f32>,
    #[serde(default)]
    height: Option<f32>,
    #[serde(default)]
    uvs: Vec<f32>,
    #[serde(default)]
    vertices: Vec<f32>,
    #[serde(default, rename = "vertexCount")]
    vertex_count: usize,
    #[serde(default)]
    triangles: Vec<u16>,
    #[serde(default)]
    hull: usize,
    #[serde(default)]
    edges: Vec<u16>,
    #[serde(default)]
    parent: Option<String>,
    #[serde(default)]
    skin: Option<String>,
    #[serde(default = "default_true")]
    deform: bool,
    #[serde(default)]
    closed: bool,
    #[serde(default = "default_true", rename = "constantSpeed")]
    constant_speed: bool,
    #[serde(default)]
    lengths: Vec<f32>,
    #[serde(default)]
    end: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventDef {
    #[serde(default, rename = "int")]
    int_value: i32,
    #[serde(default, rename = "float")]
    float_value: f32,
    #[serde(default, rename = "string")]
    string_value: String,
    #[serde(default, rename = "audio")]
    audio_path: String,
    #[serde(default = "default_one")]
    volume: f32,
    #[serde(default)]
    balance: f32,
}

#[derive(Debug, Deserialize, Default)]
struct AnimationDef {
    #[serde(default)]
    slots: BTreeMap<String, SlotAnimDef>,
    #[serde(default)]
    bones: BTreeMap<String, BoneAnimDef>,
    #[serde(default)]
    ik: BTreeMap<String, Vec<IkKey>>,
    #[serde(default)]
    transform: BTreeMap<String, Vec<TransformKey>>,
    #[serde(default)]
    path: BTreeMap<String, PathAnimDef>,
    #[serde(default)]
    deform: BTreeMap<String, BTreeMap<String, BTreeMap<String, Vec<DeformKey>>>>,
    #[serde(default, rename = "drawOrder", alias = "draworder")]
    draw_order: Option<Vec<DrawOrderKey>>,
    #[serde(default)]
    events: Vec<EventKey>,
}

#[derive(Debug, Deserialize, Default)]
struct CurveDef {
    #[serde(default)]
    curve: Option<serde_json::Value>,
    #[serde(default)]
    c2: Option<f32>,
    #[serde(default)]
    c3: Option<f32>,
    #[serde(default)]
    c4: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct SlotAnimDef {
    #[serde(default)]
    attachment: Vec<AttachmentKey>,
    #[serde(default)]
    color: Vec<ColorKey>,
    #[serde(default, rename = "twoColor")]
    two_color: Vec<TwoColorKey>,
}

#[derive(Debug, Deserialize)]
struct AttachmentKey {
    #[serde(default)]
    time: f32,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ColorKey {
    #[serde(default)]
    time: f32,
    color: String,
    #[serde(flatten)]
    curve: CurveDef,
}

#[derive(Debug, Deserialize)]
struct TwoColorKey {
    #[serde(default)]
    time: f32,
    light: String,
    dark: String,
    #[serde(flatten)]
    curve: CurveDef,
}

#[derive(Debug, Deserialize, Default)]
struct BoneAnimDef {
    #[serde(default)]
    rotate: Vec<RotateKey>,
    #[serde(default)]
    translate: Vec<Vec2Key>,
    #[serde(default)]
    scale: Vec<Vec2Key>,
    #[serde(default)]
    shear: Vec<Vec2Key>,
}

#[derive(Debug, Deserialize)]
struct RotateKey {
    #[serde(default)]
    time: f32,
    #[serde(default)]
    angle: f32,
    #[serde(flatten)]
    curve: CurveDef,
}

#[derive(Debug, Deserialize)]
struct Vec2Key {
    #[serde(default)]
    time: f32,
    #[serde(default)]
    x: Option<f32>,
    #[serde(default)]
    y: Option<f32>,
    #[serde(flatten)]
    curve: CurveDef,
}

#[derive(Debug, Deserialize)]
struct IkKey {
    #[serde(default)]
    time: f32,
    #[serde(default = "default_one")]
    mix: f32,
    #[serde(default)]
    softness: f32,
    #[serde(default = "default_true", rename = "bendPositive")]
    bend_positive: bool,
    #[serde(default)]
    compress: bool,
    #[serde(default)]
    stretch: bool,
    #[serde(flatten)]
    curve: CurveDef,
}

#[derive(Debug, Deserialize)]
struct TransformKey {
    #[serde(default)]
    time: f32,
    #[serde(default = "default_one", rename = "rotateMix")]
    rotate_mix: f32,
    #[serde(default = "default_one", rename = "translateMix")]
    translate_mix: f32,
    #[serde(default = "default_one", rename = "scaleMix")]
    scale_mix: f32,
    #[serde(default = "default_one", rename = "shearMix")]
    shear_mix: f32,
    #[serde(flatten)]
    curve: CurveDef,
}

#[derive(Debug, Deserialize, Default)]
struct PathAnimDef {
    #[serde(default)]
    position: Vec<PathValueKey>,
    #[serde(default)]
    spacing: Vec<PathValueKey>,
    #[serde(default)]
    mix: Vec<PathMixKey>,
}

/// Position and spacing keys name their value after the timeline.
#[derive(Debug, Deserialize)]
struct PathValueKey {
    #[serde(default)]
    time: f32,
    #[serde(default)]
    position: f32,
    #[serde(default)]
    spacing: f32,
    #[serde(flatten)]
    curve: CurveDef,
}

#[derive(Debug, Deserialize)]
struct PathMixKey {
    #[serde(default)]
    time: f32,
    #[serde(default = "default_one", rename = "rotateMix")]
    rotate_mix: f32,
    #[serde(default = "default_one", rename = "translateMix")]
    translate_mix: f32,
    #[serde(flatten)]
    curve: CurveDef,
}

#[derive(Debug, Deserialize)]
struct DeformKey {
    #[serde(default)]
    time: f32,
    #[serde(default)]
    offset: usize,
    #[serde(default)]
    vertices: Option<Vec<f32>>,
    #[serde(flatten)]
    curve: CurveDef,
}

#[derive(Debug, Deserialize)]
struct DrawOrderKey {
    #[serde(default)]
    time: f32,
    #[serde(default)]
    offsets: Option<Vec<DrawOrderOffset>>,
}

#[derive(Debug, Deserialize)]
struct DrawOrderOffset {
    slot: String,
    offset: i32,
}

#[derive(Debug, Deserialize)]
struct EventKey {
    #[serde(default)]
    time: f32,
    name: String,
    #[serde(default, rename = "int")]
    int_value: Option<i32>,
    #[serde(default, rename = "float")]
    float_value: Option<f32>,
    #[serde(default, rename = "string")]
    string_value: Option<String>,
    #[serde(default)]
    volume: Option<f32>,
    #[serde(default)]
    balance: Option<f32>,
}

impl SkeletonData {
    pub fn from_json_str(input: &str) -> Result<Arc<Self>, Error> {
        Self::from_json_str_with_scale(input, 1.0)
    }

    /// Loads a Spine 3.8 JSON export, multiplying every positional value by `scale`.
    pub fn from_json_str_with_scale(input: &str, scale: f32) -> Result<Arc<Self>, Error> {
        let root: Root = serde_json::from_str(input).map_err(|e| Error::JsonParse {
            message: e.to_string(),
        })?;
        let scale = if scale.is_finite() { scale } else { 1.0 };

        let mut data = SkeletonData {
            fps: default_fps(),
            ..SkeletonData::default()
        };
        if let Some(header) = root.skeleton {
            if let Some(version) = header.spine.as_deref() {
                check_spine_version(version)?;
                data.version = version.to_string();
            }
            data.hash = header.hash;
            data.x = header.x;
            data.y = header.y;
            data.width = header.width;
            data.height = header.height;
            data.fps = header.fps;
            data.images_path = header.images_path;
            data.audio_path = header.audio_path;
        }

        read_bones(&mut data, root.bones, scale)?;
        read_slots(&mut data, root.slots)?;
        read_ik_constraints(&mut data, root.ik, scale)?;
        read_transform_constraints(&mut data, root.transform, scale)?;
        read_path_constraints(&mut data, root.path, scale)?;

        let skins = match root.skins {
            None => Vec::new(),
            Some(SkinsDef::Array(skins)) => skins,
            Some(SkinsDef::Map(skins)) => skins
                .into_iter()
                .map(|(name, attachments)| SkinDef {
                    name,
                    attachments,
                    bones: Vec::new(),
                    ik: Vec::new(),
                    transform: Vec::new(),
                    path: Vec::new(),
                })
                .collect(),
        };
        let mut linked = Vec::new();
        for skin in skins {
            let skin = read_skin(&data, skin, scale, &mut linked)?;
            data.skins.insert(skin.name.clone(), skin);
        }
        resolve_linked_meshes(&mut data, linked)?;

        for (name, event) in root.events {
            data.events.insert(
                name.clone(),
                EventData {
                    name,
                    int_value: event.int_value,
                    float_value: event.float_value,
                    string: event.string_value,
                    audio_path: event.audio_path,
                    volume: event.volume,
                    balance: event.balance,
                },
            );
        }

        for (name, def) in root.animations {
            let animation = read_animation(&data, name, def, scale)?;
            data.push_animation(animation);
        }

        Ok(Arc::new(data))
    }
}

fn read_bones(data: &mut SkeletonData, bones: Vec<BoneDef>, scale: f32) -> Result<(), Error> {
    let declared: HashSet<String> = bones.iter().map(|b| b.name.clone()).collect();
    for bone in bones {
        let parent = match bone.parent.as_deref() {
            None => None,
            Some(parent) => match data.bone(parent) {
                Some(index) => Some(index),
                None if declared.contains(parent) => {
                    return Err(Error::BoneOrder { bone: bone.name });
                }
                None => {
                    return Err(Error::UnknownBoneParent {
                        bone: bone.name,
                        parent: parent.to_string(),
                    });
                }
            },
        };
        let context = format!("bone '{}'", bone.name);
        let mut out = BoneData::named(bone.name, parent);
        out.length = bone.length * scale;
        out.x = bone.x * scale;
        out.y = bone.y * scale;
        out.rotation = bone.rotation;
        out.scale_x = bone.scale_x;
        out.scale_y = bone.scale_y;
        out.shear_x = bone.shear_x;
        out.shear_y = bone.shear_y;
        out.transform_mode = parse_transform_mode(bone.transform.as_deref(), &context)?;
        out.skin_required = bone.skin_required;
        if let Some(color) = bone.color.as_deref() {
            out.color = parse_hex_color_rgba(color, &context)?;
        }
        data.bones.push(out);
    }
    Ok(())
}

fn read_slots(data: &mut SkeletonData, slots: Vec<SlotDef>) -> Result<(), Error> {
    for slot in slots {
        let context = format!("slot '{}'", slot.name);
        let bone = find_bone(data, &slot.bone, &context)?;
        let color = slot
            .color
            .as_deref()
            .map(|s| parse_hex_color_rgba(s, &context))
            .transpose()?
            .unwrap_or([1.0; 4]);
        let dark_color = slot
            .dark
            .as_deref()
            .map(|s| parse_hex_color_rgb(s, &context))
            .transpose()?;
        let blend = parse_blend_mode(slot.blend.as_deref(), &context)?;
        data.slots.push(SlotData {
            name: slot.name,
            bone,
            attachment: slot.attachment,
            color,
            dark_color,
            blend,
        });
    }
    Ok(())
}

fn read_ik_constraints(
    data: &mut SkeletonData,
    defs: Vec<IkConstraintDef>,
    scale: f32,
) -> Result<(), Error> {
    for def in defs {
        let context = format!("ik constraint '{}'", def.name);
        let bones = find_bones(data, &def.bones, &context)?;
        let target = find_bone(data, &def.target, &context)?;
        data.ik_constraints.push(IkConstraintData {
            name: def.name,
            order: def.order,
            skin_required: def.skin_required,
            bones,
            target,
            mix: def.mix,
            softness: def.softness * scale,
            bend_direction: if def.bend_positive { 1 } else { -1 },
            compress: def.compress,
            stretch: def.stretch,
            uniform: def.uniform,
        });
    }
    Ok(())
}

fn read_transform_constraints(
    data: &mut SkeletonData,
    defs: Vec<TransformConstraintDef>,
    scale: f32,
) -> Result<(), Error> {
    for def in defs {
        let context = format!("transform constraint '{}'", def.name);
        let bones = find_bones(data, &def.bones, &context)?;
        let target = find_bone(data, &def.target, &context)?;
        data.transform_constraints.push(TransformConstraintData {
            name: def.name,
            order: def.order,
            skin_required: def.skin_required,
            bones,
            target,
            rotate_mix: def.rotate_mix,
            translate_mix: def.translate_mix,
            scale_mix: def.scale_mix,
            shear_mix: def.shear_mix,
            offset_rotation: def.rotation,
            offset_x: def.x * scale,
            offset_y: def.y * scale,
            offset_scale_x: def.scale_x,
            offset_scale_y: def.scale_y,
            offset_shear_y: def.shear_y,
            relative: def.relative,
            local: def.local,
        });
    }
    Ok(())
}

fn read_path_constraints(
    data: &mut SkeletonData,
    defs: Vec<PathConstraintDef>,
    scale: f32,
) -> Result<(), Error> {
    for def in defs {
        let context = format!("path constraint '{}'", def.name);
        let bones = find_bones(data, &def.bones, &context)?;
        let target = find_slot(data, &def.target, &context)?;

        let position_mode = match def.position_mode.as_deref().unwrap_or("percent") {
            "fixed" => PositionMode::Fixed,
            "percent" => PositionMode::Percent,
            other => return Err(unsupported(&context, "positionMode", other)),
        };
        let spacing_mode = match def.spacing_mode.as_deref().unwrap_or("length") {
            "length" => SpacingMode::Length,
            "fixed" => SpacingMode::Fixed,
            "percent" => SpacingMode::Percent,
            other => return Err(unsupported(&context, "spacingMode", other)),
        };
        let rotate_mode = match def.rotate_mode.as_deref().unwrap_or("tangent") {
            "tangent" => RotateMode::Tangent,
            "chain" => RotateMode::Chain,
            "chainScale" => RotateMode::ChainScale,
            other => return Err(unsupported(&context, "rotateMode", other)),
        };

        let mut position = def.position;
        if position_mode == PositionMode::Fixed {
            position *= scale;
        }
        let mut spacing = def.spacing;
        if matches!(spacing_mode, SpacingMode::Length | SpacingMode::Fixed) {
            spacing *= scale;
        }

        data.path_constraints.push(PathConstraintData {
            name: def.name,
            order: def.order,
            skin_required: def.skin_required,
            bones,
            target,
            position_mode,
            spacing_mode,
            rotate_mode,
            offset_rotation: def.rotation,
            position,
            spacing,
            rotate_mix: def.rotate_mix,
            translate_mix: def.translate_mix,
        });
    }
    Ok(())
}

fn read_skin(
    data: &SkeletonData,
    def: SkinDef,
    scale: f32,
    linked: &mut Vec<PendingLinkedMesh>,
) -> Result<SkinData, Error> {
    let context = format!("skin '{}'", def.name);
    let mut skin = SkinData::new(def.name, data.slots.len());
    skin.bones = find_bones(data, &def.bones, &context)?;
    for name in &def.ik {
        let index = data
            .ik_constraint(name)
            .ok_or_else(|| unknown_constraint(&context, "ik", name))?;
        skin.ik_constraints.push(index);
    }
    for name in &def.transform {
        let index = data
            .transform_constraint(name)
            .ok_or_else(|| unknown_constraint(&context, "transform", name))?;
        skin.transform_constraints.push(index);
    }
    for name in &def.path {
        let index = data
            .path_constraint(name)
            .ok_or_else(|| unknown_constraint(&context, "path", name))?;
        skin.path_constraints.push(index);
    }

    for (slot_name, attachments) in def.attachments {
        let slot = find_slot(data, &slot_name, &context)?;
        for (key, attachment) in attachments {
            let attachment = read_attachment(data, &skin.name, slot, &key, attachment, scale, linked)?;
            skin.attachments[slot].insert(key, attachment);
        }
    }
    Ok(skin)
}

fn read_attachment(
    data: &SkeletonData,
    skin: &str,
    slot: usize,
    key: &str,
    def: AttachmentDef,
    scale: f32,
    linked: &mut Vec<PendingLinkedMesh>,
) -> Result<AttachmentData, Error> {
    let name = def.name.clone().unwrap_or_else(|| key.to_string());
    let slot_name = data.slots[slot].name.as_str();
    let context = format!("attachment '{name}' (skin '{skin}', slot '{slot_name}')");
    let color = def
        .color
        .as_deref()
        .map(|s| parse_hex_color_rgba(s, &context))
        .transpose()?
        .unwrap_or([1.0; 4]);
    let vertex_error = |message: &str| Error::InvalidVertexData {
        skin: skin.to_string(),
        slot: slot_name.to_string(),
        attachment: name.clone(),
        message: message.to_string(),
    };

    let attachment = match def.kind.as_deref().unwrap_or("region") {
        "region" => AttachmentData::Region(RegionAttachmentData {
            path: def.path.clone().unwrap_or_else(|| name.clone()),
            name: name.clone(),
            color,
            x: def.x * scale,
            y: def.y * scale,
            rotation: def.rotation,
            scale_x: def.scale_x,
            scale_y: def.scale_y,
            width: def.width.unwrap_or(32.0) * scale,
            height: def.height.unwrap_or(32.0) * scale,
        }),
        kind @ ("mesh" | "linkedmesh") => {
            let id = next_attachment_id();
            let mut mesh = MeshAttachmentData {
                id,
                deform_id: id,
                name: name.clone(),
                path: def.path.clone().unwrap_or_else(|| name.clone()),
                color,
                vertices: MeshVertices::Unweighted(Vec::new()),
                region_uvs: Vec::new(),
                triangles: Vec::new(),
                hull_length: 0,
                edges: Vec::new(),
                width: def.width.unwrap_or(0.0) * scale,
                height: def.height.unwrap_or(0.0) * scale,
                parent_mesh: None,
            };
            if kind == "linkedmesh" || def.parent.is_some() {
                let parent = def
                    .parent
                    .clone()
                    .ok_or_else(|| vertex_error("linked mesh without a parent"))?;
                mesh.parent_mesh = Some(parent.clone());
                linked.push(PendingLinkedMesh {
                    skin: skin.to_string(),
                    slot,
                    attachment: key.to_string(),
                    parent_skin: def.skin.clone(),
                    parent,
                    inherit_deform: def.deform,
                });
            } else {
                if def.uvs.len() % 2 != 0 {
                    return Err(vertex_error("odd number of uv values"));
                }
                let vertex_count = def.uvs.len() / 2;
                mesh.vertices = read_vertices(&def.vertices, vertex_count, scale, data.bones.len())
                    .map_err(|message| vertex_error(&message))?;
                mesh.region_uvs = def.uvs.chunks_exact(2).map(|p| [p[0], p[1]]).collect();
                if let Some(&bad) = def.triangles.iter().find(|&&t| t as usize >= vertex_count) {
                    return Err(vertex_error(&format!("triangle index {bad} out of range")));
                }
                mesh.triangles = def.triangles.clone();
                mesh.hull_length = def.hull * 2;
                mesh.edges = def.edges.clone();
            }
            AttachmentData::Mesh(mesh)
        }
        "boundingbox" => AttachmentData::BoundingBox(BoundingBoxAttachmentData {
            id: next_attachment_id(),
            name: name.clone(),
            vertices: read_vertices(&def.vertices, def.vertex_count, scale, data.bones.len())
                .map_err(|message| vertex_error(&message))?,
            color,
        }),
        "path" => {
            let vertices =
                read_vertices(&def.vertices, def.vertex_count, scale, data.bones.len())
                    .map_err(|message| vertex_error(&message))?;
            if def.lengths.len() != def.vertex_count / 3 {
                return Err(vertex_error("path lengths do not match its curve count"));
            }
            AttachmentData::Path(PathAttachmentData {
                id: next_attachment_id(),
                name: name.clone(),
                vertices,
                lengths: def.lengths.iter().map(|l| l * scale).collect(),
                closed: def.closed,
                constant_speed: def.constant_speed,
                color,
            })
        }
        "point" => AttachmentData::Point(PointAttachmentData {
            name: name.clone(),
            x: def.x * scale,
            y: def.y * scale,
            rotation: def.rotation,
            color,
        }),
        "clipping" => {
            let end_slot = def
                .end
                .as_deref()
                .map(|end| find_slot(data, end, &context))
                .transpose()?;
            AttachmentData::Clipping(ClippingAttachmentData {
                id: next_attachment_id(),
                name: name.clone(),
                vertices: read_vertices(&def.vertices, def.vertex_count, scale, data.bones.len())
                    .map_err(|message| vertex_error(&message))?,
                end_slot,
                color,
            })
        }
        other => return Err(unsupported(&context, "type", other)),
    };
    Ok(attachment)
}

/// Vertex lists are plain `x, y` pairs when their length is exactly two per vertex, otherwise
/// weighted: per vertex a bone count followed by `bone, x, y, weight` per influence.
fn read_vertices(
    raw: &[f32],
    vertex_count: usize,
    scale: f32,
    bone_count: usize,
) -> Result<MeshVertices, String> {
    if raw.len() == vertex_count * 2 {
        return Ok(MeshVertices::Unweighted(
            raw.chunks_exact(2)
                .map(|p| [p[0] * scale, p[1] * scale])
                .collect(),
        ));
    }

    fn expect_index(value: f32) -> Option<usize> {
        (value.is_finite() && value >= 0.0 && value.fract() == 0.0).then_some(value as usize)
    }

    let mut cursor = 0usize;
    let mut out = Vec::with_capacity(vertex_count);
    for _ in 0..vertex_count {
        let &count = raw
            .get(cursor)
            .ok_or("unexpected end of weighted vertices")?;
        cursor += 1;
        let count = expect_index(count).ok_or("invalid bone count in weighted vertices")?;
        let mut influences = Vec::with_capacity(count);
        for _ in 0..count {
            let values = raw
                .get(cursor..cursor + 4)
                .ok_or("unexpected end of weighted vertices")?;
            cursor += 4;
            let bone = expect_index(values[0])
                .filter(|&b| b < bone_count)
                .ok_or("bone index out of range in weighted vertices")?;
            influences.push(VertexWeight {
                bone,
                x: values[1] * scale,
                y: values[2] * scale,
                weight: values[3],
            });
        }
        out.push(influences);
    }
    if cursor != raw.len() {
        return Err("unexpected extra data in weighted vertices".to_string());
    }
    Ok(MeshVertices::Weighted(out))
}

fn read_animation(
    data: &SkeletonData,
    name: String,
    def: AnimationDef,
    scale: f32,
) -> Result<Animation, Error> {
    let context = format!("animation '{name}'");
    let mut animation = Animation {
        name: name.clone(),
        ..Animation::default()
    };

    for (slot_name, timelines) in def.slots {
        let slot_index = find_slot(data, &slot_name, &context)?;
        if !timelines.attachment.is_empty() {
            animation.attachment_timelines.push(AttachmentTimeline {
                slot_index,
                frames: timelines
                    .attachment
                    .into_iter()
                    .map(|k| AttachmentFrame {
                        time: k.time,
                        name: k.name,
                    })
                    .collect(),
            });
        }
        if !timelines.color.is_empty() {
            let mut frames = Vec::with_capacity(timelines.color.len());
            for key in &timelines.color {
                frames.push(ColorFrame {
                    time: key.time,
                    color: parse_hex_color_rgba(&key.color, &context)?,
                    curve: parse_curve(&key.curve, &context)?,
                });
            }
            animation
                .color_timelines
                .push(ColorTimeline { slot_index, frames });
        }
        if !timelines.two_color.is_empty() {
            let mut frames = Vec::with_capacity(timelines.two_color.len());
            for key in &timelines.two_color {
                frames.push(TwoColorFrame {
                    time: key.time,
                    light: parse_hex_color_rgba(&key.light, &context)?,
                    dark: parse_hex_color_rgb(&key.dark, &context)?,
                    curve: parse_curve(&key.curve, &context)?,
                });
            }
            animation
                .two_color_timelines
                .push(TwoColorTimeline { slot_index, frames });
        }
    }

    for (bone_name, timelines) in def.bones {
        let bone_index = find_bone(data, &bone_name, &context)?;
        if !timelines.rotate.is_empty() {
            let mut frames = Vec::with_capacity(timelines.rotate.len());
            for key in &timelines.rotate {
                frames.push(RotateFrame {
                    time: key.time,
                    angle: key.angle,
                    curve: parse_curve(&key.curve, &context)?,
                });
            }
            animation
                .bone_timelines
                .push(BoneTimeline::Rotate(RotateTimeline { bone_index, frames }));
        }
        let vec2 = |keys: &[Vec2Key], default: f32, scale: f32| -> Result<Vec2Timeline, Error> {
            let mut frames = Vec::with_capacity(keys.len());
            for key in keys {
                frames.push(Vec2Frame {
                    time: key.time,
                    x: key.x.unwrap_or(default) * scale,
                    y: key.y.unwrap_or(default) * scale,
                    curve: parse_curve(&key.curve, &context)?,
                });
            }
            Ok(Vec2Timeline { bone_index, frames })
        };
        if !timelines.translate.is_empty() {
            let timeline = vec2(&timelines.translate, 0.0, scale)?;
            animation.bone_timelines.push(BoneTimeline::Translate(timeline));
        }
        if !timelines.scale.is_empty() {
            let timeline = vec2(&timelines.scale, 1.0, 1.0)?;
            animation.bone_timelines.push(BoneTimeline::Scale(timeline));
        }
        if !timelines.shear.is_empty() {
            let timeline = vec2(&timelines.shear, 0.0, 1.0)?;
            animation.bone_timelines.push(BoneTimeline::Shear(timeline));
        }
    }

    for (constraint, keys) in def.ik {
        let constraint_index = data
            .ik_constraint(&constraint)
            .ok_or_else(|| unknown_constraint(&context, "ik", &constraint))?;
        let mut frames = Vec::with_capacity(keys.len());
        for key in &keys {
            frames.push(IkFrame {
                time: key.time,
                mix: key.mix,
                softness: key.softness * scale,
                bend_direction: if key.bend_positive { 1 } else { -1 },
                compress: key.compress,
                stretch: key.stretch,
                curve: parse_curve(&key.curve, &context)?,
            });
        }
        animation.ik_timelines.push(IkConstraintTimeline {
            constraint_index,
            frames,
        });
    }

    for (constraint, keys) in def.transform {
        let constraint_index = data
            .transform_constraint(&constraint)
            .ok_or_else(|| unknown_constraint(&context, "transform", &constraint))?;
        let mut frames = Vec::with_capacity(keys.len());
        for key in &keys {
            frames.push(TransformFrame {
                time: key.time,
                rotate_mix: key.rotate_mix,
                translate_mix: key.translate_mix,
                scale_mix: key.scale_mix,
                shear_mix: key.shear_mix,
                curve: parse_curve(&key.curve, &context)?,
            });
        }
        animation.transform_timelines.push(TransformConstraintTimeline {
            constraint_index,
            frames,
        });
    }

    for (constraint, timelines) in def.path {
        let constraint_index = data
            .path_constraint(&constraint)
            .ok_or_else(|| unknown_constraint(&context, "path", &constraint))?;
        let constraint = &data.path_constraints[constraint_index];
        if !timelines.position.is_empty() {
            let position_scale = if constraint.position_mode == PositionMode::Fixed {
                scale
            } else {
                1.0
            };
            let mut frames = Vec::with_capacity(timelines.position.len());
            for key in &timelines.position {
                frames.push(FloatFrame {
                    time: key.time,
                    value: key.position * position_scale,
                    curve: parse_curve(&key.curve, &context)?,
                });
            }
            animation.path_timelines.push(PathConstraintTimeline::Position {
                constraint_index,
                frames,
            });
        }
        if !timelines.spacing.is_empty() {
            let spacing_scale = match constraint.spacing_mode {
                SpacingMode::Length | SpacingMode::Fixed => scale,
                SpacingMode::Percent => 1.0,
            };
            let mut frames = Vec::with_capacity(timelines.spacing.len());
            for key in &timelines.spacing {
                frames.push(FloatFrame {
                    time: key.time,
                    value: key.spacing * spacing_scale,
                    curve: parse_curve(&key.curve, &context)?,
                });
            }
            animation.path_timelines.push(PathConstraintTimeline::Spacing {
                constraint_index,
                frames,
            });
        }
        if !timelines.mix.is_empty() {
            let mut frames = Vec::with_capacity(timelines.mix.len());
            for key in &timelines.mix {
                frames.push(PathMixFrame {
                    time: key.time,
                    rotate_mix: key.rotate_mix,
                    translate_mix: key.translate_mix,
                    curve: parse_curve(&key.curve, &context)?,
                });
            }
            animation.path_timelines.push(PathConstraintTimeline::Mix {
                constraint_index,
                frames,
            });
        }
    }

    for (skin_name, slots) in def.deform {
        let skin = data
            .skin(&skin_name)
            .ok_or_else(|| Error::UnknownSkinReference {
                context: context.clone(),
                skin: skin_name.clone(),
            })?;
        for (slot_name, attachments) in slots {
            let slot_index = find_slot(data, &slot_name, &context)?;
            for (attachment_name, keys) in attachments {
                let unknown = || Error::UnknownAttachment {
                    context: context.clone(),
                    skin: skin_name.clone(),
                    slot: slot_name.clone(),
                    attachment: attachment_name.clone(),
                };
                let attachment = skin
                    .attachment(slot_index, &attachment_name)
                    .ok_or_else(unknown)?;
                let (Some(vertices), Some(id)) = (attachment.vertices(), attachment.id()) else {
                    return Err(unknown());
                };
                let setup_vertices = vertices.setup_deform();

                let mut frames = Vec::with_capacity(keys.len());
                for key in &keys {
                    let expanded = key
                        .vertices
                        .as_deref()
                        .map(|values| {
                            expand_deform(vertices, &setup_vertices, key.offset, values, scale)
                        })
                        .transpose()
                        .map_err(|message| Error::InvalidVertexData {
                            skin: skin_name.clone(),
                            slot: slot_name.clone(),
                            attachment: attachment_name.clone(),
                            message,
                        })?;
                    frames.push(DeformFrame {
                        time: key.time,
                        vertices: expanded,
                        curve: parse_curve(&key.curve, &context)?,
                    });
                }
                animation.deform_timelines.push(DeformTimeline {
                    slot_index,
                    attachment: id,
                    setup_vertices,
                    frames,
                });
            }
        }
    }

    if let Some(keys) = def.draw_order {
        let mut frames = Vec::with_capacity(keys.len());
        for key in keys {
            let draw_order = match key.offsets {
                None => None,
                Some(offsets) => {
                    let mut moves = Vec::with_capacity(offsets.len());
                    for offset in offsets {
                        let slot = data.slot(&offset.slot).ok_or_else(|| Error::InvalidDrawOrder {
                            animation: name.clone(),
                            message: format!("unknown slot '{}'", offset.slot),
                        })?;
                        moves.push((slot, offset.offset));
                    }
                    let order = expand_draw_order(&moves, data.slots.len()).map_err(|message| {
                        Error::InvalidDrawOrder {
                            animation: name.clone(),
                            message,
                        }
                    })?;
                    Some(order)
                }
            };
            frames.push(DrawOrderFrame {
                time: key.time,
                draw_order,
            });
        }
        animation.draw_order_timeline = Some(DrawOrderTimeline { frames });
    }

    if !def.events.is_empty() {
        let mut events = Vec::with_capacity(def.events.len());
        for key in def.events {
            let event = data.event(&key.name).ok_or_else(|| Error::UnknownEvent {
                context: context.clone(),
                event: key.name.clone(),
            })?;
            let has_audio = !event.audio_path.is_empty();
            events.push(Event {
                time: key.time,
                name: key.name,
                int_value: key.int_value.unwrap_or(event.int_value),
                float_value: key.float_value.unwrap_or(event.float_value),
                string: key.string_value.unwrap_or_else(|| event.string.clone()),
                audio_path: event.audio_path.clone(),
                volume: key.volume.filter(|_| has_audio).unwrap_or(event.volume),
                balance: key.balance.filter(|_| has_audio).unwrap_or(event.balance),
            });
        }
        animation.event_timeline = Some(EventTimeline { events });
    }

    Ok(animation)
}

fn parse_curve(def: &CurveDef, context: &str) -> Result<Curve, Error> {
    use serde_json::Value;

    let invalid = |message: &str| Error::InvalidCurve {
        context: context.to_string(),
        message: message.to_string(),
    };
    match &def.curve {
        None | Some(Value::Null) => Ok(Curve::Linear),
        Some(Value::String(s)) if s == "stepped" => Ok(Curve::Stepped),
        Some(Value::String(s)) if s == "linear" => Ok(Curve::Linear),
        Some(Value::Number(n)) => {
            let cx1 = n.as_f64().ok_or_else(|| invalid("not a number"))? as f32;
            Ok(Curve::bezier(
                cx1,
                def.c2.unwrap_or(0.0),
                def.c3.unwrap_or(1.0),
                def.c4.unwrap_or(1.0),
            ))
        }
        // Exports before 3.8 store all four control values in an array.
        Some(Value::Array(values)) => {
            let v: Vec<f32> = values
                .iter()
                .filter_map(|v| v.as_f64().map(|f| f as f32))
                .collect();
            match v.as_slice() {
                &[cx1, cy1, cx2, cy2] => Ok(Curve::bezier(cx1, cy1, cx2, cy2)),
                _ => Err(invalid("expected four bezier control values")),
            }
        }
        Some(other) => Err(invalid(&format!("unexpected value {other}"))),
    }
}

fn find_bone(data: &SkeletonData, bone: &str, context: &str) -> Result<usize, Error> {
    data.bone(bone).ok_or_else(|| Error::UnknownBone {
        context: context.to_string(),
        bone: bone.to_string(),
    })
}

fn find_bones(data: &SkeletonData, bones: &[String], context: &str) -> Result<Vec<usize>, Error> {
    bones.iter().map(|b| find_bone(data, b, context)).collect()
}

fn find_slot(data: &SkeletonData, slot: &str, context: &str) -> Result<usize, Error> {
    data.slot(slot).ok_or_else(|| Error::UnknownSlot {
        context: context.to_string(),
        slot: slot.to_string(),
    })
}

fn unknown_constraint(context: &str, kind: &'static str, constraint: &str) -> Error {
    Error::UnknownConstraint {
        context: context.to_string(),
        kind,
        constraint: constraint.to_string(),
    }
}

fn unsupported(context: &str, field: &'static str, value: &str) -> Error {
    Error::UnsupportedValue {
        context: context.to_string(),
        field,
        value: value.to_string(),
    }
}

fn parse_transform_mode(value: Option<&str>, context: &str) -> Result<TransformMode, Error> {
    match value.unwrap_or("normal") {
        "normal" => Ok(TransformMode::Normal),
        "onlyTranslation" => Ok(TransformMode::OnlyTranslation),
        "noRotationOrReflection" => Ok(TransformMode::NoRotationOrReflection),
        "noScale" => Ok(TransformMode::NoScale),
        "noScaleOrReflection" => Ok(TransformMode::NoScaleOrReflection),
        other => Err(unsupported(context, "transform", other)),
    }
}

fn parse_blend_mode(value: Option<&str>, context: &str) -> Result<BlendMode, Error> {
    match value.unwrap_or("normal") {
        "normal" => Ok(BlendMode::Normal),
        "additive" => Ok(BlendMode::Additive),
        "multiply" => Ok(BlendMode::Multiply),
        "screen" => Ok(BlendMode::Screen),
        other => Err(unsupported(context, "blend", other)),
    }
}

fn default_one() -> f32 {
    1.0
}

fn default_true() -> bool {
    true
}

fn default_fps() -> f32 {
    30.0
}

fn parse_hex_color_rgba(input: &str, context: &str) -> Result<[f32; 4], Error> {
    let invalid = || Error::InvalidColor {
        context: context.to_string(),
        value: input.to_string(),
    };
    let bytes = input.as_bytes();
    if !(bytes.len() == 6 || bytes.len() == 8) || !input.is_ascii() {
        return Err(invalid());
    }
    let mut channels = [1.0f32; 4];
    for (i, channel) in channels.iter_mut().enumerate().take(bytes.len() / 2) {
        let byte = u8::from_str_radix(&input[i * 2..i * 2 + 2], 16).map_err(|_| invalid())?;
        *channel = byte as f32 / 255.0;
    }
    Ok(channels)
}

fn parse_hex_color_rgb(input: &str, context: &str) -> Result<[f32; 3], Error> {
    let [r, g, b, _] = parse_hex_color_rgba(input, context)?;
    Ok([r, g, b])
}
