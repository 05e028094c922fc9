//! Spine `.skel` (binary) loader for Spine 3.8 exports.
//!
//! The loader is IO-free: it operates on an in-memory byte slice.

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
use byteorder::{BigEndian, ByteOrder};
use std::sync::Arc;

const CURVE_LINEAR: u8 = 0;
const CURVE_STEPPED: u8 = 1;
const CURVE_BEZIER: u8 = 2;

const SLOT_ATTACHMENT: u8 = 0;
const SLOT_COLOR: u8 = 1;
const SLOT_TWO_COLOR: u8 = 2;

const BONE_ROTATE: u8 = 0;
const BONE_TRANSLATE: u8 = 1;
const BONE_SCALE: u8 = 2;
const BONE_SHEAR: u8 = 3;

const PATH_POSITION: u8 = 0;
const PATH_SPACING: u8 = 1;
const PATH_MIX: u8 = 2;

const ATTACHMENT_REGION: u8 = 0;
const ATTACHMENT_BOUNDING_BOX: u8 = 1;
const ATTACHMENT_MESH: u8 = 2;
const ATTACHMENT_LINKED_MESH: u8 = 3;
const ATTACHMENT_PATH: u8 = 4;
const ATTACHMENT_POINT: u8 = 5;
const ATTACHMENT_CLIPPING: u8 = 6;

fn parse_error(message: impl Into<String>) -> Error {
    Error::BinaryParse {
        message: message.into(),
    }
}

#[derive(Clone, Debug)]
struct BinaryInput<'a> {
    bytes: &'a [u8],
    cursor: usize,
    strings: Vec<String>,
}

impl<'a> BinaryInput<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            cursor: 0,
            strings: Vec::new(),
        }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], Error> {
        let end = self
            .cursor
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| parse_error(format!("unexpected EOF at offset {}", self.cursor)))?;
        let bytes = &self.bytes[self.cursor..end];
        self.cursor = end;
        Ok(bytes)
    }

    fn read_u8(&mut self) -> Result<u8, Error> {
        Ok(self.take(1)?[0])
    }

    fn read_i8(&mut self) -> Result<i8, Error> {
        Ok(self.read_u8()? as i8)
    }

    fn read_bool(&mut self) -> Result<bool, Error> {
        Ok(self.read_u8()? != 0)
    }

    fn read_i32(&mut self) -> Result<i32, Error> {
        Ok(BigEndian::read_i32(self.take(4)?))
    }

    fn read_u16(&mut self) -> Result<u16, Error> {
        Ok(BigEndian::read_u16(self.take(2)?))
    }

    fn read_f32(&mut self) -> Result<f32, Error> {
        Ok(BigEndian::read_f32(self.take(4)?))
    }

    /// Variable-length int, 7 bits per byte. Without `optimize_positive` the value is zig-zag
    /// encoded.
    fn read_varint(&mut self, optimize_positive: bool) -> Result<i32, Error> {
        let mut value: u32 = 0;
        for shift in [0u32, 7, 14, 21, 28] {
            let b = self.read_u8()?;
            value |= ((b & 0x7F) as u32) << shift;
            if b & 0x80 == 0 {
                break;
            }
        }
        if optimize_positive {
            Ok(value as i32)
        } else {
            Ok((value >> 1) as i32 ^ -((value & 1) as i32))
        }
    }

    fn read_count(&mut self) -> Result<usize, Error> {
        let offset = self.cursor;
        let value = self.read_varint(true)?;
        usize::try_from(value).map_err(|_| parse_error(format!("negative count at offset {offset}")))
    }

    /// Reads an index and checks it against `len` items of kind `what`.
    fn read_index(&mut self, len: usize, what: &str) -> Result<usize, Error> {
        let offset = self.cursor;
        let index = self.read_count()?;
        if index >= len {
            return Err(parse_error(format!(
                "{what} index {index} out of range ({len}) at offset {offset}"
            )));
        }
        Ok(index)
    }

    fn read_string(&mut self) -> Result<Option<String>, Error> {
        let offset = self.cursor;
        let length = self.read_count()?;
        match length {
            0 => Ok(None),
            1 => Ok(Some(String::new())),
            _ => {
                let bytes = self.take(length - 1)?;
                let s = std::str::from_utf8(bytes).map_err(|e| {
                    parse_error(format!("invalid utf-8 in string at offset {offset}: {e}"))
                })?;
                Ok(Some(s.to_string()))
            }
        }
    }

    fn read_required_string(&mut self, what: &str) -> Result<String, Error> {
        let offset = self.cursor;
        self.read_string()?
            .ok_or_else(|| parse_error(format!("missing {what} at offset {offset}")))
    }

    fn read_string_ref(&mut self) -> Result<Option<String>, Error> {
        let offset = self.cursor;
        let index = self.read_count()?;
        if index == 0 {
            return Ok(None);
        }
        self.strings.get(index - 1).cloned().map(Some).ok_or_else(|| {
            parse_error(format!(
                "string reference {index} out of range ({}) at offset {offset}",
                self.strings.len()
            ))
        })
    }

    fn read_required_string_ref(&mut self, what: &str) -> Result<String, Error> {
        let offset = self.cursor;
        self.read_string_ref()?
            .ok_or_else(|| parse_error(format!("missing {what} at offset {offset}")))
    }

    /// `0xRRGGBBAA`.
    fn read_color(&mut self) -> Result<[f32; 4], Error> {
        let bytes = self.take(4)?;
        Ok([
            bytes[0] as f32 / 255.0,
            bytes[1] as f32 / 255.0,
            bytes[2] as f32 / 255.0,
            bytes[3] as f32 / 255.0,
        ])
    }

    /// `0x00RRGGBB`, with `-1` meaning no dark color.
    fn read_dark_color(&mut self) -> Result<Option<[f32; 3]>, Error> {
        let value = self.read_i32()?;
        if value == -1 {
            return Ok(None);
        }
        Ok(Some([
            ((value >> 16) & 0xFF) as f32 / 255.0,
            ((value >> 8) & 0xFF) as f32 / 255.0,
            (value & 0xFF) as f32 / 255.0,
        ]))
    }

    fn read_floats(&mut self, count: usize, scale: f32) -> Result<Vec<f32>, Error> {
        (0..count).map(|_| Ok(self.read_f32()? * scale)).collect()
    }

    fn read_shorts(&mut self) -> Result<Vec<u16>, Error> {
        let count = self.read_count()?;
        (0..count).map(|_| self.read_u16()).collect()
    }

    fn read_indices(&mut self, len: usize, what: &str) -> Result<Vec<usize>, Error> {
        let count = self.read_count()?;
        (0..count).map(|_| self.read_index(len, what)).collect()
    }

    /// Curve between frame `index` and the next; the last frame stores none.
    fn read_curve(&mut self, index: usize, frame_count: usize) -> Result<Curve, Error> {
        if index + 1 >= frame_count {
            return Ok(Curve::Linear);
        }
        match self.read_u8()? {
            CURVE_LINEAR => Ok(Curve::Linear),
            CURVE_STEPPED => Ok(Curve::Stepped),
            CURVE_BEZIER => Ok(Curve::bezier(
                self.read_f32()?,
                self.read_f32()?,
                self.read_f32()?,
                self.read_f32()?,
            )),
            other => Err(parse_error(format!("unknown curve type {other}"))),
        }
    }
}

/// Event definitions in file order; timelines refer to them by index.
struct EventRef {
    name: String,
    has_audio: bool,
}

impl SkeletonData {
    pub fn from_skel_bytes(bytes: &[u8]) -> Result<Arc<Self>, Error> {
        Self::from_skel_bytes_with_scale(bytes, 1.0)
    }

    /// Loads a Spine 3.8 binary export, multiplying every positional value by `scale`.
    pub fn from_skel_bytes_with_scale(bytes: &[u8], scale: f32) -> Result<Arc<Self>, Error> {
        let scale = if scale.is_finite() { scale } else { 1.0 };
        let mut input = BinaryInput::new(bytes);
        let mut data = SkeletonData {
            fps: 30.0,
            ..SkeletonData::default()
        };

        data.hash = input.read_string()?.unwrap_or_default();
        let version = input.read_string()?.unwrap_or_default();
        check_spine_version(&version)?;
        data.version = version;
        data.x = input.read_f32()?;
        data.y = input.read_f32()?;
        data.width = input.read_f32()?;
        data.height = input.read_f32()?;
        let nonessential = input.read_bool()?;
        if nonessential {
            data.fps = input.read_f32()?;
            data.images_path = input.read_string()?.unwrap_or_default();
            data.audio_path = input.read_string()?.unwrap_or_default();
        }

        let string_count = input.read_count()?;
        let mut strings = Vec::with_capacity(string_count.min(bytes.len()));
        for _ in 0..string_count {
            strings.push(input.read_string()?.unwrap_or_default());
        }
        input.strings = strings;

        read_bones(&mut input, &mut data, scale, nonessential)?;
        read_slots(&mut input, &mut data)?;
        read_constraints(&mut input, &mut data, scale)?;

        let mut linked = Vec::new();
        let mut skin_order = Vec::new();
        if let Some(skin) = read_skin(&mut input, &data, true, scale, nonessential, &mut linked)? {
            skin_order.push(skin.name.clone());
            data.skins.insert(skin.name.clone(), skin);
        }
        let skin_count = input.read_count()?;
        for _ in 0..skin_count {
            if let Some(skin) =
                read_skin(&mut input, &data, false, scale, nonessential, &mut linked)?
            {
                skin_order.push(skin.name.clone());
                data.skins.insert(skin.name.clone(), skin);
            }
        }
        resolve_linked_meshes(&mut data, linked)?;

        let event_count = input.read_count()?;
        let mut events = Vec::with_capacity(event_count.min(bytes.len()));
        for _ in 0..event_count {
            let name = input.read_required_string_ref("event name")?;
            let int_value = input.read_varint(false)?;
            let float_value = input.read_f32()?;
            let string = input.read_string()?.unwrap_or_default();
            let audio = input.read_string()?;
            let (volume, balance) = if audio.is_some() {
                (input.read_f32()?, input.read_f32()?)
            } else {
                (1.0, 0.0)
            };
            events.push(EventRef {
                name: name.clone(),
                has_audio: audio.is_some(),
            });
            data.events.insert(
                name.clone(),
                EventData {
                    name,
                    int_value,
                    float_value,
                    string,
                    audio_path: audio.unwrap_or_default(),
                    volume,
                    balance,
                },
            );
        }

        let animation_count = input.read_count()?;
        for _ in 0..animation_count {
            let name = input.read_required_string("animation name")?;
            let animation = read_animation(&mut input, &data, name, &skin_order, &events, scale)?;
            data.push_animation(animation);
        }

        Ok(Arc::new(data))
    }
}

fn read_bones(
    input: &mut BinaryInput<'_>,
    data: &mut SkeletonData,
    scale: f32,
    nonessential: bool,
) -> Result<(), Error> {
    let count = input.read_count()?;
    for i in 0..count {
        let name = input.read_required_string("bone name")?;
        let parent = if i == 0 {
            None
        } else {
            Some(input.read_index(i, "parent bone")?)
        };
        let mut bone = BoneData::named(name, parent);
        bone.rotation = input.read_f32()?;
        bone.x = input.read_f32()? * scale;
        bone.y = input.read_f32()? * scale;
        bone.scale_x = input.read_f32()?;
        bone.scale_y = input.read_f32()?;
        bone.shear_x = input.read_f32()?;
        bone.shear_y = input.read_f32()?;
        bone.length = input.read_f32()? * scale;
        let mode = input.read_count()?;
        bone.transform_mode = TransformMode::from_index(mode)
            .ok_or_else(|| parse_error(format!("unknown transform mode {mode}")))?;
        bone.skin_required = input.read_bool()?;
        if nonessential {
            bone.color = input.read_color()?;
        }
        data.bones.push(bone);
    }
    Ok(())
}

fn read_slots(input: &mut BinaryInput<'_>, data: &mut SkeletonData) -> Result<(), Error> {
    let count = input.read_count()?;
    for _ in 0..count {
        let name = input.read_required_string("slot name")?;
        let bone = input.read_index(data.bones.len(), "slot bone")?;
        let color = input.read_color()?;
        let dark_color = input.read_dark_color()?;
        let attachment = input.read_string_ref()?;
        let blend = input.read_count()?;
        let blend = BlendMode::from_index(blend).ok_or_else(|| Error::UnsupportedValue {
            context: format!("slot '{name}'"),
            field: "blend",
            value: blend.to_string(),
        })?;
        data.slots.push(SlotData {
            name,
            bone,
            attachment,
            color,
            dark_color,
            blend,
        });
    }
    Ok(())
}

fn read_constraints(
    input: &mut BinaryInput<'_>,
    data: &mut SkeletonData,
    scale: f32,
) -> Result<(), Error> {
    let bone_count = data.bones.len();

    let count = input.read_count()?;
    for _ in 0..count {
        let name = input.read_required_string("ik constraint name")?;
        let order = input.read_count()? as i32;
        let skin_required = input.read_bool()?;
        let bones = input.read_indices(bone_count, "ik bone")?;
        let target = input.read_index(bone_count, "ik target")?;
        data.ik_constraints.push(IkConstraintData {
            name,
            order,
            skin_required,
            bones,
            target,
            mix: input.read_f32()?,
            softness: input.read_f32()? * scale,
            bend_direction: input.read_i8()? as i32,
            compress: input.read_bool()?,
            stretch: input.read_bool()?,
            uniform: input.read_bool()?,
        });
    }

    let count = input.read_count()?;
    for _ in 0..count {
        let name = input.read_required_string("transform constraint name")?;
        let order = input.read_count()? as i32;
        let skin_required = input.read_bool()?;
        let bones = input.read_indices(bone_count, "transform bone")?;
        let target = input.read_index(bone_count, "transform target")?;
        let local = input.read_bool()?;
        let relative = input.read_bool()?;
        data.transform_constraints.push(TransformConstraintData {
            name,
            order,
            skin_required,
            bones,
            target,
            local,
            relative,
            offset_rotation: input.read_f32()?,
            offset_x: input.read_f32()? * scale,
            offset_y: input.read_f32()? * scale,
            offset_scale_x: input.read_f32()?,
            offset_scale_y: input.read_f32()?,
            offset_shear_y: input.read_f32()?,
            rotate_mix: input.read_f32()?,
            translate_mix: input.read_f32()?,
            scale_mix: input.read_f32()?,
            shear_mix: input.read_f32()?,
        });
    }

    let count = input.read_count()?;
    for _ in 0..count {
        let name = input.read_required_string("path constraint name")?;
        let order = input.read_count()? as i32;
        let skin_required = input.read_bool()?;
        let bones = input.read_indices(bone_count, "path bone")?;
        let target = input.read_index(data.slots.len(), "path target slot")?;
        let position_mode = match input.read_count()? {
            0 => PositionMode::Fixed,
            1 => PositionMode::Percent,
            other => return Err(parse_error(format!("unknown position mode {other}"))),
        };
        let spacing_mode = match input.read_count()? {
            0 => SpacingMode::Length,
            1 => SpacingMode::Fixed,
            2 => SpacingMode::Percent,
            other => return Err(parse_error(format!("unknown spacing mode {other}"))),
        };
        let rotate_mode = match input.read_count()? {
            0 => RotateMode::Tangent,
            1 => RotateMode::Chain,
            2 => RotateMode::ChainScale,
            other => return Err(parse_error(format!("unknown rotate mode {other}"))),
        };
        let offset_rotation = input.read_f32()?;
        let mut position = input.read_f32()?;
        if position_mode == PositionMode::Fixed {
            position *= scale;
        }
        let mut spacing = input.read_f32()?;
        if matches!(spacing_mode, SpacingMode::Length | SpacingMode::Fixed) {
            spacing *= scale;
        }
        data.path_constraints.push(PathConstraintData {
            name,
            order,
            skin_required,
            bones,
            target,
            position_mode,
            spacing_mode,
            rotate_mode,
            offset_rotation,
            position,
            spacing,
            rotate_mix: input.read_f32()?,
            translate_mix: input.read_f32()?,
        });
    }
    Ok(())
}

fn read_skin(
    input: &mut BinaryInput<'_>,
    data: &SkeletonData,
    default_skin: bool,
    scale: f32,
    nonessential: bool,
    linked: &mut Vec<PendingLinkedMesh>,
) -> Result<Option<SkinData>, Error> {
    let mut skin;
    let slot_count;
    if default_skin {
        slot_count = input.read_count()?;
        if slot_count == 0 {
            return Ok(None);
        }
        skin = SkinData::new("default", data.slots.len());
    } else {
        let name = input.read_required_string_ref("skin name")?;
        skin = SkinData::new(name, data.slots.len());
        skin.bones = input.read_indices(data.bones.len(), "skin bone")?;
        skin.ik_constraints = input.read_indices(data.ik_constraints.len(), "skin ik constraint")?;
        skin.transform_constraints =
            input.read_indices(data.transform_constraints.len(), "skin transform constraint")?;
        skin.path_constraints =
            input.read_indices(data.path_constraints.len(), "skin path constraint")?;
        slot_count = input.read_count()?;
    }

    for _ in 0..slot_count {
        let slot = input.read_index(data.slots.len(), "skin slot")?;
        let attachment_count = input.read_count()?;
        for _ in 0..attachment_count {
            let key = input.read_required_string_ref("attachment name")?;
            let attachment = read_attachment(
                input,
                data,
                &skin.name,
                slot,
                &key,
                scale,
                nonessential,
                linked,
            )?;
            skin.attachments[slot].insert(key, attachment);
        }
    }
    Ok(Some(skin))
}

#[allow(clippy::too_many_arguments)]
fn read_attachment(
    input: &mut BinaryInput<'_>,
    data: &SkeletonData,
    skin: &str,
    slot: usize,
    key: &str,
    scale: f32,
    nonessential: bool,
    linked: &mut Vec<PendingLinkedMesh>,
) -> Result<AttachmentData, Error> {
    let name = input.read_string_ref()?.unwrap_or_else(|| key.to_string());
    let bone_count = data.bones.len();
    let kind = input.read_u8()?;
    let attachment = match kind {
        ATTACHMENT_REGION => {
            let path = input.read_string_ref()?.unwrap_or_else(|| name.clone());
            let rotation = input.read_f32()?;
            let x = input.read_f32()? * scale;
            let y = input.read_f32()? * scale;
            let scale_x = input.read_f32()?;
            let scale_y = input.read_f32()?;
            let width = input.read_f32()? * scale;
            let height = input.read_f32()? * scale;
            let color = input.read_color()?;
            AttachmentData::Region(RegionAttachmentData {
                name,
                path,
                color,
                x,
                y,
                rotation,
                scale_x,
                scale_y,
                width,
                height,
            })
        }
        ATTACHMENT_BOUNDING_BOX => {
            let vertex_count = input.read_count()?;
            let vertices = read_vertices(input, vertex_count, scale, bone_count)?;
            let color = if nonessential {
                input.read_color()?
            } else {
                [1.0; 4]
            };
            AttachmentData::BoundingBox(BoundingBoxAttachmentData {
                id: next_attachment_id(),
                name,
                vertices,
                color,
            })
        }
        ATTACHMENT_MESH => {
            let path = input.read_string_ref()?.unwrap_or_else(|| name.clone());
            let color = input.read_color()?;
            let vertex_count = input.read_count()?;
            let uvs = input.read_floats(vertex_count * 2, 1.0)?;
            let triangles = input.read_shorts()?;
            if let Some(&bad) = triangles.iter().find(|&&t| t as usize >= vertex_count) {
                return Err(Error::InvalidVertexData {
                    skin: skin.to_string(),
                    slot: data.slots[slot].name.clone(),
                    attachment: name,
                    message: format!("triangle index {bad} out of range"),
                });
            }
            let vertices = read_vertices(input, vertex_count, scale, bone_count)?;
            let hull_length = input.read_count()? * 2;
            let (edges, width, height) = if nonessential {
                (
                    input.read_shorts()?,
                    input.read_f32()? * scale,
                    input.read_f32()? * scale,
                )
            } else {
                (Vec::new(), 0.0, 0.0)
            };
            let id = next_attachment_id();
            AttachmentData::Mesh(MeshAttachmentData {
                id,
                deform_id: id,
                name,
                path,
                color,
                vertices,
                region_uvs: uvs.chunks_exact(2).map(|p| [p[0], p[1]]).collect(),
                triangles,
                hull_length,
                edges,
                width,
                height,
                parent_mesh: None,
            })
        }
        ATTACHMENT_LINKED_MESH => {
            let path = input.read_string_ref()?.unwrap_or_else(|| name.clone());
            let color = input.read_color()?;
            let parent_skin = input.read_string_ref()?;
            let parent = input.read_required_string_ref("linked mesh parent")?;
            let inherit_deform = input.read_bool()?;
            let (width, height) = if nonessential {
                (input.read_f32()? * scale, input.read_f32()? * scale)
            } else {
                (0.0, 0.0)
            };
            linked.push(PendingLinkedMesh {
                skin: skin.to_string(),
                slot,
                attachment: key.to_string(),
                parent_skin,
                parent: parent.clone(),
                inherit_deform,
            });
            let id = next_attachment_id();
            AttachmentData::Mesh(MeshAttachmentData {
                id,
                deform_id: id,
                name,
                path,
                color,
                vertices: MeshVertices::Unweighted(Vec::new()),
                region_uvs: Vec::new(),
                triangles: Vec::new(),
                hull_length: 0,
                edges: Vec::new(),
                width,
                height,
                parent_mesh: Some(parent),
            })
        }
        ATTACHMENT_PATH => {
            let closed = input.read_bool()?;
            let constant_speed = input.read_bool()?;
            let vertex_count = input.read_count()?;
            let vertices = read_vertices(input, vertex_count, scale, bone_count)?;
            let lengths = input.read_floats(vertex_count / 3, scale)?;
            let color = if nonessential {
                input.read_color()?
            } else {
                [1.0; 4]
            };
            AttachmentData::Path(PathAttachmentData {
                id: next_attachment_id(),
                name,
                vertices,
                lengths,
                closed,
                constant_speed,
                color,
            })
        }
        ATTACHMENT_POINT => {
            let rotation = input.read_f32()?;
            let x = input.read_f32()? * scale;
            let y = input.read_f32()? * scale;
            let color = if nonessential {
                input.read_color()?
            } else {
                [1.0; 4]
            };
            AttachmentData::Point(PointAttachmentData {
                name,
                x,
                y,
                rotation,
                color,
            })
        }
        ATTACHMENT_CLIPPING => {
            let end_slot = input.read_index(data.slots.len(), "clipping end slot")?;
            let vertex_count = input.read_count()?;
            let vertices = read_vertices(input, vertex_count, scale, bone_count)?;
            let color = if nonessential {
                input.read_color()?
            } else {
                [1.0; 4]
            };
            AttachmentData::Clipping(ClippingAttachmentData {
                id: next_attachment_id(),
                name,
                vertices,
                end_slot: Some(end_slot),
                color,
            })
        }
        other => {
            return Err(Error::UnsupportedValue {
                context: format!("attachment '{name}' (skin '{skin}')"),
                field: "type",
                value: other.to_string(),
            });
        }
    };
    Ok(attachment)
}

fn read_vertices(
    input: &mut BinaryInput<'_>,
    vertex_count: usize,
    scale: f32,
    bone_count: usize,
) -> Result<MeshVertices, Error> {
    if !input.read_bool()? {
        let flat = input.read_floats(vertex_count * 2, scale)?;
        return Ok(MeshVertices::Unweighted(
            flat.chunks_exact(2).map(|p| [p[0], p[1]]).collect(),
        ));
    }
    let mut weighted = Vec::with_capacity(vertex_count.min(input.bytes.len()));
    for _ in 0..vertex_count {
        let influence_count = input.read_count()?;
        let mut influences = Vec::with_capacity(influence_count.min(bone_count));
        for _ in 0..influence_count {
            influences.push(VertexWeight {
                bone: input.read_index(bone_count, "vertex bone")?,
                x: input.read_f32()? * scale,
                y: input.read_f32()? * scale,
                weight: input.read_f32()?,
            });
        }
        weighted.push(influences);
    }
    Ok(MeshVertices::Weighted(weighted))
}

fn read_animation(
    input: &mut BinaryInput<'_>,
    data: &SkeletonData,
    name: String,
    skin_order: &[String],
    events: &[EventRef],
    scale: f32,
) -> Result<Animation, Error> {
    let mut animation = Animation {
        name,
        ..Animation::default()
    };

    let count = input.read_count()?;
    for _ in 0..count {
        let slot_index = input.read_index(data.slots.len(), "timeline slot")?;
        let timeline_count = input.read_count()?;
        for _ in 0..timeline_count {
            let kind = input.read_u8()?;
            let frame_count = input.read_count()?;
            match kind {
                SLOT_ATTACHMENT => {
                    let mut frames = Vec::with_capacity(frame_count.min(input.bytes.len()));
                    for _ in 0..frame_count {
                        frames.push(AttachmentFrame {
                            time: input.read_f32()?,
                            name: input.read_string_ref()?,
                        });
                    }
                    animation
                        .attachment_timelines
                        .push(AttachmentTimeline { slot_index, frames });
                }
                SLOT_COLOR => {
                    let mut frames = Vec::with_capacity(frame_count.min(input.bytes.len()));
                    for i in 0..frame_count {
                        frames.push(ColorFrame {
                            time: input.read_f32()?,
                            color: input.read_color()?,
                            curve: input.read_curve(i, frame_count)?,
                        });
                    }
                    animation
                        .color_timelines
                        .push(ColorTimeline { slot_index, frames });
                }
                SLOT_TWO_COLOR => {
                    let mut frames = Vec::with_capacity(frame_count.min(input.bytes.len()));
                    for i in 0..frame_count {
                        let time = input.read_f32()?;
                        let light = input.read_color()?;
                        let dark = input.read_dark_color()?.unwrap_or([1.0; 3]);
                        frames.push(TwoColorFrame {
                            time,
                            light,
                            dark,
                            curve: input.read_curve(i, frame_count)?,
                        });
                    }
                    animation
                        .two_color_timelines
                        .push(TwoColorTimeline { slot_index, frames });
                }
                other => return Err(parse_error(format!("unknown slot timeline type {other}"))),
            }
        }
    }

    let count = input.read_count()?;
    for _ in 0..count {
        let bone_index = input.read_index(data.bones.len(), "timeline bone")?;
        let timeline_count = input.read_count()?;
        for _ in 0..timeline_count {
            let kind = input.read_u8()?;
            let frame_count = input.read_count()?;
            if kind == BONE_ROTATE {
                let mut frames = Vec::with_capacity(frame_count.min(input.bytes.len()));
                for i in 0..frame_count {
                    frames.push(RotateFrame {
                        time: input.read_f32()?,
                        angle: input.read_f32()?,
                        curve: input.read_curve(i, frame_count)?,
                    });
                }
                animation
                    .bone_timelines
                    .push(BoneTimeline::Rotate(RotateTimeline { bone_index, frames }));
                continue;
            }

            let timeline_scale = if kind == BONE_TRANSLATE { scale } else { 1.0 };
            let mut frames = Vec::with_capacity(frame_count.min(input.bytes.len()));
            for i in 0..frame_count {
                frames.push(Vec2Frame {
                    time: input.read_f32()?,
                    x: input.read_f32()? * timeline_scale,
                    y: input.read_f32()? * timeline_scale,
                    curve: input.read_curve(i, frame_count)?,
                });
            }
            let timeline = Vec2Timeline { bone_index, frames };
            animation.bone_timelines.push(match kind {
                BONE_TRANSLATE => BoneTimeline::Translate(timeline),
                BONE_SCALE => BoneTimeline::Scale(timeline),
                BONE_SHEAR => BoneTimeline::Shear(timeline),
                other => return Err(parse_error(format!("unknown bone timeline type {other}"))),
            });
        }
    }

    let count = input.read_count()?;
    for _ in 0..count {
        let constraint_index = input.read_index(data.ik_constraints.len(), "ik timeline")?;
        let frame_count = input.read_count()?;
        let mut frames = Vec::with_capacity(frame_count.min(input.bytes.len()));
        for i in 0..frame_count {
            frames.push(IkFrame {
                time: input.read_f32()?,
                mix: input.read_f32()?,
                softness: input.read_f32()? * scale,
                bend_direction: input.read_i8()? as i32,
                compress: input.read_bool()?,
                stretch: input.read_bool()?,
                curve: input.read_curve(i, frame_count)?,
            });
        }
        animation.ik_timelines.push(IkConstraintTimeline {
            constraint_index,
            frames,
        });
    }

    let count = input.read_count()?;
    for _ in 0..count {
        let constraint_index =
            input.read_index(data.transform_constraints.len(), "transform timeline")?;
        let frame_count = input.read_count()?;
        let mut frames = Vec::with_capacity(frame_count.min(input.bytes.len()));
        for i in 0..frame_count {
            frames.push(TransformFrame {
                time: input.read_f32()?,
                rotate_mix: input.read_f32()?,
                translate_mix: input.read_f32()?,
                scale_mix: input.read_f32()?,
                shear_mix: input.read_f32()?,
                curve: input.read_curve(i, frame_count)?,
            });
        }
        animation
            .transform_timelines
            .push(TransformConstraintTimeline {
                constraint_index,
                frames,
            });
    }

    let count = input.read_count()?;
    for _ in 0..count {
        let constraint_index = input.read_index(data.path_constraints.len(), "path timeline")?;
        let constraint = &data.path_constraints[constraint_index];
        let timeline_count = input.read_count()?;
        for _ in 0..timeline_count {
            let kind = input.read_u8()?;
            let frame_count = input.read_count()?;
            match kind {
                PATH_POSITION | PATH_SPACING => {
                    let timeline_scale = match (kind, constraint.spacing_mode) {
                        (PATH_SPACING, SpacingMode::Length | SpacingMode::Fixed) => scale,
                        (PATH_POSITION, _) if constraint.position_mode == PositionMode::Fixed => {
                            scale
                        }
                        _ => 1.0,
                    };
                    let mut frames = Vec::with_capacity(frame_count.min(input.bytes.len()));
                    for i in 0..frame_count {
                        frames.push(FloatFrame {
                            time: input.read_f32()?,
                            value: input.read_f32()? * timeline_scale,
                            curve: input.read_curve(i, frame_count)?,
                        });
                    }
                    animation.path_timelines.push(if kind == PATH_POSITION {
                        PathConstraintTimeline::Position {
                            constraint_index,
                            frames,
                        }
                    } else {
                        PathConstraintTimeline::Spacing {
                            constraint_index,
                            frames,
                        }
                    });
                }
                PATH_MIX => {
                    let mut frames = Vec::with_capacity(frame_count.min(input.bytes.len()));
                    for i in 0..frame_count {
                        frames.push(PathMixFrame {
                            time: input.read_f32()?,
                            rotate_mix: input.read_f32()?,
                            translate_mix: input.read_f32()?,
                            curve: input.read_curve(i, frame_count)?,
                        });
                    }
                    animation.path_timelines.push(PathConstraintTimeline::Mix {
                        constraint_index,
                        frames,
                    });
                }
                other => return Err(parse_error(format!("unknown path timeline type {other}"))),
            }
        }
    }

    let count = input.read_count()?;
    for _ in 0..count {
        let skin_index = input.read_index(skin_order.len(), "deform skin")?;
        let skin_name = &skin_order[skin_index];
        let skin = data
            .skin(skin_name)
            .ok_or_else(|| parse_error(format!("deform skin '{skin_name}' missing")))?;
        let slot_count = input.read_count()?;
        for _ in 0..slot_count {
            let slot_index = input.read_index(data.slots.len(), "deform slot")?;
            let attachment_count = input.read_count()?;
            for _ in 0..attachment_count {
                let attachment_name = input.read_required_string_ref("deform attachment")?;
                let unknown = || Error::UnknownAttachment {
                    context: format!("animation '{}'", animation.name),
                    skin: skin_name.clone(),
                    slot: data.slots[slot_index].name.clone(),
                    attachment: attachment_name.clone(),
                };
                let attachment = skin
                    .attachment(slot_index, &attachment_name)
                    .ok_or_else(unknown)?;
                let (Some(vertices), Some(id)) = (attachment.vertices(), attachment.id()) else {
                    return Err(unknown());
                };
                let setup_vertices = vertices.setup_deform();

                let frame_count = input.read_count()?;
                let mut frames = Vec::with_capacity(frame_count.min(input.bytes.len()));
                for i in 0..frame_count {
                    let time = input.read_f32()?;
                    let end = input.read_count()?;
                    let values = if end == 0 {
                        None
                    } else {
                        let start = input.read_count()?;
                        let raw = input.read_floats(end, 1.0)?;
                        let full = expand_deform(vertices, &setup_vertices, start, &raw, scale)
                            .map_err(|message| Error::InvalidVertexData {
                                skin: skin_name.clone(),
                                slot: data.slots[slot_index].name.clone(),
                                attachment: attachment_name.clone(),
                                message,
                            })?;
                        Some(full)
                    };
                    frames.push(DeformFrame {
                        time,
                        vertices: values,
                        curve: input.read_curve(i, frame_count)?,
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

    let draw_order_count = input.read_count()?;
    if draw_order_count > 0 {
        let mut frames = Vec::with_capacity(draw_order_count.min(input.bytes.len()));
        for _ in 0..draw_order_count {
            let time = input.read_f32()?;
            let offset_count = input.read_count()?;
            let mut moves = Vec::with_capacity(offset_count.min(data.slots.len()));
            for _ in 0..offset_count {
                let slot = input.read_index(data.slots.len(), "draw order slot")?;
                moves.push((slot, input.read_varint(true)?));
            }
            let draw_order = expand_draw_order(&moves, data.slots.len()).map_err(|message| {
                Error::InvalidDrawOrder {
                    animation: animation.name.clone(),
                    message,
                }
            })?;
            frames.push(DrawOrderFrame {
                time,
                draw_order: Some(draw_order),
            });
        }
        animation.draw_order_timeline = Some(DrawOrderTimeline { frames });
    }

    let event_count = input.read_count()?;
    if event_count > 0 {
        let mut fired = Vec::with_capacity(event_count.min(input.bytes.len()));
        for _ in 0..event_count {
            let time = input.read_f32()?;
            let event_ref = &events[input.read_index(events.len(), "event")?];
            let event = data
                .event(&event_ref.name)
                .ok_or_else(|| parse_error(format!("event '{}' missing", event_ref.name)))?;
            let int_value = input.read_varint(false)?;
            let float_value = input.read_f32()?;
            let string = if input.read_bool()? {
                input.read_string()?.unwrap_or_default()
            } else {
                event.string.clone()
            };
            let (volume, balance) = if event_ref.has_audio {
                (input.read_f32()?, input.read_f32()?)
            } else {
                (event.volume, event.balance)
            };
            fired.push(Event {
                time,
                name: event.name.clone(),
                int_value,
                float_value,
                string,
                audio_path: event.audio_path.clone(),
                volume,
                balance,
            });
        }
        animation.event_timeline = Some(EventTimeline { events: fired });
    }

    Ok(animation)
}
