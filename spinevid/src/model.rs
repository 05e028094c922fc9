use std::collections::HashMap;

#[derive(Clone, Debug)]
pub struct BoneData {
    pub name: String,
    pub parent: Option<usize>,
    pub length: f32,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub shear_x: f32,
    pub shear_y: f32,
    pub transform_mode: TransformMode,
    pub skin_required: bool,
    /// Editor-only display color.
    pub color: [f32; 4],
}

impl BoneData {
    pub(crate) fn named(name: impl Into<String>, parent: Option<usize>) -> Self {
        Self {
            name: name.into(),
            parent,
            length: 0.0,
            x: 0.0,
            y: 0.0,
            rotation: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            shear_x: 0.0,
            shear_y: 0.0,
            transform_mode: TransformMode::Normal,
            skin_required: false,
            color: [0.61, 0.61, 0.61, 1.0],
        }
    }
}

/// How a bone inherits its parent's world transform.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum TransformMode {
    #[default]
    Normal,
    OnlyTranslation,
    NoRotationOrReflection,
    NoScale,
    NoScaleOrReflection,
}

impl TransformMode {
    pub(crate) fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Normal),
            1 => Some(Self::OnlyTranslation),
            2 => Some(Self::NoRotationOrReflection),
            3 => Some(Self::NoScale),
            4 => Some(Self::NoScaleOrReflection),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SlotData {
    pub name: String,
    pub bone: usize,
    pub attachment: Option<String>,
    pub color: [f32; 4],
    pub dark_color: Option<[f32; 3]>,
    pub blend: BlendMode,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum BlendMode {
    #[default]
    Normal,
    Additive,
    Multiply,
    Screen,
}

impl BlendMode {
    pub(crate) fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Normal),
            1 => Some(Self::Additive),
            2 => Some(Self::Multiply),
            3 => Some(Self::Screen),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct IkConstraintData {
    pub name: String,
    pub order: i32,
    pub skin_required: bool,
    pub bones: Vec<usize>,
    pub target: usize,
    pub mix: f32,
    pub softness: f32,
    pub bend_direction: i32,
    pub compress: bool,
    pub stretch: bool,
    pub uniform: bool,
}

#[derive(Clone, Debug)]
pub struct TransformConstraintData {
    pub name: String,
    pub order: i32,
    pub skin_required: bool,
    pub bones: Vec<usize>,
    pub target: usize,
    pub rotate_mix: f32,
    pub translate_mix: f32,
    pub scale_mix: f32,
    pub shear_mix: f32,
    pub offset_rotation: f32,
    pub offset_x: f32,
    pub offset_y: f32,
    pub offset_scale_x: f32,
    pub offset_scale_y: f32,
    pub offset_shear_y: f32,
    pub relative: bool,
    pub local: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PositionMode {
    Fixed,
    Percent,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SpacingMode {
    Length,
    Fixed,
    Percent,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RotateMode {
    Tangent,
    Chain,
    ChainScale,
}

#[derive(Clone, Debug)]
pub struct PathConstraintData {
    pub name: String,
    pub order: i32,
    pub skin_required: bool,
    pub bones: Vec<usize>,
    /// Slot whose current attachment must be a path.
    pub target: usize,
    pub position_mode: PositionMode,
    pub spacing_mode: SpacingMode,
    pub rotate_mode: RotateMode,
    pub offset_rotation: f32,
    pub position: f32,
    pub spacing: f32,
    pub rotate_mix: f32,
    pub translate_mix: f32,
}

/// Process-unique identity of a vertex-bearing attachment. Deform timelines key on it.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct AttachmentId(pub u32);

#[derive(Clone, Debug, PartialEq)]
pub struct VertexWeight {
    pub bone: usize,
    pub x: f32,
    pub y: f32,
    pub weight: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum MeshVertices {
    Unweighted(Vec<[f32; 2]>),
    Weighted(Vec<Vec<VertexWeight>>),
}

impl MeshVertices {
    pub fn vertex_count(&self) -> usize {
        match self {
            MeshVertices::Unweighted(v) => v.len(),
            MeshVertices::Weighted(v) => v.len(),
        }
    }

    /// Length of a deform array: two floats per vertex, or per bone influence when weighted.
    pub fn deform_len(&self) -> usize {
        match self {
            MeshVertices::Unweighted(v) => v.len() * 2,
            MeshVertices::Weighted(v) => v.iter().map(|w| w.len() * 2).sum(),
        }
    }

    /// Deform values equivalent to no deform at all.
    pub fn setup_deform(&self) -> Vec<f32> {
        match self {
            MeshVertices::Unweighted(v) => v.iter().flat_map(|p| [p[0], p[1]]).collect(),
            MeshVertices::Weighted(_) => vec![0.0; self.deform_len()],
        }
    }

    pub fn is_weighted(&self) -> bool {
        matches!(self, MeshVertices::Weighted(_))
    }
}

#[derive(Clone, Debug)]
pub struct RegionAttachmentData {
    pub name: String,
    pub path: String,
    pub color: [f32; 4],
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Clone, Debug)]
pub struct MeshAttachmentData {
    pub id: AttachmentId,
    /// Deform timelines targeting this id apply to this mesh. Linked meshes that
    /// inherit deforms carry their parent's id here.
    pub deform_id: AttachmentId,
    pub name: String,
    pub path: String,
    pub color: [f32; 4],
    pub vertices: MeshVertices,
    pub region_uvs: Vec<[f32; 2]>,
    pub triangles: Vec<u16>,
    pub hull_length: usize,
    pub edges: Vec<u16>,
    pub width: f32,
    pub height: f32,
    pub parent_mesh: Option<String>,
}

#[derive(Clone, Debug)]
pub struct PointAttachmentData {
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub color: [f32; 4],
}

#[derive(Clone, Debug)]
pub struct PathAttachmentData {
    pub id: AttachmentId,
    pub name: String,
    pub vertices: MeshVertices,
    /// Cumulative curve lengths, one per bezier segment.
    pub lengths: Vec<f32>,
    pub closed: bool,
    pub constant_speed: bool,
    pub color: [f32; 4],
}

#[derive(Clone, Debug)]
pub struct BoundingBoxAttachmentData {
    pub id: AttachmentId,
    pub name: String,
    pub vertices: MeshVertices,
    pub color: [f32; 4],
}

#[derive(Clone, Debug)]
pub struct ClippingAttachmentData {
    pub id: AttachmentId,
    pub name: String,
    pub vertices: MeshVertices,
    pub end_slot: Option<usize>,
    pub color: [f32; 4],
}

#[derive(Clone, Debug)]
pub enum AttachmentData {
    Region(RegionAttachmentData),
    Mesh(MeshAttachmentData),
    Point(PointAttachmentData),
    Path(PathAttachmentData),
    BoundingBox(BoundingBoxAttachmentData),
    Clipping(ClippingAttachmentData),
}

impl AttachmentData {
    pub fn name(&self) -> &str {
        match self {
            AttachmentData::Region(a) => a.name.as_str(),
            AttachmentData::Mesh(a) => a.name.as_str(),
            AttachmentData::Point(a) => a.name.as_str(),
            AttachmentData::Path(a) => a.name.as_str(),
            AttachmentData::BoundingBox(a) => a.name.as_str(),
            AttachmentData::Clipping(a) => a.name.as_str(),
        }
    }

    pub fn color(&self) -> [f32; 4] {
        match self {
            AttachmentData::Region(a) => a.color,
            AttachmentData::Mesh(a) => a.color,
            AttachmentData::Point(a) => a.color,
            AttachmentData::Path(a) => a.color,
            AttachmentData::BoundingBox(a) => a.color,
            AttachmentData::Clipping(a) => a.color,
        }
    }

    pub fn vertices(&self) -> Option<&MeshVertices> {
        match self {
            AttachmentData::Mesh(a) => Some(&a.vertices),
            AttachmentData::Path(a) => Some(&a.vertices),
            AttachmentData::BoundingBox(a) => Some(&a.vertices),
            AttachmentData::Clipping(a) => Some(&a.vertices),
            AttachmentData::Region(_) | AttachmentData::Point(_) => None,
        }
    }

    pub fn id(&self) -> Option<AttachmentId> {
        match self {
            AttachmentData::Mesh(a) => Some(a.id),
            AttachmentData::Path(a) => Some(a.id),
            AttachmentData::BoundingBox(a) => Some(a.id),
            AttachmentData::Clipping(a) => Some(a.id),
            AttachmentData::Region(_) | AttachmentData::Point(_) => None,
        }
    }

    /// Identity a deform timeline must carry to affect this attachment.
    pub fn deform_id(&self) -> Option<AttachmentId> {
        match self {
            AttachmentData::Mesh(a) => Some(a.deform_id),
            other => other.id(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SkinData {
    pub name: String,
    pub attachments: Vec<HashMap<String, AttachmentData>>,
    pub bones: Vec<usize>,
    pub ik_constraints: Vec<usize>,
    pub transform_constraints: Vec<usize>,
    pub path_constraints: Vec<usize>,
}

impl SkinData {
    pub(crate) fn new(name: impl Into<String>, slot_count: usize) -> Self {
        Self {
            name: name.into(),
            attachments: vec![HashMap::new(); slot_count],
            bones: Vec::new(),
            ik_constraints: Vec::new(),
            transform_constraints: Vec::new(),
            path_constraints: Vec::new(),
        }
    }

    pub fn attachment(&self, slot_index: usize, attachment_name: &str) -> Option<&AttachmentData> {
        self.attachments
            .get(slot_index)
            .and_then(|slot_map| slot_map.get(attachment_name))
    }
}

#[derive(Clone, Debug)]
pub struct EventData {
    pub name: String,
    pub int_value: i32,
    pub float_value: f32,
    pub string: String,
    pub audio_path: String,
    pub volume: f32,
    pub balance: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub time: f32,
    pub name: String,
    pub int_value: i32,
    pub float_value: f32,
    pub string: String,
    pub audio_path: String,
    pub volume: f32,
    pub balance: f32,
}

/// Samples per precomputed bezier segment.
pub const BEZIER_SEGMENTS: usize = 9;

/// Bezier easing between two keys, precomputed into a polyline the way Spine 3.8 runtimes do.
/// Points are in normalized segment space; the segment runs from (0, 0) to (1, 1).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BezierTable {
    pub points: [[f32; 2]; BEZIER_SEGMENTS],
}

impl BezierTable {
    pub fn new(cx1: f32, cy1: f32, cx2: f32, cy2: f32) -> Self {
        let tmpx = (-cx1 * 2.0 + cx2) * 0.03;
        let tmpy = (-cy1 * 2.0 + cy2) * 0.03;
        let dddfx = ((cx1 - cx2) * 3.0 + 1.0) * 0.006;
        let dddfy = ((cy1 - cy2) * 3.0 + 1.0) * 0.006;
        let mut ddfx = tmpx * 2.0 + dddfx;
        let mut ddfy = tmpy * 2.0 + dddfy;
        let mut dfx = cx1 * 0.3 + tmpx + dddfx * 0.166_666_67;
        let mut dfy = cy1 * 0.3 + tmpy + dddfy * 0.166_666_67;

        let mut points = [[0.0; 2]; BEZIER_SEGMENTS];
        let (mut x, mut y) = (dfx, dfy);
        for point in points.iter_mut() {
            *point = [x, y];
            dfx += ddfx;
            dfy += ddfy;
            ddfx += dddfx;
            ddfy += dddfy;
            x += dfx;
            y += dfy;
        }
        Self { points }
    }

    pub fn percent(&self, percent: f32) -> f32 {
        for (i, &[x, y]) in self.points.iter().enumerate() {
            if x >= percent {
                if i == 0 {
                    return y * percent / x;
                }
                let [prev_x, prev_y] = self.points[i - 1];
                return prev_y + (y - prev_y) * (percent - prev_x) / (x - prev_x);
            }
        }
        let [x, y] = self.points[BEZIER_SEGMENTS - 1];
        y + (1.0 - y) * (percent - x) / (1.0 - x)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Default)]
pub enum Curve {
    #[default]
    Linear,
    Stepped,
    Bezier(BezierTable),
}

impl Curve {
    pub fn bezier(cx1: f32, cy1: f32, cx2: f32, cy2: f32) -> Self {
        Curve::Bezier(BezierTable::new(cx1, cy1, cx2, cy2))
    }

    /// Eased fraction of the way from this key to the next.
    pub fn percent(&self, percent: f32) -> f32 {
        let percent = percent.clamp(0.0, 1.0);
        match self {
            Curve::Linear => percent,
            Curve::Stepped => 0.0,
            Curve::Bezier(table) => table.percent(percent),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RotateFrame {
    pub time: f32,
    pub angle: f32,
    pub curve: Curve,
}

#[derive(Clone, Debug)]
pub struct RotateTimeline {
    pub bone_index: usize,
    pub frames: Vec<RotateFrame>,
}

#[derive(Clone, Debug)]
pub struct Vec2Frame {
    pub time: f32,
    pub x: f32,
    pub y: f32,
    pub curve: Curve,
}

#[derive(Clone, Debug)]
pub struct Vec2Timeline {
    pub bone_index: usize,
    pub frames: Vec<Vec2Frame>,
}

#[derive(Clone, Debug)]
pub enum BoneTimeline {
    Rotate(RotateTimeline),
    Translate(Vec2Timeline),
    Scale(Vec2Timeline),
    Shear(Vec2Timeline),
}

#[derive(Clone, Debug)]
pub struct AttachmentFrame {
    pub time: f32,
    pub name: Option<String>,
}

#[derive(Clone, Debug)]
pub struct AttachmentTimeline {
    pub slot_index: usize,
    pub frames: Vec<AttachmentFrame>,
}

#[derive(Clone, Debug)]
pub struct ColorFrame {
    pub time: f32,
    pub color: [f32; 4],
    pub curve: Curve,
}

#[derive(Clone, Debug)]
pub struct ColorTimeline {
    pub slot_index: usize,
    pub frames: Vec<ColorFrame>,
}

#[derive(Clone, Debug)]
pub struct TwoColorFrame {
    pub time: f32,
    pub light: [f32; 4],
    pub dark: [f32; 3],
    pub curve: Curve,
}

#[derive(Clone, Debug)]
pub struct TwoColorTimeline {
    pub slot_index: usize,
    pub frames: Vec<TwoColorFrame>,
}

#[derive(Clone, Debug)]
pub struct DeformFrame {
    pub time: f32,
    /// Full-length deform values; `None` keys the setup pose.
    pub vertices: Option<Vec<f32>>,
    pub curve: Curve,
}

#[derive(Clone, Debug)]
pub struct DeformTimeline {
    pub slot_index: usize,
    pub attachment: AttachmentId,
    /// Values a `None` frame stands for: setup positions, or zero offsets when weighted.
    pub setup_vertices: Vec<f32>,
    pub frames: Vec<DeformFrame>,
}

impl DeformTimeline {
    pub fn frame_vertices<'a>(&'a self, frame: &'a DeformFrame) -> &'a [f32] {
        frame.vertices.as_deref().unwrap_or(&self.setup_vertices)
    }
}

#[derive(Clone, Debug)]
pub struct DrawOrderFrame {
    pub time: f32,
    /// Setup slot index for each draw position; `None` restores setup order.
    pub draw_order: Option<Vec<usize>>,
}

#[derive(Clone, Debug)]
pub struct DrawOrderTimeline {
    pub frames: Vec<DrawOrderFrame>,
}

#[derive(Clone, Debug)]
pub struct EventTimeline {
    pub events: Vec<Event>,
}

#[derive(Clone, Debug)]
pub struct IkFrame {
    pub time: f32,
    pub mix: f32,
    pub softness: f32,
    pub bend_direction: i32,
    pub compress: bool,
    pub stretch: bool,
    pub curve: Curve,
}

#[derive(Clone, Debug)]
pub struct IkConstraintTimeline {
    pub constraint_index: usize,
    pub frames: Vec<IkFrame>,
}

#[derive(Clone, Debug)]
pub struct TransformFrame {
    pub time: f32,
    pub rotate_mix: f32,
    pub translate_mix: f32,
    pub scale_mix: f32,
    pub shear_mix: f32,
    pub curve: Curve,
}

#[derive(Clone, Debug)]
pub struct TransformConstraintTimeline {
    pub constraint_index: usize,
    pub frames: Vec<TransformFrame>,
}

#[derive(Clone, Debug)]
pub struct FloatFrame {
    pub time: f32,
    pub value: f32,
    pub curve: Curve,
}

#[derive(Clone, Debug)]
pub struct PathMixFrame {
    pub time: f32,
    pub rotate_mix: f32,
    pub translate_mix: f32,
    pub curve: Curve,
}

#[derive(Clone, Debug)]
pub enum PathConstraintTimeline {
    Position {
        constraint_index: usize,
        frames: Vec<FloatFrame>,
    },
    Spacing {
        constraint_index: usize,
        frames: Vec<FloatFrame>,
    },
    Mix {
        constraint_index: usize,
        frames: Vec<PathMixFrame>,
    },
}

#[derive(Clone, Debug, Default)]
pub struct Animation {
    pub name: String,
    pub duration: f32,
    pub bone_timelines: Vec<BoneTimeline>,
    pub attachment_timelines: Vec<AttachmentTimeline>,
    pub color_timelines: Vec<ColorTimeline>,
    pub two_color_timelines: Vec<TwoColorTimeline>,
    pub deform_timelines: Vec<DeformTimeline>,
    pub draw_order_timeline: Option<DrawOrderTimeline>,
    pub event_timeline: Option<EventTimeline>,
    pub ik_timelines: Vec<IkConstraintTimeline>,
    pub transform_timelines: Vec<TransformConstraintTimeline>,
    pub path_timelines: Vec<PathConstraintTimeline>,
}

impl Animation {
    /// Latest key time across all timelines.
    pub(crate) fn compute_duration(&self) -> f32 {
        fn last<T>(frames: &[T], time: impl Fn(&T) -> f32) -> f32 {
            frames.last().map(time).unwrap_or(0.0)
        }

        let mut duration = 0.0f32;
        for timeline in &self.bone_timelines {
            let t = match timeline {
                BoneTimeline::Rotate(t) => last(&t.frames, |f| f.time),
                BoneTimeline::Translate(t) | BoneTimeline::Scale(t) | BoneTimeline::Shear(t) => {
                    last(&t.frames, |f| f.time)
                }
            };
            duration = duration.max(t);
        }
        for t in &self.attachment_timelines {
            duration = duration.max(last(&t.frames, |f| f.time));
        }
        for t in &self.color_timelines {
            duration = duration.max(last(&t.frames, |f| f.time));
        }
        for t in &self.two_color_timelines {
            duration = duration.max(last(&t.frames, |f| f.time));
        }
        for t in &self.deform_timelines {
            duration = duration.max(last(&t.frames, |f| f.time));
        }
        if let Some(t) = &self.draw_order_timeline {
            duration = duration.max(last(&t.frames, |f| f.time));
        }
        if let Some(t) = &self.event_timeline {
            duration = duration.max(last(&t.events, |e| e.time));
        }
        for t in &self.ik_timelines {
            duration = duration.max(last(&t.frames, |f| f.time));
        }
        for t in &self.transform_timelines {
            duration = duration.max(last(&t.frames, |f| f.time));
        }
        for t in &self.path_timelines {
            let t = match t {
                PathConstraintTimeline::Position { frames, .. }
                | PathConstraintTimeline::Spacing { frames, .. } => last(frames, |f| f.time),
                PathConstraintTimeline::Mix { frames, .. } => last(frames, |f| f.time),
            };
            duration = duration.max(t);
        }
        duration
    }
}

#[derive(Clone, Debug, Default)]
pub struct SkeletonData {
    pub hash: String,
    pub version: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub fps: f32,
    pub images_path: String,
    pub audio_path: String,
    pub bones: Vec<BoneData>,
    pub slots: Vec<SlotData>,
    pub skins: HashMap<String, SkinData>,
    pub events: HashMap<String, EventData>,
    pub animations: Vec<Animation>,
    pub animation_index: HashMap<String, usize>,
    pub ik_constraints: Vec<IkConstraintData>,
    pub transform_constraints: Vec<TransformConstraintData>,
    pub path_constraints: Vec<PathConstraintData>,
}

impl SkeletonData {
    pub fn animation(&self, name: &str) -> Option<(usize, &Animation)> {
        let index = *self.animation_index.get(name)?;
        Some((index, &self.animations[index]))
    }

    pub fn skin(&self, name: &str) -> Option<&SkinData> {
        self.skins.get(name)
    }

    pub fn default_skin(&self) -> Option<&SkinData> {
        self.skins.get("default")
    }

    pub fn bone(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|b| b.name == name)
    }

    pub fn slot(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.name == name)
    }

    pub fn event(&self, name: &str) -> Option<&EventData> {
        self.events.get(name)
    }

    pub fn ik_constraint(&self, name: &str) -> Option<usize> {
        self.ik_constraints.iter().position(|c| c.name == name)
    }

    pub fn transform_constraint(&self, name: &str) -> Option<usize> {
        self.transform_constraints.iter().position(|c| c.name == name)
    }

    pub fn path_constraint(&self, name: &str) -> Option<usize> {
        self.path_constraints.iter().position(|c| c.name == name)
    }

    pub(crate) fn push_animation(&mut self, mut animation: Animation) {
        animation.duration = animation.compute_duration();
        self.animation_index
            .insert(animation.name.clone(), self.animations.len());
        self.animations.push(animation);
    }
}
