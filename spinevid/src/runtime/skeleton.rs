use crate::geometry::{Affine2, RAD_DEG, cos_deg, sin_deg};
use crate::{AttachmentData, MeshVertices, SkeletonData, TransformMode};
use std::sync::Arc;

/// Local transform values of a bone, either as posed or as applied.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LocalTransform {
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub shear_x: f32,
    pub shear_y: f32,
}

/// Where the skeleton sits in world space. Applied to root bones and, for the
/// non-`Normal` transform modes, re-applied to children.
#[derive(Copy, Clone, Debug, PartialEq)]
pub(crate) struct Placement {
    pub(crate) x: f32,
    pub(crate) y: f32,
    pub(crate) scale_x: f32,
    pub(crate) scale_y: f32,
}

#[derive(Clone, Debug)]
pub struct Bone {
    data_index: usize,
    parent: Option<usize>,
    pub(crate) children: Vec<usize>,

    pub transform_mode: TransformMode,
    pub active: bool,
    pub(crate) sorted: bool,

    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub shear_x: f32,
    pub shear_y: f32,

    pub ax: f32,
    pub ay: f32,
    pub arotation: f32,
    pub ascale_x: f32,
    pub ascale_y: f32,
    pub ashear_x: f32,
    pub ashear_y: f32,
    pub(crate) applied_valid: bool,

    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub world_x: f32,
    pub world_y: f32,
}

impl Bone {
    pub fn data_index(&self) -> usize {
        self.data_index
    }

    pub fn parent_index(&self) -> Option<usize> {
        self.parent
    }

    pub fn local(&self) -> LocalTransform {
        LocalTransform {
            x: self.x,
            y: self.y,
            rotation: self.rotation,
            scale_x: self.scale_x,
            scale_y: self.scale_y,
            shear_x: self.shear_x,
            shear_y: self.shear_y,
        }
    }

    pub fn applied(&self) -> LocalTransform {
        LocalTransform {
            x: self.ax,
            y: self.ay,
            rotation: self.arotation,
            scale_x: self.ascale_x,
            scale_y: self.ascale_y,
            shear_x: self.ashear_x,
            shear_y: self.ashear_y,
        }
    }

    pub(crate) fn set_applied(&mut self, t: LocalTransform) {
        self.ax = t.x;
        self.ay = t.y;
        self.arotation = t.rotation;
        self.ascale_x = t.scale_x;
        self.ascale_y = t.scale_y;
        self.ashear_x = t.shear_x;
        self.ashear_y = t.shear_y;
        self.applied_valid = true;
    }

    pub fn world_matrix(&self) -> Affine2 {
        Affine2 {
            a: self.a,
            b: self.b,
            c: self.c,
            d: self.d,
            x: self.world_x,
            y: self.world_y,
        }
    }

    pub fn world_rotation_x(&self) -> f32 {
        self.c.atan2(self.a) * RAD_DEG
    }

    pub fn world_rotation_y(&self) -> f32 {
        self.d.atan2(self.b) * RAD_DEG
    }

    pub fn world_scale_x(&self) -> f32 {
        (self.a * self.a + self.c * self.c).sqrt()
    }

    pub fn world_scale_y(&self) -> f32 {
        (self.b * self.b + self.d * self.d).sqrt()
    }

    pub fn local_to_world(&self, local: [f32; 2]) -> [f32; 2] {
        self.world_matrix().transform_point(local)
    }

    /// World point in this bone's local space. A collapsed bone maps everything to non-finite values.
    pub fn world_to_local(&self, world: [f32; 2]) -> [f32; 2] {
        self.world_matrix()
            .inverse_transform_point(world)
            .unwrap_or([f32::NAN, f32::NAN])
    }

    pub fn world_to_local_rotation(&self, world_rotation: f32) -> f32 {
        let sin = sin_deg(world_rotation);
        let cos = cos_deg(world_rotation);
        (self.a * sin - self.c * cos).atan2(self.d * cos - self.b * sin) * RAD_DEG + self.rotation
            - self.shear_x
    }

    pub fn local_to_world_rotation(&self, local_rotation: f32) -> f32 {
        let local_rotation = local_rotation - (self.rotation - self.shear_x);
        let sin = sin_deg(local_rotation);
        let cos = cos_deg(local_rotation);
        (cos * self.c + sin * self.d).atan2(cos * self.a + sin * self.b) * RAD_DEG
    }

    /// Rotates the world matrix in place; applied values become stale.
    pub fn rotate_world(&mut self, degrees: f32) {
        let (a, b, c, d) = (self.a, self.b, self.c, self.d);
        let cos = cos_deg(degrees);
        let sin = sin_deg(degrees);
        self.a = cos * a - sin * c;
        self.b = cos * b - sin * d;
        self.c = sin * a + cos * c;
        self.d = sin * b + cos * d;
        self.applied_valid = false;
    }

    fn set_to_setup_pose(&mut self, data: &crate::BoneData) {
        self.x = data.x;
        self.y = data.y;
        self.rotation = data.rotation;
        self.scale_x = data.scale_x;
        self.scale_y = data.scale_y;
        self.shear_x = data.shear_x;
        self.shear_y = data.shear_y;
        self.transform_mode = data.transform_mode;
    }

    /// Computes the world matrix from `local`, which also becomes the applied transform.
    pub(crate) fn update_world_transform_with(
        &mut self,
        parent: Option<&Affine2>,
        local: LocalTransform,
        placement: Placement,
    ) {
        self.set_applied(local);
        let LocalTransform {
            x,
            y,
            rotation,
            scale_x,
            scale_y,
            shear_x,
            shear_y,
        } = local;
        let (sx, sy) = (placement.scale_x, placement.scale_y);

        let Some(p) = parent else {
            let rotation_y = rotation + 90.0 + shear_y;
            self.a = cos_deg(rotation + shear_x) * scale_x * sx;
            self.b = cos_deg(rotation_y) * scale_y * sx;
            self.c = sin_deg(rotation + shear_x) * scale_x * sy;
            self.d = sin_deg(rotation_y) * scale_y * sy;
            self.world_x = x * sx + placement.x;
            self.world_y = y * sy + placement.y;
            return;
        };

        let (mut pa, mut pb, mut pc, mut pd) = (p.a, p.b, p.c, p.d);
        self.world_x = pa * x + pb * y + p.x;
        self.world_y = pc * x + pd * y + p.y;

        match self.transform_mode {
            TransformMode::Normal => {
                let rotation_y = rotation + 90.0 + shear_y;
                let la = cos_deg(rotation + shear_x) * scale_x;
                let lb = cos_deg(rotation_y) * scale_y;
                let lc = sin_deg(rotation + shear_x) * scale_x;
                let ld = sin_deg(rotation_y) * scale_y;
                self.a = pa * la + pb * lc;
                self.b = pa * lb + pb * ld;
                self.c = pc * la + pd * lc;
                self.d = pc * lb + pd * ld;
                return;
            }
            TransformMode::OnlyTranslation => {
                let rotation_y = rotation + 90.0 + shear_y;
                self.a = cos_deg(rotation + shear_x) * scale_x;
                self.b = cos_deg(rotation_y) * scale_y;
                self.c = sin_deg(rotation + shear_x) * scale_x;
                self.d = sin_deg(rotation_y) * scale_y;
            }
            TransformMode::NoRotationOrReflection => {
                let mut s = pa * pa + pc * pc;
                let prx;
                if s > 0.0001 {
                    s = (pa * pd - pb * pc).abs() / s;
                    pa /= sx;
                    pc /= sy;
                    pb = pc * s;
                    pd = pa * s;
                    prx = pc.atan2(pa) * RAD_DEG;
                } else {
                    pa = 0.0;
                    pc = 0.0;
                    prx = 90.0 - pd.atan2(pb) * RAD_DEG;
                }
                let rx = rotation + shear_x - prx;
                let ry = rotation + shear_y - prx + 90.0;
                let la = cos_deg(rx) * scale_x;
                let lb = cos_deg(ry) * scale_y;
                let lc = sin_deg(rx) * scale_x;
                let ld = sin_deg(ry) * scale_y;
                self.a = pa * la - pb * lc;
                self.b = pa * lb - pb * ld;
                self.c = pc * la + pd * lc;
                self.d = pc * lb + pd * ld;
            }
            TransformMode::NoScale | TransformMode::NoScaleOrReflection => {
                let cos = cos_deg(rotation);
                let sin = sin_deg(rotation);
                let mut za = (pa * cos + pb * sin) / sx;
                let mut zc = (pc * cos + pd * sin) / sy;
                let mut s = (za * za + zc * zc).sqrt();
                if s > 0.00001 {
                    s = 1.0 / s;
                }
                za *= s;
                zc *= s;
                s = (za * za + zc * zc).sqrt();
                if self.transform_mode == TransformMode::NoScale
                    && ((pa * pd - pb * pc < 0.0) != (sx < 0.0)) != (sy < 0.0)
                {
                    s = -s;
                }
                let r = std::f32::consts::FRAC_PI_2 + zc.atan2(za);
                let zb = r.cos() * s;
                let zd = r.sin() * s;
                let la = cos_deg(shear_x) * scale_x;
                let lb = cos_deg(90.0 + shear_y) * scale_y;
                let lc = sin_deg(shear_x) * scale_x;
                let ld = sin_deg(90.0 + shear_y) * scale_y;
                self.a = za * la + zb * lc;
                self.b = za * lb + zb * ld;
                self.c = zc * la + zd * lc;
                self.d = zc * lb + zd * ld;
            }
        }

        self.a *= sx;
        self.b *= sx;
        self.c *= sy;
        self.d *= sy;
    }

    /// Recovers applied local values from the world matrix. Some poses are ambiguous
    /// (a -1,-1 scale reads back as a 180 degree rotation).
    pub(crate) fn update_applied_transform(&mut self, parent: Option<&Affine2>) {
        self.applied_valid = true;
        let (a, b, c, d) = (self.a, self.b, self.c, self.d);
        let Some(p) = parent else {
            self.ax = self.world_x;
            self.ay = self.world_y;
            self.arotation = c.atan2(a) * RAD_DEG;
            self.ascale_x = (a * a + c * c).sqrt();
            self.ascale_y = (b * b + d * d).sqrt();
            self.ashear_x = 0.0;
            self.ashear_y = (a * b + c * d).atan2(a * d - b * c) * RAD_DEG;
            return;
        };

        let pid = 1.0 / (p.a * p.d - p.b * p.c);
        let dx = self.world_x - p.x;
        let dy = self.world_y - p.y;
        self.ax = dx * p.d * pid - dy * p.b * pid;
        self.ay = dy * p.a * pid - dx * p.c * pid;
        let ia = pid * p.d;
        let id = pid * p.a;
        let ib = pid * p.b;
        let ic = pid * p.c;
        let ra = ia * a - ib * c;
        let rb = ia * b - ib * d;
        let rc = id * c - ic * a;
        let rd = id * d - ic * b;
        self.ashear_x = 0.0;
        self.ascale_x = (ra * ra + rc * rc).sqrt();
        if self.ascale_x > 0.0001 {
            let det = ra * rd - rb * rc;
            self.ascale_y = det / self.ascale_x;
            self.ashear_y = (ra * rb + rc * rd).atan2(det) * RAD_DEG;
            self.arotation = rc.atan2(ra) * RAD_DEG;
        } else {
            self.ascale_x = 0.0;
            self.ascale_y = (rb * rb + rd * rd).sqrt();
            self.ashear_y = 0.0;
            self.arotation = 90.0 - rd.atan2(rb) * RAD_DEG;
        }
    }
}

#[derive(Clone, Debug)]
pub struct Slot {
    data_index: usize,
    pub bone: usize,
    attachment: Option<String>,
    /// Deform values for the current vertex attachment; empty means none.
    pub deform: Vec<f32>,
    pub color: [f32; 4],
    pub dark_color: Option<[f32; 3]>,
}

impl Slot {
    pub fn data_index(&self) -> usize {
        self.data_index
    }

    /// Skin key of the current attachment.
    pub fn attachment_name(&self) -> Option<&str> {
        self.attachment.as_deref()
    }

    /// Switches the attachment. A change of attachment drops any deform.
    pub fn set_attachment(&mut self, name: Option<&str>) {
        if self.attachment.as_deref() == name {
            return;
        }
        self.attachment = name.map(str::to_string);
        self.deform.clear();
    }

    fn set_to_setup_pose(&mut self, data: &crate::SlotData) {
        self.color = data.color;
        self.dark_color = data.dark_color;
        self.set_attachment(data.attachment.as_deref());
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum UpdateCacheItem {
    Bone(usize),
    Ik(usize),
    Transform(usize),
    Path(usize),
}

/// Posed instance of a `SkeletonData`.
#[derive(Clone, Debug)]
pub struct Skeleton {
    pub data: Arc<SkeletonData>,
    pub bones: Vec<Bone>,
    pub slots: Vec<Slot>,
    /// Slot indices in the order they are drawn.
    pub draw_order: Vec<usize>,
    pub ik_constraints: Vec<crate::IkConstraint>,
    pub transform_constraints: Vec<crate::TransformConstraint>,
    pub path_constraints: Vec<crate::PathConstraint>,
    skin: Option<String>,
    pub color: [f32; 4],
    pub x: f32,
    pub y: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub(crate) update_cache: Vec<UpdateCacheItem>,
    pub(crate) update_cache_reset: Vec<usize>,
}

impl Skeleton {
    pub fn new(data: Arc<SkeletonData>) -> Self {
        let mut bones: Vec<Bone> = data
            .bones
            .iter()
            .enumerate()
            .map(|(data_index, bone)| Bone {
                data_index,
                parent: bone.parent,
                children: Vec::new(),
                transform_mode: bone.transform_mode,
                active: !bone.skin_required,
                sorted: false,
                x: bone.x,
                y: bone.y,
                rotation: bone.rotation,
                scale_x: bone.scale_x,
                scale_y: bone.scale_y,
                shear_x: bone.shear_x,
                shear_y: bone.shear_y,
                ax: bone.x,
                ay: bone.y,
                arotation: bone.rotation,
                ascale_x: bone.scale_x,
                ascale_y: bone.scale_y,
                ashear_x: bone.shear_x,
                ashear_y: bone.shear_y,
                applied_valid: true,
                a: 1.0,
                b: 0.0,
                c: 0.0,
                d: 1.0,
                world_x: 0.0,
                world_y: 0.0,
            })
            .collect();
        for i in 0..bones.len() {
            if let Some(parent) = bones[i].parent {
                bones[parent].children.push(i);
            }
        }

        let slots = data
            .slots
            .iter()
            .enumerate()
            .map(|(data_index, slot)| Slot {
                data_index,
                bone: slot.bone,
                attachment: slot.attachment.clone(),
                deform: Vec::new(),
                color: slot.color,
                dark_color: slot.dark_color,
            })
            .collect::<Vec<_>>();

        let ik_constraints = (0..data.ik_constraints.len())
            .map(|i| crate::IkConstraint::new(&data, i))
            .collect();
        let transform_constraints = (0..data.transform_constraints.len())
            .map(|i| crate::TransformConstraint::new(&data, i))
            .collect();
        let path_constraints = (0..data.path_constraints.len())
            .map(|i| crate::PathConstraint::new(&data, i))
            .collect();

        let mut skeleton = Self {
            draw_order: (0..slots.len()).collect(),
            data,
            bones,
            slots,
            ik_constraints,
            transform_constraints,
            path_constraints,
            skin: None,
            color: [1.0, 1.0, 1.0, 1.0],
            x: 0.0,
            y: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            update_cache: Vec::new(),
            update_cache_reset: Vec::new(),
        };
        skeleton.update_cache();
        skeleton
    }

    pub(crate) fn placement(&self) -> Placement {
        Placement {
            x: self.x,
            y: self.y,
            scale_x: self.scale_x,
            scale_y: self.scale_y,
        }
    }

    pub fn skin_name(&self) -> Option<&str> {
        self.skin.as_deref()
    }

    /// Changes the active skin. Attachments resolve through the new skin, then the default skin.
    pub fn set_skin(&mut self, name: Option<&str>) -> Result<(), crate::Error> {
        if self.skin.as_deref() == name {
            return Ok(());
        }
        if let Some(name) = name {
            if self.data.skin(name).is_none() {
                return Err(crate::Error::UnknownSkin {
                    name: name.to_string(),
                });
            }
        }
        self.skin = name.map(str::to_string);
        self.update_cache();
        Ok(())
    }

    pub fn bone_index(&self, name: &str) -> Option<usize> {
        self.data.bone(name)
    }

    pub fn find_bone(&self, name: &str) -> Option<&Bone> {
        self.data.bone(name).map(|i| &self.bones[i])
    }

    pub fn slot_index(&self, name: &str) -> Option<usize> {
        self.data.slot(name)
    }

    /// Attachment `name` for a slot from the current skin, falling back to the default skin.
    pub fn attachment(&self, slot_index: usize, name: &str) -> Option<&AttachmentData> {
        if let Some(found) = self
            .skin
            .as_deref()
            .and_then(|s| self.data.skin(s))
            .and_then(|skin| skin.attachment(slot_index, name))
        {
            return Some(found);
        }
        self.data
            .default_skin()
            .and_then(|skin| skin.attachment(slot_index, name))
    }

    pub fn slot_attachment(&self, slot_index: usize) -> Option<&AttachmentData> {
        let name = self.slots.get(slot_index)?.attachment_name()?;
        self.attachment(slot_index, name)
    }

    pub fn set_to_setup_pose(&mut self) {
        self.set_bones_to_setup_pose();
        self.set_slots_to_setup_pose();
    }

    pub fn set_bones_to_setup_pose(&mut self) {
        let data = Arc::clone(&self.data);
        for (bone, bone_data) in self.bones.iter_mut().zip(&data.bones) {
            bone.set_to_setup_pose(bone_data);
        }
        for (c, c_data) in self.ik_constraints.iter_mut().zip(&data.ik_constraints) {
            c.mix = c_data.mix;
            c.softness = c_data.softness;
            c.bend_direction = c_data.bend_direction;
            c.compress = c_data.compress;
            c.stretch = c_data.stretch;
        }
        for (c, c_data) in self
            .transform_constraints
            .iter_mut()
            .zip(&data.transform_constraints)
        {
            c.rotate_mix = c_data.rotate_mix;
            c.translate_mix = c_data.translate_mix;
            c.scale_mix = c_data.scale_mix;
            c.shear_mix = c_data.shear_mix;
        }
        for (c, c_data) in self.path_constraints.iter_mut().zip(&data.path_constraints) {
            c.position = c_data.position;
            c.spacing = c_data.spacing;
            c.rotate_mix = c_data.rotate_mix;
            c.translate_mix = c_data.translate_mix;
        }
    }

    pub fn set_slots_to_setup_pose(&mut self) {
        let data = Arc::clone(&self.data);
        self.draw_order.clear();
        self.draw_order.extend(0..self.slots.len());
        for (slot, slot_data) in self.slots.iter_mut().zip(&data.slots) {
            slot.set_to_setup_pose(slot_data);
        }
    }

    /// Rebuilds the order in which bones and constraints are updated. Must run after the
    /// skin changes.
    pub fn update_cache(&mut self) {
        let data = Arc::clone(&self.data);
        self.update_cache.clear();
        self.update_cache_reset.clear();

        for (bone, bone_data) in self.bones.iter_mut().zip(&data.bones) {
            bone.sorted = bone_data.skin_required;
            bone.active = !bone.sorted;
        }
        let skin = self.skin.as_deref().and_then(|s| data.skin(s));
        if let Some(skin) = skin {
            for &index in &skin.bones {
                let mut current = Some(index);
                while let Some(i) = current {
                    self.bones[i].sorted = false;
                    self.bones[i].active = true;
                    current = self.bones[i].parent;
                }
            }
        }

        let mut constraints: Vec<(i32, UpdateCacheItem)> = Vec::new();
        constraints.extend(
            data.ik_constraints
                .iter()
                .enumerate()
                .map(|(i, c)| (c.order, UpdateCacheItem::Ik(i))),
        );
        constraints.extend(
            data.transform_constraints
                .iter()
                .enumerate()
                .map(|(i, c)| (c.order, UpdateCacheItem::Transform(i))),
        );
        constraints.extend(
            data.path_constraints
                .iter()
                .enumerate()
                .map(|(i, c)| (c.order, UpdateCacheItem::Path(i))),
        );
        // Stable: equal orders keep ik, transform, path precedence.
        constraints.sort_by_key(|(order, _)| *order);

        for (_, item) in constraints {
            match item {
                UpdateCacheItem::Ik(i) => self.sort_ik_constraint(i),
                UpdateCacheItem::Transform(i) => self.sort_transform_constraint(i),
                UpdateCacheItem::Path(i) => self.sort_path_constraint(i),
                UpdateCacheItem::Bone(_) => {}
            }
        }

        for i in 0..self.bones.len() {
            self.sort_bone(i);
        }
    }

    fn in_skin(&self, pick: impl Fn(&crate::SkinData) -> bool) -> bool {
        self.skin
            .as_deref()
            .and_then(|s| self.data.skin(s))
            .map(pick)
            .unwrap_or(false)
    }

    fn sort_ik_constraint(&mut self, index: usize) {
        let data = Arc::clone(&self.data);
        let c = &data.ik_constraints[index];
        let active = self.bones[c.target].active
            && (!c.skin_required || self.in_skin(|s| s.ik_constraints.contains(&index)));
        self.ik_constraints[index].active = active;
        if !active {
            return;
        }

        self.sort_bone(c.target);
        let Some(&parent) = c.bones.first() else {
            return;
        };
        self.sort_bone(parent);
        if c.bones.len() > 1 {
            let child = c.bones[c.bones.len() - 1];
            if !self.update_cache.contains(&UpdateCacheItem::Bone(child)) {
                self.update_cache_reset.push(child);
            }
        }
        self.update_cache.push(UpdateCacheItem::Ik(index));
        self.sort_reset_children(parent);
        if let Some(&last) = c.bones.last() {
            self.bones[last].sorted = true;
        }
    }

    fn sort_transform_constraint(&mut self, index: usize) {
        let data = Arc::clone(&self.data);
        let c = &data.transform_constraints[index];
        let active = self.bones[c.target].active
            && (!c.skin_required || self.in_skin(|s| s.transform_constraints.contains(&index)));
        self.transform_constraints[index].active = active;
        if !active {
            return;
        }

        self.sort_bone(c.target);
        if c.local {
            for &bone in &c.bones {
                if let Some(parent) = self.bones[bone].parent {
                    self.sort_bone(parent);
                }
                if !self.update_cache.contains(&UpdateCacheItem::Bone(bone)) {
                    self.update_cache_reset.push(bone);
                }
            }
        } else {
            for &bone in &c.bones {
                self.sort_bone(bone);
            }
        }
        self.update_cache.push(UpdateCacheItem::Transform(index));
        for &bone in &c.bones {
            self.sort_reset_children(bone);
        }
        for &bone in &c.bones {
            self.bones[bone].sorted = true;
        }
    }

    fn sort_path_constraint(&mut self, index: usize) {
        let data = Arc::clone(&self.data);
        let c = &data.path_constraints[index];
        let slot_bone = self.slots[c.target].bone;
        let active = self.bones[slot_bone].active
            && (!c.skin_required || self.in_skin(|s| s.path_constraints.contains(&index)));
        self.path_constraints[index].active = active;
        if !active {
            return;
        }

        let skin = self.skin.as_deref().and_then(|s| data.skin(s));
        if let Some(skin) = skin {
            self.sort_path_attachments_of_skin(skin, c.target, slot_bone);
        }
        if let Some(default_skin) = data.default_skin() {
            if skin.is_none_or(|s| s.name != default_skin.name) {
                self.sort_path_attachments_of_skin(default_skin, c.target, slot_bone);
            }
        }
        let current = match self.slot_attachment(c.target) {
            Some(AttachmentData::Path(path)) => Some(vertex_bones(&path.vertices)),
            _ => None,
        };
        if let Some(bones) = current {
            self.sort_path_attachment_bones(bones, slot_bone);
        }

        for &bone in &c.bones {
            self.sort_bone(bone);
        }
        self.update_cache.push(UpdateCacheItem::Path(index));
        for &bone in &c.bones {
            self.sort_reset_children(bone);
        }
        for &bone in &c.bones {
            self.bones[bone].sorted = true;
        }
    }

    fn sort_path_attachments_of_skin(
        &mut self,
        skin: &crate::SkinData,
        slot_index: usize,
        slot_bone: usize,
    ) {
        let Some(attachments) = skin.attachments.get(slot_index) else {
            return;
        };
        for attachment in attachments.values() {
            if let AttachmentData::Path(path) = attachment {
                self.sort_path_attachment_bones(vertex_bones(&path.vertices), slot_bone);
            }
        }
    }

    fn sort_path_attachment_bones(&mut self, bones: Option<Vec<usize>>, slot_bone: usize) {
        match bones {
            None => self.sort_bone(slot_bone),
            Some(bones) => {
                for bone in bones {
                    self.sort_bone(bone);
                }
            }
        }
    }

    fn sort_bone(&mut self, index: usize) {
        if self.bones[index].sorted {
            return;
        }
        if let Some(parent) = self.bones[index].parent {
            self.sort_bone(parent);
        }
        self.bones[index].sorted = true;
        self.update_cache.push(UpdateCacheItem::Bone(index));
    }

    fn sort_reset_children(&mut self, index: usize) {
        let children = self.bones[index].children.clone();
        for child in children {
            if !self.bones[child].active {
                continue;
            }
            if self.bones[child].sorted {
                self.sort_reset_children(child);
            }
            self.bones[child].sorted = false;
        }
    }

    pub(crate) fn parent_matrix(&self, bone: usize) -> Option<Affine2> {
        self.bones[bone]
            .parent
            .map(|p| self.bones[p].world_matrix())
    }

    /// Recomputes one bone's world matrix from the given local values.
    pub(crate) fn update_bone_world(&mut self, bone: usize, local: LocalTransform) {
        let parent = self.parent_matrix(bone);
        let placement = self.placement();
        self.bones[bone].update_world_transform_with(parent.as_ref(), local, placement);
    }

    pub(crate) fn ensure_applied(&mut self, bone: usize) {
        if !self.bones[bone].applied_valid {
            let parent = self.parent_matrix(bone);
            self.bones[bone].update_applied_transform(parent.as_ref());
        }
    }

    /// Poses every active bone in world space and runs constraints in update-cache order.
    pub fn update_world_transform(&mut self) {
        for i in 0..self.update_cache_reset.len() {
            let bone = self.update_cache_reset[i];
            let local = self.bones[bone].local();
            self.bones[bone].set_applied(local);
        }
        for i in 0..self.update_cache.len() {
            match self.update_cache[i] {
                UpdateCacheItem::Bone(bone) => {
                    let local = self.bones[bone].local();
                    self.update_bone_world(bone, local);
                }
                UpdateCacheItem::Ik(c) => self.apply_ik_constraint(c),
                UpdateCacheItem::Transform(c) => self.apply_transform_constraint(c),
                UpdateCacheItem::Path(c) => self.apply_path_constraint(c),
            }
        }
    }

    /// Re-poses a single bone subtree (`root` and its active descendants) without constraints.
    pub fn update_bone_subtree(&mut self, root: usize) {
        let mut stack = vec![root];
        while let Some(bone) = stack.pop() {
            if !self.bones[bone].active {
                continue;
            }
            let local = self.bones[bone].local();
            self.update_bone_world(bone, local);
            stack.extend(self.bones[bone].children.iter().rev().copied());
        }
    }

    /// World positions of a vertex attachment on `slot_index`, honouring the slot's deform.
    pub fn slot_world_vertices(&self, slot_index: usize) -> Option<Vec<[f32; 2]>> {
        let vertices = self.slot_attachment(slot_index)?.vertices()?;
        let mut out = Vec::with_capacity(vertices.vertex_count());
        self.compute_world_vertices(slot_index, vertices, 0, vertices.vertex_count(), &mut out);
        Some(out)
    }

    /// Appends world positions of vertices `start..start + count` to `out`.
    pub(crate) fn compute_world_vertices(
        &self,
        slot_index: usize,
        vertices: &MeshVertices,
        start: usize,
        count: usize,
        out: &mut Vec<[f32; 2]>,
    ) {
        let slot = &self.slots[slot_index];
        let deform = slot.deform.as_slice();
        match vertices {
            MeshVertices::Unweighted(points) => {
                let bone = &self.bones[slot.bone];
                let use_deform = deform.len() >= points.len() * 2;
                for i in start..(start + count).min(points.len()) {
                    let local = if use_deform {
                        [deform[i * 2], deform[i * 2 + 1]]
                    } else {
                        points[i]
                    };
                    out.push(bone.local_to_world(local));
                }
            }
            MeshVertices::Weighted(weights) => {
                let mut f: usize = weights[..start.min(weights.len())]
                    .iter()
                    .map(|w| w.len() * 2)
                    .sum();
                let use_deform = !deform.is_empty();
                for influences in weights.iter().skip(start).take(count) {
                    let mut wx = 0.0;
                    let mut wy = 0.0;
                    for influence in influences {
                        let bone = &self.bones[influence.bone];
                        let (mut vx, mut vy) = (influence.x, influence.y);
                        if use_deform {
                            vx += deform.get(f).copied().unwrap_or(0.0);
                            vy += deform.get(f + 1).copied().unwrap_or(0.0);
                        }
                        f += 2;
                        let [x, y] = bone.local_to_world([vx, vy]);
                        wx += x * influence.weight;
                        wy += y * influence.weight;
                    }
                    out.push([wx, wy]);
                }
            }
        }
    }
}

/// Bones a weighted vertex list depends on, or `None` when the list follows the slot bone.
fn vertex_bones(vertices: &MeshVertices) -> Option<Vec<usize>> {
    match vertices {
        MeshVertices::Unweighted(_) => None,
        MeshVertices::Weighted(weights) => Some(
            weights
                .iter()
                .flat_map(|w| w.iter().map(|i| i.bone))
                .collect(),
        ),
    }
}

impl crate::PointAttachmentData {
    pub fn compute_world_position(&self, bone: &Bone) -> [f32; 2] {
        bone.local_to_world([self.x, self.y])
    }

    pub fn compute_world_rotation(&self, bone: &Bone) -> f32 {
        let cos = cos_deg(self.rotation);
        let sin = sin_deg(self.rotation);
        let x = cos * bone.a + sin * bone.b;
        let y = cos * bone.c + sin * bone.d;
        y.atan2(x) * RAD_DEG
    }
}
