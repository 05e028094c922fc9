use super::skeleton::LocalTransform;
use crate::geometry::{Affine2, DEG_RAD, RAD_DEG, wrap_degrees};
use crate::{
    AttachmentData, PathAttachmentData, PositionMode, RotateMode, Skeleton, SkeletonData,
    SpacingMode, TransformMode,
};
use std::f32::consts::{PI, TAU};
use std::sync::Arc;

const PATH_EPSILON: f32 = 0.00001;

#[derive(Clone, Debug)]
pub struct IkConstraint {
    data_index: usize,
    pub bones: Vec<usize>,
    pub target: usize,
    pub mix: f32,
    pub softness: f32,
    pub bend_direction: i32,
    pub compress: bool,
    pub stretch: bool,
    pub active: bool,
}

impl IkConstraint {
    pub(crate) fn new(data: &SkeletonData, index: usize) -> Self {
        let c = &data.ik_constraints[index];
        Self {
            data_index: index,
            bones: c.bones.clone(),
            target: c.target,
            mix: c.mix,
            softness: c.softness,
            bend_direction: c.bend_direction,
            compress: c.compress,
            stretch: c.stretch,
            active: false,
        }
    }

    pub fn data_index(&self) -> usize {
        self.data_index
    }
}

#[derive(Clone, Debug)]
pub struct TransformConstraint {
    data_index: usize,
    pub bones: Vec<usize>,
    pub target: usize,
    pub rotate_mix: f32,
    pub translate_mix: f32,
    pub scale_mix: f32,
    pub shear_mix: f32,
    pub active: bool,
}

impl TransformConstraint {
    pub(crate) fn new(data: &SkeletonData, index: usize) -> Self {
        let c = &data.transform_constraints[index];
        Self {
            data_index: index,
            bones: c.bones.clone(),
            target: c.target,
            rotate_mix: c.rotate_mix,
            translate_mix: c.translate_mix,
            scale_mix: c.scale_mix,
            shear_mix: c.shear_mix,
            active: false,
        }
    }

    pub fn data_index(&self) -> usize {
        self.data_index
    }
}

#[derive(Clone, Debug)]
pub struct PathConstraint {
    data_index: usize,
    pub bones: Vec<usize>,
    /// Slot index.
    pub target: usize,
    pub position: f32,
    pub spacing: f32,
    pub rotate_mix: f32,
    pub translate_mix: f32,
    pub active: bool,
}

impl PathConstraint {
    pub(crate) fn new(data: &SkeletonData, index: usize) -> Self {
        let c = &data.path_constraints[index];
        Self {
            data_index: index,
            bones: c.bones.clone(),
            target: c.target,
            position: c.position,
            spacing: c.spacing,
            rotate_mix: c.rotate_mix,
            translate_mix: c.translate_mix,
            active: false,
        }
    }

    pub fn data_index(&self) -> usize {
        self.data_index
    }
}

fn wrap_radians(r: f32) -> f32 {
    if r > PI {
        r - TAU
    } else if r < -PI {
        r + TAU
    } else {
        r
    }
}

fn wrap_half_turn(degrees: f32) -> f32 {
    if degrees > 180.0 {
        degrees - 360.0
    } else if degrees < -180.0 {
        degrees + 360.0
    } else {
        degrees
    }
}

impl Skeleton {
    /// World frame a bone's local values are expressed in. Root bones live in the skeleton placement.
    fn parent_frame(&self, bone: usize) -> Affine2 {
        self.parent_matrix(bone).unwrap_or(Affine2 {
            a: self.scale_x,
            b: 0.0,
            c: 0.0,
            d: self.scale_y,
            x: self.x,
            y: self.y,
        })
    }

    pub(crate) fn apply_ik_constraint(&mut self, index: usize) {
        let c = &self.ik_constraints[index];
        if c.mix == 0.0 {
            return;
        }
        let uniform = self.data.ik_constraints[c.data_index].uniform;
        let target = &self.bones[c.target];
        let target_pos = [target.world_x, target.world_y];
        let (mix, softness, bend, compress, stretch) =
            (c.mix, c.softness, c.bend_direction, c.compress, c.stretch);
        let bones = c.bones.clone();

        match bones.as_slice() {
            &[bone] => self.ik_one_bone(bone, target_pos, compress, stretch, uniform, mix),
            &[parent, child] => {
                self.ik_two_bone(parent, child, target_pos, bend, stretch, softness, mix)
            }
            _ => {}
        }
    }

    fn ik_one_bone(
        &mut self,
        bone: usize,
        target: [f32; 2],
        compress: bool,
        stretch: bool,
        uniform: bool,
        alpha: f32,
    ) {
        self.ensure_applied(bone);
        let p = self.parent_frame(bone);
        let (sx_skel, sy_skel) = (self.scale_x, self.scale_y);
        let b = &self.bones[bone];
        let bone_length = self.data.bones[b.data_index()].length;

        let mut rotation_ik = -b.ashear_x - b.arotation;
        let (mut tx, mut ty);
        if b.transform_mode == TransformMode::OnlyTranslation {
            tx = target[0] - b.world_x;
            ty = target[1] - b.world_y;
        } else {
            let (pa, mut pb, pc, mut pd) = (p.a, p.b, p.c, p.d);
            if b.transform_mode == TransformMode::NoRotationOrReflection {
                let s = (pa * pd - pb * pc).abs() / (pa * pa + pc * pc);
                let sa = pa / sx_skel;
                let sc = pc / sy_skel;
                pb = -sc * s * sx_skel;
                pd = sa * s * sy_skel;
                rotation_ik += sc.atan2(sa) * RAD_DEG;
            }
            let x = target[0] - p.x;
            let y = target[1] - p.y;
            let d = pa * pd - pb * pc;
            tx = (x * pd - y * pb) / d - b.ax;
            ty = (y * pa - x * pc) / d - b.ay;
        }

        rotation_ik += ty.atan2(tx) * RAD_DEG;
        if b.ascale_x < 0.0 {
            rotation_ik += 180.0;
        }
        let rotation_ik = wrap_half_turn(rotation_ik);

        let mut sx = b.ascale_x;
        let mut sy = b.ascale_y;
        if compress || stretch {
            if matches!(
                b.transform_mode,
                TransformMode::NoScale | TransformMode::NoScaleOrReflection
            ) {
                tx = target[0] - b.world_x;
                ty = target[1] - b.world_y;
            }
            let len = bone_length * sx;
            let dd = (tx * tx + ty * ty).sqrt();
            if (compress && dd < len) || (stretch && dd > len && len > 0.0001) {
                let s = (dd / len - 1.0) * alpha + 1.0;
                sx *= s;
                if uniform {
                    sy *= s;
                }
            }
        }

        let local = LocalTransform {
            rotation: b.arotation + rotation_ik * alpha,
            scale_x: sx,
            scale_y: sy,
            ..b.applied()
        };
        self.update_bone_world(bone, local);
    }

    #[allow(clippy::too_many_arguments)]
    fn ik_two_bone(
        &mut self,
        parent: usize,
        child: usize,
        target: [f32; 2],
        bend_dir: i32,
        stretch: bool,
        softness: f32,
        alpha: f32,
    ) {
        self.ensure_applied(parent);
        self.ensure_applied(child);
        let bend = bend_dir as f32;
        let pb = self.bones[parent].clone();
        let cb = &self.bones[child];
        let child_applied = cb.applied();
        let child_length = self.data.bones[cb.data_index()].length;

        let (px, py) = (pb.ax, pb.ay);
        let mut psx = pb.ascale_x;
        let mut sx = psx;
        let mut psy = pb.ascale_y;
        let mut csx = child_applied.scale_x;
        let (os1, mut s2) = if psx < 0.0 {
            psx = -psx;
            (180.0, -1.0)
        } else {
            (0.0, 1.0)
        };
        if psy < 0.0 {
            psy = -psy;
            s2 = -s2;
        }
        let os2 = if csx < 0.0 {
            csx = -csx;
            180.0
        } else {
            0.0
        };

        let cx = child_applied.x;
        let u = (psx - psy).abs() <= 0.0001;
        let (cy, cwx, cwy) = if u {
            let cy = child_applied.y;
            (
                cy,
                pb.a * cx + pb.b * cy + pb.world_x,
                pb.c * cx + pb.d * cy + pb.world_y,
            )
        } else {
            (0.0, pb.a * cx + pb.world_x, pb.c * cx + pb.world_y)
        };

        let pp = self.parent_frame(parent);
        let (a, b, c, d) = (pp.a, pp.b, pp.c, pp.d);
        let id = 1.0 / (a * d - b * c);
        let x = cwx - pp.x;
        let y = cwy - pp.y;
        let dx = (x * d - y * b) * id - px;
        let dy = (y * a - x * c) * id - py;
        let l1 = (dx * dx + dy * dy).sqrt();
        let mut l2 = child_length * csx;

        if l1 < 0.0001 {
            self.ik_one_bone(parent, target, false, stretch, false, alpha);
            let local = LocalTransform {
                x: cx,
                y: cy,
                rotation: 0.0,
                ..child_applied
            };
            self.update_bone_world(child, local);
            return;
        }

        let x = target[0] - pp.x;
        let y = target[1] - pp.y;
        let mut tx = (x * d - y * b) * id - px;
        let mut ty = (y * a - x * c) * id - py;
        let mut dd = tx * tx + ty * ty;
        if softness != 0.0 {
            let softness = softness * psx * (csx + 1.0) / 2.0;
            let td = dd.sqrt();
            let sd = td - l1 - l2 * psx + softness;
            if sd > 0.0 {
                let mut p = (sd / (softness * 2.0)).min(1.0) - 1.0;
                p = (sd - softness * (1.0 - p * p)) / td;
                tx -= p * tx;
                ty -= p * ty;
                dd = tx * tx + ty * ty;
            }
        }

        let (a1, a2) = if u {
            l2 *= psx;
            let mut cos = (dd - l1 * l1 - l2 * l2) / (2.0 * l1 * l2);
            if cos < -1.0 {
                cos = -1.0;
            } else if cos > 1.0 {
                cos = 1.0;
                if stretch {
                    sx *= (dd.sqrt() / (l1 + l2) - 1.0) * alpha + 1.0;
                }
            }
            let a2 = cos.acos() * bend;
            let a = l1 + l2 * cos;
            let b = l2 * a2.sin();
            ((ty * a - tx * b).atan2(tx * a + ty * b), a2)
        } else {
            solve_non_uniform(l1, l2, psx, psy, tx, ty, dd, bend)
        };

        let os = cy.atan2(cx) * s2;
        let rotation = pb.arotation;
        let a1 = wrap_half_turn((a1 - os) * RAD_DEG + os1 - rotation);
        let parent_local = LocalTransform {
            x: px,
            y: py,
            rotation: rotation + a1 * alpha,
            scale_x: sx,
            scale_y: pb.ascale_y,
            shear_x: 0.0,
            shear_y: 0.0,
        };
        self.update_bone_world(parent, parent_local);

        let rotation = child_applied.rotation;
        let a2 = wrap_half_turn(((a2 + os) * RAD_DEG - child_applied.shear_x) * s2 + os2 - rotation);
        let child_local = LocalTransform {
            x: cx,
            y: cy,
            rotation: rotation + a2 * alpha,
            ..child_applied
        };
        self.update_bone_world(child, child_local);
    }

    pub(crate) fn apply_transform_constraint(&mut self, index: usize) {
        let data = Arc::clone(&self.data);
        let c = self.transform_constraints[index].clone();
        let cd = &data.transform_constraints[c.data_index];
        match (cd.local, cd.relative) {
            (false, false) => self.transform_absolute_world(&c, cd),
            (false, true) => self.transform_relative_world(&c, cd),
            (true, false) => self.transform_absolute_local(&c, cd),
            (true, true) => self.transform_relative_local(&c, cd),
        }
    }

    fn transform_absolute_world(
        &mut self,
        c: &TransformConstraint,
        cd: &crate::TransformConstraintData,
    ) {
        let t = self.bones[c.target].world_matrix();
        let reflect = if t.determinant() > 0.0 { DEG_RAD } else { -DEG_RAD };
        let offset_rotation = cd.offset_rotation * reflect;
        let offset_shear_y = cd.offset_shear_y * reflect;
        let target_origin = t.transform_point([cd.offset_x, cd.offset_y]);

        for &bi in &c.bones {
            let bone = &mut self.bones[bi];
            let mut modified = false;
            if c.rotate_mix != 0.0 {
                let (a, b, cc, d) = (bone.a, bone.b, bone.c, bone.d);
                let r = wrap_radians(t.c.atan2(t.a) - cc.atan2(a) + offset_rotation) * c.rotate_mix;
                let (sin, cos) = r.sin_cos();
                bone.a = cos * a - sin * cc;
                bone.b = cos * b - sin * d;
                bone.c = sin * a + cos * cc;
                bone.d = sin * b + cos * d;
                modified = true;
            }
            if c.translate_mix != 0.0 {
                bone.world_x += (target_origin[0] - bone.world_x) * c.translate_mix;
                bone.world_y += (target_origin[1] - bone.world_y) * c.translate_mix;
                modified = true;
            }
            if c.scale_mix > 0.0 {
                let mut s = (bone.a * bone.a + bone.c * bone.c).sqrt();
                if s != 0.0 {
                    s = (s + ((t.a * t.a + t.c * t.c).sqrt() - s + cd.offset_scale_x) * c.scale_mix)
                        / s;
                }
                bone.a *= s;
                bone.c *= s;
                let mut s = (bone.b * bone.b + bone.d * bone.d).sqrt();
                if s != 0.0 {
                    s = (s + ((t.b * t.b + t.d * t.d).sqrt() - s + cd.offset_scale_y) * c.scale_mix)
                        / s;
                }
                bone.b *= s;
                bone.d *= s;
                modified = true;
            }
            if c.shear_mix > 0.0 {
                let (b, d) = (bone.b, bone.d);
                let by = d.atan2(b);
                let r = wrap_radians(t.d.atan2(t.b) - t.c.atan2(t.a) - (by - bone.c.atan2(bone.a)));
                let r = by + (r + offset_shear_y) * c.shear_mix;
                let s = (b * b + d * d).sqrt();
                bone.b = r.cos() * s;
                bone.d = r.sin() * s;
                modified = true;
            }
            if modified {
                bone.applied_valid = false;
            }
        }
    }

    fn transform_relative_world(
        &mut self,
        c: &TransformConstraint,
        cd: &crate::TransformConstraintData,
    ) {
        let t = self.bones[c.target].world_matrix();
        let reflect = if t.determinant() > 0.0 { DEG_RAD } else { -DEG_RAD };
        let offset_rotation = cd.offset_rotation * reflect;
        let offset_shear_y = cd.offset_shear_y * reflect;
        let target_origin = t.transform_point([cd.offset_x, cd.offset_y]);

        for &bi in &c.bones {
            let bone = &mut self.bones[bi];
            let mut modified = false;
            if c.rotate_mix != 0.0 {
                let (a, b, cc, d) = (bone.a, bone.b, bone.c, bone.d);
                let r = wrap_radians(t.c.atan2(t.a) + offset_rotation) * c.rotate_mix;
                let (sin, cos) = r.sin_cos();
                bone.a = cos * a - sin * cc;
                bone.b = cos * b - sin * d;
                bone.c = sin * a + cos * cc;
                bone.d = sin * b + cos * d;
                modified = true;
            }
            if c.translate_mix != 0.0 {
                bone.world_x += target_origin[0] * c.translate_mix;
                bone.world_y += target_origin[1] * c.translate_mix;
                modified = true;
            }
            if c.scale_mix > 0.0 {
                let s = ((t.a * t.a + t.c * t.c).sqrt() - 1.0 + cd.offset_scale_x) * c.scale_mix + 1.0;
                bone.a *= s;
                bone.c *= s;
                let s = ((t.b * t.b + t.d * t.d).sqrt() - 1.0 + cd.offset_scale_y) * c.scale_mix + 1.0;
                bone.b *= s;
                bone.d *= s;
                modified = true;
            }
            if c.shear_mix > 0.0 {
                let r = wrap_radians(t.d.atan2(t.b) - t.c.atan2(t.a));
                let (b, d) = (bone.b, bone.d);
                let r = d.atan2(b) + (r - PI / 2.0 + offset_shear_y) * c.shear_mix;
                let s = (b * b + d * d).sqrt();
                bone.b = r.cos() * s;
                bone.d = r.sin() * s;
                modified = true;
            }
            if modified {
                bone.applied_valid = false;
            }
        }
    }

    fn transform_absolute_local(
        &mut self,
        c: &TransformConstraint,
        cd: &crate::TransformConstraintData,
    ) {
        self.ensure_applied(c.target);
        let target = self.bones[c.target].applied();
        for &bi in &c.bones {
            self.ensure_applied(bi);
            let mut local = self.bones[bi].applied();
            if c.rotate_mix != 0.0 {
                let r = wrap_degrees(target.rotation - local.rotation + cd.offset_rotation);
                local.rotation += r * c.rotate_mix;
            }
            if c.translate_mix != 0.0 {
                local.x += (target.x - local.x + cd.offset_x) * c.translate_mix;
                local.y += (target.y - local.y + cd.offset_y) * c.translate_mix;
            }
            if c.scale_mix != 0.0 {
                if local.scale_x != 0.0 {
                    local.scale_x = (local.scale_x
                        + (target.scale_x - local.scale_x + cd.offset_scale_x) * c.scale_mix)
                        / local.scale_x;
                }
                if local.scale_y != 0.0 {
                    local.scale_y = (local.scale_y
                        + (target.scale_y - local.scale_y + cd.offset_scale_y) * c.scale_mix)
                        / local.scale_y;
                }
            }
            if c.shear_mix != 0.0 {
                let r = wrap_degrees(target.shear_y - local.shear_y + cd.offset_shear_y);
                local.shear_y += r * c.shear_mix;
            }
            self.update_bone_world(bi, local);
        }
    }

    fn transform_relative_local(
        &mut self,
        c: &TransformConstraint,
        cd: &crate::TransformConstraintData,
    ) {
        self.ensure_applied(c.target);
        let target = self.bones[c.target].applied();
        for &bi in &c.bones {
            self.ensure_applied(bi);
            let mut local = self.bones[bi].applied();
            if c.rotate_mix != 0.0 {
                local.rotation += (target.rotation + cd.offset_rotation) * c.rotate_mix;
            }
            if c.translate_mix != 0.0 {
                local.x += (target.x + cd.offset_x) * c.translate_mix;
                local.y += (target.y + cd.offset_y) * c.translate_mix;
            }
            if c.scale_mix != 0.0 {
                local.scale_x *= (target.scale_x - 1.0 + cd.offset_scale_x) * c.scale_mix + 1.0;
                local.scale_y *= (target.scale_y - 1.0 + cd.offset_scale_y) * c.scale_mix + 1.0;
            }
            if c.shear_mix != 0.0 {
                local.shear_y += (target.shear_y + cd.offset_shear_y) * c.shear_mix;
            }
            self.update_bone_world(bi, local);
        }
    }

    pub(crate) fn apply_path_constraint(&mut self, index: usize) {
        let c = self.path_constraints[index].clone();
        let data = Arc::clone(&self.data);
        let cd = &data.path_constraints[c.data_index];
        let Some(name) = self.slots[c.target].attachment_name() else {
            return;
        };
        let path = match self.attachment(c.target, name) {
            Some(AttachmentData::Path(path)) => path.clone(),
            _ => return,
        };

        let translate = c.translate_mix > 0.0;
        let rotate = c.rotate_mix > 0.0;
        if !translate && !rotate {
            return;
        }

        let percent_spacing = cd.spacing_mode == SpacingMode::Percent;
        let tangents = cd.rotate_mode == RotateMode::Tangent;
        let scale = cd.rotate_mode == RotateMode::ChainScale;
        let bone_count = c.bones.len();
        let spaces_count = if tangents { bone_count } else { bone_count + 1 };

        let mut spaces = vec![0.0f32; spaces_count];
        let mut lengths = vec![0.0f32; if scale { bone_count } else { 0 }];
        if scale || !percent_spacing {
            let length_spacing = cd.spacing_mode == SpacingMode::Length;
            for i in 0..spaces_count.saturating_sub(1) {
                let bone = &self.bones[c.bones[i]];
                let setup_length = data.bones[bone.data_index()].length;
                if setup_length < PATH_EPSILON {
                    if scale {
                        lengths[i] = 0.0;
                    }
                    spaces[i + 1] = 0.0;
                } else if percent_spacing {
                    if scale {
                        let x = setup_length * bone.a;
                        let y = setup_length * bone.c;
                        lengths[i] = (x * x + y * y).sqrt();
                    }
                    spaces[i + 1] = c.spacing;
                } else {
                    let x = setup_length * bone.a;
                    let y = setup_length * bone.c;
                    let length = (x * x + y * y).sqrt();
                    if scale {
                        lengths[i] = length;
                    }
                    let space = if length_spacing {
                        setup_length + c.spacing
                    } else {
                        c.spacing
                    };
                    spaces[i + 1] = space * length / setup_length;
                }
            }
        } else {
            for space in spaces.iter_mut().skip(1) {
                *space = c.spacing;
            }
        }

        let positions = self.compute_path_positions(
            c.target,
            &path,
            c.position,
            &mut spaces,
            tangents,
            cd.position_mode == PositionMode::Percent,
            percent_spacing,
        );

        let [mut bone_x, mut bone_y, _] = positions[0];
        let mut offset_rotation = cd.offset_rotation;
        let tip;
        if offset_rotation == 0.0 {
            tip = cd.rotate_mode == RotateMode::Chain;
        } else {
            tip = false;
            let slot_bone = &self.bones[self.slots[c.target].bone];
            offset_rotation *= if slot_bone.world_matrix().determinant() > 0.0 {
                DEG_RAD
            } else {
                -DEG_RAD
            };
        }

        for (i, &bi) in c.bones.iter().enumerate() {
            let bone_length = data.bones[self.bones[bi].data_index()].length;
            let bone = &mut self.bones[bi];
            bone.world_x += (bone_x - bone.world_x) * c.translate_mix;
            bone.world_y += (bone_y - bone.world_y) * c.translate_mix;
            let [x, y, next_rotation] = positions[i + 1];
            let dx = x - bone_x;
            let dy = y - bone_y;
            if scale {
                let length = lengths[i];
                if length != 0.0 {
                    let s = ((dx * dx + dy * dy).sqrt() / length - 1.0) * c.rotate_mix + 1.0;
                    bone.a *= s;
                    bone.c *= s;
                }
            }
            bone_x = x;
            bone_y = y;
            if rotate {
                let (a, b, cc, d) = (bone.a, bone.b, bone.c, bone.d);
                let mut r = if tangents {
                    positions[i][2]
                } else if spaces[i + 1] == 0.0 {
                    next_rotation
                } else {
                    dy.atan2(dx)
                };
                r -= cc.atan2(a);
                if tip {
                    let (sin, cos) = r.sin_cos();
                    bone_x += (bone_length * (cos * a - sin * cc) - dx) * c.rotate_mix;
                    bone_y += (bone_length * (sin * a + cos * cc) - dy) * c.rotate_mix;
                } else {
                    r += offset_rotation;
                }
                let r = wrap_radians(r) * c.rotate_mix;
                let (sin, cos) = r.sin_cos();
                bone.a = cos * a - sin * cc;
                bone.b = cos * b - sin * d;
                bone.c = sin * a + cos * cc;
                bone.d = sin * b + cos * d;
            }
            bone.applied_valid = false;
        }
    }

    /// Samples `spaces.len()` positions along the path as `[x, y, rotation]`. One extra
    /// trailing entry is always present.
    #[allow(clippy::too_many_arguments)]
    fn compute_path_positions(
        &self,
        slot: usize,
        path: &PathAttachmentData,
        mut position: f32,
        spaces: &mut [f32],
        tangents: bool,
        percent_position: bool,
        percent_spacing: bool,
    ) -> Vec<[f32; 3]> {
        let spaces_count = spaces.len();
        let mut out = vec![[0.0f32; 3]; spaces_count + 1];
        let vertex_count = path.vertices.vertex_count();
        let closed = path.closed;
        let mut curve_count = vertex_count * 2 / 6;
        let mut world: Vec<[f32; 2]> = Vec::with_capacity(8);

        #[derive(PartialEq)]
        enum Loaded {
            Nothing,
            Before,
            After,
            Curve(usize),
        }
        let mut loaded = Loaded::Nothing;

        if !path.constant_speed {
            let lengths = &path.lengths;
            curve_count = curve_count.saturating_sub(if closed { 1 } else { 2 });
            let Some(&path_length) = lengths.get(curve_count) else {
                return out;
            };
            if percent_position {
                position *= path_length;
            }
            if percent_spacing {
                for space in spaces.iter_mut().skip(1) {
                    *space *= path_length;
                }
            }

            let mut curve = 0usize;
            for i in 0..spaces_count {
                let space = spaces[i];
                position += space;
                let mut p = position;

                if closed {
                    p %= path_length;
                    if p < 0.0 {
                        p += path_length;
                    }
                    curve = 0;
                } else if p < 0.0 {
                    if loaded != Loaded::Before {
                        loaded = Loaded::Before;
                        world.clear();
                        self.compute_world_vertices(slot, &path.vertices, 1, 2, &mut world);
                    }
                    out[i] = before_position(p, &world);
                    continue;
                } else if p > path_length {
                    if loaded != Loaded::After {
                        loaded = Loaded::After;
                        world.clear();
                        self.compute_world_vertices(
                            slot,
                            &path.vertices,
                            vertex_count.saturating_sub(3),
                            2,
                            &mut world,
                        );
                    }
                    out[i] = after_position(p - path_length, &world);
                    continue;
                }

                while curve + 1 < lengths.len() && p > lengths[curve] {
                    curve += 1;
                }
                let length = lengths[curve];
                p = if curve == 0 {
                    p / length
                } else {
                    let prev = lengths[curve - 1];
                    (p - prev) / (length - prev)
                };

                if loaded != Loaded::Curve(curve) {
                    loaded = Loaded::Curve(curve);
                    world.clear();
                    if closed && curve == curve_count {
                        self.compute_world_vertices(
                            slot,
                            &path.vertices,
                            vertex_count.saturating_sub(2),
                            2,
                            &mut world,
                        );
                        self.compute_world_vertices(slot, &path.vertices, 0, 2, &mut world);
                    } else {
                        self.compute_world_vertices(
                            slot,
                            &path.vertices,
                            curve * 3 + 1,
                            4,
                            &mut world,
                        );
                    }
                }
                if world.len() < 4 {
                    continue;
                }
                out[i] = curve_position(
                    p,
                    [world[0], world[1], world[2], world[3]],
                    tangents || (i > 0 && space == 0.0),
                );
            }
            return out;
        }

        // Constant speed: measure the curves in world space.
        if closed {
            self.compute_world_vertices(slot, &path.vertices, 1, vertex_count - 1, &mut world);
            self.compute_world_vertices(slot, &path.vertices, 0, 1, &mut world);
            if let Some(&first) = world.first() {
                world.push(first);
            }
        } else {
            curve_count = curve_count.saturating_sub(1);
            self.compute_world_vertices(
                slot,
                &path.vertices,
                1,
                vertex_count.saturating_sub(2),
                &mut world,
            );
        }
        if curve_count == 0 || world.len() < curve_count * 3 + 1 {
            return out;
        }

        let mut curves = vec![0.0f32; curve_count];
        let mut path_length = 0.0f32;
        for (i, curve_length) in curves.iter_mut().enumerate() {
            let w = i * 3;
            path_length += bezier_length(
                [world[w], world[w + 1], world[w + 2], world[w + 3]],
                0.1875,
                0.09375,
                0.75,
            );
            *curve_length = path_length;
        }

        if percent_position {
            position *= path_length;
        } else if let Some(&setup_length) = path.lengths.get(curve_count - 1) {
            if setup_length > 0.0 {
                position *= path_length / setup_length;
            }
        }
        if percent_spacing {
            for space in spaces.iter_mut().skip(1) {
                *space *= path_length;
            }
        }

        let mut segments = [0.0f32; 10];
        let mut curve_length = 0.0f32;
        let mut curve = 0usize;
        let mut segment = 0usize;
        let mut points = [[0.0f32; 2]; 4];
        for i in 0..spaces_count {
            let space = spaces[i];
            position += space;
            let mut p = position;

            if closed {
                p %= path_length;
                if p < 0.0 {
                    p += path_length;
                }
                curve = 0;
            } else if p < 0.0 {
                out[i] = before_position(p, &world);
                continue;
            } else if p > path_length {
                out[i] = after_position(p - path_length, &world[world.len() - 2..]);
                continue;
            }

            while curve + 1 < curves.len() && p > curves[curve] {
                curve += 1;
            }
            let length = curves[curve];
            p = if curve == 0 {
                p / length
            } else {
                let prev = curves[curve - 1];
                (p - prev) / (length - prev)
            };

            if loaded != Loaded::Curve(curve) {
                loaded = Loaded::Curve(curve);
                let w = curve * 3;
                points = [world[w], world[w + 1], world[w + 2], world[w + 3]];
                curve_length = bezier_segments(points, &mut segments);
                segment = 0;
            }

            p *= curve_length;
            while segment + 1 < segments.len() && p > segments[segment] {
                segment += 1;
            }
            let length = segments[segment];
            p = if segment == 0 {
                p / length
            } else {
                let prev = segments[segment - 1];
                segment as f32 + (p - prev) / (length - prev)
            };
            out[i] = curve_position(
                p * 0.1,
                points,
                tangents || (i > 0 && space == 0.0),
            );
        }
        out
    }
}

#[allow(clippy::too_many_arguments)]
fn solve_non_uniform(
    l1: f32,
    l2: f32,
    psx: f32,
    psy: f32,
    tx: f32,
    ty: f32,
    dd: f32,
    bend: f32,
) -> (f32, f32) {
    let a = psx * l2;
    let b = psy * l2;
    let aa = a * a;
    let bb = b * b;
    let ta = ty.atan2(tx);
    let c = bb * l1 * l1 + aa * dd - aa * bb;
    let c1 = -2.0 * bb * l1;
    let c2 = bb - aa;
    let d = c1 * c1 - 4.0 * c2 * c;
    if d >= 0.0 {
        let mut q = d.sqrt();
        if c1 < 0.0 {
            q = -q;
        }
        q = -(c1 + q) / 2.0;
        let r0 = q / c2;
        let r1 = c / q;
        let r = if r0.abs() < r1.abs() { r0 } else { r1 };
        if r * r <= dd {
            let y = (dd - r * r).sqrt() * bend;
            return (ta - y.atan2(r), (y / psy).atan2((r - l1) / psx));
        }
    }

    let mut min_angle = PI;
    let mut min_x = l1 - a;
    let mut min_dist = min_x * min_x;
    let mut min_y = 0.0;
    let mut max_angle = 0.0;
    let mut max_x = l1 + a;
    let mut max_dist = max_x * max_x;
    let mut max_y = 0.0;
    let c = -a * l1 / (aa - bb);
    if (-1.0..=1.0).contains(&c) {
        let c = c.acos();
        let x = a * c.cos() + l1;
        let y = b * c.sin();
        let d = x * x + y * y;
        if d < min_dist {
            min_angle = c;
            min_dist = d;
            min_x = x;
            min_y = y;
        }
        if d > max_dist {
            max_angle = c;
            max_dist = d;
            max_x = x;
            max_y = y;
        }
    }
    if dd <= (min_dist + max_dist) / 2.0 {
        (ta - (min_y * bend).atan2(min_x), min_angle * bend)
    } else {
        (ta - (max_y * bend).atan2(max_x), max_angle * bend)
    }
}

/// Position `p` units before the path start, along the first handle direction.
fn before_position(p: f32, world: &[[f32; 2]]) -> [f32; 3] {
    let [x1, y1] = world[0];
    let r = (world[1][1] - y1).atan2(world[1][0] - x1);
    [x1 + p * r.cos(), y1 + p * r.sin(), r]
}

/// Position `p` units past the path end, continuing the last handle direction.
fn after_position(p: f32, world: &[[f32; 2]]) -> [f32; 3] {
    let [x1, y1] = world[1];
    let r = (y1 - world[0][1]).atan2(x1 - world[0][0]);
    [x1 + p * r.cos(), y1 + p * r.sin(), r]
}

fn curve_position(p: f32, curve: [[f32; 2]; 4], tangents: bool) -> [f32; 3] {
    let [[x1, y1], [cx1, cy1], [cx2, cy2], [x2, y2]] = curve;
    if p < PATH_EPSILON || p.is_nan() {
        return [x1, y1, (cy1 - y1).atan2(cx1 - x1)];
    }
    let tt = p * p;
    let ttt = tt * p;
    let u = 1.0 - p;
    let uu = u * u;
    let uuu = uu * u;
    let ut = u * p;
    let ut3 = ut * 3.0;
    let uut3 = u * ut3;
    let utt3 = ut3 * p;
    let x = x1 * uuu + cx1 * uut3 + cx2 * utt3 + x2 * ttt;
    let y = y1 * uuu + cy1 * uut3 + cy2 * utt3 + y2 * ttt;
    let r = if !tangents {
        0.0
    } else if p < 0.001 {
        (cy1 - y1).atan2(cx1 - x1)
    } else {
        (y - (y1 * uu + cy1 * ut * 2.0 + cy2 * tt)).atan2(x - (x1 * uu + cx1 * ut * 2.0 + cx2 * tt))
    };
    [x, y, r]
}

/// Approximate arc length of a cubic bezier by forward differencing in four steps.
fn bezier_length(curve: [[f32; 2]; 4], k2: f32, k3: f32, k1: f32) -> f32 {
    let [[x1, y1], [cx1, cy1], [cx2, cy2], [x2, y2]] = curve;
    let tmpx = (x1 - cx1 * 2.0 + cx2) * k2;
    let tmpy = (y1 - cy1 * 2.0 + cy2) * k2;
    let dddfx = ((cx1 - cx2) * 3.0 - x1 + x2) * k3;
    let dddfy = ((cy1 - cy2) * 3.0 - y1 + y2) * k3;
    let mut ddfx = tmpx * 2.0 + dddfx;
    let mut ddfy = tmpy * 2.0 + dddfy;
    let mut dfx = (cx1 - x1) * k1 + tmpx + dddfx * 0.166_666_67;
    let mut dfy = (cy1 - y1) * k1 + tmpy + dddfy * 0.166_666_67;
    let mut length = (dfx * dfx + dfy * dfy).sqrt();
    dfx += ddfx;
    dfy += ddfy;
    ddfx += dddfx;
    ddfy += dddfy;
    length += (dfx * dfx + dfy * dfy).sqrt();
    dfx += ddfx;
    dfy += ddfy;
    length += (dfx * dfx + dfy * dfy).sqrt();
    dfx += ddfx + dddfx;
    dfy += ddfy + dddfy;
    length + (dfx * dfx + dfy * dfy).sqrt()
}

/// Cumulative lengths of ten equal-parameter steps along a cubic bezier.
fn bezier_segments(curve: [[f32; 2]; 4], segments: &mut [f32; 10]) -> f32 {
    let [[x1, y1], [cx1, cy1], [cx2, cy2], [x2, y2]] = curve;
    let tmpx = (x1 - cx1 * 2.0 + cx2) * 0.03;
    let tmpy = (y1 - cy1 * 2.0 + cy2) * 0.03;
    let dddfx = ((cx1 - cx2) * 3.0 - x1 + x2) * 0.006;
    let dddfy = ((cy1 - cy2) * 3.0 - y1 + y2) * 0.006;
    let mut ddfx = tmpx * 2.0 + dddfx;
    let mut ddfy = tmpy * 2.0 + dddfy;
    let mut dfx = (cx1 - x1) * 0.3 + tmpx + dddfx * 0.166_666_67;
    let mut dfy = (cy1 - y1) * 0.3 + tmpy + dddfy * 0.166_666_67;
    let mut length = (dfx * dfx + dfy * dfy).sqrt();
    segments[0] = length;
    for segment in segments.iter_mut().take(8).skip(1) {
        dfx += ddfx;
        dfy += ddfy;
        ddfx += dddfx;
        ddfy += dddfy;
        length += (dfx * dfx + dfy * dfy).sqrt();
        *segment = length;
    }
    dfx += ddfx;
    dfy += ddfy;
    length += (dfx * dfx + dfy * dfy).sqrt();
    segments[8] = length;
    dfx += ddfx + dddfx;
    dfy += ddfy + dddfy;
    length += (dfx * dfx + dfy * dfy).sqrt();
    segments[9] = length;
    length
}
