//! Region and mesh geometry that depends on where an attachment's image was packed.

use crate::geometry::{cos_deg, sin_deg};
use crate::{AtlasPage, AtlasRegion, Bone, RegionAttachmentData};

/// Two triangles over a region quad in BL, UL, UR, BR order.
pub const QUAD_TRIANGLES: [u16; 6] = [0, 1, 2, 2, 3, 0];

impl RegionAttachmentData {
    /// Local corner offsets (BL, UL, UR, BR) after the attachment's own translation,
    /// rotation and scale. Whitespace stripped by the packer is put back using the region's
    /// original size and offsets; without a region the full `width x height` quad is used.
    pub fn compute_offsets(&self, region: Option<&AtlasRegion>) -> [[f32; 2]; 4] {
        let (local_x, local_y, local_x2, local_y2) = match region {
            Some(r) => {
                let region_scale_x = self.width / r.original_width.max(1) as f32 * self.scale_x;
                let region_scale_y = self.height / r.original_height.max(1) as f32 * self.scale_y;
                let local_x = -self.width * 0.5 * self.scale_x + r.offset_x as f32 * region_scale_x;
                let local_y =
                    -self.height * 0.5 * self.scale_y + r.offset_y as f32 * region_scale_y;
                (
                    local_x,
                    local_y,
                    local_x + r.width as f32 * region_scale_x,
                    local_y + r.height as f32 * region_scale_y,
                )
            }
            None => (
                -self.width * 0.5 * self.scale_x,
                -self.height * 0.5 * self.scale_y,
                self.width * 0.5 * self.scale_x,
                self.height * 0.5 * self.scale_y,
            ),
        };

        let cos = cos_deg(self.rotation);
        let sin = sin_deg(self.rotation);
        let local_x_cos = local_x * cos + self.x;
        let local_x_sin = local_x * sin;
        let local_y_cos = local_y * cos + self.y;
        let local_y_sin = local_y * sin;
        let local_x2_cos = local_x2 * cos + self.x;
        let local_x2_sin = local_x2 * sin;
        let local_y2_cos = local_y2 * cos + self.y;
        let local_y2_sin = local_y2 * sin;

        [
            [local_x_cos - local_y_sin, local_y_cos + local_x_sin],
            [local_x_cos - local_y2_sin, local_y2_cos + local_x_sin],
            [local_x2_cos - local_y2_sin, local_y2_cos + local_x2_sin],
            [local_x2_cos - local_y_sin, local_y_cos + local_x2_sin],
        ]
    }

    /// World positions of the four corners, in the order of `offsets`.
    pub fn compute_world_vertices(&self, bone: &Bone, offsets: &[[f32; 2]; 4]) -> [[f32; 2]; 4] {
        offsets.map(|p| bone.local_to_world(p))
    }
}

impl AtlasRegion {
    /// Page UVs for a region quad, matching [`RegionAttachmentData::compute_offsets`] order.
    /// A rotated region is stored turned 90 degrees on the page, so its axes swap.
    pub fn region_uvs(&self, page: &AtlasPage) -> [[f32; 2]; 4] {
        let [u, v, u2, v2] = self.uv_bounds(page);
        if self.rotated() {
            [[u2, v2], [u, v2], [u, v], [u2, v]]
        } else {
            [[u, v2], [u, v], [u2, v], [u2, v2]]
        }
    }

    /// Maps a mesh UV in normalized region space to page space, honouring the packing
    /// rotation and stripped whitespace.
    pub fn mesh_uv(&self, page: &AtlasPage, region_uv: [f32; 2]) -> [f32; 2] {
        let tex_w = page.width.max(1) as f32;
        let tex_h = page.height.max(1) as f32;

        let mut u = self.x as f32 / tex_w;
        let mut v = self.y as f32 / tex_h;

        let ow = self.original_width.max(1) as f32;
        let oh = self.original_height.max(1) as f32;
        let ox = self.offset_x as f32;
        let oy = self.offset_y as f32;
        let rw = self.width as f32;
        let rh = self.height as f32;
        let [ru, rv] = region_uv;

        match self.degrees {
            90 => {
                u -= (oh - oy - rh) / tex_w;
                v -= (ow - ox - rw) / tex_h;
                [u + rv * (oh / tex_w), v + (1.0 - ru) * (ow / tex_h)]
            }
            180 => {
                u -= (ow - ox - rw) / tex_w;
                v -= oy / tex_h;
                [u + (1.0 - ru) * (ow / tex_w), v + (1.0 - rv) * (oh / tex_h)]
            }
            270 => {
                u -= oy / tex_w;
                v -= ox / tex_h;
                [u + (1.0 - rv) * (oh / tex_w), v + ru * (ow / tex_h)]
            }
            _ => {
                u -= ox / tex_w;
                v -= (oh - oy - rh) / tex_h;
                [u + ru * (ow / tex_w), v + rv * (oh / tex_h)]
            }
        }
    }
}
