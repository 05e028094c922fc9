use crate::attachment::QUAD_TRIANGLES;
use crate::geometry::SkeletonClipper;
use crate::{Atlas, AtlasPage, AtlasRegion, AttachmentData, BlendMode, Error, Skeleton, Slot};

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Vertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
    pub color: [f32; 4],
    pub dark_color: [f32; 4],
}

/// A run of indices drawn with one texture page and blend state.
#[derive(Clone, Debug, PartialEq)]
pub struct Draw {
    pub texture_page: usize,
    pub blend: BlendMode,
    pub premultiplied_alpha: bool,
    pub first_index: usize,
    pub index_count: usize,
}

/// Renderer-agnostic triangles for one frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DrawList {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub draws: Vec<Draw>,
}

impl DrawList {
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.indices.clear();
        self.draws.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }

    /// Appends `other` after everything already drawn. Its texture pages are shifted by
    /// `page_offset` so lists built against different atlases can share one page table.
    pub fn append(&mut self, other: DrawList, page_offset: usize) {
        let base = self.vertices.len() as u32;
        let index_base = self.indices.len();
        self.vertices.extend(other.vertices);
        self.indices.extend(other.indices.iter().map(|&i| base + i));
        for draw in other.draws {
            self.push_draw(
                draw.texture_page + page_offset,
                draw.blend,
                draw.premultiplied_alpha,
                index_base + draw.first_index,
                draw.index_count,
            );
        }
    }

    fn push_draw(
        &mut self,
        texture_page: usize,
        blend: BlendMode,
        premultiplied_alpha: bool,
        first_index: usize,
        index_count: usize,
    ) {
        if let Some(last) = self.draws.last_mut() {
            if last.texture_page == texture_page
                && last.blend == blend
                && last.premultiplied_alpha == premultiplied_alpha
                && last.first_index + last.index_count == first_index
            {
                last.index_count += index_count;
                return;
            }
        }
        self.draws.push(Draw {
            texture_page,
            blend,
            premultiplied_alpha,
            first_index,
            index_count,
        });
    }

    fn append_indexed(
        &mut self,
        state: &DrawState,
        positions: &[[f32; 2]],
        uvs: &[[f32; 2]],
        indices: impl ExactSizeIterator<Item = u32>,
    ) {
        if positions.is_empty() || indices.len() == 0 {
            return;
        }
        let base = self.vertices.len() as u32;
        self.vertices
            .extend(positions.iter().zip(uvs).map(|(&position, &uv)| Vertex {
                position,
                uv,
                color: state.color,
                dark_color: state.dark_color,
            }));

        let first_index = self.indices.len();
        self.indices.extend(indices.map(|i| base + i));
        let index_count = self.indices.len() - first_index;
        self.push_draw(
            state.texture_page,
            state.blend,
            state.premultiplied_alpha,
            first_index,
            index_count,
        );
    }
}

/// Draws `skeleton` in draw order. Attachments whose region is missing from `atlas` are
/// skipped.
pub fn build_draw_list(skeleton: &Skeleton, atlas: &Atlas) -> DrawList {
    let mut out = DrawList::default();
    // Only the checked variant reports missing regions.
    let _ = append_draw_list(&mut out, skeleton, atlas, false);
    out
}

/// Like [`build_draw_list`], but a region or mesh without an atlas region is an error.
pub fn build_draw_list_checked(skeleton: &Skeleton, atlas: &Atlas) -> Result<DrawList, Error> {
    let mut out = DrawList::default();
    append_draw_list(&mut out, skeleton, atlas, true)?;
    Ok(out)
}

/// Per-attachment texture and color state.
struct DrawState {
    texture_page: usize,
    blend: BlendMode,
    premultiplied_alpha: bool,
    color: [f32; 4],
    dark_color: [f32; 4],
}

impl DrawState {
    fn new(
        skeleton: &Skeleton,
        slot: &Slot,
        region: &AtlasRegion,
        page: &AtlasPage,
        attachment_color: [f32; 4],
    ) -> Self {
        let premultiplied_alpha = page.pma;
        let light = multiply_rgba(multiply_rgba(skeleton.color, slot.color), attachment_color);
        Self {
            texture_page: region.page,
            blend: skeleton.data.slots[slot.data_index()].blend,
            premultiplied_alpha,
            color: apply_pma(light, premultiplied_alpha),
            dark_color: slot_dark_color_rgba(slot, premultiplied_alpha, light[3]),
        }
    }
}

fn append_draw_list(
    out: &mut DrawList,
    skeleton: &Skeleton,
    atlas: &Atlas,
    strict: bool,
) -> Result<(), Error> {
    let mut clipper = SkeletonClipper::default();
    let mut positions: Vec<[f32; 2]> = Vec::new();

    'slots: for &slot_index in &skeleton.draw_order {
        let slot = &skeleton.slots[slot_index];
        let bone_active = skeleton.bones[slot.bone].active;

        'slot: {
            if !bone_active {
                break 'slot;
            }
            let Some(attachment) = skeleton.slot_attachment(slot_index) else {
                break 'slot;
            };

            match attachment {
                AttachmentData::Clipping(clip) => {
                    positions.clear();
                    skeleton.compute_world_vertices(
                        slot_index,
                        &clip.vertices,
                        0,
                        clip.vertices.vertex_count(),
                        &mut positions,
                    );
                    clipper.clip_start(&positions, clip.end_slot);
                    // The clip must survive its own slot.
                    continue 'slots;
                }
                AttachmentData::Region(region) => {
                    if slot.color[3] <= 0.0 || region.color[3] <= 0.0 {
                        break 'slot;
                    }
                    let Some((atlas_region, page)) =
                        lookup(atlas, &region.name, &region.path, strict)?
                    else {
                        break 'slot;
                    };
                    let state = DrawState::new(skeleton, slot, atlas_region, page, region.color);
                    let offsets = region.compute_offsets(Some(atlas_region));
                    let world = region.compute_world_vertices(&skeleton.bones[slot.bone], &offsets);
                    let uvs = atlas_region.region_uvs(page);
                    emit(out, &mut clipper, &state, &world, &uvs, &QUAD_TRIANGLES);
                }
                AttachmentData::Mesh(mesh) => {
                    if slot.color[3] <= 0.0 || mesh.color[3] <= 0.0 {
                        break 'slot;
                    }
                    let Some((atlas_region, page)) =
                        lookup(atlas, &mesh.name, &mesh.path, strict)?
                    else {
                        break 'slot;
                    };
                    let state = DrawState::new(skeleton, slot, atlas_region, page, mesh.color);
                    positions.clear();
                    skeleton.compute_world_vertices(
                        slot_index,
                        &mesh.vertices,
                        0,
                        mesh.vertices.vertex_count(),
                        &mut positions,
                    );
                    let uvs: Vec<[f32; 2]> = mesh
                        .region_uvs
                        .iter()
                        .map(|&uv| atlas_region.mesh_uv(page, uv))
                        .collect();
                    if uvs.len() < positions.len() {
                        break 'slot;
                    }
                    emit(out, &mut clipper, &state, &positions, &uvs, &mesh.triangles);
                }
                AttachmentData::Point(_)
                | AttachmentData::Path(_)
                | AttachmentData::BoundingBox(_) => {}
            }
        }

        clipper.clip_end_with_slot(slot_index);
    }

    clipper.clip_end();
    Ok(())
}

fn lookup<'a>(
    atlas: &'a Atlas,
    attachment: &str,
    path: &str,
    strict: bool,
) -> Result<Option<(&'a AtlasRegion, &'a AtlasPage)>, Error> {
    match atlas.resolve(path) {
        Some(found) => Ok(Some(found)),
        None if strict => Err(Error::MissingAtlasRegion {
            attachment: attachment.to_string(),
            region: path.to_string(),
        }),
        None => Ok(None),
    }
}

fn emit(
    out: &mut DrawList,
    clipper: &mut SkeletonClipper,
    state: &DrawState,
    positions: &[[f32; 2]],
    uvs: &[[f32; 2]],
    triangles: &[u16],
) {
    if !clipper.is_clipping() {
        out.append_indexed(
            state,
            positions,
            uvs,
            triangles.iter().map(|&i| u32::from(i)),
        );
        return;
    }
    let clipped = clipper.clip_triangles(positions, uvs, triangles);
    out.append_indexed(
        state,
        &clipped.positions,
        &clipped.uvs,
        clipped.triangles.iter().copied(),
    );
}

fn apply_pma(mut color: [f32; 4], premultiplied_alpha: bool) -> [f32; 4] {
    if premultiplied_alpha {
        let a = color[3];
        color[0] *= a;
        color[1] *= a;
        color[2] *= a;
    }
    color
}

fn multiply_rgba(a: [f32; 4], b: [f32; 4]) -> [f32; 4] {
    [a[0] * b[0], a[1] * b[1], a[2] * b[2], a[3] * b[3]]
}

/// Dark tint for two-color tinting.
///
/// - No dark color: `(0,0,0,1)` so the shader's dark term is a no-op.
/// - PMA: rgb premultiplied by the final light alpha, `a = 1`.
/// - Straight alpha: rgb as is, `a = 0` (selects the straight-alpha formula).
fn slot_dark_color_rgba(slot: &Slot, premultiplied_alpha: bool, light_alpha: f32) -> [f32; 4] {
    let Some([r, g, b]) = slot.dark_color else {
        return [0.0, 0.0, 0.0, 1.0];
    };
    if premultiplied_alpha {
        [r * light_alpha, g * light_alpha, b * light_alpha, 1.0]
    } else {
        [r, g, b, 0.0]
    }
}
