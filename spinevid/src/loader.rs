//! Pieces shared by the JSON and binary skeleton loaders.

use crate::{AttachmentData, Error, MeshVertices, SkeletonData};
use std::collections::HashSet;

/// A linked mesh waiting for its parent, which may live in a skin read later.
#[derive(Clone, Debug)]
pub(crate) struct PendingLinkedMesh {
    pub skin: String,
    pub slot: usize,
    pub attachment: String,
    /// `None` means the default skin.
    pub parent_skin: Option<String>,
    pub parent: String,
    pub inherit_deform: bool,
}

/// Copies parent geometry into every linked mesh. Parents may themselves be linked meshes,
/// so resolution repeats until nothing is left or no progress is made.
pub(crate) fn resolve_linked_meshes(
    data: &mut SkeletonData,
    mut pending: Vec<PendingLinkedMesh>,
) -> Result<(), Error> {
    let mut unresolved: HashSet<(String, usize, String)> = pending
        .iter()
        .map(|l| (l.skin.clone(), l.slot, l.attachment.clone()))
        .collect();

    while !pending.is_empty() {
        let before = pending.len();
        let mut deferred = Vec::new();
        for link in pending {
            let parent_error = || Error::LinkedMeshParent {
                skin: link.skin.clone(),
                slot: data.slots[link.slot].name.clone(),
                attachment: link.attachment.clone(),
                parent: link.parent.clone(),
            };
            let parent_skin = link.parent_skin.as_deref().unwrap_or("default");
            let skin = data
                .skins
                .get(parent_skin)
                .ok_or_else(|| Error::UnknownSkinReference {
                    context: format!("linked mesh '{}'", link.attachment),
                    skin: parent_skin.to_string(),
                })?;
            let Some(AttachmentData::Mesh(parent)) = skin.attachment(link.slot, &link.parent)
            else {
                return Err(parent_error());
            };
            if unresolved.contains(&(parent_skin.to_string(), link.slot, link.parent.clone())) {
                deferred.push(link);
                continue;
            }
            let parent = parent.clone();
            let error = parent_error();

            let Some(AttachmentData::Mesh(mesh)) = data
                .skins
                .get_mut(&link.skin)
                .and_then(|s| s.attachments.get_mut(link.slot))
                .and_then(|slot| slot.get_mut(&link.attachment))
            else {
                return Err(error);
            };
            mesh.vertices = parent.vertices;
            mesh.region_uvs = parent.region_uvs;
            mesh.triangles = parent.triangles;
            mesh.hull_length = parent.hull_length;
            mesh.edges = parent.edges;
            mesh.width = parent.width;
            mesh.height = parent.height;
            if link.inherit_deform {
                mesh.deform_id = parent.id;
            }
            unresolved.remove(&(link.skin, link.slot, link.attachment));
        }
        if deferred.len() == before {
            // Every remaining mesh waits on another linked mesh.
            let link = &deferred[0];
            return Err(Error::LinkedMeshParent {
                skin: link.skin.clone(),
                slot: data.slots[link.slot].name.clone(),
                attachment: link.attachment.clone(),
                parent: link.parent.clone(),
            });
        }
        pending = deferred;
    }
    Ok(())
}

/// Expands `(slot, offset)` moves into a full permutation of setup slot indices; slots not
/// moved keep their relative setup order in the remaining positions.
pub(crate) fn expand_draw_order(
    offsets: &[(usize, i32)],
    slot_count: usize,
) -> Result<Vec<usize>, String> {
    let mut draw_order: Vec<Option<usize>> = vec![None; slot_count];
    let mut unchanged = Vec::with_capacity(slot_count.saturating_sub(offsets.len()));
    let mut original_index = 0usize;

    for &(slot, offset) in offsets {
        if slot < original_index || slot >= slot_count {
            return Err(format!("slot {slot} is out of order or out of range"));
        }
        unchanged.extend(original_index..slot);
        original_index = slot;
        let target = usize::try_from(original_index as i64 + offset as i64)
            .ok()
            .filter(|&t| t < slot_count)
            .ok_or_else(|| format!("offset {offset} moves slot {slot} out of range"))?;
        if draw_order[target].replace(original_index).is_some() {
            return Err(format!("two slots moved to position {target}"));
        }
        original_index += 1;
    }
    unchanged.extend(original_index..slot_count);

    for entry in draw_order.iter_mut().rev() {
        if entry.is_none() {
            *entry = unchanged.pop();
        }
    }
    draw_order
        .into_iter()
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| "positions left unfilled".to_string())
}

/// Builds one full-length deform key from a sparse run of values starting at `offset`.
/// Unweighted keys are stored as absolute positions, weighted keys as offsets.
pub(crate) fn expand_deform(
    vertices: &MeshVertices,
    setup: &[f32],
    offset: usize,
    values: &[f32],
    scale: f32,
) -> Result<Vec<f32>, String> {
    let len = vertices.deform_len();
    if offset + values.len() > len {
        return Err(format!(
            "deform values {offset}..{} exceed {len}",
            offset + values.len()
        ));
    }
    let mut full = vec![0.0f32; len];
    for (dst, v) in full[offset..].iter_mut().zip(values) {
        *dst = v * scale;
    }
    if !vertices.is_weighted() {
        for (dst, s) in full.iter_mut().zip(setup) {
            *dst += s;
        }
    }
    Ok(full)
}
