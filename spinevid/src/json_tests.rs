use crate::{
    AttachmentData, BlendMode, Error, MeshVertices, PositionMode, RotateMode, SkeletonData,
    SpacingMode, TransformMode,
};

fn assert_approx(actual: f32, expected: f32) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= 1.0e-5,
        "expected {expected}, got {actual} (diff {diff})"
    );
}

const MINIMAL: &str = r#"{
  "skeleton": { "spine": "3.8.99", "hash": "abc", "width": 120, "height": 80 },
  "bones": [
    { "name": "root" },
    { "name": "hip", "parent": "root", "x": 4, "y": 8, "rotation": 30, "transform": "noScale" }
  ],
  "slots": [
    { "name": "body", "bone": "hip", "attachment": "torso", "color": "ff000080", "blend": "additive" },
    { "name": "glow", "bone": "root", "dark": "102030" }
  ],
  "skins": [
    {
      "name": "default",
      "attachments": {
        "body": {
          "torso": { "x": 1 },
          "arm": { "type": "mesh", "path": "limbs/arm", "uvs": [0, 0, 1, 0, 1, 1], "triangles": [0, 1, 2], "vertices": [0, 0, 4, 0, 4, 4], "hull": 3 }
        }
      }
    }
  ]
}"#;

#[test]
fn loads_bones_slots_and_header() {
    let data = SkeletonData::from_json_str(MINIMAL).unwrap();
    assert_eq!(data.version, "3.8.99");
    assert_eq!(data.hash, "abc");
    assert_approx(data.width, 120.0);
    assert_approx(data.fps, 30.0);

    let hip = &data.bones[data.bone("hip").unwrap()];
    assert_eq!(hip.parent, Some(0));
    assert_approx(hip.x, 4.0);
    assert_approx(hip.rotation, 30.0);
    assert_approx(hip.scale_x, 1.0);
    assert_eq!(hip.transform_mode, TransformMode::NoScale);

    let body = &data.slots[0];
    assert_eq!(body.attachment.as_deref(), Some("torso"));
    assert_eq!(body.blend, BlendMode::Additive);
    assert_approx(body.color[0], 1.0);
    assert_approx(body.color[3], 128.0 / 255.0);
    assert!(body.dark_color.is_none());

    let glow = &data.slots[1];
    assert_eq!(glow.attachment, None);
    assert_eq!(glow.blend, BlendMode::Normal);
    let dark = glow.dark_color.unwrap();
    assert_approx(dark[0], 16.0 / 255.0);
}

#[test]
fn region_and_mesh_defaults() {
    let data = SkeletonData::from_json_str(MINIMAL).unwrap();
    let skin = data.default_skin().unwrap();

    let Some(AttachmentData::Region(torso)) = skin.attachment(0, "torso") else {
        panic!("torso should be a region");
    };
    assert_eq!(torso.path, "torso");
    assert_approx(torso.width, 32.0);
    assert_approx(torso.height, 32.0);
    assert_approx(torso.x, 1.0);
    assert_eq!(torso.color, [1.0; 4]);

    let Some(AttachmentData::Mesh(arm)) = skin.attachment(0, "arm") else {
        panic!("arm should be a mesh");
    };
    assert_eq!(arm.path, "limbs/arm");
    assert_eq!(arm.hull_length, 6);
    assert_eq!(arm.triangles, vec![0, 1, 2]);
    assert!(matches!(&arm.vertices, MeshVertices::Unweighted(v) if v.len() == 3));
    assert_eq!(arm.deform_id, arm.id);
}

#[test]
fn weighted_vertices_are_detected_by_length() {
    let json = r#"{
  "skeleton": { "spine": "3.8.99" },
  "bones": [ { "name": "root" }, { "name": "tip", "parent": "root" } ],
  "slots": [ { "name": "skin", "bone": "root" } ],
  "skins": [ { "name": "default", "attachments": { "skin": { "m": {
    "type": "mesh",
    "uvs": [0, 0, 1, 1],
    "triangles": [],
    "vertices": [1, 0, 2, 3, 1, 2, 0, 5, 6, 0.25, 1, 7, 8, 0.75]
  } } } } ]
}"#;
    let data = SkeletonData::from_json_str(json).unwrap();
    let Some(AttachmentData::Mesh(mesh)) = data.default_skin().unwrap().attachment(0, "m") else {
        panic!("expected mesh");
    };
    let MeshVertices::Weighted(weights) = &mesh.vertices else {
        panic!("expected weighted vertices");
    };
    assert_eq!(weights.len(), 2);
    assert_eq!(weights[0].len(), 1);
    assert_eq!(weights[1].len(), 2);
    assert_eq!(weights[1][1].bone, 1);
    assert_approx(weights[1][1].weight, 0.75);
}

#[test]
fn scale_applies_to_lengths_but_not_angles() {
    let data = SkeletonData::from_json_str_with_scale(MINIMAL, 0.5).unwrap();
    let hip = &data.bones[1];
    assert_approx(hip.x, 2.0);
    assert_approx(hip.y, 4.0);
    assert_approx(hip.rotation, 30.0);

    let skin = data.default_skin().unwrap();
    let Some(AttachmentData::Region(torso)) = skin.attachment(0, "torso") else {
        panic!("torso should be a region");
    };
    assert_approx(torso.width, 16.0);
    let Some(AttachmentData::Mesh(arm)) = skin.attachment(0, "arm") else {
        panic!("arm should be a mesh");
    };
    let MeshVertices::Unweighted(vertices) = &arm.vertices else {
        panic!("expected unweighted vertices");
    };
    assert_eq!(vertices[1], [2.0, 0.0]);
    // Texture coordinates are not positions.
    assert_eq!(arm.region_uvs[1], [1.0, 0.0]);
}

#[test]
fn rejects_other_spine_versions() {
    for version in ["4.0.64", "3.7.94", "3.8.75"] {
        let json = format!(r#"{{ "skeleton": {{ "spine": "{version}" }}, "bones": [] }}"#);
        let err = SkeletonData::from_json_str(&json).unwrap_err();
        assert!(
            matches!(err, Error::UnsupportedVersion { ref value } if value == version),
            "{version}: {err}"
        );
    }
}

#[test]
fn malformed_json_is_a_parse_error() {
    let err = SkeletonData::from_json_str("{ \"bones\": [").unwrap_err();
    assert!(matches!(err, Error::JsonParse { .. }));
}

#[test]
fn bone_references_are_validated() {
    let unknown = r#"{ "bones": [ { "name": "a", "parent": "ghost" } ] }"#;
    assert!(matches!(
        SkeletonData::from_json_str(unknown).unwrap_err(),
        Error::UnknownBoneParent { ref parent, .. } if parent == "ghost"
    ));

    let out_of_order = r#"{ "bones": [ { "name": "a", "parent": "b" }, { "name": "b" } ] }"#;
    assert!(matches!(
        SkeletonData::from_json_str(out_of_order).unwrap_err(),
        Error::BoneOrder { ref bone } if bone == "a"
    ));

    let slot = r#"{ "bones": [ { "name": "root" } ], "slots": [ { "name": "s", "bone": "nope" } ] }"#;
    assert!(matches!(
        SkeletonData::from_json_str(slot).unwrap_err(),
        Error::UnknownBone { ref bone, .. } if bone == "nope"
    ));
}

#[test]
fn mesh_triangles_must_index_vertices() {
    let json = r#"{
  "bones": [ { "name": "root" } ],
  "slots": [ { "name": "s", "bone": "root" } ],
  "skins": [ { "name": "default", "attachments": { "s": { "m": {
    "type": "mesh", "uvs": [0, 0, 1, 0, 1, 1], "triangles": [0, 1, 3], "vertices": [0, 0, 1, 0, 1, 1]
  } } } } ]
}"#;
    assert!(matches!(
        SkeletonData::from_json_str(json).unwrap_err(),
        Error::InvalidVertexData { ref attachment, .. } if attachment == "m"
    ));
}

#[test]
fn legacy_skin_map_is_accepted() {
    let json = r#"{
  "bones": [ { "name": "root" } ],
  "slots": [ { "name": "s", "bone": "root" } ],
  "skins": {
    "default": { "s": { "a": { "width": 2, "height": 2 } } },
    "red": { "s": { "a": { "width": 4, "height": 4 } } }
  }
}"#;
    let data = SkeletonData::from_json_str(json).unwrap();
    assert_eq!(data.skins.len(), 2);
    let Some(AttachmentData::Region(red)) = data.skin("red").unwrap().attachment(0, "a") else {
        panic!("expected region");
    };
    assert_approx(red.width, 4.0);
}

const LINKED: &str = r#"{
  "bones": [ { "name": "root" } ],
  "slots": [ { "name": "s", "bone": "root" } ],
  "skins": [
    {
      "name": "default",
      "attachments": { "s": {
        "base": { "type": "mesh", "uvs": [0, 0, 1, 0, 1, 1], "triangles": [0, 1, 2], "vertices": [0, 0, 5, 0, 5, 5], "hull": 3, "width": 10, "height": 12 }
      } }
    },
    {
      "name": "alt",
      "attachments": { "s": {
        "twin": { "type": "linkedmesh", "parent": "copy", "skin": "alt", "path": "twin-art" },
        "copy": { "type": "linkedmesh", "parent": "base", "deform": false }
      } }
    }
  ]
}"#;

#[test]
fn linked_meshes_copy_parent_geometry() {
    let data = SkeletonData::from_json_str(LINKED).unwrap();
    let Some(AttachmentData::Mesh(base)) = data.default_skin().unwrap().attachment(0, "base")
    else {
        panic!("expected base mesh");
    };
    let alt = data.skin("alt").unwrap();
    let Some(AttachmentData::Mesh(copy)) = alt.attachment(0, "copy") else {
        panic!("expected copy mesh");
    };
    let Some(AttachmentData::Mesh(twin)) = alt.attachment(0, "twin") else {
        panic!("expected twin mesh");
    };

    assert_eq!(copy.triangles, base.triangles);
    assert_eq!(copy.vertices, base.vertices);
    assert_approx(copy.width, 10.0);
    assert_eq!(copy.parent_mesh.as_deref(), Some("base"));
    // `deform: false` keeps its own deform identity.
    assert_eq!(copy.deform_id, copy.id);

    // A linked mesh whose parent is another linked mesh resolves in a later pass.
    assert_eq!(twin.vertices, base.vertices);
    assert_eq!(twin.path, "twin-art");
    assert_eq!(twin.deform_id, copy.id);
}

#[test]
fn linked_mesh_without_parent_fails() {
    let json = r#"{
  "bones": [ { "name": "root" } ],
  "slots": [ { "name": "s", "bone": "root" } ],
  "skins": [ { "name": "default", "attachments": { "s": {
    "orphan": { "type": "linkedmesh", "parent": "missing" }
  } } } ]
}"#;
    assert!(matches!(
        SkeletonData::from_json_str(json).unwrap_err(),
        Error::LinkedMeshParent { ref parent, .. } if parent == "missing"
    ));
}

#[test]
fn constraint_defaults() {
    let json = r#"{
  "bones": [ { "name": "root" }, { "name": "a", "parent": "root" }, { "name": "b", "parent": "root" } ],
  "slots": [ { "name": "track", "bone": "root" } ],
  "ik": [ { "name": "ik", "bones": ["a"], "target": "b" } ],
  "transform": [ { "name": "tc", "bones": ["a"], "target": "b", "x": 3 } ],
  "path": [ { "name": "pc", "bones": ["a"], "target": "track", "position": 5, "spacing": 2 } ]
}"#;
    let data = SkeletonData::from_json_str_with_scale(json, 2.0).unwrap();

    let ik = &data.ik_constraints[0];
    assert_eq!(ik.bend_direction, 1);
    assert_approx(ik.mix, 1.0);
    assert!(!ik.stretch && !ik.compress);

    let tc = &data.transform_constraints[0];
    assert_approx(tc.rotate_mix, 1.0);
    assert_approx(tc.shear_mix, 1.0);
    assert_approx(tc.offset_x, 6.0);
    assert!(!tc.relative && !tc.local);

    let pc = &data.path_constraints[0];
    assert_eq!(pc.position_mode, PositionMode::Percent);
    assert_eq!(pc.spacing_mode, SpacingMode::Length);
    assert_eq!(pc.rotate_mode, RotateMode::Tangent);
    // Percent positions are not scaled, length spacing is.
    assert_approx(pc.position, 5.0);
    assert_approx(pc.spacing, 4.0);
    assert_approx(pc.translate_mix, 1.0);
}

#[test]
fn path_lengths_must_match_curve_count() {
    let json = r#"{
  "bones": [ { "name": "root" } ],
  "slots": [ { "name": "s", "bone": "root" } ],
  "skins": [ { "name": "default", "attachments": { "s": { "p": {
    "type": "path", "vertexCount": 6, "lengths": [1], "vertices": [0, 0, 1, 0, 2, 0, 3, 0, 4, 0, 5, 0]
  } } } } ]
}"#;
    assert!(matches!(
        SkeletonData::from_json_str(json).unwrap_err(),
        Error::InvalidVertexData { .. }
    ));
}

#[test]
fn animations_are_indexed_by_name() {
    let json = r#"{
  "bones": [ { "name": "root" } ],
  "animations": {
    "walk": { "bones": { "root": { "rotate": [ { "time": 0.5, "angle": 10 } ] } } },
    "idle": {}
  }
}"#;
    let data = SkeletonData::from_json_str(json).unwrap();
    let names: Vec<_> = data.animations.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["idle", "walk"]);
    let (index, walk) = data.animation("walk").unwrap();
    assert_eq!(index, 1);
    assert_approx(walk.duration, 0.5);
    assert_approx(data.animation("idle").unwrap().1.duration, 0.0);
    assert!(data.animation("run").is_none());
}

#[test]
fn animation_references_are_validated() {
    let json = r#"{
  "bones": [ { "name": "root" } ],
  "animations": { "a": { "events": [ { "time": 0, "name": "missing" } ] } }
}"#;
    assert!(matches!(
        SkeletonData::from_json_str(json).unwrap_err(),
        Error::UnknownEvent { ref event, .. } if event == "missing"
    ));

    let json = r#"{
  "bones": [ { "name": "root" } ],
  "animations": { "a": { "bones": { "ghost": { "rotate": [ { "angle": 1 } ] } } } }
}"#;
    assert!(matches!(
        SkeletonData::from_json_str(json).unwrap_err(),
        Error::UnknownBone { ref bone, .. } if bone == "ghost"
    ));
}

#[test]
fn invalid_color_is_reported() {
    let json = r#"{
  "bones": [ { "name": "root" } ],
  "slots": [ { "name": "s", "bone": "root", "color": "zz0000ff" } ]
}"#;
    assert!(matches!(
        SkeletonData::from_json_str(json).unwrap_err(),
        Error::InvalidColor { .. }
    ));
}
