use crate::{
    AttachmentData, BlendMode, Curve, Error, MeshVertices, SkeletonData, TransformMode,
};

fn assert_approx(actual: f32, expected: f32) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= 1.0e-5,
        "expected {expected}, got {actual} (diff {diff})"
    );
}

/// Big-endian writer for the 3.8 `.skel` layout.
#[derive(Default)]
struct Skel {
    bytes: Vec<u8>,
}

impl Skel {
    fn u8(&mut self, value: u8) -> &mut Self {
        self.bytes.push(value);
        self
    }

    fn bool(&mut self, value: bool) -> &mut Self {
        self.u8(value as u8)
    }

    fn f32(&mut self, value: f32) -> &mut Self {
        self.bytes.extend_from_slice(&value.to_be_bytes());
        self
    }

    fn floats(&mut self, values: &[f32]) -> &mut Self {
        for &v in values {
            self.f32(v);
        }
        self
    }

    fn i32(&mut self, value: i32) -> &mut Self {
        self.bytes.extend_from_slice(&value.to_be_bytes());
        self
    }

    fn u16(&mut self, value: u16) -> &mut Self {
        self.bytes.extend_from_slice(&value.to_be_bytes());
        self
    }

    fn varint(&mut self, value: u32) -> &mut Self {
        let mut value = value;
        loop {
            let byte = (value & 0x7F) as u8;
            value >>= 7;
            if value == 0 {
                self.u8(byte);
                return self;
            }
            self.u8(byte | 0x80);
        }
    }

    fn signed(&mut self, value: i32) -> &mut Self {
        self.varint(((value << 1) ^ (value >> 31)) as u32)
    }

    fn string(&mut self, value: Option<&str>) -> &mut Self {
        match value {
            None => self.varint(0),
            Some(s) => {
                self.varint(s.len() as u32 + 1);
                self.bytes.extend_from_slice(s.as_bytes());
                self
            }
        }
    }

    fn color(&mut self, rgba: [u8; 4]) -> &mut Self {
        self.bytes.extend_from_slice(&rgba);
        self
    }

    fn header(&mut self, version: &str) -> &mut Self {
        self.string(Some("hash"))
            .string(Some(version))
            .floats(&[-5.0, -10.0, 100.0, 200.0])
            .bool(false)
    }

    /// rotation, x, y, scaleX, scaleY, shearX, shearY, length, transform mode, skin flag.
    fn bone(&mut self, name: &str, parent: Option<u32>, x: f32, mode: u32) -> &mut Self {
        self.string(Some(name));
        if let Some(parent) = parent {
            self.varint(parent);
        }
        self.floats(&[15.0, x, 2.0, 1.0, 1.0, 0.0, 0.0, 10.0])
            .varint(mode)
            .bool(false)
    }

    fn region(&mut self, key: u32, width: f32) -> &mut Self {
        self.varint(key)
            .varint(0)
            .u8(0)
            .varint(0)
            .floats(&[0.0, 1.0, 2.0, 1.0, 1.0, width, 16.0])
            .color([255, 255, 255, 255])
    }
}

// String table: 1 torso, 2 arm, 3 red, 4 step.
fn rig_bytes(version: &str) -> Vec<u8> {
    let mut skel = Skel::default();
    skel.header(version)
        .varint(4)
        .string(Some("torso"))
        .string(Some("arm"))
        .string(Some("red"))
        .string(Some("step"));

    skel.varint(2)
        .bone("root", None, 0.0, 0)
        .bone("hip", Some(0), 4.0, 3);

    skel.varint(1)
        .string(Some("body"))
        .varint(1)
        .color([255, 0, 0, 128])
        .i32(0x00102030)
        .varint(1)
        .varint(1);

    // No ik, transform or path constraints.
    skel.varint(0).varint(0).varint(0);

    // Default skin: slot 0 holds a region and a mesh.
    skel.varint(1).varint(0).varint(2).region(1, 32.0);
    skel.varint(2)
        .varint(0)
        .u8(2)
        .varint(0)
        .color([255, 255, 255, 255])
        .varint(3)
        .floats(&[0.0, 0.0, 1.0, 0.0, 1.0, 1.0])
        .varint(3)
        .u16(0)
        .u16(1)
        .u16(2)
        .bool(false)
        .floats(&[0.0, 0.0, 4.0, 0.0, 4.0, 4.0])
        .varint(3);

    // One named skin.
    skel.varint(1)
        .varint(3)
        .varint(0)
        .varint(0)
        .varint(0)
        .varint(0)
        .varint(1)
        .varint(0)
        .varint(1)
        .region(1, 64.0);

    // Events.
    skel.varint(1)
        .varint(4)
        .signed(3)
        .f32(0.5)
        .string(Some("hello"))
        .string(None);

    // Animations.
    skel.varint(1).string(Some("walk"));
    // Slot timelines: attachment keys.
    skel.varint(1)
        .varint(0)
        .varint(1)
        .u8(0)
        .varint(2)
        .f32(0.0)
        .varint(2)
        .f32(1.0)
        .varint(0);
    // Bone timelines: stepped rotation.
    skel.varint(1)
        .varint(1)
        .varint(1)
        .u8(0)
        .varint(2)
        .floats(&[0.0, 0.0])
        .u8(1)
        .floats(&[1.0, 90.0]);
    // No constraint timelines.
    skel.varint(0).varint(0).varint(0);
    // Deform: default skin, slot 0, "arm", one key moving vertex 1.
    skel.varint(1)
        .varint(0)
        .varint(1)
        .varint(0)
        .varint(1)
        .varint(2)
        .varint(1)
        .f32(0.5)
        .varint(2)
        .varint(2)
        .floats(&[1.0, 1.0]);
    // Draw order: none.
    skel.varint(0);
    // Events: one key overriding the int.
    skel.varint(1).f32(0.25).varint(0).signed(-5).f32(0.0).bool(false);

    skel.bytes
}

#[test]
fn loads_header_bones_and_slots() {
    let data = SkeletonData::from_skel_bytes(&rig_bytes("3.8.99")).unwrap();
    assert_eq!(data.hash, "hash");
    assert_eq!(data.version, "3.8.99");
    assert_approx(data.width, 100.0);
    assert_approx(data.fps, 30.0);

    assert_eq!(data.bones.len(), 2);
    let hip = &data.bones[1];
    assert_eq!(hip.name, "hip");
    assert_eq!(hip.parent, Some(0));
    assert_approx(hip.rotation, 15.0);
    assert_approx(hip.x, 4.0);
    assert_approx(hip.length, 10.0);
    assert_eq!(hip.transform_mode, TransformMode::NoScale);

    let slot = &data.slots[0];
    assert_eq!(slot.name, "body");
    assert_eq!(slot.bone, 1);
    assert_eq!(slot.attachment.as_deref(), Some("torso"));
    assert_eq!(slot.blend, BlendMode::Additive);
    assert_approx(slot.color[3], 128.0 / 255.0);
    let dark = slot.dark_color.unwrap();
    assert_approx(dark[0], 16.0 / 255.0);
    assert_approx(dark[2], 48.0 / 255.0);
}

#[test]
fn loads_skins_and_attachments() {
    let data = SkeletonData::from_skel_bytes(&rig_bytes("3.8.99")).unwrap();
    let default = data.default_skin().unwrap();

    let Some(AttachmentData::Region(torso)) = default.attachment(0, "torso") else {
        panic!("torso should be a region");
    };
    assert_eq!(torso.path, "torso");
    assert_approx(torso.width, 32.0);
    assert_approx(torso.x, 1.0);

    let Some(AttachmentData::Mesh(arm)) = default.attachment(0, "arm") else {
        panic!("arm should be a mesh");
    };
    assert_eq!(arm.triangles, vec![0, 1, 2]);
    assert_eq!(arm.hull_length, 6);
    assert_eq!(
        arm.vertices,
        MeshVertices::Unweighted(vec![[0.0, 0.0], [4.0, 0.0], [4.0, 4.0]])
    );

    let Some(AttachmentData::Region(red)) = data.skin("red").unwrap().attachment(0, "torso")
    else {
        panic!("red torso should be a region");
    };
    assert_approx(red.width, 64.0);
}

#[test]
fn loads_events_and_animation_timelines() {
    let data = SkeletonData::from_skel_bytes(&rig_bytes("3.8.99")).unwrap();
    let step = data.event("step").unwrap();
    assert_eq!(step.int_value, 3);
    assert_eq!(step.string, "hello");
    assert_approx(step.volume, 1.0);

    let (_, walk) = data.animation("walk").unwrap();
    assert_approx(walk.duration, 1.0);

    let attachments = &walk.attachment_timelines[0].frames;
    assert_eq!(attachments[0].name.as_deref(), Some("arm"));
    assert_eq!(attachments[1].name, None);

    let crate::BoneTimeline::Rotate(rotate) = &walk.bone_timelines[0] else {
        panic!("expected a rotate timeline");
    };
    assert_eq!(rotate.bone_index, 1);
    assert_eq!(rotate.frames[0].curve, Curve::Stepped);
    assert_approx(rotate.frames[1].angle, 90.0);

    let deform = &walk.deform_timelines[0];
    assert_eq!(
        deform.frames[0].vertices.as_deref(),
        Some(&[0.0, 0.0, 5.0, 1.0, 4.0, 4.0][..])
    );

    let events = &walk.event_timeline.as_ref().unwrap().events;
    assert_eq!(events[0].int_value, -5);
    assert_eq!(events[0].string, "hello");
    assert_approx(events[0].time, 0.25);
}

#[test]
fn scale_applies_to_positions() {
    let data = SkeletonData::from_skel_bytes_with_scale(&rig_bytes("3.8.99"), 2.0).unwrap();
    assert_approx(data.bones[1].x, 8.0);
    assert_approx(data.bones[1].rotation, 15.0);
    let (_, walk) = data.animation("walk").unwrap();
    let deform = walk.deform_timelines[0].frames[0].vertices.as_deref().unwrap();
    assert_approx(deform[2], 10.0);
}

#[test]
fn rejects_unsupported_versions() {
    for version in ["4.1.00", "3.8.75"] {
        let err = SkeletonData::from_skel_bytes(&rig_bytes(version)).unwrap_err();
        assert!(matches!(err, Error::UnsupportedVersion { .. }), "{err}");
    }
}

#[test]
fn truncated_input_is_a_parse_error() {
    let bytes = rig_bytes("3.8.99");
    for len in [0, 10, bytes.len() / 2, bytes.len() - 1] {
        let err = SkeletonData::from_skel_bytes(&bytes[..len]).unwrap_err();
        assert!(
            matches!(err, Error::BinaryParse { .. } | Error::UnsupportedVersion { .. }),
            "len {len}: {err}"
        );
    }
}

#[test]
fn out_of_range_bone_parent_is_rejected() {
    let mut skel = Skel::default();
    skel.header("3.8.99").varint(0);
    skel.varint(2).bone("root", None, 0.0, 0).bone("child", Some(5), 0.0, 0);
    let err = SkeletonData::from_skel_bytes(&skel.bytes).unwrap_err();
    assert!(matches!(err, Error::BinaryParse { ref message } if message.contains("parent bone")));
}
