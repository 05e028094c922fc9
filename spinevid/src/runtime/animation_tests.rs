use crate::{Atlas, Event, MixBlend, Skeleton, SkeletonData, apply_animation, build_draw_list};
use std::sync::Arc;

fn assert_approx(actual: f32, expected: f32) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= 1.0e-3,
        "expected {expected}, got {actual} (diff {diff})"
    );
}

const RIG: &str = r#"{
  "skeleton": { "spine": "3.8.99", "fps": 30 },
  "bones": [
    { "name": "root" },
    { "name": "arm", "parent": "root", "length": 10 }
  ],
  "slots": [
    { "name": "back", "bone": "root", "attachment": "square" },
    { "name": "front", "bone": "arm", "attachment": "blob", "dark": "000000" }
  ],
  "skins": [
    {
      "name": "default",
      "attachments": {
        "back": {
          "square": { "width": 10, "height": 10 },
          "circle": { "width": 4, "height": 4 }
        },
        "front": {
          "blob": {
            "type": "mesh",
            "uvs": [0, 0, 1, 0, 1, 1],
            "triangles": [0, 1, 2],
            "vertices": [0, 0, 10, 0, 10, 10],
            "hull": 3
          }
        }
      }
    }
  ],
  "events": {
    "step": { "int": 1, "string": "left" },
    "boom": { "audio": "boom.ogg", "volume": 0.5 }
  },
  "animations": {
    "spin": {
      "bones": { "arm": { "rotate": [ { "angle": 170 }, { "time": 1, "angle": -170 } ] } }
    },
    "walk": {
      "bones": {
        "arm": {
          "translate": [ { "x": 0, "curve": "stepped" }, { "time": 1, "x": 10, "y": 20 } ]
        }
      },
      "slots": {
        "back": {
          "attachment": [ { "time": 0.5, "name": "circle" }, { "time": 1, "name": null } ]
        },
        "front": {
          "color": [ { "color": "ff0000ff" }, { "time": 1, "color": "0000ff00" } ]
        }
      },
      "deform": {
        "default": {
          "front": {
            "blob": [ { "time": 0 }, { "time": 1, "offset": 2, "vertices": [4, 4] } ]
          }
        }
      },
      "drawOrder": [
        { "time": 0.5, "offsets": [ { "slot": "back", "offset": 1 } ] },
        { "time": 1 }
      ],
      "events": [
        { "time": 0, "name": "step" },
        { "time": 0.5, "name": "step", "int": 2 },
        { "time": 1, "name": "boom", "volume": 0.25 }
      ]
    },
    "ease": {
      "bones": {
        "arm": {
          "translate": [
            { "x": 0, "curve": 0.75, "c2": 0, "c3": 1, "c4": 1 },
            { "time": 1, "x": 100 }
          ]
        }
      }
    },
    "keyed": {
      "bones": {
        "arm": {
          "translate": [
            { "x": 0, "curve": 0.25, "c2": 0, "c3": 0.75, "c4": 1 },
            { "time": 0.5, "x": 40, "curve": 0.25, "c2": 0, "c3": 0.75, "c4": 1 },
            { "time": 1, "x": 100 }
          ]
        }
      }
    },
    "tint": {
      "slots": {
        "front": {
          "twoColor": [
            { "light": "ffffffff", "dark": "000000" },
            { "time": 1, "light": "ffffff00", "dark": "ff8000" }
          ]
        }
      }
    }
  }
}"#;

fn rig() -> Arc<SkeletonData> {
    SkeletonData::from_json_str(RIG).unwrap()
}

fn pose_at(data: &Arc<SkeletonData>, animation: &str, time: f32) -> Skeleton {
    let mut skeleton = Skeleton::new(Arc::clone(data));
    let (_, animation) = data.animation(animation).unwrap();
    let mut events = Vec::new();
    apply_animation(
        animation,
        &mut skeleton,
        -1.0,
        time,
        false,
        &mut events,
        1.0,
        MixBlend::First,
    );
    skeleton
}

fn fire(
    data: &Arc<SkeletonData>,
    skeleton: &mut Skeleton,
    last: f32,
    time: f32,
    looped: bool,
) -> Vec<Event> {
    let (_, animation) = data.animation("walk").unwrap();
    let mut events = Vec::new();
    apply_animation(
        animation,
        skeleton,
        last,
        time,
        looped,
        &mut events,
        1.0,
        MixBlend::First,
    );
    events
}

#[test]
fn duration_is_the_last_key() {
    let data = rig();
    assert_approx(data.animation("walk").unwrap().1.duration, 1.0);
    assert_approx(data.animation("spin").unwrap().1.duration, 1.0);
}

#[test]
fn rotation_takes_the_short_way_around() {
    let data = rig();
    let arm = data.bone("arm").unwrap();
    assert_approx(pose_at(&data, "spin", 0.25).bones[arm].rotation, 175.0);
    assert_approx(pose_at(&data, "spin", 0.75).bones[arm].rotation, -175.0);
}

#[test]
fn stepped_curve_holds_until_the_next_key() {
    let data = rig();
    let arm = data.bone("arm").unwrap();
    let skeleton = pose_at(&data, "walk", 0.99);
    assert_approx(skeleton.bones[arm].x, 0.0);
    let skeleton = pose_at(&data, "walk", 1.0);
    assert_approx(skeleton.bones[arm].x, 10.0);
    assert_approx(skeleton.bones[arm].y, 20.0);
}

#[test]
fn bezier_curve_eases_between_keys() {
    let data = rig();
    let arm = data.bone("arm").unwrap();
    let x = pose_at(&data, "ease", 0.5).bones[arm].x;
    assert!(x > 0.0 && x < 50.0, "ease-in should lag linear, got {x}");
    let later = pose_at(&data, "ease", 0.75).bones[arm].x;
    assert!(later > x);
}

#[test]
fn bezier_curve_hits_key_values_exactly_at_key_times() {
    let data = rig();
    let arm = data.bone("arm").unwrap();
    assert_approx(pose_at(&data, "keyed", 0.0).bones[arm].x, 0.0);
    assert_approx(pose_at(&data, "keyed", 0.5).bones[arm].x, 40.0);
    assert_approx(pose_at(&data, "keyed", 1.0).bones[arm].x, 100.0);
    let between = pose_at(&data, "keyed", 0.75).bones[arm].x;
    assert!(between > 40.0 && between < 100.0, "got {between}");
}

const TURN_RIG: &str = r#"{
  "skeleton": { "spine": "3.8.99" },
  "bones": [
    { "name": "root" },
    { "name": "spinner", "parent": "root" }
  ],
  "slots": [ { "name": "card", "bone": "spinner", "attachment": "square" } ],
  "skins": [
    { "name": "default", "attachments": { "card": { "square": { "width": 2, "height": 2 } } } }
  ],
  "animations": {
    "turn": { "bones": { "spinner": { "rotate": [ { "angle": 0 }, { "time": 1, "angle": 90 } ] } } }
  }
}"#;

const TURN_ATLAS: &str = "
card.png
size: 16,16
format: RGBA8888
filter: Linear,Linear
repeat: none
square
  rotate: false
  xy: 0, 0
  size: 16, 16
  orig: 16, 16
  offset: 0, 0
  index: -1
";

#[test]
fn halfway_rotation_turns_region_corners() {
    let data = SkeletonData::from_json_str(TURN_RIG).unwrap();
    let spinner = data.bone("spinner").unwrap();
    let mut skeleton = pose_at(&data, "turn", 0.5);
    assert_approx(skeleton.bones[spinner].rotation, 45.0);

    skeleton.update_world_transform();
    let atlas = Atlas::parse(TURN_ATLAS).unwrap();
    let list = build_draw_list(&skeleton, &atlas);
    let diagonal = std::f32::consts::SQRT_2;
    let expected = [
        [0.0, -diagonal],
        [-diagonal, 0.0],
        [0.0, diagonal],
        [diagonal, 0.0],
    ];
    assert_eq!(list.vertices.len(), 4);
    for (vertex, corner) in list.vertices.iter().zip(expected) {
        assert_approx(vertex.position[0], corner[0]);
        assert_approx(vertex.position[1], corner[1]);
    }
}

#[test]
fn attachment_keys_hold_and_restore_setup_before_first_key() {
    let data = rig();
    let back = data.slot("back").unwrap();

    let mut skeleton = pose_at(&data, "walk", 0.75);
    assert_eq!(skeleton.slots[back].attachment_name(), Some("circle"));

    let (_, walk) = data.animation("walk").unwrap();
    let mut events = Vec::new();
    apply_animation(
        walk,
        &mut skeleton,
        -1.0,
        0.25,
        false,
        &mut events,
        1.0,
        MixBlend::First,
    );
    assert_eq!(skeleton.slots[back].attachment_name(), Some("square"));

    let skeleton = pose_at(&data, "walk", 1.0);
    assert_eq!(skeleton.slots[back].attachment_name(), None);
}

#[test]
fn color_interpolates_per_channel() {
    let data = rig();
    let front = data.slot("front").unwrap();
    let color = pose_at(&data, "walk", 0.5).slots[front].color;
    assert_approx(color[0], 0.5);
    assert_approx(color[1], 0.0);
    assert_approx(color[2], 0.5);
    assert_approx(color[3], 0.5);
}

#[test]
fn two_color_interpolates_light_and_dark() {
    let data = rig();
    let front = data.slot("front").unwrap();
    let slot = &pose_at(&data, "tint", 0.5).slots[front];
    assert_approx(slot.color[3], 0.5);
    let dark = slot.dark_color.unwrap();
    assert_approx(dark[0], 0.5);
    assert_approx(dark[1], 0.251);
    assert_approx(dark[2], 0.0);
}

#[test]
fn deform_interpolates_between_setup_and_key() {
    let data = rig();
    let front = data.slot("front").unwrap();
    let skeleton = pose_at(&data, "walk", 0.5);
    let deform = &skeleton.slots[front].deform;
    let expected = [0.0, 0.0, 12.0, 2.0, 10.0, 10.0];
    assert_eq!(deform.len(), expected.len());
    for (actual, expected) in deform.iter().zip(expected) {
        assert_approx(*actual, expected);
    }
}

#[test]
fn deform_only_applies_to_its_attachment() {
    let data = rig();
    let front = data.slot("front").unwrap();
    let mut skeleton = Skeleton::new(Arc::clone(&data));
    skeleton.slots[front].set_attachment(None);
    let (_, walk) = data.animation("walk").unwrap();
    let mut events = Vec::new();
    apply_animation(
        walk,
        &mut skeleton,
        -1.0,
        0.5,
        false,
        &mut events,
        1.0,
        MixBlend::First,
    );
    assert!(skeleton.slots[front].deform.is_empty());
}

#[test]
fn draw_order_holds_the_latest_key() {
    let data = rig();
    assert_eq!(pose_at(&data, "walk", 0.25).draw_order, vec![0, 1]);
    assert_eq!(pose_at(&data, "walk", 0.5).draw_order, vec![1, 0]);
    assert_eq!(pose_at(&data, "walk", 0.9).draw_order, vec![1, 0]);
    // A key without offsets restores setup order.
    assert_eq!(pose_at(&data, "walk", 1.0).draw_order, vec![0, 1]);
}

#[test]
fn events_fire_once_when_crossed() {
    let data = rig();
    let mut skeleton = Skeleton::new(Arc::clone(&data));

    let first = fire(&data, &mut skeleton, -1.0, 0.0, false);
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].int_value, 1);
    assert_eq!(first[0].string, "left");

    let second = fire(&data, &mut skeleton, 0.0, 0.6, false);
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].int_value, 2);

    assert!(fire(&data, &mut skeleton, 0.6, 0.9, false).is_empty());

    let last = fire(&data, &mut skeleton, 0.9, 1.0, false);
    assert_eq!(last.len(), 1);
    assert_eq!(last[0].name, "boom");
    assert_eq!(last[0].audio_path, "boom.ogg");
    assert_approx(last[0].volume, 0.25);
}

#[test]
fn events_fire_across_a_loop_wrap() {
    let data = rig();
    let mut skeleton = Skeleton::new(Arc::clone(&data));
    let fired = fire(&data, &mut skeleton, 0.9, 1.1, true);
    let names: Vec<_> = fired.iter().map(|e| (e.name.as_str(), e.time)).collect();
    assert_eq!(names, vec![("boom", 1.0), ("step", 0.0)]);
}

const IK_RIG: &str = r#"{
  "skeleton": { "spine": "3.8.99" },
  "bones": [
    { "name": "root" },
    { "name": "arm", "parent": "root", "length": 10 },
    { "name": "target", "parent": "root", "y": 10 }
  ],
  "ik": [ { "name": "aim", "bones": ["arm"], "target": "target" } ],
  "transform": [ { "name": "copy", "bones": ["arm"], "target": "target", "rotateMix": 0 } ],
  "animations": {
    "reach": {
      "ik": {
        "aim": [
          { "mix": 0, "bendPositive": false },
          { "time": 1, "mix": 1, "stretch": true }
        ]
      },
      "transform": {
        "copy": [
          { "rotateMix": 0, "translateMix": 0, "scaleMix": 0, "shearMix": 0 },
          { "time": 1, "rotateMix": 0, "translateMix": 0.5, "scaleMix": 0, "shearMix": 0 }
        ]
      }
    }
  }
}"#;

#[test]
fn constraint_timelines_mix_scalars_and_hold_flags() {
    let data = SkeletonData::from_json_str(IK_RIG).unwrap();
    let mut skeleton = pose_at(&data, "reach", 0.5);
    let ik = &skeleton.ik_constraints[0];
    assert_approx(ik.mix, 0.5);
    assert_eq!(ik.bend_direction, -1);
    assert!(!ik.stretch);
    assert_approx(skeleton.transform_constraints[0].translate_mix, 0.25);

    skeleton.update_world_transform();
    let arm = skeleton.find_bone("arm").unwrap();
    assert_approx(arm.world_rotation_x(), 45.0);
}
