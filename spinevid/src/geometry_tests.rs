use crate::geometry::{
    Affine2, SkeletonClipper, Triangulator, make_clockwise, points_from_flat, wrap_degrees,
};

fn assert_approx(actual: f32, expected: f32) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= 0.001,
        "expected {expected}, got {actual} (diff {diff})"
    );
}

fn assert_points(actual: &[[f32; 2]], expected: &[[f32; 2]]) {
    assert_eq!(actual.len(), expected.len(), "{actual:?} vs {expected:?}");
    for (a, e) in actual.iter().zip(expected) {
        assert_approx(a[0], e[0]);
        assert_approx(a[1], e[1]);
    }
}

#[test]
fn triangulates_and_recombines_a_rectangle() {
    let triangulator = Triangulator;
    let square = points_from_flat(&[0.0, 0.0, 100.0, 0.0, 100.0, 100.0, 0.0, 100.0]);

    let triangles = triangulator.triangulate(&square);
    assert_eq!(triangles, vec![3, 0, 1, 3, 1, 2]);

    let parts = triangulator.decompose(&square, &triangles);
    assert_eq!(parts.len(), 1);
    assert_points(
        &parts[0],
        &[[0.0, 100.0], [0.0, 0.0], [100.0, 0.0], [100.0, 100.0]],
    );
}

#[test]
fn concave_polygon_splits_into_convex_parts() {
    let triangulator = Triangulator;
    // An L shape, clockwise.
    let mut l_shape = points_from_flat(&[
        0.0, 0.0, 0.0, 20.0, 10.0, 20.0, 10.0, 10.0, 20.0, 10.0, 20.0, 0.0,
    ]);
    make_clockwise(&mut l_shape);
    let triangles = triangulator.triangulate(&l_shape);
    assert_eq!(triangles.len(), 12);

    let parts = triangulator.decompose(&l_shape, &triangles);
    assert!(parts.len() >= 2);
    let total: usize = parts.iter().map(|p| p.len()).sum();
    assert!(total >= 6);
}

#[test]
fn make_clockwise_reverses_counter_clockwise_input() {
    let mut ccw = vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]];
    make_clockwise(&mut ccw);
    assert_eq!(ccw, vec![[1.0, 1.0], [1.0, 0.0], [0.0, 0.0]]);

    let mut cw = ccw.clone();
    make_clockwise(&mut cw);
    assert_eq!(cw, ccw);
}

#[test]
fn partially_covered_triangle_is_cut_to_the_band() {
    let mut clipper = SkeletonClipper::default();
    let band = points_from_flat(&[0.0, 50.0, 100.0, 50.0, 100.0, 70.0, 0.0, 70.0]);
    assert!(clipper.clip_start(&band, Some(3)));
    assert!(clipper.is_clipping());

    let positions = [[0.0, 0.0], [100.0, 0.0], [50.0, 150.0]];
    let uvs = [[0.0, 0.0], [1.0, 0.0], [0.5, 1.0]];
    let clipped = clipper.clip_triangles(&positions, &uvs, &[0, 1, 2]);

    assert_points(
        &clipped.positions,
        &[
            [83.333_33, 50.0],
            [76.666_66, 70.0],
            [23.333_334, 70.0],
            [16.666_672, 50.0],
        ],
    );
    assert_points(
        &clipped.uvs,
        &[
            [0.833_333, 0.333_333],
            [0.766_667, 0.466_667],
            [0.233_333, 0.466_667],
            [0.166_667, 0.333_333],
        ],
    );
    assert_eq!(clipped.triangles, vec![0, 1, 2, 0, 2, 3]);
}

#[test]
fn triangle_inside_clip_is_unchanged() {
    let mut clipper = SkeletonClipper::default();
    let square = points_from_flat(&[0.0, 0.0, 100.0, 0.0, 100.0, 100.0, 0.0, 100.0]);
    assert!(clipper.clip_start(&square, None));

    let positions = [[10.0, 10.0], [20.0, 10.0], [15.0, 20.0]];
    let uvs = [[0.0, 0.0], [1.0, 0.0], [0.5, 1.0]];
    let clipped = clipper.clip_triangles(&positions, &uvs, &[0, 1, 2]);

    assert_eq!(clipped.positions, positions.to_vec());
    assert_eq!(clipped.uvs, uvs.to_vec());
    assert_eq!(clipped.triangles, vec![0, 1, 2]);
}

#[test]
fn triangle_outside_clip_emits_nothing() {
    let mut clipper = SkeletonClipper::default();
    let square = points_from_flat(&[0.0, 0.0, 10.0, 0.0, 10.0, 10.0, 0.0, 10.0]);
    assert!(clipper.clip_start(&square, None));

    let positions = [[50.0, 50.0], [60.0, 50.0], [55.0, 60.0]];
    let uvs = [[0.0, 0.0]; 3];
    let clipped = clipper.clip_triangles(&positions, &uvs, &[0, 1, 2]);
    assert!(clipped.positions.is_empty());
    assert!(clipped.triangles.is_empty());
}

#[test]
fn clip_ends_only_at_its_end_slot() {
    let mut clipper = SkeletonClipper::default();
    let square = points_from_flat(&[0.0, 0.0, 10.0, 0.0, 10.0, 10.0, 0.0, 10.0]);
    assert!(clipper.clip_start(&square, Some(4)));
    assert!(!clipper.clip_start(&square, Some(5)), "nested clips are ignored");

    clipper.clip_end_with_slot(2);
    assert!(clipper.is_clipping());
    clipper.clip_end_with_slot(4);
    assert!(!clipper.is_clipping());
}

#[test]
fn degenerate_clip_polygon_is_rejected() {
    let mut clipper = SkeletonClipper::default();
    assert!(!clipper.clip_start(&[[0.0, 0.0], [1.0, 1.0]], None));
    assert!(!clipper.is_clipping());
}

#[test]
fn wrap_degrees_takes_the_short_way() {
    assert_approx(wrap_degrees(190.0), -170.0);
    assert_approx(wrap_degrees(-190.0), 170.0);
    assert_approx(wrap_degrees(720.0 + 45.0), 45.0);
    assert_approx(wrap_degrees(-45.0), -45.0);
}

#[test]
fn affine_round_trips_points() {
    let m = Affine2 {
        a: 0.0,
        b: -2.0,
        c: 2.0,
        d: 0.0,
        x: 5.0,
        y: -1.0,
    };
    let world = m.transform_point([1.0, 3.0]);
    assert_approx(world[0], -1.0);
    assert_approx(world[1], 1.0);
    let local = m.inverse_transform_point(world).unwrap();
    assert_approx(local[0], 1.0);
    assert_approx(local[1], 3.0);

    let composed = m.then(&Affine2::IDENTITY);
    assert_eq!(composed, m);
    assert!(
        Affine2 { a: 0.0, b: 0.0, c: 0.0, d: 0.0, x: 0.0, y: 0.0 }
            .inverse_transform_point([1.0, 1.0])
            .is_none()
    );
}
