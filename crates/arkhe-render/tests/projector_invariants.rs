use arkhe_core::ProjectionSettings;
use arkhe_render::{Projector, Rotation};

const SURFACE: (f32, f32) = (800.0, 600.0);

#[test]
fn origin_projects_to_surface_center() {
    let settings = ProjectionSettings::default();
    let projector = Projector::new(&settings);
    let projection = projector.project([0.0, 0.0, 0.0], &Rotation::default(), SURFACE);

    assert!(projection.visible);
    assert_eq!((projection.x, projection.y), (400.0, 300.0));
    let expected = settings.fov / (settings.fov + settings.distance);
    assert!(
        (projection.scale - expected).abs() < 1e-6,
        "scale {} expected {expected}",
        projection.scale
    );
}

#[test]
fn projection_is_deterministic() {
    let projector = Projector::default();
    let rotation = Rotation::new(0.3, -1.2, 2.5);
    let point = [123.0, -45.5, 67.25];
    let first = projector.project(point, &rotation, SURFACE);
    for _ in 0..10 {
        assert_eq!(projector.project(point, &rotation, SURFACE), first);
    }
}

#[test]
fn outputs_are_finite_for_extreme_inputs() {
    let projector = Projector::default();
    let rotation = Rotation::new(1.0, 2.0, 3.0);
    let points = [
        [f32::MAX, 0.0, 0.0],
        [0.0, f32::NAN, 0.0],
        [0.0, 0.0, f32::INFINITY],
        [0.0, 0.0, -900.0],
        [1.0e30, -1.0e30, 1.0e30],
    ];
    for point in points {
        let projection = projector.project(point, &rotation, SURFACE);
        assert!(projection.x.is_finite() && projection.y.is_finite(), "{point:?}");
        assert!(projection.scale.is_finite() && projection.scale >= 0.0);
        if !projection.visible {
            assert_eq!(projection.scale, 0.0);
        }
    }
}

#[test]
fn rotation_preserves_distance_from_origin() {
    let rotation = Rotation::new(0.7, 1.9, -0.4);
    let point = [30.0, -40.0, 120.0];
    let rotated = rotation.apply(point);
    let norm = |p: [f32; 3]| (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt();
    assert!((norm(point) - norm(rotated)).abs() < 1e-3);
}
