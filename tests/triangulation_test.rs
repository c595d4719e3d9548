use monocular_mapping::config::TriangulationConfig;
use monocular_mapping::synthetic::default_camera;
use monocular_mapping::triangulation::{triangulate, triangulate_one, TriangulationFilter};
use monocular_mapping::MapError;
use nalgebra as na;

fn normalized(pose: &na::Isometry3<f64>, p: &na::Point3<f64>) -> na::Vector2<f64> {
    let c = pose * p;
    na::Vector2::new(c.x / c.z, c.y / c.z)
}

#[test]
fn test_two_view_recovers_point() {
    let pose_a = na::Isometry3::identity();
    // camera b sits one unit to the right, slightly rotated
    let pose_b = na::Isometry3::new(na::Vector3::new(-1.0, 0.0, 0.1), na::Vector3::new(0.0, -0.05, 0.0));
    let filter = TriangulationFilter::default();
    for p in [
        na::Point3::new(0.5, 0.2, 5.0),
        na::Point3::new(-1.0, 1.5, 8.0),
        na::Point3::new(2.0, -0.3, 3.0),
    ] {
        let x_h = triangulate_one(&pose_b, &pose_a, &normalized(&pose_b, &p), &normalized(&pose_a, &p));
        let got = filter.accept(&x_h, &pose_b, &pose_a).unwrap();
        assert!((got - p).norm() < 1e-8, "{} vs {}", got, p);
    }
}

#[test]
fn test_pixel_round_trip_through_camera() {
    let camera = default_camera();
    let pose_a = na::Isometry3::identity();
    let pose_b = na::Isometry3::translation(-0.5, 0.0, -0.3);
    let p = na::Point3::new(1.0, 0.5, 6.0);
    let uv_a = camera.project_world(&pose_a, &p).unwrap();
    let uv_b = camera.project_world(&pose_b, &p).unwrap();
    let kp_a = glam::Vec2::new(uv_a.x as f32, uv_a.y as f32);
    let kp_b = glam::Vec2::new(uv_b.x as f32, uv_b.y as f32);

    let pts = triangulate(
        &pose_b,
        &pose_a,
        &[camera.normalize(&kp_b)],
        &[camera.normalize(&kp_a)],
    )
    .unwrap();
    let got = TriangulationFilter::default()
        .accept(&pts[0], &pose_b, &pose_a)
        .unwrap();
    assert!((got - p).norm() < 1e-3);
    let back = camera.denormalize(&camera.normalize(&kp_a));
    assert!((back - kp_a).length() < 1e-3);
}

#[test]
fn test_identical_poses_create_no_points() {
    let pose = na::Isometry3::new(na::Vector3::new(0.3, 0.0, 2.0), na::Vector3::new(0.0, 0.1, 0.0));
    let pts: Vec<na::Vector2<f64>> = (0..50)
        .map(|i| na::Vector2::new(-0.5 + 0.02 * i as f64, 0.3 - 0.01 * i as f64))
        .collect();
    let filter = TriangulationFilter::default();
    let accepted = triangulate(&pose, &pose, &pts, &pts)
        .unwrap()
        .iter()
        .filter_map(|x_h| filter.accept(x_h, &pose, &pose))
        .count();
    assert_eq!(accepted, 0);
}

#[test]
fn test_mismatched_lengths() {
    let pose = na::Isometry3::identity();
    let result = triangulate(&pose, &pose, &[na::Vector2::zeros(); 3], &[na::Vector2::zeros(); 2]);
    assert!(matches!(result, Err(MapError::MismatchedInput { left: 3, right: 2 })));
}

#[test]
fn test_filter_rejections() {
    let identity = na::Isometry3::identity();
    let filter = TriangulationFilter::default();

    // at infinity
    assert!(filter.accept(&na::Vector4::new(1.0, 1.0, 1.0, 1e-4), &identity, &identity).is_none());
    // beyond the distance bound
    assert!(filter.accept(&na::Vector4::new(0.0, 0.0, 25.0, 1.0), &identity, &identity).is_none());
    // behind the camera
    let behind = na::Vector4::new(0.0, 0.0, -5.0, 1.0);
    assert!(filter.accept(&behind, &identity, &identity).is_none());

    let lenient = TriangulationFilter::from(&TriangulationConfig {
        require_positive_depth: false,
        ..Default::default()
    });
    let p = lenient.accept(&behind, &identity, &identity).unwrap();
    assert_eq!(p, na::Point3::new(0.0, 0.0, -5.0));

    // the distance is measured from the newest camera centre
    let ahead = na::Isometry3::translation(0.0, 0.0, -10.0);
    let x_h = na::Vector4::new(0.0, 0.0, 25.0, 1.0);
    assert!(filter.accept(&x_h, &ahead, &identity).is_some());
    assert!(filter.accept(&x_h, &identity, &ahead).is_none());

    // homogeneous scale does not matter
    let scaled = filter.accept(&na::Vector4::new(-2.0, -4.0, -10.0, -2.0), &identity, &identity);
    assert_eq!(scaled, Some(na::Point3::new(1.0, 2.0, 5.0)));
}

#[test]
fn test_filter_ignores_homogeneous_scale() {
    let identity = na::Isometry3::identity();
    let filter = TriangulationFilter::default();
    let x_h = na::Vector4::new(1.0, 2.0, 5.0, 1.0);
    let expected = filter.accept(&x_h, &identity, &identity).unwrap();
    for scale in [1e-6, 1e-4, 1e-2, 1e3, -1e-4] {
        let got = filter.accept(&(x_h * scale), &identity, &identity);
        let got = got.unwrap_or_else(|| panic!("rejected at scale {}", scale));
        assert!((got - expected).norm() < 1e-9);
    }

    // a point at infinity stays rejected however it is scaled
    let far = na::Vector4::new(1.0, 1.0, 1.0, 1e-5);
    for scale in [1e-3, 1.0, 1e3] {
        assert!(filter.accept(&(far * scale), &identity, &identity).is_none());
    }
    assert!(filter.accept(&na::Vector4::zeros(), &identity, &identity).is_none());
}
