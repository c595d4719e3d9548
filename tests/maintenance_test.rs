use std::sync::Arc;

use monocular_mapping::config::{MaintenanceConfig, RadiusFilterConfig};
use monocular_mapping::maintenance::{voxel_key, MapMaintainer};
use monocular_mapping::map::{MapStore, Observation};
use monocular_mapping::synthetic::default_camera;
use nalgebra as na;

/// Three frames observing every location; point `i` gets `offsets[i]` pixels
/// added to its keypoints in every frame.
fn observed_store(locations: &[na::Point3<f64>], offsets: &[f32]) -> MapStore {
    let camera = Arc::new(default_camera());
    let poses: Vec<na::Isometry3<f64>> = (0..3)
        .map(|i| na::Isometry3::translation(-0.4 * i as f64, 0.0, 0.0))
        .collect();
    let mut store = MapStore::new();
    let mut frame_ids = Vec::new();
    for (i, pose) in poses.iter().enumerate() {
        let keypoints = locations
            .iter()
            .zip(offsets)
            .map(|(p, off)| {
                let uv = camera.project_world(pose, p).unwrap();
                glam::Vec2::new(uv.x as f32 + off, uv.y as f32)
            })
            .collect();
        let relative = if i == 0 {
            None
        } else {
            Some(poses[i] * poses[i - 1].inverse())
        };
        frame_ids.push(store.add_frame(relative.as_ref(), keypoints, camera.clone()));
    }
    for (j, p) in locations.iter().enumerate() {
        let obs: Vec<_> = frame_ids.iter().map(|f| Observation::new(*f, j)).collect();
        store.add_point(*p, &obs).unwrap();
    }
    store
}

fn grid_locations(n: usize) -> Vec<na::Point3<f64>> {
    (0..n)
        .map(|i| na::Point3::new(-2.0 + 0.07 * (i % 60) as f64, -1.0 + 0.3 * (i / 60) as f64, 6.0))
        .collect()
}

#[test]
fn test_reprojection_filter_is_capped() {
    for n in [10, 37, 57, 120] {
        let locations = grid_locations(n);
        let mut store = observed_store(&locations, &vec![10.0f32; n]);
        let maintainer = MapMaintainer::default();
        let removed = maintainer.filter_by_reprojection_error(&mut store);
        assert_eq!(removed, n / 10);
        assert_eq!(store.point_count(), n - n / 10);
        // the earliest candidates go first
        assert_eq!(store.points()[0].id().0 as usize, n / 10);

        let again = maintainer.filter_by_reprojection_error(&mut store);
        assert_eq!(again, (n - n / 10) / 10);
    }
}

#[test]
fn test_reprojection_filter_keeps_good_points() {
    let n = 40;
    let locations = grid_locations(n);
    let offsets: Vec<f32> = (0..n).map(|i| if i % 8 == 0 { 6.0 } else { 0.5 }).collect();
    let mut store = observed_store(&locations, &offsets);
    let removed = MapMaintainer::default().filter_by_reprojection_error(&mut store);
    assert_eq!(removed, 4);
    assert!(store.points().iter().all(|p| p.id().0 % 8 != 0 || p.id().0 >= 32));
    for p in store.points() {
        let (mean, count) = store.reprojection_error(p);
        assert_eq!(count, 3);
        if p.id().0 % 8 != 0 {
            assert!(mean < 1.0);
        }
    }
}

#[test]
fn test_reprojection_filter_preconditions() {
    // too few points
    let mut small = observed_store(&grid_locations(9), &[50.0f32; 9]);
    assert_eq!(MapMaintainer::default().filter_by_reprojection_error(&mut small), 0);

    // two observations are not enough evidence
    let camera = Arc::new(default_camera());
    let mut store = MapStore::new();
    let f0 = store.add_frame(None, vec![glam::Vec2::new(0.0, 0.0)], camera.clone());
    let f1 = store.add_frame(None, vec![glam::Vec2::new(0.0, 0.0)], camera.clone());
    for i in 0..20 {
        store
            .add_point(
                na::Point3::new(i as f64 * 0.1, 0.0, 5.0),
                &[Observation::new(f0, 0), Observation::new(f1, 0)],
            )
            .unwrap();
    }
    assert_eq!(MapMaintainer::default().filter_by_reprojection_error(&mut store), 0);
}

fn single_frame_store(locations: &[na::Point3<f64>]) -> MapStore {
    let mut store = MapStore::new();
    let f0 = store.add_frame(None, vec![glam::Vec2::ZERO], Arc::new(default_camera()));
    for p in locations {
        store.add_point(*p, &[Observation::new(f0, 0)]).unwrap();
    }
    store
}

#[test]
fn test_downsample_keeps_first_per_voxel_and_is_idempotent() {
    let locations: Vec<_> = (0..60)
        .map(|i| na::Point3::new((i % 20) as f64 * 0.1 + 0.05, 0.05, 0.05))
        .collect();
    let mut store = single_frame_store(&locations);
    let maintainer = MapMaintainer::default();

    let removed = maintainer.downsample(&mut store);
    assert_eq!(removed, 40);
    let ids: Vec<u64> = store.points().iter().map(|p| p.id().0).collect();
    assert_eq!(ids, (0..20).collect::<Vec<u64>>());

    let mut keys: Vec<_> = store.locations().iter().map(|p| voxel_key(p, 0.1)).collect();
    keys.sort();
    keys.dedup();
    assert_eq!(keys.len(), store.point_count());

    // the survivors are below the size precondition, so also check a larger
    // cloud with the precondition lifted
    let before = store.locations();
    assert_eq!(maintainer.downsample(&mut store), 0);
    assert_eq!(store.locations(), before);

    let spread: Vec<_> = (0..200)
        .map(|i| na::Point3::new((i % 70) as f64 * 0.1 + 0.05, 0.05, (i / 70) as f64 * 0.013))
        .collect();
    let mut large = single_frame_store(&spread);
    maintainer.downsample(&mut large);
    let once = large.locations();
    let count = large.point_count();
    let config = MaintenanceConfig {
        min_points_downsample: 0,
        ..Default::default()
    };
    MapMaintainer::new(config).downsample(&mut large);
    assert_eq!(large.point_count(), count);
    assert_eq!(large.locations(), once);
}

#[test]
fn test_downsample_precondition() {
    let locations = vec![na::Point3::new(0.01, 0.01, 0.01); 49];
    let mut store = single_frame_store(&locations);
    assert_eq!(MapMaintainer::default().downsample(&mut store), 0);
    assert_eq!(store.point_count(), 49);
}

#[test]
fn test_radius_outliers() {
    let mut locations: Vec<_> = (0..60)
        .map(|i| na::Point3::new((i % 6) as f64 * 0.05, (i / 6) as f64 * 0.05, 3.0))
        .collect();
    locations.push(na::Point3::new(10.0, 0.0, 3.0));
    locations.push(na::Point3::new(-10.0, 0.0, 3.0));
    locations.push(na::Point3::new(0.0, 10.0, 3.0));
    let mut store = single_frame_store(&locations);

    let config = MaintenanceConfig {
        radius_filter: Some(RadiusFilterConfig::default()),
        ..Default::default()
    };
    let maintainer = MapMaintainer::new(config.clone());
    let removed = maintainer.remove_radius_outliers(&mut store, &RadiusFilterConfig::default());
    assert_eq!(removed, 3);
    assert_eq!(store.point_count(), 60);

    // run() applies the radius pass when configured
    let mut store = single_frame_store(&locations);
    let report = maintainer.run(&mut store);
    assert_eq!(report.radius_removed, 3);
    assert_eq!(report.total(), 63 - store.point_count());
}

#[test]
fn test_maintenance_schedule() {
    let maintainer = MapMaintainer::default();
    let small = single_frame_store(&vec![na::Point3::new(0.0, 0.0, 1.0); 50]);
    let large = single_frame_store(&vec![na::Point3::new(0.0, 0.0, 1.0); 51]);
    assert!(!maintainer.is_due(10, &small));
    assert!(maintainer.is_due(10, &large));
    assert!(!maintainer.is_due(11, &large));
}

#[test]
fn test_radius_filter_with_invalid_radius_is_a_no_op() {
    let locations = grid_locations(60);
    let maintainer = MapMaintainer::default();
    for radius in [0.0, -0.5, f64::NAN, f64::INFINITY] {
        let mut store = single_frame_store(&locations);
        let config = RadiusFilterConfig {
            radius,
            min_neighbors: 2,
        };
        assert_eq!(maintainer.remove_radius_outliers(&mut store, &config), 0);
        assert_eq!(store.point_count(), 60);
    }

    // cells at the edge of the integer grid do not overflow
    let extreme = vec![na::Point3::new(1e300, -1e300, 1e300); 60];
    let mut store = single_frame_store(&extreme);
    let config = RadiusFilterConfig {
        radius: 1e-3,
        min_neighbors: 2,
    };
    assert_eq!(maintainer.remove_radius_outliers(&mut store, &config), 0);
}

#[test]
fn test_zero_interval_and_divisor_never_panic() {
    let maintainer = MapMaintainer::new(MaintenanceConfig {
        interval: 0,
        max_removal_fraction_divisor: 0,
        ..Default::default()
    });
    let large = single_frame_store(&vec![na::Point3::new(0.0, 0.0, 1.0); 51]);
    assert!(!maintainer.is_due(0, &large));
    assert!(!maintainer.is_due(10, &large));

    let locations = grid_locations(20);
    let mut store = observed_store(&locations, &vec![10.0f32; 20]);
    assert_eq!(maintainer.filter_by_reprojection_error(&mut store), 0);
    assert_eq!(store.point_count(), 20);
}
