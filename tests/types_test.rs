use monocular_mapping::types::{camera_center, isometry_to_rows, RvecTvec, ToRvecTvec};
use nalgebra as na;

#[test]
fn test_rvec_tvec_conversion() {
    let rvec_in = na::dvector![0.1, 0.2, 0.3];
    let tvec_in = na::dvector![1.0, 2.0, 3.0];

    let rt = RvecTvec::new(&rvec_in, &tvec_in);
    let iso = rt.to_na_isometry3();
    let rt_back = iso.to_rvec_tvec();

    assert!((rt_back.na_rvec() - rvec_in).norm() < 1e-6);
    assert!((rt_back.na_tvec() - tvec_in).norm() < 1e-6);
}

#[test]
fn test_camera_center_of_world_to_camera_pose() {
    // camera at (1, 2, 3) looking down +z
    let pose_cw = na::Isometry3::translation(-1.0, -2.0, -3.0);
    let c = camera_center(&pose_cw);
    assert!((c - na::Point3::new(1.0, 2.0, 3.0)).norm() < 1e-12);

    let rotated = na::Isometry3::new(na::Vector3::new(0.5, -0.2, 1.0), na::Vector3::new(0.0, 0.3, 0.0));
    let c = camera_center(&rotated);
    assert!((rotated * c).coords.norm() < 1e-12);
}

#[test]
fn test_isometry_rows_are_row_major() {
    let iso = na::Isometry3::translation(4.0, 5.0, 6.0);
    let rows = isometry_to_rows(&iso);
    assert_eq!(rows[0][3], 4.0);
    assert_eq!(rows[1][3], 5.0);
    assert_eq!(rows[2][3], 6.0);
    assert_eq!(rows[3], [0.0, 0.0, 0.0, 1.0]);
}
