use nalgebra as na;

/// Axis-angle rotation and translation, the parameter block layout used by
/// the solver for a free camera pose.
#[derive(Debug, Clone, PartialEq)]
pub struct RvecTvec {
    rvec: [f64; 3],
    tvec: [f64; 3],
}

impl RvecTvec {
    pub fn new(rvec: &na::DVector<f64>, tvec: &na::DVector<f64>) -> RvecTvec {
        RvecTvec {
            rvec: [rvec[0], rvec[1], rvec[2]],
            tvec: [tvec[0], tvec[1], tvec[2]],
        }
    }

    pub fn na_rvec(&self) -> na::DVector<f64> {
        na::dvector![self.rvec[0], self.rvec[1], self.rvec[2]]
    }

    pub fn na_tvec(&self) -> na::DVector<f64> {
        na::dvector![self.tvec[0], self.tvec[1], self.tvec[2]]
    }

    pub fn to_na_isometry3(&self) -> na::Isometry3<f64> {
        na::Isometry3::new(
            na::Vector3::new(self.tvec[0], self.tvec[1], self.tvec[2]),
            na::Vector3::new(self.rvec[0], self.rvec[1], self.rvec[2]),
        )
    }
}

pub trait ToRvecTvec {
    fn to_rvec_tvec(&self) -> RvecTvec;
}

impl ToRvecTvec for na::Isometry3<f64> {
    fn to_rvec_tvec(&self) -> RvecTvec {
        let rvec = self.rotation.scaled_axis();
        let tvec = self.translation.vector;
        RvecTvec {
            rvec: [rvec.x, rvec.y, rvec.z],
            tvec: [tvec.x, tvec.y, tvec.z],
        }
    }
}

/// Builds an isometry from generic solver parameters `[rx, ry, rz]`, `[tx, ty, tz]`.
pub fn isometry_from_params<T: na::RealField + Clone>(
    rvec: &na::DVector<T>,
    tvec: &na::DVector<T>,
) -> na::Isometry3<T> {
    let rvec = na::Vector3::new(rvec[0].clone(), rvec[1].clone(), rvec[2].clone());
    let tvec = na::Vector3::new(tvec[0].clone(), tvec[1].clone(), tvec[2].clone());
    na::Isometry3::new(tvec, rvec)
}

/// Row-major 4x4 matrix of a rigid transform.
pub fn isometry_to_rows(iso: &na::Isometry3<f64>) -> [[f64; 4]; 4] {
    let m = iso.to_homogeneous();
    let mut rows = [[0.0; 4]; 4];
    for (r, row) in rows.iter_mut().enumerate() {
        for (c, v) in row.iter_mut().enumerate() {
            *v = m[(r, c)];
        }
    }
    rows
}

/// Camera centre in world coordinates of a world-to-camera pose.
pub fn camera_center(pose_cw: &na::Isometry3<f64>) -> na::Point3<f64> {
    pose_cw.inverse() * na::Point3::origin()
}
