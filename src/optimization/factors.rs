use nalgebra as na;
use tiny_solver::factors::Factor;

use crate::camera_model::{CameraModel, PinholeCamera};
use crate::types::isometry_from_params;

fn to_t<T: na::RealField>(v: f64) -> T {
    T::from_f64(v).unwrap_or_else(T::zero)
}

/// Pixel residual of one observation with a free pose and a free point.
pub struct ReprojectionFactor {
    pub camera: PinholeCamera<f64>,
    pub p2d: na::Vector2<f64>,
}

impl ReprojectionFactor {
    pub fn new(camera: &PinholeCamera<f64>, p2d: &glam::Vec2) -> ReprojectionFactor {
        ReprojectionFactor {
            camera: camera.clone(),
            p2d: na::Vector2::new(p2d.x as f64, p2d.y as f64),
        }
    }
}

impl<T: na::RealField> Factor<T> for ReprojectionFactor {
    fn residual_func(&self, params: &[na::DVector<T>]) -> na::DVector<T> {
        // params[rvec, tvec, p3d]
        let model: PinholeCamera<T> = self.camera.cast();
        let transform = isometry_from_params(&params[0], &params[1]);
        let p3d = na::Point3::new(
            params[2][0].clone(),
            params[2][1].clone(),
            params[2][2].clone(),
        );
        let p3d_t = transform * p3d;
        let p2d_p = model.project_one(&p3d_t.coords);

        na::dvector![
            p2d_p[0].clone() - to_t::<T>(self.p2d[0]),
            p2d_p[1].clone() - to_t::<T>(self.p2d[1])
        ]
    }
}

/// Pixel residual of an observation from the anchor frame, whose pose is held fixed.
pub struct FixedPoseReprojectionFactor {
    pub camera: PinholeCamera<f64>,
    pub pose: na::Isometry3<f64>,
    pub p2d: na::Vector2<f64>,
}

impl FixedPoseReprojectionFactor {
    pub fn new(
        camera: &PinholeCamera<f64>,
        pose: &na::Isometry3<f64>,
        p2d: &glam::Vec2,
    ) -> FixedPoseReprojectionFactor {
        FixedPoseReprojectionFactor {
            camera: camera.clone(),
            pose: *pose,
            p2d: na::Vector2::new(p2d.x as f64, p2d.y as f64),
        }
    }
}

impl<T: na::RealField> Factor<T> for FixedPoseReprojectionFactor {
    fn residual_func(&self, params: &[na::DVector<T>]) -> na::DVector<T> {
        // params[p3d]
        let model: PinholeCamera<T> = self.camera.cast();
        let transform: na::Isometry3<T> = self.pose.cast();
        let p3d = na::Point3::new(
            params[0][0].clone(),
            params[0][1].clone(),
            params[0][2].clone(),
        );
        let p3d_t = transform * p3d;
        let p2d_p = model.project_one(&p3d_t.coords);

        na::dvector![
            p2d_p[0].clone() - to_t::<T>(self.p2d[0]),
            p2d_p[1].clone() - to_t::<T>(self.p2d[1])
        ]
    }
}
