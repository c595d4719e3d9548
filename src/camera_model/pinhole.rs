use super::generic::CameraModel;
use nalgebra as na;

/// Pinhole camera described by the 3x3 intrinsic matrix `K`.
#[derive(Debug, Clone, PartialEq)]
pub struct PinholeCamera<T: na::RealField + Clone> {
    pub fx: T,
    pub fy: T,
    pub cx: T,
    pub cy: T,
    pub width: u32,
    pub height: u32,
}

impl<T: na::RealField + Clone> PinholeCamera<T> {
    pub fn new(params: &na::DVector<T>, width: u32, height: u32) -> PinholeCamera<T> {
        PinholeCamera {
            fx: params[0].clone(),
            fy: params[1].clone(),
            cx: params[2].clone(),
            cy: params[3].clone(),
            width,
            height,
        }
    }

    pub fn from_matrix(k: &na::Matrix3<T>, width: u32, height: u32) -> PinholeCamera<T> {
        PinholeCamera {
            fx: k[(0, 0)].clone(),
            fy: k[(1, 1)].clone(),
            cx: k[(0, 2)].clone(),
            cy: k[(1, 2)].clone(),
            width,
            height,
        }
    }

    pub fn matrix(&self) -> na::Matrix3<T> {
        let zero = T::zero();
        na::Matrix3::new(
            self.fx.clone(),
            zero.clone(),
            self.cx.clone(),
            zero.clone(),
            self.fy.clone(),
            self.cy.clone(),
            zero.clone(),
            zero,
            T::one(),
        )
    }

    fn project_one_impl(params: &na::DVector<T>, pt: &na::Vector3<T>) -> na::Vector2<T> {
        let fx = &params[0];
        let fy = &params[1];
        let cx = &params[2];
        let cy = &params[3];
        let x = pt[0].clone() / pt[2].clone();
        let y = pt[1].clone() / pt[2].clone();
        na::Vector2::new(fx.clone() * x + cx.clone(), fy.clone() * y + cy.clone())
    }

    fn unproject_one_impl(params: &na::DVector<T>, pt: &na::Vector2<T>) -> na::Vector3<T> {
        let fx = &params[0];
        let fy = &params[1];
        let cx = &params[2];
        let cy = &params[3];
        na::Vector3::new(
            (pt[0].clone() - cx.clone()) / fx.clone(),
            (pt[1].clone() - cy.clone()) / fy.clone(),
            T::one(),
        )
    }
}

impl PinholeCamera<f64> {
    /// Casts to another scalar type, used to evaluate residuals on dual numbers.
    pub fn cast<U: na::RealField + Clone>(&self) -> PinholeCamera<U> {
        PinholeCamera {
            fx: U::from_f64(self.fx).unwrap_or_else(U::zero),
            fy: U::from_f64(self.fy).unwrap_or_else(U::zero),
            cx: U::from_f64(self.cx).unwrap_or_else(U::zero),
            cy: U::from_f64(self.cy).unwrap_or_else(U::zero),
            width: self.width,
            height: self.height,
        }
    }

    /// Pixel to normalized image coordinates (`K⁻¹ [u v 1]`).
    pub fn normalize(&self, p2d: &glam::Vec2) -> na::Vector2<f64> {
        self.unproject_one(&na::Vector2::new(p2d.x as f64, p2d.y as f64))
            .xy()
    }

    /// Normalized image coordinates back to pixels.
    pub fn denormalize(&self, xy: &na::Vector2<f64>) -> glam::Vec2 {
        glam::Vec2::new(
            (self.fx * xy.x + self.cx) as f32,
            (self.fy * xy.y + self.cy) as f32,
        )
    }

    /// Projects a world point through a world-to-camera pose.
    /// Returns `None` when the point is not in front of the camera.
    pub fn project_world(
        &self,
        pose_cw: &na::Isometry3<f64>,
        p_world: &na::Point3<f64>,
    ) -> Option<na::Vector2<f64>> {
        let p_cam = pose_cw * p_world;
        if p_cam.z <= 0.0 {
            return None;
        }
        Some(self.project_one(&p_cam.coords))
    }

    pub fn contains(&self, p2d: &na::Vector2<f64>) -> bool {
        p2d.x >= 0.0 && p2d.y >= 0.0 && p2d.x < self.width as f64 && p2d.y < self.height as f64
    }
}

impl<T: na::RealField + Clone> CameraModel<T> for PinholeCamera<T> {
    fn params(&self) -> na::DVector<T> {
        na::dvector![
            self.fx.clone(),
            self.fy.clone(),
            self.cx.clone(),
            self.cy.clone()
        ]
    }

    fn width(&self) -> T {
        T::from_u32(self.width).unwrap_or_else(T::zero)
    }

    fn height(&self) -> T {
        T::from_u32(self.height).unwrap_or_else(T::zero)
    }

    fn project_one(&self, pt: &na::Vector3<T>) -> na::Vector2<T> {
        Self::project_one_impl(&self.params(), pt)
    }

    fn unproject_one(&self, pt: &na::Vector2<T>) -> na::Vector3<T> {
        Self::unproject_one_impl(&self.params(), pt)
    }
}
