use nalgebra as na;
use rayon::prelude::*;

pub trait CameraModel<T: na::RealField + Clone>
where
    Self: Sync,
{
    fn params(&self) -> na::DVector<T>;
    fn width(&self) -> T;
    fn height(&self) -> T;
    /// Projects a point given in camera coordinates. The caller checks depth.
    fn project_one(&self, pt: &na::Vector3<T>) -> na::Vector2<T>;
    /// Lifts a pixel onto the `z = 1` plane.
    fn unproject_one(&self, pt: &na::Vector2<T>) -> na::Vector3<T>;

    /// Projects a batch of camera-frame points, `None` for points behind the
    /// camera or outside the image.
    fn project(&self, p3d: &[na::Vector3<T>]) -> Vec<Option<na::Vector2<T>>>
    where
        T: Send + Sync,
    {
        p3d.par_iter()
            .map(|pt| {
                if pt[2] <= T::zero() {
                    return None;
                }
                let p2d = self.project_one(pt);
                if p2d[0] < T::zero()
                    || p2d[0] > self.width()
                    || p2d[1] < T::zero()
                    || p2d[1] > self.height()
                {
                    None
                } else {
                    Some(p2d)
                }
            })
            .collect()
    }

    fn unproject(&self, p2d: &[na::Vector2<T>]) -> Vec<na::Vector3<T>>
    where
        T: Send + Sync,
    {
        p2d.par_iter().map(|p| self.unproject_one(p)).collect()
    }
}
