use std::sync::Arc;

use nalgebra as na;

use super::types::FrameId;
use crate::camera_model::PinholeCamera;
use crate::types::camera_center;

/// One processed image: its pose and the keypoints detected in it.
#[derive(Debug, Clone)]
pub struct Frame {
    id: FrameId,
    /// World-to-camera transform `T_cw`.
    pose: na::Isometry3<f64>,
    /// Pixel coordinates, indexed by observation keypoint index.
    keypoints: Arc<[glam::Vec2]>,
    camera: Arc<PinholeCamera<f64>>,
}

impl Frame {
    pub(crate) fn new(
        id: FrameId,
        pose: na::Isometry3<f64>,
        keypoints: Vec<glam::Vec2>,
        camera: Arc<PinholeCamera<f64>>,
    ) -> Frame {
        Frame {
            id,
            pose,
            keypoints: keypoints.into(),
            camera,
        }
    }

    pub fn id(&self) -> FrameId {
        self.id
    }

    pub fn pose(&self) -> &na::Isometry3<f64> {
        &self.pose
    }

    pub(crate) fn set_pose(&mut self, pose: na::Isometry3<f64>) {
        self.pose = pose;
    }

    /// Camera position in world coordinates.
    pub fn center(&self) -> na::Point3<f64> {
        camera_center(&self.pose)
    }

    pub fn keypoints(&self) -> &[glam::Vec2] {
        &self.keypoints
    }

    pub fn keypoint(&self, index: usize) -> Option<&glam::Vec2> {
        self.keypoints.get(index)
    }

    pub fn camera(&self) -> &Arc<PinholeCamera<f64>> {
        &self.camera
    }
}
