use std::collections::HashSet;
use std::sync::Arc;

use nalgebra as na;

use super::frame::Frame;
use super::point::{Observation, Point};
use super::types::{FrameId, PointId};
use crate::camera_model::{CameraModel, PinholeCamera};
use crate::error::{MapError, Result};

/// Owns every frame and point of one reconstruction.
///
/// Frames are never removed, so a `FrameId` is also the frame's index.
/// Points are kept in creation order, which is also ascending id order;
/// removal preserves the relative order of the survivors.
#[derive(Debug, Clone, Default)]
pub struct MapStore {
    frames: Vec<Frame>,
    points: Vec<Point>,
    next_point_id: u64,
}

impl MapStore {
    pub fn new() -> MapStore {
        MapStore::default()
    }

    /// Appends a frame.
    ///
    /// The first frame anchors the world at identity. Every later frame gets
    /// `relative * previous_pose`, where `relative` maps the previous camera
    /// frame into the new one; `None` keeps the previous pose.
    pub fn add_frame(
        &mut self,
        relative: Option<&na::Isometry3<f64>>,
        keypoints: Vec<glam::Vec2>,
        camera: Arc<PinholeCamera<f64>>,
    ) -> FrameId {
        let id = FrameId(self.frames.len() as u64);
        let pose = match (self.frames.last(), relative) {
            (None, _) => na::Isometry3::identity(),
            (Some(prev), Some(rel)) => rel * prev.pose(),
            (Some(prev), None) => *prev.pose(),
        };
        self.frames.push(Frame::new(id, pose, keypoints, camera));
        id
    }

    /// Creates a point with its initial observations.
    pub fn add_point(
        &mut self,
        location: na::Point3<f64>,
        observations: &[Observation],
    ) -> Result<PointId> {
        let id = PointId(self.next_point_id);
        if observations.is_empty() {
            return Err(MapError::NoObservations(id));
        }
        for obs in observations {
            self.check_observation(obs)?;
        }
        self.next_point_id += 1;
        self.points.push(Point::new(id, location, observations.to_vec()));
        Ok(id)
    }

    pub fn add_observation(&mut self, point: PointId, observation: Observation) -> Result<()> {
        self.check_observation(&observation)?;
        let idx = self.point_index(point).ok_or(MapError::UnknownPoint(point))?;
        self.points[idx].push_observation(observation);
        Ok(())
    }

    fn check_observation(&self, obs: &Observation) -> Result<()> {
        let frame = self.frame(obs.frame).ok_or(MapError::UnknownFrame(obs.frame))?;
        let len = frame.keypoints().len();
        if obs.keypoint >= len {
            return Err(MapError::InvalidObservation {
                frame: obs.frame,
                index: obs.keypoint,
                len,
            });
        }
        Ok(())
    }

    /// Removes every point the predicate selects and returns how many went.
    pub fn remove_points<F: FnMut(&Point) -> bool>(&mut self, mut predicate: F) -> usize {
        let before = self.points.len();
        self.points.retain(|p| !predicate(p));
        before - self.points.len()
    }

    pub fn remove_point_ids(&mut self, ids: &HashSet<PointId>) -> usize {
        if ids.is_empty() {
            return 0;
        }
        self.remove_points(|p| ids.contains(&p.id()))
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn frame(&self, id: FrameId) -> Option<&Frame> {
        self.frames.get(id.0 as usize)
    }

    pub fn last_frame(&self) -> Option<&Frame> {
        self.frames.last()
    }

    fn point_index(&self, id: PointId) -> Option<usize> {
        self.points.binary_search_by_key(&id, |p| p.id()).ok()
    }

    pub fn point(&self, id: PointId) -> Option<&Point> {
        self.point_index(id).map(|i| &self.points[i])
    }

    pub(crate) fn set_frame_pose(&mut self, id: FrameId, pose: na::Isometry3<f64>) {
        if let Some(frame) = self.frames.get_mut(id.0 as usize) {
            frame.set_pose(pose);
        }
    }

    pub(crate) fn set_point_location(&mut self, id: PointId, location: na::Point3<f64>) {
        if let Some(idx) = self.point_index(id) {
            self.points[idx].set_location(location);
        }
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// Point locations in store order.
    pub fn locations(&self) -> Vec<na::Point3<f64>> {
        self.points.iter().map(|p| *p.location()).collect()
    }

    /// Mean pixel reprojection error of one point over the observations in
    /// front of their camera, with the number of such observations.
    pub fn reprojection_error(&self, point: &Point) -> (f64, usize) {
        let mut total = 0.0;
        let mut count = 0;
        for obs in point.observations() {
            let Some(frame) = self.frame(obs.frame) else {
                continue;
            };
            let Some(observed) = frame.keypoint(obs.keypoint) else {
                continue;
            };
            let p_cam = frame.pose() * point.location();
            if p_cam.z <= 0.0 {
                continue;
            }
            let projected = frame.camera().project_one(&p_cam.coords);
            let observed = na::Vector2::new(observed.x as f64, observed.y as f64);
            total += (projected - observed).norm();
            count += 1;
        }
        if count == 0 {
            (0.0, 0)
        } else {
            (total / count as f64, count)
        }
    }

    /// Mean reprojection error over every valid observation in the map.
    pub fn mean_reprojection_error(&self) -> Option<f64> {
        let (sum, count) = self
            .points
            .iter()
            .map(|p| {
                let (mean, n) = self.reprojection_error(p);
                (mean * n as f64, n)
            })
            .fold((0.0, 0), |(s, c), (ps, pc)| (s + ps, c + pc));
        if count == 0 {
            None
        } else {
            Some(sum / count as f64)
        }
    }
}
