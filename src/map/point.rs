use nalgebra as na;

use super::types::{FrameId, PointId};

/// A keypoint of a frame that sees a landmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub frame: FrameId,
    pub keypoint: usize,
}

impl Observation {
    pub fn new(frame: FrameId, keypoint: usize) -> Observation {
        Observation { frame, keypoint }
    }
}

/// A reconstructed 3D landmark.
#[derive(Debug, Clone)]
pub struct Point {
    id: PointId,
    location: na::Point3<f64>,
    observations: Vec<Observation>,
}

impl Point {
    pub(crate) fn new(id: PointId, location: na::Point3<f64>, observations: Vec<Observation>) -> Point {
        Point {
            id,
            location,
            observations,
        }
    }

    pub fn id(&self) -> PointId {
        self.id
    }

    pub fn location(&self) -> &na::Point3<f64> {
        &self.location
    }

    pub(crate) fn set_location(&mut self, location: na::Point3<f64>) {
        self.location = location;
    }

    /// Observations in the order they were added.
    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub(crate) fn push_observation(&mut self, observation: Observation) {
        self.observations.push(observation);
    }
}
