use thiserror::Error;

use crate::map::{FrameId, PointId};

/// Errors surfaced by the mapping crate.
///
/// Degenerate geometry (parallel rays, empty RANSAC result, maps too small to
/// maintain) is not an error; those cases come back as `None` or empty sets.
#[derive(Error, Debug)]
pub enum MapError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unknown frame {0}")]
    UnknownFrame(FrameId),

    #[error("unknown point {0}")]
    UnknownPoint(PointId),

    #[error("keypoint index {index} out of range for frame {frame} with {len} keypoints")]
    InvalidObservation {
        frame: FrameId,
        index: usize,
        len: usize,
    },

    #[error("point {0} created without observations")]
    NoObservations(PointId),

    #[error("mismatched input lengths: {left} vs {right}")]
    MismatchedInput { left: usize, right: usize },

    #[error("viewer error: {0}")]
    Viewer(String),
}

impl From<rerun::RecordingStreamError> for MapError {
    fn from(e: rerun::RecordingStreamError) -> Self {
        MapError::Viewer(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MapError>;
