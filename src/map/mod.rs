//! Canonical registry of frames and landmarks.
//!
//! Frames and points live in arenas addressed by stable integer handles.
//! Points reference the frames that observe them, frames never reference
//! points, so pruning a point needs no frame-side cleanup.

mod frame;
mod point;
mod store;
mod types;

pub use frame::Frame;
pub use point::{Observation, Point};
pub use store::MapStore;
pub use types::{FrameId, PointId};
