//! Incremental sparse mapping for monocular visual odometry.
//!
//! A [`pipeline::Mapper`] takes the keypoints of each new image, triangulates
//! matches against the previous frame into a [`map::MapStore`], periodically
//! refines and prunes the map, segments the dominant plane and publishes a
//! copy of the result to a renderer thread without blocking.

pub mod camera_model;
pub mod config;
pub mod error;
pub mod io;
pub mod maintenance;
pub mod map;
pub mod optimization;
pub mod pipeline;
pub mod plane;
pub mod synthetic;
pub mod triangulation;
pub mod types;
pub mod visualization;

pub use error::{MapError, Result};
