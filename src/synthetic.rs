//! Synthetic street scene seen by a forward-moving camera.
//!
//! Landmarks on a ground plane and inside a few boxes are projected into
//! every frame with optional pixel noise. [`SyntheticMatcher`] matches frames
//! through the ground-truth landmark ids and reports the true relative motion.

use std::collections::HashMap;

use nalgebra as na;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::camera_model::PinholeCamera;
use crate::map::Frame;
use crate::pipeline::{FrameMatch, Matcher};
use crate::plane::Plane;

/// Camera height above the ground, `y` points down.
pub const GROUND_Y: f64 = 1.5;

/// 960x540 pinhole with a focal length of 450 pixels.
pub fn default_camera() -> PinholeCamera<f64> {
    let k = na::Matrix3::new(450.0, 0.0, 480.0, 0.0, 450.0, 270.0, 0.0, 0.0, 1.0);
    PinholeCamera::from_matrix(&k, 960, 540)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub num_frames: usize,
    pub ground_points: usize,
    pub object_points: usize,
    /// Forward distance travelled per frame.
    pub step: f64,
    /// Amplitude of the sideways sway.
    pub sway: f64,
    /// Standard deviation of the keypoint noise in pixels.
    pub pixel_noise: f64,
    pub seed: u64,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            num_frames: 30,
            ground_points: 600,
            object_points: 240,
            step: 0.3,
            sway: 0.5,
            pixel_noise: 0.5,
            seed: 7,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyntheticFrame {
    /// Ground-truth world-to-camera pose.
    pub pose: na::Isometry3<f64>,
    pub keypoints: Vec<glam::Vec2>,
    /// Landmark index of every keypoint.
    pub landmark_ids: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct SyntheticScene {
    pub camera: PinholeCamera<f64>,
    pub landmarks: Vec<na::Point3<f64>>,
    /// Number of leading landmarks that lie on [`SyntheticScene::ground`].
    pub ground_count: usize,
    pub frames: Vec<SyntheticFrame>,
}

/// World-to-camera pose of frame `i`. Frame 0 is the identity.
pub fn trajectory_pose(i: usize, config: &SceneConfig) -> na::Isometry3<f64> {
    let t = i as f64;
    let center = na::Vector3::new(config.sway * (0.2 * t).sin(), 0.0, config.step * t);
    let yaw = 0.02 * (0.1 * t).sin();
    let pose_wc = na::Isometry3::from_parts(
        na::Translation3::from(center),
        na::UnitQuaternion::from_axis_angle(&na::Vector3::y_axis(), yaw),
    );
    pose_wc.inverse()
}

fn box_points(
    rng: &mut ChaCha8Rng,
    count: usize,
    min: na::Point3<f64>,
    max: na::Point3<f64>,
) -> Vec<na::Point3<f64>> {
    (0..count)
        .map(|_| {
            na::Point3::new(
                rng.random_range(min.x..max.x),
                rng.random_range(min.y..max.y),
                rng.random_range(min.z..max.z),
            )
        })
        .collect()
}

impl SyntheticScene {
    pub fn generate(config: &SceneConfig) -> SyntheticScene {
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let depth = config.step * config.num_frames as f64 + 20.0;

        let mut landmarks: Vec<na::Point3<f64>> = (0..config.ground_points)
            .map(|_| {
                na::Point3::new(
                    rng.random_range(-8.0..8.0),
                    GROUND_Y,
                    rng.random_range(2.0..depth),
                )
            })
            .collect();
        let boxes = 4;
        for k in 0..boxes {
            let side = if k % 2 == 0 { -3.5 } else { 3.5 };
            let z = 6.0 + k as f64 * (depth - 6.0) / boxes as f64;
            landmarks.extend(box_points(
                &mut rng,
                config.object_points / boxes,
                na::Point3::new(side - 0.8, -1.0, z),
                na::Point3::new(side + 0.8, GROUND_Y - 0.3, z + 1.6),
            ));
        }

        let camera = default_camera();
        let frames = (0..config.num_frames)
            .map(|i| {
                let pose = trajectory_pose(i, config);
                let mut keypoints = Vec::new();
                let mut landmark_ids = Vec::new();
                for (id, p) in landmarks.iter().enumerate() {
                    if (pose * p).z < 0.5 {
                        continue;
                    }
                    let Some(uv) = camera.project_world(&pose, p) else {
                        continue;
                    };
                    if !camera.contains(&uv) {
                        continue;
                    }
                    let noise = if config.pixel_noise > 0.0 {
                        let nx: f64 = rng.sample(StandardNormal);
                        let ny: f64 = rng.sample(StandardNormal);
                        na::Vector2::new(nx, ny) * config.pixel_noise
                    } else {
                        na::Vector2::zeros()
                    };
                    keypoints.push(glam::Vec2::new(
                        (uv.x + noise.x) as f32,
                        (uv.y + noise.y) as f32,
                    ));
                    landmark_ids.push(id);
                }
                SyntheticFrame {
                    pose,
                    keypoints,
                    landmark_ids,
                }
            })
            .collect();

        SyntheticScene {
            camera,
            landmarks,
            ground_count: config.ground_points,
            frames,
        }
    }

    /// The ground plane `y = GROUND_Y` with an upward (negative `y`) normal.
    pub fn ground(&self) -> Plane {
        Plane {
            normal: [0.0, -1.0, 0.0],
            d: GROUND_Y,
        }
    }

    pub fn matcher(&self) -> SyntheticMatcher {
        SyntheticMatcher::new(self)
    }
}

/// Matches consecutive synthetic frames by landmark id.
#[derive(Debug, Clone)]
pub struct SyntheticMatcher {
    poses: Vec<na::Isometry3<f64>>,
    ids: Vec<HashMap<usize, usize>>,
    landmark_ids: Vec<Vec<usize>>,
    /// Fewer shared landmarks than this count as a failed match.
    pub min_matches: usize,
}

impl SyntheticMatcher {
    pub fn new(scene: &SyntheticScene) -> SyntheticMatcher {
        SyntheticMatcher {
            poses: scene.frames.iter().map(|f| f.pose).collect(),
            ids: scene
                .frames
                .iter()
                .map(|f| {
                    f.landmark_ids
                        .iter()
                        .enumerate()
                        .map(|(kp, id)| (*id, kp))
                        .collect()
                })
                .collect(),
            landmark_ids: scene.frames.iter().map(|f| f.landmark_ids.clone()).collect(),
            min_matches: 8,
        }
    }
}

impl Matcher for SyntheticMatcher {
    fn match_frames(&mut self, previous: &Frame, current: &[glam::Vec2]) -> Option<FrameMatch> {
        let older = previous.id().0 as usize;
        let newer = older + 1;
        let (older_ids, newer_lookup) = (self.landmark_ids.get(older)?, self.ids.get(newer)?);
        if current.len() != self.landmark_ids.get(newer)?.len() {
            return None;
        }
        let pairs: Vec<(usize, usize)> = older_ids
            .iter()
            .enumerate()
            .filter_map(|(i_old, id)| newer_lookup.get(id).map(|&i_new| (i_new, i_old)))
            .collect();
        if pairs.len() < self.min_matches {
            return None;
        }
        Some(FrameMatch {
            pairs,
            relative: self.poses[newer] * self.poses[older].inverse(),
        })
    }
}
