//! Joint refinement of free camera poses and point locations.
//!
//! The first frame anchors the world and is never a variable. Each accepted
//! observation becomes one two-dimensional pixel residual; the problem is
//! solved with Levenberg-Marquardt and applied only when the plain squared
//! reprojection error goes down.

use std::collections::{BTreeSet, HashMap};

use log::{debug, info, warn};
use nalgebra as na;
use tiny_solver::loss_functions::HuberLoss;
use tiny_solver::optimizer::OptimizerOptions;
use tiny_solver::Optimizer;

use super::factors::{FixedPoseReprojectionFactor, ReprojectionFactor};
use crate::camera_model::CameraModel;
use crate::config::BundleAdjustmentConfig;
use crate::map::{FrameId, MapStore, PointId};
use crate::types::{RvecTvec, ToRvecTvec};

/// The observation arrays of one adjustment problem.
///
/// `observations[i]` is the pixel seen by frame `frame_ids[camera_indices[i]]`
/// of point `point_ids[point_indices[i]]`.
#[derive(Debug, Clone, Default)]
pub struct BundleProblem {
    pub observations: Vec<glam::Vec2>,
    pub point_indices: Vec<usize>,
    pub camera_indices: Vec<usize>,
    pub point_ids: Vec<PointId>,
    pub frame_ids: Vec<FrameId>,
}

impl BundleProblem {
    /// Gathers points with at least two observations in front of their camera.
    pub fn collect(store: &MapStore) -> BundleProblem {
        let mut problem = BundleProblem::default();
        let mut frame_index: HashMap<FrameId, usize> = HashMap::new();
        for point in store.points() {
            let valid: Vec<_> = point
                .observations()
                .iter()
                .filter_map(|obs| {
                    let frame = store.frame(obs.frame)?;
                    let p2d = frame.keypoint(obs.keypoint)?;
                    ((frame.pose() * point.location()).z > 0.0).then_some((obs.frame, *p2d))
                })
                .collect();
            if valid.len() < 2 {
                continue;
            }
            let point_idx = problem.point_ids.len();
            problem.point_ids.push(point.id());
            for (frame_id, p2d) in valid {
                let camera_idx = *frame_index.entry(frame_id).or_insert_with(|| {
                    problem.frame_ids.push(frame_id);
                    problem.frame_ids.len() - 1
                });
                problem.observations.push(p2d);
                problem.point_indices.push(point_idx);
                problem.camera_indices.push(camera_idx);
            }
        }
        problem
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BundleAdjustmentReport {
    pub observations: usize,
    pub free_frames: usize,
    pub points: usize,
    pub initial_cost: f64,
    pub final_cost: f64,
    pub applied: bool,
}

fn frame_keys(id: FrameId) -> (String, String) {
    (format!("r{}", id.0), format!("t{}", id.0))
}

fn point_key(id: PointId) -> String {
    format!("p{}", id.0)
}

pub struct BundleAdjuster {
    config: BundleAdjustmentConfig,
}

impl BundleAdjuster {
    pub fn new(config: BundleAdjustmentConfig) -> BundleAdjuster {
        BundleAdjuster { config }
    }

    pub fn config(&self) -> &BundleAdjustmentConfig {
        &self.config
    }

    /// Whether the processed-frame counter and map size call for a run.
    /// A zero interval never fires.
    pub fn is_due(&self, frame_counter: usize, store: &MapStore) -> bool {
        self.config.enabled
            && frame_counter.checked_rem(self.config.interval) == Some(0)
            && store.frame_count() >= self.config.min_frames
    }

    /// Sum of squared pixel residuals with the given poses and locations.
    fn cost(
        store: &MapStore,
        problem: &BundleProblem,
        poses: &[na::Isometry3<f64>],
        points: &[na::Point3<f64>],
    ) -> f64 {
        problem
            .observations
            .iter()
            .zip(&problem.point_indices)
            .zip(&problem.camera_indices)
            .map(|((p2d, &pi), &ci)| {
                let Some(frame) = store.frame(problem.frame_ids[ci]) else {
                    return 0.0;
                };
                let p_cam = poses[ci] * points[pi];
                let projected = frame.camera().project_one(&p_cam.coords);
                let observed = na::Vector2::new(p2d.x as f64, p2d.y as f64);
                (projected - observed).norm_squared()
            })
            .sum()
    }

    /// Refines the map in place. Returns `None` when there is nothing to solve.
    ///
    /// The store is left untouched unless the solve converges to a lower cost.
    pub fn optimize(&self, store: &mut MapStore) -> Option<BundleAdjustmentReport> {
        if store.frame_count() < self.config.min_frames
            || store.point_count() < self.config.min_points
        {
            return None;
        }
        let problem = BundleProblem::collect(store);
        if problem.is_empty() {
            return None;
        }
        let anchor = store.frames().first()?.id();

        let poses: Vec<na::Isometry3<f64>> = problem
            .frame_ids
            .iter()
            .map(|id| store.frame(*id).map(|f| *f.pose()))
            .collect::<Option<_>>()?;
        let points: Vec<na::Point3<f64>> = problem
            .point_ids
            .iter()
            .map(|id| store.point(*id).map(|p| *p.location()))
            .collect::<Option<_>>()?;
        let free_frames: BTreeSet<usize> = problem
            .frame_ids
            .iter()
            .enumerate()
            .filter(|(_, id)| **id != anchor)
            .map(|(i, _)| i)
            .collect();

        let mut solver_problem = tiny_solver::Problem::new();
        for ((p2d, &pi), &ci) in problem
            .observations
            .iter()
            .zip(&problem.point_indices)
            .zip(&problem.camera_indices)
        {
            let frame_id = problem.frame_ids[ci];
            let camera = store.frame(frame_id)?.camera().as_ref();
            let pkey = point_key(problem.point_ids[pi]);
            let loss = self
                .config
                .huber_scale
                .map(|s| Box::new(HuberLoss::new(s)) as Box<dyn tiny_solver::loss_functions::Loss + Send>);
            if free_frames.contains(&ci) {
                let (rkey, tkey) = frame_keys(frame_id);
                solver_problem.add_residual_block(
                    2,
                    &[&rkey, &tkey, &pkey],
                    Box::new(ReprojectionFactor::new(camera, p2d)),
                    loss,
                );
            } else {
                solver_problem.add_residual_block(
                    2,
                    &[&pkey],
                    Box::new(FixedPoseReprojectionFactor::new(camera, &poses[ci], p2d)),
                    loss,
                );
            }
        }

        let mut initial_values = HashMap::<String, na::DVector<f64>>::new();
        for &ci in &free_frames {
            let (rkey, tkey) = frame_keys(problem.frame_ids[ci]);
            let rt = poses[ci].to_rvec_tvec();
            initial_values.insert(rkey, rt.na_rvec());
            initial_values.insert(tkey, rt.na_tvec());
        }
        for (pi, id) in problem.point_ids.iter().enumerate() {
            let p = points[pi];
            initial_values.insert(point_key(*id), na::dvector![p.x, p.y, p.z]);
        }

        let initial_cost = Self::cost(store, &problem, &poses, &points);
        debug!(
            "bundle adjustment: {} observations, {} free frames, {} points, cost {:.4}",
            problem.observations.len(),
            free_frames.len(),
            points.len(),
            initial_cost
        );

        let optimizer = tiny_solver::LevenbergMarquardtOptimizer::default();
        let options = OptimizerOptions {
            max_iteration: self.config.max_iterations,
            ..Default::default()
        };
        let mut report = BundleAdjustmentReport {
            observations: problem.observations.len(),
            free_frames: free_frames.len(),
            points: points.len(),
            initial_cost,
            final_cost: initial_cost,
            applied: false,
        };
        let Some(result) = optimizer.optimize(&solver_problem, &initial_values, Some(options)) else {
            warn!("bundle adjustment did not converge, map left unchanged");
            return Some(report);
        };

        let mut new_poses = poses.clone();
        for &ci in &free_frames {
            let (rkey, tkey) = frame_keys(problem.frame_ids[ci]);
            let (Some(r), Some(t)) = (result.get(&rkey), result.get(&tkey)) else {
                warn!("bundle adjustment result misses frame {}", problem.frame_ids[ci]);
                return Some(report);
            };
            new_poses[ci] = RvecTvec::new(r, t).to_na_isometry3();
        }
        let mut new_points = points.clone();
        for (pi, id) in problem.point_ids.iter().enumerate() {
            let Some(p) = result.get(&point_key(*id)) else {
                warn!("bundle adjustment result misses point {}", id);
                return Some(report);
            };
            new_points[pi] = na::Point3::new(p[0], p[1], p[2]);
        }

        let final_cost = Self::cost(store, &problem, &new_poses, &new_points);
        report.final_cost = final_cost;
        if !final_cost.is_finite() || final_cost >= initial_cost {
            warn!(
                "bundle adjustment rejected, cost {:.4} -> {:.4}",
                initial_cost, final_cost
            );
            return Some(report);
        }

        for &ci in &free_frames {
            store.set_frame_pose(problem.frame_ids[ci], new_poses[ci]);
        }
        for (pi, id) in problem.point_ids.iter().enumerate() {
            store.set_point_location(*id, new_points[pi]);
        }
        report.applied = true;
        info!(
            "bundle adjustment applied, cost {:.4} -> {:.4}",
            initial_cost, final_cost
        );
        Some(report)
    }
}
