use log::debug;
use nalgebra as na;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::PlaneConfig;

const MIN_NORMAL_NORM: f64 = 1e-12;
/// Below this size the inlier count runs on one thread.
const PARALLEL_COUNT_THRESHOLD: usize = 4096;

/// Plane `n · x + d = 0` with a unit normal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    pub normal: [f64; 3],
    pub d: f64,
}

impl Plane {
    /// Plane through three points, `None` when they are collinear.
    pub fn from_points(
        p1: &na::Point3<f64>,
        p2: &na::Point3<f64>,
        p3: &na::Point3<f64>,
    ) -> Option<Plane> {
        let normal = (p2 - p1).cross(&(p3 - p1));
        let norm = normal.norm();
        if !norm.is_finite() || norm < MIN_NORMAL_NORM {
            return None;
        }
        let normal = normal / norm;
        let d = -normal.dot(&p1.coords);
        Some(Plane {
            normal: [normal.x, normal.y, normal.z],
            d,
        })
    }

    pub fn na_normal(&self) -> na::Vector3<f64> {
        na::Vector3::new(self.normal[0], self.normal[1], self.normal[2])
    }

    /// `[nx, ny, nz, d]`
    pub fn coefficients(&self) -> [f64; 4] {
        [self.normal[0], self.normal[1], self.normal[2], self.d]
    }

    pub fn signed_distance(&self, p: &na::Point3<f64>) -> f64 {
        self.na_normal().dot(&p.coords) + self.d
    }

    /// Samples the plane over an integer grid in `[-half_extent, half_extent)`.
    ///
    /// The grid spans the two axes the normal is least aligned with and the
    /// third coordinate is solved from the plane equation, so a ground plane
    /// with a `y` normal is sampled over `x, z`.
    pub fn sample_grid(&self, half_extent: i32) -> Vec<na::Point3<f64>> {
        let n = self.normal;
        let axis = (0..3)
            .max_by(|&a, &b| n[a].abs().total_cmp(&n[b].abs()))
            .unwrap_or(2);
        if n[axis].abs() < 1e-9 {
            return Vec::new();
        }
        let (u, v) = ((axis + 1) % 3, (axis + 2) % 3);
        (-half_extent..half_extent)
            .flat_map(|a| {
                (-half_extent..half_extent).map(move |b| {
                    let mut p = [0.0; 3];
                    p[u] = a as f64;
                    p[v] = b as f64;
                    p[axis] = (-self.d - n[u] * p[u] - n[v] * p[v]) / n[axis];
                    na::Point3::new(p[0], p[1], p[2])
                })
            })
            .collect()
    }
}

/// Result of a segmentation run. A missing plane means no ground this step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaneFit {
    pub plane: Option<Plane>,
    pub inliers: Vec<usize>,
}

/// RANSAC estimator for the dominant plane of a point cloud.
pub struct PlaneSegmenter {
    distance_threshold: f64,
    max_iterations: usize,
    rng: ChaCha8Rng,
}

impl PlaneSegmenter {
    pub fn new(config: &PlaneConfig) -> PlaneSegmenter {
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_os_rng(),
        };
        PlaneSegmenter {
            distance_threshold: config.distance_threshold,
            max_iterations: config.max_iterations,
            rng,
        }
    }

    fn count_inliers(&self, plane: &Plane, points: &[na::Point3<f64>]) -> usize {
        let is_inlier = |p: &na::Point3<f64>| plane.signed_distance(p).abs() < self.distance_threshold;
        if points.len() >= PARALLEL_COUNT_THRESHOLD {
            points.par_iter().filter(|p| is_inlier(*p)).count()
        } else {
            points.iter().filter(|p| is_inlier(*p)).count()
        }
    }

    fn collect_inliers(&self, plane: &Plane, points: &[na::Point3<f64>]) -> Vec<usize> {
        points
            .iter()
            .enumerate()
            .filter(|(_, p)| plane.signed_distance(p).abs() < self.distance_threshold)
            .map(|(i, _)| i)
            .collect()
    }

    /// Finds the plane with the most inliers. The first plane reaching the
    /// best count is kept on ties.
    ///
    /// Callers must pass at least three points; fewer yields an empty fit.
    pub fn segment(&mut self, points: &[na::Point3<f64>]) -> PlaneFit {
        if points.len() < 3 {
            debug!("plane segmentation skipped, only {} points", points.len());
            return PlaneFit::default();
        }
        let mut best_plane = None;
        let mut best_count = 0;
        let mut degenerate = 0;
        for _ in 0..self.max_iterations {
            let sample = rand::seq::index::sample(&mut self.rng, points.len(), 3);
            let Some(plane) = Plane::from_points(
                &points[sample.index(0)],
                &points[sample.index(1)],
                &points[sample.index(2)],
            ) else {
                degenerate += 1;
                continue;
            };
            let count = self.count_inliers(&plane, points);
            if count > best_count {
                best_count = count;
                best_plane = Some(plane);
            }
        }
        if degenerate > 0 {
            debug!("{} degenerate plane samples skipped", degenerate);
        }
        match best_plane {
            Some(plane) => PlaneFit {
                inliers: self.collect_inliers(&plane, points),
                plane: Some(plane),
            },
            None => PlaneFit::default(),
        }
    }
}
