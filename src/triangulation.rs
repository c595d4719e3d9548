//! Linear two-view triangulation.
//!
//! Poses are world-to-camera transforms, so `[R | t]` of each pose is the
//! projection matrix for normalized image coordinates.

use nalgebra as na;

use crate::config::TriangulationConfig;
use crate::error::{MapError, Result};
use crate::types::camera_center;

/// Relative size of the second-smallest singular value under which the
/// null space is not unique (parallel rays, zero baseline).
const RANK_DEFICIENT_RATIO: f64 = 1e-9;

/// Triangulates one correspondence with the DLT.
///
/// Returns the unit-norm homogeneous point. When the system has no unique
/// solution the zero vector is returned, which any `w` guard rejects.
pub fn triangulate_one(
    pose_a: &na::Isometry3<f64>,
    pose_b: &na::Isometry3<f64>,
    xa: &na::Vector2<f64>,
    xb: &na::Vector2<f64>,
) -> na::Vector4<f64> {
    let pa = pose_a.to_homogeneous();
    let pb = pose_b.to_homogeneous();
    let mut a = na::Matrix4::<f64>::zeros();
    a.set_row(0, &(pa.row(2) * xa.x - pa.row(0)));
    a.set_row(1, &(pa.row(2) * xa.y - pa.row(1)));
    a.set_row(2, &(pb.row(2) * xb.x - pb.row(0)));
    a.set_row(3, &(pb.row(2) * xb.y - pb.row(1)));

    let svd = a.svd(false, true);
    let Some(v_t) = svd.v_t else {
        return na::Vector4::zeros();
    };
    let mut order: Vec<usize> = (0..4).collect();
    order.sort_by(|&i, &j| svd.singular_values[i].total_cmp(&svd.singular_values[j]));
    let largest = svd.singular_values[order[3]];
    if largest <= 0.0 || svd.singular_values[order[1]] <= largest * RANK_DEFICIENT_RATIO {
        return na::Vector4::zeros();
    }
    v_t.row(order[0]).transpose()
}

/// Triangulates matched normalized coordinates pairwise.
pub fn triangulate(
    pose_a: &na::Isometry3<f64>,
    pose_b: &na::Isometry3<f64>,
    pts_a: &[na::Vector2<f64>],
    pts_b: &[na::Vector2<f64>],
) -> Result<Vec<na::Vector4<f64>>> {
    if pts_a.len() != pts_b.len() {
        return Err(MapError::MismatchedInput {
            left: pts_a.len(),
            right: pts_b.len(),
        });
    }
    Ok(pts_a
        .iter()
        .zip(pts_b)
        .map(|(xa, xb)| triangulate_one(pose_a, pose_b, xa, xb))
        .collect())
}

/// Acceptance test applied to triangulated points before they enter the map.
#[derive(Debug, Clone)]
pub struct TriangulationFilter {
    pub min_homogeneous_w: f64,
    pub max_distance: f64,
    pub require_positive_depth: bool,
}

impl From<&TriangulationConfig> for TriangulationFilter {
    fn from(config: &TriangulationConfig) -> Self {
        TriangulationFilter {
            min_homogeneous_w: config.min_homogeneous_w,
            max_distance: config.max_distance,
            require_positive_depth: config.require_positive_depth,
        }
    }
}

impl Default for TriangulationFilter {
    fn default() -> Self {
        TriangulationFilter::from(&TriangulationConfig::default())
    }
}

impl TriangulationFilter {
    /// Dehomogenizes `x_h` and returns it if it passes.
    ///
    /// The `w` guard is applied to the unit-norm vector, so any scaling of
    /// `x_h` gives the same answer. `newest` is the pose the distance bound is
    /// measured from.
    pub fn accept(
        &self,
        x_h: &na::Vector4<f64>,
        newest: &na::Isometry3<f64>,
        other: &na::Isometry3<f64>,
    ) -> Option<na::Point3<f64>> {
        let norm = x_h.norm();
        if !norm.is_finite() || norm <= 0.0 {
            return None;
        }
        let w = x_h[3];
        if (w / norm).abs() <= self.min_homogeneous_w {
            return None;
        }
        let p = na::Point3::new(x_h[0] / w, x_h[1] / w, x_h[2] / w);
        if (p - camera_center(newest)).norm() >= self.max_distance {
            return None;
        }
        if self.require_positive_depth
            && ((newest * p).z <= 0.0 || (other * p).z <= 0.0)
        {
            return None;
        }
        Some(p)
    }
}
