use serde::{Deserialize, Serialize};

use crate::error::{MapError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriangulationConfig {
    /// Homogeneous `w` below this magnitude is treated as a point at infinity.
    pub min_homogeneous_w: f64,
    /// Maximum distance from the newest camera centre.
    pub max_distance: f64,
    /// Reject points that are not in front of both cameras.
    pub require_positive_depth: bool,
}

impl Default for TriangulationConfig {
    fn default() -> Self {
        Self {
            min_homogeneous_w: 1e-3,
            max_distance: 20.0,
            require_positive_depth: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaneConfig {
    pub distance_threshold: f64,
    pub max_iterations: usize,
    /// Fixed seed for reproducible sampling. `None` draws from OS entropy.
    pub seed: Option<u64>,
}

impl Default for PlaneConfig {
    fn default() -> Self {
        Self {
            distance_threshold: 0.1,
            max_iterations: 1000,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RadiusFilterConfig {
    pub radius: f64,
    pub min_neighbors: usize,
}

impl Default for RadiusFilterConfig {
    fn default() -> Self {
        Self {
            radius: 1.0,
            min_neighbors: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Run maintenance every `interval` processed frames.
    pub interval: usize,
    /// Maintenance is skipped until the map holds more points than this.
    pub min_points_for_maintenance: usize,
    pub reprojection_threshold: f64,
    pub min_points_reprojection: usize,
    /// At most `len / max_removal_fraction_divisor` points are pruned per pass.
    pub max_removal_fraction_divisor: usize,
    pub voxel_size: f64,
    pub min_points_downsample: usize,
    pub radius_filter: Option<RadiusFilterConfig>,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval: 10,
            min_points_for_maintenance: 50,
            reprojection_threshold: 3.0,
            min_points_reprojection: 10,
            max_removal_fraction_divisor: 10,
            voxel_size: 0.1,
            min_points_downsample: 50,
            radius_filter: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleAdjustmentConfig {
    pub enabled: bool,
    pub interval: usize,
    pub min_frames: usize,
    pub min_points: usize,
    pub max_iterations: usize,
    /// Huber loss scale in pixels, `None` for plain least squares.
    pub huber_scale: Option<f64>,
}

impl Default for BundleAdjustmentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: 5,
            min_frames: 3,
            min_points: 10,
            max_iterations: 20,
            huber_scale: Some(1.0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub image_width: u32,
    pub image_height: u32,
    pub plane_grid_half_extent: i32,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            image_width: 480,
            image_height: 270,
            plane_grid_half_extent: 10,
        }
    }
}

/// Top level configuration of the mapper.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    pub triangulation: TriangulationConfig,
    pub plane: PlaneConfig,
    pub maintenance: MaintenanceConfig,
    pub bundle_adjustment: BundleAdjustmentConfig,
    pub viewer: ViewerConfig,
}

fn ensure(cond: bool, msg: &str) -> Result<()> {
    if cond {
        Ok(())
    } else {
        Err(MapError::Config(msg.to_string()))
    }
}

impl MapperConfig {
    pub fn validate(&self) -> Result<()> {
        ensure(
            self.triangulation.max_distance > 0.0,
            "triangulation.max_distance must be positive",
        )?;
        ensure(
            self.triangulation.min_homogeneous_w >= 0.0,
            "triangulation.min_homogeneous_w must not be negative",
        )?;
        ensure(
            self.plane.distance_threshold > 0.0,
            "plane.distance_threshold must be positive",
        )?;
        ensure(
            self.maintenance.interval > 0,
            "maintenance.interval must be non-zero",
        )?;
        ensure(
            self.maintenance.voxel_size > 0.0,
            "maintenance.voxel_size must be positive",
        )?;
        ensure(
            self.maintenance.max_removal_fraction_divisor > 0,
            "maintenance.max_removal_fraction_divisor must be non-zero",
        )?;
        if let Some(radius) = &self.maintenance.radius_filter {
            ensure(radius.radius > 0.0, "radius_filter.radius must be positive")?;
        }
        ensure(
            self.bundle_adjustment.interval > 0,
            "bundle_adjustment.interval must be non-zero",
        )?;
        ensure(
            self.viewer.image_width > 0 && self.viewer.image_height > 0,
            "viewer image size must be non-zero",
        )?;
        Ok(())
    }
}
