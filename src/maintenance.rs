use std::collections::{HashMap, HashSet};

use log::{debug, info, warn};
use nalgebra as na;
use rayon::prelude::*;

use crate::config::{MaintenanceConfig, RadiusFilterConfig};
use crate::map::{MapStore, PointId};

/// Counts of points removed by one maintenance run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub reprojection_removed: usize,
    pub radius_removed: usize,
    pub downsample_removed: usize,
}

impl MaintenanceReport {
    pub fn total(&self) -> usize {
        self.reprojection_removed + self.radius_removed + self.downsample_removed
    }
}

/// Integer grid cell containing `p`.
pub fn voxel_key(p: &na::Point3<f64>, voxel_size: f64) -> (i64, i64, i64) {
    (
        (p.x / voxel_size).floor() as i64,
        (p.y / voxel_size).floor() as i64,
        (p.z / voxel_size).floor() as i64,
    )
}

/// Periodic pruning passes over a [`MapStore`].
#[derive(Debug, Clone, Default)]
pub struct MapMaintainer {
    config: MaintenanceConfig,
}

impl MapMaintainer {
    pub fn new(config: MaintenanceConfig) -> MapMaintainer {
        MapMaintainer { config }
    }

    pub fn config(&self) -> &MaintenanceConfig {
        &self.config
    }

    /// Whether the processed-frame counter and map size call for a run.
    ///
    /// A zero interval never fires.
    pub fn is_due(&self, frame_counter: usize, store: &MapStore) -> bool {
        frame_counter.checked_rem(self.config.interval) == Some(0)
            && store.point_count() > self.config.min_points_for_maintenance
    }

    /// Runs every enabled pass in order: reprojection, radius, voxel.
    pub fn run(&self, store: &mut MapStore) -> MaintenanceReport {
        let reprojection_removed = self.filter_by_reprojection_error(store);
        let radius_removed = match &self.config.radius_filter {
            Some(radius) => self.remove_radius_outliers(store, radius),
            None => 0,
        };
        let downsample_removed = self.downsample(store);
        let report = MaintenanceReport {
            reprojection_removed,
            radius_removed,
            downsample_removed,
        };
        info!(
            "maintenance removed {} points ({} reprojection, {} radius, {} voxel), {} left",
            report.total(),
            reprojection_removed,
            radius_removed,
            downsample_removed,
            store.point_count()
        );
        report
    }

    /// Removes points whose mean pixel error over more than two valid
    /// observations exceeds the threshold.
    ///
    /// Observations behind their camera are ignored. At most
    /// `len / max_removal_fraction_divisor` points go per call; the earliest
    /// candidates in store order are removed first and the rest wait for a
    /// later pass.
    pub fn filter_by_reprojection_error(&self, store: &mut MapStore) -> usize {
        let len = store.point_count();
        if len < self.config.min_points_reprojection {
            return 0;
        }
        let threshold = self.config.reprojection_threshold;
        let store_ref: &MapStore = store;
        let candidates: Vec<PointId> = store_ref
            .points()
            .par_iter()
            .filter_map(|p| {
                let (mean, count) = store_ref.reprojection_error(p);
                (count > 2 && mean > threshold).then_some(p.id())
            })
            .collect();
        let cap = len
            .checked_div(self.config.max_removal_fraction_divisor)
            .unwrap_or(0);
        let selected: HashSet<PointId> = candidates.iter().take(cap).copied().collect();
        if candidates.len() > cap {
            debug!(
                "reprojection filter capped at {} of {} candidates",
                cap,
                candidates.len()
            );
        }
        store.remove_point_ids(&selected)
    }

    /// Keeps the first point of every voxel in store order.
    pub fn downsample(&self, store: &mut MapStore) -> usize {
        if store.point_count() < self.config.min_points_downsample {
            return 0;
        }
        let voxel_size = self.config.voxel_size;
        let mut occupied = HashSet::new();
        store.remove_points(|p| !occupied.insert(voxel_key(p.location(), voxel_size)))
    }

    /// Removes points with fewer than `min_neighbors` other points within `radius`.
    ///
    /// A radius that is not a positive finite number leaves the map untouched.
    pub fn remove_radius_outliers(
        &self,
        store: &mut MapStore,
        radius_config: &RadiusFilterConfig,
    ) -> usize {
        let radius = radius_config.radius;
        if !(radius.is_finite() && radius > 0.0) {
            warn!("radius filter skipped, invalid radius {}", radius);
            return 0;
        }
        if store.point_count() < self.config.min_points_downsample {
            return 0;
        }
        let radius2 = radius * radius;
        let locations = store.locations();

        // Neighbours can only sit in the 27 cells around a point's cell.
        let mut grid: HashMap<(i64, i64, i64), Vec<usize>> = HashMap::new();
        for (i, p) in locations.iter().enumerate() {
            grid.entry(voxel_key(p, radius)).or_default().push(i);
        }
        let sparse: Vec<bool> = locations
            .par_iter()
            .enumerate()
            .map(|(i, p)| {
                let (kx, ky, kz) = voxel_key(p, radius);
                let mut neighbors = 0;
                for dx in -1..=1 {
                    for dy in -1..=1 {
                        for dz in -1..=1 {
                            let key = (
                                kx.saturating_add(dx),
                                ky.saturating_add(dy),
                                kz.saturating_add(dz),
                            );
                            let Some(cell) = grid.get(&key) else {
                                continue;
                            };
                            neighbors += cell
                                .iter()
                                .filter(|&&j| j != i && (locations[j] - p).norm_squared() < radius2)
                                .count();
                        }
                    }
                }
                neighbors < radius_config.min_neighbors
            })
            .collect();
        let mut idx = 0;
        store.remove_points(|_| {
            let remove = sparse[idx];
            idx += 1;
            remove
        })
    }
}
