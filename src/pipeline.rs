//! Per-frame control flow: match, triangulate, refine, prune, segment, publish.

use std::sync::Arc;

use image::RgbImage;
use log::{debug, warn};
use nalgebra as na;

use crate::camera_model::{CameraModel, PinholeCamera};
use crate::config::MapperConfig;
use crate::error::Result;
use crate::maintenance::{MaintenanceReport, MapMaintainer};
use crate::map::{Frame, FrameId, MapStore, Observation};
use crate::optimization::{BundleAdjuster, BundleAdjustmentReport};
use crate::plane::{PlaneFit, PlaneSegmenter};
use crate::triangulation::{triangulate, TriangulationFilter};
use crate::visualization::annotate::annotate_frame;
use crate::visualization::{ViewerChannels, VisualizationBridge};

/// Correspondences between the newest frame and the one before it.
#[derive(Debug, Clone)]
pub struct FrameMatch {
    /// `(newer keypoint index, older keypoint index)`.
    pub pairs: Vec<(usize, usize)>,
    /// Maps the older camera frame into the newer one.
    pub relative: na::Isometry3<f64>,
}

/// Feature matching and relative pose estimation between consecutive frames.
pub trait Matcher {
    /// Returns `None` when there are too few matches to estimate motion.
    fn match_frames(&mut self, previous: &Frame, current: &[glam::Vec2]) -> Option<FrameMatch>;
}

/// What happened while processing one frame.
#[derive(Debug, Clone, Default)]
pub struct FrameSummary {
    pub frame: Option<FrameId>,
    pub matches: usize,
    pub triangulated: usize,
    pub added_points: usize,
    pub bundle_adjustment: Option<BundleAdjustmentReport>,
    pub maintenance: Option<MaintenanceReport>,
    pub plane_inliers: usize,
    pub snapshot: u64,
}

pub struct Mapper<M: Matcher> {
    config: MapperConfig,
    camera: Arc<PinholeCamera<f64>>,
    matcher: M,
    store: MapStore,
    filter: TriangulationFilter,
    segmenter: PlaneSegmenter,
    maintainer: MapMaintainer,
    adjuster: BundleAdjuster,
    bridge: VisualizationBridge,
    plane_fit: PlaneFit,
    frame_counter: usize,
}

impl<M: Matcher> Mapper<M> {
    /// Builds a mapper and the channels a renderer reads from.
    pub fn new(
        config: MapperConfig,
        camera: PinholeCamera<f64>,
        matcher: M,
    ) -> Result<(Mapper<M>, ViewerChannels)> {
        config.validate()?;
        let (bridge, channels) = VisualizationBridge::new();
        let mapper = Mapper {
            filter: TriangulationFilter::from(&config.triangulation),
            segmenter: PlaneSegmenter::new(&config.plane),
            maintainer: MapMaintainer::new(config.maintenance.clone()),
            adjuster: BundleAdjuster::new(config.bundle_adjustment.clone()),
            camera: Arc::new(camera),
            matcher,
            store: MapStore::new(),
            bridge,
            plane_fit: PlaneFit::default(),
            frame_counter: 0,
            config,
        };
        Ok((mapper, channels))
    }

    pub fn store(&self) -> &MapStore {
        &self.store
    }

    pub fn plane_fit(&self) -> &PlaneFit {
        &self.plane_fit
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    pub fn frame_counter(&self) -> usize {
        self.frame_counter
    }

    /// Processes the keypoints of the next image.
    ///
    /// The first frame only anchors the map. A failed match still appends
    /// the frame, with the previous pose, but creates no points.
    pub fn process_frame(
        &mut self,
        keypoints: Vec<glam::Vec2>,
        image: Option<&RgbImage>,
    ) -> Result<FrameSummary> {
        self.frame_counter += 1;
        let mut summary = FrameSummary::default();

        let Some(previous) = self.store.last_frame() else {
            summary.frame = Some(self.store.add_frame(None, keypoints, self.camera.clone()));
            self.publish(&[], image, &mut summary);
            return Ok(summary);
        };
        let previous_id = previous.id();
        let frame_match = self.matcher.match_frames(previous, &keypoints);
        let frame_id = self.store.add_frame(
            frame_match.as_ref().map(|m| &m.relative),
            keypoints,
            self.camera.clone(),
        );
        if frame_match.is_none() {
            warn!("no match for frame {}, keeping the pose of {}", frame_id, previous_id);
        }
        summary.frame = Some(frame_id);

        let pairs = frame_match.map(|m| m.pairs).unwrap_or_default();
        summary.matches = pairs.len();
        if !pairs.is_empty() {
            self.add_points(frame_id, previous_id, &pairs, &mut summary)?;
        }

        if self.adjuster.is_due(self.frame_counter, &self.store) {
            summary.bundle_adjustment = self.adjuster.optimize(&mut self.store);
        }
        if self.maintainer.is_due(self.frame_counter, &self.store) {
            summary.maintenance = Some(self.maintainer.run(&mut self.store));
        }

        self.plane_fit = if self.store.point_count() >= 3 {
            self.segmenter.segment(&self.store.locations())
        } else {
            PlaneFit::default()
        };
        summary.plane_inliers = self.plane_fit.inliers.len();
        debug!(
            "frame {}: {} matches, {} added, {} points, {} plane inliers",
            frame_id,
            summary.matches,
            summary.added_points,
            self.store.point_count(),
            summary.plane_inliers
        );

        self.publish(&pairs, image, &mut summary);
        Ok(summary)
    }

    fn add_points(
        &mut self,
        newer: FrameId,
        older: FrameId,
        pairs: &[(usize, usize)],
        summary: &mut FrameSummary,
    ) -> Result<()> {
        let (Some(f_new), Some(f_old)) = (self.store.frame(newer), self.store.frame(older)) else {
            return Ok(());
        };
        let camera = f_new.camera();
        let mut px_new = Vec::with_capacity(pairs.len());
        let mut px_old = Vec::with_capacity(pairs.len());
        let mut kept = Vec::with_capacity(pairs.len());
        for &(i_new, i_old) in pairs {
            if let (Some(a), Some(b)) = (f_new.keypoint(i_new), f_old.keypoint(i_old)) {
                px_new.push(na::Vector2::new(a.x as f64, a.y as f64));
                px_old.push(na::Vector2::new(b.x as f64, b.y as f64));
                kept.push((i_new, i_old));
            }
        }
        let xs_new: Vec<_> = camera.unproject(&px_new).iter().map(|x| x.xy()).collect();
        let xs_old: Vec<_> = camera.unproject(&px_old).iter().map(|x| x.xy()).collect();
        let pose_new = *f_new.pose();
        let pose_old = *f_old.pose();
        let homogeneous = triangulate(&pose_new, &pose_old, &xs_new, &xs_old)?;
        summary.triangulated = homogeneous.len();

        for (x_h, (i_new, i_old)) in homogeneous.iter().zip(kept) {
            let Some(p) = self.filter.accept(x_h, &pose_new, &pose_old) else {
                continue;
            };
            self.store.add_point(
                p,
                &[Observation::new(newer, i_new), Observation::new(older, i_old)],
            )?;
            summary.added_points += 1;
        }
        Ok(())
    }

    fn publish(&mut self, pairs: &[(usize, usize)], image: Option<&RgbImage>, summary: &mut FrameSummary) {
        summary.snapshot = self.bridge.publish_map(&self.store, &self.plane_fit);
        let frames = self.store.frames();
        let Some(frame) = frames.last() else {
            return;
        };
        let previous = frames.len().checked_sub(2).and_then(|i| frames.get(i));
        let annotated = annotate_frame(
            image,
            &self.store,
            frame,
            previous,
            pairs,
            &self.plane_fit,
            self.config.viewer.plane_grid_half_extent,
        );
        self.bridge.publish_image(annotated);
    }
}
