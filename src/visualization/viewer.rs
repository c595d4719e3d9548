use std::thread;
use std::time::Duration;

use image::imageops::FilterType;
use log::{debug, warn};
use rerun::{RecordingStream, TimeCell};

use super::bridge::{FrameImage, MapSnapshot, ViewerChannels};
use crate::config::ViewerConfig;
use crate::error::Result;
use crate::plane::Plane;

const TICK: Duration = Duration::from_millis(30);

fn to_f32(p: &[f64; 3]) -> [f32; 3] {
    [p[0] as f32, p[1] as f32, p[2] as f32]
}

pub fn log_snapshot(
    recording: &RecordingStream,
    snapshot: &MapSnapshot,
    grid_half_extent: i32,
) -> Result<()> {
    recording.set_time("frame", TimeCell::from_sequence(snapshot.sequence as i64));

    let trajectory: Vec<[f32; 3]> = snapshot.centers.iter().map(to_f32).collect();
    recording.log(
        "world/trajectory",
        &rerun::LineStrips3D::new([trajectory]).with_colors([rerun::Color::from_rgb(0, 160, 255)]),
    )?;

    let points: Vec<[f32; 3]> = snapshot.points.iter().map(to_f32).collect();
    recording.log(
        "world/points",
        &rerun::Points3D::new(points)
            .with_colors([rerun::Color::from_rgb(255, 0, 0)])
            .with_radii([0.02]),
    )?;

    let inliers: Vec<[f32; 3]> = snapshot
        .inliers
        .iter()
        .filter_map(|&i| snapshot.points.get(i))
        .map(to_f32)
        .collect();
    recording.log(
        "world/inliers",
        &rerun::Points3D::new(inliers)
            .with_colors([rerun::Color::from_rgb(0, 255, 0)])
            .with_radii([0.04]),
    )?;

    let grid: Vec<[f32; 3]> = snapshot
        .plane
        .as_ref()
        .map(|plane: &Plane| {
            plane
                .sample_grid(grid_half_extent)
                .iter()
                .map(|p| [p.x as f32, p.y as f32, p.z as f32])
                .collect()
        })
        .unwrap_or_default();
    recording.log(
        "world/plane",
        &rerun::Points3D::new(grid)
            .with_colors([rerun::Color::from_rgb(255, 255, 0)])
            .with_radii([0.01]),
    )?;
    Ok(())
}

/// Logs the annotated frame on the `frame` timeline at its own sequence.
pub fn log_image(recording: &RecordingStream, frame: &FrameImage, config: &ViewerConfig) -> Result<()> {
    recording.set_time("frame", TimeCell::from_sequence(frame.sequence as i64));
    let resized = image::imageops::resize(
        &frame.image,
        config.image_width,
        config.image_height,
        FilterType::Triangle,
    );
    let (w, h) = resized.dimensions();
    recording.log(
        "camera/image",
        &rerun::Image::from_rgb24(resized.into_raw(), [w, h]),
    )?;
    Ok(())
}

/// Starts the render loop on its own thread.
///
/// The loop drains both channels every tick and logs only what changed.
/// It ends once the producer side of both channels is dropped; the handle
/// may be dropped to leave the thread detached.
pub fn spawn_viewer(
    mut channels: ViewerChannels,
    recording: RecordingStream,
    config: ViewerConfig,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        loop {
            if channels.snapshots.poll() {
                if let Some(snapshot) = channels.snapshots.held() {
                    if let Err(e) =
                        log_snapshot(&recording, snapshot, config.plane_grid_half_extent)
                    {
                        warn!("viewer failed to log snapshot {}: {}", snapshot.sequence, e);
                    }
                }
            }
            if channels.images.poll() {
                if let Some(frame) = channels.images.held() {
                    if let Err(e) = log_image(&recording, frame, &config) {
                        warn!("viewer failed to log image {}: {}", frame.sequence, e);
                    }
                }
            }
            if channels.snapshots.is_disconnected() && channels.images.is_disconnected() {
                debug!("viewer channels closed");
                break;
            }
            thread::sleep(TICK);
        }
    })
}
