use std::time::Instant;

use clap::Parser;
use indicatif::ProgressIterator;
use monocular_mapping::config::MapperConfig;
use monocular_mapping::io::{config_from_json, write_map_json, write_report};
use monocular_mapping::pipeline::Mapper;
use monocular_mapping::synthetic::{SceneConfig, SyntheticScene};
use monocular_mapping::visualization::{spawn_viewer, MapSnapshot};

#[derive(Parser)]
#[command(version, about, author)]
struct MonoMapperCli {
    /// number of synthetic frames to process
    #[arg(long, default_value = "60")]
    frames: usize,

    /// mapper configuration json, defaults are used for missing fields
    #[arg(long)]
    config: Option<String>,

    /// keypoint noise in pixels
    #[arg(long, default_value = "0.5")]
    noise: f64,

    /// seed of the synthetic scene and of RANSAC
    #[arg(long, default_value = "7")]
    seed: u64,

    /// stream to a spawned rerun viewer
    #[arg(long, action)]
    spawn_viewer: bool,

    /// save the rerun recording to this path
    #[arg(long)]
    save: Option<String>,

    /// export the final map as json
    #[arg(long)]
    export: Option<String>,

    /// write a text report
    #[arg(long)]
    report: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = MonoMapperCli::parse();

    let mut config = match &cli.config {
        Some(path) => config_from_json(path)?,
        None => MapperConfig::default(),
    };
    if config.plane.seed.is_none() {
        config.plane.seed = Some(cli.seed);
    }

    let scene = SyntheticScene::generate(&SceneConfig {
        num_frames: cli.frames,
        pixel_noise: cli.noise,
        seed: cli.seed,
        ..Default::default()
    });
    log::info!(
        "synthetic scene with {} landmarks and {} frames",
        scene.landmarks.len(),
        scene.frames.len()
    );

    let viewer_config = config.viewer.clone();
    let (mut mapper, channels) = Mapper::new(config, scene.camera.clone(), scene.matcher())?;

    let recording = if cli.spawn_viewer {
        Some(rerun::RecordingStreamBuilder::new("mono_mapper").spawn()?)
    } else if let Some(path) = &cli.save {
        Some(rerun::RecordingStreamBuilder::new("mono_mapper").save(path)?)
    } else {
        None
    };
    let viewer = recording
        .clone()
        .map(|rec| spawn_viewer(channels, rec, viewer_config));

    let now = Instant::now();
    for frame in scene.frames.iter().progress_count(scene.frames.len() as u64) {
        mapper.process_frame(frame.keypoints.clone(), None)?;
    }
    let duration_sec = now.elapsed().as_secs_f64();
    println!("mapping took {:.6} sec", duration_sec);
    println!(
        "avg: {} sec",
        duration_sec / scene.frames.len().max(1) as f64
    );

    let store = mapper.store();
    println!("frames: {}", store.frame_count());
    println!("points: {}", store.point_count());
    if let Some(err) = store.mean_reprojection_error() {
        println!("mean reprojection error: {:.5} px", err);
    }
    if let Some(plane) = &mapper.plane_fit().plane {
        println!(
            "plane: {:?} with {} inliers",
            plane.coefficients(),
            mapper.plane_fit().inliers.len()
        );
    }

    if let Some(path) = &cli.export {
        let snapshot = MapSnapshot::capture(mapper.frame_counter() as u64, store, mapper.plane_fit());
        write_map_json(path, &snapshot)?;
    }
    if let Some(path) = &cli.report {
        write_report(path, store, mapper.plane_fit())?;
    }

    // Closing the channels lets the viewer log the last values and exit.
    drop(mapper);
    if let Some(handle) = viewer {
        if handle.join().is_err() {
            log::warn!("viewer thread panicked");
        }
    }
    if let Some(rec) = recording {
        rec.flush_blocking();
    }
    Ok(())
}
