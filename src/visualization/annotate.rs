use image::{Rgb, RgbImage};
use nalgebra as na;

use crate::camera_model::CameraModel;
use crate::map::{Frame, MapStore};
use crate::plane::PlaneFit;

pub const INLIER_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const POINT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const PLANE_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
pub const MATCH_COLOR: Rgb<u8> = Rgb([0, 160, 255]);

fn put(img: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, color);
    }
}

pub fn draw_dot(img: &mut RgbImage, center: &na::Vector2<f64>, radius: i64, color: Rgb<u8>) {
    let (cx, cy) = (center.x.round() as i64, center.y.round() as i64);
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                put(img, cx + dx, cy + dy, color);
            }
        }
    }
}

/// Bresenham line, clipped per pixel.
pub fn draw_line(img: &mut RgbImage, from: &glam::Vec2, to: &glam::Vec2, color: Rgb<u8>) {
    let (mut x0, mut y0) = (from.x.round() as i64, from.y.round() as i64);
    let (x1, y1) = (to.x.round() as i64, to.y.round() as i64);
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        put(img, x0, y0, color);
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

/// Draws the map as seen from `frame` on top of `base`.
///
/// Points behind the camera or outside the image are not drawn.
/// `matches` pairs keypoint indices of `frame` with those of `previous`.
/// Without a base image the drawing goes onto a black canvas of the camera size.
pub fn annotate_frame(
    base: Option<&RgbImage>,
    store: &MapStore,
    frame: &Frame,
    previous: Option<&Frame>,
    matches: &[(usize, usize)],
    fit: &PlaneFit,
    grid_half_extent: i32,
) -> RgbImage {
    let camera = frame.camera();
    let mut img = match base {
        Some(b) => b.clone(),
        None => RgbImage::new(camera.width, camera.height),
    };
    let pose = frame.pose();

    if let Some(previous) = previous {
        for &(newer, older) in matches {
            if let (Some(a), Some(b)) = (previous.keypoint(older), frame.keypoint(newer)) {
                draw_line(&mut img, a, b, MATCH_COLOR);
            }
        }
    }

    let mut is_inlier = vec![false; store.point_count()];
    for &i in &fit.inliers {
        if let Some(flag) = is_inlier.get_mut(i) {
            *flag = true;
        }
    }
    let in_camera: Vec<na::Vector3<f64>> = store
        .points()
        .iter()
        .map(|p| (pose * p.location()).coords)
        .collect();
    for (uv, inlier) in camera.project(&in_camera).iter().zip(&is_inlier) {
        if let Some(uv) = uv {
            let color = if *inlier { INLIER_COLOR } else { POINT_COLOR };
            draw_dot(&mut img, uv, 2, color);
        }
    }

    if let Some(plane) = &fit.plane {
        let grid: Vec<na::Vector3<f64>> = plane
            .sample_grid(grid_half_extent)
            .iter()
            .map(|p| (pose * p).coords)
            .collect();
        for uv in camera.project(&grid).iter().flatten() {
            draw_dot(&mut img, uv, 1, PLANE_COLOR);
        }
    }
    img
}
