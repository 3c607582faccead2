//! Calibration-mode debug views
//!
//! Two annotated copies of the pipeline intermediates: the zoom selector view
//! (normalized frame + current ROI rectangle) and the keystone view
//! (crop-resized frame + corner handles and their connecting polygon).
//! imageproc clips anything that falls outside the image, which is exactly
//! what off-canvas corner handles need.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;

use crate::config::{Point, Roi};

const ROI_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const EDGE_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
const HANDLE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

const HANDLE_RADIUS: i32 = 6;

/// Normalized frame with the clamped ROI rectangle drawn on top.
pub fn roi_view(normalized: &RgbImage, roi: Roi) -> RgbImage {
    let mut view = normalized.clone();
    // Doubled outline for visibility against the video.
    draw_hollow_rect_mut(
        &mut view,
        Rect::at(roi.x, roi.y).of_size(roi.w as u32, roi.h as u32),
        ROI_COLOR,
    );
    if roi.w > 2 && roi.h > 2 {
        draw_hollow_rect_mut(
            &mut view,
            Rect::at(roi.x + 1, roi.y + 1).of_size(roi.w as u32 - 2, roi.h as u32 - 2),
            ROI_COLOR,
        );
    }
    view
}

/// Crop-resized frame with the keystone quadrilateral and corner handles.
pub fn keystone_view(zoomed: &RgbImage, points: &[Point; 4]) -> RgbImage {
    let mut view = zoomed.clone();

    for i in 0..4 {
        let a = points[i];
        let b = points[(i + 1) % 4];
        draw_line_segment_mut(
            &mut view,
            (a.x as f32, a.y as f32),
            (b.x as f32, b.y as f32),
            EDGE_COLOR,
        );
    }

    for p in points {
        draw_filled_circle_mut(
            &mut view,
            (p.x as i32, p.y as i32),
            HANDLE_RADIUS,
            HANDLE_COLOR,
        );
    }

    view
}
