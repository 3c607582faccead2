//! Per-frame transform pipeline
//!
//! Pure function from (raw frame, calibration state) to the displayed frame:
//! normalize to the working canvas, crop to the clamped zoom ROI, resize the
//! crop back up, then warp the keystone quadrilateral onto the canvas
//! corners. Also hands back the intermediate images the calibration overlays
//! draw on. No I/O happens in here.

use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::config::{
    CalibrationState, Point, Roi, CANVAS_HEIGHT, CANVAS_WIDTH, MIN_ROI_EXTENT,
};
use crate::transform::PerspectiveMap;

/// One processed frame, with the intermediates calibration mode displays.
pub struct FrameView {
    /// Final canvas-sized output.
    pub output: RgbImage,
    /// The raw frame normalized to the canvas (ROI overlay base).
    pub normalized: RgbImage,
    /// The crop-resized frame fed to the keystone warp (keystone overlay base).
    pub zoomed: RgbImage,
    /// The ROI actually cropped this frame, after clamping.
    pub roi: Roi,
}

/// The canvas corners in keystone point order (TL, TR, BR, BL).
pub fn canvas_corners() -> [(f64, f64); 4] {
    let (w, h) = (CANVAS_WIDTH as f64, CANVAS_HEIGHT as f64);
    [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)]
}

/// Clamp a zoom ROI into the canvas.
///
/// Position is clamped so at least the minimum extent remains available, then
/// width and height are clamped between the minimum extent and the remaining
/// span. The result always lies fully inside the canvas.
pub fn clamp_roi(roi: Roi) -> Roi {
    let (cw, ch) = (CANVAS_WIDTH as i32, CANVAS_HEIGHT as i32);
    let x = roi.x.clamp(0, cw - MIN_ROI_EXTENT);
    let y = roi.y.clamp(0, ch - MIN_ROI_EXTENT);
    let w = roi.w.clamp(MIN_ROI_EXTENT, cw - x);
    let h = roi.h.clamp(MIN_ROI_EXTENT, ch - y);
    Roi::new(x, y, w, h)
}

/// Run the full pipeline for one captured frame.
pub fn process(raw: &RgbImage, cal: &CalibrationState) -> FrameView {
    let normalized = normalize(raw);
    let roi = clamp_roi(cal.zoom_roi);
    let zoomed = zoom(&normalized, roi);
    let output = keystone(&zoomed, &cal.points);

    FrameView {
        output,
        normalized,
        zoomed,
        roi,
    }
}

/// Resize the raw frame to the working canvas. Calibration coordinates are
/// expressed in this space, whatever the capture resolution was.
fn normalize(raw: &RgbImage) -> RgbImage {
    if raw.dimensions() == (CANVAS_WIDTH, CANVAS_HEIGHT) {
        raw.clone()
    } else {
        imageops::resize(raw, CANVAS_WIDTH, CANVAS_HEIGHT, FilterType::Triangle)
    }
}

/// Crop the clamped ROI and scale it back up to the canvas. A zero-area crop
/// cannot occur after clamping, but is guarded anyway by falling back to the
/// full normalized frame unmodified.
fn zoom(normalized: &RgbImage, roi: Roi) -> RgbImage {
    if roi.w <= 0 || roi.h <= 0 {
        return normalized.clone();
    }
    let crop =
        imageops::crop_imm(normalized, roi.x as u32, roi.y as u32, roi.w as u32, roi.h as u32)
            .to_image();
    if crop.width() == 0 || crop.height() == 0 {
        return normalized.clone();
    }
    if crop.dimensions() == (CANVAS_WIDTH, CANVAS_HEIGHT) {
        crop
    } else {
        imageops::resize(&crop, CANVAS_WIDTH, CANVAS_HEIGHT, FilterType::Triangle)
    }
}

/// Warp the keystone quadrilateral onto the canvas corners.
fn keystone(zoomed: &RgbImage, points: &[Point; 4]) -> RgbImage {
    let src = [
        (points[0].x, points[0].y),
        (points[1].x, points[1].y),
        (points[2].x, points[2].y),
        (points[3].x, points[3].y),
    ];
    let map = PerspectiveMap::new(src, canvas_corners());
    map.warp(zoomed, CANVAS_WIDTH, CANVAS_HEIGHT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x * 7 + y * 3) % 256) as u8])
        })
    }

    #[test]
    fn test_clamp_roi_bounds() {
        for roi in [
            Roi::new(-100, -100, 2000, 2000),
            Roi::new(700, 500, 50, 50),
            Roi::new(0, 0, 0, 0),
            Roi::new(635, 475, 20, 20),
            Roi::new(100, 100, 50, 50),
        ] {
            let c = clamp_roi(roi);
            assert!(c.x >= 0 && c.x <= 630, "{:?}", c);
            assert!(c.y >= 0 && c.y <= 470, "{:?}", c);
            assert!(c.w >= 10 && c.h >= 10, "{:?}", c);
            assert!(c.x + c.w <= 640, "{:?}", c);
            assert!(c.y + c.h <= 480, "{:?}", c);
        }
    }

    #[test]
    fn test_clamp_roi_floors_negative_undersized() {
        assert_eq!(clamp_roi(Roi::new(-50, -50, 5, 5)), Roi::new(0, 0, 10, 10));
    }

    #[test]
    fn test_clamp_roi_passes_valid_through() {
        let roi = Roi::new(100, 100, 50, 50);
        assert_eq!(clamp_roi(roi), roi);
    }

    #[test]
    fn test_identity_calibration_is_idempotent() {
        let frame = gradient(CANVAS_WIDTH, CANVAS_HEIGHT);
        let cal = CalibrationState::default();

        let view = process(&frame, &cal);
        assert_eq!(view.output, frame);
        assert_eq!(view.normalized, frame);
        assert_eq!(view.zoomed, frame);
        assert_eq!(view.roi, Roi::new(0, 0, 640, 480));
    }

    #[test]
    fn test_crop_scenario_matches_resized_crop() {
        let frame = gradient(CANVAS_WIDTH, CANVAS_HEIGHT);
        let mut cal = CalibrationState::default();
        cal.zoom_roi = Roi::new(100, 100, 50, 50);

        let expected = imageops::resize(
            &imageops::crop_imm(&frame, 100, 100, 50, 50).to_image(),
            CANVAS_WIDTH,
            CANVAS_HEIGHT,
            FilterType::Triangle,
        );

        let view = process(&frame, &cal);
        assert_eq!(view.roi, Roi::new(100, 100, 50, 50));
        assert_eq!(view.zoomed, expected);
        // Points are the canvas corners, so the warp is the identity.
        assert_eq!(view.output, expected);
    }

    #[test]
    fn test_non_canvas_input_is_normalized() {
        let frame = gradient(320, 240);
        let cal = CalibrationState::default();

        let view = process(&frame, &cal);
        assert_eq!(view.normalized.dimensions(), (CANVAS_WIDTH, CANVAS_HEIGHT));
        assert_eq!(view.output.dimensions(), (CANVAS_WIDTH, CANVAS_HEIGHT));
    }

    #[test]
    fn test_off_canvas_corner_produces_output() {
        let frame = gradient(CANVAS_WIDTH, CANVAS_HEIGHT);
        let mut cal = CalibrationState::default();
        cal.points[0] = Point::new(700.0, 700.0);

        let view = process(&frame, &cal);
        assert_eq!(view.output.dimensions(), (CANVAS_WIDTH, CANVAS_HEIGHT));
    }

    #[test]
    fn test_collinear_corners_produce_output() {
        let frame = gradient(CANVAS_WIDTH, CANVAS_HEIGHT);
        let mut cal = CalibrationState::default();
        cal.points = [
            Point::new(0.0, 0.0),
            Point::new(100.0, 100.0),
            Point::new(200.0, 200.0),
            Point::new(300.0, 300.0),
        ];

        let view = process(&frame, &cal);
        assert_eq!(view.output.dimensions(), (CANVAS_WIDTH, CANVAS_HEIGHT));
    }
}
