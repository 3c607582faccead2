//! Render/input loop
//!
//! One thread owns the capture device, the window surfaces and the
//! calibration state. Each iteration acquires a frame, runs the transform
//! pipeline, presents the result, and (in calibration mode) presents the two
//! overlay views and feeds their pointer events to the interaction handlers.
//! Every way out of the loop ends at the same shutdown path: persist the
//! state, then drop the stream, device and windows.

use anyhow::Result;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::capture;
use crate::config::{self, CalibrationState, CANVAS_HEIGHT, CANVAS_WIDTH};
use crate::display::{KeyCommand, Surface};
use crate::interact::{CornerDragger, ZoomSelector};
use crate::overlay;
use crate::pipeline;

const MAIN_TITLE: &str = "Rear View";
const ZOOM_TITLE: &str = "Zoom Selector";
const KEYSTONE_TITLE: &str = "Keystone Adjust";

/// What a keyboard command asks the loop to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Continue,
    PushExposure,
    Quit,
}

/// Apply a keyboard command to the calibration state.
fn apply_command(cmd: KeyCommand, cal: &mut CalibrationState) -> Outcome {
    match cmd {
        KeyCommand::Quit => Outcome::Quit,
        KeyCommand::Reset => {
            cal.zoom_roi = config::default_roi();
            cal.points = config::default_points();
            Outcome::Continue
        }
        KeyCommand::ExposureUp => {
            cal.exposure += 1;
            Outcome::PushExposure
        }
        KeyCommand::ExposureDown => {
            cal.exposure -= 1;
            Outcome::PushExposure
        }
    }
}

pub fn run(calib_mode: bool) -> Result<()> {
    let config_file = config::config_path();
    let mut cal = config::load(&config_file);

    // One fallback attempt on an alternate index, then give up.
    let dev = match capture::open_device(cal.camera_id) {
        Ok(dev) => dev,
        Err(e) => {
            let alternate = if cal.camera_id == 0 { 1 } else { 0 };
            warn!(
                "Camera {} unavailable ({}), trying {}",
                cal.camera_id, e, alternate
            );
            capture::open_device(alternate)?
        }
    };

    capture::set_manual_exposure(&dev);
    capture::set_exposure(&dev, cal.exposure);

    let format = capture::configure_format(&dev, CANVAS_WIDTH, CANVAS_HEIGHT)?;
    let mut stream = capture::open_stream(&dev)?;

    let mut main_win = Surface::new(MAIN_TITLE, CANVAS_WIDTH, CANVAS_HEIGHT)?;
    let mut calib_wins = if calib_mode {
        Some((
            Surface::new(ZOOM_TITLE, CANVAS_WIDTH, CANVAS_HEIGHT)?,
            Surface::new(KEYSTONE_TITLE, CANVAS_WIDTH, CANVAS_HEIGHT)?,
        ))
    } else {
        None
    };

    let mut zoom_selector = ZoomSelector::new();
    let mut corner_dragger = CornerDragger::new();

    let mut frame_count = 0u64;
    let mut last_stats = Instant::now();
    let stats_interval = Duration::from_secs(10);

    info!("Starting render loop (calibration mode: {})", calib_mode);

    'frames: loop {
        if !main_win.is_open() {
            info!("Main window closed");
            break;
        }

        let raw = match capture::next_frame(&mut stream, &format) {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(e) => {
                info!("Capture ended: {}", e);
                break;
            }
        };

        let view = pipeline::process(&raw, &cal);
        if let Err(e) = main_win.present(&view.output) {
            warn!("Main window lost: {}", e);
            break;
        }

        if let Some((zoom_win, keystone_win)) = &mut calib_wins {
            if let Err(e) = zoom_win.present(&overlay::roi_view(&view.normalized, view.roi)) {
                warn!("Zoom window lost: {}", e);
            }
            if let Err(e) = keystone_win.present(&overlay::keystone_view(&view.zoomed, &cal.points))
            {
                warn!("Keystone window lost: {}", e);
            }

            for event in zoom_win.pointer_events() {
                zoom_selector.handle(event, &mut cal);
            }
            for event in keystone_win.pointer_events() {
                corner_dragger.handle(event, &mut cal);
            }
        }

        let mut commands = main_win.key_commands();
        if let Some((zoom_win, keystone_win)) = &calib_wins {
            commands.extend(zoom_win.key_commands());
            commands.extend(keystone_win.key_commands());
        }
        for cmd in commands {
            match apply_command(cmd, &mut cal) {
                Outcome::Quit => {
                    info!("Quit requested");
                    break 'frames;
                }
                Outcome::PushExposure => capture::set_exposure(&dev, cal.exposure),
                Outcome::Continue => {}
            }
        }

        frame_count += 1;
        if last_stats.elapsed() >= stats_interval {
            let fps = frame_count as f64 / last_stats.elapsed().as_secs_f64();
            info!("Performance: {:.1} fps", fps);
            frame_count = 0;
            last_stats = Instant::now();
        }
    }

    config::save(&config_file, &cal)?;
    // Stream, device and windows are released on drop.
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Point, Roi};

    #[test]
    fn test_reset_restores_documented_defaults() {
        let mut cal = CalibrationState::default();
        cal.zoom_roi = Roi::new(50, 60, 200, 100);
        cal.points[2] = Point::new(300.0, 300.0);
        cal.exposure = -2;

        let outcome = apply_command(KeyCommand::Reset, &mut cal);
        assert_eq!(outcome, Outcome::Continue);
        assert_eq!(cal.zoom_roi, config::default_roi());
        assert_eq!(cal.points, config::default_points());
        // Exposure is deliberately untouched by reset.
        assert_eq!(cal.exposure, -2);
    }

    #[test]
    fn test_exposure_commands_step_and_push() {
        let mut cal = CalibrationState::default();

        assert_eq!(
            apply_command(KeyCommand::ExposureUp, &mut cal),
            Outcome::PushExposure
        );
        assert_eq!(cal.exposure, -5);

        assert_eq!(
            apply_command(KeyCommand::ExposureDown, &mut cal),
            Outcome::PushExposure
        );
        assert_eq!(
            apply_command(KeyCommand::ExposureDown, &mut cal),
            Outcome::PushExposure
        );
        assert_eq!(cal.exposure, -7);
    }

    #[test]
    fn test_quit_leaves_state_alone() {
        let mut cal = CalibrationState::default();
        let before = cal.clone();
        assert_eq!(apply_command(KeyCommand::Quit, &mut cal), Outcome::Quit);
        assert_eq!(cal, before);
    }
}
