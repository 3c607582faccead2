//! Calibration state and JSON persistence
//!
//! The calibration document lives beside the executable (`config.json`) so a
//! packaged build finds its settings next to itself. A missing or corrupt file
//! degrades to the documented defaults; only writes can fail.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Working canvas width. All calibration coordinates are expressed in this
/// normalized space, not raw sensor space.
pub const CANVAS_WIDTH: u32 = 640;
/// Working canvas height.
pub const CANVAS_HEIGHT: u32 = 480;

/// Minimum crop extent enforced by the render-time clamp.
pub const MIN_ROI_EXTENT: i32 = 10;

const CONFIG_FILE: &str = "config.json";

/// A 2D point in canvas pixel space.
///
/// Serialized as `[x, y]` to match the persisted document layout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<[f64; 2]> for Point {
    fn from(v: [f64; 2]) -> Self {
        Self { x: v[0], y: v[1] }
    }
}

impl From<Point> for [f64; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

/// Zoom region of interest in canvas pixel space.
///
/// Values are stored as written by the selector, unclamped; the transform
/// pipeline clamps defensively every frame. Serialized as `[x, y, w, h]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct Roi {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Roi {
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }
}

impl From<[i32; 4]> for Roi {
    fn from(v: [i32; 4]) -> Self {
        Self {
            x: v[0],
            y: v[1],
            w: v[2],
            h: v[3],
        }
    }
}

impl From<Roi> for [i32; 4] {
    fn from(r: Roi) -> Self {
        [r.x, r.y, r.w, r.h]
    }
}

/// The persisted calibration record.
///
/// One instance is owned by the render loop for the whole run and threaded
/// into the interaction handlers and the transform pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationState {
    /// Keystone source corners, order: top-left, top-right, bottom-right,
    /// bottom-left. No convexity or ordering enforcement.
    pub points: [Point; 4],
    /// Zoom crop rectangle.
    pub zoom_roi: Roi,
    /// Camera exposure compensation. Unranged here; the device clamps.
    pub exposure: i32,
    /// Capture device index.
    pub camera_id: u32,
}

impl Default for CalibrationState {
    fn default() -> Self {
        Self {
            points: default_points(),
            zoom_roi: default_roi(),
            exposure: -6,
            camera_id: 1,
        }
    }
}

/// The canvas corners, in keystone point order.
pub fn default_points() -> [Point; 4] {
    let (w, h) = (CANVAS_WIDTH as f64, CANVAS_HEIGHT as f64);
    [
        Point::new(0.0, 0.0),
        Point::new(w, 0.0),
        Point::new(w, h),
        Point::new(0.0, h),
    ]
}

/// The full canvas as a crop rectangle.
pub fn default_roi() -> Roi {
    Roi::new(0, 0, CANVAS_WIDTH as i32, CANVAS_HEIGHT as i32)
}

/// Why a load fell back to defaults.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("config file not found")]
    Missing,
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Resolve the config path next to the running executable, falling back to
/// the working directory when the executable path is unavailable.
pub fn config_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(CONFIG_FILE)))
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE))
}

/// Load the calibration state, substituting defaults on any failure.
pub fn load(path: &Path) -> CalibrationState {
    match try_load(path) {
        Ok(state) => {
            info!("Loaded calibration from {:?}", path);
            state
        }
        Err(LoadError::Missing) => {
            info!("No config at {:?}, using defaults", path);
            CalibrationState::default()
        }
        Err(e) => {
            warn!("Unusable config at {:?} ({}), using defaults", path, e);
            CalibrationState::default()
        }
    }
}

fn try_load(path: &Path) -> Result<CalibrationState, LoadError> {
    if !path.exists() {
        return Err(LoadError::Missing);
    }
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Save the calibration state, overwriting any previous content.
///
/// A write failure propagates; there is no partial-write recovery.
pub fn save(path: &Path, state: &CalibrationState) -> Result<()> {
    let content =
        serde_json::to_string_pretty(state).context("Failed to serialize calibration state")?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write config to {:?}", path))?;
    info!("Saved calibration to {:?}", path);
    Ok(())
}
