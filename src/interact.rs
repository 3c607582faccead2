//! Pointer-driven calibration handlers
//!
//! Two independent state machines mutate the calibration state in response to
//! pointer events: the zoom-region selector (secondary button) and the
//! keystone corner dragger (primary button). Both run on the render thread,
//! so no locking is involved anywhere.

use crate::config::{CalibrationState, Point, Roi};

/// Half-extent of the per-axis hit box around a keystone corner handle.
const HIT_EXTENT: i32 = 20;

/// Minimum rectangle size while dragging out a zoom region. Keeps the
/// rectangle visible during the drag; the render-time clamp uses its own,
/// smaller floor.
const DRAG_MIN_EXTENT: i32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerEvent {
    Down { button: PointerButton, x: i32, y: i32 },
    Moved { x: i32, y: i32 },
    Up { button: PointerButton },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DragState {
    Idle,
    Dragging { anchor: (i32, i32) },
}

/// Zoom-region selector: drag with the secondary button to span a rectangle.
///
/// Writes the spanned rectangle unclamped; the transform pipeline clamps it
/// into the canvas every frame regardless of what is written here.
#[derive(Debug)]
pub struct ZoomSelector {
    state: DragState,
}

impl ZoomSelector {
    pub fn new() -> Self {
        Self {
            state: DragState::Idle,
        }
    }

    pub fn handle(&mut self, event: PointerEvent, cal: &mut CalibrationState) {
        match (self.state, event) {
            (
                _,
                PointerEvent::Down {
                    button: PointerButton::Secondary,
                    x,
                    y,
                },
            ) => {
                self.state = DragState::Dragging { anchor: (x, y) };
            }
            (DragState::Dragging { anchor: (ax, ay) }, PointerEvent::Moved { x, y }) => {
                cal.zoom_roi = Roi::new(
                    ax.min(x),
                    ay.min(y),
                    (x - ax).abs().max(DRAG_MIN_EXTENT),
                    (y - ay).abs().max(DRAG_MIN_EXTENT),
                );
            }
            (
                DragState::Dragging { .. },
                PointerEvent::Up {
                    button: PointerButton::Secondary,
                },
            ) => {
                self.state = DragState::Idle;
            }
            _ => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GripState {
    Idle,
    Gripping(usize),
}

/// Keystone corner dragger: grab a corner handle with the primary button and
/// move it anywhere, including off the canvas. Off-canvas corners produce a
/// degenerate warp, which is the intended calibration feedback.
#[derive(Debug)]
pub struct CornerDragger {
    state: GripState,
}

impl CornerDragger {
    pub fn new() -> Self {
        Self {
            state: GripState::Idle,
        }
    }

    pub fn handle(&mut self, event: PointerEvent, cal: &mut CalibrationState) {
        match (self.state, event) {
            (
                _,
                PointerEvent::Down {
                    button: PointerButton::Primary,
                    x,
                    y,
                },
            ) => {
                // First hit in point order wins when handles overlap.
                if let Some(i) = hit_test(&cal.points, x, y) {
                    self.state = GripState::Gripping(i);
                }
            }
            (GripState::Gripping(i), PointerEvent::Moved { x, y }) => {
                cal.points[i] = Point::new(x as f64, y as f64);
            }
            (
                GripState::Gripping(_),
                PointerEvent::Up {
                    button: PointerButton::Primary,
                },
            ) => {
                self.state = GripState::Idle;
            }
            _ => {}
        }
    }
}

fn hit_test(points: &[Point; 4], x: i32, y: i32) -> Option<usize> {
    points.iter().position(|p| {
        (x as f64 - p.x).abs() < HIT_EXTENT as f64 && (y as f64 - p.y).abs() < HIT_EXTENT as f64
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_points;

    fn down(button: PointerButton, x: i32, y: i32) -> PointerEvent {
        PointerEvent::Down { button, x, y }
    }

    fn moved(x: i32, y: i32) -> PointerEvent {
        PointerEvent::Moved { x, y }
    }

    fn up(button: PointerButton) -> PointerEvent {
        PointerEvent::Up { button }
    }

    #[test]
    fn test_zoom_drag_spans_rectangle() {
        let mut cal = CalibrationState::default();
        let mut sel = ZoomSelector::new();

        sel.handle(down(PointerButton::Secondary, 200, 150), &mut cal);
        sel.handle(moved(100, 300), &mut cal);
        assert_eq!(cal.zoom_roi, Roi::new(100, 150, 100, 150));

        // Rectangle keeps tracking while the drag is live.
        sel.handle(moved(300, 350), &mut cal);
        assert_eq!(cal.zoom_roi, Roi::new(200, 150, 100, 200));

        sel.handle(up(PointerButton::Secondary), &mut cal);
        sel.handle(moved(0, 0), &mut cal);
        assert_eq!(cal.zoom_roi, Roi::new(200, 150, 100, 200));
    }

    #[test]
    fn test_zoom_drag_floors_extent_at_20() {
        let mut cal = CalibrationState::default();
        let mut sel = ZoomSelector::new();

        sel.handle(down(PointerButton::Secondary, 100, 100), &mut cal);
        sel.handle(moved(105, 103), &mut cal);
        assert_eq!(cal.zoom_roi, Roi::new(100, 100, 20, 20));
    }

    #[test]
    fn test_zoom_ignores_primary_button() {
        let mut cal = CalibrationState::default();
        let mut sel = ZoomSelector::new();

        sel.handle(down(PointerButton::Primary, 100, 100), &mut cal);
        sel.handle(moved(300, 300), &mut cal);
        assert_eq!(cal.zoom_roi, default_roi_unchanged());
    }

    fn default_roi_unchanged() -> Roi {
        CalibrationState::default().zoom_roi
    }

    #[test]
    fn test_corner_grab_and_drag() {
        let mut cal = CalibrationState::default();
        let mut dragger = CornerDragger::new();

        // Near the top-right corner (640, 0).
        dragger.handle(down(PointerButton::Primary, 630, 10), &mut cal);
        dragger.handle(moved(600, 50), &mut cal);
        assert_eq!(cal.points[1], Point::new(600.0, 50.0));

        dragger.handle(up(PointerButton::Primary), &mut cal);
        dragger.handle(moved(0, 0), &mut cal);
        assert_eq!(cal.points[1], Point::new(600.0, 50.0));
    }

    #[test]
    fn test_corner_moves_off_canvas_unclamped() {
        let mut cal = CalibrationState::default();
        let mut dragger = CornerDragger::new();

        dragger.handle(down(PointerButton::Primary, 5, 5), &mut cal);
        dragger.handle(moved(700, 700), &mut cal);
        assert_eq!(cal.points[0], Point::new(700.0, 700.0));
    }

    #[test]
    fn test_hit_test_tie_break_favors_lower_index() {
        let mut cal = CalibrationState::default();
        cal.points = [
            Point::new(100.0, 100.0),
            Point::new(110.0, 110.0),
            Point::new(400.0, 400.0),
            Point::new(500.0, 500.0),
        ];
        let mut dragger = CornerDragger::new();

        // Within 20 px of both point 0 and point 1.
        dragger.handle(down(PointerButton::Primary, 105, 105), &mut cal);
        dragger.handle(moved(50, 50), &mut cal);
        assert_eq!(cal.points[0], Point::new(50.0, 50.0));
        assert_eq!(cal.points[1], Point::new(110.0, 110.0));
    }

    #[test]
    fn test_miss_does_not_grip() {
        let mut cal = CalibrationState::default();
        let mut dragger = CornerDragger::new();
        let before = cal.points;

        dragger.handle(down(PointerButton::Primary, 320, 240), &mut cal);
        dragger.handle(moved(10, 10), &mut cal);
        assert_eq!(cal.points, before);
    }

    #[test]
    fn test_hit_box_boundary_is_exclusive() {
        let points = default_points();
        assert_eq!(hit_test(&points, 19, 19), Some(0));
        assert_eq!(hit_test(&points, 20, 0), None);
    }
}
