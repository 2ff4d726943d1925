//! Pure coordinate-space and hit-testing math shared by the interaction
//! controller and the compositor.
//!
//! Watermark placement is center-anchored: a [`Position`] of (0.5, 0.5) puts
//! the watermark's visual center at the middle of the canvas, regardless of
//! the watermark's own size or rotation.

// ============================================================================
// CONSTANTS
// ============================================================================

/// Half-size of the square corner handles, in canvas pixels. Doubles as the
/// hit tolerance around each handle point.
pub const HANDLE_TOLERANCE: f32 = 8.0;

/// Distance of the rotate handle above the watermark's top edge, in canvas
/// pixels (unrotated local frame).
pub const ROTATE_HANDLE_OFFSET: f32 = 20.0;

/// Scale range enforced during continuous gestures (drag-resize and wheel).
pub const GESTURE_MIN_SCALE: f32 = 0.1;
pub const GESTURE_MAX_SCALE: f32 = 3.0;

/// Wider scale range allowed for explicit (slider / numeric / CLI) edits.
pub const MIN_SCALE: f32 = 0.05;
pub const MAX_SCALE: f32 = 3.0;

// ============================================================================
// POSITION — normalized center-anchor coordinates
// ============================================================================

/// A watermark center position, normalized to the source image:
/// `(0, 0)` = top-left corner, `(1, 1)` = bottom-right corner.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub const CENTER: Position = Position { x: 0.5, y: 0.5 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::CENTER
    }
}

/// Convert a normalized position to pixel coordinates on a `w × h` canvas.
pub fn to_pixel(p: Position, w: f32, h: f32) -> (f32, f32) {
    (p.x * w, p.y * h)
}

/// Convert pixel coordinates back to a normalized position, clamped to [0,1]².
pub fn to_relative(px: f32, py: f32, w: f32, h: f32) -> Position {
    clamp_position(Position::new(px / w, py / h))
}

/// Elementwise clamp into the unit square.
pub fn clamp_position(p: Position) -> Position {
    Position {
        x: p.x.clamp(0.0, 1.0),
        y: p.y.clamp(0.0, 1.0),
    }
}

/// Clamp a scale factor into `[min, max]`.
pub fn clamp_scale(s: f32, min: f32, max: f32) -> f32 {
    s.clamp(min, max)
}

/// Wrap an angle in degrees into [0, 360).
pub fn wrap_degrees(deg: f32) -> f32 {
    let wrapped = deg % 360.0;
    if wrapped < 0.0 { wrapped + 360.0 } else { wrapped }
}

// ============================================================================
// HIT TESTING — rotation-aware handle classification
// ============================================================================

/// Which corner of the watermark's bounding box a handle belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomRight,
    BottomLeft,
}

/// Result of a pointer hit test against one watermark.
/// Ordered by grab priority: corners win over the rotate handle, which wins
/// over the body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandleKind {
    Corner(Corner),
    Rotate,
    Move,
}

/// Transform a canvas-space point into the watermark's local (unrotated)
/// frame centered on `center`.
fn to_local(point: (f32, f32), center: (f32, f32), rotation_deg: f32) -> (f32, f32) {
    let (sin, cos) = (-rotation_deg.to_radians()).sin_cos();
    let dx = point.0 - center.0;
    let dy = point.1 - center.1;
    (dx * cos - dy * sin, dx * sin + dy * cos)
}

/// Classify a pointer position against a watermark's handles and body.
///
/// `scaled_w` / `scaled_h` are the watermark's on-canvas dimensions (natural
/// size × scale). The pointer is inverse-rotated into the watermark's local
/// frame first, so rotated watermarks are grabbed exactly like axis-aligned
/// ones. Handles are checked before the body so resize/rotate take priority
/// over move where their regions overlap.
pub fn hit_test(
    pointer: (f32, f32),
    center: (f32, f32),
    scaled_w: f32,
    scaled_h: f32,
    rotation_deg: f32,
) -> Option<HandleKind> {
    let (lx, ly) = to_local(pointer, center, rotation_deg);
    let hw = scaled_w * 0.5;
    let hh = scaled_h * 0.5;

    let corners = [
        (-hw, -hh, Corner::TopLeft),
        (hw, -hh, Corner::TopRight),
        (hw, hh, Corner::BottomRight),
        (-hw, hh, Corner::BottomLeft),
    ];
    for &(cx, cy, corner) in &corners {
        if (lx - cx).abs() <= HANDLE_TOLERANCE && (ly - cy).abs() <= HANDLE_TOLERANCE {
            return Some(HandleKind::Corner(corner));
        }
    }

    let rotate_y = -hh - ROTATE_HANDLE_OFFSET;
    if lx.abs() <= HANDLE_TOLERANCE && (ly - rotate_y).abs() <= HANDLE_TOLERANCE {
        return Some(HandleKind::Rotate);
    }

    if lx.abs() <= hw && ly.abs() <= hh {
        return Some(HandleKind::Move);
    }

    None
}

// ============================================================================
// BOUNDS CONSTRAINT
// ============================================================================

/// Keep a watermark's center far enough from the canvas edges that its
/// rotated bounding box cannot be dragged fully outside.
///
/// Uses the half-diagonal of the scaled box as a conservative circular bound
/// (valid for every rotation angle), converted to a normalized margin. When
/// the watermark is larger than the canvas the margins cross; the min-first
/// clamp order then pins the center to the near-edge margin instead of
/// panicking on an inverted range.
pub fn constrain_center_within_bounds(
    p: Position,
    scaled_w: f32,
    scaled_h: f32,
    canvas_w: f32,
    canvas_h: f32,
) -> Position {
    let half_diagonal = (scaled_w * scaled_w + scaled_h * scaled_h).sqrt() * 0.5;
    let margin_x = half_diagonal / canvas_w;
    let margin_y = half_diagonal / canvas_h;

    Position {
        x: p.x.min(1.0 - margin_x).max(margin_x),
        y: p.y.min(1.0 - margin_y).max(margin_y),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-5;

    #[test]
    fn pixel_relative_round_trip() {
        let dims = [(1000.0, 800.0), (640.0, 480.0), (3.0, 7.0)];
        let positions = [(0.0, 0.0), (0.25, 0.75), (0.5, 0.5), (1.0, 1.0)];
        for &(w, h) in &dims {
            for &(x, y) in &positions {
                let p = Position::new(x, y);
                let (px, py) = to_pixel(p, w, h);
                let back = to_relative(px, py, w, h);
                assert!((back.x - p.x).abs() < EPS && (back.y - p.y).abs() < EPS);
            }
        }
    }

    #[test]
    fn clamp_position_is_idempotent() {
        let inputs = [(-0.5, 1.7), (0.3, 0.9), (2.0, -2.0), (1.0, 0.0)];
        for &(x, y) in &inputs {
            let once = clamp_position(Position::new(x, y));
            let twice = clamp_position(once);
            assert_eq!(once, twice);
            assert!((0.0..=1.0).contains(&once.x) && (0.0..=1.0).contains(&once.y));
        }
    }

    #[test]
    fn wrap_degrees_range() {
        assert_eq!(wrap_degrees(0.0), 0.0);
        assert_eq!(wrap_degrees(360.0), 0.0);
        assert!((wrap_degrees(-90.0) - 270.0).abs() < EPS);
        assert!((wrap_degrees(450.0) - 90.0).abs() < EPS);
    }

    #[test]
    fn hit_test_prefers_corner_over_body() {
        // A point exactly on the top-left corner lies inside the body too;
        // the corner handle must win.
        let hit = hit_test((60.0, 60.0), (100.0, 100.0), 80.0, 80.0, 0.0);
        assert_eq!(hit, Some(HandleKind::Corner(Corner::TopLeft)));
    }

    #[test]
    fn hit_test_rotate_handle_above_top_edge() {
        let hit = hit_test((100.0, 100.0 - 40.0 - ROTATE_HANDLE_OFFSET), (100.0, 100.0), 80.0, 80.0, 0.0);
        assert_eq!(hit, Some(HandleKind::Rotate));
    }

    #[test]
    fn hit_test_body_and_outside() {
        assert_eq!(hit_test((100.0, 100.0), (100.0, 100.0), 80.0, 80.0, 0.0), Some(HandleKind::Move));
        assert_eq!(hit_test((300.0, 300.0), (100.0, 100.0), 80.0, 80.0, 0.0), None);
    }

    #[test]
    fn hit_test_is_rotation_invariant() {
        // A known inside point, rotated about the center by the watermark's
        // own rotation, must still classify as inside.
        let center = (200.0, 150.0);
        let local = (20.0, 10.0); // inside an 80×60 box
        for &deg in &[30.0_f32, 90.0, 145.0, 270.0] {
            let (sin, cos) = deg.to_radians().sin_cos();
            let rotated = (
                center.0 + local.0 * cos - local.1 * sin,
                center.1 + local.0 * sin + local.1 * cos,
            );
            let hit = hit_test(rotated, center, 80.0, 60.0, deg);
            assert_eq!(hit, Some(HandleKind::Move), "rotation {deg}");
        }
    }

    #[test]
    fn constrain_keeps_half_diagonal_inside() {
        // 100×100 watermark on a 1000×1000 canvas: half-diagonal ≈ 70.7px,
        // so the center may not go below ~0.0707.
        let p = constrain_center_within_bounds(Position::new(0.0, 0.0), 100.0, 100.0, 1000.0, 1000.0);
        let margin = (2.0_f32).sqrt() * 50.0 / 1000.0;
        assert!((p.x - margin).abs() < EPS && (p.y - margin).abs() < EPS);
        // Interior positions pass through untouched.
        let q = constrain_center_within_bounds(Position::new(0.5, 0.4), 100.0, 100.0, 1000.0, 1000.0);
        assert_eq!(q, Position::new(0.5, 0.4));
    }

    #[test]
    fn constrain_oversized_watermark_does_not_panic() {
        // Watermark bigger than the canvas: margins cross; center pins to the
        // near-edge margin rather than inverting the clamp range.
        let p = constrain_center_within_bounds(Position::new(0.9, 0.1), 2000.0, 2000.0, 1000.0, 1000.0);
        assert!(p.x.is_finite() && p.y.is_finite());
    }
}
