//! Pointer-driven interaction: hit resolution, the drag/resize/rotate
//! gesture state machine, and modeless wheel resizing.
//!
//! The controller depends only on an injected [`ViewportProvider`] for the
//! interactive surface's on-screen bounds — no UI toolkit types appear here.
//! Pointer handling mutates lightweight descriptor fields only; it never
//! decodes a bitmap or recomposites.

use uuid::Uuid;

use crate::geometry::{
    clamp_position, clamp_scale, constrain_center_within_bounds, hit_test, to_pixel, wrap_degrees,
    HandleKind, Position, GESTURE_MAX_SCALE, GESTURE_MIN_SCALE,
};
use crate::store::WatermarkStore;
use crate::text::{natural_size, FontCache};
use crate::watermark::WatermarkPatch;

/// Scale change per pixel of resize-drag travel.
const RESIZE_SENSITIVITY: f32 = 0.01;

/// Scale change per wheel-delta unit (sign flipped: wheel-up grows).
const WHEEL_SENSITIVITY: f32 = 0.01;

/// Rotate-handle offset: the handle sits above the top edge, so a pointer
/// straight above the center reads as 0° from `atan2`'s -90°.
const ROTATE_HANDLE_ANGLE_OFFSET: f32 = 90.0;

// ============================================================================
// VIEWPORT CAPABILITY
// ============================================================================

/// On-screen bounding box of the interactive container, in client
/// coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContainerBounds {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

/// Injected capability exposing the interactive surface's geometry. The
/// hosting shell (whatever toolkit it uses) implements this.
pub trait ViewportProvider {
    fn container_bounds(&self) -> ContainerBounds;
}

/// A pointer event position in client coordinates, as delivered by the host.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointerInput {
    pub x: f32,
    pub y: f32,
}

// ============================================================================
// GESTURE STATE
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GestureMode {
    Move,
    Resize,
    Rotate,
}

impl GestureMode {
    pub fn from_handle(handle: HandleKind) -> GestureMode {
        match handle {
            HandleKind::Corner(_) => GestureMode::Resize,
            HandleKind::Rotate => GestureMode::Rotate,
            HandleKind::Move => GestureMode::Move,
        }
    }
}

/// Placement fields captured when a gesture starts; move/resize deltas are
/// applied against this snapshot, not against intermediate values.
#[derive(Clone, Copy, Debug)]
struct Snapshot {
    position: Position,
    scale: f32,
}

/// At most one gesture is active across the whole interactive surface.
#[derive(Clone, Copy, Debug, Default)]
enum GestureState {
    #[default]
    Idle,
    Active {
        target: Uuid,
        mode: GestureMode,
        /// Pointer position at gesture start, container-relative pixels.
        origin: (f32, f32),
        snapshot: Snapshot,
    },
}

// ============================================================================
// CONTROLLER
// ============================================================================

/// Consumes pointer/wheel events, resolves hits against the store, and emits
/// placement mutations back to it.
///
/// Starting a new gesture overwrites the active one, so move/up events from
/// a superseded gesture can never touch the old target again. Selection is
/// orthogonal: it persists across `Idle` periods until explicitly changed or
/// the selected watermark is removed.
#[derive(Default)]
pub struct InteractionController {
    gesture: GestureState,
    fonts: FontCache,
}

impl InteractionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_gesturing(&self) -> bool {
        matches!(self.gesture, GestureState::Active { .. })
    }

    pub fn gesture_target(&self) -> Option<Uuid> {
        match self.gesture {
            GestureState::Active { target, .. } => Some(target),
            GestureState::Idle => None,
        }
    }

    // ---- hit resolution -----------------------------------------------------

    /// Find the topmost watermark (and handle) under the pointer on the
    /// active image. Later paint order wins, so the scan runs back-to-front.
    pub fn hit_watermark(
        &mut self,
        store: &WatermarkStore,
        viewport: &dyn ViewportProvider,
        pointer: PointerInput,
    ) -> Option<(Uuid, HandleKind)> {
        let bounds = viewport.container_bounds();
        let p = to_container(pointer, bounds);
        let record = store.active_record()?;

        for wm in record.watermarks.iter().rev() {
            let (nw, nh) = natural_size(&wm.content, &mut self.fonts);
            let center = to_pixel(wm.position, bounds.width, bounds.height);
            if let Some(handle) = hit_test(p, center, nw * wm.scale, nh * wm.scale, wm.rotation) {
                return Some((wm.id, handle));
            }
        }
        None
    }

    // ---- gesture lifecycle --------------------------------------------------

    /// Pointer-down entry point: resolve the hit, update the selection, and
    /// start the matching gesture. A press on empty space clears the
    /// selection and ends any in-flight gesture.
    pub fn pointer_down(
        &mut self,
        store: &mut WatermarkStore,
        viewport: &dyn ViewportProvider,
        pointer: PointerInput,
    ) -> Option<(Uuid, HandleKind)> {
        match self.hit_watermark(store, viewport, pointer) {
            Some((id, handle)) => {
                self.gesture_start(store, viewport, pointer, id, handle);
                Some((id, handle))
            }
            None => {
                store.select(None);
                self.gesture = GestureState::Idle;
                None
            }
        }
    }

    /// Begin a gesture on a known watermark/handle. Any previous gesture is
    /// implicitly ended — its remaining events are ignored from here on.
    pub fn gesture_start(
        &mut self,
        store: &mut WatermarkStore,
        viewport: &dyn ViewportProvider,
        pointer: PointerInput,
        watermark_id: Uuid,
        handle: HandleKind,
    ) {
        let Some(wm) = store.watermark(watermark_id) else {
            self.gesture = GestureState::Idle;
            return;
        };
        let snapshot = Snapshot {
            position: wm.position,
            scale: wm.scale,
        };
        let bounds = viewport.container_bounds();
        self.gesture = GestureState::Active {
            target: watermark_id,
            mode: GestureMode::from_handle(handle),
            origin: to_container(pointer, bounds),
            snapshot,
        };
        store.select(Some(watermark_id));
    }

    /// Continuous gesture update. Applies the pointer delta against the
    /// gesture-start snapshot and writes the clamped result to the store.
    pub fn gesture_move(
        &mut self,
        store: &mut WatermarkStore,
        viewport: &dyn ViewportProvider,
        pointer: PointerInput,
    ) {
        let GestureState::Active { target, mode, origin, snapshot } = self.gesture else {
            return;
        };
        // Target deleted mid-gesture: terminate deterministically.
        let Some(wm) = store.watermark(target) else {
            self.gesture = GestureState::Idle;
            return;
        };

        let bounds = viewport.container_bounds();
        let p = to_container(pointer, bounds);
        let dx = p.0 - origin.0;
        let dy = p.1 - origin.1;

        match mode {
            GestureMode::Move => {
                let (nw, nh) = natural_size(&wm.content, &mut self.fonts);
                let scaled_w = nw * wm.scale;
                let scaled_h = nh * wm.scale;
                let moved = Position::new(
                    snapshot.position.x + dx / bounds.width,
                    snapshot.position.y + dy / bounds.height,
                );
                let constrained = constrain_center_within_bounds(
                    clamp_position(moved),
                    scaled_w,
                    scaled_h,
                    bounds.width,
                    bounds.height,
                );
                store.update_watermark(target, WatermarkPatch::position(constrained));
            }
            GestureMode::Resize => {
                // Dominant axis decides the sign; travel distance the amount.
                let delta = dx.abs().max(dy.abs());
                let sign = if dx.abs() > dy.abs() { dx.signum() } else { dy.signum() };
                let scale = clamp_scale(
                    snapshot.scale + sign * delta * RESIZE_SENSITIVITY,
                    GESTURE_MIN_SCALE,
                    GESTURE_MAX_SCALE,
                );
                store.update_watermark(target, WatermarkPatch::scale(scale));
            }
            GestureMode::Rotate => {
                let center = to_pixel(wm.position, bounds.width, bounds.height);
                let angle = (p.1 - center.1).atan2(p.0 - center.0).to_degrees();
                let rotation = wrap_degrees(angle + ROTATE_HANDLE_ANGLE_OFFSET);
                store.update_watermark(target, WatermarkPatch::rotation(rotation));
            }
        }
    }

    /// Pointer-up / pointer-leave / touch-end: back to `Idle`. Never mutates
    /// placement — the last `gesture_move` already wrote the final values.
    pub fn gesture_end(&mut self) {
        self.gesture = GestureState::Idle;
    }

    // ---- wheel --------------------------------------------------------------

    /// Modeless wheel-over-watermark resize, independent of the gesture
    /// machine. Adjusts the current scale by a fixed step per wheel tick.
    pub fn wheel_resize(&mut self, store: &mut WatermarkStore, watermark_id: Uuid, delta_y: f32) {
        let Some(wm) = store.watermark(watermark_id) else {
            return;
        };
        let scale = clamp_scale(
            wm.scale - delta_y * WHEEL_SENSITIVITY,
            GESTURE_MIN_SCALE,
            GESTURE_MAX_SCALE,
        );
        store.update_watermark(watermark_id, WatermarkPatch::scale(scale));
    }
}

fn to_container(pointer: PointerInput, bounds: ContainerBounds) -> (f32, f32) {
    (pointer.x - bounds.left, pointer.y - bounds.top)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use image::RgbaImage;

    use crate::io::OutputFormat;
    use crate::store::SourceImageRecord;
    use crate::watermark::WatermarkContent;

    struct FixedViewport(ContainerBounds);

    impl ViewportProvider for FixedViewport {
        fn container_bounds(&self) -> ContainerBounds {
            self.0
        }
    }

    fn viewport(w: f32, h: f32) -> FixedViewport {
        FixedViewport(ContainerBounds { left: 0.0, top: 0.0, width: w, height: h })
    }

    fn store_with_image(w: u32, h: u32) -> (WatermarkStore, Uuid) {
        let mut store = WatermarkStore::new();
        let id = store.add_image(SourceImageRecord::new(
            "test.png".into(),
            OutputFormat::Png,
            Arc::new(RgbaImage::new(w, h)),
        ));
        (store, id)
    }

    fn bitmap_content(w: u32, h: u32) -> WatermarkContent {
        WatermarkContent::Image(Arc::new(RgbaImage::new(w, h)))
    }

    #[test]
    fn drag_by_tenth_of_container_moves_position_by_tenth() {
        let (mut store, _) = store_with_image(1000, 800);
        let vp = viewport(500.0, 400.0);
        let mut ctl = InteractionController::new();
        let id = store.add_watermark(bitmap_content(100, 100), WatermarkPatch::default()).unwrap();

        // Press at the watermark center (container center), drag 10% right.
        ctl.pointer_down(&mut store, &vp, PointerInput { x: 250.0, y: 200.0 });
        assert!(ctl.is_gesturing());
        ctl.gesture_move(&mut store, &vp, PointerInput { x: 300.0, y: 200.0 });

        let wm = store.watermark(id).unwrap();
        assert!((wm.position.x - 0.6).abs() < 1e-5, "x = {}", wm.position.x);
        assert!((wm.position.y - 0.5).abs() < 1e-5);
    }

    #[test]
    fn press_on_empty_space_clears_selection_and_gesture() {
        let (mut store, _) = store_with_image(1000, 800);
        let vp = viewport(500.0, 400.0);
        let mut ctl = InteractionController::new();
        store.add_watermark(bitmap_content(100, 100), WatermarkPatch::default()).unwrap();

        ctl.pointer_down(&mut store, &vp, PointerInput { x: 10.0, y: 10.0 });
        assert!(!ctl.is_gesturing());
        assert_eq!(store.selected_id(), None);
    }

    #[test]
    fn new_gesture_supersedes_the_old_one() {
        let (mut store, _) = store_with_image(1000, 1000);
        let vp = viewport(500.0, 500.0);
        let mut ctl = InteractionController::new();

        let x = store
            .add_watermark(bitmap_content(100, 100), WatermarkPatch::position(Position::new(0.25, 0.25)))
            .unwrap();
        let y = store
            .add_watermark(bitmap_content(100, 100), WatermarkPatch::position(Position::new(0.75, 0.75)))
            .unwrap();

        // Gesture A on X…
        ctl.pointer_down(&mut store, &vp, PointerInput { x: 125.0, y: 125.0 });
        assert_eq!(ctl.gesture_target(), Some(x));
        let x_before = store.watermark(x).unwrap().position;

        // …then gesture B starts on Y without an intervening pointer-up.
        ctl.pointer_down(&mut store, &vp, PointerInput { x: 375.0, y: 375.0 });
        assert_eq!(ctl.gesture_target(), Some(y));
        ctl.gesture_move(&mut store, &vp, PointerInput { x: 400.0, y: 375.0 });

        // Only Y moved; X still holds its pre-takeover placement.
        assert_eq!(store.watermark(x).unwrap().position, x_before);
        assert!((store.watermark(y).unwrap().position.x - 0.8).abs() < 1e-5);
    }

    #[test]
    fn corner_drag_resizes_from_snapshot() {
        let (mut store, _) = store_with_image(1000, 1000);
        let vp = viewport(500.0, 500.0);
        let mut ctl = InteractionController::new();
        let id = store.add_watermark(bitmap_content(200, 200), WatermarkPatch::default()).unwrap();

        // scale 0.5 → 100×100 on screen; top-left corner at (200, 200).
        let (wm_id, handle) = ctl
            .hit_watermark(&store, &vp, PointerInput { x: 200.0, y: 200.0 })
            .expect("corner should hit");
        assert!(matches!(handle, HandleKind::Corner(_)));

        ctl.gesture_start(&mut store, &vp, PointerInput { x: 200.0, y: 200.0 }, wm_id, handle);
        // 100px of rightward travel: 0.5 + 100·0.01 = 1.5.
        ctl.gesture_move(&mut store, &vp, PointerInput { x: 300.0, y: 200.0 });
        assert!((store.watermark(id).unwrap().scale - 1.5).abs() < 1e-5);

        // Deltas apply against the snapshot, not cumulatively: moving back
        // to 50px of travel gives 1.0, not 2.0.
        ctl.gesture_move(&mut store, &vp, PointerInput { x: 250.0, y: 200.0 });
        assert!((store.watermark(id).unwrap().scale - 1.0).abs() < 1e-5);
    }

    #[test]
    fn rotate_gesture_follows_the_pointer_angle() {
        let (mut store, _) = store_with_image(1000, 1000);
        let vp = viewport(500.0, 500.0);
        let mut ctl = InteractionController::new();
        let id = store.add_watermark(bitmap_content(100, 100), WatermarkPatch::default()).unwrap();

        // Grab the rotate handle straight above the center…
        let handle_y = 250.0 - 25.0 - crate::geometry::ROTATE_HANDLE_OFFSET;
        let (wm_id, handle) = ctl
            .hit_watermark(&store, &vp, PointerInput { x: 250.0, y: handle_y })
            .expect("rotate handle should hit");
        assert_eq!(handle, HandleKind::Rotate);
        ctl.gesture_start(&mut store, &vp, PointerInput { x: 250.0, y: handle_y }, wm_id, handle);

        // …and drag it to the right of the center: atan2 says 0°, the
        // handle offset makes that a 90° rotation.
        ctl.gesture_move(&mut store, &vp, PointerInput { x: 350.0, y: 250.0 });
        assert!((store.watermark(id).unwrap().rotation - 90.0).abs() < 1e-3);
    }

    #[test]
    fn gesture_end_stops_applying_moves() {
        let (mut store, _) = store_with_image(1000, 800);
        let vp = viewport(500.0, 400.0);
        let mut ctl = InteractionController::new();
        let id = store.add_watermark(bitmap_content(100, 100), WatermarkPatch::default()).unwrap();

        ctl.pointer_down(&mut store, &vp, PointerInput { x: 250.0, y: 200.0 });
        ctl.gesture_end();
        ctl.gesture_move(&mut store, &vp, PointerInput { x: 400.0, y: 200.0 });

        assert_eq!(store.watermark(id).unwrap().position, Position::CENTER);
        // Selection survives the gesture ending.
        assert_eq!(store.selected_id(), Some(id));
    }

    #[test]
    fn target_removed_mid_gesture_terminates_it() {
        let (mut store, _) = store_with_image(1000, 800);
        let vp = viewport(500.0, 400.0);
        let mut ctl = InteractionController::new();
        let id = store.add_watermark(bitmap_content(100, 100), WatermarkPatch::default()).unwrap();

        ctl.pointer_down(&mut store, &vp, PointerInput { x: 250.0, y: 200.0 });
        store.remove_watermark(id);
        ctl.gesture_move(&mut store, &vp, PointerInput { x: 300.0, y: 200.0 });
        assert!(!ctl.is_gesturing());
    }

    #[test]
    fn wheel_resize_steps_and_clamps() {
        let (mut store, _) = store_with_image(1000, 800);
        let mut ctl = InteractionController::new();
        let id = store.add_watermark(bitmap_content(100, 100), WatermarkPatch::default()).unwrap();

        ctl.wheel_resize(&mut store, id, -100.0);
        assert!((store.watermark(id).unwrap().scale - 1.5).abs() < 1e-5);

        // Keep scrolling up: pinned at the gesture maximum.
        for _ in 0..10 {
            ctl.wheel_resize(&mut store, id, -100.0);
        }
        assert_eq!(store.watermark(id).unwrap().scale, GESTURE_MAX_SCALE);

        ctl.wheel_resize(&mut store, id, 50.0);
        assert!((store.watermark(id).unwrap().scale - 2.5).abs() < 1e-5);
    }

    #[test]
    fn drag_cannot_push_watermark_fully_outside() {
        let (mut store, _) = store_with_image(1000, 1000);
        let vp = viewport(500.0, 500.0);
        let mut ctl = InteractionController::new();
        let id = store.add_watermark(bitmap_content(100, 100), WatermarkPatch::default()).unwrap();

        ctl.pointer_down(&mut store, &vp, PointerInput { x: 250.0, y: 250.0 });
        ctl.gesture_move(&mut store, &vp, PointerInput { x: 2000.0, y: 250.0 });

        // 100×100 at scale 0.5 → 50×50 on screen; half-diagonal ≈ 35.36px of
        // a 500px container keeps the center at least ~0.0707 from the edge.
        let wm = store.watermark(id).unwrap();
        assert!(wm.position.x < 1.0 - 0.07, "x = {}", wm.position.x);
    }
}
