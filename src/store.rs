//! The watermark entity store: source image records, their ordered watermark
//! lists, and the selection marker.
//!
//! All mutations are synchronous and atomic with respect to a single caller.
//! Any watermark mutation clears the owning record's cached composite, so a
//! stale result can never be presented as current.

use std::sync::Arc;

use image::RgbaImage;
use uuid::Uuid;

use crate::compositor::RenderError;
use crate::geometry::{clamp_position, clamp_scale, wrap_degrees, MAX_SCALE, MIN_SCALE};
use crate::io::OutputFormat;
use crate::watermark::{Watermark, WatermarkContent, WatermarkPatch};

// ============================================================================
// SOURCE IMAGE RECORD
// ============================================================================

/// One open source image: decoded pixels at natural size, the watermarks
/// placed on it (index order = paint order, later on top), and the cached
/// composited result from the last successful render.
pub struct SourceImageRecord {
    pub id: Uuid,
    pub name: String,
    /// Output encoding matching the source's own type.
    pub format: OutputFormat,
    pub pixels: Arc<RgbaImage>,
    pub watermarks: Vec<Watermark>,
    /// Present only when produced from exactly the current watermark set.
    pub result: Option<Arc<RgbaImage>>,
}

impl SourceImageRecord {
    pub fn new(name: String, format: OutputFormat, pixels: Arc<RgbaImage>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            format,
            pixels,
            watermarks: Vec::new(),
            result: None,
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    fn invalidate_result(&mut self) {
        self.result = None;
    }
}

// ============================================================================
// STORE
// ============================================================================

/// Owns every open source image and routes watermark mutations.
///
/// Watermarks are always per-image owned; sharing across images is the
/// explicit deep-copy of [`WatermarkStore::clone_all_to`], never implicit.
#[derive(Default)]
pub struct WatermarkStore {
    records: Vec<SourceImageRecord>,
    active_image: Option<Uuid>,
    /// Persistent selection marker, orthogonal to gesture state. Always
    /// references a watermark on the active image, or nothing.
    selected: Option<Uuid>,
}

impl WatermarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- image management ---------------------------------------------------

    /// Add an open image. The first image added becomes the active one.
    pub fn add_image(&mut self, record: SourceImageRecord) -> Uuid {
        let id = record.id;
        self.records.push(record);
        if self.active_image.is_none() {
            self.active_image = Some(id);
        }
        id
    }

    pub fn remove_image(&mut self, image_id: Uuid) {
        self.records.retain(|r| r.id != image_id);
        if self.active_image == Some(image_id) {
            self.active_image = self.records.first().map(|r| r.id);
            self.selected = None;
        }
    }

    /// Switch the active image. Selection does not carry across images.
    pub fn set_active_image(&mut self, image_id: Uuid) {
        if self.active_image == Some(image_id) {
            return;
        }
        if self.records.iter().any(|r| r.id == image_id) {
            self.active_image = Some(image_id);
            self.selected = None;
        }
    }

    // ---- read accessors -----------------------------------------------------

    pub fn records(&self) -> &[SourceImageRecord] {
        &self.records
    }

    pub fn record(&self, image_id: Uuid) -> Option<&SourceImageRecord> {
        self.records.iter().find(|r| r.id == image_id)
    }

    pub fn active_record(&self) -> Option<&SourceImageRecord> {
        self.active_image.and_then(|id| self.record(id))
    }

    pub fn active_image_id(&self) -> Option<Uuid> {
        self.active_image
    }

    pub fn selected_id(&self) -> Option<Uuid> {
        self.selected
    }

    pub fn selected_watermark(&self) -> Option<&Watermark> {
        let id = self.selected?;
        self.active_record()?.watermarks.iter().find(|w| w.id == id)
    }

    /// Look a watermark up by id across all images.
    pub fn watermark(&self, id: Uuid) -> Option<&Watermark> {
        self.records
            .iter()
            .flat_map(|r| r.watermarks.iter())
            .find(|w| w.id == id)
    }

    // ---- selection ----------------------------------------------------------

    /// Set or clear the selection. Ids not present on the active image are
    /// ignored (the selection must never dangle).
    pub fn select(&mut self, id: Option<Uuid>) {
        match id {
            None => self.selected = None,
            Some(id) => {
                let on_active = self
                    .active_record()
                    .map(|r| r.watermarks.iter().any(|w| w.id == id))
                    .unwrap_or(false);
                if on_active {
                    self.selected = Some(id);
                }
            }
        }
    }

    // ---- watermark mutations ------------------------------------------------

    /// Add a watermark with default placement to the active image, apply the
    /// initial options, and select it. Returns None when no image is open.
    pub fn add_watermark(&mut self, content: WatermarkContent, options: WatermarkPatch) -> Option<Uuid> {
        let image_id = self.active_image?;
        self.add_watermark_to(image_id, content, options)
    }

    /// Add a watermark to a specific image (appended on top of paint order).
    pub fn add_watermark_to(
        &mut self,
        image_id: Uuid,
        content: WatermarkContent,
        options: WatermarkPatch,
    ) -> Option<Uuid> {
        let record = self.records.iter_mut().find(|r| r.id == image_id)?;
        let mut wm = Watermark::new(content);
        apply_patch(&mut wm, options);
        let id = wm.id;
        record.watermarks.push(wm);
        record.invalidate_result();
        if self.active_image == Some(image_id) {
            self.selected = Some(id);
        }
        Some(id)
    }

    /// Merge a partial update into the watermark matching `id`. Position,
    /// scale, opacity and rotation are normalized into their valid ranges.
    /// Silent no-op when the id no longer exists.
    pub fn update_watermark(&mut self, id: Uuid, patch: WatermarkPatch) {
        for record in &mut self.records {
            if let Some(wm) = record.watermarks.iter_mut().find(|w| w.id == id) {
                apply_patch(wm, patch);
                record.invalidate_result();
                return;
            }
        }
    }

    /// Remove a watermark. If it was selected, selection falls back to the
    /// most-recently-added remaining watermark on that image, or to none.
    pub fn remove_watermark(&mut self, id: Uuid) {
        for record in &mut self.records {
            if let Some(idx) = record.watermarks.iter().position(|w| w.id == id) {
                record.watermarks.remove(idx);
                record.invalidate_result();
                if self.selected == Some(id) {
                    self.selected = record.watermarks.last().map(|w| w.id);
                }
                return;
            }
        }
    }

    /// Move a watermark to a new index in its image's paint order
    /// (clamped to the list length). Later indices paint on top.
    pub fn reorder_watermark(&mut self, id: Uuid, new_index: usize) {
        for record in &mut self.records {
            if let Some(idx) = record.watermarks.iter().position(|w| w.id == id) {
                let wm = record.watermarks.remove(idx);
                let target = new_index.min(record.watermarks.len());
                record.watermarks.insert(target, wm);
                record.invalidate_result();
                return;
            }
        }
    }

    /// Deep-copy every watermark from one image onto another, assigning
    /// fresh ids so the copies are fully independent.
    pub fn clone_all_to(&mut self, source_image: Uuid, target_image: Uuid) {
        if source_image == target_image {
            return;
        }
        let copies: Vec<Watermark> = match self.record(source_image) {
            Some(src) => src.watermarks.iter().map(|w| w.duplicate()).collect(),
            None => return,
        };
        if let Some(target) = self.records.iter_mut().find(|r| r.id == target_image) {
            target.watermarks.extend(copies);
            target.invalidate_result();
        }
    }

    /// "Apply to all images": deep-copy one image's watermark set onto every
    /// other open image.
    pub fn clone_all_to_every_other(&mut self, source_image: Uuid) {
        let targets: Vec<Uuid> = self
            .records
            .iter()
            .map(|r| r.id)
            .filter(|&id| id != source_image)
            .collect();
        for target in targets {
            self.clone_all_to(source_image, target);
        }
    }

    // ---- render results -----------------------------------------------------

    /// Commit a render outcome for an image. Success replaces the cached
    /// result atomically; failure leaves any previous result untouched.
    pub fn commit_render(&mut self, image_id: Uuid, outcome: Result<RgbaImage, RenderError>) {
        if let Some(record) = self.records.iter_mut().find(|r| r.id == image_id) {
            if let Ok(bitmap) = outcome {
                record.result = Some(Arc::new(bitmap));
            }
        }
    }
}

/// Merge patch fields, normalizing each into its valid range.
fn apply_patch(wm: &mut Watermark, patch: WatermarkPatch) {
    if let Some(content) = patch.content {
        wm.content = content;
    }
    if let Some(p) = patch.position {
        wm.position = clamp_position(p);
    }
    if let Some(s) = patch.scale {
        wm.scale = clamp_scale(s, MIN_SCALE, MAX_SCALE);
    }
    if let Some(o) = patch.opacity {
        wm.opacity = o.clamp(0.0, 1.0);
    }
    if let Some(r) = patch.rotation {
        wm.rotation = wrap_degrees(r);
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Position;
    use crate::watermark::FontSpec;

    fn record(w: u32, h: u32) -> SourceImageRecord {
        SourceImageRecord::new(
            "test.png".into(),
            OutputFormat::Png,
            Arc::new(RgbaImage::new(w, h)),
        )
    }

    fn text_content(s: &str) -> WatermarkContent {
        WatermarkContent::Text { text: s.into(), font: FontSpec::default() }
    }

    #[test]
    fn add_selects_and_first_image_becomes_active() {
        let mut store = WatermarkStore::new();
        let img = store.add_image(record(100, 100));
        assert_eq!(store.active_image_id(), Some(img));

        let id = store.add_watermark(text_content("a"), WatermarkPatch::default()).unwrap();
        assert_eq!(store.selected_id(), Some(id));
        assert_eq!(store.record(img).unwrap().watermarks.len(), 1);
    }

    #[test]
    fn update_clamps_fields_and_missing_id_is_a_no_op() {
        let mut store = WatermarkStore::new();
        store.add_image(record(100, 100));
        let id = store.add_watermark(text_content("a"), WatermarkPatch::default()).unwrap();

        store.update_watermark(id, WatermarkPatch {
            position: Some(Position::new(2.0, -1.0)),
            scale: Some(99.0),
            opacity: Some(1.5),
            rotation: Some(-90.0),
            content: None,
        });
        let wm = store.watermark(id).unwrap();
        assert_eq!(wm.position, Position::new(1.0, 0.0));
        assert_eq!(wm.scale, MAX_SCALE);
        assert_eq!(wm.opacity, 1.0);
        assert_eq!(wm.rotation, 270.0);

        // Unknown id: nothing changes, nothing panics.
        store.update_watermark(Uuid::new_v4(), WatermarkPatch::scale(1.0));
        assert_eq!(store.watermark(id).unwrap().scale, MAX_SCALE);
    }

    #[test]
    fn remove_falls_back_selection_to_most_recent_remaining() {
        let mut store = WatermarkStore::new();
        store.add_image(record(100, 100));
        let first = store.add_watermark(text_content("a"), WatermarkPatch::default()).unwrap();
        let second = store.add_watermark(text_content("b"), WatermarkPatch::default()).unwrap();

        store.select(Some(second));
        store.remove_watermark(second);
        assert_eq!(store.selected_id(), Some(first));

        store.remove_watermark(first);
        assert_eq!(store.selected_id(), None);
    }

    #[test]
    fn selection_never_dangles_across_images() {
        let mut store = WatermarkStore::new();
        let a = store.add_image(record(100, 100));
        let b = store.add_image(record(100, 100));
        let on_a = store.add_watermark_to(a, text_content("a"), WatermarkPatch::default()).unwrap();

        // Watermark on image A cannot be selected while B is active.
        store.set_active_image(b);
        store.select(Some(on_a));
        assert_eq!(store.selected_id(), None);
    }

    #[test]
    fn mutation_invalidates_cached_result() {
        let mut store = WatermarkStore::new();
        let img = store.add_image(record(10, 10));
        let id = store.add_watermark(text_content("a"), WatermarkPatch::default()).unwrap();

        store.commit_render(img, Ok(RgbaImage::new(10, 10)));
        assert!(store.record(img).unwrap().result.is_some());

        store.update_watermark(id, WatermarkPatch::opacity(0.5));
        assert!(store.record(img).unwrap().result.is_none(), "stale result must be cleared");
    }

    #[test]
    fn failed_render_leaves_previous_result_untouched() {
        let mut store = WatermarkStore::new();
        let img = store.add_image(record(10, 10));

        store.commit_render(img, Ok(RgbaImage::new(10, 10)));
        store.commit_render(img, Err(RenderError::CanvasUnavailable));
        assert!(store.record(img).unwrap().result.is_some());
    }

    #[test]
    fn reorder_moves_paint_order() {
        let mut store = WatermarkStore::new();
        let img = store.add_image(record(100, 100));
        let a = store.add_watermark(text_content("a"), WatermarkPatch::default()).unwrap();
        let b = store.add_watermark(text_content("b"), WatermarkPatch::default()).unwrap();

        store.reorder_watermark(b, 0);
        let order: Vec<Uuid> = store.record(img).unwrap().watermarks.iter().map(|w| w.id).collect();
        assert_eq!(order, vec![b, a]);
    }

    #[test]
    fn clone_all_to_every_other_copies_with_fresh_ids() {
        let mut store = WatermarkStore::new();
        let source = store.add_image(record(100, 100));
        let mut others = Vec::new();
        for _ in 0..4 {
            others.push(store.add_image(record(100, 100)));
        }
        let original = store
            .add_watermark_to(source, text_content("©"), WatermarkPatch::scale(0.3))
            .unwrap();

        store.clone_all_to_every_other(source);

        let mut seen = vec![original];
        for &other in &others {
            let copies = &store.record(other).unwrap().watermarks;
            assert_eq!(copies.len(), 1);
            let copy = &copies[0];
            assert_eq!(copy.scale, 0.3);
            assert!(!seen.contains(&copy.id), "ids must be fresh per copy");
            seen.push(copy.id);
        }

        // Mutating one copy must not affect the others.
        let victim = store.record(others[0]).unwrap().watermarks[0].id;
        store.update_watermark(victim, WatermarkPatch::opacity(0.2));
        assert_eq!(store.watermark(original).unwrap().opacity, 1.0);
        assert_eq!(store.record(others[1]).unwrap().watermarks[0].opacity, 1.0);
    }
}
