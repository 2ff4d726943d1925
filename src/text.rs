//! Text watermark layout and rasterization.
//!
//! Text content is rasterized to a tight RGBA buffer at its effective pixel
//! size right before compositing, so scaled text stays crisp instead of being
//! resampled from a base-size raster. Lines are center-aligned, matching the
//! center-anchor placement convention.

use std::collections::HashMap;

use ab_glyph::{point, Font, FontArc, GlyphId, ScaleFont};
use image::RgbaImage;

use crate::watermark::{FontSpec, WatermarkContent};

/// Rough advance-width fraction used when no real font can be loaded and
/// text extent has to be estimated for hit-testing.
const FALLBACK_ADVANCE: f32 = 0.6;

// ============================================================================
// SYSTEM FONT LOOKUP
// ============================================================================

/// Load a font by family name and CSS-style weight from the system.
/// Returns None if no matching font can be found or loaded.
pub fn load_system_font(family: &str, weight: u16) -> Option<FontArc> {
    use font_kit::family_name::FamilyName;
    use font_kit::properties::{Properties, Weight};
    use font_kit::source::SystemSource;

    let mut props = Properties::new();
    props.weight = Weight(weight as f32);

    let source = SystemSource::new();
    let handle = source
        .select_best_match(&[FamilyName::Title(family.to_string())], &props)
        .ok()?;

    let font_data = handle.load().ok()?;
    let font_data_copy = font_data.copy_font_data()?;
    let bytes: Vec<u8> = (*font_data_copy).clone();
    FontArc::try_from_vec(bytes).ok()
}

/// Cache of loaded fonts keyed by (family, weight). Failed lookups are
/// cached too, so a missing font is probed at most once per session.
#[derive(Default)]
pub struct FontCache {
    fonts: HashMap<(String, u16), Option<FontArc>>,
}

impl FontCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a font for the given spec, trying the requested family first
    /// and then a short list of broadly-available fallbacks.
    pub fn resolve(&mut self, spec: &FontSpec) -> Option<FontArc> {
        if let Some(font) = self.lookup(&spec.family, spec.weight) {
            return Some(font);
        }
        for fallback in ["Liberation Sans", "DejaVu Sans", "Arial", "Helvetica"] {
            if fallback == spec.family {
                continue;
            }
            if let Some(font) = self.lookup(fallback, spec.weight) {
                return Some(font);
            }
        }
        None
    }

    fn lookup(&mut self, family: &str, weight: u16) -> Option<FontArc> {
        self.fonts
            .entry((family.to_string(), weight))
            .or_insert_with(|| load_system_font(family, weight))
            .clone()
    }
}

// ============================================================================
// LAYOUT
// ============================================================================

/// Lay out a single line of text left-aligned at x = 0.
/// Returns positioned glyphs (x, baseline-relative y = 0) and the advance width.
fn layout_line(font: &FontArc, line: &str, size: f32) -> (Vec<(GlyphId, f32)>, f32) {
    let scaled = font.as_scaled(size);
    let mut glyphs = Vec::new();
    let mut cursor_x = 0.0f32;
    let mut last_glyph: Option<GlyphId> = None;

    for ch in line.chars() {
        let glyph_id = font.glyph_id(ch);
        if let Some(prev) = last_glyph {
            cursor_x += scaled.kern(prev, glyph_id);
        }
        glyphs.push((glyph_id, cursor_x));
        cursor_x += scaled.h_advance(glyph_id);
        last_glyph = Some(glyph_id);
    }

    (glyphs, cursor_x)
}

/// Measure a (possibly multiline) text block at the given pixel size.
/// Returns (width of the widest line, line count × line height).
pub fn measure_text(font: &FontArc, text: &str, size: f32) -> (f32, f32) {
    let scaled = font.as_scaled(size);
    let line_height = scaled.height();
    let mut max_width = 0.0f32;
    let mut lines = 0u32;
    for line in text.split('\n') {
        let (_, width) = layout_line(font, line, size);
        max_width = max_width.max(width);
        lines += 1;
    }
    (max_width, lines.max(1) as f32 * line_height)
}

/// Extent estimate used when no font is available — keeps hit-testing and
/// bounds constraints functional even if font lookup fails.
pub fn estimate_text_size(text: &str, size: f32) -> (f32, f32) {
    let max_chars = text.split('\n').map(|l| l.chars().count()).max().unwrap_or(0);
    let lines = text.split('\n').count().max(1);
    (max_chars as f32 * size * FALLBACK_ADVANCE, lines as f32 * size * 1.2)
}

/// Natural (unscaled) pixel dimensions of a watermark's content: bitmap
/// dimensions for image content, measured text extent at the base font size
/// for text content.
pub fn natural_size(content: &WatermarkContent, fonts: &mut FontCache) -> (f32, f32) {
    match content {
        WatermarkContent::Image(img) => (img.width() as f32, img.height() as f32),
        WatermarkContent::Text { text, font } => match fonts.resolve(font) {
            Some(loaded) => measure_text(&loaded, text, font.size),
            None => estimate_text_size(text, font.size),
        },
    }
}

// ============================================================================
// RASTERIZATION
// ============================================================================

/// Rasterize a text block into a tight RGBA buffer at the given pixel size.
/// Lines are center-aligned on the widest line. Returns None for text with
/// no visible extent (empty or whitespace-only with zero advance).
pub fn rasterize_text(font: &FontArc, text: &str, size: f32, color: [u8; 4]) -> Option<RgbaImage> {
    let scaled = font.as_scaled(size);
    let ascent = scaled.ascent();
    let line_height = scaled.height();

    // Lay out all lines, center-aligned around x = 0.
    let mut all_glyphs: Vec<(GlyphId, f32, f32)> = Vec::new();
    for (line_idx, line) in text.split('\n').enumerate() {
        let (glyphs, width) = layout_line(font, line, size);
        let baseline_y = ascent + line_idx as f32 * line_height;
        for (id, x) in glyphs {
            all_glyphs.push((id, x - width * 0.5, baseline_y));
        }
    }
    if all_glyphs.is_empty() {
        return None;
    }

    // Bounding box over all glyphs.
    let mut min_x = f32::MAX;
    let mut min_y = f32::MAX;
    let mut max_x = f32::MIN;
    let mut max_y = f32::MIN;
    for &(glyph_id, gx, gy) in &all_glyphs {
        let glyph = glyph_id.with_scale_and_position(size, point(gx, gy));
        let bounds = font.glyph_bounds(&glyph);
        min_x = min_x.min(bounds.min.x);
        min_y = min_y.min(bounds.min.y);
        max_x = max_x.max(bounds.max.x);
        max_y = max_y.max(bounds.max.y);
    }
    if min_x >= max_x || min_y >= max_y {
        return None;
    }

    let pad = 2.0;
    min_x -= pad;
    min_y -= pad;
    max_x += pad;
    max_y += pad;

    let buf_w = (max_x - min_x).ceil() as u32;
    let buf_h = (max_y - min_y).ceil() as u32;
    if buf_w == 0 || buf_h == 0 {
        return None;
    }

    // Single-channel coverage, then converted to RGBA with the fill color.
    let mut coverage = vec![0.0f32; buf_w as usize * buf_h as usize];
    for &(glyph_id, gx, gy) in &all_glyphs {
        let glyph = glyph_id.with_scale_and_position(size, point(gx, gy));
        if let Some(outlined) = font.outline_glyph(glyph) {
            let bounds = outlined.px_bounds();
            let origin_x = bounds.min.x - min_x;
            let origin_y = bounds.min.y - min_y;
            outlined.draw(|px, py, cov| {
                let ix = (origin_x + px as f32) as i32;
                let iy = (origin_y + py as f32) as i32;
                if ix >= 0 && iy >= 0 && (ix as u32) < buf_w && (iy as u32) < buf_h {
                    let idx = iy as usize * buf_w as usize + ix as usize;
                    coverage[idx] = coverage[idx].max(cov);
                }
            });
        }
    }

    let mut out = RgbaImage::new(buf_w, buf_h);
    let raw = out.as_mut();
    for (i, &cov) in coverage.iter().enumerate() {
        if cov > 0.001 {
            let idx = i * 4;
            raw[idx] = color[0];
            raw[idx + 1] = color[1];
            raw[idx + 2] = color[2];
            raw[idx + 3] = (color[3] as f32 * cov).round().min(255.0) as u8;
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watermark::FontSpec;

    /// Tests that need a real font skip silently on systems without one.
    fn any_font() -> Option<FontArc> {
        let mut cache = FontCache::new();
        cache.resolve(&FontSpec::default())
    }

    #[test]
    fn estimate_scales_with_text_and_size() {
        let (w1, h1) = estimate_text_size("ab", 24.0);
        let (w2, h2) = estimate_text_size("abcd", 24.0);
        assert!(w2 > w1);
        assert_eq!(h1, h2);
        let (_, h3) = estimate_text_size("a\nb", 24.0);
        assert!(h3 > h1);
    }

    #[test]
    fn measure_empty_line_has_height() {
        let Some(font) = any_font() else { return };
        let (w, h) = measure_text(&font, "", 24.0);
        assert_eq!(w, 0.0);
        assert!(h > 0.0);
    }

    #[test]
    fn rasterize_produces_colored_pixels() {
        let Some(font) = any_font() else { return };
        let raster = rasterize_text(&font, "W", 32.0, [255, 0, 0, 255]).expect("non-empty raster");
        assert!(raster.width() > 0 && raster.height() > 0);
        let covered = raster.pixels().any(|p| p[3] > 0 && p[0] == 255);
        assert!(covered, "expected at least one red covered pixel");
    }

    #[test]
    fn rasterize_empty_text_is_none() {
        let Some(font) = any_font() else { return };
        assert!(rasterize_text(&font, "", 32.0, [255, 255, 255, 255]).is_none());
    }

    #[test]
    fn larger_size_measures_larger() {
        let Some(font) = any_font() else { return };
        let (w_small, h_small) = measure_text(&font, "wmark", 16.0);
        let (w_big, h_big) = measure_text(&font, "wmark", 48.0);
        assert!(w_big > w_small && h_big > h_small);
    }
}
