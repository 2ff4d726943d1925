//! The compositor: draws an ordered watermark list onto a source bitmap,
//! reproducing exactly what the interactive preview displayed.
//!
//! # Convention contract
//!
//! Placement is CENTER-anchored: a watermark's pixel center is
//! `position × output dimensions`. `scale` is authored against the preview
//! viewport, and [`render`] divides it by `preview_scale` (the ratio of
//! preview display size to natural image size, min over both axes) so the
//! final raster matches the on-screen proportion exactly. Headless callers
//! author directly in natural-image space and pass `preview_scale = 1.0`,
//! which makes `scale` a plain multiplier of the watermark's natural pixel
//! dimensions. The same convention holds on both sides; there is no second
//! code path.

use image::{Rgba, RgbaImage};
use rayon::prelude::*;

use crate::geometry::to_pixel;
use crate::log_warn;
use crate::text::{rasterize_text, FontCache};
use crate::watermark::{Watermark, WatermarkContent};

/// Output surfaces above this pixel count are refused rather than allocated.
const MAX_CANVAS_PIXELS: u64 = 256_000_000;

// ============================================================================
// ERRORS
// ============================================================================

/// Failures that make a render meaningless. Per-watermark problems are not
/// here — a single bad watermark is skipped and reported, never fatal.
#[derive(Debug, PartialEq, Eq)]
pub enum RenderError {
    /// Render requested with zero watermarks on the target image.
    NoWatermarks,
    /// The output surface could not be created (degenerate or oversized
    /// source dimensions).
    CanvasUnavailable,
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderError::NoWatermarks => write!(f, "no watermarks to apply"),
            RenderError::CanvasUnavailable => write!(f, "output surface could not be created"),
        }
    }
}

// ============================================================================
// RENDER
// ============================================================================

/// Composite `watermarks` over `source` in paint order (index 0 first, later
/// entries on top) and return the finished surface at the source's natural
/// pixel size.
///
/// A watermark whose bitmap cannot be resolved (missing font, empty text
/// raster) is skipped and logged; the rest of the render continues.
pub fn render(
    source: &RgbaImage,
    watermarks: &[Watermark],
    preview_scale: f32,
    fonts: &mut FontCache,
) -> Result<RgbaImage, RenderError> {
    if watermarks.is_empty() {
        return Err(RenderError::NoWatermarks);
    }
    let (w, h) = (source.width(), source.height());
    if w == 0 || h == 0 || (w as u64) * (h as u64) > MAX_CANVAS_PIXELS {
        return Err(RenderError::CanvasUnavailable);
    }

    let preview_scale = if preview_scale > 0.0 {
        preview_scale
    } else {
        log_warn!("render: non-positive preview scale {preview_scale}, assuming 1.0");
        1.0
    };

    // Output surface = source drawn at origin, unscaled.
    let mut canvas = source.clone();

    for wm in watermarks {
        if wm.opacity <= 0.0 {
            continue;
        }
        let effective_scale = wm.scale / preview_scale;
        let center = to_pixel(wm.position, w as f32, h as f32);

        match &wm.content {
            WatermarkContent::Image(bitmap) => {
                if bitmap.width() == 0 || bitmap.height() == 0 {
                    log_warn!("render: watermark {} has an empty bitmap, skipped", wm.id);
                    continue;
                }
                draw_overlay(&mut canvas, bitmap, center, effective_scale, wm.rotation, wm.opacity);
            }
            WatermarkContent::Text { text, font } => {
                let Some(loaded) = fonts.resolve(font) else {
                    log_warn!(
                        "render: font '{}' (weight {}) unavailable, watermark {} skipped",
                        font.family, font.weight, wm.id
                    );
                    continue;
                };
                let px_size = font.size * effective_scale;
                let Some(raster) = rasterize_text(&loaded, text, px_size, font.color) else {
                    continue; // nothing visible to draw
                };
                // Rasterized at final pixel size already, so drawn at scale 1.
                draw_overlay(&mut canvas, &raster, center, 1.0, wm.rotation, wm.opacity);
            }
        }
    }

    Ok(canvas)
}

// ============================================================================
// OVERLAY DRAWING — destination-space inverse mapping
// ============================================================================

/// Draw `overlay` onto `canvas`, centered at `center`, scaled by `scale` and
/// rotated by `rotation_deg` about its own center, composited source-over at
/// `opacity`.
///
/// Iterates destination pixels inside the rotated bounding box and
/// inverse-transforms each into overlay space with bilinear sampling, so the
/// result is deterministic for identical inputs and free of rotation seams.
/// Rows are processed in parallel; each row touches only its own slice, so
/// no transform or alpha state can leak between watermarks.
fn draw_overlay(
    canvas: &mut RgbaImage,
    overlay: &RgbaImage,
    center: (f32, f32),
    scale: f32,
    rotation_deg: f32,
    opacity: f32,
) {
    if scale <= 0.0 || opacity <= 0.0 {
        return;
    }
    let canvas_w = canvas.width();
    let canvas_h = canvas.height();
    let ow = overlay.width() as f32;
    let oh = overlay.height() as f32;
    let scaled_w = ow * scale;
    let scaled_h = oh * scale;

    let (sin, cos) = rotation_deg.to_radians().sin_cos();

    // Axis-aligned bounds of the rotated box, padded one pixel for the
    // bilinear edge, clamped to the canvas.
    let ext_x = (cos.abs() * scaled_w + sin.abs() * scaled_h) * 0.5 + 1.0;
    let ext_y = (sin.abs() * scaled_w + cos.abs() * scaled_h) * 0.5 + 1.0;
    let x0 = ((center.0 - ext_x).floor().max(0.0)) as u32;
    let x1 = ((center.0 + ext_x).ceil().min(canvas_w as f32)) as u32;
    let y0 = ((center.1 - ext_y).floor().max(0.0)) as u32;
    let y1 = ((center.1 + ext_y).ceil().min(canvas_h as f32)) as u32;
    if x0 >= x1 || y0 >= y1 {
        return;
    }

    let inv_scale = 1.0 / scale;
    let src_w = overlay.width() as i32;
    let src_h = overlay.height() as i32;
    let src_stride = src_w as usize * 4;
    let src_raw = overlay.as_raw();

    let row_bytes = canvas_w as usize * 4;
    canvas
        .as_mut()
        .par_chunks_mut(row_bytes)
        .enumerate()
        .for_each(|(dy, row)| {
            if (dy as u32) < y0 || (dy as u32) >= y1 {
                return;
            }
            let py = dy as f32 + 0.5 - center.1;

            for dx in x0..x1 {
                let px = dx as f32 + 0.5 - center.0;

                // Inverse rotation into the overlay's local frame, then into
                // overlay pixel-index space (pixel centers at i + 0.5).
                let lx = (px * cos + py * sin) * inv_scale;
                let ly = (-px * sin + py * cos) * inv_scale;
                let sx = lx + ow * 0.5 - 0.5;
                let sy = ly + oh * 0.5 - 0.5;

                let fx0 = sx.floor() as i32;
                let fy0 = sy.floor() as i32;
                if fx0 < -1 || fy0 < -1 || fx0 >= src_w || fy0 >= src_h {
                    continue;
                }
                let fx = sx - fx0 as f32;
                let fy = sy - fy0 as f32;

                let sample = |x: i32, y: i32| -> [f32; 4] {
                    if x < 0 || y < 0 || x >= src_w || y >= src_h {
                        [0.0; 4]
                    } else {
                        let idx = y as usize * src_stride + x as usize * 4;
                        [
                            src_raw[idx] as f32,
                            src_raw[idx + 1] as f32,
                            src_raw[idx + 2] as f32,
                            src_raw[idx + 3] as f32,
                        ]
                    }
                };

                let tl = sample(fx0, fy0);
                let tr = sample(fx0 + 1, fy0);
                let bl = sample(fx0, fy0 + 1);
                let br = sample(fx0 + 1, fy0 + 1);

                let mut top = [0u8; 4];
                for c in 0..4 {
                    let t = tl[c] + (tr[c] - tl[c]) * fx;
                    let b = bl[c] + (br[c] - bl[c]) * fx;
                    top[c] = (t + (b - t) * fy).round().clamp(0.0, 255.0) as u8;
                }
                if top[3] == 0 {
                    continue;
                }

                let off = dx as usize * 4;
                let base = Rgba([row[off], row[off + 1], row[off + 2], row[off + 3]]);
                let out = blend_pixel(base, Rgba(top), opacity);
                row[off..off + 4].copy_from_slice(&out.0);
            }
        });
}

/// Source-over alpha compositing with an extra opacity multiplier on the top
/// pixel.
fn blend_pixel(base: Rgba<u8>, top: Rgba<u8>, opacity: f32) -> Rgba<u8> {
    if top[3] == 0 {
        return base;
    }
    // Fully opaque top pixel at full opacity — just overwrite.
    if opacity >= 1.0 && top[3] == 255 {
        return top;
    }

    let opacity = opacity.clamp(0.0, 1.0);

    let base_a = base[3] as f32 / 255.0;
    let top_a = (top[3] as f32 / 255.0) * opacity;

    let out_a = top_a + base_a * (1.0 - top_a);
    if out_a == 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let mut out = [0u8; 4];
    for c in 0..3 {
        let base_c = base[c] as f32 / 255.0;
        let top_c = top[c] as f32 / 255.0;
        let v = (top_c * top_a + base_c * base_a * (1.0 - top_a)) / out_a;
        out[c] = (v * 255.0).clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).clamp(0.0, 255.0) as u8;
    Rgba(out)
}

// ============================================================================
// TESTS
// ============================================================================
