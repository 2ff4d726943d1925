//! Watermark descriptors — the entities the store owns and the compositor
//! draws.

use std::sync::Arc;

use image::RgbaImage;
use uuid::Uuid;

use crate::geometry::Position;

/// Defaults applied when a watermark is first added (center of the image,
/// half natural size, fully opaque, unrotated).
pub const DEFAULT_SCALE: f32 = 0.5;
pub const DEFAULT_OPACITY: f32 = 1.0;

/// Font settings for a text watermark.
#[derive(Clone, Debug, PartialEq)]
pub struct FontSpec {
    pub family: String,
    /// Base size in pixels at scale 1.0.
    pub size: f32,
    /// CSS-style weight (400 = regular, 700 = bold).
    pub weight: u16,
    pub color: [u8; 4],
}

impl Default for FontSpec {
    fn default() -> Self {
        Self {
            family: "Arial".to_string(),
            size: 24.0,
            weight: 700,
            color: [255, 255, 255, 255],
        }
    }
}

/// What a watermark displays: a decoded bitmap or a run of styled text.
///
/// A tagged variant rather than optional fields, so a text watermark can
/// never carry stray image state (and vice versa).
#[derive(Clone)]
pub enum WatermarkContent {
    /// Decoded watermark asset. `Arc` so clones (e.g. "apply to all images")
    /// share pixel data instead of copying it.
    Image(Arc<RgbaImage>),
    Text { text: String, font: FontSpec },
}

impl WatermarkContent {
    pub fn is_text(&self) -> bool {
        matches!(self, WatermarkContent::Text { .. })
    }
}

impl std::fmt::Debug for WatermarkContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatermarkContent::Image(img) => {
                write!(f, "Image({}×{})", img.width(), img.height())
            }
            WatermarkContent::Text { text, font } => {
                write!(f, "Text({:?}, {} {}px)", text, font.family, font.size)
            }
        }
    }
}

/// A single watermark placement on one source image.
///
/// `position` is the watermark's visual center in normalized image
/// coordinates. `scale` multiplies the content's natural pixel dimensions
/// (see the convention contract on [`crate::compositor::render`]).
/// Paint order is the index within the owning record's watermark list —
/// later entries paint on top.
#[derive(Clone, Debug)]
pub struct Watermark {
    pub id: Uuid,
    pub content: WatermarkContent,
    pub position: Position,
    pub scale: f32,
    pub opacity: f32,
    /// Degrees in [0, 360), about the watermark's own center.
    pub rotation: f32,
}

impl Watermark {
    /// New watermark with default placement.
    pub fn new(content: WatermarkContent) -> Self {
        Self {
            id: Uuid::new_v4(),
            content,
            position: Position::CENTER,
            scale: DEFAULT_SCALE,
            opacity: DEFAULT_OPACITY,
            rotation: 0.0,
        }
    }

    /// Independent copy with a fresh id. Image pixel data stays shared
    /// behind the `Arc`; placement fields are fully independent.
    pub fn duplicate(&self) -> Self {
        Self {
            id: Uuid::new_v4(),
            ..self.clone()
        }
    }
}

/// Partial update merged into a watermark by
/// [`crate::store::WatermarkStore::update_watermark`]. Absent fields are
/// left untouched.
#[derive(Clone, Debug, Default)]
pub struct WatermarkPatch {
    pub position: Option<Position>,
    pub scale: Option<f32>,
    pub opacity: Option<f32>,
    pub rotation: Option<f32>,
    pub content: Option<WatermarkContent>,
}

impl WatermarkPatch {
    pub fn position(p: Position) -> Self {
        Self { position: Some(p), ..Default::default() }
    }

    pub fn scale(s: f32) -> Self {
        Self { scale: Some(s), ..Default::default() }
    }

    pub fn opacity(o: f32) -> Self {
        Self { opacity: Some(o), ..Default::default() }
    }

    pub fn rotation(deg: f32) -> Self {
        Self { rotation: Some(deg), ..Default::default() }
    }
}
