//! Background removal — an opaque external collaborator.
//!
//! The engine neither knows nor cares how backgrounds are removed; it hands
//! a bitmap over the [`BackgroundRemover`] seam and takes a bitmap back.

use image::RgbaImage;
use uuid::Uuid;

use crate::log_err;
use crate::store::WatermarkStore;
use crate::watermark::{WatermarkContent, WatermarkPatch};

/// An external processing routine failed.
#[derive(Debug)]
pub struct ProcessingError(pub String);

impl std::fmt::Display for ProcessingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "processing failed: {}", self.0)
    }
}

/// External routine that makes background pixels transparent. May return a
/// bitmap of the same or altered dimensions.
pub trait BackgroundRemover {
    fn remove_background(&self, image: &RgbaImage) -> Result<RgbaImage, ProcessingError>;
}

/// Run background removal on an image watermark's bitmap and swap the result
/// in. On failure the watermark keeps its original bitmap; text watermarks
/// and unknown ids are no-ops.
pub fn remove_watermark_background(
    store: &mut WatermarkStore,
    watermark_id: Uuid,
    remover: &dyn BackgroundRemover,
) -> Result<(), ProcessingError> {
    let Some(wm) = store.watermark(watermark_id) else {
        return Ok(());
    };
    let WatermarkContent::Image(bitmap) = &wm.content else {
        return Ok(());
    };

    match remover.remove_background(bitmap) {
        Ok(processed) => {
            store.update_watermark(
                watermark_id,
                WatermarkPatch {
                    content: Some(WatermarkContent::Image(std::sync::Arc::new(processed))),
                    ..Default::default()
                },
            );
            Ok(())
        }
        Err(err) => {
            log_err!("background removal failed for watermark {watermark_id}: {err}");
            Err(err)
        }
    }
}
