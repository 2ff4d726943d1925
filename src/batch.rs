//! Batch processing: apply the compositor across every open image.

use image::RgbaImage;
use rayon::prelude::*;
use uuid::Uuid;

use crate::compositor::{render, RenderError};
use crate::log_info;
use crate::store::WatermarkStore;
use crate::text::FontCache;

/// Aggregate outcome of one batch run.
///
/// `skipped` counts images with zero watermarks — deliberately not failures.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failures: Vec<(Uuid, RenderError)>,
}

impl BatchSummary {
    /// Number of images a render was attempted for.
    pub fn attempted(&self) -> usize {
        self.processed + self.failures.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }

    /// User-facing progress line, e.g. `processed 4 of 6 (2 skipped)`.
    pub fn message(&self) -> String {
        let mut msg = format!("processed {} of {}", self.processed, self.attempted());
        if self.skipped > 0 {
            msg.push_str(&format!(" ({} skipped)", self.skipped));
        }
        msg
    }
}

/// Render every image that has at least one watermark and commit the results.
///
/// Renders run in parallel across images; each worker reads its record
/// immutably and produces an owned bitmap, and all cached-result writes
/// happen afterwards on the caller's thread — one writer per record, no
/// locks. A per-image failure is recorded and the batch keeps going; the
/// failed image keeps whatever cached result it had.
pub fn process_all(store: &mut WatermarkStore, preview_scale: f32) -> BatchSummary {
    let outcomes: Vec<(Uuid, Result<RgbaImage, RenderError>)> = store
        .records()
        .par_iter()
        .filter(|record| !record.watermarks.is_empty())
        .map_init(FontCache::new, |fonts, record| {
            let outcome = render(&record.pixels, &record.watermarks, preview_scale, fonts);
            (record.id, outcome)
        })
        .collect();

    let skipped = store
        .records()
        .iter()
        .filter(|r| r.watermarks.is_empty())
        .count();

    let mut summary = BatchSummary { skipped, ..Default::default() };
    for (image_id, outcome) in outcomes {
        match outcome {
            Ok(bitmap) => {
                summary.processed += 1;
                store.commit_render(image_id, Ok(bitmap));
            }
            Err(err) => {
                log_info!("batch: image {image_id} failed: {err}");
                summary.failures.push((image_id, err));
            }
        }
    }
    summary
}
