//! Image decode/encode and output-path handling.
//!
//! Decoding is synchronous and must be called off the interactive path
//! (the CLI thread or a rayon worker) — pointer handling never decodes.

use std::fs::File;
use std::io::{BufWriter, Cursor, Write};
use std::path::Path;
use std::sync::Arc;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, RgbaImage};

use crate::store::SourceImageRecord;

// ============================================================================
// OUTPUT FORMATS
// ============================================================================

/// Raster output encodings wmark can produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    Jpeg,
    Webp,
    Bmp,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Webp => "webp",
            OutputFormat::Bmp => "bmp",
        }
    }

    /// Parse a format name or file extension. Unknown names fall back to
    /// JPEG, the default lossy encoding.
    pub fn parse(name: &str) -> OutputFormat {
        match name.to_lowercase().as_str() {
            "png" => OutputFormat::Png,
            "jpeg" | "jpg" => OutputFormat::Jpeg,
            "webp" => OutputFormat::Webp,
            "bmp" => OutputFormat::Bmp,
            _ => OutputFormat::Jpeg,
        }
    }

    /// Format matching a source file's extension, used so outputs default to
    /// the input's own type. Unknown extensions map to PNG (lossless — never
    /// degrade an input we could not identify).
    pub fn from_source_extension(ext: &str) -> OutputFormat {
        match ext.to_lowercase().as_str() {
            "jpeg" | "jpg" => OutputFormat::Jpeg,
            "webp" => OutputFormat::Webp,
            "bmp" => OutputFormat::Bmp,
            _ => OutputFormat::Png,
        }
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// A source or watermark bitmap could not be read or decoded.
#[derive(Debug)]
pub enum DecodeError {
    Io(std::io::Error),
    Malformed(String),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::Io(e) => write!(f, "I/O error: {}", e),
            DecodeError::Malformed(e) => write!(f, "decode failed: {}", e),
        }
    }
}

impl From<std::io::Error> for DecodeError {
    fn from(e: std::io::Error) -> Self {
        DecodeError::Io(e)
    }
}

impl From<image::ImageError> for DecodeError {
    fn from(e: image::ImageError) -> Self {
        DecodeError::Malformed(e.to_string())
    }
}

/// A composited surface could not be encoded or written.
#[derive(Debug)]
pub enum EncodeError {
    Io(std::io::Error),
    Encode(String),
}

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncodeError::Io(e) => write!(f, "I/O error: {}", e),
            EncodeError::Encode(e) => write!(f, "encode failed: {}", e),
        }
    }
}

impl From<std::io::Error> for EncodeError {
    fn from(e: std::io::Error) -> Self {
        EncodeError::Io(e)
    }
}

impl From<image::ImageError> for EncodeError {
    fn from(e: image::ImageError) -> Self {
        EncodeError::Encode(e.to_string())
    }
}

// ============================================================================
// DECODE
// ============================================================================

/// Decode raw image bytes (JPEG/PNG/WebP/BMP, format sniffed) into RGBA.
pub fn decode_image(bytes: &[u8]) -> Result<RgbaImage, DecodeError> {
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}

/// Decode a watermark asset from disk.
pub fn load_watermark_image(path: &Path) -> Result<RgbaImage, DecodeError> {
    Ok(image::open(path)?.to_rgba8())
}

/// Load a source image into a record: decoded pixels, display name, and the
/// output format matching the file's own type.
pub fn load_source_image(path: &Path) -> Result<SourceImageRecord, DecodeError> {
    let pixels = image::open(path)?.to_rgba8();

    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("image")
        .to_string();
    let format = path
        .extension()
        .and_then(|e| e.to_str())
        .map(OutputFormat::from_source_extension)
        .unwrap_or(OutputFormat::Png);

    Ok(SourceImageRecord::new(name, format, Arc::new(pixels)))
}

// ============================================================================
// ENCODE
// ============================================================================

/// Encode a composited image to bytes.
///
/// `quality` is a 1–100 percentage applied to lossy formats; PNG and BMP are
/// always lossless and ignore it.
pub fn encode_image(
    image: &RgbaImage,
    format: OutputFormat,
    quality: u8,
) -> Result<Vec<u8>, EncodeError> {
    let mut buf: Vec<u8> = Vec::new();
    let mut cursor = Cursor::new(&mut buf);

    match format {
        OutputFormat::Png => {
            let encoder = PngEncoder::new(&mut cursor);
            #[allow(deprecated)]
            encoder.encode(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ColorType::Rgba8,
            )?;
        }
        OutputFormat::Jpeg => {
            // JPEG has no alpha channel; flatten to RGB first.
            let rgb_image = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut cursor, quality.clamp(1, 100));
            encoder.encode(
                rgb_image.as_raw(),
                rgb_image.width(),
                rgb_image.height(),
                image::ColorType::Rgb8,
            )?;
        }
        OutputFormat::Webp => {
            let dyn_img = DynamicImage::ImageRgba8(image.clone());
            dyn_img.write_to(&mut cursor, image::ImageOutputFormat::WebP)?;
        }
        OutputFormat::Bmp => {
            let dyn_img = DynamicImage::ImageRgba8(image.clone());
            dyn_img.write_to(&mut cursor, image::ImageOutputFormat::Bmp)?;
        }
    }

    Ok(buf)
}

/// Encode and write to a file.
/// Standalone (no `&mut self`) so it can run on rayon workers.
pub fn encode_and_write(
    image: &RgbaImage,
    path: &Path,
    format: OutputFormat,
    quality: u8,
) -> Result<(), EncodeError> {
    let bytes = encode_image(image, format, quality)?;
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&bytes)?;
    Ok(())
}

// ============================================================================
// OUTPUT NAMING
// ============================================================================

/// Derive the output filename for a processed source image:
/// `watermarked_<stem>.<ext>`, with the format's extension appended when the
/// source name carried none.
pub fn output_file_name(source_name: &str, format: OutputFormat) -> String {
    let stem = match source_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => source_name,
    };
    format!("watermarked_{}.{}", stem, format.extension())
}
