use image::{DynamicImage, ImageFormat};

use crate::error::{InferenceError, Result};

/// Formats the pipeline accepts. Anything else is rejected up front.
pub const SUPPORTED_FORMATS: [ImageFormat; 4] = [
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::Bmp,
    ImageFormat::Tiff,
];

/// Decode raw upload bytes into an image.
///
/// The format is sniffed from the content, not from the filename, so a
/// renamed file cannot smuggle an unsupported codec past the check.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    let format = image::guess_format(bytes).map_err(|_| {
        InferenceError::UnsupportedFormat("unrecognized image signature".to_string())
    })?;

    if !SUPPORTED_FORMATS.contains(&format) {
        return Err(InferenceError::UnsupportedFormat(format!("{format:?}")));
    }

    image::load_from_memory_with_format(bytes, format)
        .map_err(|e| InferenceError::DecodeFailed(e.to_string()))
}
