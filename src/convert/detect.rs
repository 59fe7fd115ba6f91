use image::ImageFormat;

/// Identify the encoding of `bytes` from its magic number.
///
/// Returns `None` for empty or unrecognised input rather than guessing.
pub fn detect_source_format(bytes: &[u8]) -> Option<ImageFormat> {
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => Some(ImageFormat::Jpeg),
        [0x89, 0x50, 0x4E, 0x47, ..] => Some(ImageFormat::Png),
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => {
            Some(ImageFormat::WebP)
        }
        _ => match image::guess_format(bytes) {
            Ok(format) => Some(format),
            Err(_) => {
                tracing::debug!(
                    "Unrecognized image signature (first 4 bytes: {:02X?})",
                    &bytes[..bytes.len().min(4)]
                );
                None
            }
        },
    }
}
