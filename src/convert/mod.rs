//! Image format conversion
//!
//! Sniffs the source encoding from the bytes, decodes to a raster and
//! re-encodes into one of the supported web formats (PNG, JPEG, WebP).

pub mod converter;
pub mod detect;
pub mod mock;

pub use converter::{ConverterOptions, ImageConverter};
pub use detect::detect_source_format;
pub use mock::MockConverter;

use crate::models::{ConvertedImage, ImageBlob, TargetFormat};
use crate::Result;
use async_trait::async_trait;
use image::ImageFormat;

#[async_trait]
pub trait ConvertService: Send + Sync {
    async fn convert_image(&self, image: ImageBlob, target: TargetFormat) -> Result<ConvertedImage>;

    /// Decode `image` without re-encoding it, returning its source format.
    async fn validate_image(&self, image: ImageBlob) -> Result<ImageFormat>;
}
