use super::{detect_source_format, ConvertService};
use crate::models::{Config, ConversionResult, ConvertedImage, ImageBlob, TargetFormat};
use crate::{Error, Result};
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::{ColorType, DynamicImage, GenericImageView, ImageFormat, ImageReader, Limits};
use std::borrow::Cow;
use std::io::Cursor;
use tracing::{debug, info, warn};

/// Tunables for [`ImageConverter`], usually derived from [`Config`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConverterOptions {
    /// JPEG quality, 1..=100.
    pub jpeg_quality: u8,
    pub max_input_bytes: usize,
    /// Upper bound on both width and height of a decoded raster.
    pub max_dimension: u32,
    /// Return the input bytes untouched when source and target formats match.
    pub passthrough_same_format: bool,
}

impl Default for ConverterOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for ConverterOptions {
    fn from(config: &Config) -> Self {
        Self {
            jpeg_quality: config.jpeg_quality,
            max_input_bytes: config.max_input_bytes,
            max_dimension: config.max_dimension,
            passthrough_same_format: config.passthrough_same_format,
        }
    }
}

/// Stateless PNG/JPEG/WebP converter.
///
/// Holds only immutable options, so one instance can be cloned into as many
/// concurrent conversions as needed.
#[derive(Debug, Clone, Default)]
pub struct ImageConverter {
    options: ConverterOptions,
}

impl ImageConverter {
    pub fn new(options: ConverterOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ConverterOptions {
        &self.options
    }

    /// Re-encode `image` into `target`.
    ///
    /// The source encoding is detected from the bytes; the blob's declared
    /// format is only used for diagnostics. On failure nothing is returned but
    /// the error.
    pub fn convert(&self, image: &ImageBlob, target: TargetFormat) -> ConversionResult {
        let (raster, source_format) = self.decode(image)?;
        let (width, height) = raster.dimensions();

        let same_format = TargetFormat::from_image_format(source_format) == Some(target);
        let bytes = if same_format && self.options.passthrough_same_format {
            debug!("Source already {}, passing bytes through", target);
            image.bytes().to_vec()
        } else {
            self.encode(&raster, target)?
        };

        info!(
            "Converted {:?} {}x{} ({} bytes) to {} ({} bytes)",
            source_format,
            width,
            height,
            image.len(),
            target,
            bytes.len()
        );

        Ok(ConvertedImage {
            blob: ImageBlob::new(bytes).with_declared_format(target.mime_type()),
            format: target,
            source_format,
            width,
            height,
        })
    }

    /// Like [`ImageConverter::convert`], but validates a free-form target name
    /// first. An unknown target fails before any bytes are inspected.
    pub fn convert_named(&self, image: &ImageBlob, target: &str) -> ConversionResult {
        let target: TargetFormat = target.parse()?;
        self.convert(image, target)
    }

    /// Check that `image` decodes under the configured limits, without
    /// encoding anything. Returns the detected source format.
    pub fn validate(&self, image: &ImageBlob) -> Result<ImageFormat> {
        self.decode(image).map(|(_, format)| format)
    }

    fn decode(&self, image: &ImageBlob) -> Result<(DynamicImage, ImageFormat)> {
        if image.is_empty() {
            warn!("Rejected empty image payload");
            return Err(Error::Decode("image payload is empty".to_string()));
        }
        if image.len() > self.options.max_input_bytes {
            warn!(
                "Rejected image payload of {} bytes (limit {})",
                image.len(),
                self.options.max_input_bytes
            );
            return Err(Error::Decode(format!(
                "image payload of {} bytes exceeds the {} byte limit",
                image.len(),
                self.options.max_input_bytes
            )));
        }

        let mut reader = ImageReader::new(Cursor::new(image.bytes()))
            .with_guessed_format()
            .map_err(|e| Error::Decode(format!("failed to read image header: {}", e)))?;
        let format = reader
            .format()
            .ok_or_else(|| Error::Decode("unrecognized image encoding".to_string()))?;

        if let Some(declared) = image.declared_format() {
            if !declared_matches(declared, format) {
                debug!(
                    "Declared format '{}' does not match detected {:?}",
                    declared, format
                );
            }
        }

        let mut limits = Limits::default();
        limits.max_image_width = Some(self.options.max_dimension);
        limits.max_image_height = Some(self.options.max_dimension);
        reader.limits(limits);

        let raster = reader
            .decode()
            .map_err(|e| Error::Decode(format!("failed to decode {:?} image: {}", format, e)))?;

        let (width, height) = raster.dimensions();
        if width > self.options.max_dimension || height > self.options.max_dimension {
            return Err(Error::Decode(format!(
                "image of {}x{} exceeds the {} pixel dimension limit",
                width, height, self.options.max_dimension
            )));
        }

        Ok((raster, format))
    }

    fn encode(&self, raster: &DynamicImage, target: TargetFormat) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();

        let written = match target {
            TargetFormat::Png => {
                prepare_for_png(raster).write_with_encoder(PngEncoder::new(&mut buffer))
            }
            TargetFormat::Jpeg => prepare_for_jpeg(raster).write_with_encoder(
                JpegEncoder::new_with_quality(&mut buffer, self.options.jpeg_quality),
            ),
            TargetFormat::Webp => {
                prepare_for_webp(raster).write_with_encoder(WebPEncoder::new_lossless(&mut buffer))
            }
        };

        written.map_err(|e| Error::Encode(format!("failed to encode {}: {}", target, e)))?;
        Ok(buffer)
    }
}

fn declared_matches(declared: &str, detected: ImageFormat) -> bool {
    let declared = declared.trim().to_ascii_lowercase();
    declared == detected.to_mime_type()
        || detected
            .extensions_str()
            .iter()
            .any(|ext| declared == *ext || declared.trim_start_matches('.') == *ext)
}

// PNG stores up to 16 bits per channel.
fn prepare_for_png(raster: &DynamicImage) -> Cow<'_, DynamicImage> {
    match raster.color() {
        ColorType::Rgb32F | ColorType::Rgba32F => {
            Cow::Owned(DynamicImage::ImageRgba16(raster.to_rgba16()))
        }
        _ => Cow::Borrowed(raster),
    }
}

// JPEG has no alpha channel and is 8-bit only.
fn prepare_for_jpeg(raster: &DynamicImage) -> Cow<'_, DynamicImage> {
    match raster.color() {
        ColorType::L8 | ColorType::Rgb8 => Cow::Borrowed(raster),
        ColorType::La8 | ColorType::L16 | ColorType::La16 => {
            Cow::Owned(DynamicImage::ImageLuma8(raster.to_luma8()))
        }
        _ => Cow::Owned(DynamicImage::ImageRgb8(raster.to_rgb8())),
    }
}

fn prepare_for_webp(raster: &DynamicImage) -> Cow<'_, DynamicImage> {
    match raster.color() {
        ColorType::Rgb8 | ColorType::Rgba8 => Cow::Borrowed(raster),
        color if color.has_alpha() => Cow::Owned(DynamicImage::ImageRgba8(raster.to_rgba8())),
        _ => Cow::Owned(DynamicImage::ImageRgb8(raster.to_rgb8())),
    }
}

#[async_trait]
impl ConvertService for ImageConverter {
    async fn convert_image(&self, image: ImageBlob, target: TargetFormat) -> Result<ConvertedImage> {
        if let Some(source) = detect_source_format(image.bytes()) {
            debug!("Queueing {:?} -> {} conversion", source, target);
        }

        let converter = self.clone();
        tokio::task::spawn_blocking(move || converter.convert(&image, target))
            .await
            .map_err(|e| Error::Invariant(format!("Image conversion task join error: {}", e)))?
    }

    async fn validate_image(&self, image: ImageBlob) -> Result<ImageFormat> {
        let converter = self.clone();
        tokio::task::spawn_blocking(move || converter.validate(&image))
            .await
            .map_err(|e| Error::Invariant(format!("Image validation task join error: {}", e)))?
    }
}
