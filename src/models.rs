//! Data models and structures
//!
//! Defines the image payloads exchanged with the converter, the supported
//! output formats, and environment-driven configuration.

use crate::{Error, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Output encodings the converter can produce.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    #[default]
    Png,
    Jpeg,
    Webp,
}

impl TargetFormat {
    pub const ALL: [TargetFormat; 3] = [TargetFormat::Png, TargetFormat::Jpeg, TargetFormat::Webp];

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetFormat::Png => "png",
            TargetFormat::Jpeg => "jpeg",
            TargetFormat::Webp => "webp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            TargetFormat::Png => "png",
            TargetFormat::Jpeg => "jpg",
            TargetFormat::Webp => "webp",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            TargetFormat::Png => "image/png",
            TargetFormat::Jpeg => "image/jpeg",
            TargetFormat::Webp => "image/webp",
        }
    }

    pub fn image_format(&self) -> ImageFormat {
        match self {
            TargetFormat::Png => ImageFormat::Png,
            TargetFormat::Jpeg => ImageFormat::Jpeg,
            TargetFormat::Webp => ImageFormat::WebP,
        }
    }

    /// Map a decoded source format onto a target, if it is one we can emit.
    pub fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Png => Some(TargetFormat::Png),
            ImageFormat::Jpeg => Some(TargetFormat::Jpeg),
            ImageFormat::WebP => Some(TargetFormat::Webp),
            _ => None,
        }
    }
}

impl FromStr for TargetFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(TargetFormat::Png),
            "jpeg" | "jpg" => Ok(TargetFormat::Jpeg),
            "webp" => Ok(TargetFormat::Webp),
            other => Err(Error::UnsupportedFormat(format!(
                "'{}' is not one of png, jpeg, webp",
                other
            ))),
        }
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw image bytes with whatever format the caller claims they are in.
///
/// The declared format is never trusted for decoding; the converter sniffs
/// the bytes instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBlob {
    bytes: Vec<u8>,
    declared_format: Option<String>,
}

impl ImageBlob {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            declared_format: None,
        }
    }

    pub fn with_declared_format(mut self, declared: impl Into<String>) -> Self {
        self.declared_format = Some(declared.into());
        self
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn declared_format(&self) -> Option<&str> {
        self.declared_format.as_deref()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Encode as a `data:` URL for inline previews.
    ///
    /// The MIME type comes from the byte signature, falling back to
    /// `application/octet-stream` for anything unrecognised.
    pub fn to_data_url(&self) -> String {
        let mime = image::guess_format(&self.bytes)
            .map(|f| f.to_mime_type())
            .unwrap_or("application/octet-stream");
        format!("data:{};base64,{}", mime, STANDARD.encode(&self.bytes))
    }
}

impl From<Vec<u8>> for ImageBlob {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

/// Successful output of a conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedImage {
    pub blob: ImageBlob,
    pub format: TargetFormat,
    pub source_format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

impl ConvertedImage {
    pub fn bytes(&self) -> &[u8] {
        self.blob.bytes()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.blob.into_bytes()
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    pub fn download_file_name(&self) -> String {
        format!("converted.{}", self.format.extension())
    }
}

/// Either the converted image or the reason it could not be produced.
pub type ConversionResult = Result<ConvertedImage>;

// Configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub default_format: TargetFormat,
    pub jpeg_quality: u8,
    pub max_input_bytes: usize,
    pub max_dimension: u32,
    pub passthrough_same_format: bool,
    pub output_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_format: TargetFormat::Png,
            jpeg_quality: 85,
            max_input_bytes: 25 * 1024 * 1024,
            max_dimension: 16_384,
            passthrough_same_format: true,
            output_dir: PathBuf::from("output"),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup, falling back to defaults
    /// for unset keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let default_format = match lookup("CONVERTER_DEFAULT_FORMAT") {
            Some(value) => value.parse::<TargetFormat>().map_err(|_| {
                Error::Config(format!("CONVERTER_DEFAULT_FORMAT '{}' is not supported", value))
            })?,
            None => defaults.default_format,
        };

        let jpeg_quality = match lookup("CONVERTER_JPEG_QUALITY") {
            Some(value) => parse_quality(&value)?,
            None => defaults.jpeg_quality,
        };

        let max_input_bytes = match lookup("CONVERTER_MAX_INPUT_BYTES") {
            Some(value) => parse_positive::<usize>("CONVERTER_MAX_INPUT_BYTES", &value)?,
            None => defaults.max_input_bytes,
        };

        let max_dimension = match lookup("CONVERTER_MAX_DIMENSION") {
            Some(value) => parse_positive::<u32>("CONVERTER_MAX_DIMENSION", &value)?,
            None => defaults.max_dimension,
        };

        let passthrough_same_format = match lookup("CONVERTER_PASSTHROUGH_SAME_FORMAT") {
            Some(value) => parse_bool("CONVERTER_PASSTHROUGH_SAME_FORMAT", &value)?,
            None => defaults.passthrough_same_format,
        };

        let output_dir = lookup("CONVERTER_OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.output_dir);

        Ok(Self {
            default_format,
            jpeg_quality,
            max_input_bytes,
            max_dimension,
            passthrough_same_format,
            output_dir,
        })
    }
}

fn parse_quality(value: &str) -> Result<u8> {
    match value.trim().parse::<u8>() {
        Ok(q) if (1..=100).contains(&q) => Ok(q),
        _ => Err(Error::Config(format!(
            "CONVERTER_JPEG_QUALITY must be between 1 and 100, got '{}'",
            value
        ))),
    }
}

fn parse_positive<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr + PartialOrd + Default,
{
    match value.trim().parse::<T>() {
        Ok(n) if n > T::default() => Ok(n),
        _ => Err(Error::Config(format!(
            "{} must be a positive integer, got '{}'",
            key, value
        ))),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(Error::Config(format!(
            "{} must be true or false, got '{}'",
            key, value
        ))),
    }
}
