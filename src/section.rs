//! Image converter section state and form handling
//!
//! Validates the two-field form submission (`image`, `format`) into a typed
//! [`ConversionRequest`] and applies upload, format-change and submit
//! interactions to the section's props. Failures never escape: they leave the
//! previous selection in place and surface as a visitor-facing message.

use crate::convert::ConvertService;
use crate::models::{ConvertedImage, ImageBlob, TargetFormat};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Raw multipart fields as delivered by the form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormFields {
    pub image: Option<Vec<u8>>,
    pub image_content_type: Option<String>,
    pub format: Option<String>,
}

impl FormFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(mut self, bytes: Vec<u8>, content_type: Option<String>) -> Self {
        self.image = Some(bytes);
        self.image_content_type = content_type;
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    fn image_blob(&self) -> Option<ImageBlob> {
        self.image.as_ref().map(|bytes| {
            let blob = ImageBlob::new(bytes.clone());
            match &self.image_content_type {
                Some(content_type) => blob.with_declared_format(content_type.clone()),
                None => blob,
            }
        })
    }
}

/// Parse the `format` field; a missing or blank value selects `fallback`.
pub fn parse_format_field(field: Option<&str>, fallback: TargetFormat) -> Result<TargetFormat> {
    match field.map(str::trim) {
        None | Some("") => Ok(fallback),
        Some(value) => value.parse(),
    }
}

/// A validated conversion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    pub image: ImageBlob,
    pub target: TargetFormat,
}

impl ConversionRequest {
    pub fn from_fields(fields: &FormFields, fallback: TargetFormat) -> Result<Self> {
        let target = parse_format_field(fields.format.as_deref(), fallback)?;
        let image = fields
            .image_blob()
            .ok_or_else(|| Error::InvalidRequest("Please upload an image first.".to_string()))?;

        Ok(Self { image, target })
    }
}

impl TryFrom<FormFields> for ConversionRequest {
    type Error = Error;

    fn try_from(fields: FormFields) -> Result<Self> {
        Self::from_fields(&fields, TargetFormat::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionProps {
    pub title: String,
    pub description: String,
    pub upload_button_label: String,
    pub download_button_label: String,
    pub selected_image: Option<ImageBlob>,
    pub selected_format: TargetFormat,
}

impl Default for SectionProps {
    fn default() -> Self {
        Self {
            title: "Image Format Converter".to_string(),
            description: "Upload an image and choose the format you want to convert it to."
                .to_string(),
            upload_button_label: "Upload Image".to_string(),
            download_button_label: "Download Converted Image".to_string(),
            selected_image: None,
            selected_format: TargetFormat::default(),
        }
    }
}

impl SectionProps {
    pub fn download_enabled(&self) -> bool {
        self.selected_image.is_some()
    }

    pub fn preview_data_url(&self) -> Option<String> {
        self.selected_image.as_ref().map(ImageBlob::to_data_url)
    }
}

/// Which control triggered the submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionEvent {
    Upload,
    FormatChange,
    Submit,
}

/// Props after an interaction, plus its outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionState {
    pub props: SectionProps,
    pub download: Option<ConvertedImage>,
    pub error_message: Option<String>,
}

impl SectionState {
    fn unchanged(props: SectionProps) -> Self {
        Self {
            props,
            download: None,
            error_message: None,
        }
    }

    fn failed(props: SectionProps, err: &Error) -> Self {
        warn!("Converter section interaction failed: {}", err);
        Self {
            props,
            download: None,
            error_message: Some(err.user_message()),
        }
    }
}

pub struct ConverterSection {
    converter: Box<dyn ConvertService>,
}

impl ConverterSection {
    pub fn new(converter: Box<dyn ConvertService>) -> Self {
        Self { converter }
    }

    pub fn loader(props: SectionProps) -> SectionState {
        SectionState::unchanged(props)
    }

    /// Apply one interaction to `props`.
    pub async fn action(
        &self,
        props: SectionProps,
        event: SectionEvent,
        fields: FormFields,
    ) -> SectionState {
        match event {
            SectionEvent::Upload => self.upload(props, &fields).await,
            SectionEvent::FormatChange => Self::change_format(props, &fields),
            SectionEvent::Submit => self.submit(props, &fields).await,
        }
    }

    async fn upload(&self, props: SectionProps, fields: &FormFields) -> SectionState {
        let request = match ConversionRequest::from_fields(fields, props.selected_format) {
            Ok(request) => request,
            Err(e) => return SectionState::failed(props, &e),
        };

        let source_format = match self.converter.validate_image(request.image.clone()).await {
            Ok(format) => format,
            Err(e) => return SectionState::failed(props, &e),
        };

        info!(
            "Selected {} byte {:?} image for conversion",
            request.image.len(),
            source_format
        );
        SectionState::unchanged(SectionProps {
            selected_image: Some(request.image),
            selected_format: request.target,
            ..props
        })
    }

    fn change_format(props: SectionProps, fields: &FormFields) -> SectionState {
        match parse_format_field(fields.format.as_deref(), props.selected_format) {
            Ok(selected_format) => SectionState::unchanged(SectionProps {
                selected_format,
                ..props
            }),
            Err(e) => SectionState::failed(props, &e),
        }
    }

    async fn submit(&self, props: SectionProps, fields: &FormFields) -> SectionState {
        let target = match parse_format_field(fields.format.as_deref(), props.selected_format) {
            Ok(target) => target,
            Err(e) => return SectionState::failed(props, &e),
        };

        let image = match fields.image_blob().or_else(|| props.selected_image.clone()) {
            Some(image) => image,
            None => {
                let err = Error::InvalidRequest("Please upload an image first.".to_string());
                return SectionState::failed(props, &err);
            }
        };

        match self.converter.convert_image(image.clone(), target).await {
            Ok(converted) => {
                info!(
                    "Prepared {} for download ({} bytes)",
                    converted.download_file_name(),
                    converted.bytes().len()
                );
                SectionState {
                    props: SectionProps {
                        selected_image: Some(image),
                        selected_format: target,
                        ..props
                    },
                    download: Some(converted),
                    error_message: None,
                }
            }
            Err(e) => SectionState::failed(props, &e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{ConverterOptions, ImageConverter, MockConverter};
    use pretty_assertions::assert_eq;

    fn create_test_png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([10, 20, 30]));
        let mut bytes = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn section() -> ConverterSection {
        ConverterSection::new(Box::new(ImageConverter::default()))
    }

    #[test]
    fn test_request_defaults_to_png() {
        let fields = FormFields::new().with_image(vec![1, 2, 3], None);
        let request = ConversionRequest::try_from(fields).unwrap();
        assert_eq!(request.target, TargetFormat::Png);
    }

    #[test]
    fn test_request_rejects_unsupported_format() {
        let fields = FormFields::new()
            .with_image(create_test_png(2, 2), None)
            .with_format("bmp");
        let err = ConversionRequest::try_from(fields).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }

    #[test]
    fn test_request_requires_image() {
        let err = ConversionRequest::try_from(FormFields::new().with_format("jpeg")).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn test_request_keeps_declared_content_type() {
        let fields = FormFields::new()
            .with_image(vec![0xFF], Some("image/gif".to_string()))
            .with_format("webp");
        let request = ConversionRequest::try_from(fields).unwrap();
        assert_eq!(request.image.declared_format(), Some("image/gif"));
        assert_eq!(request.target, TargetFormat::Webp);
    }

    #[test]
    fn test_loader_is_identity() {
        let props = SectionProps::default();
        let state = ConverterSection::loader(props.clone());
        assert_eq!(state.props, props);
        assert!(!state.props.download_enabled());
        assert_eq!(state.props.preview_data_url(), None);
    }

    #[tokio::test]
    async fn test_upload_selects_image_and_format() {
        let png = create_test_png(4, 4);
        let fields = FormFields::new()
            .with_image(png.clone(), Some("image/png".to_string()))
            .with_format("jpeg");

        let state = section()
            .action(SectionProps::default(), SectionEvent::Upload, fields)
            .await;

        assert_eq!(state.error_message, None);
        assert_eq!(state.props.selected_format, TargetFormat::Jpeg);
        assert_eq!(state.props.selected_image.as_ref().unwrap().bytes(), png.as_slice());
        assert!(state.props.download_enabled());
        assert!(state
            .props
            .preview_data_url()
            .unwrap()
            .starts_with("data:image/png;base64,"));
    }

    #[tokio::test]
    async fn test_upload_of_non_image_keeps_previous_selection() {
        let previous = SectionProps {
            selected_image: Some(ImageBlob::new(create_test_png(2, 2))),
            selected_format: TargetFormat::Webp,
            ..SectionProps::default()
        };
        let fields = FormFields::new().with_image(b"%PDF-1.7".to_vec(), None);

        let state = section()
            .action(previous.clone(), SectionEvent::Upload, fields)
            .await;

        assert_eq!(state.props, previous);
        assert_eq!(
            state.error_message.as_deref(),
            Some("The uploaded file could not be read as an image.")
        );
    }

    #[tokio::test]
    async fn test_upload_of_truncated_image_keeps_previous_selection() {
        let previous = SectionProps {
            selected_image: Some(ImageBlob::new(create_test_png(2, 2))),
            selected_format: TargetFormat::Jpeg,
            ..SectionProps::default()
        };
        let mut truncated = create_test_png(10, 10);
        truncated.truncate(12);
        let fields = FormFields::new().with_image(truncated, Some("image/png".to_string()));

        let state = section()
            .action(previous.clone(), SectionEvent::Upload, fields)
            .await;

        assert_eq!(state.props, previous);
        assert!(state.error_message.is_some());
    }

    #[tokio::test]
    async fn test_upload_over_size_limit_is_rejected() {
        let section = ConverterSection::new(Box::new(ImageConverter::new(ConverterOptions {
            max_input_bytes: 16,
            ..ConverterOptions::default()
        })));
        let fields = FormFields::new().with_image(create_test_png(10, 10), None);

        let state = section
            .action(SectionProps::default(), SectionEvent::Upload, fields)
            .await;

        assert_eq!(state.props, SectionProps::default());
        assert!(!state.props.download_enabled());
        assert_eq!(
            state.error_message.as_deref(),
            Some("The uploaded file could not be read as an image.")
        );
    }

    #[tokio::test]
    async fn test_format_change_keeps_image() {
        let image = ImageBlob::new(create_test_png(2, 2));
        let props = SectionProps {
            selected_image: Some(image.clone()),
            ..SectionProps::default()
        };

        let state = section()
            .action(
                props,
                SectionEvent::FormatChange,
                FormFields::new().with_format("webp"),
            )
            .await;

        assert_eq!(state.props.selected_format, TargetFormat::Webp);
        assert_eq!(state.props.selected_image, Some(image));
        assert_eq!(state.download, None);
    }

    #[tokio::test]
    async fn test_unsupported_format_change_is_reported() {
        let props = SectionProps {
            selected_format: TargetFormat::Jpeg,
            ..SectionProps::default()
        };

        let state = section()
            .action(
                props.clone(),
                SectionEvent::FormatChange,
                FormFields::new().with_format("tiff"),
            )
            .await;

        assert_eq!(state.props, props);
        assert!(state.error_message.is_some());
    }

    #[tokio::test]
    async fn test_submit_converts_selected_image() {
        let props = SectionProps {
            selected_image: Some(ImageBlob::new(create_test_png(10, 10))),
            ..SectionProps::default()
        };

        let state = section()
            .action(
                props,
                SectionEvent::Submit,
                FormFields::new().with_format("jpeg"),
            )
            .await;

        let download = state.download.unwrap();
        assert_eq!(download.format, TargetFormat::Jpeg);
        assert_eq!(download.download_file_name(), "converted.jpg");
        assert_eq!((download.width, download.height), (10, 10));
        assert_eq!(state.props.selected_format, TargetFormat::Jpeg);
        assert_eq!(state.error_message, None);
    }

    #[tokio::test]
    async fn test_submit_without_image_is_rejected() {
        let state = section()
            .action(
                SectionProps::default(),
                SectionEvent::Submit,
                FormFields::new().with_format("png"),
            )
            .await;

        assert_eq!(state.download, None);
        assert_eq!(
            state.error_message.as_deref(),
            Some("Please upload an image first.")
        );
    }

    #[tokio::test]
    async fn test_failed_submit_keeps_prior_state() {
        let prior = SectionProps {
            selected_image: Some(ImageBlob::new(create_test_png(3, 3))),
            selected_format: TargetFormat::Webp,
            ..SectionProps::default()
        };
        let fields = FormFields::new()
            .with_image(Vec::new(), None)
            .with_format("jpeg");

        let state = section()
            .action(prior.clone(), SectionEvent::Submit, fields)
            .await;

        assert_eq!(state.props, prior);
        assert_eq!(state.download, None);
        assert!(state.error_message.is_some());
    }

    #[test]
    fn test_submit_goes_through_converter_service() {
        let section =
            ConverterSection::new(Box::new(MockConverter::new().with_output(vec![9, 9, 9])));
        let fields = FormFields::new()
            .with_image(vec![1, 2, 3], None)
            .with_format("webp");

        let state = tokio_test::block_on(section.action(
            SectionProps::default(),
            SectionEvent::Submit,
            fields,
        ));

        assert_eq!(state.download.unwrap().bytes(), &[9, 9, 9]);
        assert_eq!(state.props.selected_format, TargetFormat::Webp);
    }

    #[test]
    fn test_section_event_serialization() {
        let json = serde_json::to_string(&SectionEvent::FormatChange).unwrap();
        assert_eq!(json, "\"format_change\"");
    }
}
