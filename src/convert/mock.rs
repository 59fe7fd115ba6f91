use super::ConvertService;
use crate::models::{ConvertedImage, ImageBlob, TargetFormat};
use crate::Result;
use async_trait::async_trait;
use image::ImageFormat;
use std::sync::{Arc, Mutex};

/// Test double that echoes input bytes back tagged with the requested format.
pub struct MockConverter {
    convert_count: Arc<Mutex<usize>>,
    requested: Arc<Mutex<Vec<TargetFormat>>>,
    output: Option<Vec<u8>>,
    should_fail: Arc<Mutex<bool>>,
}

impl MockConverter {
    pub fn new() -> Self {
        Self {
            convert_count: Arc::new(Mutex::new(0)),
            requested: Arc::new(Mutex::new(Vec::new())),
            output: None,
            should_fail: Arc::new(Mutex::new(false)),
        }
    }

    pub fn with_output(mut self, bytes: Vec<u8>) -> Self {
        self.output = Some(bytes);
        self
    }

    pub fn with_failure(self, should_fail: bool) -> Self {
        *self.should_fail.lock().unwrap() = should_fail;
        self
    }

    pub fn get_convert_count(&self) -> usize {
        *self.convert_count.lock().unwrap()
    }

    pub fn get_requested_formats(&self) -> Vec<TargetFormat> {
        self.requested.lock().unwrap().clone()
    }
}

impl Default for MockConverter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConvertService for MockConverter {
    async fn convert_image(&self, image: ImageBlob, target: TargetFormat) -> Result<ConvertedImage> {
        self.requested.lock().unwrap().push(target);

        if *self.should_fail.lock().unwrap() {
            return Err(crate::Error::Encode("Mock failure".to_string()));
        }

        let mut count = self.convert_count.lock().unwrap();
        *count += 1;

        let bytes = self.output.clone().unwrap_or_else(|| image.into_bytes());

        Ok(ConvertedImage {
            blob: ImageBlob::new(bytes).with_declared_format(target.mime_type()),
            format: target,
            source_format: ImageFormat::Png,
            width: 1,
            height: 1,
        })
    }

    async fn validate_image(&self, image: ImageBlob) -> Result<ImageFormat> {
        if image.is_empty() {
            return Err(crate::Error::Decode("Mock empty payload".to_string()));
        }
        Ok(ImageFormat::Png)
    }
}
