//! Application orchestration for converting image files on disk.

use crate::convert::{ConvertService, ConverterOptions, ImageConverter};
use crate::models::{Config, ImageBlob, TargetFormat};
use crate::{Error, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Converts a batch of files through a [`ConvertService`] into an output directory.
pub struct App {
    converter: Arc<dyn ConvertService>,
    output_dir: PathBuf,
    max_input_bytes: usize,
    permits: Arc<Semaphore>,
}

/// Result of converting a single input file.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FileOutcome {
    pub input: PathBuf,
    pub target: TargetFormat,
    pub output: Option<PathBuf>,
    pub bytes_in: Option<usize>,
    pub bytes_out: Option<usize>,
    pub error: Option<String>,
}

impl FileOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

struct Converted {
    output: PathBuf,
    bytes_in: usize,
    bytes_out: usize,
}

impl App {
    /// Build an app around an existing converter.
    ///
    /// This is primarily useful for integration tests that need to inject
    /// mocks. The output directory must already exist.
    pub fn with_service(converter: Arc<dyn ConvertService>, output_dir: PathBuf) -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        Self {
            converter,
            output_dir,
            max_input_bytes: Config::default().max_input_bytes,
            permits: Arc::new(Semaphore::new(workers)),
        }
    }

    /// Inputs larger than this are rejected before they are fully read.
    pub fn with_max_input_bytes(mut self, max_input_bytes: usize) -> Self {
        self.max_input_bytes = max_input_bytes;
        self
    }

    /// Upper bound on files read and converted at the same time.
    pub fn with_max_concurrency(mut self, workers: usize) -> Self {
        self.permits = Arc::new(Semaphore::new(workers.max(1)));
        self
    }

    /// Construct an app backed by [`ImageConverter`], creating the output
    /// directory if needed.
    pub async fn new(config: &Config) -> Result<Self> {
        tokio::fs::create_dir_all(&config.output_dir).await?;
        info!("Using output directory: {}", config.output_dir.display());

        let converter = ImageConverter::new(ConverterOptions::from(config));
        Ok(Self::with_service(Arc::new(converter), config.output_dir.clone())
            .with_max_input_bytes(config.max_input_bytes))
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Convert every input concurrently. Failures are reported per file and
    /// never stop the other conversions.
    pub async fn run(&self, inputs: &[PathBuf], target: TargetFormat) -> Vec<FileOutcome> {
        info!("Converting {} file(s) to {}", inputs.len(), target);

        let handles: Vec<_> = inputs
            .iter()
            .map(|input| {
                let converter = Arc::clone(&self.converter);
                let output_dir = self.output_dir.clone();
                let input = input.clone();
                let permits = Arc::clone(&self.permits);
                let max_input_bytes = self.max_input_bytes;
                tokio::spawn(async move {
                    let _permit = permits
                        .acquire_owned()
                        .await
                        .map_err(|e| Error::Invariant(format!("Worker pool closed: {}", e)))?;
                    let source = read_input(&input, max_input_bytes).await?;
                    convert_file(converter.as_ref(), &output_dir, &input, source, target).await
                })
            })
            .collect();

        let mut outcomes = Vec::with_capacity(inputs.len());
        for (input, handle) in inputs.iter().zip(handles) {
            let result = handle
                .await
                .map_err(|e| Error::Invariant(format!("Conversion task join error: {}", e)))
                .and_then(|r| r);

            let outcome = match result {
                Ok(converted) => {
                    info!(
                        "{} -> {} ({} -> {} bytes)",
                        input.display(),
                        converted.output.display(),
                        converted.bytes_in,
                        converted.bytes_out
                    );
                    FileOutcome {
                        input: input.clone(),
                        target,
                        output: Some(converted.output),
                        bytes_in: Some(converted.bytes_in),
                        bytes_out: Some(converted.bytes_out),
                        error: None,
                    }
                }
                Err(e) => {
                    error!("Failed to convert {}: {}", input.display(), e);
                    FileOutcome {
                        input: input.clone(),
                        target,
                        output: None,
                        bytes_in: None,
                        bytes_out: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            outcomes.push(outcome);
        }

        outcomes
    }

    /// Convert a single file and return the path of the written output.
    pub async fn convert_file(&self, input: &Path, target: TargetFormat) -> Result<PathBuf> {
        let source = read_input(input, self.max_input_bytes).await?;
        let converted =
            convert_file(self.converter.as_ref(), &self.output_dir, input, source, target).await?;
        Ok(converted.output)
    }
}

/// Read `input`, refusing anything over `max_bytes`.
///
/// Regular files are checked by size up front; pipes and devices report no
/// useful length, so the read itself is capped as well.
async fn read_input(input: &Path, max_bytes: usize) -> Result<Vec<u8>> {
    let metadata = tokio::fs::metadata(input).await?;
    if metadata.is_file() && metadata.len() > max_bytes as u64 {
        warn!(
            "Rejected {} ({} bytes, limit {})",
            input.display(),
            metadata.len(),
            max_bytes
        );
        return Err(too_large(max_bytes));
    }

    let file = tokio::fs::File::open(input).await?;
    read_bounded(file, max_bytes).await
}

async fn read_bounded<R>(reader: R, max_bytes: usize) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut bytes = Vec::new();
    let mut limited = reader.take(max_bytes as u64 + 1);
    limited.read_to_end(&mut bytes).await?;

    if bytes.len() > max_bytes {
        return Err(too_large(max_bytes));
    }
    Ok(bytes)
}

fn too_large(max_bytes: usize) -> Error {
    Error::Decode(format!("input exceeds the {} byte limit", max_bytes))
}

async fn convert_file(
    converter: &dyn ConvertService,
    output_dir: &Path,
    input: &Path,
    bytes: Vec<u8>,
    target: TargetFormat,
) -> Result<Converted> {
    let bytes_in = bytes.len();

    let blob = match input.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => ImageBlob::new(bytes).with_declared_format(ext.to_ascii_lowercase()),
        None => ImageBlob::new(bytes),
    };

    let converted = converter.convert_image(blob, target).await?;

    let output = output_dir.join(output_file_name(input, target)?);
    tokio::fs::write(&output, converted.bytes()).await?;

    Ok(Converted {
        output,
        bytes_in,
        bytes_out: converted.bytes().len(),
    })
}

fn output_file_name(input: &Path, target: TargetFormat) -> Result<String> {
    let stem = input
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| Error::Invariant(format!("Invalid input path: {}", input.display())))?;

    Ok(format!("{}_{}.{}", stem, Uuid::new_v4(), target.extension()))
}
