//! Error handling and custom error types
//!
//! Provides unified error handling across the converter using thiserror.
//! Every variant is recoverable; callers branch on [`Error::kind`].

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invariant violated: {0}")]
    Invariant(String),
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Decode,
    UnsupportedFormat,
    Encode,
    Other,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Decode(_) => ErrorKind::Decode,
            Error::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            Error::Encode(_) => ErrorKind::Encode,
            _ => ErrorKind::Other,
        }
    }

    /// Short message suitable for showing to the visitor who submitted the form.
    pub fn user_message(&self) -> String {
        match self {
            Error::Decode(_) => "The uploaded file could not be read as an image.".to_string(),
            Error::UnsupportedFormat(_) => {
                "Please choose PNG, JPEG or WebP as the output format.".to_string()
            }
            Error::Encode(_) => {
                "The image could not be converted to the selected format.".to_string()
            }
            Error::InvalidRequest(msg) => msg.clone(),
            _ => "Something went wrong while converting the image.".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
