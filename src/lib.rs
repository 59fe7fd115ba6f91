//! Image format converter - re-encodes uploaded images as PNG, JPEG or WebP
//!
//! The core is a pure, stateless converter that sniffs the source encoding
//! from the bytes. Around it sit the typed form boundary and section state of
//! the upload widget, and a small CLI for converting files on disk.

pub mod app;
pub mod convert;
pub mod error;
pub mod models;
pub mod section;

pub use error::{Error, ErrorKind, Result};
