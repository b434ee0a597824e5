//! # Error Types
//!
//! This module defines all error types for the editor core.
//!
//! Only genuinely broken input or failed I/O produces an error. Stale references
//! (a transformer pointing at a note that a later edit removed, an argumentation
//! id nobody uses any more) are resolved to "not found" by the lookup APIs and
//! never reach this enum.
//!
//! ## Error Types
//! - `Io`, `Json`, `Yaml`, `Xml`, `Zip`, `Base64`, `Http` - wrapped library errors
//! - `Backend` - the rendering backend answered with a non-2xx status
//! - `MissingField` - a backend or bundle payload lacks an expected field
//! - `InvalidBundle` / `InvalidDocument` - structurally unusable input
//! - `Segment` / `MissingPhysicalOnset` - misuse of the tempo segment state machine
//! - `InvalidConfig` - configuration values out of range
//!
//! ## Usage
//! ```rust
//! use mpm_editor::{EditorError, Msm};
//!
//! match Msm::parse("<msm>") {
//!     Ok(msm) => println!("{} notes", msm.notes.len()),
//!     Err(EditorError::Xml(e)) => eprintln!("broken MSM: {}", e),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EditorError>;

#[derive(Error, Debug)]
pub enum EditorError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The rendering backend answered with a non-2xx status.
    ///
    /// # Example
    /// ```
    /// # use mpm_editor::EditorError;
    /// let err = EditorError::Backend {
    ///     status: 500,
    ///     text: "conversion failed".to_string(),
    /// };
    /// assert_eq!(err.to_string(), "Backend responded with 500: conversion failed");
    /// ```
    #[error("Backend responded with {status}: {text}")]
    Backend { status: u16, text: String },

    /// A payload was well-formed JSON but lacked a field we rely on.
    #[error("Missing field '{field}' in {context}")]
    MissingField { field: String, context: String },

    #[error("Invalid bundle: {0}")]
    InvalidBundle(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// A tempo segment gesture was issued in a state that does not allow it.
    ///
    /// # Example
    /// ```
    /// # use mpm_editor::EditorError;
    /// let err = EditorError::Segment("combine needs at least two selected segments".to_string());
    /// assert_eq!(
    ///     err.to_string(),
    ///     "Tempo segment error: combine needs at least two selected segments"
    /// );
    /// ```
    #[error("Tempo segment error: {0}")]
    Segment(String),

    /// A segment boundary sits on a tick without a performed note and no
    /// silent onset was supplied for it.
    #[error("No physical onset known for tick {tick}")]
    MissingPhysicalOnset { tick: u64 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl EditorError {
    pub(crate) fn missing(field: &str, context: &str) -> Self {
        Self::MissingField {
            field: field.to_string(),
            context: context.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_message() {
        let err = EditorError::missing("msm", "convert response");
        assert_eq!(err.to_string(), "Missing field 'msm' in convert response");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: EditorError = io.into();
        assert!(matches!(err, EditorError::Io(_)));
    }
}
