//! Unified error type for hlsforge.
//!
//! All crates funnel their failures into [`Error`], which carries enough context
//! for API handlers to derive an HTTP status code via [`Error::http_status`].

use std::fmt;
use std::path::Path;

/// Unified error type covering all failure modes in hlsforge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A media ID in the request path is not a positive integer.
    #[error("Invalid media id: {0:?}")]
    InvalidId(String),

    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "manifest", "segment").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// The request body is malformed or exceeds the configured bounds.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Configuration or input data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A storage operation on the media tree failed.
    #[error("Storage error: {context}: {source}")]
    Storage {
        /// What was being done, including the path.
        context: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// An external tool (ffmpeg, ffprobe) returned an error.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::InvalidId(_) => 404,
            Error::NotFound { .. } => 404,
            Error::BadRequest(_) => 400,
            Error::Validation(_) => 400,
            Error::Storage { .. } => 500,
            Error::Io { .. } => 500,
            Error::Tool { .. } => 502,
            Error::Internal(_) => 500,
        }
    }

    /// Short machine-readable code for JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidId(_) => "invalid_id",
            Error::NotFound { .. } => "not_found",
            Error::BadRequest(_) => "bad_request",
            Error::Validation(_) => "validation_error",
            Error::Storage { .. } => "storage_error",
            Error::Io { .. } => "io_error",
            Error::Tool { .. } => "tool_error",
            Error::Internal(_) => "internal_error",
        }
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Storage`] naming the operation
    /// and the path it touched.
    pub fn storage(op: &str, path: &Path, source: std::io::Error) -> Self {
        Error::Storage {
            context: format!("{op} {}", path.display()),
            source,
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
