//! SDK error types.
//!
//! Only transport-level and local failures are errors. A server that answers
//! with `success: false` produces an [`Outcome::Failure`](crate::Outcome)
//! value instead.

use thiserror::Error;

/// Errors raised by the SDK.
#[derive(Debug, Error)]
pub enum SdkError {
    /// The HTTP client could not complete the request (connect, timeout, body read).
    #[error("request to {path} failed: {source}")]
    Http {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    /// A non-HTTP transport failed to deliver the request.
    #[error("request to {path} failed: {message}")]
    Transport { path: String, message: String },

    /// A reply body could not be decoded.
    #[error("failed to decode {what}: {source}")]
    Decode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// A request body could not be encoded.
    #[error("failed to encode {what}: {source}")]
    Encode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// A header name or value was rejected by the HTTP client.
    #[error("invalid header '{name}': {details}")]
    InvalidHeader { name: String, details: String },

    /// One page of a load-all run failed; the whole run is abandoned.
    #[error("page {page} of {total_pages} failed: {source}")]
    Page {
        page: u32,
        total_pages: u32,
        #[source]
        source: Box<SdkError>,
    },

    /// Client configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SdkError {
    /// Create a transport error for a non-HTTP transport.
    pub fn transport(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Wrap a failure of a single load-all page.
    pub fn page(page: u32, total_pages: u32, source: SdkError) -> Self {
        Self::Page {
            page,
            total_pages,
            source: Box::new(source),
        }
    }

    /// The page number for a failed load-all page, if this is one.
    pub fn failed_page(&self) -> Option<u32> {
        match self {
            Self::Page { page, .. } => Some(*page),
            _ => None,
        }
    }
}

/// Result type alias using SdkError.
pub type Result<T> = std::result::Result<T, SdkError>;
