//! Connector error types.

use thiserror::Error;

use crate::http::HttpError;

/// Errors that can occur when talking to the Bitbucket Cloud API.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("API error: {status}: {message}")]
    Api { status: u16, message: String },

    #[error("JSON decode error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing field `{field}` in API response")]
    Schema { field: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    pub(crate) fn schema(field: impl Into<String>) -> Self {
        Self::Schema {
            field: field.into(),
        }
    }

    /// Check if this error is a connection-level failure that warrants
    /// recreating the transport before the next attempt.
    #[inline]
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Http(HttpError::Disconnected(_)))
    }
}

/// Result type for connector operations.
pub type Result<T> = std::result::Result<T, Error>;
