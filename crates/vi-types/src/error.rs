//! Document loading errors.

use thiserror::Error;

/// A compiled document could not be loaded.
///
/// Loading is all-or-nothing: any of these aborts the load and no UI is
/// produced.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The input is not JSON at all.
    #[error("document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The JSON does not match the document schema.
    #[error("malformed document at `{path}`: {message}")]
    Malformed { path: String, message: String },
}

impl LoadError {
    pub(crate) fn malformed(path: &str, message: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

/// Result alias for document loading.
pub type LoadResult<T> = Result<T, LoadError>;
