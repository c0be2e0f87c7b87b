use std::path::PathBuf;

use thiserror::Error;

use crate::generator::Capability;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("failed to open {path:?}: {reason}")]
    Open { path: PathBuf, reason: String },

    #[error("operation requires the {0:?} capability")]
    UnsupportedOperation(Capability),

    #[error("operation is not permitted by the document: {0}")]
    NotPermitted(&'static str),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("{what} {index} not found")]
    NotFound { what: &'static str, index: usize },

    #[error("result for page {page} is stale")]
    StaleResult { page: usize },

    #[error("no document is open")]
    NotOpened,

    #[error("generator error: {0}")]
    Generator(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DocumentError {
    pub fn page_not_found(index: usize) -> Self {
        DocumentError::NotFound { what: "page", index }
    }

    pub fn open(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        DocumentError::Open {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DocumentError::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, DocumentError>;
