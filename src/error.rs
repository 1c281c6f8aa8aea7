use thiserror::Error;

/// Failures reported by a [`crate::store::RecordStore`].
///
/// The first four variants are the ones the reconciler knows how to recover
/// from locally; everything else is surfaced to the caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("procedure '{0}' is not available")]
    UnsupportedProcedure(String),

    #[error("unique constraint '{constraint}' violated on '{table}'")]
    Conflict { table: String, constraint: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unknown table '{0}'")]
    UnknownTable(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("rejected ({code}): {message}")]
    Rejected { code: String, message: String },

    #[error("operation cancelled")]
    Cancelled,
}

impl StoreError {
    pub fn rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        StoreError::Rejected { code: code.into(), message: message.into() }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, StoreError::UnsupportedProcedure(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Failures of the durable key-value storage behind column preferences.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt storage entry: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("poisoned storage lock")]
    Poisoned,
}
