//! Error types for the editor

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EditorError {
    #[error("Transaction error: {0}")]
    Transaction(#[from] crate::transaction::TransactionError),

    #[error("No insertion point established")]
    NoSelection,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    #[error("Session is not file-backed")]
    NotFileBacked,
}
