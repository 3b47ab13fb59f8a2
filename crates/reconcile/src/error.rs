use concordia_core::{ConfigError, RecordError, StoreError, TransactionKey};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error("Transaction {0} not found")]
    UnknownTransaction(TransactionKey),
    #[error("Document {0} not found")]
    UnknownDocument(String),
    #[error("Transaction {0} already carries a confirmed match; use an override")]
    AlreadyConfirmed(TransactionKey),
}

impl PipelineError {
    /// Collaborator failures, as opposed to bad input or caller mistakes.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, PipelineError::Store(StoreError::Unavailable(_)))
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
