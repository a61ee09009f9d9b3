use std::io;

use tally_domain::{Activity, TransactionKind};
use thiserror::Error;
use uuid::Uuid;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Name already in use: {0}")]
    NameConflict(String),
    #[error("Parent group not found: {0}")]
    ParentNotFound(String),
    #[error("Transactions mix kinds: expected {expected}, found {found}")]
    KindMismatch {
        expected: TransactionKind,
        found: TransactionKind,
    },
    #[error("Transactions mix activities: expected {expected}, found {found}")]
    ActivityMismatch { expected: Activity, found: Activity },
    #[error("Transaction {transaction} is already linked to group {group}")]
    AlreadyLinked { group: Uuid, transaction: Uuid },
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid balance: {0}")]
    InvalidBalance(String),
    #[error("Cycle detected in group hierarchy at {0}")]
    CycleDetected(Uuid),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Serialization error: {0}")]
    Serde(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serde(err.to_string())
    }
}
