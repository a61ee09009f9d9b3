use tally_config::ConfigError;
use tally_core::CoreError;
use tally_domain::{Activity, TransactionKind};
use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, TallyError>;

/// Error envelope returned by every public operation.
///
/// Taxonomy variants carry caller-safe detail. Infrastructure failures are
/// collapsed into [`TallyError::InternalError`], whose detail is logged and
/// never shown.
#[derive(Debug, Error)]
pub enum TallyError {
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
    #[error("internal error")]
    InternalError { detail: String },
}

impl TallyError {
    /// Builds an internal error and logs its detail.
    pub fn internal(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        tracing::error!(%detail, "internal error");
        TallyError::InternalError { detail }
    }

    /// Stable machine-readable name of the variant.
    pub fn code(&self) -> &'static str {
        match self {
            TallyError::Forbidden(_) => "forbidden",
            TallyError::NotFound(_) => "not_found",
            TallyError::NameConflict(_) => "name_conflict",
            TallyError::ParentNotFound(_) => "parent_not_found",
            TallyError::KindMismatch { .. } => "kind_mismatch",
            TallyError::ActivityMismatch { .. } => "activity_mismatch",
            TallyError::AlreadyLinked { .. } => "already_linked",
            TallyError::InvalidAmount(_) => "invalid_amount",
            TallyError::InvalidBalance(_) => "invalid_balance",
            TallyError::CycleDetected(_) => "cycle_detected",
            TallyError::InvalidInput(_) => "invalid_input",
            TallyError::InternalError { .. } => "internal_error",
        }
    }
}

impl From<CoreError> for TallyError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Forbidden(msg) => TallyError::Forbidden(msg),
            CoreError::NotFound(msg) => TallyError::NotFound(msg),
            CoreError::NameConflict(name) => TallyError::NameConflict(name),
            CoreError::ParentNotFound(name) => TallyError::ParentNotFound(name),
            CoreError::KindMismatch { expected, found } => {
                TallyError::KindMismatch { expected, found }
            }
            CoreError::ActivityMismatch { expected, found } => {
                TallyError::ActivityMismatch { expected, found }
            }
            CoreError::AlreadyLinked { group, transaction } => {
                TallyError::AlreadyLinked { group, transaction }
            }
            CoreError::InvalidAmount(msg) => TallyError::InvalidAmount(msg),
            CoreError::InvalidBalance(msg) => TallyError::InvalidBalance(msg),
            CoreError::CycleDetected(id) => TallyError::CycleDetected(id),
            CoreError::InvalidInput(msg) => TallyError::InvalidInput(msg),
            other @ (CoreError::Storage(_) | CoreError::Serde(_) | CoreError::Io(_)) => {
                TallyError::internal(other.to_string())
            }
        }
    }
}

impl From<ConfigError> for TallyError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Invalid(msg) => TallyError::InvalidInput(msg),
            ConfigError::BackupNotFound(name) => {
                TallyError::NotFound(format!("configuration backup {name}"))
            }
            other => TallyError::internal(other.to_string()),
        }
    }
}
