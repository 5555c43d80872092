use std::time::Duration;
use thiserror::Error;

/// Failures raised by a ledger backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("wallet {0} is not locked by this transaction")]
    NotLocked(String),
    #[error("balance overflow")]
    Overflow,
    #[error("deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),
    #[error("{0}")]
    Backend(String),
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("invalid amount format: can't convert {0} to decimal")]
    InvalidFormat(String),
    /// Well-formed, but too many digits for the ledger's decimal type.
    #[error("invalid amount format: {0} is out of range")]
    AmountOutOfRange(String),
    #[error("amount must be positive")]
    NotPositive,
    #[error("amount must be an integer (cant be floating point)")]
    NotInteger,
    #[error("sender and receiver must be different wallets")]
    SameAddress,
    #[error("transfer fail: sender wallet not found")]
    SenderNotFound,
    #[error("insufficient balance")]
    InsufficientBalance,
    #[error("wallet not found")]
    NotFound,
    #[error("transfer fail: {0}")]
    Infrastructure(#[from] StoreError),
}

impl LedgerError {
    /// Stable error code relayed to callers alongside the message.
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::InvalidFormat(_) | LedgerError::AmountOutOfRange(_) => "invalid_format",
            LedgerError::NotPositive => "not_positive",
            LedgerError::NotInteger => "not_integer",
            LedgerError::SameAddress => "same_address",
            LedgerError::SenderNotFound => "sender_not_found",
            LedgerError::InsufficientBalance => "insufficient_balance",
            LedgerError::NotFound => "not_found",
            LedgerError::Infrastructure(_) => "infrastructure",
        }
    }

    /// Business rejections are detected before or inside the transaction and
    /// never reflect a backend fault.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, LedgerError::Infrastructure(_))
    }
}
