//! Error types for the money-movement core.
//!
//! - [`StoreError`] - storage, cache, broker and codec failures
//! - [`TransferError`] - business outcomes returned by the engine
//! - [`InputError`] - malformed CSV input handed to the CLI
//!
//! `StoreError` converts into `TransferError::Internal` so `?` works across
//! the port boundary.

use rust_decimal::Decimal;
use thiserror::Error;

/// Failures raised by the infrastructure behind the ports.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A version-checked write touched a row that changed underneath it.
    #[error("Write conflict on {0}")]
    Conflict(String),
    #[error("Record not found: {0}")]
    NotFound(String),
    /// The scheduled transfer referenced by a commit is no longer pending.
    #[error("Scheduled transfer {0} already applied")]
    AlreadyApplied(u64),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The broker or store was shut down.
    #[error("Channel closed: {0}")]
    Closed(String),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Outcome of a rejected withdraw, deposit, transfer or scheduled application.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Insufficient balance: available {available}, required {required}")]
    InsufficientBalance { available: Decimal, required: Decimal },
    #[error("Deposit of {amount} is below the minimum of {minimum}")]
    MinimumDepositNotMet { amount: Decimal, minimum: Decimal },
    #[error("Daily transfer limit of {limit} exceeded")]
    DailyLimitExceeded { limit: Decimal },
    #[error("Per-transaction limit of {limit} exceeded")]
    PerTransactionLimitExceeded { limit: Decimal },
    #[error("Recipient account {0} not found")]
    RecipientNotFound(String),
    #[error("Recipient account {0} is inactive")]
    RecipientInactive(String),
    #[error("Cannot transfer to the same account")]
    SameAccountTransfer,
    #[error("Amount must be positive")]
    NonPositiveAmount,
    #[error("Account {0} not found")]
    AccountNotFound(String),
    #[error("Account {0} is not active")]
    AccountInactive(String),
    #[error("Request type '{got}' does not match operation '{expected}'")]
    InvalidRequestType { expected: String, got: String },
    #[error("Scheduled transfer {0} was already applied")]
    DuplicateScheduledTransfer(u64),
    #[error("Consistency violation: {0}")]
    ConsistencyViolation(String),
    #[error("Required setting '{0}' is missing")]
    ConfigurationMissing(String),
    #[error("Operation timed out")]
    Timeout,
    #[error("Internal error: {0}")]
    Internal(#[from] StoreError),
}

/// Coarse classification used by outer adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Validation,
    NotFound,
    Conflict,
    Internal,
}

impl TransferError {
    pub fn class(&self) -> ErrorClass {
        use TransferError::*;
        match self {
            SameAccountTransfer | NonPositiveAmount | InvalidRequestType { .. } => {
                ErrorClass::Validation
            }
            RecipientNotFound(_) | AccountNotFound(_) => ErrorClass::NotFound,
            InsufficientBalance { .. }
            | MinimumDepositNotMet { .. }
            | DailyLimitExceeded { .. }
            | PerTransactionLimitExceeded { .. }
            | RecipientInactive(_)
            | AccountInactive(_)
            | DuplicateScheduledTransfer(_)
            | ConsistencyViolation(_) => ErrorClass::Conflict,
            ConfigurationMissing(_) | Timeout | Internal(_) => ErrorClass::Internal,
        }
    }

    /// HTTP status an outer adapter should answer with.
    pub fn status_code(&self) -> u16 {
        match self.class() {
            ErrorClass::Validation => 400,
            ErrorClass::NotFound => 404,
            ErrorClass::Conflict => 409,
            ErrorClass::Internal => 500,
        }
    }

    /// Errors that will fail the same way no matter how often they are retried.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            TransferError::AccountNotFound(_)
                | TransferError::AccountInactive(_)
                | TransferError::RecipientNotFound(_)
                | TransferError::RecipientInactive(_)
                | TransferError::SameAccountTransfer
                | TransferError::NonPositiveAmount
                | TransferError::InvalidRequestType { .. }
        )
    }
}

/// Bad input files. Reported per record; processing carries on.
#[derive(Error, Debug)]
pub enum InputError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Invalid record: {0}")]
    Invalid(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
pub type Result<T> = std::result::Result<T, TransferError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_store_error_converts_to_internal() {
        let err: TransferError = StoreError::Closed("broker".into()).into();
        assert!(matches!(err, TransferError::Internal(_)));
        assert!(err.to_string().contains("broker"));
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(TransferError::SameAccountTransfer.status_code(), 400);
        assert_eq!(TransferError::NonPositiveAmount.status_code(), 400);
        assert_eq!(TransferError::RecipientNotFound("1".into()).status_code(), 404);
        assert_eq!(
            TransferError::InsufficientBalance {
                available: dec!(1),
                required: dec!(2)
            }
            .status_code(),
            409
        );
        assert_eq!(TransferError::Timeout.status_code(), 500);
    }

    #[test]
    fn test_permanent_errors() {
        assert!(TransferError::RecipientInactive("9".into()).is_permanent());
        assert!(!TransferError::Timeout.is_permanent());
        assert!(
            !TransferError::DailyLimitExceeded { limit: dec!(10) }.is_permanent()
        );
    }
}
