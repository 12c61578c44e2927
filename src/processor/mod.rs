use rust_decimal::Decimal;
use thiserror::Error;

use crate::{
    account::{AccountError, Address},
    command::CommandError,
    store::StoreError,
};

pub mod ledger_processor;

pub use ledger_processor::LedgerProcessor;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] CommandError),
    #[error("{0} not found")]
    NotFound(String),
    #[error("insufficient funds: {available} available, {requested} requested")]
    InsufficientFunds {
        available: Decimal,
        requested: Decimal,
    },
    #[error(transparent)]
    Store(StoreError),
    /// Balances were moved but the ledger has no record of it.
    #[error(
        "transfer of {amount} from {sender} to {recipient} was applied but could not be recorded: {source}"
    )]
    LedgerInconsistency {
        sender: Address,
        recipient: Address,
        amount: Decimal,
        source: StoreError,
    },
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AccountNotFound(address) => Self::NotFound(format!("account {address}")),
            err => Self::Store(err),
        }
    }
}

impl From<AccountError> for LedgerError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::InsufficientFunds {
                available,
                requested,
            } => Self::InsufficientFunds {
                available,
                requested,
            },
            err @ AccountError::Overflow { .. } => {
                Self::Store(StoreError::ConstraintViolation(err.to_string()))
            }
        }
    }
}

/// Stable classification of a [`LedgerError`], suitable for wire formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidRequest,
    NotFound,
    InsufficientFunds,
    StoreError,
    LedgerInconsistency,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InsufficientFunds => "insufficient_funds",
            ErrorKind::StoreError => "store_error",
            ErrorKind::LedgerInconsistency => "ledger_inconsistency",
        }
    }

    /// Whether resubmitting with different input can succeed. The other kinds
    /// are system faults that must not be retried blindly.
    pub fn is_caller_fixable(self) -> bool {
        matches!(
            self,
            ErrorKind::InvalidRequest | ErrorKind::NotFound | ErrorKind::InsufficientFunds
        )
    }
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            LedgerError::NotFound(_) => ErrorKind::NotFound,
            LedgerError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            LedgerError::Store(_) => ErrorKind::StoreError,
            LedgerError::LedgerInconsistency { .. } => ErrorKind::LedgerInconsistency,
        }
    }
}
