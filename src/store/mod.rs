use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::account::{Account, Address, NewTransferRecord, TransferId, TransferRecord};

pub mod sqlite;

#[cfg(test)]
pub(crate) mod faulty;

pub use sqlite::{SqliteLedgerStore, StoreConfig, StoreLocation};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database connection error: {0}")]
    Connection(String),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("Query execution error: {0}")]
    Query(String),
    #[error("Account not found: {0}")]
    AccountNotFound(Address),
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
    #[error("Stored data is corrupted: {0}")]
    Corrupted(String),
    #[error("Timed out while {0}")]
    Timeout(String),
    /// The operation stopped before reporting an outcome.
    #[error("Operation interrupted: {0}")]
    Interrupted(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable account balances plus the append-only transfer log.
///
/// Implementations must make [`LedgerStore::apply_transfer`] atomic on their
/// own: callers may serialize access, but a store must never commit only one
/// leg of a transfer.
#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    async fn account_exists(&self, address: &Address) -> StoreResult<bool>;

    /// Fails with [`StoreError::AccountNotFound`] for unknown addresses.
    async fn get_balance(&self, address: &Address) -> StoreResult<Decimal>;

    /// Moves `amount` from `sender` to `recipient`, both legs or neither.
    async fn apply_transfer(
        &self,
        sender: &Address,
        recipient: &Address,
        amount: Decimal,
    ) -> StoreResult<()>;

    async fn append_transfer_record(&self, record: NewTransferRecord)
    -> StoreResult<TransferRecord>;

    /// Most recent records first. An empty log is not an error.
    async fn recent_transfers(&self, limit: usize) -> StoreResult<Vec<TransferRecord>>;

    /// Creates `count` accounts holding `initial_balance` each, but only if the
    /// store holds no accounts at all. Returns how many accounts were created.
    async fn seed_if_empty(&self, count: usize, initial_balance: Decimal) -> StoreResult<usize>;

    async fn create_account(&self, account: &Account) -> StoreResult<()>;

    async fn account_count(&self) -> StoreResult<u64>;

    async fn list_accounts(&self) -> StoreResult<Vec<Account>>;

    async fn remove_account(&self, address: &Address) -> StoreResult<bool>;

    async fn remove_transfer(&self, id: TransferId) -> StoreResult<bool>;
}
