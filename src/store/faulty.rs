//! Store wrapper for tests that need a slow or misbehaving backend.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::{LedgerStore, SqliteLedgerStore, StoreResult};
use crate::account::{Account, Address, NewTransferRecord, TransferId, TransferRecord};

/// Delegates to an in-memory SQLite store, with optional delays and panics.
#[derive(Clone)]
pub struct FaultyStore {
    pub inner: SqliteLedgerStore,
    /// Sleep before writing a transfer record.
    pub append_delay: Duration,
    /// Panic instead of reading a balance.
    pub panic_on_balance: bool,
}

impl FaultyStore {
    pub async fn with_accounts(accounts: &[(&str, u32)]) -> Self {
        let inner = SqliteLedgerStore::in_memory().await.unwrap();
        for (address, balance) in accounts {
            inner
                .create_account(&Account::new(Address::from(*address), Decimal::from(*balance)))
                .await
                .unwrap();
        }
        Self {
            inner,
            append_delay: Duration::ZERO,
            panic_on_balance: false,
        }
    }
}

#[async_trait]
impl LedgerStore for FaultyStore {
    async fn account_exists(&self, address: &Address) -> StoreResult<bool> {
        self.inner.account_exists(address).await
    }

    async fn get_balance(&self, address: &Address) -> StoreResult<Decimal> {
        if self.panic_on_balance {
            panic!("balance lookup for {address} blew up");
        }
        self.inner.get_balance(address).await
    }

    async fn apply_transfer(
        &self,
        sender: &Address,
        recipient: &Address,
        amount: Decimal,
    ) -> StoreResult<()> {
        self.inner.apply_transfer(sender, recipient, amount).await
    }

    async fn append_transfer_record(
        &self,
        record: NewTransferRecord,
    ) -> StoreResult<TransferRecord> {
        tokio::time::sleep(self.append_delay).await;
        self.inner.append_transfer_record(record).await
    }

    async fn recent_transfers(&self, limit: usize) -> StoreResult<Vec<TransferRecord>> {
        self.inner.recent_transfers(limit).await
    }

    async fn seed_if_empty(&self, count: usize, initial_balance: Decimal) -> StoreResult<usize> {
        self.inner.seed_if_empty(count, initial_balance).await
    }

    async fn create_account(&self, account: &Account) -> StoreResult<()> {
        self.inner.create_account(account).await
    }

    async fn account_count(&self) -> StoreResult<u64> {
        self.inner.account_count().await
    }

    async fn list_accounts(&self) -> StoreResult<Vec<Account>> {
        self.inner.list_accounts().await
    }

    async fn remove_account(&self, address: &Address) -> StoreResult<bool> {
        self.inner.remove_account(address).await
    }

    async fn remove_transfer(&self, id: TransferId) -> StoreResult<bool> {
        self.inner.remove_transfer(id).await
    }
}
