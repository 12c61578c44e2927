use std::{future::Future, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{Instrument, debug, error, info, instrument};

use crate::{
    account::{Account, Address, NewTransferRecord, TransferRecord},
    command::{TransferCommand, parse_count},
    store::{LedgerStore, StoreError, StoreResult},
};

use super::LedgerError;

/// Serializes every ledger operation behind one lock around the store.
///
/// Reads take the lock too, so a balance is never observed halfway through a
/// transfer and overlapping transfers are totally ordered. Each store call is
/// bounded by `op_timeout`; expiry surfaces as [`StoreError::Timeout`].
///
/// Once the lock is taken, a transfer runs to completion on its own task: a
/// caller that stops waiting cannot separate the balance update from the
/// record that follows it.
pub struct LedgerProcessor<S> {
    store: Arc<Mutex<S>>,
    op_timeout: Duration,
}

impl<S> LedgerProcessor<S>
where
    S: LedgerStore,
{
    pub fn new(store: S, op_timeout: Duration) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            op_timeout,
        }
    }

    #[instrument(
        skip_all,
        fields(sender = %command.sender(), recipient = %command.recipient(), amount = %command.amount())
    )]
    pub async fn execute_transfer(
        &self,
        command: TransferCommand,
        now: DateTime<Utc>,
    ) -> Result<TransferRecord, LedgerError> {
        let store = self.lock().await?;
        let op_timeout = self.op_timeout;
        let transfer = tokio::spawn(
            async move { transfer_locked(&*store, op_timeout, command, now).await }
                .in_current_span(),
        );
        transfer.await.map_err(|err| {
            error!(error = %err, "Transfer task did not finish");
            LedgerError::from(StoreError::Interrupted(err.to_string()))
        })?
    }

    #[instrument(skip_all, fields(address = %address))]
    pub async fn get_balance(&self, address: &Address) -> Result<Decimal, LedgerError> {
        let store = self.lock().await?;
        let balance = bounded(
            self.op_timeout,
            "reading a balance",
            store.get_balance(address),
        )
        .await?;
        debug!(%balance, "Balance read");
        Ok(balance)
    }

    #[instrument(skip(self))]
    pub async fn recent_transfers(&self, count: i64) -> Result<Vec<TransferRecord>, LedgerError> {
        let limit = parse_count(count)?;
        let store = self.lock().await?;
        Ok(bounded(
            self.op_timeout,
            "reading recent transfers",
            store.recent_transfers(limit),
        )
        .await?)
    }

    async fn lock(&self) -> StoreResult<OwnedMutexGuard<S>> {
        tokio::time::timeout(self.op_timeout, Arc::clone(&self.store).lock_owned())
            .await
            .map_err(|_| StoreError::Timeout("waiting for the ledger lock".to_string()))
    }
}

/// Steps after validation of the command: existence, funds, the atomic
/// balance update and the record. The caller holds the ledger lock.
async fn transfer_locked<S: LedgerStore>(
    store: &S,
    op_timeout: Duration,
    command: TransferCommand,
    now: DateTime<Utc>,
) -> Result<TransferRecord, LedgerError> {
    let (sender, recipient, amount) = (command.sender(), command.recipient(), command.amount());

    if !bounded(op_timeout, "checking the sender", store.account_exists(sender)).await? {
        return Err(LedgerError::NotFound("sender".to_string()));
    }
    if !bounded(
        op_timeout,
        "checking the recipient",
        store.account_exists(recipient),
    )
    .await?
    {
        return Err(LedgerError::NotFound("recipient".to_string()));
    }

    let balance = bounded(
        op_timeout,
        "reading the sender balance",
        store.get_balance(sender),
    )
    .await?;
    Account::new(sender.clone(), balance).ensure_can_send(amount)?;

    bounded(
        op_timeout,
        "applying the transfer",
        store.apply_transfer(sender, recipient, amount),
    )
    .await?;

    let record = NewTransferRecord {
        amount,
        created_at: now,
        sender: sender.clone(),
        recipient: recipient.clone(),
    };
    match bounded(
        op_timeout,
        "recording the transfer",
        store.append_transfer_record(record),
    )
    .await
    {
        Ok(record) => {
            info!(id = record.id, "Transfer executed");
            Ok(record)
        }
        Err(source) => {
            error!(error = %source, "Balances moved but the transfer was not recorded");
            Err(LedgerError::LedgerInconsistency {
                sender: sender.clone(),
                recipient: recipient.clone(),
                amount,
                source,
            })
        }
    }
}

async fn bounded<T>(
    op_timeout: Duration,
    what: &str,
    operation: impl Future<Output = StoreResult<T>>,
) -> StoreResult<T> {
    match tokio::time::timeout(op_timeout, operation).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(what.to_string())),
    }
}
