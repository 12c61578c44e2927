//! SQLite-backed ledger store.

use std::{path::PathBuf, str::FromStr, time::Duration};

use async_trait::async_trait;
use chrono::DateTime;
use rust_decimal::Decimal;
use sqlx::{
    SqliteConnection, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use tracing::{debug, info, instrument, warn};

use super::{LedgerStore, StoreError, StoreResult};
use crate::account::{
    Account, Address, BalanceChange, NewTransferRecord, TransferId, TransferRecord,
};

/// How many times seeding regenerates an address that collides with an
/// existing one before giving up.
const MAX_ADDRESS_ATTEMPTS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    File(PathBuf),
    InMemory,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub location: StoreLocation,
    /// How long SQLite waits on a locked database before failing a statement.
    pub busy_timeout: Duration,
    /// How long to wait for the connection to become available.
    pub acquire_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::file("data/sqlite/storage.db")
    }
}

impl StoreConfig {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            location: StoreLocation::File(path.into()),
            busy_timeout: Duration::from_secs(5),
            acquire_timeout: Duration::from_secs(30),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            location: StoreLocation::InMemory,
            ..Self::file(PathBuf::new())
        }
    }
}

/// Ledger store on top of a single persistent SQLite connection.
#[derive(Clone)]
pub struct SqliteLedgerStore {
    pool: SqlitePool,
}

impl SqliteLedgerStore {
    #[instrument(skip_all, fields(location = ?config.location))]
    pub async fn connect(config: &StoreConfig) -> StoreResult<Self> {
        let options = match &config.location {
            StoreLocation::File(path) => SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true),
            StoreLocation::InMemory => SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| StoreError::Connection(e.to_string()))?,
        }
        .busy_timeout(config.busy_timeout);

        // One connection that is never recycled: an in-memory database lives
        // exactly as long as its connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        debug!("Connection opened");
        Ok(Self { pool })
    }

    /// Connects to a fresh in-memory database with the schema in place.
    pub async fn in_memory() -> StoreResult<Self> {
        let store = Self::connect(&StoreConfig::in_memory()).await?;
        store.init().await?;
        Ok(store)
    }

    /// Creates the `accounts` and `transfers` tables if they do not exist.
    #[instrument(skip(self))]
    pub async fn init(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        debug!("Schema ready");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    async fn account_exists(&self, address: &Address) -> StoreResult<bool> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM accounts WHERE address = ?")
            .bind(address.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(query_error)?;
        Ok(count > 0)
    }

    async fn get_balance(&self, address: &Address) -> StoreResult<Decimal> {
        let mut conn = self.pool.acquire().await.map_err(query_error)?;
        fetch_account(&mut conn, address)
            .await?
            .map(|account| account.balance)
            .ok_or_else(|| StoreError::AccountNotFound(address.clone()))
    }

    #[instrument(skip_all, fields(sender = %sender, recipient = %recipient, amount = %amount))]
    async fn apply_transfer(
        &self,
        sender: &Address,
        recipient: &Address,
        amount: Decimal,
    ) -> StoreResult<()> {
        // Dropping `tx` before commit rolls back whatever leg was written.
        let mut tx = self.pool.begin().await.map_err(query_error)?;

        for (address, change) in [
            (sender, BalanceChange::Debit(amount)),
            (recipient, BalanceChange::Credit(amount)),
        ] {
            let mut account = fetch_account(&mut tx, address)
                .await?
                .ok_or_else(|| StoreError::AccountNotFound(address.clone()))?;
            account
                .apply(change)
                .map_err(|e| StoreError::ConstraintViolation(format!("{address}: {e}")))?;
            write_balance(&mut tx, &account).await?;
        }

        tx.commit().await.map_err(query_error)?;
        debug!("Balances updated");
        Ok(())
    }

    #[instrument(skip_all, fields(sender = %record.sender, recipient = %record.recipient))]
    async fn append_transfer_record(
        &self,
        record: NewTransferRecord,
    ) -> StoreResult<TransferRecord> {
        let micros = record.created_at.timestamp_micros();
        let result = sqlx::query(
            "INSERT INTO transfers (amount, created_at, sender, recipient) VALUES (?, ?, ?, ?)",
        )
        .bind(record.amount.to_string())
        .bind(micros)
        .bind(record.sender.as_str())
        .bind(record.recipient.as_str())
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        let id = result.last_insert_rowid();
        debug!(id, "Transfer recorded");

        // hand back what is stored, which keeps microsecond precision only
        let created_at = DateTime::from_timestamp_micros(micros).unwrap_or(record.created_at);
        Ok(NewTransferRecord {
            created_at,
            ..record
        }
        .into_record(id))
    }

    async fn recent_transfers(&self, limit: usize) -> StoreResult<Vec<TransferRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows = sqlx::query_as::<_, TransferRow>(
            r#"
            SELECT id, amount, created_at, sender, recipient
            FROM transfers
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        rows.into_iter().map(TransferRow::into_record).collect()
    }

    #[instrument(skip_all, fields(count = count, initial_balance = %initial_balance))]
    async fn seed_if_empty(&self, count: usize, initial_balance: Decimal) -> StoreResult<usize> {
        let mut tx = self.pool.begin().await.map_err(query_error)?;

        let (existing,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM accounts")
            .fetch_one(&mut *tx)
            .await
            .map_err(query_error)?;
        if existing > 0 {
            debug!(existing, "Accounts already present, nothing to seed");
            return Ok(0);
        }

        for _ in 0..count {
            insert_fresh_account(&mut tx, initial_balance).await?;
        }
        tx.commit().await.map_err(query_error)?;

        info!(count, "Seeded accounts");
        Ok(count)
    }

    async fn create_account(&self, account: &Account) -> StoreResult<()> {
        ensure_non_negative(account)?;
        sqlx::query("INSERT INTO accounts (address, balance) VALUES (?, ?)")
            .bind(account.address.as_str())
            .bind(account.balance.to_string())
            .execute(&self.pool)
            .await
            .map_err(query_error)?;
        Ok(())
    }

    async fn account_count(&self) -> StoreResult<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM accounts")
            .fetch_one(&self.pool)
            .await
            .map_err(query_error)?;
        Ok(count.unsigned_abs())
    }

    async fn list_accounts(&self) -> StoreResult<Vec<Account>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT address, balance FROM accounts ORDER BY address")
                .fetch_all(&self.pool)
                .await
                .map_err(query_error)?;

        rows.into_iter()
            .map(|(address, balance)| -> StoreResult<Account> {
                Ok(Account::new(Address::new(address), parse_decimal(&balance)?))
            })
            .collect()
    }

    #[instrument(skip_all, fields(address = %address))]
    async fn remove_account(&self, address: &Address) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM accounts WHERE address = ?")
            .bind(address.as_str())
            .execute(&self.pool)
            .await
            .map_err(query_error)?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn remove_transfer(&self, id: TransferId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM transfers WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(query_error)?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(sqlx::FromRow)]
struct TransferRow {
    id: i64,
    amount: String,
    created_at: i64,
    sender: String,
    recipient: String,
}

impl TransferRow {
    fn into_record(self) -> StoreResult<TransferRecord> {
        let created_at = DateTime::from_timestamp_micros(self.created_at).ok_or_else(|| {
            StoreError::Corrupted(format!(
                "transfer {} has invalid creation time {}",
                self.id, self.created_at
            ))
        })?;
        Ok(TransferRecord {
            id: self.id,
            amount: parse_decimal(&self.amount)?,
            created_at,
            sender: Address::new(self.sender),
            recipient: Address::new(self.recipient),
        })
    }
}

async fn fetch_account(
    conn: &mut SqliteConnection,
    address: &Address,
) -> StoreResult<Option<Account>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT balance FROM accounts WHERE address = ?")
        .bind(address.as_str())
        .fetch_optional(&mut *conn)
        .await
        .map_err(query_error)?;

    row.map(|(balance,)| -> StoreResult<Account> {
        Ok(Account::new(address.clone(), parse_decimal(&balance)?))
    })
    .transpose()
}

async fn write_balance(conn: &mut SqliteConnection, account: &Account) -> StoreResult<()> {
    let result = sqlx::query("UPDATE accounts SET balance = ? WHERE address = ?")
        .bind(account.balance.to_string())
        .bind(account.address.as_str())
        .execute(&mut *conn)
        .await
        .map_err(query_error)?;
    if result.rows_affected() == 0 {
        return Err(StoreError::AccountNotFound(account.address.clone()));
    }
    Ok(())
}

async fn insert_fresh_account(
    conn: &mut SqliteConnection,
    balance: Decimal,
) -> StoreResult<Address> {
    for _ in 0..MAX_ADDRESS_ATTEMPTS {
        let account = Account::new(Address::generate(), balance);
        ensure_non_negative(&account)?;
        let result = sqlx::query(
            "INSERT INTO accounts (address, balance) VALUES (?, ?) ON CONFLICT (address) DO NOTHING",
        )
        .bind(account.address.as_str())
        .bind(account.balance.to_string())
        .execute(&mut *conn)
        .await
        .map_err(query_error)?;

        if result.rows_affected() == 1 {
            return Ok(account.address);
        }
        warn!(address = %account.address, "Generated address already taken, retrying");
    }
    Err(StoreError::ConstraintViolation(format!(
        "no unique address found after {MAX_ADDRESS_ATTEMPTS} attempts"
    )))
}

fn ensure_non_negative(account: &Account) -> StoreResult<()> {
    if account.balance < Decimal::ZERO {
        return Err(StoreError::ConstraintViolation(format!(
            "{}: balance must not be negative, got {}",
            account.address, account.balance
        )));
    }
    Ok(())
}

fn parse_decimal(value: &str) -> StoreResult<Decimal> {
    Decimal::from_str(value).map_err(|e| StoreError::Corrupted(format!("decimal `{value}`: {e}")))
}

fn query_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut => {
            StoreError::Timeout("acquiring the database connection".to_string())
        }
        sqlx::Error::PoolClosed | sqlx::Error::Io(_) => StoreError::Connection(err.to_string()),
        sqlx::Error::Database(ref db) if db.is_unique_violation() || db.is_check_violation() => {
            StoreError::ConstraintViolation(err.to_string())
        }
        other => StoreError::Query(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rust_decimal::prelude::{FromPrimitive, Zero};

    use super::*;

    fn dec(value: u32) -> Decimal {
        Decimal::from_u32(value).unwrap()
    }

    async fn store_with(accounts: &[(&str, u32)]) -> SqliteLedgerStore {
        let store = SqliteLedgerStore::in_memory().await.unwrap();
        for (address, balance) in accounts {
            store
                .create_account(&Account::new(Address::from(*address), dec(*balance)))
                .await
                .unwrap();
        }
        store
    }

    fn record(sender: &str, recipient: &str, amount: u32, secs: i64) -> NewTransferRecord {
        NewTransferRecord {
            amount: dec(amount),
            created_at: Utc.timestamp_opt(secs, 0).unwrap(),
            sender: Address::from(sender),
            recipient: Address::from(recipient),
        }
    }

    #[tokio::test]
    async fn seed_runs_only_on_empty_store() {
        let store = SqliteLedgerStore::in_memory().await.unwrap();
        assert_eq!(store.seed_if_empty(10, dec(100)).await.unwrap(), 10);
        let seeded = store.list_accounts().await.unwrap();
        assert_eq!(seeded.len(), 10);
        assert!(seeded.iter().all(|acc| acc.balance == dec(100)));

        assert_eq!(store.seed_if_empty(10, dec(100)).await.unwrap(), 0);
        assert_eq!(store.list_accounts().await.unwrap(), seeded);
    }

    #[tokio::test]
    async fn seed_skipped_when_any_account_exists() {
        let store = store_with(&[("A", 5)]).await;
        assert_eq!(store.seed_if_empty(10, dec(100)).await.unwrap(), 0);
        assert_eq!(store.account_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn seeding_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::file(dir.path().join("ledger.db"));

        let store = SqliteLedgerStore::connect(&config).await.unwrap();
        store.init().await.unwrap();
        store.seed_if_empty(3, dec(100)).await.unwrap();
        let before = store.list_accounts().await.unwrap();
        store.close().await;

        let store = SqliteLedgerStore::connect(&config).await.unwrap();
        store.init().await.unwrap();
        assert_eq!(store.seed_if_empty(3, dec(100)).await.unwrap(), 0);
        assert_eq!(store.list_accounts().await.unwrap(), before);
    }

    #[tokio::test]
    async fn balance_lookup() {
        let store = store_with(&[("A", 100)]).await;
        assert!(store.account_exists(&Address::from("A")).await.unwrap());
        assert!(!store.account_exists(&Address::from("B")).await.unwrap());
        assert_eq!(store.get_balance(&Address::from("A")).await.unwrap(), dec(100));

        let err = store
            .get_balance(&Address::from("nonexistent"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AccountNotFound(addr) if addr.as_str() == "nonexistent"));
    }

    #[tokio::test]
    async fn apply_transfer_moves_funds() {
        let store = store_with(&[("A", 100), ("B", 50)]).await;
        store
            .apply_transfer(&Address::from("A"), &Address::from("B"), dec(30))
            .await
            .unwrap();
        assert_eq!(store.get_balance(&Address::from("A")).await.unwrap(), dec(70));
        assert_eq!(store.get_balance(&Address::from("B")).await.unwrap(), dec(80));
    }

    #[tokio::test]
    async fn failed_credit_leg_rolls_back_debit() {
        let store = store_with(&[("A", 100)]).await;
        // the debit succeeds, then the credit finds no recipient
        let err = store
            .apply_transfer(&Address::from("A"), &Address::from("missing"), dec(30))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AccountNotFound(_)));
        assert_eq!(store.get_balance(&Address::from("A")).await.unwrap(), dec(100));
    }

    #[tokio::test]
    async fn overflowing_credit_rolls_back_debit() {
        let store = SqliteLedgerStore::in_memory().await.unwrap();
        store
            .create_account(&Account::new(Address::from("A"), dec(10)))
            .await
            .unwrap();
        store
            .create_account(&Account::new(Address::from("B"), Decimal::MAX))
            .await
            .unwrap();
        let err = store
            .apply_transfer(&Address::from("A"), &Address::from("B"), dec(1))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ConstraintViolation(_)));
        assert_eq!(store.get_balance(&Address::from("A")).await.unwrap(), dec(10));
        assert_eq!(
            store.get_balance(&Address::from("B")).await.unwrap(),
            Decimal::MAX
        );
    }

    #[tokio::test]
    async fn store_refuses_overdraft() {
        let store = store_with(&[("A", 10), ("B", 0)]).await;
        let err = store
            .apply_transfer(&Address::from("A"), &Address::from("B"), dec(11))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ConstraintViolation(_)));
        assert_eq!(store.get_balance(&Address::from("A")).await.unwrap(), dec(10));
        assert_eq!(store.get_balance(&Address::from("B")).await.unwrap(), Decimal::zero());
    }

    #[tokio::test]
    async fn recent_transfers_newest_first() {
        let store = SqliteLedgerStore::in_memory().await.unwrap();
        assert!(store.recent_transfers(5).await.unwrap().is_empty());

        let first = store
            .append_transfer_record(record("A", "B", 1, 1_000))
            .await
            .unwrap();
        let second = store
            .append_transfer_record(record("B", "C", 2, 2_000))
            .await
            .unwrap();
        // same instant as `second`, inserted later
        let third = store
            .append_transfer_record(record("C", "A", 3, 2_000))
            .await
            .unwrap();
        assert!(first.id < second.id && second.id < third.id);

        let recent = store.recent_transfers(2).await.unwrap();
        assert_eq!(recent, vec![third.clone(), second.clone()]);

        let all = store.recent_transfers(100).await.unwrap();
        assert_eq!(all, vec![third, second, first]);

        assert!(store.recent_transfers(0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn appended_record_keeps_microseconds() {
        let store = SqliteLedgerStore::in_memory().await.unwrap();
        let created_at = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let stored = store
            .append_transfer_record(NewTransferRecord {
                created_at,
                ..record("A", "B", 1, 0)
            })
            .await
            .unwrap();
        assert_eq!(stored.created_at.timestamp_subsec_micros(), 123_456);
        assert_eq!(store.recent_transfers(1).await.unwrap(), vec![stored]);
    }

    #[tokio::test]
    async fn administrative_removal() {
        let store = store_with(&[("A", 100), ("B", 50)]).await;
        assert!(store.remove_account(&Address::from("A")).await.unwrap());
        assert!(!store.remove_account(&Address::from("A")).await.unwrap());
        assert_eq!(store.get_balance(&Address::from("B")).await.unwrap(), dec(50));
        assert_eq!(store.account_count().await.unwrap(), 1);

        let stored = store
            .append_transfer_record(record("A", "B", 1, 10))
            .await
            .unwrap();
        assert!(store.remove_transfer(stored.id).await.unwrap());
        assert!(!store.remove_transfer(stored.id).await.unwrap());
        assert!(store.recent_transfers(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_or_negative_accounts_rejected() {
        let store = store_with(&[("A", 100)]).await;
        let err = store
            .create_account(&Account::new(Address::from("A"), dec(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ConstraintViolation(_)));

        let err = store
            .create_account(&Account::new(
                Address::from("N"),
                Decimal::from_i32(-1).unwrap(),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ConstraintViolation(_)));
        assert_eq!(store.account_count().await.unwrap(), 1);
    }
}
