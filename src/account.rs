use std::fmt;

use chrono::{DateTime, Utc};
use rand::{Rng, distributions::Alphanumeric};
use rust_decimal::{Decimal, prelude::Zero};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Length of generated wallet addresses.
pub const ADDRESS_LEN: usize = 64;

pub type TransferId = i64;

/// Opaque wallet identifier.
///
/// Addresses are never parsed or validated: any string may be looked up, and
/// an unknown one simply does not exist in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Draws a fresh address uniformly from `[A-Za-z0-9]{64}`.
    pub fn generate() -> Self {
        Self::generate_with(&mut rand::thread_rng())
    }

    pub fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self(
            rng.sample_iter(&Alphanumeric)
                .take(ADDRESS_LEN)
                .map(char::from)
                .collect(),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceChange {
    Debit(Decimal),
    Credit(Decimal),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccountError {
    #[error("Insufficient funds: {available} available, {requested} requested")]
    InsufficientFunds {
        available: Decimal,
        requested: Decimal,
    },
    #[error("Balance overflow while crediting {amount}")]
    Overflow { amount: Decimal },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub address: Address,
    pub balance: Decimal,
}

impl Account {
    pub fn new(address: Address, balance: Decimal) -> Self {
        Self { address, balance }
    }

    pub fn ensure_can_send(&self, amount: Decimal) -> Result<(), AccountError> {
        if self.balance >= amount {
            Ok(())
        } else {
            Err(AccountError::InsufficientFunds {
                available: self.balance,
                requested: amount,
            })
        }
    }

    /// Applies one leg of a transfer. A debit that would take the balance
    /// below zero is refused and leaves the account untouched.
    pub fn apply(&mut self, change: BalanceChange) -> Result<(), AccountError> {
        match change {
            BalanceChange::Debit(amount) => {
                self.ensure_can_send(amount)?;
                let balance = self.balance - amount;
                debug_assert!(balance >= Decimal::zero());
                self.balance = balance;
            }
            BalanceChange::Credit(amount) => {
                self.balance = self
                    .balance
                    .checked_add(amount)
                    .ok_or(AccountError::Overflow { amount })?;
            }
        }
        Ok(())
    }
}

/// A completed transfer, as stored in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRecord {
    pub id: TransferId,
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "from")]
    pub sender: Address,
    #[serde(rename = "to")]
    pub recipient: Address,
}

/// A transfer record that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransferRecord {
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub sender: Address,
    pub recipient: Address,
}

impl NewTransferRecord {
    pub fn into_record(self, id: TransferId) -> TransferRecord {
        TransferRecord {
            id,
            amount: self.amount,
            created_at: self.created_at,
            sender: self.sender,
            recipient: self.recipient,
        }
    }
}
