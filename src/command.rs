use rust_decimal::{Decimal, prelude::Zero};
use serde::Deserialize;
use thiserror::Error;

use crate::account::Address;

/// Transfer payload as submitted by a caller.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransferRequest {
    pub from: Address,
    pub to: Address,
    pub amount: Decimal,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("self-transfer: 'from' and 'to' addresses must be different")]
    SelfTransfer,
    #[error("non-positive amount: amount must be greater than 0, got {amount}")]
    NonPositiveAmount { amount: Decimal },
    #[error("count must not be negative, got {count}")]
    NegativeCount { count: i64 },
    #[error("expected count=N in request query (/api/transactions?count=N)")]
    MissingCount,
}

/// A transfer that passed the input checks. It can only be built through
/// [`TransferCommand::new`], so holding one means sender and recipient differ
/// and the amount is positive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferCommand {
    sender: Address,
    recipient: Address,
    amount: Decimal,
}

impl TransferCommand {
    pub fn new(
        sender: Address,
        recipient: Address,
        amount: Decimal,
    ) -> Result<Self, CommandError> {
        if sender == recipient {
            return Err(CommandError::SelfTransfer);
        }
        if amount <= Decimal::zero() {
            return Err(CommandError::NonPositiveAmount { amount });
        }
        Ok(Self {
            sender,
            recipient,
            amount,
        })
    }

    pub fn sender(&self) -> &Address {
        &self.sender
    }

    pub fn recipient(&self) -> &Address {
        &self.recipient
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }
}

impl TryFrom<TransferRequest> for TransferCommand {
    type Error = CommandError;

    fn try_from(request: TransferRequest) -> Result<Self, Self::Error> {
        Self::new(request.from, request.to, request.amount)
    }
}

/// Validates the number of records asked for by a history query.
pub fn parse_count(count: i64) -> Result<usize, CommandError> {
    if count < 0 {
        return Err(CommandError::NegativeCount { count });
    }
    Ok(usize::try_from(count).unwrap_or(usize::MAX))
}
