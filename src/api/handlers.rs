use std::sync::Arc;

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use crate::{
    account::{Address, TransferRecord},
    command::{CommandError, TransferCommand, TransferRequest},
    processor::{LedgerError, LedgerProcessor},
    store::LedgerStore,
};

#[derive(Debug, Deserialize)]
pub struct RecentTransfersParams {
    pub count: Option<i64>,
}

/// Balance rendered as a bare JSON number.
#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct BalanceBody(#[serde(with = "rust_decimal::serde::arbitrary_precision")] pub Decimal);

/// `POST /api/send`
pub async fn send<S: LedgerStore>(
    State(processor): State<Arc<LedgerProcessor<S>>>,
    payload: Result<Json<TransferRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(request) = payload?;
    let command = TransferCommand::try_from(request).map_err(LedgerError::from)?;
    processor.execute_transfer(command, Utc::now()).await?;
    Ok(StatusCode::OK)
}

/// `GET /api/transactions?count=N`
pub async fn recent_transfers<S: LedgerStore>(
    State(processor): State<Arc<LedgerProcessor<S>>>,
    params: Result<Query<RecentTransfersParams>, QueryRejection>,
) -> Result<Json<Vec<TransferRecord>>, ApiError> {
    let Query(params) = params?;
    let count = params
        .count
        .ok_or_else(|| LedgerError::from(CommandError::MissingCount))?;
    Ok(Json(processor.recent_transfers(count).await?))
}

/// `GET /api/wallet/:address/balance`
pub async fn balance<S: LedgerStore>(
    State(processor): State<Arc<LedgerProcessor<S>>>,
    Path(address): Path<String>,
) -> Result<Json<BalanceBody>, ApiError> {
    let balance = processor.get_balance(&Address::new(address)).await?;
    Ok(Json(BalanceBody(balance)))
}
