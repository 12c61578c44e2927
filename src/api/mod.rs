//! HTTP interface of the ledger.
//!
//! | Method | Path                           | Description                        |
//! |--------|--------------------------------|------------------------------------|
//! | POST   | `/api/send`                    | Transfer funds between two wallets |
//! | GET    | `/api/transactions?count=N`    | N most recent transfers            |
//! | GET    | `/api/wallet/:address/balance` | Balance of one wallet              |
//!
//! Failures carry an [`error::ErrorBody`] with a stable `error` kind. That
//! includes requests cut off by the request deadline and handlers that
//! panicked, both reported as `store_error`.

use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    error_handling::HandleErrorLayer,
    routing::{get, post},
};
use tower::{ServiceBuilder, timeout::TimeoutLayer};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use crate::{processor::LedgerProcessor, store::LedgerStore};

pub mod error;
pub mod handlers;

pub fn create_router<S: LedgerStore>(
    processor: Arc<LedgerProcessor<S>>,
    request_timeout: Duration,
) -> Router {
    Router::new()
        .route("/api/send", post(handlers::send::<S>))
        .route("/api/transactions", get(handlers::recent_transfers::<S>))
        .route("/api/wallet/:address/balance", get(handlers::balance::<S>))
        .layer(CatchPanicLayer::custom(error::handle_panic))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(error::handle_middleware_error))
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(processor)
}
