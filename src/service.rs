//! Bootstraps the ledger: storage, one-time seeding and the HTTP server.
//! Lives in the library so integration tests can start the same stack as
//! the binary.

use std::{future::Future, sync::Arc};

use anyhow::{Context, Result};
use axum::Router;
use tracing::info;

use crate::{
    api,
    config::ServiceConfig,
    processor::LedgerProcessor,
    store::{LedgerStore, SqliteLedgerStore, StoreLocation},
};

pub struct Service {
    pub config: ServiceConfig,
    pub store: SqliteLedgerStore,
    pub processor: Arc<LedgerProcessor<SqliteLedgerStore>>,
}

impl Service {
    /// Opens the store, creates missing tables and seeds wallets on first
    /// start.
    pub async fn open(config: ServiceConfig) -> Result<Self> {
        config.validate()?;

        if let StoreLocation::File(path) = &config.store.location {
            if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create `{}`", dir.display()))?;
            }
        }

        let store = SqliteLedgerStore::connect(&config.store)
            .await
            .context("Can't connect to storage")?;
        store.init().await.context("Can't init storage")?;

        let created = store
            .seed_if_empty(config.seed.accounts, config.seed.initial_balance)
            .await
            .context("Can't seed wallets")?;
        if created > 0 {
            for account in store.list_accounts().await.context("Can't list wallets")? {
                info!(address = %account.address, balance = %account.balance, "Wallet created");
            }
        }

        let processor = Arc::new(LedgerProcessor::new(store.clone(), config.store_timeout));
        Ok(Self {
            config,
            store,
            processor,
        })
    }

    pub fn router(&self) -> Router {
        api::create_router(Arc::clone(&self.processor), self.config.request_timeout)
    }

    /// Serves HTTP until `shutdown` resolves, then closes the store.
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(self.config.listen)
            .await
            .with_context(|| format!("Failed to bind `{}`", self.config.listen))?;
        let wallets = self.store.account_count().await.context("Can't count wallets")?;
        info!(listen = %self.config.listen, wallets, "Service started");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .context("Server error")?;

        self.store.close().await;
        info!("Service stopped");
        Ok(())
    }
}
