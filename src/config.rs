use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

use anyhow::ensure;
use clap::Parser;
use rust_decimal::Decimal;

use crate::{
    logging::LogFormat,
    store::{StoreConfig, StoreLocation},
};

/// Custodial wallet ledger served over HTTP.
#[derive(Parser, Debug)]
#[command(name = "wallet-ledger", version, about)]
pub struct Cli {
    /// SQLite database file. Created, along with its directory, if missing.
    #[arg(long, env = "WALLET_DATABASE", default_value = "data/sqlite/storage.db")]
    pub database: PathBuf,

    /// Address to listen on.
    #[arg(long, env = "WALLET_HOST", default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub host: IpAddr,

    /// Port to listen on.
    #[arg(long, env = "SERVERPORT", default_value_t = 8080)]
    pub port: u16,

    /// Number of wallets created when the database holds none.
    #[arg(long, env = "WALLET_SEED_ACCOUNTS", default_value_t = 10)]
    pub seed_accounts: usize,

    /// Balance of every seeded wallet.
    #[arg(long, env = "WALLET_INITIAL_BALANCE", default_value = "100")]
    pub initial_balance: Decimal,

    /// Upper bound on handling one HTTP request.
    #[arg(long, default_value_t = 10)]
    pub request_timeout_secs: u64,

    /// Upper bound on a single storage operation.
    #[arg(long, default_value_t = 5000)]
    pub store_timeout_ms: u64,

    #[arg(long, value_enum, env = "WALLET_LOG_FORMAT", default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Also append logs, HTTP access included, to this file (e.g. `logs/all.logs`).
    #[arg(long, env = "WALLET_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct SeedConfig {
    pub accounts: usize,
    pub initial_balance: Decimal,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            accounts: 10,
            initial_balance: Decimal::ONE_HUNDRED,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub listen: SocketAddr,
    pub store: StoreConfig,
    pub seed: SeedConfig,
    pub request_timeout: Duration,
    pub store_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080),
            store: StoreConfig::default(),
            seed: SeedConfig::default(),
            request_timeout: Duration::from_secs(10),
            store_timeout: Duration::from_secs(5),
        }
    }
}

impl ServiceConfig {
    pub fn in_memory() -> Self {
        Self {
            store: StoreConfig::in_memory(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.seed.initial_balance >= Decimal::ZERO,
            "initial balance must not be negative, got {}",
            self.seed.initial_balance
        );
        ensure!(
            !self.request_timeout.is_zero() && !self.store_timeout.is_zero(),
            "timeouts must be greater than zero"
        );
        Ok(())
    }
}

impl TryFrom<Cli> for ServiceConfig {
    type Error = anyhow::Error;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let config = Self {
            listen: SocketAddr::new(cli.host, cli.port),
            store: StoreConfig {
                location: StoreLocation::File(cli.database),
                ..StoreConfig::default()
            },
            seed: SeedConfig {
                accounts: cli.seed_accounts,
                initial_balance: cli.initial_balance,
            },
            request_timeout: Duration::from_secs(cli.request_timeout_secs),
            store_timeout: Duration::from_millis(cli.store_timeout_ms),
        };
        config.validate()?;
        Ok(config)
    }
}
