/// Wallet addresses, balances and the records of completed transfers.
/// Balance changes are applied leg by leg and refuse to overdraw.
pub mod account;

/// Validated transfer commands built from raw caller input.
pub mod command;

/// Transfer core: the only mutating operation plus the two reads, all
/// serialized behind a single lock around the store.
pub mod processor;

/// Storage interface plus the SQLite implementation.
pub mod store;

/// HTTP routes mapping requests onto [`processor`] operations.
pub mod api;

/// Command line and environment settings, turned into a validated
/// [`config::ServiceConfig`].
pub mod config;

/// Tracing subscriber with pretty or JSON output and an optional log file.
pub mod logging;

/// Wires configuration, storage and HTTP together. Kept in the library so the
/// integration tests run the same bootstrap as the binary.
pub mod service;
