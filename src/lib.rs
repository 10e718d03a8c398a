//! # pgstep
//!
//! Versioned, lock-coordinated schema migrations for PostgreSQL using the `may` runtime.
//!
//! See [`migration`] for the engine and [`config`] for file/env configuration.

pub mod config;
pub mod connection;
pub mod executor;
#[cfg(any(feature = "metrics", feature = "tracing"))]
pub mod metrics;
pub mod migration;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
pub mod transaction;

pub use config::MigrateConfig;
pub use connection::{connect, ConnectionError, PgConnection};
pub use executor::{Connection, DbError, SqlExecutor, Transaction};
pub use transaction::PgTransaction;
