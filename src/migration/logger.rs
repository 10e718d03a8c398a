//! Lifecycle event sinks for the provider

use std::time::Duration;

/// Receives migration lifecycle events
///
/// None of the methods can fail; a logger that cannot deliver an event drops it.
pub trait MigrateLogger: Send + Sync {
    /// Nothing registered lies in `(current, target]`
    fn no_pending(&self, current: i64);

    /// The batch about to be applied, ascending
    fn pending(&self, current: i64, versions: &[i64]);

    fn applying(&self, version: i64);

    fn applied(&self, version: i64, elapsed: Duration);
}

/// Default logger, writing through the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogLogger;

impl MigrateLogger for LogLogger {
    fn no_pending(&self, current: i64) {
        log::debug!("no pending migrations (current version {current})");
    }

    fn pending(&self, current: i64, versions: &[i64]) {
        log::info!(
            "applying {} migration(s) from version {current}: {versions:?}",
            versions.len()
        );
    }

    fn applying(&self, version: i64) {
        log::debug!("applying migration {version}");
    }

    fn applied(&self, version: i64, elapsed: Duration) {
        log::info!("applied migration {version} in {elapsed:?}");
    }
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLogger;

impl MigrateLogger for NoopLogger {
    fn no_pending(&self, _current: i64) {}
    fn pending(&self, _current: i64, _versions: &[i64]) {}
    fn applying(&self, _version: i64) {}
    fn applied(&self, _version: i64, _elapsed: Duration) {}
}

/// Structured events through `tracing`
#[cfg(feature = "tracing")]
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

#[cfg(feature = "tracing")]
impl MigrateLogger for TracingLogger {
    fn no_pending(&self, current: i64) {
        tracing::debug!(current, "no pending migrations");
    }

    fn pending(&self, current: i64, versions: &[i64]) {
        tracing::info!(current, count = versions.len(), ?versions, "applying migrations");
    }

    fn applying(&self, version: i64) {
        tracing::debug!(version, "applying migration");
    }

    fn applied(&self, version: i64, elapsed: Duration) {
        tracing::info!(
            version,
            elapsed_ms = elapsed.as_millis() as u64,
            "applied migration"
        );
    }
}
