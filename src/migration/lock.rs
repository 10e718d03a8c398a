//! Session-scoped advisory locking for the migration critical section
//!
//! PostgreSQL advisory locks are keyed by an application-chosen `BIGINT` and
//! held by the session that took them. Every process migrating the same
//! database must use the same lock id.

use crate::executor::{DbError, SqlExecutor};
use std::time::{Duration, Instant};

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

/// Lock id shared by all processes using the default locker
pub const DEFAULT_LOCK_ID: i64 = 7_305_119_451_648_120_064;

/// Mutual exclusion across processes targeting one database
///
/// `lock` and `unlock` are called in strict pairs on the same connection: the
/// provider calls `unlock` exactly once for every successful `lock`, and never
/// after a failed one.
pub trait Locker: Send + Sync {
    /// Block until the lock is held by this session
    fn lock(&self, conn: &dyn SqlExecutor) -> Result<(), DbError>;

    /// Release the lock held by this session
    fn unlock(&self, conn: &dyn SqlExecutor) -> Result<(), DbError>;
}

/// [`Locker`] over `pg_advisory_lock` / `pg_advisory_unlock`
///
/// `pg_advisory_lock` waits without bound. Set [`with_timeout`](Self::with_timeout)
/// to cap the wait through the session `lock_timeout`; the wait then fails with
/// PostgreSQL's `lock_not_available` error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvisoryLocker {
    lock_id: i64,
    timeout: Option<Duration>,
}

impl Default for AdvisoryLocker {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_ID)
    }
}

impl AdvisoryLocker {
    pub fn new(lock_id: i64) -> Self {
        Self {
            lock_id,
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn lock_id(&self) -> i64 {
        self.lock_id
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn acquire(&self, conn: &dyn SqlExecutor) -> Result<(), DbError> {
        conn.execute("SELECT pg_advisory_lock($1)", &[&self.lock_id])?;
        Ok(())
    }
}

impl Locker for AdvisoryLocker {
    fn lock(&self, conn: &dyn SqlExecutor) -> Result<(), DbError> {
        #[cfg(feature = "tracing")]
        let _span = crate::metrics::tracing_helpers::lock_span(self.lock_id).entered();

        let start = Instant::now();
        log::debug!("waiting for migration lock {}", self.lock_id);

        match self.timeout {
            None => self.acquire(conn)?,
            Some(timeout) => {
                // SET takes no bind parameters; the value is an integer literal.
                let set_sql = format!("SET lock_timeout = {}", timeout.as_millis());
                conn.execute(&set_sql, &[])?;

                let acquired = self.acquire(conn);
                let reset = conn.execute("RESET lock_timeout", &[]);

                match (acquired, reset) {
                    (Err(e), Ok(_)) => return Err(e),
                    (Err(e), Err(reset_err)) => return Err(e.with_cleanup(reset_err)),
                    (Ok(()), Err(reset_err)) => {
                        // Callers only unlock after a successful lock, so give it back here.
                        return Err(match self.unlock(conn) {
                            Ok(()) => reset_err,
                            Err(unlock_err) => reset_err.with_cleanup(unlock_err),
                        });
                    }
                    (Ok(()), Ok(_)) => {}
                }
            }
        }

        let waited = start.elapsed();
        #[cfg(feature = "metrics")]
        METRICS.record_lock_wait(waited);
        log::debug!("acquired migration lock {} after {:?}", self.lock_id, waited);
        Ok(())
    }

    fn unlock(&self, conn: &dyn SqlExecutor) -> Result<(), DbError> {
        let released = conn.query_bool("SELECT pg_advisory_unlock($1)", &[&self.lock_id])?;
        if !released {
            return Err(DbError::Other(format!(
                "advisory lock {} was not held by this session",
                self.lock_id
            )));
        }
        log::debug!("released migration lock {}", self.lock_id);
        Ok(())
    }
}
