//! Transaction Module
//!
//! Explicit `BEGIN` / `COMMIT` over a `may_postgres::Client`, used by
//! transaction-scoped steps. A [`PgTransaction`] that is dropped while still
//! open issues `ROLLBACK`, so an early return out of a step body never leaves
//! the session inside an aborted transaction. Committing a transaction in
//! which a statement already failed is an error rather than a silent rollback.

use crate::connection::{first_column_bool, first_column_i64};
use crate::executor::{ensure_not_aborted, DbError, SqlExecutor, Transaction};
use may_postgres::types::ToSql;
use may_postgres::Client;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// A database transaction
pub struct PgTransaction {
    client: Client,
    closed: bool,
}

impl PgTransaction {
    pub(crate) fn new(client: Client) -> Result<Self, DbError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::begin_transaction_span().entered();

        client.execute("BEGIN", &[])?;

        Ok(Self {
            client,
            closed: false,
        })
    }

    fn ensure_open(&self) -> Result<(), DbError> {
        if self.closed {
            return Err(DbError::Other("Transaction is closed".to_string()));
        }
        Ok(())
    }
}

impl Drop for PgTransaction {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::rollback_transaction_span().entered();

        if let Err(e) = self.client.execute("ROLLBACK", &[]) {
            log::warn!("rollback of abandoned transaction failed: {e}");
        }
    }
}

impl SqlExecutor for PgTransaction {
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, DbError> {
        self.ensure_open()?;

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::execute_query_span(query).entered();

        self.client.execute(query, params).map_err(DbError::from)
    }

    fn query_i64(&self, query: &str, params: &[&dyn ToSql]) -> Result<i64, DbError> {
        self.ensure_open()?;

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::execute_query_span(query).entered();

        let row = self.client.query_one(query, params)?;
        first_column_i64(&row)
    }

    fn query_bool(&self, query: &str, params: &[&dyn ToSql]) -> Result<bool, DbError> {
        self.ensure_open()?;

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::execute_query_span(query).entered();

        let row = self.client.query_one(query, params)?;
        first_column_bool(&row)
    }
}

impl Transaction for PgTransaction {
    fn commit(mut self: Box<Self>) -> Result<(), DbError> {
        self.ensure_open()?;

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::commit_transaction_span().entered();

        // Still open on failure, so Drop ends the aborted transaction.
        ensure_not_aborted(&*self)?;

        // Closed before the round trip: a failed COMMIT already ends the
        // transaction server-side, so Drop must not send ROLLBACK after it.
        self.closed = true;
        self.client.execute("COMMIT", &[])?;
        Ok(())
    }
}
