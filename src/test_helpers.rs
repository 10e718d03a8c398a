//! In-memory connection for exercising the migration engine without a server
//!
//! [`FakeConnection`] records every statement, models the version table and the
//! session's advisory locks, and lets tests inject failures by statement text.
//! It understands exactly the statements the engine issues; anything else is
//! recorded and reported as one affected row.
//!
//! Like PostgreSQL, a failed statement inside a transaction aborts it: later
//! statements are refused, and `COMMIT` ends it with a silent rollback.

use crate::executor::{ensure_not_aborted, Connection, DbError, SqlExecutor, Transaction};
use crate::migration::options::{DEFAULT_VERSION_SCHEMA_NAME, DEFAULT_VERSION_TABLE_NAME};
use crate::migration::state_table::qualified_name;
use bytes::BytesMut;
use may_postgres::types::{IsNull, ToSql, Type};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Route `log` output through the test harness; safe to call from every test
#[cfg(test)]
pub(crate) fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Debug, Default)]
struct FakeState {
    executed: Vec<String>,
    version_table_exists: bool,
    version_rows: Vec<i64>,
    held_locks: Vec<i64>,
    lock_calls: usize,
    unlock_calls: usize,
    begins: usize,
    commits: usize,
    rollbacks: usize,
    failures: Vec<(String, String)>,
    commit_failure: Option<String>,
    in_transaction: bool,
    transaction_aborted: bool,
}

/// Recording, in-memory [`Connection`]
#[derive(Debug)]
pub struct FakeConnection {
    version_table: String,
    state: Mutex<FakeState>,
}

impl Default for FakeConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeConnection {
    /// A fresh database with the default version table name
    pub fn new() -> Self {
        Self::with_version_table(DEFAULT_VERSION_SCHEMA_NAME, DEFAULT_VERSION_TABLE_NAME)
    }

    pub fn with_version_table(schema: &str, table: &str) -> Self {
        Self {
            version_table: qualified_name(schema, table),
            state: Mutex::new(FakeState::default()),
        }
    }

    /// A database whose version table already holds `version`
    pub fn at_version(version: i64) -> Self {
        let conn = Self::new();
        {
            let mut state = conn.state();
            state.version_table_exists = true;
            state.version_rows = vec![version];
        }
        conn
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail every statement containing `pattern` with a query error carrying `message`
    pub fn fail_when(&self, pattern: &str, message: &str) {
        self.state()
            .failures
            .push((pattern.to_string(), message.to_string()));
    }

    pub fn clear_failures(&self) {
        let mut state = self.state();
        state.failures.clear();
        state.commit_failure = None;
    }

    /// Make the next `COMMIT` fail
    pub fn fail_commit(&self, message: &str) {
        self.state().commit_failure = Some(message.to_string());
    }

    /// Every statement seen so far, trimmed, including ones that failed
    pub fn executed(&self) -> Vec<String> {
        self.state().executed.clone()
    }

    /// Current content of the version table, `None` if it does not exist
    pub fn stored_version(&self) -> Option<i64> {
        let state = self.state();
        if !state.version_table_exists {
            return None;
        }
        state.version_rows.first().copied()
    }

    pub fn version_row_count(&self) -> usize {
        self.state().version_rows.len()
    }

    pub fn held_locks(&self) -> Vec<i64> {
        self.state().held_locks.clone()
    }

    pub fn lock_calls(&self) -> usize {
        self.state().lock_calls
    }

    pub fn unlock_calls(&self) -> usize {
        self.state().unlock_calls
    }

    pub fn begins(&self) -> usize {
        self.state().begins
    }

    pub fn commits(&self) -> usize {
        self.state().commits
    }

    pub fn rollbacks(&self) -> usize {
        self.state().rollbacks
    }

    fn record(&self, query: &str) -> Result<String, DbError> {
        let sql = query.trim().to_string();
        let mut state = self.state();
        state.executed.push(sql.clone());
        if state.transaction_aborted {
            return Err(DbError::QueryError(
                "current transaction is aborted, commands ignored until end of transaction block"
                    .to_string(),
            ));
        }
        let injected = state
            .failures
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
            .map(|(_, message)| message.clone());
        if let Some(message) = injected {
            if state.in_transaction {
                state.transaction_aborted = true;
            }
            return Err(DbError::QueryError(message));
        }
        Ok(sql)
    }

    fn run(&self, query: &str, params: &[&dyn ToSql]) -> Result<Outcome, DbError> {
        let sql = self.record(query)?;
        let table = self.version_table.as_str();
        let mut state = self.state();

        if sql.starts_with("SELECT pg_advisory_lock(") {
            let id = decode_i64(params, 0)?;
            state.lock_calls += 1;
            state.held_locks.push(id);
            return Ok(Outcome::Rows(1));
        }
        if sql.starts_with("SELECT pg_advisory_unlock(") {
            let id = decode_i64(params, 0)?;
            state.unlock_calls += 1;
            let released = match state.held_locks.iter().position(|held| *held == id) {
                Some(idx) => {
                    state.held_locks.remove(idx);
                    true
                }
                None => false,
            };
            return Ok(Outcome::Bool(released));
        }
        if sql.starts_with(&format!("CREATE TABLE IF NOT EXISTS {table}")) {
            state.version_table_exists = true;
            return Ok(Outcome::Rows(0));
        }
        if sql.starts_with(&format!("INSERT INTO {table}")) {
            if !state.version_table_exists {
                return Err(missing_relation(table));
            }
            if state.version_rows.is_empty() {
                state.version_rows.push(0);
                return Ok(Outcome::Rows(1));
            }
            return Ok(Outcome::Rows(0));
        }
        if sql.starts_with(&format!("SELECT version FROM {table}")) {
            if !state.version_table_exists {
                return Err(missing_relation(table));
            }
            return match state.version_rows.as_slice() {
                [version] => Ok(Outcome::Int(*version)),
                rows => Err(DbError::QueryError(format!(
                    "query returned {} rows, expected one",
                    rows.len()
                ))),
            };
        }
        if sql.starts_with(&format!("UPDATE {table}")) {
            if !state.version_table_exists {
                return Err(missing_relation(table));
            }
            let version = decode_i64(params, 0)?;
            for row in state.version_rows.iter_mut() {
                *row = version;
            }
            return Ok(Outcome::Rows(state.version_rows.len() as u64));
        }
        if sql.starts_with("CREATE SCHEMA") || sql.starts_with("SET ") || sql.starts_with("RESET ") {
            return Ok(Outcome::Rows(0));
        }
        Ok(Outcome::Rows(1))
    }

    /// `COMMIT` as the server answers it: an aborted transaction rolls back without error
    pub fn send_commit(&self) -> Result<(), DbError> {
        let mut state = self.state();
        state.executed.push("COMMIT".to_string());
        state.in_transaction = false;
        if std::mem::take(&mut state.transaction_aborted) {
            state.rollbacks += 1;
            return Ok(());
        }
        if let Some(message) = state.commit_failure.take() {
            return Err(DbError::QueryError(message));
        }
        state.commits += 1;
        Ok(())
    }

    /// Empty the version table, leaving it in place
    pub fn truncate_version_table(&self) {
        self.state().version_rows.clear();
    }
}

enum Outcome {
    Rows(u64),
    Int(i64),
    Bool(bool),
}

fn missing_relation(table: &str) -> DbError {
    DbError::QueryError(format!("relation {table} does not exist"))
}

fn decode_i64(params: &[&dyn ToSql], idx: usize) -> Result<i64, DbError> {
    let param = params
        .get(idx)
        .ok_or_else(|| DbError::QueryError(format!("missing bind parameter ${}", idx + 1)))?;

    let mut buf = BytesMut::new();
    let is_null = param
        .to_sql_checked(&Type::INT8, &mut buf)
        .map_err(|e| DbError::ParseError(format!("cannot encode parameter as BIGINT: {e}")))?;
    if matches!(is_null, IsNull::Yes) {
        return Err(DbError::ParseError("BIGINT parameter is NULL".to_string()));
    }

    let raw: [u8; 8] = buf
        .as_ref()
        .try_into()
        .map_err(|_| DbError::ParseError(format!("expected 8 bytes, got {}", buf.len())))?;
    Ok(i64::from_be_bytes(raw))
}

impl SqlExecutor for FakeConnection {
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, DbError> {
        match self.run(query, params)? {
            Outcome::Rows(n) => Ok(n),
            Outcome::Int(_) | Outcome::Bool(_) => Ok(1),
        }
    }

    fn query_i64(&self, query: &str, params: &[&dyn ToSql]) -> Result<i64, DbError> {
        match self.run(query, params)? {
            Outcome::Int(v) => Ok(v),
            _ => Err(DbError::ParseError("expected BIGINT in first column".to_string())),
        }
    }

    fn query_bool(&self, query: &str, params: &[&dyn ToSql]) -> Result<bool, DbError> {
        match self.run(query, params)? {
            Outcome::Bool(v) => Ok(v),
            _ => Err(DbError::ParseError("expected BOOLEAN in first column".to_string())),
        }
    }
}

impl Connection for FakeConnection {
    fn begin(&self) -> Result<Box<dyn Transaction + '_>, DbError> {
        self.record("BEGIN")?;
        let mut state = self.state();
        state.begins += 1;
        state.in_transaction = true;
        state.transaction_aborted = false;
        drop(state);
        Ok(Box::new(FakeTransaction {
            conn: self,
            closed: false,
        }))
    }
}

struct FakeTransaction<'a> {
    conn: &'a FakeConnection,
    closed: bool,
}

impl SqlExecutor for FakeTransaction<'_> {
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, DbError> {
        self.conn.execute(query, params)
    }

    fn query_i64(&self, query: &str, params: &[&dyn ToSql]) -> Result<i64, DbError> {
        self.conn.query_i64(query, params)
    }

    fn query_bool(&self, query: &str, params: &[&dyn ToSql]) -> Result<bool, DbError> {
        self.conn.query_bool(query, params)
    }
}

impl Transaction for FakeTransaction<'_> {
    fn commit(mut self: Box<Self>) -> Result<(), DbError> {
        ensure_not_aborted(&*self)?;
        self.closed = true;
        self.conn.send_commit()
    }
}

impl Drop for FakeTransaction<'_> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        // Statement failures are not injected here: ROLLBACK always succeeds.
        let mut state = self.conn.state();
        state.executed.push("ROLLBACK".to_string());
        state.rollbacks += 1;
        state.in_transaction = false;
        state.transaction_aborted = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_table_lifecycle() {
        let conn = FakeConnection::new();
        let table = qualified_name("schema_migrate", "schema_version");
        assert_eq!(conn.stored_version(), None);
        assert!(conn.query_i64(&format!("SELECT version FROM {table}"), &[]).is_err());

        assert!(conn
            .execute(&format!("CREATE TABLE IF NOT EXISTS {table} (version BIGINT NOT NULL)"), &[])
            .is_ok());
        assert!(conn.execute(&format!("INSERT INTO {table} (version) SELECT 0"), &[]).is_ok());
        assert!(conn.execute(&format!("INSERT INTO {table} (version) SELECT 0"), &[]).is_ok());
        assert_eq!(conn.version_row_count(), 1);

        assert!(conn.execute(&format!("UPDATE {table} SET version = $1"), &[&5i64]).is_ok());
        assert_eq!(conn.stored_version(), Some(5));
    }

    #[test]
    fn test_injected_failure_is_recorded() {
        let conn = FakeConnection::new();
        conn.fail_when("DROP", "permission denied");
        assert!(conn.execute("DROP TABLE x", &[]).is_err());
        assert_eq!(conn.executed(), vec!["DROP TABLE x".to_string()]);

        conn.clear_failures();
        assert!(conn.execute("DROP TABLE x", &[]).is_ok());
    }

    #[test]
    #[allow(clippy::expect_used)] // Test code - expect is acceptable
    fn test_failed_statement_aborts_the_transaction() {
        let conn = FakeConnection::new();
        conn.fail_when("1 / 0", "division by zero");

        let tx = conn.begin().expect("begin");
        assert!(tx.execute("CREATE TABLE t (id BIGINT)", &[]).is_ok());
        assert!(tx.execute("SELECT 1 / 0", &[]).is_err());

        let refused = tx.execute("CREATE TABLE u (id BIGINT)", &[]);
        assert!(refused.is_err_and(|e| e.to_string().contains("current transaction is aborted")));

        drop(tx);
        assert_eq!(conn.rollbacks(), 1);
        assert!(conn.execute("CREATE TABLE u (id BIGINT)", &[]).is_ok());
    }

    #[test]
    #[allow(clippy::expect_used)] // Test code - expect is acceptable
    fn test_raw_commit_of_aborted_transaction_silently_rolls_back() {
        let conn = FakeConnection::new();
        conn.fail_when("1 / 0", "division by zero");

        let tx = conn.begin().expect("begin");
        assert!(tx.execute("SELECT 1 / 0", &[]).is_err());
        // Bypass the transaction handle, as a bare COMMIT on the session would.
        std::mem::forget(tx);

        assert!(conn.send_commit().is_ok());
        assert_eq!(conn.commits(), 0);
        assert_eq!(conn.rollbacks(), 1);
    }

    #[test]
    #[allow(clippy::expect_used)] // Test code - expect is acceptable
    fn test_commit_of_aborted_transaction_is_refused() {
        let conn = FakeConnection::new();
        conn.fail_when("1 / 0", "division by zero");

        let tx = conn.begin().expect("begin");
        assert!(tx.execute("SELECT 1 / 0", &[]).is_err());

        let err = tx.commit().err();
        assert!(matches!(err, Some(DbError::TransactionAborted(_))));
        assert_eq!(conn.commits(), 0);
        assert_eq!(conn.rollbacks(), 1);
    }
}
