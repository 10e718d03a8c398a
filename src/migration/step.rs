//! Migration step definition

use super::error::StepError;
use crate::executor::{Connection, Transaction};
use std::fmt;

/// Step body that runs against the raw connection and owns its transactional boundaries
pub type ConnFn = Box<dyn Fn(&dyn Connection) -> Result<(), StepError> + Send + Sync>;

/// Step body that runs inside a transaction opened and committed by the step
pub type TxFn = Box<dyn Fn(&dyn Transaction) -> Result<(), StepError> + Send + Sync>;

/// A single unit of migration logic
///
/// Use [`Step::tx`] for ordinary DDL/DML so a failing step leaves nothing
/// behind. Use [`Step::conn`] for statements PostgreSQL refuses to run inside a
/// transaction block, such as `CREATE INDEX CONCURRENTLY`.
///
/// # Example
///
/// ```rust
/// use pgstep::migration::Step;
/// use pgstep::SqlExecutor;
///
/// let step = Step::tx(|tx| {
///     tx.execute("CREATE TABLE users (id BIGINT PRIMARY KEY)", &[])?;
///     tx.execute("CREATE INDEX users_id_idx ON users (id)", &[])?;
///     Ok(())
/// });
/// assert!(step.is_transactional());
/// ```
pub enum Step {
    Conn(ConnFn),
    Tx(TxFn),
}

impl Step {
    /// Build a connection-scoped step
    pub fn conn<F>(f: F) -> Self
    where
        F: Fn(&dyn Connection) -> Result<(), StepError> + Send + Sync + 'static,
    {
        Step::Conn(Box::new(f))
    }

    /// Build a transaction-scoped step
    pub fn tx<F>(f: F) -> Self
    where
        F: Fn(&dyn Transaction) -> Result<(), StepError> + Send + Sync + 'static,
    {
        Step::Tx(Box::new(f))
    }

    pub fn is_transactional(&self) -> bool {
        matches!(self, Step::Tx(_))
    }

    /// Run the step
    ///
    /// Errors from the body or from `COMMIT` are returned unchanged; the
    /// provider adds the version.
    pub fn apply(&self, conn: &dyn Connection) -> Result<(), StepError> {
        match self {
            Step::Conn(f) => f(conn),
            Step::Tx(f) => {
                // Dropping `tx` on the error path rolls back.
                let tx = conn.begin()?;
                f(&*tx)?;
                tx.commit()?;
                Ok(())
            }
        }
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Conn(_) => f.write_str("Step::Conn(..)"),
            Step::Tx(_) => f.write_str("Step::Tx(..)"),
        }
    }
}
