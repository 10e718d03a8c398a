//! Unique account codes, built without blocking writers
//!
//! `CREATE INDEX CONCURRENTLY` refuses to run inside a transaction block, so
//! this step runs directly on the connection.

use pgstep::migration::{Collection, Step};
use pgstep::SqlExecutor;

pub fn register(collection: &mut Collection) {
    collection.must_register(Step::conn(|conn| {
        conn.execute(
            "CREATE UNIQUE INDEX CONCURRENTLY idx_accounts_code ON accounts(code)",
            &[],
        )?;
        Ok(())
    }));
}
