//! Version table management
//!
//! The engine's only persisted state is a single-row table:
//!
//! ```sql
//! CREATE TABLE "schema_migrate"."schema_version" (version BIGINT NOT NULL);
//! ```
//!
//! holding the highest version applied so far (`0` before the first step).

use crate::executor::{DbError, SqlExecutor};

/// Quote an identifier for interpolation into SQL, doubling embedded quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quoted `"schema"."table"`
pub fn qualified_name(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

pub(crate) fn create_schema_sql(schema: &str) -> String {
    format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(schema))
}

pub(crate) fn create_table_sql(table: &str) -> String {
    format!("CREATE TABLE IF NOT EXISTS {table} (version BIGINT NOT NULL)")
}

/// Seed `0` only when the table is empty
pub(crate) fn seed_sql(table: &str) -> String {
    format!("INSERT INTO {table} (version) SELECT 0 WHERE NOT EXISTS (SELECT 1 FROM {table})")
}

pub(crate) fn select_version_sql(table: &str) -> String {
    format!("SELECT version FROM {table}")
}

pub(crate) fn update_version_sql(table: &str) -> String {
    format!("UPDATE {table} SET version = $1")
}

/// Create the version schema and table if missing and seed the single row
///
/// Idempotent. The seed insert is guarded by a non-existence check so a
/// repeated first run never adds a second row.
pub fn initialize_version_table(
    conn: &dyn SqlExecutor,
    schema: &str,
    table: &str,
) -> Result<(), DbError> {
    let qualified = qualified_name(schema, table);

    conn.execute(&create_schema_sql(schema), &[])?;
    conn.execute(&create_table_sql(&qualified), &[])?;
    conn.execute(&seed_sql(&qualified), &[])?;

    Ok(())
}
