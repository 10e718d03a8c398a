//! Integration tests for the migration engine
//!
//! These tests run against a real PostgreSQL database named by
//! `TEST_DATABASE_URL` and are skipped when it is unset.
//!
//! Every test works inside its own schema (dropped and recreated up front) and
//! its own advisory lock id, so tests can run in parallel against one database.

#[path = "migrations/001_create_chart_of_accounts.rs"]
mod m001_create_chart_of_accounts;
#[path = "migrations/002_create_accounts.rs"]
mod m002_create_accounts;
#[path = "migrations/099_index_account_codes.rs"]
mod m099_index_account_codes;

use pgstep::migration::{
    AdvisoryLocker, Collection, Locker, MigrateError, NoopLogger, Options, Provider, Step,
};
use pgstep::{PgConnection, SqlExecutor};
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn database_url() -> Option<String> {
    let _ = env_logger::builder().is_test(true).try_init();
    match env::var("TEST_DATABASE_URL") {
        Ok(url) if !url.is_empty() => Some(url),
        _ => {
            eprintln!("TEST_DATABASE_URL not set, skipping");
            None
        }
    }
}

/// The accounting fixture, registered from its files
fn fixture_collection() -> Collection {
    let mut collection = Collection::new();
    m001_create_chart_of_accounts::register(&mut collection);
    m002_create_accounts::register(&mut collection);
    m099_index_account_codes::register(&mut collection);
    collection
}

/// A schema owned by one test, recreated empty on setup and dropped on teardown
struct TestSchema {
    url: String,
    name: String,
    lock_id: i64,
}

impl TestSchema {
    #[allow(clippy::expect_used)] // Test code - expect is acceptable
    fn new(url: &str, name: &str, lock_id: i64) -> Self {
        let admin = PgConnection::connect(url).expect("connect");
        admin
            .execute(&format!("DROP SCHEMA IF EXISTS {name} CASCADE"), &[])
            .expect("drop schema");
        admin
            .execute(&format!("CREATE SCHEMA {name}"), &[])
            .expect("create schema");

        Self {
            url: url.to_string(),
            name: name.to_string(),
            lock_id,
        }
    }

    /// A session whose unqualified names resolve inside this schema
    #[allow(clippy::expect_used)] // Test code - expect is acceptable
    fn connect(&self) -> PgConnection {
        let conn = PgConnection::connect(&self.url).expect("connect");
        conn.execute(&format!("SET search_path TO {}", self.name), &[])
            .expect("set search_path");
        conn
    }

    fn options(&self, collection: impl Into<Arc<Collection>>) -> Options {
        Options::default()
            .with_collection(collection)
            .with_locker(AdvisoryLocker::new(self.lock_id))
            .with_logger(NoopLogger)
            .version_schema_name(self.name.clone())
    }

    fn provider(&self, collection: impl Into<Arc<Collection>>) -> Provider<PgConnection> {
        Provider::new(self.connect(), self.options(collection))
    }

    #[allow(clippy::expect_used)] // Test code - expect is acceptable
    fn table_exists(&self, conn: &PgConnection, table: &str) -> bool {
        conn.query_bool(
            &format!("SELECT to_regclass('{}.{}') IS NOT NULL", self.name, table),
            &[],
        )
        .expect("to_regclass")
    }
}

impl Drop for TestSchema {
    fn drop(&mut self) {
        let dropped = PgConnection::connect(&self.url).map_err(|e| e.to_string()).and_then(|c| {
            c.execute(&format!("DROP SCHEMA IF EXISTS {} CASCADE", self.name), &[])
                .map_err(|e| e.to_string())
        });
        if let Err(e) = dropped {
            log::warn!("failed to drop test schema {}: {}", self.name, e);
        }
    }
}

#[test]
#[allow(clippy::expect_used)] // Test code - expect is acceptable
fn test_end_to_end_applies_fixture_in_order() {
    let Some(url) = database_url() else { return };
    let schema = TestSchema::new(&url, "pgstep_it_end_to_end", 71_001);
    let provider = schema.provider(fixture_collection());

    let result = provider.migrate_to_latest().expect("migrate");
    assert_eq!(result.applied_versions, vec![1, 2, 99]);

    let status = provider.status().expect("status");
    assert_eq!(status.current_version, 99);
    assert!(status.is_up_to_date());

    assert!(schema.table_exists(provider.conn(), "chart_of_accounts"));
    assert!(schema.table_exists(provider.conn(), "accounts"));
    assert!(schema.table_exists(provider.conn(), "idx_accounts_code"));

    let rows = provider
        .conn()
        .query_i64(
            &format!("SELECT count(*) FROM {}.schema_version", schema.name),
            &[],
        )
        .expect("count");
    assert_eq!(rows, 1);
}

#[test]
#[allow(clippy::expect_used)] // Test code - expect is acceptable
fn test_migrate_to_zero_only_creates_version_table() {
    let Some(url) = database_url() else { return };
    let schema = TestSchema::new(&url, "pgstep_it_zero", 71_002);
    let provider = schema.provider(fixture_collection());

    let result = provider.migrate(0).expect("migrate");
    assert!(result.is_empty());
    assert_eq!(provider.read_schema_version().expect("read"), 0);
    assert!(!schema.table_exists(provider.conn(), "chart_of_accounts"));
}

#[test]
#[allow(clippy::expect_used)] // Test code - expect is acceptable
fn test_second_run_is_a_no_op() {
    let Some(url) = database_url() else { return };
    let schema = TestSchema::new(&url, "pgstep_it_idempotent", 71_003);
    let collection = Arc::new(fixture_collection());

    let first = schema.provider(Arc::clone(&collection));
    assert_eq!(
        first.migrate_to_latest().expect("first").applied_versions,
        vec![1, 2, 99]
    );

    // A fresh session, as a restarted process would have.
    let second = schema.provider(collection);
    assert!(second.migrate_to_latest().expect("second").is_empty());
    assert_eq!(second.read_schema_version().expect("read"), 99);
}

#[test]
#[allow(clippy::expect_used)] // Test code - expect is acceptable
fn test_failed_step_rolls_back_and_retry_resumes() {
    let Some(url) = database_url() else { return };
    let schema = TestSchema::new(&url, "pgstep_it_partial", 71_004);

    let broken = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&broken);

    let mut collection = Collection::new();
    collection
        .register("1_create_ledger", Step::tx(|tx| {
            tx.execute("CREATE TABLE ledger (id BIGINT PRIMARY KEY)", &[])?;
            Ok(())
        }))
        .expect("register 1");
    collection
        .register("2_create_postings", Step::tx(move |tx| {
            tx.execute("CREATE TABLE postings (id BIGINT PRIMARY KEY)", &[])?;
            // Fails after doing work inside the transaction when broken.
            if flag.load(Ordering::SeqCst) {
                tx.execute("SELECT 1 / 0", &[])?;
            }
            Ok(())
        }))
        .expect("register 2");
    collection
        .register("3_create_periods", Step::tx(|tx| {
            tx.execute("CREATE TABLE periods (id BIGINT PRIMARY KEY)", &[])?;
            Ok(())
        }))
        .expect("register 3");
    let collection = Arc::new(collection);

    let provider = schema.provider(Arc::clone(&collection));
    let err = provider.migrate_to_latest().err().expect("step 2 fails");
    assert!(matches!(err, MigrateError::Apply { version: 2, .. }));

    assert_eq!(provider.read_schema_version().expect("read"), 1);
    assert!(schema.table_exists(provider.conn(), "ledger"));
    assert!(!schema.table_exists(provider.conn(), "postings"));
    assert!(!schema.table_exists(provider.conn(), "periods"));

    broken.store(false, Ordering::SeqCst);
    let result = provider.migrate_to_latest().expect("retry");
    assert_eq!(result.applied_versions, vec![2, 3]);
    assert_eq!(provider.read_schema_version().expect("read"), 3);
}

#[test]
#[allow(clippy::expect_used)] // Test code - expect is acceptable
fn test_swallowed_statement_error_does_not_record_version() {
    let Some(url) = database_url() else { return };
    let schema = TestSchema::new(&url, "pgstep_it_aborted_commit", 71_009);

    let collection = Collection::new()
        .with_step("1_create_ledger", Step::tx(|tx| {
            tx.execute("CREATE TABLE ledger (id BIGINT PRIMARY KEY)", &[])?;
            // The server aborts the transaction even though the body carries on.
            if let Err(e) = tx.execute("SELECT 1 / 0", &[]) {
                log::debug!("ignoring {e}");
            }
            Ok(())
        }))
        .expect("register");
    let provider = schema.provider(collection);

    let err = provider.migrate_to_latest().err().expect("commit is refused");
    assert!(matches!(err, MigrateError::Apply { version: 1, .. }));
    assert_eq!(provider.read_schema_version().expect("read"), 0);
    assert!(!schema.table_exists(provider.conn(), "ledger"));
}

#[test]
#[allow(clippy::expect_used)] // Test code - expect is acceptable
fn test_lock_is_released_after_failure() {
    let Some(url) = database_url() else { return };
    let schema = TestSchema::new(&url, "pgstep_it_release", 71_005);

    let collection = Collection::new()
        .with_step("1_fails", Step::conn(|conn| {
            conn.execute("SELECT * FROM no_such_table", &[])?;
            Ok(())
        }))
        .expect("register");
    let provider = schema.provider(collection);
    assert!(provider.migrate_to_latest().is_err());

    // Another session can take the lock immediately.
    let other = schema.connect();
    let locker = AdvisoryLocker::new(schema.lock_id).with_timeout(Duration::from_secs(1));
    locker.lock(&other).expect("lock is free");
    locker.unlock(&other).expect("unlock");
}

#[test]
#[allow(clippy::expect_used)] // Test code - expect is acceptable
fn test_lock_wait_is_bounded_by_timeout() {
    let Some(url) = database_url() else { return };
    let schema = TestSchema::new(&url, "pgstep_it_timeout", 71_006);

    let holder = schema.connect();
    let locker = AdvisoryLocker::new(schema.lock_id);
    locker.lock(&holder).expect("hold lock");

    let waiter = Provider::new(
        schema.connect(),
        schema
            .options(fixture_collection())
            .with_locker(AdvisoryLocker::new(schema.lock_id).with_timeout(Duration::from_millis(200))),
    );
    let err = waiter.migrate_to_latest().err();
    assert!(matches!(err, Some(MigrateError::Lock(_))));

    locker.unlock(&holder).expect("release");
    assert_eq!(
        waiter.migrate_to_latest().expect("migrate").applied_versions,
        vec![1, 2, 99]
    );
}

#[test]
#[allow(clippy::expect_used)] // Test code - expect is acceptable
fn test_status_before_first_migrate_fails_without_side_effects() {
    let Some(url) = database_url() else { return };
    let schema = TestSchema::new(&url, "pgstep_it_status", 71_007);
    let provider = schema.provider(fixture_collection());

    let err = provider.status().err();
    assert!(matches!(err, Some(MigrateError::ReadVersion { .. })));
    assert!(!schema.table_exists(provider.conn(), "schema_version"));
}

#[test]
#[allow(clippy::expect_used)] // Test code - expect is acceptable
fn test_racing_providers_apply_each_step_once() {
    let Some(url) = database_url() else { return };
    let schema = Arc::new(TestSchema::new(&url, "pgstep_it_race", 71_008));
    let collection = Arc::new(fixture_collection());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let schema = Arc::clone(&schema);
            let collection = Arc::clone(&collection);
            may::go!(move || {
                let provider = schema.provider(collection);
                provider
                    .migrate_to_latest()
                    .map(|result| result.applied_versions)
            })
        })
        .collect();

    let mut applied: Vec<i64> = Vec::new();
    for handle in handles {
        let versions = handle
            .join()
            .expect("coroutine panicked")
            .expect("every racer succeeds");
        applied.extend(versions);
    }
    applied.sort_unstable();

    // Non-idempotent DDL: a double apply would have failed a racer above.
    assert_eq!(applied, vec![1, 2, 99]);
    let provider = schema.provider(collection);
    assert_eq!(provider.read_schema_version().expect("read"), 99);
}
