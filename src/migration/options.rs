//! Provider options

use super::collection::Collection;
use super::lock::{AdvisoryLocker, Locker};
use super::logger::{LogLogger, MigrateLogger};
use super::state_table::qualified_name;
use crate::config::MigrateConfig;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_VERSION_SCHEMA_NAME: &str = "schema_migrate";
pub const DEFAULT_VERSION_TABLE_NAME: &str = "schema_version";

/// Everything a [`Provider`](super::Provider) needs besides the connection
///
/// Defaults: an empty collection, [`AdvisoryLocker`] on [`DEFAULT_LOCK_ID`](super::DEFAULT_LOCK_ID),
/// [`LogLogger`], and the `schema_migrate.schema_version` table.
///
/// ```rust
/// use pgstep::migration::{Collection, NoopLogger, Options, Step};
/// use std::sync::Arc;
///
/// let mut collection = Collection::new();
/// collection.register("001_init", Step::tx(|_| Ok(()))).unwrap();
///
/// let options = Options::default()
///     .with_collection(Arc::new(collection))
///     .with_logger(NoopLogger)
///     .version_schema_name("app")
///     .version_table_name("migrations");
/// assert_eq!(options.qualified_table(), "\"app\".\"migrations\"");
/// ```
#[derive(Clone)]
pub struct Options {
    pub(crate) collection: Arc<Collection>,
    pub(crate) locker: Arc<dyn Locker>,
    pub(crate) logger: Arc<dyn MigrateLogger>,
    pub(crate) version_schema_name: String,
    pub(crate) version_table_name: String,
    pub(crate) statement_timeout: Option<Duration>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            collection: Arc::new(Collection::new()),
            locker: Arc::new(AdvisoryLocker::default()),
            logger: Arc::new(LogLogger),
            version_schema_name: DEFAULT_VERSION_SCHEMA_NAME.to_string(),
            version_table_name: DEFAULT_VERSION_TABLE_NAME.to_string(),
            statement_timeout: None,
        }
    }
}

impl Options {
    /// Build options from loaded configuration, keeping the default collection and logger
    pub fn from_config(config: &MigrateConfig) -> Self {
        let mut locker = AdvisoryLocker::new(config.lock_id);
        if let Some(secs) = config.lock_timeout_seconds {
            locker = locker.with_timeout(Duration::from_secs(secs));
        }

        let mut options = Self::default()
            .with_locker(locker)
            .version_schema_name(config.version_schema.clone())
            .version_table_name(config.version_table.clone());
        options.statement_timeout = config.statement_timeout_seconds.map(Duration::from_secs);
        options
    }

    #[must_use]
    pub fn version_table_name(mut self, name: impl Into<String>) -> Self {
        self.version_table_name = name.into();
        self
    }

    #[must_use]
    pub fn version_schema_name(mut self, name: impl Into<String>) -> Self {
        self.version_schema_name = name.into();
        self
    }

    #[must_use]
    pub fn with_collection(mut self, collection: impl Into<Arc<Collection>>) -> Self {
        self.collection = collection.into();
        self
    }

    #[must_use]
    pub fn with_locker(mut self, locker: impl Locker + 'static) -> Self {
        self.locker = Arc::new(locker);
        self
    }

    #[must_use]
    pub fn with_logger(mut self, logger: impl MigrateLogger + 'static) -> Self {
        self.logger = Arc::new(logger);
        self
    }

    /// Session `statement_timeout` applied for the locked section of `migrate`
    #[must_use]
    pub fn statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = Some(timeout);
        self
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    /// Quoted `"schema"."table"` of the version table
    pub fn qualified_table(&self) -> String {
        qualified_name(&self.version_schema_name, &self.version_table_name)
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("versions", &self.collection.versions())
            .field("version_schema_name", &self.version_schema_name)
            .field("version_table_name", &self.version_table_name)
            .field("statement_timeout", &self.statement_timeout)
            .finish_non_exhaustive()
    }
}
