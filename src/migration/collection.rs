//! Migration collection: the version-keyed registry of steps
//!
//! A [`Collection`] is built once at startup and handed to the provider. Steps
//! are keyed by the numeric prefix of a filename-like string
//! (`"001_create_users.rs"` registers version `1`).
//!
//! # Self-registration
//!
//! Each migration file can expose a function that registers its own step with
//! [`Collection::must_register`]. The version is taken from the *calling*
//! source file's name, so the file name is the single place the version lives:
//!
//! ```rust
//! // migrations/001_create_users.rs
//! use pgstep::migration::{Collection, Step};
//! use pgstep::SqlExecutor;
//!
//! pub fn register(collection: &mut Collection) {
//!     collection.must_register(Step::tx(|tx| {
//!         tx.execute("CREATE TABLE users (id BIGINT PRIMARY KEY)", &[])?;
//!         Ok(())
//!     }));
//! }
//! ```

use super::error::{RegistrationError, RegistrationErrorKind};
use super::step::Step;
use std::collections::HashMap;
use std::panic::Location;
use std::path::Path;

/// Ordered registry of migration steps
#[derive(Debug, Default)]
pub struct Collection {
    steps: HashMap<i64, Step>,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a step under the version parsed from `filename`
    ///
    /// The version is everything before the first `_`, parsed as a positive
    /// base-10 integer. Leading zeros are allowed (`"007_x"` is version 7).
    ///
    /// # Errors
    ///
    /// Returns `RegistrationError` when the separator is missing, the prefix is
    /// not an integer, the version is not positive, or the version is already
    /// registered. An existing step is never overwritten.
    pub fn register(&mut self, filename: &str, step: Step) -> Result<(), RegistrationError> {
        let version = parse_version(filename)?;

        if self.steps.contains_key(&version) {
            return Err(RegistrationError::new(
                filename,
                RegistrationErrorKind::Duplicate(version),
            ));
        }

        self.steps.insert(version, step);
        Ok(())
    }

    /// Register a step under the version encoded in the caller's file name
    ///
    /// # Panics
    ///
    /// Panics if registration fails. A malformed file name or a duplicate
    /// version is a build mistake, so it surfaces at process start rather than
    /// at migrate time.
    #[track_caller]
    pub fn must_register(&mut self, step: Step) {
        let caller = Location::caller();
        let filename = Path::new(caller.file())
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_else(|| caller.file());

        if let Err(e) = self.register(filename, step) {
            panic!("{e} (registered from {caller})");
        }
    }

    /// Builder-style [`register`](Self::register)
    pub fn with_step(mut self, filename: &str, step: Step) -> Result<Self, RegistrationError> {
        self.register(filename, step)?;
        Ok(self)
    }

    pub fn step(&self, version: i64) -> Option<&Step> {
        self.steps.get(&version)
    }

    pub fn contains(&self, version: i64) -> bool {
        self.steps.contains_key(&version)
    }

    /// All registered versions, ascending
    pub fn versions(&self) -> Vec<i64> {
        let mut versions: Vec<i64> = self.steps.keys().copied().collect();
        versions.sort_unstable();
        versions
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

fn parse_version(filename: &str) -> Result<i64, RegistrationError> {
    let (prefix, _) = filename
        .split_once('_')
        .ok_or_else(|| RegistrationError::new(filename, RegistrationErrorKind::MissingSeparator))?;

    let version: i64 = prefix.parse().map_err(|e| {
        RegistrationError::new(filename, RegistrationErrorKind::InvalidVersion(e))
    })?;

    if version <= 0 {
        return Err(RegistrationError::new(
            filename,
            RegistrationErrorKind::NotPositive(version),
        ));
    }

    Ok(version)
}
