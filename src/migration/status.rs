//! Migration status and result types

use std::time::Duration;

/// Outcome of one [`Provider::migrate`](super::Provider::migrate) call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrateResult {
    /// Versions applied by this call, ascending; empty when nothing was pending
    pub applied_versions: Vec<i64>,

    /// Time spent in step bodies and version bookkeeping
    pub elapsed: Duration,
}

impl MigrateResult {
    pub fn is_empty(&self) -> bool {
        self.applied_versions.is_empty()
    }

    pub fn last_applied(&self) -> Option<i64> {
        self.applied_versions.last().copied()
    }
}

/// Read-only view of the database's migration state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    /// Version recorded in the version table
    pub current_version: i64,

    /// Registered versions above `current_version`, ascending
    pub pending_versions: Vec<i64>,
}

impl Status {
    #[must_use]
    pub fn new(current_version: i64, registered: &[i64]) -> Self {
        let pending_versions = registered
            .iter()
            .copied()
            .filter(|v| *v > current_version)
            .collect();

        Self {
            current_version,
            pending_versions,
        }
    }

    #[must_use]
    pub fn is_up_to_date(&self) -> bool {
        self.pending_versions.is_empty()
    }

    #[must_use]
    pub fn next_pending_version(&self) -> Option<i64> {
        self.pending_versions.first().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_pending_above_current() {
        let status = Status::new(2, &[1, 2, 5, 99]);
        assert_eq!(status.pending_versions, vec![5, 99]);
        assert_eq!(status.next_pending_version(), Some(5));
        assert!(!status.is_up_to_date());
    }

    #[test]
    fn test_status_up_to_date() {
        let status = Status::new(99, &[1, 2, 99]);
        assert!(status.is_up_to_date());
        assert_eq!(status.next_pending_version(), None);
    }

    #[test]
    fn test_empty_result() {
        let result = MigrateResult::default();
        assert!(result.is_empty());
        assert_eq!(result.last_applied(), None);
    }
}
