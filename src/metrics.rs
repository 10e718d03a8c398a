//! Observability hooks: OpenTelemetry instruments (feature `metrics`) and
//! `tracing` span helpers (feature `tracing`).

#[cfg(feature = "metrics")]
pub use otel::{MigrateMetrics, METRICS};

#[cfg(feature = "metrics")]
mod otel {
    use once_cell::sync::Lazy;
    use opentelemetry::{
        global,
        metrics::{Counter, Histogram},
    };
    use std::time::Duration;

    pub static METRICS: Lazy<MigrateMetrics> = Lazy::new(MigrateMetrics::init);

    pub struct MigrateMetrics {
        pub steps_applied: Counter<u64>,
        pub step_failures: Counter<u64>,
        pub step_duration: Histogram<f64>,
        pub lock_wait: Histogram<f64>,
    }

    impl MigrateMetrics {
        pub fn init() -> Self {
            let meter = global::meter("pgstep");

            let steps_applied = meter
                .u64_counter("pgstep_steps_applied_total")
                .with_description("Migration steps applied and recorded")
                .build();

            let step_failures = meter
                .u64_counter("pgstep_step_failures_total")
                .with_description("Migration steps that returned an error")
                .build();

            let step_duration = meter
                .f64_histogram("pgstep_step_duration_seconds")
                .with_description("Duration of a single migration step")
                .build();

            let lock_wait = meter
                .f64_histogram("pgstep_lock_wait_seconds")
                .with_description("Time spent waiting for the migration lock")
                .build();

            Self {
                steps_applied,
                step_failures,
                step_duration,
                lock_wait,
            }
        }

        pub fn record_step(&self, elapsed: Duration) {
            self.steps_applied.add(1, &[]);
            self.step_duration.record(elapsed.as_secs_f64(), &[]);
        }

        pub fn record_step_failure(&self) {
            self.step_failures.add(1, &[]);
        }

        pub fn record_lock_wait(&self, elapsed: Duration) {
            self.lock_wait.record(elapsed.as_secs_f64(), &[]);
        }
    }

}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::{info_span, Span};

    pub fn migrate_span(target: i64) -> Span {
        info_span!("pgstep.migrate", target_version = target)
    }

    pub fn lock_span(lock_id: i64) -> Span {
        info_span!("pgstep.lock", lock_id)
    }

    pub fn apply_step_span(version: i64) -> Span {
        info_span!("pgstep.apply_step", version)
    }

    pub fn execute_query_span(query: &str) -> Span {
        tracing::debug_span!("pgstep.query", sql = query)
    }

    pub fn begin_transaction_span() -> Span {
        tracing::debug_span!("pgstep.begin")
    }

    pub fn commit_transaction_span() -> Span {
        tracing::debug_span!("pgstep.commit")
    }

    pub fn rollback_transaction_span() -> Span {
        tracing::debug_span!("pgstep.rollback")
    }
}
