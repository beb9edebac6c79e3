//! Validation of raw records and data tests on the staging model.
//!
//! # Raw Shape
//!
//! Raw records are checked against a JSON Schema (Draft 7) before ingestion.
//! The schema is embedded at compile time from
//! `schemas/raw-saas-metrics.json`. It only checks JSON types; whether a
//! value actually casts is decided by the staging model.
//!
//! # Data Tests
//!
//! The staging model declares three column tests:
//!
//! | Test       | Column                    |
//! |------------|---------------------------|
//! | `unique`   | `customer_id`             |
//! | `not_null` | `customer_id`             |
//! | `not_null` | `subscription_start_date` |
//!
//! [`run_staging_tests`] evaluates them and reports the failing row count of each.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::models::{TypedSubscriptionRecord, STAGING_MODEL};

/// Validate a JSON value against a JSON Schema.
///
/// Returns `Err` with one message per violation.
pub fn validate(schema: &Value, data: &Value) -> Result<(), Vec<String>> {
    let validator =
        jsonschema::draft7::new(schema).map_err(|e| vec![format!("Invalid schema: {}", e)])?;

    let errors: Vec<String> = validator.iter_errors(data).map(|e| e.to_string()).collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn raw_record_schema() -> Result<Value, Vec<String>> {
    serde_json::from_str(include_str!("../../schemas/raw-saas-metrics.json"))
        .map_err(|e| vec![format!("Invalid embedded schema: {}", e)])
}

/// Validate a raw record against the raw table shape.
pub fn validate_raw_record(data: &Value) -> Result<(), Vec<String>> {
    let schema = raw_record_schema()?;
    validate(&schema, data)
}

// =============================================================================
// Data Tests
// =============================================================================

/// Kind of column test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestKind {
    Unique,
    NotNull,
}

/// Result of one column test.
#[derive(Debug, Clone, Serialize)]
pub struct TestOutcome {
    /// Test identifier, e.g. `unique_stg_raw_saas_metrics_data_customer_id`
    pub name: String,
    pub kind: TestKind,
    pub column: &'static str,
    /// Number of offending rows (for `unique`, rows sharing a duplicated value)
    pub failures: usize,
}

impl TestOutcome {
    fn new(kind: TestKind, column: &'static str, failures: usize) -> Self {
        let prefix = match kind {
            TestKind::Unique => "unique",
            TestKind::NotNull => "not_null",
        };
        Self {
            name: format!("{}_{}_{}", prefix, STAGING_MODEL, column),
            kind,
            column,
            failures,
        }
    }

    pub fn passed(&self) -> bool {
        self.failures == 0
    }
}

/// All test outcomes for one run.
#[derive(Debug, Clone, Serialize)]
pub struct TestReport {
    pub outcomes: Vec<TestOutcome>,
}

impl TestReport {
    pub fn passed(&self) -> bool {
        self.outcomes.iter().all(TestOutcome::passed)
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.passed()).count()
    }
}

/// Count rows whose non-null value appears more than once.
fn unique_failures<T, F>(rows: &[TypedSubscriptionRecord], key: F) -> usize
where
    T: std::hash::Hash + Eq,
    F: Fn(&TypedSubscriptionRecord) -> Option<T>,
{
    let mut counts: HashMap<T, usize> = HashMap::new();
    for value in rows.iter().filter_map(&key) {
        *counts.entry(value).or_default() += 1;
    }
    counts.values().filter(|&&n| n > 1).sum()
}

/// Run the column tests declared on the staging model.
pub fn run_staging_tests(rows: &[TypedSubscriptionRecord]) -> TestReport {
    let null_ids = rows.iter().filter(|r| r.customer_id.is_none()).count();
    let null_starts = rows
        .iter()
        .filter(|r| r.subscription_start_date.is_none())
        .count();

    TestReport {
        outcomes: vec![
            TestOutcome::new(
                TestKind::Unique,
                "customer_id",
                unique_failures(rows, |r| r.customer_id),
            ),
            TestOutcome::new(TestKind::NotNull, "customer_id", null_ids),
            TestOutcome::new(TestKind::NotNull, "subscription_start_date", null_starts),
        ],
    }
}
