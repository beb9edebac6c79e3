//! Model runs: staging, then mart.
//!
//! The order is fixed. Each run recomputes every selected model from its
//! full input and replaces the stored output, so re-running against
//! unchanged raw data yields identical rows. When staging fails the mart is
//! skipped for that run.
//!
//! # Example
//!
//! ```rust,ignore
//! use saas_metrics::{run_models, Selection, Settings};
//!
//! let settings = Settings::from_env()?;
//! let result = run_models(&settings.warehouse(), &settings, Selection::All);
//! assert!(result.succeeded());
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::mart::{run_mart, MART_SQL};
use super::staging::{run_staging, STAGING_SQL};
use crate::api::logs::{log_error, log_info, log_success, log_warning};
use crate::config::Settings;
use crate::error::PipelineResult;
use crate::models::{TypedSubscriptionRecord, MART_MODEL, STAGING_MODEL};
use crate::validation::{run_staging_tests, TestReport};
use crate::warehouse::{RelationInfo, Warehouse};

/// Which models a run covers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Selection {
    #[default]
    All,
    Staging,
    Mart,
}

impl Selection {
    fn includes_staging(self) -> bool {
        matches!(self, Selection::All | Selection::Staging)
    }

    fn includes_mart(self) -> bool {
        matches!(self, Selection::All | Selection::Mart)
    }
}

/// Outcome of one model in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    Success,
    Error,
    Skipped,
}

/// Result of one model
#[derive(Debug, Clone, Serialize)]
pub struct ModelRun {
    pub name: &'static str,
    pub status: ModelStatus,
    /// Rows materialized (success only)
    pub rows: Option<usize>,
    /// Error or skip reason
    pub message: Option<String>,
}

impl ModelRun {
    fn from_result(name: &'static str, result: PipelineResult<RelationInfo>) -> Self {
        match result {
            Ok(info) => {
                log_success(format!("{} materialized ({} rows)", info.relation, info.row_count));
                Self { name, status: ModelStatus::Success, rows: Some(info.row_count), message: None }
            }
            Err(e) => {
                log_error(format!("{} failed: {}", name, e));
                Self { name, status: ModelStatus::Error, rows: None, message: Some(e.to_string()) }
            }
        }
    }

    fn skipped(name: &'static str, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        log_warning(format!("{} skipped: {}", name, reason));
        Self { name, status: ModelStatus::Skipped, rows: None, message: Some(reason) }
    }
}

/// Result of a whole run
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub run_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub models: Vec<ModelRun>,
}

impl RunResult {
    /// True when no model errored or was skipped
    pub fn succeeded(&self) -> bool {
        self.models.iter().all(|m| m.status == ModelStatus::Success)
    }

    pub fn model(&self, name: &str) -> Option<&ModelRun> {
        self.models.iter().find(|m| m.name == name)
    }
}

/// Run the selected models in order.
pub fn run_models(warehouse: &Warehouse, settings: &Settings, selection: Selection) -> RunResult {
    let run_id = Uuid::new_v4().to_string();
    let started_at = Utc::now().to_rfc3339();
    log_info(format!("Run {} started", run_id));

    let mut models = Vec::new();
    let mut staging_ok = true;

    if selection.includes_staging() {
        log_info(format!("Running {}", STAGING_MODEL));
        let run = ModelRun::from_result(STAGING_MODEL, run_staging(warehouse, settings, Some(&run_id)));
        staging_ok = run.status == ModelStatus::Success;
        models.push(run);
    }

    if selection.includes_mart() {
        if staging_ok {
            log_info(format!("Running {}", MART_MODEL));
            models.push(ModelRun::from_result(MART_MODEL, run_mart(warehouse, settings, Some(&run_id))));
        } else {
            models.push(ModelRun::skipped(MART_MODEL, format!("upstream {} failed", STAGING_MODEL)));
        }
    }

    let result = RunResult {
        run_id,
        started_at,
        finished_at: Utc::now().to_rfc3339(),
        models,
    };

    let ok = result.models.iter().filter(|m| m.status == ModelStatus::Success).count();
    if result.succeeded() {
        log_success(format!("Run finished: {} of {} models ok", ok, result.models.len()));
    } else {
        log_warning(format!("Run finished: {} of {} models ok", ok, result.models.len()));
    }
    result
}

/// Run the column tests of the staging model against its stored output.
pub fn test_models(warehouse: &Warehouse, settings: &Settings) -> PipelineResult<TestReport> {
    let staged: Vec<TypedSubscriptionRecord> = warehouse.read_rows(&settings.staging_relation())?;
    let report = run_staging_tests(&staged);

    for outcome in &report.outcomes {
        if outcome.passed() {
            log_success(format!("PASS {}", outcome.name));
        } else {
            log_error(format!("FAIL {} ({} rows)", outcome.name, outcome.failures));
        }
    }
    Ok(report)
}

/// Equivalent SQL of each model, in run order.
pub fn compiled_sql() -> [(&'static str, &'static str); 2] {
    [(STAGING_MODEL, STAGING_SQL), (MART_MODEL, MART_SQL)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MonthlyRevenueFact, RawSubscriptionRecord, RAW_COLUMNS};
    use bigdecimal::BigDecimal;
    use chrono::NaiveDate;
    use serde_json::{json, Value};
    use std::str::FromStr;
    use tempfile::tempdir;

    fn seed(warehouse: &Warehouse, settings: &Settings, rows: Value) {
        let rows: Vec<RawSubscriptionRecord> = serde_json::from_value(rows).unwrap();
        warehouse
            .write_table(&settings.source_relation(), &RAW_COLUMNS, &rows, None)
            .unwrap();
    }

    fn sample() -> Value {
        json!([
            {"customer_id": 1, "subscription_start_date": "2024-01-15", "monthly_recurring_revenue": 100.00, "plan_type": "basic"},
            {"customer_id": 2, "subscription_start_date": "2024-01-20", "monthly_recurring_revenue": 50.00, "plan_type": "pro"},
            {"customer_id": 3, "subscription_start_date": "2024-02-05", "monthly_recurring_revenue": 75.00, "churn_date": "2024-04-01"}
        ])
    }

    #[test]
    fn test_full_run() {
        let dir = tempdir().unwrap();
        let warehouse = Warehouse::open(dir.path());
        let settings = Settings::default();
        seed(&warehouse, &settings, sample());

        let result = run_models(&warehouse, &settings, Selection::All);
        assert!(result.succeeded());
        assert_eq!(result.model(STAGING_MODEL).unwrap().rows, Some(3));
        assert_eq!(result.model(MART_MODEL).unwrap().rows, Some(2));

        let facts: Vec<MonthlyRevenueFact> = warehouse.read_rows(&settings.mart_relation()).unwrap();
        assert_eq!(facts[0].subscription_month, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(facts[0].monthly_recurring_revenue, Some(BigDecimal::from_str("150").unwrap()));
        assert_eq!(facts[1].subscription_month, NaiveDate::from_ymd_opt(2024, 2, 1));
        assert_eq!(facts[1].monthly_recurring_revenue, Some(BigDecimal::from_str("75").unwrap()));
    }

    #[test]
    fn test_rerun_is_idempotent() {
        let dir = tempdir().unwrap();
        let warehouse = Warehouse::open(dir.path());
        let settings = Settings::default();
        seed(&warehouse, &settings, sample());

        run_models(&warehouse, &settings, Selection::All);
        let first: Vec<MonthlyRevenueFact> = warehouse.read_rows(&settings.mart_relation()).unwrap();
        run_models(&warehouse, &settings, Selection::All);
        let second: Vec<MonthlyRevenueFact> = warehouse.read_rows(&settings.mart_relation()).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_bad_cast_skips_mart() {
        let dir = tempdir().unwrap();
        let warehouse = Warehouse::open(dir.path());
        let settings = Settings::default();
        seed(
            &warehouse,
            &settings,
            json!([{"customer_id": 1, "subscription_start_date": "not-a-date", "monthly_recurring_revenue": 10}]),
        );

        let result = run_models(&warehouse, &settings, Selection::All);
        assert!(!result.succeeded());
        assert_eq!(result.model(STAGING_MODEL).unwrap().status, ModelStatus::Error);
        assert_eq!(result.model(MART_MODEL).unwrap().status, ModelStatus::Skipped);
        assert!(!warehouse.exists(&settings.staging_relation()));
        assert!(!warehouse.exists(&settings.mart_relation()));
    }

    #[test]
    fn test_mart_only_without_staging_fails() {
        let dir = tempdir().unwrap();
        let warehouse = Warehouse::open(dir.path());
        let settings = Settings::default();

        let result = run_models(&warehouse, &settings, Selection::Mart);
        assert_eq!(result.models.len(), 1);
        assert_eq!(result.models[0].status, ModelStatus::Error);
        assert!(result.models[0].message.as_deref().unwrap().contains(STAGING_MODEL));
    }

    #[test]
    fn test_models_report() {
        let dir = tempdir().unwrap();
        let warehouse = Warehouse::open(dir.path());
        let settings = Settings::default();
        seed(
            &warehouse,
            &settings,
            json!([
                {"customer_id": 1, "subscription_start_date": "2024-01-15"},
                {"customer_id": 2}
            ]),
        );
        run_models(&warehouse, &settings, Selection::Staging);

        let report = test_models(&warehouse, &settings).unwrap();
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.outcomes[2].column, "subscription_start_date");
    }

    #[test]
    fn test_compiled_sql() {
        let sql = compiled_sql();
        assert_eq!(sql[0].0, "stg_raw_saas_metrics_data");
        assert!(sql[0].1.contains("CAST(subscription_start_date AS DATE)"));
        assert!(sql[1].1.contains("DATE_TRUNC('month', subscription_start_date)"));
    }
}
