//! # SaaS Metrics - typed staging, monthly MRR mart and revenue forecast
//!
//! Loads raw subscription records, casts them into a typed staging model,
//! aggregates monthly recurring revenue per subscription month, and
//! forecasts it forward.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌───────────────────────────┐   ┌──────────────────────┐   ┌───────────────────────────────┐
//! │ JSON / CSV   │──▶│ raw_saas_metrics │──▶│ stg_raw_saas_metrics_data │──▶│ fact_monthly_revenue │──▶│ fact_monthly_revenue_forecast │
//! │   (ingest)   │   │     (source)     │   │    (casts, staging)       │   │   (monthly SUM, mart)│   │        (trend + season)       │
//! └──────────────┘   └──────────────────┘   └───────────────────────────┘   └──────────────────────┘   └───────────────────────────────┘
//! ```
//!
//! Every relation is stored in a file-backed [`Warehouse`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use saas_metrics::{ingest_file, run_models, IngestMode, Selection, Settings};
//!
//! let settings = Settings::from_env()?;
//! let warehouse = settings.warehouse();
//! ingest_file(&warehouse, &settings.source, "raw_saas_data.json".as_ref(), IngestMode::Append)?;
//! let run = run_models(&warehouse, &settings, Selection::All);
//! println!("run {} ok: {}", run.run_id, run.succeeded());
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Error types per layer
//! - [`config`] - Environment settings
//! - [`models`] - Raw, typed and fact rows
//! - [`parser`] - JSON / CSV loading with auto-detection
//! - [`validation`] - Raw shape schema and staging column tests
//! - [`warehouse`] - Materialized relation store
//! - [`ingest`] - Source loading with key constraints
//! - [`transform`] - Casts, staging, mart, runs
//! - [`forecast`] - Revenue forecast
//! - [`api`] - HTTP API server and run log

// Core modules
pub mod config;
pub mod error;
pub mod models;

// Loading
pub mod ingest;
pub mod parser;
pub mod validation;

// Storage
pub mod warehouse;

// Models
pub mod forecast;
pub mod transform;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Errors & Config
// =============================================================================

pub use config::Settings;
pub use error::{
    CastError, ConfigError, ForecastError, IngestError, ParseError, PipelineError, ServerError,
    WarehouseError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    ForecastPoint, MonthlyRevenueFact, RawSubscriptionRecord, Relation, SourceRef,
    TypedSubscriptionRecord, FORECAST_MODEL, MART_MODEL, STAGING_MODEL,
};

// =============================================================================
// Re-exports - Loading & Storage
// =============================================================================

pub use ingest::{ingest, ingest_file, IngestMode, IngestSummary};
pub use parser::{load_raw_file, parse_bytes_auto, parse_csv, parse_json, RawInput};
pub use validation::{run_staging_tests, validate_raw_record, TestOutcome, TestReport};
pub use warehouse::{RelationInfo, StoredTable, Warehouse};

// =============================================================================
// Re-exports - Transforms
// =============================================================================

pub use forecast::{forecast, run_forecast, ForecastModel};
pub use transform::{
    aggregate_monthly, compiled_sql, run_mart, run_models, run_staging, stage_records,
    test_models, truncate_to_month, ModelRun, ModelStatus, RunResult, Selection,
};

// Server
pub mod server {
    pub use crate::api::server::{router, start_server};
}
