//! Transformation module.
//!
//! - Cast: column casts with SQL semantics
//! - Staging: raw rows to typed rows
//! - Mart: typed rows to monthly revenue facts
//! - Pipeline: ordered model runs and column tests

pub mod cast;
pub mod mart;
pub mod pipeline;
pub mod staging;

pub use mart::{aggregate_monthly, run_mart, truncate_to_month};
pub use pipeline::*;
pub use staging::{run_staging, stage_record, stage_records};
