//! Staging model: `stg_raw_saas_metrics_data`.
//!
//! Casts every raw column to its declared type. One output row per input
//! row, in input order; nothing is filtered, deduplicated or renamed. The
//! first value that does not cast aborts the whole model and nothing is
//! materialized.

use crate::config::Settings;
use crate::error::{CastError, PipelineResult};
use crate::models::{RawSubscriptionRecord, TypedSubscriptionRecord, RAW_COLUMNS};
use crate::warehouse::{RelationInfo, Warehouse};

use super::cast::{cast_date, cast_integer, cast_numeric, cast_varchar, CastContext};

/// Equivalent SQL of the staging model
pub const STAGING_SQL: &str = "\
WITH source_data AS (
    SELECT
        customer_id,
        subscription_start_date,
        monthly_recurring_revenue,
        churn_date,
        plan_type
    FROM
        {{ source('raw', 'raw_saas_metrics') }}
)
SELECT
    CAST(customer_id AS INTEGER) AS customer_id,
    CAST(subscription_start_date AS DATE) AS subscription_start_date,
    CAST(monthly_recurring_revenue AS NUMERIC) AS monthly_recurring_revenue,
    CAST(churn_date AS DATE) AS churn_date,
    CAST(plan_type AS VARCHAR) AS plan_type
FROM
    source_data
";

/// Cast one raw row.
pub fn stage_record(row: usize, raw: &RawSubscriptionRecord) -> Result<TypedSubscriptionRecord, CastError> {
    let ctx = |column| CastContext::new(row, column);

    Ok(TypedSubscriptionRecord {
        customer_id: cast_integer(&raw.customer_id, ctx("customer_id"))?,
        subscription_start_date: cast_date(&raw.subscription_start_date, ctx("subscription_start_date"))?,
        monthly_recurring_revenue: cast_numeric(
            &raw.monthly_recurring_revenue,
            ctx("monthly_recurring_revenue"),
        )?,
        churn_date: cast_date(&raw.churn_date, ctx("churn_date"))?,
        plan_type: cast_varchar(&raw.plan_type, ctx("plan_type"))?,
    })
}

/// Cast every raw row. Fails on the first row that does not cast.
pub fn stage_records(raw: &[RawSubscriptionRecord]) -> Result<Vec<TypedSubscriptionRecord>, CastError> {
    raw.iter()
        .enumerate()
        .map(|(row, record)| stage_record(row, record))
        .collect()
}

/// Read the raw source, cast it, and materialize the staging relation.
pub fn run_staging(
    warehouse: &Warehouse,
    settings: &Settings,
    run_id: Option<&str>,
) -> PipelineResult<RelationInfo> {
    let source: Vec<RawSubscriptionRecord> = warehouse.read_rows(&settings.source_relation())?;
    let staged = stage_records(&source)?;
    let info = warehouse.write_table(&settings.staging_relation(), &RAW_COLUMNS, &staged, run_id)?;
    Ok(info)
}
