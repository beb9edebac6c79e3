//! Mart model: `fact_monthly_revenue`.
//!
//! Groups staging rows by the month their subscription started and sums MRR.
//!
//! ```text
//! stg rows                                  fact_monthly_revenue
//! ┌───────────────────────────┐             ┌──────────────────────┐
//! │ 1  2024-01-15   100.00    │             │ 2024-01-01   150.00  │
//! │ 2  2024-01-20    50.00    │      →      │ 2024-02-01    75.00  │
//! │ 3  2024-02-05    75.00    │             └──────────────────────┘
//! └───────────────────────────┘
//! ```
//!
//! - Null MRR values are skipped; a month whose values are all null sums to null.
//! - Rows without a start date form a single null-month group, ordered last.
//! - `churn_date` plays no part: every subscription counts in full in its start month.

use bigdecimal::BigDecimal;
use chrono::{Datelike, Days, NaiveDate};
use std::collections::BTreeMap;

use crate::config::Settings;
use crate::error::PipelineResult;
use crate::models::{MonthlyRevenueFact, TypedSubscriptionRecord};
use crate::warehouse::{RelationInfo, Warehouse};

/// Equivalent SQL of the mart model
pub const MART_SQL: &str = "\
SELECT
    DATE_TRUNC('month', subscription_start_date) AS subscription_month,
    SUM(monthly_recurring_revenue) AS monthly_recurring_revenue
FROM
    {{ ref('stg_raw_saas_metrics_data') }}
GROUP BY 1
ORDER BY 1
";

/// Mart columns, in order
pub const MART_COLUMNS: [&str; 2] = ["subscription_month", "monthly_recurring_revenue"];

/// `DATE_TRUNC('month', date)`
pub fn truncate_to_month(date: NaiveDate) -> NaiveDate {
    date - Days::new(u64::from(date.day0()))
}

/// SUM accumulator with SQL null semantics.
fn add(total: &mut Option<BigDecimal>, value: Option<&BigDecimal>) {
    if let Some(v) = value {
        *total = Some(match total.take() {
            Some(t) => t + v,
            None => v.clone(),
        });
    }
}

/// Aggregate staging rows into one fact per month, ascending by month.
pub fn aggregate_monthly(rows: &[TypedSubscriptionRecord]) -> Vec<MonthlyRevenueFact> {
    let mut months: BTreeMap<NaiveDate, Option<BigDecimal>> = BTreeMap::new();
    let mut undated: Option<Option<BigDecimal>> = None;

    for row in rows {
        let mrr = row.monthly_recurring_revenue.as_ref();
        match row.subscription_start_date {
            Some(date) => add(months.entry(truncate_to_month(date)).or_default(), mrr),
            None => add(undated.get_or_insert(None), mrr),
        }
    }

    let mut facts: Vec<MonthlyRevenueFact> = months
        .into_iter()
        .map(|(month, total)| MonthlyRevenueFact {
            subscription_month: Some(month),
            monthly_recurring_revenue: total,
        })
        .collect();

    // NULLS LAST
    if let Some(total) = undated {
        facts.push(MonthlyRevenueFact {
            subscription_month: None,
            monthly_recurring_revenue: total,
        });
    }

    facts
}

/// Read the staging relation, aggregate, and materialize the mart relation.
///
/// Fails before aggregating if the staging relation was never materialized.
pub fn run_mart(
    warehouse: &Warehouse,
    settings: &Settings,
    run_id: Option<&str>,
) -> PipelineResult<RelationInfo> {
    let staged: Vec<TypedSubscriptionRecord> = warehouse.read_rows(&settings.staging_relation())?;
    let facts = aggregate_monthly(&staged);
    let info = warehouse.write_table(&settings.mart_relation(), &MART_COLUMNS, &facts, run_id)?;
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PipelineError, WarehouseError};
    use std::str::FromStr;
    use tempfile::tempdir;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn row(id: i32, start: Option<&str>, mrr: Option<&str>) -> TypedSubscriptionRecord {
        TypedSubscriptionRecord {
            customer_id: Some(id),
            subscription_start_date: start.map(date),
            monthly_recurring_revenue: mrr.map(dec),
            churn_date: None,
            plan_type: None,
        }
    }

    #[test]
    fn test_truncate_to_month() {
        assert_eq!(truncate_to_month(date("2024-01-31")), date("2024-01-01"));
        assert_eq!(truncate_to_month(date("2024-02-29")), date("2024-02-01"));
        assert_eq!(truncate_to_month(date("2024-03-01")), date("2024-03-01"));
    }

    #[test]
    fn test_monthly_sums() {
        let rows = vec![
            row(1, Some("2024-01-15"), Some("100.00")),
            row(2, Some("2024-01-20"), Some("50.00")),
            row(3, Some("2024-02-05"), Some("75.00")),
        ];

        let facts = aggregate_monthly(&rows);
        assert_eq!(
            facts,
            vec![
                MonthlyRevenueFact {
                    subscription_month: Some(date("2024-01-01")),
                    monthly_recurring_revenue: Some(dec("150.00")),
                },
                MonthlyRevenueFact {
                    subscription_month: Some(date("2024-02-01")),
                    monthly_recurring_revenue: Some(dec("75.00")),
                },
            ]
        );
    }

    #[test]
    fn test_output_is_ascending_regardless_of_input_order() {
        let rows = vec![
            row(1, Some("2024-03-02"), Some("1")),
            row(2, Some("2023-12-31"), Some("2")),
            row(3, Some("2024-03-30"), Some("3")),
            row(4, Some("2024-01-01"), Some("4")),
        ];

        let months: Vec<_> = aggregate_monthly(&rows)
            .into_iter()
            .map(|f| f.subscription_month.unwrap())
            .collect();
        assert_eq!(
            months,
            vec![date("2023-12-01"), date("2024-01-01"), date("2024-03-01")]
        );
    }

    #[test]
    fn test_null_mrr_is_skipped() {
        let rows = vec![
            row(1, Some("2024-01-15"), None),
            row(2, Some("2024-01-20"), Some("50")),
            row(3, Some("2024-02-05"), None),
        ];

        let facts = aggregate_monthly(&rows);
        assert_eq!(facts[0].monthly_recurring_revenue, Some(dec("50")));
        assert_eq!(facts[1].monthly_recurring_revenue, None);
    }

    #[test]
    fn test_null_start_date_group_is_last() {
        let rows = vec![
            row(1, None, Some("10")),
            row(2, Some("2024-01-20"), Some("50")),
            row(3, None, Some("5")),
        ];

        let facts = aggregate_monthly(&rows);
        assert_eq!(facts.len(), 2);
        assert_eq!(facts[1].subscription_month, None);
        assert_eq!(facts[1].monthly_recurring_revenue, Some(dec("15")));
    }

    #[test]
    fn test_churn_is_ignored() {
        let mut churned = row(1, Some("2024-01-15"), Some("100"));
        churned.churn_date = Some(date("2024-01-16"));

        let facts = aggregate_monthly(&[churned]);
        assert_eq!(facts[0].monthly_recurring_revenue, Some(dec("100")));
    }

    #[test]
    fn test_empty_input() {
        assert!(aggregate_monthly(&[]).is_empty());
    }

    #[test]
    fn test_run_mart_requires_staging() {
        let dir = tempdir().unwrap();
        let warehouse = Warehouse::open(dir.path());

        let err = run_mart(&warehouse, &Settings::default(), None).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Warehouse(WarehouseError::RelationNotFound(_))
        ));
        assert!(!warehouse.exists(&Settings::default().mart_relation()));
    }
}
