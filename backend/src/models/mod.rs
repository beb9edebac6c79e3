//! Domain models for the SaaS metrics pipeline.
//!
//! - [`RawSubscriptionRecord`] - Loosely typed row of the raw source relation
//! - [`TypedSubscriptionRecord`] - Staging output, one per raw row
//! - [`MonthlyRevenueFact`] - Mart output, one per subscription month
//! - [`ForecastPoint`] - Forecast output, one per historical or future month
//! - [`Relation`] / [`SourceRef`] - Warehouse addressing

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::config::check_identifier;
use crate::error::ConfigError;

// =============================================================================
// Model Names
// =============================================================================

/// Staging model name.
pub const STAGING_MODEL: &str = "stg_raw_saas_metrics_data";

/// Monthly revenue mart name.
pub const MART_MODEL: &str = "fact_monthly_revenue";

/// Forecast table name.
pub const FORECAST_MODEL: &str = "fact_monthly_revenue_forecast";

/// Raw columns, in table order.
pub const RAW_COLUMNS: [&str; 5] = [
    "customer_id",
    "subscription_start_date",
    "monthly_recurring_revenue",
    "churn_date",
    "plan_type",
];

// =============================================================================
// Warehouse Addressing
// =============================================================================

/// A relation (table) in the warehouse, addressed as `schema.name`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Relation {
    pub schema: String,
    pub name: String,
}

impl Relation {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Parse `schema.name`, falling back to `default_schema` when no schema is given.
    ///
    /// Both parts must be plain identifiers since they address files.
    pub fn parse(qualified: &str, default_schema: &str) -> Result<Self, ConfigError> {
        let (schema, name) = qualified
            .trim()
            .split_once('.')
            .unwrap_or((default_schema, qualified.trim()));
        check_identifier("schema", schema)?;
        check_identifier("relation", name)?;
        Ok(Self::new(schema, name))
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// A declared source: a logical source name mapped onto a warehouse table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceRef {
    /// Logical source name (`raw`).
    pub source_name: String,
    /// Warehouse schema holding the table.
    pub schema: String,
    /// Table name.
    pub table: String,
}

impl SourceRef {
    /// The raw subscription metrics source, stored in `schema`.
    pub fn raw_saas_metrics(schema: impl Into<String>) -> Self {
        Self {
            source_name: "raw".to_string(),
            schema: schema.into(),
            table: "raw_saas_metrics".to_string(),
        }
    }

    pub fn relation(&self) -> Relation {
        Relation::new(&self.schema, &self.table)
    }
}

// =============================================================================
// Raw Records
// =============================================================================

/// A row of the raw source relation. Values keep whatever JSON type the
/// producer used; a missing key is the same as null.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawSubscriptionRecord {
    #[serde(default)]
    pub customer_id: Value,
    #[serde(default)]
    pub subscription_start_date: Value,
    #[serde(default)]
    pub monthly_recurring_revenue: Value,
    #[serde(default)]
    pub churn_date: Value,
    #[serde(default)]
    pub plan_type: Value,
}

impl RawSubscriptionRecord {
    /// Build a record from a JSON object, keeping only the raw columns.
    pub fn from_object(obj: &Map<String, Value>) -> Self {
        let get = |key: &str| obj.get(key).cloned().unwrap_or(Value::Null);
        Self {
            customer_id: get("customer_id"),
            subscription_start_date: get("subscription_start_date"),
            monthly_recurring_revenue: get("monthly_recurring_revenue"),
            churn_date: get("churn_date"),
            plan_type: get("plan_type"),
        }
    }

    /// Column values in table order, paired with their names.
    pub fn columns(&self) -> [(&'static str, &Value); 5] {
        [
            (RAW_COLUMNS[0], &self.customer_id),
            (RAW_COLUMNS[1], &self.subscription_start_date),
            (RAW_COLUMNS[2], &self.monthly_recurring_revenue),
            (RAW_COLUMNS[3], &self.churn_date),
            (RAW_COLUMNS[4], &self.plan_type),
        ]
    }

    /// The record as a JSON object (for schema validation).
    pub fn to_value(&self) -> Value {
        let obj: Map<String, Value> = self
            .columns()
            .into_iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        Value::Object(obj)
    }
}

// =============================================================================
// Staging Output
// =============================================================================

/// Staging output: the raw row with every column cast to its declared type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TypedSubscriptionRecord {
    pub customer_id: Option<i32>,
    pub subscription_start_date: Option<NaiveDate>,
    pub monthly_recurring_revenue: Option<BigDecimal>,
    pub churn_date: Option<NaiveDate>,
    pub plan_type: Option<String>,
}

// =============================================================================
// Mart Output
// =============================================================================

/// Total MRR of the subscriptions that started in one month.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonthlyRevenueFact {
    /// First day of the month; `None` groups rows without a start date.
    pub subscription_month: Option<NaiveDate>,
    /// `None` when every MRR value in the group is null.
    pub monthly_recurring_revenue: Option<BigDecimal>,
}

// =============================================================================
// Forecast Output
// =============================================================================

/// One month of the revenue forecast.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForecastPoint {
    pub subscription_month: NaiveDate,
    pub forecasted_mrr: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
}

// =============================================================================
// Tests
// =============================================================================
