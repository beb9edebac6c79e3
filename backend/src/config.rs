//! Runtime settings loaded from the environment.
//!
//! `.env` is read first (via `dotenvy`) by the binary; every variable has a
//! default so an empty environment works.
//!
//! | Variable                        | Default                    |
//! |---------------------------------|----------------------------|
//! | `SAAS_METRICS_WAREHOUSE_DIR`    | `.saas-metrics/warehouse`  |
//! | `SAAS_METRICS_SCHEMA`           | `public`                   |
//! | `SAAS_METRICS_SOURCE_SCHEMA`    | `public`                   |
//! | `SAAS_METRICS_FORECAST_PERIODS` | `24`                       |
//! | `SAAS_METRICS_PORT`             | `3000`                     |

use serde::Serialize;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::models::{Relation, SourceRef, FORECAST_MODEL, MART_MODEL, STAGING_MODEL};
use crate::warehouse::{Warehouse, DEFAULT_WAREHOUSE_DIR};

pub const ENV_WAREHOUSE_DIR: &str = "SAAS_METRICS_WAREHOUSE_DIR";
pub const ENV_SCHEMA: &str = "SAAS_METRICS_SCHEMA";
pub const ENV_SOURCE_SCHEMA: &str = "SAAS_METRICS_SOURCE_SCHEMA";
pub const ENV_FORECAST_PERIODS: &str = "SAAS_METRICS_FORECAST_PERIODS";
pub const ENV_PORT: &str = "SAAS_METRICS_PORT";

/// Default number of future months to forecast
pub const DEFAULT_FORECAST_PERIODS: u32 = 24;

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 3000;

/// Pipeline settings
#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    /// Warehouse root directory
    pub warehouse_dir: PathBuf,
    /// Schema models are materialized into
    pub target_schema: String,
    /// Declared raw source
    pub source: SourceRef,
    /// Future months produced by the forecast
    pub forecast_periods: u32,
    /// HTTP port for `serve`
    pub port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            warehouse_dir: PathBuf::from(DEFAULT_WAREHOUSE_DIR),
            target_schema: "public".to_string(),
            source: SourceRef::raw_saas_metrics("public"),
            forecast_periods: DEFAULT_FORECAST_PERIODS,
            port: DEFAULT_PORT,
        }
    }
}

impl Settings {
    /// Load settings from process environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let warehouse_dir = get(ENV_WAREHOUSE_DIR)
            .map(PathBuf::from)
            .unwrap_or(defaults.warehouse_dir);
        let target_schema = get(ENV_SCHEMA).unwrap_or(defaults.target_schema);
        let source_schema = get(ENV_SOURCE_SCHEMA).unwrap_or_else(|| "public".to_string());

        let forecast_periods = match get(ENV_FORECAST_PERIODS) {
            Some(v) => parse_value(ENV_FORECAST_PERIODS, &v)?,
            None => defaults.forecast_periods,
        };
        let port = match get(ENV_PORT) {
            Some(v) => parse_value(ENV_PORT, &v)?,
            None => defaults.port,
        };

        for (key, schema) in [(ENV_SCHEMA, &target_schema), (ENV_SOURCE_SCHEMA, &source_schema)] {
            check_identifier(key, schema)?;
        }

        Ok(Self {
            warehouse_dir,
            target_schema,
            source: SourceRef::raw_saas_metrics(source_schema),
            forecast_periods,
            port,
        })
    }

    pub fn warehouse(&self) -> Warehouse {
        Warehouse::open(&self.warehouse_dir)
    }

    pub fn source_relation(&self) -> Relation {
        self.source.relation()
    }

    pub fn staging_relation(&self) -> Relation {
        Relation::new(&self.target_schema, STAGING_MODEL)
    }

    pub fn mart_relation(&self) -> Relation {
        Relation::new(&self.target_schema, MART_MODEL)
    }

    pub fn forecast_relation(&self) -> Relation {
        Relation::new(&self.target_schema, FORECAST_MODEL)
    }
}

fn parse_value<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
        message: e.to_string(),
    })
}

/// Schema and relation names become path components; keep them to `[A-Za-z0-9_]+`.
pub fn check_identifier(key: &'static str, value: &str) -> Result<(), ConfigError> {
    if !value.is_empty() && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
            message: "identifiers may only contain letters, digits and '_'".to_string(),
        })
    }
}
