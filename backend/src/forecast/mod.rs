//! Monthly revenue forecast.
//!
//! Fits an additive model on `fact_monthly_revenue`:
//!
//! ```text
//! y(t) = intercept + slope * t + season[month_of_year(t)]
//! ```
//!
//! where `t` is the month index since the first observed month. The trend is
//! ordinary least squares. The yearly component is the mean de-trended
//! residual of each calendar month, centred to zero; it is only fitted once
//! the history spans two full years, before that it is flat.
//!
//! Each output month carries an 80% interval built from the residual
//! standard error and the OLS prediction variance, so it widens with
//! distance from the observed months.

use bigdecimal::ToPrimitive;
use chrono::{Datelike, Months, NaiveDate};

use crate::api::logs::{log_info, log_success, log_warning};
use crate::config::Settings;
use crate::error::{ForecastError, ForecastResult, PipelineResult};
use crate::models::{ForecastPoint, MonthlyRevenueFact};
use crate::warehouse::{RelationInfo, Warehouse};

/// z-score of an 80% two-sided interval
pub const INTERVAL_Z: f64 = 1.2816;

/// Months of history needed before the yearly component is fitted
pub const SEASONALITY_MIN_SPAN: i32 = 24;

/// Forecast table columns, in order
pub const FORECAST_COLUMNS: [&str; 4] = ["subscription_month", "forecasted_mrr", "yhat_lower", "yhat_upper"];

const MIN_POINTS: usize = 2;

fn month_index(date: NaiveDate) -> i32 {
    date.year() * 12 + date.month0() as i32
}

/// A fitted trend + yearly seasonality model
#[derive(Debug, Clone)]
pub struct ForecastModel {
    origin: i32,
    intercept: f64,
    slope: f64,
    season: [f64; 12],
    sigma: f64,
    n: usize,
    t_mean: f64,
    sxx: f64,
}

impl ForecastModel {
    /// Fit on `(month, revenue)` observations. Months must be distinct.
    pub fn fit(history: &[(NaiveDate, f64)]) -> ForecastResult<Self> {
        let n = history.len();
        if n < MIN_POINTS {
            return Err(ForecastError::NotEnoughData { needed: MIN_POINTS, found: n });
        }

        let origin = history.iter().map(|(d, _)| month_index(*d)).min().unwrap_or(0);
        let t: Vec<f64> = history.iter().map(|(d, _)| f64::from(month_index(*d) - origin)).collect();
        let y: Vec<f64> = history.iter().map(|(_, v)| *v).collect();

        let t_mean = t.iter().sum::<f64>() / n as f64;
        let y_mean = y.iter().sum::<f64>() / n as f64;
        let sxx: f64 = t.iter().map(|ti| (ti - t_mean).powi(2)).sum();
        let sxy: f64 = t.iter().zip(&y).map(|(ti, yi)| (ti - t_mean) * (yi - y_mean)).sum();

        let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
        let intercept = y_mean - slope * t_mean;

        let residuals: Vec<f64> = t.iter().zip(&y).map(|(ti, yi)| yi - (intercept + slope * ti)).collect();

        let span = t.iter().cloned().fold(0.0, f64::max) as i32 + 1;
        let mut season = [0.0; 12];
        if span >= SEASONALITY_MIN_SPAN {
            let mut sums = [0.0; 12];
            let mut counts = [0usize; 12];
            for ((d, _), r) in history.iter().zip(&residuals) {
                sums[d.month0() as usize] += r;
                counts[d.month0() as usize] += 1;
            }
            let observed: Vec<usize> = (0..12).filter(|&m| counts[m] > 0).collect();
            for &m in &observed {
                season[m] = sums[m] / counts[m] as f64;
            }
            let centre = observed.iter().map(|&m| season[m]).sum::<f64>() / observed.len() as f64;
            for &m in &observed {
                season[m] -= centre;
            }
        }

        let sse: f64 = history
            .iter()
            .zip(&residuals)
            .map(|((d, _), r)| (r - season[d.month0() as usize]).powi(2))
            .sum();
        let dof = n.saturating_sub(2).max(1) as f64;
        let sigma = (sse / dof).sqrt();

        Ok(Self { origin, intercept, slope, season, sigma, n, t_mean, sxx })
    }

    /// Point forecast and 80% interval for a month
    pub fn predict(&self, month: NaiveDate) -> ForecastPoint {
        let t = f64::from(month_index(month) - self.origin);
        let yhat = self.intercept + self.slope * t + self.season[month.month0() as usize];

        let leverage = if self.sxx > 0.0 { (t - self.t_mean).powi(2) / self.sxx } else { 0.0 };
        let spread = INTERVAL_Z * self.sigma * (1.0 + 1.0 / self.n as f64 + leverage).sqrt();

        ForecastPoint {
            subscription_month: month,
            forecasted_mrr: yhat,
            yhat_lower: yhat - spread,
            yhat_upper: yhat + spread,
        }
    }

    pub fn slope(&self) -> f64 {
        self.slope
    }
}

/// Usable observations: dated months with a non-null total.
pub fn history_from_facts(facts: &[MonthlyRevenueFact]) -> Vec<(NaiveDate, f64)> {
    facts
        .iter()
        .filter_map(|f| {
            let month = f.subscription_month?;
            let value = f.monthly_recurring_revenue.as_ref()?.to_f64()?;
            Some((month, value))
        })
        .collect()
}

/// Forecast every historical month plus `periods` months after the last one.
pub fn forecast(facts: &[MonthlyRevenueFact], periods: u32) -> ForecastResult<Vec<ForecastPoint>> {
    let history = history_from_facts(facts);
    let model = ForecastModel::fit(&history)?;

    let mut months: Vec<NaiveDate> = history.iter().map(|(d, _)| *d).collect();
    months.sort();
    let last = months.last().copied().ok_or(ForecastError::NotEnoughData {
        needed: MIN_POINTS,
        found: 0,
    })?;

    for k in 1..=periods {
        let next = last
            .checked_add_months(Months::new(k))
            .ok_or_else(|| ForecastError::MonthOutOfRange(format!("{} + {} months", last, k)))?;
        months.push(next);
    }

    Ok(months.into_iter().map(|m| model.predict(m)).collect())
}

/// Read the mart, forecast, and replace the forecast relation.
pub fn run_forecast(
    warehouse: &Warehouse,
    settings: &Settings,
    periods: u32,
) -> PipelineResult<RelationInfo> {
    log_info(format!("Fetching revenue history from {}", settings.mart_relation()));
    let facts: Vec<MonthlyRevenueFact> = warehouse.read_rows(&settings.mart_relation())?;

    let skipped = facts.len() - history_from_facts(&facts).len();
    if skipped > 0 {
        log_warning(format!("{} mart rows without a month or revenue ignored", skipped));
    }

    log_info(format!("Fitting trend and seasonality, forecasting {} months", periods));
    let points = forecast(&facts, periods)?;

    let relation = settings.forecast_relation();
    let info = warehouse.write_table(&relation, &FORECAST_COLUMNS, &points, None)?;
    log_success(format!("Wrote {} rows to {}", info.row_count, relation));
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    fn month(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    fn fact(y: i32, m: u32, value: &str) -> MonthlyRevenueFact {
        MonthlyRevenueFact {
            subscription_month: Some(month(y, m)),
            monthly_recurring_revenue: Some(BigDecimal::from_str(value).unwrap()),
        }
    }

    #[test]
    fn test_run_forecast_writes_relation() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            warehouse_dir: dir.path().to_path_buf(),
            ..Settings::default()
        };
        let warehouse = settings.warehouse();

        let mut facts: Vec<_> = (1..=5).map(|m| fact(2024, m, "120.50")).collect();
        facts.push(MonthlyRevenueFact { subscription_month: None, monthly_recurring_revenue: None });
        warehouse
            .write_table(&settings.mart_relation(), &crate::transform::mart::MART_COLUMNS, &facts, None)
            .unwrap();

        let info = run_forecast(&warehouse, &settings, 6).unwrap();
        assert_eq!(info.relation.name, "fact_monthly_revenue_forecast");
        assert_eq!(info.row_count, 5 + 6);

        let points: Vec<ForecastPoint> = warehouse.read_rows(&settings.forecast_relation()).unwrap();
        assert_eq!(points.len(), 11);
        assert_eq!(points[10].subscription_month, month(2024, 11));
        assert!((points[10].forecasted_mrr - 120.5).abs() < 1e-6);
    }

    #[test]
    fn test_run_forecast_without_mart() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            warehouse_dir: dir.path().to_path_buf(),
            ..Settings::default()
        };
        assert!(run_forecast(&settings.warehouse(), &settings, 24).is_err());
        assert!(!settings.warehouse().exists(&settings.forecast_relation()));
    }

    #[test]
    fn test_linear_trend_is_recovered() {
        let facts: Vec<_> = (1..=6).map(|m| fact(2024, m, &(100 * m).to_string())).collect();
        let points = forecast(&facts, 3).unwrap();

        assert_eq!(points.len(), 9);
        assert_eq!(points[6].subscription_month, month(2024, 7));
        assert!((points[6].forecasted_mrr - 700.0).abs() < 1e-6);
        assert!((points[8].forecasted_mrr - 900.0).abs() < 1e-6);
        // perfect fit: zero-width interval
        assert!((points[8].yhat_upper - points[8].yhat_lower).abs() < 1e-6);
    }

    #[test]
    fn test_future_months_cross_year_boundary() {
        let facts = vec![fact(2024, 11, "10"), fact(2024, 12, "20")];
        let points = forecast(&facts, 2).unwrap();

        let months: Vec<_> = points.iter().map(|p| p.subscription_month).collect();
        assert_eq!(months, vec![month(2024, 11), month(2024, 12), month(2025, 1), month(2025, 2)]);
    }

    #[test]
    fn test_interval_widens_into_future() {
        let values = ["100", "130", "90", "160", "120", "170", "150", "200"];
        let facts: Vec<_> = values
            .iter()
            .enumerate()
            .map(|(i, v)| fact(2024, i as u32 + 1, v))
            .collect();
        let points = forecast(&facts, 12).unwrap();

        let width = |p: &ForecastPoint| p.yhat_upper - p.yhat_lower;
        assert!(width(&points[8]) > 0.0);
        assert!(width(&points[19]) > width(&points[8]));
        for p in &points {
            assert!(p.yhat_lower <= p.forecasted_mrr && p.forecasted_mrr <= p.yhat_upper);
        }
    }

    #[test]
    fn test_yearly_seasonality() {
        // flat level with a December spike, three years
        let mut facts = Vec::new();
        for y in 2021..=2023 {
            for m in 1..=12 {
                facts.push(fact(y, m, if m == 12 { "300" } else { "100" }));
            }
        }
        let model = ForecastModel::fit(&history_from_facts(&facts)).unwrap();

        let december = model.predict(month(2024, 12)).forecasted_mrr;
        let june = model.predict(month(2024, 6)).forecasted_mrr;
        assert!(december - june > 150.0);
    }

    #[test]
    fn test_short_history_has_no_seasonality() {
        let facts = vec![fact(2024, 1, "100"), fact(2024, 2, "100"), fact(2024, 3, "400")];
        let model = ForecastModel::fit(&history_from_facts(&facts)).unwrap();
        assert!(model.season.iter().all(|s| *s == 0.0));
        assert!(model.slope() > 0.0);
    }

    #[test]
    fn test_not_enough_data() {
        let facts = vec![
            fact(2024, 1, "100"),
            MonthlyRevenueFact { subscription_month: None, monthly_recurring_revenue: None },
        ];
        assert!(matches!(
            forecast(&facts, 24),
            Err(ForecastError::NotEnoughData { needed: 2, found: 1 })
        ));
    }
}
