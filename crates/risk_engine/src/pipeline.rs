//! Batch enrichment: forecast → residual → rolling z-score → risk tier.
//!
//! [`enrich`] is a pure function of the rows it is given. The scheduler calls
//! it on the series truncated to the target date, so no state is carried
//! between runs beyond the raw series and the cursor.

use common::config::{ModelConfig, RiskConfig};
use common::{DemandPoint, EnrichedRow, RiskTier};

use crate::anomaly::{residual, rolling_stats, rolling_std_filled, z_score};
use crate::classifier::classify;
use crate::forecast::seasonal_naive;

/// Enrich every row that has a forecast and a full residual window.
///
/// Rows without a forecast (the first `season_length`) are dropped first; the
/// rolling window then counts only forecasted rows, so the first output row is
/// at position `season_length + window - 1` of `points`.
pub fn enrich(points: &[DemandPoint], model: &ModelConfig, risk: &RiskConfig) -> Vec<EnrichedRow> {
    let forecasts = seasonal_naive(points, model.season_length);

    let forecasted: Vec<(usize, f64)> = forecasts
        .iter()
        .enumerate()
        .filter_map(|(i, f)| f.map(|f| (i, f)))
        .collect();
    let residuals: Vec<f64> = forecasted
        .iter()
        .map(|&(i, f)| residual(points[i].demand, f))
        .collect();
    let stats = rolling_stats(&residuals, model.window);

    let mut positions = Vec::new();
    let mut rows = Vec::new();
    for ((&(i, forecast), &res), stat) in forecasted.iter().zip(&residuals).zip(stats) {
        let Some(stat) = stat else {
            continue;
        };
        positions.push(i);
        rows.push(EnrichedRow {
            date: points[i].date,
            demand: points[i].demand,
            forecast,
            residual: res,
            rolling_mean: stat.mean,
            rolling_std: stat.std,
            z_score: z_score(res, stat),
            risk_level: RiskTier::Low,
            anomaly_flag: 0,
            risk_score: None,
        });
    }

    let demand: Vec<f64> = points.iter().map(|p| p.demand as f64).collect();
    let volatility_all = rolling_std_filled(&demand, risk.volatility_window);
    let volatility: Vec<f64> = positions.iter().map(|&i| volatility_all[i]).collect();

    classify(risk.policy, &mut rows, &volatility);
    rows
}
