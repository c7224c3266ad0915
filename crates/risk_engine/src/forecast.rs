//! Seasonal-naive forecaster.
//!
//! The forecast for a day is the demand exactly one season earlier
//! (same weekday last week for `season_length = 7`). Days without that much
//! history have no forecast and never reach the output.

use chrono::NaiveDate;
use common::DemandPoint;

/// Forecast for every row of `points`; `None` for the first `season_length` rows.
pub fn seasonal_naive(points: &[DemandPoint], season_length: usize) -> Vec<Option<f64>> {
    (0..points.len())
        .map(|i| forecast_at_position(points, i, season_length))
        .collect()
}

/// Forecast for `target` given the history known up to it.
///
/// Returns `None` if `target` is not in `history` or has fewer than
/// `season_length` prior rows.
pub fn forecast(history: &[DemandPoint], target: NaiveDate, season_length: usize) -> Option<f64> {
    let idx = history.binary_search_by_key(&target, |p| p.date).ok()?;
    forecast_at_position(history, idx, season_length)
}

fn forecast_at_position(points: &[DemandPoint], idx: usize, season_length: usize) -> Option<f64> {
    if season_length == 0 {
        return None;
    }
    let lag = idx.checked_sub(season_length)?;
    points.get(lag).map(|p| p.demand as f64)
}
