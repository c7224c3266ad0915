//! Residuals and trailing-window statistics.
//!
//! All windows are trailing and inclusive (`t - window + 1 ..= t`) and count
//! rows, not calendar days. Standard deviations use the sample (N-1)
//! denominator.

/// Offset added to the denominator when normalising a whole series.
pub const NORMALIZE_EPSILON: f64 = 1e-6;

/// Mean and sample standard deviation of one trailing window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    pub mean: f64,
    pub std: f64,
}

pub fn residual(demand: u64, forecast: f64) -> f64 {
    demand as f64 - forecast
}

/// Sample mean and std. `None` for fewer than two values.
pub fn sample_mean_std(values: &[f64]) -> Option<WindowStats> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let sq_diff: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    Some(WindowStats {
        mean,
        std: (sq_diff / (n - 1.0)).sqrt(),
    })
}

/// Rolling statistics for every position; `None` until `window` values exist.
pub fn rolling_stats(values: &[f64], window: usize) -> Vec<Option<WindowStats>> {
    (0..values.len())
        .map(|t| {
            if window == 0 || t + 1 < window {
                return None;
            }
            sample_mean_std(&values[t + 1 - window..=t])
        })
        .collect()
}

/// Rolling sample std with undefined positions filled with 0.
pub fn rolling_std_filled(values: &[f64], window: usize) -> Vec<f64> {
    rolling_stats(values, window)
        .into_iter()
        .map(|s| s.map(|s| s.std).unwrap_or(0.0))
        .collect()
}

/// Deviation of `value` from the window mean in units of the window std.
///
/// Returns `None` when the window has zero variance: the ratio is not finite
/// and the day carries no deviation signal.
pub fn z_score(value: f64, stats: WindowStats) -> Option<f64> {
    if !stats.std.is_finite() || stats.std <= f64::EPSILON * stats.mean.abs().max(1.0) {
        return None;
    }
    let z = (value - stats.mean) / stats.std;
    z.is_finite().then_some(z)
}

/// Whole-series standardisation: `(x - mean) / (std + 1e-6)`.
///
/// Uses the sample std; a single value normalises to 0.
pub fn normalize(values: &[f64]) -> Vec<f64> {
    let (mean, std) = match sample_mean_std(values) {
        Some(s) => (s.mean, s.std),
        None => (values.first().copied().unwrap_or(0.0), 0.0),
    };
    values
        .iter()
        .map(|v| (v - mean) / (std + NORMALIZE_EPSILON))
        .collect()
}
