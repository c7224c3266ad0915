//! Risk classification policies.
//!
//! Two schemes share one entry point, [`classify`]:
//!
//! - `z_threshold` (default): `|z| < 1` LOW, `< 2` MEDIUM, `< 3` HIGH, else
//!   CRITICAL.
//! - `composite`: `0.5·|norm(residual)| + 0.3·anomaly_flag + 0.2·norm(volatility)`,
//!   then `< 0.5` LOW, `<= 1.2` MEDIUM, else HIGH.
//!
//! Both policies flag an anomaly when `|z| >= 2`. A row without a z-score
//! (zero-variance window) is LOW and not an anomaly under the z policy.

use common::config::RiskPolicy;
use common::{EnrichedRow, RiskTier};

use crate::anomaly::normalize;

/// |z| at or above which a day is an anomaly.
pub const ANOMALY_Z: f64 = 2.0;

const MEDIUM_Z: f64 = 1.0;
const CRITICAL_Z: f64 = 3.0;

const COMPOSITE_MEDIUM: f64 = 0.5;
const COMPOSITE_HIGH: f64 = 1.2;

const WEIGHT_RESIDUAL: f64 = 0.5;
const WEIGHT_ANOMALY: f64 = 0.3;
const WEIGHT_VOLATILITY: f64 = 0.2;

/// Tier for a z-score. NaN maps to LOW.
pub fn assign_tier(z: f64) -> RiskTier {
    let magnitude = z.abs();
    if magnitude.is_nan() || magnitude < MEDIUM_Z {
        RiskTier::Low
    } else if magnitude < ANOMALY_Z {
        RiskTier::Medium
    } else if magnitude < CRITICAL_Z {
        RiskTier::High
    } else {
        RiskTier::Critical
    }
}

/// `1` iff `|z| >= 2`.
pub fn anomaly_flag(z: f64) -> u8 {
    u8::from(z.abs() >= ANOMALY_Z)
}

/// Tier for a composite risk score. NaN maps to LOW.
pub fn assign_composite_tier(score: f64) -> RiskTier {
    if score.is_nan() || score < COMPOSITE_MEDIUM {
        RiskTier::Low
    } else if score <= COMPOSITE_HIGH {
        RiskTier::Medium
    } else {
        RiskTier::High
    }
}

/// Weighted composite scores for `rows`.
///
/// Residuals and volatilities are normalised across the whole slice, so a
/// row's score depends on every row passed in. `volatility[i]` belongs to
/// `rows[i]`.
pub fn composite_scores(rows: &[EnrichedRow], volatility: &[f64]) -> Vec<f64> {
    let residuals: Vec<f64> = rows.iter().map(|r| r.residual).collect();
    let norm_residual = normalize(&residuals);
    let norm_volatility = normalize(volatility);

    rows.iter()
        .zip(norm_residual)
        .zip(norm_volatility)
        .map(|((row, res), vol)| {
            WEIGHT_RESIDUAL * res.abs()
                + WEIGHT_ANOMALY * f64::from(row.anomaly_flag)
                + WEIGHT_VOLATILITY * vol
        })
        .collect()
}

/// Set `anomaly_flag`, `risk_level` and (composite only) `risk_score` on every row.
pub fn classify(policy: RiskPolicy, rows: &mut [EnrichedRow], volatility: &[f64]) {
    for row in rows.iter_mut() {
        row.anomaly_flag = row.z_score.map(anomaly_flag).unwrap_or(0);
    }

    match policy {
        RiskPolicy::ZThreshold => {
            for row in rows.iter_mut() {
                row.risk_level = row.z_score.map(assign_tier).unwrap_or(RiskTier::Low);
                row.risk_score = None;
            }
        }
        RiskPolicy::Composite => {
            let scores = composite_scores(rows, volatility);
            for (row, score) in rows.iter_mut().zip(scores) {
                row.risk_level = assign_composite_tier(score);
                row.risk_score = Some(score);
            }
        }
    }
}
