//! Domain types shared across the monitor.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

use crate::Error;

/// Date format used by every artifact.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse a date from a string whose first 10 characters are `YYYY-MM-DD`.
///
/// Timestamps such as `2024-01-05 00:00:00` are accepted and truncated.
pub fn parse_date(raw: &str) -> Result<NaiveDate, chrono::ParseError> {
    let raw = raw.trim();
    let head = raw.get(..raw.len().min(10)).unwrap_or(raw);
    NaiveDate::parse_from_str(head, DATE_FORMAT)
}

fn deserialize_naive_date<'de, D>(d: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(d)?;
    parse_date(&s).map_err(serde::de::Error::custom)
}

fn deserialize_opt_naive_date<'de, D>(d: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(d)?;
    match opt {
        Some(s) if !s.trim().is_empty() => parse_date(&s)
            .map(Some)
            .map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}

// ── Demand Series ─────────────────────────────────────────────────────

/// One day of observed demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemandPoint {
    #[serde(deserialize_with = "deserialize_naive_date")]
    pub date: NaiveDate,
    pub demand: u64,
}

impl DemandPoint {
    pub fn new(date: NaiveDate, demand: u64) -> Self {
        Self { date, demand }
    }
}

/// Date-ordered demand history with unique dates.
///
/// Rolling windows operate on row position, so gaps between dates are allowed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DemandSeries {
    points: Vec<DemandPoint>,
}

impl DemandSeries {
    /// Build a series, sorting by date and rejecting duplicate dates.
    pub fn from_points(mut points: Vec<DemandPoint>) -> Result<Self, Error> {
        points.sort_by_key(|p| p.date);
        if let Some(pair) = points.windows(2).find(|w| w[0].date == w[1].date) {
            return Err(Error::InvalidSeries(format!(
                "duplicate date {}",
                pair[0].date.format(DATE_FORMAT)
            )));
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[DemandPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Date at a 0-based row position.
    pub fn date_at(&self, index: usize) -> Option<NaiveDate> {
        self.points.get(index).map(|p| p.date)
    }

    /// Row position of the earliest date strictly after `date`.
    pub fn position_after(&self, date: NaiveDate) -> Option<usize> {
        let idx = self.points.partition_point(|p| p.date <= date);
        (idx < self.points.len()).then_some(idx)
    }

    /// All rows with `date <= cutoff` (what was known as of that day).
    pub fn through(&self, cutoff: NaiveDate) -> &[DemandPoint] {
        let idx = self.points.partition_point(|p| p.date <= cutoff);
        &self.points[..idx]
    }
}

// ── Risk Tiers ────────────────────────────────────────────────────────

/// Discrete severity of a day's demand deviation.
///
/// The composite-score policy only produces `Low`, `Medium` and `High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskTier {
    pub const ALL: [RiskTier; 4] = [
        RiskTier::Low,
        RiskTier::Medium,
        RiskTier::High,
        RiskTier::Critical,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RiskTier::Low => "LOW",
            RiskTier::Medium => "MEDIUM",
            RiskTier::High => "HIGH",
            RiskTier::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskTier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Ok(RiskTier::Low),
            "MEDIUM" => Ok(RiskTier::Medium),
            "HIGH" => Ok(RiskTier::High),
            "CRITICAL" => Ok(RiskTier::Critical),
            other => Err(Error::InvalidSeries(format!("unknown risk level {other:?}"))),
        }
    }
}

// ── Enriched Output ───────────────────────────────────────────────────

/// A day with forecast, residual statistics, and its risk classification.
///
/// Only rows with a defined forecast and a full trailing window exist.
/// `z_score` is `None` when the trailing window has zero variance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRow {
    #[serde(deserialize_with = "deserialize_naive_date")]
    pub date: NaiveDate,
    pub demand: u64,
    pub forecast: f64,
    pub residual: f64,
    pub rolling_mean: f64,
    pub rolling_std: f64,
    #[serde(default)]
    pub z_score: Option<f64>,
    pub risk_level: RiskTier,
    pub anomaly_flag: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<f64>,
}

impl EnrichedRow {
    pub fn is_anomaly(&self) -> bool {
        self.anomaly_flag == 1
    }
}

// ── Cursor ────────────────────────────────────────────────────────────

/// Persisted marker of the last fully processed date.
///
/// `last_processed_date == None` means the pipeline has never run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    #[serde(default, deserialize_with = "deserialize_opt_naive_date")]
    pub last_processed_date: Option<NaiveDate>,
}

impl Cursor {
    pub fn at(date: NaiveDate) -> Self {
        Self {
            last_processed_date: Some(date),
        }
    }

    pub fn label(&self) -> String {
        self.last_processed_date
            .map(|d| d.format(DATE_FORMAT).to_string())
            .unwrap_or_else(|| "never".to_string())
    }
}
