//! Monitor configuration types.

use serde::{Deserialize, Serialize};

/// Top-level monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Forecast and rolling-statistic parameters.
    #[serde(default)]
    pub model: ModelConfig,

    /// Risk classification parameters.
    #[serde(default)]
    pub risk: RiskConfig,

    /// Artifact store location and keys.
    #[serde(default)]
    pub store: StoreConfig,
}

/// Forecaster and residual-engine parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Seasonal-naive lag in rows (7 = same weekday last week).
    #[serde(default = "default_season_length")]
    pub season_length: usize,

    /// Trailing window (rows) for the rolling residual mean/std.
    #[serde(default = "default_window")]
    pub window: usize,
}

impl ModelConfig {
    /// Row index of the first day with both a forecast and a full window.
    pub fn bootstrap_index(&self) -> usize {
        self.season_length + self.window - 1
    }

    /// Minimum number of rows before any output row exists.
    pub fn min_rows(&self) -> usize {
        self.bootstrap_index() + 1
    }
}

/// Which classification scheme assigns `risk_level`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RiskPolicy {
    /// Four tiers from |z| thresholds 1/2/3. Used by the daily pipeline.
    #[default]
    ZThreshold,
    /// Three tiers from a weighted residual/anomaly/volatility score.
    Composite,
}

impl RiskPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskPolicy::ZThreshold => "z_threshold",
            RiskPolicy::Composite => "composite",
        }
    }
}

/// Risk classification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    #[serde(default)]
    pub policy: RiskPolicy,

    /// Decimal places for floats written to CSV artifacts.
    #[serde(default = "default_decimals")]
    pub decimals: u32,

    /// Rolling window (rows) for demand volatility in the composite score.
    #[serde(default = "default_volatility_window")]
    pub volatility_window: usize,
}

/// Artifact store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory backing the local store.
    #[serde(default = "default_root")]
    pub root: String,

    /// Read-only source demand series (CSV: date, demand).
    #[serde(default = "default_source_key")]
    pub source_key: String,

    /// Full enriched history up to the cursor.
    #[serde(default = "default_history_key")]
    pub history_key: String,

    /// Single-row snapshot of the latest processed day.
    #[serde(default = "default_latest_key")]
    pub latest_key: String,

    /// Persisted cursor JSON.
    #[serde(default = "default_cursor_key")]
    pub cursor_key: String,
}

// ── Defaults ──────────────────────────────────────────────────────────

fn default_season_length() -> usize {
    7
}
fn default_window() -> usize {
    30
}

fn default_decimals() -> u32 {
    4
}
fn default_volatility_window() -> usize {
    7
}

fn default_root() -> String {
    "artifacts".into()
}
fn default_source_key() -> String {
    "demand.csv".into()
}
fn default_history_key() -> String {
    "daily_risk_output.csv".into()
}
fn default_latest_key() -> String {
    "latest_risk.csv".into()
}
fn default_cursor_key() -> String {
    "cursor.json".into()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            season_length: default_season_length(),
            window: default_window(),
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            policy: RiskPolicy::default(),
            decimals: default_decimals(),
            volatility_window: default_volatility_window(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            source_key: default_source_key(),
            history_key: default_history_key(),
            latest_key: default_latest_key(),
            cursor_key: default_cursor_key(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            risk: RiskConfig::default(),
            store: StoreConfig::default(),
        }
    }
}
