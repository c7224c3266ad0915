//! Configuration loader: merges env vars, .env file, and config.toml.

use common::config::{MonitorConfig, RiskPolicy};
use common::Error;
use std::path::Path;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

fn parse_int<T>(raw: &str, env_name: &str, min: T) -> Result<T, Error>
where
    T: std::str::FromStr + PartialOrd + std::fmt::Display,
{
    let parsed = raw
        .trim()
        .parse::<T>()
        .map_err(|_| Error::Config(format!("{env_name} must be an integer >= {min}")))?;
    if parsed < min {
        return Err(Error::Config(format!("{env_name} must be an integer >= {min}")));
    }
    Ok(parsed)
}

fn parse_policy(raw: &str) -> Result<RiskPolicy, Error> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "z_threshold" | "zscore" | "z" => Ok(RiskPolicy::ZThreshold),
        "composite" => Ok(RiskPolicy::Composite),
        _ => Err(Error::Config(
            "RISK_POLICY must be one of: z_threshold, composite".into(),
        )),
    }
}

pub fn validate_config(config: &MonitorConfig) -> Result<(), Error> {
    let mut issues: Vec<String> = Vec::new();

    if config.model.season_length == 0 {
        issues.push("model.season_length must be > 0".into());
    }
    if config.model.window < 2 {
        issues.push("model.window must be >= 2".into());
    }
    if config.risk.volatility_window < 2 {
        issues.push("risk.volatility_window must be >= 2".into());
    }
    if config.risk.decimals > 12 {
        issues.push("risk.decimals must be <= 12".into());
    }

    let store = &config.store;
    if store.root.trim().is_empty() {
        issues.push("store.root must not be empty".into());
    }
    let keys = [
        ("store.source_key", &store.source_key),
        ("store.history_key", &store.history_key),
        ("store.latest_key", &store.latest_key),
        ("store.cursor_key", &store.cursor_key),
    ];
    for (name, key) in keys {
        if key.trim().is_empty() {
            issues.push(format!("{name} must not be empty"));
        }
    }
    for (i, (name_a, key_a)) in keys.iter().enumerate() {
        for (name_b, key_b) in &keys[i + 1..] {
            if key_a == key_b {
                issues.push(format!("{name_a} and {name_b} must differ"));
            }
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "Invalid config:\n - {}",
            issues.join("\n - ")
        )))
    }
}

/// Apply `RISK_*` environment overrides through `lookup`.
fn apply_env_overrides(
    config: &mut MonitorConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), Error> {
    if let Some(dir) = lookup("RISK_ARTIFACTS_DIR") {
        config.store.root = dir;
    }
    if let Some(key) = lookup("RISK_SOURCE_KEY") {
        config.store.source_key = key;
    }
    if let Some(raw) = lookup("RISK_SEASON_LENGTH") {
        config.model.season_length = parse_int(&raw, "RISK_SEASON_LENGTH", 1)?;
    }
    if let Some(raw) = lookup("RISK_WINDOW") {
        config.model.window = parse_int(&raw, "RISK_WINDOW", 2)?;
    }
    if let Some(raw) = lookup("RISK_POLICY") {
        config.risk.policy = parse_policy(&raw)?;
    }
    if let Some(raw) = lookup("RISK_DECIMALS") {
        config.risk.decimals = parse_int(&raw, "RISK_DECIMALS", 0)?;
    }
    Ok(())
}

/// Load monitor configuration from environment and optional config file.
pub fn load_config(path: Option<&Path>) -> Result<MonitorConfig, Error> {
    // 1. Load .env file from project root or parent directories.
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    // 2. Start with defaults.
    let mut config = MonitorConfig::default();

    // 3. Config file: an explicit path must exist, the default is optional.
    let config_path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
    if path.is_some() || config_path.exists() {
        let contents = std::fs::read_to_string(config_path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", config_path.display(), e))
        })?;
        config = toml::from_str(&contents).map_err(|e| {
            Error::Config(format!("Failed to parse {}: {}", config_path.display(), e))
        })?;
    }

    // 4. Override with environment variables (highest priority).
    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;

    validate_config(&config)?;

    Ok(config)
}
