//! Read-only projections over the persisted risk artifacts.

use serde::Serialize;

use artifact_store::{decode_enriched, ArtifactStore};
use common::config::StoreConfig;
use common::{EnrichedRow, Error, Result, RiskTier};

/// Headline figures across the full history artifact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskSummary {
    pub latest: EnrichedRow,
    pub days: usize,
    pub anomalies: usize,
    pub tiers: TierCounts,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TierCounts {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub critical: usize,
}

impl TierCounts {
    fn add(&mut self, tier: RiskTier) {
        match tier {
            RiskTier::Low => self.low += 1,
            RiskTier::Medium => self.medium += 1,
            RiskTier::High => self.high += 1,
            RiskTier::Critical => self.critical += 1,
        }
    }
}

pub struct RiskQuery<S> {
    store: S,
    history_key: String,
    latest_key: String,
}

impl<S: ArtifactStore> RiskQuery<S> {
    pub fn new(store: S, keys: &StoreConfig) -> Self {
        Self {
            store,
            history_key: keys.history_key.clone(),
            latest_key: keys.latest_key.clone(),
        }
    }

    fn load(&self, key: &str, what: &str) -> Result<Vec<EnrichedRow>> {
        match self.store.get(key) {
            Ok(bytes) => decode_enriched(&bytes),
            Err(Error::NotFound(_)) => Err(Error::NotYetAvailable(format!("no {what} found"))),
            Err(e) => Err(e),
        }
    }

    /// The most recently processed day.
    pub fn latest(&self) -> Result<EnrichedRow> {
        self.load(&self.latest_key, "risk data")?
            .pop()
            .ok_or_else(|| Error::NotYetAvailable("no risk data found".into()))
    }

    /// Last `limit` days, most recent first.
    pub fn history(&self, limit: usize) -> Result<Vec<EnrichedRow>> {
        let rows = self.load(&self.history_key, "risk history")?;
        Ok(rows.into_iter().rev().take(limit).collect())
    }

    /// Last `limit` anomalous days, most recent first.
    pub fn anomalies(&self, limit: usize) -> Result<Vec<EnrichedRow>> {
        let rows = self.load(&self.history_key, "risk history")?;
        Ok(rows
            .into_iter()
            .rev()
            .filter(EnrichedRow::is_anomaly)
            .take(limit)
            .collect())
    }

    pub fn summary(&self) -> Result<RiskSummary> {
        let latest = self.latest()?;
        let rows = self.load(&self.history_key, "risk history")?;
        let mut tiers = TierCounts::default();
        for row in &rows {
            tiers.add(row.risk_level);
        }
        Ok(RiskSummary {
            latest,
            days: rows.len(),
            anomalies: rows.iter().filter(|r| r.is_anomaly()).count(),
            tiers,
        })
    }
}
