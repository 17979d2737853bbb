//! Tunable weights, thresholds and display sequences for churn analytics.
//!
//! Every magic number of the scoring heuristic lives here so it can be
//! tuned from `data/config/churn_model.json` without touching the
//! algorithm. `CrmConfig::default()` carries the stock values.

use crate::types::Score;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CrmConfig {
    pub model_version: String,
    /// Pins the scoring RNG. None = fresh entropy per request.
    pub rng_seed:      Option<u64>,
    pub scoring:       ScoringConfig,
    pub factors:       FactorConfig,
    pub risk_levels:   RiskThresholds,
    pub at_risk:       AtRiskConfig,
    pub metrics:       ChurnMetricsConfig,
    pub engagement:    EngagementConfig,
}

// ── Churn score ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoringConfig {
    /// Drop jitter and pick neutral factors deterministically.
    pub deterministic: bool,
    pub baseline:      f64,
    /// Half-width of the uniform jitter band.
    pub jitter:        f64,
    pub recency:       RecencyWeights,
    pub spend:         SpendWeights,
    pub support:       SupportWeights,
    pub deals:         DealWeights,
    pub activity:      ActivityWeights,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecencyWeights {
    pub no_order_penalty: f64,
    pub recent_days:      f64,
    pub recent_credit:    f64,
    pub warm_days:        f64,
    pub warm_credit:      f64,
    pub dormant_days:     f64,
    pub dormant_divisor:  f64,
    pub dormant_cap:      f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpendWeights {
    pub high_value_threshold: f64,
    pub high_value_credit:    f64,
    pub low_value_threshold:  f64,
    pub low_value_penalty:    f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SupportWeights {
    /// Strictly more open tickets than this is a heavy load.
    pub heavy_open_threshold:  usize,
    pub heavy_open_penalty:    f64,
    pub light_open_penalty:    f64,
    pub high_priority_penalty: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DealWeights {
    pub per_active_deal_credit: f64,
    pub credit_cap:             f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityWeights {
    pub no_activity_penalty: f64,
    pub per_activity_credit: f64,
    pub volume_cap:          usize,
    pub fresh_days:          f64,
    pub fresh_credit:        f64,
    pub stale_days:          f64,
    pub stale_divisor:       f64,
    pub stale_cap:           f64,
}

// ── Churn factors ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FactorConfig {
    pub long_inactive_days:           f64,
    pub inactive_days:                f64,
    pub no_deals_high_spend:          f64,
    pub low_value_threshold:          f64,
    pub many_tickets_threshold:       usize,
    pub competitor_order_age_days:    f64,
    /// Filler used when no negative signal fires. Never empty.
    pub neutral_phrases:              Vec<String>,
}

// ── Aggregates ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RiskThresholds {
    pub medium: Score,
    pub high:   Score,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AtRiskConfig {
    /// Share of the customer base reported as at risk.
    pub fraction: f64,
}

/// Where the dashboard's "current churn rate" comes from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ChurnRateSource {
    /// Share of customers scoring at or above the high-risk threshold.
    Live,
    /// A business-reported figure, independent of live scores.
    Reported { rate: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReasonShare {
    pub reason:     String,
    pub percentage: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChurnMetricsConfig {
    pub churn_rate_source:    ChurnRateSource,
    /// Oldest month first; its length sets the trend length.
    pub trend_base_rates:     Vec<f64>,
    pub trend_new_customers:  Vec<u32>,
    pub top_reason_count:     usize,
    /// Padding / fallback reasons. Percentages sum to 100.
    pub default_reasons:      Vec<ReasonShare>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngagementConfig {
    /// 0–100 satisfaction reported when no ticket carries a rating.
    pub default_satisfaction: f64,
}

impl CrmConfig {
    /// Load from the data/ directory.
    /// In tests, use CrmConfig::default().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/config/churn_model.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: CrmConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validate()?;
        log::info!("loaded churn model {} from {path}", config.model_version);
        Ok(config)
    }

    /// Reject configurations the analytics cannot honour.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.at_risk.fraction > 0.0 && self.at_risk.fraction <= 1.0) {
            anyhow::bail!("at_risk.fraction must be within (0, 1], got {}", self.at_risk.fraction);
        }
        if self.factors.neutral_phrases.is_empty() {
            anyhow::bail!("factors.neutral_phrases must not be empty");
        }
        if self.metrics.trend_base_rates.len() != self.metrics.trend_new_customers.len() {
            anyhow::bail!(
                "metrics trend sequences differ in length: {} rates vs {} new-customer counts",
                self.metrics.trend_base_rates.len(),
                self.metrics.trend_new_customers.len()
            );
        }
        if self.metrics.trend_base_rates.len() > 12 {
            anyhow::bail!("metrics trend is limited to 12 months");
        }
        let default_total: u32 = self.metrics.default_reasons.iter().map(|r| r.percentage).sum();
        if !self.metrics.default_reasons.is_empty() && default_total != 100 {
            anyhow::bail!("metrics.default_reasons percentages sum to {default_total}, expected 100");
        }
        if self.risk_levels.medium > self.risk_levels.high {
            anyhow::bail!("risk_levels.medium must not exceed risk_levels.high");
        }
        if self.scoring.recency.dormant_divisor <= 0.0 || self.scoring.activity.stale_divisor <= 0.0 {
            anyhow::bail!("scoring divisors must be positive");
        }
        Ok(())
    }
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            model_version: "1.0.0".into(),
            rng_seed:      None,
            scoring:       ScoringConfig::default(),
            factors:       FactorConfig::default(),
            risk_levels:   RiskThresholds::default(),
            at_risk:       AtRiskConfig::default(),
            metrics:       ChurnMetricsConfig::default(),
            engagement:    EngagementConfig::default(),
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            deterministic: false,
            baseline:      15.0,
            jitter:        3.0,
            recency: RecencyWeights {
                no_order_penalty: 18.0,
                recent_days:      30.0,
                recent_credit:    10.0,
                warm_days:        90.0,
                warm_credit:      5.0,
                dormant_days:     180.0,
                dormant_divisor:  10.0,
                dormant_cap:      25.0,
            },
            spend: SpendWeights {
                high_value_threshold: 50_000.0,
                high_value_credit:    8.0,
                low_value_threshold:  10_000.0,
                low_value_penalty:    5.0,
            },
            support: SupportWeights {
                heavy_open_threshold:  2,
                heavy_open_penalty:    15.0,
                light_open_penalty:    8.0,
                high_priority_penalty: 7.0,
            },
            deals: DealWeights {
                per_active_deal_credit: 4.0,
                credit_cap:             12.0,
            },
            activity: ActivityWeights {
                no_activity_penalty: 20.0,
                per_activity_credit: 1.0,
                volume_cap:          8,
                fresh_days:          7.0,
                fresh_credit:        10.0,
                stale_days:          60.0,
                stale_divisor:       15.0,
                stale_cap:           12.0,
            },
        }
    }
}

impl Default for FactorConfig {
    fn default() -> Self {
        Self {
            long_inactive_days:        180.0,
            inactive_days:             90.0,
            no_deals_high_spend:       20_000.0,
            low_value_threshold:       10_000.0,
            many_tickets_threshold:    3,
            competitor_order_age_days: 60.0,
            neutral_phrases: vec![
                "Regular engagement patterns".into(),
                "Healthy customer relationship".into(),
                "Normal usage behavior".into(),
                "Stable account health".into(),
            ],
        }
    }
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self { medium: 30, high: 70 }
    }
}

impl Default for AtRiskConfig {
    fn default() -> Self {
        Self { fraction: 0.15 }
    }
}

impl Default for ChurnMetricsConfig {
    fn default() -> Self {
        Self {
            churn_rate_source:   ChurnRateSource::Live,
            trend_base_rates:    vec![3.2, 3.5, 3.8, 4.0, 4.2, 3.9],
            trend_new_customers: vec![24, 21, 18, 16, 19, 22],
            top_reason_count:    5,
            default_reasons: [
                ("Price Concerns", 35),
                ("Competitor Offers", 25),
                ("Product Features", 20),
                ("Customer Service", 12),
                ("Other", 8),
            ]
            .into_iter()
            .map(|(reason, percentage)| ReasonShare { reason: reason.into(), percentage })
            .collect(),
        }
    }
}

impl Default for EngagementConfig {
    fn default() -> Self {
        Self { default_satisfaction: 80.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        CrmConfig::default().validate().expect("stock config must validate");
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg: CrmConfig = serde_json::from_str(
            r#"{"at_risk":{"fraction":0.25},"metrics":{"churn_rate_source":{"source":"reported","rate":6.5}}}"#,
        )
        .unwrap();
        assert_eq!(cfg.at_risk.fraction, 0.25);
        assert_eq!(cfg.metrics.churn_rate_source, ChurnRateSource::Reported { rate: 6.5 });
        assert_eq!(cfg.metrics.trend_base_rates.len(), 6);
        assert_eq!(cfg.scoring.baseline, 15.0);
    }

    #[test]
    fn out_of_range_fraction_is_rejected() {
        let mut cfg = CrmConfig::default();
        cfg.at_risk.fraction = 0.0;
        assert!(cfg.validate().is_err());
    }
}
