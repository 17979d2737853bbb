//! Sales pipeline aggregation over deals.

use crate::entity::{Deal, DealStage};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StageBreakdown {
    pub stage:       DealStage,
    pub count:       usize,
    pub value:       f64,
    /// Share of total pipeline value, percent.
    pub value_share: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSummary {
    pub stages:            Vec<StageBreakdown>,
    pub total_deals:       usize,
    pub total_value:       f64,
    pub open_value:        f64,
    pub weighted_forecast: f64,
    /// closed / (closed + lost), percent. 0 when nothing has settled.
    pub win_rate:          f64,
}

impl PipelineSummary {
    pub fn from_deals(deals: &[Deal]) -> Self {
        let total_value: f64 = deals.iter().map(|d| d.value).sum();

        let stages = DealStage::ALL
            .iter()
            .map(|&stage| {
                let (count, value) = deals
                    .iter()
                    .filter(|d| d.stage == stage)
                    .fold((0usize, 0.0f64), |(n, v), d| (n + 1, v + d.value));
                StageBreakdown {
                    stage,
                    count,
                    value,
                    value_share: if total_value > 0.0 {
                        round2(value / total_value * 100.0)
                    } else {
                        0.0
                    },
                }
            })
            .collect();

        let active = deals.iter().filter(|d| d.stage.is_active());
        let open_value: f64 = active.clone().map(|d| d.value).sum();
        let weighted_forecast: f64 = active
            .map(|d| d.value * f64::from(d.probability) / 100.0)
            .sum();

        let won = deals.iter().filter(|d| d.stage.is_won()).count();
        let lost = deals.iter().filter(|d| d.stage == DealStage::Lost).count();
        let win_rate = if won + lost == 0 {
            0.0
        } else {
            round2(won as f64 / (won + lost) as f64 * 100.0)
        };

        Self {
            stages,
            total_deals: deals.len(),
            total_value,
            open_value,
            weighted_forecast: round2(weighted_forecast),
            win_rate,
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
