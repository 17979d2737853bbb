//! Churn scoring: multi-factor customer retention heuristic.
//!
//! This module:
//!   1. Computes a 0–100 churn score from five weighted signals
//!      (order recency, spend tier, support load, deal engagement,
//!      activity recency / volume) plus a small jitter term
//!   2. Derives the human-readable risk factors shown next to a score
//!   3. Buckets scores into low / medium / high risk levels
//!
//! Both entry points are total: empty related-record lists and a missing
//! last order date have defined contributions, nothing returns an error.
//! All randomness flows through the caller's ScoringRng.

use crate::{
    config::{CrmConfig, FactorConfig, RiskThresholds, ScoringConfig},
    entity::{days_between, days_since_date, ActivityLog, Customer, CustomerStatus, Deal, DealStage, Ticket, TicketPriority, TicketStatus},
    rng::ScoringRng,
    types::{EntityId, EntityRef, Score},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Public types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChurnScore {
    pub customer_id:        EntityId,
    pub score:              Score,
    /// Unclamped sum of baseline, components and jitter.
    pub raw:                f64,
    // Components (positive = more risk)
    pub baseline:           f64,
    pub recency_component:  f64,
    pub spend_component:    f64,
    pub support_component:  f64,
    pub deal_component:     f64,
    pub activity_component: f64,
    pub jitter:             f64,
}

/// Everything known about one customer that feeds its score.
#[derive(Debug, Clone, Copy)]
pub struct CustomerSignals<'a> {
    pub customer:   &'a Customer,
    pub deals:      &'a [Deal],
    pub tickets:    &'a [Ticket],
    pub activities: &'a [ActivityLog],
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_score(score: Score, thresholds: &RiskThresholds) -> Self {
        if score >= thresholds.high {
            Self::High
        } else if score >= thresholds.medium {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Low    => "Low Risk",
            Self::Medium => "Medium Risk",
            Self::High   => "High Risk",
        }
    }
}

// ── Engine ───────────────────────────────────────────────────────────────────

pub struct ScoreEngine<'c> {
    scoring: &'c ScoringConfig,
    factors: &'c FactorConfig,
}

impl<'c> ScoreEngine<'c> {
    pub fn new(config: &'c CrmConfig) -> Self {
        Self {
            scoring: &config.scoring,
            factors: &config.factors,
        }
    }

    pub fn churn_score(
        &self,
        signals: &CustomerSignals<'_>,
        now: DateTime<Utc>,
        rng: &mut ScoringRng,
    ) -> ChurnScore {
        let customer = signals.customer;

        let recency_component  = self.recency_component(customer, now);
        let spend_component    = self.spend_component(customer);
        let support_component  = self.support_component(signals.tickets);
        let deal_component     = self.deal_component(signals.deals);
        let activity_component = self.activity_component(customer.id, signals.activities, now);

        let jitter = if self.scoring.deterministic || self.scoring.jitter <= 0.0 {
            0.0
        } else {
            rng.uniform(-self.scoring.jitter, self.scoring.jitter)
        };

        let raw = self.scoring.baseline
            + recency_component
            + spend_component
            + support_component
            + deal_component
            + activity_component
            + jitter;

        let score = raw.clamp(0.0, 100.0).round() as Score;

        log::trace!(
            "churn score customer={} score={score} raw={raw:.2} (recency={recency_component:.1} spend={spend_component:.1} support={support_component:.1} deals={deal_component:.1} activity={activity_component:.1} jitter={jitter:.2})",
            customer.id,
        );

        ChurnScore {
            customer_id: customer.id,
            score,
            raw,
            baseline: self.scoring.baseline,
            recency_component,
            spend_component,
            support_component,
            deal_component,
            activity_component,
            jitter,
        }
    }

    fn recency_component(&self, customer: &Customer, now: DateTime<Utc>) -> f64 {
        let w = &self.scoring.recency;
        let Some(last_order) = customer.last_order_date else {
            return w.no_order_penalty;
        };

        let days = days_since_date(last_order, now);
        if days < w.recent_days {
            -w.recent_credit
        } else if days <= w.warm_days {
            -w.warm_credit
        } else if days > w.dormant_days {
            ((days - w.dormant_days) / w.dormant_divisor).min(w.dormant_cap)
        } else {
            0.0
        }
    }

    fn spend_component(&self, customer: &Customer) -> f64 {
        let w = &self.scoring.spend;
        if customer.total_spent > w.high_value_threshold {
            -w.high_value_credit
        } else if customer.total_spent < w.low_value_threshold {
            w.low_value_penalty
        } else {
            0.0
        }
    }

    fn support_component(&self, tickets: &[Ticket]) -> f64 {
        let w = &self.scoring.support;

        let open = tickets.iter().filter(|t| t.status.is_unresolved()).count();
        let load = if open > w.heavy_open_threshold {
            w.heavy_open_penalty
        } else if open >= 1 {
            w.light_open_penalty
        } else {
            0.0
        };

        let high_priority = tickets
            .iter()
            .filter(|t| t.priority == TicketPriority::High && t.status != TicketStatus::Closed)
            .count();

        load + high_priority as f64 * w.high_priority_penalty
    }

    fn deal_component(&self, deals: &[Deal]) -> f64 {
        let w = &self.scoring.deals;
        let active = deals.iter().filter(|d| d.stage.is_active()).count();
        -(active as f64 * w.per_active_deal_credit).min(w.credit_cap)
    }

    fn activity_component(
        &self,
        customer_id: EntityId,
        activities: &[ActivityLog],
        now: DateTime<Utc>,
    ) -> f64 {
        let w = &self.scoring.activity;
        let target = EntityRef::customer(customer_id);

        let mut count = 0usize;
        let mut latest: Option<DateTime<Utc>> = None;
        for a in activities.iter().filter(|a| a.related_to == target) {
            count += 1;
            latest = Some(latest.map_or(a.created_at, |l| l.max(a.created_at)));
        }

        let Some(latest) = latest else {
            return w.no_activity_penalty;
        };

        let mut component = -(count.min(w.volume_cap) as f64 * w.per_activity_credit);

        let days = days_between(latest, now);
        if days < w.fresh_days {
            component -= w.fresh_credit;
        } else if days > w.stale_days {
            component += (days / w.stale_divisor).min(w.stale_cap);
        }
        component
    }

    /// Human-readable risk explanations in check order. Never empty.
    pub fn churn_factors(
        &self,
        customer: &Customer,
        deals: &[Deal],
        tickets: &[Ticket],
        now: DateTime<Utc>,
        rng: &mut ScoringRng,
    ) -> Vec<String> {
        let f = self.factors;
        let mut factors = Vec::new();

        let order_age = customer.last_order_date.map(|d| days_since_date(d, now));
        match order_age {
            None => factors.push("No purchase history".to_string()),
            Some(days) if days > f.long_inactive_days => {
                factors.push("Inactive for 6+ months".to_string())
            }
            Some(days) if days > f.inactive_days => {
                factors.push("No orders in past 3 months".to_string())
            }
            Some(_) => {}
        }

        let open_tickets = tickets.iter().filter(|t| t.status.is_unresolved()).count();
        let critical_open = tickets
            .iter()
            .any(|t| t.priority == TicketPriority::High && t.status.is_unresolved());
        if critical_open {
            factors.push("Unresolved critical issues".to_string());
        } else if open_tickets > 1 {
            factors.push("Multiple unresolved support requests".to_string());
        }

        let lost_deals = deals.iter().filter(|d| d.stage == DealStage::Lost).count();
        if lost_deals > 1 {
            factors.push(format!("Recent deal losses ({lost_deals})"));
        }

        let active_deals = deals.iter().filter(|d| d.stage.is_active()).count();
        if active_deals == 0 && customer.total_spent > f.no_deals_high_spend {
            factors.push("No active opportunities despite high spend".to_string());
        }

        if customer.total_spent < f.low_value_threshold && customer.status == CustomerStatus::Inactive {
            factors.push("Low value & inactive account".to_string());
        }

        if tickets.len() > f.many_tickets_threshold && open_tickets >= 1 {
            factors.push("Multiple support interactions".to_string());
        }

        let stale_order = order_age.is_some_and(|days| days > f.competitor_order_age_days);
        if lost_deals >= 1 && stale_order {
            factors.push("Possible competitor engagement".to_string());
        }

        if factors.is_empty() {
            factors.push(self.neutral_factor(rng));
        }
        factors
    }

    fn neutral_factor(&self, rng: &mut ScoringRng) -> String {
        let phrases = &self.factors.neutral_phrases;
        let picked = if self.scoring.deterministic {
            phrases.first()
        } else {
            rng.pick(phrases)
        };
        picked
            .cloned()
            .unwrap_or_else(|| "Stable account health".to_string())
    }

    /// True for the filler phrases that carry no churn signal.
    pub fn is_neutral(&self, factor: &str) -> bool {
        self.factors.neutral_phrases.iter().any(|p| p == factor)
    }
}
