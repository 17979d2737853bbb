//! Churn analytics: aggregate views built on the score engine.
//!
//! This service:
//!   1. Scores every customer and returns the top at-risk slice
//!   2. Builds the dashboard churn summary (rate, trend, top reasons)
//!   3. Joins one customer's deals / tickets / activities into an
//!      engagement summary with lifetime value and churn explanation
//!
//! Reads only, through `CrmRead`. Each call recomputes from scratch.

use crate::{
    churn_score::{ChurnScore, CustomerSignals, RiskLevel, ScoreEngine},
    config::{ChurnRateSource, CrmConfig},
    entity::{days_between, ActivityLog, Customer, Deal, Ticket},
    error::CrmResult,
    rng::ScoringRng,
    store::CrmRead,
    types::{EntityId, EntityRef, Score},
};
use chrono::{DateTime, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ── Public types ─────────────────────────────────────────────────────────────

/// A customer record annotated with its current churn score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScoredCustomer {
    #[serde(flatten)]
    pub customer:   Customer,
    pub churn_risk: Score,
    pub risk_level: RiskLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyChurnPoint {
    pub month:          String,
    pub churn_rate:     String,
    pub new_customers:  u32,
    pub lost_customers: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChurnReason {
    pub reason:     String,
    pub percentage: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChurnMetricsSummary {
    pub current_churn_rate: String,
    pub total_customers:    usize,
    pub at_risk_count:      usize,
    pub at_risk_percentage: String,
    pub monthly_churn:      Vec<MonthlyChurnPoint>,
    pub top_churn_reasons:  Vec<ChurnReason>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CustomerValue {
    pub total_spent:    f64,
    /// Open pipeline value (active deals only).
    pub deal_value:     f64,
    pub lifetime_value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySummary {
    pub total_deals:   usize,
    pub active_deals:  usize,
    pub won_deals:     usize,
    pub total_tickets: usize,
    /// Whole days since the latest activity; None if there is none.
    pub last_activity: Option<i64>,
    pub interactions:  usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SupportSummary {
    pub open_tickets:            usize,
    pub avg_response_time_hours: f64,
    /// 0–100.
    pub satisfaction:            f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChurnRiskSummary {
    pub score:      Score,
    pub risk_level: RiskLevel,
    pub last_order: Option<NaiveDate>,
    pub factors:    Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EngagementSummary {
    pub customer_id:    EntityId,
    pub customer_value: CustomerValue,
    pub activity:       ActivitySummary,
    pub support:        SupportSummary,
    pub churn_risk:     ChurnRiskSummary,
}

/// One customer together with the records that feed its score.
#[derive(Debug, Clone)]
pub struct CustomerRecords {
    pub customer:   Customer,
    pub deals:      Vec<Deal>,
    pub tickets:    Vec<Ticket>,
    pub activities: Vec<ActivityLog>,
}

impl CustomerRecords {
    pub fn signals(&self) -> CustomerSignals<'_> {
        CustomerSignals {
            customer:   &self.customer,
            deals:      &self.deals,
            tickets:    &self.tickets,
            activities: &self.activities,
        }
    }
}

// ── Service ──────────────────────────────────────────────────────────────────

pub struct ChurnAnalytics<'a, S: CrmRead + ?Sized> {
    store:  &'a S,
    config: &'a CrmConfig,
    engine: ScoreEngine<'a>,
}

impl<'a, S: CrmRead + ?Sized> ChurnAnalytics<'a, S> {
    pub fn new(store: &'a S, config: &'a CrmConfig) -> Self {
        Self {
            store,
            config,
            engine: ScoreEngine::new(config),
        }
    }

    pub fn engine(&self) -> &ScoreEngine<'a> {
        &self.engine
    }

    fn records_for(&self, customer: Customer) -> CrmResult<CustomerRecords> {
        let deals = self.store.list_deals_by_customer(customer.id)?;
        let tickets = self.store.list_tickets_by_customer(customer.id)?;
        let activities = self
            .store
            .list_activities_by_relation(EntityRef::customer(customer.id))?;
        Ok(CustomerRecords { customer, deals, tickets, activities })
    }

    /// Every customer with its score, in store order.
    pub fn score_all(
        &self,
        now: DateTime<Utc>,
        rng: &mut ScoringRng,
    ) -> CrmResult<Vec<(CustomerRecords, ChurnScore)>> {
        let customers = self.store.list_customers()?;
        let mut scored = Vec::with_capacity(customers.len());
        for customer in customers {
            let records = self.records_for(customer)?;
            let score = self.engine.churn_score(&records.signals(), now, rng);
            scored.push((records, score));
        }
        log::debug!("analytics: scored {} customers", scored.len());
        Ok(scored)
    }

    /// The highest-scoring `ceil(N × fraction)` customers, riskiest first.
    pub fn customers_with_churn_risk(
        &self,
        now: DateTime<Utc>,
        rng: &mut ScoringRng,
    ) -> CrmResult<Vec<ScoredCustomer>> {
        let mut scored = self.score_all(now, rng)?;
        let keep = at_risk_count(scored.len(), self.config.at_risk.fraction);

        sort_riskiest_first(&mut scored);
        let at_risk: Vec<ScoredCustomer> = scored
            .into_iter()
            .take(keep)
            .map(|(records, score)| ScoredCustomer {
                risk_level: RiskLevel::from_score(score.score, &self.config.risk_levels),
                churn_risk: score.score,
                customer:   records.customer,
            })
            .collect();

        log::info!("analytics: {} customers flagged at risk", at_risk.len());
        Ok(at_risk)
    }

    pub fn churn_metrics(
        &self,
        now: DateTime<Utc>,
        rng: &mut ScoringRng,
    ) -> CrmResult<ChurnMetricsSummary> {
        let scored = self.score_all(now, rng)?;
        let total = scored.len();
        let at_risk = at_risk_count(total, self.config.at_risk.fraction);

        let high = self.config.risk_levels.high;
        let high_risk = scored.iter().filter(|(_, s)| s.score >= high).count();
        let live_rate = percentage(high_risk, total);

        let current_rate = match &self.config.metrics.churn_rate_source {
            ChurnRateSource::Live => live_rate,
            ChurnRateSource::Reported { rate } => *rate,
        };

        let mut factor_counts: HashMap<String, usize> = HashMap::new();
        for (records, _) in &scored {
            let factors = self.engine.churn_factors(
                &records.customer,
                &records.deals,
                &records.tickets,
                now,
                rng,
            );
            for factor in factors.into_iter().filter(|f| !self.engine.is_neutral(f)) {
                *factor_counts.entry(factor).or_insert(0) += 1;
            }
        }

        let summary = ChurnMetricsSummary {
            current_churn_rate: format_pct(current_rate),
            total_customers:    total,
            at_risk_count:      at_risk,
            at_risk_percentage: format_pct(percentage(at_risk, total)),
            monthly_churn:      self.monthly_trend(now, total, current_rate),
            top_churn_reasons:  self.top_reasons(factor_counts),
        };

        log::info!(
            "analytics: churn metrics total={} at_risk={} rate={}",
            summary.total_customers, summary.at_risk_count, summary.current_churn_rate,
        );
        Ok(summary)
    }

    fn monthly_trend(&self, now: DateTime<Utc>, total: usize, current_rate: f64) -> Vec<MonthlyChurnPoint> {
        let m = &self.config.metrics;
        let len = m.trend_base_rates.len();
        let live = matches!(m.churn_rate_source, ChurnRateSource::Live);

        m.trend_base_rates
            .iter()
            .zip(&m.trend_new_customers)
            .enumerate()
            .map(|(i, (&base_rate, &new_customers))| {
                let rate = if live && i + 1 == len { current_rate } else { base_rate };
                let lost = (total as f64 * rate / 100.0).round() as u32;
                MonthlyChurnPoint {
                    month:          month_label(now, (len - 1 - i) as u32),
                    churn_rate:     format_pct(rate),
                    new_customers,
                    lost_customers: lost,
                }
            })
            .collect()
    }

    fn top_reasons(&self, counts: HashMap<String, usize>) -> Vec<ChurnReason> {
        let m = &self.config.metrics;
        let n = m.top_reason_count;

        if counts.is_empty() {
            return m
                .default_reasons
                .iter()
                .take(n)
                .map(|r| ChurnReason { reason: r.reason.clone(), percentage: r.percentage })
                .collect();
        }

        let mut reasons = rank_reasons(counts, n);

        for default in &m.default_reasons {
            if reasons.len() >= n {
                break;
            }
            if reasons.iter().all(|r| r.reason != default.reason) {
                reasons.push(ChurnReason { reason: default.reason.clone(), percentage: 0 });
            }
        }
        reasons
    }

    /// None when `customer_id` does not resolve.
    pub fn customer_engagement(
        &self,
        customer_id: EntityId,
        now: DateTime<Utc>,
        rng: &mut ScoringRng,
    ) -> CrmResult<Option<EngagementSummary>> {
        let Some(customer) = self.store.get_customer(customer_id)? else {
            log::debug!("analytics: engagement requested for unknown customer {customer_id}");
            return Ok(None);
        };
        let records = self.records_for(customer)?;
        let score = self.engine.churn_score(&records.signals(), now, rng);
        let factors = self.engine.churn_factors(
            &records.customer,
            &records.deals,
            &records.tickets,
            now,
            rng,
        );

        let CustomerRecords { customer, deals, tickets, activities } = records;

        let deal_value: f64 = deals
            .iter()
            .filter(|d| d.stage.is_active())
            .map(|d| d.value)
            .sum();

        let last_activity = activities
            .iter()
            .map(|a| a.created_at)
            .max()
            .map(|latest| days_between(latest, now).floor() as i64);

        Ok(Some(EngagementSummary {
            customer_id: customer.id,
            customer_value: CustomerValue {
                total_spent:    customer.total_spent,
                deal_value,
                lifetime_value: customer.total_spent + deal_value,
            },
            activity: ActivitySummary {
                total_deals:   deals.len(),
                active_deals:  deals.iter().filter(|d| d.stage.is_active()).count(),
                won_deals:     deals.iter().filter(|d| d.stage.is_won()).count(),
                total_tickets: tickets.len(),
                last_activity,
                interactions:  activities.len(),
            },
            support: SupportSummary {
                open_tickets:            tickets.iter().filter(|t| t.status.is_unresolved()).count(),
                avg_response_time_hours: avg_response_hours(&tickets),
                satisfaction:            self.satisfaction(&tickets),
            },
            churn_risk: ChurnRiskSummary {
                score:      score.score,
                risk_level: RiskLevel::from_score(score.score, &self.config.risk_levels),
                last_order: customer.last_order_date,
                factors,
            },
        }))
    }

    fn satisfaction(&self, tickets: &[Ticket]) -> f64 {
        let rated: Vec<f64> = tickets
            .iter()
            .filter_map(|t| t.satisfaction)
            .map(f64::from)
            .collect();
        if rated.is_empty() {
            return self.config.engagement.default_satisfaction;
        }
        round1(rated.iter().sum::<f64>() / rated.len() as f64 * 20.0)
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// `ceil(n × fraction)`, at least 1 when there is anyone to flag.
pub fn at_risk_count(n: usize, fraction: f64) -> usize {
    if n == 0 {
        return 0;
    }
    // Epsilon keeps 0.15 × 20 from ceiling to 4 on float noise.
    let raw = (n as f64 * fraction - 1e-9).ceil();
    (raw.max(1.0) as usize).min(n)
}

fn sort_riskiest_first(scored: &mut [(CustomerRecords, ChurnScore)]) {
    scored.sort_by(|(ra, a), (rb, b)| {
        b.score
            .cmp(&a.score)
            .then_with(|| ra.customer.id.cmp(&rb.customer.id))
    });
}

/// The `n` most frequent reasons, as shares of every occurrence counted
/// (not only the kept ones). Ties rank alphabetically.
fn rank_reasons(counts: HashMap<String, usize>, n: usize) -> Vec<ChurnReason> {
    let total: usize = counts.values().sum();
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(n);
    distribute_percentages(&ranked, total)
}

/// Percentages of `total`, the largest bucket absorbing the rounding
/// remainder so the kept buckets sum to exactly 100.
fn distribute_percentages(ranked: &[(String, usize)], total: usize) -> Vec<ChurnReason> {
    if total == 0 {
        return Vec::new();
    }

    let mut reasons: Vec<ChurnReason> = ranked
        .iter()
        .map(|(reason, count)| ChurnReason {
            reason:     reason.clone(),
            percentage: (*count as f64 / total as f64 * 100.0).round() as u32,
        })
        .collect();

    let assigned: i64 = reasons.iter().map(|r| r.percentage as i64).sum();
    let remainder = 100 - assigned;
    // Ranked input: index 0 holds the largest count.
    if let Some(largest) = reasons.first_mut() {
        largest.percentage = (largest.percentage as i64 + remainder).max(0) as u32;
    }
    reasons
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

fn format_pct(value: f64) -> String {
    format!("{value:.1}%")
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn avg_response_hours(tickets: &[Ticket]) -> f64 {
    if tickets.is_empty() {
        return 0.0;
    }
    let total_hours: f64 = tickets
        .iter()
        .map(|t| days_between(t.created_at, t.updated_at) * 24.0)
        .sum();
    round1(total_hours / tickets.len() as f64)
}

/// Three-letter label for the month `months_back` months before `now`.
fn month_label(now: DateTime<Utc>, months_back: u32) -> String {
    now.date_naive()
        .checked_sub_months(Months::new(months_back))
        .map(|d| d.format("%b").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn at_risk_count_is_ceiling_with_floor_of_one() {
        assert_eq!(at_risk_count(0, 0.15), 0);
        assert_eq!(at_risk_count(1, 0.15), 1);
        assert_eq!(at_risk_count(4, 0.15), 1);
        assert_eq!(at_risk_count(7, 0.15), 2);
        assert_eq!(at_risk_count(20, 0.15), 3);
        assert_eq!(at_risk_count(21, 0.15), 4);
        assert_eq!(at_risk_count(100, 0.15), 15);
    }

    #[test]
    fn percentages_always_total_one_hundred() {
        let ranked = vec![
            ("a".to_string(), 1),
            ("b".to_string(), 1),
            ("c".to_string(), 1),
        ];
        let reasons = distribute_percentages(&ranked, 3);
        let sum: u32 = reasons.iter().map(|r| r.percentage).sum();
        assert_eq!(sum, 100);
        assert_eq!(reasons[0].percentage, 34, "largest bucket absorbs remainder");
    }

    #[test]
    fn shares_use_every_occurrence_before_truncating() {
        let mut counts: HashMap<String, usize> = HashMap::new();
        counts.insert("A".into(), 10);
        for r in ["B", "C", "D", "E", "F", "G"] {
            counts.insert(r.into(), 1);
        }

        let reasons = rank_reasons(counts, 5);
        let got: Vec<(&str, u32)> = reasons
            .iter()
            .map(|r| (r.reason.as_str(), r.percentage))
            .collect();
        // 10/16 = 62.5 -> 63, 1/16 = 6.25 -> 6; A absorbs 100 - 87.
        assert_eq!(got, vec![("A", 76), ("B", 6), ("C", 6), ("D", 6), ("E", 6)]);
    }

    #[test]
    fn month_labels_wrap_across_years() {
        let now = Utc.with_ymd_and_hms(2026, 2, 10, 0, 0, 0).unwrap();
        assert_eq!(month_label(now, 0), "Feb");
        assert_eq!(month_label(now, 1), "Jan");
        assert_eq!(month_label(now, 2), "Dec");
        assert_eq!(month_label(now, 5), "Sep");

        let month_end = Utc.with_ymd_and_hms(2024, 3, 31, 0, 0, 0).unwrap();
        assert_eq!(month_label(month_end, 1), "Feb", "day clamps to the shorter month");
    }
}
