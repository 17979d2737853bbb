//! Static JSON fixtures loaded into an empty store.
//!
//! Timestamps are given as ages ("days ago") relative to the load time so
//! a fixture keeps the same churn profile whenever it is loaded.

use super::CrmStore;
use crate::{
    entity::{NewActivityLog, NewCustomer, NewDeal, NewProduct, NewTicket},
    error::CrmResult,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CrmFixture {
    pub customers:  Vec<FixtureCustomer>,
    pub deals:      Vec<FixtureDeal>,
    pub tickets:    Vec<FixtureTicket>,
    pub activities: Vec<FixtureActivity>,
    pub products:   Vec<NewProduct>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureCustomer {
    #[serde(flatten)]
    pub customer:            NewCustomer,
    /// Overrides `lastOrderDate` when present.
    #[serde(default)]
    pub last_order_days_ago: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureDeal {
    #[serde(flatten)]
    pub deal:             NewDeal,
    #[serde(default)]
    pub created_days_ago: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureTicket {
    #[serde(flatten)]
    pub ticket:           NewTicket,
    #[serde(default)]
    pub opened_days_ago:  f64,
    /// Hours between opening and the last update.
    #[serde(default)]
    pub response_hours:   f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureActivity {
    #[serde(flatten)]
    pub activity: NewActivityLog,
    #[serde(default)]
    pub days_ago: f64,
}

/// Row counts written by one import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub customers:  usize,
    pub deals:      usize,
    pub tickets:    usize,
    pub activities: usize,
    pub products:   usize,
}

fn ago(now: DateTime<Utc>, days: f64) -> DateTime<Utc> {
    now - Duration::milliseconds((days * 86_400_000.0).round() as i64)
}

impl CrmFixture {
    pub fn load(path: &str) -> CrmResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let fixture = serde_json::from_str(&content)?;
        Ok(fixture)
    }
}

impl CrmStore {
    /// Load a fixture in a single transaction; nothing is written on error.
    pub fn import_fixture(&self, fixture: &CrmFixture, now: DateTime<Utc>) -> CrmResult<ImportSummary> {
        let tx = self.conn.unchecked_transaction()?;
        let mut summary = ImportSummary::default();

        for c in &fixture.customers {
            let mut customer = c.customer.clone();
            if let Some(days) = c.last_order_days_ago {
                customer.last_order_date = Some((now - Duration::days(days)).date_naive());
            }
            self.insert_customer(&customer)?;
            summary.customers += 1;
        }

        for d in &fixture.deals {
            self.insert_deal(&d.deal, ago(now, d.created_days_ago))?;
            summary.deals += 1;
        }

        for t in &fixture.tickets {
            let opened = ago(now, t.opened_days_ago);
            let updated = opened + Duration::milliseconds((t.response_hours * 3_600_000.0).round() as i64);
            self.insert_ticket_at(&t.ticket, opened, updated)?;
            summary.tickets += 1;
        }

        for a in &fixture.activities {
            self.insert_activity(&a.activity, ago(now, a.days_ago))?;
            summary.activities += 1;
        }

        for p in &fixture.products {
            self.insert_product(p)?;
            summary.products += 1;
        }

        tx.commit()?;
        log::info!(
            "store: imported fixture ({} customers, {} deals, {} tickets, {} activities, {} products)",
            summary.customers, summary.deals, summary.tickets, summary.activities, summary.products,
        );
        Ok(summary)
    }
}
