//! CRM records: customers, deals, support tickets and activity logs.
//!
//! `New*` structs are the caller-supplied payloads; the store assigns
//! ids and timestamps and hands back the full record. `*Patch` structs
//! carry a partial update: absent fields keep their stored value.

use crate::{
    error::{CrmError, CrmResult},
    types::{EntityId, EntityRef},
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Fractional days elapsed between `then` and `now`.
pub fn days_between(then: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - then).num_milliseconds() as f64 / 1_000.0 / SECONDS_PER_DAY
}

/// Fractional days since midnight UTC of `date`.
pub fn days_since_date(date: NaiveDate, now: DateTime<Utc>) -> f64 {
    days_between(date.and_time(NaiveTime::MIN).and_utc(), now)
}

// ── Enumerations ─────────────────────────────────────────────────────────────

macro_rules! text_enum {
    ($name:ident, $field:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = CrmError;

            fn from_str(s: &str) -> CrmResult<Self> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(CrmError::InvalidEnum { field: $field, value: s.to_string() }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum CustomerStatus {
    #[default]
    Active,
    Inactive,
}

text_enum!(CustomerStatus, "customer status", {
    Active   => "active",
    Inactive => "inactive",
});

/// Sales pipeline stage. `Closed` (won) and `Lost` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DealStage {
    Lead,
    Qualified,
    Proposal,
    Negotiation,
    Closed,
    Lost,
}

text_enum!(DealStage, "deal stage", {
    Lead        => "lead",
    Qualified   => "qualified",
    Proposal    => "proposal",
    Negotiation => "negotiation",
    Closed      => "closed",
    Lost        => "lost",
});

impl DealStage {
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Closed | Self::Lost)
    }

    pub fn is_won(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TicketStatus {
    #[serde(rename = "open")]
    Open,
    #[serde(rename = "in progress")]
    InProgress,
    #[serde(rename = "resolved")]
    Resolved,
    #[serde(rename = "closed")]
    Closed,
}

text_enum!(TicketStatus, "ticket status", {
    Open       => "open",
    InProgress => "in progress",
    Resolved   => "resolved",
    Closed     => "closed",
});

impl TicketStatus {
    /// Open or in progress.
    pub fn is_unresolved(&self) -> bool {
        matches!(self, Self::Open | Self::InProgress)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TicketPriority {
    Low,
    Medium,
    High,
}

text_enum!(TicketPriority, "ticket priority", {
    Low    => "low",
    Medium => "medium",
    High   => "high",
});

// ── Customer ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id:                  EntityId,
    pub name:                String,
    pub email:               String,
    pub company_name:        String,
    pub phone:               Option<String>,
    pub status:              CustomerStatus,
    pub total_spent:         f64,
    pub last_order_date:     Option<NaiveDate>,
    pub segment:             String,
    pub acquisition_channel: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewCustomer {
    pub name:                String,
    pub email:               String,
    pub company_name:        String,
    #[serde(default)]
    pub phone:               Option<String>,
    #[serde(default)]
    pub status:              CustomerStatus,
    #[serde(default)]
    pub total_spent:         f64,
    #[serde(default)]
    pub last_order_date:     Option<NaiveDate>,
    #[serde(default = "default_segment")]
    pub segment:             String,
    #[serde(default)]
    pub acquisition_channel: Option<String>,
}

fn default_segment() -> String {
    "general".into()
}

impl NewCustomer {
    pub fn validate(&self) -> CrmResult<()> {
        if self.name.trim().is_empty() {
            return Err(CrmError::validation("customer name must not be empty"));
        }
        if !self.email.contains('@') {
            return Err(CrmError::validation(format!("invalid email '{}'", self.email)));
        }
        if !self.total_spent.is_finite() || self.total_spent < 0.0 {
            return Err(CrmError::validation("totalSpent must be a non-negative number"));
        }
        Ok(())
    }

    pub fn into_customer(self, id: EntityId) -> Customer {
        Customer {
            id,
            name:                self.name,
            email:               self.email,
            company_name:        self.company_name,
            phone:               self.phone,
            status:              self.status,
            total_spent:         self.total_spent,
            last_order_date:     self.last_order_date,
            segment:             self.segment,
            acquisition_channel: self.acquisition_channel,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomerPatch {
    pub name:                Option<String>,
    pub email:               Option<String>,
    pub company_name:        Option<String>,
    pub phone:               Option<String>,
    pub status:              Option<CustomerStatus>,
    pub total_spent:         Option<f64>,
    pub last_order_date:     Option<NaiveDate>,
    pub segment:             Option<String>,
    pub acquisition_channel: Option<String>,
}

impl CustomerPatch {
    /// Overlay the present fields on `base`.
    pub fn apply(self, base: &Customer) -> NewCustomer {
        NewCustomer {
            name:                self.name.unwrap_or_else(|| base.name.clone()),
            email:               self.email.unwrap_or_else(|| base.email.clone()),
            company_name:        self.company_name.unwrap_or_else(|| base.company_name.clone()),
            phone:               self.phone.or_else(|| base.phone.clone()),
            status:              self.status.unwrap_or(base.status),
            total_spent:         self.total_spent.unwrap_or(base.total_spent),
            last_order_date:     self.last_order_date.or(base.last_order_date),
            segment:             self.segment.unwrap_or_else(|| base.segment.clone()),
            acquisition_channel: self.acquisition_channel.or_else(|| base.acquisition_channel.clone()),
        }
    }
}

// ── Deal ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Deal {
    pub id:           EntityId,
    pub customer_id:  EntityId,
    pub title:        String,
    pub company_name: String,
    pub stage:        DealStage,
    pub value:        f64,
    pub probability:  u8,
    pub assigned_to:  Option<String>,
    pub created_at:   DateTime<Utc>,
    pub updated_at:   DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewDeal {
    pub customer_id:  EntityId,
    pub title:        String,
    pub company_name: String,
    pub stage:        DealStage,
    pub value:        f64,
    #[serde(default)]
    pub probability:  u8,
    #[serde(default)]
    pub assigned_to:  Option<String>,
}

impl NewDeal {
    pub fn validate(&self) -> CrmResult<()> {
        if self.title.trim().is_empty() {
            return Err(CrmError::validation("deal title must not be empty"));
        }
        if !self.value.is_finite() || self.value < 0.0 {
            return Err(CrmError::validation("deal value must be a non-negative number"));
        }
        if self.probability > 100 {
            return Err(CrmError::validation("deal probability must be within 0..=100"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DealPatch {
    pub customer_id:  Option<EntityId>,
    pub title:        Option<String>,
    pub company_name: Option<String>,
    pub stage:        Option<DealStage>,
    pub value:        Option<f64>,
    pub probability:  Option<u8>,
    pub assigned_to:  Option<String>,
}

impl DealPatch {
    pub fn apply(self, base: &Deal) -> NewDeal {
        NewDeal {
            customer_id:  self.customer_id.unwrap_or(base.customer_id),
            title:        self.title.unwrap_or_else(|| base.title.clone()),
            company_name: self.company_name.unwrap_or_else(|| base.company_name.clone()),
            stage:        self.stage.unwrap_or(base.stage),
            value:        self.value.unwrap_or(base.value),
            probability:  self.probability.unwrap_or(base.probability),
            assigned_to:  self.assigned_to.or_else(|| base.assigned_to.clone()),
        }
    }
}

// ── Ticket ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id:           EntityId,
    pub ticket_id:    String,
    pub customer_id:  EntityId,
    pub title:        String,
    pub description:  String,
    pub status:       TicketStatus,
    pub priority:     TicketPriority,
    pub satisfaction: Option<u8>,
    pub created_at:   DateTime<Utc>,
    pub updated_at:   DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewTicket {
    pub ticket_id:    String,
    pub customer_id:  EntityId,
    pub title:        String,
    pub description:  String,
    pub status:       TicketStatus,
    pub priority:     TicketPriority,
    #[serde(default)]
    pub satisfaction: Option<u8>,
}

impl NewTicket {
    pub fn validate(&self) -> CrmResult<()> {
        let digits = self.ticket_id.strip_prefix("TK-").unwrap_or("");
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(CrmError::validation(format!(
                "ticketId '{}' must look like TK-1234",
                self.ticket_id
            )));
        }
        if self.title.trim().is_empty() {
            return Err(CrmError::validation("ticket title must not be empty"));
        }
        if let Some(s) = self.satisfaction {
            if !(1..=5).contains(&s) {
                return Err(CrmError::validation("ticket satisfaction must be within 1..=5"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct TicketPatch {
    pub ticket_id:    Option<String>,
    pub customer_id:  Option<EntityId>,
    pub title:        Option<String>,
    pub description:  Option<String>,
    pub status:       Option<TicketStatus>,
    pub priority:     Option<TicketPriority>,
    pub satisfaction: Option<u8>,
}

impl TicketPatch {
    pub fn apply(self, base: &Ticket) -> NewTicket {
        NewTicket {
            ticket_id:    self.ticket_id.unwrap_or_else(|| base.ticket_id.clone()),
            customer_id:  self.customer_id.unwrap_or(base.customer_id),
            title:        self.title.unwrap_or_else(|| base.title.clone()),
            description:  self.description.unwrap_or_else(|| base.description.clone()),
            status:       self.status.unwrap_or(base.status),
            priority:     self.priority.unwrap_or(base.priority),
            satisfaction: self.satisfaction.or(base.satisfaction),
        }
    }
}

// ── Product ──────────────────────────────────────────────────────────────────

/// A catalogue item. Prices are in `currency` units.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id:              EntityId,
    pub name:            String,
    pub description:     Option<String>,
    pub category:        String,
    pub price:           f64,
    pub currency:        String,
    pub status:          String,
    pub icon:            Option<String>,
    /// Percentage change over the last period; may be negative.
    pub trend:           f64,
    pub stock_available: i64,
    pub stock_threshold: i64,
    pub sales_count:     i64,
    pub profit_margin:   f64,
    pub vendor:          Option<String>,
    pub launch_date:     Option<NaiveDate>,
    pub specifications:  Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub name:            String,
    #[serde(default)]
    pub description:     Option<String>,
    pub category:        String,
    pub price:           f64,
    #[serde(default = "default_currency")]
    pub currency:        String,
    #[serde(default = "default_product_status")]
    pub status:          String,
    #[serde(default)]
    pub icon:            Option<String>,
    #[serde(default)]
    pub trend:           f64,
    #[serde(default = "default_stock_available")]
    pub stock_available: i64,
    #[serde(default = "default_stock_threshold")]
    pub stock_threshold: i64,
    #[serde(default)]
    pub sales_count:     i64,
    #[serde(default = "default_profit_margin")]
    pub profit_margin:   f64,
    #[serde(default)]
    pub vendor:          Option<String>,
    #[serde(default)]
    pub launch_date:     Option<NaiveDate>,
    #[serde(default)]
    pub specifications:  Option<String>,
}

fn default_currency() -> String {
    "INR".into()
}

fn default_product_status() -> String {
    "active".into()
}

fn default_stock_available() -> i64 {
    100
}

fn default_stock_threshold() -> i64 {
    10
}

fn default_profit_margin() -> f64 {
    30.0
}

impl NewProduct {
    pub fn validate(&self) -> CrmResult<()> {
        if self.name.trim().is_empty() {
            return Err(CrmError::validation("product name must not be empty"));
        }
        if self.category.trim().is_empty() {
            return Err(CrmError::validation("product category must not be empty"));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(CrmError::validation("product price must be a non-negative number"));
        }
        if !self.trend.is_finite() || !self.profit_margin.is_finite() {
            return Err(CrmError::validation("product trend and profitMargin must be finite"));
        }
        if self.stock_available < 0 || self.stock_threshold < 0 || self.sales_count < 0 {
            return Err(CrmError::validation("product stock and sales counts must be non-negative"));
        }
        Ok(())
    }

    pub fn into_product(self, id: EntityId) -> Product {
        Product {
            id,
            name:            self.name,
            description:     self.description,
            category:        self.category,
            price:           self.price,
            currency:        self.currency,
            status:          self.status,
            icon:            self.icon,
            trend:           self.trend,
            stock_available: self.stock_available,
            stock_threshold: self.stock_threshold,
            sales_count:     self.sales_count,
            profit_margin:   self.profit_margin,
            vendor:          self.vendor,
            launch_date:     self.launch_date,
            specifications:  self.specifications,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ProductPatch {
    pub name:            Option<String>,
    pub description:     Option<String>,
    pub category:        Option<String>,
    pub price:           Option<f64>,
    pub currency:        Option<String>,
    pub status:          Option<String>,
    pub icon:            Option<String>,
    pub trend:           Option<f64>,
    pub stock_available: Option<i64>,
    pub stock_threshold: Option<i64>,
    pub sales_count:     Option<i64>,
    pub profit_margin:   Option<f64>,
    pub vendor:          Option<String>,
    pub launch_date:     Option<NaiveDate>,
    pub specifications:  Option<String>,
}

impl ProductPatch {
    pub fn apply(self, base: &Product) -> NewProduct {
        NewProduct {
            name:            self.name.unwrap_or_else(|| base.name.clone()),
            description:     self.description.or_else(|| base.description.clone()),
            category:        self.category.unwrap_or_else(|| base.category.clone()),
            price:           self.price.unwrap_or(base.price),
            currency:        self.currency.unwrap_or_else(|| base.currency.clone()),
            status:          self.status.unwrap_or_else(|| base.status.clone()),
            icon:            self.icon.or_else(|| base.icon.clone()),
            trend:           self.trend.unwrap_or(base.trend),
            stock_available: self.stock_available.unwrap_or(base.stock_available),
            stock_threshold: self.stock_threshold.unwrap_or(base.stock_threshold),
            sales_count:     self.sales_count.unwrap_or(base.sales_count),
            profit_margin:   self.profit_margin.unwrap_or(base.profit_margin),
            vendor:          self.vendor.or_else(|| base.vendor.clone()),
            launch_date:     self.launch_date.or(base.launch_date),
            specifications:  self.specifications.or_else(|| base.specifications.clone()),
        }
    }
}

// ── Activity log ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLog {
    pub id:               EntityId,
    pub activity_type:    String,
    pub description:      String,
    pub related_to:       EntityRef,
    pub created_by:       String,
    pub created_at:       DateTime<Utc>,
    pub duration_minutes: Option<u32>,
    pub outcome:          Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewActivityLog {
    pub activity_type:    String,
    pub description:      String,
    pub related_to:       EntityRef,
    pub created_by:       String,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub outcome:          Option<String>,
}

impl NewActivityLog {
    pub fn validate(&self) -> CrmResult<()> {
        if self.description.trim().is_empty() {
            return Err(CrmError::validation("activity description must not be empty"));
        }
        if self.created_by.trim().is_empty() {
            return Err(CrmError::validation("activity createdBy must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticket_status_uses_spaced_wire_name() {
        let json = serde_json::to_string(&TicketStatus::InProgress).unwrap();
        assert_eq!(json, "\"in progress\"");
        assert_eq!("In Progress".parse::<TicketStatus>().unwrap(), TicketStatus::InProgress);
    }

    #[test]
    fn unknown_stage_is_rejected() {
        let err = "won".parse::<DealStage>().unwrap_err();
        assert!(err.is_client_error(), "unexpected error kind: {err}");
    }

    #[test]
    fn active_stages_exclude_terminal_ones() {
        let active: Vec<_> = DealStage::ALL.iter().filter(|s| s.is_active()).collect();
        assert_eq!(active.len(), 4);
        assert!(!DealStage::Closed.is_active());
        assert!(!DealStage::Lost.is_active());
    }

    #[test]
    fn new_customer_defaults_apply() {
        let c: NewCustomer = serde_json::from_str(
            r#"{"name":"Ana","email":"ana@example.com","companyName":"Acme"}"#,
        )
        .unwrap();
        assert_eq!(c.total_spent, 0.0);
        assert_eq!(c.status, CustomerStatus::Active);
        assert_eq!(c.segment, "general");
        assert!(c.validate().is_ok());
    }

    #[test]
    fn customer_patch_keeps_absent_fields() {
        let base = NewCustomer {
            name:                "Ana".into(),
            email:               "ana@example.com".into(),
            company_name:        "Acme".into(),
            phone:               Some("+1".into()),
            status:              CustomerStatus::Active,
            total_spent:         100.0,
            last_order_date:     None,
            segment:             "smb".into(),
            acquisition_channel: None,
        }
        .into_customer(7);

        let patch: CustomerPatch = serde_json::from_str(r#"{"totalSpent":5}"#).unwrap();
        let merged = patch.apply(&base);
        assert_eq!(merged.total_spent, 5.0);
        assert_eq!(merged.name, "Ana");
        assert_eq!(merged.phone.as_deref(), Some("+1"));
        assert_eq!(merged.segment, "smb");
    }

    #[test]
    fn new_product_defaults_apply() {
        let p: NewProduct = serde_json::from_str(
            r#"{"name":"CRM Suite","category":"Software","price":1450000}"#,
        )
        .unwrap();
        assert_eq!(p.currency, "INR");
        assert_eq!(p.status, "active");
        assert_eq!(p.stock_available, 100);
        assert_eq!(p.stock_threshold, 10);
        assert_eq!(p.profit_margin, 30.0);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn ticket_id_format_is_checked() {
        let mut t = NewTicket {
            ticket_id:    "TK-2384".into(),
            customer_id:  1,
            title:        "Broken export".into(),
            description:  "PDF export drops columns".into(),
            status:       TicketStatus::Open,
            priority:     TicketPriority::Medium,
            satisfaction: None,
        };
        assert!(t.validate().is_ok());

        t.ticket_id = "2384".into();
        assert!(t.validate().is_err());
    }
}
