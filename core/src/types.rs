//! Shared primitive types used across the CRM core.

use crate::error::{CrmError, CrmResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Auto-incremented row id for every stored entity.
pub type EntityId = i64;

/// Churn score on the 0–100 scale. Higher = more likely to churn.
pub type Score = u32;

/// The kinds of record an activity log entry may point at.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Customer,
    Deal,
    Ticket,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Deal     => "deal",
            Self::Ticket   => "ticket",
        }
    }
}

impl FromStr for EntityKind {
    type Err = CrmError;

    fn from_str(s: &str) -> CrmResult<Self> {
        match s {
            "customer" => Ok(Self::Customer),
            "deal"     => Ok(Self::Deal),
            "ticket"   => Ok(Self::Ticket),
            other      => Err(CrmError::InvalidEnum {
                field: "entity_kind",
                value: other.to_string(),
            }),
        }
    }
}

/// Typed form of the `"<kind>:<id>"` relation key.
///
/// Parsed once at the storage / serde boundary so the scoring core never
/// splits strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id:   EntityId,
}

impl EntityRef {
    pub fn customer(id: EntityId) -> Self {
        Self { kind: EntityKind::Customer, id }
    }

    pub fn deal(id: EntityId) -> Self {
        Self { kind: EntityKind::Deal, id }
    }

    pub fn ticket(id: EntityId) -> Self {
        Self { kind: EntityKind::Ticket, id }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.id)
    }
}

impl FromStr for EntityRef {
    type Err = CrmError;

    fn from_str(s: &str) -> CrmResult<Self> {
        let invalid = || CrmError::InvalidReference { value: s.to_string() };

        let (kind, id) = s.split_once(':').ok_or_else(invalid)?;
        let kind = kind.trim().parse::<EntityKind>().map_err(|_| invalid())?;
        let id = id.trim().parse::<EntityId>().map_err(|_| invalid())?;
        Ok(Self { kind, id })
    }
}

impl TryFrom<String> for EntityRef {
    type Error = CrmError;

    fn try_from(value: String) -> CrmResult<Self> {
        value.parse()
    }
}

impl From<EntityRef> for String {
    fn from(r: EntityRef) -> Self {
        r.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_customer_reference() {
        let r: EntityRef = "customer:42".parse().unwrap();
        assert_eq!(r, EntityRef::customer(42));
        assert_eq!(r.to_string(), "customer:42");
    }

    #[test]
    fn rejects_malformed_references() {
        for bad in ["customer", "customer:", "account:1", ":7", "deal:abc", ""] {
            assert!(
                bad.parse::<EntityRef>().is_err(),
                "'{bad}' should not parse as an entity reference"
            );
        }
    }

    #[test]
    fn serializes_as_composite_string() {
        let json = serde_json::to_string(&EntityRef::ticket(9)).unwrap();
        assert_eq!(json, "\"ticket:9\"");

        let back: EntityRef = serde_json::from_str("\"deal:3\"").unwrap();
        assert_eq!(back, EntityRef::deal(3));
    }
}
