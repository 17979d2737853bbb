//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! Analytics read through the `CrmRead` trait and never execute SQL
//! or write.

use crate::{
    entity::{ActivityLog, Customer, CustomerStatus, Deal, DealStage, Ticket, TicketPriority, TicketStatus},
    error::{CrmError, CrmResult},
    types::{EntityId, EntityKind, EntityRef},
};
use rusqlite::{
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
    Connection, ToSql,
};

mod activity;
mod customer;
mod deal;
mod fixture;
mod product;
mod ticket;

pub use fixture::{CrmFixture, FixtureActivity, FixtureCustomer, FixtureDeal, FixtureTicket, ImportSummary};

/// Row counts per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableCounts {
    pub customers:  i64,
    pub deals:      i64,
    pub tickets:    i64,
    pub activities: i64,
    pub products:   i64,
}

/// Read accessors the analytics core depends on.
///
/// Swap the backing store by implementing this trait; scoring code is
/// unaware of SQL.
pub trait CrmRead {
    fn list_customers(&self) -> CrmResult<Vec<Customer>>;
    fn get_customer(&self, id: EntityId) -> CrmResult<Option<Customer>>;
    fn list_deals(&self) -> CrmResult<Vec<Deal>>;
    fn list_deals_by_customer(&self, customer_id: EntityId) -> CrmResult<Vec<Deal>>;
    fn list_tickets_by_customer(&self, customer_id: EntityId) -> CrmResult<Vec<Ticket>>;
    fn list_activities_by_relation(&self, target: EntityRef) -> CrmResult<Vec<ActivityLog>>;
}

pub struct CrmStore {
    conn: Connection,
}

impl CrmStore {
    pub fn open(path: &str) -> CrmResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> CrmResult<Self> {
        let conn = Connection::open(":memory:")?;
        Ok(Self { conn })
    }

    /// In-memory database with the schema applied.
    pub fn in_memory_migrated() -> CrmResult<Self> {
        let store = Self::in_memory()?;
        store.migrate()?;
        Ok(store)
    }

    /// Apply all schema migrations in order. Safe to call repeatedly.
    pub fn migrate(&self) -> CrmResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_crm.sql"))?;
        Ok(())
    }

    pub fn counts(&self) -> CrmResult<TableCounts> {
        let count = |table: &str| -> CrmResult<i64> {
            Ok(self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?)
        };
        Ok(TableCounts {
            customers:  count("customer")?,
            deals:      count("deal")?,
            tickets:    count("ticket")?,
            activities: count("activity_log")?,
            products:   count("product")?,
        })
    }
}

impl CrmRead for CrmStore {
    fn list_customers(&self) -> CrmResult<Vec<Customer>> {
        CrmStore::list_customers(self)
    }

    fn get_customer(&self, id: EntityId) -> CrmResult<Option<Customer>> {
        CrmStore::get_customer(self, id)
    }

    fn list_deals(&self) -> CrmResult<Vec<Deal>> {
        CrmStore::list_deals(self)
    }

    fn list_deals_by_customer(&self, customer_id: EntityId) -> CrmResult<Vec<Deal>> {
        CrmStore::list_deals_by_customer(self, customer_id)
    }

    fn list_tickets_by_customer(&self, customer_id: EntityId) -> CrmResult<Vec<Ticket>> {
        CrmStore::list_tickets_by_customer(self, customer_id)
    }

    fn list_activities_by_relation(&self, target: EntityRef) -> CrmResult<Vec<ActivityLog>> {
        CrmStore::list_activities_by_relation(self, target)
    }
}

/// UNIQUE violations are caller mistakes; other constraint failures
/// (NOT NULL, CHECK) stay database errors.
pub(crate) fn unique_violation(err: rusqlite::Error, what: &str) -> CrmError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            CrmError::validation(format!("{what} already exists"))
        }
        _ => CrmError::Database(err),
    }
}

// ── Text-column enums ────────────────────────────────────────────────────────

macro_rules! sql_text_enum {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl ToSql for $ty {
                fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                    Ok(ToSqlOutput::from(self.as_str()))
                }
            }

            impl FromSql for $ty {
                fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                    value
                        .as_str()?
                        .parse()
                        .map_err(|e: CrmError| FromSqlError::Other(Box::new(e)))
                }
            }
        )+
    };
}

sql_text_enum!(CustomerStatus, DealStage, TicketStatus, TicketPriority, EntityKind);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unique_constraints_map_to_validation() {
        let store = CrmStore::in_memory_migrated().unwrap();
        let insert = "INSERT INTO customer (name, email, company_name) VALUES (?1, ?2, 'Acme')";
        store.conn.execute(insert, ["Ana", "ana@acme.io"]).unwrap();

        let dup = store.conn.execute(insert, ["Ana", "ana@acme.io"]).unwrap_err();
        assert!(matches!(unique_violation(dup, "customer email"), CrmError::Validation { .. }));

        let null_name = store
            .conn
            .execute(insert, [None::<&str>, Some("bo@acme.io")])
            .unwrap_err();
        assert!(
            matches!(unique_violation(null_name, "customer email"), CrmError::Database(_)),
            "NOT NULL failures are not duplicates"
        );
    }
}
