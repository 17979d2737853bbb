use super::{unique_violation, CrmStore};
use crate::{
    entity::{Customer, CustomerPatch, NewCustomer},
    error::CrmResult,
    types::EntityId,
};
use rusqlite::{params, OptionalExtension, Row};

const CUSTOMER_COLUMNS: &str = "id, name, email, company_name, phone, status, total_spent,
     last_order_date, segment, acquisition_channel";

fn customer_from_row(row: &Row<'_>) -> rusqlite::Result<Customer> {
    Ok(Customer {
        id:                  row.get(0)?,
        name:                row.get(1)?,
        email:               row.get(2)?,
        company_name:        row.get(3)?,
        phone:               row.get(4)?,
        status:              row.get(5)?,
        total_spent:         row.get(6)?,
        last_order_date:     row.get(7)?,
        segment:             row.get(8)?,
        acquisition_channel: row.get(9)?,
    })
}

impl CrmStore {
    // ── Customer ──────────────────────────────────────────────────

    pub fn insert_customer(&self, c: &NewCustomer) -> CrmResult<Customer> {
        c.validate()?;
        self.conn.execute(
            "INSERT INTO customer (
                name, email, company_name, phone, status, total_spent,
                last_order_date, segment, acquisition_channel
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                &c.name,
                &c.email,
                &c.company_name,
                &c.phone,
                c.status,
                c.total_spent,
                c.last_order_date,
                &c.segment,
                &c.acquisition_channel,
            ],
        ).map_err(|e| unique_violation(e, "customer email"))?;
        let id = self.conn.last_insert_rowid();
        log::debug!("store: inserted customer {id} <{}>", c.email);
        Ok(c.clone().into_customer(id))
    }

    pub fn get_customer(&self, id: EntityId) -> CrmResult<Option<Customer>> {
        let customer = self
            .conn
            .query_row(
                &format!("SELECT {CUSTOMER_COLUMNS} FROM customer WHERE id = ?1"),
                params![id],
                customer_from_row,
            )
            .optional()?;
        Ok(customer)
    }

    pub fn list_customers(&self) -> CrmResult<Vec<Customer>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {CUSTOMER_COLUMNS} FROM customer ORDER BY id ASC"))?;
        let rows = stmt
            .query_map([], customer_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Customers with the most recent orders first; never-ordered last.
    pub fn recent_customers(&self, limit: usize) -> CrmResult<Vec<Customer>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customer
             ORDER BY last_order_date IS NULL ASC, last_order_date DESC, id ASC
             LIMIT ?1"
        ))?;
        let rows = stmt
            .query_map(params![limit as i64], customer_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Merge `patch` into the stored record. None when the id does not exist.
    pub fn update_customer(&self, id: EntityId, patch: CustomerPatch) -> CrmResult<Option<Customer>> {
        let Some(existing) = self.get_customer(id)? else {
            return Ok(None);
        };
        let c = patch.apply(&existing);
        c.validate()?;
        let changed = self.conn.execute(
            "UPDATE customer SET
                name = ?2, email = ?3, company_name = ?4, phone = ?5, status = ?6,
                total_spent = ?7, last_order_date = ?8, segment = ?9, acquisition_channel = ?10
             WHERE id = ?1",
            params![
                id,
                &c.name,
                &c.email,
                &c.company_name,
                &c.phone,
                c.status,
                c.total_spent,
                c.last_order_date,
                &c.segment,
                &c.acquisition_channel,
            ],
        ).map_err(|e| unique_violation(e, "customer email"))?;
        if changed == 0 {
            return Ok(None);
        }
        Ok(Some(c.into_customer(id)))
    }

    pub fn delete_customer(&self, id: EntityId) -> CrmResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM customer WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }
}
