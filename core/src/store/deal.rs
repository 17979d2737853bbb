use super::CrmStore;
use crate::{
    entity::{Deal, DealPatch, DealStage, NewDeal},
    error::CrmResult,
    types::EntityId,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

const DEAL_COLUMNS: &str = "id, customer_id, title, company_name, stage, value, probability,
     assigned_to, created_at, updated_at";

fn deal_from_row(row: &Row<'_>) -> rusqlite::Result<Deal> {
    Ok(Deal {
        id:           row.get(0)?,
        customer_id:  row.get(1)?,
        title:        row.get(2)?,
        company_name: row.get(3)?,
        stage:        row.get(4)?,
        value:        row.get(5)?,
        probability:  row.get(6)?,
        assigned_to:  row.get(7)?,
        created_at:   row.get(8)?,
        updated_at:   row.get(9)?,
    })
}

impl CrmStore {
    // ── Deal ──────────────────────────────────────────────────────

    pub fn insert_deal(&self, d: &NewDeal, now: DateTime<Utc>) -> CrmResult<Deal> {
        d.validate()?;
        self.conn.execute(
            "INSERT INTO deal (
                customer_id, title, company_name, stage, value, probability,
                assigned_to, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                d.customer_id,
                &d.title,
                &d.company_name,
                d.stage,
                d.value,
                d.probability,
                &d.assigned_to,
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        log::debug!("store: inserted deal {id} for customer {} ({})", d.customer_id, d.stage);
        Ok(Deal {
            id,
            customer_id:  d.customer_id,
            title:        d.title.clone(),
            company_name: d.company_name.clone(),
            stage:        d.stage,
            value:        d.value,
            probability:  d.probability,
            assigned_to:  d.assigned_to.clone(),
            created_at:   now,
            updated_at:   now,
        })
    }

    pub fn get_deal(&self, id: EntityId) -> CrmResult<Option<Deal>> {
        let deal = self
            .conn
            .query_row(
                &format!("SELECT {DEAL_COLUMNS} FROM deal WHERE id = ?1"),
                params![id],
                deal_from_row,
            )
            .optional()?;
        Ok(deal)
    }

    pub fn list_deals(&self) -> CrmResult<Vec<Deal>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {DEAL_COLUMNS} FROM deal ORDER BY id ASC"))?;
        let rows = stmt
            .query_map([], deal_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_deals_by_customer(&self, customer_id: EntityId) -> CrmResult<Vec<Deal>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {DEAL_COLUMNS} FROM deal WHERE customer_id = ?1 ORDER BY id ASC"
        ))?;
        let rows = stmt
            .query_map(params![customer_id], deal_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_deals_by_stage(&self, stage: DealStage) -> CrmResult<Vec<Deal>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {DEAL_COLUMNS} FROM deal WHERE stage = ?1 ORDER BY id ASC"
        ))?;
        let rows = stmt
            .query_map(params![stage], deal_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Deals owned by `assignee`, matched exactly.
    pub fn list_deals_by_assignee(&self, assignee: &str) -> CrmResult<Vec<Deal>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {DEAL_COLUMNS} FROM deal WHERE assigned_to = ?1 ORDER BY id ASC"
        ))?;
        let rows = stmt
            .query_map(params![assignee], deal_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Merge `patch` into the stored deal and bump `updated_at`.
    /// None when the id does not exist.
    pub fn update_deal(&self, id: EntityId, patch: DealPatch, now: DateTime<Utc>) -> CrmResult<Option<Deal>> {
        let Some(existing) = self.get_deal(id)? else {
            return Ok(None);
        };
        let d = patch.apply(&existing);
        d.validate()?;
        let changed = self.conn.execute(
            "UPDATE deal SET
                customer_id = ?2, title = ?3, company_name = ?4, stage = ?5, value = ?6,
                probability = ?7, assigned_to = ?8, updated_at = ?9
             WHERE id = ?1",
            params![
                id,
                d.customer_id,
                &d.title,
                &d.company_name,
                d.stage,
                d.value,
                d.probability,
                &d.assigned_to,
                now,
            ],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        self.get_deal(id)
    }

    pub fn delete_deal(&self, id: EntityId) -> CrmResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM deal WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }
}
