use super::{unique_violation, CrmStore};
use crate::{
    entity::{NewTicket, Ticket, TicketPatch},
    error::CrmResult,
    types::EntityId,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

const TICKET_COLUMNS: &str = "id, ticket_id, customer_id, title, description, status, priority,
     satisfaction, created_at, updated_at";

fn ticket_from_row(row: &Row<'_>) -> rusqlite::Result<Ticket> {
    Ok(Ticket {
        id:           row.get(0)?,
        ticket_id:    row.get(1)?,
        customer_id:  row.get(2)?,
        title:        row.get(3)?,
        description:  row.get(4)?,
        status:       row.get(5)?,
        priority:     row.get(6)?,
        satisfaction: row.get(7)?,
        created_at:   row.get(8)?,
        updated_at:   row.get(9)?,
    })
}

impl CrmStore {
    // ── Ticket ────────────────────────────────────────────────────

    pub fn insert_ticket(&self, t: &NewTicket, now: DateTime<Utc>) -> CrmResult<Ticket> {
        self.insert_ticket_at(t, now, now)
    }

    /// Insert with explicit timestamps (fixtures, backfills).
    pub fn insert_ticket_at(
        &self,
        t: &NewTicket,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> CrmResult<Ticket> {
        t.validate()?;
        self.conn.execute(
            "INSERT INTO ticket (
                ticket_id, customer_id, title, description, status, priority,
                satisfaction, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                &t.ticket_id,
                t.customer_id,
                &t.title,
                &t.description,
                t.status,
                t.priority,
                t.satisfaction,
                created_at,
                updated_at,
            ],
        ).map_err(|e| unique_violation(e, "ticket id"))?;
        let id = self.conn.last_insert_rowid();
        log::debug!("store: inserted ticket {} ({id}) for customer {}", t.ticket_id, t.customer_id);
        Ok(Ticket {
            id,
            ticket_id:    t.ticket_id.clone(),
            customer_id:  t.customer_id,
            title:        t.title.clone(),
            description:  t.description.clone(),
            status:       t.status,
            priority:     t.priority,
            satisfaction: t.satisfaction,
            created_at,
            updated_at,
        })
    }

    pub fn get_ticket(&self, id: EntityId) -> CrmResult<Option<Ticket>> {
        let ticket = self
            .conn
            .query_row(
                &format!("SELECT {TICKET_COLUMNS} FROM ticket WHERE id = ?1"),
                params![id],
                ticket_from_row,
            )
            .optional()?;
        Ok(ticket)
    }

    pub fn list_tickets(&self) -> CrmResult<Vec<Ticket>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {TICKET_COLUMNS} FROM ticket ORDER BY id ASC"))?;
        let rows = stmt
            .query_map([], ticket_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_tickets_by_customer(&self, customer_id: EntityId) -> CrmResult<Vec<Ticket>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TICKET_COLUMNS} FROM ticket WHERE customer_id = ?1 ORDER BY id ASC"
        ))?;
        let rows = stmt
            .query_map(params![customer_id], ticket_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Merge `patch` into the stored ticket and bump `updated_at`.
    /// None when the id does not exist.
    pub fn update_ticket(&self, id: EntityId, patch: TicketPatch, now: DateTime<Utc>) -> CrmResult<Option<Ticket>> {
        let Some(existing) = self.get_ticket(id)? else {
            return Ok(None);
        };
        let t = patch.apply(&existing);
        t.validate()?;
        let changed = self.conn.execute(
            "UPDATE ticket SET
                ticket_id = ?2, customer_id = ?3, title = ?4, description = ?5,
                status = ?6, priority = ?7, satisfaction = ?8, updated_at = ?9
             WHERE id = ?1",
            params![
                id,
                &t.ticket_id,
                t.customer_id,
                &t.title,
                &t.description,
                t.status,
                t.priority,
                t.satisfaction,
                now,
            ],
        ).map_err(|e| unique_violation(e, "ticket id"))?;
        if changed == 0 {
            return Ok(None);
        }
        self.get_ticket(id)
    }

    pub fn delete_ticket(&self, id: EntityId) -> CrmResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM ticket WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }
}
