use super::CrmStore;
use crate::{
    entity::{ActivityLog, NewActivityLog},
    error::CrmResult,
    types::{EntityRef, EntityId},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

const ACTIVITY_COLUMNS: &str = "id, activity_type, description, related_kind, related_id,
     created_by, created_at, duration_minutes, outcome";

fn activity_from_row(row: &Row<'_>) -> rusqlite::Result<ActivityLog> {
    Ok(ActivityLog {
        id:               row.get(0)?,
        activity_type:    row.get(1)?,
        description:      row.get(2)?,
        related_to:       EntityRef {
            kind: row.get(3)?,
            id:   row.get(4)?,
        },
        created_by:       row.get(5)?,
        created_at:       row.get(6)?,
        duration_minutes: row.get(7)?,
        outcome:          row.get(8)?,
    })
}

impl CrmStore {
    // ── Activity log ──────────────────────────────────────────────

    pub fn insert_activity(&self, a: &NewActivityLog, created_at: DateTime<Utc>) -> CrmResult<ActivityLog> {
        a.validate()?;
        self.conn.execute(
            "INSERT INTO activity_log (
                activity_type, description, related_kind, related_id,
                created_by, created_at, duration_minutes, outcome
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                &a.activity_type,
                &a.description,
                a.related_to.kind,
                a.related_to.id,
                &a.created_by,
                created_at,
                a.duration_minutes,
                &a.outcome,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        log::debug!("store: inserted activity {id} on {}", a.related_to);
        Ok(ActivityLog {
            id,
            activity_type:    a.activity_type.clone(),
            description:      a.description.clone(),
            related_to:       a.related_to,
            created_by:       a.created_by.clone(),
            created_at,
            duration_minutes: a.duration_minutes,
            outcome:          a.outcome.clone(),
        })
    }

    pub fn list_activities(&self) -> CrmResult<Vec<ActivityLog>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ACTIVITY_COLUMNS} FROM activity_log ORDER BY created_at DESC, id DESC"
        ))?;
        let rows = stmt
            .query_map([], activity_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Entries attached to exactly `target` (kind and id both match).
    pub fn list_activities_by_relation(&self, target: EntityRef) -> CrmResult<Vec<ActivityLog>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ACTIVITY_COLUMNS} FROM activity_log
             WHERE related_kind = ?1 AND related_id = ?2
             ORDER BY created_at DESC, id DESC"
        ))?;
        let rows = stmt
            .query_map(params![target.kind, target.id], activity_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn delete_activity(&self, id: EntityId) -> CrmResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM activity_log WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }
}
