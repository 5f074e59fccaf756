//! Append-only call log. Rows are written once per call and never updated.

use sqlx::SqliteConnection;

use crate::db::Db;
use crate::errors::AppResult;
use crate::models::CallEvent;

pub const DEFAULT_RECENT: i64 = 5;
pub const MAX_RECENT: i64 = 50;

#[derive(Debug, Clone)]
pub struct NewCallEvent<'a> {
    pub appointment_id: i64,
    pub doctor_id:      i64,
    pub ticket_number:  &'a str,
    pub patient_name:   &'a str,
    pub room:           &'a str,
    pub called_at:      chrono::NaiveDateTime,
}

#[derive(Clone)]
pub struct CallLog {
    pool: Db,
}

impl CallLog {
    pub fn new(pool: Db) -> Self {
        Self { pool }
    }

    /// Append inside the caller's transaction so the status change and the
    /// log entry commit together.
    pub async fn append(conn: &mut SqliteConnection, event: &NewCallEvent<'_>) -> AppResult<i64> {
        let id = sqlx::query(
            "INSERT INTO call_history (appointment_id, doctor_id, ticket_number, patient_name, room, called_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(event.appointment_id)
        .bind(event.doctor_id)
        .bind(event.ticket_number)
        .bind(event.patient_name)
        .bind(event.room)
        .bind(event.called_at)
        .execute(conn)
        .await?
        .last_insert_rowid();
        Ok(id)
    }

    /// Most recent calls first; `limit` is clamped to `1..=MAX_RECENT`.
    pub async fn recent(&self, limit: i64) -> AppResult<Vec<CallEvent>> {
        let limit = limit.clamp(1, MAX_RECENT);
        Ok(sqlx::query_as::<_, CallEvent>(
            "SELECT id, appointment_id, doctor_id, ticket_number, patient_name, room, called_at
             FROM call_history
             ORDER BY called_at DESC, id DESC
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    #[cfg(test)]
    pub async fn for_appointment(&self, appointment_id: i64) -> AppResult<Vec<CallEvent>> {
        Ok(sqlx::query_as::<_, CallEvent>(
            "SELECT id, appointment_id, doctor_id, ticket_number, patient_name, room, called_at
             FROM call_history WHERE appointment_id = ?
             ORDER BY id",
        )
        .bind(appointment_id)
        .fetch_all(&self.pool)
        .await?)
    }
}
