//! Appointment persistence.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize};
use sqlx::{QueryBuilder, Sqlite};

use crate::db::Db;
use crate::errors::{AppError, AppResult};
use crate::models::{Appointment, AppointmentStatus, AppointmentWithDoctor, NewAppointment};

const APPOINTMENT_COLUMNS: &str =
    "id, ticket_number, patient_name, patient_document, doctor_id, room, date, time,
     status, notes, called_at, attended_at";

/// Additive (AND-combined) listing filter. Blank query values mean "any".
#[derive(Debug, Default, Clone, Deserialize)]
pub struct AppointmentFilter {
    #[serde(default, deserialize_with = "blank_as_none")]
    pub date:      Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub status:    Option<AppointmentStatus>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub doctor_id: Option<i64>,
}

pub(crate) fn blank_as_none<'de, D, T>(de: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    match Option::<String>::deserialize(de)?.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct StatusCounts {
    pub total:    i64,
    pub pending:  i64,
    pub called:   i64,
    pub attended: i64,
    pub absent:   i64,
}

#[derive(Clone)]
pub struct AppointmentStore {
    pool: Db,
}

impl AppointmentStore {
    pub fn new(pool: Db) -> Self {
        Self { pool }
    }

    /// Insert a `pending` appointment. Fails with `BadRequest` when
    /// `doctor_id` is not a doctor account.
    pub async fn insert(&self, new: &NewAppointment) -> AppResult<Appointment> {
        let sql = format!(
            "INSERT INTO appointments
                (ticket_number, patient_name, patient_document, doctor_id, room, date, time, notes)
             SELECT ?, ?, ?, id, ?, ?, ?, ?
             FROM users WHERE id = ? AND role = 'doctor'
             RETURNING {APPOINTMENT_COLUMNS}"
        );
        sqlx::query_as::<_, Appointment>(&sql)
            .bind(&new.ticket_number)
            .bind(&new.patient_name)
            .bind(&new.patient_document)
            .bind(&new.room)
            .bind(&new.date)
            .bind(&new.time)
            .bind(&new.notes)
            .bind(new.doctor_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| {
                AppError::BadRequest(format!("doctor_id {} does not reference a doctor", new.doctor_id))
            })
    }

    /// Ordered by date descending, then time ascending.
    pub async fn list(&self, filter: &AppointmentFilter) -> AppResult<Vec<AppointmentWithDoctor>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT a.id, a.ticket_number, a.patient_name, a.patient_document, a.doctor_id,
                    a.room, a.date, a.time, a.status, a.notes, a.called_at, a.attended_at,
                    u.full_name AS doctor_name, u.specialty
             FROM appointments a
             LEFT JOIN users u ON u.id = a.doctor_id
             WHERE 1 = 1",
        );
        if let Some(ref date) = filter.date {
            qb.push(" AND a.date = ").push_bind(date.clone());
        }
        if let Some(status) = filter.status {
            qb.push(" AND a.status = ").push_bind(status);
        }
        if let Some(doctor_id) = filter.doctor_id {
            qb.push(" AND a.doctor_id = ").push_bind(doctor_id);
        }
        qb.push(" ORDER BY a.date DESC, a.time ASC, a.id ASC");

        Ok(qb
            .build_query_as::<AppointmentWithDoctor>()
            .fetch_all(&self.pool)
            .await?)
    }

    /// A doctor's queue for one day, ordered by time only.
    pub async fn list_for_doctor(&self, doctor_id: i64, date: &str) -> AppResult<Vec<Appointment>> {
        let sql = format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments
             WHERE doctor_id = ? AND date = ?
             ORDER BY time ASC, id ASC"
        );
        Ok(sqlx::query_as::<_, Appointment>(&sql)
            .bind(doctor_id)
            .bind(date)
            .fetch_all(&self.pool)
            .await?)
    }

    #[cfg(test)]
    pub async fn find(&self, id: i64) -> AppResult<Option<Appointment>> {
        let sql = format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = ?");
        Ok(sqlx::query_as::<_, Appointment>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Lookup scoped to the owning doctor; another doctor's row is `None`.
    pub async fn find_owned(&self, id: i64, doctor_id: i64) -> AppResult<Option<Appointment>> {
        let sql = format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = ? AND doctor_id = ?"
        );
        Ok(sqlx::query_as::<_, Appointment>(&sql)
            .bind(id)
            .bind(doctor_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Single-row conditional update: applies only when the row belongs to
    /// `doctor_id` and is currently in one of `from`. Returns rows changed.
    pub async fn update_status(
        &self,
        id: i64,
        doctor_id: i64,
        from: &[AppointmentStatus],
        to: AppointmentStatus,
    ) -> AppResult<u64> {
        if from.is_empty() {
            return Ok(0);
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE appointments SET status = ");
        qb.push_bind(to);
        if to == AppointmentStatus::Attended {
            qb.push(", attended_at = ").push_bind(chrono::Utc::now().naive_utc());
        }
        qb.push(" WHERE id = ").push_bind(id);
        qb.push(" AND doctor_id = ").push_bind(doctor_id);
        qb.push(" AND status IN (");
        let mut sep = qb.separated(", ");
        for status in from {
            sep.push_bind(*status);
        }
        sep.push_unseparated(")");

        Ok(qb.build().execute(&self.pool).await?.rows_affected())
    }

    pub async fn delete(&self, id: i64) -> AppResult<bool> {
        let affected = sqlx::query("DELETE FROM appointments WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(affected > 0)
    }

    pub async fn delete_by_date(&self, date: &str) -> AppResult<u64> {
        Ok(sqlx::query("DELETE FROM appointments WHERE date = ?")
            .bind(date)
            .execute(&self.pool)
            .await?
            .rows_affected())
    }

    /// Appointments still waiting on the doctor (`pending` or `called`).
    pub async fn open_count_for_doctor(&self, doctor_id: i64) -> AppResult<i64> {
        Ok(sqlx::query_scalar(
            "SELECT COUNT(*) FROM appointments
             WHERE doctor_id = ? AND status IN ('pending', 'called')",
        )
        .bind(doctor_id)
        .fetch_one(&self.pool)
        .await?)
    }

    pub async fn counts_for_doctor(&self, doctor_id: i64) -> AppResult<StatusCounts> {
        let sql = format!("{COUNTS_SELECT} WHERE doctor_id = ?");
        Ok(sqlx::query_as::<_, StatusCounts>(&sql)
            .bind(doctor_id)
            .fetch_one(&self.pool)
            .await?)
    }

    pub async fn counts_for_date(&self, date: &str) -> AppResult<StatusCounts> {
        let sql = format!("{COUNTS_SELECT} WHERE date = ?");
        Ok(sqlx::query_as::<_, StatusCounts>(&sql)
            .bind(date)
            .fetch_one(&self.pool)
            .await?)
    }
}

const COUNTS_SELECT: &str =
    "SELECT COUNT(*) AS total,
            COALESCE(SUM(CASE WHEN status = 'pending'  THEN 1 ELSE 0 END), 0) AS pending,
            COALESCE(SUM(CASE WHEN status = 'called'   THEN 1 ELSE 0 END), 0) AS called,
            COALESCE(SUM(CASE WHEN status = 'attended' THEN 1 ELSE 0 END), 0) AS attended,
            COALESCE(SUM(CASE WHEN status = 'absent'   THEN 1 ELSE 0 END), 0) AS absent
     FROM appointments";

/// Today's date in `YYYY-MM-DD`, server local time.
pub fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::test_pool;

    pub(crate) async fn insert_doctor(pool: &Db, username: &str, full_name: &str, room: &str) -> i64 {
        sqlx::query(
            "INSERT INTO users (username, password_hash, full_name, role, room)
             VALUES (?, 'x', ?, 'doctor', ?)",
        )
        .bind(username)
        .bind(full_name)
        .bind(room)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
    }

    pub(crate) fn new_appointment(doctor_id: i64, ticket: &str, date: &str, time: &str) -> NewAppointment {
        NewAppointment {
            ticket_number:    ticket.into(),
            patient_name:     format!("PATIENT {ticket}"),
            patient_document: Some("12345678".into()),
            doctor_id,
            room:             "Consultorio 1".into(),
            date:             date.into(),
            time:             time.into(),
            notes:            None,
        }
    }

    #[tokio::test]
    async fn insert_starts_pending() {
        let (pool, _dir) = test_pool().await;
        let doc = insert_doctor(&pool, "ana", "Ana Perez", "C1").await;
        let store = AppointmentStore::new(pool);

        let a = store.insert(&new_appointment(doc, "T001", "2026-03-01", "08:00")).await.unwrap();
        assert_eq!(a.status, AppointmentStatus::Pending);
        assert_eq!(a.ticket_number, "T001");
        assert!(a.called_at.is_none());
    }

    #[tokio::test]
    async fn insert_requires_doctor_role() {
        let (pool, _dir) = test_pool().await;
        sqlx::query(
            "INSERT INTO users (username, password_hash, full_name, role) VALUES ('boss', 'x', 'Boss', 'admin')",
        )
        .execute(&pool)
        .await
        .unwrap();
        let store = AppointmentStore::new(pool);

        let err = store.insert(&new_appointment(1, "T001", "2026-03-01", "08:00")).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        let err = store.insert(&new_appointment(99, "T001", "2026-03-01", "08:00")).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn list_orders_and_filters() {
        let (pool, _dir) = test_pool().await;
        let a = insert_doctor(&pool, "ana", "Ana Perez", "C1").await;
        let b = insert_doctor(&pool, "bob", "Bob Diaz", "C2").await;
        let store = AppointmentStore::new(pool);

        store.insert(&new_appointment(a, "T002", "2026-03-01", "09:00")).await.unwrap();
        store.insert(&new_appointment(a, "T001", "2026-03-01", "08:00")).await.unwrap();
        store.insert(&new_appointment(b, "T003", "2026-03-02", "10:00")).await.unwrap();

        let all = store.list(&AppointmentFilter::default()).await.unwrap();
        let tickets: Vec<_> = all.iter().map(|r| r.appointment.ticket_number.as_str()).collect();
        assert_eq!(tickets, vec!["T003", "T001", "T002"]);
        assert_eq!(all[0].doctor_name.as_deref(), Some("Bob Diaz"));

        let filtered = store
            .list(&AppointmentFilter {
                date:      Some("2026-03-01".into()),
                status:    Some(AppointmentStatus::Pending),
                doctor_id: None,
            })
            .await
            .unwrap();
        assert_eq!(filtered.len(), 2);

        let none = store
            .list(&AppointmentFilter {
                date:      Some("2026-03-01".into()),
                status:    Some(AppointmentStatus::Called),
                doctor_id: None,
            })
            .await
            .unwrap();
        assert!(none.is_empty());

        let mine = store.list_for_doctor(a, "2026-03-01").await.unwrap();
        let times: Vec<_> = mine.iter().map(|r| r.time.as_str()).collect();
        assert_eq!(times, vec!["08:00", "09:00"]);
    }

    #[tokio::test]
    async fn conditional_update_respects_owner_and_source() {
        let (pool, _dir) = test_pool().await;
        let a = insert_doctor(&pool, "ana", "Ana Perez", "C1").await;
        let b = insert_doctor(&pool, "bob", "Bob Diaz", "C2").await;
        let store = AppointmentStore::new(pool);
        let appt = store.insert(&new_appointment(a, "T001", "2026-03-01", "08:00")).await.unwrap();

        use AppointmentStatus::*;
        assert_eq!(store.update_status(appt.id, b, &[Pending], Called).await.unwrap(), 0);
        assert_eq!(store.update_status(appt.id, a, &[Called], Attended).await.unwrap(), 0);
        assert_eq!(store.update_status(appt.id, a, &[Pending], Called).await.unwrap(), 1);
        assert_eq!(store.update_status(appt.id, a, &[Called], Attended).await.unwrap(), 1);

        let done = store.find(appt.id).await.unwrap().unwrap();
        assert_eq!(done.status, Attended);
        assert!(done.attended_at.is_some());
    }

    #[tokio::test]
    async fn delete_and_purge() {
        let (pool, _dir) = test_pool().await;
        let a = insert_doctor(&pool, "ana", "Ana Perez", "C1").await;
        let store = AppointmentStore::new(pool);
        let one = store.insert(&new_appointment(a, "T001", "2026-03-01", "08:00")).await.unwrap();
        store.insert(&new_appointment(a, "T002", "2026-03-01", "08:30")).await.unwrap();
        store.insert(&new_appointment(a, "T003", "2026-03-02", "08:00")).await.unwrap();

        assert!(store.delete(one.id).await.unwrap());
        assert!(!store.delete(one.id).await.unwrap());
        assert_eq!(store.delete_by_date("2026-03-01").await.unwrap(), 1);
        assert_eq!(store.open_count_for_doctor(a).await.unwrap(), 1);

        let counts = store.counts_for_date("2026-03-02").await.unwrap();
        assert_eq!(counts, StatusCounts { total: 1, pending: 1, ..Default::default() });
    }
}
