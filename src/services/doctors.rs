//! Doctor accounts: `users` rows with role `doctor`.

use crate::auth::hash_password;
use crate::db::Db;
use crate::errors::{AppError, AppResult};
use crate::models::Doctor;
use crate::services::appointments::AppointmentStore;

const DOCTOR_COLUMNS: &str = "id, username, full_name, room, specialty, is_active";

#[derive(Debug, Clone)]
pub struct NewDoctor {
    pub username:  String,
    pub password:  String,
    pub full_name: String,
    pub room:      String,
    pub specialty: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DoctorUpdate {
    pub username:  String,
    pub full_name: String,
    pub room:      String,
    pub specialty: Option<String>,
    pub is_active: Option<bool>,
    /// Re-hashed only when present and non-blank.
    pub password:  Option<String>,
}

#[derive(Clone)]
pub struct DoctorStore {
    pool: Db,
}

impl DoctorStore {
    pub fn new(pool: Db) -> Self {
        Self { pool }
    }

    /// All doctors ordered by full name.
    pub async fn list(&self) -> AppResult<Vec<Doctor>> {
        let sql = format!(
            "SELECT {DOCTOR_COLUMNS} FROM users WHERE role = 'doctor' ORDER BY full_name, id"
        );
        Ok(sqlx::query_as::<_, Doctor>(&sql).fetch_all(&self.pool).await?)
    }

    /// Active doctors in id order; this is the candidate list for roster matching.
    pub async fn list_active(&self) -> AppResult<Vec<Doctor>> {
        let sql = format!(
            "SELECT {DOCTOR_COLUMNS} FROM users WHERE role = 'doctor' AND is_active = 1 ORDER BY id"
        );
        Ok(sqlx::query_as::<_, Doctor>(&sql).fetch_all(&self.pool).await?)
    }

    pub async fn find(&self, id: i64) -> AppResult<Option<Doctor>> {
        let sql = format!("SELECT {DOCTOR_COLUMNS} FROM users WHERE id = ? AND role = 'doctor'");
        Ok(sqlx::query_as::<_, Doctor>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn create(&self, new: &NewDoctor) -> AppResult<Doctor> {
        let hash = hash_password(&new.password)?;
        let sql = format!(
            "INSERT INTO users (username, password_hash, full_name, role, room, specialty)
             VALUES (?, ?, ?, 'doctor', ?, ?)
             RETURNING {DOCTOR_COLUMNS}"
        );
        let doctor = sqlx::query_as::<_, Doctor>(&sql)
            .bind(new.username.trim())
            .bind(&hash)
            .bind(new.full_name.trim())
            .bind(new.room.trim())
            .bind(&new.specialty)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| duplicate_username(e, &new.username))?;

        tracing::info!(doctor_id = doctor.id, username = %doctor.username, "Doctor created");
        Ok(doctor)
    }

    pub async fn update(&self, id: i64, update: &DoctorUpdate) -> AppResult<Doctor> {
        let hash = match update.password.as_deref().map(str::trim) {
            Some(pw) if !pw.is_empty() => Some(hash_password(pw)?),
            _ => None,
        };

        let sql = format!(
            "UPDATE users SET
                username      = ?,
                full_name     = ?,
                room          = ?,
                specialty     = ?,
                is_active     = COALESCE(?, is_active),
                password_hash = COALESCE(?, password_hash)
             WHERE id = ? AND role = 'doctor'
             RETURNING {DOCTOR_COLUMNS}"
        );
        let doctor = sqlx::query_as::<_, Doctor>(&sql)
            .bind(update.username.trim())
            .bind(update.full_name.trim())
            .bind(update.room.trim())
            .bind(&update.specialty)
            .bind(update.is_active)
            .bind(hash)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| duplicate_username(e, &update.username))?
            .ok_or(AppError::NotFound)?;

        tracing::info!(doctor_id = id, "Doctor updated");
        Ok(doctor)
    }

    /// Refused while any appointment still references the doctor; the guard
    /// and the delete are one statement. Call history survives with a null
    /// `doctor_id`.
    pub async fn delete(&self, id: i64) -> AppResult<()> {
        let affected = sqlx::query(
            "DELETE FROM users
             WHERE id = ? AND role = 'doctor'
               AND NOT EXISTS (SELECT 1 FROM appointments WHERE doctor_id = users.id)",
        )
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            if self.find(id).await?.is_none() {
                return Err(AppError::NotFound);
            }
            let open = AppointmentStore::new(self.pool.clone()).open_count_for_doctor(id).await?;
            if open > 0 {
                return Err(AppError::BadRequest(format!(
                    "Doctor has {open} open appointment(s); resolve or delete them first"
                )));
            }
            return Err(AppError::BadRequest(
                "Doctor still has past appointments on record; deactivate the account instead".into(),
            ));
        }
        tracing::info!(doctor_id = id, "Doctor deleted");
        Ok(())
    }
}

fn duplicate_username(err: sqlx::Error, username: &str) -> AppError {
    match AppError::from(err) {
        AppError::Conflict(_) => AppError::Conflict(format!("Username '{}' already exists", username.trim())),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::models::AppointmentStatus;
    use crate::services::appointments::tests::new_appointment;
    use crate::services::call_history::CallLog;
    use crate::services::notifier::CallBroadcaster;
    use crate::services::queue::QueueController;

    fn karina() -> NewDoctor {
        NewDoctor {
            username:  "kstadler".into(),
            password:  "clinica2024".into(),
            full_name: "Karina Stadler".into(),
            room:      "Consultorio 3".into(),
            specialty: Some("Cardiologia".into()),
        }
    }

    #[tokio::test]
    async fn create_list_and_reject_duplicates() {
        let (pool, _dir) = test_pool().await;
        let store = DoctorStore::new(pool);

        let created = store.create(&karina()).await.unwrap();
        assert!(created.is_active);
        assert_eq!(store.list().await.unwrap().len(), 1);

        let err = store.create(&karina()).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn update_keeps_password_when_blank() {
        let (pool, _dir) = test_pool().await;
        let store = DoctorStore::new(pool.clone());
        let doc = store.create(&karina()).await.unwrap();
        let before: String = sqlx::query_scalar("SELECT password_hash FROM users WHERE id = ?")
            .bind(doc.id)
            .fetch_one(&pool)
            .await
            .unwrap();

        let updated = store
            .update(
                doc.id,
                &DoctorUpdate {
                    username:  "kstadler".into(),
                    full_name: "Karina Stadler".into(),
                    room:      "Consultorio 5".into(),
                    specialty: None,
                    is_active: Some(false),
                    password:  Some("  ".into()),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.room.as_deref(), Some("Consultorio 5"));
        assert!(!updated.is_active);
        assert!(store.list_active().await.unwrap().is_empty());

        let after: String = sqlx::query_scalar("SELECT password_hash FROM users WHERE id = ?")
            .bind(doc.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn delete_refused_with_open_appointments() {
        let (pool, _dir) = test_pool().await;
        let store = DoctorStore::new(pool.clone());
        let doc = store.create(&karina()).await.unwrap();
        let appts = AppointmentStore::new(pool);
        let appt = appts.insert(&new_appointment(doc.id, "T001", "2026-03-01", "08:00")).await.unwrap();

        let err = store.delete(doc.id).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(ref m) if m.contains('1')));

        appts.delete(appt.id).await.unwrap();
        store.delete(doc.id).await.unwrap();
        assert!(matches!(store.delete(doc.id).await, Err(AppError::NotFound)));
    }

    #[tokio::test]
    async fn delete_keeps_finished_appointments_and_history() {
        let (pool, _dir) = test_pool().await;
        let store = DoctorStore::new(pool.clone());
        let doc = store.create(&karina()).await.unwrap();
        let appts = AppointmentStore::new(pool.clone());
        let appt = appts.insert(&new_appointment(doc.id, "T001", "2026-03-01", "08:00")).await.unwrap();

        let queue = QueueController::new(pool.clone(), CallBroadcaster::new());
        queue.call(appt.id, doc.id).await.unwrap();
        queue.transition(appt.id, doc.id, AppointmentStatus::Attended).await.unwrap();

        let err = store.delete(doc.id).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(ref m) if m.contains("deactivate")));
        assert!(appts.find(appt.id).await.unwrap().is_some());

        let log = CallLog::new(pool);
        assert_eq!(log.for_appointment(appt.id).await.unwrap().len(), 1);

        appts.delete_by_date("2026-03-01").await.unwrap();
        store.delete(doc.id).await.unwrap();

        let history = log.recent(10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].doctor_id, None);
        assert_eq!(history[0].ticket_number.as_deref(), Some("T001"));
    }
}
