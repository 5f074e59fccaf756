//! Appointment lifecycle: who may move an appointment where, and what a call
//! does as a side effect.
//!
//! ```text
//! pending ──call──▶ called ──▶ attended
//!                    │  ▲  └──▶ absent
//!                    └──┘ re-call
//! ```
//!
//! Only the owning doctor may transition an appointment. Ownership is part of
//! every update's `WHERE` clause, so another doctor's appointment looks the
//! same as a missing one (`NotFound`).

use chrono::Utc;

use crate::db::Db;
use crate::errors::{AppError, AppResult};
use crate::models::{Appointment, AppointmentStatus, CallNotification};
use crate::services::{
    appointments::AppointmentStore,
    call_history::{CallLog, NewCallEvent},
    notifier::CallBroadcaster,
};

/// Used when neither the doctor nor the appointment has a room.
const FALLBACK_ROOM: &str = "Consultorio";

#[derive(sqlx::FromRow)]
struct CalledRow {
    ticket_number: String,
    patient_name:  String,
    room:          String,
}

#[derive(Clone)]
pub struct QueueController {
    pool:        Db,
    store:       AppointmentStore,
    broadcaster: CallBroadcaster,
}

impl QueueController {
    pub fn new(pool: Db, broadcaster: CallBroadcaster) -> Self {
        Self {
            store: AppointmentStore::new(pool.clone()),
            pool,
            broadcaster,
        }
    }

    /// Call (or re-call) a patient: `pending|called -> called`.
    ///
    /// Refreshes `called_at`, appends one call-history row in the same
    /// transaction and, after commit, publishes one notification. The
    /// conditional update is the transaction's first statement so the write
    /// lock is taken up front and concurrent calls queue on it.
    pub async fn call(&self, appointment_id: i64, doctor_id: i64) -> AppResult<CallNotification> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let called = sqlx::query_as::<_, CalledRow>(
            "UPDATE appointments SET status = 'called', called_at = ?
             WHERE id = ? AND doctor_id = ? AND status IN ('pending', 'called')
             RETURNING ticket_number, patient_name, room",
        )
        .bind(now.naive_utc())
        .bind(appointment_id)
        .bind(doctor_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(called) = called else {
            tx.rollback().await?;
            return Err(self.not_callable(appointment_id, doctor_id).await);
        };

        let doctor_room = sqlx::query_scalar::<_, Option<String>>("SELECT room FROM users WHERE id = ?")
            .bind(doctor_id)
            .fetch_optional(&mut *tx)
            .await?
            .flatten();

        // The doctor's current room wins over the room stored at booking time.
        let room = doctor_room
            .filter(|r| !r.trim().is_empty())
            .or_else(|| Some(called.room.clone()).filter(|r| !r.trim().is_empty()))
            .unwrap_or_else(|| FALLBACK_ROOM.to_owned());

        CallLog::append(
            &mut *tx,
            &NewCallEvent {
                appointment_id,
                doctor_id,
                ticket_number: &called.ticket_number,
                patient_name:  &called.patient_name,
                room:          &room,
                called_at:     now.naive_utc(),
            },
        )
        .await?;

        tx.commit().await?;

        let notification = CallNotification {
            patient_name:  called.patient_name,
            room,
            ticket_number: called.ticket_number,
            timestamp:     now,
        };
        self.broadcaster.publish(doctor_id, notification.clone());

        tracing::info!(
            appointment_id,
            doctor_id,
            ticket = %notification.ticket_number,
            "Patient called"
        );
        Ok(notification)
    }

    /// Why a call matched no row: missing or foreign (`NotFound`), not
    /// callable from its status, or changed under us (`Conflict`).
    async fn not_callable(&self, appointment_id: i64, doctor_id: i64) -> AppError {
        match self.store.find_owned(appointment_id, doctor_id).await {
            Ok(None) => AppError::NotFound,
            Ok(Some(current)) if !current.status.can_transition_to(AppointmentStatus::Called) => {
                illegal(current.status, AppointmentStatus::Called)
            }
            Ok(Some(_)) => AppError::Conflict("Appointment changed while calling; retry".into()),
            Err(err) => err,
        }
    }

    /// Move an appointment to `target`. A target of `called` goes through
    /// [`QueueController::call`] so the call side effects always happen.
    pub async fn transition(
        &self,
        appointment_id: i64,
        doctor_id: i64,
        target: AppointmentStatus,
    ) -> AppResult<Appointment> {
        match target {
            AppointmentStatus::Called => {
                self.call(appointment_id, doctor_id).await?;
            }
            AppointmentStatus::Cancelled => {
                return Err(AppError::BadRequest(
                    "Invalid status. Allowed: pending, called, attended, absent".into(),
                ));
            }
            _ => {
                let sources = AppointmentStatus::sources_of(target);
                let affected = self
                    .store
                    .update_status(appointment_id, doctor_id, &sources, target)
                    .await?;

                if affected == 0 {
                    let current = self
                        .store
                        .find_owned(appointment_id, doctor_id)
                        .await?
                        .ok_or(AppError::NotFound)?;
                    return Err(illegal(current.status, target));
                }
                tracing::info!(appointment_id, doctor_id, status = %target, "Appointment status updated");
            }
        }

        self.store
            .find_owned(appointment_id, doctor_id)
            .await?
            .ok_or(AppError::NotFound)
    }
}

fn illegal(from: AppointmentStatus, to: AppointmentStatus) -> AppError {
    if from.is_terminal() {
        return AppError::BadRequest(format!("Appointment is already '{from}'"));
    }
    AppError::BadRequest(format!("Cannot change status from '{from}' to '{to}'"))
}
