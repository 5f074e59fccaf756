use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Users ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id:            i64,
    pub username:      String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub full_name:     String,
    pub role:          UserRole,
    pub room:          Option<String>,
    pub specialty:     Option<String>,
    pub is_active:     bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Doctor,
    /// Superuser: passes every role check.
    System,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin  => "admin",
            UserRole::Doctor => "doctor",
            UserRole::System => "system",
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Doctor as exposed through the API and used for specialist matching.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Doctor {
    pub id:        i64,
    pub username:  String,
    pub full_name: String,
    pub room:      Option<String>,
    pub specialty: Option<String>,
    pub is_active: bool,
}

// ── Appointments ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Pending,
    Called,
    Attended,
    Absent,
    /// Present in the schema; no operation sets it.
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending   => "pending",
            AppointmentStatus::Called    => "called",
            AppointmentStatus::Attended  => "attended",
            AppointmentStatus::Absent    => "absent",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }

    /// Lifecycle edges. `called -> called` is a re-call.
    pub fn can_transition_to(self, target: AppointmentStatus) -> bool {
        use AppointmentStatus::*;
        matches!(
            (self, target),
            (Pending, Called) | (Called, Called) | (Called, Attended) | (Called, Absent)
        )
    }

    /// States from which `target` is reachable.
    pub fn sources_of(target: AppointmentStatus) -> Vec<AppointmentStatus> {
        use AppointmentStatus::*;
        [Pending, Called, Attended, Absent, Cancelled]
            .into_iter()
            .filter(|s| s.can_transition_to(target))
            .collect()
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AppointmentStatus::Attended | AppointmentStatus::Absent | AppointmentStatus::Cancelled
        )
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending"   => Ok(AppointmentStatus::Pending),
            "called"    => Ok(AppointmentStatus::Called),
            "attended"  => Ok(AppointmentStatus::Attended),
            "absent"    => Ok(AppointmentStatus::Absent),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            other       => Err(format!("Unknown status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Appointment {
    pub id:               i64,
    pub ticket_number:    String,
    pub patient_name:     String,
    pub patient_document: Option<String>,
    pub doctor_id:        i64,
    pub room:             String,
    pub date:             String, // "YYYY-MM-DD"
    pub time:             String, // "HH:MM"
    pub status:           AppointmentStatus,
    pub notes:            Option<String>,
    pub called_at:        Option<NaiveDateTime>,
    pub attended_at:      Option<NaiveDateTime>,
}

/// Appointment joined with its doctor's display fields (admin listing).
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AppointmentWithDoctor {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub appointment: Appointment,
    pub doctor_name: Option<String>,
    pub specialty:   Option<String>,
}

/// Values for inserting a fresh `pending` appointment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewAppointment {
    pub ticket_number:    String,
    pub patient_name:     String,
    pub patient_document: Option<String>,
    pub doctor_id:        i64,
    pub room:             String,
    pub date:             String,
    pub time:             String,
    pub notes:            Option<String>,
}

// ── Call history ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CallEvent {
    pub id:             i64,
    pub appointment_id: Option<i64>,
    pub doctor_id:      Option<i64>,
    pub ticket_number:  Option<String>,
    pub patient_name:   String,
    pub room:           String,
    pub called_at:      NaiveDateTime,
}

/// Payload pushed to display subscribers on every call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallNotification {
    pub patient_name:  String,
    pub room:          String,
    pub ticket_number: String,
    pub timestamp:     DateTime<Utc>,
}
