//! Roster PDF ingestion: text extraction, row reconstruction, doctor
//! resolution and batch insert.
//!
//! The batch is not transactional. Rows are inserted one at a time; a failed
//! insert is counted and the batch continues.

pub mod doctor_match;
pub mod row_parser;

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::db::Db;
use crate::errors::{AppError, AppResult};
use crate::models::{Appointment, Doctor, NewAppointment};
use crate::services::appointments::{today, AppointmentStore};
use crate::services::doctors::DoctorStore;

use doctor_match::resolve_doctor;
use row_parser::{ConcatenatedColumns, PatientRow, RowParser};

pub const DEFAULT_ROOM: &str = "Consultorio Externo";
const FIRST_SLOT_MINUTES: u32 = 8 * 60;
const SLOT_MINUTES: u32 = 30;

/// Lines containing any of these are roster furniture, never patients.
const HEADER_MARKERS: &[&str] = &[
    "Apellido y nombre",
    "Nro. Doc.",
    "ENTE DESCENTRALIZADO",
    "Servicio:",
    "Especialista:",
    "FECHA:",
];

static DATE_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"FECHA:\s*(\d{4}-\d{2}-\d{2})").expect("valid regex"));
static SPECIALIST_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Especialista:[ \t]*([A-ZÀ-ÿ \t]+)").expect("valid regex"));
static SERVICE_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Servicio:[ \t]*([A-ZÀ-ÿ \t]+)").expect("valid regex"));
// Labels that can share a line with a captured field value.
static NEXT_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(servicio|fecha|especialista)\b").expect("valid regex"));

/// Document-level fields found by anchor search over the whole text.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DocumentHeader {
    pub date:       Option<String>,
    pub specialist: Option<String>,
    pub service:    Option<String>,
}

impl DocumentHeader {
    pub fn parse(text: &str) -> Self {
        Self {
            date:       DATE_FIELD.captures(text).map(|c| c[1].to_owned()),
            specialist: labelled_value(&SPECIALIST_FIELD, text),
            service:    labelled_value(&SERVICE_FIELD, text),
        }
    }
}

fn labelled_value(field: &Regex, text: &str) -> Option<String> {
    let raw = field.captures(text)?.get(1)?.as_str();
    let value = match NEXT_LABEL.find(raw) {
        Some(m) => &raw[..m.start()],
        None => raw,
    };
    let value = value.split_whitespace().collect::<Vec<_>>().join(" ");
    (!value.is_empty()).then_some(value)
}

#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub header: DocumentHeader,
    pub rows:   Vec<PatientRow>,
}

pub fn parse_document(text: &str, parser: &dyn RowParser) -> ParsedDocument {
    let rows = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !HEADER_MARKERS.iter().any(|m| line.contains(m)))
        .filter_map(|line| parser.parse_row(line))
        .collect();

    ParsedDocument {
        header: DocumentHeader::parse(text),
        rows,
    }
}

/// `HH:MM` of the `index`-th slot (0-based), wrapping past midnight.
fn slot_time(index: usize) -> String {
    let minutes = FIRST_SLOT_MINUTES as usize + index * SLOT_MINUTES as usize;
    format!("{:02}:{:02}", (minutes / 60) % 24, minutes % 60)
}

/// Appointments to insert, plus rows dropped because the specialist did not
/// resolve to a doctor.
#[derive(Debug, Clone)]
pub struct ImportPlan {
    pub appointments: Vec<NewAppointment>,
    pub skipped:      usize,
    pub doctor:       Option<Doctor>,
}

/// Assign tickets and time slots to the parsed rows and attach the resolved
/// doctor. `today` fills in a missing document date.
pub fn plan_import(doc: &ParsedDocument, doctors: &[Doctor], today: &str) -> ImportPlan {
    let doctor = doc
        .header
        .specialist
        .as_deref()
        .and_then(|name| resolve_doctor(name, doctors))
        .cloned();

    let Some(ref resolved) = doctor else {
        return ImportPlan {
            appointments: Vec::new(),
            skipped:      doc.rows.len(),
            doctor:       None,
        };
    };

    let room = doc.header.service.clone().unwrap_or_else(|| DEFAULT_ROOM.to_owned());
    let date = doc.header.date.clone().unwrap_or_else(|| today.to_owned());

    let appointments = doc
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| NewAppointment {
            ticket_number:    format!("T{:03}", i + 1),
            patient_name:     row.name.clone(),
            patient_document: Some(row.document.clone()),
            doctor_id:        resolved.id,
            room:             room.clone(),
            date:             date.clone(),
            time:             slot_time(i),
            notes:            row.notes(),
        })
        .collect();

    ImportPlan {
        appointments,
        skipped: 0,
        doctor,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub created:        Vec<Appointment>,
    pub parsed_count:   usize,
    pub inserted_count: usize,
    pub error_count:    usize,
    pub skipped_count:  usize,
}

/// Extract the text layer of a PDF. Runs on the blocking pool.
pub async fn extract_text(bytes: Vec<u8>) -> AppResult<String> {
    tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("PDF extraction task failed: {e}")))?
        .map_err(|e| {
            tracing::warn!(error = %e, "PDF text extraction failed");
            AppError::BadRequest("Could not read text from the PDF".into())
        })
}

#[derive(Clone)]
pub struct PdfImporter {
    appointments: AppointmentStore,
    doctors:      DoctorStore,
    parser:       Arc<dyn RowParser>,
}

impl PdfImporter {
    pub fn new(pool: Db) -> Self {
        Self::with_parser(pool, Arc::new(ConcatenatedColumns))
    }

    pub fn with_parser(pool: Db, parser: Arc<dyn RowParser>) -> Self {
        Self {
            appointments: AppointmentStore::new(pool.clone()),
            doctors:      DoctorStore::new(pool),
            parser,
        }
    }

    pub async fn import_pdf(&self, bytes: Vec<u8>) -> AppResult<ImportReport> {
        let text = extract_text(bytes).await?;
        self.import_text(&text).await
    }

    pub async fn import_text(&self, text: &str) -> AppResult<ImportReport> {
        let parsed = parse_document(text, self.parser.as_ref());
        if parsed.rows.is_empty() {
            return Err(AppError::BadRequest("No appointments found in the PDF".into()));
        }

        let doctors = self.doctors.list_active().await?;
        let plan = plan_import(&parsed, &doctors, &today());
        match plan.doctor {
            Some(ref d) => tracing::info!(
                specialist = ?parsed.header.specialist,
                doctor_id = d.id,
                "Roster specialist resolved"
            ),
            None => tracing::warn!(
                specialist = ?parsed.header.specialist,
                rows = parsed.rows.len(),
                "Roster specialist matched no doctor; rows skipped"
            ),
        }

        let mut created = Vec::with_capacity(plan.appointments.len());
        let mut error_count = 0;
        for new in &plan.appointments {
            match self.appointments.insert(new).await {
                Ok(appt) => created.push(appt),
                Err(err) => {
                    error_count += 1;
                    tracing::warn!(ticket = %new.ticket_number, error = %err, "Roster row insert failed");
                }
            }
        }

        let report = ImportReport {
            parsed_count:   parsed.rows.len(),
            inserted_count: created.len(),
            error_count,
            skipped_count:  plan.skipped,
            created,
        };
        tracing::info!(
            inserted = report.inserted_count,
            errors = report.error_count,
            skipped = report.skipped_count,
            "Roster import finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::models::AppointmentStatus;
    use crate::services::appointments::tests::insert_doctor;

    const ROSTER: &str = "\
ENTE DESCENTRALIZADO HOSPITAL
Servicio: CLINICA MEDICA
Especialista: Stadler Karina
FECHA: 2026-03-02
Apellido y nombre Nro. Doc. Edad Obra Social HCE
GONZALEZ ANA12345678 34OSDE () 1234567
PEREZ JUAN1234567845OSDE1234567

Pagina 1 de 1
";

    fn doctor(id: i64, username: &str, full_name: &str) -> Doctor {
        Doctor {
            id,
            username:  username.into(),
            full_name: full_name.into(),
            room:      None,
            specialty: None,
            is_active: true,
        }
    }

    #[test]
    fn header_fields_are_found() {
        let header = DocumentHeader::parse(ROSTER);
        assert_eq!(header.date.as_deref(), Some("2026-03-02"));
        assert_eq!(header.specialist.as_deref(), Some("Stadler Karina"));
        assert_eq!(header.service.as_deref(), Some("CLINICA MEDICA"));
    }

    #[test]
    fn fields_sharing_a_line_are_split() {
        let header = DocumentHeader::parse("Servicio: PEDIATRIA Especialista: DIAZ BRUNO FECHA: 2026-01-05");
        assert_eq!(header.service.as_deref(), Some("PEDIATRIA"));
        assert_eq!(header.specialist.as_deref(), Some("DIAZ BRUNO"));
        assert_eq!(header.date.as_deref(), Some("2026-01-05"));
    }

    #[test]
    fn plan_assigns_tickets_slots_and_defaults() {
        let text = "Especialista: Stadler Karina\nGONZALEZ ANA12345678 34OSDE () 1234567\nPEREZ JUAN1234567845OSDE1234567";
        let parsed = parse_document(text, &ConcatenatedColumns);
        let doctors = vec![doctor(1, "bdiaz", "Bruno Diaz"), doctor(2, "kstadler", "Karina Stadler")];

        let plan = plan_import(&parsed, &doctors, "2026-04-10");
        assert_eq!(plan.skipped, 0);
        assert_eq!(plan.appointments.len(), 2);

        let first = &plan.appointments[0];
        assert_eq!(first.ticket_number, "T001");
        assert_eq!(first.time, "08:00");
        assert_eq!(first.patient_name, "GONZALEZ ANA");
        assert_eq!(first.patient_document.as_deref(), Some("12345678"));
        assert_eq!(first.doctor_id, 2);
        assert_eq!(first.room, DEFAULT_ROOM);
        assert_eq!(first.date, "2026-04-10");

        assert_eq!(plan.appointments[1].ticket_number, "T002");
        assert_eq!(plan.appointments[1].time, "08:30");
    }

    #[test]
    fn unresolved_specialist_skips_every_row() {
        let text = "Especialista: Fernandez Pablo\nGONZALEZ ANA12345678 34OSDE () 1234567";
        let parsed = parse_document(text, &ConcatenatedColumns);
        let plan = plan_import(&parsed, &[doctor(2, "kstadler", "Karina Stadler")], "2026-04-10");
        assert!(plan.appointments.is_empty());
        assert_eq!(plan.skipped, 1);
    }

    #[test]
    fn slots_wrap_past_midnight() {
        assert_eq!(slot_time(0), "08:00");
        assert_eq!(slot_time(3), "09:30");
        assert_eq!(slot_time(32), "00:00");
    }

    #[tokio::test]
    async fn import_inserts_resolved_rows() {
        let (pool, _dir) = test_pool().await;
        let doc_id = insert_doctor(&pool, "kstadler", "Karina Stadler", "Consultorio 3").await;

        let report = PdfImporter::new(pool).import_text(ROSTER).await.unwrap();
        assert_eq!(report.parsed_count, 2);
        assert_eq!(report.inserted_count, 2);
        assert_eq!(report.error_count, 0);
        assert_eq!(report.skipped_count, 0);

        let first = &report.created[0];
        assert_eq!(first.ticket_number, "T001");
        assert_eq!(first.time, "08:00");
        assert_eq!(first.doctor_id, doc_id);
        assert_eq!(first.room, "CLINICA MEDICA");
        assert_eq!(first.date, "2026-03-02");
        assert_eq!(first.status, AppointmentStatus::Pending);
        assert_eq!(first.notes.as_deref(), Some("Age: 34, Insurer: OSDE ()"));
    }

    #[tokio::test]
    async fn import_with_unknown_specialist_creates_nothing() {
        let (pool, _dir) = test_pool().await;
        insert_doctor(&pool, "bdiaz", "Bruno Diaz", "Consultorio 4").await;

        let report = PdfImporter::new(pool.clone()).import_text(ROSTER).await.unwrap();
        assert!(report.created.is_empty());
        assert_eq!(report.inserted_count, 0);
        assert_eq!(report.error_count, 0);
        assert_eq!(report.skipped_count, 2);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM appointments")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn text_without_rows_is_rejected() {
        let (pool, _dir) = test_pool().await;
        let err = PdfImporter::new(pool)
            .import_text("Especialista: Stadler Karina\nnothing here")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn failed_row_is_counted_and_the_rest_inserted() {
        let (pool, _dir) = test_pool().await;
        insert_doctor(&pool, "kstadler", "Karina Stadler", "Consultorio 3").await;
        sqlx::query(
            "CREATE TRIGGER reject_t001 BEFORE INSERT ON appointments
             WHEN NEW.ticket_number = 'T001'
             BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .execute(&pool)
        .await
        .unwrap();

        let report = PdfImporter::new(pool).import_text(ROSTER).await.unwrap();
        assert_eq!(report.parsed_count, 2);
        assert_eq!(report.inserted_count, 1);
        assert_eq!(report.error_count, 1);
        assert_eq!(report.created[0].ticket_number, "T002");
        assert_eq!(report.created[0].time, "08:30");
    }
}
