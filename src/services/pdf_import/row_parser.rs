//! Patient-row extraction from a single line of roster text.
//!
//! The roster's text layer has no separators between columns, so a line such
//! as `PEREZ JUAN1234567845OSDE1234567` has to be split on character-class
//! boundaries. Parsers are swappable per report format through [`RowParser`].

use once_cell::sync::Lazy;
use regex::Regex;

/// One patient line as recovered from the roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatientRow {
    pub name:     String,
    pub document: String,
    pub age:      Option<String>,
    pub insurer:  Option<String>,
    pub record:   Option<String>,
}

impl PatientRow {
    /// Free-text notes stored with the appointment. Only present parts are listed.
    pub fn notes(&self) -> Option<String> {
        let parts: Vec<String> = [
            ("Age", &self.age),
            ("Insurer", &self.insurer),
            ("Record", &self.record),
        ]
        .into_iter()
        .filter_map(|(label, value)| value.as_ref().map(|v| format!("{label}: {v}")))
        .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }
}

pub trait RowParser: Send + Sync {
    /// `None` means the line is not a patient row; that is never an error.
    fn parse_row(&self, line: &str) -> Option<PatientRow>;
}

// SURNAME NAME + document(7-8) + age(1-2) + insurer + record digits
static STRICT_ROW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-ZÁ-ÿ][A-ZÁ-ÿ]+)\s*([A-ZÁ-ÿ]+)(\d{7,8})(\d{1,2})([A-ZÁ-ÿ\s()]+)(\d+)(\d*)$")
        .expect("valid regex")
});
static DOCUMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{8})").expect("valid regex"));
static NAME_PAIR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-ZÁ-ÿ][A-ZÁ-ÿ]+)\s*([A-ZÁ-ÿ]+)").expect("valid regex"));
static AGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(\d{1,2})").expect("valid regex"));
static INSURER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\d{1,2}([A-ZÁ-ÿ\s()]+)").expect("valid regex"));
static TRAILING_RECORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{8})$").expect("valid regex"));

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_owned())
}

/// Parser for the concatenated-column hospital roster.
///
/// Tries one strict whole-line pattern first. Failing that, anchors on the
/// first 8-digit run (the document number) and reads the name from before it
/// and the age and insurer from after it.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConcatenatedColumns;

impl ConcatenatedColumns {
    fn strict(line: &str) -> Option<PatientRow> {
        let caps = STRICT_ROW.captures(line)?;
        Some(PatientRow {
            name:     format!("{} {}", &caps[1], &caps[2]),
            document: caps[3].to_owned(),
            age:      non_empty(&caps[4]),
            insurer:  non_empty(&caps[5]),
            record:   non_empty(&caps[6]),
        })
    }

    fn anchored_on_document(line: &str) -> Option<PatientRow> {
        let doc = DOCUMENT.find(line)?;
        let before = &line[..doc.start()];
        let after = &line[doc.end()..];

        let name = NAME_PAIR
            .captures(before)
            .map(|c| format!("{} {}", &c[1], &c[2]))?;

        Some(PatientRow {
            name,
            document: doc.as_str().to_owned(),
            age:      AGE.captures(after).and_then(|c| non_empty(&c[1])),
            insurer:  INSURER.captures(after).and_then(|c| non_empty(&c[1])),
            record:   TRAILING_RECORD.captures(line).and_then(|c| non_empty(&c[1])),
        })
    }
}

impl RowParser for ConcatenatedColumns {
    fn parse_row(&self, line: &str) -> Option<PatientRow> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        Self::strict(line).or_else(|| Self::anchored_on_document(line))
    }
}
