//! Resolve the free-text specialist printed on a roster to a registered doctor.

use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

use crate::models::Doctor;

/// Strip diacritics, collapse whitespace, uppercase.
pub fn normalize(text: &str) -> String {
    let stripped: String = text.nfd().filter(|c| !is_combining_mark(*c)).collect();
    stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

fn tokens(text: &str) -> Vec<String> {
    normalize(text).split(' ').filter(|t| !t.is_empty()).map(str::to_owned).collect()
}

/// First match wins, tier by tier, in input order:
///
/// 1. token overlap with the full name (two tokens when the raw name has two
///    or more, otherwise one);
/// 2. the raw name's first token appears among the full name's tokens;
/// 3. the first token is a substring of the username.
pub fn resolve_doctor<'a>(raw: &str, doctors: &'a [Doctor]) -> Option<&'a Doctor> {
    let wanted = tokens(raw);
    let first = wanted.first()?;
    let needed = if wanted.len() >= 2 { 2 } else { 1 };

    let names: Vec<Vec<String>> = doctors.iter().map(|d| tokens(&d.full_name)).collect();

    let overlap = doctors.iter().zip(&names).find(|(_, name)| {
        wanted.iter().filter(|t| name.contains(t)).count() >= needed
    });
    if let Some((doctor, _)) = overlap {
        return Some(doctor);
    }

    let by_first = doctors.iter().zip(&names).find(|(_, name)| name.contains(first));
    if let Some((doctor, _)) = by_first {
        return Some(doctor);
    }

    doctors.iter().find(|d| normalize(&d.username).contains(first.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn normalize_strips_accents_and_spacing() {
        assert_eq!(normalize("  José   Pérez\tÑandú "), "JOSE PEREZ NANDU");
    }

    #[test]
    fn reversed_name_order_matches() {
        let doctors = vec![doctor(1, "bdiaz", "Bruno Díaz"), doctor(2, "kstadler", "Karina Stadler")];
        assert_eq!(resolve_doctor("Stadler Karina", &doctors).map(|d| d.id), Some(2));
        assert_eq!(resolve_doctor("DIAZ BRUNO", &doctors).map(|d| d.id), Some(1));
    }

    #[test]
    fn two_token_name_needs_two_overlaps_before_falling_back() {
        // "Karina Lopez" shares one token with each; tier 1 fails for both and
        // tier 2 picks the first doctor whose name contains "KARINA".
        let doctors = vec![doctor(1, "mlopez", "Marta Lopez"), doctor(2, "kstadler", "Karina Stadler")];
        assert_eq!(resolve_doctor("Karina Lopez", &doctors).map(|d| d.id), Some(2));
    }

    #[test]
    fn first_match_in_input_order_wins() {
        let doctors = vec![doctor(7, "agarcia", "Ana Garcia"), doctor(8, "lgarcia", "Luis Garcia")];
        assert_eq!(resolve_doctor("GARCIA", &doctors).map(|d| d.id), Some(7));
    }

    #[test]
    fn username_is_the_last_resort() {
        let doctors = vec![doctor(3, "dr.mendez", "Laura Gomez")];
        assert_eq!(resolve_doctor("Méndez Rosa", &doctors).map(|d| d.id), Some(3));
    }

    #[test]
    fn unknown_or_blank_names_do_not_resolve() {
        let doctors = vec![doctor(1, "kstadler", "Karina Stadler")];
        assert!(resolve_doctor("Fernandez Pablo", &doctors).is_none());
        assert!(resolve_doctor("   ", &doctors).is_none());
        assert!(resolve_doctor("Stadler", &[]).is_none());
    }
}
