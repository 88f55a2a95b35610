use chrono::{DateTime, Utc};
use serial_protocol::ProductionNote;
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub const EXTERNAL_NOTE_SOURCE: &str = "external";

/// Builds the production note to append for the order's external note, if any.
///
/// Blank notes are ignored, and a note whose `(source, text)` pair was already
/// recorded is never recorded again.
pub fn note_to_record(
    order_id: &str,
    source: &str,
    external_note: Option<&str>,
    existing: &[ProductionNote],
    now: DateTime<Utc>,
) -> Option<ProductionNote> {
    let text = external_note.map(str::trim).filter(|text| !text.is_empty())?;
    if is_recorded(existing, source, text) {
        return None;
    }
    Some(ProductionNote {
        id: Uuid::new_v4(),
        order_id: order_id.to_string(),
        source: source.to_string(),
        text: text.to_string(),
        recorded_at: now,
    })
}

pub fn is_recorded(existing: &[ProductionNote], source: &str, text: &str) -> bool {
    existing
        .iter()
        .any(|note| note.source == source && note.text == text)
}

/// Stable hex key for a `(source, text)` pair.
#[must_use]
pub fn note_fingerprint(source: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update([0u8]);
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    digest[..16].iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn records_new_note_trimmed() {
        let note = note_to_record(
            "o1",
            EXTERNAL_NOTE_SOURCE,
            Some("  please engrave 'Mira'  "),
            &[],
            Utc::now(),
        )
        .expect("note");
        assert_eq!(note.text, "please engrave 'Mira'");
        assert_eq!(note.source, EXTERNAL_NOTE_SOURCE);
    }

    #[test]
    fn skips_blank_and_already_recorded_notes() {
        let first = note_to_record("o1", EXTERNAL_NOTE_SOURCE, Some("rush"), &[], Utc::now())
            .expect("note");
        assert!(note_to_record("o1", EXTERNAL_NOTE_SOURCE, Some("   "), &[], Utc::now()).is_none());
        assert!(note_to_record("o1", EXTERNAL_NOTE_SOURCE, None, &[], Utc::now()).is_none());
        assert!(note_to_record(
            "o1",
            EXTERNAL_NOTE_SOURCE,
            Some("rush "),
            std::slice::from_ref(&first),
            Utc::now()
        )
        .is_none());
        assert!(note_to_record("o1", "workshop", Some("rush"), &[first], Utc::now()).is_some());
    }

    #[test]
    fn fingerprint_separates_source_and_text() {
        assert_eq!(note_fingerprint("a", "b"), note_fingerprint("a", "b"));
        assert_ne!(note_fingerprint("ab", ""), note_fingerprint("a", "b"));
        assert_eq!(note_fingerprint("a", "b").len(), 32);
    }
}
