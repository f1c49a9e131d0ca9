use chrono::{DateTime, Utc};

use umrahops_core::AggregateId;

/// Human-readable document number, e.g. `ORD-20261019-3F9A1C2B`.
///
/// The suffix is the tail of the (random) UUIDv7 payload, so numbers are
/// unique as long as the ids are.
pub fn document_number(prefix: &str, at: DateTime<Utc>, id: &AggregateId) -> String {
    let simple = id.as_uuid().simple().to_string();
    let suffix = &simple[simple.len() - 8..];
    format!("{prefix}-{}-{}", at.format("%Y%m%d"), suffix.to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn formats_prefix_date_and_suffix() {
        let at = Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap();
        let id = AggregateId::new();
        let n = document_number("INV", at, &id);
        assert!(n.starts_with("INV-20261019-"));
        assert_eq!(n.len(), "INV-20261019-".len() + 8);
    }
}
