//! Cassette data structures for recorded runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::documents::{DocumentKind, RawDocument};

/// A recorded document stream of a single run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cassette {
    /// Human-readable name for this cassette.
    pub name: String,
    /// When this cassette was recorded.
    pub recorded_at: DateTime<Utc>,
    /// The run reference that was requested when recording.
    pub run_ref: String,
    /// Ordered documents of the run.
    pub documents: Vec<RawDocument>,
}

impl Cassette {
    fn start(&self) -> Option<&RawDocument> {
        self.documents.iter().find(|d| d.kind() == DocumentKind::Start)
    }

    /// Uid of the recorded start document.
    #[must_use]
    pub fn uid(&self) -> Option<&str> {
        self.start().and_then(|s| s.doc.get("uid")).and_then(serde_json::Value::as_str)
    }

    /// Scan id of the recorded start document.
    #[must_use]
    pub fn scan_id(&self) -> Option<i64> {
        self.start().and_then(|s| s.doc.get("scan_id")).and_then(serde_json::Value::as_i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_cassette() -> Cassette {
        Cassette {
            name: "scan-1042".into(),
            recorded_at: Utc::now(),
            run_ref: "1042".into(),
            documents: vec![
                RawDocument::new("start", json!({"uid": "abc-123", "scan_id": 1042})),
                RawDocument::new("stop", json!({"exit_status": "success"})),
            ],
        }
    }

    #[test]
    fn yaml_round_trip_keeps_documents() {
        let cassette = sample_cassette();
        let yaml = serde_yaml::to_string(&cassette).expect("serialize");
        let deserialized: Cassette = serde_yaml::from_str(&yaml).expect("deserialize");
        assert_eq!(cassette, deserialized);
    }

    #[test]
    fn identifiers_come_from_start_document() {
        let cassette = sample_cassette();
        assert_eq!(cassette.uid(), Some("abc-123"));
        assert_eq!(cassette.scan_id(), Some(1042));
    }
}
