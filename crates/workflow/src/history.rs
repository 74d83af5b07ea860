use bondflow_storage::{DealRecord, MoveHistoryRecord};
use serde::Serialize;

use crate::payload::StagePayload;
use crate::stage::{normalize, Stage};

/// A typed view of one move history entry.
///
/// `payload` is `None` when the stored data does not parse as a stage
/// payload (older entries, or moves into `submitted`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveHistoryEntry {
    pub from: Stage,
    pub to: Stage,
    pub by: String,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub at: String,
    pub note: Option<String>,
    pub payload: Option<StagePayload>,
}

impl MoveHistoryEntry {
    pub fn from_record(record: &MoveHistoryRecord) -> Self {
        Self {
            from: normalize(&record.from),
            to: normalize(&record.to),
            by: record.by.clone(),
            at: record.at.clone(),
            note: record.note.clone(),
            payload: serde_json::from_value(record.data.clone()).ok(),
        }
    }

    pub fn to_record(&self) -> MoveHistoryRecord {
        MoveHistoryRecord {
            from: self.from.as_str().to_string(),
            to: self.to.as_str().to_string(),
            by: self.by.clone(),
            at: self.at.clone(),
            note: self.note.clone(),
            data: self
                .payload
                .as_ref()
                .and_then(|p| serde_json::to_value(p).ok())
                .unwrap_or(serde_json::Value::Null),
        }
    }
}

/// The deal's move history, oldest first.
pub fn history(deal: &DealRecord) -> Vec<MoveHistoryEntry> {
    deal.move_history
        .iter()
        .map(MoveHistoryEntry::from_record)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn legacy_entries_are_normalized() {
        let deal = DealRecord {
            move_history: vec![MoveHistoryRecord {
                from: "Submitted".to_string(),
                to: "ARP".to_string(),
                by: "Kristie".to_string(),
                at: "2025-11-02T08:00:00Z".to_string(),
                note: None,
                data: json!({"notes": "no stage tag"}),
            }],
            ..Default::default()
        };

        let entries = history(&deal);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].from, Stage::Submitted);
        assert_eq!(entries[0].to, Stage::Aip);
        assert_eq!(entries[0].payload, None);
    }

    #[test]
    fn typed_payload_survives_storage() {
        let entry = MoveHistoryEntry {
            from: Stage::Instructed,
            to: Stage::Ntu,
            by: "Kristie".to_string(),
            at: "2026-01-01T00:00:00.000Z".to_string(),
            note: Some("client withdrew".to_string()),
            payload: Some(StagePayload::Ntu(crate::payload::NtuPayload {
                ntu_reason: Some("Affordability".to_string()),
                ..Default::default()
            })),
        };
        let record = entry.to_record();
        assert_eq!(record.data["stage"], "ntu");
        assert_eq!(MoveHistoryEntry::from_record(&record), entry);
    }
}
