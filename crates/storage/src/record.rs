use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A deal as stored in the backend.
///
/// `stage` is stored as a string so records written by older tooling (with
/// legacy spellings) still load; the workflow crate normalizes it on read.
/// Projection columns (`registration_number`, `ntu_reason`, ...) are copies of
/// stage payload fields kept for filtering. `move_history` is authoritative.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DealRecord {
    pub id: String,
    pub deal_code: String,
    #[serde(default)]
    pub deal_deck_id: Option<String>,
    #[serde(default)]
    pub applicant: String,
    #[serde(default)]
    pub consultant: Option<String>,
    #[serde(default)]
    pub agent: Option<String>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub stage: String,
    #[serde(default)]
    pub notes: Option<String>,
    /// Bank names declared on the deal at submission time.
    #[serde(default)]
    pub banks: Vec<String>,
    /// Legacy flattened `"Bank: note"` text keyed by stage name.
    #[serde(default)]
    pub bank_notes: BTreeMap<String, String>,
    /// Legacy flattened `"Bank: reference"` text keyed by stage name.
    #[serde(default)]
    pub bank_refs: BTreeMap<String, String>,
    #[serde(default)]
    pub move_history: Vec<MoveHistoryRecord>,
    #[serde(default)]
    pub last_moved_by: Option<String>,
    /// ISO 8601 / RFC 3339 timestamp string.
    #[serde(default)]
    pub last_moved_at: Option<String>,

    #[serde(default)]
    pub conditions: Option<String>,
    #[serde(default)]
    pub attorney: Option<String>,
    #[serde(default)]
    pub registration_attorney: Option<String>,
    #[serde(default)]
    pub registration_attorney_tel: Option<String>,
    #[serde(default)]
    pub registration_attorney_email: Option<String>,
    #[serde(default)]
    pub registration_attorney_reference: Option<String>,
    #[serde(default)]
    pub registration_number: Option<String>,
    /// `YYYY-MM-DD`.
    #[serde(default)]
    pub payment_due_date: Option<String>,
    #[serde(default)]
    pub agent_comm_paid: Option<bool>,
    #[serde(default)]
    pub ntu_reason: Option<String>,
    /// `YYYY-MM-DD`.
    #[serde(default)]
    pub estimated_reg_date: Option<String>,
    #[serde(default)]
    pub insurance_needed: Option<bool>,
    #[serde(default)]
    pub registration_paid: Option<bool>,
    #[serde(default)]
    pub registration_paid_at: Option<String>,
    #[serde(default)]
    pub lead_source_paid: Option<bool>,
    #[serde(default)]
    pub lead_source_paid_at: Option<String>,

    /// Incremented on every successful update.
    #[serde(default)]
    pub version: i64,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

/// One entry of a deal's append-only move history.
///
/// `data` holds the stage payload captured for the transition as raw JSON;
/// its shape is owned by the workflow crate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MoveHistoryRecord {
    pub from: String,
    pub to: String,
    pub by: String,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub at: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// A per-bank sub-record attached to a deal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BankRecord {
    pub deal_id: String,
    pub bank_name: String,
    #[serde(default)]
    pub bank_notes: Option<String>,
    #[serde(default)]
    pub reference_number: Option<String>,
    #[serde(default)]
    pub contact_name: Option<String>,
    #[serde(default)]
    pub contact_tel: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub attorney: Option<String>,
    #[serde(default)]
    pub attorney_note: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// A bank note row tagged with the stage it was captured for.
///
/// `stage` is a stage name or `"global"`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageNoteRecord {
    pub id: String,
    pub deal_id: String,
    pub stage: String,
    pub bank_name: String,
    #[serde(default)]
    pub bank_notes: String,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// A denormalized activity row for the cross-deal feed. Never updated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: String,
    pub deal_id: String,
    #[serde(default)]
    pub deal_code: Option<String>,
    #[serde(default)]
    pub from_stage: Option<String>,
    #[serde(default)]
    pub to_stage: Option<String>,
    pub moved_by: String,
    pub actor: String,
    /// `"move"` or `"update"`.
    pub action: String,
    #[serde(default)]
    pub note: Option<String>,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub moved_at: String,
    pub created_at: String,
}

/// A partial update to a deal.
///
/// `None` leaves a column untouched; `Some(None)` clears a nullable column.
/// `append_history` is applied in the same write as the column updates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DealPatch {
    pub stage: Option<String>,
    pub notes: Option<Option<String>>,
    pub last_moved_by: Option<String>,
    pub last_moved_at: Option<String>,
    pub conditions: Option<Option<String>>,
    pub attorney: Option<Option<String>>,
    pub registration_attorney: Option<Option<String>>,
    pub registration_attorney_tel: Option<Option<String>>,
    pub registration_attorney_email: Option<Option<String>>,
    pub registration_attorney_reference: Option<Option<String>>,
    pub registration_number: Option<Option<String>>,
    pub payment_due_date: Option<Option<String>>,
    pub agent_comm_paid: Option<Option<bool>>,
    pub ntu_reason: Option<Option<String>>,
    pub estimated_reg_date: Option<Option<String>>,
    pub insurance_needed: Option<Option<bool>>,
    pub registration_paid: Option<Option<bool>>,
    pub registration_paid_at: Option<Option<String>>,
    pub lead_source_paid: Option<Option<bool>>,
    pub lead_source_paid_at: Option<Option<String>>,
    /// Legacy flattened bank text for one stage: `(stage, notes, refs)`.
    pub stage_bank_text: Option<(String, String, String)>,
    pub append_history: Option<MoveHistoryRecord>,
}

impl DealPatch {
    /// True when the patch would not change any column or append history.
    pub fn is_empty(&self) -> bool {
        *self == DealPatch::default()
    }

    /// Apply this patch to a record in place. Does not touch `version` or
    /// `updated_at`; backends own those.
    pub fn apply_to(self, deal: &mut DealRecord) {
        fn set<T>(slot: &mut T, value: Option<T>) {
            if let Some(v) = value {
                *slot = v;
            }
        }

        if let Some(stage) = self.stage {
            deal.stage = stage;
        }
        set(&mut deal.notes, self.notes);
        if let Some(by) = self.last_moved_by {
            deal.last_moved_by = Some(by);
        }
        if let Some(at) = self.last_moved_at {
            deal.last_moved_at = Some(at);
        }
        set(&mut deal.conditions, self.conditions);
        set(&mut deal.attorney, self.attorney);
        set(&mut deal.registration_attorney, self.registration_attorney);
        set(
            &mut deal.registration_attorney_tel,
            self.registration_attorney_tel,
        );
        set(
            &mut deal.registration_attorney_email,
            self.registration_attorney_email,
        );
        set(
            &mut deal.registration_attorney_reference,
            self.registration_attorney_reference,
        );
        set(&mut deal.registration_number, self.registration_number);
        set(&mut deal.payment_due_date, self.payment_due_date);
        set(&mut deal.agent_comm_paid, self.agent_comm_paid);
        set(&mut deal.ntu_reason, self.ntu_reason);
        set(&mut deal.estimated_reg_date, self.estimated_reg_date);
        set(&mut deal.insurance_needed, self.insurance_needed);
        set(&mut deal.registration_paid, self.registration_paid);
        set(&mut deal.registration_paid_at, self.registration_paid_at);
        set(&mut deal.lead_source_paid, self.lead_source_paid);
        set(&mut deal.lead_source_paid_at, self.lead_source_paid_at);
        if let Some((stage, notes, refs)) = self.stage_bank_text {
            deal.bank_notes.insert(stage.clone(), notes);
            deal.bank_refs.insert(stage, refs);
        }
        if let Some(entry) = self.append_history {
            deal.move_history.push(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_patch_is_empty() {
        assert!(DealPatch::default().is_empty());
        let patch = DealPatch {
            ntu_reason: Some(None),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }

    #[test]
    fn apply_clears_and_sets_columns() {
        let mut deal = DealRecord {
            id: "d1".to_string(),
            deal_code: "SB-1".to_string(),
            attorney: Some("Old Attorney".to_string()),
            ..Default::default()
        };
        let patch = DealPatch {
            stage: Some("granted".to_string()),
            attorney: Some(None),
            conditions: Some(Some("Subject to valuation".to_string())),
            ..Default::default()
        };
        patch.apply_to(&mut deal);
        assert_eq!(deal.stage, "granted");
        assert_eq!(deal.attorney, None);
        assert_eq!(deal.conditions.as_deref(), Some("Subject to valuation"));
    }

    #[test]
    fn apply_appends_history_in_order() {
        let mut deal = DealRecord::default();
        for to in ["aip", "granted"] {
            DealPatch {
                append_history: Some(MoveHistoryRecord {
                    from: "x".to_string(),
                    to: to.to_string(),
                    by: "Kristie".to_string(),
                    at: "2026-01-01T00:00:00.000Z".to_string(),
                    note: None,
                    data: serde_json::Value::Null,
                }),
                ..Default::default()
            }
            .apply_to(&mut deal);
        }
        let tos: Vec<&str> = deal.move_history.iter().map(|h| h.to.as_str()).collect();
        assert_eq!(tos, vec!["aip", "granted"]);
    }

    #[test]
    fn deal_record_loads_with_missing_optional_fields() {
        let deal: DealRecord =
            serde_json::from_str(r#"{"id":"d1","deal_code":"SB-1","amount":"1250000.00"}"#)
                .unwrap();
        assert_eq!(deal.stage, "");
        assert!(deal.move_history.is_empty());
        assert_eq!(deal.amount, Some(Decimal::new(125000000, 2)));
    }
}
