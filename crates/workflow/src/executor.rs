//! Move executor.
//!
//! Orchestrates a stage move against a `DealStore`:
//!
//! 1. Resolve the deal (by id or deal code)
//! 2. Normalize the target stage and check the transition table
//! 3. Require an attributable actor
//! 4. Require a confirmed payload for the target stage
//! 5. Persist the stage, the history entry and the column projection in one
//!    `update_deal` call
//! 6. Append an activity record
//!
//! Every validation runs before the single write. A failed write emits no
//! activity and is not retried.

use std::sync::Arc;

use bondflow_storage::{ActivityRecord, DealPatch, DealRecord, DealStore, StageNoteRecord};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::activity::{ActivityFeed, FeedEntry};
use crate::bank::{dedupe_bank_names, BankContext, ReconciledBanks, Reconciler, GLOBAL_STAGE};
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::WorkflowError;
use crate::history::MoveHistoryEntry;
use crate::payload::{truncate_date, AttorneyDetails, ConfirmedPayload, StageForm, StagePayload};
use crate::stage::{normalize, normalize_opt, Stage};
use crate::transition;

/// Actor recorded for field updates that name nobody.
const DEFAULT_UPDATE_ACTOR: &str = "system";

/// Deal columns the generic field update may write.
pub const UPDATABLE_FIELDS: &[&str] = &[
    "notes",
    "attorney",
    "ntu_reason",
    "registration_paid",
    "registration_paid_at",
    "lead_source_paid",
    "lead_source_paid_at",
    "insurance_needed",
    "registration_number",
    "registration_attorney",
    "registration_attorney_tel",
    "registration_attorney_email",
    "registration_attorney_reference",
    "payment_due_date",
    "agent_comm_paid",
    "estimated_reg_date",
];

/// A request to move a deal to another stage.
#[derive(Debug, Clone, Default)]
pub struct MoveRequest {
    /// Deal id or deal code.
    pub deal_key: String,
    /// Target stage in any spelling.
    pub to_stage: String,
    pub payload: Option<ConfirmedPayload>,
    pub actor: Option<String>,
    pub note: Option<String>,
    /// Reject the move if the deal's version has moved on.
    pub expected_version: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MoveOutcome {
    pub deal: DealRecord,
    pub entry: MoveHistoryEntry,
    /// `None` if the move persisted but the activity row could not be written.
    pub activity: Option<ActivityRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateOutcome {
    pub deal: DealRecord,
    pub updated_fields: Vec<String>,
    pub activity: Option<ActivityRecord>,
}

/// Fields accepted when creating a deal.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NewDeal {
    pub deal_deck_id: String,
    pub deal_code: Option<String>,
    pub applicant: String,
    pub consultant: String,
    pub agent: String,
    pub amount: Option<Decimal>,
    pub stage: Option<String>,
    pub notes: Option<String>,
    pub banks: Vec<String>,
}

/// One row of a stage-tagged bank notes replacement.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BankNoteInput {
    pub bank_name: String,
    pub bank_notes: String,
    pub reference: Option<String>,
}

/// The workflow engine bound to a store and a clock.
pub struct MoveExecutor<S, C = SystemClock> {
    store: Arc<S>,
    clock: C,
    config: EngineConfig,
    reconciler: Reconciler,
}

impl<S: DealStore> MoveExecutor<S, SystemClock> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self::with_clock(store, SystemClock, config)
    }
}

impl<S: DealStore, C: Clock> MoveExecutor<S, C> {
    pub fn with_clock(store: Arc<S>, clock: C, config: EngineConfig) -> Self {
        Self {
            store,
            clock,
            config,
            reconciler: Reconciler::standard(),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ── Moves ─────────────────────────────────────────────────────────────────

    /// Move a deal to another stage.
    pub async fn move_deal(&self, request: MoveRequest) -> Result<MoveOutcome, WorkflowError> {
        let deal = self.store.get_deal(&request.deal_key).await?;
        let from = normalize(&deal.stage);
        let to = normalize(&request.to_stage);
        debug!(deal_id = %deal.id, %from, %to, "validating move");

        let checked = transition::validate(from, to)
            .and_then(|()| self.resolve_actor(request.actor.as_deref()))
            .and_then(|actor| check_payload(to, request.payload).map(|p| (actor, p)));
        let (actor, payload) = match checked {
            Ok(v) => v,
            Err(e) => {
                warn!(deal_id = %deal.id, %from, %to, error = %e, "move rejected");
                return Err(e);
            }
        };

        let now = self.clock.now_rfc3339();
        let note = request
            .note
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);
        let entry = MoveHistoryEntry {
            from,
            to,
            by: actor.clone(),
            at: now.clone(),
            note: note.clone(),
            payload: payload.map(ConfirmedPayload::into_inner),
        };

        let mut patch = DealPatch {
            stage: Some(to.as_str().to_string()),
            last_moved_by: Some(actor.clone()),
            last_moved_at: Some(now.clone()),
            append_history: Some(entry.to_record()),
            ..Default::default()
        };
        if let Some(note) = &note {
            patch.notes = Some(Some(note.clone()));
        }
        if let Some(payload) = &entry.payload {
            project(payload, &mut patch);
        }

        let updated = self
            .store
            .update_deal(&deal.id, patch, request.expected_version, &now)
            .await
            .map_err(|e| {
                warn!(deal_id = %deal.id, %from, %to, error = %e, "move not persisted");
                WorkflowError::from(e)
            })?;

        let activity = self
            .emit_activity(ActivityRecord {
                id: activity_id(&updated.id, "move", &now, &actor, from.as_str(), to.as_str()),
                deal_id: updated.id.clone(),
                deal_code: Some(updated.deal_code.clone()),
                from_stage: Some(from.as_str().to_string()),
                to_stage: Some(to.as_str().to_string()),
                moved_by: actor.clone(),
                actor: actor.clone(),
                action: "move".to_string(),
                note,
                moved_at: now.clone(),
                created_at: now,
            })
            .await;

        info!(
            deal_id = %updated.id,
            %from,
            %to,
            actor = %actor,
            history_len = updated.move_history.len(),
            "deal moved"
        );
        Ok(MoveOutcome {
            deal: updated,
            entry,
            activity,
        })
    }

    /// A capture form for `stage`, seeded from the reconciled bank view.
    pub async fn seed_form(&self, deal_key: &str, stage: Stage) -> Result<StageForm, WorkflowError> {
        let banks = self.reconcile_banks(deal_key, stage).await?;
        Ok(StageForm::seeded(stage, &banks))
    }

    fn resolve_actor(&self, actor: Option<&str>) -> Result<String, WorkflowError> {
        let actor = actor.map(str::trim).unwrap_or_default();
        if actor.is_empty() || self.config.is_reserved_actor(actor) {
            return Err(WorkflowError::MissingActor);
        }
        Ok(actor.to_string())
    }

    async fn emit_activity(&self, record: ActivityRecord) -> Option<ActivityRecord> {
        match self.store.insert_activity(record.clone()).await {
            Ok(()) => Some(record),
            Err(e) => {
                warn!(deal_id = %record.deal_id, action = %record.action, error = %e, "activity not recorded");
                None
            }
        }
    }

    // ── Deals ─────────────────────────────────────────────────────────────────

    pub async fn get_deal(&self, deal_key: &str) -> Result<DealRecord, WorkflowError> {
        Ok(self.store.get_deal(deal_key).await?)
    }

    /// Deals newest first, optionally only those at `stage` (any spelling).
    pub async fn list_deals(&self, stage: Option<&str>) -> Result<Vec<DealRecord>, WorkflowError> {
        let deals = self.store.list_deals(None).await?;
        let Some(stage) = stage.map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(deals);
        };
        let wanted = normalize(stage);
        Ok(deals
            .into_iter()
            .filter(|d| normalize(&d.stage) == wanted)
            .collect())
    }

    /// Validate and insert a new deal.
    pub async fn create_deal(&self, new: NewDeal) -> Result<DealRecord, WorkflowError> {
        let required = [
            ("deal_deck_id", &new.deal_deck_id),
            ("applicant", &new.applicant),
            ("consultant", &new.consultant),
            ("agent", &new.agent),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(WorkflowError::InvalidDeal(format!("{} is required", field)));
            }
        }
        let amount = match new.amount {
            Some(amount) if amount > Decimal::ZERO => amount,
            _ => {
                return Err(WorkflowError::InvalidDeal(
                    "amount must be greater than zero".to_string(),
                ))
            }
        };

        let deck_id = new.deal_deck_id.trim().to_string();
        let now = self.clock.now_rfc3339();
        let record = DealRecord {
            id: generate_deal_id(),
            deal_code: new
                .deal_code
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .unwrap_or(&deck_id)
                .to_string(),
            deal_deck_id: Some(deck_id.clone()),
            applicant: new.applicant.trim().to_string(),
            consultant: Some(new.consultant.trim().to_string()),
            agent: Some(new.agent.trim().to_string()),
            amount: Some(amount),
            stage: normalize_opt(new.stage.as_deref()).as_str().to_string(),
            notes: new.notes.filter(|n| !n.trim().is_empty()),
            banks: dedupe_bank_names(new.banks.iter().map(String::as_str)),
            created_at: now.clone(),
            updated_at: now,
            ..Default::default()
        };
        self.store.insert_deal(record.clone()).await?;
        info!(deal_id = %record.id, deal_code = %record.deal_code, stage = %record.stage, "deal created");
        Ok(record)
    }

    /// Update allow-listed deal columns. Never changes the stage.
    pub async fn update_fields(
        &self,
        deal_key: &str,
        fields: &serde_json::Map<String, serde_json::Value>,
        actor: Option<&str>,
        expected_version: Option<i64>,
    ) -> Result<UpdateOutcome, WorkflowError> {
        let deal = self.store.get_deal(deal_key).await?;
        let patch = fields_to_patch(fields).map_err(|e| {
            warn!(deal_id = %deal.id, error = %e, "field update rejected");
            e
        })?;
        let mut updated_fields: Vec<String> = fields.keys().cloned().collect();
        updated_fields.sort();

        let now = self.clock.now_rfc3339();
        let updated = self
            .store
            .update_deal(&deal.id, patch, expected_version, &now)
            .await?;

        let actor = actor
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .unwrap_or(DEFAULT_UPDATE_ACTOR)
            .to_string();
        let stage = normalize(&updated.stage).as_str().to_string();
        let activity = self
            .emit_activity(ActivityRecord {
                id: activity_id(&updated.id, "update", &now, &actor, &stage, &stage),
                deal_id: updated.id.clone(),
                deal_code: Some(updated.deal_code.clone()),
                from_stage: Some(stage.clone()),
                to_stage: Some(stage),
                moved_by: actor.clone(),
                actor,
                action: "update".to_string(),
                note: Some(format!("Updated: {}", updated_fields.join(", "))),
                moved_at: now.clone(),
                created_at: now,
            })
            .await;

        info!(deal_id = %updated.id, fields = ?updated_fields, "deal fields updated");
        Ok(UpdateOutcome {
            deal: updated,
            updated_fields,
            activity,
        })
    }

    // ── Banks ─────────────────────────────────────────────────────────────────

    /// The reconciled bank view of a deal for `stage`.
    pub async fn reconcile_banks(
        &self,
        deal_key: &str,
        stage: Stage,
    ) -> Result<ReconciledBanks, WorkflowError> {
        let deal = self.store.get_deal(deal_key).await?;
        let bank_records = self.store.list_banks(&deal.id).await?;
        let stage_notes = self.store.list_stage_notes(&deal.id).await?;
        let ctx = BankContext {
            deal: &deal,
            bank_records: &bank_records,
            stage_notes: &stage_notes,
        };
        Ok(self.reconciler.reconcile(&ctx, stage))
    }

    /// Replace the stage-tagged bank notes of a deal for one stage.
    ///
    /// A missing or blank stage, or `"global"`, targets the global rows.
    pub async fn replace_bank_notes(
        &self,
        deal_key: &str,
        stage: Option<&str>,
        rows: Vec<BankNoteInput>,
    ) -> Result<usize, WorkflowError> {
        let deal = self.store.get_deal(deal_key).await?;
        let tag = match stage.map(str::trim) {
            None | Some("") => GLOBAL_STAGE.to_string(),
            Some(s) if s.eq_ignore_ascii_case(GLOBAL_STAGE) => GLOBAL_STAGE.to_string(),
            Some(s) => normalize(s).as_str().to_string(),
        };
        let now = self.clock.now_rfc3339();
        let records = rows
            .into_iter()
            .map(|row| StageNoteRecord {
                id: String::new(),
                deal_id: deal.id.clone(),
                stage: tag.clone(),
                bank_name: row.bank_name,
                bank_notes: row.bank_notes.trim().to_string(),
                reference: row.reference.filter(|r| !r.trim().is_empty()),
                updated_at: Some(now.clone()),
            })
            .collect();
        let inserted = self
            .store
            .replace_stage_notes(&deal.id, &tag, records)
            .await?;
        info!(deal_id = %deal.id, stage = %tag, rows = inserted, "bank notes replaced");
        Ok(inserted)
    }

    // ── Activity ──────────────────────────────────────────────────────────────

    /// Activity rows for one deal, newest first and capped at the feed
    /// limit. No deal key means no rows, never the global feed.
    pub async fn list_moves(&self, deal_key: Option<&str>) -> Result<Vec<ActivityRecord>, WorkflowError> {
        let Some(key) = deal_key.map(str::trim).filter(|k| !k.is_empty()) else {
            return Ok(Vec::new());
        };
        let deal = self.store.get_deal(key).await?;
        let limit = self.config.feed_limit(None);
        Ok(self.store.list_activity(Some(deal.id.as_str()), limit).await?)
    }

    /// The deduplicated feed built from persisted activity rows.
    pub async fn activity_feed(
        &self,
        query: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<FeedEntry>, WorkflowError> {
        let rows = self.store.list_activity(None, 0).await?;
        let entries = rows.iter().map(FeedEntry::from_record).collect();
        Ok(self.finish_feed(entries, query, limit))
    }

    /// The deduplicated feed built from every deal's move history.
    pub async fn history_feed(
        &self,
        query: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<FeedEntry>, WorkflowError> {
        let deals = self.store.list_deals(None).await?;
        Ok(self.finish_feed(FeedEntry::from_deals(&deals), query, limit))
    }

    fn finish_feed(
        &self,
        entries: Vec<FeedEntry>,
        query: Option<&str>,
        limit: Option<usize>,
    ) -> Vec<FeedEntry> {
        let mut feed = ActivityFeed::new(&self.config).build(entries, query);
        feed.truncate(self.config.feed_limit(limit));
        feed
    }
}

// ── Payload checks and projection ────────────────────────────────────────────

fn check_payload(
    to: Stage,
    payload: Option<ConfirmedPayload>,
) -> Result<Option<ConfirmedPayload>, WorkflowError> {
    if !transition::requires_payload(to) {
        return Ok(None);
    }
    match payload {
        None => Err(WorkflowError::IncompletePayload {
            stage: to,
            reason: "stage details have not been confirmed".to_string(),
        }),
        Some(p) if p.stage() != to => Err(WorkflowError::IncompletePayload {
            stage: to,
            reason: format!("confirmed details were captured for {}", p.stage().label()),
        }),
        Some(p) => Ok(Some(p)),
    }
}

/// Copy payload fields onto deal columns for filtering. History stays
/// authoritative.
fn project(payload: &StagePayload, patch: &mut DealPatch) {
    if let Some(banks) = payload.bank_section() {
        patch.stage_bank_text = Some((
            payload.stage().as_str().to_string(),
            banks.bank_notes.clone(),
            banks.bank_refs.clone(),
        ));
    }
    match payload {
        StagePayload::Aip(_) => {}
        StagePayload::Granted(p) => {
            patch.conditions = Some(p.conditions.clone());
        }
        StagePayload::Instructed(p) => {
            patch.attorney = Some(p.attorney.clone());
            patch.estimated_reg_date = Some(p.estimated_reg_date.clone());
            project_attorney(&p.attorney_details, patch);
        }
        StagePayload::Registrations(p) => {
            patch.registration_number = Some(p.registration_number.clone());
            patch.registration_attorney_reference = Some(p.registration_attorney_reference.clone());
            patch.payment_due_date = Some(p.payment_due_date.clone());
            patch.agent_comm_paid = Some(Some(p.agent_comm_paid));
            project_attorney(&p.attorney_details, patch);
        }
        StagePayload::Ntu(p) => {
            patch.ntu_reason = Some(p.ntu_reason.clone());
        }
    }
}

fn project_attorney(details: &AttorneyDetails, patch: &mut DealPatch) {
    if details.is_empty() {
        return;
    }
    let non_blank = |v: &str| Some(v.trim().to_string()).filter(|v| !v.is_empty());
    patch.registration_attorney = Some(details.display_name());
    patch.registration_attorney_tel = Some(non_blank(&details.tel));
    patch.registration_attorney_email = Some(non_blank(&details.email));
}

// ── Generic field update ─────────────────────────────────────────────────────

fn fields_to_patch(
    fields: &serde_json::Map<String, serde_json::Value>,
) -> Result<DealPatch, WorkflowError> {
    if fields.is_empty() {
        return Err(WorkflowError::InvalidDeal("no fields to update".to_string()));
    }
    let mut patch = DealPatch::default();
    for (key, value) in fields {
        let field = key.as_str();
        match field {
            "notes" => patch.notes = Some(field_text(field, value)?),
            "attorney" => patch.attorney = Some(field_text(field, value)?),
            "ntu_reason" => patch.ntu_reason = Some(field_text(field, value)?),
            "registration_paid" => patch.registration_paid = Some(field_bool(field, value)?),
            "registration_paid_at" => patch.registration_paid_at = Some(field_text(field, value)?),
            "lead_source_paid" => patch.lead_source_paid = Some(field_bool(field, value)?),
            "lead_source_paid_at" => patch.lead_source_paid_at = Some(field_text(field, value)?),
            "insurance_needed" => patch.insurance_needed = Some(field_bool(field, value)?),
            "registration_number" => patch.registration_number = Some(field_text(field, value)?),
            "registration_attorney" => {
                patch.registration_attorney = Some(field_text(field, value)?)
            }
            "registration_attorney_tel" => {
                patch.registration_attorney_tel = Some(field_text(field, value)?)
            }
            "registration_attorney_email" => {
                patch.registration_attorney_email = Some(field_text(field, value)?)
            }
            "registration_attorney_reference" => {
                patch.registration_attorney_reference = Some(field_text(field, value)?)
            }
            "payment_due_date" => patch.payment_due_date = Some(field_date(field, value)?),
            "agent_comm_paid" => patch.agent_comm_paid = Some(field_bool(field, value)?),
            "estimated_reg_date" => patch.estimated_reg_date = Some(field_date(field, value)?),
            _ => {
                return Err(WorkflowError::InvalidField {
                    field: field.to_string(),
                })
            }
        }
    }
    Ok(patch)
}

fn invalid(field: &str) -> WorkflowError {
    WorkflowError::InvalidField {
        field: field.to_string(),
    }
}

/// Text column value; blank clears the column.
fn field_text(field: &str, value: &serde_json::Value) -> Result<Option<String>, WorkflowError> {
    use serde_json::Value;
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.trim().to_string()).filter(|s| !s.is_empty())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        Value::Array(_) | Value::Object(_) => Err(invalid(field)),
    }
}

/// Date column value, truncated to `YYYY-MM-DD`.
fn field_date(field: &str, value: &serde_json::Value) -> Result<Option<String>, WorkflowError> {
    Ok(field_text(field, value)?.and_then(|s| truncate_date(&s)))
}

/// Boolean column value: `true/false`, `yes/no`, `1/0`; blank clears.
fn field_bool(field: &str, value: &serde_json::Value) -> Result<Option<bool>, WorkflowError> {
    use serde_json::Value;
    match value {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(1) => Ok(Some(true)),
            Some(0) => Ok(Some(false)),
            _ => Err(invalid(field)),
        },
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "" => Ok(None),
            "true" | "yes" | "1" => Ok(Some(true)),
            "false" | "no" | "0" => Ok(Some(false)),
            _ => Err(invalid(field)),
        },
        Value::Array(_) | Value::Object(_) => Err(invalid(field)),
    }
}

// ── Identifiers ──────────────────────────────────────────────────────────────

/// Random (version 4) UUID deal id.
fn generate_deal_id() -> String {
    Uuid::new_v4().to_string()
}

/// Content-addressed activity id.
fn activity_id(deal_id: &str, action: &str, at: &str, actor: &str, from: &str, to: &str) -> String {
    let mut hasher = Sha256::new();
    for part in [deal_id, action, at, actor, from, to] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    let digest = hasher.finalize();
    let hex: String = digest[..12].iter().map(|b| format!("{:02x}", b)).collect();
    format!("act-{}", hex)
}
