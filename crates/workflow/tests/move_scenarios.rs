//! End-to-end move scenarios against the in-memory store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bondflow_storage::{
    ActivityRecord, BankRecord, DealPatch, DealRecord, DealStore, InMemoryDealStore,
    StageNoteRecord, StorageError,
};
use bondflow_workflow::{
    EngineConfig, FixedClock, MoveExecutor, MoveRequest, NewDeal, Stage, StageForm, WorkflowError,
};
use rust_decimal::Decimal;
use serde_json::json;

// ── Fixtures ──────────────────────────────────────────────────────────────

fn clock() -> FixedClock {
    FixedClock::at("2026-03-01T08:00:00Z").unwrap()
}

fn executor<S: DealStore>(store: Arc<S>) -> MoveExecutor<S, FixedClock> {
    MoveExecutor::with_clock(store, clock(), EngineConfig::default())
}

fn deal_at(stage: &str) -> DealRecord {
    DealRecord {
        id: "deal-1".to_string(),
        deal_code: "SB-1001".to_string(),
        applicant: "N. Mokoena".to_string(),
        amount: Some(Decimal::new(1_250_000, 0)),
        stage: stage.to_string(),
        banks: vec!["ABSA".to_string(), "FNB".to_string()],
        created_at: "2026-02-01T00:00:00.000Z".to_string(),
        updated_at: "2026-02-01T00:00:00.000Z".to_string(),
        ..Default::default()
    }
}

async fn store_with(stage: &str) -> Arc<InMemoryDealStore> {
    let store = Arc::new(InMemoryDealStore::new());
    store.insert_deal(deal_at(stage)).await.unwrap();
    store
}

fn request(to: &str, form: Option<StageForm>) -> MoveRequest {
    MoveRequest {
        deal_key: "SB-1001".to_string(),
        to_stage: to.to_string(),
        payload: form.and_then(|f| f.build()).map(|p| p.confirm()),
        actor: Some("Kristie".to_string()),
        ..Default::default()
    }
}

// ── Scenarios ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn submitted_to_ntu_records_reason() {
    let store = store_with("submitted").await;
    let exec = executor(store.clone());

    let mut form = StageForm::new(Stage::Ntu);
    form.ntu_reason = "Affordability".to_string();
    let outcome = exec.move_deal(request("ntu", Some(form))).await.unwrap();

    assert_eq!(outcome.deal.stage, "ntu");
    assert_eq!(outcome.deal.move_history.len(), 1);
    assert_eq!(outcome.deal.ntu_reason.as_deref(), Some("Affordability"));
    assert_eq!(outcome.deal.last_moved_by.as_deref(), Some("Kristie"));
    assert!(outcome.activity.is_some());
}

#[tokio::test]
async fn aip_to_granted_updates_conditions_and_bank_view() {
    let store = store_with("aip").await;
    let exec = executor(store.clone());

    let mut form = exec.seed_form("deal-1", Stage::Granted).await.unwrap();
    form.conditions = "Subject to valuation".to_string();
    form.set_bank_note("FNB", "approved");
    let outcome = exec.move_deal(request("granted", Some(form))).await.unwrap();

    assert_eq!(outcome.deal.stage, "granted");
    assert_eq!(outcome.deal.conditions.as_deref(), Some("Subject to valuation"));

    let banks = exec.reconcile_banks("SB-1001", Stage::Granted).await.unwrap();
    assert_eq!(banks.get("fnb").unwrap().note, "approved");
    assert_eq!(
        outcome.deal.bank_notes.get("granted").map(String::as_str),
        Some("FNB: approved")
    );
}

#[tokio::test]
async fn registrations_is_terminal() {
    let store = store_with("registrations").await;
    let exec = executor(store.clone());

    let err = exec
        .move_deal(request("aip", Some(StageForm::new(Stage::Aip))))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        WorkflowError::InvalidTransition {
            from: Stage::Registrations,
            to: Stage::Aip,
        }
    );
    assert_eq!(store.get_deal("deal-1").await.unwrap().stage, "registrations");
}

#[tokio::test]
async fn every_illegal_pair_is_rejected_without_writes() {
    let legal = [
        (Stage::Submitted, Stage::Aip),
        (Stage::Submitted, Stage::Ntu),
        (Stage::Aip, Stage::Granted),
        (Stage::Aip, Stage::Ntu),
        (Stage::Granted, Stage::Instructed),
        (Stage::Granted, Stage::Ntu),
        (Stage::Instructed, Stage::Ntu),
        (Stage::Instructed, Stage::Registrations),
    ];
    for from in Stage::ALL {
        for to in Stage::ALL {
            if legal.contains(&(from, to)) {
                continue;
            }
            let store = store_with(from.as_str()).await;
            let exec = executor(store.clone());
            let err = exec
                .move_deal(request(to.as_str(), Some(StageForm::new(to))))
                .await
                .unwrap_err();
            assert!(
                matches!(err, WorkflowError::InvalidTransition { .. }),
                "{} -> {} gave {:?}",
                from,
                to,
                err
            );
            assert!(store.get_deal("deal-1").await.unwrap().move_history.is_empty());
            assert!(store.list_activity(None, 0).await.unwrap().is_empty());
        }
    }
}

#[tokio::test]
async fn legacy_stage_spellings_are_normalized() {
    let store = store_with("ARP").await;
    let exec = executor(store.clone());

    let outcome = exec
        .move_deal(request("Approved", Some(StageForm::new(Stage::Granted))))
        .await
        .unwrap();
    assert_eq!(outcome.entry.from, Stage::Aip);
    assert_eq!(outcome.deal.stage, "granted");
}

#[tokio::test]
async fn full_pipeline_keeps_history_append_only() {
    let store = store_with("submitted").await;
    let exec = executor(store.clone());

    let path = [Stage::Aip, Stage::Granted, Stage::Instructed, Stage::Registrations];
    let mut snapshots = Vec::new();
    for (n, stage) in path.iter().enumerate() {
        exec.clock().advance_millis(60_000);
        let outcome = exec
            .move_deal(request(stage.as_str(), Some(StageForm::new(*stage))))
            .await
            .unwrap();
        assert_eq!(outcome.deal.move_history.len(), n + 1);
        snapshots.push(outcome.deal.move_history.clone());
    }

    let last = snapshots.last().unwrap();
    for earlier in &snapshots {
        assert_eq!(&last[..earlier.len()], earlier.as_slice());
    }
    let tos: Vec<&str> = last.iter().map(|h| h.to.as_str()).collect();
    assert_eq!(tos, vec!["aip", "granted", "instructed", "registrations"]);
}

// ── Payload and actor rules ───────────────────────────────────────────────

#[tokio::test]
async fn unconfirmed_payload_pauses_the_move() {
    let store = store_with("submitted").await;
    let exec = executor(store.clone());

    let err = exec.move_deal(request("aip", None)).await.unwrap_err();
    assert!(matches!(err, WorkflowError::IncompletePayload { stage: Stage::Aip, .. }));
    assert!(err.is_recoverable());
    assert_eq!(store.get_deal("deal-1").await.unwrap().stage, "submitted");
}

#[tokio::test]
async fn empty_confirmed_payload_is_enough() {
    let store = store_with("submitted").await;
    let exec = executor(store.clone());

    let outcome = exec
        .move_deal(request("aip", Some(StageForm::new(Stage::Aip))))
        .await
        .unwrap();
    assert_eq!(outcome.deal.stage, "aip");
    let data = &outcome.deal.move_history[0].data;
    assert_eq!(data["bank_by_name"], json!({}));
    assert_eq!(data["bank_ref_by_name"], json!({}));
}

#[tokio::test]
async fn payload_for_another_stage_is_incomplete() {
    let store = store_with("submitted").await;
    let exec = executor(store.clone());

    let err = exec
        .move_deal(request("aip", Some(StageForm::new(Stage::Ntu))))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::IncompletePayload { .. }));
}

#[tokio::test]
async fn system_or_blank_actor_is_rejected() {
    for actor in [None, Some(""), Some("  "), Some("System"), Some("SYSTEM")] {
        let store = store_with("submitted").await;
        let exec = executor(store.clone());
        let mut req = request("aip", Some(StageForm::new(Stage::Aip)));
        req.actor = actor.map(str::to_string);

        let err = exec.move_deal(req).await.unwrap_err();
        assert_eq!(err, WorkflowError::MissingActor, "actor {:?}", actor);
        assert!(store.get_deal("deal-1").await.unwrap().move_history.is_empty());
    }
}

#[tokio::test]
async fn unknown_deal_is_not_found() {
    let store = store_with("submitted").await;
    let exec = executor(store);
    let mut req = request("aip", Some(StageForm::new(Stage::Aip)));
    req.deal_key = "SB-404".to_string();

    assert!(matches!(
        exec.move_deal(req).await,
        Err(WorkflowError::NotFound { .. })
    ));
}

// ── Concurrency and persistence failures ──────────────────────────────────

#[tokio::test]
async fn stale_version_is_a_conflict() {
    let store = store_with("submitted").await;
    let exec = executor(store.clone());

    let mut first = request("aip", Some(StageForm::new(Stage::Aip)));
    first.expected_version = Some(0);
    exec.move_deal(first).await.unwrap();

    let mut second = request("ntu", Some(StageForm::new(Stage::Ntu)));
    second.expected_version = Some(0);
    let err = exec.move_deal(second).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Conflict { found_version: 1, .. }));

    let deal = store.get_deal("deal-1").await.unwrap();
    assert_eq!(deal.stage, "aip");
    assert_eq!(deal.move_history.len(), 1);
    assert_eq!(store.list_activity(None, 0).await.unwrap().len(), 1);
}

/// Wraps the in-memory store and fails chosen writes.
#[derive(Default)]
struct FlakyStore {
    inner: InMemoryDealStore,
    fail_updates: AtomicBool,
    fail_activity: AtomicBool,
}

#[async_trait]
impl DealStore for FlakyStore {
    async fn get_deal(&self, key: &str) -> Result<DealRecord, StorageError> {
        self.inner.get_deal(key).await
    }

    async fn list_deals(&self, stage: Option<&str>) -> Result<Vec<DealRecord>, StorageError> {
        self.inner.list_deals(stage).await
    }

    async fn insert_deal(&self, record: DealRecord) -> Result<(), StorageError> {
        self.inner.insert_deal(record).await
    }

    async fn update_deal(
        &self,
        deal_id: &str,
        patch: DealPatch,
        expected_version: Option<i64>,
        updated_at: &str,
    ) -> Result<DealRecord, StorageError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("connection reset".to_string()));
        }
        self.inner
            .update_deal(deal_id, patch, expected_version, updated_at)
            .await
    }

    async fn list_banks(&self, deal_id: &str) -> Result<Vec<BankRecord>, StorageError> {
        self.inner.list_banks(deal_id).await
    }

    async fn list_stage_notes(&self, deal_id: &str) -> Result<Vec<StageNoteRecord>, StorageError> {
        self.inner.list_stage_notes(deal_id).await
    }

    async fn replace_stage_notes(
        &self,
        deal_id: &str,
        stage: &str,
        rows: Vec<StageNoteRecord>,
    ) -> Result<usize, StorageError> {
        self.inner.replace_stage_notes(deal_id, stage, rows).await
    }

    async fn insert_activity(&self, record: ActivityRecord) -> Result<(), StorageError> {
        if self.fail_activity.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("activity table locked".to_string()));
        }
        self.inner.insert_activity(record).await
    }

    async fn list_activity(
        &self,
        deal_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ActivityRecord>, StorageError> {
        self.inner.list_activity(deal_id, limit).await
    }
}

async fn flaky_store() -> Arc<FlakyStore> {
    let store = Arc::new(FlakyStore::default());
    store.insert_deal(deal_at("submitted")).await.unwrap();
    store
}

#[tokio::test]
async fn persist_failure_emits_no_activity() {
    let store = flaky_store().await;
    store.fail_updates.store(true, Ordering::SeqCst);
    let exec = executor(store.clone());

    let err = exec
        .move_deal(request("aip", Some(StageForm::new(Stage::Aip))))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::PersistFailure(ref msg) if msg.contains("connection reset")));
    assert!(!err.is_recoverable());
    assert!(store.list_activity(None, 0).await.unwrap().is_empty());
    assert_eq!(store.get_deal("deal-1").await.unwrap().stage, "submitted");
}

#[tokio::test]
async fn failed_activity_does_not_undo_the_move() {
    let store = flaky_store().await;
    store.fail_activity.store(true, Ordering::SeqCst);
    let exec = executor(store.clone());

    let outcome = exec
        .move_deal(request("aip", Some(StageForm::new(Stage::Aip))))
        .await
        .unwrap();
    assert!(outcome.activity.is_none());
    assert_eq!(store.get_deal("deal-1").await.unwrap().stage, "aip");
}

// ── Field updates, deals and banks ────────────────────────────────────────

#[tokio::test]
async fn field_update_writes_allow_listed_columns_only() {
    let store = store_with("granted").await;
    let exec = executor(store.clone());

    let fields = json!({"registration_paid": "yes", "payment_due_date": "2026-09-30T10:00:00Z"});
    let outcome = exec
        .update_fields("SB-1001", fields.as_object().unwrap(), None, None)
        .await
        .unwrap();
    assert_eq!(outcome.deal.registration_paid, Some(true));
    assert_eq!(outcome.deal.payment_due_date.as_deref(), Some("2026-09-30"));
    assert_eq!(outcome.deal.stage, "granted");

    let activity = outcome.activity.unwrap();
    assert_eq!(activity.action, "update");
    assert_eq!(activity.moved_by, "system");
    assert_eq!(activity.from_stage, activity.to_stage);
    assert_eq!(
        activity.note.as_deref(),
        Some("Updated: payment_due_date, registration_paid")
    );

    let bad = json!({"stage": "registrations", "notes": "x"});
    let err = exec
        .update_fields("SB-1001", bad.as_object().unwrap(), Some("Kristie"), None)
        .await
        .unwrap_err();
    assert_eq!(err, WorkflowError::InvalidField { field: "stage".to_string() });
    let deal = store.get_deal("deal-1").await.unwrap();
    assert_eq!(deal.notes, None);
    assert_eq!(deal.version, 1);
}

#[tokio::test]
async fn create_deal_validates_and_defaults() {
    let store = Arc::new(InMemoryDealStore::new());
    let exec = executor(store.clone());

    let new = NewDeal {
        deal_deck_id: "DD-77".to_string(),
        applicant: "T. Naidoo".to_string(),
        consultant: "Kristie".to_string(),
        agent: "Remax".to_string(),
        amount: Some(Decimal::new(950_000, 0)),
        banks: vec!["ABSA".to_string(), "absa".to_string(), "Multiple".to_string()],
        ..Default::default()
    };
    let deal = exec.create_deal(new.clone()).await.unwrap();
    assert_eq!(deal.deal_code, "DD-77");
    assert_eq!(deal.stage, "submitted");
    assert_eq!(deal.banks, vec!["ABSA"]);
    assert_eq!(store.get_deal("DD-77").await.unwrap().id, deal.id);

    let zero = NewDeal {
        amount: Some(Decimal::ZERO),
        ..new.clone()
    };
    assert!(matches!(exec.create_deal(zero).await, Err(WorkflowError::InvalidDeal(_))));
    let anonymous = NewDeal {
        applicant: " ".to_string(),
        ..new
    };
    assert_eq!(
        exec.create_deal(anonymous).await.unwrap_err(),
        WorkflowError::InvalidDeal("applicant is required".to_string())
    );
}

#[tokio::test]
async fn bank_note_rows_feed_the_reconciled_view() {
    let store = store_with("granted").await;
    let exec = executor(store.clone());

    let rows = vec![
        bondflow_workflow::BankNoteInput {
            bank_name: "ABSA".to_string(),
            bank_notes: "valuation booked".to_string(),
            reference: Some("A-1".to_string()),
        },
        bondflow_workflow::BankNoteInput::default(),
    ];
    assert_eq!(exec.replace_bank_notes("SB-1001", None, rows).await.unwrap(), 1);

    let view = exec.reconcile_banks("SB-1001", Stage::Granted).await.unwrap();
    assert_eq!(view.names(), vec!["ABSA", "FNB"]);
    assert_eq!(view.get("ABSA").unwrap().reference, "A-1");
}

// ── Activity ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn moves_list_without_deal_is_empty() {
    let store = store_with("submitted").await;
    let exec = executor(store.clone());
    exec.move_deal(request("aip", Some(StageForm::new(Stage::Aip))))
        .await
        .unwrap();

    assert!(exec.list_moves(None).await.unwrap().is_empty());
    assert_eq!(exec.list_moves(Some("SB-1001")).await.unwrap().len(), 1);
}

#[tokio::test]
async fn moves_list_is_capped_at_the_feed_limit() {
    let store = store_with("submitted").await;
    let config = EngineConfig {
        feed_limit: 2,
        ..Default::default()
    };
    let exec = MoveExecutor::with_clock(store.clone(), clock(), config);
    for note in ["one", "two", "three"] {
        let fields = json!({ "notes": note });
        exec.update_fields("deal-1", fields.as_object().unwrap(), Some("Kristie"), None)
            .await
            .unwrap();
        exec.clock().advance_millis(60_000);
    }

    assert_eq!(store.list_activity(None, 0).await.unwrap().len(), 3);
    let moves = exec.list_moves(Some("SB-1001")).await.unwrap();
    assert_eq!(moves.len(), 2);
    assert!(moves[0].moved_at > moves[1].moved_at);
}

async fn feed_after_gap(gap_ms: i64) -> usize {
    let store = store_with("submitted").await;
    let exec = executor(store.clone());
    let fields = json!({"notes": "first"});
    exec.update_fields("deal-1", fields.as_object().unwrap(), Some("Kristie"), None)
        .await
        .unwrap();
    exec.clock().advance_millis(gap_ms);
    let fields = json!({"notes": "second"});
    exec.update_fields("deal-1", fields.as_object().unwrap(), Some("kristie"), None)
        .await
        .unwrap();

    assert_eq!(store.list_activity(None, 0).await.unwrap().len(), 2);
    exec.activity_feed(None, None).await.unwrap().len()
}

#[tokio::test]
async fn feed_collapses_bursts_within_window() {
    assert_eq!(feed_after_gap(2_000).await, 1);
    assert_eq!(feed_after_gap(6_000).await, 2);
}

#[tokio::test]
async fn history_feed_reads_deal_histories() {
    let store = store_with("submitted").await;
    let exec = executor(store.clone());
    exec.move_deal(request("aip", Some(StageForm::new(Stage::Aip))))
        .await
        .unwrap();

    let feed = exec.history_feed(Some("AIP"), Some(10)).await.unwrap();
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0].actor, "Kristie");
}
