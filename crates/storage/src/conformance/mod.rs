//! Conformance test suite for `DealStore` implementations.
//!
//! This module provides a backend-agnostic test suite that any `DealStore`
//! implementation can run to verify correctness. The suite covers:
//!
//! - **Deals**: insert, lookup by id and by deal code, duplicate detection
//! - **Versions**: version bump on update, stale-token conflict detection
//! - **History**: atomic patch application, append-only ordering
//! - **Stage notes**: wipe-and-insert scoped to one (deal, stage) pair
//! - **Activity**: newest-first ordering, per-deal filtering, limits
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty store for each test:
//!
//! ```ignore
//! use bondflow_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn postgres_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         create_test_postgres_store().await
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod activity;
mod deals;
mod history;
mod notes;
mod version;

use std::fmt;
use std::future::Future;

use crate::record::{ActivityRecord, DealRecord, MoveHistoryRecord, StageNoteRecord};
use crate::DealStore;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "deals", "version", "activity").
    pub category: String,
    /// Test name (e.g. "get_deal_by_code").
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn pass(category: &str, name: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: true,
            message: None,
        }
    }

    fn fail(category: &str, name: &str, msg: String) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: false,
            message: Some(msg),
        }
    }

    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::pass(category, name),
            Err(msg) => Self::fail(category, name, msg),
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a store backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// store, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: DealStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(deals::run_deal_tests(&factory).await);
    results.extend(version::run_version_tests(&factory).await);
    results.extend(history::run_history_tests(&factory).await);
    results.extend(notes::run_note_tests(&factory).await);
    results.extend(activity::run_activity_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers: record constructors with sensible defaults ──────────────────────

fn make_deal(id: &str, deal_code: &str, created_at: &str) -> DealRecord {
    DealRecord {
        id: id.to_string(),
        deal_code: deal_code.to_string(),
        applicant: "Test Applicant".to_string(),
        stage: "submitted".to_string(),
        banks: vec!["ABSA".to_string(), "FNB".to_string()],
        created_at: created_at.to_string(),
        updated_at: created_at.to_string(),
        ..Default::default()
    }
}

fn make_history(from: &str, to: &str, at: &str) -> MoveHistoryRecord {
    MoveHistoryRecord {
        from: from.to_string(),
        to: to.to_string(),
        by: "test-actor".to_string(),
        at: at.to_string(),
        note: None,
        data: serde_json::json!({"stage": to}),
    }
}

fn make_note(bank_name: &str, bank_notes: &str) -> StageNoteRecord {
    StageNoteRecord {
        bank_name: bank_name.to_string(),
        bank_notes: bank_notes.to_string(),
        ..Default::default()
    }
}

fn make_activity(id: &str, deal_id: &str, moved_at: &str) -> ActivityRecord {
    ActivityRecord {
        id: id.to_string(),
        deal_id: deal_id.to_string(),
        deal_code: Some(format!("CODE-{}", deal_id)),
        from_stage: Some("submitted".to_string()),
        to_stage: Some("aip".to_string()),
        moved_by: "test-actor".to_string(),
        actor: "test-actor".to_string(),
        action: "move".to_string(),
        note: None,
        moved_at: moved_at.to_string(),
        created_at: moved_at.to_string(),
    }
}

const T0: &str = "2026-01-01T00:00:00.000Z";
const T1: &str = "2026-01-02T00:00:00.000Z";
const T2: &str = "2026-01-03T00:00:00.000Z";

/// Insert a standard deal `deal-1` / `CODE-1`.
async fn seed_deal<S: DealStore>(s: &S) -> Result<(), String> {
    s.insert_deal(make_deal("deal-1", "CODE-1", T0))
        .await
        .map_err(|e| e.to_string())
}
