use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{ActivityRecord, BankRecord, DealPatch, DealRecord, StageNoteRecord};

/// The storage trait for bondflow datastore backends.
///
/// A `DealStore` provides durable storage for deals, their per-bank
/// sub-records, stage-tagged bank notes, and the activity feed. The workflow
/// engine reads a deal snapshot and writes a partial update; it never holds
/// locks or transactions of its own.
///
/// ## Write atomicity
///
/// `update_deal` must apply every column in the `DealPatch` and the optional
/// history append as one write. A failed update leaves the stored deal
/// unchanged.
///
/// ## Version tokens
///
/// Every successful `update_deal` increments `version`. When the caller passes
/// `Some(expected_version)` and the stored version differs, the update is
/// rejected with `StorageError::ConcurrentConflict`. With `None` the last
/// write wins.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` to be used in axum
/// application state and across async task boundaries.
#[async_trait]
pub trait DealStore: Send + Sync + 'static {
    // ── Deals ─────────────────────────────────────────────────────────────────

    /// Resolve a deal by id, falling back to deal code.
    ///
    /// Returns `Err(StorageError::DealNotFound)` if neither matches.
    async fn get_deal(&self, key: &str) -> Result<DealRecord, StorageError>;

    /// List deals newest first, optionally filtered by stored stage string.
    async fn list_deals(&self, stage_filter: Option<&str>) -> Result<Vec<DealRecord>, StorageError>;

    /// Insert a new deal.
    ///
    /// Returns `Err(StorageError::AlreadyExists)` if the id is taken.
    async fn insert_deal(&self, record: DealRecord) -> Result<(), StorageError>;

    /// Apply a partial update to a deal and return the updated record.
    ///
    /// `updated_at` is the write timestamp supplied by the caller.
    async fn update_deal(
        &self,
        deal_id: &str,
        patch: DealPatch,
        expected_version: Option<i64>,
        updated_at: &str,
    ) -> Result<DealRecord, StorageError>;

    // ── Bank data ─────────────────────────────────────────────────────────────

    /// List the per-bank sub-records of a deal.
    async fn list_banks(&self, deal_id: &str) -> Result<Vec<BankRecord>, StorageError>;

    /// List every stage-tagged bank note row of a deal, any stage.
    async fn list_stage_notes(&self, deal_id: &str) -> Result<Vec<StageNoteRecord>, StorageError>;

    /// Replace all rows for `(deal_id, stage)` with `rows`.
    ///
    /// Rows for other stages are untouched. Rows with a blank bank name are
    /// dropped. Returns the number of rows inserted.
    async fn replace_stage_notes(
        &self,
        deal_id: &str,
        stage: &str,
        rows: Vec<StageNoteRecord>,
    ) -> Result<usize, StorageError>;

    // ── Activity ──────────────────────────────────────────────────────────────

    /// Append an activity record.
    async fn insert_activity(&self, record: ActivityRecord) -> Result<(), StorageError>;

    /// List activity newest first by `moved_at`.
    ///
    /// - `deal_id`: restrict to one deal; `None` lists every deal
    /// - `limit`: maximum number of results (0 = no limit)
    async fn list_activity(
        &self,
        deal_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ActivityRecord>, StorageError>;
}
