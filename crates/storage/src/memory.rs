//! In-memory `DealStore` backend.
//!
//! Used by tests, by the CLI (persisted as a JSON [`StoreSnapshot`]), and as
//! the reference backend for the conformance suite.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::record::{ActivityRecord, BankRecord, DealPatch, DealRecord, StageNoteRecord};
use crate::traits::DealStore;

/// Serializable contents of an [`InMemoryDealStore`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub deals: Vec<DealRecord>,
    #[serde(default)]
    pub banks: Vec<BankRecord>,
    #[serde(default)]
    pub stage_notes: Vec<StageNoteRecord>,
    #[serde(default)]
    pub activity: Vec<ActivityRecord>,
}

/// A `DealStore` held entirely in memory behind a `tokio::sync::RwLock`.
#[derive(Debug, Default)]
pub struct InMemoryDealStore {
    inner: RwLock<StoreSnapshot>,
}

impl InMemoryDealStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            inner: RwLock::new(snapshot),
        }
    }

    /// Clone the current contents for persistence.
    pub async fn snapshot(&self) -> StoreSnapshot {
        self.inner.read().await.clone()
    }

    /// Replace the contents wholesale, e.g. with the last saved snapshot.
    pub async fn restore(&self, snapshot: StoreSnapshot) {
        *self.inner.write().await = snapshot;
    }
}

#[async_trait]
impl DealStore for InMemoryDealStore {
    async fn get_deal(&self, key: &str) -> Result<DealRecord, StorageError> {
        let inner = self.inner.read().await;
        inner
            .deals
            .iter()
            .find(|d| d.id == key)
            .or_else(|| inner.deals.iter().find(|d| d.deal_code == key))
            .cloned()
            .ok_or_else(|| StorageError::DealNotFound {
                deal_key: key.to_string(),
            })
    }

    async fn list_deals(&self, stage_filter: Option<&str>) -> Result<Vec<DealRecord>, StorageError> {
        let inner = self.inner.read().await;
        let mut deals: Vec<DealRecord> = inner
            .deals
            .iter()
            .filter(|d| stage_filter.map_or(true, |s| d.stage == s))
            .cloned()
            .collect();
        deals.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(deals)
    }

    async fn insert_deal(&self, record: DealRecord) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        if inner.deals.iter().any(|d| d.id == record.id) {
            return Err(StorageError::AlreadyExists {
                deal_id: record.id,
            });
        }
        inner.deals.push(record);
        Ok(())
    }

    async fn update_deal(
        &self,
        deal_id: &str,
        patch: DealPatch,
        expected_version: Option<i64>,
        updated_at: &str,
    ) -> Result<DealRecord, StorageError> {
        let mut inner = self.inner.write().await;
        let deal = inner
            .deals
            .iter_mut()
            .find(|d| d.id == deal_id)
            .ok_or_else(|| StorageError::DealNotFound {
                deal_key: deal_id.to_string(),
            })?;
        if let Some(expected) = expected_version {
            if deal.version != expected {
                return Err(StorageError::ConcurrentConflict {
                    deal_id: deal_id.to_string(),
                    expected_version: expected,
                    found_version: deal.version,
                });
            }
        }
        patch.apply_to(deal);
        deal.version += 1;
        deal.updated_at = updated_at.to_string();
        Ok(deal.clone())
    }

    async fn list_banks(&self, deal_id: &str) -> Result<Vec<BankRecord>, StorageError> {
        let inner = self.inner.read().await;
        Ok(inner
            .banks
            .iter()
            .filter(|b| b.deal_id == deal_id)
            .cloned()
            .collect())
    }

    async fn list_stage_notes(&self, deal_id: &str) -> Result<Vec<StageNoteRecord>, StorageError> {
        let inner = self.inner.read().await;
        Ok(inner
            .stage_notes
            .iter()
            .filter(|n| n.deal_id == deal_id)
            .cloned()
            .collect())
    }

    async fn replace_stage_notes(
        &self,
        deal_id: &str,
        stage: &str,
        rows: Vec<StageNoteRecord>,
    ) -> Result<usize, StorageError> {
        let mut inner = self.inner.write().await;
        inner
            .stage_notes
            .retain(|n| !(n.deal_id == deal_id && n.stage == stage));

        let mut inserted = 0;
        for (i, mut row) in rows.into_iter().enumerate() {
            row.bank_name = row.bank_name.trim().to_string();
            if row.bank_name.is_empty() {
                continue;
            }
            if row.id.is_empty() {
                row.id = format!("{}-{}-{}", deal_id, stage, i);
            }
            row.deal_id = deal_id.to_string();
            row.stage = stage.to_string();
            inner.stage_notes.push(row);
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn insert_activity(&self, record: ActivityRecord) -> Result<(), StorageError> {
        self.inner.write().await.activity.push(record);
        Ok(())
    }

    async fn list_activity(
        &self,
        deal_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ActivityRecord>, StorageError> {
        let inner = self.inner.read().await;
        let mut rows: Vec<ActivityRecord> = inner
            .activity
            .iter()
            .filter(|a| deal_id.map_or(true, |id| a.deal_id == id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.moved_at.cmp(&a.moved_at));
        if limit > 0 {
            rows.truncate(limit);
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deal(id: &str, code: &str) -> DealRecord {
        DealRecord {
            id: id.to_string(),
            deal_code: code.to_string(),
            stage: "submitted".to_string(),
            created_at: "2026-01-01T00:00:00.000Z".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn id_takes_precedence_over_code() {
        let store = InMemoryDealStore::new();
        store.insert_deal(deal("SB-2", "SB-1")).await.unwrap();
        store.insert_deal(deal("d-1", "SB-2")).await.unwrap();
        let found = store.get_deal("SB-2").await.unwrap();
        assert_eq!(found.id, "SB-2");
    }

    #[tokio::test]
    async fn snapshot_round_trips_contents() {
        let store = InMemoryDealStore::new();
        store.insert_deal(deal("d-1", "SB-1")).await.unwrap();
        let snap = store.snapshot().await;
        let json = serde_json::to_string(&snap).unwrap();
        let restored = InMemoryDealStore::from_snapshot(serde_json::from_str(&json).unwrap());
        assert_eq!(restored.get_deal("SB-1").await.unwrap().id, "d-1");
    }

    #[tokio::test]
    async fn restore_discards_later_writes() {
        let store = InMemoryDealStore::new();
        store.insert_deal(deal("d-1", "SB-1")).await.unwrap();
        let saved = store.snapshot().await;

        store.insert_deal(deal("d-2", "SB-2")).await.unwrap();
        store.restore(saved.clone()).await;
        assert_eq!(store.snapshot().await, saved);
        assert!(store.get_deal("SB-2").await.is_err());
    }
}
