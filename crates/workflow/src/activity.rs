//! Activity deduplication and the cross-deal feed.
//!
//! Double submits and redundant field updates produce bursts of identical
//! activity. The feed collapses any event whose key
//! `(deal, actor, from, to)` was admitted less than the dedup window ago.
//! Persisted history is never touched; only the feed view collapses.

use std::collections::HashMap;

use bondflow_storage::{ActivityRecord, DealRecord, MoveHistoryRecord};
use serde::Serialize;

use crate::clock::timestamp_millis;
use crate::config::EngineConfig;
use crate::stage::normalize;

/// One row of the activity feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedEntry {
    pub deal_id: String,
    pub deal_code: Option<String>,
    pub from_stage: Option<String>,
    pub to_stage: Option<String>,
    pub actor: String,
    pub action: String,
    pub note: Option<String>,
    /// ISO 8601 / RFC 3339 timestamp string, when known.
    pub at: Option<String>,
}

impl FeedEntry {
    pub fn from_record(record: &ActivityRecord) -> Self {
        let actor = if record.moved_by.trim().is_empty() {
            record.actor.clone()
        } else {
            record.moved_by.clone()
        };
        Self {
            deal_id: record.deal_id.clone(),
            deal_code: record.deal_code.clone(),
            from_stage: record.from_stage.clone(),
            to_stage: record.to_stage.clone(),
            actor,
            action: record.action.clone(),
            note: record.note.clone(),
            at: Some(record.moved_at.clone()).filter(|at| !at.trim().is_empty()),
        }
    }

    pub fn from_history(deal: &DealRecord, entry: &MoveHistoryRecord) -> Self {
        Self {
            deal_id: deal.id.clone(),
            deal_code: Some(deal.deal_code.clone()),
            from_stage: Some(entry.from.clone()),
            to_stage: Some(entry.to.clone()),
            actor: entry.by.clone(),
            action: "move".to_string(),
            note: entry.note.clone(),
            at: Some(entry.at.clone()).filter(|at| !at.trim().is_empty()),
        }
    }

    /// Every history entry of every deal.
    pub fn from_deals(deals: &[DealRecord]) -> Vec<Self> {
        deals
            .iter()
            .flat_map(|deal| deal.move_history.iter().map(move |h| Self::from_history(deal, h)))
            .collect()
    }

    fn millis(&self) -> Option<i64> {
        self.at.as_deref().and_then(timestamp_millis)
    }

    fn dedup_key(&self) -> String {
        let lower = |v: Option<&str>| v.unwrap_or_default().trim().to_lowercase();
        format!(
            "{}|{}|{}|{}",
            self.deal_id,
            self.actor.trim().to_lowercase(),
            lower(self.from_stage.as_deref()),
            lower(self.to_stage.as_deref()),
        )
    }

    /// Case-insensitive substring match on deal code, actor, and both
    /// stages (raw value or label). `needle` must already be lowercase.
    fn matches(&self, needle: &str) -> bool {
        let hit = |v: &str| v.to_lowercase().contains(needle);
        let stage_hit = |v: Option<&str>| {
            v.is_some_and(|raw| hit(raw) || (!raw.trim().is_empty() && hit(normalize(raw).label())))
        };
        self.deal_code.as_deref().is_some_and(hit)
            || hit(&self.actor)
            || stage_hit(self.from_stage.as_deref())
            || stage_hit(self.to_stage.as_deref())
    }
}

/// Drops events that repeat an admitted key within the window.
#[derive(Debug, Clone)]
pub struct Deduplicator {
    window_ms: i64,
    last_admitted: HashMap<String, i64>,
}

impl Deduplicator {
    pub fn new(window_ms: i64) -> Self {
        Self {
            window_ms,
            last_admitted: HashMap::new(),
        }
    }

    /// Whether `entry` belongs in the feed. Entries without a usable
    /// timestamp are always admitted and do not open a window.
    pub fn admit(&mut self, entry: &FeedEntry) -> bool {
        let Some(at) = entry.millis() else {
            return true;
        };
        let key = entry.dedup_key();
        if let Some(last) = self.last_admitted.get(&key) {
            if (at - last).abs() <= self.window_ms {
                return false;
            }
        }
        self.last_admitted.insert(key, at);
        true
    }
}

/// Builds the merged, deduplicated, searchable feed.
#[derive(Debug, Clone, Copy)]
pub struct ActivityFeed {
    window_ms: i64,
}

impl ActivityFeed {
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_window(config.dedup_window_ms)
    }

    pub fn with_window(window_ms: i64) -> Self {
        Self { window_ms }
    }

    /// Deduplicate oldest first, filter by `query`, and return newest first
    /// with untimed entries last.
    pub fn build(&self, mut entries: Vec<FeedEntry>, query: Option<&str>) -> Vec<FeedEntry> {
        entries.sort_by_key(|e| e.millis());

        let mut dedup = Deduplicator::new(self.window_ms);
        let needle = query.map(|q| q.trim().to_lowercase()).filter(|q| !q.is_empty());
        let mut feed: Vec<FeedEntry> = entries
            .into_iter()
            .filter(|e| dedup.admit(e))
            .filter(|e| needle.as_deref().map_or(true, |n| e.matches(n)))
            .collect();

        feed.sort_by(|a, b| b.millis().cmp(&a.millis()));
        feed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(deal: &str, actor: &str, from: &str, to: &str, at: Option<&str>) -> FeedEntry {
        FeedEntry {
            deal_id: deal.to_string(),
            deal_code: Some(format!("SB-{}", deal)),
            from_stage: Some(from.to_string()),
            to_stage: Some(to.to_string()),
            actor: actor.to_string(),
            action: "move".to_string(),
            note: None,
            at: at.map(str::to_string),
        }
    }

    fn feed(entries: Vec<FeedEntry>) -> Vec<FeedEntry> {
        ActivityFeed::with_window(5_000).build(entries, None)
    }

    #[test]
    fn events_two_seconds_apart_collapse() {
        let out = feed(vec![
            entry("1", "Kristie", "submitted", "aip", Some("2026-01-01T10:00:00.000Z")),
            entry("1", "kristie", "Submitted", "AIP", Some("2026-01-01T10:00:02.000Z")),
        ]);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn events_six_seconds_apart_both_survive() {
        let out = feed(vec![
            entry("1", "Kristie", "submitted", "aip", Some("2026-01-01T10:00:00.000Z")),
            entry("1", "Kristie", "submitted", "aip", Some("2026-01-01T10:00:06.000Z")),
        ]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn window_is_measured_from_last_admitted_event() {
        let out = feed(vec![
            entry("1", "K", "aip", "granted", Some("2026-01-01T10:00:00.000Z")),
            entry("1", "K", "aip", "granted", Some("2026-01-01T10:00:04.000Z")),
            entry("1", "K", "aip", "granted", Some("2026-01-01T10:00:08.000Z")),
        ]);
        let times: Vec<_> = out.iter().map(|e| e.at.as_deref().unwrap()).collect();
        assert_eq!(times, vec!["2026-01-01T10:00:08.000Z", "2026-01-01T10:00:00.000Z"]);
    }

    #[test]
    fn different_keys_never_collapse() {
        let at = Some("2026-01-01T10:00:00.000Z");
        let out = feed(vec![
            entry("1", "K", "aip", "granted", at),
            entry("2", "K", "aip", "granted", at),
            entry("1", "M", "aip", "granted", at),
            entry("1", "K", "aip", "ntu", at),
        ]);
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn untimed_entries_are_kept_and_sorted_last() {
        let out = feed(vec![
            entry("1", "K", "aip", "granted", None),
            entry("1", "K", "aip", "granted", Some("not a date")),
            entry("2", "K", "submitted", "aip", Some("2026-01-01T10:00:00.000Z")),
            entry("3", "K", "submitted", "aip", Some("2026-01-02T10:00:00.000Z")),
        ]);
        let deals: Vec<_> = out.iter().map(|e| e.deal_id.as_str()).collect();
        assert_eq!(deals, vec!["3", "2", "1", "1"]);
    }

    #[test]
    fn search_matches_code_actor_and_stage_labels() {
        let entries = vec![
            entry("1", "Kristie", "submitted", "arp", Some("2026-01-01T10:00:00.000Z")),
            entry("2", "Marco", "granted", "instructed", Some("2026-01-01T11:00:00.000Z")),
        ];
        let builder = ActivityFeed::with_window(5_000);

        assert_eq!(builder.build(entries.clone(), Some("sb-2")).len(), 1);
        assert_eq!(builder.build(entries.clone(), Some("KRIS")).len(), 1);
        // "arp" is shown with the AIP label
        assert_eq!(builder.build(entries.clone(), Some("aip"))[0].deal_id, "1");
        assert_eq!(builder.build(entries.clone(), Some("  ")).len(), 2);
        assert!(builder.build(entries, Some("nobody")).is_empty());
    }

    #[test]
    fn history_entries_feed_directly() {
        let deal = DealRecord {
            id: "d-1".to_string(),
            deal_code: "SB-1".to_string(),
            move_history: vec![MoveHistoryRecord {
                from: "submitted".to_string(),
                to: "aip".to_string(),
                by: "Kristie".to_string(),
                at: "2026-01-01T10:00:00.000Z".to_string(),
                note: None,
                data: serde_json::Value::Null,
            }],
            ..Default::default()
        };
        let entries = FeedEntry::from_deals(&[deal]);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].deal_code.as_deref(), Some("SB-1"));
        assert_eq!(entries[0].actor, "Kristie");
    }
}
