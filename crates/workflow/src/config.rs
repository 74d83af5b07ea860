use serde::{Deserialize, Serialize};

/// Upper bound on feed requests, whatever the caller asks for.
pub const MAX_FEED_LIMIT: usize = 1000;

/// Tunables for the workflow engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Window within which repeated activity for the same key collapses.
    pub dedup_window_ms: i64,
    /// Feed size when the caller does not ask for one.
    pub feed_limit: usize,
    /// Actor names that never count as an attributable user.
    pub reserved_actor_names: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dedup_window_ms: 5_000,
            feed_limit: 200,
            reserved_actor_names: vec!["system".to_string()],
        }
    }
}

impl EngineConfig {
    /// Resolve a requested feed size into `1..=MAX_FEED_LIMIT`.
    pub fn feed_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.feed_limit)
            .clamp(1, MAX_FEED_LIMIT)
    }

    pub fn is_reserved_actor(&self, name: &str) -> bool {
        let name = name.trim();
        self.reserved_actor_names
            .iter()
            .any(|r| r.trim().eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_limit_is_clamped() {
        let config = EngineConfig::default();
        assert_eq!(config.feed_limit(None), 200);
        assert_eq!(config.feed_limit(Some(0)), 1);
        assert_eq!(config.feed_limit(Some(50_000)), MAX_FEED_LIMIT);
    }

    #[test]
    fn reserved_actor_is_case_insensitive() {
        let config = EngineConfig::default();
        assert!(config.is_reserved_actor("System"));
        assert!(config.is_reserved_actor(" SYSTEM "));
        assert!(!config.is_reserved_actor("Kristie"));
    }

    #[test]
    fn partial_toml_style_json_keeps_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"dedup_window_ms": 1000}"#).unwrap();
        assert_eq!(config.dedup_window_ms, 1000);
        assert_eq!(config.feed_limit, 200);
    }
}
