/// All errors that can be returned by a DealStore implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Optimistic concurrency conflict: the caller supplied a version token
    /// that no longer matches the stored deal.
    #[error(
        "concurrent conflict on deal {deal_id}: expected version {expected_version}, found {found_version}"
    )]
    ConcurrentConflict {
        deal_id: String,
        expected_version: i64,
        found_version: i64,
    },

    /// No deal matches the given id or deal code.
    #[error("deal not found: {deal_key}")]
    DealNotFound { deal_key: String },

    /// A deal with this id already exists.
    #[error("deal already exists: {deal_id}")]
    AlreadyExists { deal_id: String },

    /// A backend-specific storage error (connection, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}
