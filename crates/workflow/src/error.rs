use bondflow_storage::StorageError;

use crate::stage::Stage;

/// Errors produced by the workflow engine.
///
/// Validation kinds are always raised before any write is attempted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    #[error("deal not found: {deal_key}")]
    NotFound { deal_key: String },

    #[error("cannot move a deal from {} to {}", .from.label(), .to.label())]
    InvalidTransition { from: Stage, to: Stage },

    #[error("please log in again: moves must be attributed to a named user")]
    MissingActor,

    #[error("{} details must be confirmed before moving: {reason}", .stage.label())]
    IncompletePayload { stage: Stage, reason: String },

    #[error("deal {deal_id} was changed by someone else (expected version {expected_version}, found {found_version})")]
    Conflict {
        deal_id: String,
        expected_version: i64,
        found_version: i64,
    },

    #[error("field cannot be updated: {field}")]
    InvalidField { field: String },

    #[error("invalid deal: {0}")]
    InvalidDeal(String),

    #[error("persist failed: {0}")]
    PersistFailure(String),
}

impl WorkflowError {
    /// Whether the caller can fix the request and try again.
    ///
    /// Only datastore failures are surfaced as final.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, WorkflowError::PersistFailure(_))
    }

    /// Stable machine-readable name for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowError::NotFound { .. } => "not_found",
            WorkflowError::InvalidTransition { .. } => "invalid_transition",
            WorkflowError::MissingActor => "missing_actor",
            WorkflowError::IncompletePayload { .. } => "incomplete_payload",
            WorkflowError::Conflict { .. } => "conflict",
            WorkflowError::InvalidField { .. } => "invalid_field",
            WorkflowError::InvalidDeal(_) => "invalid_deal",
            WorkflowError::PersistFailure(_) => "persist_failure",
        }
    }
}

impl From<StorageError> for WorkflowError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::DealNotFound { deal_key } => WorkflowError::NotFound { deal_key },
            StorageError::ConcurrentConflict {
                deal_id,
                expected_version,
                found_version,
            } => WorkflowError::Conflict {
                deal_id,
                expected_version,
                found_version,
            },
            other => WorkflowError::PersistFailure(other.to_string()),
        }
    }
}
