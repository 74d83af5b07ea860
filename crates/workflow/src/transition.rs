//! The stage transition table.

use crate::error::WorkflowError;
use crate::stage::Stage;

/// Stages a deal may move to from `from`. `registrations` and `ntu` are
/// terminal.
pub fn legal_next(from: Stage) -> &'static [Stage] {
    match from {
        Stage::Submitted => &[Stage::Aip, Stage::Ntu],
        Stage::Aip => &[Stage::Granted, Stage::Ntu],
        Stage::Granted => &[Stage::Instructed, Stage::Ntu],
        Stage::Instructed => &[Stage::Ntu, Stage::Registrations],
        Stage::Registrations | Stage::Ntu => &[],
    }
}

pub fn is_legal(from: Stage, to: Stage) -> bool {
    legal_next(from).contains(&to)
}

pub fn is_terminal(stage: Stage) -> bool {
    legal_next(stage).is_empty()
}

/// Whether entering `to` needs a confirmed stage payload.
pub fn requires_payload(to: Stage) -> bool {
    match to {
        Stage::Submitted => false,
        Stage::Aip | Stage::Granted | Stage::Instructed | Stage::Registrations | Stage::Ntu => true,
    }
}

/// Check a transition against the table.
pub fn validate(from: Stage, to: Stage) -> Result<(), WorkflowError> {
    if is_legal(from, to) {
        Ok(())
    } else {
        Err(WorkflowError::InvalidTransition { from, to })
    }
}
