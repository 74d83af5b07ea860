//! Deal stage workflow engine.
//!
//! Takes loan-bond deals through the fixed pipeline
//! `submitted -> aip -> granted -> instructed -> registrations`, with an
//! `ntu` exit from every non-terminal stage. The engine:
//!
//! - canonicalizes stage spellings ([`stage`])
//! - reconciles per-bank notes and references from several historical
//!   sources into one view per stage ([`bank`])
//! - builds the structured payload captured for a transition ([`payload`])
//! - enforces the legal transition table ([`transition`])
//! - persists moves with an append-only history and an activity record
//!   ([`executor`])
//! - serves a deduplicated, searchable activity feed ([`activity`])
//!
//! Persistence is delegated to a [`bondflow_storage::DealStore`].

pub mod activity;
pub mod bank;
pub mod clock;
pub mod config;
pub mod error;
pub mod executor;
pub mod history;
pub mod payload;
pub mod stage;
pub mod transition;

pub use activity::{ActivityFeed, Deduplicator, FeedEntry};
pub use bank::{BankContext, ReconciledBank, ReconciledBanks, Reconciler};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::EngineConfig;
pub use error::WorkflowError;
pub use executor::{
    BankNoteInput, MoveExecutor, MoveOutcome, MoveRequest, NewDeal, UpdateOutcome,
};
pub use history::{history, MoveHistoryEntry};
pub use payload::{AttorneyDetails, BankSection, ConfirmedPayload, NoteItem, StageForm, StagePayload};
pub use stage::{normalize, normalize_opt, Stage};
