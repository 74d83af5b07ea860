pub mod conformance;
mod error;
mod memory;
mod record;
mod traits;

pub use error::StorageError;
pub use memory::{InMemoryDealStore, StoreSnapshot};
pub use record::{
    ActivityRecord, BankRecord, DealPatch, DealRecord, MoveHistoryRecord, StageNoteRecord,
};
pub use traits::DealStore;
