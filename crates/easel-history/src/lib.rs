#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

pub mod error;
pub mod store;
pub mod supabase;
pub mod types;

pub use error::{HistoryError, Result};
pub use store::{HistoryStore, MemoryHistoryStore};
pub use supabase::SupabaseHistoryStore;
pub use types::{HistoryRecord, NewHistoryRecord};
