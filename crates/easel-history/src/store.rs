use std::sync::Mutex;

use async_trait::async_trait;

use crate::{
    error::Result,
    types::{HistoryRecord, NewHistoryRecord},
};

/// Persistence for completed generations
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Insert a record and return it as stored
    async fn save(&self, record: NewHistoryRecord) -> Result<HistoryRecord>;

    /// All records for the current user, newest first
    async fn fetch(&self) -> Result<Vec<HistoryRecord>>;

    /// Remove a record by id; unknown ids are not an error
    async fn delete(&self, id: &str) -> Result<()>;
}

/// In-process store for tests and offline runs
#[derive(Debug)]
pub struct MemoryHistoryStore {
    user_id: String,
    records: Mutex<Vec<HistoryRecord>>,
}

impl MemoryHistoryStore {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            records: Mutex::new(Vec::new()),
        }
    }
}

impl Default for MemoryHistoryStore {
    fn default() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn save(&self, record: NewHistoryRecord) -> Result<HistoryRecord> {
        let stored = HistoryRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: self.user_id.clone(),
            model_id: record.model_id,
            prompt: record.prompt,
            original_image_url: record.original_image_url,
            result_image_url: record.result_image_url,
            width: record.width,
            height: record.height,
            request_id: record.request_id,
            seed: record.seed,
            created_at: jiff::Timestamp::now().to_string(),
        };

        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.push(stored.clone());

        Ok(stored)
    }

    async fn fetch(&self) -> Result<Vec<HistoryRecord>> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(records.iter().rev().cloned().collect())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.retain(|record| record.id != id);
        Ok(())
    }
}
