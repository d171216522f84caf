//! In-memory [`NoteStore`] implementation for tests and embedding.
//!
//! Nothing is persisted; the map lives as long as the store.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::ServiceResult;

use super::{normalize_cadastral, NoteMap, NoteRecord, NoteStore, NoteUpdate};

#[derive(Default)]
pub struct MemoryNoteStore {
    notes: Mutex<NoteMap>,
}

impl MemoryNoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_notes(notes: NoteMap) -> Self {
        Self {
            notes: Mutex::new(notes),
        }
    }
}

#[async_trait]
impl NoteStore for MemoryNoteStore {
    async fn get_all(&self) -> ServiceResult<NoteMap> {
        Ok(self.notes.lock().await.clone())
    }

    async fn upsert(
        &self,
        cadastral_number: &str,
        update: NoteUpdate,
    ) -> ServiceResult<NoteRecord> {
        let key = normalize_cadastral(cadastral_number)?;
        let mut notes = self.notes.lock().await;
        let entry = notes.entry(key).or_default();
        entry.apply(update);
        Ok(entry.clone())
    }
}
