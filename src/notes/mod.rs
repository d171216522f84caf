//! Note storage keyed by cadastral number.
//!
//! The [`NoteStore`] trait is the only thing the HTTP layer knows about
//! persistence. Two backends ship with the crate:
//!
//! - [`JsonFileStore`] — a whole-document JSON file guarded by a single
//!   async mutex; every mutation rewrites the file atomically.
//! - [`MemoryNoteStore`] — a `BTreeMap` behind a lock, for tests and
//!   embedding.
//!
//! Both apply the same merge rule ([`NoteRecord::apply`]) so partial updates
//! behave identically regardless of backend.

pub mod file;
pub mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryNoteStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::{ServiceError, ServiceResult};

/// Full snapshot of the store, ordered by cadastral number.
pub type NoteMap = BTreeMap<String, NoteRecord>;

/// A user-editable description/link pair attached to a cadastral number.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avito_link: Option<String>,
}

/// A partial update. `None` leaves the stored field untouched; `Some("")`
/// clears it to the empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteUpdate {
    pub description: Option<String>,
    pub avito_link: Option<String>,
}

impl NoteRecord {
    /// Merges the supplied fields of `update` into this record.
    pub fn apply(&mut self, update: NoteUpdate) {
        if let Some(description) = update.description {
            self.description = Some(description);
        }
        if let Some(avito_link) = update.avito_link {
            self.avito_link = Some(avito_link);
        }
    }

    /// Projects a stored entry onto the two known fields.
    ///
    /// Non-string values are rendered as their JSON text; `null` and absent
    /// fields stay `None`. Other keys are ignored.
    pub fn from_fields(fields: &Map<String, Value>) -> Self {
        Self {
            description: text_field(fields, "description"),
            avito_link: text_field(fields, "avito_link"),
        }
    }
}

impl NoteUpdate {
    /// Writes the supplied fields into a stored entry, leaving every other
    /// key of that entry untouched.
    pub fn merge_into(self, fields: &mut Map<String, Value>) {
        if let Some(description) = self.description {
            fields.insert("description".to_string(), Value::String(description));
        }
        if let Some(avito_link) = self.avito_link {
            fields.insert("avito_link".to_string(), Value::String(avito_link));
        }
    }
}

fn text_field(fields: &Map<String, Value>, name: &str) -> Option<String> {
    match fields.get(name)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Trims the cadastral number and rejects it when nothing is left.
pub fn normalize_cadastral(raw: &str) -> ServiceResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::invalid("Missing cadastral_number"));
    }
    Ok(trimmed.to_string())
}

/// Durable mapping from cadastral number to [`NoteRecord`].
///
/// Implementations must serialize mutations so that two concurrent
/// `upsert` calls never interleave and `get_all` never observes a
/// half-applied write.
#[async_trait]
pub trait NoteStore: Send + Sync {
    /// Returns the current persisted state.
    async fn get_all(&self) -> ServiceResult<NoteMap>;

    /// Merges `update` into the record for `cadastral_number` and persists it.
    ///
    /// Fails with [`ServiceError::InvalidInput`] when the trimmed id is empty.
    async fn upsert(&self, cadastral_number: &str, update: NoteUpdate)
        -> ServiceResult<NoteRecord>;
}
