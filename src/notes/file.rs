//! JSON-file [`NoteStore`] backend.
//!
//! The whole mapping lives in one pretty-printed JSON object. Reads and
//! load-mutate-save cycles run under one `tokio::sync::Mutex`, and writes go
//! to a sibling temp file that is renamed over the document, so neither a
//! concurrent reader nor a crash can observe a partial file.
//!
//! The document is kept as raw JSON between load and save. An upsert only
//! touches `description`/`avito_link` of its own entry; every other entry,
//! and any extra key inside an entry, is written back as it was read.
//! Entries are projected onto [`NoteRecord`] only when answering reads.
//!
//! A missing, unreadable-as-UTF-8, or non-object document is treated as an
//! empty mapping; the next successful upsert replaces it with a valid one.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::ServiceResult;

use super::{normalize_cadastral, NoteMap, NoteRecord, NoteStore, NoteUpdate};

/// The on-disk document as read, keyed by cadastral number.
type Document = Map<String, Value>;

pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    /// Creates a store backed by `path`. Nothing is touched on disk until
    /// the first read or write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the data directory and an empty `{}` document if absent.
    pub async fn ensure_data_file(&self) -> ServiceResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        if !tokio::fs::try_exists(&self.path).await? {
            tokio::fs::write(&self.path, b"{}").await?;
        }
        Ok(())
    }

    async fn load(&self) -> ServiceResult<Document> {
        self.ensure_data_file().await?;
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                tracing::warn!(path = %self.path.display(), "notes file is not valid UTF-8, treating as empty");
                return Ok(Document::new());
            }
            Err(e) => return Err(e.into()),
        };
        Ok(parse_document(&content, &self.path))
    }

    async fn save(&self, document: &Document) -> ServiceResult<()> {
        self.ensure_data_file().await?;
        let json = serde_json::to_string_pretty(document)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let tmp_path = self.path.with_extension("json.tmp");
        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

/// Parses the on-disk document; anything but a JSON object reads as empty.
fn parse_document(content: &str, path: &Path) -> Document {
    match serde_json::from_str::<Value>(content) {
        Ok(Value::Object(entries)) => entries,
        Ok(_) => {
            tracing::warn!(path = %path.display(), "notes file is not a JSON object, treating as empty");
            Document::new()
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "notes file is not valid JSON, treating as empty");
            Document::new()
        }
    }
}

/// Projects the document onto [`NoteMap`]. Entries that are not objects are
/// left out of the snapshot but stay on disk.
fn project(document: &Document) -> NoteMap {
    document
        .iter()
        .filter_map(|(key, entry)| match entry {
            Value::Object(fields) => Some((key.clone(), NoteRecord::from_fields(fields))),
            _ => {
                tracing::warn!(cadastral_number = %key, "note entry is not an object, leaving it out");
                None
            }
        })
        .collect()
}

#[async_trait]
impl NoteStore for JsonFileStore {
    async fn get_all(&self) -> ServiceResult<NoteMap> {
        let _guard = self.lock.lock().await;
        Ok(project(&self.load().await?))
    }

    async fn upsert(
        &self,
        cadastral_number: &str,
        update: NoteUpdate,
    ) -> ServiceResult<NoteRecord> {
        let key = normalize_cadastral(cadastral_number)?;

        let _guard = self.lock.lock().await;
        let mut document = self.load().await?;
        let mut fields = match document.remove(&key) {
            Some(Value::Object(fields)) => fields,
            Some(_) => {
                tracing::warn!(cadastral_number = %key, "replacing non-object note entry");
                Map::new()
            }
            None => Map::new(),
        };
        update.merge_into(&mut fields);
        let record = NoteRecord::from_fields(&fields);
        document.insert(key.clone(), Value::Object(fields));
        self.save(&document).await?;

        tracing::debug!(cadastral_number = %key, "note saved");
        Ok(record)
    }
}
