//! Append-only note persistence.
//!
//! One serialized note per JSONL line.  Every append is flushed and
//! fsync'd before the in-memory index sees it, so a note survives a crash
//! immediately after `append` returns and a reader never observes a
//! partially-written note.  Writes are serialized behind a mutex; range
//! reads snapshot the index under the same lock.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

use daybook_digest::Note;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Malformed note, rejected before anything touches disk.
    #[error("invalid note input: {0}")]
    InvalidInput(&'static str),
    /// I/O failure on the notes log.
    #[error("note storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::StorageUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::StorageUnavailable(err.to_string())
    }
}

#[derive(Debug, Default)]
struct Index {
    notes: Vec<Note>,
    next_id: u64,
}

/// Durable note log with range queries.  Notes are immutable once stored;
/// nothing here updates or deletes.
#[derive(Debug)]
pub struct NoteStore {
    path: PathBuf,
    index: Mutex<Index>,
}

impl NoteStore {
    /// Open (or create) the log at `path`, loading any existing notes.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let notes = load_log(&path)?;
        let next_id = notes.iter().map(|note| note.id + 1).max().unwrap_or(1);
        Ok(Self {
            path,
            index: Mutex::new(Index { notes, next_id }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one note.  Assigns the next monotonic id; never reorders or
    /// deduplicates.  Write failures must not be swallowed by callers.
    pub async fn append(
        &self,
        user_id: &str,
        conversation_id: &str,
        text: &str,
        created_at_epoch: i64,
    ) -> Result<Note, StoreError> {
        if user_id.trim().is_empty() {
            return Err(StoreError::InvalidInput("missing user id"));
        }
        if conversation_id.trim().is_empty() {
            return Err(StoreError::InvalidInput("missing conversation id"));
        }
        if text.trim().is_empty() {
            return Err(StoreError::InvalidInput("empty note text"));
        }

        let mut index = self.index.lock().await;
        let note = Note {
            id: index.next_id,
            user_id: user_id.to_string(),
            conversation_id: conversation_id.to_string(),
            text: text.to_string(),
            created_at_epoch,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let line = serde_json::to_string(&note)?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        // Flush userspace buffers and fsync so the note survives a crash
        // immediately after append.
        file.flush().await?;
        file.sync_all().await?;

        index.next_id += 1;
        index.notes.push(note.clone());
        Ok(note)
    }

    /// Notes of one conversation with `start <= created_at_epoch < end`,
    /// ascending by creation time, ties broken by insertion id.
    pub async fn query_range(
        &self,
        conversation_id: &str,
        start_epoch: i64,
        end_epoch: i64,
    ) -> Result<Vec<Note>, StoreError> {
        self.filtered_range(start_epoch, end_epoch, |note| {
            note.conversation_id == conversation_id
        })
        .await
    }

    /// Same range semantics, across all conversations.
    pub async fn query_range_all(
        &self,
        start_epoch: i64,
        end_epoch: i64,
    ) -> Result<Vec<Note>, StoreError> {
        self.filtered_range(start_epoch, end_epoch, |_| true).await
    }

    /// Same range semantics, restricted to one user.
    pub async fn query_range_for_user(
        &self,
        user_id: &str,
        start_epoch: i64,
        end_epoch: i64,
    ) -> Result<Vec<Note>, StoreError> {
        self.filtered_range(start_epoch, end_epoch, |note| note.user_id == user_id)
            .await
    }

    /// Most recently inserted `limit` notes, descending by id.  Diagnostic.
    pub async fn recent_n(&self, limit: usize) -> Result<Vec<Note>, StoreError> {
        let index = self.index.lock().await;
        // The index holds notes in insertion order, so a reverse walk is
        // already descending by id.
        Ok(index.notes.iter().rev().take(limit).cloned().collect())
    }

    pub async fn len(&self) -> usize {
        self.index.lock().await.notes.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn filtered_range<F>(
        &self,
        start_epoch: i64,
        end_epoch: i64,
        keep: F,
    ) -> Result<Vec<Note>, StoreError>
    where
        F: Fn(&Note) -> bool,
    {
        let index = self.index.lock().await;
        let mut notes: Vec<Note> = index
            .notes
            .iter()
            .filter(|note| {
                start_epoch <= note.created_at_epoch
                    && note.created_at_epoch < end_epoch
                    && keep(note)
            })
            .cloned()
            .collect();
        notes.sort_by_key(|note| (note.created_at_epoch, note.id));
        Ok(notes)
    }
}

fn load_log(path: &Path) -> Result<Vec<Note>, StoreError> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = OpenOptions::new().read(true).open(path)?;
    let reader = BufReader::new(file);
    let mut notes = Vec::new();
    let mut corrupt_count = 0usize;

    for (line_idx, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Note>(&line) {
            Ok(note) => notes.push(note),
            Err(err) => {
                corrupt_count += 1;
                warn!(
                    line = line_idx + 1,
                    error = %err,
                    path = %path.display(),
                    "skipping corrupt note log line"
                );
            }
        }
    }

    if corrupt_count > 0 {
        warn!(
            corrupt_lines = corrupt_count,
            path = %path.display(),
            "note log loaded with skipped corrupt lines"
        );
    }

    Ok(notes)
}
