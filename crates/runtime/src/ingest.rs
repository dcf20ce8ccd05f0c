//! Note ingestion.
//!
//! Text arrives already transcribed (or as CLI input); voice goes through
//! the gateway first.  `created_at_epoch` is stamped here, at ingestion
//! time, and never mutated afterwards.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use daybook_digest::Note;
use daybook_llm::AnalysisGateway;
use daybook_store::{NoteStore, StoreError};

pub struct Ingestor {
    store: Arc<NoteStore>,
    gateway: Arc<dyn AnalysisGateway>,
    language_hint: String,
}

impl Ingestor {
    pub fn new(
        store: Arc<NoteStore>,
        gateway: Arc<dyn AnalysisGateway>,
        language_hint: impl Into<String>,
    ) -> Self {
        Self {
            store,
            gateway,
            language_hint: language_hint.into(),
        }
    }

    /// Persist a text note stamped with the current UTC epoch second.  No
    /// retries; the transport collaborator decides whether to surface a
    /// failure to the end user.
    pub async fn ingest_text(
        &self,
        user_id: &str,
        conversation_id: &str,
        text: &str,
    ) -> Result<Note, StoreError> {
        let created_at_epoch = Utc::now().timestamp();
        let note = self
            .store
            .append(user_id, conversation_id, text, created_at_epoch)
            .await?;
        info!(
            note_id = note.id,
            user_id,
            conversation_id,
            "note ingested"
        );
        Ok(note)
    }

    /// Transcribe a voice note and persist the text.  Transcription
    /// failures propagate to the caller untouched.
    pub async fn ingest_voice(
        &self,
        user_id: &str,
        conversation_id: &str,
        audio: Vec<u8>,
        filename: &str,
    ) -> anyhow::Result<Note> {
        let text = self
            .gateway
            .transcribe(audio, filename, &self.language_hint)
            .await?;
        info!(
            user_id,
            conversation_id,
            text_len = text.len(),
            "voice note transcribed"
        );
        Ok(self.ingest_text(user_id, conversation_id, &text).await?)
    }
}
