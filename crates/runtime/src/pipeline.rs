//! The digest pipeline: window → range read → group → analyze → render →
//! deliver.
//!
//! Degradation rules: a read failure during a run is treated as an empty
//! window, an analysis failure falls back to the raw render, and a delivery
//! failure is logged.  None of these abort the run.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{info, warn};

use daybook_digest::{
    AnalysisResult, DigestGroup, TimeWindow, author_label, group_by_conversation,
    group_by_user, render, render_raw_fallback, today_bounds,
};
use daybook_llm::AnalysisGateway;
use daybook_store::NoteStore;

use crate::deliver::Deliverer;

pub struct DigestService {
    store: Arc<NoteStore>,
    gateway: Arc<dyn AnalysisGateway>,
    deliverer: Arc<dyn Deliverer>,
    tz: Tz,
}

impl DigestService {
    pub fn new(
        store: Arc<NoteStore>,
        gateway: Arc<dyn AnalysisGateway>,
        deliverer: Arc<dyn Deliverer>,
        tz: Tz,
    ) -> Self {
        Self {
            store,
            gateway,
            deliverer,
            tz,
        }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Scheduled cross-chat run: all users, today, one message to the
    /// destination.  Each user's notes become one section.
    pub async fn run_scheduled(
        &self,
        destination: &str,
        reference: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let text = self.scheduled_digest_text(reference).await;
        self.notify(destination, &text).await;
        Ok(())
    }

    /// On-demand digest of one conversation's local day.  Returns the
    /// rendered text so the caller decides where it goes.
    pub async fn digest_conversation(
        &self,
        conversation_id: &str,
        reference: DateTime<Utc>,
    ) -> anyhow::Result<String> {
        let (window, date_label) = self.window_for(reference);
        let notes = self
            .store
            .query_range(conversation_id, window.start_epoch, window.end_epoch)
            .await?;
        info!(
            conversation_id,
            count = notes.len(),
            start = window.start_epoch,
            end = window.end_epoch,
            "on-demand digest window read"
        );
        if notes.is_empty() {
            return Ok(render(&date_label, conversation_id, &AnalysisResult::default()));
        }
        let label = author_label(&notes);
        let group = group_by_conversation(&notes);
        Ok(self.digest_section(&date_label, &label, &group).await)
    }

    /// Best-effort delivery.  Failures are logged, never retried.
    pub async fn notify(&self, destination: &str, text: &str) {
        if let Err(err) = self.deliverer.deliver(destination, text).await {
            warn!(%err, destination, "digest delivery failed");
        }
    }

    async fn scheduled_digest_text(&self, reference: DateTime<Utc>) -> String {
        let (window, date_label) = self.window_for(reference);
        // A read failure degrades to an empty window; the scheduler must
        // keep running even when the store is briefly unreachable.
        let notes = match self
            .store
            .query_range_all(window.start_epoch, window.end_epoch)
            .await
        {
            Ok(notes) => notes,
            Err(err) => {
                warn!(%err, "note range read failed; treating window as empty");
                Vec::new()
            }
        };
        info!(
            count = notes.len(),
            start = window.start_epoch,
            end = window.end_epoch,
            "scheduled digest window read"
        );

        if notes.is_empty() {
            // Nothing to analyze: the gateway is not called at all.
            return render(&date_label, "all users", &AnalysisResult::default());
        }

        let mut sections = Vec::new();
        for (user_id, group) in group_by_user(&notes) {
            sections.push(self.digest_section(&date_label, &user_id, &group).await);
        }
        sections.join("\n\n")
    }

    async fn digest_section(&self, date_label: &str, author: &str, group: &DigestGroup) -> String {
        match self.gateway.analyze(&group.joined_text()).await {
            Ok(analysis) => render(date_label, author, &analysis),
            Err(err) => {
                warn!(%err, author, "analysis failed; rendering raw fallback");
                render_raw_fallback(date_label, author, &group.texts)
            }
        }
    }

    fn window_for(&self, reference: DateTime<Utc>) -> (TimeWindow, String) {
        let window = today_bounds(reference, self.tz);
        let date_label = reference
            .with_timezone(&self.tz)
            .format("%Y-%m-%d")
            .to_string();
        (window, date_label)
    }
}
