//! The daily digest scheduler.
//!
//! One long-lived loop: compute the next local fire time, sleep until it,
//! run the cross-chat pipeline, repeat.  A failed cycle is reported to the
//! destination best-effort and never stops the loop or skips the following
//! day's run.  Shutdown is the only thing that ends it.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use daybook_digest::next_fire_time;

use crate::clock::Clock;
use crate::pipeline::DigestService;

pub struct DigestScheduler {
    service: Arc<DigestService>,
    clock: Arc<dyn Clock>,
    hour: u32,
    minute: u32,
    second: u32,
    destination: String,
}

impl DigestScheduler {
    pub fn new(
        service: Arc<DigestService>,
        clock: Arc<dyn Clock>,
        hour: u32,
        minute: u32,
        second: u32,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            service,
            clock,
            hour,
            minute,
            second,
            destination: destination.into(),
        }
    }

    /// Run until the shutdown channel flips to `true`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let tz = self.service.timezone();
        loop {
            if *shutdown.borrow() {
                break;
            }

            let now = self.clock.now();
            let fire_at = next_fire_time(self.hour, self.minute, self.second, tz, now);
            info!(%fire_at, "digest scheduler waiting for next fire time");

            tokio::select! {
                _ = self.clock.sleep_until(fire_at) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            let reference = self.clock.now();
            match self
                .service
                .run_scheduled(&self.destination, reference)
                .await
            {
                Ok(()) => info!("scheduled digest cycle complete"),
                Err(err) => {
                    // One bad cycle must not degrade the next one.
                    warn!(%err, "scheduled digest cycle failed");
                    let notice = format!("daily digest failed: {err}");
                    self.service.notify(&self.destination, &notice).await;
                }
            }
        }
        info!("digest scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use chrono_tz::{Europe, Tz};
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    use daybook_digest::AnalysisResult;
    use daybook_llm::{AnalysisGateway, GatewayError};
    use daybook_store::NoteStore;

    use crate::deliver::Deliverer;
    use crate::pipeline::DigestService;

    // ── test doubles ───────────────────────────────────────────────────────

    struct ScriptedGateway {
        analyze_calls: AtomicUsize,
        fail: bool,
    }

    impl ScriptedGateway {
        fn ok() -> Self {
            Self {
                analyze_calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                analyze_calls: AtomicUsize::new(0),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl AnalysisGateway for ScriptedGateway {
        async fn analyze(&self, text: &str) -> Result<AnalysisResult, GatewayError> {
            self.analyze_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(GatewayError::AnalysisUnavailable("scripted outage".into()));
            }
            Ok(AnalysisResult {
                events: text.lines().map(|line| format!("event: {line}")).collect(),
                ..AnalysisResult::default()
            })
        }

        async fn transcribe(
            &self,
            _audio: Vec<u8>,
            _filename: &str,
            _language: &str,
        ) -> Result<String, GatewayError> {
            Err(GatewayError::TranscriptionUnavailable("not scripted".into()))
        }
    }

    struct RecordingDeliverer {
        sent: StdMutex<Vec<(String, String)>>,
        notify_tx: Option<mpsc::UnboundedSender<String>>,
        fail: bool,
    }

    impl RecordingDeliverer {
        fn new() -> Self {
            Self {
                sent: StdMutex::new(Vec::new()),
                notify_tx: None,
                fail: false,
            }
        }

        fn with_channel(tx: mpsc::UnboundedSender<String>, fail: bool) -> Self {
            Self {
                sent: StdMutex::new(Vec::new()),
                notify_tx: Some(tx),
                fail,
            }
        }

        fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Deliverer for RecordingDeliverer {
        async fn deliver(&self, destination: &str, text: &str) -> anyhow::Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((destination.to_string(), text.to_string()));
            if let Some(tx) = &self.notify_tx {
                let _ = tx.send(text.to_string());
            }
            if self.fail {
                anyhow::bail!("scripted delivery failure");
            }
            Ok(())
        }
    }

    /// Clock whose `sleep_until` jumps straight to the requested instant.
    struct InstantClock {
        now: StdMutex<DateTime<Utc>>,
    }

    impl InstantClock {
        fn starting_at(now: DateTime<Utc>) -> Self {
            Self {
                now: StdMutex::new(now),
            }
        }
    }

    #[async_trait]
    impl Clock for InstantClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }

        async fn sleep_until(&self, instant: DateTime<Utc>) {
            {
                let mut now = self.now.lock().unwrap();
                if instant > *now {
                    *now = instant;
                }
            }
            tokio::task::yield_now().await;
        }
    }

    // ── helpers ────────────────────────────────────────────────────────────

    const TZ: Tz = Europe::Kyiv;

    fn noon(y: i32, mo: u32, d: u32) -> DateTime<Utc> {
        TZ.with_ymd_and_hms(y, mo, d, 12, 0, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    async fn seeded_store(dir: &TempDir) -> Arc<NoteStore> {
        let store = Arc::new(NoteStore::open(dir.path().join("notes.jsonl")).unwrap());
        let t0 = noon(2025, 6, 15).timestamp();
        store.append("u1", "c1", "buy milk", t0).await.unwrap();
        store.append("u2", "c1", "call bob", t0 + 60).await.unwrap();
        store
    }

    fn service(
        store: Arc<NoteStore>,
        gateway: Arc<ScriptedGateway>,
        deliverer: Arc<RecordingDeliverer>,
    ) -> Arc<DigestService> {
        Arc::new(DigestService::new(store, gateway, deliverer, TZ))
    }

    // ── pipeline behaviour ─────────────────────────────────────────────────

    #[tokio::test]
    async fn empty_window_skips_gateway_and_sends_no_new_notes() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(NoteStore::open(dir.path().join("notes.jsonl")).unwrap());
        let gateway = Arc::new(ScriptedGateway::ok());
        let deliverer = Arc::new(RecordingDeliverer::new());
        let service = service(store, gateway.clone(), deliverer.clone());

        service.run_scheduled("dest", noon(2025, 6, 15)).await.unwrap();

        assert_eq!(gateway.analyze_calls.load(Ordering::SeqCst), 0);
        let sent = deliverer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "dest");
        assert_eq!(sent[0].1, "no new notes for 2025-06-15");
    }

    #[tokio::test]
    async fn scheduled_run_renders_one_section_per_user() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir).await;
        let gateway = Arc::new(ScriptedGateway::ok());
        let deliverer = Arc::new(RecordingDeliverer::new());
        let service = service(store, gateway.clone(), deliverer.clone());

        service.run_scheduled("dest", noon(2025, 6, 15)).await.unwrap();

        // One analyze call per user group.
        assert_eq!(gateway.analyze_calls.load(Ordering::SeqCst), 2);
        let sent = deliverer.sent();
        assert_eq!(sent.len(), 1);
        let text = &sent[0].1;
        assert!(text.contains("(u1)"), "{text}");
        assert!(text.contains("(u2)"), "{text}");
        assert!(text.contains("event: buy milk"));
        assert!(text.contains("event: call bob"));
    }

    #[tokio::test]
    async fn notes_outside_the_window_are_ignored() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir).await;
        let gateway = Arc::new(ScriptedGateway::ok());
        let deliverer = Arc::new(RecordingDeliverer::new());
        let service = service(store, gateway.clone(), deliverer.clone());

        // The seeded notes live on 2025-06-15; a run for the next day sees none.
        service.run_scheduled("dest", noon(2025, 6, 16)).await.unwrap();

        assert_eq!(gateway.analyze_calls.load(Ordering::SeqCst), 0);
        assert_eq!(deliverer.sent()[0].1, "no new notes for 2025-06-16");
    }

    #[tokio::test]
    async fn analysis_outage_falls_back_to_raw_notes() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir).await;
        let gateway = Arc::new(ScriptedGateway::failing());
        let deliverer = Arc::new(RecordingDeliverer::new());
        let service = service(store, gateway, deliverer.clone());

        service.run_scheduled("dest", noon(2025, 6, 15)).await.unwrap();

        let text = &deliverer.sent()[0].1;
        assert!(text.contains("temporarily unavailable"), "{text}");
        assert!(text.contains("- buy milk"));
        assert!(text.contains("- call bob"));
        assert!(!text.contains("Events:"));
    }

    #[tokio::test]
    async fn on_demand_conversation_digest_labels_multiple_participants() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir).await;
        let gateway = Arc::new(ScriptedGateway::failing());
        let deliverer = Arc::new(RecordingDeliverer::new());
        let service = service(store, gateway, deliverer);

        let text = service
            .digest_conversation("c1", noon(2025, 6, 15))
            .await
            .unwrap();

        assert!(text.contains("(multiple participants)"), "{text}");
        // Chronological order is preserved in the fallback bullets.
        let milk_at = text.find("buy milk").unwrap();
        let bob_at = text.find("call bob").unwrap();
        assert!(milk_at < bob_at);
    }

    #[tokio::test]
    async fn on_demand_digest_of_empty_conversation() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir).await;
        let gateway = Arc::new(ScriptedGateway::ok());
        let deliverer = Arc::new(RecordingDeliverer::new());
        let service = service(store, gateway.clone(), deliverer);

        let text = service
            .digest_conversation("c-empty", noon(2025, 6, 15))
            .await
            .unwrap();

        assert_eq!(text, "no new notes for 2025-06-15");
        assert_eq!(gateway.analyze_calls.load(Ordering::SeqCst), 0);
    }

    // ── scheduler loop ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn scheduler_fires_daily_and_survives_delivery_failures() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(NoteStore::open(dir.path().join("notes.jsonl")).unwrap());
        let gateway = Arc::new(ScriptedGateway::ok());
        let (tx, mut rx) = mpsc::unbounded_channel();
        // Every delivery fails; the loop must keep firing anyway.
        let deliverer = Arc::new(RecordingDeliverer::with_channel(tx, true));
        let service = service(store, gateway, deliverer.clone());

        let clock = Arc::new(InstantClock::starting_at(noon(2025, 6, 15)));
        let scheduler = Arc::new(DigestScheduler::new(
            service,
            clock.clone(),
            20,
            0,
            0,
            "dest",
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.run(shutdown_rx).await })
        };

        let mut fired = Vec::new();
        for _ in 0..3 {
            fired.push(rx.recv().await.expect("scheduler stopped early"));
        }
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(fired.iter().all(|text| text.starts_with("no new notes for")));
        // Three consecutive local days — no day skipped, no duplicates.
        assert!(fired[0].contains("2025-06-15"));
        assert!(fired[1].contains("2025-06-16"));
        assert!(fired[2].contains("2025-06-17"));
    }

    #[tokio::test]
    async fn scheduler_stops_on_shutdown_before_firing() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(NoteStore::open(dir.path().join("notes.jsonl")).unwrap());
        let gateway = Arc::new(ScriptedGateway::ok());
        let deliverer = Arc::new(RecordingDeliverer::new());
        let service = service(store, gateway, deliverer.clone());

        let clock = Arc::new(InstantClock::starting_at(noon(2025, 6, 15)));
        let scheduler = DigestScheduler::new(service, clock, 20, 0, 0, "dest");

        let (shutdown_tx, shutdown_rx) = watch::channel(true);
        scheduler.run(shutdown_rx).await;
        drop(shutdown_tx);

        assert!(deliverer.sent().is_empty());
    }
}
