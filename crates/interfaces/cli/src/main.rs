use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::Utc;
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use daybook_config::AppConfig;
use daybook_digest::local_timestamp_label;
use daybook_llm::OpenAiGateway;
use daybook_runtime::{Deliverer, DigestScheduler, DigestService, Ingestor, SystemClock};
use daybook_store::NoteStore;
use daybook_telegram::TelegramDeliverer;

#[derive(Debug, Parser)]
#[command(
    name = "daybook",
    version,
    about = "Voice/text note capture with a scheduled daily digest"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config/daybook.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the daily digest scheduler until ctrl-c.
    Start,
    /// Build a digest right now and print or deliver it.
    Digest {
        /// Digest a single conversation instead of the scheduled
        /// cross-chat run.
        #[arg(long)]
        conversation: Option<String>,
    },
    /// Ingest a text note.
    Note {
        user: String,
        conversation: String,
        /// Note text (remaining arguments are joined with spaces).
        #[arg(trailing_var_arg = true, required = true)]
        text: Vec<String>,
    },
    /// Transcribe a voice note file and ingest it.
    Voice {
        user: String,
        conversation: String,
        /// Path to the audio file (.oga/.ogg).
        path: String,
    },
    /// Show the most recently ingested notes.
    Recent {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

/// Fallback deliverer when Telegram is not configured.
struct StdoutDeliverer;

#[async_trait]
impl Deliverer for StdoutDeliverer {
    async fn deliver(&self, destination: &str, text: &str) -> Result<()> {
        println!("--- digest for {destination} ---");
        println!("{text}");
        Ok(())
    }
}

fn parse_timezone(name: &str) -> Tz {
    name.parse().unwrap_or_else(|_| {
        warn!(timezone = name, "unrecognised timezone; falling back to UTC");
        chrono_tz::UTC
    })
}

fn build_deliverer(config: &AppConfig) -> Result<Arc<dyn Deliverer>> {
    if config.telegram_delivery() {
        Ok(Arc::new(TelegramDeliverer::new(&config.telegram.bot_token)?))
    } else {
        Ok(Arc::new(StdoutDeliverer))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config)?;
    let tz = parse_timezone(&config.schedule.timezone);

    let store = Arc::new(NoteStore::open(&config.store.path)?);
    let gateway = Arc::new(OpenAiGateway::new(
        config.llm.api_key.clone(),
        config.llm.base_url.clone(),
        config.llm.model.clone(),
        config.schedule.timezone.clone(),
        config.llm.timeout_secs,
    )?);

    match cli.command {
        Commands::Start => {
            if !config.schedule.enabled {
                info!("scheduler is disabled in config; nothing to do");
                return Ok(());
            }
            if config.schedule.destination.trim().is_empty() {
                bail!("schedule.destination must be set to run the scheduler");
            }

            let deliverer = build_deliverer(&config)?;
            let service = Arc::new(DigestService::new(store, gateway, deliverer, tz));
            let scheduler = DigestScheduler::new(
                service,
                Arc::new(SystemClock),
                config.schedule.hour,
                config.schedule.minute,
                config.schedule.second,
                config.schedule.destination.clone(),
            );

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let loop_handle = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

            tokio::signal::ctrl_c().await?;
            info!("shutdown requested");
            let _ = shutdown_tx.send(true);
            loop_handle.await?;
        }
        Commands::Digest { conversation } => {
            let deliverer = build_deliverer(&config)?;
            let service = Arc::new(DigestService::new(store, gateway, deliverer, tz));
            let now = Utc::now();
            match conversation {
                Some(conversation_id) => {
                    let text = service.digest_conversation(&conversation_id, now).await?;
                    service.notify(&conversation_id, &text).await;
                }
                None => {
                    if config.schedule.destination.trim().is_empty() {
                        bail!("schedule.destination must be set for a cross-chat digest");
                    }
                    service
                        .run_scheduled(&config.schedule.destination, now)
                        .await?;
                }
            }
        }
        Commands::Note {
            user,
            conversation,
            text,
        } => {
            let ingestor = Ingestor::new(store, gateway, config.llm.language.clone());
            let note = ingestor
                .ingest_text(&user, &conversation, &text.join(" "))
                .await?;
            println!("stored note {}", note.id);
        }
        Commands::Voice {
            user,
            conversation,
            path,
        } => {
            let audio = tokio::fs::read(&path).await?;
            let filename = std::path::Path::new(&path)
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_else(|| "voice.ogg".to_string());
            let ingestor = Ingestor::new(store, gateway, config.llm.language.clone());
            let note = ingestor
                .ingest_voice(&user, &conversation, audio, &filename)
                .await?;
            println!("stored note {}: {}", note.id, note.text);
        }
        Commands::Recent { limit } => {
            let notes = store.recent_n(limit).await?;
            if notes.is_empty() {
                println!("no notes stored yet");
            }
            for note in notes {
                println!(
                    "{:>6}  {}  {}@{}  {}",
                    note.id,
                    local_timestamp_label(note.created_at_epoch, tz),
                    note.user_id,
                    note.conversation_id,
                    note.text
                );
            }
        }
    }

    Ok(())
}
