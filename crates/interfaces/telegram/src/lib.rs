//! Telegram delivery collaborator.
//!
//! Only outbound delivery lives here: the digest pipeline hands a rendered
//! text to [`TelegramDeliverer`], which chunks it under Telegram's message
//! limit and posts `sendMessage` calls.  Webhooks, update polling, and
//! buttons are out of scope.

use anyhow::{Result, bail};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use daybook_runtime::Deliverer;

/// Telegram caps messages at 4096 chars; leave headroom for markup quirks.
const MAX_CHUNK_CHARS: usize = 3500;

pub struct TelegramDeliverer {
    client: Client,
    base_url: String,
}

impl TelegramDeliverer {
    pub fn new(token: &str) -> Result<Self> {
        if token.trim().is_empty() {
            bail!("telegram bot token is empty");
        }
        Ok(Self {
            client: Client::new(),
            base_url: format!("https://api.telegram.org/bot{token}"),
        })
    }
}

#[async_trait]
impl Deliverer for TelegramDeliverer {
    async fn deliver(&self, destination: &str, text: &str) -> Result<()> {
        for chunk in chunk_message(text, MAX_CHUNK_CHARS) {
            send_message(&self.client, &self.base_url, destination, &chunk).await?;
            debug!(destination, chunk_len = chunk.len(), "digest chunk delivered");
        }
        Ok(())
    }
}

async fn send_message(client: &Client, base_url: &str, chat_id: &str, text: &str) -> Result<()> {
    let url = format!("{base_url}/sendMessage");
    let body = SendMessageRequest {
        chat_id,
        text,
        disable_web_page_preview: true,
    };

    let response = client
        .post(url)
        .json(&body)
        .send()
        .await?
        .error_for_status()?;

    let payload: TelegramResponse<serde_json::Value> = response.json().await?;
    if !payload.ok {
        let description = payload
            .description
            .unwrap_or_else(|| "telegram sendMessage failed".to_string());
        bail!(description);
    }

    Ok(())
}

/// Split a long digest on line boundaries so no chunk exceeds `max_chars`.
fn chunk_message(text: &str, max_chars: usize) -> Vec<String> {
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.lines() {
        let line_len = line.chars().count() + 1;
        if current_len > 0 && current_len + line_len > max_chars {
            chunks.push(current.trim_end().to_string());
            current.clear();
            current_len = 0;
        }
        current.push_str(line);
        current.push('\n');
        current_len += line_len;
    }

    if !current.trim().is_empty() {
        chunks.push(current.trim_end().to_string());
    }

    if chunks.is_empty() {
        chunks.push(text.to_string());
    }
    chunks
}

#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    #[allow(dead_code)]
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    disable_web_page_preview: bool,
}
