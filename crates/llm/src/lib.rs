//! Analysis and transcription capability.
//!
//! The core talks to the external text-understanding service only through
//! the [`AnalysisGateway`] trait; [`OpenAiGateway`] is the production
//! implementation (chat completions for structuring, Whisper for voice).
//! Both calls are bounded by a client timeout so a hung upstream can never
//! stall a digest cycle.

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use daybook_digest::AnalysisResult;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Transport, timeout, or parse failure on the analysis call.  Always
    /// recoverable locally via the raw-fallback render path.
    #[error("analysis unavailable: {0}")]
    AnalysisUnavailable(String),
    /// Transport, timeout, or decode failure on the transcription call.
    #[error("transcription unavailable: {0}")]
    TranscriptionUnavailable(String),
}

/// Capability interface to the external text-understanding service.
#[async_trait]
pub trait AnalysisGateway: Send + Sync {
    /// Turn free-form concatenated notes into the five-list structure.
    async fn analyze(&self, text: &str) -> Result<AnalysisResult, GatewayError>;

    /// Speech-to-text for a captured voice note.  No internal retries;
    /// retries, if any, belong to the transport collaborator.
    async fn transcribe(
        &self,
        audio: Vec<u8>,
        filename: &str,
        language: &str,
    ) -> Result<String, GatewayError>;
}

const ANALYZE_PROMPT: &str = "You are an assistant that turns short conversational notes \
into structure.\nReturn JSON of the form:\n{\n \"events\": [ \"...\" ],\n \"tasks\": \
[ {\"title\":\"\", \"due\": null, \"owner\":\"\", \"priority\":\"low|med|high\"} ],\n \
\"risks\": [ \"...\" ],\n \"ideas\": [ \"...\" ],\n \"quotes\": [ \"...\" ]\n}\nWhen a \
list has nothing, use an empty list. Dates in ISO (YYYY-MM-DD), 24-hour times, timezone \
{timezone}. Rephrase concisely. Extract deadlines from context (\"tomorrow\", \"by \
Monday\") and normalize them.";

/// OpenAI-backed gateway.
#[derive(Debug, Clone)]
pub struct OpenAiGateway {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    timezone: String,
}

impl OpenAiGateway {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        timezone: impl Into<String>,
        timeout_secs: u64,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: model.into(),
            timezone: timezone.into(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl AnalysisGateway for OpenAiGateway {
    async fn analyze(&self, text: &str) -> Result<AnalysisResult, GatewayError> {
        let prompt = ANALYZE_PROMPT.replace("{timezone}", &self.timezone);
        let payload = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": "You are a helpful note analyst."},
                {"role": "user", "content": format!("{prompt}\n\nNote text:\n{text}")}
            ],
            "temperature": 0.2
        });

        let response = self
            .client
            .post(self.endpoint("chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| GatewayError::AnalysisUnavailable(err.to_string()))?;

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|err| GatewayError::AnalysisUnavailable(err.to_string()))?;

        let content = body
            .get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .ok_or_else(|| {
                GatewayError::AnalysisUnavailable("response missing message content".to_string())
            })?;

        debug!(content_len = content.len(), "analysis reply received");
        parse_analysis(content)
    }

    async fn transcribe(
        &self,
        audio: Vec<u8>,
        filename: &str,
        language: &str,
    ) -> Result<String, GatewayError> {
        let part = reqwest::multipart::Part::bytes(audio)
            .file_name(filename.to_string())
            .mime_str("audio/ogg")
            .map_err(|err| GatewayError::TranscriptionUnavailable(err.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", "whisper-1")
            .text("language", language.to_string());

        let response = self
            .client
            .post(self.endpoint("audio/transcriptions"))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| GatewayError::TranscriptionUnavailable(err.to_string()))?;

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|err| GatewayError::TranscriptionUnavailable(err.to_string()))?;

        body.get("text")
            .and_then(|text| text.as_str())
            .map(ToString::to_string)
            .ok_or_else(|| {
                GatewayError::TranscriptionUnavailable("response missing text field".to_string())
            })
    }
}

/// Two-stage parse of an analysis reply: strict JSON first, then a single
/// bounded recovery attempt on the first balanced top-level object.  Never
/// guesses beyond that one fallback.
pub fn parse_analysis(content: &str) -> Result<AnalysisResult, GatewayError> {
    if let Ok(result) = serde_json::from_str::<AnalysisResult>(content.trim()) {
        return Ok(result);
    }

    let candidate = extract_first_object(content).ok_or_else(|| {
        GatewayError::AnalysisUnavailable("reply contains no JSON object".to_string())
    })?;
    serde_json::from_str::<AnalysisResult>(candidate)
        .map_err(|err| GatewayError::AnalysisUnavailable(format!("recovered object invalid: {err}")))
}

/// First balanced top-level `{...}` substring, if any.
///
/// The scan is string- and escape-aware so braces inside JSON strings do
/// not unbalance it.  Unlike a naive first-`{`/last-`}` slice, a reply
/// containing two objects yields the first one.
pub fn extract_first_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }

    None
}
