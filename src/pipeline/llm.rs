//! LLM interaction: turn extracted text into loosely-typed record objects.
//!
//! The interpreter is the one opaque boundary in the pipeline. The core only
//! relies on [`RecordInterpreter`]; [`LlmInterpreter`] is the production
//! implementation backed by an `edgequake-llm` provider, and tests substitute
//! deterministic stubs. All prompt engineering lives in [`crate::prompts`].
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from LLM APIs are transient. Exponential backoff
//! (`retry_backoff_ms * 2^(attempt-1)`) with 500 ms base and 3 retries waits
//! 500 ms → 1 s → 2 s. Each attempt is bounded by `api_timeout_secs`; a
//! timeout counts as a failed attempt. The same policy drives the vision OCR
//! engine in [`super::ocr`].

use crate::config::IngestConfig;
use crate::pipeline::postprocess::json_payload;
use crate::prompts::{extraction_user_prompt, EXTRACTION_SYSTEM_PROMPT};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// One JSON object as returned by the interpreter, before schema validation.
pub type RawRecord = Map<String, Value>;

/// Turns extracted text into zero or more raw record objects.
///
/// Errors are human-readable detail strings; the aggregator wraps them in
/// [`crate::error::FileError::InterpretationFailed`].
#[async_trait]
pub trait RecordInterpreter: Send + Sync {
    async fn interpret(&self, text: &str, source_file: &str) -> Result<Vec<RawRecord>, String>;
}

// ── Call policy ──────────────────────────────────────────────────────────────

/// Sampling, retry and timeout settings shared by every LLM call.
#[derive(Debug, Clone)]
pub struct CallPolicy {
    pub temperature: f32,
    pub max_tokens: usize,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub timeout: Duration,
}

impl CallPolicy {
    pub fn from_config(config: &IngestConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }

    pub fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

/// Run `call` until it succeeds, retrying with exponential backoff.
///
/// Returns the last error once `max_retries` retries are exhausted.
pub async fn with_retry<T, F, Fut>(policy: &CallPolicy, label: &str, mut call: F) -> Result<T, String>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, String>>,
{
    let mut last_err: Option<String> = None;

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            let backoff = policy.retry_backoff_ms * 2u64.pow(attempt - 1);
            warn!(
                "{}: retry {}/{} after {}ms",
                label, attempt, policy.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match timeout(policy.timeout, call()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => {
                warn!("{}: attempt {} failed: {}", label, attempt + 1, e);
                last_err = Some(e);
            }
            Err(_) => {
                let e = format!("timed out after {}s", policy.timeout.as_secs());
                warn!("{}: attempt {} {}", label, attempt + 1, e);
                last_err = Some(e);
            }
        }
    }

    Err(format!(
        "{} (gave up after {} retries)",
        last_err.unwrap_or_else(|| "Unknown error".to_string()),
        policy.max_retries
    ))
}

/// Send `messages` to the provider under `policy` and return the reply text.
pub async fn chat_with_retry(
    provider: &Arc<dyn LLMProvider>,
    messages: &[ChatMessage],
    policy: &CallPolicy,
    label: &str,
) -> Result<String, String> {
    let options = &policy.options();
    let start = Instant::now();

    let response = with_retry(policy, label, move || async move {
        provider
            .chat(messages, Some(options))
            .await
            .map_err(|e| e.to_string())
    })
    .await?;

    debug!(
        "{}: {} input tokens, {} output tokens, {:?}",
        label,
        response.prompt_tokens,
        response.completion_tokens,
        start.elapsed()
    );
    Ok(response.content)
}

// ── Production interpreter ───────────────────────────────────────────────────

/// Interpreter that asks an LLM for JSON records.
pub struct LlmInterpreter {
    provider: Arc<dyn LLMProvider>,
    policy: CallPolicy,
    system_prompt: String,
}

impl LlmInterpreter {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &IngestConfig) -> Self {
        Self {
            provider,
            policy: CallPolicy::from_config(config),
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| EXTRACTION_SYSTEM_PROMPT.to_string()),
        }
    }
}

#[async_trait]
impl RecordInterpreter for LlmInterpreter {
    async fn interpret(&self, text: &str, source_file: &str) -> Result<Vec<RawRecord>, String> {
        let messages = vec![
            ChatMessage::system(&self.system_prompt),
            ChatMessage::user(extraction_user_prompt(text)),
        ];
        let reply = chat_with_retry(&self.provider, &messages, &self.policy, source_file).await?;
        parse_records(&reply)
    }
}

// ── Response parsing ─────────────────────────────────────────────────────────

/// Parse an interpreter reply into raw record objects.
///
/// Accepts a single object, an array of objects, or an object with a
/// `records` array. Non-object array entries are skipped.
pub fn parse_records(reply: &str) -> Result<Vec<RawRecord>, String> {
    let payload = json_payload(reply);
    let value: Value = serde_json::from_str(&payload).map_err(|e| {
        let preview: String = payload.chars().take(120).collect();
        format!("reply is not valid JSON ({}): {}", e, preview)
    })?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("records") {
            Some(Value::Array(items)) => items,
            Some(other) => {
                map.insert("records".to_string(), other);
                vec![Value::Object(map)]
            }
            None => vec![Value::Object(map)],
        },
        other => {
            return Err(format!(
                "reply is JSON but not an object or array: {}",
                other
            ))
        }
    };

    let mut records = Vec::with_capacity(items.len());
    for (idx, item) in items.into_iter().enumerate() {
        match item {
            Value::Object(map) => records.push(map),
            other => debug!("Ignoring non-object entry #{}: {}", idx, other),
        }
    }
    Ok(records)
}
