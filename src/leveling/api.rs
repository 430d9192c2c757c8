//! Chat-model API transport with exponential backoff retry logic.
//!
//! The leveling engine talks to an OpenAI-compatible chat-completions
//! endpoint. This module provides the transport layer:
//! - [`ChatAsync`]: core trait for one prompt/response exchange
//! - [`ChatClient`]: the HTTP client implementation
//! - [`RetryChat`]: decorator adding retry with exponential backoff and
//!   jitter to any [`ChatAsync`] implementation
//!
//! # Retry Strategy
//!
//! - Maximum 5 retry attempts
//! - Exponential backoff starting at 1 second
//! - Maximum delay capped at 30 seconds
//! - Random jitter (0-250ms) added to prevent thundering herd

use std::fmt;
use std::time::{Duration, Instant};

use rand::{Rng, rng};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{error, instrument, warn};

use crate::config::LevelingConfig;
use crate::error::{PipelineError, Result};

/// Trait for one chat exchange with the generation model.
pub trait ChatAsync {
    /// Send a system prompt and user payload, receive the model's reply.
    async fn ask(&self, system: &str, user: &str) -> Result<String>;
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    content: String,
}

/// HTTP client for an OpenAI-compatible chat-completions API.
pub struct ChatClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl ChatClient {
    /// Build a client from configuration.
    ///
    /// Rejects up front when no API key is configured: a leveling trigger
    /// without credentials must fail before any work begins.
    pub fn new(config: &LevelingConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                PipelineError::Unauthorized("leveling API key is not configured".to_string())
            })?;
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }
}

impl fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl ChatAsync for ChatClient {
    #[instrument(level = "info", skip_all)]
    async fn ask(&self, system: &str, user: &str) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user.to_string(),
                },
            ],
            temperature: 0.4,
        };

        let t0 = Instant::now();
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json::<ChatResponse>()
            .await?;
        let dt = t0.elapsed();

        let content = response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| {
                PipelineError::Generation("model returned an empty choice list".to_string())
            })?;
        tracing::debug!(elapsed_ms = dt.as_millis() as u64, "Chat call succeeded");
        Ok(content)
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`ChatAsync`]
/// implementation.
///
/// The delay between retries follows:
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryChat<T> {
    inner: T,
    max_retries: usize,
    base_delay: Duration,
    max_delay: Duration,
}

impl<T> RetryChat<T>
where
    T: ChatAsync,
{
    pub fn new(inner: T, max_retries: usize, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl<T> fmt::Debug for RetryChat<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryChat")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> ChatAsync for RetryChat<T>
where
    T: ChatAsync,
{
    #[instrument(level = "info", skip_all)]
    async fn ask(&self, system: &str, user: &str) -> Result<String> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.ask(system, user).await {
                Ok(response) => return Ok(response),
                // Missing credentials will not fix themselves on retry.
                Err(e @ PipelineError::Unauthorized(_)) => return Err(e),
                Err(e) => {
                    attempt += 1;
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                            elapsed_ms_total = total_dt.as_millis() as u64,
                            error = %e,
                            "ask() exhausted retries"
                        );
                        return Err(e);
                    }

                    let mut delay = self.base_delay.saturating_mul(1 << (attempt - 1));
                    if delay > self.max_delay {
                        delay = self.max_delay;
                    }
                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = delay + Duration::from_millis(jitter_ms);

                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                        elapsed_ms_total = total_dt.as_millis() as u64,
                        ?delay,
                        error = %e,
                        "ask() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FlakyChat {
        failures_before_success: Mutex<usize>,
    }

    impl ChatAsync for FlakyChat {
        async fn ask(&self, _system: &str, _user: &str) -> Result<String> {
            let mut remaining = self.failures_before_success.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(PipelineError::Generation("transient".to_string()));
            }
            Ok("ok".to_string())
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failures() {
        let chat = RetryChat::new(
            FlakyChat {
                failures_before_success: Mutex::new(2),
            },
            5,
            Duration::from_millis(10),
        );
        let response = chat.ask("system", "user").await.unwrap();
        assert_eq!(response, "ok");
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_attempts() {
        let chat = RetryChat::new(
            FlakyChat {
                failures_before_success: Mutex::new(100),
            },
            2,
            Duration::from_millis(1),
        );
        let result = chat.ask("system", "user").await;
        assert!(matches!(result, Err(PipelineError::Generation(_))));
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        struct DeniedChat;
        impl ChatAsync for DeniedChat {
            async fn ask(&self, _system: &str, _user: &str) -> Result<String> {
                Err(PipelineError::Unauthorized("no key".to_string()))
            }
        }
        let chat = RetryChat::new(DeniedChat, 5, Duration::from_secs(10));
        // Would hang for ~50s if the decorator retried this.
        let result = chat.ask("system", "user").await;
        assert!(matches!(result, Err(PipelineError::Unauthorized(_))));
    }

    #[test]
    fn test_client_requires_api_key() {
        let config = LevelingConfig::default();
        let result = ChatClient::new(&config);
        assert!(matches!(result, Err(PipelineError::Unauthorized(_))));

        let config = LevelingConfig {
            api_key: Some("sk-test".to_string()),
            ..LevelingConfig::default()
        };
        assert!(ChatClient::new(&config).is_ok());
    }
}
