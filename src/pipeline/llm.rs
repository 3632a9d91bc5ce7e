//! Vision model client.
//!
//! The pipeline talks to the model through [`VisionModel`], a one-method
//! trait: send a prompt plus an optional image, get text back. The production
//! implementation, [`LlmVisionModel`], wraps an `edgequake_llm` provider and
//! owns the retry policy; tests plug in scripted fakes.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors are frequent under concurrent load. Each failed call
//! is retried after `retry_backoff_ms * 2^(attempt-1)`: with a 500 ms base and
//! 3 retries the waits are 500 ms, 1 s, 2 s.

use crate::config::ConversionConfig;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use futures::future::BoxFuture;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// One model invocation.
#[derive(Debug, Clone)]
pub struct VisionRequest {
    pub prompt: String,
    /// Page image. `None` for text-only requests such as the heading outline.
    pub image: Option<ImageData>,
}

impl VisionRequest {
    pub fn with_image(prompt: impl Into<String>, image: ImageData) -> Self {
        Self {
            prompt: prompt.into(),
            image: Some(image),
        }
    }

    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            image: None,
        }
    }
}

/// Text returned by the model plus accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisionReply {
    pub content: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
    /// Retries spent before this reply arrived.
    pub retries: u32,
}

impl VisionReply {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }
}

/// A model call that failed for good.
#[derive(Debug, Clone, Error)]
#[error("{detail}")]
pub struct ModelError {
    pub retries: u32,
    pub detail: String,
}

impl ModelError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            retries: 0,
            detail: detail.into(),
        }
    }
}

/// Anything that can turn a prompt (and optionally an image) into text.
///
/// Implementations must be shareable across the concurrent page calls.
pub trait VisionModel: Send + Sync {
    fn invoke(&self, request: VisionRequest) -> BoxFuture<'_, Result<VisionReply, ModelError>>;
}

impl<M: VisionModel + ?Sized> VisionModel for Arc<M> {
    fn invoke(&self, request: VisionRequest) -> BoxFuture<'_, Result<VisionReply, ModelError>> {
        (**self).invoke(request)
    }
}

/// [`VisionModel`] backed by an `edgequake_llm` provider.
pub struct LlmVisionModel {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl LlmVisionModel {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ConversionConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
        }
    }

    async fn call(&self, request: VisionRequest) -> Result<VisionReply, ModelError> {
        let messages = build_messages(request);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!("Retry {}/{} after {}ms", attempt, self.max_retries, backoff);
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.provider.chat(&messages, Some(&self.options)).await {
                Ok(response) => {
                    debug!(
                        "{} input tokens, {} output tokens",
                        response.prompt_tokens, response.completion_tokens
                    );
                    return Ok(VisionReply {
                        content: response.content,
                        input_tokens: response.prompt_tokens,
                        output_tokens: response.completion_tokens,
                        retries: attempt,
                    });
                }
                Err(e) => {
                    warn!("Attempt {} failed: {}", attempt + 1, e);
                    last_err = Some(e.to_string());
                }
            }
        }

        Err(ModelError {
            retries: self.max_retries,
            detail: last_err.unwrap_or_else(|| "Unknown error".to_string()),
        })
    }
}

impl VisionModel for LlmVisionModel {
    fn invoke(&self, request: VisionRequest) -> BoxFuture<'_, Result<VisionReply, ModelError>> {
        Box::pin(self.call(request))
    }
}

/// Image requests carry the prompt as the system turn and the page as an
/// image-only user turn; text requests are a single user turn.
fn build_messages(request: VisionRequest) -> Vec<ChatMessage> {
    match request.image {
        Some(image) => vec![
            ChatMessage::system(&request.prompt),
            ChatMessage::user_with_images("", vec![image]),
        ],
        None => vec![ChatMessage::user(&request.prompt)],
    }
}

fn build_options(config: &ConversionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}
