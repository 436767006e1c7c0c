//! Model interaction: build one multimodal request and call the provider.
//!
//! Prompt wording lives in [`crate::prompts`]; this module only assembles
//! messages, applies the per-call timeout and maps provider failures onto
//! [`Pdf2BeamerError`]. Each call is attempted exactly once. The stages that
//! call it decide what a failure means (fallback or abort).

use crate::config::ConversionConfig;
use crate::error::Pdf2BeamerError;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Text and usage of one model reply.
#[derive(Debug, Clone, Default)]
pub struct ModelReply {
    pub content: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub duration_ms: u64,
}

/// A provider bound to the completion options of one conversion.
#[derive(Clone)]
pub struct ModelClient {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
    timeout: Duration,
}

impl ModelClient {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ConversionConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
            timeout: Duration::from_secs(config.api_timeout_secs.max(1)),
        }
    }

    /// Send `system` + one user turn carrying `prompt` and `images`.
    ///
    /// `step` names the pipeline step in logs and errors.
    pub async fn complete(
        &self,
        step: &str,
        system: &str,
        prompt: &str,
        images: Vec<ImageData>,
    ) -> Result<ModelReply, Pdf2BeamerError> {
        let start = Instant::now();
        let image_count = images.len();
        let messages = vec![
            ChatMessage::system(system),
            ChatMessage::user_with_images(prompt, images),
        ];

        let call = self.provider.chat(&messages, Some(&self.options));
        let response = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(r)) => r,
            Ok(Err(e)) => {
                warn!("{}: model call failed: {}", step, e);
                return Err(Pdf2BeamerError::LlmApiError {
                    step: step.to_string(),
                    message: e.to_string(),
                });
            }
            Err(_) => {
                warn!("{}: model call timed out after {:?}", step, self.timeout);
                return Err(Pdf2BeamerError::ApiTimeout {
                    step: step.to_string(),
                    secs: self.timeout.as_secs(),
                });
            }
        };

        let duration = start.elapsed();
        debug!(
            "{}: {} images, {} input tokens, {} output tokens, {:?}",
            step, image_count, response.prompt_tokens, response.completion_tokens, duration
        );

        if response.content.trim().is_empty() {
            return Err(Pdf2BeamerError::LlmApiError {
                step: step.to_string(),
                message: "model returned an empty reply".to_string(),
            });
        }

        Ok(ModelReply {
            content: response.content,
            input_tokens: response.prompt_tokens as u64,
            output_tokens: response.completion_tokens as u64,
            duration_ms: duration.as_millis() as u64,
        })
    }
}

fn build_options(config: &ConversionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_options_defaults() {
        let config = ConversionConfig::default();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.1));
        assert_eq!(opts.max_tokens, Some(8192));
    }

    #[test]
    fn build_options_follow_builder() {
        let config = ConversionConfig::builder()
            .temperature(0.4)
            .max_tokens(2048)
            .build()
            .unwrap();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.4));
        assert_eq!(opts.max_tokens, Some(2048));
    }
}
