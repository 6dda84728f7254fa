//! Vision-LLM inference endpoint.
//!
//! [`LlmInferenceEndpoint`] is the production [`InferenceEndpoint`]: it
//! fetches the stored document, rasterises its first page with the shared
//! rasteriser and sends that image plus the analysis instructions to an
//! `edgequake-llm` provider.
//!
//! ## Message layout
//!
//! 1. **System message**: the analysis rules (or a user-supplied override)
//! 2. **User message**: the instructions as text, the page PNG attached
//!
//! The call is bounded by `api_timeout_secs`; there is no retry loop. A run
//! that fails analysis keeps its persisted record, and
//! [`crate::orchestrator::Orchestrator::retry_analysis`] re-runs this step
//! on request.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::pipeline::analysis::{InferenceEndpoint, InferenceResponse};
use crate::pipeline::encode::to_image_data;
use crate::pipeline::render::PageRasterizer;
use crate::prompts::DEFAULT_SYSTEM_PROMPT;
use crate::record::ArtifactHandle;
use crate::store::ArtifactStore;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Model used when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// [`InferenceEndpoint`] backed by a vision-capable LLM provider.
pub struct LlmInferenceEndpoint {
    provider: Arc<dyn LLMProvider>,
    artifacts: ArtifactStore,
    rasterizer: PageRasterizer,
    system_prompt: String,
    options: CompletionOptions,
    timeout: Duration,
}

impl LlmInferenceEndpoint {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        artifacts: ArtifactStore,
        rasterizer: PageRasterizer,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            provider,
            artifacts,
            rasterizer,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            options: build_options(config),
            timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }

    /// Resolve the provider from `config` and build the endpoint.
    pub fn from_config(
        config: &PipelineConfig,
        artifacts: ArtifactStore,
        rasterizer: PageRasterizer,
    ) -> Result<Self, PipelineError> {
        let provider = resolve_provider(config)?;
        info!(
            "LLM provider resolved (model: {})",
            config.model.as_deref().unwrap_or("provider default")
        );
        Ok(Self::new(provider, artifacts, rasterizer, config))
    }
}

#[async_trait]
impl InferenceEndpoint for LlmInferenceEndpoint {
    async fn infer(
        &self,
        document: &ArtifactHandle,
        instructions: &str,
    ) -> Result<Option<InferenceResponse>, PipelineError> {
        let bytes = self.artifacts.fetch(document).await?;
        let page = self
            .rasterizer
            .rasterize_first_page(&bytes, document.as_str())
            .await?;

        let messages = vec![
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user_with_images(instructions, vec![to_image_data(&page.image)]),
        ];

        let start = Instant::now();
        let response = tokio::time::timeout(self.timeout, self.provider.chat(&messages, Some(&self.options)))
            .await
            .map_err(|_| PipelineError::InferenceFailed {
                detail: format!("no reply within {}s", self.timeout.as_secs()),
            })?
            .map_err(|e| {
                warn!("Analysis call failed: {}", e);
                PipelineError::InferenceFailed {
                    detail: e.to_string(),
                }
            })?;

        debug!(
            "Analysis: {} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );
        Ok(reply_to_response(response.content))
    }
}

/// Wrap the provider's reply text; a blank reply counts as no response.
fn reply_to_response(content: String) -> Option<InferenceResponse> {
    if content.trim().is_empty() {
        None
    } else {
        Some(InferenceResponse::text(content))
    }
}

/// Build `CompletionOptions` from the pipeline config.
fn build_options(config: &PipelineConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, PipelineError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        PipelineError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Non-empty value of environment variable `name`.
fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Pick the LLM provider for analysis.
///
/// Precedence: `config.provider`, then `config.provider_name` (with
/// `config.model` or [`DEFAULT_MODEL`]), then the `EDGEQUAKE_LLM_PROVIDER` /
/// `EDGEQUAKE_MODEL` pair, then OpenAI whenever `OPENAI_API_KEY` is present,
/// and finally whatever [`ProviderFactory::from_env`] detects.
pub fn resolve_provider(config: &PipelineConfig) -> Result<Arc<dyn LLMProvider>, PipelineError> {
    let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);

    if let Some(provider) = &config.provider {
        return Ok(Arc::clone(provider));
    }
    if let Some(name) = &config.provider_name {
        return create_vision_provider(name, model);
    }
    if let (Some(name), Some(env_model)) =
        (env_value("EDGEQUAKE_LLM_PROVIDER"), env_value("EDGEQUAKE_MODEL"))
    {
        return create_vision_provider(&name, &env_model);
    }
    if env_value("OPENAI_API_KEY").is_some() {
        return create_vision_provider("openai", model);
    }

    ProviderFactory::from_env()
        .map(|(llm, _embedding)| llm)
        .map_err(|e| PipelineError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!("set OPENAI_API_KEY, ANTHROPIC_API_KEY or GEMINI_API_KEY ({e})"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_options_defaults() {
        let opts = build_options(&PipelineConfig::default());
        assert_eq!(opts.temperature, Some(0.1));
        assert_eq!(opts.max_tokens, Some(4096));
    }

    #[test]
    fn build_options_follow_config() {
        let config = PipelineConfig::builder()
            .temperature(0.0)
            .max_tokens(1024)
            .build()
            .unwrap();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.0));
        assert_eq!(opts.max_tokens, Some(1024));
    }

    #[test]
    fn blank_reply_is_no_response() {
        assert!(reply_to_response("  \n".to_string()).is_none());
        let reply = reply_to_response("{\"overallScore\":1}".to_string()).unwrap();
        assert_eq!(reply.message.content.first_text(), Some("{\"overallScore\":1}"));
    }
}
