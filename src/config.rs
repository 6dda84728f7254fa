//! Configuration for the résumé pipeline.
//!
//! Every knob lives in [`PipelineConfig`], built via
//! [`PipelineConfigBuilder`]. Callers set only what they care about and rely
//! on documented defaults for the rest.

use crate::error::PipelineError;
use crate::pipeline::render::DEFAULT_RENDER_SCALE;
use crate::progress::ProgressCallback;
use crate::store::DEFAULT_RECORD_PREFIX;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

/// Accepted range for [`PipelineConfig::render_scale`].
pub const RENDER_SCALE_RANGE: std::ops::RangeInclusive<f32> = 1.0..=8.0;

/// Configuration for a pipeline.
///
/// Built via [`PipelineConfig::builder()`] or [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use resume_pipeline::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .render_scale(3.0)
///     .model("gpt-4.1-mini")
///     .build()
///     .unwrap();
/// assert_eq!(config.record_prefix, "resume:");
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Raster upscaling factor relative to the page's point size. Range:
    /// 1.0–8.0. Default: 4.0.
    ///
    /// At 4× a US-Letter page renders to 2448 × 3168 px, enough for a vision
    /// model to read 8 pt body text after provider-side downsampling.
    pub render_scale: f32,

    /// Key prefix for job records. Default: `"resume:"`.
    pub record_prefix: String,

    /// LLM model identifier, e.g. "gpt-4.1-mini". If None, uses the provider
    /// default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, the environment decides.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1.
    ///
    /// Scores should not swing between two runs over the same résumé.
    pub temperature: f32,

    /// Maximum tokens the LLM may generate. Default: 4096.
    ///
    /// A full feedback object with 3–4 explained tips per category runs to
    /// roughly 1 500 tokens; truncation would leave unparseable JSON.
    pub max_tokens: usize,

    /// Custom system prompt. If None, uses the built-in default.
    pub system_prompt: Option<String>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Timeout for one LLM analysis call in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Observer notified on every stage transition. Default: None.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            render_scale: DEFAULT_RENDER_SCALE,
            record_prefix: DEFAULT_RECORD_PREFIX.to_string(),
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 4096,
            system_prompt: None,
            download_timeout_secs: 120,
            api_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("render_scale", &self.render_scale)
            .field("record_prefix", &self.record_prefix)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn PipelineObserver>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Stored as given; out-of-range values are rejected by [`build`](Self::build).
    pub fn render_scale(mut self, scale: f32) -> Self {
        self.config.render_scale = scale;
        self
    }

    pub fn record_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.record_prefix = prefix.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.config.progress_callback = Some(callback);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if !RENDER_SCALE_RANGE.contains(&c.render_scale) {
            return Err(PipelineError::InvalidConfig(format!(
                "Render scale must be 1.0–8.0, got {}",
                c.render_scale
            )));
        }
        if c.record_prefix.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "Record prefix must not be empty".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 || c.download_timeout_secs == 0 {
            return Err(PipelineError::InvalidConfig(
                "Timeouts must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = PipelineConfig::default();
        assert_eq!(c.render_scale, 4.0);
        assert_eq!(c.record_prefix, "resume:");
        assert_eq!(c.temperature, 0.1);
        assert_eq!(c.max_tokens, 4096);
        assert_eq!(c.api_timeout_secs, 120);
        assert!(c.provider.is_none());
        assert!(c.progress_callback.is_none());
    }

    #[test]
    fn builder_sets_fields() {
        let c = PipelineConfig::builder()
            .render_scale(2.0)
            .record_prefix("cv:")
            .model("gpt-4.1-nano")
            .provider_name("openai")
            .temperature(5.0)
            .system_prompt("be brief")
            .build()
            .unwrap();
        assert_eq!(c.render_scale, 2.0);
        assert_eq!(c.record_prefix, "cv:");
        assert_eq!(c.model.as_deref(), Some("gpt-4.1-nano"));
        assert_eq!(c.provider_name.as_deref(), Some("openai"));
        assert_eq!(c.temperature, 2.0);
        assert_eq!(c.system_prompt.as_deref(), Some("be brief"));
    }

    #[test]
    fn out_of_range_scale_is_rejected() {
        for bad in [0.5, 8.5, f32::NAN] {
            let err = PipelineConfig::builder().render_scale(bad).build().unwrap_err();
            assert!(matches!(err, PipelineError::InvalidConfig(_)), "scale {bad}");
        }
    }

    #[test]
    fn empty_prefix_is_rejected() {
        assert!(PipelineConfig::builder().record_prefix("").build().is_err());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        assert!(PipelineConfig::builder().api_timeout_secs(0).build().is_err());
    }

    #[test]
    fn debug_hides_provider_and_callback() {
        let c = PipelineConfig::builder()
            .progress_callback(Arc::new(crate::progress::NoopObserver))
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(dbg.contains("<dyn PipelineObserver>"));
        assert!(dbg.contains("render_scale: 4.0"));
    }
}
