//! Configuration types for page-by-page document transcription.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. The credential is one of those knobs:
//! it is resolved once, at the entry point, by [`resolve_api_key`]; nothing
//! below `convert` reads the process environment.

use crate::error::ScribeError;
use crate::pipeline::model::VisionModel;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Environment variable consulted when no API key is passed explicitly.
pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Default vision model.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default OpenAI-compatible endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Number of previous fragments carried as context.
pub const DEFAULT_CONTEXT_PAGES: usize = 3;

/// Longest image edge sent to the model, in pixels.
pub const DEFAULT_MAX_IMAGE_DIMENSION: u32 = 1024;

/// Configuration for a document-to-Markdown conversion.
///
/// # Example
/// ```rust
/// use docscribe::ConversionConfig;
/// use std::time::Duration;
///
/// let config = ConversionConfig::builder()
///     .model("gpt-4o-mini")
///     .throttle(Duration::from_secs(2))
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Explicit API key for the OpenAI-compatible endpoint.
    pub api_key: Option<String>,

    /// Environment variable read when `api_key` is `None`. Default: `OPENAI_API_KEY`.
    pub api_key_env: String,

    /// Base URL of the chat-completions endpoint. Default: OpenAI.
    pub base_url: String,

    /// Vision model identifier. Default: `gpt-4o-mini`.
    pub model: String,

    /// Sampling temperature. Default: 0.0.
    ///
    /// Zero keeps run-to-run drift as small as the provider allows; it does
    /// not make the remote model deterministic.
    pub temperature: f32,

    /// Maximum completion tokens per page. Default: provider default.
    pub max_tokens: Option<usize>,

    /// `edgequake-llm` provider name (`anthropic`, `gemini`, `ollama`, …).
    /// When set, that provider is used instead of the OpenAI-compatible default.
    pub provider_name: Option<String>,

    /// Pre-constructed model. Takes precedence over everything else.
    pub provider: Option<Arc<dyn VisionModel>>,

    /// Number of previous fragments in the context window. Default: 3.
    pub context_pages: usize,

    /// Longest image edge sent to the model. Default: 1024.
    pub max_image_dimension: u32,

    /// Rasterisation DPI. Range: 72–400. Default: 200.
    pub dpi: u32,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Directory containing the pdfium shared library. Default: system library.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Fixed delay between consecutive page requests. Default: none.
    pub throttle: Option<Duration>,

    /// Retry behaviour for failed model calls. Default: no retries.
    pub retry: RetryPolicy,

    /// Per-request timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Apply whitespace/Unicode normalisation to each fragment. Default: false.
    pub tidy: bool,

    /// Receives per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.0,
            max_tokens: None,
            provider_name: None,
            provider: None,
            context_pages: DEFAULT_CONTEXT_PAGES,
            max_image_dimension: DEFAULT_MAX_IMAGE_DIMENSION,
            dpi: 200,
            password: None,
            pdfium_lib_path: None,
            throttle: None,
            retry: RetryPolicy::default(),
            api_timeout_secs: 120,
            tidy: false,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_key_env", &self.api_key_env)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn VisionModel>"))
            .field("context_pages", &self.context_pages)
            .field("max_image_dimension", &self.max_image_dimension)
            .field("dpi", &self.dpi)
            .field("throttle", &self.throttle)
            .field("retry", &self.retry)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("tidy", &self.tidy)
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// The throttle to apply between pages, if any. Zero counts as none.
    pub fn effective_throttle(&self) -> Option<Duration> {
        self.throttle.filter(|d| !d.is_zero())
    }
}

/// Builder for [`ConversionConfig`].
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl fmt::Debug for ConversionConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ConversionConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn api_key_env(mut self, var: impl Into<String>) -> Self {
        self.config.api_key_env = var.into();
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = Some(n);
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn VisionModel>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn context_pages(mut self, n: usize) -> Self {
        self.config.context_pages = n;
        self
    }

    pub fn max_image_dimension(mut self, px: u32) -> Self {
        self.config.max_image_dimension = px;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn pdfium_lib_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(dir.into());
        self
    }

    pub fn throttle(mut self, delay: Duration) -> Self {
        self.config.throttle = Some(delay);
        self
    }

    /// Set the throttle from fractional seconds; values ≤ 0 disable it.
    pub fn throttle_secs(mut self, secs: f64) -> Self {
        self.config.throttle = if secs.is_finite() && secs > 0.0 {
            Some(Duration::from_secs_f64(secs))
        } else {
            None
        };
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn tidy(mut self, v: bool) -> Self {
        self.config.tidy = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, ScribeError> {
        let c = &self.config;
        if c.context_pages == 0 {
            return Err(ScribeError::InvalidConfig(
                "Context window must hold at least 1 page".into(),
            ));
        }
        if c.max_image_dimension < 16 {
            return Err(ScribeError::InvalidConfig(format!(
                "Maximum image dimension must be ≥ 16 px, got {}",
                c.max_image_dimension
            )));
        }
        if c.model.trim().is_empty() {
            return Err(ScribeError::InvalidConfig("Model must not be empty".into()));
        }
        if c.api_timeout_secs == 0 {
            return Err(ScribeError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

/// How failed model calls are retried.
///
/// The default performs no retries: a failed page aborts the run on the first
/// error. Only transient errors (timeouts, 429, 5xx, transport) are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first. Default: 0.
    pub max_retries: u32,
    /// Initial backoff in milliseconds, doubled after each attempt. Default: 500.
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff_ms: 500,
        }
    }
}

impl RetryPolicy {
    /// No retries.
    pub fn none() -> Self {
        Self::default()
    }

    /// Retry up to `max_retries` times with exponential backoff.
    pub fn exponential(max_retries: u32, backoff_ms: u64) -> Self {
        Self {
            max_retries,
            backoff_ms,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.backoff_ms.saturating_mul(factor))
    }
}

/// Resolve the API key: the explicit value wins, then `env_var` via `lookup`.
///
/// Empty strings count as absent. `lookup` is normally
/// `|name| std::env::var(name).ok()`; tests pass a closure instead.
pub fn resolve_api_key(
    explicit: Option<&str>,
    env_var: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String, ScribeError> {
    if let Some(key) = explicit.map(str::trim).filter(|k| !k.is_empty()) {
        return Ok(key.to_string());
    }
    lookup(env_var)
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .ok_or_else(|| ScribeError::MissingCredential {
            env_var: env_var.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = ConversionConfig::default();
        assert_eq!(c.model, "gpt-4o-mini");
        assert_eq!(c.temperature, 0.0);
        assert_eq!(c.context_pages, 3);
        assert_eq!(c.max_image_dimension, 1024);
        assert_eq!(c.api_key_env, "OPENAI_API_KEY");
        assert_eq!(c.retry, RetryPolicy::none());
        assert!(c.throttle.is_none());
    }

    #[test]
    fn zero_context_pages_rejected() {
        let err = ConversionConfig::builder().context_pages(0).build().unwrap_err();
        assert!(matches!(err, ScribeError::InvalidConfig(_)));
    }

    #[test]
    fn throttle_secs_ignores_non_positive() {
        let c = ConversionConfig::builder().throttle_secs(0.0).build().unwrap();
        assert!(c.throttle.is_none());
        let c = ConversionConfig::builder().throttle_secs(-1.0).build().unwrap();
        assert!(c.throttle.is_none());
        let c = ConversionConfig::builder().throttle_secs(1.5).build().unwrap();
        assert_eq!(c.throttle, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn effective_throttle_drops_zero() {
        let c = ConversionConfig::builder()
            .throttle(Duration::ZERO)
            .build()
            .unwrap();
        assert_eq!(c.effective_throttle(), None);
    }

    #[test]
    fn dpi_is_clamped() {
        let c = ConversionConfig::builder().dpi(1000).build().unwrap();
        assert_eq!(c.dpi, 400);
    }

    #[test]
    fn debug_redacts_api_key() {
        let c = ConversionConfig::builder().api_key("sk-secret").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("sk-secret"));
    }

    #[test]
    fn explicit_key_wins_over_env() {
        let key = resolve_api_key(Some("sk-explicit"), "KEY", |_| Some("sk-env".into())).unwrap();
        assert_eq!(key, "sk-explicit");
    }

    #[test]
    fn env_key_used_when_no_explicit() {
        let key = resolve_api_key(None, "KEY", |name| {
            assert_eq!(name, "KEY");
            Some("sk-env".into())
        })
        .unwrap();
        assert_eq!(key, "sk-env");
    }

    #[test]
    fn missing_key_is_configuration_error() {
        let err = resolve_api_key(None, "MY_KEY", |_| None).unwrap_err();
        match err {
            ScribeError::MissingCredential { env_var } => assert_eq!(env_var, "MY_KEY"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn blank_keys_count_as_missing() {
        assert!(resolve_api_key(Some("  "), "K", |_| Some(String::new())).is_err());
    }

    #[test]
    fn backoff_doubles() {
        let p = RetryPolicy::exponential(3, 500);
        assert_eq!(p.backoff_for(1), Duration::from_millis(500));
        assert_eq!(p.backoff_for(2), Duration::from_millis(1000));
        assert_eq!(p.backoff_for(3), Duration::from_millis(2000));
    }
}
