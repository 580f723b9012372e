//! The remote vision model, seen from the pipeline.
//!
//! [`VisionModel`] is the seam between page transcription and whatever serves
//! the model: any `edgequake-llm` provider through [`LlmProviderModel`]
//! (the default is `OpenAIProvider::compatible` against the configured base
//! URL), or an in-process double in tests.

use crate::error::ModelError;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, LlmError};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;

/// One page request: a prompt plus exactly one image.
#[derive(Debug, Clone)]
pub struct VisionRequest {
    /// Model identifier, e.g. `gpt-4o-mini`.
    pub model: String,
    /// Instruction prompt, including any prior-page context.
    pub prompt: String,
    /// Base64 PNG payload (without the `data:` prefix).
    pub image_base64: String,
    pub temperature: f32,
    pub max_tokens: Option<usize>,
}

/// A single text completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl Completion {
    /// A completion with no token accounting.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

/// A vision-capable model: given a prompt and an image, return text.
pub trait VisionModel: Send + Sync {
    /// Issue one request. Implementations must not retry internally; retry
    /// policy belongs to the caller.
    fn complete(&self, request: VisionRequest) -> BoxFuture<'_, Result<Completion, ModelError>>;

    /// Short label for logs.
    fn name(&self) -> &str {
        "vision-model"
    }
}

/// Adapter exposing an `edgequake-llm` provider as a [`VisionModel`].
///
/// The provider was built for a specific model, so [`VisionRequest::model`]
/// is informational here. Each call is bounded by the timeout when one is set.
pub struct LlmProviderModel {
    provider: Arc<dyn LLMProvider>,
    label: String,
    timeout: Option<Duration>,
}

impl LlmProviderModel {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>) -> Self {
        Self {
            provider,
            label: label.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl VisionModel for LlmProviderModel {
    fn complete(&self, request: VisionRequest) -> BoxFuture<'_, Result<Completion, ModelError>> {
        Box::pin(async move {
            let image = ImageData::new(request.image_base64, "image/png").with_detail("high");
            let messages = vec![ChatMessage::user_with_images(request.prompt.as_str(), vec![image])];
            let options = CompletionOptions {
                temperature: Some(request.temperature),
                max_tokens: request.max_tokens,
                ..Default::default()
            };

            let call = self.provider.chat(&messages, Some(&options));
            let response = match self.timeout {
                Some(limit) => tokio::time::timeout(limit, call)
                    .await
                    .map_err(|_| ModelError::Timeout {
                        secs: limit.as_secs(),
                    })?,
                None => call.await,
            }
            .map_err(|e| model_error(e, self.timeout))?;

            Ok(Completion {
                text: response.content,
                input_tokens: response.prompt_tokens,
                output_tokens: response.completion_tokens,
            })
        })
    }

    fn name(&self) -> &str {
        &self.label
    }
}

/// Map a provider error onto the transient/permanent split the retry policy
/// works with.
///
/// Providers report server failures as `ApiError` text, so a 5xx status is
/// recovered from the message when one is present.
fn model_error(err: LlmError, timeout: Option<Duration>) -> ModelError {
    match err {
        LlmError::Timeout => ModelError::Timeout {
            secs: timeout.map(|t| t.as_secs()).unwrap_or_default(),
        },
        LlmError::NetworkError(msg) => ModelError::Transport(msg),
        LlmError::RateLimited(_) => ModelError::RateLimited {
            retry_after_secs: None,
        },
        LlmError::AuthError(msg) => ModelError::Auth {
            status: 401,
            detail: msg,
        },
        LlmError::SerializationError(e) => ModelError::MalformedResponse(e.to_string()),
        LlmError::ApiError(msg) if msg.starts_with("No choices") => {
            ModelError::MalformedResponse(msg)
        }
        LlmError::ApiError(msg) => match server_status(&msg) {
            Some(status) => ModelError::Http { status, body: msg },
            None => ModelError::Provider(msg),
        },
        other => ModelError::Provider(other.to_string()),
    }
}

fn server_status(msg: &str) -> Option<u16> {
    [500, 502, 503, 504]
        .into_iter()
        .find(|code| msg.contains(&code.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl VisionModel for Echo {
        fn complete(&self, request: VisionRequest) -> BoxFuture<'_, Result<Completion, ModelError>> {
            Box::pin(async move { Ok(Completion::text(request.prompt)) })
        }
    }

    fn request() -> VisionRequest {
        VisionRequest {
            model: "m".into(),
            prompt: "hello".into(),
            image_base64: "AAAA".into(),
            temperature: 0.0,
            max_tokens: None,
        }
    }

    #[tokio::test]
    async fn trait_object_is_callable() {
        let model: Arc<dyn VisionModel> = Arc::new(Echo);
        let out = model.complete(request()).await.unwrap();
        assert_eq!(out.text, "hello");
        assert_eq!(model.name(), "vision-model");
    }

    #[test]
    fn provider_errors_keep_their_retry_class() {
        let limit = Some(Duration::from_secs(30));

        assert!(matches!(
            model_error(LlmError::Timeout, limit),
            ModelError::Timeout { secs: 30 }
        ));
        assert!(matches!(
            model_error(LlmError::NetworkError("reset".into()), limit),
            ModelError::Transport(_)
        ));
        assert!(matches!(
            model_error(LlmError::RateLimited("slow down".into()), limit),
            ModelError::RateLimited { retry_after_secs: None }
        ));
        assert!(matches!(
            model_error(LlmError::ApiError("upstream returned 502".into()), limit),
            ModelError::Http { status: 502, .. }
        ));

        let auth = model_error(LlmError::AuthError("invalid_api_key".into()), limit);
        assert!(matches!(auth, ModelError::Auth { status: 401, .. }));
        assert!(!auth.is_transient());
    }

    #[test]
    fn empty_choice_list_is_malformed() {
        let err = model_error(LlmError::ApiError("No choices in response".into()), None);
        assert!(matches!(err, ModelError::MalformedResponse(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn unrecognised_api_error_is_permanent() {
        let err = model_error(LlmError::ApiError("content filter".into()), None);
        assert!(matches!(err, ModelError::Provider(_)));
        assert!(!err.is_transient());
    }
}
