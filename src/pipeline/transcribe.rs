//! Page transcription: one page image + prior context → one markdown fragment.
//!
//! Prompt engineering lives in [`crate::prompts`] and the wire protocol in the
//! [`VisionModel`] implementations; this module only sequences encode →
//! prompt → call → fence stripping, and applies the configured retry policy.

use crate::config::{ConversionConfig, RetryPolicy};
use crate::error::{ModelError, ScribeError};
use crate::pipeline::encode::encode_image_file;
use crate::pipeline::model::{VisionModel, VisionRequest};
use crate::pipeline::postprocess::{strip_markdown_fence, tidy};
use crate::prompts::build_page_prompt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Settings that shape every page request.
#[derive(Debug, Clone)]
pub struct TranscriptionOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<usize>,
    pub max_image_dimension: u32,
    pub retry: RetryPolicy,
    pub tidy: bool,
}

impl From<&ConversionConfig> for TranscriptionOptions {
    fn from(config: &ConversionConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_image_dimension: config.max_image_dimension,
            retry: config.retry,
            tidy: config.tidy,
        }
    }
}

/// The result of transcribing one page.
#[derive(Debug, Clone)]
pub struct Transcription {
    pub markdown: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
    pub retries: u32,
}

/// Produces a markdown fragment for one page at a time.
pub struct PageTranscriber {
    model: Arc<dyn VisionModel>,
    options: TranscriptionOptions,
}

impl PageTranscriber {
    pub fn new(model: Arc<dyn VisionModel>, options: TranscriptionOptions) -> Self {
        Self { model, options }
    }

    /// Transcribe the image at `image_path` (1-indexed `page_num`), using
    /// `previous` as continuation context. An empty `previous` sends the bare
    /// instructions.
    pub async fn transcribe(
        &self,
        page_num: usize,
        image_path: &Path,
        previous: &str,
    ) -> Result<Transcription, ScribeError> {
        let start = Instant::now();

        let image = encode_image_file(image_path, self.options.max_image_dimension).map_err(|e| {
            ScribeError::ImageEncoding {
                page: page_num,
                detail: e.to_string(),
            }
        })?;
        debug!(
            "Page {}: {}x{} px, {} bytes base64, {} bytes context",
            page_num,
            image.width,
            image.height,
            image.data.len(),
            previous.len()
        );

        let request = VisionRequest {
            model: self.options.model.clone(),
            prompt: build_page_prompt(previous),
            image_base64: image.data,
            temperature: self.options.temperature,
            max_tokens: self.options.max_tokens,
        };

        let (completion, retries) = self.call_with_retry(page_num, request).await?;

        if completion.text.trim().is_empty() {
            warn!("Page {}: model returned an empty response", page_num);
        }

        let stripped = strip_markdown_fence(&completion.text);
        let markdown = if self.options.tidy {
            tidy(stripped)
        } else {
            stripped.to_string()
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        debug!(
            "Page {}: {} input tokens, {} output tokens, {}ms",
            page_num, completion.input_tokens, completion.output_tokens, duration_ms
        );

        Ok(Transcription {
            markdown,
            input_tokens: completion.input_tokens,
            output_tokens: completion.output_tokens,
            duration_ms,
            retries,
        })
    }

    async fn call_with_retry(
        &self,
        page_num: usize,
        request: VisionRequest,
    ) -> Result<(crate::pipeline::model::Completion, u32), ScribeError> {
        let policy = self.options.retry;
        let mut attempt = 0u32;
        loop {
            match self.model.complete(request.clone()).await {
                Ok(completion) => return Ok((completion, attempt)),
                Err(e) if attempt < policy.max_retries && e.is_transient() => {
                    attempt += 1;
                    let backoff = retry_delay(&policy, attempt, &e);
                    warn!(
                        "Page {}: {} failed ({}), retry {}/{} after {}ms",
                        page_num,
                        self.model.name(),
                        e,
                        attempt,
                        policy.max_retries,
                        backoff.as_millis()
                    );
                    sleep(backoff).await;
                }
                Err(source) => {
                    return Err(ScribeError::Transcription {
                        page: page_num,
                        source,
                    })
                }
            }
        }
    }
}

/// A server-provided `Retry-After` wins over the exponential schedule.
fn retry_delay(policy: &RetryPolicy, attempt: u32, error: &ModelError) -> std::time::Duration {
    match error {
        ModelError::RateLimited {
            retry_after_secs: Some(secs),
        } => std::time::Duration::from_secs(*secs),
        _ => policy.backoff_for(attempt),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::model::Completion;
    use futures::future::BoxFuture;
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Replays scripted results and records every request it sees.
    struct Scripted {
        replies: Mutex<VecDeque<Result<Completion, ModelError>>>,
        seen: Mutex<Vec<VisionRequest>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<Completion, ModelError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    impl VisionModel for Scripted {
        fn complete(&self, request: VisionRequest) -> BoxFuture<'_, Result<Completion, ModelError>> {
            self.seen.lock().unwrap().push(request);
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected extra request");
            Box::pin(async move { reply })
        }
    }

    fn options() -> TranscriptionOptions {
        TranscriptionOptions::from(&ConversionConfig::default())
    }

    fn page_image(dir: &Path, w: u32, h: u32) -> PathBuf {
        let path = dir.join("page-0001.png");
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([0, 0, 0, 255])))
            .save_with_format(&path, ImageFormat::Png)
            .unwrap();
        path
    }

    #[tokio::test]
    async fn strips_fence_from_reply() {
        let dir = tempfile::tempdir().unwrap();
        let img = page_image(dir.path(), 8, 8);
        let model = Scripted::new(vec![Ok(Completion::text("```markdown\nX\n```"))]);
        let t = PageTranscriber::new(model.clone(), options());

        let out = t.transcribe(1, &img, "").await.unwrap();
        assert_eq!(out.markdown, "X");
        assert_eq!(out.retries, 0);
    }

    #[tokio::test]
    async fn request_carries_model_settings_and_context() {
        let dir = tempfile::tempdir().unwrap();
        let img = page_image(dir.path(), 2048, 1024);
        let model = Scripted::new(vec![Ok(Completion::text("World"))]);
        let t = PageTranscriber::new(model.clone(), options());

        t.transcribe(2, &img, "# Title\nHello").await.unwrap();

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let req = &seen[0];
        assert_eq!(req.model, "gpt-4o-mini");
        assert_eq!(req.temperature, 0.0);
        assert!(req.prompt.contains("```markdown\n# Title\nHello\n```"));

        let expected = crate::pipeline::encode::encode_image_file(&img, 1024).unwrap();
        assert_eq!(req.image_base64, expected.data);
        assert_eq!((expected.width, expected.height), (1024, 512));
    }

    #[tokio::test]
    async fn empty_context_sends_bare_instructions() {
        let dir = tempfile::tempdir().unwrap();
        let img = page_image(dir.path(), 8, 8);
        let model = Scripted::new(vec![Ok(Completion::text("A"))]);
        let t = PageTranscriber::new(model.clone(), options());

        t.transcribe(1, &img, "").await.unwrap();
        assert_eq!(model.seen.lock().unwrap()[0].prompt, crate::prompts::PAGE_INSTRUCTIONS);
    }

    #[tokio::test]
    async fn failure_propagates_without_retry_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let img = page_image(dir.path(), 8, 8);
        let model = Scripted::new(vec![Err(ModelError::Timeout { secs: 1 })]);
        let t = PageTranscriber::new(model.clone(), options());

        let err = t.transcribe(4, &img, "").await.unwrap_err();
        assert!(matches!(
            err,
            ScribeError::Transcription {
                page: 4,
                source: ModelError::Timeout { .. }
            }
        ));
        assert_eq!(model.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn transient_errors_retried_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let img = page_image(dir.path(), 8, 8);
        let model = Scripted::new(vec![
            Err(ModelError::Http {
                status: 503,
                body: String::new(),
            }),
            Ok(Completion::text("ok")),
        ]);
        let mut opts = options();
        opts.retry = RetryPolicy::exponential(2, 1);
        let t = PageTranscriber::new(model.clone(), opts);

        let out = t.transcribe(1, &img, "").await.unwrap();
        assert_eq!(out.markdown, "ok");
        assert_eq!(out.retries, 1);
    }

    #[tokio::test]
    async fn permanent_errors_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let img = page_image(dir.path(), 8, 8);
        let model = Scripted::new(vec![Err(ModelError::Auth {
            status: 401,
            detail: "bad key".into(),
        })]);
        let mut opts = options();
        opts.retry = RetryPolicy::exponential(3, 1);
        let t = PageTranscriber::new(model.clone(), opts);

        assert!(t.transcribe(1, &img, "").await.is_err());
        assert_eq!(model.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unreadable_image_is_encoding_error() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("page-0001.png");
        std::fs::write(&bogus, b"not an image").unwrap();
        let model = Scripted::new(vec![]);
        let t = PageTranscriber::new(model, options());

        let err = t.transcribe(1, &bogus, "").await.unwrap_err();
        assert!(matches!(err, ScribeError::ImageEncoding { page: 1, .. }));
    }

    #[test]
    fn retry_after_overrides_backoff() {
        let p = RetryPolicy::exponential(3, 500);
        let d = retry_delay(
            &p,
            1,
            &ModelError::RateLimited {
                retry_after_secs: Some(9),
            },
        );
        assert_eq!(d, std::time::Duration::from_secs(9));
    }
}
