//! Document assembly entry points.
//!
//! A run is strictly sequential: the rasterizer produces every page image up
//! front, then each page is transcribed in order with the most recent
//! fragments as context. The first failure aborts the run and nothing partial
//! is returned.

use crate::config::{resolve_api_key, ConversionConfig};
use crate::context::ContextWindow;
use crate::error::ScribeError;
use crate::output::{ConversionOutput, ConversionStats, PageFragment};
use crate::pipeline::model::{LlmProviderModel, VisionModel};
use crate::pipeline::rasterize::ConverterRegistry;
use crate::pipeline::transcribe::{PageTranscriber, TranscriptionOptions};
use edgequake_llm::{OpenAIProvider, ProviderFactory};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Convert a document to Markdown using the built-in converters.
///
/// # Errors
/// - [`ScribeError::UnsupportedFileType`] before anything else happens
/// - [`ScribeError::MissingCredential`] before the document is rasterised
/// - any rasterisation or transcription failure, which aborts the whole run
pub async fn convert(
    input: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, ScribeError> {
    let registry = ConverterRegistry::with_defaults(config);
    convert_with(input, config, &registry).await
}

/// Like [`convert`], with an explicit set of converters.
pub async fn convert_with(
    input: impl AsRef<Path>,
    config: &ConversionConfig,
    registry: &ConverterRegistry,
) -> Result<ConversionOutput, ScribeError> {
    let total_start = Instant::now();
    let input = input.as_ref();
    info!("Starting conversion: {}", input.display());

    // ── Step 1: Pick the converter ───────────────────────────────────────
    let rasterizer = registry.resolve(input)?;

    // ── Step 2: Resolve the model (credential checked here) ──────────────
    let model = resolve_model(config)?;
    let transcriber = PageTranscriber::new(model, TranscriptionOptions::from(config));

    // ── Step 3: Rasterise into a scoped work directory ───────────────────
    let work_dir = tempfile::Builder::new()
        .prefix("docscribe-")
        .tempdir()
        .map_err(ScribeError::WorkDir)?;
    debug!("Work directory: {}", work_dir.path().display());

    let render_start = Instant::now();
    let document = input.to_path_buf();
    let dir = work_dir.path().to_path_buf();
    let pages = tokio::task::spawn_blocking(move || rasterizer.rasterize(&document, &dir))
        .await
        .map_err(|e| ScribeError::Internal(format!("rasteriser task failed: {e}")))??;
    let rasterise_duration_ms = render_start.elapsed().as_millis() as u64;

    info!(
        "Rasterised {} pages in {}ms",
        pages.len(),
        rasterise_duration_ms
    );

    // ── Step 4: Transcribe page by page ──────────────────────────────────
    let mut output = assemble(&pages, &transcriber, config).await?;
    output.stats.rasterise_duration_ms = rasterise_duration_ms;
    output.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    info!(
        "Conversion complete: {} pages, {}ms total",
        output.stats.total_pages, output.stats.total_duration_ms
    );
    Ok(output)
}

/// Transcribe already-rasterised `pages` in order.
///
/// Each request sees the last `config.context_pages` fragments joined with
/// `"\n"`; each fragment is appended to the document as `"\n" + fragment`.
/// A positive throttle is slept between pages, never after the last one.
pub async fn assemble(
    pages: &[PathBuf],
    transcriber: &PageTranscriber,
    config: &ConversionConfig,
) -> Result<ConversionOutput, ScribeError> {
    let total = pages.len();
    let throttle = config.effective_throttle();
    let callback = config.progress_callback.as_ref();

    let mut window = ContextWindow::new(config.context_pages);
    let mut markdown = String::new();
    let mut fragments = Vec::with_capacity(total);

    if let Some(cb) = callback {
        cb.on_conversion_start(total);
    }

    for (idx, path) in pages.iter().enumerate() {
        let page_num = idx + 1;
        if let Some(cb) = callback {
            cb.on_page_start(page_num, total);
        }

        let previous = window.joined();
        let context_pages = window.len();
        let transcription = match transcriber.transcribe(page_num, path, &previous).await {
            Ok(t) => t,
            Err(e) => {
                if let Some(cb) = callback {
                    cb.on_page_error(page_num, total, &e.to_string());
                }
                return Err(e);
            }
        };

        markdown.push('\n');
        markdown.push_str(&transcription.markdown);
        window.push(transcription.markdown.clone());

        if let Some(cb) = callback {
            cb.on_page_complete(page_num, total, transcription.markdown.len());
        }
        fragments.push(PageFragment {
            page_num,
            markdown: transcription.markdown,
            context_pages,
            input_tokens: transcription.input_tokens,
            output_tokens: transcription.output_tokens,
            duration_ms: transcription.duration_ms,
            retries: transcription.retries,
        });

        if let Some(delay) = throttle.filter(|_| page_num < total) {
            debug!("Throttling {}ms before page {}", delay.as_millis(), page_num + 1);
            tokio::time::sleep(delay).await;
        }
    }

    if let Some(cb) = callback {
        cb.on_conversion_complete(total);
    }

    let stats = ConversionStats::from_pages(&fragments);
    Ok(ConversionOutput {
        markdown,
        pages: fragments,
        stats,
    })
}

/// Convert a document and write the Markdown to `output_path`.
///
/// The file is only touched once the whole document succeeded, and is
/// replaced atomically (temp file + rename).
pub async fn convert_to_file(
    input: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, ScribeError> {
    let output = convert(input, config).await?;
    write_atomic(output_path.as_ref(), output.markdown.as_bytes()).await?;
    Ok(output)
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, ScribeError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ScribeError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(input, config))
}

/// `<input>.md`: the input path with `.md` appended, so `report.pdf` becomes
/// `report.pdf.md`.
pub fn default_output_path(input: impl AsRef<Path>) -> PathBuf {
    let mut name: OsString = input.as_ref().as_os_str().to_owned();
    name.push(".md");
    PathBuf::from(name)
}

/// Write `contents` to `path` through a sibling temp file and a rename.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), ScribeError> {
    let write_err = |source| ScribeError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = temp_sibling(path);
    tokio::fs::write(&tmp_path, contents)
        .await
        .map_err(write_err)?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_err(e));
    }
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Resolve the vision model, from most-specific to least-specific:
///
/// 1. **Injected model** (`config.provider`), used as-is.
/// 2. **Named provider** (`config.provider_name`) through
///    [`ProviderFactory::create_llm_provider`], which reads that provider's
///    own environment keys.
/// 3. **OpenAI-compatible endpoint** with the explicit key, else the key from
///    `config.api_key_env`.
///
/// This is the only place the environment is read.
fn resolve_model(config: &ConversionConfig) -> Result<Arc<dyn VisionModel>, ScribeError> {
    if let Some(ref model) = config.provider {
        return Ok(Arc::clone(model));
    }

    if let Some(ref name) = config.provider_name {
        let provider = ProviderFactory::create_llm_provider(name, &config.model).map_err(|e| {
            ScribeError::ProviderNotConfigured {
                provider: name.clone(),
                hint: format!("{e}"),
            }
        })?;
        info!("Using provider {} with model {}", name, config.model);
        let model = LlmProviderModel::new(provider, name.clone())
            .with_timeout(Duration::from_secs(config.api_timeout_secs));
        return Ok(Arc::new(model));
    }

    let api_key = resolve_api_key(config.api_key.as_deref(), &config.api_key_env, |name| {
        std::env::var(name).ok()
    })?;
    let provider =
        OpenAIProvider::compatible(api_key, config.base_url.as_str()).with_model(&config.model);
    info!("Using {} at {}", config.model, config.base_url);
    let model = LlmProviderModel::new(Arc::new(provider), "openai")
        .with_timeout(Duration::from_secs(config.api_timeout_secs));
    Ok(Arc::new(model))
}
