//! CLI binary for docscribe.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and writes the result.

use anyhow::{Context, Result};
use clap::Parser;
use docscribe::{
    convert, default_output_path, write_atomic, ConversionConfig, ConversionOutput,
    ConversionProgressCallback, ProgressCallback, RetryPolicy,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: a spinner while the document is rasterised, then one
/// bar tick and one log line per transcribed page.
struct CliProgressCallback {
    bar: ProgressBar,
    page_started: Mutex<Option<Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Rasterising pages…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            page_started: Mutex::new(None),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Transcribing");
        self.bar.reset_eta();
    }

    fn page_elapsed_secs(&self) -> f64 {
        self.page_started
            .lock()
            .ok()
            .and_then(|mut started| started.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    /// Clear the bar when the run ends without `on_conversion_complete`.
    fn abandon(&self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        if let Ok(mut started) = self.page_started.lock() {
            *started = Some(Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, markdown_len: usize) {
        let secs = self.page_elapsed_secs();
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{markdown_len:>5} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        let secs = self.page_elapsed_secs();
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.finish_and_clear();
    }

    fn on_conversion_complete(&self, total_pages: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} pages transcribed",
            green("✔"),
            bold(&total_pages.to_string())
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert report.pdf into report.pdf.md
  docscribe report.pdf

  # Explicit output path, one second between pages
  docscribe report.pdf notes.md --throttle-seconds 1

  # Wider context window and retries on transient API errors
  docscribe book.pdf --context-pages 5 --max-retries 3

  # Any OpenAI-compatible endpoint
  docscribe scan.pdf --base-url http://localhost:11434/v1 --model llava

  # Another edgequake-llm provider (uses that provider's own API key)
  docscribe scan.pdf --provider anthropic --model claude-sonnet-4-20250514

  # Structured output with per-page token usage
  docscribe report.pdf --json

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          API key for the OpenAI-compatible endpoint
  PDFIUM_LIB_PATH         Directory containing the pdfium shared library
  DOCSCRIBE_*             Every flag below can also be set this way
  RUST_LOG                Overrides the log filter
"#;

/// Convert documents to Markdown with a vision LLM, page by page.
#[derive(Parser, Debug)]
#[command(
    name = "docscribe",
    version,
    about = "Convert documents to Markdown with a vision LLM, page by page",
    long_about = "Convert documents to Markdown with a vision language model. Each page is \
rendered to an image and transcribed in order, with the markdown of the previous pages \
supplied as context so structures spanning page breaks continue seamlessly.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Document to convert (currently: PDF).
    input: PathBuf,

    /// Output file. Default: `<input>.md` (`<input>.json` with --json).
    output: Option<PathBuf>,

    /// API key for the OpenAI-compatible endpoint.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Show a per-page progress bar (default).
    #[arg(long, overrides_with = "no_verbose")]
    verbose: bool,

    /// Hide the progress bar.
    #[arg(long, overrides_with = "verbose")]
    no_verbose: bool,

    /// Seconds to wait between page requests (0 disables).
    #[arg(long, env = "DOCSCRIBE_THROTTLE_SECONDS", default_value_t = 0.0)]
    throttle_seconds: f64,

    /// Vision model ID.
    #[arg(long, env = "DOCSCRIBE_MODEL", default_value = docscribe::config::DEFAULT_MODEL)]
    model: String,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, env = "DOCSCRIBE_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Max output tokens per page (provider default when unset).
    #[arg(long, env = "DOCSCRIBE_MAX_TOKENS")]
    max_tokens: Option<usize>,

    /// Use a named edgequake-llm provider (openai, anthropic, gemini, ollama, …)
    /// configured from its own environment instead of --base-url/--api-key.
    #[arg(long, env = "DOCSCRIBE_PROVIDER")]
    provider: Option<String>,

    /// Base URL of the OpenAI-compatible API.
    #[arg(long, env = "DOCSCRIBE_BASE_URL", default_value = docscribe::config::DEFAULT_BASE_URL)]
    base_url: String,

    /// Rendering DPI (72–400).
    #[arg(long, env = "DOCSCRIBE_DPI", default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Password for encrypted PDFs.
    #[arg(long, env = "DOCSCRIBE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Directory containing the pdfium shared library.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Number of previous pages sent as context.
    #[arg(long, env = "DOCSCRIBE_CONTEXT_PAGES", default_value_t = docscribe::config::DEFAULT_CONTEXT_PAGES)]
    context_pages: usize,

    /// Retries per page on transient API errors.
    #[arg(long, env = "DOCSCRIBE_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// Base delay for exponential retry backoff, in milliseconds.
    #[arg(long, env = "DOCSCRIBE_RETRY_BACKOFF_MS", default_value_t = 500)]
    retry_backoff_ms: u64,

    /// Per-request API timeout in seconds.
    #[arg(long, env = "DOCSCRIBE_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Normalise whitespace and invisible characters in each page.
    #[arg(long, env = "DOCSCRIBE_TIDY")]
    tidy: bool,

    /// Write structured JSON (ConversionOutput) instead of Markdown.
    #[arg(long, env = "DOCSCRIBE_JSON")]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(long, env = "DOCSCRIBE_DEBUG")]
    debug: bool,
}

impl Cli {
    fn show_progress(&self) -> bool {
        !self.no_verbose
    }

    fn output_path(&self) -> PathBuf {
        match (&self.output, self.json) {
            (Some(path), _) => path.clone(),
            (None, false) => default_output_path(&self.input),
            (None, true) => json_output_path(&self.input),
        }
    }
}

fn json_output_path(input: &Path) -> PathBuf {
    let mut name = input.as_os_str().to_owned();
    name.push(".json");
    PathBuf::from(name)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The bar carries the per-page feedback, so library INFO logs are muted
    // while it is shown. --debug always wins.
    let show_progress = cli.show_progress();
    let filter = if cli.debug {
        "debug"
    } else if show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let progress = show_progress.then(CliProgressCallback::new);
    let config = build_config(
        &cli,
        progress
            .as_ref()
            .map(|cb| Arc::clone(cb) as ProgressCallback),
    )?;

    // ── Run conversion ───────────────────────────────────────────────────
    let output_path = cli.output_path();
    let result = convert(&cli.input, &config).await;
    if let Some(ref cb) = progress {
        cb.abandon();
    }
    let output = result
        .with_context(|| format!("Failed to convert {}", cli.input.display()))?;

    let contents = render_output(&output, cli.json)?;
    write_atomic(&output_path, contents.as_bytes())
        .await
        .with_context(|| format!("Failed to write {}", output_path.display()))?;

    eprintln!(
        "{}  {} pages  {}ms  →  {}",
        green("✔"),
        output.stats.total_pages,
        output.stats.total_duration_ms,
        bold(&output_path.display().to_string()),
    );
    eprintln!(
        "   {} tokens in  /  {} tokens out",
        dim(&output.stats.total_input_tokens.to_string()),
        dim(&output.stats.total_output_tokens.to_string()),
    );

    Ok(())
}

fn render_output(output: &ConversionOutput, json: bool) -> Result<String> {
    if json {
        serde_json::to_string_pretty(output).context("Failed to serialise output")
    } else {
        Ok(output.markdown.clone())
    }
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .model(cli.model.clone())
        .base_url(cli.base_url.clone())
        .temperature(cli.temperature)
        .dpi(cli.dpi)
        .context_pages(cli.context_pages)
        .throttle_secs(cli.throttle_seconds)
        .retry(RetryPolicy::exponential(cli.max_retries, cli.retry_backoff_ms))
        .api_timeout_secs(cli.api_timeout)
        .tidy(cli.tidy);

    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key.clone());
    }
    if let Some(n) = cli.max_tokens {
        builder = builder.max_tokens(n);
    }
    if let Some(ref name) = cli.provider {
        builder = builder.provider_name(name.clone());
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(ref dir) = cli.pdfium_lib {
        builder = builder.pdfium_lib_path(dir.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
