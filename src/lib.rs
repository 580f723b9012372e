//! # docscribe
//!
//! Convert multi-page documents to Markdown with a vision language model.
//!
//! Each page is rasterised to an image and transcribed by the model, one page
//! at a time. The markdown of the last few pages travels with every request,
//! so headings, lists and tables that span a page break continue seamlessly
//! instead of restarting on each page.
//!
//! ## Pipeline Overview
//!
//! ```text
//! document
//!  │
//!  ├─ 1. Resolve     converter by extension, model + credential
//!  ├─ 2. Rasterise   pages → PNG files in a temp dir (spawn_blocking)
//!  ├─ 3. Encode      bound to 1024 px, PNG → base64
//!  ├─ 4. Transcribe  prompt + prior context + image → fragment
//!  └─ 5. Assemble    "\n" + fragment, in page order
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docscribe::{convert, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // API key read from OPENAI_API_KEY unless set explicitly
//!     let config = ConversionConfig::default();
//!     let output = convert("document.pdf", &config).await?;
//!     println!("{}", output.markdown);
//!     eprintln!("tokens: {} in / {} out",
//!         output.stats.total_input_tokens,
//!         output.stats.total_output_tokens);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docscribe` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! docscribe = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod context;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder, RetryPolicy};
pub use context::ContextWindow;
pub use convert::{
    assemble, convert, convert_sync, convert_to_file, convert_with, default_output_path,
    write_atomic,
};
pub use error::{ErrorKind, ModelError, ScribeError};
pub use output::{ConversionOutput, ConversionStats, PageFragment};
pub use pipeline::model::{Completion, VisionModel, VisionRequest};
pub use pipeline::rasterize::{ConverterRegistry, PdfRasterizer, Rasterizer};
pub use pipeline::transcribe::{PageTranscriber, TranscriptionOptions};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
