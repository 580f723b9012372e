//! Conversion results.
//!
//! Everything here derives `Serialize`/`Deserialize` so the CLI can emit a
//! run as JSON (`--json`) instead of plain Markdown.

use serde::{Deserialize, Serialize};

/// The transcription of exactly one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageFragment {
    /// 1-indexed page number.
    pub page_num: usize,
    /// Markdown after fence stripping (and tidy, when enabled).
    pub markdown: String,
    /// How many earlier fragments were sent as context for this page.
    pub context_pages: usize,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
    /// Retries spent before the call succeeded.
    pub retries: u32,
}

/// Aggregate numbers for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionStats {
    pub total_pages: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_duration_ms: u64,
    pub rasterise_duration_ms: u64,
    pub model_duration_ms: u64,
}

impl ConversionStats {
    /// Sum the per-page figures; timings outside the page loop are left at 0.
    pub fn from_pages(pages: &[PageFragment]) -> Self {
        Self {
            total_pages: pages.len(),
            total_input_tokens: pages.iter().map(|p| p.input_tokens as u64).sum(),
            total_output_tokens: pages.iter().map(|p| p.output_tokens as u64).sum(),
            model_duration_ms: pages.iter().map(|p| p.duration_ms).sum(),
            ..Self::default()
        }
    }
}

/// The assembled document plus its per-page breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// Every fragment in page order, each prefixed with `"\n"`.
    pub markdown: String,
    pub pages: Vec<PageFragment>,
    pub stats: ConversionStats,
}
