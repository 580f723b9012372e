//! End-to-end tests for docscribe.
//!
//! These tests render real PDFs from `./test_cases/` with pdfium and make live
//! calls to the vision model. They are gated behind `E2E_ENABLED` so they do
//! not run in CI unless explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 OPENAI_API_KEY=sk-... PDFIUM_LIB_PATH=. cargo test --test e2e -- --nocapture

use docscribe::{convert, convert_to_file, ConversionConfig, ErrorKind, ScribeError};
use std::path::PathBuf;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

/// Skip this test if E2E_ENABLED is not set *or* no file at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP — test file not found: {}", p.display());
            return;
        }
        p
    }};
}

fn e2e_config() -> ConversionConfig {
    let mut builder = ConversionConfig::builder();
    if let Ok(dir) = std::env::var("PDFIUM_LIB_PATH") {
        builder = builder.pdfium_lib_path(dir);
    }
    builder.build().expect("default config is valid")
}

/// Basic shape checks that hold for any successful transcription.
fn assert_document_shape(md: &str, pages: usize, context: &str) {
    assert!(
        md.starts_with('\n'),
        "[{context}] Document must start with the first fragment's newline"
    );
    assert!(!md.trim().is_empty(), "[{context}] Markdown is empty");
    assert!(
        !md.starts_with("\n```markdown\n"),
        "[{context}] Fence was not stripped from the first page"
    );
    assert!(
        md.matches('\n').count() >= pages,
        "[{context}] Expected at least one newline per page"
    );
    println!("[{context}] ✓  {} bytes, {} pages", md.len(), pages);
}

// ── Live conversions ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_convert_sample_document() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("sample.pdf"));

    let output = convert(&path, &e2e_config())
        .await
        .expect("convert() should succeed");

    assert!(!output.pages.is_empty());
    assert_document_shape(&output.markdown, output.pages.len(), "sample");
    assert!(output.stats.total_input_tokens > 0);

    for (i, page) in output.pages.iter().enumerate() {
        assert_eq!(page.page_num, i + 1);
        assert_eq!(page.context_pages, i.min(3));
    }
}

#[tokio::test]
async fn test_convert_to_file_writes_document() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("sample.pdf"));
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("sample.md");

    let output = convert_to_file(&path, &out, &e2e_config())
        .await
        .expect("convert_to_file() should succeed");

    let written = std::fs::read_to_string(&out).unwrap();
    assert_eq!(written, output.markdown);
}

#[tokio::test]
async fn test_invalid_key_is_transcription_error() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("sample.pdf"));

    let mut config = e2e_config();
    config.api_key = Some("sk-invalid-key-for-e2e".into());

    let err = convert(&path, &config).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transcription, "got: {err}");
    assert!(matches!(err, ScribeError::Transcription { page: 1, .. }));
}

#[tokio::test]
async fn test_missing_file_is_conversion_error() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
        return;
    }
    let mut config = e2e_config();
    config.api_key = Some("sk-unused".into());

    let err = convert(test_cases_dir().join("does_not_exist.pdf"), &config)
        .await
        .unwrap_err();
    assert!(matches!(err, ScribeError::FileNotFound { .. }));
}
