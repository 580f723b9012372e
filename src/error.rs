//! Error types for the docscribe library.
//!
//! Two error types reflect the two layers of the pipeline:
//!
//! * [`ScribeError`] — everything the top-level `convert*` functions can
//!   return. A page failure is fatal here: the whole run aborts and no partial
//!   document is produced.
//!
//! * [`ModelError`] — a single vision-model call failed. It is wrapped into
//!   [`ScribeError::Transcription`] together with the page number before it
//!   reaches the caller.
//!
//! [`ScribeError::kind`] groups the variants into the four coarse classes a
//! caller usually branches on.

use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a [`ScribeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing credential, unsupported input type, bad settings. Raised before
    /// any remote call is made.
    Configuration,
    /// The document could not be rasterised.
    Conversion,
    /// A page could not be transcribed.
    Transcription,
    /// Local I/O around the run (work directory, output file).
    Io,
}

/// All errors returned by the docscribe library.
#[derive(Debug, Error)]
pub enum ScribeError {
    // ── Configuration errors ──────────────────────────────────────────────
    /// No API key was passed and the fallback environment variable is unset.
    #[error("API key is required.\nPass --api-key or set the {env_var} environment variable.")]
    MissingCredential { env_var: String },

    /// No converter is registered for the input's extension.
    #[error("Unsupported file type: '{path}'\nSupported extensions: {supported}")]
    UnsupportedFileType { path: PathBuf, supported: String },

    /// A named LLM provider could not be constructed.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Conversion errors ─────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// The document could not be parsed.
    #[error("Document '{path}' is corrupt: {detail}")]
    CorruptDocument { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install libpdfium on the library search path, or point\n\
PDFIUM_LIB_PATH / --pdfium-lib at the directory that contains it."
    )]
    PdfiumBindingFailed(String),

    /// Rendering or saving a single page image failed.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    // ── Transcription errors ──────────────────────────────────────────────
    /// The vision model call for a page failed. The run is aborted.
    #[error("Page {page}: transcription failed: {source}")]
    Transcription {
        page: usize,
        #[source]
        source: ModelError,
    },

    /// The page image could not be decoded or re-encoded.
    #[error("Page {page}: image encoding failed: {detail}")]
    ImageEncoding { page: usize, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// The temporary working directory could not be created.
    #[error("Failed to create working directory: {0}")]
    WorkDir(#[source] std::io::Error),

    /// Could not create or write the output Markdown file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScribeError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScribeError::MissingCredential { .. }
            | ScribeError::UnsupportedFileType { .. }
            | ScribeError::ProviderNotConfigured { .. }
            | ScribeError::InvalidConfig(_) => ErrorKind::Configuration,

            ScribeError::FileNotFound { .. }
            | ScribeError::NotAPdf { .. }
            | ScribeError::CorruptDocument { .. }
            | ScribeError::PasswordRequired { .. }
            | ScribeError::WrongPassword { .. }
            | ScribeError::PdfiumBindingFailed(_)
            | ScribeError::RasterisationFailed { .. } => ErrorKind::Conversion,

            ScribeError::Transcription { .. } | ScribeError::ImageEncoding { .. } => {
                ErrorKind::Transcription
            }

            ScribeError::WorkDir(_)
            | ScribeError::OutputWriteFailed { .. }
            | ScribeError::Internal(_) => ErrorKind::Io,
        }
    }
}

/// A failed vision-model call.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    /// The endpoint rejected the credential (401/403).
    #[error("authentication failed ({status}): {detail}")]
    Auth { status: u16, detail: String },

    /// HTTP 429.
    #[error("rate limit exceeded{}", retry_after_secs.map(|s| format!(", retry after {s}s")).unwrap_or_default())]
    RateLimited { retry_after_secs: Option<u64> },

    /// Any other non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The request did not complete within the configured timeout.
    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Connection or protocol failure before a response arrived.
    #[error("request failed: {0}")]
    Transport(String),

    /// The response arrived but had no usable completion.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Error surfaced by an `edgequake-llm` provider.
    #[error("{0}")]
    Provider(String),
}

impl ModelError {
    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ModelError::RateLimited { .. }
            | ModelError::Timeout { .. }
            | ModelError::Transport(_) => true,
            ModelError::Http { status, .. } => *status >= 500,
            ModelError::Auth { .. }
            | ModelError::MalformedResponse(_)
            | ModelError::Provider(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credential_names_env_var() {
        let e = ScribeError::MissingCredential {
            env_var: "OPENAI_API_KEY".into(),
        };
        assert!(e.to_string().contains("OPENAI_API_KEY"));
        assert_eq!(e.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn unsupported_file_type_is_configuration() {
        let e = ScribeError::UnsupportedFileType {
            path: "notes.docx".into(),
            supported: "pdf".into(),
        };
        assert_eq!(e.kind(), ErrorKind::Configuration);
        assert!(e.to_string().contains("notes.docx"));
    }

    #[test]
    fn transcription_display_includes_page_and_cause() {
        let e = ScribeError::Transcription {
            page: 3,
            source: ModelError::Http {
                status: 400,
                body: "bad image".into(),
            },
        };
        let msg = e.to_string();
        assert!(msg.contains("Page 3"), "got: {msg}");
        assert!(msg.contains("bad image"), "got: {msg}");
        assert_eq!(e.kind(), ErrorKind::Transcription);
    }

    #[test]
    fn rate_limit_display_with_retry() {
        let e = ModelError::RateLimited {
            retry_after_secs: Some(60),
        };
        assert!(e.to_string().contains("60s"));
    }

    #[test]
    fn rate_limit_display_without_retry() {
        let e = ModelError::RateLimited {
            retry_after_secs: None,
        };
        assert_eq!(e.to_string(), "rate limit exceeded");
    }

    #[test]
    fn transient_classification() {
        assert!(ModelError::Timeout { secs: 5 }.is_transient());
        assert!(ModelError::Http {
            status: 503,
            body: String::new()
        }
        .is_transient());
        assert!(!ModelError::Http {
            status: 400,
            body: String::new()
        }
        .is_transient());
        assert!(!ModelError::Auth {
            status: 401,
            detail: "invalid key".into()
        }
        .is_transient());
    }
}
