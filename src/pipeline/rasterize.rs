//! Rasterisation: document file → ordered page-image files.
//!
//! A [`Rasterizer`] writes one image per page into a working directory owned
//! by the caller and returns the paths in page order. [`ConverterRegistry`]
//! maps file extensions to rasterizers, so supporting a new document type is
//! a `register` call rather than a new branch in the assembler.
//!
//! Rasterizers are blocking; the assembler runs them on Tokio's blocking pool.

use crate::config::ConversionConfig;
use crate::error::ScribeError;
use image::ImageFormat;
use pdfium_render::prelude::*;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Converts one document into page images.
pub trait Rasterizer: Send + Sync {
    /// Render every page of `document` into `work_dir`, returning the image
    /// paths in page order.
    fn rasterize(&self, document: &Path, work_dir: &Path) -> Result<Vec<PathBuf>, ScribeError>;
}

/// Extension → rasterizer lookup.
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    converters: BTreeMap<String, Arc<dyn Rasterizer>>,
}

impl ConverterRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in converter (`pdf`).
    pub fn with_defaults(config: &ConversionConfig) -> Self {
        let mut registry = Self::new();
        registry.register("pdf", Arc::new(PdfRasterizer::from_config(config)));
        registry
    }

    /// Add or replace the rasterizer for `extension` (case-insensitive, no dot).
    pub fn register(&mut self, extension: &str, rasterizer: Arc<dyn Rasterizer>) -> &mut Self {
        self.converters
            .insert(normalise_extension(extension), rasterizer);
        self
    }

    /// Registered extensions, sorted.
    pub fn extensions(&self) -> Vec<&str> {
        self.converters.keys().map(String::as_str).collect()
    }

    /// Find the rasterizer for `path`'s extension.
    pub fn resolve(&self, path: &Path) -> Result<Arc<dyn Rasterizer>, ScribeError> {
        path.extension()
            .and_then(|e| e.to_str())
            .map(normalise_extension)
            .and_then(|ext| self.converters.get(&ext))
            .cloned()
            .ok_or_else(|| ScribeError::UnsupportedFileType {
                path: path.to_path_buf(),
                supported: self.extensions().join(", "),
            })
    }
}

fn normalise_extension(ext: &str) -> String {
    ext.trim_start_matches('.').to_ascii_lowercase()
}

/// File name for the 0-indexed page `idx`. Zero padding keeps lexical order
/// equal to page order for documents up to 9 999 pages.
pub fn page_file_name(idx: usize) -> String {
    format!("page-{:04}.png", idx + 1)
}

// ── PDF ──────────────────────────────────────────────────────────────────

/// Renders PDF pages with pdfium.
#[derive(Debug, Clone)]
pub struct PdfRasterizer {
    dpi: u32,
    password: Option<String>,
    library_dir: Option<PathBuf>,
}

impl PdfRasterizer {
    pub fn from_config(config: &ConversionConfig) -> Self {
        Self {
            dpi: config.dpi.clamp(72, 400),
            password: config.password.clone(),
            library_dir: config.pdfium_lib_path.clone(),
        }
    }

    fn bind(&self) -> Result<Pdfium, ScribeError> {
        let bindings = match &self.library_dir {
            Some(dir) => {
                let library = Pdfium::pdfium_platform_library_name_at_path(dir);
                Pdfium::bind_to_library(&library)
            }
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| ScribeError::PdfiumBindingFailed(format!("{e:?}")))?;
        Ok(Pdfium::new(bindings))
    }
}

impl Rasterizer for PdfRasterizer {
    fn rasterize(&self, document: &Path, work_dir: &Path) -> Result<Vec<PathBuf>, ScribeError> {
        check_pdf_magic(document)?;
        let pdfium = self.bind()?;
        let password = self.password.as_deref();

        let pdf = pdfium
            .load_pdf_from_file(document, password)
            .map_err(|e| load_error(document, password.is_some(), e))?;

        let pages = pdf.pages();
        info!("PDF loaded: {} pages", pages.len());

        let render_config =
            PdfRenderConfig::new().scale_page_by_factor(self.dpi as f32 / 72.0);

        let mut paths = Vec::with_capacity(pages.len() as usize);
        for (idx, page) in pages.iter().enumerate() {
            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                ScribeError::RasterisationFailed {
                    page: idx + 1,
                    detail: format!("{e:?}"),
                }
            })?;
            let image = bitmap.as_image();
            let path = work_dir.join(page_file_name(idx));
            image
                .save_with_format(&path, ImageFormat::Png)
                .map_err(|e| ScribeError::RasterisationFailed {
                    page: idx + 1,
                    detail: format!("saving {}: {e}", path.display()),
                })?;
            debug!(
                "Rendered page {} → {}x{} px",
                idx + 1,
                image.width(),
                image.height()
            );
            paths.push(path);
        }

        Ok(paths)
    }
}

/// Reject missing files and non-PDFs before pdfium sees them.
fn check_pdf_magic(path: &Path) -> Result<(), ScribeError> {
    let mut file = std::fs::File::open(path).map_err(|_| ScribeError::FileNotFound {
        path: path.to_path_buf(),
    })?;
    let mut magic = [0u8; 4];
    if file.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
        return Err(ScribeError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        });
    }
    Ok(())
}

fn load_error(path: &Path, had_password: bool, e: impl std::fmt::Debug) -> ScribeError {
    let detail = format!("{e:?}");
    if detail.contains("Password") || detail.contains("password") {
        if had_password {
            ScribeError::WrongPassword {
                path: path.to_path_buf(),
            }
        } else {
            ScribeError::PasswordRequired {
                path: path.to_path_buf(),
            }
        }
    } else {
        ScribeError::CorruptDocument {
            path: path.to_path_buf(),
            detail,
        }
    }
}
