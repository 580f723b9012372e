//! Pipeline stages for document-to-Markdown conversion.
//!
//! Each submodule implements one step; [`crate::convert`] sequences them.
//!
//! ## Data Flow
//!
//! ```text
//! rasterize ──▶ encode ──▶ model ──▶ postprocess
//! (pages)       (base64)   (VLM)     (fences)
//! ```
//!
//! 1. [`rasterize`]: document → ordered page images; blocking, runs in
//!    `spawn_blocking`
//! 2. [`encode`]: bound the image size, PNG-encode and base64-wrap it
//! 3. [`model`]: the vision model seam over `edgequake-llm` providers
//! 4. [`postprocess`]: strip the markdown fence, optional tidy
//!
//! [`transcribe`] drives steps 2–4 for a single page.

pub mod encode;
pub mod model;
pub mod postprocess;
pub mod rasterize;
pub mod transcribe;
