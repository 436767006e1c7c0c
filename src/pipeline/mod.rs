//! Pipeline stages for PDF-to-Beamer conversion.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested on its own. Document generation and compilation live one level up
//! in [`crate::generate`] and [`crate::compile`] because they touch the file
//! system and external processes rather than content.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ basic ──▶ analysis ──▶ placement ──▶ postprocess
//! (URL/path) (pdfium)  (frames)   (model)      (model)       (cleanup)
//! ```
//!
//! 1. [`input`]      : canonicalise the user-supplied path or URL to a local file
//! 2. [`extract`]    : text, headings and images; runs in `spawn_blocking`
//!    because pdfium is not async-safe
//! 3. [`basic`]      : deterministic frames and the fallback body
//! 4. [`analysis`]   : classify each image (convert, keep, remove)
//! 5. [`placement`]  : merge structure, images and conversions
//! 6. [`postprocess`]: deterministic cleanup and validation of model LaTeX
//!
//! [`encode`] and [`llm`] are shared by the two model stages.

pub mod analysis;
pub mod basic;
pub mod encode;
pub mod extract;
pub mod input;
pub mod llm;
pub mod placement;
pub mod postprocess;
