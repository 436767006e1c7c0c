//! # pdf2beamer
//!
//! Turn an existing PDF (a slide deck, a report, a paper) into a LaTeX
//! Beamer presentation and compile it.
//!
//! Text and images are pulled out of the PDF with pdfium. A vision model then
//! decides, image by image, whether an image should become LaTeX (tables,
//! equations, simple diagrams), stay an image, or be dropped, and a second
//! call merges everything into the presentation body. Every model step has a
//! deterministic fallback, so a run only fails when the input is unusable or
//! the compiler cannot produce a PDF even from the deterministic body.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input     resolve local file or download from URL
//!  ├─ 2. Extract   text, headings, images via pdfium (spawn_blocking)
//!  ├─ 3. Basic     deterministic frames, one per page
//!  ├─ 4. Analyze   model: convert / keep / remove each image
//!  ├─ 5. Place     model: final body, cleaned and validated
//!  ├─ 6. Generate  .tex + images/ + theme files
//!  └─ 7. Compile   pdflatex passes; deterministic retry on failure
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2beamer::{convert, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider resolved from GEMINI_API_KEY (or another provider key)
//!     let config = ConversionConfig::builder()
//!         .output_dir("build")
//!         .title("Quarterly Review")
//!         .build()?;
//!     let output = convert("report.pdf", &config).await?;
//!     println!("{}", output.pdf_path.display());
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
//! | `cli`   | on      | Enables the `pdf2beamer` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdf2beamer = { version = "0.1", default-features = false }
//! ```
//!
//! ## Requirements
//!
//! * a pdfium shared library (`PDFIUM_LIB_PATH`, the current directory, or
//!   system-wide)
//! * a LaTeX distribution with `pdflatex` and the Beamer class

// ── Modules ──────────────────────────────────────────────────────────────

pub mod compile;
pub mod config;
pub mod convert;
pub mod error;
pub mod generate;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use compile::{LatexDiagnostic, Severity};
pub use config::{BeamerTheme, ConversionConfig, ConversionConfigBuilder, ImageFilter};
pub use convert::{
    convert, convert_extracted, convert_sync, inspect, render_presentation, RenderedPresentation,
};
pub use error::{ImageFallback, Pdf2BeamerError};
pub use output::{
    BodySource, ConversionOutput, ConversionStats, DocumentMetadata, ExtractedContent,
    ImageOutcome, ImageResolution,
};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback, Stage};
