//! Error types for the pdf2beamer library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Pdf2BeamerError`]: **Fatal**: the run cannot proceed (bad input
//!   file, pdfium missing, provider not configured, compiler failed).
//!   Returned as `Err(Pdf2BeamerError)` from the top-level `convert*`
//!   functions.
//!
//! * [`ImageFallback`]: **Non-fatal**: the model could not turn one image
//!   into LaTeX, so the original image is kept. Stored inside
//!   [`crate::output::ImageOutcome`] so callers can see which slides carry
//!   a raw image and why.

use crate::compile::LatexDiagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdf2beamer library.
#[derive(Debug, Error)]
pub enum Pdf2BeamerError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// The document (or the `max_pages` window) contains no pages.
    #[error("PDF '{path}' has no pages to convert")]
    NoPages { path: PathBuf },

    /// pdfium returned an error while reading a page.
    #[error("Extraction failed for page {page}: {detail}")]
    ExtractionFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
You can:\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.\n\
  • Place libpdfium next to the binary or in the current directory.\n\
  • Install pdfium system-wide.\n"
    )]
    PdfiumBindingFailed(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The LLM API returned an error.
    #[error("LLM API error during {step}: {message}")]
    LlmApiError { step: String, message: String },

    /// A model call exceeded the configured timeout.
    #[error("LLM call for {step} timed out after {secs}s")]
    ApiTimeout { step: String, secs: u64 },

    // ── Compiler errors ───────────────────────────────────────────────────
    /// The LaTeX compiler binary could not be found or run.
    #[error(
        "LaTeX compiler '{compiler}' not found: {detail}\n\
Install a TeX distribution:\n\
  macOS:   brew install --cask mactex\n\
  Ubuntu:  sudo apt-get install texlive-latex-extra\n\
  Windows: install MiKTeX"
    )]
    CompilerNotFound { compiler: String, detail: String },

    /// A compiler pass exceeded the configured timeout.
    #[error("LaTeX compilation of '{tex}' timed out after {secs}s")]
    CompilationTimeout { tex: PathBuf, secs: u64 },

    /// The compiler ran but produced no PDF.
    #[error("LaTeX compilation of '{tex}' failed (exit code {exit_code:?}){}", format_diagnostics(.diagnostics))]
    CompilationFailed {
        tex: PathBuf,
        exit_code: Option<i32>,
        diagnostics: Vec<LatexDiagnostic>,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn format_diagnostics(diagnostics: &[LatexDiagnostic]) -> String {
    let errors: Vec<String> = diagnostics
        .iter()
        .filter(|d| d.is_error())
        .take(10)
        .map(|d| format!("\n  {d}"))
        .collect();
    if errors.is_empty() {
        String::new()
    } else {
        format!(":{}", errors.concat())
    }
}

/// Why an image was kept as a raw image instead of being converted to LaTeX.
///
/// Stored on [`crate::output::ImageOutcome::fallback`]; never aborts the run.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum ImageFallback {
    /// The analysis call failed or returned nothing usable.
    #[error("image analysis unavailable: {detail}")]
    AnalysisUnavailable { detail: String },

    /// The model returned a plan that does not mention this image.
    #[error("no decision returned for this image")]
    NoDecision,

    /// The model asked for a conversion but supplied no LaTeX.
    #[error("conversion requested but no LaTeX was returned")]
    EmptyConversion,

    /// The supplied LaTeX is not a self-contained fragment.
    #[error("conversion rejected: {reason}")]
    InvalidConversion { reason: String },
}
