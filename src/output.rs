//! Data types produced by the pipeline.
//!
//! Extraction results ([`ExtractedContent`]) flow into the model stages;
//! everything a caller sees after a run is collected in [`ConversionOutput`],
//! which serialises to JSON for `pdf2beamer --json`.

use crate::compile::LatexDiagnostic;
use crate::error::ImageFallback;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tempfile::TempDir;

/// Document-level metadata read from the PDF info dictionary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
}

/// Text content of one PDF page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedPage {
    /// 1-indexed page number.
    pub page_num: usize,
    /// Largest heading on the page, used as the frame title.
    pub title: Option<String>,
    /// Every line detected as a heading, in reading order.
    pub headings: Vec<String>,
    /// Plain text as returned by pdfium.
    pub text: String,
    /// Text with heading lines rendered as `# …`.
    pub markdown: String,
}

/// An embedded image that passed the [`crate::config::ImageFilter`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedImage {
    /// `page_{page}_img_{index}.png`, where `index` counts every image
    /// object on the page, filtered or not.
    pub filename: String,
    /// Absolute location of the PNG inside the extraction directory.
    pub path: PathBuf,
    /// 1-indexed page the image was found on.
    pub page: usize,
    pub width: u32,
    pub height: u32,
}

impl ExtractedImage {
    pub fn file_name_for(page: usize, index: usize) -> String {
        format!("page_{page}_img_{index}.png")
    }
}

/// Everything pulled out of the PDF.
///
/// Owns the temporary directory holding the extracted PNGs; dropping the
/// value deletes them.
#[derive(Debug)]
pub struct ExtractedContent {
    pub metadata: DocumentMetadata,
    pub pages: Vec<ExtractedPage>,
    pub images: Vec<ExtractedImage>,
    _image_dir: TempDir,
}

impl ExtractedContent {
    pub fn new(
        metadata: DocumentMetadata,
        pages: Vec<ExtractedPage>,
        images: Vec<ExtractedImage>,
        image_dir: TempDir,
    ) -> Self {
        Self {
            metadata,
            pages,
            images,
            _image_dir: image_dir,
        }
    }

    pub fn image(&self, filename: &str) -> Option<&ExtractedImage> {
        self.images.iter().find(|i| i.filename == filename)
    }

    pub fn page(&self, page_num: usize) -> Option<&ExtractedPage> {
        self.pages.iter().find(|p| p.page_num == page_num)
    }

    /// Title of the slide built from `page_num`, or `Slide N`.
    pub fn slide_title(&self, page_num: usize) -> String {
        self.page(page_num)
            .and_then(|p| p.title.clone())
            .unwrap_or_else(|| format!("Slide {page_num}"))
    }
}

/// What the image analysis step asked for, verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImageAction {
    ConvertToLatex,
    KeepAsImage,
    Remove,
}

/// How an image ends up in the presentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageResolution {
    /// Replaced by a LaTeX fragment (table, equation, diagram).
    Latex { content: String },
    /// Included as `images/<filename>`.
    Image,
    /// Dropped as decorative.
    Removed,
}

/// Final decision for one extracted image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageOutcome {
    pub filename: String,
    pub page: usize,
    pub resolution: ImageResolution,
    /// The model's explanation, when it gave one.
    pub reasoning: Option<String>,
    /// e.g. `table`, `chart`, `equation`.
    pub image_type: Option<String>,
    /// Set when the original image was kept because conversion failed.
    pub fallback: Option<ImageFallback>,
}

impl ImageOutcome {
    /// Outcome for an image kept because the model could not handle it.
    pub fn fallback(image: &ExtractedImage, reason: ImageFallback) -> Self {
        Self {
            filename: image.filename.clone(),
            page: image.page,
            resolution: ImageResolution::Image,
            reasoning: None,
            image_type: None,
            fallback: Some(reason),
        }
    }

    pub fn keeps_image(&self) -> bool {
        matches!(self.resolution, ImageResolution::Image)
    }

    pub fn latex(&self) -> Option<&str> {
        match &self.resolution {
            ImageResolution::Latex { content } => Some(content),
            _ => None,
        }
    }
}

/// Where the final presentation body came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodySource {
    /// The placement model call, after post-processing.
    Model,
    /// The deterministic body built from extracted content.
    Fallback,
}

/// Aggregate statistics for a conversion run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionStats {
    pub total_pages: usize,
    pub processed_pages: usize,
    pub images_extracted: usize,
    pub images_converted: usize,
    pub images_kept: usize,
    pub images_removed: usize,
    pub image_fallbacks: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    /// Number of compile attempts (1, or 2 when the model body failed).
    pub compile_attempts: u32,
    pub extract_duration_ms: u64,
    pub llm_duration_ms: u64,
    pub compile_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Result of a successful conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// Where the final PDF is.
    pub pdf_path: PathBuf,
    /// The generated source, when it was built in a persistent directory.
    pub tex_path: Option<PathBuf>,
    /// Presentation body between the title frame and `\end{document}`.
    pub body: String,
    pub body_source: BodySource,
    pub metadata: DocumentMetadata,
    pub images: Vec<ImageOutcome>,
    /// Warnings (and, after a retry, the errors of the first attempt).
    pub diagnostics: Vec<LatexDiagnostic>,
    pub stats: ConversionStats,
}
