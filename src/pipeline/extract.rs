//! PDF extraction: pull text, headings and embedded images out via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and blocks while it parses. The work runs on tokio's blocking pool
//! so async worker threads never stall on it.
//!
//! ## Headings
//!
//! pdfium exposes text as positioned objects with a font size but no
//! semantic role. A run of text whose scaled size is at least
//! [`HEADING_RATIO`] times the page median is treated as a heading; the
//! largest heading becomes the slide title.

use crate::config::{ConversionConfig, ImageFilter};
use crate::error::Pdf2BeamerError;
use crate::output::{DocumentMetadata, ExtractedContent, ExtractedImage, ExtractedPage};
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Font size multiple of the page median that marks a heading.
pub const HEADING_RATIO: f32 = 1.3;

/// A contiguous run of text objects sharing one font size.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub font_size: f32,
}

/// Bind to a pdfium library: `PDFIUM_LIB_PATH`, then `./`, then the system.
pub fn bind_pdfium() -> Result<Pdfium, Pdf2BeamerError> {
    let from_env = std::env::var("PDFIUM_LIB_PATH")
        .ok()
        .filter(|p| !p.is_empty())
        .map(PathBuf::from);

    let bindings = match from_env {
        Some(path) => {
            let lib = if path.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&path)
            } else {
                path
            };
            debug!("Binding pdfium from PDFIUM_LIB_PATH: {}", lib.display());
            Pdfium::bind_to_library(lib)
        }
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| Pdf2BeamerError::PdfiumBindingFailed(format!("{e:?}")))?;

    Ok(Pdfium::new(bindings))
}

/// Extract text and images from the first `config.max_pages` pages.
pub async fn extract_content(
    pdf_path: &Path,
    config: &ConversionConfig,
) -> Result<ExtractedContent, Pdf2BeamerError> {
    let path = pdf_path.to_path_buf();
    let password = config.password.clone();
    let max_pages = config.max_pages;
    let filter = config.image_filter;

    tokio::task::spawn_blocking(move || {
        extract_content_blocking(&path, password.as_deref(), max_pages, filter)
    })
    .await
    .map_err(|e| Pdf2BeamerError::Internal(format!("Extraction task panicked: {e}")))?
}

/// Read document metadata only.
pub async fn extract_metadata(
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<DocumentMetadata, Pdf2BeamerError> {
    let path = pdf_path.to_path_buf();
    let pwd = password.map(str::to_string);

    tokio::task::spawn_blocking(move || {
        let pdfium = bind_pdfium()?;
        let document = open_document(&pdfium, &path, pwd.as_deref())?;
        Ok(read_metadata(&document))
    })
    .await
    .map_err(|e| Pdf2BeamerError::Internal(format!("Metadata task panicked: {e}")))?
}

fn open_document<'a>(
    pdfium: &'a Pdfium,
    pdf_path: &Path,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, Pdf2BeamerError> {
    pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
        let detail = format!("{e:?}");
        if detail.to_lowercase().contains("password") {
            if password.is_some() {
                Pdf2BeamerError::WrongPassword {
                    path: pdf_path.to_path_buf(),
                }
            } else {
                Pdf2BeamerError::PasswordRequired {
                    path: pdf_path.to_path_buf(),
                }
            }
        } else {
            Pdf2BeamerError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail,
            }
        }
    })
}

fn read_metadata(document: &PdfDocument<'_>) -> DocumentMetadata {
    let metadata = document.metadata();
    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata
            .get(tag)
            .map(|t| t.value().trim().to_string())
            .filter(|v| !v.is_empty())
    };

    DocumentMetadata {
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
        subject: get_meta(PdfDocumentMetadataTagType::Subject),
        creator: get_meta(PdfDocumentMetadataTagType::Creator),
        producer: get_meta(PdfDocumentMetadataTagType::Producer),
        page_count: document.pages().len() as usize,
        pdf_version: format!("{:?}", document.version()),
    }
}

fn extract_content_blocking(
    pdf_path: &Path,
    password: Option<&str>,
    max_pages: Option<usize>,
    filter: ImageFilter,
) -> Result<ExtractedContent, Pdf2BeamerError> {
    let pdfium = bind_pdfium()?;
    let document = open_document(&pdfium, pdf_path, password)?;
    let metadata = read_metadata(&document);

    let page_limit = max_pages
        .map(|n| n.min(metadata.page_count))
        .unwrap_or(metadata.page_count);
    if page_limit == 0 {
        return Err(Pdf2BeamerError::NoPages {
            path: pdf_path.to_path_buf(),
        });
    }
    info!(
        "PDF loaded: {} pages, extracting {}",
        metadata.page_count, page_limit
    );

    let image_dir = TempDir::new().map_err(|e| Pdf2BeamerError::Internal(e.to_string()))?;
    let pages = document.pages();
    let mut extracted_pages = Vec::with_capacity(page_limit);
    let mut images = Vec::new();

    for idx in 0..page_limit {
        let page_num = idx + 1;
        let page = pages
            .get(idx as u16)
            .map_err(|e| Pdf2BeamerError::ExtractionFailed {
                page: page_num,
                detail: format!("{e:?}"),
            })?;

        let text = page
            .text()
            .map(|t| t.all())
            .map_err(|e| Pdf2BeamerError::ExtractionFailed {
                page: page_num,
                detail: format!("{e:?}"),
            })?;

        let mut fragments = Vec::new();
        let mut image_index = 0usize;
        for object in page.objects().iter() {
            if let Some(text_obj) = object.as_text_object() {
                fragments.push(TextRun {
                    text: text_obj.text(),
                    font_size: text_obj.scaled_font_size().value,
                });
            } else if let Some(image_obj) = object.as_image_object() {
                let index = image_index;
                image_index += 1;
                match image_obj.get_raw_image() {
                    Ok(raster) => {
                        if let Some(img) =
                            save_image(&raster, image_dir.path(), page_num, index, &filter)
                        {
                            images.push(img);
                        }
                    }
                    Err(e) => warn!("Page {}: image {} unreadable: {:?}", page_num, index, e),
                }
            }
        }

        let page = build_page(page_num, &text, &merge_runs(fragments));
        debug!(
            "Page {}: {} chars, {} headings, title {:?}",
            page_num,
            page.text.len(),
            page.headings.len(),
            page.title
        );
        extracted_pages.push(page);
    }

    info!(
        "Extracted {} pages and {} images",
        extracted_pages.len(),
        images.len()
    );
    Ok(ExtractedContent::new(
        metadata,
        extracted_pages,
        images,
        image_dir,
    ))
}

/// Write an accepted image as PNG; `None` when filtered out or unwritable.
fn save_image(
    raster: &image::DynamicImage,
    dir: &Path,
    page: usize,
    index: usize,
    filter: &ImageFilter,
) -> Option<ExtractedImage> {
    let (width, height) = (raster.width(), raster.height());
    if !filter.accepts(width, height) {
        debug!(
            "Page {}: image {} ({}x{}) filtered out",
            page, index, width, height
        );
        return None;
    }

    let filename = ExtractedImage::file_name_for(page, index);
    let path = dir.join(&filename);
    if let Err(e) = raster.save_with_format(&path, image::ImageFormat::Png) {
        warn!("Page {}: could not save {}: {}", page, filename, e);
        return None;
    }

    Some(ExtractedImage {
        filename,
        path,
        page,
        width,
        height,
    })
}

/// Join consecutive text objects of the same size into runs.
///
/// pdfium often yields one object per word or glyph cluster; a heading split
/// across objects must still be recognised as one line.
pub fn merge_runs(fragments: Vec<TextRun>) -> Vec<TextRun> {
    let mut runs: Vec<TextRun> = Vec::new();
    for frag in fragments {
        let text = frag.text.trim();
        if text.is_empty() || frag.font_size <= 0.0 {
            continue;
        }
        match runs.last_mut() {
            Some(last) if (last.font_size - frag.font_size).abs() < 0.5 => {
                last.text.push(' ');
                last.text.push_str(text);
            }
            _ => runs.push(TextRun {
                text: text.to_string(),
                font_size: frag.font_size,
            }),
        }
    }
    runs
}

/// Median font size, weighted by character count.
pub fn median_font_size(runs: &[TextRun]) -> Option<f32> {
    let mut sizes: Vec<(f32, usize)> = runs
        .iter()
        .map(|r| (r.font_size, r.text.chars().count()))
        .collect();
    if sizes.is_empty() {
        return None;
    }
    sizes.sort_by(|a, b| a.0.total_cmp(&b.0));
    let total: usize = sizes.iter().map(|(_, n)| n).sum();
    let mut seen = 0;
    for (size, n) in &sizes {
        seen += n;
        if seen * 2 >= total {
            return Some(*size);
        }
    }
    sizes.last().map(|(s, _)| *s)
}

/// Assemble an [`ExtractedPage`] from pdfium's plain text and its text runs.
pub fn build_page(page_num: usize, text: &str, runs: &[TextRun]) -> ExtractedPage {
    let heading_runs: Vec<&TextRun> = match median_font_size(runs) {
        Some(median) => runs
            .iter()
            .filter(|r| r.font_size >= median * HEADING_RATIO)
            .collect(),
        None => Vec::new(),
    };

    let title = heading_runs
        .iter()
        .fold(None::<&TextRun>, |best, r| match best {
            Some(b) if b.font_size >= r.font_size => Some(b),
            _ => Some(r),
        })
        .map(|r| collapse_ws(&r.text));

    let headings: Vec<String> = heading_runs.iter().map(|r| collapse_ws(&r.text)).collect();

    let mut markdown = String::with_capacity(text.len() + 16);
    for line in text.lines() {
        let trimmed = line.trim();
        if !trimmed.is_empty() && headings.iter().any(|h| collapse_ws(trimmed) == *h) {
            markdown.push_str("# ");
            markdown.push_str(trimmed);
        } else {
            markdown.push_str(line.trim_end());
        }
        markdown.push('\n');
    }

    ExtractedPage {
        page_num,
        title,
        headings,
        text: text.to_string(),
        markdown: markdown.trim_end().to_string(),
    }
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgba, RgbaImage};

    fn run(text: &str, size: f32) -> TextRun {
        TextRun {
            text: text.into(),
            font_size: size,
        }
    }

    #[test]
    fn merge_joins_same_size_fragments() {
        let runs = merge_runs(vec![
            run("Deep", 24.0),
            run("Learning", 24.2),
            run("  ", 11.0),
            run("Body", 11.0),
            run("text", 11.0),
        ]);
        assert_eq!(runs, vec![run("Deep Learning", 24.0), run("Body text", 11.0)]);
    }

    #[test]
    fn median_is_weighted_by_length() {
        let runs = vec![run("A Title", 24.0), run(&"x".repeat(200), 11.0)];
        assert_eq!(median_font_size(&runs), Some(11.0));
        assert_eq!(median_font_size(&[]), None);
    }

    #[test]
    fn headings_and_title() {
        let text = "Results\nOverview of findings\nAccuracy improved by 4%\nNext Steps\n";
        let runs = vec![
            run("Results", 28.0),
            run("Overview of findings", 11.0),
            run("Accuracy improved by 4%", 11.0),
            run("Next Steps", 16.0),
        ];
        let page = build_page(2, text, &runs);
        assert_eq!(page.page_num, 2);
        assert_eq!(page.title.as_deref(), Some("Results"));
        assert_eq!(page.headings, vec!["Results", "Next Steps"]);
        assert_eq!(
            page.markdown,
            "# Results\nOverview of findings\nAccuracy improved by 4%\n# Next Steps"
        );
    }

    #[test]
    fn uniform_text_has_no_title() {
        let runs = vec![run("one", 11.0), run("two", 11.0)];
        let page = build_page(1, "one\ntwo", &runs);
        assert!(page.title.is_none());
        assert!(page.headings.is_empty());
    }

    #[test]
    fn save_image_applies_filter_and_naming() {
        let dir = tempfile::tempdir().unwrap();
        let filter = ImageFilter::default();

        let good = DynamicImage::ImageRgba8(RgbaImage::from_pixel(300, 200, Rgba([9, 9, 9, 255])));
        let saved = save_image(&good, dir.path(), 4, 2, &filter).unwrap();
        assert_eq!(saved.filename, "page_4_img_2.png");
        assert!(saved.path.exists());
        assert_eq!((saved.width, saved.height), (300, 200));

        let icon = DynamicImage::ImageRgba8(RgbaImage::from_pixel(32, 32, Rgba([0, 0, 0, 255])));
        assert!(save_image(&icon, dir.path(), 4, 3, &filter).is_none());
        assert!(!dir.path().join("page_4_img_3.png").exists());
    }
}
