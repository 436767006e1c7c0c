//! Assemble the compilable Beamer document on disk.
//!
//! Layout of the build directory:
//!
//! ```text
//! dir/
//! ├── presentation.tex
//! ├── images/          kept images, referenced as images/<name>
//! └── *.sty, *.png     theme files, when a theme directory is configured
//! ```

use crate::config::ConversionConfig;
use crate::error::Pdf2BeamerError;
use crate::output::{ExtractedContent, ImageOutcome};
use crate::pipeline::basic::escape_latex;
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Packages loaded by every presentation, in order.
pub const PREAMBLE_PACKAGES: &[&str] = &[
    "\\usepackage[english]{babel}",
    "\\usepackage{booktabs}",
    "\\usepackage{listings}",
    "\\usepackage[T1]{fontenc}",
    "\\usepackage[utf8]{inputenc}",
    "\\usepackage{graphicx}",
    "\\usepackage{caption}",
    "\\usepackage{amsmath}",
    "\\usepackage{amssymb}",
];

/// Theme file extensions copied from [`crate::config::BeamerTheme::dir`].
const THEME_EXTENSIONS: &[&str] = &["sty", "png", "jpg", "jpeg", "pdf"];

/// Title block values after falling back to document metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleBlock {
    pub title: String,
    pub subtitle: Option<String>,
    pub author: Option<String>,
}

impl TitleBlock {
    /// Configured title, else the PDF title, else the first slide title.
    pub fn resolve(config: &ConversionConfig, content: &ExtractedContent) -> Self {
        let non_empty = |s: &Option<String>| s.as_ref().map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

        let title = non_empty(&config.title)
            .or_else(|| non_empty(&content.metadata.title))
            .or_else(|| content.pages.iter().find_map(|p| non_empty(&p.title)))
            .unwrap_or_else(|| "Presentation".to_string());

        Self {
            title,
            subtitle: non_empty(&config.subtitle),
            author: non_empty(&config.author).or_else(|| non_empty(&content.metadata.author)),
        }
    }
}

/// Write `dir/<tex_filename>` and copy every file it references.
pub fn generate_document(
    body: &str,
    content: &ExtractedContent,
    outcomes: &[ImageOutcome],
    config: &ConversionConfig,
    dir: &Path,
) -> Result<PathBuf, Pdf2BeamerError> {
    let write_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: io::Error| Pdf2BeamerError::OutputWriteFailed { path, source }
    };

    let images_dir = dir.join("images");
    fs::create_dir_all(&images_dir).map_err(write_err(&images_dir))?;

    let mut copied = 0;
    for outcome in outcomes.iter().filter(|o| o.keeps_image()) {
        let Some(image) = content.image(&outcome.filename) else {
            warn!("Kept image {} was not extracted; skipping", outcome.filename);
            continue;
        };
        let dest = images_dir.join(&image.filename);
        fs::copy(&image.path, &dest).map_err(write_err(&dest))?;
        copied += 1;
    }
    debug!("Copied {} images into {}", copied, images_dir.display());

    if let Some(theme_dir) = &config.theme.dir {
        copy_theme_files(theme_dir, dir)?;
    }

    let title = TitleBlock::resolve(config, content);
    let source = render_document(body, &config.theme.name, &title);

    let tex_path = dir.join(&config.tex_filename);
    fs::write(&tex_path, source).map_err(write_err(&tex_path))?;
    info!("Wrote {}", tex_path.display());
    Ok(tex_path)
}

/// The complete document text around `body`.
pub fn render_document(body: &str, theme: &str, title: &TitleBlock) -> String {
    let mut doc = String::with_capacity(body.len() + 1024);
    doc.push_str("\\documentclass[aspectratio=169]{beamer}\n");
    for pkg in PREAMBLE_PACKAGES {
        doc.push_str(pkg);
        doc.push('\n');
    }
    let _ = writeln!(doc, "\\usetheme{{{}}}", theme);
    doc.push('\n');

    let _ = writeln!(doc, "\\title{{{}}}", escape_latex(&title.title));
    if let Some(subtitle) = &title.subtitle {
        let _ = writeln!(doc, "\\subtitle{{{}}}", escape_latex(subtitle));
    }
    if let Some(author) = &title.author {
        let _ = writeln!(doc, "\\author{{{}}}", escape_latex(author));
    }
    doc.push_str("\\date{\\today}\n\n");

    doc.push_str("\\begin{document}\n\n");
    doc.push_str("\\begin{frame}\n\\titlepage\n\\end{frame}\n\n");
    doc.push_str(body.trim());
    doc.push_str("\n\n\\end{document}\n");
    doc
}

fn copy_theme_files(theme_dir: &Path, dir: &Path) -> Result<(), Pdf2BeamerError> {
    let entries = fs::read_dir(theme_dir).map_err(|e| {
        Pdf2BeamerError::InvalidConfig(format!(
            "theme directory {} is not readable: {e}",
            theme_dir.display()
        ))
    })?;

    for entry in entries.flatten() {
        let path = entry.path();
        let wanted = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| THEME_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
        if !wanted || !path.is_file() {
            continue;
        }
        let dest = dir.join(entry.file_name());
        fs::copy(&path, &dest).map_err(|source| Pdf2BeamerError::OutputWriteFailed {
            path: dest.clone(),
            source,
        })?;
        debug!("Copied theme file {}", dest.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BeamerTheme;
    use crate::output::{DocumentMetadata, ExtractedImage, ExtractedPage, ImageResolution};

    fn content_with_image() -> ExtractedContent {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("page_1_img_0.png");
        fs::write(&path, b"png").unwrap();
        let image = ExtractedImage {
            filename: "page_1_img_0.png".into(),
            path,
            page: 1,
            width: 400,
            height: 300,
        };
        ExtractedContent::new(
            DocumentMetadata {
                author: Some("Ada Lovelace".into()),
                ..Default::default()
            },
            vec![ExtractedPage {
                page_num: 1,
                title: Some("Engines & Looms".into()),
                ..Default::default()
            }],
            vec![image],
            tmp,
        )
    }

    fn kept(filename: &str) -> ImageOutcome {
        ImageOutcome {
            filename: filename.into(),
            page: 1,
            resolution: ImageResolution::Image,
            reasoning: None,
            image_type: None,
            fallback: None,
        }
    }

    #[test]
    fn title_falls_back_through_metadata_and_slides() {
        let content = content_with_image();
        let title = TitleBlock::resolve(&ConversionConfig::default(), &content);
        assert_eq!(title.title, "Engines & Looms");
        assert_eq!(title.author.as_deref(), Some("Ada Lovelace"));

        let config = ConversionConfig::builder().title("Override").build().unwrap();
        assert_eq!(TitleBlock::resolve(&config, &content).title, "Override");
    }

    #[test]
    fn document_has_one_body_and_title_frame() {
        let title = TitleBlock {
            title: "R&D".into(),
            subtitle: Some("Q3".into()),
            author: None,
        };
        let doc = render_document("\\begin{frame}{A}\nx\n\\end{frame}", "Madrid", &title);
        assert!(doc.starts_with("\\documentclass[aspectratio=169]{beamer}\n"));
        assert_eq!(doc.matches("\\begin{document}").count(), 1);
        assert_eq!(doc.matches("\\end{document}").count(), 1);
        assert!(doc.contains("\\usetheme{Madrid}"));
        assert!(doc.contains("\\title{R\\&D}"));
        assert!(doc.contains("\\subtitle{Q3}"));
        assert!(!doc.contains("\\author"));
        assert!(doc.contains("\\titlepage"));
    }

    #[test]
    fn writes_tex_and_copies_kept_images() {
        let content = content_with_image();
        let out = tempfile::tempdir().unwrap();
        let body = "\\begin{frame}{A}\n\\includegraphics{images/page_1_img_0.png}\n\\end{frame}\n";
        let tex = generate_document(
            body,
            &content,
            &[kept("page_1_img_0.png"), kept("page_9_img_0.png")],
            &ConversionConfig::default(),
            out.path(),
        )
        .unwrap();

        assert_eq!(tex, out.path().join("presentation.tex"));
        assert!(out.path().join("images/page_1_img_0.png").exists());
        assert!(!out.path().join("images/page_9_img_0.png").exists());
        let source = fs::read_to_string(tex).unwrap();
        assert!(source.contains("images/page_1_img_0.png"));
    }

    #[test]
    fn theme_files_are_copied() {
        let theme = tempfile::tempdir().unwrap();
        fs::write(theme.path().join("beamerthemeAcme.sty"), "% theme").unwrap();
        fs::write(theme.path().join("logo.png"), "png").unwrap();
        fs::write(theme.path().join("notes.txt"), "skip").unwrap();

        let config = ConversionConfig::builder()
            .theme(BeamerTheme::named("Acme").with_dir(theme.path()))
            .build()
            .unwrap();
        let out = tempfile::tempdir().unwrap();
        generate_document("", &content_with_image(), &[], &config, out.path()).unwrap();

        assert!(out.path().join("beamerthemeAcme.sty").exists());
        assert!(out.path().join("logo.png").exists());
        assert!(!out.path().join("notes.txt").exists());
        let source = fs::read_to_string(out.path().join("presentation.tex")).unwrap();
        assert!(source.contains("\\usetheme{Acme}"));
    }
}
