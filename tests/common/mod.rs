//! Fixtures shared by the offline integration tests.

#![allow(dead_code)]

use pdf2beamer::output::{DocumentMetadata, ExtractedImage, ExtractedPage};
use pdf2beamer::{ConversionConfig, ExtractedContent};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Writes `<stem>.pdf` unless the source contains `BROKEN`; sleeps when it
/// contains `SLOW`. Always leaves a `.log` behind.
pub const FAKE_PDFLATEX: &str = r#"#!/bin/sh
if [ "$1" = "--version" ]; then
  echo "pdfTeX 3.141592653 (fake)"
  exit 0
fi
for last; do :; done
stem="${last%.tex}"
if grep -q 'SLOW' "$last"; then
  sleep 5
fi
if grep -q 'BROKEN' "$last"; then
  printf '! Undefined control sequence.\nl.12 \\BROKEN\n' > "$stem.log"
  echo "! Undefined control sequence."
  exit 1
fi
printf 'LaTeX Warning: Citation `x'"'"' undefined on input line 3.\n' > "$stem.log"
echo aux > "$stem.aux"
echo nav > "$stem.nav"
echo '%PDF-1.5 fake' > "$stem.pdf"
exit 0
"#;

pub struct Fixture {
    pub bin: TempDir,
    pub compiler: PathBuf,
}

/// Install the fake compiler as `pdflatex` inside `bin`.
pub fn install_compiler(bin: TempDir) -> Fixture {
    let compiler = bin.path().join("pdflatex");
    std::fs::write(&compiler, FAKE_PDFLATEX).unwrap();
    std::fs::set_permissions(&compiler, std::fs::Permissions::from_mode(0o755)).unwrap();
    Fixture { bin, compiler }
}

pub fn fake_compiler() -> Fixture {
    install_compiler(tempfile::tempdir().unwrap())
}

pub fn config(compiler: &Path) -> ConversionConfig {
    ConversionConfig::builder()
        .compiler(compiler.to_string_lossy())
        .compile_passes(2)
        .compile_timeout_secs(10)
        .build()
        .unwrap()
}

/// Two pages, one 640x480 image on each.
pub fn content() -> ExtractedContent {
    content_with_text("Revenue grew 12% in 2023")
}

/// Like [`content`], with `body` as the text below the first page heading.
pub fn content_with_text(body: &str) -> ExtractedContent {
    let images = tempfile::tempdir().unwrap();
    let mut extracted = Vec::new();
    for page in [1, 2] {
        let filename = ExtractedImage::file_name_for(page, 0);
        let path = images.path().join(&filename);
        std::fs::write(&path, b"\x89PNG fake").unwrap();
        extracted.push(ExtractedImage {
            filename,
            path,
            page,
            width: 640,
            height: 480,
        });
    }
    ExtractedContent::new(
        DocumentMetadata {
            title: Some("Annual Report".into()),
            page_count: 2,
            ..Default::default()
        },
        vec![
            ExtractedPage {
                page_num: 1,
                title: Some("Overview".into()),
                headings: vec!["Overview".into()],
                text: format!("Overview\n{body}"),
                markdown: format!("# Overview\n{body}"),
            },
            ExtractedPage {
                page_num: 2,
                title: Some("Outlook".into()),
                headings: vec!["Outlook".into()],
                text: "Outlook\n• Expand to new markets\n• Hire 20 engineers".into(),
                markdown: "# Outlook\n• Expand to new markets\n• Hire 20 engineers".into(),
            },
        ],
        extracted,
        images,
    )
}
