//! End-to-end integration tests for pdf2beamer.
//!
//! These tests use real PDF files in `./test_cases/`, make live LLM API
//! calls and run the real `pdflatex`. They are gated behind the
//! `E2E_ENABLED` environment variable so they do not run in CI unless
//! explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 GEMINI_API_KEY=... cargo test --test e2e -- --nocapture
//!
//! To restrict to a specific test:
//!   E2E_ENABLED=1 cargo test --test e2e test_inspect -- --nocapture

use pdf2beamer::{
    convert, inspect, BodySource, ConversionConfig, ConversionOutput, ConversionProgressCallback,
    Pdf2BeamerError, Stage,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

fn output_dir(name: &str) -> PathBuf {
    let d = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("test_cases/output")
        .join(name);
    std::fs::create_dir_all(&d).ok();
    d
}

/// Skip this test if E2E_ENABLED is not set *or* no PDF file at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP: test file not found: {}", p.display());
            return;
        }
        p
    }};
}

/// Assert the generated source is a sane Beamer document.
fn assert_presentation_quality(output: &ConversionOutput, context: &str) {
    assert!(
        output.pdf_path.exists(),
        "[{context}] PDF missing at {}",
        output.pdf_path.display()
    );
    let bytes = std::fs::read(&output.pdf_path).unwrap();
    assert!(bytes.starts_with(b"%PDF"), "[{context}] output is not a PDF");

    assert!(
        output.body.contains("\\begin{frame}"),
        "[{context}] body has no frames"
    );
    assert!(
        !output.body.contains("\\begin{document}"),
        "[{context}] body must not contain document commands"
    );
    assert!(
        !output.body.contains("```"),
        "[{context}] body still contains code fences"
    );

    if let Some(ref tex) = output.tex_path {
        let source = std::fs::read_to_string(tex).unwrap();
        assert_eq!(source.matches("\\begin{document}").count(), 1, "[{context}]");
        assert_eq!(source.matches("\\end{document}").count(), 1, "[{context}]");
        let dir = tex.parent().unwrap();
        for name in pdf2beamer::pipeline::postprocess::referenced_images(&source) {
            assert!(
                dir.join("images").join(&name).exists(),
                "[{context}] {name} referenced but not copied"
            );
        }
    }

    println!(
        "[{context}] ✓  {} frames, body from {:?}, {} fallbacks",
        output.body.matches("\\begin{frame}").count(),
        output.body_source,
        output.stats.image_fallbacks
    );
}

#[derive(Default)]
struct StageRecorder {
    started: Mutex<Vec<Stage>>,
    completed: Mutex<Option<PathBuf>>,
}

impl ConversionProgressCallback for StageRecorder {
    fn on_stage_start(&self, stage: Stage) {
        self.started.lock().unwrap().push(stage);
    }

    fn on_conversion_complete(&self, pdf_path: &Path) {
        *self.completed.lock().unwrap() = Some(pdf_path.to_path_buf());
    }
}

// ── Inspect tests (no LLM, instant) ──────────────────────────────────────────

#[tokio::test]
async fn test_inspect_arxiv_paper() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("attention_is_all_you_need.pdf"));

    let meta = inspect(path.to_str().unwrap(), None)
        .await
        .expect("inspect() should succeed");

    assert_eq!(meta.page_count, 15, "Attention paper should have 15 pages");
    assert!(!meta.pdf_version.is_empty());

    println!("Metadata: {:?}", meta);
}

#[tokio::test]
async fn test_inspect_nonexistent() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP");
        return;
    }

    let result = inspect("/definitely/not/a/real/file.pdf", None).await;
    assert!(matches!(result, Err(Pdf2BeamerError::FileNotFound { .. })));
}

// ── Conversion tests (need LLM API and pdflatex) ─────────────────────────────

/// Convert the first pages of the Attention paper into a persistent build dir.
#[tokio::test]
async fn test_convert_arxiv_first_pages() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("attention_is_all_you_need.pdf"));
    let out = output_dir("arxiv");
    let recorder = Arc::new(StageRecorder::default());

    let config = ConversionConfig::builder()
        .max_pages(3)
        .output_dir(&out)
        .title("Attention Is All You Need")
        .progress_callback(recorder.clone() as Arc<dyn ConversionProgressCallback>)
        .build()
        .expect("valid config");

    let result = convert(path.to_str().unwrap(), &config)
        .await
        .expect("conversion should succeed");

    assert_eq!(result.stats.processed_pages, 3);
    assert!(result.stats.total_input_tokens > 0, "Should have consumed tokens");
    assert_eq!(result.pdf_path, out.join("presentation.pdf"));
    assert_eq!(result.tex_path, Some(out.join("presentation.tex")));
    assert!(!out.join("presentation.aux").exists(), "aux files are cleaned");
    assert_presentation_quality(&result, "arxiv");

    let started = recorder.started.lock().unwrap().clone();
    assert_eq!(&started[..3], &[Stage::Extract, Stage::Analyze, Stage::Place]);
    assert_eq!(
        recorder.completed.lock().unwrap().as_deref(),
        Some(result.pdf_path.as_path())
    );

    if result.body_source == BodySource::Fallback {
        println!("[arxiv] model body was not used");
    }
    println!(
        "[arxiv] Tokens: {} in / {} out",
        result.stats.total_input_tokens, result.stats.total_output_tokens
    );
}

/// Without an output dir the PDF is copied to the requested file only.
#[tokio::test]
async fn test_convert_to_output_pdf() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("neuroscience_textbook.pdf"));
    let target = output_dir("single").join("neuro.pdf");
    std::fs::remove_file(&target).ok();

    let config = ConversionConfig::builder()
        .max_pages(2)
        .output_pdf(&target)
        .build()
        .expect("valid config");

    let result = convert(path.to_str().unwrap(), &config)
        .await
        .expect("conversion should succeed");

    assert_eq!(result.pdf_path, target);
    assert!(result.tex_path.is_none());
    assert_presentation_quality(&result, "neuroscience");

    let json = serde_json::to_string_pretty(&result).expect("ConversionOutput must serialise");
    let back: ConversionOutput = serde_json::from_str(&json).expect("JSON must deserialise");
    assert_eq!(back.stats.processed_pages, result.stats.processed_pages);
}

/// A missing compiler is reported before any model call is made.
#[tokio::test]
async fn test_missing_compiler_is_fatal() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("neuroscience_textbook.pdf"));

    let config = ConversionConfig::builder()
        .compiler("not-a-latex-compiler")
        .build()
        .expect("valid config");

    let err = convert(path.to_str().unwrap(), &config).await.unwrap_err();
    assert!(matches!(err, Pdf2BeamerError::CompilerNotFound { .. }), "got {err:?}");
}
