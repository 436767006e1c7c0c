//! Offline tests of the conversion orchestrator: model stages, build
//! directory, output placement and the behaviour when model calls fail.
//!
//! Content is built in memory, so no pdfium library is needed; the model is
//! a mock or a provider that always errors, and the compiler is the fake
//! `pdflatex` from `common`.
//!
//! Run with:
//!   cargo test --test convert

#![cfg(unix)]

mod common;

use async_trait::async_trait;
use common::{content, content_with_text, fake_compiler};
use edgequake_llm::{
    ChatMessage, CompletionOptions, LLMProvider, LLMResponse, LlmError, MockProvider,
};
use pdf2beamer::pipeline::basic;
use pdf2beamer::{
    convert_extracted, BodySource, ConversionConfig, ConversionConfigBuilder, ImageFallback,
    ImageResolution, Pdf2BeamerError,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// A provider whose every call fails, counting the attempts.
#[derive(Default)]
struct UnavailableProvider {
    calls: AtomicUsize,
}

impl UnavailableProvider {
    fn fail(&self) -> edgequake_llm::Result<LLMResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(LlmError::ApiError("503 service unavailable".into()))
    }
}

#[async_trait]
impl LLMProvider for UnavailableProvider {
    fn name(&self) -> &str {
        "unavailable"
    }

    fn model(&self) -> &str {
        "unavailable-model"
    }

    fn max_context_length(&self) -> usize {
        8192
    }

    async fn complete(&self, _prompt: &str) -> edgequake_llm::Result<LLMResponse> {
        self.fail()
    }

    async fn complete_with_options(
        &self,
        _prompt: &str,
        _options: &CompletionOptions,
    ) -> edgequake_llm::Result<LLMResponse> {
        self.fail()
    }

    async fn chat(
        &self,
        _messages: &[ChatMessage],
        _options: Option<&CompletionOptions>,
    ) -> edgequake_llm::Result<LLMResponse> {
        self.fail()
    }
}

fn with_provider(compiler: &Path, provider: Arc<dyn LLMProvider>) -> ConversionConfigBuilder {
    ConversionConfig::builder()
        .compiler(compiler.to_string_lossy())
        .compile_passes(1)
        .compile_timeout_secs(10)
        .provider(provider)
}

const ANALYSIS_REPLY: &str = r#"{
  "image_decisions": {
    "page_1_img_0.png": {"action": "KEEP_AS_IMAGE", "reasoning": "bar chart", "image_type": "chart"},
    "page_2_img_0.png": {"action": "REMOVE", "reasoning": "logo"}
  }
}"#;

const PLACEMENT_REPLY: &str = "```latex
\\begin{frame}{Overview}
Revenue grew 12\\% in 2023
\\end{frame}
\\begin{frame}{Revenue chart}
\\centering
\\includegraphics[width=0.7\\textwidth]{images/page_1_img_0.png}
\\end{frame}
\\begin{frame}{Outlook}
\\begin{itemize}
\\item Expand to new markets
\\end{itemize}
\\end{frame}
```";

// ── Model body ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn model_replies_drive_a_persistent_build() {
    let fx = fake_compiler();
    let out = tempfile::tempdir().unwrap();
    let mock = MockProvider::new();
    mock.add_response(ANALYSIS_REPLY).await;
    mock.add_response(PLACEMENT_REPLY).await;

    let config = with_provider(&fx.compiler, Arc::new(mock))
        .output_dir(out.path())
        .build()
        .unwrap();
    let content = content();

    let output = convert_extracted(&content, "report", &config).await.unwrap();

    assert_eq!(output.body_source, BodySource::Model);
    assert!(!output.body.contains("```"));
    assert_eq!(output.pdf_path, out.path().join("presentation.pdf"));
    assert_eq!(output.tex_path, Some(out.path().join("presentation.tex")));
    assert!(output.pdf_path.exists());
    assert!(!out.path().join("presentation.aux").exists(), "aux files are cleaned");
    assert!(out.path().join("images/page_1_img_0.png").exists());
    assert!(!out.path().join("images/page_2_img_0.png").exists());

    assert_eq!(output.images[0].resolution, ImageResolution::Image);
    assert!(output.images[0].fallback.is_none());
    assert_eq!(output.images[1].resolution, ImageResolution::Removed);
    assert_eq!(output.stats.images_kept, 1);
    assert_eq!(output.stats.images_removed, 1);
    assert_eq!(output.stats.image_fallbacks, 0);
    assert_eq!(output.stats.compile_attempts, 1);
    assert_eq!(output.stats.processed_pages, 2);
}

#[tokio::test]
async fn unusable_replies_keep_images_and_use_deterministic_body() {
    let fx = fake_compiler();
    let out = tempfile::tempdir().unwrap();
    // The mock answers "Mock response" once its queue is empty: no JSON for
    // the analysis, no frames for the placement.
    let config = with_provider(&fx.compiler, Arc::new(MockProvider::new()))
        .output_dir(out.path())
        .build()
        .unwrap();
    let content = content();

    let output = convert_extracted(&content, "report", &config).await.unwrap();

    assert_eq!(output.body_source, BodySource::Fallback);
    assert!(output
        .images
        .iter()
        .all(|o| o.keeps_image() && o.fallback == Some(ImageFallback::NoDecision)));
    assert_eq!(output.body, basic::fallback_body(&content, &output.images));
}

// ── Failed model calls ───────────────────────────────────────────────────────

#[tokio::test]
async fn failed_model_calls_fall_back_and_copy_to_output_pdf() {
    let fx = fake_compiler();
    let dest = tempfile::tempdir().unwrap();
    let target = dest.path().join("decks/q3.pdf");
    let provider = Arc::new(UnavailableProvider::default());

    let config = with_provider(&fx.compiler, provider.clone())
        .output_pdf(&target)
        .build()
        .unwrap();
    let content = content();

    let output = convert_extracted(&content, "report", &config).await.unwrap();

    // One analysis call and one placement call, no retries.
    assert_eq!(provider.calls.load(Ordering::SeqCst), 2);

    assert_eq!(output.images.len(), 2);
    for outcome in &output.images {
        assert!(outcome.keeps_image(), "{} must stay an image", outcome.filename);
        assert!(
            matches!(outcome.fallback, Some(ImageFallback::AnalysisUnavailable { .. })),
            "got {:?}",
            outcome.fallback
        );
    }
    assert_eq!(output.stats.image_fallbacks, 2);

    assert_eq!(output.body_source, BodySource::Fallback);
    assert_eq!(output.body, basic::fallback_body(&content, &output.images));
    assert!(output.body.contains("images/page_1_img_0.png"));
    assert!(output.body.contains("images/page_2_img_0.png"));

    // Temporary build directory: only the copied PDF is reported.
    assert_eq!(output.pdf_path, target);
    assert!(target.exists());
    assert!(output.tex_path.is_none());
    assert_eq!(output.stats.total_input_tokens, 0);
}

#[tokio::test]
async fn default_output_lands_next_to_caller() {
    let fx = fake_compiler();
    let config = with_provider(&fx.compiler, Arc::new(UnavailableProvider::default()))
        .build()
        .unwrap();
    let stem = format!("convert-default-output-{}", std::process::id());
    let expected = PathBuf::from(format!("{stem}-slides.pdf"));
    std::fs::remove_file(&expected).ok();

    let output = convert_extracted(&content(), &stem, &config).await;
    let exists = expected.exists();
    std::fs::remove_file(&expected).ok();

    let output = output.unwrap();
    assert_eq!(output.pdf_path, expected);
    assert!(exists, "{} was not written", expected.display());
}

#[tokio::test]
async fn failed_compile_keeps_temporary_source() {
    let fx = fake_compiler();
    let config = with_provider(&fx.compiler, Arc::new(UnavailableProvider::default()))
        .build()
        .unwrap();
    // The deterministic body carries the page text, so it fails to compile too.
    let content = content_with_text("BROKEN figures");

    let err = convert_extracted(&content, "report", &config).await.unwrap_err();

    let Pdf2BeamerError::CompilationFailed { tex, diagnostics, .. } = err else {
        panic!("expected CompilationFailed, got {err:?}");
    };
    assert_eq!(diagnostics[0].line, Some(12));
    assert!(tex.exists(), "{} was deleted", tex.display());
    let source = std::fs::read_to_string(&tex).unwrap();
    assert!(source.contains("BROKEN figures"));

    if let Some(dir) = tex.parent() {
        std::fs::remove_dir_all(dir).ok();
    }
}

#[tokio::test]
async fn missing_compiler_is_reported_before_any_model_call() {
    let provider = Arc::new(UnavailableProvider::default());
    let config = ConversionConfig::builder()
        .compiler("definitely-not-a-tex-compiler-xyz")
        .provider(provider.clone())
        .build()
        .unwrap();

    let err = convert_extracted(&content(), "report", &config).await.unwrap_err();
    assert!(matches!(err, Pdf2BeamerError::CompilerNotFound { .. }), "got {err:?}");
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
}
