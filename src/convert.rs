//! Conversion entry points.
//!
//! [`convert`] runs the whole pipeline and returns once the final PDF is in
//! place. [`convert_extracted`] starts from content extracted elsewhere. The
//! pieces after the model calls ([`render_presentation`]) are
//! public so that callers holding a body of their own can reuse generation,
//! compilation and the deterministic retry.

use crate::compile::{self, CompileReport, LatexDiagnostic};
use crate::config::{ConversionConfig, DEFAULT_PROVIDER};
use crate::error::Pdf2BeamerError;
use crate::generate;
use crate::output::{
    BodySource, ConversionOutput, ConversionStats, DocumentMetadata, ExtractedContent,
    ImageOutcome, ImageResolution,
};
use crate::pipeline::{analysis, basic, extract, input, llm::ModelClient, placement};
use crate::progress::Stage;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Convert a PDF file or URL into a compiled Beamer presentation.
///
/// # Errors
/// Returns `Err(Pdf2BeamerError)` only for fatal errors:
/// - input not found, not a PDF, or encrypted without a password
/// - compiler missing, or provider not configured
/// - compilation failing for both the model body and the deterministic body
///
/// A failed model call never aborts the run; the affected stage falls back
/// and the output records it (`body_source`, `images[].fallback`).
pub async fn convert(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2BeamerError> {
    let total_start = Instant::now();
    let input_str = input_str.as_ref();
    info!("Starting conversion: {}", input_str);

    // ── Step 1: Resolve input ────────────────────────────────────────────
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    let pdf_path = resolved.path().to_path_buf();

    // ── Step 2–3: Compiler and provider ──────────────────────────────────
    let client = prepare(config).await?;

    // ── Step 4: Extract ──────────────────────────────────────────────────
    stage_start(config, Stage::Extract);
    let extract_start = Instant::now();
    let content = extract::extract_content(&pdf_path, config).await?;
    let extract_duration_ms = extract_start.elapsed().as_millis() as u64;
    info!(
        "Extracted {} pages and {} images in {}ms",
        content.pages.len(),
        content.images.len(),
        extract_duration_ms
    );
    stage_complete(
        config,
        Stage::Extract,
        &format!("{} pages, {} images", content.pages.len(), content.images.len()),
    );

    let mut output = present(&client, &content, &resolved.stem(), config).await?;
    output.stats.extract_duration_ms = extract_duration_ms;
    output.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    Ok(output)
}

/// Run the model stages, generation and compilation on content that was
/// already extracted.
///
/// `stem` names the default output file (`<stem>-slides.pdf`). The compiler
/// check and provider resolution happen here exactly as in [`convert`].
pub async fn convert_extracted(
    content: &ExtractedContent,
    stem: &str,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2BeamerError> {
    let total_start = Instant::now();
    let client = prepare(config).await?;
    let mut output = present(&client, content, stem, config).await?;
    output.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    Ok(output)
}

async fn prepare(config: &ConversionConfig) -> Result<ModelClient, Pdf2BeamerError> {
    let installation = compile::check_installation(&config.compiler).await?;
    debug!("Using {} ({})", installation.banner, installation.path.display());

    let provider = resolve_provider(config).await?;
    Ok(ModelClient::new(provider, config))
}

/// Steps 5 to 9 of a conversion.
async fn present(
    client: &ModelClient,
    content: &ExtractedContent,
    stem: &str,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2BeamerError> {
    // ── Step 5: Model stages ─────────────────────────────────────────────
    let llm_start = Instant::now();
    let structure = basic::basic_structure(content);

    stage_start(config, Stage::Analyze);
    let analysis = analysis::analyze_images(client, content).await;
    report_fallbacks(config, &analysis.outcomes);
    stage_complete(config, Stage::Analyze, &analysis_summary(&analysis.outcomes));

    stage_start(config, Stage::Place);
    let placed = placement::place_content(client, content, &analysis.outcomes, &structure).await;
    if let Some(reason) = &placed.rejected {
        info!("Using deterministic body: {}", reason);
    }
    stage_complete(
        config,
        Stage::Place,
        match placed.source {
            BodySource::Model => "model body",
            BodySource::Fallback => "deterministic body",
        },
    );
    let llm_duration_ms = llm_start.elapsed().as_millis() as u64;

    // ── Step 6–8: Generate, compile, retry ───────────────────────────────
    let build = BuildDir::new(config)?;
    let compile_start = Instant::now();
    let rendered = match render_presentation(
        placed.body,
        placed.source,
        content,
        &analysis.outcomes,
        config,
        build.path(),
    )
    .await
    {
        Ok(rendered) => rendered,
        Err(e) => {
            if matches!(
                e,
                Pdf2BeamerError::CompilationFailed { .. } | Pdf2BeamerError::CompilationTimeout { .. }
            ) {
                let kept = build.keep();
                warn!("Build directory kept at {}", kept.display());
            }
            return Err(e);
        }
    };
    let compile_duration_ms = compile_start.elapsed().as_millis() as u64;

    if !config.keep_auxiliary {
        compile::cleanup_auxiliary_files(build.path());
    }

    let final_pdf = place_pdf(&rendered.report.pdf_path, config, stem)?;
    let tex_path = build.is_persistent().then(|| rendered.tex_path.clone());

    // ── Step 9: Stats ────────────────────────────────────────────────────
    let replies = [analysis.reply.as_ref(), placed.reply.as_ref()];
    let outcomes = analysis.outcomes;
    let stats = ConversionStats {
        total_pages: content.metadata.page_count,
        processed_pages: content.pages.len(),
        images_extracted: content.images.len(),
        images_converted: count(&outcomes, |o| o.latex().is_some()),
        images_kept: count(&outcomes, ImageOutcome::keeps_image),
        images_removed: count(&outcomes, |o| o.resolution == ImageResolution::Removed),
        image_fallbacks: count(&outcomes, |o| o.fallback.is_some()),
        total_input_tokens: replies.iter().flatten().map(|r| r.input_tokens).sum(),
        total_output_tokens: replies.iter().flatten().map(|r| r.output_tokens).sum(),
        compile_attempts: rendered.attempts,
        extract_duration_ms: 0,
        llm_duration_ms,
        compile_duration_ms,
        total_duration_ms: 0,
    };

    info!(
        "Conversion complete: {} slides from {} pages",
        rendered.body.matches("\\begin{frame}").count() + 1,
        stats.processed_pages,
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_complete(&final_pdf);
    }

    Ok(ConversionOutput {
        pdf_path: final_pdf,
        tex_path,
        body: rendered.body,
        body_source: rendered.source,
        metadata: content.metadata.clone(),
        images: outcomes,
        diagnostics: rendered.diagnostics,
        stats,
    })
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2BeamerError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Pdf2BeamerError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(input_str, config))
}

/// Extract PDF metadata without converting content.
///
/// Needs neither a model provider nor a LaTeX compiler.
pub async fn inspect(
    input_str: impl AsRef<str>,
    password: Option<&str>,
) -> Result<DocumentMetadata, Pdf2BeamerError> {
    let resolved = input::resolve_input(input_str.as_ref(), 120).await?;
    extract::extract_metadata(resolved.path(), password).await
}

/// A compiled presentation inside the build directory.
#[derive(Debug, Clone)]
pub struct RenderedPresentation {
    pub tex_path: PathBuf,
    pub report: CompileReport,
    /// The body that compiled.
    pub body: String,
    pub source: BodySource,
    /// 1, or 2 when the model body failed and the deterministic body was used.
    pub attempts: u32,
    /// Errors of a failed first attempt followed by warnings of the last.
    pub diagnostics: Vec<LatexDiagnostic>,
}

/// Generate and compile `body`; when a model body fails to compile, retry
/// once with [`basic::fallback_body`].
pub async fn render_presentation(
    body: String,
    source: BodySource,
    content: &ExtractedContent,
    outcomes: &[ImageOutcome],
    config: &ConversionConfig,
    dir: &Path,
) -> Result<RenderedPresentation, Pdf2BeamerError> {
    let first = generate_and_compile(&body, content, outcomes, config, dir).await;

    let (tex_path, result) = match first {
        Ok((tex_path, report)) => {
            return Ok(RenderedPresentation {
                tex_path,
                diagnostics: report.diagnostics.clone(),
                report,
                body,
                source,
                attempts: 1,
            })
        }
        Err(e) => (dir.join(&config.tex_filename), e),
    };

    let retryable = matches!(
        result,
        Pdf2BeamerError::CompilationFailed { .. } | Pdf2BeamerError::CompilationTimeout { .. }
    );
    if source != BodySource::Model || !retryable {
        return Err(result);
    }

    warn!("Model body did not compile ({}); retrying with deterministic body", result);
    let mut diagnostics = match result {
        Pdf2BeamerError::CompilationFailed { diagnostics, .. } => diagnostics
            .into_iter()
            .filter(LatexDiagnostic::is_error)
            .collect(),
        _ => Vec::new(),
    };
    debug!("First attempt of {} left {} errors", tex_path.display(), diagnostics.len());

    let fallback = basic::fallback_body(content, outcomes);
    let (tex_path, report) = generate_and_compile(&fallback, content, outcomes, config, dir).await?;
    diagnostics.extend(report.diagnostics.iter().cloned());

    Ok(RenderedPresentation {
        tex_path,
        report,
        body: fallback,
        source: BodySource::Fallback,
        attempts: 2,
        diagnostics,
    })
}

async fn generate_and_compile(
    body: &str,
    content: &ExtractedContent,
    outcomes: &[ImageOutcome],
    config: &ConversionConfig,
    dir: &Path,
) -> Result<(PathBuf, CompileReport), Pdf2BeamerError> {
    stage_start(config, Stage::Generate);
    let tex_path = generate::generate_document(body, content, outcomes, config, dir)?;
    stage_complete(config, Stage::Generate, &tex_path.display().to_string());

    stage_start(config, Stage::Compile);
    let report = compile::compile(
        &tex_path,
        &config.compiler,
        config.compile_passes,
        config.compile_timeout_secs,
    )
    .await?;
    stage_complete(
        config,
        Stage::Compile,
        &format!("{} passes, {} warnings", report.passes, report.diagnostics.len()),
    );
    Ok((tex_path, report))
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Either the configured output directory or a temporary one.
enum BuildDir {
    Persistent(PathBuf),
    Temporary(TempDir),
}

impl BuildDir {
    fn new(config: &ConversionConfig) -> Result<Self, Pdf2BeamerError> {
        match &config.output_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir).map_err(|e| Pdf2BeamerError::OutputWriteFailed {
                    path: dir.clone(),
                    source: e,
                })?;
                Ok(BuildDir::Persistent(dir.clone()))
            }
            None => tempfile::Builder::new()
                .prefix("pdf2beamer-")
                .tempdir()
                .map(BuildDir::Temporary)
                .map_err(|e| Pdf2BeamerError::Internal(format!("tempdir: {e}"))),
        }
    }

    fn path(&self) -> &Path {
        match self {
            BuildDir::Persistent(p) => p,
            BuildDir::Temporary(t) => t.path(),
        }
    }

    fn is_persistent(&self) -> bool {
        matches!(self, BuildDir::Persistent(_))
    }

    /// Stop a temporary directory from being deleted on drop.
    fn keep(self) -> PathBuf {
        match self {
            BuildDir::Persistent(p) => p,
            BuildDir::Temporary(t) => t.keep(),
        }
    }
}

/// Where the final PDF goes.
///
/// `output_pdf` wins; without an output directory the PDF would vanish with
/// the temporary build directory, so it lands next to the caller as
/// `<stem>-slides.pdf`.
pub fn final_pdf_path(config: &ConversionConfig, stem: &str) -> Option<PathBuf> {
    match (&config.output_pdf, &config.output_dir) {
        (Some(p), _) => Some(p.clone()),
        (None, None) => Some(PathBuf::from(format!("{stem}-slides.pdf"))),
        (None, Some(_)) => None,
    }
}

fn place_pdf(
    compiled: &Path,
    config: &ConversionConfig,
    stem: &str,
) -> Result<PathBuf, Pdf2BeamerError> {
    let Some(dest) = final_pdf_path(config, stem) else {
        return Ok(compiled.to_path_buf());
    };
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Pdf2BeamerError::OutputWriteFailed {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    std::fs::copy(compiled, &dest).map_err(|e| Pdf2BeamerError::OutputWriteFailed {
        path: dest.clone(),
        source: e,
    })?;
    info!("Wrote {}", dest.display());
    Ok(dest)
}

fn stage_start(config: &ConversionConfig, stage: Stage) {
    info!("Stage {}/{}: {}", stage.ordinal(), Stage::ALL.len(), stage);
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage_start(stage);
    }
}

fn stage_complete(config: &ConversionConfig, stage: Stage, summary: &str) {
    debug!("Stage {} complete: {}", stage, summary);
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage_complete(stage, summary);
    }
}

fn report_fallbacks(config: &ConversionConfig, outcomes: &[ImageOutcome]) {
    for o in outcomes {
        if let Some(reason) = &o.fallback {
            warn!("Keeping original image {}: {}", o.filename, reason);
            if let Some(ref cb) = config.progress_callback {
                cb.on_image_fallback(&o.filename, &reason.to_string());
            }
        }
    }
}

fn analysis_summary(outcomes: &[ImageOutcome]) -> String {
    format!(
        "{} converted, {} kept, {} removed",
        count(outcomes, |o| o.latex().is_some()),
        count(outcomes, ImageOutcome::keeps_image),
        count(outcomes, |o| o.resolution == ImageResolution::Removed),
    )
}

fn count(outcomes: &[ImageOutcome], pred: impl Fn(&ImageOutcome) -> bool) -> usize {
    outcomes.iter().filter(|o| pred(*o)).count()
}

/// Instantiate a named provider with the given model.
fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, Pdf2BeamerError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        Pdf2BeamerError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider** (`config.provider_name`) with `config.model` or
///    [`crate::config::DEFAULT_MODEL`].
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`),
///    both non-empty.
/// 4. **Gemini** when `GEMINI_API_KEY` is set, since the default model is a
///    Gemini model.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
async fn resolve_provider(
    config: &ConversionConfig,
) -> Result<Arc<dyn LLMProvider>, Pdf2BeamerError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        return create_vision_provider(name, config.model_or_default());
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if std::env::var("GEMINI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        return create_vision_provider(DEFAULT_PROVIDER, config.model_or_default());
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| Pdf2BeamerError::ProviderNotConfigured {
            provider: DEFAULT_PROVIDER.to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Pass --api-key or set GEMINI_API_KEY (or another provider key).\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_next_to_caller() {
        let config = ConversionConfig::default();
        assert_eq!(
            final_pdf_path(&config, "talk"),
            Some(PathBuf::from("talk-slides.pdf"))
        );
    }

    #[test]
    fn output_dir_keeps_compiled_pdf() {
        let config = ConversionConfig::builder().output_dir("build").build().unwrap();
        assert_eq!(final_pdf_path(&config, "talk"), None);
    }

    #[test]
    fn explicit_output_pdf_wins() {
        let config = ConversionConfig::builder()
            .output_dir("build")
            .output_pdf("out/deck.pdf")
            .build()
            .unwrap();
        assert_eq!(
            final_pdf_path(&config, "talk"),
            Some(PathBuf::from("out/deck.pdf"))
        );
    }

    #[test]
    fn summary_counts_each_resolution() {
        let mk = |resolution| ImageOutcome {
            filename: "x.png".into(),
            page: 1,
            resolution,
            reasoning: None,
            image_type: None,
            fallback: None,
        };
        let outcomes = vec![
            mk(ImageResolution::Image),
            mk(ImageResolution::Removed),
            mk(ImageResolution::Latex {
                content: "x".into(),
            }),
            mk(ImageResolution::Image),
        ];
        assert_eq!(analysis_summary(&outcomes), "1 converted, 2 kept, 1 removed");
    }
}
