//! CLI binary for pdf2beamer.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use pdf2beamer::{
    convert, inspect, BeamerTheme, BodySource, ConversionConfig, ConversionOutput,
    ConversionProgressCallback, Pdf2BeamerError, ProgressCallback, Stage,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner showing the current stage, with one log line per finished stage.
struct CliProgressCallback {
    bar: ProgressBar,
    fallbacks: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.set_message("checking compiler and provider…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            fallbacks: AtomicUsize::new(0),
        })
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: Stage) {
        self.bar
            .set_prefix(format!("[{}/{}]", stage.ordinal(), Stage::ALL.len()));
        self.bar.set_message(format!("{stage}…"));
    }

    fn on_stage_complete(&self, stage: Stage, summary: &str) {
        self.bar
            .println(format!("  {} {:<15} {}", green("✓"), stage.to_string(), dim(summary)));
    }

    fn on_image_fallback(&self, filename: &str, reason: &str) {
        self.fallbacks.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} {:<15} {}",
            yellow("!"),
            filename,
            dim(&format!("kept as image: {reason}"))
        ));
    }

    fn on_conversion_complete(&self, _pdf_path: &Path) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Basic conversion: writes report-slides.pdf in the current directory
  pdf2beamer report.pdf --api-key $GEMINI_API_KEY

  # Keep the .tex source and images next to the PDF
  pdf2beamer report.pdf --output-dir build/

  # Choose the output file, theme and title
  pdf2beamer report.pdf --output-pdf talk.pdf --theme Warsaw --title "Q3 Review"

  # Local theme files (beamerthemeAcme.sty, logo.png)
  pdf2beamer report.pdf --theme Acme --theme-dir ./themes/acme

  # Convert from URL, first 10 pages only
  pdf2beamer https://arxiv.org/pdf/1706.03762 --max-pages 10

  # Another provider
  pdf2beamer report.pdf --provider openai --model gpt-4.1

  # Inspect PDF metadata (no API key or LaTeX needed)
  pdf2beamer --inspect-only report.pdf

  # JSON summary (ConversionOutput) on stdout
  pdf2beamer --json report.pdf > run.json

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (--api-key sets the key of --provider)
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (gemini, openai, anthropic, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to an existing libpdfium

REQUIREMENTS:
  pdfium     PDFIUM_LIB_PATH, the current directory, or a system install
  pdflatex   TeX Live, MacTeX or MiKTeX with the beamer class
"#;

/// Convert PDF documents into LaTeX Beamer presentations.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2beamer",
    version,
    about = "Convert PDF documents into LaTeX Beamer presentations using an LLM",
    long_about = "Extract text and images from a PDF, let a vision LLM turn tables, equations \
and diagrams into LaTeX and lay out the slides, then compile the result with pdflatex. Every \
model step has a deterministic fallback.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// API key for the model provider, exported as that provider's key
    /// variable (GEMINI_API_KEY by default).
    #[arg(long, hide_env_values = true)]
    api_key: Option<String>,

    /// Keep the .tex source, images and PDF in this directory.
    #[arg(long, env = "PDF2BEAMER_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Copy the final PDF to this file.
    #[arg(long, env = "PDF2BEAMER_OUTPUT_PDF")]
    output_pdf: Option<PathBuf>,

    /// LLM model ID (default: gemini-2.5-flash).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: gemini, openai, anthropic, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_LLM_PROVIDER")]
    provider: Option<String>,

    /// Process only the first N pages.
    #[arg(long, env = "PDF2BEAMER_MAX_PAGES",
          value_parser = clap::value_parser!(u64).range(1..))]
    max_pages: Option<u64>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2BEAMER_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Presentation title (default: PDF title, then first slide title).
    #[arg(long)]
    title: Option<String>,

    /// Presentation subtitle.
    #[arg(long)]
    subtitle: Option<String>,

    /// Presentation author (default: PDF author).
    #[arg(long)]
    author: Option<String>,

    /// Beamer theme passed to \usetheme.
    #[arg(long, env = "PDF2BEAMER_THEME", default_value = "Madrid")]
    theme: String,

    /// Directory with theme .sty and image files to copy next to the source.
    #[arg(long, env = "PDF2BEAMER_THEME_DIR")]
    theme_dir: Option<PathBuf>,

    /// LaTeX compiler binary.
    #[arg(long, env = "PDF2BEAMER_COMPILER", default_value = "pdflatex")]
    compiler: String,

    /// Number of compiler passes.
    #[arg(long, env = "PDF2BEAMER_COMPILE_PASSES", default_value_t = 2,
          value_parser = clap::value_parser!(u32).range(1..=5))]
    compile_passes: u32,

    /// Timeout per compiler pass in seconds.
    #[arg(long, env = "PDF2BEAMER_COMPILE_TIMEOUT", default_value_t = 60)]
    compile_timeout: u64,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "PDF2BEAMER_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF2BEAMER_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PDF2BEAMER_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Max LLM output tokens per call.
    #[arg(long, env = "PDF2BEAMER_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// Keep .aux, .log, .nav and other compiler side files.
    #[arg(long)]
    keep_aux: bool,

    /// Output structured JSON (ConversionOutput) on stdout.
    #[arg(long)]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "PDF2BEAMER_NO_PROGRESS")]
    no_progress: bool,

    /// Print PDF metadata only, no conversion.
    #[arg(long)]
    inspect_only: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2BEAMER_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2BEAMER_QUIET")]
    quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Providers read their key from the environment; set it before any
    // runtime thread exists.
    if let Some(key) = cli.api_key.as_deref().filter(|k| !k.is_empty()) {
        match api_key_var(cli.provider.as_deref()) {
            Some(var) => std::env::set_var(var, key),
            None => eprintln!(
                "{} --api-key ignored: provider '{}' takes no API key",
                yellow("warning:"),
                cli.provider.as_deref().unwrap_or_default()
            ),
        }
    }

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the spinner is active; the
    // stage lines provide the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.inspect_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{} failed to start tokio runtime: {e}", red("error:"));
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(&cli, show_progress)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e:#}", red("error:"));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli, show_progress: bool) -> Result<()> {
    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let meta = inspect(&cli.input, cli.password.as_deref())
            .await
            .context("Failed to inspect PDF")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&meta).context("Failed to serialize metadata")?
            );
        } else {
            println!("File:         {}", cli.input);
            if let Some(ref t) = meta.title {
                println!("Title:        {}", t);
            }
            if let Some(ref a) = meta.author {
                println!("Author:       {}", a);
            }
            if let Some(ref s) = meta.subject {
                println!("Subject:      {}", s);
            }
            println!("Pages:        {}", meta.page_count);
            println!("PDF Version:  {}", meta.pdf_version);
            if let Some(ref p) = meta.producer {
                println!("Producer:     {}", p);
            }
            if let Some(ref c) = meta.creator {
                println!("Creator:      {}", c);
            }
        }
        return Ok(());
    }

    let progress_cb = show_progress.then(CliProgressCallback::new);
    let config = build_config(
        cli,
        progress_cb
            .clone()
            .map(|cb| cb as Arc<dyn ConversionProgressCallback>),
    )?;

    // ── Run conversion ───────────────────────────────────────────────────
    let output = match convert(&cli.input, &config).await {
        Ok(output) => output,
        Err(e) => {
            if let Some(cb) = &progress_cb {
                cb.bar.finish_and_clear();
            }
            if let Pdf2BeamerError::CompilationFailed { tex, .. }
            | Pdf2BeamerError::CompilationTimeout { tex, .. } = &e
            {
                eprintln!("{} {}", dim("source kept at:"), tex.display());
            }
            return Err(e).context("Conversion failed");
        }
    };

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&output, cli.verbose);
    }

    Ok(())
}

/// Environment variable the provider named by `--provider` reads its key from.
///
/// `None` for local providers such as ollama and lmstudio.
fn api_key_var(provider: Option<&str>) -> Option<&'static str> {
    let name = provider.map(str::to_ascii_lowercase);
    match name.as_deref() {
        None | Some("gemini" | "google") => Some("GEMINI_API_KEY"),
        Some("openai") => Some("OPENAI_API_KEY"),
        Some("anthropic" | "claude") => Some("ANTHROPIC_API_KEY"),
        Some("azure" | "azure-openai" | "azure_openai") => Some("AZURE_OPENAI_API_KEY"),
        Some("mistral") => Some("MISTRAL_API_KEY"),
        Some("openrouter") => Some("OPENROUTER_API_KEY"),
        Some("xai" | "grok") => Some("XAI_API_KEY"),
        Some(_) => None,
    }
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut theme = BeamerTheme::named(&cli.theme);
    if let Some(ref dir) = cli.theme_dir {
        theme = theme.with_dir(dir);
    }

    let mut builder = ConversionConfig::builder()
        .theme(theme)
        .compiler(&cli.compiler)
        .compile_passes(cli.compile_passes)
        .compile_timeout_secs(cli.compile_timeout)
        .keep_auxiliary(cli.keep_aux)
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref m) = cli.model {
        builder = builder.model(m);
    }
    if let Some(ref p) = cli.provider {
        builder = builder.provider_name(p);
    }
    if let Some(n) = cli.max_pages {
        let n = usize::try_from(n).context("--max-pages is too large")?;
        builder = builder.max_pages(n);
    }
    if let Some(ref p) = cli.password {
        builder = builder.password(p);
    }
    if let Some(ref t) = cli.title {
        builder = builder.title(t);
    }
    if let Some(ref s) = cli.subtitle {
        builder = builder.subtitle(s);
    }
    if let Some(ref a) = cli.author {
        builder = builder.author(a);
    }
    if let Some(ref d) = cli.output_dir {
        builder = builder.output_dir(d);
    }
    if let Some(ref p) = cli.output_pdf {
        builder = builder.output_pdf(p);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_summary(output: &ConversionOutput, verbose: bool) {
    let stats = &output.stats;
    let source = match output.body_source {
        BodySource::Model => "model layout",
        BodySource::Fallback => "deterministic layout",
    };
    eprintln!(
        "{}  {}  {} pages  {}ms  →  {}",
        if output.body_source == BodySource::Model {
            green("✔")
        } else {
            yellow("⚠")
        },
        source,
        stats.processed_pages,
        stats.total_duration_ms,
        bold(&output.pdf_path.display().to_string()),
    );
    eprintln!(
        "   images: {} converted, {} kept, {} removed ({} fallbacks)",
        stats.images_converted, stats.images_kept, stats.images_removed, stats.image_fallbacks
    );
    eprintln!(
        "   {} tokens in  /  {} tokens out",
        dim(&stats.total_input_tokens.to_string()),
        dim(&stats.total_output_tokens.to_string()),
    );
    if let Some(ref tex) = output.tex_path {
        eprintln!("   source: {}", tex.display());
    }

    let errors = output.diagnostics.iter().filter(|d| d.is_error()).count();
    if errors > 0 {
        eprintln!(
            "   {} the model layout failed to compile ({errors} errors):",
            yellow("!")
        );
    }
    for d in output
        .diagnostics
        .iter()
        .filter(|d| verbose || d.is_error())
    {
        eprintln!("     {}", dim(&d.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn api_key_goes_to_selected_provider() {
        assert_eq!(api_key_var(None), Some("GEMINI_API_KEY"));
        assert_eq!(api_key_var(Some("openai")), Some("OPENAI_API_KEY"));
        assert_eq!(api_key_var(Some("Anthropic")), Some("ANTHROPIC_API_KEY"));
        assert_eq!(api_key_var(Some("azure")), Some("AZURE_OPENAI_API_KEY"));
        assert_eq!(api_key_var(Some("ollama")), None);
    }

    #[test]
    fn provider_flag_reads_edgequake_env_name() {
        let cmd = Cli::command();
        let provider = cmd
            .get_arguments()
            .find(|a| a.get_id() == "provider")
            .unwrap();
        assert_eq!(
            provider.get_env().and_then(|e| e.to_str()),
            Some("EDGEQUAKE_LLM_PROVIDER")
        );
    }
}
