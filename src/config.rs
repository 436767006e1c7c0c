//! Configuration types for PDF-to-Beamer conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. One struct carries every knob for the
//! four stages (extract, model, generate, compile), so a run can be logged
//! or compared against another run from a single `Debug` dump.

use crate::error::Pdf2BeamerError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Provider used when neither a provider nor a provider name is configured
/// and `EDGEQUAKE_LLM_PROVIDER` is unset.
pub const DEFAULT_PROVIDER: &str = "gemini";

/// Configuration for a PDF-to-Beamer conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use pdf2beamer::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .model("gemini-2.5-flash")
///     .max_pages(20)
///     .title("Quarterly Review")
///     .compile_passes(2)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// LLM model identifier. If None, uses [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai", "anthropic").
    /// If None along with `provider`, the provider is resolved from the
    /// environment and finally defaults to [`DEFAULT_PROVIDER`].
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for every model call. Default: 0.1.
    ///
    /// The model is rewriting existing content, not inventing it, so the
    /// output should stay close to deterministic.
    pub temperature: f32,

    /// Maximum tokens the model may generate per call. Default: 8192.
    ///
    /// The placement call returns the whole presentation body in one reply;
    /// a low cap truncates it mid-frame and the body then fails validation.
    pub max_tokens: usize,

    /// Per-model-call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Process only the first N pages. Default: all pages.
    pub max_pages: Option<usize>,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Size and aspect filter applied to embedded images. Default: [`ImageFilter::default`].
    pub image_filter: ImageFilter,

    /// Build directory for the `.tex` file, `images/` and compiler output.
    ///
    /// `None` builds inside a temporary directory that is removed after the
    /// final PDF has been copied out.
    pub output_dir: Option<PathBuf>,

    /// Copy the final PDF to this path.
    pub output_pdf: Option<PathBuf>,

    /// File name of the generated source. Default: `presentation.tex`.
    pub tex_filename: String,

    /// Beamer theme and optional directory of theme files.
    pub theme: BeamerTheme,

    /// Presentation title. Falls back to the PDF title metadata, then to the
    /// first slide title.
    pub title: Option<String>,

    /// Presentation subtitle.
    pub subtitle: Option<String>,

    /// Presentation author. Falls back to the PDF author metadata.
    pub author: Option<String>,

    /// LaTeX compiler binary name or path. Default: `pdflatex`.
    pub compiler: String,

    /// Number of compiler passes. Default: 2.
    ///
    /// Beamer writes the table of contents and navigation data to auxiliary
    /// files on the first pass and reads them on the second.
    pub compile_passes: u32,

    /// Timeout per compiler pass in seconds. Default: 60.
    pub compile_timeout_secs: u64,

    /// Keep `.aux`, `.log`, `.nav`, `.out`, `.snm`, `.toc` and `.vrb` files. Default: false.
    pub keep_auxiliary: bool,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Stage-level progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 8192,
            api_timeout_secs: 120,
            max_pages: None,
            password: None,
            image_filter: ImageFilter::default(),
            output_dir: None,
            output_pdf: None,
            tex_filename: "presentation.tex".to_string(),
            theme: BeamerTheme::default(),
            title: None,
            subtitle: None,
            author: None,
            compiler: "pdflatex".to_string(),
            compile_passes: 2,
            compile_timeout_secs: 60,
            keep_auxiliary: false,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("max_pages", &self.max_pages)
            .field("image_filter", &self.image_filter)
            .field("output_dir", &self.output_dir)
            .field("output_pdf", &self.output_pdf)
            .field("tex_filename", &self.tex_filename)
            .field("theme", &self.theme)
            .field("compiler", &self.compiler)
            .field("compile_passes", &self.compile_passes)
            .field("compile_timeout_secs", &self.compile_timeout_secs)
            .field("keep_auxiliary", &self.keep_auxiliary)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// The model id that will be requested.
    pub fn model_or_default(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn max_pages(mut self, n: usize) -> Self {
        self.config.max_pages = Some(n);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn image_filter(mut self, filter: ImageFilter) -> Self {
        self.config.image_filter = filter;
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = Some(dir.into());
        self
    }

    pub fn output_pdf(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output_pdf = Some(path.into());
        self
    }

    pub fn tex_filename(mut self, name: impl Into<String>) -> Self {
        self.config.tex_filename = name.into();
        self
    }

    pub fn theme(mut self, theme: BeamerTheme) -> Self {
        self.config.theme = theme;
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.config.title = Some(title.into());
        self
    }

    pub fn subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.config.subtitle = Some(subtitle.into());
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.config.author = Some(author.into());
        self
    }

    pub fn compiler(mut self, compiler: impl Into<String>) -> Self {
        self.config.compiler = compiler.into();
        self
    }

    pub fn compile_passes(mut self, n: u32) -> Self {
        self.config.compile_passes = n;
        self
    }

    pub fn compile_timeout_secs(mut self, secs: u64) -> Self {
        self.config.compile_timeout_secs = secs;
        self
    }

    pub fn keep_auxiliary(mut self, v: bool) -> Self {
        self.config.keep_auxiliary = v;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Pdf2BeamerError> {
        let c = &self.config;
        if c.compile_passes == 0 {
            return Err(Pdf2BeamerError::InvalidConfig(
                "compile passes must be ≥ 1".into(),
            ));
        }
        if c.compile_timeout_secs == 0 {
            return Err(Pdf2BeamerError::InvalidConfig(
                "compile timeout must be ≥ 1 second".into(),
            ));
        }
        if !c.tex_filename.ends_with(".tex") || c.tex_filename.len() <= ".tex".len() {
            return Err(Pdf2BeamerError::InvalidConfig(format!(
                "tex filename must end with .tex, got '{}'",
                c.tex_filename
            )));
        }
        if c.tex_filename.contains('/') || c.tex_filename.contains('\\') {
            return Err(Pdf2BeamerError::InvalidConfig(format!(
                "tex filename must be a bare file name, got '{}'",
                c.tex_filename
            )));
        }
        if c.compiler.trim().is_empty() {
            return Err(Pdf2BeamerError::InvalidConfig(
                "compiler must not be empty".into(),
            ));
        }
        if c.max_pages == Some(0) {
            return Err(Pdf2BeamerError::InvalidConfig(
                "max pages must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Supporting types ─────────────────────────────────────────────────────

/// Size and aspect-ratio filter for embedded images.
///
/// Tiny images are usually icons or bullets; huge ones are page scans; very
/// elongated ones are rules and banners. None of them belong on a slide.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageFilter {
    /// Reject images narrower or shorter than this many pixels. Default: 100.
    pub min_side: u32,
    /// Reject images wider or taller than this many pixels. Default: 2000.
    pub max_side: u32,
    /// Reject images whose width/height or height/width exceeds this. Default: 3.0.
    pub max_aspect: f32,
}

impl Default for ImageFilter {
    fn default() -> Self {
        Self {
            min_side: 100,
            max_side: 2000,
            max_aspect: 3.0,
        }
    }
}

impl ImageFilter {
    /// Whether an image of `width × height` pixels is worth keeping.
    pub fn accepts(&self, width: u32, height: u32) -> bool {
        if width < self.min_side || height < self.min_side {
            return false;
        }
        if width > self.max_side || height > self.max_side {
            return false;
        }
        let (w, h) = (width as f32, height as f32);
        w <= h * self.max_aspect && h <= w * self.max_aspect
    }
}

/// Beamer theme selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeamerTheme {
    /// Argument of `\usetheme{…}`. Default: `Madrid`.
    pub name: String,
    /// Directory whose `.sty` and logo files are copied next to the `.tex`
    /// file, for themes that are not installed system-wide.
    pub dir: Option<PathBuf>,
}

impl Default for BeamerTheme {
    fn default() -> Self {
        Self {
            name: "Madrid".to_string(),
            dir: None,
        }
    }
}

impl BeamerTheme {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dir: None,
        }
    }

    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }
}
