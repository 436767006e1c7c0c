//! Image analysis: one model call classifies every extracted image.
//!
//! The reply is JSON keyed by file name (see
//! [`crate::prompts::IMAGE_ANALYSIS_TEMPLATE`]). Models routinely get LaTeX
//! inside JSON strings wrong, so parsing is layered:
//!
//! 1. take the outermost `{…}` and parse strictly;
//! 2. on failure, repair the text (lone backslashes, trailing commas,
//!    missing commas between objects) and parse again;
//! 3. on failure again, use an empty plan.
//!
//! A backslash followed by `f`, `b`, `r` or `t` is a *valid* JSON escape, so
//! `"\frac"` parses into a form feed plus `rac`. Those control characters are
//! turned back into LaTeX commands after parsing.
//!
//! Whatever goes wrong, every image still gets an [`ImageOutcome`]: an image
//! without a usable decision keeps its original raster form.

use crate::error::{ImageFallback, Pdf2BeamerError};
use crate::output::{ExtractedContent, ExtractedImage, ImageAction, ImageOutcome, ImageResolution};
use crate::pipeline::encode;
use crate::pipeline::llm::{ModelClient, ModelReply};
use crate::pipeline::postprocess::validate_fragment;
use crate::prompts::{image_analysis_prompt, SYSTEM_PROMPT};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt::Write as _;
use tracing::{debug, info, warn};

/// Characters of page text shown per slide in the outline.
pub const OUTLINE_PAGE_CHARS: usize = 600;

/// One entry of `image_decisions` as the model wrote it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ImageDecision {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub latex_content: Option<String>,
    #[serde(default)]
    pub image_type: Option<String>,
    #[serde(default)]
    pub complexity: Option<String>,
}

impl ImageDecision {
    pub fn parsed_action(&self) -> Option<ImageAction> {
        let raw = self.action.as_deref()?;
        let norm: String = raw
            .trim()
            .chars()
            .map(|c| if c == ' ' || c == '-' { '_' } else { c.to_ascii_uppercase() })
            .collect();
        match norm.as_str() {
            "CONVERT_TO_LATEX" | "CONVERT" => Some(ImageAction::ConvertToLatex),
            "KEEP_AS_IMAGE" | "KEEP" => Some(ImageAction::KeepAsImage),
            "REMOVE" | "DROP" => Some(ImageAction::Remove),
            _ => None,
        }
    }
}

/// Decisions keyed by image file name.
pub type AnalysisPlan = HashMap<String, ImageDecision>;

#[derive(Debug, Deserialize)]
struct AnalysisResponse {
    #[serde(default)]
    image_decisions: HashMap<String, ImageDecision>,
}

/// Result of the analysis stage.
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    /// One outcome per extracted image, in extraction order.
    pub outcomes: Vec<ImageOutcome>,
    /// `None` when there were no images or the call failed.
    pub reply: Option<ModelReply>,
}

/// Run the analysis call and resolve an outcome for every image.
pub async fn analyze_images(client: &ModelClient, content: &ExtractedContent) -> AnalysisResult {
    if content.images.is_empty() {
        debug!("No images extracted; skipping image analysis");
        return AnalysisResult {
            outcomes: Vec::new(),
            reply: None,
        };
    }

    let (images, attached) = encode::encode_images(&content.images);
    let listed: Vec<&ExtractedImage> = content
        .images
        .iter()
        .filter(|img| attached.contains(&img.filename))
        .collect();
    let prompt = image_analysis_prompt(&outline(content), &image_list(&listed));

    info!("Analysing {} images", images.len());
    let call: Result<ModelReply, Pdf2BeamerError> =
        client.complete("image analysis", SYSTEM_PROMPT, &prompt, images).await;

    match call {
        Ok(reply) => {
            let plan = parse_analysis(&reply.content);
            debug!("Analysis plan covers {} images", plan.len());
            AnalysisResult {
                outcomes: resolve_outcomes(&content.images, Ok(&plan)),
                reply: Some(reply),
            }
        }
        Err(e) => {
            warn!("Image analysis failed, keeping all images: {}", e);
            AnalysisResult {
                outcomes: resolve_outcomes(&content.images, Err(e.to_string())),
                reply: None,
            }
        }
    }
}

/// One `- Slide N: title` line per page, followed by the page's Markdown
/// (headings marked `#`) indented underneath.
///
/// Each page contributes at most [`OUTLINE_PAGE_CHARS`] characters.
pub fn outline(content: &ExtractedContent) -> String {
    let mut out = String::new();
    for page in &content.pages {
        let _ = writeln!(out, "- Slide {}: {}", page.page_num, content.slide_title(page.page_num));

        let source = if page.markdown.trim().is_empty() {
            &page.text
        } else {
            &page.markdown
        };
        let mut budget = OUTLINE_PAGE_CHARS;
        for line in source.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if budget == 0 {
                out.push_str("  …\n");
                break;
            }
            let shown: String = line.chars().take(budget).collect();
            budget -= shown.chars().count();
            let _ = writeln!(out, "  {shown}");
        }
    }
    out
}

fn image_list(images: &[&ExtractedImage]) -> String {
    images
        .iter()
        .map(|img| {
            format!(
                "- {} (page {}, {}x{} px)",
                img.filename, img.page, img.width, img.height
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Response parsing ─────────────────────────────────────────────────────────

/// Parse the analysis reply into a plan; never fails.
pub fn parse_analysis(reply: &str) -> AnalysisPlan {
    let Some(json) = outermost_object(reply) else {
        warn!("Image analysis reply contains no JSON object");
        return AnalysisPlan::new();
    };

    let parsed = serde_json::from_str::<AnalysisResponse>(json).or_else(|first| {
        debug!("Strict JSON parse failed ({}); repairing", first);
        serde_json::from_str::<AnalysisResponse>(&repair_json(json))
    });

    match parsed {
        Ok(resp) => resp
            .image_decisions
            .into_iter()
            .map(|(name, mut decision)| {
                decision.latex_content = decision.latex_content.map(|l| restore_latex_escapes(&l));
                (key_basename(&name), decision)
            })
            .collect(),
        Err(e) => {
            warn!("Image analysis reply is not valid JSON even after repair: {}", e);
            AnalysisPlan::new()
        }
    }
}

fn outermost_object(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let end = s.rfind('}')?;
    (end > start).then(|| &s[start..=end])
}

fn key_basename(key: &str) -> String {
    key.trim().rsplit('/').next().unwrap_or(key).to_string()
}

static RE_TRAILING_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r",(\s*[}\]])").unwrap());
static RE_MISSING_COMMA_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"\}([ \t]*\n\s*)\x22").unwrap());
static RE_MISSING_COMMA_OBJ: Lazy<Regex> = Lazy::new(|| Regex::new(r"\}([ \t]*\n\s*)\{").unwrap());

/// Best-effort fix of the JSON mistakes models make with LaTeX payloads.
pub fn repair_json(json: &str) -> String {
    let s = double_lone_backslashes(json);
    let s = RE_TRAILING_COMMA.replace_all(&s, "$1");
    let s = RE_MISSING_COMMA_KEY.replace_all(&s, "},$1\"");
    RE_MISSING_COMMA_OBJ.replace_all(&s, "},$1{").into_owned()
}

/// Double every backslash that does not start a valid JSON escape.
fn double_lone_backslashes(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len() + 16);
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c != '\\' {
            out.push(c);
            i += 1;
            continue;
        }
        match chars.get(i + 1) {
            Some(&next) if matches!(next, '"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't') => {
                out.push('\\');
                out.push(next);
                i += 2;
            }
            Some(&'u') if chars[i + 2..].iter().take(4).filter(|c| c.is_ascii_hexdigit()).count() == 4 => {
                out.push('\\');
                i += 1;
            }
            _ => {
                out.push_str("\\\\");
                i += 1;
            }
        }
    }
    out
}

/// Undo JSON escapes that swallowed the first letter of a LaTeX command.
pub fn restore_latex_escapes(latex: &str) -> String {
    let mut out = String::with_capacity(latex.len() + 8);
    for c in latex.chars() {
        match c {
            '\u{000C}' => out.push_str("\\f"),
            '\u{0008}' => out.push_str("\\b"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

// ── Resolution ───────────────────────────────────────────────────────────────

/// One outcome per image. `plan` is `Err(detail)` when the call itself failed.
pub fn resolve_outcomes(
    images: &[ExtractedImage],
    plan: Result<&AnalysisPlan, String>,
) -> Vec<ImageOutcome> {
    images
        .iter()
        .map(|image| {
            let plan = match &plan {
                Ok(p) => p,
                Err(detail) => {
                    return ImageOutcome::fallback(
                        image,
                        ImageFallback::AnalysisUnavailable {
                            detail: detail.clone(),
                        },
                    )
                }
            };
            match plan.get(&image.filename) {
                Some(decision) => resolve_one(image, decision),
                None => ImageOutcome::fallback(image, ImageFallback::NoDecision),
            }
        })
        .collect()
}

fn resolve_one(image: &ExtractedImage, decision: &ImageDecision) -> ImageOutcome {
    let outcome = |resolution, fallback| ImageOutcome {
        filename: image.filename.clone(),
        page: image.page,
        resolution,
        reasoning: decision.reasoning.clone(),
        image_type: decision.image_type.clone(),
        fallback,
    };

    match decision.parsed_action() {
        Some(ImageAction::KeepAsImage) => outcome(ImageResolution::Image, None),
        Some(ImageAction::Remove) => outcome(ImageResolution::Removed, None),
        Some(ImageAction::ConvertToLatex) => {
            let latex = decision
                .latex_content
                .as_deref()
                .map(strip_fence_lines)
                .unwrap_or_default();
            if latex.is_empty() || latex.eq_ignore_ascii_case("null") {
                return outcome(ImageResolution::Image, Some(ImageFallback::EmptyConversion));
            }
            match validate_fragment(&latex) {
                Ok(()) => outcome(ImageResolution::Latex { content: latex }, None),
                Err(reason) => {
                    warn!("Conversion of {} rejected: {}", image.filename, reason);
                    outcome(
                        ImageResolution::Image,
                        Some(ImageFallback::InvalidConversion { reason }),
                    )
                }
            }
        }
        None => outcome(ImageResolution::Image, Some(ImageFallback::NoDecision)),
    }
}

fn strip_fence_lines(latex: &str) -> String {
    latex
        .lines()
        .filter(|l| !l.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
