//! Post-processing: deterministic cleanup and validation of model LaTeX.
//!
//! Even a well-prompted model returns bodies that break the template in
//! predictable ways:
//!
//! - the answer wrapped in ` ```latex ... ``` ` fences
//! - a complete document with its own preamble and `\begin{document}`
//! - `\includegraphics{images/images/x.png}` or paths to files that were
//!   never copied
//! - the same image included twice, or an image silently left out
//! - `\centering` floating between frames
//!
//! [`clean_latex_body`] applies the rules below in order; each rule is a pure
//! `&str → String` function. [`validate_body`] then decides whether the result
//! can be handed to the compiler or must be replaced by the deterministic
//! fallback body.
//!
//! ## Rule Order
//!
//! Fences and document wrappers go first so later rules see a bare body.
//! Image paths are rewritten before duplicates are removed, because
//! `x.png` and `images/x.png` are the same image. Missing image frames are
//! appended last, once the set of referenced images is final.

use crate::pipeline::basic::{escape_latex, include_graphics};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashSet;
use tracing::{debug, warn};

/// An image copied into `images/` that the body must show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeptImage {
    pub filename: String,
    /// Title of the slide the image came from.
    pub title: String,
}

/// Apply all cleanup rules to a model-generated presentation body.
///
/// Rules (applied in order):
/// 1. Strip Markdown code fences
/// 2. Keep only the part between `\begin{document}` and `\end{document}`
/// 3. Drop preamble and title-block commands
/// 4. Normalise line endings and strip invisible Unicode
/// 5. Replace Unicode minus and dashes
/// 6. Rewrite `\includegraphics` paths to `images/<basename>`; remove unknown images
/// 7. Remove `\centering` outside frames
/// 8. Remove duplicate image references
/// 9. Mark frames containing verbatim material as `[fragile]`
/// 10. Append a frame for every kept image the body does not show
/// 11. Collapse blank lines
pub fn clean_latex_body(input: &str, kept: &[KeptImage]) -> String {
    let s = strip_code_fences(input);
    let s = extract_document_body(&s);
    let s = strip_preamble_commands(&s);
    let s = normalise_text(&s);
    let s = replace_unicode_dashes(&s);
    let available: HashSet<&str> = kept.iter().map(|k| k.filename.as_str()).collect();
    let s = fix_image_paths(&s, &available);
    let s = remove_centering_outside_frames(&s);
    let s = remove_duplicate_images(&s);
    let s = mark_fragile_frames(&s);
    let s = append_missing_images(&s, kept);
    collapse_blank_lines(&s)
}

// ── Rule 1: Strip code fences ────────────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\n(.*?)\n?```\s*$").unwrap());

fn strip_code_fences(input: &str) -> String {
    let trimmed = input.trim();
    if let Some(caps) = RE_OUTER_FENCES.captures(trimmed) {
        return caps[1].to_string();
    }
    // Fences elsewhere (e.g. a preface sentence, then a fenced block).
    trimmed
        .lines()
        .filter(|l| !l.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 2: Extract document body ────────────────────────────────────────────

const BEGIN_DOCUMENT: &str = "\\begin{document}";
const END_DOCUMENT: &str = "\\end{document}";

fn extract_document_body(input: &str) -> String {
    let start = input
        .find(BEGIN_DOCUMENT)
        .map(|i| i + BEGIN_DOCUMENT.len())
        .unwrap_or(0);
    let rest = &input[start..];
    let end = rest.find(END_DOCUMENT).unwrap_or(rest.len());
    rest[..end]
        .replace(BEGIN_DOCUMENT, "")
        .replace(END_DOCUMENT, "")
}

// ── Rule 3: Strip preamble commands ──────────────────────────────────────────

const PREAMBLE_COMMANDS: &[&str] = &[
    "\\documentclass",
    "\\usepackage",
    "\\usetheme",
    "\\usecolortheme",
    "\\usefonttheme",
    "\\useinnertheme",
    "\\useoutertheme",
    "\\title",
    "\\subtitle",
    "\\author",
    "\\date",
    "\\institute",
];

fn strip_preamble_commands(input: &str) -> String {
    input
        .lines()
        .filter(|line| {
            let t = line.trim_start();
            let is_preamble = PREAMBLE_COMMANDS.iter().any(|cmd| {
                t.strip_prefix(cmd)
                    .is_some_and(|rest| rest.starts_with(['{', '[']) || rest.trim().is_empty())
            });
            if is_preamble {
                debug!("Dropping preamble line from model body: {}", t);
            }
            !is_preamble
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 4: Line endings and invisible Unicode ───────────────────────────────

fn normalise_text(input: &str) -> String {
    input
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .chars()
        .filter_map(|c| match c {
            '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}' | '\u{00AD}' => None,
            '\u{00A0}' => Some(' '),
            c => Some(c),
        })
        .collect()
}

// ── Rule 5: Unicode minus and dashes ─────────────────────────────────────────

fn replace_unicode_dashes(input: &str) -> String {
    input
        .replace('\u{2212}', "-")
        .replace('\u{2013}', "--")
        .replace('\u{2014}', "---")
}

// ── Rule 6: Image paths ──────────────────────────────────────────────────────

static RE_INCLUDEGRAPHICS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\includegraphics\s*(\[[^\]]*\])?\s*\{([^}]*)\}").unwrap());

/// File name of an `\includegraphics` argument, with `.png` added when the
/// model dropped the extension.
fn image_basename(arg: &str, available: &HashSet<&str>) -> String {
    let base = arg.trim().rsplit('/').next().unwrap_or("").to_string();
    if !base.contains('.') {
        let with_ext = format!("{base}.png");
        if available.contains(with_ext.as_str()) {
            return with_ext;
        }
    }
    base
}

fn fix_image_paths(input: &str, available: &HashSet<&str>) -> String {
    RE_INCLUDEGRAPHICS
        .replace_all(input, |caps: &Captures| {
            let base = image_basename(&caps[2], available);
            if !available.contains(base.as_str()) {
                warn!("Removed reference to unavailable image: {}", &caps[2]);
                return String::new();
            }
            let options = caps
                .get(1)
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| "[width=0.7\\textwidth]".to_string());
            format!("\\includegraphics{options}{{images/{base}}}")
        })
        .into_owned()
}

// ── Rule 7: \centering outside frames ────────────────────────────────────────

fn remove_centering_outside_frames(input: &str) -> String {
    let mut out = Vec::new();
    let mut depth = 0usize;
    for line in input.lines() {
        depth += line.matches("\\begin{frame}").count();
        if depth == 0 && line.trim() == "\\centering" {
            debug!("Removed \\centering outside frame");
            continue;
        }
        depth = depth.saturating_sub(line.matches("\\end{frame}").count());
        out.push(line);
    }
    out.join("\n")
}

// ── Rule 8: Duplicate images ─────────────────────────────────────────────────

fn remove_duplicate_images(input: &str) -> String {
    let mut seen = HashSet::new();
    RE_INCLUDEGRAPHICS
        .replace_all(input, |caps: &Captures| {
            let path = caps[2].to_string();
            if seen.insert(path.clone()) {
                caps[0].to_string()
            } else {
                debug!("Removed duplicate image reference: {}", path);
                String::new()
            }
        })
        .into_owned()
}

// ── Rule 9: Fragile frames ───────────────────────────────────────────────────

static RE_FRAME_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)\\begin\{frame\}(\[[^\]]*\])?(.*?)\\end\{frame\}").unwrap()
});

fn mark_fragile_frames(input: &str) -> String {
    RE_FRAME_BLOCK
        .replace_all(input, |caps: &Captures| {
            let inner = &caps[2];
            let verbatim = inner.contains("\\begin{lstlisting}")
                || inner.contains("\\begin{verbatim}")
                || inner.contains("\\verb");
            let options = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            if !verbatim || options.contains("fragile") {
                return caps[0].to_string();
            }
            let options = if options.is_empty() {
                "[fragile]".to_string()
            } else {
                format!("[{},fragile]", &options[1..options.len() - 1])
            };
            format!("\\begin{{frame}}{options}{inner}\\end{{frame}}")
        })
        .into_owned()
}

// ── Rule 10: Missing images ──────────────────────────────────────────────────

/// Names of the images a cleaned body references.
pub fn referenced_images(body: &str) -> Vec<String> {
    RE_INCLUDEGRAPHICS
        .captures_iter(body)
        .map(|c| c[2].rsplit('/').next().unwrap_or("").to_string())
        .collect()
}

fn append_missing_images(input: &str, kept: &[KeptImage]) -> String {
    let present: HashSet<String> = referenced_images(input).into_iter().collect();
    let mut out = input.trim_end().to_string();
    for image in kept.iter().filter(|k| !present.contains(&k.filename)) {
        debug!("Appending frame for omitted image {}", image.filename);
        out.push_str(&format!(
            "\n\n\\begin{{frame}}{{{}}}\n  \\centering\n  {}\n\\end{{frame}}",
            escape_latex(&image.title),
            include_graphics(&image.filename)
        ));
    }
    out
}

// ── Rule 11: Blank lines ─────────────────────────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*(\n[ \t]*){2,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    let s: String = input
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");
    let s = RE_BLANK_LINES.replace_all(&s, "\n\n");
    format!("{}\n", s.trim())
}

// ── Validation ───────────────────────────────────────────────────────────────

static RE_ENVIRONMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\(begin|end)\s*\{([^}]+)\}").unwrap());

/// Remove `%` comments, honouring `\%`.
fn strip_comments(input: &str) -> String {
    input
        .lines()
        .map(|line| {
            let bytes = line.as_bytes();
            let mut i = 0;
            while i < bytes.len() {
                match bytes[i] {
                    b'\\' => i += 2,
                    b'%' => return &line[..i],
                    _ => i += 1,
                }
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Blank out verbatim environments, whose content is not LaTeX.
fn strip_verbatim(input: &str) -> String {
    static RE_VERBATIM: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?s)\\begin\{(lstlisting|verbatim)\}.*?\\end\{(lstlisting|verbatim)\}")
            .unwrap()
    });
    RE_VERBATIM.replace_all(input, "").into_owned()
}

/// Check brace and environment balance.
fn check_balance(latex: &str) -> Result<(), String> {
    let code = strip_comments(&strip_verbatim(latex));

    let mut depth: i64 = 0;
    let bytes = code.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth < 0 {
                    return Err("unbalanced braces: '}' without '{'".to_string());
                }
            }
            _ => {}
        }
        i += 1;
    }
    if depth != 0 {
        return Err(format!("unbalanced braces: {depth} unclosed '{{'"));
    }

    let mut stack: Vec<String> = Vec::new();
    for caps in RE_ENVIRONMENT.captures_iter(&code) {
        let name = caps[2].trim().to_string();
        if &caps[1] == "begin" {
            stack.push(name);
        } else {
            match stack.pop() {
                Some(open) if open == name => {}
                Some(open) => {
                    return Err(format!("\\end{{{name}}} closes \\begin{{{open}}}"));
                }
                None => return Err(format!("\\end{{{name}}} without \\begin")),
            }
        }
    }
    if let Some(open) = stack.pop() {
        return Err(format!("\\begin{{{open}}} is never closed"));
    }
    Ok(())
}

fn has_document_commands(latex: &str) -> Option<&'static str> {
    ["\\documentclass", "\\usepackage", BEGIN_DOCUMENT, END_DOCUMENT]
        .into_iter()
        .find(|cmd| latex.contains(cmd))
}

/// Whether a cleaned body can be compiled inside the template.
pub fn validate_body(body: &str) -> Result<(), String> {
    if let Some(cmd) = has_document_commands(body) {
        return Err(format!("body contains document-level command {cmd}"));
    }
    let frames = body.matches("\\begin{frame}").count();
    if frames == 0 {
        return Err("body contains no frames".to_string());
    }
    check_balance(body)
}

/// Whether an image conversion can be pasted inside a frame.
pub fn validate_fragment(latex: &str) -> Result<(), String> {
    if latex.trim().is_empty() {
        return Err("empty fragment".to_string());
    }
    if let Some(cmd) = has_document_commands(latex) {
        return Err(format!("contains document-level command {cmd}"));
    }
    if latex.contains("\\begin{frame}") || latex.contains("\\end{frame}") {
        return Err("contains a frame".to_string());
    }
    if latex.contains("\\section") {
        return Err("contains a section command".to_string());
    }
    check_balance(latex)
}
