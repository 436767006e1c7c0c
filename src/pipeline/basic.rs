//! Deterministic LaTeX from extracted content.
//!
//! Two bodies are built here without any model involvement:
//!
//! * [`basic_structure`], one frame per page, sent to the placement call as
//!   the structure to refine;
//! * [`fallback_body`], the same frames plus a frame per kept image and per
//!   LaTeX conversion. It is used whenever the model body is unusable.
//!
//! All extracted text passes through [`escape_latex`], which works
//! character by character so an escape sequence is never escaped twice.

use crate::output::{ExtractedContent, ExtractedPage, ImageOutcome};
use std::fmt::Write as _;

/// Frames with more lines than this get `[allowframebreaks]`.
const FRAME_BREAK_LINES: usize = 14;
/// Frames with more characters than this get `[allowframebreaks]`.
const FRAME_BREAK_CHARS: usize = 900;

const BULLETS: &[char] = &['•', '●', '○', '◦', '▪', '■', '□', '►', '▸', '▶', '➢', '✓', '-', '*', '–'];

/// `\includegraphics` line used for every kept image.
pub fn include_graphics(filename: &str) -> String {
    format!(
        "\\includegraphics[width=0.7\\textwidth,height=0.75\\textheight,keepaspectratio]{{images/{filename}}}"
    )
}

/// Escape extracted text for use in a LaTeX text context.
pub fn escape_latex(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\textbackslash{}"),
            '&' | '%' | '$' | '#' | '_' | '{' | '}' => {
                out.push('\\');
                out.push(c);
            }
            '~' => out.push_str("\\textasciitilde{}"),
            '^' => out.push_str("\\textasciicircum{}"),
            '\t' => out.push(' '),
            c if c.is_control() => {}
            c => match replacement(c) {
                Some(r) => out.push_str(r),
                None if supported_by_inputenc(c) => out.push(c),
                None => {}
            },
        }
    }
    out
}

/// LaTeX for typographic, math and Greek characters that `inputenc` lacks.
fn replacement(c: char) -> Option<&'static str> {
    let r = match c {
        // typography
        '\u{2212}' => "-",
        '\u{2013}' => "--",
        '\u{2014}' => "---",
        '\u{201C}' | '\u{201E}' => "``",
        '\u{201D}' => "''",
        '\u{2018}' => "`",
        '\u{2019}' => "'",
        '\u{2026}' => "\\ldots{}",
        '\u{00A0}' => "~",
        '\u{00AD}' | '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}' => "",
        '\u{FB00}' => "ff",
        '\u{FB01}' => "fi",
        '\u{FB02}' => "fl",
        '\u{FB03}' => "ffi",
        '\u{FB04}' => "ffl",
        '\u{00B0}' => "\\ensuremath{^\\circ}",
        // math
        '\u{00D7}' => "\\ensuremath{\\times}",
        '\u{00F7}' => "\\ensuremath{\\div}",
        '\u{00B1}' => "\\ensuremath{\\pm}",
        '\u{2264}' => "\\ensuremath{\\leq}",
        '\u{2265}' => "\\ensuremath{\\geq}",
        '\u{2260}' => "\\ensuremath{\\neq}",
        '\u{2248}' => "\\ensuremath{\\approx}",
        '\u{221E}' => "\\ensuremath{\\infty}",
        '\u{2211}' => "\\ensuremath{\\sum}",
        '\u{220F}' => "\\ensuremath{\\prod}",
        '\u{222B}' => "\\ensuremath{\\int}",
        '\u{2202}' => "\\ensuremath{\\partial}",
        '\u{2207}' => "\\ensuremath{\\nabla}",
        '\u{221A}' => "\\ensuremath{\\surd}",
        '\u{2206}' => "\\ensuremath{\\Delta}",
        '\u{2208}' => "\\ensuremath{\\in}",
        '\u{2209}' => "\\ensuremath{\\notin}",
        '\u{2282}' => "\\ensuremath{\\subset}",
        '\u{2283}' => "\\ensuremath{\\supset}",
        '\u{222A}' => "\\ensuremath{\\cup}",
        '\u{2229}' => "\\ensuremath{\\cap}",
        '\u{2205}' => "\\ensuremath{\\emptyset}",
        '\u{2192}' => "\\ensuremath{\\rightarrow}",
        '\u{2190}' => "\\ensuremath{\\leftarrow}",
        '\u{2194}' => "\\ensuremath{\\leftrightarrow}",
        '\u{21D2}' => "\\ensuremath{\\Rightarrow}",
        '\u{21D0}' => "\\ensuremath{\\Leftarrow}",
        '\u{21D4}' => "\\ensuremath{\\Leftrightarrow}",
        '\u{2022}' | '\u{25CF}' => "\\textbullet{}",
        // Greek
        'α' => "\\ensuremath{\\alpha}",
        'β' => "\\ensuremath{\\beta}",
        'γ' => "\\ensuremath{\\gamma}",
        'δ' => "\\ensuremath{\\delta}",
        'ε' => "\\ensuremath{\\varepsilon}",
        'ζ' => "\\ensuremath{\\zeta}",
        'η' => "\\ensuremath{\\eta}",
        'θ' => "\\ensuremath{\\theta}",
        'ι' => "\\ensuremath{\\iota}",
        'κ' => "\\ensuremath{\\kappa}",
        'λ' => "\\ensuremath{\\lambda}",
        'μ' | '\u{00B5}' => "\\ensuremath{\\mu}",
        'ν' => "\\ensuremath{\\nu}",
        'ξ' => "\\ensuremath{\\xi}",
        'ο' => "o",
        'π' => "\\ensuremath{\\pi}",
        'ρ' => "\\ensuremath{\\rho}",
        'σ' | 'ς' => "\\ensuremath{\\sigma}",
        'τ' => "\\ensuremath{\\tau}",
        'υ' => "\\ensuremath{\\upsilon}",
        'φ' => "\\ensuremath{\\phi}",
        'χ' => "\\ensuremath{\\chi}",
        'ψ' => "\\ensuremath{\\psi}",
        'ω' => "\\ensuremath{\\omega}",
        'Γ' => "\\ensuremath{\\Gamma}",
        'Δ' => "\\ensuremath{\\Delta}",
        'Θ' => "\\ensuremath{\\Theta}",
        'Λ' => "\\ensuremath{\\Lambda}",
        'Ξ' => "\\ensuremath{\\Xi}",
        'Π' => "\\ensuremath{\\Pi}",
        'Σ' => "\\ensuremath{\\Sigma}",
        'Φ' => "\\ensuremath{\\Phi}",
        'Ψ' => "\\ensuremath{\\Psi}",
        'Ω' => "\\ensuremath{\\Omega}",
        _ => return None,
    };
    Some(r)
}

/// Latin-1 and Latin Extended-A, which `inputenc` + T1 typeset directly.
fn supported_by_inputenc(c: char) -> bool {
    (c as u32) < 0x0180
}

/// Escape a line and turn `**bold**` spans into `\textbf{…}`.
pub fn escape_inline(line: &str) -> String {
    let parts: Vec<&str> = line.split("**").collect();
    // An odd number of parts means every `**` has a partner.
    if parts.len() < 3 || parts.len() % 2 == 0 {
        return escape_latex(line);
    }
    let mut out = String::with_capacity(line.len() + 16);
    for (i, part) in parts.iter().enumerate() {
        if i % 2 == 1 && !part.trim().is_empty() {
            let _ = write!(out, "\\textbf{{{}}}", escape_latex(part));
        } else {
            out.push_str(&escape_latex(part));
        }
    }
    out
}

fn bullet_item(line: &str) -> Option<&str> {
    let mut chars = line.chars();
    let first = chars.next()?;
    if !BULLETS.contains(&first) {
        return None;
    }
    let rest = chars.as_str();
    // `-5%` or `*args` are not list items.
    if matches!(first, '-' | '*' | '–') && !rest.starts_with(' ') {
        return None;
    }
    let item = rest.trim();
    (!item.is_empty()).then_some(item)
}

/// Frame content for one page: paragraphs, bullet lists and sub-headings.
pub fn page_content(page: &ExtractedPage) -> String {
    let mut out = String::new();
    let mut in_list = false;
    let mut title_skipped = false;

    for raw in page.text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            if in_list {
                out.push_str("\\end{itemize}\n");
                in_list = false;
            }
            if !out.is_empty() && !out.ends_with("\n\n") {
                out.push('\n');
            }
            continue;
        }

        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if !title_skipped && page.title.as_deref() == Some(collapsed.as_str()) {
            title_skipped = true;
            continue;
        }

        if let Some(item) = bullet_item(line) {
            if !in_list {
                out.push_str("\\begin{itemize}\n");
                in_list = true;
            }
            let _ = writeln!(out, "  \\item {}", escape_inline(item));
            continue;
        }

        if in_list {
            out.push_str("\\end{itemize}\n");
            in_list = false;
        }
        if page.headings.iter().any(|h| *h == collapsed) {
            let _ = writeln!(out, "\n\\textbf{{{}}}\n", escape_latex(&collapsed));
        } else {
            out.push_str(&escape_inline(line));
            out.push('\n');
        }
    }
    if in_list {
        out.push_str("\\end{itemize}\n");
    }
    out.trim().to_string()
}

fn frame(title: &str, content: &str) -> String {
    let lines = content.lines().count();
    let options = if lines > FRAME_BREAK_LINES || content.len() > FRAME_BREAK_CHARS {
        "[allowframebreaks]"
    } else {
        ""
    };
    let mut out = String::with_capacity(content.len() + 64);
    let _ = writeln!(out, "\\begin{{frame}}{options}{{{}}}", escape_latex(title));
    if !content.is_empty() {
        for line in content.lines() {
            if line.is_empty() {
                out.push('\n');
            } else {
                let _ = writeln!(out, "  {line}");
            }
        }
    }
    out.push_str("\\end{frame}\n");
    out
}

fn contents_frame() -> &'static str {
    "\\begin{frame}{Contents}\n  \\tableofcontents\n\\end{frame}\n"
}

/// Frames for every page, preceded by a contents frame.
///
/// Consecutive pages sharing a title share one `\section`.
pub fn basic_structure(content: &ExtractedContent) -> String {
    build(content, &[])
}

/// The fully deterministic presentation body.
///
/// Equal to [`basic_structure`] plus, after each page's frame, one frame per
/// LaTeX conversion and one frame per kept image of that page.
pub fn fallback_body(content: &ExtractedContent, outcomes: &[ImageOutcome]) -> String {
    build(content, outcomes)
}

fn build(content: &ExtractedContent, outcomes: &[ImageOutcome]) -> String {
    let mut out = String::from(contents_frame());
    let mut last_section: Option<&str> = None;

    for page in &content.pages {
        out.push('\n');
        let title = content.slide_title(page.page_num);
        if let Some(t) = page.title.as_deref() {
            if last_section != Some(t) {
                let _ = writeln!(out, "\\section{{{}}}", escape_latex(t));
                last_section = Some(t);
            }
        }
        out.push_str(&frame(&title, &page_content(page)));

        for outcome in outcomes.iter().filter(|o| o.page == page.page_num) {
            if let Some(latex) = outcome.latex() {
                out.push('\n');
                out.push_str(&frame(&title, latex.trim()));
            }
        }
        for outcome in outcomes
            .iter()
            .filter(|o| o.page == page.page_num && o.keeps_image())
        {
            out.push('\n');
            let body = format!("\\centering\n{}", include_graphics(&outcome.filename));
            out.push_str(&frame(&title, &body));
        }
    }
    out
}
