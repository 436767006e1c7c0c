//! Prompts for the two model calls of a conversion.
//!
//! Every word sent to the model is defined here so prompt changes never touch
//! the pipeline code, and unit tests can check the contract the response
//! parsers rely on (the JSON shape, the `images/` path convention).

/// System prompt shared by image analysis and placement.
pub const SYSTEM_PROMPT: &str = r#"You are a LaTeX expert who builds Beamer presentations from the content of existing slide decks and documents.

Rules that apply to every answer:
- Write LaTeX that compiles with pdflatex and the standard beamer, amsmath, amssymb, booktabs, graphicx and listings packages.
- Never output \documentclass, \usepackage, \begin{document} or \end{document}.
- Never wrap the answer in Markdown code fences.
- Escape the LaTeX special characters & % $ # _ { } ~ ^ \ in ordinary text.
- Do not invent content that is not present in the source."#;

/// Image analysis prompt template.
///
/// Placeholders: `{outline}` and `{images}`.
pub const IMAGE_ANALYSIS_TEMPLATE: &str = r#"You are deciding how each image extracted from a presentation should be handled. The images are attached in the order listed below.

PRESENTATION OUTLINE:
{outline}

IMAGES TO ANALYZE:
{images}

For EACH image choose exactly one action:

1. CONVERT_TO_LATEX when the image shows
   - text that should simply be typeset
   - a table (use tabular with booktabs rules)
   - a formula or equation
   - a simple diagram or flowchart that can be rebuilt with plain LaTeX

2. KEEP_AS_IMAGE when the image shows
   - a complex chart, graph or plot
   - a photo or screenshot
   - a diagram too detailed to rebuild

3. REMOVE when the image is decorative, a logo, redundant or unreadable.

When converting, latex_content must be a self-contained fragment that can be pasted inside a frame: balanced braces, every \begin matched by its \end, no \begin{frame}, no preamble commands.

Answer with JSON only, in exactly this shape:
{
  "image_decisions": {
    "page_1_img_0.png": {
      "action": "CONVERT_TO_LATEX|KEEP_AS_IMAGE|REMOVE",
      "reasoning": "one sentence",
      "latex_content": "LaTeX fragment when converting, otherwise null",
      "image_type": "table|formula|diagram|chart|photo|text|other",
      "complexity": "simple|medium|complex"
    }
  }
}
Remember that backslashes inside JSON strings must be doubled."#;

/// Placement prompt template.
///
/// Placeholders: `{structure}`, `{images}` and `{conversions}`.
pub const PLACEMENT_TEMPLATE: &str = r#"You are finishing a LaTeX Beamer presentation. Below is its current body, the images that must be shown and the LaTeX conversions that replace other images.

CURRENT LATEX STRUCTURE:
{structure}

IMAGES TO PLACE:
{images}

LATEX CONVERSIONS TO INTEGRATE:
{conversions}

Instructions:
1. Keep the existing sections, frames and their order. Improve wording and layout only where the structure is clearly broken.
2. For EVERY image listed above create a NEW frame directly after the frame of the page it came from, with a descriptive title, \centering and
   \includegraphics[width=0.7\textwidth]{images/FILENAME}
   Use exactly images/FILENAME. Never write images/images/.
3. Put each LaTeX conversion into the existing frame of its page, or into a new frame after it when the frame would overflow.
4. Every \begin{frame} must have a matching \end{frame}. Use [allowframebreaks] for long frames.
5. Do not reference any image file that is not listed above.

Return the complete presentation body only: everything that belongs between \maketitle's frame and \end{document}."#;

/// Placeholder text used when a prompt section has no entries.
pub const NONE_PLACEHOLDER: &str = "(none)";

pub fn image_analysis_prompt(outline: &str, images: &str) -> String {
    // Page text may contain `{images}` literally; fill it first.
    IMAGE_ANALYSIS_TEMPLATE
        .replace("{images}", non_empty(images))
        .replace("{outline}", non_empty(outline))
}

pub fn placement_prompt(structure: &str, images: &str, conversions: &str) -> String {
    // `{structure}` goes last: the body itself may contain the other
    // placeholder strings.
    PLACEMENT_TEMPLATE
        .replace("{images}", non_empty(images))
        .replace("{conversions}", non_empty(conversions))
        .replace("{structure}", non_empty(structure))
}

fn non_empty(s: &str) -> &str {
    if s.trim().is_empty() {
        NONE_PLACEHOLDER
    } else {
        s
    }
}
