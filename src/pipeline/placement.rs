//! Placement: one model call merges the basic structure, the kept images and
//! the LaTeX conversions into the final presentation body.
//!
//! A failed call, or a reply that does not survive
//! [`postprocess::validate_body`], leaves the deterministic fallback body in
//! place.

use crate::output::{BodySource, ExtractedContent, ImageOutcome};
use crate::pipeline::basic;
use crate::pipeline::encode;
use crate::pipeline::llm::{ModelClient, ModelReply};
use crate::pipeline::postprocess::{self, KeptImage};
use crate::prompts::{placement_prompt, SYSTEM_PROMPT};
use std::fmt::Write as _;
use tracing::{info, warn};

/// Result of the placement stage.
#[derive(Debug, Clone)]
pub struct PlacementResult {
    pub body: String,
    pub source: BodySource,
    pub reply: Option<ModelReply>,
    /// Why the model body was not used, when it was not.
    pub rejected: Option<String>,
}

/// Images that end up in `images/`, with the title of their slide.
pub fn kept_images(content: &ExtractedContent, outcomes: &[ImageOutcome]) -> Vec<KeptImage> {
    outcomes
        .iter()
        .filter(|o| o.keeps_image())
        .map(|o| KeptImage {
            filename: o.filename.clone(),
            title: content.slide_title(o.page),
        })
        .collect()
}

pub async fn place_content(
    client: &ModelClient,
    content: &ExtractedContent,
    outcomes: &[ImageOutcome],
    structure: &str,
) -> PlacementResult {
    let kept = kept_images(content, outcomes);
    let prompt = placement_prompt(
        structure,
        &images_section(content, outcomes),
        &conversions_section(outcomes),
    );
    let (images, _) = encode::encode_images(
        kept.iter().filter_map(|k| content.image(&k.filename)),
    );

    info!(
        "Placing {} images and {} conversions",
        kept.len(),
        outcomes.iter().filter(|o| o.latex().is_some()).count()
    );

    match client
        .complete("content placement", SYSTEM_PROMPT, &prompt, images)
        .await
    {
        Ok(reply) => {
            let (body, source, rejected) = accept_or_fallback(&reply.content, content, outcomes);
            PlacementResult {
                body,
                source,
                reply: Some(reply),
                rejected,
            }
        }
        Err(e) => {
            warn!("Placement call failed, using deterministic body: {}", e);
            PlacementResult {
                body: basic::fallback_body(content, outcomes),
                source: BodySource::Fallback,
                reply: None,
                rejected: Some(e.to_string()),
            }
        }
    }
}

/// Clean a model reply and keep it if it validates.
pub fn accept_or_fallback(
    reply: &str,
    content: &ExtractedContent,
    outcomes: &[ImageOutcome],
) -> (String, BodySource, Option<String>) {
    let kept = kept_images(content, outcomes);
    let cleaned = postprocess::clean_latex_body(reply, &kept);
    match postprocess::validate_body(&cleaned) {
        Ok(()) => (cleaned, BodySource::Model, None),
        Err(reason) => {
            warn!("Model body rejected ({}); using deterministic body", reason);
            (
                basic::fallback_body(content, outcomes),
                BodySource::Fallback,
                Some(reason),
            )
        }
    }
}

fn images_section(content: &ExtractedContent, outcomes: &[ImageOutcome]) -> String {
    outcomes
        .iter()
        .filter(|o| o.keeps_image())
        .map(|o| {
            format!(
                "- {} (from page {}: {})",
                o.filename,
                o.page,
                content.slide_title(o.page)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn conversions_section(outcomes: &[ImageOutcome]) -> String {
    let mut out = String::new();
    for o in outcomes {
        if let Some(latex) = o.latex() {
            let _ = writeln!(
                out,
                "**{}** ({}, page {}):\n{}\n",
                o.filename,
                o.image_type.as_deref().unwrap_or("other"),
                o.page,
                latex.trim()
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{DocumentMetadata, ExtractedPage, ImageResolution};

    fn content() -> ExtractedContent {
        ExtractedContent::new(
            DocumentMetadata::default(),
            vec![ExtractedPage {
                page_num: 1,
                title: Some("Results".into()),
                text: "Results\nAccuracy went up".into(),
                ..Default::default()
            }],
            vec![],
            tempfile::tempdir().unwrap(),
        )
    }

    fn outcomes() -> Vec<ImageOutcome> {
        vec![
            ImageOutcome {
                filename: "page_1_img_0.png".into(),
                page: 1,
                resolution: ImageResolution::Image,
                reasoning: None,
                image_type: Some("chart".into()),
                fallback: None,
            },
            ImageOutcome {
                filename: "page_1_img_1.png".into(),
                page: 1,
                resolution: ImageResolution::Latex {
                    content: "$E=mc^2$".into(),
                },
                reasoning: None,
                image_type: Some("formula".into()),
                fallback: None,
            },
        ]
    }

    #[test]
    fn sections_describe_images_and_conversions() {
        let c = content();
        let o = outcomes();
        assert_eq!(
            images_section(&c, &o),
            "- page_1_img_0.png (from page 1: Results)"
        );
        let conv = conversions_section(&o);
        assert!(conv.contains("**page_1_img_1.png** (formula, page 1):\n$E=mc^2$"));
    }

    #[test]
    fn valid_reply_is_used() {
        let reply = "```latex\n\\begin{frame}{Results}\n$E=mc^2$\n\\end{frame}\n\
                     \\begin{frame}{Chart}\n\\centering\n\\includegraphics[width=0.7\\textwidth]{images/page_1_img_0.png}\n\\end{frame}\n```";
        let (body, source, rejected) = accept_or_fallback(reply, &content(), &outcomes());
        assert_eq!(source, BodySource::Model);
        assert!(rejected.is_none());
        assert!(body.contains("images/page_1_img_0.png"));
    }

    #[test]
    fn broken_reply_falls_back() {
        let reply = "\\begin{frame}{Results}\n\\begin{itemize}\n\\item x\n\\end{frame}";
        let (body, source, rejected) = accept_or_fallback(reply, &content(), &outcomes());
        assert_eq!(source, BodySource::Fallback);
        assert!(rejected.unwrap().contains("itemize"));
        assert!(body.starts_with("\\begin{frame}{Contents}"));
        assert!(body.contains("images/page_1_img_0.png"));
        assert!(body.contains("$E=mc^2$"));
    }
}
