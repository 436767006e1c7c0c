//! Progress-callback trait for stage-level conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the pipeline moves through its stages.
//!
//! # Example
//!
//! ```rust
//! use pdf2beamer::{ConversionConfig, ConversionProgressCallback, Stage};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     stages: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_stage_complete(&self, stage: Stage, summary: &str) {
//!         self.stages.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{stage} done: {summary}");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { stages: AtomicUsize::new(0) });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Pipeline stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Text, headings and images pulled out of the PDF.
    Extract,
    /// Model call deciding what to do with each image.
    Analyze,
    /// Model call producing the final presentation body.
    Place,
    /// `.tex` file, images and theme files written to the build directory.
    Generate,
    /// LaTeX compiler passes.
    Compile,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Extract,
        Stage::Analyze,
        Stage::Place,
        Stage::Generate,
        Stage::Compile,
    ];

    /// 1-based position, for "step 2/5" style displays.
    pub fn ordinal(self) -> usize {
        Stage::ALL.iter().position(|s| *s == self).unwrap_or(0) + 1
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Extract => "extract",
            Stage::Analyze => "analyze images",
            Stage::Place => "place content",
            Stage::Generate => "generate LaTeX",
            Stage::Compile => "compile",
        };
        f.write_str(s)
    }
}

/// Called by the conversion pipeline as it moves through its stages.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called when a stage begins.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called when a stage finishes.
    ///
    /// # Arguments
    /// * `stage`  : the stage that finished
    /// * `summary`: short human-readable result, e.g. `"12 pages, 4 images"`
    fn on_stage_complete(&self, stage: Stage, summary: &str) {
        let _ = (stage, summary);
    }

    /// Called once per image that keeps its original raster form because
    /// the model could not convert it.
    fn on_image_fallback(&self, filename: &str, reason: &str) {
        let _ = (filename, reason);
    }

    /// Called once after the final PDF is in place.
    fn on_conversion_complete(&self, pdf_path: &Path) {
        let _ = pdf_path;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl ConversionProgressCallback for Recorder {
        fn on_stage_start(&self, stage: Stage) {
            self.events.lock().unwrap().push(format!("start {stage}"));
        }

        fn on_stage_complete(&self, stage: Stage, summary: &str) {
            self.events.lock().unwrap().push(format!("done {stage}: {summary}"));
        }

        fn on_image_fallback(&self, filename: &str, _reason: &str) {
            self.events.lock().unwrap().push(format!("fallback {filename}"));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_stage_start(Stage::Extract);
        cb.on_stage_complete(Stage::Extract, "3 pages");
        cb.on_image_fallback("page_1_img_0.png", "no decision");
        cb.on_conversion_complete(Path::new("out.pdf"));
    }

    #[test]
    fn recorder_receives_events_in_order() {
        let rec = Recorder::default();
        rec.on_stage_start(Stage::Analyze);
        rec.on_image_fallback("page_2_img_1.png", "empty");
        rec.on_stage_complete(Stage::Analyze, "1 fallback");
        let events = rec.events.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                "start analyze images",
                "fallback page_2_img_1.png",
                "done analyze images: 1 fallback"
            ]
        );
    }

    #[test]
    fn stage_ordinals() {
        assert_eq!(Stage::Extract.ordinal(), 1);
        assert_eq!(Stage::Compile.ordinal(), 5);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_stage_start(Stage::Compile);
    }
}
