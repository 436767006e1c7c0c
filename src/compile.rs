//! LaTeX compilation: locate the compiler, run it, scrape its log.
//!
//! The compiler always runs with `-interaction=nonstopmode -halt-on-error`
//! inside the directory of the `.tex` file, so relative `images/` paths
//! resolve. A PDF on disk after the final pass counts as success even when
//! the exit status is non-zero: pdflatex exits 1 on some warnings.

use crate::error::Pdf2BeamerError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Extensions removed by [`cleanup_auxiliary_files`].
pub const AUXILIARY_EXTENSIONS: &[&str] = &["aux", "log", "nav", "out", "snm", "toc", "vrb"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// One error or warning scraped from compiler output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatexDiagnostic {
    pub severity: Severity,
    /// Source line from the `l.N` marker, when the log has one.
    pub line: Option<usize>,
    pub message: String,
}

impl LatexDiagnostic {
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for LatexDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        match self.line {
            Some(line) => write!(f, "{kind} (l.{line}): {}", self.message),
            None => write!(f, "{kind}: {}", self.message),
        }
    }
}

/// Outcome of a successful compilation.
#[derive(Debug, Clone)]
pub struct CompileReport {
    pub pdf_path: PathBuf,
    /// Warnings (and any errors pdflatex recovered from) of the last pass.
    pub diagnostics: Vec<LatexDiagnostic>,
    pub passes: u32,
}

/// Resolve `compiler` (a bare name searched on `PATH`, or a path relative to
/// the current directory) to an absolute path.
pub fn locate(compiler: &str) -> Result<PathBuf, Pdf2BeamerError> {
    let path = which::which(compiler).map_err(|e| Pdf2BeamerError::CompilerNotFound {
        compiler: compiler.to_string(),
        detail: e.to_string(),
    })?;
    Ok(std::fs::canonicalize(&path).unwrap_or(path))
}

/// A located compiler and the first line of its version banner.
#[derive(Debug, Clone)]
pub struct Installation {
    pub path: PathBuf,
    pub banner: String,
}

/// Verify that `compiler` is on `PATH` (or is a path) and answers `--version`.
pub async fn check_installation(compiler: &str) -> Result<Installation, Pdf2BeamerError> {
    let not_found = |detail: String| Pdf2BeamerError::CompilerNotFound {
        compiler: compiler.to_string(),
        detail,
    };

    let path = locate(compiler)?;

    let output = Command::new(&path)
        .arg("--version")
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| not_found(format!("failed to run {}: {e}", path.display())))?;

    if !output.status.success() {
        return Err(not_found(format!(
            "'{} --version' exited with {}",
            path.display(),
            output.status
        )));
    }

    let banner = String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();
    debug!("Found {} at {}: {}", compiler, path.display(), banner);
    Ok(Installation { path, banner })
}

/// Compile `tex` with `passes` runs of `compiler`.
///
/// `compiler` is resolved with [`locate`] before the passes run inside the
/// directory of `tex`. A pass that fails without leaving a PDF stops the loop
/// early; nothing a later pass reads would change.
pub async fn compile(
    tex: &Path,
    compiler: &str,
    passes: u32,
    timeout_secs: u64,
) -> Result<CompileReport, Pdf2BeamerError> {
    let program = locate(compiler)?;
    let dir = match tex.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = tex
        .file_name()
        .ok_or_else(|| Pdf2BeamerError::Internal(format!("not a file: {}", tex.display())))?;
    let pdf_path = tex.with_extension("pdf");
    let log_path = tex.with_extension("log");

    // A stale PDF from an earlier run would mask a failure.
    if pdf_path.exists() {
        std::fs::remove_file(&pdf_path).map_err(|e| Pdf2BeamerError::OutputWriteFailed {
            path: pdf_path.clone(),
            source: e,
        })?;
    }

    let passes = passes.max(1);
    let mut last_status = None;
    let mut stdout = String::new();
    let mut ran = 0;

    for pass in 1..=passes {
        info!("Compiling {} (pass {}/{})", tex.display(), pass, passes);
        ran = pass;

        let child = Command::new(&program)
            .arg("-interaction=nonstopmode")
            .arg("-halt-on-error")
            .arg(file_name)
            .current_dir(&dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(Duration::from_secs(timeout_secs), child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(Pdf2BeamerError::CompilerNotFound {
                    compiler: compiler.to_string(),
                    detail: e.to_string(),
                })
            }
            Err(_) => {
                return Err(Pdf2BeamerError::CompilationTimeout {
                    tex: tex.to_path_buf(),
                    secs: timeout_secs,
                })
            }
        };

        stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        last_status = output.status.code();
        debug!("Pass {} exited with {:?}", pass, last_status);

        if !output.status.success() && !pdf_path.exists() {
            break;
        }
    }

    let log = std::fs::read_to_string(&log_path)
        .or_else(|_| std::fs::read(&log_path).map(|b| String::from_utf8_lossy(&b).into_owned()))
        .unwrap_or_else(|_| stdout.clone());
    let diagnostics = parse_log(&log);

    if pdf_path.exists() {
        let warnings = diagnostics.iter().filter(|d| !d.is_error()).count();
        if warnings > 0 {
            debug!("{} LaTeX warnings", warnings);
        }
        Ok(CompileReport {
            pdf_path,
            diagnostics,
            passes: ran,
        })
    } else {
        warn!(
            "Compilation of {} produced no PDF ({} errors)",
            tex.display(),
            diagnostics.iter().filter(|d| d.is_error()).count()
        );
        Err(Pdf2BeamerError::CompilationFailed {
            tex: tex.to_path_buf(),
            exit_code: last_status,
            diagnostics,
        })
    }
}

static LINE_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^l\.(\d+)").unwrap());

static WARNING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:LaTeX|Package \w+|Class \w+) Warning: (.*)$").unwrap());

static WARNING_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"on input line (\d+)").unwrap());

/// Scrape `! …` errors (with the following `l.N` marker) and `Warning:` lines.
pub fn parse_log(log: &str) -> Vec<LatexDiagnostic> {
    let lines: Vec<&str> = log.lines().collect();
    let mut out = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        if let Some(msg) = line.strip_prefix("! ") {
            let mut diag = LatexDiagnostic {
                severity: Severity::Error,
                line: None,
                message: msg.trim().to_string(),
            };
            // The marker follows within a few lines of context.
            for next in lines.iter().skip(i + 1).take(8) {
                if next.starts_with("! ") {
                    break;
                }
                if let Some(c) = LINE_MARKER.captures(next) {
                    diag.line = c[1].parse().ok();
                    break;
                }
            }
            out.push(diag);
        } else if let Some(c) = WARNING.captures(line) {
            let mut message = c[1].trim().to_string();
            // Warnings wrap at 79 columns; the continuation is indented.
            let mut j = i + 1;
            while j < lines.len() && !message.ends_with('.') && lines[j].starts_with(' ') {
                message.push(' ');
                message.push_str(lines[j].trim());
                j += 1;
            }
            let line = WARNING_LINE
                .captures(&message)
                .and_then(|c| c[1].parse().ok());
            out.push(LatexDiagnostic {
                severity: Severity::Warning,
                line,
                message,
            });
            i = j;
            continue;
        }
        i += 1;
    }
    out
}

/// Remove compiler side files next to the sources in `dir`.
pub fn cleanup_auxiliary_files(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_aux = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| AUXILIARY_EXTENSIONS.contains(&e));
        if is_aux && path.is_file() {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!("Could not remove {}: {}", path.display(), e),
            }
        }
    }
    debug!("Removed {} auxiliary files from {}", removed, dir.display());
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &str = "\
This is pdfTeX, Version 3.141592653-2.6-1.40.25 (TeX Live 2023)
(./presentation.tex
LaTeX Warning: Reference `fig:1' on page 2 undefined on input line 17.

! Undefined control sequence.
l.42 \\foo
          {bar}
! Missing $ inserted.
<inserted text>
                $
l.57 x^
       2
Package hyperref Warning: Token not allowed in a PDF string (Unicode):
(hyperref)                removing `math shift' on input line 60.
";

    #[test]
    fn errors_carry_line_numbers() {
        let diags = parse_log(LOG);
        let errors: Vec<_> = diags.iter().filter(|d| d.is_error()).collect();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].message, "Undefined control sequence.");
        assert_eq!(errors[0].line, Some(42));
        assert_eq!(errors[1].message, "Missing $ inserted.");
        assert_eq!(errors[1].line, Some(57));
    }

    #[test]
    fn warnings_are_scraped() {
        let diags = parse_log(LOG);
        let warnings: Vec<_> = diags.iter().filter(|d| !d.is_error()).collect();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].message.starts_with("Reference `fig:1'"));
        assert_eq!(warnings[0].line, Some(17));
        assert!(warnings[1].message.starts_with("Token not allowed"));
    }

    #[test]
    fn error_without_marker_has_no_line() {
        let diags = parse_log("! Emergency stop.\n*** (job aborted, no legal \\end found)\n");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].line, None);
    }

    #[test]
    fn display_includes_line() {
        let d = LatexDiagnostic {
            severity: Severity::Error,
            line: Some(42),
            message: "Undefined control sequence.".into(),
        };
        assert_eq!(d.to_string(), "error (l.42): Undefined control sequence.");
    }

    #[test]
    fn cleanup_removes_only_auxiliary_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["p.aux", "p.log", "p.nav", "p.snm", "p.toc", "p.tex", "p.pdf"] {
            std::fs::write(dir.path().join(name), "x").unwrap();
        }
        assert_eq!(cleanup_auxiliary_files(dir.path()), 5);
        assert!(dir.path().join("p.tex").exists());
        assert!(dir.path().join("p.pdf").exists());
        assert!(!dir.path().join("p.log").exists());
    }

    #[tokio::test]
    async fn missing_compiler_is_reported() {
        let err = check_installation("definitely-not-a-tex-compiler-xyz")
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2BeamerError::CompilerNotFound { .. }));
    }
}
