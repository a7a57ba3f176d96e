//! Engine-side checks for session parameters.
//!
//! [`SessionParams`] accepts any value for any field. Before a session is
//! started, the engine runs [`validate`] to collect every problem at once
//! and [`check_model_file`] to make sure the weights can be opened.

use std::fmt;
use std::path::Path;

use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::error::CoreError;
use crate::params::SessionParams;

/// Context sizes above this were not seen in training by the original
/// LLaMA weights.
pub const MAX_TRAINED_CONTEXT: i32 = 2048;

/// How serious an [`Issue`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The engine cannot run with this value.
    Error,
    /// The engine can run, but results are likely poor.
    Warning,
}

/// What is wrong with a field.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IssueKind {
    #[error("model path is empty")]
    EmptyModelPath,

    #[error("must be positive, got {0}")]
    NotPositive(i32),

    #[error("must be at least {min}, got {value}")]
    BelowMinimum { value: i32, min: i32 },

    #[error("{value} exceeds the context size {n_ctx}")]
    ExceedsContext { value: i32, n_ctx: i32 },

    #[error("{value} exceeds the trained context of {max} tokens")]
    ExceedsTrainedContext { value: i32, max: i32 },

    #[error("must be -1 (infer from model) or positive, got {0}")]
    InvalidPartCount(i32),

    #[error("must be within [{min}, {max}], got {value}")]
    OutOfRange { value: f32, min: f32, max: f32 },

    #[error("must be a finite non-negative number, got {0}")]
    NegativeOrNan(f32),

    #[error("antiprompt #{0} is empty")]
    EmptyAntiprompt(usize),
}

/// A single problem found by [`validate`].
#[derive(Debug, Clone, PartialEq)]
pub struct Issue {
    /// Field name as it appears in [`SessionParams`].
    pub field: &'static str,
    pub severity: Severity,
    pub kind: IssueKind,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{level}: {}: {}", self.field, self.kind)
    }
}

/// All issues found in one set of parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    issues: Vec<Issue>,
}

impl ValidationReport {
    fn error(&mut self, field: &'static str, kind: IssueKind) {
        self.issues.push(Issue {
            field,
            severity: Severity::Error,
            kind,
        });
    }

    fn warning(&mut self, field: &'static str, kind: IssueKind) {
        self.issues.push(Issue {
            field,
            severity: Severity::Warning,
            kind,
        });
    }

    /// Returns every issue in the order the checks ran.
    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    /// Returns issues that prevent the engine from starting.
    pub fn errors(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    /// Returns issues that only degrade output quality.
    pub fn warnings(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|i| i.severity == Severity::Warning)
    }

    /// Returns `true` when there are no errors. Warnings are allowed.
    pub fn is_ok(&self) -> bool {
        self.errors().next().is_none()
    }

    /// Convert into a `Result`, failing when any error was found.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidParams` carrying the report if it holds at
    /// least one error.
    pub fn into_result(self) -> Result<Self, CoreError> {
        if self.is_ok() {
            Ok(self)
        } else {
            Err(CoreError::InvalidParams(self))
        }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self.errors().map(ToString::to_string).collect();
        if messages.is_empty() {
            write!(f, "no errors")
        } else {
            write!(f, "{}", messages.join("; "))
        }
    }
}

/// Check every field of `params` against what the engine accepts.
///
/// Never fails; the caller decides what to do with the report.
#[instrument(skip_all, fields(model = %params.model_path().display()))]
pub fn validate(params: &SessionParams) -> ValidationReport {
    let mut report = ValidationReport::default();

    if params.model_path().as_os_str().is_empty() {
        report.error("model_path", IssueKind::EmptyModelPath);
    }

    if params.n_threads <= 0 {
        report.error("n_threads", IssueKind::NotPositive(params.n_threads));
    }

    if params.n_ctx <= 0 {
        report.error("n_ctx", IssueKind::NotPositive(params.n_ctx));
    } else if params.n_ctx > MAX_TRAINED_CONTEXT {
        report.warning(
            "n_ctx",
            IssueKind::ExceedsTrainedContext {
                value: params.n_ctx,
                max: MAX_TRAINED_CONTEXT,
            },
        );
    }
    let n_ctx = params.n_ctx.max(0);

    if params.n_batch <= 0 {
        report.error("n_batch", IssueKind::NotPositive(params.n_batch));
    } else if n_ctx > 0 && params.n_batch > n_ctx {
        report.warning(
            "n_batch",
            IssueKind::ExceedsContext {
                value: params.n_batch,
                n_ctx,
            },
        );
    }

    if params.n_predict < -1 {
        report.error(
            "n_predict",
            IssueKind::BelowMinimum {
                value: params.n_predict,
                min: -1,
            },
        );
    }

    if params.repeat_last_n < 0 {
        report.error(
            "repeat_last_n",
            IssueKind::BelowMinimum {
                value: params.repeat_last_n,
                min: 0,
            },
        );
    } else if n_ctx > 0 && params.repeat_last_n > n_ctx {
        report.warning(
            "repeat_last_n",
            IssueKind::ExceedsContext {
                value: params.repeat_last_n,
                n_ctx,
            },
        );
    }

    if params.n_parts == 0 || params.n_parts < -1 {
        report.error("n_parts", IssueKind::InvalidPartCount(params.n_parts));
    }

    if params.n_keep < -1 {
        report.error(
            "n_keep",
            IssueKind::BelowMinimum {
                value: params.n_keep,
                min: -1,
            },
        );
    } else if n_ctx > 0 && params.n_keep > n_ctx {
        report.error(
            "n_keep",
            IssueKind::ExceedsContext {
                value: params.n_keep,
                n_ctx,
            },
        );
    }

    if params.top_k < 0 {
        report.error(
            "top_k",
            IssueKind::BelowMinimum {
                value: params.top_k,
                min: 0,
            },
        );
    }

    if !(0.0..=1.0).contains(&params.top_p) {
        report.error(
            "top_p",
            IssueKind::OutOfRange {
                value: params.top_p,
                min: 0.0,
                max: 1.0,
            },
        );
    }

    if !is_non_negative(params.temp) {
        report.error("temp", IssueKind::NegativeOrNan(params.temp));
    }

    if !is_non_negative(params.repeat_penalty) {
        report.error(
            "repeat_penalty",
            IssueKind::NegativeOrNan(params.repeat_penalty),
        );
    }

    for (index, antiprompt) in params.antiprompts().iter().enumerate() {
        if antiprompt.is_empty() {
            report.error("antiprompts", IssueKind::EmptyAntiprompt(index));
        }
    }

    for issue in report.warnings() {
        warn!(%issue, "questionable session parameter");
    }
    debug!(
        issues = report.issues().len(),
        ok = report.is_ok(),
        "validated session parameters"
    );

    report
}

fn is_non_negative(value: f32) -> bool {
    value.is_finite() && value >= 0.0
}

/// Make sure the model weights exist and are a regular file.
///
/// # Errors
///
/// Returns `CoreError::ModelNotFound` if nothing exists at `path`.
/// Returns `CoreError::NotAFile` if `path` is a directory or other non-file.
/// Returns `CoreError::Io` if the metadata cannot be read.
pub fn check_model_file(path: &Path) -> Result<(), CoreError> {
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(CoreError::ModelNotFound(path.to_path_buf()));
        }
        Err(e) => return Err(CoreError::Io(e)),
    };

    if !metadata.is_file() {
        return Err(CoreError::NotAFile(path.to_path_buf()));
    }

    debug!(model = %path.display(), bytes = metadata.len(), "model file found");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::SessionMode;

    fn params() -> SessionParams {
        SessionParams::new("/models/7B.bin", SessionMode::Regular)
    }

    fn fields_with(report: &ValidationReport, severity: Severity) -> Vec<&'static str> {
        report
            .issues()
            .iter()
            .filter(|i| i.severity == severity)
            .map(|i| i.field)
            .collect()
    }

    #[test]
    fn test_should_accept_default_params() {
        let report = validate(&params());
        assert!(report.issues().is_empty(), "{:?}", report.issues());
        assert!(report.is_ok());
    }

    #[test]
    fn test_should_reject_empty_model_path() {
        let report = validate(&SessionParams::new("", SessionMode::Regular));
        assert_eq!(fields_with(&report, Severity::Error), vec!["model_path"]);
        assert_eq!(report.issues()[0].kind, IssueKind::EmptyModelPath);
    }

    #[test]
    fn test_should_reject_non_positive_sizes() {
        let mut p = params();
        p.n_threads = 0;
        p.n_ctx = -5;
        p.n_batch = 0;

        let report = validate(&p);
        assert_eq!(
            fields_with(&report, Severity::Error),
            vec!["n_threads", "n_ctx", "n_batch"]
        );
    }

    #[test]
    fn test_should_warn_on_large_context_and_batch() {
        let mut p = params();
        p.n_ctx = 4096;
        p.n_batch = 8192;
        p.repeat_last_n = 5000;

        let report = validate(&p);
        assert!(report.is_ok());
        assert_eq!(
            fields_with(&report, Severity::Warning),
            vec!["n_ctx", "n_batch", "repeat_last_n"]
        );
    }

    #[test]
    fn test_should_name_trained_context_limit_in_warning() {
        let mut p = params();
        p.n_ctx = MAX_TRAINED_CONTEXT + 1;

        let report = validate(&p);
        assert_eq!(
            report.issues()[0].kind,
            IssueKind::ExceedsTrainedContext {
                value: MAX_TRAINED_CONTEXT + 1,
                max: MAX_TRAINED_CONTEXT,
            }
        );
        assert_eq!(
            report.issues()[0].to_string(),
            format!(
                "warning: n_ctx: {} exceeds the trained context of {MAX_TRAINED_CONTEXT} tokens",
                MAX_TRAINED_CONTEXT + 1
            )
        );
    }

    #[test]
    fn test_should_allow_minus_one_sentinels() {
        let mut p = params();
        p.n_predict = -1;
        p.n_parts = -1;
        p.n_keep = -1;

        assert!(validate(&p).issues().is_empty());
    }

    #[test]
    fn test_should_reject_invalid_counts() {
        let mut p = params();
        p.n_predict = -2;
        p.repeat_last_n = -1;
        p.n_parts = 0;
        p.n_keep = 1024;
        p.top_k = -3;

        let report = validate(&p);
        assert_eq!(
            fields_with(&report, Severity::Error),
            vec!["n_predict", "repeat_last_n", "n_parts", "n_keep", "top_k"]
        );
        assert_eq!(
            report.issues()[3].kind,
            IssueKind::ExceedsContext {
                value: 1024,
                n_ctx: 512
            }
        );
    }

    #[test]
    fn test_should_reject_bad_sampling_floats() {
        let mut p = params();
        p.top_p = 1.5;
        p.temp = -0.1;
        p.repeat_penalty = f32::NAN;

        let report = validate(&p);
        assert_eq!(
            fields_with(&report, Severity::Error),
            vec!["top_p", "temp", "repeat_penalty"]
        );
    }

    #[test]
    fn test_should_allow_greedy_sampling_values() {
        let mut p = params();
        p.temp = 0.0;
        p.top_k = 0;
        p.top_p = 1.0;
        p.repeat_penalty = 1.0;

        assert!(validate(&p).issues().is_empty());
    }

    #[test]
    fn test_should_reject_empty_antiprompt() {
        let mut p = params();
        p.antiprompts = Some(vec!["User:".to_owned(), String::new()]);

        let report = validate(&p);
        assert_eq!(report.issues().len(), 1);
        assert_eq!(report.issues()[0].kind, IssueKind::EmptyAntiprompt(1));
    }

    #[test]
    fn test_should_convert_report_into_error() {
        let mut p = params();
        p.n_threads = -1;

        let err = validate(&p).into_result().expect_err("should fail");
        assert!(matches!(err, CoreError::InvalidParams(_)));
        assert_eq!(
            err.to_string(),
            "invalid session parameters: error: n_threads: must be positive, got -1"
        );
    }

    #[test]
    fn test_should_keep_warnings_in_ok_result() {
        let mut p = params();
        p.n_ctx = 4096;

        let report = validate(&p).into_result().expect("warnings only");
        assert_eq!(report.warnings().count(), 1);
    }

    #[test]
    fn test_should_report_missing_model_file() {
        let dir = tempfile::TempDir::new().expect("should create temp dir");
        let path = dir.path().join("missing.bin");

        let err = check_model_file(&path).expect_err("should fail");
        assert!(matches!(err, CoreError::ModelNotFound(p) if p == path));
    }

    #[test]
    fn test_should_reject_directory_as_model() {
        let dir = tempfile::TempDir::new().expect("should create temp dir");

        let err = check_model_file(dir.path()).expect_err("should fail");
        assert!(matches!(err, CoreError::NotAFile(_)));
    }

    #[test]
    fn test_should_accept_existing_model_file() {
        let dir = tempfile::TempDir::new().expect("should create temp dir");
        let path = dir.path().join("ggml-model-q4_0.bin");
        std::fs::write(&path, b"ggml").expect("should write model");

        check_model_file(&path).expect("should find model");
    }
}
