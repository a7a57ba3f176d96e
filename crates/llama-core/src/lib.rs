mod config;
mod engine;
mod error;
mod params;
mod preset;
mod prompt;
mod validate;

pub use config::{ParamsFile, SessionConfig, load_params_file};
pub use engine::EngineParams;
pub use error::CoreError;
pub use params::{SessionMode, SessionParams, default_thread_count};
pub use preset::{ALPACA_ANTIPROMPT, ALPACA_PREFIX, ALPACA_SUFFIX, ModelFamily};
pub use prompt::{AntipromptMatcher, PromptAssembler};
pub use validate::{Issue, IssueKind, Severity, ValidationReport, check_model_file, validate};
