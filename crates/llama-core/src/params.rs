//! Session parameter types for llama-core.
//!
//! [`SessionParams`] is the full configuration surface handed to the
//! inference engine when a session starts. It is created exclusively through
//! [`SessionParams::new()`], which fixes the model path and [`SessionMode`]
//! and fills every tunable field with the engine defaults. The tunables are
//! plain public fields: nothing here validates them (see
//! [`validate()`](crate::validate())).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ── Defaults ─────────────────────────────────────────────────

/// Default RNG seed. Negative means the engine seeds from the clock.
pub const DEFAULT_SEED: i32 = -1;
/// Upper bound for the default worker thread count.
pub const DEFAULT_MAX_THREADS: i32 = 4;
/// Default number of tokens to generate per request.
pub const DEFAULT_N_PREDICT: i32 = 128;
/// Default repeat-penalty window, in tokens.
pub const DEFAULT_REPEAT_LAST_N: i32 = 64;
/// Default model part count. `-1` lets the engine infer it from the model.
pub const DEFAULT_N_PARTS: i32 = -1;
/// Default context window, in tokens.
pub const DEFAULT_N_CTX: i32 = 512;
/// Default tokens per forward-pass batch.
pub const DEFAULT_N_BATCH: i32 = 8;
/// Default tokens kept from the initial prompt on context rotation.
pub const DEFAULT_N_KEEP: i32 = 0;
/// Default top-k cutoff.
pub const DEFAULT_TOP_K: i32 = 40;
/// Default nucleus sampling mass.
pub const DEFAULT_TOP_P: f32 = 0.95;
/// Default sampling temperature.
pub const DEFAULT_TEMP: f32 = 0.80;
/// Default repeat penalty.
pub const DEFAULT_REPEAT_PENALTY: f32 = 1.10;

/// Default worker thread count: the available parallelism capped at
/// [`DEFAULT_MAX_THREADS`], or 1 when it cannot be determined.
pub fn default_thread_count() -> i32 {
    let available = std::thread::available_parallelism()
        .map(|n| i32::try_from(n.get()).unwrap_or(i32::MAX))
        .unwrap_or(1);
    available.min(DEFAULT_MAX_THREADS)
}

// ── Session Mode ─────────────────────────────────────────────

/// How the engine assembles prompts for a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionMode {
    /// Input is treated as raw continuation text.
    #[default]
    Regular,
    /// Input is wrapped in instruction-following framing.
    Instructional,
}

// ── Session Parameters ───────────────────────────────────────

/// Configuration for one inference session.
///
/// The model path and mode are fixed at construction and exposed read-only;
/// everything else can be changed freely by the owner. Fields are independent:
/// writing one never changes another.
///
/// # Examples
///
/// ```
/// use llama_core::{SessionMode, SessionParams};
///
/// let mut params = SessionParams::new("/models/7B/ggml-model-q4_0.bin", SessionMode::Regular);
/// params.n_ctx = 2048;
/// params.antiprompts = Some(vec!["User:".to_owned()]);
///
/// assert!(!params.is_instructional());
/// assert_eq!(params.n_ctx, 2048);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionParams {
    /// Path to the model weights.
    model_path: PathBuf,

    /// Prompt handling mode.
    mode: SessionMode,

    /// RNG seed for sampling.
    pub seed: i32,

    /// Worker thread count for the compute backend.
    pub n_threads: i32,

    /// Maximum tokens to generate per request.
    pub n_predict: i32,

    /// Sliding window size for the repeat penalty.
    pub repeat_last_n: i32,

    /// Model part count (legacy multi-file models).
    pub n_parts: i32,

    /// Context window length in tokens.
    pub n_ctx: i32,

    /// Tokens processed per forward-pass batch.
    pub n_batch: i32,

    /// Tokens retained from the initial prompt when the context is rotated.
    pub n_keep: i32,

    pub top_k: i32,
    pub top_p: f32,
    pub temp: f32,
    pub repeat_penalty: f32,

    /// Stop sequences that end generation when produced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub antiprompts: Option<Vec<String>>,

    /// Use a half-precision key/value cache.
    pub use_f16_memory: bool,

    /// Ask the engine to lock the model weights in physical memory.
    pub keep_model_in_memory: bool,

    /// Prompt fed to the model before any user input.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_prompt: Option<String>,

    /// Text placed before each user input.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_prefix: Option<String>,

    /// Text placed after each user input.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_suffix: Option<String>,
}

impl SessionParams {
    /// Create parameters for the model at `model_path` in the given mode,
    /// with every tunable set to its default.
    ///
    /// This never fails and touches no files; whether the model exists is
    /// checked by [`check_model_file`](crate::check_model_file) when the
    /// engine opens it.
    pub fn new(model_path: impl Into<PathBuf>, mode: SessionMode) -> Self {
        Self {
            model_path: model_path.into(),
            mode,
            seed: DEFAULT_SEED,
            n_threads: default_thread_count(),
            n_predict: DEFAULT_N_PREDICT,
            repeat_last_n: DEFAULT_REPEAT_LAST_N,
            n_parts: DEFAULT_N_PARTS,
            n_ctx: DEFAULT_N_CTX,
            n_batch: DEFAULT_N_BATCH,
            n_keep: DEFAULT_N_KEEP,
            top_k: DEFAULT_TOP_K,
            top_p: DEFAULT_TOP_P,
            temp: DEFAULT_TEMP,
            repeat_penalty: DEFAULT_REPEAT_PENALTY,
            antiprompts: None,
            use_f16_memory: true,
            keep_model_in_memory: false,
            initial_prompt: None,
            prompt_prefix: None,
            prompt_suffix: None,
        }
    }

    /// Returns the model path.
    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Returns the session mode.
    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    /// Returns whether the session uses instruction-following framing.
    pub fn is_instructional(&self) -> bool {
        self.mode == SessionMode::Instructional
    }

    /// Returns the configured antiprompts, or an empty slice when unset.
    pub fn antiprompts(&self) -> &[String] {
        self.antiprompts.as_deref().unwrap_or_default()
    }

    /// Append `antiprompt` unless it is already configured.
    pub(crate) fn push_antiprompt(&mut self, antiprompt: &str) {
        let list = self.antiprompts.get_or_insert_with(Vec::new);
        if !list.iter().any(|a| a == antiprompt) {
            list.push(antiprompt.to_owned());
        }
    }
}
