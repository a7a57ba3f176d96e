//! Configuration sources for session parameters.
//!
//! This module defines [`ParamsFile`] (a YAML file of parameter overrides)
//! and [`SessionConfig`] (the CLI-level request). [`SessionConfig::resolve`]
//! starts from the defaults of [`SessionParams::new`], applies the file, then
//! applies the CLI overrides, so flags take precedence over the file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use typed_builder::TypedBuilder;

use crate::error::CoreError;
use crate::params::{SessionMode, SessionParams};
use crate::preset::ModelFamily;

// ── Parameters File ──────────────────────────────────────────

/// Parameter overrides, deserialized from a YAML file or collected from CLI
/// flags.
///
/// Every field is optional; an absent field leaves the current value alone.
/// The model path and mode are not part of the file since they are fixed
/// when the parameters are created.
///
/// # Examples
///
/// ```
/// use llama_core::{ParamsFile, SessionMode, SessionParams};
///
/// let file: ParamsFile = serde_yaml::from_str("nCtx: 2048\ntemp: 0.7\n").expect("valid yaml");
///
/// let mut params = SessionParams::new("/models/7B.bin", SessionMode::Regular);
/// file.apply(&mut params);
/// assert_eq!(params.n_ctx, 2048);
/// assert_eq!(params.n_batch, 8);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ParamsFile {
    /// Model family whose prompt framing and stop sequence are applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<ModelFamily>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_threads: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_predict: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_last_n: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_parts: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_ctx: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_batch: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_keep: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_penalty: Option<f32>,

    /// Stop sequences added to the current list. Entries already present are
    /// skipped, so layering files and flags never drops one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub antiprompts: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_f16_memory: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_model_in_memory: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_prompt: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_prefix: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_suffix: Option<String>,
}

impl ParamsFile {
    /// Write every present field into `params`.
    ///
    /// Antiprompts are appended, then the family preset adds its own stop
    /// sequence and framing, then explicit prefix and suffix values override
    /// that framing.
    pub fn apply(&self, params: &mut SessionParams) {
        for antiprompt in self.antiprompts.iter().flatten() {
            params.push_antiprompt(antiprompt);
        }
        if let Some(family) = self.family {
            family.apply(params);
        }

        fn set<T: Clone>(target: &mut T, value: &Option<T>) {
            if let Some(value) = value {
                *target = value.clone();
            }
        }

        set(&mut params.seed, &self.seed);
        set(&mut params.n_threads, &self.n_threads);
        set(&mut params.n_predict, &self.n_predict);
        set(&mut params.repeat_last_n, &self.repeat_last_n);
        set(&mut params.n_parts, &self.n_parts);
        set(&mut params.n_ctx, &self.n_ctx);
        set(&mut params.n_batch, &self.n_batch);
        set(&mut params.n_keep, &self.n_keep);
        set(&mut params.top_k, &self.top_k);
        set(&mut params.top_p, &self.top_p);
        set(&mut params.temp, &self.temp);
        set(&mut params.repeat_penalty, &self.repeat_penalty);
        set(&mut params.use_f16_memory, &self.use_f16_memory);
        set(&mut params.keep_model_in_memory, &self.keep_model_in_memory);

        if self.initial_prompt.is_some() {
            params.initial_prompt = self.initial_prompt.clone();
        }
        if self.prompt_prefix.is_some() {
            params.prompt_prefix = self.prompt_prefix.clone();
        }
        if self.prompt_suffix.is_some() {
            params.prompt_suffix = self.prompt_suffix.clone();
        }
    }
}

/// Load a [`ParamsFile`] from `path`.
///
/// If the file does not exist, returns an empty set of overrides.
///
/// # Errors
///
/// Returns `CoreError::Io` if the file exists but cannot be read.
/// Returns `CoreError::Yaml` if the file contains invalid YAML or unknown keys.
pub fn load_params_file(path: &Path) -> Result<ParamsFile, CoreError> {
    if !path.exists() {
        return Ok(ParamsFile::default());
    }
    let content = std::fs::read_to_string(path)?;
    // an empty file is valid and overrides nothing
    if content.trim().is_empty() {
        return Ok(ParamsFile::default());
    }
    let file: ParamsFile = serde_yaml::from_str(&content)?;
    Ok(file)
}

// ── Session Configuration (CLI-level) ────────────────────────

/// Everything needed to produce [`SessionParams`] for one session.
///
/// # Examples
///
/// ```
/// use llama_core::{ParamsFile, SessionConfig, SessionMode};
///
/// let config = SessionConfig::builder()
///     .model_path("/models/7B.bin")
///     .mode(SessionMode::Instructional)
///     .overrides(ParamsFile { n_ctx: Some(1024), ..Default::default() })
///     .build();
///
/// let params = config.resolve().expect("no config file to read");
/// assert!(params.is_instructional());
/// assert_eq!(params.n_ctx, 1024);
/// ```
#[derive(Debug, Clone, Serialize, TypedBuilder)]
pub struct SessionConfig {
    /// Path to the model weights.
    #[builder(setter(into))]
    model_path: PathBuf,

    /// Prompt handling mode.
    #[builder(default)]
    mode: SessionMode,

    /// Optional YAML file of parameter overrides.
    #[builder(default, setter(strip_option, into))]
    #[serde(skip_serializing_if = "Option::is_none")]
    config_path: Option<PathBuf>,

    /// Overrides that take precedence over the file.
    #[builder(default)]
    overrides: ParamsFile,
}

impl SessionConfig {
    /// Returns the model path.
    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Returns the session mode.
    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    /// Returns the parameters file path, if set.
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Returns the CLI-level overrides.
    pub fn overrides(&self) -> &ParamsFile {
        &self.overrides
    }

    /// Build the session parameters: defaults, then the file, then the
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Io` or `CoreError::Yaml` if the parameters file
    /// exists but cannot be loaded.
    #[instrument(skip(self), fields(model = %self.model_path.display(), mode = ?self.mode))]
    pub fn resolve(&self) -> Result<SessionParams, CoreError> {
        let mut params = SessionParams::new(self.model_path.clone(), self.mode);

        if let Some(path) = &self.config_path {
            if path.exists() {
                info!(path = %path.display(), "loading parameters file");
            } else {
                warn!(path = %path.display(), "parameters file not found, using defaults");
            }
            let file = load_params_file(path)?;
            debug!(?file, "applying parameters file");
            file.apply(&mut params);
        }

        if self.overrides != ParamsFile::default() {
            debug!(overrides = ?self.overrides, "applying overrides");
            self.overrides.apply(&mut params);
        }

        Ok(params)
    }
}
