//! Mapping from [`SessionParams`] to the inference engine's native
//! parameter structure.
//!
//! [`EngineParams`] mirrors the engine's `gpt_params` field for field. It is
//! what the engine reads when a session is created; building it resolves the
//! mode-dependent prompt framing so the engine itself never looks at
//! [`SessionMode`](crate::SessionMode).

use std::path::PathBuf;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::params::SessionParams;
use crate::preset::ALPACA_ANTIPROMPT;
use crate::prompt::PromptAssembler;

/// Native engine configuration.
///
/// # Examples
///
/// ```
/// use llama_core::{EngineParams, SessionMode, SessionParams};
///
/// let params = SessionParams::new("/models/7B.bin", SessionMode::Instructional);
/// let engine = EngineParams::from(&params);
///
/// assert!(engine.instruct);
/// assert_eq!(engine.antiprompt, vec!["### Instruction:\n\n".to_owned()]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineParams {
    /// Path passed to the model-load routine.
    pub model: PathBuf,
    /// RNG seed; negative means seed from the clock.
    pub seed: i32,
    pub n_threads: i32,
    /// Tokens to generate; -1 means until an antiprompt or end of text.
    pub n_predict: i32,
    pub repeat_last_n: i32,
    pub n_parts: i32,
    pub n_ctx: i32,
    pub n_batch: i32,
    pub n_keep: i32,

    pub top_k: i32,
    pub top_p: f32,
    pub temp: f32,
    pub repeat_penalty: f32,

    /// Stop sequences, including any added for instruction framing.
    pub antiprompt: Vec<String>,
    /// Half-precision key/value cache.
    pub memory_f16: bool,
    /// Lock model weights in physical memory.
    pub use_mlock: bool,

    /// Initial prompt, ready for tokenization.
    pub prompt: String,
    pub input_prefix: String,
    pub input_suffix: String,
    /// Instruction-following prompt assembly.
    pub instruct: bool,
}

impl From<&SessionParams> for EngineParams {
    fn from(params: &SessionParams) -> Self {
        let assembler = PromptAssembler::new(params);

        let mut antiprompt = params.antiprompts().to_vec();
        if params.is_instructional()
            && params.prompt_prefix.is_none()
            && !antiprompt.iter().any(|a| a == ALPACA_ANTIPROMPT)
        {
            antiprompt.push(ALPACA_ANTIPROMPT.to_owned());
        }

        debug!(
            model = %params.model_path().display(),
            instruct = params.is_instructional(),
            antiprompts = antiprompt.len(),
            "mapped session parameters to engine parameters"
        );

        Self {
            model: params.model_path().to_path_buf(),
            seed: params.seed,
            n_threads: params.n_threads,
            n_predict: params.n_predict,
            repeat_last_n: params.repeat_last_n,
            n_parts: params.n_parts,
            n_ctx: params.n_ctx,
            n_batch: params.n_batch,
            n_keep: params.n_keep,
            top_k: params.top_k,
            top_p: params.top_p,
            temp: params.temp,
            repeat_penalty: params.repeat_penalty,
            antiprompt,
            memory_f16: params.use_f16_memory,
            use_mlock: params.keep_model_in_memory,
            prompt: assembler.initial_prompt(),
            input_prefix: assembler.prefix().to_owned(),
            input_suffix: assembler.suffix().to_owned(),
            instruct: params.is_instructional(),
        }
    }
}

impl EngineParams {
    /// The seed the sampler should use.
    ///
    /// Non-negative seeds are used as-is. A negative seed is replaced by the
    /// number of seconds since the Unix epoch at `now`.
    pub fn resolve_seed(&self, now: SystemTime) -> u32 {
        match u32::try_from(self.seed) {
            Ok(seed) => seed,
            Err(_) => {
                let secs = now
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_secs();
                // wraps in 2106
                secs as u32
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::params::SessionMode;
    use crate::preset::ModelFamily;

    #[test]
    fn test_should_map_every_field_one_to_one() {
        let mut params = SessionParams::new("/models/13B.bin", SessionMode::Regular);
        params.seed = 42;
        params.n_threads = 8;
        params.n_predict = 256;
        params.repeat_last_n = 32;
        params.n_parts = 2;
        params.n_ctx = 1024;
        params.n_batch = 16;
        params.n_keep = 48;
        params.top_k = 10;
        params.top_p = 0.5;
        params.temp = 0.2;
        params.repeat_penalty = 1.3;
        params.antiprompts = Some(vec!["User:".to_owned()]);
        params.use_f16_memory = false;
        params.keep_model_in_memory = true;

        let engine = EngineParams::from(&params);

        assert_eq!(engine.model, PathBuf::from("/models/13B.bin"));
        assert_eq!(engine.seed, 42);
        assert_eq!(engine.n_threads, 8);
        assert_eq!(engine.n_predict, 256);
        assert_eq!(engine.repeat_last_n, 32);
        assert_eq!(engine.n_parts, 2);
        assert_eq!(engine.n_ctx, 1024);
        assert_eq!(engine.n_batch, 16);
        assert_eq!(engine.n_keep, 48);
        assert_eq!(engine.top_k, 10);
        assert_eq!(engine.top_p, 0.5);
        assert_eq!(engine.temp, 0.2);
        assert_eq!(engine.repeat_penalty, 1.3);
        assert_eq!(engine.antiprompt, vec!["User:".to_owned()]);
        assert!(!engine.memory_f16);
        assert!(engine.use_mlock);
        assert!(!engine.instruct);
        assert_eq!(engine.prompt, "");
        assert_eq!(engine.input_prefix, "");
        assert_eq!(engine.input_suffix, "");
    }

    #[test]
    fn test_should_add_instruction_antiprompt_once() {
        let mut params = SessionParams::new("/m.bin", SessionMode::Instructional);
        params.antiprompts = Some(vec![ALPACA_ANTIPROMPT.to_owned()]);

        let engine = EngineParams::from(&params);
        assert_eq!(engine.antiprompt, vec![ALPACA_ANTIPROMPT.to_owned()]);
        assert!(engine.instruct);
    }

    #[test]
    fn test_should_not_add_alpaca_antiprompt_for_custom_framing() {
        let mut params = SessionParams::new("/m.bin", SessionMode::Instructional);
        ModelFamily::Gpt4All.apply(&mut params);

        let engine = EngineParams::from(&params);
        assert_eq!(engine.antiprompt, vec!["### Prompt:\n\n".to_owned()]);
        assert_eq!(engine.input_prefix, "\n\n### Prompt:\n\n");
    }

    #[test]
    fn test_should_carry_assembled_prompt_text() {
        let mut params = SessionParams::new("/m.bin", SessionMode::Instructional);
        params.initial_prompt = Some("You are a helpful assistant.".to_owned());

        let engine = EngineParams::from(&params);
        assert_eq!(engine.prompt, " You are a helpful assistant.");
        assert_eq!(engine.input_prefix, "\n\n### Instruction:\n\n");
        assert_eq!(engine.input_suffix, "\n\n### Response:\n\n");
    }

    #[test]
    fn test_should_use_non_negative_seed_as_is() {
        let mut params = SessionParams::new("/m.bin", SessionMode::Regular);
        params.seed = 0;
        let engine = EngineParams::from(&params);

        assert_eq!(engine.resolve_seed(SystemTime::now()), 0);
    }

    #[test]
    fn test_should_seed_from_clock_when_negative() {
        let engine = EngineParams::from(&SessionParams::new("/m.bin", SessionMode::Regular));
        let now = std::time::UNIX_EPOCH + Duration::from_secs(1_679_000_000);

        assert_eq!(engine.resolve_seed(now), 1_679_000_000);
    }

    #[test]
    fn test_should_serialize_with_native_field_names() {
        let engine = EngineParams::from(&SessionParams::new("/m.bin", SessionMode::Regular));

        let value = serde_json::to_value(&engine).expect("should serialize");
        assert_eq!(value["model"], json!("/m.bin"));
        assert_eq!(value["n_ctx"], json!(512));
        assert_eq!(value["memory_f16"], json!(true));
        assert_eq!(value["use_mlock"], json!(false));
        assert_eq!(value["antiprompt"], json!([]));

        let back: EngineParams = serde_json::from_value(value).expect("should deserialize");
        assert_eq!(back, engine);
    }
}
