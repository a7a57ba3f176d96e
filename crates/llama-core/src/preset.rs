//! Prompting conventions for model families other than plain LLaMA.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::params::SessionParams;

/// Prefix placed before user input by Alpaca-style instruction models.
pub const ALPACA_PREFIX: &str = "\n\n### Instruction:\n\n";
/// Suffix placed after user input by Alpaca-style instruction models.
pub const ALPACA_SUFFIX: &str = "\n\n### Response:\n\n";
/// Stop sequence marking the start of the next Alpaca instruction.
pub const ALPACA_ANTIPROMPT: &str = "### Instruction:\n\n";

const GPT4ALL_PREFIX: &str = "\n\n### Prompt:\n\n";
const GPT4ALL_SUFFIX: &str = "\n\n### Response:\n\n";
const GPT4ALL_ANTIPROMPT: &str = "### Prompt:\n\n";

/// Model family whose prompt framing should be applied to a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFamily {
    /// Base LLaMA weights: no framing.
    #[default]
    Llama,
    /// Alpaca instruction-tuned weights.
    Alpaca,
    /// GPT4All fine-tuned weights.
    Gpt4All,
}

struct Framing {
    prefix: &'static str,
    suffix: &'static str,
    antiprompt: &'static str,
}

impl ModelFamily {
    fn framing(self) -> Option<Framing> {
        match self {
            ModelFamily::Llama => None,
            ModelFamily::Alpaca => Some(Framing {
                prefix: ALPACA_PREFIX,
                suffix: ALPACA_SUFFIX,
                antiprompt: ALPACA_ANTIPROMPT,
            }),
            ModelFamily::Gpt4All => Some(Framing {
                prefix: GPT4ALL_PREFIX,
                suffix: GPT4ALL_SUFFIX,
                antiprompt: GPT4ALL_ANTIPROMPT,
            }),
        }
    }

    /// Set the family's prompt prefix and suffix on `params` and add its
    /// antiprompt. The model path and mode are left alone.
    pub fn apply(self, params: &mut SessionParams) {
        let Some(framing) = self.framing() else {
            return;
        };
        debug!(family = ?self, "applying model family framing");

        params.prompt_prefix = Some(framing.prefix.to_owned());
        params.prompt_suffix = Some(framing.suffix.to_owned());
        params.push_antiprompt(framing.antiprompt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::SessionMode;

    #[test]
    fn test_should_leave_llama_params_untouched() {
        let mut params = SessionParams::new("/m.bin", SessionMode::Regular);
        let before = params.clone();

        ModelFamily::Llama.apply(&mut params);

        assert_eq!(params, before);
    }

    #[test]
    fn test_should_apply_alpaca_framing() {
        let mut params = SessionParams::new("/m.bin", SessionMode::Instructional);

        ModelFamily::Alpaca.apply(&mut params);

        assert_eq!(params.prompt_prefix.as_deref(), Some(ALPACA_PREFIX));
        assert_eq!(params.prompt_suffix.as_deref(), Some(ALPACA_SUFFIX));
        assert_eq!(params.antiprompts(), [ALPACA_ANTIPROMPT]);
        assert!(params.is_instructional());
    }

    #[test]
    fn test_should_append_gpt4all_antiprompt_to_existing_list() {
        let mut params = SessionParams::new("/m.bin", SessionMode::Regular);
        params.antiprompts = Some(vec!["User:".to_owned()]);

        ModelFamily::Gpt4All.apply(&mut params);
        ModelFamily::Gpt4All.apply(&mut params);

        assert_eq!(params.antiprompts(), ["User:", "### Prompt:\n\n"]);
        assert_eq!(params.prompt_prefix.as_deref(), Some("\n\n### Prompt:\n\n"));
        assert_eq!(params.mode(), SessionMode::Regular);
    }

    #[test]
    fn test_should_deserialize_model_family_variants() {
        let family: ModelFamily = serde_yaml::from_str("alpaca").expect("should parse alpaca");
        assert_eq!(family, ModelFamily::Alpaca);

        let family: ModelFamily = serde_yaml::from_str("gpt4all").expect("should parse gpt4all");
        assert_eq!(family, ModelFamily::Gpt4All);
    }
}
