//! Prompt assembly and stop-sequence detection.
//!
//! [`PromptAssembler`] turns the text fields of [`SessionParams`] into the
//! strings the engine tokenizes. [`AntipromptMatcher`] watches generated text
//! and reports when an antiprompt has been produced.

use crate::params::SessionParams;
use crate::preset::{ALPACA_PREFIX, ALPACA_SUFFIX};

/// Builds prompt text for one session.
///
/// Explicit `prompt_prefix` / `prompt_suffix` values always win. When they are
/// unset, instructional sessions get Alpaca instruction framing and regular
/// sessions get none.
///
/// # Examples
///
/// ```
/// use llama_core::{PromptAssembler, SessionMode, SessionParams};
///
/// let params = SessionParams::new("/models/7B.bin", SessionMode::Instructional);
/// let prompt = PromptAssembler::new(&params);
///
/// assert_eq!(
///     prompt.format_input("Name three colors."),
///     "\n\n### Instruction:\n\nName three colors.\n\n### Response:\n\n"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptAssembler {
    initial: Option<String>,
    prefix: String,
    suffix: String,
}

impl PromptAssembler {
    pub fn new(params: &SessionParams) -> Self {
        let (default_prefix, default_suffix) = if params.is_instructional() {
            (ALPACA_PREFIX, ALPACA_SUFFIX)
        } else {
            ("", "")
        };

        Self {
            initial: params.initial_prompt.clone(),
            prefix: params
                .prompt_prefix
                .clone()
                .unwrap_or_else(|| default_prefix.to_owned()),
            suffix: params
                .prompt_suffix
                .clone()
                .unwrap_or_else(|| default_suffix.to_owned()),
        }
    }

    /// Text placed before each user input.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Text placed after each user input.
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// The prompt fed to the model before any user input.
    ///
    /// A leading space is added so the first word tokenizes the same way it
    /// would mid-sentence. Empty when no initial prompt is configured.
    pub fn initial_prompt(&self) -> String {
        match &self.initial {
            Some(text) => format!(" {text}"),
            None => String::new(),
        }
    }

    /// Wrap one user input in the session's prefix and suffix.
    pub fn format_input(&self, input: &str) -> String {
        let mut out = String::with_capacity(self.prefix.len() + input.len() + self.suffix.len());
        out.push_str(&self.prefix);
        out.push_str(input);
        out.push_str(&self.suffix);
        out
    }
}

/// Detects antiprompts at the end of streamed output.
///
/// Generated text arrives one token piece at a time; only the tail needed to
/// match the longest antiprompt is kept.
#[derive(Debug, Clone, Default)]
pub struct AntipromptMatcher {
    antiprompts: Vec<String>,
    tail: String,
    max_len: usize,
}

impl AntipromptMatcher {
    /// Create a matcher for `antiprompts`. Empty strings are ignored.
    pub fn new<I, S>(antiprompts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let antiprompts: Vec<String> = antiprompts
            .into_iter()
            .map(Into::into)
            .filter(|a| !a.is_empty())
            .collect();
        let max_len = antiprompts.iter().map(String::len).max().unwrap_or(0);

        Self {
            antiprompts,
            tail: String::new(),
            max_len,
        }
    }

    /// Returns `true` when there is nothing to match.
    pub fn is_empty(&self) -> bool {
        self.antiprompts.is_empty()
    }

    /// Record a piece of generated text.
    ///
    /// Returns the antiprompt the output now ends with, if any.
    pub fn feed(&mut self, piece: &str) -> Option<&str> {
        if self.antiprompts.is_empty() {
            return None;
        }

        self.tail.push_str(piece);
        if self.tail.len() > self.max_len {
            let mut start = self.tail.len() - self.max_len;
            while !self.tail.is_char_boundary(start) {
                start -= 1;
            }
            self.tail.drain(..start);
        }

        let tail = &self.tail;
        self.antiprompts
            .iter()
            .find(|a| tail.ends_with(a.as_str()))
            .map(String::as_str)
    }

    /// Forget all output seen so far.
    pub fn reset(&mut self) {
        self.tail.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::SessionMode;

    #[test]
    fn test_should_not_frame_regular_input() {
        let params = SessionParams::new("/m.bin", SessionMode::Regular);
        let prompt = PromptAssembler::new(&params);

        assert_eq!(prompt.prefix(), "");
        assert_eq!(prompt.suffix(), "");
        assert_eq!(prompt.format_input("Once upon a time"), "Once upon a time");
    }

    #[test]
    fn test_should_frame_instructional_input_with_alpaca_markers() {
        let params = SessionParams::new("/m.bin", SessionMode::Instructional);
        let prompt = PromptAssembler::new(&params);

        assert_eq!(prompt.prefix(), ALPACA_PREFIX);
        assert_eq!(prompt.suffix(), ALPACA_SUFFIX);
    }

    #[test]
    fn test_should_prefer_explicit_prefix_and_suffix() {
        let mut params = SessionParams::new("/m.bin", SessionMode::Instructional);
        params.prompt_prefix = Some("User: ".to_owned());
        params.prompt_suffix = Some("\nAssistant:".to_owned());

        let prompt = PromptAssembler::new(&params);
        assert_eq!(prompt.format_input("hi"), "User: hi\nAssistant:");
    }

    #[test]
    fn test_should_allow_explicit_empty_suffix_in_instructional_mode() {
        let mut params = SessionParams::new("/m.bin", SessionMode::Instructional);
        params.prompt_suffix = Some(String::new());

        let prompt = PromptAssembler::new(&params);
        assert_eq!(prompt.prefix(), ALPACA_PREFIX);
        assert_eq!(prompt.suffix(), "");
    }

    #[test]
    fn test_should_prepend_space_to_initial_prompt() {
        let mut params = SessionParams::new("/m.bin", SessionMode::Regular);
        assert_eq!(PromptAssembler::new(&params).initial_prompt(), "");

        params.initial_prompt = Some("Below is an instruction.".to_owned());
        assert_eq!(
            PromptAssembler::new(&params).initial_prompt(),
            " Below is an instruction."
        );
    }

    #[test]
    fn test_should_match_antiprompt_across_pieces() {
        let mut matcher = AntipromptMatcher::new(["User:", "\n\n"]);

        assert_eq!(matcher.feed("Hello there."), None);
        assert_eq!(matcher.feed(" Us"), None);
        assert_eq!(matcher.feed("er:"), Some("User:"));
    }

    #[test]
    fn test_should_return_first_configured_match() {
        let mut matcher = AntipromptMatcher::new(["b:", "ab:"]);
        assert_eq!(matcher.feed("xab:"), Some("b:"));
    }

    #[test]
    fn test_should_ignore_empty_antiprompts() {
        let mut matcher = AntipromptMatcher::new(["", ""]);
        assert!(matcher.is_empty());
        assert_eq!(matcher.feed("anything"), None);
    }

    #[test]
    fn test_should_forget_output_after_reset() {
        let mut matcher = AntipromptMatcher::new(["### Instruction:"]);
        assert_eq!(matcher.feed("### Instr"), None);

        matcher.reset();
        assert_eq!(matcher.feed("uction:"), None);
    }

    #[test]
    fn test_should_trim_tail_on_char_boundary() {
        let mut matcher = AntipromptMatcher::new(["ab"]);
        assert_eq!(matcher.feed("héllo wörld"), None);
        assert_eq!(matcher.feed("ö"), None);
        assert_eq!(matcher.feed("a"), None);
        assert_eq!(matcher.feed("b"), Some("ab"));
    }
}
