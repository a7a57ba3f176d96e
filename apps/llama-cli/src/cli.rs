use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use llama_core::{
    EngineParams, ModelFamily, ParamsFile, PromptAssembler, SessionConfig, SessionMode,
    SessionParams, check_model_file, validate,
};
use tracing::{info, instrument};

#[derive(Debug, Parser)]
#[command(name = "llama", about = "Resolve and inspect llama inference session parameters")]
pub struct Cli {
    /// Also write JSON logs under this directory
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print the resolved session parameters
    Show {
        #[command(flatten)]
        params: ParamsArgs,

        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Yaml)]
        format: Format,
    },

    /// Print the parameters as the inference engine receives them
    Engine {
        #[command(flatten)]
        params: ParamsArgs,
    },

    /// Check the parameters and the model file before starting a session
    Check {
        #[command(flatten)]
        params: ParamsArgs,

        /// Do not require the model file to exist
        #[arg(long)]
        skip_model_check: bool,
    },

    /// Render the initial prompt and one framed user input
    Prompt {
        #[command(flatten)]
        params: ParamsArgs,

        /// User input to frame
        #[arg(short, long)]
        input: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Yaml,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Family {
    Llama,
    Alpaca,
    Gpt4all,
}

impl From<Family> for ModelFamily {
    fn from(family: Family) -> Self {
        match family {
            Family::Llama => ModelFamily::Llama,
            Family::Alpaca => ModelFamily::Alpaca,
            Family::Gpt4all => ModelFamily::Gpt4All,
        }
    }
}

/// Flags shared by every subcommand. Unset flags fall back to the
/// parameters file, then to the defaults.
#[derive(Debug, Args)]
pub struct ParamsArgs {
    /// Path to the model weights
    #[arg(short, long)]
    pub model: PathBuf,

    /// Use instruction-following prompt framing
    #[arg(long)]
    pub instruct: bool,

    /// YAML file of parameter overrides
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Model family whose prompt framing to apply
    #[arg(long, value_enum)]
    pub family: Option<Family>,

    /// RNG seed (negative seeds from the clock)
    #[arg(short, long, allow_negative_numbers = true)]
    pub seed: Option<i32>,

    /// Worker thread count
    #[arg(short, long)]
    pub threads: Option<i32>,

    /// Tokens to generate (-1 for unlimited)
    #[arg(short = 'n', long, allow_negative_numbers = true)]
    pub n_predict: Option<i32>,

    /// Repeat-penalty window in tokens
    #[arg(long)]
    pub repeat_last_n: Option<i32>,

    /// Context size in tokens
    #[arg(long)]
    pub ctx_size: Option<i32>,

    /// Tokens per forward-pass batch
    #[arg(short, long)]
    pub batch_size: Option<i32>,

    /// Tokens to keep from the initial prompt (-1 for all)
    #[arg(long, allow_negative_numbers = true)]
    pub keep: Option<i32>,

    #[arg(long)]
    pub top_k: Option<i32>,

    #[arg(long)]
    pub top_p: Option<f32>,

    #[arg(long)]
    pub temp: Option<f32>,

    #[arg(long)]
    pub repeat_penalty: Option<f32>,

    /// Stop generation when this text is produced (repeatable)
    #[arg(short, long = "reverse-prompt")]
    pub reverse_prompt: Vec<String>,

    /// Use a full-precision key/value cache (`--memory-f32=false` for f16)
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub memory_f32: Option<bool>,

    /// Lock the model in physical memory (`--mlock=false` to unlock)
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub mlock: Option<bool>,

    /// Initial prompt
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Text placed before each user input
    #[arg(long)]
    pub in_prefix: Option<String>,

    /// Text placed after each user input
    #[arg(long)]
    pub in_suffix: Option<String>,
}

impl ParamsArgs {
    fn mode(&self) -> SessionMode {
        if self.instruct {
            SessionMode::Instructional
        } else {
            SessionMode::Regular
        }
    }

    /// Collect the flags that were actually given.
    pub fn overrides(&self) -> ParamsFile {
        ParamsFile {
            family: self.family.map(Into::into),
            seed: self.seed,
            n_threads: self.threads,
            n_predict: self.n_predict,
            repeat_last_n: self.repeat_last_n,
            n_parts: None,
            n_ctx: self.ctx_size,
            n_batch: self.batch_size,
            n_keep: self.keep,
            top_k: self.top_k,
            top_p: self.top_p,
            temp: self.temp,
            repeat_penalty: self.repeat_penalty,
            antiprompts: (!self.reverse_prompt.is_empty()).then(|| self.reverse_prompt.clone()),
            use_f16_memory: self.memory_f32.map(|f32_memory| !f32_memory),
            keep_model_in_memory: self.mlock,
            initial_prompt: self.prompt.clone(),
            prompt_prefix: self.in_prefix.clone(),
            prompt_suffix: self.in_suffix.clone(),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        match &self.config {
            Some(path) => SessionConfig::builder()
                .model_path(&self.model)
                .mode(self.mode())
                .config_path(path)
                .overrides(self.overrides())
                .build(),
            None => SessionConfig::builder()
                .model_path(&self.model)
                .mode(self.mode())
                .overrides(self.overrides())
                .build(),
        }
    }

    fn resolve(&self) -> Result<SessionParams> {
        self.session_config()
            .resolve()
            .context("failed to resolve session parameters")
    }
}

impl Cli {
    /// Log directory and per-model log slug.
    pub fn log_context(&self) -> (Option<PathBuf>, String) {
        let model = match &self.command {
            Commands::Show { params, .. }
            | Commands::Engine { params }
            | Commands::Check { params, .. }
            | Commands::Prompt { params, .. } => &params.model,
        };
        let slug = model
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "session".to_owned());
        (self.log_dir.clone(), slug)
    }

    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Show { params, format } => show(&params.resolve()?, format),
            Commands::Engine { params } => engine(&params.resolve()?),
            Commands::Check {
                params,
                skip_model_check,
            } => check(&params.resolve()?, skip_model_check),
            Commands::Prompt { params, input } => prompt(&params.resolve()?, &input),
        }
    }
}

fn show(params: &SessionParams, format: Format) -> Result<()> {
    let out = match format {
        Format::Yaml => serde_yaml::to_string(params)?,
        Format::Json => serde_json::to_string_pretty(params)?,
    };
    println!("{}", out.trim_end());
    Ok(())
}

fn engine(params: &SessionParams) -> Result<()> {
    let engine = EngineParams::from(params);
    info!(
        seed = engine.resolve_seed(std::time::SystemTime::now()),
        "engine seed"
    );
    println!("{}", serde_json::to_string_pretty(&engine)?);
    Ok(())
}

#[instrument(skip_all, fields(model = %params.model_path().display()))]
fn check(params: &SessionParams, skip_model_check: bool) -> Result<()> {
    let report = validate(params);
    for issue in report.issues() {
        println!("{issue}");
    }
    report.into_result()?;

    if !skip_model_check {
        check_model_file(params.model_path())
            .with_context(|| format!("cannot open model {}", params.model_path().display()))?;
    }

    info!("session parameters are usable");
    println!("ok");
    Ok(())
}

fn prompt(params: &SessionParams, input: &str) -> Result<()> {
    let assembler = PromptAssembler::new(params);
    let initial = assembler.initial_prompt();
    if !initial.is_empty() {
        println!("{initial}");
    }
    println!("{}", assembler.format_input(input));
    Ok(())
}
