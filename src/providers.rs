//! # Providers
//! The endpoint of the `template -> prompt pair` pipeline is an LLM. Groq, OpenAI and OpenRouter
//! expose OpenAI-compatible chat completions and share one backend
//! ([openai_compat::OpenAiCompatBackend]); Gemini goes through its native API
//! ([gemini::GeminiBackend]) so requests can carry safety settings. A [ProviderKind] carries what
//! differs: credentials, base URL, default models and output file names.
//!
//! A [ProviderRunner] drives a [ChatBackend] and never aborts the caller's batch: credentials that
//! are missing and requests that keep failing end up as a [RunOutcome] instead of an error. Only local
//! I/O failures, such as an output file that cannot be written, are returned as errors.

use std::env;
use std::fmt;
use std::fmt::Formatter;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, error, info, warn};

use crate::inputs::ensure_dir;
use crate::prompt::PromptPair;
use crate::providers::selection::{is_chat_model, is_gemini_model, safe_model_name};
use crate::utils::printing::{ResponsePrinter, SilentPrinter};

pub mod gemini;
pub mod openai_compat;
pub mod selection;

/// Gemini models tried in order by `run` until one answers.
pub const GEMINI_MODELS_TO_TRY: [&str; 3] = [
    "models/gemini-2.5-pro",
    "models/gemini-1.5-pro",
    "models/gemini-2.0-flash",
];

/// Gemini models used by batch generation.
pub const GEMINI_BATCH_MODELS: [&str; 2] = ["models/gemini-2.5-pro", "models/gemini-2.0-flash"];

const GROQ_MODELS: [&str; 3] = ["llama-3.3-70b-versatile", "llama-3.1-8b-instant", "mixtral-8x7b-32768"];
const OPENAI_MODELS: [&str; 2] = ["gpt-4o", "gpt-4o-mini"];
const OPENROUTER_MODELS: [&str; 1] = ["deepseek/deepseek-chat"];

const OPENROUTER_HEADERS: [(&str, &str); 2] = [("http-referer", "https://automgr.local"), ("x-title", "AutoMGR Script")];

/// A curated OpenRouter model shown in the interactive menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelPreset {
    pub name: &'static str,
    pub slug: &'static str,
    pub description: &'static str,
}

pub const OPENROUTER_PRESETS: [ModelPreset; 5] = [
    ModelPreset {
        name: "DeepSeek V3 (Recomendado)",
        slug: "deepseek/deepseek-chat",
        description: "Custo-benefício excelente.",
    },
    ModelPreset {
        name: "Qwen 2.5 72B Instruct",
        slug: "qwen/qwen-2.5-72b-instruct",
        description: "Ótimo para instruções técnicas e JSON.",
    },
    ModelPreset {
        name: "Llama 3.3 70B (Meta)",
        slug: "meta-llama/llama-3.3-70b-instruct",
        description: "Estável e confiável.",
    },
    ModelPreset {
        name: "DeepSeek R1 (Raciocínio)",
        slug: "deepseek/deepseek-r1",
        description: "Bom para auditoria lógica e consistência.",
    },
    ModelPreset {
        name: "Mistral Small 3 (24B)",
        slug: "mistralai/mistral-small-24b-instruct-2501",
        description: "Barato e bem competente para lógica.",
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Gemini,
    Groq,
    OpenAi,
    OpenRouter,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [Self::Gemini, Self::Groq, Self::OpenAi, Self::OpenRouter];

    /// Lowercase identifier used on the command line and in file names.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::Groq => "groq",
            Self::OpenAi => "openai",
            Self::OpenRouter => "openrouter",
        }
    }

    /// Human readable name used in logs and menus.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Gemini => "Gemini",
            Self::Groq => "Groq",
            Self::OpenAi => "OpenAI",
            Self::OpenRouter => "OpenRouter",
        }
    }

    pub fn api_key_var(&self) -> &'static str {
        match self {
            Self::Gemini => "GOOGLE_API_KEY",
            Self::Groq => "GROQ_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
            Self::OpenRouter => "OPENROUTER_API_KEY",
        }
    }

    /// Environment variable that overrides [ProviderKind::default_api_base].
    pub fn api_base_var(&self) -> &'static str {
        match self {
            Self::Gemini => "GEMINI_API_BASE",
            Self::Groq => "GROQ_API_BASE",
            Self::OpenAi => "OPENAI_API_BASE",
            Self::OpenRouter => "OPENROUTER_API_BASE",
        }
    }

    /// Base URL of the API. Gemini uses its native API, the others their OpenAI-compatible one.
    pub fn default_api_base(&self) -> &'static str {
        match self {
            Self::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            Self::Groq => "https://api.groq.com/openai/v1",
            Self::OpenAi => "https://api.openai.com/v1",
            Self::OpenRouter => "https://openrouter.ai/api/v1",
        }
    }

    /// Known models, the first one being the default. Gemini lists its fallback chain.
    pub fn default_models(&self) -> &'static [&'static str] {
        match self {
            Self::Gemini => &GEMINI_MODELS_TO_TRY,
            Self::Groq => &GROQ_MODELS,
            Self::OpenAi => &OPENAI_MODELS,
            Self::OpenRouter => &OPENROUTER_MODELS,
        }
    }

    pub fn default_model(&self) -> &'static str {
        self.default_models()[0]
    }

    /// Headers sent with every request to this provider.
    pub fn extra_headers(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::OpenRouter => &OPENROUTER_HEADERS,
            _ => &[],
        }
    }

    /// File name of a single response. OpenRouter runs one file per model.
    ///
    /// # Example
    /// ```
    /// use automgr::providers::ProviderKind;
    ///
    /// assert_eq!(ProviderKind::Groq.output_file_name("llama-3.3-70b-versatile"), "resultado_groq.md");
    /// assert_eq!(ProviderKind::OpenRouter.output_file_name("deepseek/deepseek-chat"), "resultado_openrouter_deepseek_chat.md");
    /// ```
    pub fn output_file_name(&self, model: &str) -> String {
        match self {
            Self::OpenRouter => format!("resultado_{}_{}.md", self.name(), safe_model_name(model)),
            _ => format!("resultado_{}.md", self.name()),
        }
    }

    /// File name of the `index`-th variation produced by batch generation.
    pub fn batch_file_name(&self, model: &str, index: usize) -> String {
        format!("resultado_{}_{}_{:02}.md", self.name(), safe_model_name(model), index)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == lower)
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(ProviderKind::name).collect();
                format!("unknown provider '{}', expected one of: {}", s, names.join(", "))
            })
    }
}

/// Connection settings of one provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub api_key: Option<String>,
    pub api_base: String,
    /// Whole-request timeout, unset means no timeout.
    pub timeout: Option<Duration>,
}

impl ProviderConfig {
    pub fn new(kind: ProviderKind, api_key: Option<String>) -> Self {
        Self {
            kind,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            api_base: kind.default_api_base().to_string(),
            timeout: None,
        }
    }

    /// Reads the API key and an optional base URL override from the environment.
    pub fn from_env(kind: ProviderKind) -> Self {
        let config = Self::new(kind, env::var(kind.api_key_var()).ok());
        match env::var(kind.api_base_var()) {
            Ok(api_base) if !api_base.trim().is_empty() => config.with_api_base(api_base),
            _ => config,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[inline]
    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Sampling and retry parameters of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub frequency_penalty: Option<f32>,
    /// Tries per model, at least one is always made.
    pub attempts: u32,
    /// Pause after a failed try.
    pub retry_delay: Duration,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: Some(4000),
            frequency_penalty: None,
            attempts: 3,
            retry_delay: Duration::from_secs(2),
        }
    }
}

/// How a provider run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The full response was written to this file.
    Saved(PathBuf),
    /// The provider has no API key configured.
    SkippedNoCredential,
    /// Every try failed.
    Exhausted { attempts: u32 },
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Saved(path) => write!(f, "saved to {}", path.display()),
            Self::SkippedNoCredential => write!(f, "skipped, no API key"),
            Self::Exhausted { attempts } => write!(f, "failed after {} attempt(s)", attempts),
        }
    }
}

/// Which model ids [list_models] keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelFilter {
    /// Gemini: only `models/gemini*` ids.
    pub only_gemini: bool,
    /// OpenAI: only chat models.
    pub only_chat: bool,
}

impl Default for ModelFilter {
    fn default() -> Self {
        Self {
            only_gemini: true,
            only_chat: true,
        }
    }
}

/// Lists the models available to the configured account, sorted and deduplicated.
///
/// Best effort: a missing key or any transport error is logged and yields an empty list.
pub async fn list_models(config: &ProviderConfig, filter: ModelFilter) -> Vec<String> {
    let label = config.kind.label();
    let api_key = match &config.api_key {
        Some(api_key) => api_key,
        None => {
            warn!("[{}] Cannot list models: {} not found", label, config.kind.api_key_var());
            return Vec::new();
        }
    };
    let fetched = match config.kind {
        ProviderKind::Gemini => gemini::fetch_model_ids(config, api_key).await,
        _ => openai_compat::fetch_model_ids(config, api_key).await,
    };
    let ids = match fetched {
        Ok(ids) => ids,
        Err(e) => {
            error!("[{}] Failed to list models: {:#}", label, e);
            return Vec::new();
        }
    };
    let mut ids: Vec<String> = ids
        .into_iter()
        .filter(|id| match config.kind {
            ProviderKind::Gemini => !filter.only_gemini || is_gemini_model(id),
            ProviderKind::OpenAi => !filter.only_chat || is_chat_model(id),
            _ => true,
        })
        .collect();
    ids.sort();
    ids.dedup();
    debug!("[{}] {} models listed", label, ids.len());
    ids
}

/// Streams one chat completion.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Sends the prompt pair to `model`, pushes every received chunk to `printer` and returns the full
    /// response text.
    async fn stream_chat(&self,
                         model: &str,
                         prompt: &PromptPair,
                         params: &GenerationParams,
                         printer: &mut (dyn ResponsePrinter + Send)) -> Result<String>;
}

/// `true` if the error says the model does not exist, in which case trying it again is pointless.
pub fn is_model_not_found(err: &anyhow::Error) -> bool {
    let message = format!("{:#}", err).to_lowercase();
    message.contains("404") || message.contains("not found")
}

fn write_response(path: &Path, text: &str) -> Result<()> {
    fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))
}

/// Runs prompts against one provider. A runner without a backend has no credentials.
pub struct ProviderRunner<B: ChatBackend> {
    kind: ProviderKind,
    backend: Option<B>,
}

impl<B: ChatBackend> ProviderRunner<B> {
    pub fn new(kind: ProviderKind, backend: Option<B>) -> Self {
        Self { kind, backend }
    }

    fn backend(&self) -> Option<&B> {
        if self.backend.is_none() {
            warn!("[{}] Skipped: {} not found", self.kind.label(), self.kind.api_key_var());
        }
        self.backend.as_ref()
    }

    /// Tries `model` up to `params.attempts` times with a constant pause between tries.
    pub async fn run(&self,
                     prompt: &PromptPair,
                     outdir: &Path,
                     model: &str,
                     params: &GenerationParams,
                     printer: &mut (dyn ResponsePrinter + Send)) -> Result<RunOutcome> {
        let label = self.kind.label();
        info!("[{}] Starting with model {}", label, model);
        let backend = match self.backend() {
            Some(backend) => backend,
            None => return Ok(RunOutcome::SkippedNoCredential),
        };
        ensure_dir(outdir)?;

        let attempts = params.attempts.max(1);
        for attempt in 1..=attempts {
            match backend.stream_chat(model, prompt, params, printer).await {
                Ok(text) => {
                    let path = outdir.join(self.kind.output_file_name(model));
                    write_response(&path, &text)?;
                    info!("[{}] Success, saved to '{}'", label, path.display());
                    return Ok(RunOutcome::Saved(path));
                }
                Err(e) => {
                    warn!("[{}] Error (attempt {}/{}): {:#}", label, attempt, attempts, e);
                    if attempt < attempts {
                        tokio::time::sleep(params.retry_delay).await;
                    }
                }
            }
        }
        Ok(RunOutcome::Exhausted { attempts })
    }

    /// Tries each model once, in order, and keeps the first response.
    ///
    /// A model that does not exist is skipped at once; other failures are followed by the retry pause.
    pub async fn run_first_available(&self,
                                     prompt: &PromptPair,
                                     outdir: &Path,
                                     models: &[String],
                                     params: &GenerationParams,
                                     printer: &mut (dyn ResponsePrinter + Send)) -> Result<RunOutcome> {
        let label = self.kind.label();
        info!("[{}] Starting", label);
        let backend = match self.backend() {
            Some(backend) => backend,
            None => return Ok(RunOutcome::SkippedNoCredential),
        };
        ensure_dir(outdir)?;

        for model in models {
            info!("[{}] Trying model {}", label, model);
            match backend.stream_chat(model, prompt, params, printer).await {
                Ok(text) => {
                    let path = outdir.join(self.kind.output_file_name(model));
                    write_response(&path, &text)?;
                    info!("[{}] Success with {}, saved to '{}'", label, model, path.display());
                    return Ok(RunOutcome::Saved(path));
                }
                Err(e) if is_model_not_found(&e) => {
                    debug!("[{}] Model {} not available: {:#}", label, model, e);
                }
                Err(e) => {
                    error!("[{}] Error ({}): {:#}", label, model, e);
                    tokio::time::sleep(params.retry_delay).await;
                }
            }
        }
        error!("[{}] No model worked, check the API key and its permissions", label);
        Ok(RunOutcome::Exhausted { attempts: models.len() as u32 })
    }

    /// Generates `count` variations per model, each in its own file, pausing `pause` between the
    /// successful generations of a model. Failed generations are logged and skipped.
    pub async fn run_batch(&self,
                           prompt: &PromptPair,
                           outdir: &Path,
                           models: &[String],
                           count: usize,
                           params: &GenerationParams,
                           pause: Duration) -> Result<Vec<PathBuf>> {
        let label = self.kind.label();
        info!("[{}] Batch generation", label);
        let backend = match self.backend() {
            Some(backend) => backend,
            None => return Ok(Vec::new()),
        };
        ensure_dir(outdir)?;

        let mut outputs = Vec::new();
        for model in models {
            info!("[{}] Model {}: {} variations", label, model, count);
            for index in 1..=count {
                let path = outdir.join(self.kind.batch_file_name(model, index));
                info!("Generating {}/{} -> {}", index, count, path.display());
                match backend.stream_chat(model, prompt, params, &mut SilentPrinter).await {
                    Ok(text) => {
                        write_response(&path, &text)?;
                        outputs.push(path);
                        if index < count {
                            tokio::time::sleep(pause).await;
                        }
                    }
                    Err(e) => {
                        error!("[{}] Generation {}/{} failed: {:#}", label, index, count, e);
                        tokio::time::sleep(params.retry_delay).await;
                    }
                }
            }
        }
        Ok(outputs)
    }
}

/// The backend a provider is reached through.
#[derive(Clone)]
pub enum ProviderBackend {
    OpenAiCompat(openai_compat::OpenAiCompatBackend),
    Gemini(gemini::GeminiBackend),
}

impl ProviderBackend {
    pub fn new(config: &ProviderConfig, api_key: &str) -> Result<Self> {
        Ok(match config.kind {
            ProviderKind::Gemini => Self::Gemini(gemini::GeminiBackend::new(config, api_key)?),
            _ => Self::OpenAiCompat(openai_compat::OpenAiCompatBackend::new(config, api_key)?),
        })
    }
}

#[async_trait]
impl ChatBackend for ProviderBackend {
    async fn stream_chat(&self,
                         model: &str,
                         prompt: &PromptPair,
                         params: &GenerationParams,
                         printer: &mut (dyn ResponsePrinter + Send)) -> Result<String> {
        match self {
            Self::OpenAiCompat(backend) => backend.stream_chat(model, prompt, params, printer).await,
            Self::Gemini(backend) => backend.stream_chat(model, prompt, params, printer).await,
        }
    }
}

impl ProviderRunner<ProviderBackend> {
    /// A runner over the provider's API, without a backend if the config has no key.
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let backend = match &config.api_key {
            Some(api_key) => Some(ProviderBackend::new(config, api_key)?),
            None => None,
        };
        Ok(Self::new(config.kind, backend))
    }
}
