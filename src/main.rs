//! automgr CLI: assembles the MGR prompt and runs it through the LLM providers.
//!
//! Usage:
//!   automgr run                 Gemini, Groq and OpenAI in sequence
//!   automgr openrouter          OpenRouter, from a preset menu or --model
//!   automgr gemini-batch        several variations per Gemini model
//!   automgr list-gemini-models  Gemini models available to the key
//!   automgr models              models available per provider

use std::env;
use std::io::{stdin, stdout};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use log::{debug, info, warn};

use automgr::inputs::{default_dados_path, default_outdir, default_template_path, load_json, load_text, write_debug_prompt};
use automgr::prompt::{build_prompts, PromptPair, DEFAULT_SEPARATOR};
use automgr::providers::selection::{prompt_menu, select_models, MenuChoice, SelectOptions, Selection};
use automgr::providers::{
    list_models, GenerationParams, ModelFilter, ProviderConfig, ProviderKind, ProviderRunner, RunOutcome,
    GEMINI_BATCH_MODELS, GEMINI_MODELS_TO_TRY, OPENROUTER_PRESETS,
};
use automgr::utils::printing::{PlainPrinter, ResponsePrinter};
use automgr::utils::string::get_placeholders;
use automgr::utils::token::tiktoken::Tiktoken;
use automgr::utils::token::PromptTokenCount;

const OPENAI_FREQUENCY_PENALTY: f32 = 0.3;
const GEMINI_RETRY_DELAY: Duration = Duration::from_secs(1);
const MAX_BATCH_PAUSE_SECS: f64 = 86_400.0;
const NO_MODELS_EXIT_CODE: u8 = 2;
const RUN_PROVIDERS: [ProviderKind; 3] = [ProviderKind::Gemini, ProviderKind::Groq, ProviderKind::OpenAi];

#[derive(Parser)]
#[command(name = "automgr", version, about = "AutoMGR - MGR document generation through LLMs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run Gemini, Groq and OpenAI in sequence
    Run(RunArgs),
    /// Run through OpenRouter (preset menu or --model)
    Openrouter(OpenRouterArgs),
    /// Generate several versions with Gemini
    GeminiBatch(GeminiBatchArgs),
    /// List the Gemini models available to your account
    ListGeminiModels,
    /// List the available models per provider
    Models(ModelsArgs),
}

#[derive(Args, Debug)]
struct IoArgs {
    /// Input JSON path (default: inputs/dados.json)
    #[arg(long)]
    dados: Option<PathBuf>,

    /// Template path (default: inputs/prompt_template.txt)
    #[arg(long)]
    template: Option<PathBuf>,

    /// Output directory (default: outputs/)
    #[arg(long)]
    outdir: Option<PathBuf>,

    /// Indentation of the JSON blocks in the prompt; 0 for compact, single-line JSON
    #[arg(long, default_value_t = 2, allow_negative_numbers = true)]
    json_indent: i64,
}

#[derive(Args, Debug)]
struct DisplayArgs {
    /// Render the streamed response as markdown in the terminal
    #[arg(long)]
    render_markdown: bool,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    io: IoArgs,

    /// Only run the given provider (gemini, groq or openai); repeat the flag for more
    #[arg(long = "provider", value_parser = parse_run_provider)]
    providers: Vec<ProviderKind>,

    #[arg(long, default_value_t = 0.2)]
    temperature: f32,

    #[arg(long, default_value_t = 4000)]
    max_tokens: u32,

    #[arg(long, default_value_t = 3)]
    attempts: u32,

    /// Show a menu to choose the models (interactive)
    #[arg(long)]
    select_models: bool,

    /// Gemini model to try; repeat for more (default: recommended list)
    #[arg(long = "gemini-model")]
    gemini_models: Vec<String>,

    #[arg(long, default_value = "llama-3.3-70b-versatile")]
    groq_model: String,

    #[arg(long, default_value = "gpt-4o")]
    openai_model: String,

    #[command(flatten)]
    display: DisplayArgs,
}

#[derive(Args, Debug)]
struct OpenRouterArgs {
    #[command(flatten)]
    io: IoArgs,

    /// Model slug (e.g. deepseek/deepseek-chat); opens the preset menu when omitted
    #[arg(long)]
    model: Option<String>,

    /// List the OpenRouter models and pick one (the list is long)
    #[arg(long)]
    select_model: bool,

    #[arg(long, default_value_t = 0.2)]
    temperature: f32,

    #[arg(long, default_value_t = 4000)]
    max_tokens: u32,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 120)]
    timeout: u64,

    #[command(flatten)]
    display: DisplayArgs,
}

#[derive(Args, Debug)]
struct GeminiBatchArgs {
    #[command(flatten)]
    io: IoArgs,

    /// Gemini model; repeat for more (default: 2.5-pro and 2.0-flash)
    #[arg(long = "model")]
    models: Vec<String>,

    /// Variations per model
    #[arg(long, default_value_t = 3)]
    count: usize,

    #[arg(long, default_value_t = 0.4)]
    temperature: f32,

    /// Pause between generations, in seconds
    #[arg(long, default_value_t = 2.0)]
    sleep: f64,
}

#[derive(Args, Debug)]
struct ModelsArgs {
    /// Only list the given provider; repeat the flag for more (default: all)
    #[arg(long = "provider")]
    providers: Vec<ProviderKind>,

    /// Substring filter, e.g. 'gemini-2.5', 'llama', 'deepseek'
    #[arg(long)]
    filter: Option<String>,

    /// How many models to show per provider; 0 shows all
    #[arg(long, default_value_t = 50)]
    limit: usize,

    /// (Gemini) only show models/gemini* models
    #[arg(long)]
    only_gemini: bool,

    /// (OpenAI) include models other than chat models
    #[arg(long)]
    all_openai_models: bool,
}

fn parse_run_provider(s: &str) -> Result<ProviderKind, String> {
    match s.parse()? {
        ProviderKind::OpenRouter => Err("openrouter has its own command: automgr openrouter".to_string()),
        kind => Ok(kind),
    }
}

/// `--json-indent`: a positive width pretty-prints, anything else gives single-line JSON.
fn json_indent_width(flag: i64) -> Option<usize> {
    usize::try_from(flag).ok().filter(|width| *width > 0)
}

/// `--sleep` in seconds, clamped to a day. Negative and NaN values mean no pause.
fn batch_pause(seconds: f64) -> Duration {
    Duration::from_secs_f64(seconds.max(0.0).min(MAX_BATCH_PAUSE_SECS))
}

/// Providers of `run` in the order given, without repeats. None given means all of them.
fn run_providers(requested: Vec<ProviderKind>) -> Vec<ProviderKind> {
    if requested.is_empty() {
        return RUN_PROVIDERS.to_vec();
    }
    let mut providers = Vec::with_capacity(requested.len());
    for kind in requested {
        if !providers.contains(&kind) {
            providers.push(kind);
        }
    }
    providers
}

fn listing_exit_code(models: &[String]) -> u8 {
    if models.is_empty() {
        NO_MODELS_EXIT_CODE
    } else {
        0
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_target(false)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run(args) => cmd_run(args).await,
        Commands::Openrouter(args) => cmd_openrouter(args).await,
        Commands::GeminiBatch(args) => cmd_gemini_batch(args).await,
        Commands::ListGeminiModels => cmd_list_gemini_models().await,
        Commands::Models(args) => cmd_models(args).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

// ── Prompt assembly ─────────────────────────────────────────────────

fn load_and_build_prompts(io: &IoArgs) -> Result<PromptPair> {
    let cwd = env::current_dir()?;
    let dados_path = match &io.dados {
        Some(path) => path.clone(),
        None => default_dados_path(&cwd)?,
    };
    let template_path = match &io.template {
        Some(path) => path.clone(),
        None => default_template_path(&cwd)?,
    };

    let dados = load_json(&dados_path)?;
    let template_text = load_text(&template_path)?;

    Ok(build_prompts(&dados, &template_text, DEFAULT_SEPARATOR, json_indent_width(io.json_indent)))
}

fn log_prompt_diagnostics(prompt: &PromptPair) {
    let mut unfilled: Vec<String> = get_placeholders(&prompt.user).into_iter().collect();
    unfilled.sort();
    for name in unfilled {
        warn!("Placeholder {{{{{}}}}} has no value in the data file", name);
    }

    match Tiktoken::new() {
        Ok(counter) => {
            let count = PromptTokenCount::new(prompt, &counter);
            info!("Prompt size: ~{} tokens (system {}, user {})", count.total(), count.system, count.user);
        }
        Err(e) => debug!("Token counter unavailable: {:#}", e),
    }
}

/// Builds the prompt pair and writes the debug file before any provider runs.
fn prepare(io: &IoArgs) -> Result<(PromptPair, PathBuf)> {
    let outdir = match &io.outdir {
        Some(outdir) => outdir.clone(),
        None => default_outdir(&env::current_dir()?),
    };
    let prompt = load_and_build_prompts(io)?;
    let debug_path = write_debug_prompt(&outdir, &prompt)?;
    info!("Prompt assembled. Debug file: {}", debug_path.display());
    log_prompt_diagnostics(&prompt);
    Ok((prompt, outdir))
}

// ── Terminal helpers ────────────────────────────────────────────────

#[cfg(feature = "terminal_printing")]
fn make_printer(render_markdown: bool) -> Result<Box<dyn ResponsePrinter + Send>> {
    use automgr::utils::printing::IncrementalMarkdownPrinter;
    use termimad::crossterm::{cursor, ExecutableCommand};

    if !render_markdown {
        return Ok(Box::new(PlainPrinter));
    }
    // the markdown printer hides the cursor, bring it back on Ctrl-C
    ctrlc::set_handler(|| {
        let _ = stdout().execute(cursor::Show);
        std::process::exit(130);
    })?;
    Ok(Box::new(IncrementalMarkdownPrinter::default()))
}

#[cfg(not(feature = "terminal_printing"))]
fn make_printer(render_markdown: bool) -> Result<Box<dyn ResponsePrinter + Send>> {
    if render_markdown {
        warn!("Built without terminal_printing, printing plain text");
    }
    Ok(Box::new(PlainPrinter))
}

fn ask_models(kind: ProviderKind, available: &[String], default: &[String], allow_multiple: bool) -> Result<Selection> {
    let select = SelectOptions {
        default,
        allow_multiple,
        ..SelectOptions::default()
    };
    Ok(select_models(kind.label(), available, &select, &mut stdin().lock(), &mut stdout())?)
}

fn report(outcomes: &[(String, RunOutcome)]) {
    for (name, outcome) in outcomes {
        info!("[{}] {}", name, outcome);
    }
    info!("All runs finished.");
}

// ── Commands ────────────────────────────────────────────────────────

async fn cmd_run(args: RunArgs) -> Result<ExitCode> {
    let (prompt, outdir) = prepare(&args.io)?;

    let mut providers = run_providers(args.providers);

    let mut gemini_models = if args.gemini_models.is_empty() {
        GEMINI_MODELS_TO_TRY.iter().map(|m| m.to_string()).collect()
    } else {
        args.gemini_models
    };
    let mut groq_model = args.groq_model;
    let mut openai_model = args.openai_model;

    if args.select_models {
        for kind in providers.clone() {
            let available = list_models(&ProviderConfig::from_env(kind), ModelFilter::default()).await;
            let selection = match kind {
                ProviderKind::Gemini => ask_models(kind, &available, &gemini_models, true)?,
                ProviderKind::Groq => ask_models(kind, &available, &[groq_model.clone()], false)?,
                _ => ask_models(kind, &available, &[openai_model.clone()], false)?,
            };
            match selection {
                Selection::KeepDefault => {}
                Selection::Skip => providers.retain(|k| *k != kind),
                Selection::Chosen(models) => match kind {
                    ProviderKind::Gemini => gemini_models = models,
                    ProviderKind::Groq => groq_model = models.into_iter().next().unwrap_or(groq_model),
                    _ => openai_model = models.into_iter().next().unwrap_or(openai_model),
                },
            }
        }
    }

    let mut printer = make_printer(args.display.render_markdown)?;
    let mut outcomes = Vec::new();
    for kind in providers {
        let runner = ProviderRunner::from_config(&ProviderConfig::from_env(kind))?;
        let outcome = match kind {
            ProviderKind::Gemini => {
                let params = GenerationParams {
                    temperature: args.temperature,
                    max_tokens: None,
                    attempts: 1,
                    retry_delay: GEMINI_RETRY_DELAY,
                    ..GenerationParams::default()
                };
                runner.run_first_available(&prompt, &outdir, &gemini_models, &params, printer.as_mut()).await?
            }
            ProviderKind::OpenAi => {
                let params = GenerationParams {
                    temperature: args.temperature,
                    max_tokens: None,
                    frequency_penalty: Some(OPENAI_FREQUENCY_PENALTY),
                    attempts: args.attempts,
                    ..GenerationParams::default()
                };
                runner.run(&prompt, &outdir, &openai_model, &params, printer.as_mut()).await?
            }
            _ => {
                let params = GenerationParams {
                    temperature: args.temperature,
                    max_tokens: Some(args.max_tokens),
                    attempts: args.attempts,
                    ..GenerationParams::default()
                };
                let model = if kind == ProviderKind::Groq { groq_model.as_str() } else { kind.default_model() };
                runner.run(&prompt, &outdir, model, &params, printer.as_mut()).await?
            }
        };
        outcomes.push((kind.label().to_string(), outcome));
    }

    report(&outcomes);
    Ok(ExitCode::SUCCESS)
}

fn openrouter_menu() -> Result<Vec<String>> {
    let choice = prompt_menu(&OPENROUTER_PRESETS, &mut stdin().lock(), &mut stdout())?;
    Ok(match choice {
        MenuChoice::All => OPENROUTER_PRESETS.iter().map(|preset| preset.slug.to_string()).collect(),
        MenuChoice::Preset(slug) => vec![slug.to_string()],
        MenuChoice::Custom(slug) => vec![slug],
        MenuChoice::Invalid => {
            println!("Invalid option.");
            Vec::new()
        }
    })
}

async fn cmd_openrouter(args: OpenRouterArgs) -> Result<ExitCode> {
    let (prompt, outdir) = prepare(&args.io)?;
    let config = ProviderConfig::from_env(ProviderKind::OpenRouter).with_timeout(Duration::from_secs(args.timeout));
    if !config.has_credentials() {
        warn!("[OpenRouter] Skipped: {} not found", ProviderKind::OpenRouter.api_key_var());
        return Ok(ExitCode::SUCCESS);
    }

    let models = match args.model {
        Some(model) => vec![model],
        None if args.select_model => {
            let available = list_models(&config, ModelFilter::default()).await;
            let default: Vec<String> = OPENROUTER_PRESETS.iter().map(|preset| preset.slug.to_string()).collect();
            match ask_models(ProviderKind::OpenRouter, &available, &default, false)? {
                Selection::Skip => return Ok(ExitCode::SUCCESS),
                Selection::Chosen(models) => models,
                Selection::KeepDefault => openrouter_menu()?,
            }
        }
        None => openrouter_menu()?,
    };

    let runner = ProviderRunner::from_config(&config)?;
    let params = GenerationParams {
        temperature: args.temperature,
        max_tokens: Some(args.max_tokens),
        attempts: 1,
        ..GenerationParams::default()
    };
    let mut printer = make_printer(args.display.render_markdown)?;
    let mut outcomes = Vec::new();
    for model in models {
        let outcome = runner.run(&prompt, &outdir, &model, &params, printer.as_mut()).await?;
        outcomes.push((format!("OpenRouter {}", model), outcome));
    }

    report(&outcomes);
    Ok(ExitCode::SUCCESS)
}

async fn cmd_gemini_batch(args: GeminiBatchArgs) -> Result<ExitCode> {
    let (prompt, outdir) = prepare(&args.io)?;
    let runner = ProviderRunner::from_config(&ProviderConfig::from_env(ProviderKind::Gemini))?;

    let models = if args.models.is_empty() {
        GEMINI_BATCH_MODELS.iter().map(|m| m.to_string()).collect()
    } else {
        args.models
    };
    let params = GenerationParams {
        temperature: args.temperature,
        max_tokens: None,
        attempts: 1,
        retry_delay: GEMINI_RETRY_DELAY,
        ..GenerationParams::default()
    };
    let outputs = runner.run_batch(&prompt, &outdir, &models, args.count, &params, batch_pause(args.sleep)).await?;
    info!("{} file(s) generated", outputs.len());
    for path in outputs {
        println!("{}", path.display());
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_list_gemini_models() -> Result<ExitCode> {
    println!("Listing Gemini models (generateContent)...");
    println!("{}", "-".repeat(40));
    let filter = ModelFilter {
        only_gemini: false,
        ..ModelFilter::default()
    };
    let models = list_models(&ProviderConfig::from_env(ProviderKind::Gemini), filter).await;
    if models.is_empty() {
        warn!("No models found (check the API key).");
    }
    for model in &models {
        println!("{}", model);
    }
    Ok(ExitCode::from(listing_exit_code(&models)))
}

async fn cmd_models(args: ModelsArgs) -> Result<ExitCode> {
    let providers = if args.providers.is_empty() { ProviderKind::ALL.to_vec() } else { args.providers };
    let text_filter = args.filter.unwrap_or_default().trim().to_lowercase();
    let filter = ModelFilter {
        only_gemini: args.only_gemini,
        only_chat: !args.all_openai_models,
    };

    for kind in providers {
        println!("\n{}", "=".repeat(60));
        println!("Provider: {}", kind);
        println!("{}", "-".repeat(60));

        let models: Vec<String> = list_models(&ProviderConfig::from_env(kind), filter)
            .await
            .into_iter()
            .filter(|model| text_filter.is_empty() || model.to_lowercase().contains(&text_filter))
            .collect();
        if models.is_empty() {
            println!("No models found.");
            continue;
        }

        let shown = if args.limit > 0 { args.limit.min(models.len()) } else { models.len() };
        for model in &models[..shown] {
            println!("{}", model);
        }
        if shown < models.len() {
            println!("... (+{} models; raise it with --limit)", models.len() - shown);
        }
    }
    Ok(ExitCode::SUCCESS)
}
