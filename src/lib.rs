//! # automgr
//!
//! Assembles the prompt that drafts an MGR document from the structured ETP and TR contents of a
//! procurement process, then hands it to one or more LLM providers and saves what they write.
//!
//! ## Usage
//! The `automgr` binary reads `inputs/dados.json` and `inputs/prompt_template.txt` (or the same files
//! at the project root), writes the assembled prompt to `outputs/prompt_montado_debug.txt` and runs the
//! selected providers one after another:
//!
//! ```text
//! automgr run --provider groq --provider openai
//! automgr openrouter --model deepseek/deepseek-chat
//! automgr gemini-batch --count 3
//! automgr models --filter llama
//! ```
//!
//! API keys are read from the environment or a `.env` file.
//!
//! ## Concepts
//!
//! ### Data document
//!
//! A JSON object with three fields of interest:
//!
//! * `metadados`: flat key/value pairs, such as the name of the agency or the process number.
//! * `etp_conteudo`: the ETP content block, any JSON.
//! * `tr_conteudo`: the TR content block, any JSON.
//!
//! ### Template and placeholders
//!
//! A template holds the system prompt and the user prompt, divided by `___SEPARADOR___`:
//!
//! ```text
//! You are a public procurement analyst.
//! ___SEPARADOR___
//! Agency: {{ORGAO}}
//! ETP: {{ETP_CONTEUDO}}
//! TR: {{TR_CONTEUDO}}
//! ```
//!
//! `{{ORGAO}}` is filled from `metadados`. `{{ETP_CONTEUDO}}` and `{{TR_CONTEUDO}}` are filled with the
//! content blocks after cleaning: bookkeeping fields (`id`, `fk_processo`, `created_at`, ...), nulls and
//! empty branches are removed so the model only sees what matters. See [utils::json::clean_json].
//!
//! Assembly never fails on partial data: a placeholder without a value stays as it is and a missing
//! block renders as an empty string. See [prompt::build_prompts].
//!
//! ### Providers
//!
//! Groq, OpenAI and OpenRouter are reached through their OpenAI-compatible APIs, Gemini through its
//! native API with relaxed safety settings. A provider
//! without a key is skipped, a failing one is retried a fixed number of times and then given up on, and
//! neither stops the remaining providers. See [providers].

pub mod prompt;
pub mod filler;
pub mod inputs;
pub mod providers;
pub mod utils;
