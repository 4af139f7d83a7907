//! [ChatBackend] over OpenAI-compatible chat completions.
//!
//! Serves OpenAI itself, Groq (`/openai/v1`) and OpenRouter. Model listing goes through plain HTTP
//! because the vendors disagree on the optional fields of the model objects.

use anyhow::{Context, Result};
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use futures::StreamExt;
use log::debug;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;

use crate::prompt::PromptPair;
use crate::providers::{ChatBackend, GenerationParams, ProviderConfig, ProviderKind};
use crate::utils::printing::ResponsePrinter;

/// Streaming chat backend built on `async-openai` with a per-provider base URL.
#[derive(Clone)]
pub struct OpenAiCompatBackend {
    kind: ProviderKind,
    client: Client<OpenAIConfig>,
}

/// HTTP client with the provider's default headers and request timeout.
pub(crate) fn build_http_client(config: &ProviderConfig) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    for &(name, value) in config.kind.extra_headers() {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }
    let mut builder = reqwest::Client::builder().default_headers(headers);
    if let Some(timeout) = config.timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().context("failed to build HTTP client")
}

impl OpenAiCompatBackend {
    pub fn new(config: &ProviderConfig, api_key: &str) -> Result<Self> {
        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(config.api_base.as_str());
        let client = Client::with_config(openai_config).with_http_client(build_http_client(config)?);
        debug!("[{}] Initialized client for {}", config.kind.label(), config.api_base);
        Ok(Self {
            kind: config.kind,
            client,
        })
    }

    #[allow(deprecated)]
    fn build_request(&self, model: &str, prompt: &PromptPair, params: &GenerationParams) -> Result<CreateChatCompletionRequest> {
        let mut messages: Vec<ChatCompletionRequestMessage> = Vec::with_capacity(2);
        if !prompt.system.is_empty() {
            messages.push(ChatCompletionRequestSystemMessageArgs::default()
                .content(prompt.system.as_str())
                .build()?
                .into());
        }
        messages.push(ChatCompletionRequestUserMessageArgs::default()
            .content(prompt.user.as_str())
            .build()?
            .into());

        let mut request = CreateChatCompletionRequestArgs::default();
        request
            .model(model)
            .messages(messages)
            .temperature(params.temperature)
            .stream(true);
        if let Some(max_tokens) = params.max_tokens {
            request.max_tokens(max_tokens);
        }
        if let Some(frequency_penalty) = params.frequency_penalty {
            request.frequency_penalty(frequency_penalty);
        }
        Ok(request.build()?)
    }
}

#[async_trait]
impl ChatBackend for OpenAiCompatBackend {
    async fn stream_chat(&self,
                         model: &str,
                         prompt: &PromptPair,
                         params: &GenerationParams,
                         printer: &mut (dyn ResponsePrinter + Send)) -> Result<String> {
        let request = self.build_request(model, prompt, params)?;
        debug!("[{}] Sending streaming request to {}", self.kind.label(), model);
        let mut stream = self.client
            .chat()
            .create_stream(request)
            .await
            .with_context(|| format!("request to {} failed", model))?;

        printer.begin()?;
        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    printer.finish()?;
                    return Err(e).with_context(|| format!("stream from {} broke after {} bytes", model, text.len()));
                }
            };
            for delta in chunk.choices.into_iter().filter_map(|choice| choice.delta.content) {
                printer.push(&delta)?;
                text.push_str(&delta);
            }
        }
        printer.finish()?;
        Ok(text)
    }
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

/// Fetches the raw model ids of a provider from `{base}/models`, unsorted.
pub async fn fetch_model_ids(config: &ProviderConfig, api_key: &str) -> Result<Vec<String>> {
    let http = build_http_client(config)?;
    let url = format!("{}/models", config.api_base);
    let list: ModelList = http
        .get(&url)
        .bearer_auth(api_key)
        .send()
        .await
        .with_context(|| format!("failed to reach {}", url))?
        .error_for_status()?
        .json()
        .await
        .context("unexpected model list format")?;
    Ok(list.data.into_iter().map(|m| m.id).collect())
}
