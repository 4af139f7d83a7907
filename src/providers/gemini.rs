//! [ChatBackend] over Gemini's native `streamGenerateContent` API.
//!
//! The native API takes per-request safety settings, which the OpenAI-compatible endpoint has no
//! field for. Every request relaxes the four adjustable harm categories to `BLOCK_NONE`.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::prompt::PromptPair;
use crate::providers::openai_compat::build_http_client;
use crate::providers::{ChatBackend, GenerationParams, ProviderConfig};
use crate::utils::printing::ResponsePrinter;

const GENERATE_METHOD: &str = "generateContent";
const PAGE_SIZE: u32 = 1000;
const SSE_DATA_PREFIX: &str = "data:";

const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];
const BLOCK_NONE: &str = "BLOCK_NONE";

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Serialize, Debug)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize, Debug)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
}

#[derive(Serialize, Debug)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Deserialize, Debug)]
struct ResponseChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelList {
    #[serde(default)]
    models: Vec<Model>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Model {
    name: String,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

/// Model ids as the native API names them, `models/<id>`.
pub fn normalize_gemini_id(name: &str) -> String {
    if name.starts_with("models/") {
        name.to_string()
    } else {
        format!("models/{}", name)
    }
}

fn build_request<'a>(prompt: &'a PromptPair, params: &GenerationParams) -> GenerateContentRequest<'a> {
    let system_instruction = (!prompt.system.is_empty()).then(|| Content {
        role: None,
        parts: vec![Part { text: &prompt.system }],
    });
    GenerateContentRequest {
        system_instruction,
        contents: vec![Content {
            role: Some("user"),
            parts: vec![Part { text: &prompt.user }],
        }],
        generation_config: GenerationConfig {
            temperature: params.temperature,
            max_output_tokens: params.max_tokens,
            frequency_penalty: params.frequency_penalty,
        },
        safety_settings: SAFETY_CATEGORIES
            .iter()
            .map(|&category| SafetySetting {
                category,
                threshold: BLOCK_NONE,
            })
            .collect(),
    }
}

/// Text carried by one SSE line, `None` for lines without a data payload.
fn chunk_text(line: &str) -> Result<Option<String>> {
    let data = match line.trim().strip_prefix(SSE_DATA_PREFIX) {
        Some(data) => data.trim(),
        None => return Ok(None),
    };
    if data.is_empty() {
        return Ok(None);
    }
    let chunk: ResponseChunk = serde_json::from_str(data).context("unexpected stream chunk format")?;
    let text: String = chunk
        .candidates
        .into_iter()
        .filter_map(|candidate| candidate.content)
        .flat_map(|content| content.parts)
        .filter_map(|part| part.text)
        .collect();
    Ok(Some(text))
}

/// Removes the complete lines from `buffer`. Lines are only decoded once whole, so multi-byte
/// characters split across network chunks survive.
fn drain_lines(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
        let line: Vec<u8> = buffer.drain(..=newline_pos).collect();
        lines.push(String::from_utf8_lossy(&line).into_owned());
    }
    lines
}

/// Streaming chat backend on Gemini's native API.
#[derive(Clone)]
pub struct GeminiBackend {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
}

impl GeminiBackend {
    pub fn new(config: &ProviderConfig, api_key: &str) -> Result<Self> {
        debug!("[{}] Initialized client for {}", config.kind.label(), config.api_base);
        Ok(Self {
            http: build_http_client(config)?,
            api_base: config.api_base.clone(),
            api_key: api_key.to_string(),
        })
    }

    fn stream_url(&self, model: &str) -> String {
        format!("{}/{}:streamGenerateContent", self.api_base, normalize_gemini_id(model))
    }
}

#[async_trait]
impl ChatBackend for GeminiBackend {
    async fn stream_chat(&self,
                         model: &str,
                         prompt: &PromptPair,
                         params: &GenerationParams,
                         printer: &mut (dyn ResponsePrinter + Send)) -> Result<String> {
        let request = build_request(prompt, params);
        debug!("[Gemini] Sending streaming request to {}", model);
        let mut response = self.http
            .post(self.stream_url(model))
            .query(&[("alt", "sse")])
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("request to {} failed", model))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Gemini API HTTP {}: {}", status, body.trim());
        }

        printer.begin()?;
        let mut text = String::new();
        let mut buffer = Vec::new();
        loop {
            let bytes = match response.chunk().await {
                Ok(Some(bytes)) => bytes,
                Ok(None) => break,
                Err(e) => {
                    printer.finish()?;
                    return Err(e).with_context(|| format!("stream from {} broke after {} bytes", model, text.len()));
                }
            };
            buffer.extend_from_slice(&bytes);
            for line in drain_lines(&mut buffer) {
                if let Some(delta) = chunk_text(&line)? {
                    printer.push(&delta)?;
                    text.push_str(&delta);
                }
            }
        }
        if let Some(delta) = chunk_text(&String::from_utf8_lossy(&buffer))? {
            printer.push(&delta)?;
            text.push_str(&delta);
        }
        printer.finish()?;
        Ok(text)
    }
}

/// Lists the models that support `generateContent`, following pagination. Ids carry `models/`.
pub async fn fetch_model_ids(config: &ProviderConfig, api_key: &str) -> Result<Vec<String>> {
    let http = build_http_client(config)?;
    let url = format!("{}/models", config.api_base);
    let mut ids = Vec::new();
    let mut page_token: Option<String> = None;
    loop {
        let mut query = vec![("pageSize", PAGE_SIZE.to_string())];
        if let Some(token) = page_token.take() {
            query.push(("pageToken", token));
        }
        let page: ModelList = http
            .get(&url)
            .header("x-goog-api-key", api_key)
            .query(&query)
            .send()
            .await
            .with_context(|| format!("failed to reach {}", url))?
            .error_for_status()?
            .json()
            .await
            .context("unexpected model list format")?;
        ids.extend(page.models
            .into_iter()
            .filter(|m| m.supported_generation_methods.iter().any(|method| method == GENERATE_METHOD))
            .map(|m| normalize_gemini_id(&m.name)));
        match page.next_page_token.filter(|token| !token.is_empty()) {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }
    Ok(ids)
}

#[cfg(test)]
mod test_gemini {
    use serde_json::json;

    use super::{build_request, chunk_text, drain_lines, normalize_gemini_id, GeminiBackend, ModelList};
    use crate::prompt::PromptPair;
    use crate::providers::{GenerationParams, ProviderConfig, ProviderKind};

    #[test]
    fn test_request_carries_safety_settings() {
        let prompt = PromptPair::new("sys", "user");
        let params = GenerationParams {
            temperature: 0.5,
            ..GenerationParams::default()
        };
        let request = serde_json::to_value(build_request(&prompt, &params)).unwrap();
        assert_eq!(request["systemInstruction"], json!({"parts": [{"text": "sys"}]}));
        assert_eq!(request["contents"], json!([{"role": "user", "parts": [{"text": "user"}]}]));
        assert_eq!(request["generationConfig"], json!({"temperature": 0.5, "maxOutputTokens": 4000}));
        assert_eq!(request["safetySettings"], json!([
            {"category": "HARM_CATEGORY_HARASSMENT", "threshold": "BLOCK_NONE"},
            {"category": "HARM_CATEGORY_HATE_SPEECH", "threshold": "BLOCK_NONE"},
            {"category": "HARM_CATEGORY_SEXUALLY_EXPLICIT", "threshold": "BLOCK_NONE"},
            {"category": "HARM_CATEGORY_DANGEROUS_CONTENT", "threshold": "BLOCK_NONE"}
        ]));
    }

    #[test]
    fn test_request_without_system_prompt() {
        let prompt = PromptPair::new("", "user");
        let params = GenerationParams {
            temperature: 0.25,
            max_tokens: None,
            ..GenerationParams::default()
        };
        let request = serde_json::to_value(build_request(&prompt, &params)).unwrap();
        assert!(request.get("systemInstruction").is_none());
        assert_eq!(request["generationConfig"], json!({"temperature": 0.25}));
    }

    #[test]
    fn test_chunk_text() {
        let line = r#"data: {"candidates": [{"content": {"parts": [{"text": "Mapa "}, {"text": "de riscos"}], "role": "model"}}]}"#;
        assert_eq!(chunk_text(line).unwrap().as_deref(), Some("Mapa de riscos"));
        assert_eq!(chunk_text(r#"data: {"candidates": [{"finishReason": "STOP"}]}"#).unwrap().as_deref(), Some(""));
        assert_eq!(chunk_text("").unwrap(), None);
        assert_eq!(chunk_text(": keep-alive").unwrap(), None);
        assert!(chunk_text("data: {not json").is_err());
    }

    #[test]
    fn test_drain_lines_keeps_split_characters() {
        let text = "data: ação\n";
        let bytes = text.as_bytes();
        // split inside the two-byte "ç"
        let split = text.find('ç').unwrap() + 1;
        let mut buffer = bytes[..split].to_vec();
        assert!(drain_lines(&mut buffer).is_empty());
        buffer.extend_from_slice(&bytes[split..]);
        assert_eq!(drain_lines(&mut buffer), vec!["data: ação\n"]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_stream_url() {
        let config = ProviderConfig::new(ProviderKind::Gemini, Some("k".to_string()));
        let backend = GeminiBackend::new(&config, "k").unwrap();
        assert_eq!(
            backend.stream_url("gemini-2.0-flash"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:streamGenerateContent"
        );
        assert_eq!(
            backend.stream_url("models/gemini-2.5-pro"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-pro:streamGenerateContent"
        );
    }

    #[test]
    fn test_model_list_format() {
        let page: ModelList = serde_json::from_str(r#"{
            "models": [
                {"name": "models/gemini-2.0-flash", "supportedGenerationMethods": ["generateContent", "countTokens"]},
                {"name": "models/text-embedding-004", "supportedGenerationMethods": ["embedContent"]}
            ],
            "nextPageToken": "abc"
        }"#).unwrap();
        assert_eq!(page.models.len(), 2);
        assert_eq!(page.models[0].supported_generation_methods[0], "generateContent");
        assert_eq!(page.next_page_token.as_deref(), Some("abc"));
    }

    #[test]
    fn test_normalize_gemini_id() {
        assert_eq!(normalize_gemini_id("gemini-2.5-pro"), "models/gemini-2.5-pro");
        assert_eq!(normalize_gemini_id("models/gemini-2.5-pro"), "models/gemini-2.5-pro");
    }
}
