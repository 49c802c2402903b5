use std::time::Duration;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

lazy_static! {
    static ref MODEL_NAME: Regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").unwrap();
}

/// Acknowledgement placed after the system message so the conversation
/// alternates user/model turns.
const PREAMBLE_ACK: &str = "Understood.";

/// Sampling parameters sent with every prompt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            top_p: 0.95,
            top_k: 64,
            max_output_tokens: 8192,
        }
    }
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Prompt was blocked: {0}")]
    Blocked(String),
    #[error("Response contained no text (finish reason: {0})")]
    EmptyResponse(String),
}

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Please set your Gemini API Key.")]
    MissingApiKey,
    #[error("Error initializing Gemini model '{0}': invalid model name")]
    InvalidModel(String),
    #[error("Error configuring Gemini API: {0}")]
    Client(String),
}

/// Produces text for a prompt. One call per comparison pair.
#[async_trait]
pub trait GenerativeClient: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        preamble: Option<&str>,
        config: &GenerationConfig,
    ) -> Result<String, GenerationError>;
}

/// Builds a client for the API key and model chosen on the form.
pub trait ClientProvider: Send + Sync {
    fn client(
        &self,
        api_key: SecretString,
        model: &str,
    ) -> Result<Box<dyn GenerativeClient>, ConfigurationError>;
}

#[derive(Debug, Clone)]
pub struct GeminiProvider {
    http: reqwest::Client,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ConfigurationError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigurationError::Client(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl ClientProvider for GeminiProvider {
    fn client(
        &self,
        api_key: SecretString,
        model: &str,
    ) -> Result<Box<dyn GenerativeClient>, ConfigurationError> {
        if api_key.expose_secret().trim().is_empty() {
            return Err(ConfigurationError::MissingApiKey);
        }
        let model = normalize_model_name(model)?;
        Ok(Box::new(GeminiClient {
            http: self.http.clone(),
            endpoint: format!("{}/v1beta/models/{}:generateContent", self.base_url, model),
            model,
            api_key,
        }))
    }
}

/// Accepts `gemini-2.5-flash` as well as the fully qualified `models/gemini-2.5-flash`.
pub fn normalize_model_name(model: &str) -> Result<String, ConfigurationError> {
    let trimmed = model.trim();
    let name = trimmed.strip_prefix("models/").unwrap_or(trimmed);
    if MODEL_NAME.is_match(name) {
        Ok(name.to_string())
    } else {
        Err(ConfigurationError::InvalidModel(model.to_string()))
    }
}

#[derive(Debug)]
pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: SecretString,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationParams,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationParams {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
}

impl From<&GenerationConfig> for GenerationParams {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            temperature: config.temperature,
            top_p: config.top_p,
            top_k: config.top_k,
            max_output_tokens: config.max_output_tokens,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

fn turn<'a>(role: &'static str, text: &'a str) -> Content<'a> {
    Content {
        role,
        parts: [Part { text }],
    }
}

fn conversation<'a>(prompt: &'a str, preamble: Option<&'a str>) -> Vec<Content<'a>> {
    match preamble {
        Some(preamble) => vec![
            turn("user", preamble),
            turn("model", PREAMBLE_ACK),
            turn("user", prompt),
        ],
        None => vec![turn("user", prompt)],
    }
}

#[async_trait]
impl GenerativeClient for GeminiClient {
    async fn generate(
        &self,
        prompt: &str,
        preamble: Option<&str>,
        config: &GenerationConfig,
    ) -> Result<String, GenerationError> {
        let body = GenerateContentRequest {
            contents: conversation(prompt, preamble),
            generation_config: config.into(),
        };

        tracing::debug!(
            "Sending prompt ({} chars) to {}",
            prompt.chars().count(),
            self.model
        );
        let response = self
            .http
            .post(&self.endpoint)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&raw)
                .map(|body| body.error.message)
                .unwrap_or(raw);
            tracing::warn!("Gemini API returned {}: {}", status, message);
            return Err(GenerationError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GenerateContentResponse = response.json().await?;
        if let Some(reason) = parsed.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(GenerationError::Blocked(reason));
        }

        let Some(candidate) = parsed.candidates.into_iter().next() else {
            return Err(GenerationError::EmptyResponse("no candidates".to_string()));
        };
        let text: String = candidate
            .content
            .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        if text.is_empty() {
            return Err(GenerationError::EmptyResponse(
                candidate
                    .finish_reason
                    .unwrap_or_else(|| "unknown".to_string()),
            ));
        }
        Ok(text)
    }
}
