//! Text-generation service boundary.
//!
//! The pipeline only sees [`TextGenerator`]; [`GeminiClient`] is the
//! production implementation over the `generateContent` REST endpoint.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

pub const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("rate limit exceeded")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("service returned no text")]
    EmptyResponse,

    #[error("could not parse response: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

impl GenerationRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            temperature: None,
            max_output_tokens: None,
        }
    }
}

pub trait TextGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

pub(crate) fn build_http_client() -> Result<Client, GenerationError> {
    Ok(Client::builder().timeout(REQUEST_TIMEOUT).build()?)
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}

/// Maps 429 and other non-success statuses to [`GenerationError`].
pub(crate) fn check_status(response: Response) -> Result<Response, GenerationError> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(GenerationError::RateLimited {
            retry_after: parse_retry_after(response.headers()),
        });
    }
    if !status.is_success() {
        let message = response.text().unwrap_or_default();
        return Err(GenerationError::Api {
            status: status.as_u16(),
            message,
        });
    }
    Ok(response)
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

impl GeminiResponse {
    fn into_text(self) -> Result<String, GenerationError> {
        let text: String = self
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| content.parts.into_iter().filter_map(|part| part.text).collect())
            .unwrap_or_default();
        if text.trim().is_empty() {
            Err(GenerationError::EmptyResponse)
        } else {
            Ok(text)
        }
    }
}

pub struct GeminiClient {
    http: Client,
    api_key: String,
    endpoint: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, GenerationError> {
        Ok(Self {
            http: build_http_client()?,
            api_key: api_key.into(),
            endpoint: GEMINI_ENDPOINT.to_owned(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn request_body(request: &GenerationRequest) -> serde_json::Value {
        let mut generation_config = serde_json::Map::new();
        if let Some(temperature) = request.temperature {
            generation_config.insert("temperature".into(), json!(temperature));
        }
        if let Some(max_output_tokens) = request.max_output_tokens {
            generation_config.insert("maxOutputTokens".into(), json!(max_output_tokens));
        }
        json!({
            "contents": [{ "role": "user", "parts": [{ "text": request.prompt }] }],
            "generationConfig": generation_config,
        })
    }
}

impl TextGenerator for GeminiClient {
    fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            request.model
        );
        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&Self::request_body(request))
            .send()?;
        let payload: GeminiResponse = check_status(response)?
            .json()
            .map_err(|e| GenerationError::Parse(e.to_string()))?;
        payload.into_text()
    }
}

/// Outcome of sending a trivial prompt to one model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStatus {
    Success,
    QuotaHit,
    NotFound,
    NoAccess,
    Error,
}

impl ProbeStatus {
    pub fn classify(result: &Result<String, GenerationError>) -> Self {
        match result {
            Ok(_) => ProbeStatus::Success,
            Err(GenerationError::RateLimited { .. }) => ProbeStatus::QuotaHit,
            Err(GenerationError::Api { status: 404, .. }) => ProbeStatus::NotFound,
            Err(GenerationError::Api {
                status: 401 | 403, ..
            }) => ProbeStatus::NoAccess,
            Err(GenerationError::Api { message, .. }) if message.contains("limit: 0") => {
                ProbeStatus::QuotaHit
            }
            Err(_) => ProbeStatus::Error,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProbeStatus::Success => "SUCCESS",
            ProbeStatus::QuotaHit => "QUOTA HIT",
            ProbeStatus::NotFound => "NOT FOUND",
            ProbeStatus::NoAccess => "NO ACCESS",
            ProbeStatus::Error => "ERROR",
        }
    }
}
