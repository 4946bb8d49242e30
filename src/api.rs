//! Remote text generation.
//!
//! This module wraps the Google Generative Language `generateContent`
//! endpoint behind a small trait so the dispatcher can be driven by any
//! implementation:
//!
//! - [`GenerateContent`]: one generation call with one credential
//! - [`GeminiClient`]: the `reqwest` implementation used in production
//! - [`GenerateError`]: a classified failure; [`GenerateError::is_quota_exhausted`]
//!   is the only signal the dispatcher rotates credentials on
//!
//! Failures are classified from the HTTP status and the structured error
//! body, never from the text of an error message.

use crate::models::Credential;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Google status string for an exceeded quota or rate limit.
const RESOURCE_EXHAUSTED: &str = "RESOURCE_EXHAUSTED";

/// Content filters disabled for JSON-mode editor requests.
const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// What to ask the model for.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: Option<f32>,
    /// Ask for `application/json` output instead of free text.
    pub json_output: bool,
    /// Turn off the service's content filters.
    pub relax_safety: bool,
}

impl GenerationRequest {
    pub fn text(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            temperature: None,
            json_output: false,
            relax_safety: false,
        }
    }

    pub fn json(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            json_output: true,
            ..Self::text(model, prompt)
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_relaxed_safety(mut self) -> Self {
        self.relax_safety = true;
        self
    }

    /// Request body for `models/{model}:generateContent`.
    pub fn to_body(&self) -> Value {
        let mut generation_config = json!({});
        if let Some(t) = self.temperature {
            generation_config["temperature"] = json!(t);
        }
        if self.json_output {
            generation_config["responseMimeType"] = json!("application/json");
        }

        let mut body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": self.prompt }] }],
            "generationConfig": generation_config,
        });
        if self.relax_safety {
            body["safetySettings"] = HARM_CATEGORIES
                .iter()
                .map(|c| json!({ "category": c, "threshold": "BLOCK_NONE" }))
                .collect();
        }
        body
    }
}

/// A classified generation failure.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// Usage or rate limit exceeded for this credential.
    #[error("quota exhausted ({status}): {message}")]
    QuotaExceeded { status: u16, message: String },

    /// The service rejected the request (bad key, malformed payload, server error).
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Transport failure before a response arrived.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The service answered without any text.
    #[error("empty response (finish reason {0:?})")]
    EmptyResponse(Option<String>),

    /// The response body could not be decoded.
    #[error("could not decode response: {0}")]
    Decode(String),
}

impl GenerateError {
    /// Whether a different credential might succeed where this one failed.
    pub fn is_quota_exhausted(&self) -> bool {
        matches!(self, GenerateError::QuotaExceeded { .. })
    }
}

/// One generation call with one credential.
pub trait GenerateContent {
    async fn generate(
        &self,
        credential: &Credential,
        request: &GenerationRequest,
    ) -> Result<String, GenerateError>;
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    code: Option<u16>,
    #[serde(default)]
    message: String,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: GoogleError,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

/// Turn a non-success HTTP response into a [`GenerateError`].
///
/// Quota exhaustion is HTTP 429 or a Google error whose `status` is
/// `RESOURCE_EXHAUSTED`; everything else is a rejection.
///
/// # Arguments
///
/// * `status` - HTTP status code of the response
/// * `body` - Raw response body; a Google error envelope if the service sent one
///
/// # Returns
///
/// [`GenerateError::QuotaExceeded`] or [`GenerateError::Rejected`], carrying the
/// service's own code and message when the body parses.
pub fn classify_failure(status: u16, body: &str) -> GenerateError {
    let (code, message, google_status) = match serde_json::from_str::<ErrorResponse>(body) {
        Ok(parsed) => (
            parsed.error.code.unwrap_or(status),
            parsed.error.message,
            parsed.error.status,
        ),
        Err(_) => (status, body.trim().to_string(), None),
    };

    if status == StatusCode::TOO_MANY_REQUESTS.as_u16()
        || google_status.as_deref() == Some(RESOURCE_EXHAUSTED)
    {
        GenerateError::QuotaExceeded { status: code, message }
    } else {
        GenerateError::Rejected { status: code, message }
    }
}

/// Concatenate the text parts of the first candidate.
///
/// # Errors
///
/// [`GenerateError::Decode`] for a body that is not a `generateContent`
/// response, [`GenerateError::EmptyResponse`] when there is no candidate or
/// its text is blank.
pub fn extract_text(body: &str) -> Result<String, GenerateError> {
    let parsed: GenerateResponse =
        serde_json::from_str(body).map_err(|e| GenerateError::Decode(e.to_string()))?;
    let Some(candidate) = parsed.candidates.into_iter().next() else {
        return Err(GenerateError::EmptyResponse(None));
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(GenerateError::EmptyResponse(candidate.finish_reason));
    }
    Ok(text)
}

/// `reqwest` client for the Generative Language REST API.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_base: String,
}

impl GeminiClient {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_base)
    }

    pub fn with_client(http: reqwest::Client, api_base: impl Into<String>) -> Self {
        Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/{}:generateContent", self.api_base, model)
    }
}

impl GenerateContent for GeminiClient {
    #[instrument(level = "info", skip_all, fields(model = %request.model, slot = %credential.source_tag()))]
    async fn generate(
        &self,
        credential: &Credential,
        request: &GenerationRequest,
    ) -> Result<String, GenerateError> {
        let t0 = Instant::now();
        let response = self
            .http
            .post(self.endpoint(&request.model))
            .header("x-goog-api-key", credential.expose())
            .json(&request.to_body())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let elapsed_ms = t0.elapsed().as_millis() as u64;

        if !status.is_success() {
            let err = classify_failure(status.as_u16(), &body);
            warn!(elapsed_ms, status = status.as_u16(), error = %err, "API call failed");
            return Err(err);
        }

        debug!(elapsed_ms, bytes = body.len(), "API call succeeded");
        extract_text(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_classify_429_is_quota() {
        let err = classify_failure(429, "Too Many Requests");
        assert!(err.is_quota_exhausted());
        assert!(err.to_string().contains("Too Many Requests"));
    }

    #[test]
    fn test_classify_resource_exhausted_body_is_quota() {
        let body = r#"{"error": {"code": 429, "message": "Quota exceeded for metric", "status": "RESOURCE_EXHAUSTED"}}"#;
        let err = classify_failure(429, body);
        match err {
            GenerateError::QuotaExceeded { status, message } => {
                assert_eq!(status, 429);
                assert_eq!(message, "Quota exceeded for metric");
            }
            other => panic!("expected quota, got {other:?}"),
        }

        // status string alone is enough even behind a proxy that rewrites the code
        let proxied = classify_failure(503, body);
        assert!(proxied.is_quota_exhausted());
    }

    #[test]
    fn test_classify_auth_failure_is_not_quota() {
        let body = r#"{"error": {"code": 400, "message": "API key not valid. Please pass a valid API key.", "status": "INVALID_ARGUMENT"}}"#;
        let err = classify_failure(400, body);
        assert!(!err.is_quota_exhausted());
        assert!(matches!(err, GenerateError::Rejected { status: 400, .. }));
    }

    #[test]
    fn test_classify_does_not_match_on_message_text() {
        let body = r#"{"error": {"code": 400, "message": "quota field 429 RESOURCE_EXHAUSTED is invalid", "status": "INVALID_ARGUMENT"}}"#;
        assert!(!classify_failure(400, body).is_quota_exhausted());
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let body = r#"{"candidates": [{"content": {"parts": [{"text": "Hello, "}, {"text": "world"}], "role": "model"}, "finishReason": "STOP"}]}"#;
        assert_eq!(extract_text(body).unwrap(), "Hello, world");
    }

    #[test]
    fn test_extract_text_empty_candidate() {
        let body = r#"{"candidates": [{"finishReason": "SAFETY"}]}"#;
        match extract_text(body) {
            Err(GenerateError::EmptyResponse(reason)) => assert_eq!(reason.as_deref(), Some("SAFETY")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            extract_text(r#"{"candidates": []}"#),
            Err(GenerateError::EmptyResponse(None))
        ));
        assert!(matches!(extract_text("not json"), Err(GenerateError::Decode(_))));
    }

    #[test]
    fn test_request_body_shape() {
        let body = GenerationRequest::json("gemini-2.5-flash", "Summarize")
            .with_temperature(0.5)
            .with_relaxed_safety()
            .to_body();

        assert_eq!(body["contents"][0]["parts"][0]["text"], "Summarize");
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(body["generationConfig"]["temperature"], 0.5);
        assert_eq!(body["safetySettings"].as_array().unwrap().len(), 4);

        let plain = GenerationRequest::text("m", "p").to_body();
        assert!(plain.get("safetySettings").is_none());
        assert!(plain["generationConfig"].get("responseMimeType").is_none());
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let client = GeminiClient::new("https://example.test/v1beta/models/");
        assert_eq!(
            client.endpoint("gemini-2.5-flash"),
            "https://example.test/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }
}
