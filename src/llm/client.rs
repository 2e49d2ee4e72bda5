use super::models::Provider;
use super::{ModelClient, ModelConnector, ModelError};
use crate::util::truncate_str;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Gemini REST base URL; the model id and method are appended.
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// OpenRouter direct API URL
const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Maximum length for error content in error messages
const MAX_ERROR_CONTENT_LEN: usize = 200;

/// Sanitize API response content for error messages to prevent credential leakage.
fn sanitize_api_response(content: &str) -> String {
    const SECRET_PATTERNS: &[&str] = &[
        "api_key",
        "apikey",
        "secret",
        "password",
        "credential",
        "bearer",
        "sk-",
    ];

    let truncated = truncate_str(content, MAX_ERROR_CONTENT_LEN);

    let lower = truncated.to_lowercase();
    for pattern in SECRET_PATTERNS {
        if lower.contains(pattern) {
            return "(response details redacted - may contain sensitive data)".to_string();
        }
    }

    truncated.to_string()
}

// ── Gemini wire types ─────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    role: &'static str,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Deserialize)]
struct GeminiResponsePart {
    #[serde(default)]
    text: String,
}

// ── OpenRouter wire types ─────────────────────────────────────────────────

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    max_tokens: u32,
    stream: bool,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Deserialize)]
struct MessageContent {
    #[serde(default)]
    content: Option<String>,
}

/// Error envelope shared by both providers (`{"error": {"code", "message"}}`).
/// OpenRouter can send it with a 200 status for upstream failures.
#[derive(Deserialize)]
struct ApiErrorEnvelope {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<i64>,
}

/// Create a configured HTTP client for model requests
pub fn create_http_client(timeout_secs: u64) -> Result<reqwest::Client, ModelError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ModelError::Transport(format!("Failed to create HTTP client: {}", e)))
}

/// HTTP client for one provider and model.
#[derive(Clone)]
pub struct HttpModelClient {
    http: reqwest::Client,
    provider: Provider,
    model: String,
    api_key: String,
}

impl HttpModelClient {
    pub fn new(http: reqwest::Client, provider: Provider, model: String, api_key: String) -> Self {
        Self {
            http,
            provider,
            model,
            api_key,
        }
    }

    async fn generate_gemini(&self, prompt: &str) -> Result<String, ModelError> {
        let url = format!("{}/{}:generateContent", GEMINI_BASE_URL, self.model);
        let body = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user",
                parts: vec![GeminiPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                max_output_tokens: self.provider.max_output_tokens(),
            },
        };

        let request = self
            .http
            .post(url)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", &self.api_key)
            .json(&body);
        let text = self.send(request).await?;

        let parsed: GeminiResponse = serde_json::from_str(&text)
            .map_err(|e| ModelError::Decode(format!("Failed to parse Gemini response: {}", e)))?;

        Ok(parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect::<String>())
            .unwrap_or_default())
    }

    async fn generate_openrouter(&self, prompt: &str) -> Result<String, ModelError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.provider.max_output_tokens(),
            stream: false,
        };

        let request = self
            .http
            .post(OPENROUTER_URL)
            .header("Content-Type", "application/json")
            .header("X-Title", "Kritiq")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body);
        let text = self.send(request).await?;

        // 200-with-error responses from upstream providers
        if let Ok(envelope) = serde_json::from_str::<ApiErrorEnvelope>(&text) {
            return Err(self.status_error(
                envelope.error.code.and_then(|c| u16::try_from(c).ok()),
                &envelope.error.message,
            ));
        }

        let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| {
            ModelError::Decode(format!("Failed to parse OpenRouter response: {}", e))
        })?;

        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    /// Send a request and return the body of a successful response.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String, ModelError> {
        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();
        let text = response.text().await.map_err(map_transport_error)?;

        debug!(provider = self.provider.label(), status = status.as_u16(), "model response");

        if status.is_success() {
            return Ok(text);
        }

        let message = serde_json::from_str::<ApiErrorEnvelope>(&text)
            .map(|e| e.error.message)
            .unwrap_or(text);
        Err(self.status_error(Some(status.as_u16()), &message))
    }

    fn status_error(&self, status: Option<u16>, message: &str) -> ModelError {
        let message = sanitize_api_response(message);
        match status {
            Some(status) => ModelError::Status {
                provider: self.provider.label(),
                status,
                message,
            },
            None => ModelError::Transport(format!("{} error: {}", self.provider.label(), message)),
        }
    }
}

fn map_transport_error(err: reqwest::Error) -> ModelError {
    if err.is_timeout() {
        return ModelError::Timeout;
    }
    match err.status() {
        Some(status) => ModelError::Status {
            provider: "HTTP",
            status: status.as_u16(),
            message: err.to_string(),
        },
        None => ModelError::Transport(err.to_string()),
    }
}

impl ModelClient for HttpModelClient {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        match self.provider {
            Provider::Gemini => self.generate_gemini(prompt).await,
            Provider::OpenRouter => self.generate_openrouter(prompt).await,
        }
    }
}

/// Connects [`HttpModelClient`]s for a configured provider and model.
#[derive(Debug, Clone)]
pub struct ProviderConnector {
    pub provider: Provider,
    pub model: String,
    /// Review deadline. The HTTP timeout is set a little past it so the
    /// deadline always fires first.
    pub timeout_secs: u64,
}

/// Extra seconds the HTTP client waits beyond the review deadline.
const TRANSPORT_GRACE_SECS: u64 = 15;

impl ProviderConnector {
    pub fn transport_timeout_secs(&self) -> u64 {
        self.timeout_secs.saturating_add(TRANSPORT_GRACE_SECS)
    }
}

impl ModelConnector for ProviderConnector {
    type Client = HttpModelClient;

    fn connect(&self, credential: &str) -> Result<HttpModelClient, ModelError> {
        let http = create_http_client(self.transport_timeout_secs())?;
        Ok(HttpModelClient::new(
            http,
            self.provider,
            self.model.clone(),
            credential.trim().to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_timeout_outlasts_deadline() {
        let connector = ProviderConnector {
            provider: Provider::Gemini,
            model: Provider::Gemini.default_model().to_string(),
            timeout_secs: 120,
        };
        assert!(connector.transport_timeout_secs() > 120);
        assert!(connector.connect("key").is_ok());
    }

    #[test]
    fn test_sanitize_redacts_secrets() {
        let out = sanitize_api_response("invalid api_key supplied: AIza...");
        assert!(out.contains("redacted"));
        assert_eq!(sanitize_api_response("model overloaded"), "model overloaded");
    }

    #[test]
    fn test_gemini_request_shape() {
        let body = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user",
                parts: vec![GeminiPart { text: "hello" }],
            }],
            generation_config: GenerationConfig {
                max_output_tokens: 10,
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 10);
    }

    #[test]
    fn test_gemini_response_joins_parts() {
        let json = r#"{"candidates":[{"content":{"parts":[{"text":"a"},{"text":"b"}]}}]}"#;
        let parsed: GeminiResponse = serde_json::from_str(json).unwrap();
        let text: String = parsed.candidates[0]
            .content
            .as_ref()
            .unwrap()
            .parts
            .iter()
            .map(|p| p.text.as_str())
            .collect();
        assert_eq!(text, "ab");
    }

    #[test]
    fn test_error_envelope_parses_code() {
        let json = r#"{"error":{"code":429,"message":"Resource has been exhausted","status":"RESOURCE_EXHAUSTED"}}"#;
        let parsed: ApiErrorEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.error.code, Some(429));
        assert!(parsed.error.message.contains("exhausted"));
    }

    #[test]
    fn test_status_error_is_structured() {
        let client = HttpModelClient::new(
            reqwest::Client::new(),
            Provider::Gemini,
            "gemini-2.5-flash".to_string(),
            "key".to_string(),
        );
        let err = client.status_error(Some(429), "quota");
        assert_eq!(err.status(), Some(429));
        assert!(err.is_quota_exceeded());
    }
}
