//! Generative API client for holdings inference and shelf images.
//!
//! Two calls are used:
//! - grounded text generation (web search enabled), which returns free text
//!   plus the sources the model consulted;
//! - image generation, which returns zero or more inline base64 payloads.
//!
//! Both go through [`GenerativeBackend`] so the pipeline can be driven by
//! an in-process fake in tests.

use std::time::Duration;

use miette::Diagnostic;
use serde::Deserialize;
use thiserror::Error;

/// Errors from the generative subsystem.
#[derive(Debug, Error, Diagnostic)]
pub enum LlmError {
    #[error("no API key configured for the generative service")]
    #[diagnostic(
        code(scout::llm::missing_api_key),
        help("Export the key in the environment variable named by `api_key_env` (GEMINI_API_KEY by default).")
    )]
    MissingApiKey,

    #[error("generative request failed: {message}")]
    #[diagnostic(
        code(scout::llm::request_failed),
        help("Check your connection and that the configured model name exists.")
    )]
    RequestFailed { message: String },

    #[error("generative service returned status {status}: {message}")]
    #[diagnostic(
        code(scout::llm::status),
        help("A 4xx status usually means a bad key or model name; 5xx or 429 usually clears on retry.")
    )]
    Status { status: u16, message: String },

    #[error("failed to parse generative response: {message}")]
    #[diagnostic(
        code(scout::llm::parse_error),
        help("The service returned an unexpected response format.")
    )]
    ParseError { message: String },

    #[error("generative request timed out after {timeout_secs}s")]
    #[diagnostic(
        code(scout::llm::timeout),
        help("Increase the timeout in the config file or try again.")
    )]
    Timeout { timeout_secs: u64 },
}

pub type LlmResult<T> = std::result::Result<T, LlmError>;

/// A web source attached to a grounded reply. Either field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroundingSource {
    pub title: Option<String>,
    pub uri: Option<String>,
}

/// Text reply from a grounded generation call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroundedReply {
    pub text: String,
    pub sources: Vec<GroundingSource>,
}

/// One inline binary payload, still base64-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlinePayload {
    pub mime_type: String,
    pub data: String,
}

/// The generative service as the pipeline sees it.
pub trait GenerativeBackend: Send + Sync {
    /// Text generation with web grounding enabled.
    fn generate_grounded(&self, prompt: &str) -> LlmResult<GroundedReply>;

    /// Image generation. Returns every inline payload in the reply.
    fn generate_image(&self, prompt: &str) -> LlmResult<Vec<InlinePayload>>;
}

/// Configuration for [`GeminiClient`].
#[derive(Clone)]
pub struct GeminiConfig {
    /// Base URL for the API.
    pub base_url: String,
    pub api_key: String,
    /// Model for grounded text.
    pub text_model: String,
    /// Image-capable model.
    pub image_model: String,
    pub text_timeout_secs: u64,
    pub image_timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".into(),
            api_key: String::new(),
            text_model: "gemini-2.5-flash".into(),
            image_model: "gemini-2.5-flash-image".into(),
            text_timeout_secs: 60,
            image_timeout_secs: 90,
        }
    }
}

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &if self.api_key.is_empty() { "<unset>" } else { "<set>" })
            .field("text_model", &self.text_model)
            .field("image_model", &self.image_model)
            .finish()
    }
}

// Wire types for `generateContent` responses.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    text: Option<String>,
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    web: Option<WebSource>,
}

#[derive(Debug, Deserialize)]
struct WebSource {
    title: Option<String>,
    uri: Option<String>,
}

/// Client for the Gemini `generateContent` REST API.
pub struct GeminiClient {
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        Self { config }
    }

    fn post(&self, model: &str, timeout_secs: u64, body: &serde_json::Value) -> LlmResult<String> {
        if self.config.api_key.is_empty() {
            return Err(LlmError::MissingApiKey);
        }

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url, model
        );
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(timeout_secs))
            .build();

        let body_str = serde_json::to_string(body).map_err(|e| LlmError::RequestFailed {
            message: format!("JSON serialize error: {e}"),
        })?;

        tracing::debug!(model, "generative request");
        let resp = agent
            .post(&url)
            .set("Content-Type", "application/json")
            .set("x-goog-api-key", &self.config.api_key)
            .send_string(&body_str)
            .map_err(|e| match e {
                ureq::Error::Status(status, response) => {
                    let body = response.into_string().unwrap_or_default();
                    let message = if body.len() > 300 {
                        format!("{}...", truncate_at_char(&body, 300))
                    } else {
                        body
                    };
                    LlmError::Status { status, message }
                }
                ureq::Error::Transport(transport) if is_timeout(&transport) => {
                    LlmError::Timeout { timeout_secs }
                }
                ureq::Error::Transport(transport) => LlmError::RequestFailed {
                    message: transport.to_string(),
                },
            })?;

        resp.into_string().map_err(|e| LlmError::RequestFailed {
            message: format!("failed to read body: {e}"),
        })
    }
}

impl GenerativeBackend for GeminiClient {
    fn generate_grounded(&self, prompt: &str) -> LlmResult<GroundedReply> {
        let body = serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "tools": [{ "google_search": {} }],
        });
        let resp = self.post(&self.config.text_model, self.config.text_timeout_secs, &body)?;
        parse_grounded_reply(&resp)
    }

    fn generate_image(&self, prompt: &str) -> LlmResult<Vec<InlinePayload>> {
        let body = serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": { "responseModalities": ["TEXT", "IMAGE"] },
        });
        let resp = self.post(
            &self.config.image_model,
            self.config.image_timeout_secs,
            &body,
        )?;
        parse_inline_payloads(&resp)
    }
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("config", &self.config)
            .finish()
    }
}

fn decode(body: &str) -> LlmResult<GenerateResponse> {
    serde_json::from_str(body).map_err(|e| LlmError::ParseError {
        message: e.to_string(),
    })
}

/// Concatenate the text parts of the first candidate and collect its
/// grounding sources. A reply with no candidates yields empty text.
pub(crate) fn parse_grounded_reply(body: &str) -> LlmResult<GroundedReply> {
    let response = decode(body)?;
    let Some(candidate) = response.candidates.into_iter().next() else {
        return Ok(GroundedReply::default());
    };

    let text = candidate
        .content
        .map(|c| {
            c.parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    let sources = candidate
        .grounding_metadata
        .map(|m| {
            m.grounding_chunks
                .into_iter()
                .filter_map(|chunk| chunk.web)
                .map(|web| GroundingSource {
                    title: web.title,
                    uri: web.uri,
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(GroundedReply { text, sources })
}

/// Every inline payload across all candidates, in order.
pub(crate) fn parse_inline_payloads(body: &str) -> LlmResult<Vec<InlinePayload>> {
    let response = decode(body)?;
    Ok(response
        .candidates
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
        .filter_map(|p| p.inline_data)
        .map(|d| InlinePayload {
            mime_type: d.mime_type,
            data: d.data,
        })
        .collect())
}

fn is_timeout(transport: &ureq::Transport) -> bool {
    use std::error::Error as _;
    transport
        .source()
        .and_then(|s| s.downcast_ref::<std::io::Error>())
        .is_some_and(|io| {
            matches!(
                io.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            )
        })
}

fn truncate_at_char(s: &str, max: usize) -> &str {
    let mut end = max.min(s.len());
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grounded_reply_joins_text_and_sources() {
        let body = r#"{
            "candidates": [{
                "content": { "parts": [{ "text": "```json\n[" }, { "text": "]\n```" }] },
                "groundingMetadata": {
                    "groundingChunks": [
                        { "web": { "uri": "https://lib.example/a", "title": "Catalog A" } },
                        { "web": { "uri": "https://lib.example/b" } },
                        { "retrievedContext": {} }
                    ]
                }
            }]
        }"#;
        let reply = parse_grounded_reply(body).unwrap();
        assert_eq!(reply.text, "```json\n[]\n```");
        assert_eq!(reply.sources.len(), 2);
        assert_eq!(reply.sources[0].title.as_deref(), Some("Catalog A"));
        assert_eq!(reply.sources[1].title, None);
    }

    #[test]
    fn no_candidates_is_empty_reply() {
        let reply = parse_grounded_reply(r#"{"candidates": []}"#).unwrap();
        assert!(reply.text.is_empty());
        assert!(reply.sources.is_empty());
    }

    #[test]
    fn inline_payloads_are_collected() {
        let body = r#"{
            "candidates": [{
                "content": { "parts": [
                    { "text": "Here is the shelf." },
                    { "inlineData": { "mimeType": "image/png", "data": "aGVsbG8=" } }
                ] }
            }]
        }"#;
        let payloads = parse_inline_payloads(body).unwrap();
        assert_eq!(
            payloads,
            vec![InlinePayload {
                mime_type: "image/png".into(),
                data: "aGVsbG8=".into()
            }]
        );
    }

    #[test]
    fn non_json_is_parse_error() {
        assert!(matches!(
            parse_grounded_reply("oops"),
            Err(LlmError::ParseError { .. })
        ));
    }

    #[test]
    fn missing_key_fails_before_network() {
        let client = GeminiClient::new(GeminiConfig::default());
        assert!(matches!(
            client.generate_grounded("hi"),
            Err(LlmError::MissingApiKey)
        ));
    }

    #[test]
    fn unreachable_service_is_request_failure() {
        let client = GeminiClient::new(GeminiConfig {
            base_url: "http://127.0.0.1:1".into(), // unreachable port
            api_key: "test".into(),
            ..Default::default()
        });
        let err = client.generate_image("a shelf").unwrap_err();
        assert!(matches!(
            err,
            LlmError::RequestFailed { .. } | LlmError::Timeout { .. }
        ));
    }

    #[test]
    fn debug_hides_api_key() {
        let config = GeminiConfig {
            api_key: "secret".into(),
            ..Default::default()
        };
        let rendered = format!("{:?}", GeminiClient::new(config));
        assert!(!rendered.contains("secret"));
    }
}
