//! OpenAI-compatible vision oracle
//!
//! Sends the image as a base64 `data:` URL in a chat completions request and
//! parses the reply with [`crate::parser::parse_response`].

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use boxcheck_core::{Error, Result};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::oracle::{Oracle, OracleContext, Verdict};
use crate::parser::parse_response;
use crate::prompt::{system_prompt, user_prompt};

/// Vision oracle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    /// API base URL (without `/chat/completions`)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_model")]
    pub model: String,

    /// Bearer token; read from `OPENAI_API_KEY` by the server when unset
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Completion token budget
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            request_timeout_secs: default_request_timeout(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

fn default_max_tokens() -> u32 {
    500
}

fn default_temperature() -> f32 {
    0.1
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Vision oracle backed by a chat completions endpoint
pub struct VisionOracle {
    config: VisionConfig,
    client: reqwest::Client,
    endpoint: String,
}

impl VisionOracle {
    /// Create a new vision oracle
    pub fn new(config: VisionConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;
        let endpoint = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));

        Ok(Self {
            config,
            client,
            endpoint,
        })
    }

    /// Endpoint this oracle posts to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Build the chat completions request body
    pub fn request_body(&self, image: &[u8], context: &OracleContext) -> Value {
        let image_url = format!("data:image/jpeg;base64,{}", STANDARD.encode(image));

        json!({
            "model": self.config.model,
            "messages": [
                {
                    "role": "system",
                    "content": system_prompt(context.drifting),
                },
                {
                    "role": "user",
                    "content": [
                        { "type": "text", "text": user_prompt(&context.examples) },
                        { "type": "image_url", "image_url": { "url": image_url } },
                    ],
                },
            ],
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
        })
    }
}

#[async_trait]
impl Oracle for VisionOracle {
    async fn classify(&self, image: &[u8], context: &OracleContext) -> Result<Verdict> {
        let start = Instant::now();
        let body = self.request_body(image, context);

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(ref key) = self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(status_error(status, &detail));
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| Error::oracle_permanent(format!("malformed completion: {e}")))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| Error::oracle_permanent("completion carried no content"))?;

        let mut verdict = parse_response(&content);
        verdict.model = completion.model.or_else(|| Some(self.config.model.clone()));

        debug!(
            "Vision oracle answered {} ({:.2}) in {:?}",
            verdict.label,
            verdict.confidence,
            start.elapsed()
        );
        Ok(verdict)
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}

fn map_transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout
    } else {
        Error::oracle_transient(format!("request failed: {e}"))
    }
}

/// Rate limits and server errors are worth retrying; other statuses are not
fn status_error(status: StatusCode, detail: &str) -> Error {
    let detail: String = detail.chars().take(200).collect();
    let message = format!("vision API returned {status}: {detail}");

    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        Error::oracle_transient(message)
    } else {
        Error::oracle_permanent(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint() {
        let oracle = VisionOracle::new(VisionConfig {
            base_url: "http://localhost:8000/v1/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(oracle.endpoint(), "http://localhost:8000/v1/chat/completions");
    }

    #[test]
    fn test_request_body() {
        let oracle = VisionOracle::new(VisionConfig::default()).unwrap();
        let context = OracleContext {
            examples: "No previous examples available.".to_string(),
            example_count: 0,
            drifting: true,
        };

        let body = oracle.request_body(b"\xff\xd8\xff", &context);

        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["max_tokens"], 500);
        let system = body["messages"][0]["content"].as_str().unwrap();
        assert!(system.contains("Be extra thorough"));

        let user = &body["messages"][1]["content"];
        assert!(user[0]["text"]
            .as_str()
            .unwrap()
            .contains("No previous examples available."));
        assert_eq!(
            user[1]["image_url"]["url"],
            "data:image/jpeg;base64,/9j/"
        );
    }

    #[test]
    fn test_status_classification() {
        assert!(status_error(StatusCode::TOO_MANY_REQUESTS, "").is_transient());
        assert!(status_error(StatusCode::BAD_GATEWAY, "").is_transient());
        assert!(!status_error(StatusCode::UNAUTHORIZED, "bad key").is_transient());
        assert!(!status_error(StatusCode::BAD_REQUEST, "").is_transient());
    }
}
