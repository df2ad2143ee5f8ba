//! Model invocation over an OpenAI-compatible chat-completions API.
//!
//! One call to [`ModelInvoker::invoke`] is exactly one outbound request. The
//! invoker never retries; the generator and the evaluator own their retry
//! budgets.

use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{CasegenConfig, SamplingConfig};
use crate::errors::InvocationFailure;

/// Bytes of an error body kept in `InvocationFailure::Status`.
const ERROR_BODY_EXCERPT: usize = 512;
/// Deadline for the reachability probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// One structured request to the model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptPayload {
    pub prompt: String,
    pub system: Option<String>,
    /// Image URLs or `data:` URIs, sent before the text part.
    pub images: Vec<String>,
}

impl PromptPayload {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_images(mut self, images: Vec<String>) -> Self {
        self.images = images;
        self
    }
}

/// Anything that can turn a prompt into model text.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    async fn invoke(&self, payload: &PromptPayload) -> Result<String, InvocationFailure>;
}

// ── Wire format ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    ImageUrl { image_url: ImageUrl },
    Text { text: String },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

fn build_messages(payload: &PromptPayload) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = &payload.system {
        messages.push(ChatMessage {
            role: "system",
            content: MessageContent::Text(system.clone()),
        });
    }
    let content = if payload.images.is_empty() {
        MessageContent::Text(payload.prompt.clone())
    } else {
        let mut parts: Vec<ContentPart> = payload
            .images
            .iter()
            .map(|url| ContentPart::ImageUrl {
                image_url: ImageUrl { url: url.clone() },
            })
            .collect();
        parts.push(ContentPart::Text {
            text: payload.prompt.clone(),
        });
        MessageContent::Parts(parts)
    };
    messages.push(ChatMessage {
        role: "user",
        content,
    });
    messages
}

/// Pull `choices[0].message.content` out of a response body.
fn extract_content(body: &str) -> Result<String, InvocationFailure> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| InvocationFailure::MalformedResponse(format!("body is not JSON: {e}")))?;
    response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| InvocationFailure::MalformedResponse("response has no choices".into()))?
        .message
        .content
        .ok_or_else(|| InvocationFailure::MalformedResponse("first choice has no content".into()))
}

fn excerpt(body: &str) -> String {
    if body.len() <= ERROR_BODY_EXCERPT {
        return body.to_string();
    }
    let mut end = ERROR_BODY_EXCERPT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &body[..end])
}

// ── HTTP implementation ──────────────────────────────────────────────────────

/// [`ModelInvoker`] backed by `POST {base_url}/chat/completions`.
#[derive(Debug, Clone)]
pub struct ChatCompletionInvoker {
    client: reqwest::Client,
    completions_url: String,
    api_key: String,
    model: String,
    sampling: SamplingConfig,
}

impl ChatCompletionInvoker {
    pub fn new(config: &CasegenConfig) -> Result<Self, InvocationFailure> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| InvocationFailure::Transport(format!("client build failed: {e}")))?;
        Ok(Self {
            client,
            completions_url: format!(
                "{}/chat/completions",
                config.endpoint.base_url.trim_end_matches('/')
            ),
            api_key: config.endpoint.api_key.clone(),
            model: config.endpoint.model.clone(),
            sampling: config.sampling.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ModelInvoker for ChatCompletionInvoker {
    async fn invoke(&self, payload: &PromptPayload) -> Result<String, InvocationFailure> {
        let request = ChatRequest {
            model: &self.model,
            messages: build_messages(payload),
            temperature: self.sampling.temperature,
            top_p: self.sampling.top_p,
            max_tokens: self.sampling.max_tokens,
        };

        debug!(
            model = %self.model,
            prompt_chars = payload.prompt.chars().count(),
            images = payload.images.len(),
            "invoking model"
        );

        let response = self
            .client
            .post(&self.completions_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    InvocationFailure::Transport(format!("request timed out: {e}"))
                } else {
                    InvocationFailure::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| InvocationFailure::Transport(format!("failed to read body: {e}")))?;

        if !status.is_success() {
            return Err(InvocationFailure::Status {
                status: status.as_u16(),
                body: excerpt(&body),
            });
        }

        extract_content(&body)
    }
}

/// Check if the model endpoint is reachable (`GET {base_url}/models`).
pub async fn check_endpoint(base_url: &str, api_key: &str) -> bool {
    let models_url = format!("{}/models", base_url.trim_end_matches('/'));
    match reqwest::Client::new()
        .get(&models_url)
        .bearer_auth(api_key)
        .timeout(PROBE_TIMEOUT)
        .send()
        .await
    {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_only_payload_sends_plain_string_content() {
        let payload = PromptPayload::text("hello").with_system("be terse");
        let json = serde_json::to_value(build_messages(&payload)).unwrap();
        assert_eq!(json[0]["role"], "system");
        assert_eq!(json[0]["content"], "be terse");
        assert_eq!(json[1]["role"], "user");
        assert_eq!(json[1]["content"], "hello");
    }

    #[test]
    fn images_become_content_parts_before_text() {
        let payload = PromptPayload::text("describe")
            .with_images(vec!["https://x/a.png".into(), "data:image/png;base64,AA".into()]);
        let json = serde_json::to_value(build_messages(&payload)).unwrap();
        let parts = json[0]["content"].as_array().unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0]["type"], "image_url");
        assert_eq!(parts[0]["image_url"]["url"], "https://x/a.png");
        assert_eq!(parts[2]["type"], "text");
        assert_eq!(parts[2]["text"], "describe");
    }

    #[test]
    fn content_of_first_choice_is_returned() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"hi"}},{"message":{"content":"no"}}]}"#;
        assert_eq!(extract_content(body).unwrap(), "hi");
    }

    #[test]
    fn missing_content_is_malformed_not_empty() {
        for body in [
            r#"{"choices":[]}"#,
            r#"{"choices":[{"message":{"role":"assistant"}}]}"#,
            r#"{"error":"x"}"#,
            "<html>bad gateway</html>",
        ] {
            assert!(
                matches!(extract_content(body), Err(InvocationFailure::MalformedResponse(_))),
                "body {body} should be malformed"
            );
        }
    }

    #[test]
    fn long_error_bodies_are_truncated_on_char_boundary() {
        let body = "é".repeat(400);
        let cut = excerpt(&body);
        assert!(cut.len() < body.len());
        assert!(cut.ends_with('…'));
    }

    #[test]
    fn completions_url_has_no_double_slash() {
        let mut config = CasegenConfig::default();
        config.endpoint.base_url = "http://localhost:8000/v1/".into();
        let invoker = ChatCompletionInvoker::new(&config).unwrap();
        assert_eq!(
            invoker.completions_url,
            "http://localhost:8000/v1/chat/completions"
        );
    }

    #[tokio::test]
    async fn mocked_invoker_is_usable_as_trait_object() {
        let mut mock = MockModelInvoker::new();
        mock.expect_invoke()
            .times(1)
            .returning(|p| Ok(format!("echo: {}", p.prompt)));
        let invoker: &dyn ModelInvoker = &mock;
        let out = invoker.invoke(&PromptPayload::text("ping")).await.unwrap();
        assert_eq!(out, "echo: ping");
    }
}
