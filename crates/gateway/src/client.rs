//! Client for the hosted chat-completion endpoint.
//!
//! Every call is a single attempt; rate limiting and billing failures surface
//! as [`GatewayError::RateLimited`] and [`GatewayError::PaymentRequired`] so the
//! caller can hand the original status back to its own client.

use std::{env, time::Duration};

use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt, TryStreamExt};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};

use crate::errors::{map_reqwest_error, GatewayError};

pub const DEFAULT_GATEWAY_URL: &str = "https://ai.gateway.lovable.dev/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "google/gemini-2.5-flash";
pub const API_KEY_VAR: &str = "AI_GATEWAY_API_KEY";

/// Raw reply body of a streamed completion
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, GatewayError>>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: String,
    pub content: Content,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::text("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text("assistant", content)
    }

    /// User turn carrying an instruction and an image (data URL or http URL)
    pub fn user_with_image(text: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: Content::Parts(vec![
                ContentPart::Text { text: text.into() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image_url.into(),
                    },
                },
            ]),
        }
    }

    fn text(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Content::Text(content.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Request body for the gateway
#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Chat completions, either whole or streamed
#[async_trait]
pub trait Completions: Send + Sync {
    /// Full reply text of the first choice
    async fn complete(&self, request: &CompletionRequest) -> Result<String, GatewayError>;

    /// Raw server-sent-events body, forwarded untouched
    async fn stream(&self, request: &CompletionRequest) -> Result<ByteStream, GatewayError>;
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub model: String,
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        Self {
            url: env::var("AI_GATEWAY_URL").unwrap_or(DEFAULT_GATEWAY_URL.to_string()),
            api_key: env::var(API_KEY_VAR).ok().filter(|k| !k.trim().is_empty()),
            model: env::var("AI_GATEWAY_MODEL").unwrap_or(DEFAULT_MODEL.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayClient {
    http: Client,
    url: String,
    api_key: String,
    model: String,
}

impl GatewayClient {
    const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
    /// Whole-request deadline for non-streamed completions
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let api_key = config.api_key.ok_or(GatewayError::MissingApiKey(API_KEY_VAR))?;

        let http = Client::builder()
            .connect_timeout(Self::CONNECT_TIMEOUT)
            .user_agent(concat!("medpal-gateway/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            url: config.url,
            api_key,
            model: config.model,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn send(
        &self,
        request: &CompletionRequest,
        stream: bool,
    ) -> Result<reqwest::Response, GatewayError> {
        let res = self
            .request(request, stream)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        check_status(res).await
    }

    /// Streamed requests carry no overall deadline
    fn request(&self, request: &CompletionRequest, stream: bool) -> RequestBuilder {
        let body = ChatBody {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
            stream,
        };

        let builder = self.http.post(&self.url).bearer_auth(&self.api_key).json(&body);
        if stream {
            builder
        } else {
            builder.timeout(Self::REQUEST_TIMEOUT)
        }
    }
}

pub(crate) async fn check_status(res: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
    match res.status() {
        s if s.is_success() => Ok(res),
        StatusCode::TOO_MANY_REQUESTS => Err(GatewayError::RateLimited),
        StatusCode::PAYMENT_REQUIRED => Err(GatewayError::PaymentRequired),
        s => {
            let status = s.as_u16();
            let body = res.text().await.unwrap_or_default();
            tracing::error!("AI gateway error: {} {}", status, body);
            Err(GatewayError::Http { status, body })
        }
    }
}

#[async_trait]
impl Completions for GatewayClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, GatewayError> {
        let response: ChatResponse = self
            .send(request, false)
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::Serde(e.to_string()))?;

        first_content(response)
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<ByteStream, GatewayError> {
        let res = self.send(request, true).await?;

        Ok(res
            .bytes_stream()
            .map_ok(|chunk| chunk.to_vec())
            .map_err(map_reqwest_error)
            .boxed())
    }
}

fn first_content(response: ChatResponse) -> Result<String, GatewayError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or(GatewayError::EmptyReply)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_message_serializes_as_content_parts() {
        let message = Message::user_with_image("Identify this", "data:image/png;base64,AAAA");
        let json = serde_json::to_value(&message).unwrap();

        assert_eq!(json["role"], "user");
        assert_eq!(json["content"][0]["type"], "text");
        assert_eq!(json["content"][1]["type"], "image_url");
        assert_eq!(json["content"][1]["image_url"]["url"], "data:image/png;base64,AAAA");
    }

    #[test]
    fn body_omits_unset_fields() {
        let messages = vec![Message::system("be brief")];
        let body = ChatBody {
            model: DEFAULT_MODEL,
            messages: &messages,
            temperature: None,
            stream: false,
        };
        let json = serde_json::to_value(&body).unwrap();

        assert!(json.get("temperature").is_none());
        assert!(json.get("stream").is_none());
        assert_eq!(json["messages"][0]["content"], "be brief");
    }

    #[test]
    fn first_content_requires_text() {
        let empty: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert_eq!(first_content(empty), Err(GatewayError::EmptyReply));

        let reply: ChatResponse =
            serde_json::from_str(r#"{"choices": [{"message": {"content": "Aspirin"}}]}"#).unwrap();
        assert_eq!(first_content(reply).unwrap(), "Aspirin");
    }

    #[test]
    fn missing_key_is_reported_by_name() {
        let err = GatewayClient::new(GatewayConfig {
            url: DEFAULT_GATEWAY_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
        })
        .unwrap_err();

        assert_eq!(err.to_string(), "AI_GATEWAY_API_KEY is not configured");
    }

    #[test]
    fn only_whole_completions_have_a_deadline() {
        let client = GatewayClient::new(GatewayConfig {
            url: DEFAULT_GATEWAY_URL.to_string(),
            api_key: Some("key".to_string()),
            model: DEFAULT_MODEL.to_string(),
        })
        .unwrap();
        let request = CompletionRequest::new(vec![Message::user("Tell me about ibuprofen")]);

        let whole = client.request(&request, false).build().unwrap();
        assert_eq!(whole.timeout(), Some(&GatewayClient::REQUEST_TIMEOUT));

        let streamed = client.request(&request, true).build().unwrap();
        assert_eq!(streamed.timeout(), None);
    }
}
