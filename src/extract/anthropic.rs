use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, RETRY_AFTER};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ExtractionError, Extractor, Fields, Template, parse_fields};

const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
/// Returned by the API when it is overloaded; treated like a rate limit.
const STATUS_OVERLOADED: u16 = 529;

/// Vision extraction through the Anthropic Messages API.
#[derive(Clone)]
pub struct AnthropicExtractor {
    http: reqwest::Client,
    api_url: String,
    model: String,
}

impl AnthropicExtractor {
    pub fn new(api_key: &str, model: &str) -> Result<Self> {
        Self::with_api_url(api_key, model, DEFAULT_API_URL)
    }

    pub fn with_api_url(api_key: &str, model: &str, api_url: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut key =
            HeaderValue::from_str(api_key).context("ANTHROPIC_API_KEY is not a valid header")?;
        key.set_sensitive(true);
        headers.insert("x-api-key", key);
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(120))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            api_url: api_url.to_string(),
            model: model.to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Image { source: ImageSource },
    Text { text: &'a str },
}

#[derive(Serialize)]
struct ImageSource {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: &'static str,
    data: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
}

#[derive(Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl Extractor for AnthropicExtractor {
    async fn extract(
        &self,
        images: &[PathBuf],
        template: &Template,
    ) -> Result<Fields, ExtractionError> {
        let mut content = Vec::with_capacity(images.len() + 1);
        for path in images {
            let bytes = tokio::fs::read(path).await.map_err(|err| {
                ExtractionError::Transient(format!("failed to read {}: {err}", path.display()))
            })?;
            content.push(ContentPart::Image {
                source: ImageSource {
                    kind: "base64",
                    media_type: media_type_for(path),
                    data: BASE64.encode(bytes),
                },
            });
        }
        content.push(ContentPart::Text {
            text: template.instruction,
        });

        let request = MessagesRequest {
            model: &self.model,
            max_tokens: template.max_tokens,
            messages: vec![Message {
                role: "user",
                content,
            }],
        };

        let response = self
            .http
            .post(&self.api_url)
            .json(&request)
            .send()
            .await
            .map_err(|err| ExtractionError::Transient(err.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == STATUS_OVERLOADED {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(ExtractionError::RateLimited { retry_after });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Transient(format!(
                "extraction service returned {status}: {}",
                body.chars().take(300).collect::<String>()
            )));
        }

        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|err| ExtractionError::Transient(format!("unreadable response: {err}")))?;

        let text = body
            .content
            .into_iter()
            .find(|block| block.kind == "text")
            .and_then(|block| block.text)
            .unwrap_or_default();

        debug!(template = template.name, chars = text.len(), "extraction response received");
        parse_fields(&text)
    }
}

fn media_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/png",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_type_follows_extension() {
        assert_eq!(media_type_for(Path::new("a/b.PNG")), "image/png");
        assert_eq!(media_type_for(Path::new("a/b.jpeg")), "image/jpeg");
        assert_eq!(media_type_for(Path::new("a/b")), "image/png");
    }

    #[test]
    fn request_serializes_image_then_text_parts() {
        let request = MessagesRequest {
            model: "test-model",
            max_tokens: 16,
            messages: vec![Message {
                role: "user",
                content: vec![
                    ContentPart::Image {
                        source: ImageSource {
                            kind: "base64",
                            media_type: "image/png",
                            data: "AAAA".to_string(),
                        },
                    },
                    ContentPart::Text { text: "read it" },
                ],
            }],
        };

        let value = serde_json::to_value(&request).expect("serialize");
        let parts = &value["messages"][0]["content"];
        assert_eq!(parts[0]["type"], "image");
        assert_eq!(parts[0]["source"]["type"], "base64");
        assert_eq!(parts[0]["source"]["media_type"], "image/png");
        assert_eq!(parts[1]["type"], "text");
        assert_eq!(parts[1]["text"], "read it");
    }
}
