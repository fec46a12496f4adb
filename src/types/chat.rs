//! Chat-completions wire types.

use serde::{Deserialize, Serialize};

/// Chat completion request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// Model ID.
    pub model: String,

    /// Messages array.
    pub messages: Vec<Message>,

    /// Enable streaming.
    pub stream: bool,

    /// Temperature (0.0-2.0).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Max completion tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    /// Creates a streaming request with model and messages.
    pub fn streaming(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: true,
            temperature: None,
            max_tokens: None,
        }
    }

    /// Sets the temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Sets the max tokens.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Message role.
    pub role: Role,

    /// Message content.
    pub content: Content,
}

impl Message {
    /// Creates a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Content::Text(content.into()),
        }
    }

    /// Creates a multipart user message.
    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        Self {
            role: Role::User,
            content: Content::Parts(parts),
        }
    }
}

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System message.
    System,
    /// User message.
    User,
    /// Assistant message.
    Assistant,
}

/// Message content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    /// Text content.
    Text(String),
    /// Multipart content.
    Parts(Vec<ContentPart>),
}

/// Content part for multimodal messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Text part.
    Text {
        /// Text content.
        text: String,
    },
    /// Image URL part.
    ImageUrl {
        /// Image URL.
        image_url: ImageUrl,
    },
}

impl ContentPart {
    /// Creates a text part.
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    /// Creates an image part from a URL or data URI.
    pub fn image_url(url: impl Into<String>) -> Self {
        ContentPart::ImageUrl {
            image_url: ImageUrl { url: url.into() },
        }
    }
}

/// Image URL for vision input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    /// Image URL or base64 data URI.
    pub url: String,
}

/// One streamed chat completion chunk.
///
/// Every field is optional: proxies in front of OpenAI-compatible servers
/// emit keepalive and usage-only records that carry no choices.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatChunk {
    /// Chunk ID.
    #[serde(default)]
    pub id: Option<String>,

    /// Model ID.
    #[serde(default)]
    pub model: Option<String>,

    /// Chunk choices.
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

impl ChatChunk {
    /// Returns the first choice's incremental content, if non-empty.
    pub fn delta_content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.delta.content.as_deref())
            .filter(|content| !content.is_empty())
    }
}

/// Choice within a streamed chunk.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkChoice {
    /// Choice index.
    #[serde(default)]
    pub index: u32,

    /// Incremental delta.
    #[serde(default)]
    pub delta: Delta,

    /// Finish reason, set on the last chunk of a choice.
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Incremental message delta.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Delta {
    /// Role, usually only on the first chunk.
    #[serde(default)]
    pub role: Option<String>,

    /// Content fragment.
    #[serde(default)]
    pub content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serializes_openai_shape() {
        let request = ChatRequest::streaming(
            "gpt-4o",
            vec![
                Message::system("persona"),
                Message::user_parts(vec![
                    ContentPart::text("context"),
                    ContentPart::image_url("data:image/png;base64,AAAA"),
                ]),
            ],
        )
        .with_temperature(0.7)
        .with_max_tokens(4000);

        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(
            value,
            json!({
                "model": "gpt-4o",
                "messages": [
                    {"role": "system", "content": "persona"},
                    {"role": "user", "content": [
                        {"type": "text", "text": "context"},
                        {"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAA"}}
                    ]}
                ],
                "stream": true,
                "temperature": 0.7f32,
                "max_tokens": 4000
            })
        );
    }

    #[test]
    fn test_chunk_delta_content() {
        let chunk: ChatChunk = serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "choices": [{"index": 0, "delta": {"content": "第"}, "finish_reason": null}]
        }))
        .unwrap();

        assert_eq!(chunk.delta_content(), Some("第"));
    }

    #[test]
    fn test_chunk_without_content_has_no_delta() {
        let role_only: ChatChunk = serde_json::from_value(json!({
            "choices": [{"delta": {"role": "assistant"}}]
        }))
        .unwrap();
        assert_eq!(role_only.delta_content(), None);

        let empty: ChatChunk = serde_json::from_value(json!({
            "choices": [{"delta": {"content": ""}}]
        }))
        .unwrap();
        assert_eq!(empty.delta_content(), None);

        let no_choices: ChatChunk = serde_json::from_value(json!({"usage": {}})).unwrap();
        assert_eq!(no_choices.delta_content(), None);
    }
}
