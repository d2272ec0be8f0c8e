//! Chat session model.
//!
//! A session is ephemeral, one per request: validated role-tagged messages
//! plus a validated model config. Exactly one system message, always at
//! position 0; the only permitted mutation afterwards is a single in-place
//! rewrite of the last user message (search or document injection).

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::chat::models::ChatModelConfig;
use crate::chat::prompts;
use crate::error::ValidationError;

const DEFAULT_SYSTEM_PROMPT: &str = "You are an assistant.";

/// Maximum decoded size of a base64 image part (10MB).
const MAX_BASE64_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Image formats accepted in vision messages.
const IMAGE_FORMATS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "tiff", "ppm"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One part of a mixed text/image message, OpenAI wire shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Message content: plain text or a mixed sequence of text/image parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Flatten to the text found in the content (image parts contribute
    /// nothing). Used for prompt echoes and classifier input.
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(content.into()),
        }
    }
}

/// A message as it arrives on the wire; role is validated, not decoded.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IncomingMessage {
    pub role: String,
    pub content: MessageContent,
}

/// Validate roles and convert to typed messages.
pub fn validate_messages(messages: &[IncomingMessage]) -> Result<Vec<ChatMessage>, ValidationError> {
    messages
        .iter()
        .map(|m| {
            let role = match m.role.as_str() {
                "system" => Role::System,
                "user" => Role::User,
                "assistant" => Role::Assistant,
                other => return Err(ValidationError::InvalidRole(other.to_string())),
            };
            Ok(ChatMessage {
                role,
                content: m.content.clone(),
            })
        })
        .collect()
}

/// Validate the image parts of vision messages: base64 data URLs stay under
/// 10MB decoded and carry a supported format; http(s) URLs must end in a
/// supported extension (the 5MB limit is enforced by the backend at fetch).
pub fn validate_image_parts(messages: &[ChatMessage]) -> Result<(), ValidationError> {
    for message in messages {
        let MessageContent::Parts(parts) = &message.content else {
            continue;
        };
        for part in parts {
            if let ContentPart::ImageUrl { image_url } = part {
                validate_image_url(&image_url.url)?;
            }
        }
    }
    Ok(())
}

fn validate_image_url(url: &str) -> Result<(), ValidationError> {
    if let Some(rest) = url.strip_prefix("data:image/") {
        let (format, payload) = rest
            .split_once(";base64,")
            .ok_or_else(|| ValidationError::InvalidImage("not a base64 data URL".to_string()))?;
        if !IMAGE_FORMATS.contains(&format) {
            return Err(ValidationError::InvalidImage(format!(
                "unsupported image format '{format}'"
            )));
        }
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map_err(|e| ValidationError::InvalidImage(format!("invalid base64: {e}")))?;
        if decoded.len() > MAX_BASE64_IMAGE_BYTES {
            return Err(ValidationError::InvalidImage(
                "base64 image exceeds 10MB".to_string(),
            ));
        }
        Ok(())
    } else if url.starts_with("http://") || url.starts_with("https://") {
        let ext = url
            .rsplit('.')
            .next()
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        if !IMAGE_FORMATS.contains(&ext.as_str()) {
            return Err(ValidationError::InvalidImage(format!(
                "unsupported image URL extension '{ext}'"
            )));
        }
        Ok(())
    } else {
        Err(ValidationError::InvalidImage(
            "image must be a base64 data URL or an http(s) URL".to_string(),
        ))
    }
}

/// Ephemeral per-request conversation state.
#[derive(Debug, Clone)]
pub struct ChatSession {
    messages: Vec<ChatMessage>,
    model: ChatModelConfig,
    injected: bool,
}

impl ChatSession {
    /// Build a session from validated messages.
    ///
    /// If the caller did not lead with a system message, a default one is
    /// synthesized at position 0. The system content is then replaced by
    /// the framed system prompt (preset when `store_name` is given,
    /// caller-provided text otherwise).
    pub fn new(
        mut messages: Vec<ChatMessage>,
        model: ChatModelConfig,
        store_name: Option<&str>,
        document_mode: bool,
    ) -> Result<Self, ValidationError> {
        if messages.first().map(|m| m.role) != Some(Role::System) {
            messages.insert(0, ChatMessage::text(Role::System, DEFAULT_SYSTEM_PROMPT));
        }

        let system_text = match store_name {
            Some(name) if !name.trim().is_empty() => prompts::store_prompt(name)?,
            _ => messages[0].content.as_text(),
        };
        messages[0].content =
            MessageContent::Text(prompts::system_prompt(&system_text, document_mode));

        Ok(Self {
            messages,
            model,
            injected: false,
        })
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn model(&self) -> &ChatModelConfig {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut ChatModelConfig {
        &mut self.model
    }

    /// Conversation minus the system message, as fed to the search-check
    /// classifier.
    pub fn history(&self) -> &[ChatMessage] {
        &self.messages[1..]
    }

    /// Text of the last message, before any injection.
    pub fn last_user_text(&self) -> String {
        self.messages
            .last()
            .map(|m| m.content.as_text())
            .unwrap_or_default()
    }

    /// Replace the last message's content in place. Permitted exactly once
    /// per session (search or document injection, never both).
    pub fn inject_into_last(&mut self, content: String) {
        debug_assert!(!self.injected, "session content injected twice");
        if let Some(last) = self.messages.last_mut() {
            last.content = MessageContent::Text(content);
        }
        self.injected = true;
    }

    /// Concatenated prompt text, used for the metadata echo.
    pub fn prompt_echo(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.content.as_text())
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::models::ChatModelRequest;

    fn model() -> ChatModelConfig {
        ChatModelRequest {
            platform: "OpenAI".to_string(),
            model_name: "gpt-4o".to_string(),
            temperature: 0.7,
            max_tokens: 2048,
        }
        .validate()
        .unwrap()
    }

    #[test]
    fn synthesizes_system_message_at_index_zero() {
        let messages = vec![ChatMessage::text(Role::User, "hello")];
        let session = ChatSession::new(messages, model(), None, false).unwrap();
        assert_eq!(session.messages()[0].role, Role::System);
        assert_eq!(session.messages()[1].role, Role::User);
        assert_eq!(session.messages()[1].content.as_text(), "hello");
        assert_eq!(
            session
                .messages()
                .iter()
                .filter(|m| m.role == Role::System)
                .count(),
            1
        );
    }

    #[test]
    fn keeps_existing_system_message_framed() {
        let messages = vec![
            ChatMessage::text(Role::System, "Custom instructions."),
            ChatMessage::text(Role::User, "hi"),
        ];
        let session = ChatSession::new(messages, model(), None, false).unwrap();
        assert_eq!(session.messages().len(), 2);
        assert!(
            session.messages()[0]
                .content
                .as_text()
                .contains("Custom instructions.")
        );
    }

    #[test]
    fn history_excludes_system_message() {
        let messages = vec![
            ChatMessage::text(Role::User, "a"),
            ChatMessage::text(Role::Assistant, "b"),
            ChatMessage::text(Role::User, "c"),
        ];
        let session = ChatSession::new(messages, model(), None, false).unwrap();
        assert_eq!(session.history().len(), 3);
        assert!(session.history().iter().all(|m| m.role != Role::System));
    }

    #[test]
    fn inject_replaces_only_last_message() {
        let messages = vec![
            ChatMessage::text(Role::User, "a"),
            ChatMessage::text(Role::User, "question"),
        ];
        let mut session = ChatSession::new(messages, model(), None, false).unwrap();
        session.inject_into_last("augmented question".to_string());
        assert_eq!(
            session.messages().last().unwrap().content.as_text(),
            "augmented question"
        );
        assert_eq!(session.messages()[1].content.as_text(), "a");
    }

    #[test]
    fn invalid_role_is_rejected() {
        let incoming = vec![IncomingMessage {
            role: "robot".to_string(),
            content: MessageContent::Text("hi".to_string()),
        }];
        let err = validate_messages(&incoming).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidRole(r) if r == "robot"));
    }

    #[test]
    fn image_validation_rejects_odd_formats() {
        let msg = ChatMessage {
            role: Role::User,
            content: MessageContent::Parts(vec![ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: "https://example.com/picture.webp".to_string(),
                },
            }]),
        };
        assert!(validate_image_parts(std::slice::from_ref(&msg)).is_err());

        let ok = ChatMessage {
            role: Role::User,
            content: MessageContent::Parts(vec![ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: "https://example.com/picture.png".to_string(),
                },
            }]),
        };
        assert!(validate_image_parts(std::slice::from_ref(&ok)).is_ok());
    }

    #[test]
    fn base64_image_roundtrip_size_check() {
        let payload = base64::engine::general_purpose::STANDARD.encode([0u8; 64]);
        let msg = ChatMessage {
            role: Role::User,
            content: MessageContent::Parts(vec![ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: format!("data:image/png;base64,{payload}"),
                },
            }]),
        };
        assert!(validate_image_parts(std::slice::from_ref(&msg)).is_ok());
    }
}
