use serde::Serialize;
use serde_json::{Map, Value};

use crate::types::{Message, MessageRole};

/// Role of a message on the wire, which adds `system` to the history roles.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestRole {
    /// System prompt.
    System,

    /// User role.
    User,

    /// Assistant role.
    Assistant,
}

impl From<MessageRole> for RequestRole {
    fn from(role: MessageRole) -> Self {
        match role {
            MessageRole::User => RequestRole::User,
            MessageRole::Assistant => RequestRole::Assistant,
        }
    }
}

/// A message as sent to the chat completions endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestMessage<'a> {
    /// The role of the message.
    pub role: RequestRole,

    /// The text of the message.
    pub content: &'a str,
}

impl<'a> From<&'a Message> for RequestMessage<'a> {
    fn from(message: &'a Message) -> Self {
        Self {
            role: message.role.into(),
            content: &message.content,
        }
    }
}

/// Body of a streaming `POST /chat/completions` request.
///
/// Sampling options are flattened into the body; only keys present in the
/// profile appear on the wire.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest<'a> {
    /// Model identifier.
    pub model: &'a str,

    /// System prompt (if any) followed by the conversation history.
    pub messages: Vec<RequestMessage<'a>>,

    /// Always true; responses are consumed incrementally.
    pub stream: bool,

    /// Prompt template for servers that accept one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<&'a str>,

    /// Forwarded sampling options.
    #[serde(flatten)]
    pub options: &'a Map<String, Value>,
}

impl<'a> ChatCompletionRequest<'a> {
    /// Build a streaming request for `history`, prefixed by `system` when set.
    pub fn new(
        model: &'a str,
        system: Option<&'a str>,
        history: &'a [Message],
        template: Option<&'a str>,
        options: &'a Map<String, Value>,
    ) -> Self {
        let mut messages = Vec::with_capacity(history.len() + 1);
        if let Some(system) = system {
            messages.push(RequestMessage {
                role: RequestRole::System,
                content: system,
            });
        }
        messages.extend(history.iter().map(RequestMessage::from));
        Self {
            model,
            messages,
            stream: true,
            template,
            options,
        }
    }
}
