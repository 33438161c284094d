use serde::{Deserialize, Serialize};

/// Incremental content carried by a streamed choice.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChunkDelta {
    /// Role announced by the first chunk of a response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Text produced since the previous chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// One choice of a streamed chat completion chunk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChunkChoice {
    /// Choice index; only index 0 is rendered.
    #[serde(default)]
    pub index: u32,

    /// Delta for servers following the OpenAI streaming format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<ChunkDelta>,

    /// Full message for servers that stream whole snapshots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<ChunkDelta>,

    /// Why generation stopped, on the final chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// A `chat.completion.chunk` object from a streaming response.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChatCompletionChunk {
    /// Completion identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Model that produced the chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Streamed choices.
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

impl ChatCompletionChunk {
    /// Returns the text carried by the first choice, if any.
    pub fn content(&self) -> Option<&str> {
        let choice = self.choices.iter().find(|c| c.index == 0)?;
        choice
            .delta
            .as_ref()
            .or(choice.message.as_ref())
            .and_then(|d| d.content.as_deref())
    }

    /// Returns the finish reason of the first choice, if any.
    pub fn finish_reason(&self) -> Option<&str> {
        self.choices
            .iter()
            .find(|c| c.index == 0)
            .and_then(|c| c.finish_reason.as_deref())
    }
}
