// Public modules
pub mod chat_chunk;
pub mod chat_request;
pub mod message;

// Re-exports
pub use chat_chunk::{ChatCompletionChunk, ChunkChoice, ChunkDelta};
pub use chat_request::{ChatCompletionRequest, RequestMessage, RequestRole};
pub use message::{Message, MessageRole};
