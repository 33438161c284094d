// Public modules
pub mod accumulating_stream;
pub mod chat;
pub mod client;
pub mod error;
pub mod llm_config;
pub mod observability;
pub mod profile;
pub mod render;
pub mod sse;
pub mod tools;
pub mod types;

// Re-exports
pub use accumulating_stream::{AccumulatingStream, FragmentDecoder};
pub use client::{ChatBackend, ClientFactory, FragmentStream, HttpClientFactory, LlmClient};
pub use error::{Error, Result};
pub use llm_config::LlmConfig;
pub use observability::register_biometrics;
pub use profile::{CoderProfile, FileProfileStore, ProfileConfig, ProfileStore};
pub use render::{PlainTextRenderer, Renderer};
pub use sse::ChatStreamEvent;
pub use tools::{ToolConfig, ToolServer};
pub use types::*;
