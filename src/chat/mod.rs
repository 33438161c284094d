//! Interactive chat with locally hosted coding models.
//!
//! This module provides the REPL session that ties the library together. It
//! supports:
//!
//! - Streaming responses with real-time fragment display
//! - Switching between coder profiles with `@name` or `/list`
//! - Slash commands for session control
//!
//! # Architecture
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`session`]: The session loop and its shared state
//! - [`commands`]: Slash command registry and built-in commands
//! - [`input`]: Line editing, completion, and the coder selector

mod commands;
mod config;
mod input;
mod session;

pub use crate::render::{PlainTextRenderer, Renderer};
pub use commands::{
    COMMAND_PREFIX, CommandContext, CommandHandler, CommandRegistry, format_help, parse_command,
};
pub use config::{ChatArgs, ChatConfig};
pub use input::{
    Completions, Prompter, RustylinePrompter, UserInput, choice_label, format_prompt, fuzzy_rank,
    resolve_selection, show_choices,
};
pub use session::{ChatSession, SessionContext};
