//! Slash commands for the chat session.
//!
//! Commands start with `/` and are never sent to the model.  The registry
//! maps each name to a handler; handlers get narrow mutable access to the
//! session through [`CommandContext`].

use crate::Result;
use crate::chat::input::Prompter;
use crate::chat::session::{SessionContext, build_client};
use crate::client::ClientFactory;
use crate::observability::{COMMANDS_DISPATCHED, PROFILE_SWITCHES};
use crate::profile::{ProfileStore, display_name_for};
use crate::render::Renderer;

/// The character every command name starts with.
pub const COMMAND_PREFIX: char = '/';

/// Everything a command handler may touch.
pub struct CommandContext<'a> {
    /// Exit flag, client, and history.
    pub session: &'a mut SessionContext,
    /// Profile source and active selection.
    pub store: &'a mut dyn ProfileStore,
    /// Builds a client after a profile change.
    pub factory: &'a dyn ClientFactory,
    /// Interactive selector.
    pub prompter: &'a mut dyn Prompter,
    /// Output for notices.
    pub renderer: &'a mut dyn Renderer,
    /// The registry being dispatched from.
    pub registry: &'a CommandRegistry,
}

/// A command handler.
///
/// Receives the text after the command name and returns whether the input was
/// consumed, which by convention is always `true`.
pub type CommandHandler = Box<dyn Fn(&str, &mut CommandContext<'_>) -> Result<bool> + Send + Sync>;

struct CommandEntry {
    name: String,
    handler: CommandHandler,
    description: String,
}

/// Registered commands, in registration order.
#[derive(Default)]
pub struct CommandRegistry {
    entries: Vec<CommandEntry>,
}

impl CommandRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding `/bye`, `/help`, and `/list`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("/bye", bye_command, "Exit the application");
        registry.register("/help", help_command, "Show available commands");
        registry.register("/list", list_command, "List and select available coders");
        registry
    }

    /// Registers `handler` under `name`, replacing any earlier registration.
    ///
    /// A replaced command keeps its position in the listing.
    pub fn register<F>(&mut self, name: impl Into<String>, handler: F, description: impl Into<String>)
    where
        F: Fn(&str, &mut CommandContext<'_>) -> Result<bool> + Send + Sync + 'static,
    {
        let entry = CommandEntry {
            name: name.into(),
            handler: Box::new(handler),
            description: description.into(),
        };
        match self.entries.iter_mut().find(|e| e.name == entry.name) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    /// Runs the command in `raw`, if it is one.
    ///
    /// Returns `Ok(false)` when `raw` does not start with the command prefix.
    /// Unknown commands print a notice and still count as handled.
    pub fn dispatch(&self, raw: &str, ctx: &mut CommandContext<'_>) -> Result<bool> {
        let Some((name, remainder)) = parse_command(raw) else {
            return Ok(false);
        };
        match self.entries.iter().find(|e| e.name == name) {
            Some(entry) => {
                COMMANDS_DISPATCHED.click();
                tracing::debug!(command = name, "dispatching command");
                (entry.handler)(remainder, ctx)
            }
            None => {
                ctx.renderer.print_info(&format!("Unknown command: {name}"));
                Ok(true)
            }
        }
    }

    /// `(name, description)` pairs in registration order.
    pub fn list(&self) -> Vec<(&str, &str)> {
        self.entries
            .iter()
            .map(|e| (e.name.as_str(), e.description.as_str()))
            .collect()
    }

    /// Registered command names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }
}

/// Splits a command into its name and the remainder after the first
/// whitespace run.
///
/// Returns `None` when `input` is not a command.
///
/// # Examples
///
/// ```
/// # use plaincoder::chat::parse_command;
/// assert_eq!(parse_command("/list"), Some(("/list", "")));
/// assert_eq!(parse_command("/list  available now"), Some(("/list", "available now")));
/// assert_eq!(parse_command("hello"), None);
/// ```
pub fn parse_command(input: &str) -> Option<(&str, &str)> {
    if !input.starts_with(COMMAND_PREFIX) {
        return None;
    }
    let input = input.trim_end();
    match input.find(char::is_whitespace) {
        Some(idx) => Some((&input[..idx], input[idx..].trim_start())),
        None => Some((input, "")),
    }
}

/// Formats the help text for `entries`.
pub fn format_help(entries: &[(&str, &str)]) -> String {
    let mut lines = vec!["Available commands:".to_string()];
    for (name, description) in entries {
        lines.push(format!("  {name} - {description}"));
    }
    lines.join("\n")
}

fn bye_command(_args: &str, ctx: &mut CommandContext<'_>) -> Result<bool> {
    ctx.session.exit_flag = true;
    ctx.renderer.print_info("Goodbye!");
    Ok(true)
}

fn help_command(_args: &str, ctx: &mut CommandContext<'_>) -> Result<bool> {
    let help = format_help(&ctx.registry.list());
    ctx.renderer.print_info(&help);
    Ok(true)
}

fn list_command(_args: &str, ctx: &mut CommandContext<'_>) -> Result<bool> {
    let profiles = ctx.store.load_profiles();
    if profiles.is_empty() {
        ctx.renderer.print_info("No coders found in config file.");
        return Ok(true);
    }
    let active = ctx.store.active_profile_id();
    let current = display_name_for(&profiles, &active);
    ctx.renderer.print_info(&format!("Current coder: {current}"));

    match ctx
        .prompter
        .select_coder(&profiles, &active, &mut *ctx.renderer)
    {
        None => ctx.renderer.print_info("Coder selection cancelled."),
        Some(selected) if selected == active => {
            ctx.renderer.print_info(&format!("Coder unchanged: {current}"));
        }
        Some(selected) => {
            ctx.store.set_active_profile_id(&selected);
            ctx.session.client = build_client(&*ctx.store, ctx.factory, &selected)?;
            PROFILE_SWITCHES.click();
            let name = display_name_for(&profiles, &selected);
            tracing::info!(profile = %selected, "switched coder");
            ctx.renderer.print_info(&format!("Coder changed to: {name}"));
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_args: &str, _ctx: &mut CommandContext<'_>) -> Result<bool> {
        Ok(true)
    }

    #[test]
    fn parse_simple_commands() {
        assert_eq!(parse_command("/help"), Some(("/help", "")));
        assert_eq!(parse_command("/bye  "), Some(("/bye", "")));
        assert_eq!(parse_command("/"), Some(("/", "")));
    }

    #[test]
    fn parse_command_with_remainder() {
        assert_eq!(parse_command("/list available"), Some(("/list", "available")));
        assert_eq!(
            parse_command("/say \t hello   world"),
            Some(("/say", "hello   world"))
        );
    }

    #[test]
    fn parse_non_commands() {
        assert_eq!(parse_command("hello"), None);
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("@Alpha"), None);
        assert_eq!(parse_command(" /help"), None);
    }

    #[test]
    fn help_text_format() {
        let help = format_help(&[("/bye", "Exit the app"), ("/help", "Show commands")]);
        assert_eq!(
            help,
            "Available commands:\n  /bye - Exit the app\n  /help - Show commands"
        );
    }

    #[test]
    fn builtins_in_order() {
        let registry = CommandRegistry::with_builtins();
        assert_eq!(registry.names(), vec!["/bye", "/help", "/list"]);
    }

    #[test]
    fn last_registration_wins_in_place() {
        let mut registry = CommandRegistry::new();
        registry.register("/a", noop, "first");
        registry.register("/b", noop, "second");
        registry.register("/a", noop, "replaced");
        assert_eq!(registry.list(), vec![("/a", "replaced"), ("/b", "second")]);
    }
}
