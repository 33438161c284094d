//! Interactive chat with locally hosted coding models.
//!
//! # Usage
//!
//! ```bash
//! # Read profiles from ./.plaincoder/coders.toml
//! plaincoder
//!
//! # Use another configuration directory
//! plaincoder --config-dir ~/.config/plaincoder
//!
//! # Disable colors (useful for piping output)
//! plaincoder --no-color
//! ```
//!
//! # Input
//!
//! - `@name` - Switch to the coder with that display name
//! - `/help` - Show available commands
//! - `/list` - Pick a coder from a list
//! - `/bye`, `quit`, `exit` - Exit the application
//!
//! Set `PLAINCODER_LOG` (e.g. `PLAINCODER_LOG=debug`) to see diagnostics on stderr.

use arrrg::CommandLine;
use tracing_subscriber::EnvFilter;

use plaincoder::chat::{
    ChatArgs, ChatConfig, ChatSession, CommandRegistry, PlainTextRenderer, RustylinePrompter,
};
use plaincoder::{FileProfileStore, HttpClientFactory, Renderer};

fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("PLAINCODER_LOG").unwrap_or_else(|_| EnvFilter::new("error"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

/// Main entry point for the plaincoder application.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let (args, _) = ChatArgs::from_command_line_relaxed("plaincoder [OPTIONS]");
    let config = ChatConfig::from(args);

    let mut store = FileProfileStore::new(&config.config_dir);
    let factory = HttpClientFactory::new();
    let mut prompter = RustylinePrompter::new()?;
    let mut renderer = PlainTextRenderer::with_color(config.use_color);

    let outcome = match ChatSession::start(
        CommandRegistry::with_builtins(),
        &mut store,
        &factory,
        &mut prompter,
        &mut renderer,
    ) {
        Ok(mut session) => session.run().await,
        Err(err) => Err(err),
    };
    if let Err(err) = outcome {
        tracing::error!("session ended: {err:?}");
        renderer.print_error(&err.to_string());
        std::process::exit(1);
    }
    Ok(())
}
