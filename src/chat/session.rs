//! The chat session loop.
//!
//! [`ChatSession`] reads a line, routes it to coder switching, the exit
//! words, the command registry, or the model, and keeps the conversation
//! history.  Only complete responses are recorded.

use std::time::Instant;

use futures::StreamExt;

use crate::Result;
use crate::accumulating_stream::AccumulatingStream;
use crate::chat::commands::{CommandContext, CommandRegistry};
use crate::chat::input::{Completions, Prompter, UserInput};
use crate::client::{ChatBackend, ClientFactory};
use crate::observability::{
    CHAT_EMPTY_RESPONSES, CHAT_INTERRUPTED_RESPONSES, CHAT_TURN_DURATION, CHAT_TURNS,
    PROFILE_SWITCHES,
};
use crate::profile::{CoderProfile, ProfileStore, display_name_for, find_by_display_name};
use crate::render::Renderer;
use crate::types::Message;

/// Whole-line inputs that end the session without going through the registry.
const EXIT_WORDS: &[&str] = &["quit", "exit"];

/// Mutable session state shared with command handlers.
pub struct SessionContext {
    /// Set by a command to end the loop after the current iteration.
    pub exit_flag: bool,
    /// Client for the active coder.
    pub client: Box<dyn ChatBackend>,
    /// Conversation so far, oldest first.
    pub history: Vec<Message>,
}

impl SessionContext {
    /// Creates a fresh context around `client`.
    pub fn new(client: Box<dyn ChatBackend>) -> Self {
        Self {
            exit_flag: false,
            client,
            history: Vec::new(),
        }
    }
}

/// Builds the client for profile `id`.
pub(crate) fn build_client(
    store: &dyn ProfileStore,
    factory: &dyn ClientFactory,
    id: &str,
) -> Result<Box<dyn ChatBackend>> {
    factory.build(&store.profile_config(id), &store.tool_config())
}

/// The interactive session loop.
///
/// Each line is routed, in order, to coder switching (`@name`), the exit
/// words, the command registry, and finally a chat turn.
pub struct ChatSession<'a> {
    context: SessionContext,
    registry: CommandRegistry,
    store: &'a mut dyn ProfileStore,
    factory: &'a dyn ClientFactory,
    prompter: &'a mut dyn Prompter,
    renderer: &'a mut dyn Renderer,
}

impl<'a> ChatSession<'a> {
    /// Starts a session on the active coder.
    ///
    /// Fails when the active coder's configuration cannot produce a client.
    pub fn start(
        registry: CommandRegistry,
        store: &'a mut dyn ProfileStore,
        factory: &'a dyn ClientFactory,
        prompter: &'a mut dyn Prompter,
        renderer: &'a mut dyn Renderer,
    ) -> Result<Self> {
        let profiles = store.load_profiles();
        let active = store.active_profile_id();
        tracing::debug!(profiles = profiles.len(), active = %active, "starting session");
        let client = build_client(&*store, factory, &active)?;
        Ok(Self {
            context: SessionContext::new(client),
            registry,
            store,
            factory,
            prompter,
            renderer,
        })
    }

    /// The conversation so far.
    pub fn history(&self) -> &[Message] {
        &self.context.history
    }

    /// The model of the current client.
    pub fn model(&self) -> &str {
        self.context.client.model()
    }

    /// Whether a command asked the session to end.
    pub fn exit_requested(&self) -> bool {
        self.context.exit_flag
    }

    /// Runs until an exit command, an exit word, or cancelled input.
    ///
    /// Only client construction errors escape; everything else is reported
    /// and the loop continues.
    pub async fn run(&mut self) -> Result<()> {
        while !self.context.exit_flag {
            let profiles = self.store.load_profiles();
            let active = self.store.active_profile_id();
            let profile_name =
                (!active.is_empty()).then(|| display_name_for(&profiles, &active));
            let completions = Completions {
                commands: self.registry.names(),
                profiles: profiles.iter().map(|p| p.display_name.clone()).collect(),
            };

            let line = match self.prompter.read_line(profile_name.as_deref(), &completions) {
                UserInput::Line(line) => line,
                UserInput::Cancelled => {
                    self.renderer.print_info("Bye!");
                    break;
                }
            };
            let input = line.trim();
            if input.is_empty() {
                continue;
            }

            if let Some(requested) = input.strip_prefix('@') {
                self.switch_profile(requested.trim(), &profiles, &active)?;
                continue;
            }

            if EXIT_WORDS.iter().any(|word| input.eq_ignore_ascii_case(word)) {
                break;
            }

            if self.dispatch(input)? {
                continue;
            }

            self.chat_turn(input).await;
        }
        Ok(())
    }

    fn switch_profile(
        &mut self,
        requested: &str,
        profiles: &[CoderProfile],
        active: &str,
    ) -> Result<()> {
        let Some(profile) = find_by_display_name(profiles, requested) else {
            self.renderer
                .print_info(&format!("Unknown coder: {requested}"));
            return Ok(());
        };
        if profile.id == active {
            self.renderer
                .print_info(&format!("Already using coder: {requested}"));
            return Ok(());
        }
        self.store.set_active_profile_id(&profile.id);
        self.renderer
            .print_info(&format!("Changing coder to: {requested}..."));
        self.context.client = build_client(&*self.store, self.factory, &profile.id)?;
        PROFILE_SWITCHES.click();
        tracing::info!(profile = %profile.id, "switched coder");
        self.renderer
            .print_info(&format!("Coder changed to: {requested}"));
        Ok(())
    }

    fn dispatch(&mut self, input: &str) -> Result<bool> {
        let mut ctx = CommandContext {
            session: &mut self.context,
            store: &mut *self.store,
            factory: self.factory,
            prompter: &mut *self.prompter,
            renderer: &mut *self.renderer,
            registry: &self.registry,
        };
        self.registry.dispatch(input, &mut ctx)
    }

    async fn chat_turn(&mut self, input: &str) {
        CHAT_TURNS.click();
        let started = Instant::now();
        self.context.history.push(Message::user(input));

        let (mut fragments, text_rx) =
            AccumulatingStream::new(self.context.client.stream(&self.context.history));
        while let Some(fragment) = fragments.next().await {
            match fragment {
                Ok(text) => self.renderer.print_text(&text),
                Err(err) => tracing::debug!("response interrupted: {err}"),
            }
        }
        drop(fragments);
        self.renderer.finish_response();
        CHAT_TURN_DURATION.add(started.elapsed().as_secs_f64());

        match text_rx.await {
            Ok(response) if !response.is_empty() => {
                self.context.history.push(Message::assistant(response));
            }
            Ok(_) => {
                CHAT_EMPTY_RESPONSES.click();
                tracing::debug!("no response recorded for this turn");
            }
            Err(_) => {
                CHAT_INTERRUPTED_RESPONSES.click();
                tracing::debug!("interrupted response not recorded");
            }
        }
    }
}
