//! End-to-end tests of the chat session with scripted collaborators.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use futures::stream;

use plaincoder::chat::{
    ChatSession, CommandContext, CommandRegistry, Completions, Prompter, SessionContext,
    UserInput, format_help,
};
use plaincoder::{
    ChatBackend, ClientFactory, CoderProfile, Error, FragmentStream, Message, ProfileConfig,
    ProfileStore, Renderer, Result, ToolConfig,
};

///////////////////////////////////////////// Collaborators ////////////////////////////////////////////

struct ScriptedStore {
    profiles: Vec<CoderProfile>,
    configs: Vec<(String, ProfileConfig)>,
    active: Option<String>,
    selections_committed: Vec<String>,
}

impl ScriptedStore {
    /// Profiles whose config names a model unless the id starts with "broken".
    fn new(profiles: &[(&str, &str)]) -> Self {
        let configs = profiles
            .iter()
            .map(|(id, _)| {
                let text = if id.starts_with("broken") {
                    String::new()
                } else {
                    format!("model_name = \"model-{id}\"")
                };
                (id.to_string(), ProfileConfig::from_toml_str(&text).unwrap())
            })
            .collect();
        Self {
            profiles: profiles
                .iter()
                .map(|(id, name)| CoderProfile::new(*id, *name))
                .collect(),
            configs,
            active: None,
            selections_committed: Vec::new(),
        }
    }

    fn with_active(mut self, id: &str) -> Self {
        self.active = Some(id.to_string());
        self
    }
}

impl ProfileStore for ScriptedStore {
    fn load_profiles(&self) -> Vec<CoderProfile> {
        self.profiles.clone()
    }

    fn active_profile_id(&mut self) -> String {
        if self.active.is_none() {
            self.active = self.profiles.first().map(|p| p.id.clone());
        }
        self.active.clone().unwrap_or_default()
    }

    fn set_active_profile_id(&mut self, id: &str) {
        self.selections_committed.push(id.to_string());
        self.active = Some(id.to_string());
    }

    fn profile_config(&self, id: &str) -> ProfileConfig {
        self.configs
            .iter()
            .find(|(cid, _)| cid == id)
            .map(|(_, config)| config.clone())
            .unwrap_or_default()
    }

    fn tool_config(&self) -> ToolConfig {
        ToolConfig::empty()
    }
}

struct ScriptedBackend {
    model: String,
    fragments: Vec<&'static str>,
    seen: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl ChatBackend for ScriptedBackend {
    fn model(&self) -> &str {
        &self.model
    }

    fn stream<'a>(&'a self, history: &'a [Message]) -> FragmentStream<'a> {
        self.seen.lock().unwrap().push(history.to_vec());
        stream::iter(self.fragments.iter().map(|f| Ok(f.to_string()))).boxed()
    }
}

struct ScriptedFactory {
    fragments: Vec<&'static str>,
    builds: Cell<usize>,
    models: RefCell<Vec<String>>,
    seen: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl ScriptedFactory {
    fn replying(fragments: &[&'static str]) -> Self {
        Self {
            fragments: fragments.to_vec(),
            builds: Cell::new(0),
            models: RefCell::new(Vec::new()),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn turns(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

impl ClientFactory for ScriptedFactory {
    fn build(&self, config: &ProfileConfig, _tools: &ToolConfig) -> Result<Box<dyn ChatBackend>> {
        self.builds.set(self.builds.get() + 1);
        let model = config.get_str("model_name").ok_or_else(|| {
            Error::configuration(
                "Model name is not configured",
                Some("model_name".to_string()),
            )
        })?;
        self.models.borrow_mut().push(model.to_string());
        Ok(Box::new(ScriptedBackend {
            model: model.to_string(),
            fragments: self.fragments.clone(),
            seen: Arc::clone(&self.seen),
        }))
    }
}

#[derive(Default)]
struct ScriptedPrompter {
    inputs: VecDeque<&'static str>,
    selections: VecDeque<Option<String>>,
    prompts: Vec<Option<String>>,
    selector_defaults: Vec<String>,
}

impl ScriptedPrompter {
    fn lines(inputs: &[&'static str]) -> Self {
        Self {
            inputs: inputs.iter().copied().collect(),
            ..Self::default()
        }
    }

    fn selecting(mut self, selection: Option<&str>) -> Self {
        self.selections.push_back(selection.map(String::from));
        self
    }
}

impl Prompter for ScriptedPrompter {
    fn read_line(&mut self, profile_name: Option<&str>, _: &Completions) -> UserInput {
        self.prompts.push(profile_name.map(String::from));
        match self.inputs.pop_front() {
            Some(line) => UserInput::Line(line.to_string()),
            None => UserInput::Cancelled,
        }
    }

    fn select_coder(
        &mut self,
        _profiles: &[CoderProfile],
        default_id: &str,
        _renderer: &mut dyn Renderer,
    ) -> Option<String> {
        self.selector_defaults.push(default_id.to_string());
        self.selections.pop_front().flatten()
    }
}

#[derive(Default)]
struct Recorder {
    text: String,
    notices: Vec<String>,
}

impl Renderer for Recorder {
    fn print_text(&mut self, text: &str) {
        self.text.push_str(text);
    }

    fn print_info(&mut self, info: &str) {
        self.notices.push(info.to_string());
    }

    fn print_error(&mut self, error: &str) {
        self.notices.push(format!("Error: {error}"));
    }

    fn finish_response(&mut self) {
        self.text.push('\n');
    }
}

async fn run_session(
    registry: CommandRegistry,
    store: &mut ScriptedStore,
    factory: &ScriptedFactory,
    prompter: &mut ScriptedPrompter,
    renderer: &mut Recorder,
) -> Result<Vec<Message>> {
    let mut session = ChatSession::start(registry, store, factory, prompter, renderer)?;
    let outcome = session.run().await;
    let history = session.history().to_vec();
    outcome.map(|()| history)
}

fn alpha_beta() -> ScriptedStore {
    ScriptedStore::new(&[("a1", "Alpha"), ("a2", "Beta")]).with_active("a2")
}

//////////////////////////////////////////////// Chat turns ///////////////////////////////////////////////

#[tokio::test]
async fn chat_turn_appends_user_and_concatenated_response() {
    let mut store = alpha_beta();
    let factory = ScriptedFactory::replying(&["Hi", ", ", "there"]);
    let mut prompter = ScriptedPrompter::lines(&["hello", "again"]);
    let mut renderer = Recorder::default();

    let history = run_session(
        CommandRegistry::with_builtins(),
        &mut store,
        &factory,
        &mut prompter,
        &mut renderer,
    )
    .await
    .unwrap();

    assert_eq!(
        history,
        vec![
            Message::user("hello"),
            Message::assistant("Hi, there"),
            Message::user("again"),
            Message::assistant("Hi, there"),
        ]
    );
    assert_eq!(renderer.text, "Hi, there\nHi, there\n");
    // The streamer sees the history including the just-appended user turn.
    let seen = factory.seen.lock().unwrap();
    assert_eq!(seen[0], vec![Message::user("hello")]);
    assert_eq!(seen[1].len(), 3);
}

#[tokio::test]
async fn empty_stream_leaves_user_message_unanswered() {
    let mut store = alpha_beta();
    let factory = ScriptedFactory::replying(&[]);
    let mut prompter = ScriptedPrompter::lines(&["first", "second"]);
    let mut renderer = Recorder::default();

    let history = run_session(
        CommandRegistry::with_builtins(),
        &mut store,
        &factory,
        &mut prompter,
        &mut renderer,
    )
    .await
    .unwrap();

    assert_eq!(history, vec![Message::user("first"), Message::user("second")]);
    assert_eq!(renderer.text, "\n\n");
}

#[tokio::test]
async fn plain_input_falls_through_to_chat() {
    let mut store = alpha_beta();
    let factory = ScriptedFactory::replying(&["ok"]);
    let mut prompter = ScriptedPrompter::lines(&["hello", "quitting time", "exit now"]);
    let mut renderer = Recorder::default();

    let history = run_session(
        CommandRegistry::with_builtins(),
        &mut store,
        &factory,
        &mut prompter,
        &mut renderer,
    )
    .await
    .unwrap();

    assert_eq!(factory.turns(), 3);
    assert_eq!(history.len(), 6);
}

#[tokio::test]
async fn blank_input_is_ignored() {
    let mut store = alpha_beta();
    let factory = ScriptedFactory::replying(&["ok"]);
    let mut prompter = ScriptedPrompter::lines(&["", "   ", "\t"]);
    let mut renderer = Recorder::default();

    let history = run_session(
        CommandRegistry::with_builtins(),
        &mut store,
        &factory,
        &mut prompter,
        &mut renderer,
    )
    .await
    .unwrap();

    assert!(history.is_empty());
    assert_eq!(factory.turns(), 0);
    assert_eq!(renderer.notices, vec!["Bye!"]);
}

/////////////////////////////////////////////// Termination ///////////////////////////////////////////////

#[tokio::test]
async fn exit_words_end_session_case_insensitively() {
    for word in ["quit", "EXIT", "Quit"] {
        let mut store = alpha_beta();
        let factory = ScriptedFactory::replying(&["ok"]);
        let mut prompter = ScriptedPrompter::lines(&[word, "never read"]);
        let mut renderer = Recorder::default();

        let history = run_session(
            CommandRegistry::with_builtins(),
            &mut store,
            &factory,
            &mut prompter,
            &mut renderer,
        )
        .await
        .unwrap();

        assert!(history.is_empty());
        assert_eq!(prompter.inputs, VecDeque::from(["never read"]));
        assert!(renderer.notices.is_empty());
    }
}

#[tokio::test]
async fn bye_command_ends_session() {
    let mut store = alpha_beta();
    let factory = ScriptedFactory::replying(&["ok"]);
    let mut prompter = ScriptedPrompter::lines(&["/bye", "never read"]);
    let mut renderer = Recorder::default();

    run_session(
        CommandRegistry::with_builtins(),
        &mut store,
        &factory,
        &mut prompter,
        &mut renderer,
    )
    .await
    .unwrap();

    assert_eq!(renderer.notices, vec!["Goodbye!"]);
    assert_eq!(prompter.inputs.len(), 1);
}

#[tokio::test]
async fn cancelled_input_says_bye() {
    let mut store = alpha_beta();
    let factory = ScriptedFactory::replying(&["ok"]);
    let mut prompter = ScriptedPrompter::lines(&[]);
    let mut renderer = Recorder::default();

    let history = run_session(
        CommandRegistry::with_builtins(),
        &mut store,
        &factory,
        &mut prompter,
        &mut renderer,
    )
    .await
    .unwrap();

    assert!(history.is_empty());
    assert_eq!(renderer.notices, vec!["Bye!"]);
}

///////////////////////////////////////////////// Commands ////////////////////////////////////////////////

#[tokio::test]
async fn help_lists_commands_in_registration_order() {
    let mut registry = CommandRegistry::new();
    registry.register(
        "/bye",
        |_args, ctx| {
            ctx.session.exit_flag = true;
            Ok(true)
        },
        "Exit the app",
    );
    registry.register(
        "/help",
        |_args, ctx| {
            let help = format_help(&ctx.registry.list());
            ctx.renderer.print_info(&help);
            Ok(true)
        },
        "Show commands",
    );

    let mut store = alpha_beta();
    let factory = ScriptedFactory::replying(&["ok"]);
    let mut prompter = ScriptedPrompter::lines(&["/help"]);
    let mut renderer = Recorder::default();

    let history = run_session(registry, &mut store, &factory, &mut prompter, &mut renderer)
        .await
        .unwrap();

    assert!(history.is_empty());
    assert_eq!(
        renderer.notices[0],
        "Available commands:\n  /bye - Exit the app\n  /help - Show commands"
    );
}

#[tokio::test]
async fn unknown_command_is_consumed() {
    let mut store = alpha_beta();
    let factory = ScriptedFactory::replying(&["ok"]);
    let mut prompter = ScriptedPrompter::lines(&["/frobnicate the widgets"]);
    let mut renderer = Recorder::default();

    let history = run_session(
        CommandRegistry::with_builtins(),
        &mut store,
        &factory,
        &mut prompter,
        &mut renderer,
    )
    .await
    .unwrap();

    assert!(history.is_empty());
    assert_eq!(factory.turns(), 0);
    assert_eq!(renderer.notices, vec!["Unknown command: /frobnicate", "Bye!"]);
}

#[tokio::test]
async fn command_receives_remainder() {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&captured);
    let mut registry = CommandRegistry::with_builtins();
    registry.register(
        "/echo",
        move |args: &str, _ctx| {
            sink.lock().unwrap().push(args.to_string());
            Ok(true)
        },
        "Echo arguments",
    );

    let mut store = alpha_beta();
    let factory = ScriptedFactory::replying(&["ok"]);
    let mut prompter = ScriptedPrompter::lines(&["/echo", "/echo   one two  "]);
    let mut renderer = Recorder::default();

    run_session(registry, &mut store, &factory, &mut prompter, &mut renderer)
        .await
        .unwrap();

    assert_eq!(*captured.lock().unwrap(), vec!["", "one two"]);
}

#[test]
fn list_with_no_profiles_skips_selector() {
    let mut store = ScriptedStore::new(&[]);
    let factory = ScriptedFactory::replying(&[]);
    let mut prompter = ScriptedPrompter::default().selecting(Some("a1"));
    let mut renderer = Recorder::default();
    let registry = CommandRegistry::with_builtins();
    let mut session = SessionContext::new(Box::new(ScriptedBackend {
        model: "m".to_string(),
        fragments: Vec::new(),
        seen: Arc::default(),
    }));

    let mut ctx = CommandContext {
        session: &mut session,
        store: &mut store,
        factory: &factory,
        prompter: &mut prompter,
        renderer: &mut renderer,
        registry: &registry,
    };
    assert!(registry.dispatch("/list", &mut ctx).unwrap());
    assert!(!registry.dispatch("hello", &mut ctx).unwrap());

    assert_eq!(renderer.notices, vec!["No coders found in config file."]);
    assert!(prompter.selector_defaults.is_empty());
    assert_eq!(factory.builds.get(), 0);
}

#[tokio::test]
async fn list_selects_a_different_coder() {
    let mut store = alpha_beta();
    let factory = ScriptedFactory::replying(&["ok"]);
    let mut prompter = ScriptedPrompter::lines(&["/list"]).selecting(Some("a1"));
    let mut renderer = Recorder::default();

    run_session(
        CommandRegistry::with_builtins(),
        &mut store,
        &factory,
        &mut prompter,
        &mut renderer,
    )
    .await
    .unwrap();

    assert_eq!(prompter.selector_defaults, vec!["a2"]);
    assert_eq!(store.active.as_deref(), Some("a1"));
    assert_eq!(factory.builds.get(), 2);
    assert_eq!(*factory.models.borrow(), vec!["model-a2", "model-a1"]);
    assert_eq!(
        renderer.notices,
        vec!["Current coder: Beta", "Coder changed to: Alpha", "Bye!"]
    );
    assert_eq!(prompter.prompts, vec![Some("Beta".to_string()), Some("Alpha".to_string())]);
}

#[tokio::test]
async fn list_keeps_coder_when_reconfirmed_or_cancelled() {
    let mut store = alpha_beta();
    let factory = ScriptedFactory::replying(&["ok"]);
    let mut prompter = ScriptedPrompter::lines(&["/list", "/list"])
        .selecting(Some("a2"))
        .selecting(None);
    let mut renderer = Recorder::default();

    run_session(
        CommandRegistry::with_builtins(),
        &mut store,
        &factory,
        &mut prompter,
        &mut renderer,
    )
    .await
    .unwrap();

    assert!(store.selections_committed.is_empty());
    assert_eq!(factory.builds.get(), 1);
    assert_eq!(
        renderer.notices,
        vec![
            "Current coder: Beta",
            "Coder unchanged: Beta",
            "Current coder: Beta",
            "Coder selection cancelled.",
            "Bye!",
        ]
    );
}

//////////////////////////////////////////////// Switching ////////////////////////////////////////////////

#[tokio::test]
async fn switching_to_another_coder_rebuilds_once() {
    let mut store = alpha_beta();
    let factory = ScriptedFactory::replying(&["ok"]);
    let mut prompter = ScriptedPrompter::lines(&["@Alpha"]);
    let mut renderer = Recorder::default();

    let history = run_session(
        CommandRegistry::with_builtins(),
        &mut store,
        &factory,
        &mut prompter,
        &mut renderer,
    )
    .await
    .unwrap();

    assert!(history.is_empty());
    assert_eq!(store.active.as_deref(), Some("a1"));
    assert_eq!(store.selections_committed, vec!["a1"]);
    assert_eq!(factory.builds.get(), 2);
    assert_eq!(
        renderer.notices,
        vec!["Changing coder to: Alpha...", "Coder changed to: Alpha", "Bye!"]
    );
}

#[tokio::test]
async fn switching_matches_display_names_ignoring_case() {
    let mut store = alpha_beta();
    let factory = ScriptedFactory::replying(&["ok"]);
    let mut prompter = ScriptedPrompter::lines(&["@  alpha "]);
    let mut renderer = Recorder::default();

    run_session(
        CommandRegistry::with_builtins(),
        &mut store,
        &factory,
        &mut prompter,
        &mut renderer,
    )
    .await
    .unwrap();

    assert_eq!(store.active.as_deref(), Some("a1"));
    assert_eq!(renderer.notices[1], "Coder changed to: alpha");
}

#[tokio::test]
async fn switching_to_current_coder_is_a_no_op() {
    let mut store = alpha_beta();
    let factory = ScriptedFactory::replying(&["ok"]);
    let mut prompter = ScriptedPrompter::lines(&["@beta"]);
    let mut renderer = Recorder::default();

    run_session(
        CommandRegistry::with_builtins(),
        &mut store,
        &factory,
        &mut prompter,
        &mut renderer,
    )
    .await
    .unwrap();

    assert_eq!(store.active.as_deref(), Some("a2"));
    assert!(store.selections_committed.is_empty());
    assert_eq!(factory.builds.get(), 1);
    assert_eq!(renderer.notices, vec!["Already using coder: beta", "Bye!"]);
}

#[tokio::test]
async fn duplicate_display_names_resolve_to_first() {
    let mut store =
        ScriptedStore::new(&[("a1", "Alpha"), ("a2", "Beta"), ("a3", "ALPHA")]).with_active("a2");
    let factory = ScriptedFactory::replying(&["ok"]);
    let mut prompter = ScriptedPrompter::lines(&["@alpha"]);
    let mut renderer = Recorder::default();

    run_session(
        CommandRegistry::with_builtins(),
        &mut store,
        &factory,
        &mut prompter,
        &mut renderer,
    )
    .await
    .unwrap();

    assert_eq!(store.active.as_deref(), Some("a1"));
}

#[tokio::test]
async fn unknown_coder_is_reported() {
    let mut store = alpha_beta();
    let factory = ScriptedFactory::replying(&["ok"]);
    let mut prompter = ScriptedPrompter::lines(&["@Gamma", "@/help"]);
    let mut renderer = Recorder::default();

    let history = run_session(
        CommandRegistry::with_builtins(),
        &mut store,
        &factory,
        &mut prompter,
        &mut renderer,
    )
    .await
    .unwrap();

    assert!(history.is_empty());
    assert_eq!(factory.builds.get(), 1);
    assert_eq!(
        renderer.notices,
        vec!["Unknown coder: Gamma", "Unknown coder: /help", "Bye!"]
    );
}

#[tokio::test]
async fn prompt_falls_back_to_id_for_missing_profile() {
    let mut store = alpha_beta().with_active("ghost");
    store.configs.push((
        "ghost".to_string(),
        ProfileConfig::from_toml_str("model_name = \"m\"").unwrap(),
    ));
    let factory = ScriptedFactory::replying(&["ok"]);
    let mut prompter = ScriptedPrompter::lines(&[]);
    let mut renderer = Recorder::default();

    run_session(
        CommandRegistry::with_builtins(),
        &mut store,
        &factory,
        &mut prompter,
        &mut renderer,
    )
    .await
    .unwrap();

    assert_eq!(prompter.prompts, vec![Some("ghost".to_string())]);
}

///////////////////////////////////////////// Configuration errors ////////////////////////////////////////

#[tokio::test]
async fn startup_without_model_is_fatal() {
    let mut store = ScriptedStore::new(&[("broken", "Broken"), ("a1", "Alpha")]);
    let factory = ScriptedFactory::replying(&["ok"]);
    let mut prompter = ScriptedPrompter::lines(&["hello"]);
    let mut renderer = Recorder::default();

    let err = run_session(
        CommandRegistry::with_builtins(),
        &mut store,
        &factory,
        &mut prompter,
        &mut renderer,
    )
    .await
    .unwrap_err();

    assert!(err.is_configuration());
    assert!(prompter.prompts.is_empty());
}

#[tokio::test]
async fn switching_to_broken_coder_is_fatal() {
    let mut store = ScriptedStore::new(&[("a1", "Alpha"), ("broken", "Broken")]);
    let factory = ScriptedFactory::replying(&["ok"]);
    let mut prompter = ScriptedPrompter::lines(&["@Broken", "never read"]);
    let mut renderer = Recorder::default();

    let err = run_session(
        CommandRegistry::with_builtins(),
        &mut store,
        &factory,
        &mut prompter,
        &mut renderer,
    )
    .await
    .unwrap_err();

    assert!(err.is_configuration());
    assert_eq!(renderer.notices, vec!["Changing coder to: Broken..."]);
    assert_eq!(prompter.inputs.len(), 1);
}

#[tokio::test]
async fn selecting_broken_coder_from_list_is_fatal() {
    let mut store = ScriptedStore::new(&[("a1", "Alpha"), ("broken", "Broken")]);
    let factory = ScriptedFactory::replying(&["ok"]);
    let mut prompter = ScriptedPrompter::lines(&["/list"]).selecting(Some("broken"));
    let mut renderer = Recorder::default();

    let err = run_session(
        CommandRegistry::with_builtins(),
        &mut store,
        &factory,
        &mut prompter,
        &mut renderer,
    )
    .await
    .unwrap_err();

    assert!(err.is_configuration());
}
