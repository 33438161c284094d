//! Terminal input for the chat session.
//!
//! The session only needs one line at a time (or a cancellation signal) and,
//! for `/list`, a coder picked from a list.  [`Prompter`] captures both so the
//! session can be driven by a script in tests; [`RustylinePrompter`] is the
//! interactive implementation.

use std::borrow::Cow;

use nucleo_matcher::pattern::{AtomKind, CaseMatching, Normalization, Pattern};
use nucleo_matcher::{Config, Matcher};
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};

use crate::profile::CoderProfile;
use crate::render::Renderer;
use crate::{Error, Result};

/// One read from the terminal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UserInput {
    /// A line of text, trimmed.
    Line(String),
    /// Ctrl-C or end of input.
    Cancelled,
}

/// Completion candidates offered while reading a line.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Completions {
    /// Registered command names, prefix included.
    pub commands: Vec<String>,
    /// Coder display names, offered after `@`.
    pub profiles: Vec<String>,
}

/// Source of user input.
pub trait Prompter {
    /// Read one line, decorating the prompt with the active coder's name.
    fn read_line(&mut self, profile_name: Option<&str>, completions: &Completions) -> UserInput;

    /// Let the user pick a coder, pre-selecting `default_id`.
    ///
    /// The choices and any notices go to `renderer`.  Returns `None` when the
    /// user backs out or nothing matches.
    fn select_coder(
        &mut self,
        profiles: &[CoderProfile],
        default_id: &str,
        renderer: &mut dyn Renderer,
    ) -> Option<String>;
}

/// The prompt shown before each line.
pub fn format_prompt(profile_name: Option<&str>) -> String {
    match profile_name {
        Some(name) if !name.is_empty() => format!("@{name} > "),
        _ => "> ".to_string(),
    }
}

/// The label a coder is listed under in the selector.
pub fn choice_label(profile: &CoderProfile) -> String {
    format!("{}: {}", profile.id, profile.display_name)
}

/// Rank `candidates` against `query`, best first.
///
/// An empty query keeps every candidate in its original order.
pub fn fuzzy_rank<'a>(query: &str, candidates: &'a [String]) -> Vec<&'a str> {
    if query.is_empty() {
        return candidates.iter().map(String::as_str).collect();
    }
    let mut matcher = Matcher::new(Config::DEFAULT);
    let pattern = Pattern::new(
        query,
        CaseMatching::Ignore,
        Normalization::Smart,
        AtomKind::Fuzzy,
    );
    pattern
        .match_list(candidates.iter().map(String::as_str), &mut matcher)
        .into_iter()
        .map(|(candidate, _)| candidate)
        .collect()
}

/// Print the selector's list of coders.
pub fn show_choices(profiles: &[CoderProfile], renderer: &mut dyn Renderer) {
    let mut lines = vec!["Available profiles:".to_string()];
    lines.extend(profiles.iter().map(|p| format!("  {}", choice_label(p))));
    lines.push("Type to search, press Tab to complete, and Enter to select".to_string());
    renderer.print_info(&lines.join("\n"));
}

/// Resolve selector input to a coder id.
///
/// `choices` pairs each id with its label.  An exact label wins, then the
/// first label containing the input (ignoring case), then the best fuzzy
/// match.  Blank input selects nothing.
pub fn resolve_selection(input: &str, choices: &[(String, String)]) -> Option<String> {
    let input = input.trim();
    if let Some((id, _)) = choices.iter().find(|(_, label)| label == input) {
        return Some(id.clone());
    }
    if input.is_empty() {
        return None;
    }
    let lowered = input.to_lowercase();
    if let Some((id, _)) = choices
        .iter()
        .find(|(_, label)| label.to_lowercase().contains(&lowered))
    {
        return Some(id.clone());
    }
    let labels: Vec<String> = choices.iter().map(|(_, label)| label.clone()).collect();
    let best = fuzzy_rank(input, &labels).into_iter().next()?;
    choices
        .iter()
        .find(|(_, label)| label == best)
        .map(|(id, _)| id.clone())
}

///////////////////////////////////////////// CoderHelper ////////////////////////////////////////////

#[derive(Clone, Debug)]
enum CompletionMode {
    Chat(Completions),
    Choices(Vec<String>),
}

/// Rustyline helper completing coder names, commands, and selector choices.
#[derive(Clone, Debug)]
struct CoderHelper {
    mode: CompletionMode,
}

impl Helper for CoderHelper {}

impl Completer for CoderHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let line = &line[..pos];
        let (start, ranked) = match &self.mode {
            CompletionMode::Chat(completions) => {
                if let Some(query) = line.strip_prefix('@') {
                    (1, fuzzy_rank(query, &completions.profiles))
                } else if line.starts_with('/') && !line.contains(char::is_whitespace) {
                    (0, fuzzy_rank(line, &completions.commands))
                } else {
                    (0, Vec::new())
                }
            }
            CompletionMode::Choices(labels) => (0, fuzzy_rank(line.trim(), labels)),
        };
        let candidates = ranked
            .into_iter()
            .map(|candidate| Pair {
                display: candidate.to_string(),
                replacement: candidate.to_string(),
            })
            .collect();
        Ok((start, candidates))
    }
}

impl Highlighter for CoderHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        Cow::Borrowed(line)
    }
}

impl Hinter for CoderHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Option<String> {
        let CompletionMode::Chat(completions) = &self.mode else {
            return None;
        };
        let line = &line[..pos];
        if line.len() < 2 || !line.starts_with('/') || line.contains(' ') {
            return None;
        }
        completions
            .commands
            .iter()
            .find(|cmd| cmd.starts_with(line) && cmd.len() > line.len())
            .map(|cmd| cmd[line.len()..].to_string())
    }
}

impl Validator for CoderHelper {}

////////////////////////////////////////// RustylinePrompter /////////////////////////////////////////

/// Interactive prompter backed by `rustyline`.
pub struct RustylinePrompter {
    editor: Editor<CoderHelper, DefaultHistory>,
}

impl RustylinePrompter {
    /// Create a prompter with in-memory history.
    pub fn new() -> Result<Self> {
        let mut editor = Editor::new()
            .map_err(|e| Error::unknown(format!("cannot start line editor: {e}")))?;
        editor.set_helper(Some(CoderHelper {
            mode: CompletionMode::Chat(Completions::default()),
        }));
        Ok(Self { editor })
    }

    fn set_mode(&mut self, mode: CompletionMode) {
        if let Some(helper) = self.editor.helper_mut() {
            helper.mode = mode;
        }
    }
}

impl Prompter for RustylinePrompter {
    fn read_line(&mut self, profile_name: Option<&str>, completions: &Completions) -> UserInput {
        self.set_mode(CompletionMode::Chat(completions.clone()));
        match self.editor.readline(&format_prompt(profile_name)) {
            Ok(line) => {
                let line = line.trim().to_string();
                if !line.is_empty() {
                    if let Err(err) = self.editor.add_history_entry(line.as_str()) {
                        tracing::debug!("cannot record history: {err}");
                    }
                }
                UserInput::Line(line)
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => UserInput::Cancelled,
            Err(err) => {
                tracing::error!("cannot read input: {err}");
                UserInput::Cancelled
            }
        }
    }

    fn select_coder(
        &mut self,
        profiles: &[CoderProfile],
        default_id: &str,
        renderer: &mut dyn Renderer,
    ) -> Option<String> {
        let choices: Vec<(String, String)> = profiles
            .iter()
            .map(|p| (p.id.clone(), choice_label(p)))
            .collect();
        show_choices(profiles, renderer);

        let default = profiles
            .iter()
            .find(|p| p.id == default_id)
            .map(choice_label)
            .unwrap_or_default();
        self.set_mode(CompletionMode::Choices(
            choices.iter().map(|(_, label)| label.clone()).collect(),
        ));
        match self.editor.readline_with_initial("Select coder: ", (default.as_str(), "")) {
            Ok(input) => resolve_selection(&input, &choices),
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => {
                renderer.print_info("Selection cancelled");
                None
            }
            Err(err) => {
                tracing::error!("cannot read selection: {err}");
                None
            }
        }
    }
}
