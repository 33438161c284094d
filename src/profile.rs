//! Coder profiles and the store that serves them.
//!
//! Profiles live in `coders.toml`, one top-level table per coder keyed by id:
//!
//! ```toml
//! [qwen]
//! name = "Qwen"
//! model_name = "qwen3:8b"
//! temperature = 0.2
//! ```
//!
//! The active selection is session state held by the store; it is never
//! written back to disk.

use std::path::{Path, PathBuf};

use crate::tools::ToolConfig;

/// Default configuration directory, relative to the working directory.
pub const DEFAULT_CONFIG_DIR: &str = ".plaincoder";

/// Profile file inside the configuration directory.
pub const CODERS_FILENAME: &str = "coders.toml";

/// Tool-server file inside the configuration directory.
pub const MCP_SERVERS_FILENAME: &str = "mcp-servers.yaml";

/// A named coder profile as listed to the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoderProfile {
    /// Unique key within one load.
    pub id: String,
    /// Name shown in the prompt and matched by `@name`.
    pub display_name: String,
    /// Optional one-line description.
    pub description: Option<String>,
}

impl CoderProfile {
    /// Create a profile without a description.
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            description: None,
        }
    }
}

/// The raw settings of one profile, interpreted by the client factory.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProfileConfig {
    table: toml::Table,
}

impl ProfileConfig {
    /// Wrap a parsed profile table.
    pub fn new(table: toml::Table) -> Self {
        Self { table }
    }

    /// Parse a profile from TOML text.
    pub fn from_toml_str(text: &str) -> crate::Result<Self> {
        Ok(Self::new(toml::from_str(text)?))
    }

    /// Look up a raw value.
    pub fn get(&self, key: &str) -> Option<&toml::Value> {
        self.table.get(key)
    }

    /// Look up a string value; other types read as absent.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.table.get(key).and_then(|v| v.as_str())
    }

    /// True when the profile carries no settings at all.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Source of coder profiles and the active selection.
pub trait ProfileStore {
    /// All profiles in load order.  May be empty.
    fn load_profiles(&self) -> Vec<CoderProfile>;

    /// The active profile id, initialized to the first profile on first read.
    ///
    /// Returns the empty string when no profiles exist.
    fn active_profile_id(&mut self) -> String;

    /// Select a profile for the rest of the session.
    fn set_active_profile_id(&mut self, id: &str);

    /// Settings for `id`; empty when the profile does not exist.
    fn profile_config(&self, id: &str) -> ProfileConfig;

    /// Tool servers shared by every profile.
    fn tool_config(&self) -> ToolConfig;
}

/// The display name for `id`, falling back to the id itself.
pub fn display_name_for(profiles: &[CoderProfile], id: &str) -> String {
    profiles
        .iter()
        .find(|p| p.id == id)
        .map(|p| p.display_name.clone())
        .unwrap_or_else(|| id.to_string())
}

/// The first profile whose display name equals `input`, ignoring case.
pub fn find_by_display_name<'a>(
    profiles: &'a [CoderProfile],
    input: &str,
) -> Option<&'a CoderProfile> {
    let input = input.to_lowercase();
    profiles
        .iter()
        .find(|p| p.display_name.to_lowercase() == input)
}

////////////////////////////////////////// FileProfileStore //////////////////////////////////////////

/// Profile store backed by a configuration directory.
///
/// `coders.toml` is re-read on every call so edits made while the session
/// runs are picked up on the next prompt.
#[derive(Clone, Debug)]
pub struct FileProfileStore {
    config_dir: PathBuf,
    active: Option<String>,
}

impl FileProfileStore {
    /// Create a store reading from `config_dir`.
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            active: None,
        }
    }

    /// The directory this store reads from.
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    fn read_coders(&self) -> toml::Table {
        let path = self.config_dir.join(CODERS_FILENAME);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), "cannot read profiles: {err}");
                }
                return toml::Table::new();
            }
        };
        match toml::from_str::<toml::Table>(&text) {
            Ok(table) => table,
            Err(err) => {
                tracing::warn!(path = %path.display(), "ignoring malformed profiles: {err}");
                toml::Table::new()
            }
        }
    }
}

impl ProfileStore for FileProfileStore {
    fn load_profiles(&self) -> Vec<CoderProfile> {
        self.read_coders()
            .into_iter()
            .filter_map(|(id, value)| {
                let toml::Value::Table(table) = value else {
                    tracing::debug!(profile = %id, "skipping non-table entry");
                    return None;
                };
                let display_name = table
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or(&id)
                    .to_string();
                let description = table
                    .get("description")
                    .and_then(|v| v.as_str())
                    .map(String::from);
                Some(CoderProfile {
                    id,
                    display_name,
                    description,
                })
            })
            .collect()
    }

    fn active_profile_id(&mut self) -> String {
        if let Some(active) = &self.active {
            return active.clone();
        }
        match self.load_profiles().into_iter().next() {
            Some(first) => {
                self.active = Some(first.id.clone());
                first.id
            }
            None => String::new(),
        }
    }

    fn set_active_profile_id(&mut self, id: &str) {
        self.active = Some(id.to_string());
    }

    fn profile_config(&self, id: &str) -> ProfileConfig {
        match self.read_coders().remove(id) {
            Some(toml::Value::Table(table)) => ProfileConfig::new(table),
            _ => ProfileConfig::default(),
        }
    }

    fn tool_config(&self) -> ToolConfig {
        ToolConfig::load(&self.config_dir.join(MCP_SERVERS_FILENAME))
    }
}
