//! Tool-server definitions read from `mcp-servers.yaml`.
//!
//! A tool configuration never fails to load: a missing file, unparseable
//! YAML, or a document without a `mcpServers` mapping all produce an empty
//! set, and malformed entries are skipped with a warning.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

/// One tool server as declared in the configuration.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct ToolServer {
    /// Executable to launch for stdio servers.
    #[serde(default)]
    pub command: Option<String>,

    /// Endpoint for servers reached over HTTP.
    #[serde(default)]
    pub url: Option<String>,

    /// Arguments for `command`.
    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment for `command`.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// The tool servers available to a client, in declaration order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ToolConfig {
    servers: Vec<(String, ToolServer)>,
}

impl ToolConfig {
    /// A configuration with no tool servers.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse tool servers from YAML text.
    pub fn from_yaml_str(yaml: &str) -> Self {
        let doc: serde_yaml::Value = match serde_yaml::from_str(yaml) {
            Ok(doc) => doc,
            Err(err) => {
                tracing::warn!("ignoring malformed tool configuration: {err}");
                return Self::empty();
            }
        };
        let Some(servers) = doc.get("mcpServers").and_then(|s| s.as_mapping()) else {
            return Self::empty();
        };
        let mut config = Self::empty();
        for (name, server) in servers {
            let Some(name) = name.as_str() else {
                tracing::warn!("skipping tool server with non-string name");
                continue;
            };
            match serde_yaml::from_value::<ToolServer>(server.clone()) {
                Ok(server) => config.servers.push((name.to_string(), server)),
                Err(err) => tracing::warn!(server = name, "skipping tool server: {err}"),
            }
        }
        config
    }

    /// Load tool servers from `path`.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(yaml) => Self::from_yaml_str(&yaml),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::empty(),
            Err(err) => {
                tracing::warn!(path = %path.display(), "cannot read tool configuration: {err}");
                Self::empty()
            }
        }
    }

    /// True when no tool servers are configured.
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// The configured servers in declaration order.
    pub fn servers(&self) -> &[(String, ToolServer)] {
        &self.servers
    }

    /// The server names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.servers.iter().map(|(name, _)| name.as_str())
    }
}
