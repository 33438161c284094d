//! Model configuration prepared from a coder profile.
//!
//! A profile must name a model.  The server and key fall back to a local
//! default, and sampling options are forwarded only when the profile sets them.

use std::path::Path;

use serde_json::{Map, Value};

use crate::profile::ProfileConfig;
use crate::{Error, Result};

/// Server used when a profile names none.
pub const DEFAULT_MODEL_SERVER: &str = "http://localhost:11434/v1";

/// Placeholder key sent to servers that do not authenticate.
pub const DEFAULT_API_KEY: &str = "EMPTY";

/// Sampling options forwarded from a profile when set.
pub const SAMPLING_KEYS: &[&str] = &[
    "temperature",
    "top_p",
    "top_k",
    "num_predict",
    "max_tokens",
    "repeat_penalty",
    "presence_penalty",
    "frequency_penalty",
];

/// Everything needed to talk to one model.
#[derive(Clone, Debug, PartialEq)]
pub struct LlmConfig {
    /// Model identifier sent with every request.
    pub model: String,
    /// Base URL of the OpenAI-compatible server.
    pub model_server: String,
    /// Bearer token.
    pub api_key: String,
    /// System prompt, sent ahead of the history.
    pub system: Option<String>,
    /// Prompt template for servers that accept one.
    pub template: Option<String>,
    /// Sampling options; only keys the profile set.
    pub options: Map<String, Value>,
}

impl LlmConfig {
    /// Create a configuration for `model` with default server and key.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            model_server: DEFAULT_MODEL_SERVER.to_string(),
            api_key: DEFAULT_API_KEY.to_string(),
            system: None,
            template: None,
            options: Map::new(),
        }
    }

    /// Prepare a configuration from a profile.
    ///
    /// Fails when the profile does not name a model.
    pub fn from_profile(profile: &ProfileConfig) -> Result<Self> {
        let model = profile
            .get_str("model_name")
            .filter(|m| !m.is_empty())
            .ok_or_else(|| {
                Error::configuration(
                    "Model name is not configured for the active coder",
                    Some("model_name".to_string()),
                )
            })?;
        let mut config = Self::new(model);
        if let Some(server) = profile.get_str("model_server").filter(|s| !s.is_empty()) {
            config.model_server = server.to_string();
        }
        if let Some(key) = profile.get_str("api_key").filter(|k| !k.is_empty()) {
            config.api_key = key.to_string();
        }
        for key in SAMPLING_KEYS {
            let Some(value) = profile.get(key) else {
                continue;
            };
            if value.as_str() == Some("") {
                continue;
            }
            let value = serde_json::to_value(value).map_err(|e| {
                Error::configuration(format!("invalid value for {key}: {e}"), Some(key.to_string()))
            })?;
            config.options.insert(key.to_string(), value);
        }
        config.system = profile.get_str("system_prompt").and_then(resolve_text);
        config.template = profile.get_str("template").and_then(resolve_text);
        Ok(config)
    }
}

/// Read `value` as a file when it names one, else use it verbatim.
fn resolve_text(value: &str) -> Option<String> {
    if value.is_empty() {
        return None;
    }
    let path = Path::new(value);
    let text = if path.is_file() {
        match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(path = %path.display(), "cannot read prompt file: {err}");
                return None;
            }
        }
    } else {
        value.to_string()
    };
    if text.is_empty() { None } else { Some(text) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_model_is_configuration_error() {
        let err = LlmConfig::from_profile(&ProfileConfig::default()).unwrap_err();
        assert!(err.is_configuration());
        let err = LlmConfig::from_profile(&ProfileConfig::from_toml_str("model_name = \"\"").unwrap())
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn defaults_apply() {
        let config =
            LlmConfig::from_profile(&ProfileConfig::from_toml_str("model_name = \"qwen3\"").unwrap())
                .unwrap();
        assert_eq!(config.model, "qwen3");
        assert_eq!(config.model_server, DEFAULT_MODEL_SERVER);
        assert_eq!(config.api_key, DEFAULT_API_KEY);
        assert!(config.options.is_empty());
        assert_eq!(config.system, None);
        assert_eq!(config.template, None);
    }

    #[test]
    fn only_present_options_are_forwarded() {
        let profile = ProfileConfig::from_toml_str(
            r#"
model_name = "qwen3"
model_server = "http://gpu:8000/v1"
api_key = "sk-local"
temperature = 0.2
top_k = 40
top_p = ""
seed = 7
"#,
        )
        .unwrap();
        let config = LlmConfig::from_profile(&profile).unwrap();
        assert_eq!(config.model_server, "http://gpu:8000/v1");
        assert_eq!(config.api_key, "sk-local");
        assert_eq!(config.options.len(), 2);
        assert_eq!(config.options["temperature"], json!(0.2));
        assert_eq!(config.options["top_k"], json!(40));
    }

    #[test]
    fn prompts_from_file_or_literal() {
        let dir = tempfile::tempdir().unwrap();
        let prompt = dir.path().join("system.txt");
        std::fs::write(&prompt, "You are terse.").unwrap();
        let mut table = toml::Table::new();
        table.insert("model_name".into(), "qwen3".into());
        table.insert("system_prompt".into(), prompt.display().to_string().into());
        table.insert("template".into(), "{{ .Prompt }}".into());
        let config = LlmConfig::from_profile(&ProfileConfig::new(table)).unwrap();
        assert_eq!(config.system.as_deref(), Some("You are terse."));
        assert_eq!(config.template.as_deref(), Some("{{ .Prompt }}"));
    }
}
