//! Runtime configuration, loaded from environment variables.

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_STATE_PATH: &str = "DRILL_STATE_PATH";
pub const ENV_LOG: &str = "DRILL_LOG";
pub const ENV_AUTOSAVE: &str = "DRILL_AUTOSAVE";
pub const ENV_AI_PROVIDER: &str = "DRILL_AI_PROVIDER";
pub const ENV_AI_ENDPOINT: &str = "DRILL_AI_ENDPOINT";
pub const ENV_AI_MODEL: &str = "DRILL_AI_MODEL";
pub const ENV_AI_API_KEY: &str = "DRILL_AI_API_KEY";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must not be empty")]
    Empty { key: &'static str },

    #[error("{key} must be a boolean (true/false/1/0), got {value:?}")]
    InvalidBool { key: &'static str, value: String },

    #[error("{key} must be one of mock/chat, got {value:?}")]
    InvalidProvider { key: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Canned offline content.
    #[default]
    Mock,
    /// Chat completions over HTTP.
    Chat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub provider: ProviderKind,
    /// Full chat-completions URL.
    pub endpoint: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub max_completion_tokens: u32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Mock,
            endpoint: "https://ark.cn-beijing.volces.com/api/v3/chat/completions".to_string(),
            model: "doubao-seed-1-6-251015".to_string(),
            api_key: None,
            max_completion_tokens: 4096,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Snapshot file location.
    pub state_path: PathBuf,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Save after every applied action.
    pub autosave: bool,
    pub ai: AiConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            state_path: PathBuf::from("drill_state.json"),
            log_filter: "info,drill_engine=info,drill_runtime=debug".to_string(),
            autosave: true,
            ai: AiConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from environment variables, defaulting what is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env` with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = lookup(ENV_STATE_PATH) {
            if path.trim().is_empty() {
                return Err(ConfigError::Empty {
                    key: ENV_STATE_PATH,
                });
            }
            config.state_path = PathBuf::from(path);
        }
        if let Some(filter) = lookup(ENV_LOG) {
            if filter.trim().is_empty() {
                return Err(ConfigError::Empty { key: ENV_LOG });
            }
            config.log_filter = filter;
        }
        if let Some(raw) = lookup(ENV_AUTOSAVE) {
            config.autosave = parse_bool(ENV_AUTOSAVE, &raw)?;
        }
        if let Some(raw) = lookup(ENV_AI_PROVIDER) {
            config.ai.provider = match raw.trim().to_ascii_lowercase().as_str() {
                "mock" => ProviderKind::Mock,
                "chat" => ProviderKind::Chat,
                _ => {
                    return Err(ConfigError::InvalidProvider {
                        key: ENV_AI_PROVIDER,
                        value: raw,
                    })
                }
            };
        }
        if let Some(endpoint) = lookup(ENV_AI_ENDPOINT) {
            if endpoint.trim().is_empty() {
                return Err(ConfigError::Empty {
                    key: ENV_AI_ENDPOINT,
                });
            }
            config.ai.endpoint = endpoint.trim().to_string();
        }
        if let Some(model) = lookup(ENV_AI_MODEL) {
            if model.trim().is_empty() {
                return Err(ConfigError::Empty { key: ENV_AI_MODEL });
            }
            config.ai.model = model.trim().to_string();
        }
        config.ai.api_key = lookup(ENV_AI_API_KEY)
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        Ok(config)
    }
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            key,
            value: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = RuntimeConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert!(config.autosave);
    }

    #[test]
    fn test_overrides() {
        let config = RuntimeConfig::from_lookup(lookup(&[
            (ENV_STATE_PATH, "/tmp/drill.json"),
            (ENV_LOG, "warn"),
            (ENV_AUTOSAVE, "off"),
        ]))
        .unwrap();
        assert_eq!(config.state_path, PathBuf::from("/tmp/drill.json"));
        assert_eq!(config.log_filter, "warn");
        assert!(!config.autosave);
    }

    #[test]
    fn test_ai_settings() {
        let config = RuntimeConfig::from_lookup(lookup(&[
            (ENV_AI_PROVIDER, "Chat"),
            (ENV_AI_MODEL, "small-model"),
            (ENV_AI_API_KEY, "  "),
        ]))
        .unwrap();
        assert_eq!(config.ai.provider, ProviderKind::Chat);
        assert_eq!(config.ai.model, "small-model");
        assert_eq!(config.ai.api_key, None);
        assert_eq!(config.ai.endpoint, AiConfig::default().endpoint);

        let err = RuntimeConfig::from_lookup(lookup(&[(ENV_AI_PROVIDER, "gpt")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidProvider { .. }));
    }

    #[test]
    fn test_invalid_values() {
        let err = RuntimeConfig::from_lookup(lookup(&[(ENV_AUTOSAVE, "maybe")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidBool {
                key: ENV_AUTOSAVE,
                value: "maybe".into()
            }
        );
        let err = RuntimeConfig::from_lookup(lookup(&[(ENV_STATE_PATH, "  ")])).unwrap_err();
        assert_eq!(err, ConfigError::Empty { key: ENV_STATE_PATH });
    }

    #[test]
    fn test_partial_file_config_uses_defaults() {
        let config: RuntimeConfig = serde_json::from_str(r#"{"autosave": false}"#).unwrap();
        assert!(!config.autosave);
        assert_eq!(config.state_path, PathBuf::from("drill_state.json"));
    }
}
