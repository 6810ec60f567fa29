use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level application configuration, loaded from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub model: ModelConfig,
    /// Tool providers to launch and connect at startup.
    pub servers: Vec<ServerConfig>,
    pub hooks: HooksConfig,
    pub turn: TurnConfig,
    pub system_prompt: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            servers: Vec::new(),
            hooks: HooksConfig::default(),
            turn: TurnConfig::default(),
            system_prompt: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path
    /// (~/.config/mcp-chat/config.toml), falling back to defaults if the
    /// file doesn't exist.
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Write current configuration to the default path.
    pub fn save(&self) -> anyhow::Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;
        Ok(())
    }

    /// Default config file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mcp-chat")
            .join("config.toml")
    }

    /// Data directory for the REPL history file.
    pub fn data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mcp-chat")
    }
}

/// Chat model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Base URL for the OpenAI-compatible API.
    pub api_base: String,
    /// Model name (e.g. "llama3.1:8b-instruct-q3_K_M").
    pub model: String,
    /// Optional API key.
    pub api_key: Option<String>,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:11434/v1".into(),
            model: "llama3.1:8b-instruct-q3_K_M".into(),
            api_key: None,
            max_tokens: 4096,
            temperature: 0.7,
        }
    }
}

/// One tool provider: a launch command plus arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Name used in diagnostics and collision reports.
    pub name: String,
    /// Command to launch the provider process.
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Per-request timeout against this provider.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

/// Optional hook prompt templates. `{user_message}` is substituted in both;
/// `{assistant_message}` only in the after-hook.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HooksConfig {
    pub before: Option<String>,
    pub after: Option<String>,
}

/// Turn executor limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    /// Maximum tool-call rounds per turn.
    pub max_tool_rounds: usize,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self { max_tool_rounds: 20 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("localhost:11434"));
        assert!(toml_str.contains("llama3.1"));
    }

    #[test]
    fn test_config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.model.model, config.model.model);
        assert_eq!(parsed.turn.max_tool_rounds, config.turn.max_tool_rounds);
    }

    #[test]
    fn test_servers_and_hooks_parse() {
        let toml_str = r#"
            system_prompt = "Be terse."

            [[servers]]
            name = "files"
            command = "uvx"
            args = ["mcp-server-filesystem", "/tmp"]

            [hooks]
            before = "Recall anything relevant to: {user_message}"
        "#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.servers.len(), 1);
        assert_eq!(config.servers[0].command, "uvx");
        assert_eq!(config.servers[0].timeout_secs, 30);
        assert!(config.hooks.before.is_some());
        assert!(config.hooks.after.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[model]\nmodel = \"qwen2.5:7b\"\n").unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.model.model, "qwen2.5:7b");
        // Unspecified sections fall back to defaults.
        assert_eq!(config.model.api_base, "http://localhost:11434/v1");
    }
}
