use color_eyre::Result;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub llm: LlmConfig,
    #[serde(default)]
    pub context: ContextConfig,
    pub agents: HashMap<String, AgentConfig>,
}

/// OpenAI-compatible backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the chat-completions API, e.g. `http://localhost:11434/v1`
    pub base_url: String,
    /// Bearer token; empty means the backend needs none
    #[serde(default)]
    pub api_key: String,
}

/// Context-routing defaults applied at startup
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContextConfig {
    /// Pin all routing to this notebook; empty means auto
    #[serde(default)]
    pub notebook: String,
    /// Standing avoidance summary injected into every context block
    #[serde(default)]
    pub avoidance: String,
}

/// Agent-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub model: String,
    pub system_prompt: String,
}

impl Default for Config {
    fn default() -> Self {
        let mut agents = HashMap::new();

        let assistant_personality = "You are the Work-OS assistant. Be concise, friendly, and \
            direct. Use the conversation context you are given; ask before assuming.";

        agents.insert(
            "chat".to_string(),
            AgentConfig {
                model: "gpt-4o-mini".to_string(),
                system_prompt: assistant_personality.to_string(),
            },
        );

        agents.insert(
            "decompose".to_string(),
            AgentConfig {
                model: "gpt-4o-mini".to_string(),
                system_prompt: format!(
                    "{} You break tasks into short, ordered subtask lists: one subtask per \
                     line, numbered, no commentary.",
                    assistant_personality
                ),
            },
        );

        Self {
            llm: LlmConfig {
                base_url: "http://localhost:11434/v1".to_string(),
                api_key: String::new(),
            },
            context: ContextConfig::default(),
            agents,
        }
    }
}

impl Config {
    /// Loads configuration from disk or creates default if not found
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            // Create default config file
            let config = Config::default();
            config.save()?;
            return Ok(config);
        }

        let contents = fs::read_to_string(&config_path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Saves configuration to disk
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&config_path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Returns the path to the configuration file
    pub fn config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("", "", "workos")
            .ok_or_else(|| color_eyre::eyre::eyre!("Could not determine config directory"))?;
        Ok(proj_dirs.config_dir().join("config.toml"))
    }
}
