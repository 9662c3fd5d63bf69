//! Configuration management with file persistence

use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};

/// Phenomics Explorer configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(skip)]
    pub api_key: Option<String>,
    pub default_model: String,
    pub fallback_models: Vec<String>,
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_model: "openai/gpt-4.1".to_string(),
            fallback_models: vec!["openai/gpt-4o".to_string()],
            temperature: 0.0,
            max_tokens: 4096,
            timeout_secs: 120,
            base_url: None,
        }
    }
}

/// Graph database connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub uri: String,
    pub username: String,
    #[serde(skip)]
    pub password: Option<String>,
    pub database: String,
    pub pool_size: usize,
    pub query_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            username: "neo4j".to_string(),
            password: None,
            database: "neo4j".to_string(),
            pool_size: 8,
            query_timeout_secs: 6,
        }
    }
}

/// Settings for the query evaluation loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    pub reviewer_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer_model: Option<String>,
    pub reviewer_timeout_secs: u64,
    pub max_response_tokens: usize,
    pub summary_max_list_items: usize,
    pub history_window: usize,
    pub long_turn_chars: usize,
    pub excerpt_chars: usize,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            reviewer_enabled: true,
            reviewer_model: None,
            reviewer_timeout_secs: 60,
            max_response_tokens: 30_000,
            summary_max_list_items: 3,
            history_window: 10,
            long_turn_chars: 4000,
            excerpt_chars: 2000,
        }
    }
}

impl EvaluationConfig {
    pub fn reviewer_timeout(&self) -> Duration {
        Duration::from_secs(self.reviewer_timeout_secs)
    }
}

/// Settings for the query-generation loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub max_attempts: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_summary_path: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            graph_summary_path: None,
        }
    }
}

impl LlmConfig {
    pub fn resolved_api_key(&self) -> anyhow::Result<Option<String>> {
        self.enforce_env_only()?;

        Ok(env::var("PHENOMICS_API_KEY")
            .or_else(|_| env::var("OPENROUTER_API_KEY"))
            .ok())
    }

    pub fn redacted_api_key(&self) -> anyhow::Result<Option<String>> {
        self.resolved_api_key().map(|opt| opt.map(|key| redact(&key)))
    }

    pub fn enforce_env_only(&self) -> anyhow::Result<()> {
        if self.api_key.is_some() {
            return Err(anyhow!(
                "LLM API keys must be provided via environment variables, not stored in configuration"
            ));
        }
        Ok(())
    }
}

impl DatabaseConfig {
    /// Apply NEO4J_URI / NEO4J_USER / NEO4J_PASSWORD overrides
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(uri) = env::var("NEO4J_URI") {
            self.uri = uri;
        }
        if let Ok(user) = env::var("NEO4J_USER") {
            self.username = user;
        }
        if let Ok(password) = env::var("NEO4J_PASSWORD") {
            self.password = Some(password);
        }
        self
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

fn redact(secret: &str) -> String {
    if secret.len() <= 4 {
        "***".to_string()
    } else {
        format!("***{}", &secret[secret.len() - 4..])
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("PHENOMICS_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("phenomics")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;

        let mut config = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str::<Config>(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Config::default()
        };

        config.validate()?;
        config.database = config.database.with_env_overrides();
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.validate()?;

        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let path = Self::config_path()?;
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.llm.enforce_env_only()?;
        if self.database.query_timeout_secs == 0 {
            return Err(anyhow!("database.query_timeout_secs must be greater than zero"));
        }
        if self.evaluation.excerpt_chars * 2 > self.evaluation.long_turn_chars {
            return Err(anyhow!(
                "evaluation.excerpt_chars must be at most half of evaluation.long_turn_chars"
            ));
        }
        if self.agent.max_attempts == 0 {
            return Err(anyhow!("agent.max_attempts must be at least 1"));
        }
        Ok(())
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            "llm.default_model" => Ok(self.llm.default_model.clone()),
            "llm.fallback_models" => Ok(self.llm.fallback_models.join(", ")),
            "llm.temperature" => Ok(self.llm.temperature.to_string()),
            "llm.max_tokens" => Ok(self.llm.max_tokens.to_string()),
            "llm.timeout_secs" => Ok(self.llm.timeout_secs.to_string()),
            "llm.base_url" => Ok(self.llm.base_url.clone().unwrap_or_default()),

            "database.uri" => Ok(self.database.uri.clone()),
            "database.username" => Ok(self.database.username.clone()),
            "database.database" => Ok(self.database.database.clone()),
            "database.pool_size" => Ok(self.database.pool_size.to_string()),
            "database.query_timeout_secs" => Ok(self.database.query_timeout_secs.to_string()),

            "evaluation.reviewer_enabled" => Ok(self.evaluation.reviewer_enabled.to_string()),
            "evaluation.reviewer_model" => {
                Ok(self.evaluation.reviewer_model.clone().unwrap_or_default())
            }
            "evaluation.reviewer_timeout_secs" => {
                Ok(self.evaluation.reviewer_timeout_secs.to_string())
            }
            "evaluation.max_response_tokens" => {
                Ok(self.evaluation.max_response_tokens.to_string())
            }
            "evaluation.summary_max_list_items" => {
                Ok(self.evaluation.summary_max_list_items.to_string())
            }
            "evaluation.history_window" => Ok(self.evaluation.history_window.to_string()),
            "evaluation.long_turn_chars" => Ok(self.evaluation.long_turn_chars.to_string()),
            "evaluation.excerpt_chars" => Ok(self.evaluation.excerpt_chars.to_string()),

            "agent.max_attempts" => Ok(self.agent.max_attempts.to_string()),
            "agent.graph_summary_path" => Ok(self
                .agent
                .graph_summary_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default()),

            // Secrets are only ever shown redacted
            "llm.api_key" | "api_key" => match self.llm.redacted_api_key()? {
                Some(redacted) => Ok(redacted),
                None => Ok(
                    "(not set - use PHENOMICS_API_KEY or OPENROUTER_API_KEY env var)".to_string(),
                ),
            },
            "database.password" => match &self.database.password {
                Some(password) => Ok(redact(password)),
                None => Ok("(not set - use NEO4J_PASSWORD env var)".to_string()),
            },

            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `phenomics config list` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "llm.default_model" => {
                self.llm.default_model = value.to_string();
            }
            "llm.fallback_models" => {
                self.llm.fallback_models = value
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
            }
            "llm.temperature" => {
                let temp: f32 = value
                    .parse()
                    .with_context(|| format!("Invalid temperature value: {}", value))?;
                if !(0.0..=2.0).contains(&temp) {
                    return Err(anyhow!("Temperature must be between 0.0 and 2.0"));
                }
                self.llm.temperature = temp;
            }
            "llm.max_tokens" => {
                self.llm.max_tokens = parse_number(key, value)?;
            }
            "llm.timeout_secs" => {
                self.llm.timeout_secs = parse_number(key, value)?;
            }
            "llm.base_url" => {
                self.llm.base_url = non_empty(value);
            }

            "database.uri" => {
                if !value.contains("://") {
                    return Err(anyhow!(
                        "Invalid database URI: {}. Expected e.g. bolt://localhost:7687",
                        value
                    ));
                }
                self.database.uri = value.to_string();
            }
            "database.username" => {
                self.database.username = value.to_string();
            }
            "database.database" => {
                self.database.database = value.to_string();
            }
            "database.pool_size" => {
                let size: usize = parse_number(key, value)?;
                if size == 0 {
                    return Err(anyhow!("Pool size must be at least 1"));
                }
                self.database.pool_size = size;
            }
            "database.query_timeout_secs" => {
                let secs: u64 = parse_number(key, value)?;
                if secs == 0 {
                    return Err(anyhow!("Query timeout must be greater than zero"));
                }
                self.database.query_timeout_secs = secs;
            }

            "evaluation.reviewer_enabled" => {
                self.evaluation.reviewer_enabled = value
                    .parse()
                    .with_context(|| format!("Invalid boolean value: {}", value))?;
            }
            "evaluation.reviewer_model" => {
                self.evaluation.reviewer_model = non_empty(value);
            }
            "evaluation.reviewer_timeout_secs" => {
                self.evaluation.reviewer_timeout_secs = parse_number(key, value)?;
            }
            "evaluation.max_response_tokens" => {
                self.evaluation.max_response_tokens = parse_number(key, value)?;
            }
            "evaluation.summary_max_list_items" => {
                self.evaluation.summary_max_list_items = parse_number(key, value)?;
            }
            "evaluation.history_window" => {
                self.evaluation.history_window = parse_number(key, value)?;
            }
            "evaluation.long_turn_chars" => {
                self.evaluation.long_turn_chars = parse_number(key, value)?;
            }
            "evaluation.excerpt_chars" => {
                self.evaluation.excerpt_chars = parse_number(key, value)?;
            }

            "agent.max_attempts" => {
                let attempts: usize = parse_number(key, value)?;
                if attempts == 0 {
                    return Err(anyhow!("max_attempts must be at least 1"));
                }
                self.agent.max_attempts = attempts;
            }
            "agent.graph_summary_path" => {
                self.agent.graph_summary_path = non_empty(value).map(PathBuf::from);
            }

            "llm.api_key" | "api_key" | "database.password" => {
                return Err(anyhow!(
                    "Secrets cannot be stored in configuration. \
                     Set PHENOMICS_API_KEY / OPENROUTER_API_KEY or NEO4J_PASSWORD instead."
                ));
            }

            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `phenomics config list` to see available keys.",
                    key
                ));
            }
        }
        self.validate()
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        let keys = [
            "llm.default_model",
            "llm.fallback_models",
            "llm.temperature",
            "llm.max_tokens",
            "llm.timeout_secs",
            "llm.base_url",
            "llm.api_key",
            "database.uri",
            "database.username",
            "database.password",
            "database.database",
            "database.pool_size",
            "database.query_timeout_secs",
            "evaluation.reviewer_enabled",
            "evaluation.reviewer_model",
            "evaluation.reviewer_timeout_secs",
            "evaluation.max_response_tokens",
            "evaluation.summary_max_list_items",
            "evaluation.history_window",
            "evaluation.long_turn_chars",
            "evaluation.excerpt_chars",
            "agent.max_attempts",
            "agent.graph_summary_path",
        ];

        keys.into_iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }

    /// Reset configuration to defaults
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }
}

fn parse_number<T>(key: &str, value: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse()
        .with_context(|| format!("Invalid {} value: {}", key, value))
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
