use crate::primitives::grammar::LoadPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Load policy for grammar entries that don't specify one
    #[serde(default)]
    pub default_load_policy: LoadPolicy,

    /// Extra delay applied after yielding for `asap` activations
    #[serde(default = "default_asap_delay")]
    pub asap_delay_ms: u64,

    /// `EnvFilter` directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    #[serde(default)]
    pub grammars: Vec<GrammarConfig>,

    #[serde(default)]
    pub injections: Vec<InjectionConfig>,

    /// Paths to TextMate JSON themes
    #[serde(default)]
    pub themes: Vec<PathBuf>,
}

fn default_asap_delay() -> u64 {
    10
}

fn default_log_filter() -> String {
    "info".to_string()
}

/// A grammar file and, optionally, the language id bound to it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrammarConfig {
    pub scope_name: String,

    /// Path to a `.sublime-syntax` file
    pub path: PathBuf,

    #[serde(default)]
    pub language_id: Option<String>,

    #[serde(default)]
    pub load: Option<LoadPolicy>,
}

/// Inject `scope_name` into each host scope of `into`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectionConfig {
    pub scope_name: String,
    pub into: Vec<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            default_load_policy: LoadPolicy::default(),
            asap_delay_ms: default_asap_delay(),
            log_filter: default_log_filter(),
            grammars: Vec::new(),
            injections: Vec::new(),
            themes: Vec::new(),
        }
    }
}

impl BridgeConfig {
    /// Default location of the configuration file
    #[cfg(feature = "runtime")]
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("tmbind").join("config.json"))
    }

    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let config: BridgeConfig =
            serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load policy for a grammar entry, falling back to the configured default
    pub fn load_policy_for(&self, grammar: &GrammarConfig) -> LoadPolicy {
        grammar.load.unwrap_or(self.default_load_policy)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut language_ids = HashSet::new();
        for grammar in &self.grammars {
            if grammar.scope_name.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "grammar scope_name cannot be empty".to_string(),
                ));
            }
            if let Some(language_id) = &grammar.language_id {
                if !language_ids.insert(language_id.as_str()) {
                    return Err(ConfigError::ValidationError(format!(
                        "language id '{language_id}' is bound more than once"
                    )));
                }
            }
        }

        for injection in &self.injections {
            if injection.into.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "injection '{}' has no host scopes",
                    injection.scope_name
                )));
            }
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(msg) => write!(f, "IO error: {msg}"),
            ConfigError::ParseError(msg) => write!(f, "Parse error: {msg}"),
            ConfigError::ValidationError(msg) => write!(f, "Validation error: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}
