//! Environment configuration
//!
//! An [`EnvConfig`] names an environment and sets the runtime's stack and
//! call-depth limits. It can be built in code or read from TOML:
//!
//! ```toml
//! name = "worker-1"
//! initial_stack = 64
//! max_stack = 100000
//! max_call_depth = 100
//! ```
//!
//! Every key is optional; missing keys take their defaults.

use serde::{Deserialize, Serialize};
use slotbridge_core::StateConfig;
use slotbridge_core::state::{DEFAULT_MAX_CALL_DEPTH, DEFAULT_MAX_STACK};
use slotbridge_core::tagged_stack::DEFAULT_STACK_CAPACITY;
use std::fmt;
use std::path::{Path, PathBuf};

/// Name and limits of an [`Env`](crate::Env)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnvConfig {
    /// Label used in log output
    pub name: String,
    /// Slots reserved up front
    pub initial_stack: usize,
    /// Largest stack `ensure_capacity` will allow
    pub max_stack: usize,
    /// Deepest nesting of protected calls
    pub max_call_depth: usize,
}

impl Default for EnvConfig {
    fn default() -> Self {
        EnvConfig {
            name: "main".to_string(),
            initial_stack: DEFAULT_STACK_CAPACITY,
            max_stack: DEFAULT_MAX_STACK,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

/// Error loading an [`EnvConfig`]
#[derive(Debug)]
pub enum ConfigError {
    /// The file could not be read
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The text is not valid configuration TOML
    Parse(toml::de::Error),
    /// The values parse but are inconsistent
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "Failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
            ConfigError::Invalid(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse(e) => Some(e),
            ConfigError::Invalid(_) => None,
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl EnvConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        let config: EnvConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_stack == 0 {
            return Err(ConfigError::Invalid("max_stack must be positive".into()));
        }
        if self.initial_stack > self.max_stack {
            return Err(ConfigError::Invalid(format!(
                "initial_stack ({}) exceeds max_stack ({})",
                self.initial_stack, self.max_stack
            )));
        }
        if self.max_call_depth == 0 {
            return Err(ConfigError::Invalid("max_call_depth must be positive".into()));
        }
        Ok(())
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_initial_stack(mut self, slots: usize) -> Self {
        self.initial_stack = slots;
        self
    }

    pub fn with_max_stack(mut self, slots: usize) -> Self {
        self.max_stack = slots;
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    /// The runtime limits, without the name
    pub fn to_state_config(&self) -> StateConfig {
        StateConfig {
            initial_stack: self.initial_stack,
            max_stack: self.max_stack,
            max_call_depth: self.max_call_depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_defaults_match_runtime() {
        let config = EnvConfig::default();
        assert_eq!(config.name, "main");
        assert_eq!(config.to_state_config(), StateConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EnvConfig::from_toml_str("name = \"worker\"\nmax_call_depth = 10\n").unwrap();
        assert_eq!(config.name, "worker");
        assert_eq!(config.max_call_depth, 10);
        assert_eq!(config.max_stack, DEFAULT_MAX_STACK);
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(EnvConfig::from_toml_str("").unwrap(), EnvConfig::default());
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let err = EnvConfig::from_toml_str("max_stak = 5").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_wrong_type_is_rejected() {
        let err = EnvConfig::from_toml_str("max_stack = \"lots\"").unwrap_err();
        assert!(err.to_string().starts_with("Failed to parse config"));
    }

    #[test]
    fn test_inconsistent_limits() {
        let err = EnvConfig::from_toml_str("initial_stack = 10\nmax_stack = 5").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(EnvConfig::default().with_max_call_depth(0).validate().is_err());
    }

    #[test]
    fn test_builders() {
        let config = EnvConfig::default()
            .with_name("b")
            .with_initial_stack(8)
            .with_max_stack(16)
            .with_max_call_depth(4);
        assert_eq!(
            config.to_state_config(),
            StateConfig {
                initial_stack: 8,
                max_stack: 16,
                max_call_depth: 4,
            }
        );
        assert_eq!(config.name, "b");
    }

    #[test]
    fn test_serialize_round_trip() {
        let config = EnvConfig::default().with_name("rt");
        let text = toml::to_string(&config).unwrap();
        assert_eq!(EnvConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_load_missing_file() {
        let err = EnvConfig::load("/nonexistent/slotbridge.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.source().is_some());
    }
}
