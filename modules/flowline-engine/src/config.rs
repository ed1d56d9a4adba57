use thiserror::Error;

const DEFAULT_LOG_FILTER: &str = "flowline=info";
const DEFAULT_RUNNER_CAPACITY: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be true or false, got {value:?}")]
    InvalidBool { key: &'static str, value: String },

    #[error("{key} must be a positive integer, got {value:?}")]
    InvalidCapacity { key: &'static str, value: String },
}

/// Engine configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// `tracing-subscriber` filter directive.
    pub log_filter: String,
    /// Emit JSON log lines instead of human-readable ones.
    pub log_json: bool,
    /// Queue depth of each flow runner.
    pub runner_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            log_json: false,
            runner_capacity: DEFAULT_RUNNER_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Load from the process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` for each variable. Unset variables take defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let log_filter = lookup("FLOWLINE_LOG")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        let log_json = match lookup("FLOWLINE_LOG_JSON") {
            Some(value) => parse_bool("FLOWLINE_LOG_JSON", &value)?,
            None => false,
        };

        let runner_capacity = match lookup("FLOWLINE_RUNNER_CAPACITY") {
            Some(value) => match value.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::InvalidCapacity {
                        key: "FLOWLINE_RUNNER_CAPACITY",
                        value,
                    })
                }
            },
            None => DEFAULT_RUNNER_CAPACITY,
        };

        Ok(Self {
            log_filter,
            log_json,
            runner_capacity,
        })
    }

    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  FLOWLINE_LOG: {}", self.log_filter);
        tracing::info!("  FLOWLINE_LOG_JSON: {}", self.log_json);
        tracing::info!("  FLOWLINE_RUNNER_CAPACITY: {}", self.runner_capacity);
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            key,
            value: value.to_string(),
        }),
    }
}
