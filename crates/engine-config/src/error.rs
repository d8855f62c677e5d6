use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Environment variable '{0}' referenced in config is not set")]
    MissingVariable(String),

    #[error("Unterminated placeholder in config value: {0}")]
    UnterminatedPlaceholder(String),

    #[error("Config validation failed: {}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error("Unknown connection: {0}")]
    UnknownConnection(String),

    #[error("Unknown destination: {0}")]
    UnknownDestination(String),
}
