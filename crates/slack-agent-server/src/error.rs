use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },

    #[error("Invalid listen address: {0}")]
    InvalidAddress(String),

    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// Settings fields map one to one onto unprefixed environment variables
pub fn to_env_var(field: &str) -> String {
    field.to_uppercase()
}
