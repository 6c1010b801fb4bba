use crate::error::{to_env_var, ConfigError};
use config::{Config, Environment};
use serde::Deserialize;
use slack_agent::identity::ClientCredentialsConfig;
use slack_agent::providers::configs::AnthropicProviderConfig;
use slack_agent::wrapper::{
    WrapperConfig, DEFAULT_PROVIDER_NAME, DEFAULT_USER_ID, DEFAULT_WORKLOAD_NAME,
};
use std::net::SocketAddr;

/// Runtime settings, read from the environment without a prefix
#[derive(Debug, Deserialize)]
pub struct Settings {
    pub host: String,
    pub port: u16,

    pub gateway_url: String,
    pub cognito_scope: String,
    pub workload_name: String,
    pub user_id: String,

    pub identity_provider_name: String,
    pub identity_token_url: String,
    pub identity_client_id: String,
    pub identity_client_secret: String,
    pub identity_cache_tokens: bool,

    pub anthropic_host: String,
    pub anthropic_api_key: String,
    pub model: String,
    pub max_tokens: i32,
    #[serde(default)]
    pub temperature: Option<f32>,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Runtime defaults
            .set_default("host", default_host())?
            .set_default("port", default_port())?
            // Identity defaults
            .set_default("workload_name", DEFAULT_WORKLOAD_NAME)?
            .set_default("user_id", DEFAULT_USER_ID)?
            .set_default("identity_provider_name", DEFAULT_PROVIDER_NAME)?
            .set_default("identity_cache_tokens", false)?
            // Model defaults
            .set_default("anthropic_host", default_anthropic_host())?
            .set_default("model", default_model())?
            .set_default("max_tokens", default_max_tokens())?
            .add_source(Environment::default())
            .build()?;

        let result: Result<Self, config::ConfigError> = config.try_deserialize();

        match result {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                // Handle both NotFound and missing field message variants
                let error_str = err.to_string();
                if error_str.starts_with("missing field") {
                    let field = error_str
                        .trim_start_matches("missing field `")
                        .trim_end_matches('`');
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else if let config::ConfigError::NotFound(field) = &err {
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse().map_err(|_| ConfigError::InvalidAddress(addr))
    }

    pub fn wrapper_config(&self) -> WrapperConfig {
        WrapperConfig {
            gateway_url: self.gateway_url.clone(),
            scope: self.cognito_scope.clone(),
            workload_name: self.workload_name.clone(),
            user_id: self.user_id.clone(),
            provider_name: self.identity_provider_name.clone(),
            force_authentication: false,
        }
    }

    pub fn broker_config(&self) -> ClientCredentialsConfig {
        ClientCredentialsConfig {
            token_url: self.identity_token_url.clone(),
            client_id: self.identity_client_id.clone(),
            client_secret: self.identity_client_secret.clone(),
            cache_tokens: self.identity_cache_tokens,
        }
    }

    pub fn provider_config(&self) -> AnthropicProviderConfig {
        AnthropicProviderConfig {
            host: self.anthropic_host.clone(),
            api_key: self.anthropic_api_key.clone(),
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_anthropic_host() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_max_tokens() -> i32 {
    4096
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const KEYS: [&str; 16] = [
        "HOST",
        "PORT",
        "GATEWAY_URL",
        "COGNITO_SCOPE",
        "WORKLOAD_NAME",
        "USER_ID",
        "IDENTITY_PROVIDER_NAME",
        "IDENTITY_TOKEN_URL",
        "IDENTITY_CLIENT_ID",
        "IDENTITY_CLIENT_SECRET",
        "IDENTITY_CACHE_TOKENS",
        "ANTHROPIC_HOST",
        "ANTHROPIC_API_KEY",
        "MODEL",
        "MAX_TOKENS",
        "TEMPERATURE",
    ];

    pub(crate) fn clean_env() {
        for key in KEYS {
            env::remove_var(key);
        }
    }

    pub(crate) fn set_required() {
        env::set_var("GATEWAY_URL", "https://gateway.example.com/mcp");
        env::set_var("COGNITO_SCOPE", "chat:write");
        env::set_var("IDENTITY_TOKEN_URL", "https://auth.example.com/oauth2/token");
        env::set_var("IDENTITY_CLIENT_ID", "client");
        env::set_var("IDENTITY_CLIENT_SECRET", "secret");
        env::set_var("ANTHROPIC_API_KEY", "test-key");
    }

    #[test]
    #[serial]
    fn test_default_settings() {
        clean_env();
        set_required();

        let settings = Settings::new().unwrap();
        assert_eq!(settings.host, "0.0.0.0");
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.workload_name, "slack-gateway-agent");
        assert_eq!(settings.user_id, "m2m-user-001");
        assert_eq!(settings.identity_provider_name, "agentcore-identity-for-gateway");
        assert!(!settings.identity_cache_tokens);
        assert_eq!(settings.anthropic_host, "https://api.anthropic.com");
        assert_eq!(settings.model, "claude-sonnet-4-20250514");
        assert_eq!(settings.max_tokens, 4096);
        assert_eq!(settings.provider_config().temperature, None);

        let wrapper = settings.wrapper_config();
        assert_eq!(wrapper.scope, "chat:write");
        assert!(!wrapper.force_authentication);

        clean_env();
    }

    #[test]
    #[serial]
    fn test_missing_gateway_url() {
        clean_env();
        set_required();
        env::remove_var("GATEWAY_URL");

        let err = Settings::new().unwrap_err();
        match err {
            ConfigError::MissingEnvVar { env_var } => assert_eq!(env_var, "GATEWAY_URL"),
            other => panic!("Expected MissingEnvVar, got {:?}", other),
        }

        clean_env();
    }

    #[test]
    #[serial]
    fn test_environment_override() {
        clean_env();
        set_required();
        env::set_var("PORT", "9090");
        env::set_var("WORKLOAD_NAME", "ops-agent");
        env::set_var("IDENTITY_CACHE_TOKENS", "true");
        env::set_var("MAX_TOKENS", "1024");
        env::set_var("TEMPERATURE", "0.5");

        let settings = Settings::new().unwrap();
        assert_eq!(settings.port, 9090);
        assert_eq!(settings.workload_name, "ops-agent");
        assert!(settings.identity_cache_tokens);
        assert!(settings.broker_config().cache_tokens);
        assert_eq!(settings.provider_config().max_tokens, 1024);
        assert_eq!(settings.provider_config().temperature, Some(0.5));

        clean_env();
    }

    #[test]
    #[serial]
    fn test_socket_addr_conversion() {
        clean_env();
        set_required();
        env::set_var("HOST", "127.0.0.1");
        env::set_var("PORT", "3000");

        let settings = Settings::new().unwrap();
        let addr = settings.socket_addr().unwrap();
        assert_eq!(addr.to_string(), "127.0.0.1:3000");

        clean_env();
    }
}
