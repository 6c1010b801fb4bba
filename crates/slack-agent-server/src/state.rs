use anyhow::Result;
use slack_agent::identity::ClientCredentialsBroker;
use slack_agent::providers::anthropic::AnthropicProvider;
use slack_agent::providers::base::Provider;
use slack_agent::{IdentityAwareAgent, ProviderFactory};
use std::sync::Arc;

use crate::configuration::Settings;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<IdentityAwareAgent>,
}

impl AppState {
    pub fn new(agent: IdentityAwareAgent) -> Self {
        Self {
            agent: Arc::new(agent),
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let broker = ClientCredentialsBroker::new(settings.broker_config())?;
        let provider_config = settings.provider_config();
        let factory: ProviderFactory = Box::new(move || {
            let provider = AnthropicProvider::new(provider_config.clone())?;
            Ok(Box::new(provider) as Box<dyn Provider>)
        });

        Ok(Self::new(IdentityAwareAgent::new(
            settings.wrapper_config(),
            Arc::new(broker),
            factory,
        )))
    }
}
