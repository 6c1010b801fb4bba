//! The identity-aware agent wrapper.
//!
//! One invocation runs strictly in sequence: acquire a token, open the gateway session
//! with it, list the gateway's tools, bind them to an agent and relay the agent's events.
//! Nothing is opened before a token is held, and the gateway session is released
//! whichever way the relay ends.
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::agent::Agent;
use crate::errors::{WrapperError, WrapperResult};
use crate::gateway::{self, GatewaySystem, StreamableHttpTransport, ToolGateway};
use crate::identity::{AccessToken, IdentityBroker, TokenRequest};
use crate::models::event::StreamEvent;
use crate::models::tool::Tool;
use crate::providers::base::Provider;

const EVENT_BUFFER: usize = 100;

pub const DEFAULT_WORKLOAD_NAME: &str = "slack-gateway-agent";
pub const DEFAULT_USER_ID: &str = "m2m-user-001";
pub const DEFAULT_PROVIDER_NAME: &str = "agentcore-identity-for-gateway";

/// Events of one invocation, consumed once in emission order
pub type EventStream = ReceiverStream<StreamEvent>;

/// Builds the model provider for each new agent session
pub type ProviderFactory = Box<dyn Fn() -> anyhow::Result<Box<dyn Provider>> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct WrapperConfig {
    pub gateway_url: String,
    pub scope: String,
    pub workload_name: String,
    pub user_id: String,
    pub provider_name: String,
    pub force_authentication: bool,
}

impl WrapperConfig {
    pub fn new(gateway_url: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            gateway_url: gateway_url.into(),
            scope: scope.into(),
            workload_name: DEFAULT_WORKLOAD_NAME.to_string(),
            user_id: DEFAULT_USER_ID.to_string(),
            provider_name: DEFAULT_PROVIDER_NAME.to_string(),
            force_authentication: false,
        }
    }
}

/// An open gateway session that is released exactly once.
///
/// Dropping an unreleased lease, e.g. when the invocation future is cancelled during
/// setup, schedules the release on the current runtime.
pub(crate) struct GatewayLease {
    gateway: Arc<dyn ToolGateway>,
    armed: bool,
}

impl GatewayLease {
    pub(crate) fn new(gateway: Arc<dyn ToolGateway>) -> Self {
        Self {
            gateway,
            armed: true,
        }
    }

    pub(crate) fn gateway(&self) -> Arc<dyn ToolGateway> {
        self.gateway.clone()
    }

    pub(crate) async fn release(mut self) {
        self.armed = false;
        release(self.gateway.as_ref()).await;
    }
}

impl Drop for GatewayLease {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let gateway = self.gateway.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::info!("gateway lease dropped, releasing session in background");
                handle.spawn(async move { release(gateway.as_ref()).await });
            }
            Err(_) => tracing::warn!("gateway lease dropped outside a runtime, session not released"),
        }
    }
}

/// An agent bound to the gateway's tools for a single conversation. Owns the gateway
/// session until the relay finishes.
pub struct AgentSession {
    agent: Agent,
    lease: GatewayLease,
}

impl AgentSession {
    pub(crate) fn new(provider: Box<dyn Provider>, lease: GatewayLease, tools: Vec<Tool>) -> Self {
        let mut agent = Agent::new(provider);
        agent.add_system(Box::new(GatewaySystem::new(lease.gateway(), tools)));
        Self { agent, lease }
    }

    pub fn tools(&self) -> Vec<Tool> {
        self.agent.tools()
    }

    /// Forward agent events to `tx` until the agent finishes, fails, or the receiver is
    /// dropped, then release the gateway session.
    async fn relay(self, user_message: String, tx: mpsc::Sender<StreamEvent>) {
        {
            let mut stream = self.agent.reply(&user_message);
            loop {
                tokio::select! {
                    _ = tx.closed() => {
                        tracing::info!("caller stopped consuming events, cancelling agent stream");
                        break;
                    }
                    next = stream.next() => match next {
                        Some(Ok(event)) => {
                            if tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            tracing::error!("agent execution failed: {:#}", e);
                            let _ = tx.send(StreamEvent::error(streaming_error_message(&e))).await;
                            break;
                        }
                        None => {
                            tracing::info!("agent stream complete");
                            break;
                        }
                    }
                }
            }
        }
        self.lease.release().await;
    }
}

fn streaming_error_message(err: &anyhow::Error) -> String {
    let detail = format!("{:#}", err);
    let lowered = detail.to_lowercase();
    let kind = if lowered.contains("timed out") || lowered.contains("timeout") {
        "gateway response timed out"
    } else {
        "agent execution failed"
    };
    WrapperError::Streaming(format!("{}: {}", kind, detail)).to_string()
}

async fn release(gateway: &dyn ToolGateway) {
    if let Err(e) = gateway.close().await {
        tracing::warn!("failed to release gateway session: {}", e);
    }
}

/// Wraps token acquisition, gateway access and agent streaming behind one call
pub struct IdentityAwareAgent {
    config: WrapperConfig,
    broker: Arc<dyn IdentityBroker>,
    provider_factory: ProviderFactory,
}

impl IdentityAwareAgent {
    pub fn new(
        config: WrapperConfig,
        broker: Arc<dyn IdentityBroker>,
        provider_factory: ProviderFactory,
    ) -> Self {
        tracing::info!(
            gateway_url = %config.gateway_url,
            scope = %config.scope,
            workload_name = %config.workload_name,
            user_id = %config.user_id,
            "identity-aware agent configured"
        );
        Self {
            config,
            broker,
            provider_factory,
        }
    }

    pub fn config(&self) -> &WrapperConfig {
        &self.config
    }

    /// Obtain a bearer token for `scope` through the machine-to-machine flow.
    ///
    /// Every failure collapses into [`WrapperError::Authentication`]; the broker's own
    /// explanation only reaches the logs.
    pub async fn get_access_token(&self, scope: &str) -> WrapperResult<AccessToken> {
        let request = TokenRequest::m2m(
            self.config.provider_name.as_str(),
            scope,
            self.config.workload_name.as_str(),
            self.config.user_id.as_str(),
        )
        .with_force_authentication(self.config.force_authentication);

        match self.broker.get_token(&request).await {
            Ok(token) => {
                tracing::info!(
                    workload_name = %token.workload_name(),
                    token_prefix = %token.prefix(),
                    token_len = token.secret_len(),
                    "obtained access token from identity broker"
                );
                Ok(token)
            }
            Err(e) => {
                tracing::error!("access token request failed");
                tracing::debug!("identity broker detail: {}", e);
                Err(WrapperError::Authentication)
            }
        }
    }

    /// Every tool the gateway session advertises, across all pages
    pub async fn list_tools(&self, gateway: &dyn ToolGateway) -> WrapperResult<Vec<Tool>> {
        let tools = gateway::list_tools(gateway).await?;
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        tracing::info!(count = tools.len(), tools = ?names, "listed gateway tools");
        Ok(tools)
    }

    async fn bind_tools(
        &self,
        gateway: &dyn ToolGateway,
    ) -> WrapperResult<(Box<dyn Provider>, Vec<Tool>)> {
        let tools = self.list_tools(gateway).await?;
        if tools.is_empty() {
            return Err(WrapperError::Transport(
                "no tools available from gateway".to_string(),
            ));
        }

        let provider = (self.provider_factory)()
            .map_err(|e| WrapperError::Configuration(e.to_string()))?;
        Ok((provider, tools))
    }

    /// Run one conversation turn against the Slack workspace.
    ///
    /// Setup failures are returned before any event is produced. Once the stream has
    /// started, a failure arrives as a final [`StreamEvent::Error`]. Dropping the returned
    /// stream cancels the agent and releases the gateway session.
    pub async fn access_to_slack(&self, user_message: &str) -> WrapperResult<EventStream> {
        tracing::info!("step 1: acquiring access token");
        let token = self.get_access_token(&self.config.scope).await?;

        tracing::info!("step 2: opening authenticated gateway transport");
        let transport = StreamableHttpTransport::connect(&self.config.gateway_url, &token)
            .await
            .map_err(|e| {
                tracing::error!("gateway connection failed: {}", e);
                WrapperError::from(e)
            })?;
        let lease = GatewayLease::new(Arc::new(transport));

        tracing::info!("step 3: listing tools and binding the agent");
        let session = match self.bind_tools(lease.gateway().as_ref()).await {
            Ok((provider, tools)) => AgentSession::new(provider, lease, tools),
            Err(e) => {
                tracing::error!("agent session setup failed: {}", e);
                lease.release().await;
                return Err(e);
            }
        };

        tracing::info!("step 4: streaming agent response");
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        tokio::spawn(session.relay(user_message.to_string(), tx));

        Ok(ReceiverStream::new(rx))
    }
}
