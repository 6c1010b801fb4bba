use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

use super::protocol::{
    initialize_params, methods, parse_sse_frames, CallToolResult, JsonRpcNotification,
    JsonRpcRequest, JsonRpcResponse, ListToolsResult,
};
use super::{GatewayError, ToolGateway};
use crate::identity::AccessToken;
use crate::models::tool::ToolCall;

const SESSION_HEADER: &str = "Mcp-Session-Id";
const ACCEPT_BOTH: &str = "application/json, text/event-stream";

/// MCP streamable HTTP session authenticated with a bearer token
pub struct StreamableHttpTransport {
    client: Client,
    endpoint: Url,
    session_id: Mutex<Option<String>>,
    request_id: AtomicU64,
    closed: AtomicBool,
}

impl StreamableHttpTransport {
    /// Open a session: `initialize` followed by the `initialized` notification
    pub async fn connect(endpoint: &str, token: &AccessToken) -> Result<Self, GatewayError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| GatewayError::Protocol(format!("invalid gateway url: {}", e)))?;

        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&token.bearer())
            .map_err(|_| GatewayError::Protocol("access token is not a valid header".into()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_BOTH));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(120))
            .build()?;

        tracing::info!(gateway = %endpoint, token_prefix = %token.prefix(), "opening MCP transport");
        let transport = Self {
            client,
            endpoint,
            session_id: Mutex::new(None),
            request_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        };

        if let Err(e) = transport.handshake().await {
            // initialize may already have opened a session on the server
            if let Err(close_err) = transport.close().await {
                tracing::warn!("failed to release half-open MCP session: {}", close_err);
            }
            return Err(e);
        }
        tracing::info!("MCP transport ready");

        Ok(transport)
    }

    async fn handshake(&self) -> Result<(), GatewayError> {
        self.request(methods::INITIALIZE, Some(initialize_params()))
            .await?;
        self.notify(methods::INITIALIZED).await
    }

    pub fn session_id(&self) -> Option<String> {
        self.session_id.lock().ok().and_then(|id| id.clone())
    }

    fn next_request_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::SeqCst)
    }

    async fn post<T: Serialize>(&self, body: &T) -> Result<Response, GatewayError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(GatewayError::Closed);
        }

        let mut req = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .json(body);
        if let Some(session_id) = self.session_id() {
            req = req.header(SESSION_HEADER, session_id);
        }

        let response = req.send().await?;
        match response.status() {
            status if status.is_success() => {
                if let Some(id) = response
                    .headers()
                    .get(SESSION_HEADER)
                    .and_then(|v| v.to_str().ok())
                {
                    if let Ok(mut session_id) = self.session_id.lock() {
                        *session_id = Some(id.to_string());
                    }
                }
                Ok(response)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(GatewayError::Unauthorized),
            status => Err(GatewayError::Status(status.as_u16())),
        }
    }

    async fn request(&self, method: &'static str, params: Option<Value>) -> Result<Value, GatewayError> {
        let id = self.next_request_id();
        let mut request = JsonRpcRequest::new(id, method);
        if let Some(params) = params {
            request = request.with_params(params);
        }

        let response = self.post(&request).await?;
        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("text/event-stream"))
            .unwrap_or(false);
        let body = response.text().await?;

        let frame = if is_event_stream {
            let frames = parse_sse_frames(&body);
            frames
                .into_iter()
                .find(|f| f.answers(id))
                .ok_or_else(|| {
                    GatewayError::Protocol(format!("no response to {} in event stream", method))
                })?
        } else {
            serde_json::from_str::<JsonRpcResponse>(&body)
                .map_err(|e| GatewayError::Protocol(e.to_string()))?
        };

        if let Some(error) = frame.error {
            return Err(GatewayError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        frame
            .result
            .ok_or_else(|| GatewayError::Protocol(format!("{} returned no result", method)))
    }

    async fn notify(&self, method: &'static str) -> Result<(), GatewayError> {
        self.post(&JsonRpcNotification::new(method)).await?;
        Ok(())
    }
}

#[async_trait]
impl ToolGateway for StreamableHttpTransport {
    async fn list_tools_page(&self, cursor: Option<&str>) -> Result<ListToolsResult, GatewayError> {
        let params = cursor.map(|c| json!({ "cursor": c }));
        let result = self.request(methods::TOOLS_LIST, params).await?;
        serde_json::from_value(result).map_err(|e| GatewayError::Protocol(e.to_string()))
    }

    async fn call_tool(&self, call: &ToolCall) -> Result<CallToolResult, GatewayError> {
        let params = json!({ "name": call.name, "arguments": call.arguments });
        let result = self.request(methods::TOOLS_CALL, Some(params)).await?;
        serde_json::from_value(result).map_err(|e| GatewayError::Protocol(e.to_string()))
    }

    async fn close(&self) -> Result<(), GatewayError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let Some(session_id) = self.session_id() else {
            return Ok(());
        };

        let response = self
            .client
            .delete(self.endpoint.clone())
            .header(SESSION_HEADER, session_id)
            .send()
            .await?;
        match response.status() {
            // Servers without explicit session termination answer 405
            status if status.is_success() || status == StatusCode::METHOD_NOT_ALLOWED => {
                tracing::debug!("MCP session released");
                Ok(())
            }
            status => Err(GatewayError::Status(status.as_u16())),
        }
    }
}
