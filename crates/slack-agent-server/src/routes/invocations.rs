use crate::state::AppState;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::post,
    Router,
};
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::{json, Value};
use slack_agent::models::event::StreamEvent;
use std::convert::Infallible;

const INVALID_PAYLOAD: &str = "invalid payload: 'prompt' field is required";

type EventSse = Sse<BoxStream<'static, Result<Event, Infallible>>>;

fn to_sse(event: StreamEvent) -> Result<Event, Infallible> {
    let data = serde_json::to_string(&event)
        .unwrap_or_else(|e| json!({ "error": e.to_string() }).to_string());
    Ok(Event::default().data(data))
}

fn single(event: StreamEvent) -> EventSse {
    Sse::new(stream::once(async move { to_sse(event) }).boxed())
}

/// The prompt of a runtime payload; absent, blank or non-JSON bodies yield `None`
fn parse_prompt(body: &[u8]) -> Option<String> {
    let payload: Value = serde_json::from_slice(body).ok()?;
    let prompt = payload.get("prompt")?.as_str()?;
    (!prompt.trim().is_empty()).then(|| prompt.to_string())
}

async fn handler(State(state): State<AppState>, body: Bytes) -> EventSse {
    let Some(prompt) = parse_prompt(&body) else {
        tracing::warn!("rejected invocation without a prompt");
        return single(StreamEvent::error(INVALID_PAYLOAD));
    };
    tracing::info!(prompt_len = prompt.len(), "received invocation");

    match state.agent.access_to_slack(&prompt).await {
        Ok(events) => Sse::new(events.map(to_sse).boxed()).keep_alive(KeepAlive::default()),
        Err(e) => {
            tracing::error!("invocation setup failed: {}", e);
            single(StreamEvent::error(e.to_string()))
        }
    }
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/invocations", post(handler))
        .with_state(state)
}
