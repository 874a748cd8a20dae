//! HTTP surface for the relay.
//!
//! [`router`] wires four endpoints over a shared [`AppState`]: a health
//! check, the streaming chat endpoint, session reset, and latest-artifact
//! retrieval.  Chat replies go out as server-sent events; artifact and
//! error frames carry an SSE event name so EventSource listeners can
//! subscribe to them directly, chunk and done frames go out unnamed.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderValue, Method, header};
use axum::response::sse::{Event, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};

use crate::config::CorsOrigins;
use crate::source::{GenerationOptions, ModelStreamSource};
use crate::store::ConversationStore;
use crate::turn::TurnStream;
use crate::types::{ChatRequest, Message, TurnEvent};

///////////////////////////////////////////// AppState /////////////////////////////////////////////

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    /// Conversation histories and per-session artifacts.
    pub store: Arc<ConversationStore>,
    /// The backend replies are streamed from.
    pub source: Arc<dyn ModelStreamSource>,
}

impl AppState {
    /// Create state over a store and a stream source.
    pub fn new(store: Arc<ConversationStore>, source: Arc<dyn ModelStreamSource>) -> Self {
        Self { store, source }
    }
}

////////////////////////////////////////////// router //////////////////////////////////////////////

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/chat/stream", post(chat_stream))
        .route("/api/session/reset", post(reset_session))
        .route("/api/artifacts/latest", get(latest_artifact))
        .with_state(state)
}

/// Build a CORS layer for the configured origin policy.
///
/// A wildcard policy allows any origin without credentials; an explicit
/// allow list sends credentials as well.
pub fn cors_layer(origins: CorsOrigins) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);
    match origins {
        CorsOrigins::Any => layer.allow_origin(Any),
        CorsOrigins::List(list) => {
            let list: Vec<HeaderValue> = list
                .iter()
                .filter_map(|origin| origin.parse().ok())
                .collect();
            layer.allow_origin(list).allow_credentials(true)
        }
    }
}

///////////////////////////////////////////// handlers /////////////////////////////////////////////

#[derive(Deserialize)]
struct SessionQuery {
    session_id: String,
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn chat_stream(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut history = state.store.history(&req.session_id);
    history.push(Message::user(req.message));
    // Persist before streaming so the user message survives a disconnect.
    state.store.set_history(&req.session_id, history.clone());
    let options = GenerationOptions {
        temperature: req.temperature,
        max_output_tokens: req.max_output_tokens,
    };
    let turn = TurnStream::new(
        req.session_id,
        history,
        options,
        Arc::clone(&state.store),
        Arc::clone(&state.source),
    );
    Sse::new(turn.map(|event| Ok(sse_event(&event))))
}

async fn reset_session(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Json<serde_json::Value> {
    state.store.reset(&query.session_id);
    Json(serde_json::json!({
        "status": "reset",
        "session_id": query.session_id,
    }))
}

async fn latest_artifact(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "artifact": state.store.last_artifact(&query.session_id),
    }))
}

fn sse_event(event: &TurnEvent) -> Event {
    // TurnEvent serialization is infallible in practice; the fallback
    // keeps the stream alive rather than panicking mid-turn.
    let data = serde_json::to_string(event).unwrap_or_else(|_| {
        r#"{"type":"error","message":"event serialization failed"}"#.to_string()
    });
    match event.sse_event_name() {
        Some(name) => Event::default().event(name).data(data),
        None => Event::default().data(data),
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use futures::stream;
    use tower::ServiceExt;

    use crate::source::PieceStream;
    use crate::types::Artifact;
    use crate::Result;

    use super::*;

    struct ScriptedSource {
        pieces: Vec<Result<String>>,
    }

    #[async_trait]
    impl ModelStreamSource for ScriptedSource {
        async fn stream_reply(
            &self,
            _history: Vec<Message>,
            _options: GenerationOptions,
        ) -> Result<PieceStream> {
            Ok(Box::pin(stream::iter(self.pieces.clone())))
        }
    }

    fn app(pieces: Vec<Result<String>>) -> (Router, Arc<ConversationStore>) {
        let store = Arc::new(ConversationStore::new());
        let state = AppState::new(Arc::clone(&store), Arc::new(ScriptedSource { pieces }));
        (router(state), store)
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (app, _store) = app(Vec::new());
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(StatusCode::OK, response.status());
        assert_eq!(r#"{"status":"ok"}"#, body_string(response).await);
    }

    #[tokio::test]
    async fn chat_stream_names_artifact_and_persists_history() {
        let (app, store) = app(vec![Ok("Try this:\n```py\nx = 1\n```".to_string())]);
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/chat/stream")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"session_id": "s1", "message": "hi"}"#))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(StatusCode::OK, response.status());
        let body = body_string(response).await;
        assert!(body.contains(r#"data: {"type":"chunk""#), "body: {body}");
        assert!(body.contains("event: artifact\n"), "body: {body}");
        assert!(body.contains(r#""language":"py""#), "body: {body}");
        assert!(body.contains(r#"data: {"type":"done"}"#), "body: {body}");
        // Only artifact and error frames carry an event name.
        assert!(!body.contains("event: chunk"), "body: {body}");
        assert!(!body.contains("event: done"), "body: {body}");
        let history = store.history("s1");
        assert_eq!(2, history.len());
        assert_eq!("hi", history[0].content);
        assert_eq!("Try this:\n```py\nx = 1\n```", history[1].content);
    }

    #[tokio::test]
    async fn chat_stream_reports_backend_error() {
        let (app, _store) = app(vec![Err(crate::Error::rate_limit(
            "per-minute quota exhausted",
            Some(2),
        ))]);
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/chat/stream")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"session_id": "s1", "message": "hi"}"#))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(StatusCode::OK, response.status());
        let body = body_string(response).await;
        assert!(body.contains("event: error\n"), "body: {body}");
        assert!(!body.contains(r#"data: {"type":"done"}"#), "body: {body}");
    }

    #[tokio::test]
    async fn chat_stream_rejects_incomplete_request() {
        let (app, _store) = app(Vec::new());
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/chat/stream")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"session_id": "s1"}"#))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(StatusCode::UNPROCESSABLE_ENTITY, response.status());
    }

    #[tokio::test]
    async fn reset_clears_session_state() {
        let (app, store) = app(Vec::new());
        store.set_history("s1", vec![Message::user("hi")]);
        store.set_last_artifact("s1", Artifact::new("py", "x = 1\n"));
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/session/reset?session_id=s1")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(StatusCode::OK, response.status());
        assert_eq!(
            r#"{"status":"reset","session_id":"s1"}"#,
            body_string(response).await
        );
        assert!(store.history("s1").is_empty());
        assert_eq!(None, store.last_artifact("s1"));
    }

    #[tokio::test]
    async fn latest_artifact_reports_null_when_absent() {
        let (app, _store) = app(Vec::new());
        let request = Request::builder()
            .uri("/api/artifacts/latest?session_id=s1")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(StatusCode::OK, response.status());
        assert_eq!(r#"{"artifact":null}"#, body_string(response).await);
    }

    #[tokio::test]
    async fn latest_artifact_reports_stored_artifact() {
        let (app, store) = app(Vec::new());
        store.set_last_artifact("s1", Artifact::new("py", "x = 1\n"));
        let request = Request::builder()
            .uri("/api/artifacts/latest?session_id=s1")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(
            r#"{"artifact":{"language":"py","content":"x = 1\n"}}"#,
            body_string(response).await
        );
    }

    #[tokio::test]
    async fn session_endpoints_require_session_id() {
        let (app, _store) = app(Vec::new());
        let request = Request::builder()
            .uri("/api/artifacts/latest")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(StatusCode::BAD_REQUEST, response.status());
    }
}
