use crate::backend::BackendClient;
use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};
use crate::logging::{RequestLogger, SharedLogger};
use crate::proxy;
use crate::translate::openai_types::ChatCompletionRequest;

use axum::extract::State;
use axum::http::header::{AUTHORIZATION, CACHE_CONTROL};
use axum::http::HeaderMap;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use futures::stream::StreamExt;
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

#[derive(Clone)]
pub struct AppState {
    pub config: ProxyConfig,
    pub backend: BackendClient,
    pub logger: SharedLogger,
}

impl AppState {
    pub fn new(config: ProxyConfig, client: reqwest::Client, logger: SharedLogger) -> Result<Self> {
        let backend = BackendClient::new(client, &config)?;
        Ok(Self {
            config,
            backend,
            logger,
        })
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(CHAT_COMPLETIONS_PATH, post(handle_chat_completions))
        .fallback(handle_status)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_chat_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let credential = match bearer_credential(&headers) {
        Ok(c) => c,
        Err(e) => {
            state.logger.warn("server", "Rejected request without bearer credential");
            return e.into_response();
        }
    };

    let req: ChatCompletionRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            state
                .logger
                .error("server", format!("Failed to parse request: {}", e));
            return ProxyError::bad_request(format!("Invalid request body: {}", e)).into_response();
        }
    };

    let request_id = uuid::Uuid::new_v4().to_string();
    let log = state.logger.request(&request_id);
    log.info(
        "server",
        format!(
            "Request: model={} streaming={} messages={}",
            req.model,
            req.stream,
            req.messages.len()
        ),
    );

    if req.stream {
        handle_streaming(&state, &req, &credential, &log).await
    } else {
        handle_non_streaming(&state, &req, &credential, &log).await
    }
}

async fn handle_non_streaming(
    state: &AppState,
    req: &ChatCompletionRequest,
    credential: &str,
    log: &RequestLogger,
) -> Response {
    match proxy::proxy_non_streaming(req, credential, &state.backend, &state.config, log).await {
        Ok(resp) => ([(CACHE_CONTROL, "no-cache")], Json(resp)).into_response(),
        Err(e) => {
            log.error("server", format!("Proxy error: {}", e));
            e.into_response()
        }
    }
}

async fn handle_streaming(
    state: &AppState,
    req: &ChatCompletionRequest,
    credential: &str,
    log: &RequestLogger,
) -> Response {
    let frames =
        match proxy::proxy_streaming(req, credential, &state.backend, &state.config, log).await {
            Ok(s) => s,
            Err(e) => {
                log.error("server", format!("Streaming setup error: {}", e));
                return e.into_response();
            }
        };

    let event_stream = frames.map(|frame| -> std::result::Result<Event, Infallible> {
        Ok(Event::default().data(frame.data()))
    });

    Sse::new(event_stream).into_response()
}

/// Catch-all for every path other than the chat endpoint.
async fn handle_status() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "Abacus2Api Service Running...",
        "message": format!(
            "abacus-proxy v{}: POST {} with an OpenAI chat body",
            env!("CARGO_PKG_VERSION"),
            CHAT_COMPLETIONS_PATH
        ),
    }))
}

/// Extract the opaque credential from `Authorization: Bearer <credential>`.
pub fn bearer_credential(headers: &HeaderMap) -> Result<String> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| ProxyError::unauthorized("Missing Authorization header"))?
        .to_str()
        .map_err(|_| ProxyError::unauthorized("Authorization header is not valid text"))?;

    let credential = value
        .strip_prefix("Bearer ")
        .ok_or_else(|| ProxyError::unauthorized("Authorization header must use the Bearer scheme"))?
        .trim();

    if credential.is_empty() {
        return Err(ProxyError::unauthorized("Empty bearer credential"));
    }

    Ok(credential.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn with_auth(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_bearer_credential() {
        assert_eq!(
            bearer_credential(&with_auth("Bearer _ga=1; session=xyz")).unwrap(),
            "_ga=1; session=xyz"
        );
    }

    #[test]
    fn test_bearer_credential_rejections() {
        assert!(bearer_credential(&HeaderMap::new()).is_err());
        assert!(bearer_credential(&with_auth("Basic abc")).is_err());
        assert!(bearer_credential(&with_auth("Bearer ")).is_err());
        assert!(bearer_credential(&with_auth("bearer abc")).is_err());
    }
}
