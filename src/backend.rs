//! HTTP client for the Abacus chat backend.
//!
//! Two calls per chat request: create a conversation, then send the composed
//! message into it. The send call always asks for an event stream and hands the
//! raw body back for incremental parsing.

use std::pin::Pin;

use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE, COOKIE};

use crate::config::{BackendConfig, ProxyConfig};
use crate::error::{ProxyError, Result};
use crate::translate::backend_types::{
    ChatConfig, ConversationHandle, CreateConversationRequest, CreateConversationResponse,
    SendMessageRequest,
};

pub type ByteStream = Pin<Box<dyn Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send>>;

#[derive(Debug, Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    config: BackendConfig,
    identity_headers: HeaderMap,
}

impl BackendClient {
    /// Validates the configured identity headers up front.
    pub fn new(client: reqwest::Client, config: &ProxyConfig) -> Result<Self> {
        let mut identity_headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ProxyError::config(format!("Invalid header name '{}': {}", name, e)))?;
            let header_value = HeaderValue::from_str(value).map_err(|e| {
                ProxyError::config(format!("Invalid value for header '{}': {}", name, e))
            })?;
            identity_headers.insert(header_name, header_value);
        }

        Ok(Self {
            client,
            config: config.backend.clone(),
            identity_headers,
        })
    }

    /// Identity headers plus the forwarded credential as the cookie.
    fn headers_for(&self, credential: &str) -> Result<HeaderMap> {
        let mut headers = self.identity_headers.clone();
        let cookie = HeaderValue::from_str(credential)
            .map_err(|_| ProxyError::unauthorized("Credential is not a valid header value"))?;
        headers.insert(COOKIE, cookie);
        Ok(headers)
    }

    /// Create a fresh backend conversation for one chat request.
    pub async fn bootstrap(&self, credential: &str) -> Result<ConversationHandle> {
        let body = CreateConversationRequest {
            deployment_id: self.config.deployment_id.clone(),
            name: self.config.conversation_name.clone(),
            external_application_id: self.config.external_application_id.clone(),
        };

        let response = self
            .client
            .post(&self.config.create_conversation_url)
            .headers(self.headers_for(credential)?)
            .header(CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProxyError::upstream(format!("Conversation request failed: {}", e)))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            ProxyError::upstream(format!("Failed to read conversation response: {}", e))
        })?;

        let parsed: CreateConversationResponse = serde_json::from_str(&text).map_err(|e| {
            ProxyError::upstream(format!(
                "Undecodable conversation response (status {}): {}",
                status, e
            ))
        })?;

        match parsed {
            CreateConversationResponse {
                success: true,
                result: Some(handle),
                ..
            } => Ok(handle),
            CreateConversationResponse { error, .. } => Err(ProxyError::upstream(format!(
                "Backend refused to create a conversation (status {}): {}",
                status,
                error.as_deref().unwrap_or("no reason given")
            ))),
        }
    }

    /// Send the composed message and return the backend's event-stream body.
    pub async fn send_message(
        &self,
        credential: &str,
        handle: &ConversationHandle,
        message: String,
        llm_name: &str,
    ) -> Result<ByteStream> {
        let body = SendMessageRequest {
            request_id: uuid::Uuid::new_v4().to_string(),
            deployment_conversation_id: handle.deployment_conversation_id.clone(),
            message,
            is_desktop: self.config.is_desktop,
            chat_config: ChatConfig {
                timezone: self.config.timezone.clone(),
                language: self.config.language.clone(),
            },
            llm_name: llm_name.to_string(),
            external_application_id: handle.external_application_id.clone(),
        };

        // The backend expects a JSON body labelled as plain text.
        let payload = serde_json::to_vec(&body)?;

        let response = self
            .client
            .post(&self.config.send_message_url)
            .headers(self.headers_for(credential)?)
            .header(ACCEPT, "text/event-stream")
            .header(CONTENT_TYPE, "text/plain;charset=UTF-8")
            .body(payload)
            .send()
            .await
            .map_err(|e| ProxyError::upstream(format!("Send request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProxyError::upstream(format!(
                "Backend returned status {}: {}",
                status,
                truncate(&body, 300)
            )));
        }

        Ok(response.bytes_stream().boxed())
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
