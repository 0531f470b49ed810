//! Wire types for the Abacus chat backend.
//!
//! Outbound bodies are plain serde structs. Inbound stream lines decode into a
//! loose [`EventRecord`] first and are then narrowed to a [`BackendEvent`].

use serde::{Deserialize, Serialize};

/// Placeholder title the backend uses while a model is "thinking".
pub const THINKING_TITLE: &str = "Thinking...";

// ---------------------------------------------------------------------------
// Conversation bootstrap
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationRequest {
    pub deployment_id: String,
    pub name: String,
    pub external_application_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateConversationResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub result: Option<ConversationHandle>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Identifies the backend conversation a message is sent into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationHandle {
    pub deployment_conversation_id: String,
    pub external_application_id: String,
}

// ---------------------------------------------------------------------------
// Message send
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub request_id: String,
    pub deployment_conversation_id: String,
    pub message: String,
    pub is_desktop: bool,
    pub chat_config: ChatConfig,
    pub llm_name: String,
    pub external_application_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    pub timezone: String,
    pub language: String,
}

// ---------------------------------------------------------------------------
// Stream records
// ---------------------------------------------------------------------------

/// One JSON line of the backend's message stream, as sent.
///
/// Every field may be missing or `null`; both read as the zero value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    #[serde(default, rename = "type")]
    pub record_type: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub segment: Option<String>,
    #[serde(default)]
    pub end: Option<bool>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

/// What a record carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    /// Answer text to forward.
    Text(String),
    /// Text emitted under the "Thinking..." placeholder; never forwarded.
    Thinking(String),
    /// Any non-text record (status, metadata, the bare end marker).
    Other { kind: String },
}

/// A decoded backend stream event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendEvent {
    pub payload: EventPayload,
    pub is_terminal: bool,
}

impl BackendEvent {
    pub fn text(segment: impl Into<String>) -> Self {
        Self {
            payload: EventPayload::Text(segment.into()),
            is_terminal: false,
        }
    }

    pub fn thinking(segment: impl Into<String>) -> Self {
        Self {
            payload: EventPayload::Thinking(segment.into()),
            is_terminal: false,
        }
    }

    pub fn end() -> Self {
        Self {
            payload: EventPayload::Other {
                kind: String::new(),
            },
            is_terminal: true,
        }
    }

    /// Segment that should reach the caller, if any.
    pub fn visible_text(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::Text(segment) => Some(segment),
            EventPayload::Thinking(_) | EventPayload::Other { .. } => None,
        }
    }
}

impl From<EventRecord> for BackendEvent {
    fn from(record: EventRecord) -> Self {
        let kind = record.record_type.unwrap_or_default();
        let segment = record.segment.unwrap_or_default();

        let payload = if kind != "text" {
            EventPayload::Other { kind }
        } else if record.title.as_deref() == Some(THINKING_TITLE) {
            EventPayload::Thinking(segment)
        } else {
            EventPayload::Text(segment)
        };

        Self {
            payload,
            is_terminal: record.end.unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(line: &str) -> BackendEvent {
        serde_json::from_str::<EventRecord>(line).unwrap().into()
    }

    #[test]
    fn test_text_record() {
        let event = decode(r#"{"type":"text","segment":"Hel","temp":false,"counter":3}"#);
        assert_eq!(event, BackendEvent::text("Hel"));
        assert_eq!(event.visible_text(), Some("Hel"));
    }

    #[test]
    fn test_thinking_record_is_not_visible() {
        let event = decode(r#"{"type":"text","title":"Thinking...","segment":"ignored"}"#);
        assert_eq!(event.payload, EventPayload::Thinking("ignored".to_string()));
        assert_eq!(event.visible_text(), None);
    }

    #[test]
    fn test_end_record() {
        let event = decode(r#"{"end":true,"success":true,"messageId":"m1"}"#);
        assert!(event.is_terminal);
        assert_eq!(event.visible_text(), None);
    }

    #[test]
    fn test_text_record_can_also_be_terminal() {
        let event = decode(r#"{"type":"text","segment":"!","end":true}"#);
        assert!(event.is_terminal);
        assert_eq!(event.visible_text(), Some("!"));
    }

    #[test]
    fn test_null_fields_read_as_zero_values() {
        let event = decode(r#"{"type":"text","segment":"Hi","title":null}"#);
        assert_eq!(event, BackendEvent::text("Hi"));

        let event = decode(r#"{"type":"text","segment":null,"end":true}"#);
        assert_eq!(event.payload, EventPayload::Text(String::new()));
        assert!(event.is_terminal);

        let event = decode(r#"{"end":true,"success":null,"type":null,"token":null}"#);
        assert_eq!(event, BackendEvent::end());

        let event = decode(r#"{"type":"text","segment":"x","end":null}"#);
        assert!(!event.is_terminal);
    }

    #[test]
    fn test_send_request_is_camel_case() {
        let req = SendMessageRequest {
            request_id: "r".to_string(),
            deployment_conversation_id: "c".to_string(),
            message: "hi".to_string(),
            is_desktop: true,
            chat_config: ChatConfig {
                timezone: "Asia/Hong_Kong".to_string(),
                language: "zh-CN".to_string(),
            },
            llm_name: "gpt-4o".to_string(),
            external_application_id: "x".to_string(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["deploymentConversationId"], "c");
        assert_eq!(json["isDesktop"], true);
        assert_eq!(json["chatConfig"]["timezone"], "Asia/Hong_Kong");
        assert_eq!(json["llmName"], "gpt-4o");
    }
}
