//! Fold an OpenAI chat history into the backend's single-message convention.
//!
//! The backend takes one text per turn, so earlier turns and the system prompt
//! are rendered as plain-text preambles in front of the final message.

use super::openai_types::{ChatMessage, Role};

/// A chat history split into the parts the backend message is built from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedRequest {
    /// Content of the last message; empty for an empty history.
    pub primary_text: String,
    /// Content of the last `system` message before the final one.
    pub system_preamble: Option<String>,
    /// `"{role}: {content}\n"` for every earlier non-system message, in order.
    pub history_preamble: Option<String>,
}

impl NormalizedRequest {
    /// Build the text sent as the backend `message`.
    ///
    /// The system prefix is applied first, then the history wrapper around the
    /// result, so both can stack.
    pub fn compose(&self) -> String {
        let mut text = self.primary_text.clone();

        if let Some(system) = self.system_preamble.as_deref().filter(|s| !s.is_empty()) {
            text = format!("System: {}\n\n{}", system, text);
        }

        if let Some(history) = self.history_preamble.as_deref().filter(|h| !h.is_empty()) {
            text = format!(
                "Previous conversation:\n{}\nCurrent message: {}",
                history, text
            );
        }

        text
    }
}

/// Split a chat history into primary text, system preamble and history preamble.
/// Pure function; role values are not validated.
pub fn normalize(messages: &[ChatMessage]) -> NormalizedRequest {
    let Some((last, earlier)) = messages.split_last() else {
        return NormalizedRequest::default();
    };

    let mut system_preamble = None;
    let mut history = String::new();

    for msg in earlier {
        match msg.role {
            // Repeated system messages overwrite each other.
            Role::System => system_preamble = Some(msg.text()),
            ref role => {
                history.push_str(role.as_str());
                history.push_str(": ");
                history.push_str(&msg.text());
                history.push('\n');
            }
        }
    }

    NormalizedRequest {
        primary_text: last.text(),
        system_preamble,
        history_preamble: (!history.is_empty()).then_some(history),
    }
}
