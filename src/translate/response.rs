//! The response translator: one event-consuming state machine, two sinks.
//!
//! [`ResponseTranslator`] decides *what* reaches the caller (visible text, in
//! order, up to the first end marker). A [`CompletionSink`] decides *how*: the
//! streaming sink in [`super::streaming`] turns each call into a chunk, while
//! [`AggregateSink`] buffers everything into one completion.

use super::backend_types::BackendEvent;
use super::openai_types::{ChatCompletionResponse, Choice, ChoiceMessage};

pub const FINISH_REASON_STOP: &str = "stop";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslatorState {
    AwaitingEvents,
    Terminated,
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The backend sent a record with `end: true`.
    EndMarker,
    /// The byte stream ended cleanly before any end record.
    EndOfStream,
}

/// Output side of the translator.
pub trait CompletionSink {
    fn push_text(&mut self, segment: &str);
    fn finish(&mut self, termination: Termination);
}

#[derive(Debug)]
pub struct ResponseTranslator {
    state: TranslatorState,
    segments: usize,
}

impl Default for ResponseTranslator {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseTranslator {
    pub fn new() -> Self {
        Self {
            state: TranslatorState::AwaitingEvents,
            segments: 0,
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.state == TranslatorState::Terminated
    }

    /// Number of text segments forwarded so far.
    pub fn segments(&self) -> usize {
        self.segments
    }

    /// Feed one backend event. Events after termination are ignored.
    pub fn accept(
        &mut self,
        event: &BackendEvent,
        sink: &mut impl CompletionSink,
    ) -> TranslatorState {
        if self.is_terminated() {
            return self.state;
        }

        if let Some(segment) = event.visible_text() {
            sink.push_text(segment);
            self.segments += 1;
        }

        if event.is_terminal {
            self.state = TranslatorState::Terminated;
            sink.finish(Termination::EndMarker);
        }

        self.state
    }

    /// Signal a clean end of the backend stream. No-op once terminated.
    pub fn end_of_stream(&mut self, sink: &mut impl CompletionSink) {
        if self.is_terminated() {
            return;
        }
        self.state = TranslatorState::Terminated;
        sink.finish(Termination::EndOfStream);
    }
}

/// Buffers visible text for a non-streaming completion.
#[derive(Debug, Default)]
pub struct AggregateSink {
    content: String,
    termination: Option<Termination>,
}

impl AggregateSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn termination(&self) -> Option<Termination> {
        self.termination
    }

    /// Build the single OpenAI completion. Either termination finishes with `stop`.
    pub fn into_response(self, id: &str, model: &str) -> ChatCompletionResponse {
        ChatCompletionResponse {
            id: id.to_string(),
            object: "chat.completion".to_string(),
            created: chrono::Utc::now().timestamp(),
            model: model.to_string(),
            choices: vec![Choice {
                index: 0,
                message: ChoiceMessage {
                    role: "assistant".to_string(),
                    content: self.content,
                },
                finish_reason: FINISH_REASON_STOP.to_string(),
            }],
        }
    }
}

impl CompletionSink for AggregateSink {
    fn push_text(&mut self, segment: &str) {
        self.content.push_str(segment);
    }

    fn finish(&mut self, termination: Termination) {
        self.termination = Some(termination);
    }
}

/// Generate a completion id in the OpenAI `chatcmpl-` format.
pub fn completion_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggregate(events: &[BackendEvent]) -> (AggregateSink, ResponseTranslator) {
        let mut translator = ResponseTranslator::new();
        let mut sink = AggregateSink::new();
        for event in events {
            if translator.accept(event, &mut sink) == TranslatorState::Terminated {
                break;
            }
        }
        translator.end_of_stream(&mut sink);
        (sink, translator)
    }

    #[test]
    fn test_aggregates_text_until_end_marker() {
        let (sink, translator) = aggregate(&[
            BackendEvent::text("Hel"),
            BackendEvent::text("lo"),
            BackendEvent::end(),
        ]);
        assert_eq!(sink.content(), "Hello");
        assert_eq!(sink.termination(), Some(Termination::EndMarker));
        assert_eq!(translator.segments(), 2);

        let resp = sink.into_response("chatcmpl-1", "gpt-4o");
        assert_eq!(resp.object, "chat.completion");
        assert_eq!(resp.model, "gpt-4o");
        assert_eq!(resp.choices.len(), 1);
        assert_eq!(resp.choices[0].message.role, "assistant");
        assert_eq!(resp.choices[0].message.content, "Hello");
        assert_eq!(resp.choices[0].finish_reason, "stop");
    }

    #[test]
    fn test_thinking_is_suppressed() {
        let (sink, _) = aggregate(&[
            BackendEvent::thinking("ignored"),
            BackendEvent::text("answer"),
            BackendEvent::end(),
        ]);
        assert_eq!(sink.content(), "answer");
    }

    #[test]
    fn test_events_after_end_marker_are_ignored() {
        let mut translator = ResponseTranslator::new();
        let mut sink = AggregateSink::new();

        translator.accept(&BackendEvent::text("a"), &mut sink);
        assert_eq!(
            translator.accept(&BackendEvent::end(), &mut sink),
            TranslatorState::Terminated
        );
        translator.accept(&BackendEvent::text("late"), &mut sink);
        translator.end_of_stream(&mut sink);

        assert_eq!(sink.content(), "a");
        assert_eq!(sink.termination(), Some(Termination::EndMarker));
    }

    #[test]
    fn test_end_of_stream_without_marker() {
        let (sink, translator) = aggregate(&[BackendEvent::text("partial")]);
        assert!(translator.is_terminated());
        assert_eq!(sink.termination(), Some(Termination::EndOfStream));
        assert_eq!(sink.into_response("id", "m").choices[0].message.content, "partial");
    }

    #[test]
    fn test_terminal_text_record_contributes_its_segment() {
        let mut event = BackendEvent::text("last");
        event.is_terminal = true;
        let (sink, _) = aggregate(&[BackendEvent::text("first "), event]);
        assert_eq!(sink.content(), "first last");
    }

    #[test]
    fn test_completion_id_format() {
        let id = completion_id();
        assert!(id.starts_with("chatcmpl-"));
        assert_eq!(id.len(), "chatcmpl-".len() + 32);
    }
}
