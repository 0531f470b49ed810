//! Streaming sink: turns translator output into OpenAI `chat.completion.chunk` frames.
//!
//! The sink queues frames as the [`ResponseTranslator`](super::response::ResponseTranslator)
//! calls it; the caller drains the queue after every backend event so nothing is
//! held back.

use std::collections::VecDeque;

use super::openai_types::{ChatCompletionChunk, ChunkChoice, ChunkDelta};
use super::response::{CompletionSink, Termination, FINISH_REASON_STOP};

pub const DONE_SENTINEL: &str = "[DONE]";

/// One `data:` frame of the outbound event stream.
#[derive(Debug, Clone)]
pub enum SseFrame {
    Chunk(ChatCompletionChunk),
    Done,
}

impl SseFrame {
    /// Payload after `data: `.
    pub fn data(&self) -> String {
        match self {
            SseFrame::Chunk(chunk) => match serde_json::to_string(chunk) {
                Ok(data) => data,
                Err(e) => {
                    tracing::error!(id = %chunk.id, "Failed to serialize chunk: {}", e);
                    String::new()
                }
            },
            SseFrame::Done => DONE_SENTINEL.to_string(),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, SseFrame::Done)
    }
}

#[derive(Debug)]
pub struct ChunkSink {
    id: String,
    model: String,
    pending: VecDeque<SseFrame>,
}

impl ChunkSink {
    pub fn new(id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            pending: VecDeque::new(),
        }
    }

    /// Take every frame queued since the last drain, in order.
    pub fn drain(&mut self) -> impl Iterator<Item = SseFrame> + '_ {
        self.pending.drain(..)
    }

    fn chunk(&self, content: &str, finish_reason: Option<&str>) -> SseFrame {
        SseFrame::Chunk(ChatCompletionChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: chrono::Utc::now().timestamp(),
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                delta: ChunkDelta {
                    content: content.to_string(),
                },
                index: 0,
                finish_reason: finish_reason.map(String::from),
            }],
        })
    }
}

impl CompletionSink for ChunkSink {
    fn push_text(&mut self, segment: &str) {
        let frame = self.chunk(segment, None);
        self.pending.push_back(frame);
    }

    fn finish(&mut self, termination: Termination) {
        if termination == Termination::EndMarker {
            let frame = self.chunk("", Some(FINISH_REASON_STOP));
            self.pending.push_back(frame);
        }
        self.pending.push_back(SseFrame::Done);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::backend_types::BackendEvent;
    use crate::translate::response::ResponseTranslator;

    fn run(events: &[BackendEvent], eof: bool) -> Vec<SseFrame> {
        let mut translator = ResponseTranslator::new();
        let mut sink = ChunkSink::new("chatcmpl-test", "test-model");
        let mut frames = Vec::new();
        for event in events {
            translator.accept(event, &mut sink);
            frames.extend(sink.drain());
            if translator.is_terminated() {
                break;
            }
        }
        if eof {
            translator.end_of_stream(&mut sink);
            frames.extend(sink.drain());
        }
        frames
    }

    fn delta(frame: &SseFrame) -> (&str, Option<&str>) {
        match frame {
            SseFrame::Chunk(c) => (
                c.choices[0].delta.content.as_str(),
                c.choices[0].finish_reason.as_deref(),
            ),
            SseFrame::Done => panic!("expected chunk, got [DONE]"),
        }
    }

    #[test]
    fn test_simple_text_stream() {
        let frames = run(
            &[
                BackendEvent::text("Hel"),
                BackendEvent::text("lo"),
                BackendEvent::end(),
            ],
            true,
        );

        assert_eq!(frames.len(), 4);
        assert_eq!(delta(&frames[0]), ("Hel", None));
        assert_eq!(delta(&frames[1]), ("lo", None));
        assert_eq!(delta(&frames[2]), ("", Some("stop")));
        assert!(frames[3].is_done());
    }

    #[test]
    fn test_chunks_share_id_and_model() {
        let frames = run(&[BackendEvent::text("a"), BackendEvent::end()], false);
        for frame in &frames[..2] {
            let SseFrame::Chunk(chunk) = frame else {
                panic!("expected chunk");
            };
            assert_eq!(chunk.id, "chatcmpl-test");
            assert_eq!(chunk.model, "test-model");
            assert_eq!(chunk.object, "chat.completion.chunk");
            assert_eq!(chunk.choices[0].index, 0);
        }
    }

    #[test]
    fn test_thinking_produces_no_frames() {
        let frames = run(&[BackendEvent::thinking("ignored")], false);
        assert!(frames.is_empty());
    }

    #[test]
    fn test_eof_without_end_marker_emits_done_only() {
        let frames = run(&[BackendEvent::text("partial")], true);
        assert_eq!(frames.len(), 2);
        assert_eq!(delta(&frames[0]), ("partial", None));
        assert!(frames[1].is_done());
    }

    #[test]
    fn test_empty_stream_emits_done() {
        let frames = run(&[], true);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_done());
    }

    #[test]
    fn test_frame_data() {
        assert_eq!(SseFrame::Done.data(), "[DONE]");

        let frames = run(&[BackendEvent::text("Hi")], false);
        let json: serde_json::Value = serde_json::from_str(&frames[0].data()).unwrap();
        assert_eq!(json["choices"][0]["delta"]["content"], "Hi");
        assert!(json["choices"][0].get("finish_reason").is_none());
    }
}
