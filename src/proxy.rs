use crate::backend::BackendClient;
use crate::config::ProxyConfig;
use crate::error::Result;
use crate::logging::RequestLogger;
use crate::translate::openai_types::{ChatCompletionRequest, ChatCompletionResponse};
use crate::translate::request::normalize;
use crate::translate::response::{
    completion_id, AggregateSink, ResponseTranslator, TranslatorState,
};
use crate::translate::sse::{backend_events, EventStream};
use crate::translate::streaming::{ChunkSink, SseFrame};

use futures::stream::Stream;
use futures::StreamExt;
use std::pin::Pin;

/// Outbound OpenAI event stream; always ends with `[DONE]`.
pub type SseStream = Pin<Box<dyn Stream<Item = SseFrame> + Send>>;

/// Normalize the history, open a backend conversation and start the message
/// stream. Everything that can fail before the first byte of output fails here.
async fn open_event_stream(
    req: &ChatCompletionRequest,
    credential: &str,
    backend: &BackendClient,
    config: &ProxyConfig,
    log: &RequestLogger,
) -> Result<EventStream> {
    let normalized = normalize(&req.messages);
    let message = normalized.compose();
    let llm_name = config.backend_model(&req.model);

    let handle = backend.bootstrap(credential).await.map_err(|e| {
        log.error("proxy", format!("Bootstrap failed: {}", e));
        e
    })?;

    log.with_context(
        crate::logging::LogLevel::Info,
        "proxy",
        "Conversation created",
        serde_json::json!({
            "conversation_id": handle.deployment_conversation_id,
            "llm_name": llm_name,
            "message_chars": message.chars().count(),
        }),
    );

    let body = backend
        .send_message(credential, &handle, message, llm_name)
        .await
        .map_err(|e| {
            log.error("proxy", format!("Send failed: {}", e));
            e
        })?;

    Ok(backend_events(
        body,
        config.backend.idle_timeout(),
        log.clone(),
    ))
}

/// Drain the backend stream into one OpenAI completion.
pub async fn proxy_non_streaming(
    req: &ChatCompletionRequest,
    credential: &str,
    backend: &BackendClient,
    config: &ProxyConfig,
    log: &RequestLogger,
) -> Result<ChatCompletionResponse> {
    let events = open_event_stream(req, credential, backend, config, log).await?;
    let resp = collect_completion(events, &completion_id(), &req.model).await?;

    log.info(
        "proxy",
        format!(
            "Completed: {} chars",
            resp.choices
                .first()
                .map(|c| c.message.content.chars().count())
                .unwrap_or(0)
        ),
    );

    Ok(resp)
}

/// Open the backend stream and translate it into OpenAI chunk frames.
pub async fn proxy_streaming(
    req: &ChatCompletionRequest,
    credential: &str,
    backend: &BackendClient,
    config: &ProxyConfig,
    log: &RequestLogger,
) -> Result<SseStream> {
    let events = open_event_stream(req, credential, backend, config, log).await?;
    Ok(Box::pin(translate_stream(
        events,
        completion_id(),
        req.model.clone(),
        log.clone(),
    )))
}

/// Aggregate visible text until the end marker or a clean end of stream.
/// A transport error is returned as-is; nothing has been sent to the caller yet.
pub async fn collect_completion(
    mut events: EventStream,
    id: &str,
    model: &str,
) -> Result<ChatCompletionResponse> {
    let mut translator = ResponseTranslator::new();
    let mut sink = AggregateSink::new();

    while let Some(next) = events.next().await {
        let event = next?;
        if translator.accept(&event, &mut sink) == TranslatorState::Terminated {
            break;
        }
    }
    translator.end_of_stream(&mut sink);

    Ok(sink.into_response(id, model))
}

/// Emit one frame per visible segment as soon as it arrives, then the stop
/// chunk and `[DONE]`. The backend body is dropped with the returned stream.
pub fn translate_stream(
    mut events: EventStream,
    id: String,
    model: String,
    log: RequestLogger,
) -> impl Stream<Item = SseFrame> + Send + 'static {
    async_stream::stream! {
        let mut translator = ResponseTranslator::new();
        let mut sink = ChunkSink::new(id, model);

        while let Some(next) = events.next().await {
            let event = match next {
                Ok(event) => event,
                Err(e) => {
                    // Headers are already out; close the stream cleanly.
                    log.error("stream", format!("Backend stream aborted: {}", e));
                    break;
                }
            };

            translator.accept(&event, &mut sink);
            let frames: Vec<SseFrame> = sink.drain().collect();
            for frame in frames {
                yield frame;
            }

            if translator.is_terminated() {
                break;
            }
        }

        translator.end_of_stream(&mut sink);
        let frames: Vec<SseFrame> = sink.drain().collect();
        for frame in frames {
            yield frame;
        }

        log.info(
            "stream",
            format!("Stream completed: {} segments", translator.segments()),
        );
    }
}
