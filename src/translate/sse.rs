//! Incremental line parser for the backend message stream.
//!
//! The backend answers with newline-delimited JSON records under an
//! `text/event-stream` content type. Lines are split out of arbitrary byte
//! chunks, blank and undecodable lines are skipped, and every decoded record is
//! yielded as a [`BackendEvent`] in arrival order.

use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{Stream, StreamExt};

use super::backend_types::{BackendEvent, EventRecord};
use crate::error::{ProxyError, Result};
use crate::logging::RequestLogger;

pub type EventStream = Pin<Box<dyn Stream<Item = Result<BackendEvent>> + Send>>;

/// Decode one stream line. `None` for blank or malformed lines.
pub fn parse_line(line: &str) -> Option<BackendEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    serde_json::from_str::<EventRecord>(line)
        .ok()
        .map(BackendEvent::from)
}

/// Turn a backend body into a lazy stream of events.
///
/// A clean end of input ends the stream without an error, whether or not an
/// end record was seen. Transport errors and idle timeouts are yielded once as
/// `UpstreamUnavailable` and end the stream.
pub fn backend_events<S, E>(
    byte_stream: S,
    idle_timeout: Option<Duration>,
    log: RequestLogger,
) -> EventStream
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut buffer: Vec<u8> = Vec::new();
        let mut skipped = 0usize;

        tokio::pin!(byte_stream);

        loop {
            let next = match idle_timeout {
                Some(limit) => match tokio::time::timeout(limit, byte_stream.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        log.warn("stream", format!("No backend data for {:?}, giving up", limit));
                        yield Err(ProxyError::upstream(format!(
                            "backend stream idle for more than {:?}",
                            limit
                        )));
                        return;
                    }
                },
                None => byte_stream.next().await,
            };

            let chunk = match next {
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => {
                    log.error("stream", format!("Byte stream error: {}", e));
                    yield Err(ProxyError::upstream(format!("backend stream failed: {}", e)));
                    return;
                }
                None => break,
            };

            buffer.extend_from_slice(&chunk);

            while let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                let raw: Vec<u8> = buffer.drain(..=newline_pos).collect();
                let line = String::from_utf8_lossy(&raw);

                if line.trim().is_empty() {
                    continue;
                }

                match parse_line(&line) {
                    Some(event) => {
                        yield Ok(event);
                    }
                    None => {
                        skipped += 1;
                        tracing::debug!(line = %line.trim(), "Skipping undecodable backend line");
                    }
                }
            }
        }

        // Trailing bytes without a final newline.
        if !buffer.is_empty() {
            let line = String::from_utf8_lossy(&buffer);
            match parse_line(&line) {
                Some(event) => {
                    yield Ok(event);
                }
                None if line.trim().is_empty() => {}
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            log.debug("stream", format!("Skipped {} undecodable backend lines", skipped));
        }
    })
}
