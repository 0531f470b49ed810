//! Request log: a bounded in-memory history mirrored to a JSONL file.
//!
//! Process diagnostics go through `tracing`; this log records what happened to
//! each proxied chat request so it can be inspected after the fact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

const MAX_LOG_ENTRIES: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub component: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

impl LogEntry {
    pub fn new(level: LogLevel, component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            component: component.into(),
            message: message.into(),
            request_id: None,
            context: None,
        }
    }

    pub fn for_request(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_context(mut self, ctx: serde_json::Value) -> Self {
        self.context = Some(ctx);
        self
    }
}

pub struct RequestLog {
    entries: VecDeque<LogEntry>,
    writer: Option<BufWriter<File>>,
}

impl RequestLog {
    /// Opens (or creates) the log file and replays its tail into memory.
    pub fn open(file_path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file_path = file_path.as_ref();

        if let Some(parent) = file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut entries = VecDeque::with_capacity(MAX_LOG_ENTRIES);
        if file_path.exists() {
            let reader = BufReader::new(File::open(file_path)?);
            for line in reader.lines().map_while(std::result::Result::ok) {
                if let Ok(entry) = serde_json::from_str::<LogEntry>(&line) {
                    push_bounded(&mut entries, entry);
                }
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;

        Ok(Self {
            entries,
            writer: Some(BufWriter::new(file)),
        })
    }

    /// Memory-only log, used when no file is wanted.
    pub fn in_memory() -> Self {
        Self {
            entries: VecDeque::new(),
            writer: None,
        }
    }

    pub fn log(&mut self, entry: LogEntry) {
        if let Some(ref mut writer) = self.writer {
            if let Ok(json) = serde_json::to_string(&entry) {
                let _ = writeln!(writer, "{}", json);
                let _ = writer.flush();
            }
        }
        push_bounded(&mut self.entries, entry);
    }

    pub fn recent(&self, limit: usize) -> Vec<LogEntry> {
        self.entries.iter().rev().take(limit).cloned().collect()
    }
}

fn push_bounded(entries: &mut VecDeque<LogEntry>, entry: LogEntry) {
    if entries.len() >= MAX_LOG_ENTRIES {
        entries.pop_front();
    }
    entries.push_back(entry);
}

#[derive(Clone)]
pub struct SharedLogger(Arc<Mutex<RequestLog>>);

impl SharedLogger {
    pub fn new(file_path: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(Self(Arc::new(Mutex::new(RequestLog::open(file_path)?))))
    }

    pub fn in_memory() -> Self {
        Self(Arc::new(Mutex::new(RequestLog::in_memory())))
    }

    pub fn log(&self, entry: LogEntry) {
        if let Ok(mut log) = self.0.lock() {
            log.log(entry);
        }
    }

    pub fn info(&self, component: impl Into<String>, message: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Info, component, message));
    }

    pub fn warn(&self, component: impl Into<String>, message: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Warn, component, message));
    }

    pub fn error(&self, component: impl Into<String>, message: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Error, component, message));
    }

    pub fn debug(&self, component: impl Into<String>, message: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Debug, component, message));
    }

    /// Scope entries to one inbound request.
    pub fn request(&self, request_id: &str) -> RequestLogger {
        RequestLogger {
            inner: self.clone(),
            request_id: request_id.to_string(),
        }
    }

    pub fn recent(&self, limit: usize) -> Vec<LogEntry> {
        self.0.lock().map(|l| l.recent(limit)).unwrap_or_default()
    }
}

/// A [`SharedLogger`] handle that stamps every entry with a request id.
#[derive(Clone)]
pub struct RequestLogger {
    inner: SharedLogger,
    request_id: String,
}

impl RequestLogger {
    fn emit(&self, level: LogLevel, component: &str, message: String) {
        self.inner
            .log(LogEntry::new(level, component, message).for_request(self.request_id.clone()));
    }

    pub fn info(&self, component: &str, message: impl Into<String>) {
        self.emit(LogLevel::Info, component, message.into());
    }

    pub fn warn(&self, component: &str, message: impl Into<String>) {
        self.emit(LogLevel::Warn, component, message.into());
    }

    pub fn error(&self, component: &str, message: impl Into<String>) {
        self.emit(LogLevel::Error, component, message.into());
    }

    pub fn debug(&self, component: &str, message: impl Into<String>) {
        self.emit(LogLevel::Debug, component, message.into());
    }

    pub fn with_context(
        &self,
        level: LogLevel,
        component: &str,
        message: impl Into<String>,
        context: serde_json::Value,
    ) {
        self.inner.log(
            LogEntry::new(level, component, message)
                .for_request(self.request_id.clone())
                .with_context(context),
        );
    }
}
