//! Progress event emission.
//!
//! Ensembles report how many catalogs have completed through a
//! [`ProgressEmitter`]. The CLI writes the events as JSONL on stderr when
//! `--progress` is set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::io::Write;
use std::sync::Mutex;

use crate::ensemble::ProgressSnapshot;

/// Standard progress event names.
pub mod event_names {
    pub const ENSEMBLE_STARTED: &str = "ensemble_started";
    pub const ENSEMBLE_PROGRESS: &str = "ensemble_progress";
    pub const ENSEMBLE_COMPLETE: &str = "ensemble_complete";

    pub const RANGING_ATTEMPT: &str = "ranging_attempt";
    pub const RANGING_COMPLETE: &str = "ranging_complete";
}

/// Which ensemble a progress event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Ranging,
    Simulate,
}

/// Progress counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub current: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

/// Structured progress event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub event: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub details: HashMap<String, Value>,
}

impl ProgressEvent {
    pub fn new(event: impl Into<String>, phase: Phase) -> Self {
        Self {
            event: event.into(),
            timestamp: Utc::now(),
            run_id: None,
            phase,
            progress: None,
            elapsed_ms: None,
            details: HashMap::new(),
        }
    }

    /// Event for an ensemble progress snapshot.
    pub fn from_snapshot(phase: Phase, snapshot: &ProgressSnapshot) -> Self {
        Self::new(event_names::ENSEMBLE_PROGRESS, phase)
            .with_progress(snapshot.completed, Some(snapshot.requested))
            .with_elapsed_ms(snapshot.elapsed.as_millis() as u64)
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn with_progress(mut self, current: u64, total: Option<u64>) -> Self {
        self.progress = Some(Progress { current, total });
        self
    }

    pub fn with_elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = Some(elapsed_ms);
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.details.insert(key.into(), v);
        }
        self
    }

    pub fn to_jsonl(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                r#"{{"error":"serialization_failed","event":"{}"}}"#,
                self.event
            )
        })
    }
}

/// Sink for progress events.
pub trait ProgressEmitter: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Writes each event as one JSON line.
pub struct JsonlWriter<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonlWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        match self.writer.into_inner() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write + Send> ProgressEmitter for JsonlWriter<W> {
    fn emit(&self, event: ProgressEvent) {
        let line = event.to_jsonl();
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{}", line);
        }
    }
}

/// Attaches a run ID to every event before forwarding it.
pub struct RunEmitter<'a> {
    run_id: String,
    inner: &'a dyn ProgressEmitter,
}

impl<'a> RunEmitter<'a> {
    pub fn new(run_id: impl Into<String>, inner: &'a dyn ProgressEmitter) -> Self {
        Self {
            run_id: run_id.into(),
            inner,
        }
    }
}

impl ProgressEmitter for RunEmitter<'_> {
    fn emit(&self, mut event: ProgressEvent) {
        if event.run_id.is_none() {
            event.run_id = Some(self.run_id.clone());
        }
        self.inner.emit(event);
    }
}
