use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context};
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

pub type EventPayload = Map<String, Value>;

/// Every event type a session writes to its log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEvent {
    SessionStarted,
    GenerationCompleted,
    GenerationFailed,
    BackgroundRemoved,
    BackgroundRemovalFailed,
    EditSeedPrepared,
    ImageAdjusted,
    HistorySelected,
    HistoryCleared,
}

impl SessionEvent {
    pub const ALL: [SessionEvent; 9] = [
        SessionEvent::SessionStarted,
        SessionEvent::GenerationCompleted,
        SessionEvent::GenerationFailed,
        SessionEvent::BackgroundRemoved,
        SessionEvent::BackgroundRemovalFailed,
        SessionEvent::EditSeedPrepared,
        SessionEvent::ImageAdjusted,
        SessionEvent::HistorySelected,
        SessionEvent::HistoryCleared,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SessionStarted => "session_started",
            Self::GenerationCompleted => "generation_completed",
            Self::GenerationFailed => "generation_failed",
            Self::BackgroundRemoved => "background_removed",
            Self::BackgroundRemovalFailed => "background_removal_failed",
            Self::EditSeedPrepared => "edit_seed_prepared",
            Self::ImageAdjusted => "image_adjusted",
            Self::HistorySelected => "history_selected",
            Self::HistoryCleared => "history_cleared",
        }
    }

    /// Failure events, which a reader may want to surface separately.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::GenerationFailed | Self::BackgroundRemovalFailed)
    }
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only JSONL log for one editing session.
///
/// Each line carries `type`, `session_id`, `seq` and `ts`, then the caller's
/// payload (which wins on key clashes). `seq` counts successfully written
/// events from 0, so a gap never appears after a failed write.
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<SessionLog>,
}

#[derive(Debug)]
struct SessionLog {
    path: PathBuf,
    session_id: String,
    next_seq: Mutex<u64>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(SessionLog {
                path: path.into(),
                session_id: session_id.into(),
                next_seq: Mutex::new(0),
            }),
        }
    }

    /// Writer tagged with a fresh random session id.
    pub fn for_new_session(path: impl Into<PathBuf>) -> Self {
        Self::new(path, format!("session-{}", Uuid::new_v4()))
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    /// Appends one event and returns the record as written.
    pub fn emit(&self, event: SessionEvent, payload: EventPayload) -> anyhow::Result<Value> {
        if let Some(parent) = self.inner.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let mut next_seq = self
            .inner
            .next_seq
            .lock()
            .map_err(|_| anyhow!("session log lock poisoned"))?;
        let record = self.record(event, *next_seq, payload);
        let line = serde_json::to_string(&record)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)
            .with_context(|| format!("failed to open {}", self.inner.path.display()))?;
        file.write_all(format!("{line}\n").as_bytes())?;
        *next_seq += 1;

        Ok(Value::Object(record))
    }

    fn record(&self, event: SessionEvent, seq: u64, payload: EventPayload) -> EventPayload {
        let mut record = Map::new();
        record.insert("type".to_string(), Value::from(event.as_str()));
        record.insert(
            "session_id".to_string(),
            Value::from(self.inner.session_id.as_str()),
        );
        record.insert("seq".to_string(), Value::from(seq));
        record.insert("ts".to_string(), Value::from(now_utc_iso()));
        record.extend(payload);
        record
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::DateTime;

    use super::*;

    #[test]
    fn emit_writes_compact_jsonl_line() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let writer = EventWriter::new(&path, "session-123");

        let mut payload = EventPayload::new();
        payload.insert("prompt".to_string(), Value::String("a red circle logo".to_string()));
        let emitted = writer.emit(SessionEvent::GenerationCompleted, payload)?;

        let content = fs::read_to_string(&path)?;
        let line = content.lines().next().unwrap_or("");
        let parsed: Value = serde_json::from_str(line)?;

        assert_eq!(parsed, emitted);
        assert_eq!(parsed["type"], Value::String("generation_completed".to_string()));
        assert_eq!(parsed["session_id"], Value::String("session-123".to_string()));
        assert_eq!(parsed["seq"], Value::from(0));
        assert_eq!(
            parsed["prompt"],
            Value::String("a red circle logo".to_string())
        );

        let ts = parsed["ts"].as_str().unwrap_or("");
        DateTime::parse_from_rfc3339(ts)?;
        Ok(())
    }

    #[test]
    fn payload_can_override_default_keys() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let writer = EventWriter::new(temp.path().join("events.jsonl"), "session-123");

        let mut payload = EventPayload::new();
        payload.insert("type".to_string(), Value::String("override".to_string()));
        let emitted = writer.emit(SessionEvent::HistoryCleared, payload)?;

        assert_eq!(emitted["type"], Value::String("override".to_string()));
        assert_eq!(emitted["session_id"], Value::String("session-123".to_string()));
        Ok(())
    }

    #[test]
    fn emit_appends_numbered_lines_and_creates_parent_dir() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("logs").join("events.jsonl");
        let writer = EventWriter::for_new_session(&path);
        assert!(writer.session_id().starts_with("session-"));

        writer.emit(SessionEvent::SessionStarted, EventPayload::new())?;
        writer
            .clone()
            .emit(SessionEvent::HistorySelected, EventPayload::new())?;

        let content = fs::read_to_string(&path)?;
        let records: Vec<Value> = content
            .lines()
            .map(serde_json::from_str)
            .collect::<Result<_, _>>()?;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["type"], Value::from("session_started"));
        assert_eq!(records[1]["type"], Value::from("history_selected"));
        assert_eq!(records[0]["seq"], Value::from(0));
        assert_eq!(records[1]["seq"], Value::from(1));
        Ok(())
    }

    #[test]
    fn failed_write_does_not_consume_a_sequence_number() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let blocked = EventWriter::new(temp.path(), "session-123");
        assert!(blocked.emit(SessionEvent::SessionStarted, EventPayload::new()).is_err());
        assert_eq!(*blocked.inner.next_seq.lock().map_err(|_| anyhow!("poisoned"))?, 0);
        Ok(())
    }

    #[test]
    fn event_names_are_distinct_snake_case() {
        let names: std::collections::HashSet<&str> =
            SessionEvent::ALL.iter().map(|event| event.as_str()).collect();
        assert_eq!(names.len(), SessionEvent::ALL.len());
        assert!(names
            .iter()
            .all(|name| name.chars().all(|ch| ch.is_ascii_lowercase() || ch == '_')));
        assert_eq!(
            SessionEvent::ALL
                .iter()
                .filter(|event| event.is_failure())
                .count(),
            2
        );
        assert_eq!(SessionEvent::BackgroundRemoved.to_string(), "background_removed");
    }
}
