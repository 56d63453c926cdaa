use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};

use crate::time::now_utc_iso;

pub type EventPayload = Map<String, Value>;

/// Append-only structured event log.
///
/// - default fields are `type`, `run_id`, `ts`
/// - caller payload is merged last and can override defaults
/// - file sinks get one compact JSON object per line
///
/// Clones share the same sink; `for_invocation` forks a writer that stamps a
/// different `run_id` while still writing to the same place.
#[derive(Debug, Clone)]
pub struct EventWriter {
    sink: Arc<EventSink>,
    run_id: String,
}

#[derive(Debug)]
enum EventSink {
    File { path: PathBuf, lock: Mutex<()> },
    Memory(Mutex<Vec<Value>>),
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, run_id: impl Into<String>) -> Self {
        Self {
            sink: Arc::new(EventSink::File {
                path: path.into(),
                lock: Mutex::new(()),
            }),
            run_id: run_id.into(),
        }
    }

    pub fn memory(run_id: impl Into<String>) -> Self {
        Self {
            sink: Arc::new(EventSink::Memory(Mutex::new(Vec::new()))),
            run_id: run_id.into(),
        }
    }

    pub fn for_invocation(&self, run_id: impl Into<String>) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
            run_id: run_id.into(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self.sink.as_ref() {
            EventSink::File { path, .. } => Some(path),
            EventSink::Memory(_) => None,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn emit(&self, event_type: &str, payload: EventPayload) -> anyhow::Result<Value> {
        let mut event = Map::new();
        event.insert("type".to_string(), Value::String(event_type.to_string()));
        event.insert("run_id".to_string(), Value::String(self.run_id.clone()));
        event.insert("ts".to_string(), Value::String(now_utc_iso()));
        for (key, value) in payload {
            event.insert(key, value);
        }
        let event = Value::Object(event);

        match self.sink.as_ref() {
            EventSink::File { path, lock } => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let line = serde_json::to_string(&event)?;
                let _guard = lock
                    .lock()
                    .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?;
                let mut file = OpenOptions::new().create(true).append(true).open(path)?;
                file.write_all(line.as_bytes())?;
                file.write_all(b"\n")?;
            }
            EventSink::Memory(rows) => {
                rows.lock()
                    .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?
                    .push(event.clone());
            }
        }

        Ok(event)
    }

    /// Emits and swallows sink failures. Handlers log from failure paths where
    /// a broken log must not mask the original outcome.
    pub fn record(&self, event_type: &str, payload: EventPayload) {
        let _ = self.emit(event_type, payload);
    }

    /// Events captured by a memory sink, in emission order. File sinks return
    /// an empty list.
    pub fn captured(&self) -> Vec<Value> {
        match self.sink.as_ref() {
            EventSink::Memory(rows) => rows.lock().map(|rows| rows.clone()).unwrap_or_default(),
            EventSink::File { .. } => Vec::new(),
        }
    }

    pub fn captured_types(&self) -> Vec<String> {
        self.captured()
            .iter()
            .filter_map(|row| row.get("type").and_then(Value::as_str).map(str::to_string))
            .collect()
    }
}
