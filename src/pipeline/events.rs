//! Progress events and the channel that carries them.
//!
//! A pipeline invocation owns one [`ProgressSender`]; the HTTP layer owns the
//! matching receiver through [`ProgressStream`](super::stream::ProgressStream).
//! The channel is unbounded: emitting never blocks and never drops.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tokio::sync::mpsc;

/// Wire status of a progress event.
///
/// Unknown statuses deserialize to `Unknown` so older consumers keep working.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Progress,
    Info,
    Warning,
    DocReady,
    Complete,
    Error,
    #[serde(other)]
    Unknown,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Progress => "progress",
            EventStatus::Info => "info",
            EventStatus::Warning => "warning",
            EventStatus::DocReady => "doc_ready",
            EventStatus::Complete => "complete",
            EventStatus::Error => "error",
            EventStatus::Unknown => "unknown",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EventStatus::Complete | EventStatus::Error)
    }
}

/// One immutable progress record, serialized as a single NDJSON line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub status: EventStatus,
    pub agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub val: Option<u8>,
    pub msg: String,
    /// Stage-specific payload (analysis, generated document names, ...),
    /// flattened next to the core fields.
    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl ProgressEvent {
    pub fn new(status: EventStatus, agent: &str, msg: impl Into<String>) -> Self {
        Self {
            status,
            agent: agent.to_string(),
            val: None,
            msg: msg.into(),
            extra: Map::new(),
        }
    }

    pub fn with_val(mut self, val: u8) -> Self {
        self.val = Some(val.min(100));
        self
    }

    pub fn with_extra(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Serialize as one newline-terminated JSON line.
    pub fn to_ndjson(&self) -> String {
        let mut line = serde_json::to_string(self)
            .unwrap_or_else(|e| unserializable_line(&self.agent, &e.to_string()));
        line.push('\n');
        line
    }
}

/// Error line standing in for an event that could not be serialized.
fn unserializable_line(agent: &str, error: &str) -> String {
    json!({
        "status": EventStatus::Error,
        "agent": agent,
        "msg": format!("unserializable event: {}", error),
    })
    .to_string()
}

/// Write half of a progress channel.
///
/// Clones share the same high-water mark and terminal flag, so an
/// invocation's progress values never go backwards and at most one terminal
/// event is ever enqueued.
#[derive(Clone)]
pub struct ProgressSender {
    tx: mpsc::UnboundedSender<ProgressEvent>,
    high_water: Arc<AtomicU8>,
    terminal_sent: Arc<AtomicBool>,
}

/// Create a channel for one pipeline invocation.
pub fn progress_channel() -> (ProgressSender, mpsc::UnboundedReceiver<ProgressEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ProgressSender {
            tx,
            high_water: Arc::new(AtomicU8::new(0)),
            terminal_sent: Arc::new(AtomicBool::new(false)),
        },
        rx,
    )
}

impl ProgressSender {
    /// Enqueue an event. Returns `false` when it was not enqueued, either
    /// because a terminal event already went out or the reader is gone.
    pub fn send(&self, mut event: ProgressEvent) -> bool {
        if self.terminal_sent.load(Ordering::SeqCst) {
            tracing::warn!(
                status = event.status.as_str(),
                msg = %event.msg,
                "event after terminal event ignored"
            );
            return false;
        }
        if event.is_terminal() && self.terminal_sent.swap(true, Ordering::SeqCst) {
            return false;
        }
        if let Some(val) = event.val {
            let prev = self.high_water.fetch_max(val, Ordering::SeqCst);
            event.val = Some(prev.max(val));
        }
        // A closed receiver means the client went away; the pipeline keeps going.
        self.tx.send(event).is_ok()
    }

    /// `progress` event prefixed with the agent name, like every stage message.
    pub fn progress(&self, agent: &str, val: u8, msg: impl AsRef<str>) {
        self.send(
            ProgressEvent::new(
                EventStatus::Progress,
                agent,
                format!("[{}] {}", agent, msg.as_ref()),
            )
            .with_val(val),
        );
    }

    pub fn info(&self, agent: &str, msg: impl Into<String>) {
        self.send(ProgressEvent::new(EventStatus::Info, agent, msg));
    }

    pub fn warning(&self, agent: &str, msg: impl Into<String>) {
        self.send(ProgressEvent::new(EventStatus::Warning, agent, msg));
    }

    pub fn error(&self, agent: &str, msg: impl Into<String>) {
        self.send(ProgressEvent::new(EventStatus::Error, agent, msg));
    }

    /// Current high-water progress value.
    pub fn current(&self) -> u8 {
        self.high_water.load(Ordering::SeqCst)
    }

    pub fn terminal_sent(&self) -> bool {
        self.terminal_sent.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unserializable_line_escapes_quotes() {
        let line = unserializable_line("Agent \"X\"", "key must be a \"string\"");
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["agent"], "Agent \"X\"");
        assert_eq!(value["msg"], "unserializable event: key must be a \"string\"");
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    #[test]
    fn test_event_wire_format() {
        let ev = ProgressEvent::new(EventStatus::DocReady, "Coordinator", "saved")
            .with_val(95)
            .with_extra("name", "T1.docx");
        let line = ev.to_ndjson();
        assert!(line.ends_with('\n'));
        let parsed: Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(
            parsed,
            json!({"status": "doc_ready", "agent": "Coordinator", "val": 95, "msg": "saved", "name": "T1.docx"})
        );
    }

    #[test]
    fn test_event_without_val_omits_field() {
        let line = ProgressEvent::new(EventStatus::Info, "Parser", "hello").to_ndjson();
        assert!(!line.contains("\"val\""));
    }

    #[test]
    fn test_unknown_status_is_tolerated() {
        let ev: ProgressEvent =
            serde_json::from_str(r#"{"status":"heartbeat","agent":"x","msg":"m"}"#).unwrap();
        assert_eq!(ev.status, EventStatus::Unknown);
        assert!(!ev.is_terminal());
    }

    #[test]
    fn test_send_preserves_order() {
        let (tx, mut rx) = progress_channel();
        tx.info("a", "one");
        tx.info("a", "two");
        tx.info("a", "three");
        let msgs: Vec<_> = drain(&mut rx).into_iter().map(|e| e.msg).collect();
        assert_eq!(msgs, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_progress_values_never_decrease() {
        let (tx, mut rx) = progress_channel();
        tx.progress("Parser", 20, "a");
        tx.progress("Parser", 50, "b");
        tx.progress("Parser", 20, "c");
        tx.progress("Parser", 60, "d");
        let vals: Vec<_> = drain(&mut rx).into_iter().filter_map(|e| e.val).collect();
        assert_eq!(vals, vec![20, 50, 50, 60]);
        assert_eq!(tx.current(), 60);
    }

    #[test]
    fn test_only_first_terminal_event_is_sent() {
        let (tx, mut rx) = progress_channel();
        assert!(tx.send(ProgressEvent::new(EventStatus::Complete, "c", "done")));
        assert!(!tx.send(ProgressEvent::new(EventStatus::Error, "c", "late")));
        tx.info("c", "after");
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, EventStatus::Complete);
        assert!(tx.terminal_sent());
    }

    #[test]
    fn test_clones_share_terminal_flag() {
        let (tx, mut rx) = progress_channel();
        let other = tx.clone();
        tx.error("a", "boom");
        other.error("b", "boom again");
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn test_send_after_reader_dropped_does_not_panic() {
        let (tx, rx) = progress_channel();
        drop(rx);
        assert!(!tx.send(ProgressEvent::new(EventStatus::Info, "a", "nobody listening")));
    }
}
