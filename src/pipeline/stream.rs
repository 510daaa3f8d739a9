//! Streaming adapter: turns a running pipeline task plus its progress channel
//! into an ordered sequence of events that always ends with exactly one
//! terminal event.

use std::convert::Infallible;
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderValue, header};
use axum::response::{IntoResponse, Response};
use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::events::{EventStatus, ProgressEvent};

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Reader side of one pipeline invocation.
///
/// Dropping the stream does not cancel the task; it runs to completion and
/// persists its artifacts, only the unread events are discarded.
pub struct ProgressStream {
    rx: mpsc::UnboundedReceiver<ProgressEvent>,
    task: Option<JoinHandle<()>>,
    agent: String,
    poll_interval: Duration,
    fault: Option<String>,
    saw_terminal: bool,
    done: bool,
}

impl ProgressStream {
    pub fn new(
        agent: &str,
        rx: mpsc::UnboundedReceiver<ProgressEvent>,
        task: JoinHandle<()>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            rx,
            task: Some(task),
            agent: agent.to_string(),
            poll_interval,
            fault: None,
            saw_terminal: false,
            done: false,
        }
    }

    /// Next event, or `None` once the task finished and the channel is empty.
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        loop {
            if self.done {
                return None;
            }

            if self.task.is_some() {
                match tokio::time::timeout(self.poll_interval, self.rx.recv()).await {
                    Ok(Some(event)) => return Some(self.observe(event)),
                    // Every sender is gone: the task is finishing, wait for it.
                    Ok(None) => self.join_task().await,
                    Err(_) => {
                        if self.task.as_ref().is_some_and(|t| t.is_finished()) {
                            self.join_task().await;
                        }
                    }
                }
                continue;
            }

            // Task is over; drain whatever it enqueued before finishing.
            if let Ok(event) = self.rx.try_recv() {
                return Some(self.observe(event));
            }
            self.done = true;
            if !self.saw_terminal {
                let msg = self
                    .fault
                    .take()
                    .unwrap_or_else(|| "pipeline ended without reporting a result".to_string());
                tracing::error!(agent = %self.agent, error = %msg, "synthesizing terminal error event");
                self.saw_terminal = true;
                return Some(ProgressEvent::new(EventStatus::Error, &self.agent, msg));
            }
            return None;
        }
    }

    fn observe(&mut self, event: ProgressEvent) -> ProgressEvent {
        if event.is_terminal() {
            self.saw_terminal = true;
        }
        event
    }

    async fn join_task(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                self.fault = Some(if err.is_panic() {
                    panic_message(err.into_panic())
                } else {
                    "pipeline task was cancelled".to_string()
                });
            }
        }
    }

    /// Adapt into a `futures` stream.
    pub fn into_stream(self) -> impl Stream<Item = ProgressEvent> + Send {
        futures::stream::unfold(self, |mut this| async move {
            this.next_event().await.map(|event| (event, this))
        })
    }

    /// Collect every event; used by tests and non-streaming callers.
    pub async fn collect(mut self) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next_event().await {
            events.push(event);
        }
        events
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "pipeline task panicked".to_string()
    }
}

impl IntoResponse for ProgressStream {
    fn into_response(self) -> Response {
        use futures::StreamExt;

        let body = Body::from_stream(
            self.into_stream()
                .map(|event| Ok::<_, Infallible>(event.to_ndjson())),
        );
        let mut response = Response::new(body);
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(NDJSON_CONTENT_TYPE),
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::events::progress_channel;

    const POLL: Duration = Duration::from_millis(20);

    fn terminal_count(events: &[ProgressEvent]) -> usize {
        events.iter().filter(|e| e.is_terminal()).count()
    }

    #[tokio::test]
    async fn test_forwards_all_events_then_ends() {
        let (tx, rx) = progress_channel();
        let task = tokio::spawn(async move {
            tx.progress("Parser", 10, "start");
            tokio::time::sleep(Duration::from_millis(50)).await;
            tx.progress("Parser", 50, "middle");
            tx.send(ProgressEvent::new(EventStatus::Complete, "Coordinator", "done"));
        });
        let events = ProgressStream::new("Coordinator", rx, task, POLL).collect().await;
        assert_eq!(events.len(), 3);
        assert_eq!(events[2].status, EventStatus::Complete);
        assert_eq!(terminal_count(&events), 1);
    }

    #[tokio::test]
    async fn test_drains_events_enqueued_right_before_finish() {
        let (tx, rx) = progress_channel();
        let keep = tx.clone();
        let task = tokio::spawn(async move {
            for i in 0..100u8 {
                tx.progress("Parser", i, "tick");
            }
            tx.send(ProgressEvent::new(EventStatus::Complete, "Coordinator", "done"));
        });
        // A live clone keeps the channel open, so completion must be noticed via the task.
        let events = ProgressStream::new("Coordinator", rx, task, POLL).collect().await;
        drop(keep);
        assert_eq!(events.len(), 101);
        assert_eq!(terminal_count(&events), 1);
    }

    #[tokio::test]
    async fn test_panicking_task_yields_synthesized_error() {
        let (tx, rx) = progress_channel();
        let task = tokio::spawn(async move {
            tx.progress("Parser", 10, "start");
            panic!("extraction exploded");
        });
        let events = ProgressStream::new("Coordinator", rx, task, POLL).collect().await;
        assert_eq!(events.len(), 2);
        let last = events.last().unwrap();
        assert_eq!(last.status, EventStatus::Error);
        assert!(last.msg.contains("extraction exploded"));
        assert_eq!(terminal_count(&events), 1);
    }

    #[tokio::test]
    async fn test_task_without_terminal_event_gets_one() {
        let (tx, rx) = progress_channel();
        let task = tokio::spawn(async move {
            tx.info("Parser", "forgot to finish");
        });
        let events = ProgressStream::new("Coordinator", rx, task, POLL).collect().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].status, EventStatus::Error);
    }

    #[tokio::test]
    async fn test_dropping_stream_does_not_cancel_task() {
        let (tx, rx) = progress_channel();
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        let task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            tx.info("Parser", "still running");
            let _ = done_tx.send(());
        });
        drop(ProgressStream::new("Coordinator", rx, task, POLL));
        assert!(done_rx.await.is_ok());
    }

    #[tokio::test]
    async fn test_into_response_sets_ndjson_body() {
        use http_body_util::BodyExt;

        let (tx, rx) = progress_channel();
        let task = tokio::spawn(async move {
            tx.progress("Parser", 10, "start");
            tx.send(ProgressEvent::new(EventStatus::Complete, "Coordinator", "done"));
        });
        let response = ProgressStream::new("Coordinator", rx, task, POLL).into_response();
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            NDJSON_CONTENT_TYPE
        );
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("\"status\":\"complete\""));
    }
}
