//! Progress-streaming response (spec §4.11 `Streamer`): turns a
//! [`StateTracker`] plus a running process future into an ordered event
//! stream with heartbeats, a timeout, and cooperative cancellation.
//!
//! Grounded on `original_source`'s `test_sse_streaming.py` for event
//! ordering; implemented over `tokio::sync::broadcast` +
//! `tokio_stream::wrappers::BroadcastStream`, matching the teacher's
//! `tokio-stream` dependency.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, Stream, StreamExt};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;

use crate::error::Result;

use super::state::{PipelineState, StateTracker};

/// One wire event (spec §4.11 "Emits events in this order"). Field
/// omission on the wire (`message` equal to stage name, empty `details`,
/// `is_complete=false`) is left to the caller's serialization layer —
/// this type carries the full state, not the minimized wire form.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Config { stages: Vec<(String, u8)>, category: String },
    Progress(PipelineState),
    Heartbeat,
    Complete { result: Option<Value> },
    Error { message: String },
}

#[derive(Debug, Clone)]
pub struct StreamerConfig {
    pub heartbeat_interval: Duration,
    pub stream_timeout: Duration,
    pub include_stage_definitions: bool,
    pub include_completion_data: bool,
}

/// Aborts the wrapped task if dropped before it resolves — this is what
/// gives consumer-disconnect (dropping the returned stream) the
/// "cancelled at the next suspension point" semantics (spec §5
/// "Cancellation").
struct AbortOnDrop<T> {
    handle: JoinHandle<T>,
}

impl<T> Future for AbortOnDrop<T> {
    type Output = std::result::Result<T, tokio::task::JoinError>;

    fn poll(self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> std::task::Poll<Self::Output> {
        // `JoinHandle` is `Unpin`, so `AbortOnDrop` is too.
        Pin::new(&mut self.get_mut().handle).poll(cx)
    }
}

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

enum RunState {
    Running {
        receiver: BroadcastStream<PipelineState>,
        process: AbortOnDrop<Result<Value>>,
        deadline: Instant,
        last_event_at: Instant,
        heartbeat_interval: Duration,
        include_completion_data: bool,
    },
    Finished,
}

/// `create_streaming_response(tracker, process_func, ...)` (spec §4.11):
/// opens a subscription before spawning `process_func` so no early event
/// is missed, then yields `Config`, `Progress`/`Heartbeat`, and a single
/// terminal `Complete`/`Error`.
pub fn create_streaming_response<F>(
    tracker: Arc<StateTracker>,
    process_func: F,
    config: StreamerConfig,
) -> impl Stream<Item = StreamEvent>
where
    F: Future<Output = Result<Value>> + Send + 'static,
{
    let receiver = tracker.subscribe();
    let process = AbortOnDrop { handle: tokio::spawn(process_func) };

    let config_event = if config.include_stage_definitions {
        Some(StreamEvent::Config {
            stages: tracker.stage_definitions(),
            category: tracker.category().to_string(),
        })
    } else {
        None
    };

    let now = Instant::now();
    let initial = RunState::Running {
        receiver: BroadcastStream::new(receiver),
        process,
        deadline: now + config.stream_timeout,
        last_event_at: now,
        heartbeat_interval: config.heartbeat_interval,
        include_completion_data: config.include_completion_data,
    };

    stream::iter(config_event).chain(stream::unfold(initial, step))
}

async fn step(mut run_state: RunState) -> Option<(StreamEvent, RunState)> {
    loop {
        let RunState::Running {
            receiver,
            process,
            deadline,
            last_event_at,
            heartbeat_interval,
            include_completion_data,
        } = &mut run_state
        else {
            return None;
        };

        let now = Instant::now();
        if now >= *deadline {
            return Some((
                StreamEvent::Error {
                    message: "stream timeout exceeded".to_string(),
                },
                RunState::Finished,
            ));
        }

        let heartbeat_due = *last_event_at + *heartbeat_interval;
        let sleep_until = heartbeat_due.min(*deadline);

        tokio::select! {
            biased;

            // Listed before the process branch so buffered progress events
            // (including the final `is_complete` one) are always drained
            // before the process's own return value is accepted — otherwise
            // a process that finishes without yielding could race its
            // `Complete` event ahead of the `Progress` events it just sent.
            item = receiver.next() => {
                match item {
                    Some(Ok(state)) => {
                        *last_event_at = Instant::now();
                        let terminal = state.is_complete;
                        let event = if let Some(message) = state.error.clone() {
                            StreamEvent::Error { message }
                        } else {
                            StreamEvent::Progress(state)
                        };
                        if terminal && matches!(event, StreamEvent::Error { .. }) {
                            return Some((event, RunState::Finished));
                        }
                        return Some((event, run_state));
                    }
                    Some(Err(_lagged)) => {
                        // Missed broadcast events under load; keep going rather
                        // than surfacing a synthetic error for a lag that only
                        // affects best-effort progress reporting.
                        continue;
                    }
                    None => {
                        // Tracker dropped: wait for the process's own result.
                        continue;
                    }
                }
            }

            joined = &mut *process => {
                let event = match joined {
                    Ok(Ok(value)) => StreamEvent::Complete {
                        result: if *include_completion_data { Some(value) } else { None },
                    },
                    Ok(Err(e)) => StreamEvent::Error { message: e.to_string() },
                    Err(e) if e.is_cancelled() => StreamEvent::Error { message: "cancelled".to_string() },
                    Err(e) => StreamEvent::Error { message: format!("process task panicked: {e}") },
                };
                return Some((event, RunState::Finished));
            }

            _ = tokio::time::sleep_until(sleep_until.into()) => {
                if Instant::now() >= heartbeat_due {
                    *last_event_at = Instant::now();
                    return Some((StreamEvent::Heartbeat, run_state));
                }
                continue;
            }
        }
    }
}

/// Convenience constructor matching the teacher's category/stage registry
/// style: builds a tracker whose `stage_progress` table is a plain
/// ordered list of `(stage, progress)` pairs.
pub fn standard_stage_table() -> Vec<(String, u8)> {
    vec![
        ("START".to_string(), 5),
        ("SEARCH_START".to_string(), 10),
        ("PROVIDER_FETCH_START".to_string(), 25),
        ("SYNTHESIZE_START".to_string(), 60),
        ("COMPLETE".to_string(), 100),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::state::StateTracker;
    use serde_json::json;

    fn fast_stage_table() -> Vec<(String, u8)> {
        vec![("START".to_string(), 5), ("COMPLETE".to_string(), 100)]
    }

    #[tokio::test]
    async fn happy_path_emits_config_progress_then_complete() {
        let tracker = Arc::new(StateTracker::new("search", fast_stage_table()));
        let tracker_for_process = tracker.clone();

        let events: Vec<StreamEvent> = create_streaming_response(
            tracker.clone(),
            async move {
                tracker_for_process.update_stage("START");
                tracker_for_process.update_complete("done");
                Ok(json!({"hits": 3}))
            },
            StreamerConfig {
                heartbeat_interval: Duration::from_millis(200),
                stream_timeout: Duration::from_secs(5),
                include_stage_definitions: true,
                include_completion_data: true,
            },
        )
        .collect()
        .await;

        assert!(matches!(events[0], StreamEvent::Config { .. }));
        assert!(events.iter().any(|e| matches!(e, StreamEvent::Progress(s) if s.stage == "START")));
        assert!(matches!(events.last(), Some(StreamEvent::Complete { .. })));
    }

    #[tokio::test]
    async fn heartbeat_fires_while_process_is_idle() {
        let tracker = Arc::new(StateTracker::new("search", fast_stage_table()));

        let events: Vec<StreamEvent> = create_streaming_response(
            tracker.clone(),
            async move {
                tokio::time::sleep(Duration::from_millis(650)).await;
                Ok(json!(null))
            },
            StreamerConfig {
                heartbeat_interval: Duration::from_millis(250),
                stream_timeout: Duration::from_secs(5),
                include_stage_definitions: false,
                include_completion_data: false,
            },
        )
        .collect()
        .await;

        let heartbeats = events.iter().filter(|e| matches!(e, StreamEvent::Heartbeat)).count();
        assert!(heartbeats >= 2, "expected at least two heartbeats, got {heartbeats}");
        assert!(matches!(events.last(), Some(StreamEvent::Complete { .. })));
    }

    #[tokio::test]
    async fn timeout_emits_a_single_error_event_containing_timeout() {
        let tracker = Arc::new(StateTracker::new("search", fast_stage_table()));

        let events: Vec<StreamEvent> = create_streaming_response(
            tracker.clone(),
            async move {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(json!(null))
            },
            StreamerConfig {
                heartbeat_interval: Duration::from_secs(5),
                stream_timeout: Duration::from_millis(200),
                include_stage_definitions: false,
                include_completion_data: false,
            },
        )
        .collect()
        .await;

        assert_eq!(events.len(), 1);
        match &events[0] {
            StreamEvent::Error { message } => assert!(message.contains("timeout")),
            other => panic!("expected a timeout error event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn process_error_surfaces_as_error_event() {
        let tracker = Arc::new(StateTracker::new("search", fast_stage_table()));

        let events: Vec<StreamEvent> = create_streaming_response(
            tracker.clone(),
            async move { Err(crate::error::FloridifyError::provider("boom")) },
            StreamerConfig {
                heartbeat_interval: Duration::from_millis(200),
                stream_timeout: Duration::from_secs(5),
                include_stage_definitions: false,
                include_completion_data: false,
            },
        )
        .collect()
        .await;

        assert!(matches!(events.last(), Some(StreamEvent::Error { .. })));
    }
}
