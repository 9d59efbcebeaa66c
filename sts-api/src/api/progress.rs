//! Push channel for task progress
//!
//! `WS /task/{id}/progress` and `GET /task/{id}/events` (SSE) stream the same
//! sequence: the task's current state first, then every later committed
//! change, ending after the terminal event.
//!
//! The subscription is opened before the snapshot is read, so no change
//! committed after the snapshot can be missed. Buffered events already
//! reflected in the snapshot are dropped. A subscriber that lags behind the
//! event bus resynchronizes from the store instead of replaying.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::get,
    Router,
};
use futures::{
    sink::SinkExt,
    stream::{Stream, StreamExt},
};
use std::convert::Infallible;
use std::time::Duration;
use sts_common::events::TaskEvent;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::error::ApiResult;
use crate::models::Task;
use crate::store::TaskStore;
use crate::AppState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Subscribe, then read the snapshot; 404 for unknown or expired ids
async fn open_subscription(
    store: &TaskStore,
    task_id: &str,
) -> ApiResult<(broadcast::Receiver<TaskEvent>, Task)> {
    let rx = store.event_bus().subscribe();
    let snapshot = store.get(task_id).await?;
    Ok((rx, snapshot))
}

/// Events for one task, starting with its snapshot
///
/// Progress never goes backwards within the stream and the stream ends
/// after the first terminal event.
pub fn task_event_stream(
    store: TaskStore,
    mut rx: broadcast::Receiver<TaskEvent>,
    snapshot: Task,
) -> impl Stream<Item = TaskEvent> {
    async_stream::stream! {
        let task_id = snapshot.task_id.clone();
        let mut seen_version = snapshot.version;
        let mut last_progress = snapshot.progress;

        let first = snapshot.to_event();
        let mut finished = first.is_terminal();
        yield first;

        while !finished {
            match rx.recv().await {
                Ok(event) => {
                    if event.task_id() != task_id
                        || matches!(event, TaskEvent::TaskCreated { .. })
                        || event.version() <= seen_version
                        || event.progress() < last_progress
                    {
                        continue;
                    }
                    seen_version = event.version();
                    last_progress = event.progress();
                    finished = event.is_terminal();
                    yield event;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(task_id = %task_id, skipped, "Progress subscriber lagged, resyncing from store");
                    match store.get(&task_id).await {
                        Ok(task) if task.version > seen_version => {
                            seen_version = task.version;
                            let event = task.to_event();
                            if event.progress() >= last_progress {
                                last_progress = event.progress();
                                finished = event.is_terminal();
                                yield event;
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            debug!(task_id = %task_id, error = %e, "Task gone during resync");
                            finished = true;
                        }
                    }
                }
                Err(RecvError::Closed) => finished = true,
            }
        }
    }
}

/// WS /task/{id}/progress
pub async fn progress_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Response> {
    let (rx, snapshot) = open_subscription(&state.store, &task_id).await?;
    info!(task_id = %task_id, "WebSocket progress subscriber connected");

    let store = state.store.clone();
    Ok(ws
        .on_upgrade(move |socket| handle_socket(socket, store, rx, snapshot))
        .into_response())
}

async fn handle_socket(
    socket: WebSocket,
    store: TaskStore,
    rx: broadcast::Receiver<TaskEvent>,
    snapshot: Task,
) {
    let task_id = snapshot.task_id.clone();
    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        let events = task_event_stream(store, rx, snapshot);
        futures::pin_mut!(events);

        while let Some(event) = events.next().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    warn!(error = %e, "Failed to serialize progress event");
                    continue;
                }
            };
            if sender.send(Message::Text(json)).await.is_err() {
                return;
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    // Client messages are ignored; this only notices disconnects
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }
    info!(task_id = %task_id, "WebSocket progress subscriber disconnected");
}

/// GET /task/{id}/events
pub async fn progress_sse(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let (rx, snapshot) = open_subscription(&state.store, &task_id).await?;
    info!(task_id = %task_id, "SSE progress subscriber connected");

    let events = task_event_stream(state.store.clone(), rx, snapshot);
    let stream = async_stream::stream! {
        futures::pin_mut!(events);
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    yield Ok(Event::default().comment("heartbeat"));
                }
                next = events.next() => match next {
                    Some(event) => match serde_json::to_string(&event) {
                        Ok(json) => yield Ok(Event::default().event(event.event_type()).data(json)),
                        Err(e) => warn!(error = %e, "Failed to serialize progress event"),
                    },
                    None => break,
                }
            }
        }
        debug!(task_id = %task_id, "SSE progress stream ended");
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(HEARTBEAT_INTERVAL)
            .text("heartbeat"),
    ))
}

pub fn progress_routes() -> Router<AppState> {
    Router::new()
        .route("/task/:task_id/progress", get(progress_ws))
        .route("/task/:task_id/events", get(progress_sse))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnalysisResult, SentimentAnalysis, SourceKind, TaskUpdate};
    use sts_common::events::EventBus;

    fn result() -> AnalysisResult {
        AnalysisResult {
            product_name: "Widget".to_string(),
            sources: vec![SourceKind::Reddit],
            data_summary: vec![],
            sentiment_analysis: SentimentAnalysis::default(),
            processing_mode: "single_request".to_string(),
        }
    }

    #[tokio::test]
    async fn test_buffered_events_in_snapshot_are_dropped() {
        let store = TaskStore::in_memory(Duration::from_secs(60), EventBus::new(16));
        let id = store.create(&[SourceKind::Reddit]).await.unwrap();

        let rx = store.event_bus().subscribe();
        store.update(&id, TaskUpdate::running(5, "start")).await.unwrap();
        let snapshot = store.get(&id).await.unwrap();
        store.set_result(&id, result()).await.unwrap();

        let events: Vec<TaskEvent> = task_event_stream(store, rx, snapshot).collect().await;
        let versions: Vec<u64> = events.iter().map(TaskEvent::version).collect();
        assert_eq!(versions, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_clock_step_back_does_not_hide_later_events() {
        let store = TaskStore::in_memory(Duration::from_secs(60), EventBus::new(16));
        let id = store.create(&[SourceKind::Reddit]).await.unwrap();

        let rx = store.event_bus().subscribe();
        let mut snapshot = store.get(&id).await.unwrap();
        // Later commits carry earlier wall-clock times than the snapshot
        snapshot.updated_at += chrono::Duration::hours(1);

        store.update(&id, TaskUpdate::running(5, "start")).await.unwrap();
        store.set_result(&id, result()).await.unwrap();

        let events: Vec<TaskEvent> = tokio::time::timeout(
            Duration::from_secs(1),
            task_event_stream(store, rx, snapshot).collect::<Vec<_>>(),
        )
        .await
        .unwrap();
        let progress: Vec<u8> = events.iter().map(TaskEvent::progress).collect();
        assert_eq!(progress, vec![0, 5, 100]);
        assert!(events.last().unwrap().is_terminal());
    }
}
