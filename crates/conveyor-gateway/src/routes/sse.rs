use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use conveyor_shared::kv::{EventKind, ProgressEvent};
use futures::stream::{self, Stream, StreamExt};
use uuid::Uuid;

use crate::state::AppState;

/// Resumable progress stream: `restore` (last known `TaskState`, if any),
/// then `connected`, then live `progress:<task_id>` events —
/// `queued`/`progress`/`token`/`sources`/`metrics`/`done`/`error` (§4.2,
/// §6.4) — terminating the stream on `done` or `error`. A 15s heartbeat
/// keeps idle proxies from closing the connection early.
pub async fn task_progress_stream(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let restore = match state.kv.get_task_state(task_id).await {
        Ok(Some(snapshot)) => {
            let data = serde_json::to_string(&snapshot).unwrap_or_default();
            Some(Event::default().event("restore").data(data))
        }
        _ => None,
    };
    let connected = Event::default().event("connected").data(task_id.to_string());

    let head = stream::iter(restore.into_iter().chain(std::iter::once(connected)))
        .map(Ok::<_, Infallible>);

    let channel = format!("progress:{task_id}");
    let live = async_stream::stream! {
        let mut pubsub = match state.kv.subscribe(&channel).await {
            Ok(p) => p,
            Err(_) => return,
        };
        let mut messages = pubsub.on_message();
        loop {
            match tokio::time::timeout(Duration::from_secs(15), messages.next()).await {
                Ok(Some(msg)) => {
                    let payload: String = match msg.get_payload() {
                        Ok(p) => p,
                        Err(_) => continue,
                    };
                    let Ok(event) = serde_json::from_str::<ProgressEvent>(&payload) else {
                        continue;
                    };
                    let terminal = matches!(event.kind, EventKind::Done | EventKind::Error);
                    yield Ok(Event::default().event(event.event_type()).data(payload));
                    if terminal {
                        break;
                    }
                }
                Ok(None) => break,
                Err(_elapsed) => {
                    yield Ok(Event::default().comment("heartbeat"));
                }
            }
        }
    };

    Sse::new(head.chain(live)).keep_alive(KeepAlive::default())
}
