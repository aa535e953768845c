mod final_node;
mod generate;
mod groundedness;
mod memory;
mod reflection;
mod retrieve;

pub use final_node::TurnOutcome;

use std::time::Instant;

use conveyor_shared::kv::{ProgressEvent, TaskStatus};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::state::{ChatState, Intent};
use crate::ChatWorkerState;

/// Runs a single conversational turn through the full node sequence
/// (§4.5), publishing progress events and honoring cooperative
/// cancellation between nodes.
pub async fn run_turn(
    worker: &ChatWorkerState,
    mut state: ChatState,
    cancel: CancellationToken,
) -> Result<TurnOutcome, TurnError> {
    worker
        .kv
        .publish_progress(&ProgressEvent::new(state.task_id, TaskStatus::Processing, 5))
        .await
        .ok();

    if cancel.is_cancelled() {
        return Err(TurnError::Cancelled);
    }
    let started = Instant::now();
    reflection::run(worker, &mut state).await;
    state.latency_breakdown_ms.insert("reflection", started.elapsed().as_millis() as u64);

    let reflection = state.reflection.clone().expect("reflection always sets a value");
    let route_to_chitchat = reflection.intent == Intent::Chitchat && !reflection.needs_retrieval;

    if cancel.is_cancelled() {
        return Err(TurnError::Cancelled);
    }
    if !route_to_chitchat {
        let started = Instant::now();
        retrieve::run(worker, &mut state).await;
        state.latency_breakdown_ms.insert("retrieve", started.elapsed().as_millis() as u64);
    }

    if cancel.is_cancelled() {
        return Err(TurnError::Cancelled);
    }
    let started = Instant::now();
    generate::run(worker, &mut state, cancel.clone()).await;
    state.latency_breakdown_ms.insert("generate", started.elapsed().as_millis() as u64);

    if cancel.is_cancelled() {
        return Err(TurnError::Cancelled);
    }
    let started = Instant::now();
    memory::run(worker, &mut state).await;
    state.latency_breakdown_ms.insert("memory", started.elapsed().as_millis() as u64);

    let outcome = final_node::finish(state);
    info!(task_id = %outcome.task_id, latency_ms = ?outcome.latency_breakdown_ms, "turn completed");
    Ok(outcome)
}

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("turn cancelled")]
    Cancelled,
}
