//! `recrawl` task (§4.6): delete vectors for a list of document ids ahead
//! of a fresh crawl the gateway will enqueue separately.

use conveyor_shared::kv::{ProgressEvent, TaskStatus};
use tracing::{error, info};
use uuid::Uuid;

use crate::tasks::collection_name;
use crate::IngestWorkerState;

pub async fn run(worker: &IngestWorkerState, task_id: Uuid, bot_id: Uuid, document_ids: Vec<Uuid>) {
    let collection = collection_name(bot_id);
    let mut failed = 0u32;

    for document_id in &document_ids {
        if let Err(err) = worker
            .vector_store
            .delete_by_document(&collection, &document_id.to_string())
            .await
        {
            failed += 1;
            error!(%err, document_id = %document_id, "recrawl cleanup failed");
        }
    }

    let status = if failed == 0 { TaskStatus::Completed } else { TaskStatus::Failed };
    worker
        .kv
        .publish_progress(&ProgressEvent::new(task_id, status, 100))
        .await
        .ok();
    info!(task_id = %task_id, documents = document_ids.len(), failed, "recrawl cleanup finished");
}
