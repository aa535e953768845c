//! `delete_document` task (§4.6): remove every vector tagged with this
//! document id from the bot's collection.

use conveyor_shared::kv::{ProgressEvent, TaskStatus};
use tracing::{error, info};
use uuid::Uuid;

use crate::tasks::collection_name;
use crate::IngestWorkerState;

pub async fn run(worker: &IngestWorkerState, task_id: Uuid, bot_id: Uuid, document_id: Uuid) {
    let collection = collection_name(bot_id);
    let result = worker
        .vector_store
        .delete_by_document(&collection, &document_id.to_string())
        .await;

    let status = match &result {
        Ok(()) => TaskStatus::Completed,
        Err(err) => {
            error!(%err, document_id = %document_id, "delete_document failed");
            TaskStatus::Failed
        }
    };
    worker
        .kv
        .publish_progress(&ProgressEvent::new(task_id, status, 100))
        .await
        .ok();
    info!(task_id = %task_id, document_id = %document_id, success = result.is_ok(), "delete_document finished");
}
