//! `file_upload` task (§4.6): extract, chunk, embed, insert in batches of
//! `vector_insert_batch_size`, then archive the original blob.
//!
//! The document id is the task id — the gateway creates the pending
//! `documents` row with that id before enqueueing, so this worker never
//! needs to mint or look one up.

use conveyor_shared::kv::{ProgressEvent, TaskStatus};
use conveyor_shared::retrieval::RetrievedChunk;
use conveyor_shared::webhook_payloads::FileBatchWebhook;
use tracing::{error, info};
use uuid::Uuid;

use crate::extract::{chunk_text, extract_text};
use crate::tasks::collection_name;
use crate::IngestWorkerState;

const CHUNK_TARGET_TOKENS: usize = 400;
const CHUNK_OVERLAP_TOKENS: usize = 40;

pub async fn run(
    worker: &IngestWorkerState,
    gateway_url: &str,
    webhook_secret: &str,
    task_id: Uuid,
    bot_id: Uuid,
    scratch_path: String,
    filename: String,
) {
    let document_id = task_id;
    worker
        .kv
        .publish_progress(&ProgressEvent::new(task_id, TaskStatus::Processing, 0))
        .await
        .ok();

    let bytes = match tokio::fs::read(&scratch_path).await {
        Ok(b) => b,
        Err(err) => {
            error!(%err, path = %scratch_path, "failed to read scratch file");
            fail(worker, gateway_url, webhook_secret, task_id, bot_id, document_id, err.to_string())
                .await;
            return;
        }
    };

    let text = extract_text(&filename, &bytes);
    let chunks = chunk_text(&text, CHUNK_TARGET_TOKENS, CHUNK_OVERLAP_TOKENS);
    let collection = collection_name(bot_id);
    let batch_size = worker.config.ingest.vector_insert_batch_size;
    let batches: Vec<&[String]> = chunks.chunks(batch_size.max(1)).collect();
    let batch_total = batches.len().max(1) as u32;

    let mut failed = 0u32;
    for (index, batch) in batches.iter().enumerate() {
        let result = embed_and_insert(worker, &collection, document_id, batch).await;
        let success = result.is_ok();
        if let Err(err) = &result {
            failed += 1;
            error!(%err, batch = index, "file upload batch failed");
        }

        crate::webhook::post(
            &worker.http,
            gateway_url,
            "/webhooks/file",
            webhook_secret,
            &FileBatchWebhook {
                task_id,
                bot_id,
                document_id,
                batch_index: index as u32,
                batch_total,
                success,
                error: result.err(),
            },
        )
        .await;

        let progress = (((index + 1) as f32 / batch_total as f32) * 90.0) as u8;
        worker
            .kv
            .publish_progress(&ProgressEvent::new(task_id, TaskStatus::Processing, progress))
            .await
            .ok();
    }

    if let Ok(content_type) = mime_guess(&filename) {
        let key = format!("{bot_id}/{document_id}_{filename}");
        if let Err(err) = worker.object_store.put(&key, bytes, content_type).await {
            error!(%err, "failed to archive original upload");
        }
    }

    if let Err(err) = tokio::fs::remove_file(&scratch_path).await {
        error!(%err, path = %scratch_path, "failed to delete scratch file");
    }

    let status = if failed == 0 { TaskStatus::Completed } else { TaskStatus::Failed };
    worker
        .kv
        .publish_progress(&ProgressEvent::new(task_id, status, 100))
        .await
        .ok();
    info!(task_id = %task_id, failed, "file upload finished");
}

/// Embedding happens server-side on insert (the store's `insert` endpoint
/// accepts raw text, matching [`conveyor_shared::retrieval::VectorStore::insert`]'s
/// signature, which carries no vector field); this batch only has to embed
/// eagerly when the caller needs the vector itself, as the retrieve node does.
async fn embed_and_insert(
    worker: &IngestWorkerState,
    collection: &str,
    document_id: Uuid,
    batch: &[String],
) -> Result<(), String> {
    let chunks: Vec<RetrievedChunk> = batch
        .iter()
        .enumerate()
        .map(|(i, text)| RetrievedChunk {
            text: text.clone(),
            document_id: document_id.to_string(),
            web_url: None,
            chunk_index: i as i64,
            score: 0.0,
            metadata: serde_json::json!({}),
        })
        .collect();
    worker.vector_store.insert(collection, &chunks).await
}

async fn fail(
    worker: &IngestWorkerState,
    gateway_url: &str,
    webhook_secret: &str,
    task_id: Uuid,
    bot_id: Uuid,
    document_id: Uuid,
    error: String,
) {
    crate::webhook::post(
        &worker.http,
        gateway_url,
        "/webhooks/file",
        webhook_secret,
        &FileBatchWebhook {
            task_id,
            bot_id,
            document_id,
            batch_index: 0,
            batch_total: 1,
            success: false,
            error: Some(error),
        },
    )
    .await;
    worker
        .kv
        .publish_progress(&ProgressEvent::new(task_id, TaskStatus::Failed, 100))
        .await
        .ok();
}

fn mime_guess(filename: &str) -> Result<&'static str, ()> {
    Ok(match filename.rsplit('.').next().unwrap_or_default() {
        "pdf" => "application/pdf",
        "html" | "htm" => "text/html",
        "md" => "text/markdown",
        _ => "text/plain",
    })
}
