//! Consumer loop for `file_processing_queue`, dispatching by task type and
//! bounding concurrency with a semaphore (§5 "bounded worker pool").

use std::sync::Arc;

use conveyor_shared::messaging::{MessageBus, TaskPayload};
use tokio::sync::Semaphore;
use tracing::warn;

use crate::tasks;
use crate::IngestWorkerState;

pub async fn run(
    worker: Arc<IngestWorkerState>,
    bus: MessageBus,
    queue: String,
    gateway_url: String,
    webhook_secret: String,
    prefetch: u16,
) -> conveyor_shared::errors::ConveyorResult<()> {
    let mut deliveries = bus.consume(&queue, prefetch).await?;
    let semaphore = Arc::new(Semaphore::new(worker.config.ingest.max_concurrent_tasks));

    while let Some(delivery) = deliveries.recv().await {
        let permit = semaphore.clone().acquire_owned().await.expect("semaphore not closed");
        let worker = worker.clone();
        let gateway_url = gateway_url.clone();
        let webhook_secret = webhook_secret.clone();

        tokio::spawn(async move {
            let _permit = permit;
            let envelope = delivery.envelope.clone();
            let task_id = envelope.task_id;
            let bot_id = envelope.bot_id;

            match envelope.payload {
                TaskPayload::FileUpload { scratch_path, filename } => {
                    tasks::file_upload::run(
                        &worker,
                        &gateway_url,
                        &webhook_secret,
                        task_id,
                        bot_id,
                        scratch_path,
                        filename,
                    )
                    .await;
                }
                TaskPayload::Crawl { seed_urls, bfs, max_pages } => {
                    tasks::crawl::run(
                        &worker,
                        &gateway_url,
                        &webhook_secret,
                        task_id,
                        bot_id,
                        seed_urls,
                        bfs,
                        max_pages,
                    )
                    .await;
                }
                TaskPayload::DeleteDocument { document_id } => {
                    tasks::delete_document::run(&worker, task_id, bot_id, document_id).await;
                }
                TaskPayload::Recrawl { document_ids } => {
                    tasks::recrawl::run(&worker, task_id, bot_id, document_ids).await;
                }
                other => {
                    warn!(task_id = %task_id, task_type = ?other, "unroutable payload on ingest queue");
                    delivery.nack(false).await.ok();
                    return;
                }
            }

            delivery.ack().await.ok();
        });
    }

    Ok(())
}
