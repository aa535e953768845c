//! Consumer loop for `visitor_grading_queue`: dispatches grading and
//! assessment tasks to the shared pipeline.

use std::sync::Arc;

use conveyor_shared::messaging::{MessageBus, TaskPayload};
use tracing::warn;

use crate::pipeline;
use crate::ScoringWorkerState;

pub async fn run(
    worker: Arc<ScoringWorkerState>,
    bus: MessageBus,
    queue: String,
    gateway_url: String,
    webhook_secret: String,
    prefetch: u16,
) -> conveyor_shared::errors::ConveyorResult<()> {
    let mut deliveries = bus.consume(&queue, prefetch).await?;

    while let Some(delivery) = deliveries.recv().await {
        let envelope = delivery.envelope.clone();
        let worker = worker.clone();
        let gateway_url = gateway_url.clone();
        let webhook_secret = webhook_secret.clone();

        tokio::spawn(async move {
            let task_id = envelope.task_id;
            let bot_id = envelope.bot_id;

            match envelope.payload {
                TaskPayload::Grading { visitor_id } => {
                    pipeline::run_grading(&worker, &gateway_url, &webhook_secret, task_id, bot_id, visitor_id)
                        .await;
                }
                TaskPayload::Assessment { visitor_id } => {
                    pipeline::run_assessment(&worker, &gateway_url, &webhook_secret, task_id, bot_id, visitor_id)
                        .await;
                }
                other => {
                    warn!(task_id = %task_id, task_type = ?other, "unroutable payload on scoring queue");
                    delivery.nack(false).await.ok();
                    return;
                }
            }

            delivery.ack().await.ok();
        });
    }

    Ok(())
}
