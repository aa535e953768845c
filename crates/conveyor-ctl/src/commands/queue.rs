//! Queue depth and consumer-count inspection via passive AMQP declares.

use conveyor_shared::messaging::{MessageBus, KNOWN_QUEUES};

use crate::output;
use crate::QueueCommands;

pub(crate) async fn handle(cmd: QueueCommands, amqp_url: &str) -> anyhow::Result<()> {
    let bus = MessageBus::connect(amqp_url).await?;

    match cmd {
        QueueCommands::Stats { queue } => {
            let queues: Vec<&str> = match &queue {
                Some(q) => vec![q.as_str()],
                None => KNOWN_QUEUES.to_vec(),
            };

            output::header("Queue stats");
            for queue in queues {
                match bus.queue_stats(queue).await {
                    Ok(stats) => output::label(
                        stats.queue,
                        format!(
                            "{} messages, {} consumers",
                            stats.message_count, stats.consumer_count
                        ),
                    ),
                    Err(err) => output::warning(format!("{queue}: {err}")),
                }
            }
        }
    }

    Ok(())
}
