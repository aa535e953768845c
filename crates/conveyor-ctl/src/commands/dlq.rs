//! Read-only dead-letter listing.
//!
//! Deliberately does not implement a reingest/replay command: conveyor has
//! no DLQ investigation table to attach notes or resolutions to, and
//! whether dead-lettered tasks should be replayed automatically or by hand
//! is still an open question.

use conveyor_shared::messaging::{dlq_name, MessageBus, KNOWN_QUEUES};

use crate::output;
use crate::DlqCommands;

pub(crate) async fn handle(cmd: DlqCommands, amqp_url: &str) -> anyhow::Result<()> {
    let bus = MessageBus::connect(amqp_url).await?;

    match cmd {
        DlqCommands::List => {
            output::header("Dead-letter queues");
            for queue in KNOWN_QUEUES {
                let dlq = dlq_name(queue);
                match bus.queue_stats(&dlq).await {
                    Ok(stats) if stats.message_count > 0 => {
                        output::status_icon(false, format!("{dlq}: {} dead-lettered", stats.message_count));
                    }
                    Ok(_) => output::status_icon(true, format!("{dlq}: empty")),
                    Err(err) => output::warning(format!("{dlq}: {err}")),
                }
            }
        }
        DlqCommands::Stats => {
            let mut total = 0u32;
            for queue in KNOWN_QUEUES {
                let dlq = dlq_name(queue);
                if let Ok(stats) = bus.queue_stats(&dlq).await {
                    total += stats.message_count;
                }
            }
            output::label("Total dead-lettered messages", total);
        }
    }

    Ok(())
}
