mod bus;
mod envelope;
mod router;

pub use bus::{AmqpBus, Delivery, InMemoryBus, MessageBus, MessageBusBehavior, QueueStats};
pub use envelope::{TaskEnvelope, TaskPayload};
pub use router::{dlq_name, validate_queue_name, KNOWN_QUEUES};
