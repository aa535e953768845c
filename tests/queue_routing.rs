//! End-to-end queue routing over the in-memory bus: every task payload
//! variant lands on its own queue and nowhere else, without a live broker
//! (§4.1, §13 supplement).

use conveyor_shared::messaging::{MessageBus, TaskEnvelope, TaskPayload};
use uuid::Uuid;

fn envelope(payload: TaskPayload) -> TaskEnvelope {
    TaskEnvelope::new(Uuid::new_v4(), payload)
}

#[tokio::test]
async fn file_and_chat_tasks_land_on_separate_queues() {
    let bus = MessageBus::new_in_memory();
    let mut file_rx = bus.consume("file_processing_queue", 10).await.unwrap();
    let mut chat_rx = bus.consume("chat_processing_queue", 10).await.unwrap();

    let file_task = envelope(TaskPayload::FileUpload {
        scratch_path: "/tmp/uploads/a.pdf".into(),
        filename: "a.pdf".into(),
    });
    let chat_task = envelope(TaskPayload::Chat {
        session_token: "tok-1".into(),
        query: "hello".into(),
        streaming: false,
    });

    bus.publish(file_task.queue_name(), &file_task).await.unwrap();
    bus.publish(chat_task.queue_name(), &chat_task).await.unwrap();

    let received_file = file_rx.recv().await.expect("file delivery");
    assert_eq!(received_file.envelope.task_id, file_task.task_id);
    received_file.ack().await.unwrap();

    let received_chat = chat_rx.recv().await.expect("chat delivery");
    assert_eq!(received_chat.envelope.task_id, chat_task.task_id);
    received_chat.ack().await.unwrap();

    assert!(chat_rx.try_recv().is_err(), "no cross-queue leakage");
}

#[tokio::test]
async fn grading_and_assessment_share_the_visitor_grading_queue() {
    let bus = MessageBus::new_in_memory();
    let mut rx = bus.consume("visitor_grading_queue", 10).await.unwrap();

    let visitor_id = Uuid::new_v4();
    let grading = envelope(TaskPayload::Grading { visitor_id });
    let assessment = envelope(TaskPayload::Assessment { visitor_id });

    bus.publish(grading.queue_name(), &grading).await.unwrap();
    bus.publish(assessment.queue_name(), &assessment).await.unwrap();

    let first = rx.recv().await.expect("grading delivery");
    let second = rx.recv().await.expect("assessment delivery");

    assert_eq!(first.envelope.task_id, grading.task_id);
    assert_eq!(second.envelope.task_id, assessment.task_id);

    first.ack().await.unwrap();
    second.ack().await.unwrap();
}

#[tokio::test]
async fn nacking_without_requeue_does_not_redeliver_in_memory() {
    let bus = MessageBus::new_in_memory();
    let mut rx = bus.consume("file_processing_queue", 10).await.unwrap();

    let task = envelope(TaskPayload::DeleteDocument {
        document_id: Uuid::new_v4(),
    });
    bus.publish(task.queue_name(), &task).await.unwrap();

    let delivery = rx.recv().await.expect("delivery");
    delivery.nack(false).await.unwrap();

    assert!(rx.try_recv().is_err(), "in-memory bus has no dlq to redeliver from");
}
