//! Task status lookup, reading the same `TaskState` hash the gateway's SSE
//! bridge restores on reconnect (§4.2).

use conveyor_shared::kv::KvStore;

use crate::output;
use crate::TaskCommands;

pub(crate) async fn handle(cmd: TaskCommands, redis_url: &str) -> anyhow::Result<()> {
    let kv = KvStore::connect(redis_url).await?;

    match cmd {
        TaskCommands::Status { task_id } => match kv.get_task_state(task_id).await? {
            Some(state) => {
                output::header(format!("Task {task_id}"));
                output::task_status_label(state.status);
                output::label("Progress", format!("{}%", state.progress));
                if let Some(bot_id) = state.bot_id {
                    output::label("Bot", bot_id);
                }
                if let Some(message) = &state.message {
                    output::label("Message", message);
                }
                if let Some(error) = &state.error {
                    output::label("Error", error);
                }
                output::label("Updated", state.timestamp);
            }
            None => {
                output::warning(format!(
                    "no task state found for {task_id} (expired or never existed)"
                ));
            }
        },
    }

    Ok(())
}
