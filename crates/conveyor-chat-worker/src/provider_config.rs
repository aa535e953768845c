//! Shared provider-config lookup: every LLM-calling node resolves the
//! bot's provider config before selecting a rotated credential (§4.4).

use uuid::Uuid;

use crate::ChatWorkerState;

pub async fn fetch(
    worker: &ChatWorkerState,
    bot_id: Uuid,
) -> Result<conveyor_shared::domain::ProviderConfig, sqlx::Error> {
    sqlx::query_as::<_, ProviderConfigRow>(
        "SELECT pc.id, pc.bot_id, pc.provider, pc.model, pc.credentials, pc.tuning_params \
         FROM provider_configs pc JOIN bots b ON b.provider_config_id = pc.id WHERE b.id = $1",
    )
    .bind(bot_id)
    .fetch_one(&worker.db)
    .await
    .map(Into::into)
}

#[derive(sqlx::FromRow)]
struct ProviderConfigRow {
    id: Uuid,
    bot_id: Uuid,
    provider: String,
    model: String,
    credentials: serde_json::Value,
    tuning_params: serde_json::Value,
}

impl From<ProviderConfigRow> for conveyor_shared::domain::ProviderConfig {
    fn from(row: ProviderConfigRow) -> Self {
        Self {
            id: row.id,
            bot_id: row.bot_id,
            provider: row.provider,
            model: row.model,
            credentials: serde_json::from_value(row.credentials).unwrap_or_default(),
            tuning_params: row.tuning_params,
        }
    }
}
