use conveyor_shared::domain::LeadCategory;
use conveyor_shared::errors::ConveyorResult;
use conveyor_shared::webhook_payloads::{
    AssessmentWebhook, ChatCompletionPayload, CrawlWebhook, FileBatchWebhook, GradingWebhook,
};

use crate::state::AppState;

pub async fn persist_chat_completion(
    state: &AppState,
    payload: &ChatCompletionPayload,
) -> ConveyorResult<()> {
    sqlx::query(
        "INSERT INTO chat_messages (id, session_id, query, response, created_at) \
         SELECT gen_random_uuid(), id, $2, $3, now() FROM chat_sessions WHERE token = $1",
    )
    .bind(&payload.session_token)
    .bind(&payload.query)
    .bind(&payload.response)
    .execute(&state.db)
    .await?;

    sqlx::query(
        "UPDATE chat_sessions SET long_term_memory = $2, is_contact = is_contact OR $3 \
         WHERE token = $1",
    )
    .bind(&payload.session_token)
    .bind(&payload.long_term_memory)
    .bind(payload.is_contact)
    .execute(&state.db)
    .await?;

    if payload.extracted_info.name.is_some()
        || payload.extracted_info.email.is_some()
        || payload.extracted_info.phone.is_some()
        || payload.extracted_info.address.is_some()
    {
        sqlx::query(
            "UPDATE visitors SET \
             name = COALESCE($2, name), \
             email = COALESCE($3, email), \
             phone = COALESCE($4, phone), \
             address = COALESCE($5, address) \
             WHERE id = $1",
        )
        .bind(payload.visitor_id)
        .bind(&payload.extracted_info.name)
        .bind(&payload.extracted_info.email)
        .bind(&payload.extracted_info.phone)
        .bind(&payload.extracted_info.address)
        .execute(&state.db)
        .await?;
    }

    Ok(())
}

pub async fn persist_file_batch(state: &AppState, payload: &FileBatchWebhook) -> ConveyorResult<()> {
    let status = if payload.success { "processing" } else { "failed" };
    sqlx::query("UPDATE documents SET status = $2 WHERE id = $1")
        .bind(payload.document_id)
        .bind(status)
        .execute(&state.db)
        .await?;
    Ok(())
}

pub async fn persist_crawl(state: &AppState, payload: &CrawlWebhook) -> ConveyorResult<()> {
    sqlx::query(
        "UPDATE documents SET status = 'completed', metadata = $2 \
         WHERE bot_id = $1 AND source->>'type' = 'crawl'",
    )
    .bind(payload.bot_id)
    .bind(serde_json::json!({
        "pages_fetched": payload.pages_fetched,
        "pages_failed": payload.pages_failed,
        "page_results": payload.page_results,
    }))
    .execute(&state.db)
    .await?;
    Ok(())
}

pub async fn persist_grading(state: &AppState, payload: &GradingWebhook) -> ConveyorResult<()> {
    let thresholds = &state.config.scoring;
    let category = LeadCategory::from_score(
        payload.score,
        thresholds.hot_threshold,
        thresholds.warm_threshold,
    );
    sqlx::query(
        "UPDATE visitors SET lead_score = $2, lead_category = $3 WHERE id = $1",
    )
    .bind(payload.visitor_id)
    .bind(payload.score)
    .bind(format!("{category:?}").to_lowercase())
    .execute(&state.db)
    .await?;
    Ok(())
}

pub async fn persist_assessment(state: &AppState, payload: &AssessmentWebhook) -> ConveyorResult<()> {
    sqlx::query(
        "UPDATE visitors SET lead_score = $2, assessment = $3 WHERE id = $1",
    )
    .bind(payload.visitor_id)
    .bind(payload.lead_score)
    .bind(serde_json::json!({
        "results": payload.results,
        "summary": payload.summary,
    }))
    .execute(&state.db)
    .await?;
    Ok(())
}
