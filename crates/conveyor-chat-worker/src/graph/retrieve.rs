//! Adaptive two-stage retrieval (§4.5.3): stage 1 first, escalate to a
//! wider stage 2 only when stage-1 confidence is below threshold.

use conveyor_shared::retrieval::{mean_score, search_with_timeout, RetrievalCache};

use crate::state::ChatState;
use crate::ChatWorkerState;

pub async fn run(worker: &ChatWorkerState, state: &mut ChatState) {
    let collection = format!("bot_{}", state.bot_id.simple());
    let query_text = state
        .reflection
        .as_ref()
        .map(|r| r.rewritten_query.clone())
        .unwrap_or_else(|| state.query.clone());

    let Ok(vector) = worker.embedder.embed(&query_text).await else {
        state.retrieved = Vec::new();
        return;
    };

    let top_k = worker.config.retrieval.stage1_top_k;
    let rerank_n = worker.config.retrieval.stage1_rerank_n;
    let threshold = worker.config.retrieval.confidence_threshold;

    let cache_key = RetrievalCache::key(&collection, &query_text, top_k, None);
    if let Some(cached) = worker.retrieval_cache.get(&cache_key).await {
        state.retrieved = cached;
        state.retrieval_stage = Some("stage1");
        return;
    }

    let stage1 = search_with_timeout(async {
        let hits = worker
            .vector_store
            .search(&collection, &vector, top_k)
            .await?;
        worker.reranker.rerank(&query_text, hits, rerank_n).await
    })
    .await;

    if mean_score(&stage1) >= threshold {
        worker.retrieval_cache.put(cache_key, stage1.clone()).await;
        state.retrieved = stage1;
        state.retrieval_stage = Some("stage1");
        return;
    }

    let stage2_top_k = worker.config.retrieval.stage2_top_k;
    let stage2_rerank_n = worker.config.retrieval.stage2_rerank_n;
    let stage2 = search_with_timeout(async {
        let hits = worker
            .vector_store
            .search(&collection, &vector, stage2_top_k)
            .await?;
        worker
            .reranker
            .rerank(&query_text, hits, stage2_rerank_n)
            .await
    })
    .await;

    let cache_key2 = RetrievalCache::key(&collection, &query_text, stage2_top_k, None);
    worker.retrieval_cache.put(cache_key2, stage2.clone()).await;
    state.retrieved = stage2;
    state.retrieval_stage = Some("stage2");
}
