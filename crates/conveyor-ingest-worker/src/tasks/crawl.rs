//! `crawl` task (§4.6): either a fixed seed list or BFS from a single
//! origin, checking `CrawlStop(bot_id)` cooperatively between pages.

use std::collections::{HashSet, VecDeque};

use conveyor_shared::kv::{ProgressEvent, TaskStatus};
use conveyor_shared::retrieval::RetrievedChunk;
use conveyor_shared::webhook_payloads::CrawlWebhook;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use crate::extract::{chunk_text, extract_text};
use crate::tasks::collection_name;
use crate::IngestWorkerState;

const CHUNK_TARGET_TOKENS: usize = 400;
const CHUNK_OVERLAP_TOKENS: usize = 40;

pub async fn run(
    worker: &IngestWorkerState,
    gateway_url: &str,
    webhook_secret: &str,
    task_id: Uuid,
    bot_id: Uuid,
    seed_urls: Vec<String>,
    bfs: bool,
    max_pages: u32,
) {
    worker.kv.clear_crawl_stop(bot_id).await.ok();
    worker
        .kv
        .publish_progress(&ProgressEvent::new(task_id, TaskStatus::Processing, 0))
        .await
        .ok();

    let max_pages = max_pages.min(worker.config.ingest.max_crawl_pages);
    let collection = collection_name(bot_id);

    let pages = if bfs {
        bfs_crawl(worker, bot_id, seed_urls, max_pages).await
    } else {
        seed_urls.into_iter().take(max_pages as usize).collect()
    };

    let mut page_results = Vec::new();
    let mut pages_fetched = 0u32;
    let mut pages_failed = 0u32;

    for (index, url) in pages.iter().enumerate() {
        if worker.kv.is_crawl_stop_set(bot_id).await.unwrap_or(false) {
            info!(bot_id = %bot_id, "crawl stopped cooperatively");
            break;
        }

        match fetch_and_index(worker, &collection, task_id, url).await {
            Ok(chunk_count) => {
                pages_fetched += 1;
                page_results.push(serde_json::json!({"url": url, "success": true, "chunks": chunk_count}));
            }
            Err(err) => {
                pages_failed += 1;
                warn!(%err, url = %url, "crawl page failed");
                page_results.push(serde_json::json!({"url": url, "success": false, "error": err}));
            }
        }

        let progress = (((index + 1) as f32 / pages.len().max(1) as f32) * 90.0) as u8;
        worker
            .kv
            .publish_progress(&ProgressEvent::new(task_id, TaskStatus::Processing, progress))
            .await
            .ok();
    }

    if let Err(err) = worker.vector_store.flush(&collection).await {
        warn!(%err, "vector collection flush failed");
    }

    crate::webhook::post(
        &worker.http,
        gateway_url,
        "/webhooks/crawl",
        webhook_secret,
        &CrawlWebhook {
            task_id,
            bot_id,
            pages_fetched,
            pages_failed,
            page_results,
        },
    )
    .await;

    let status = if pages_failed == 0 { TaskStatus::Completed } else { TaskStatus::Failed };
    worker
        .kv
        .publish_progress(&ProgressEvent::new(task_id, status, 100))
        .await
        .ok();
    info!(task_id = %task_id, pages_fetched, pages_failed, "crawl finished");
}

async fn bfs_crawl(
    worker: &IngestWorkerState,
    bot_id: Uuid,
    seeds: Vec<String>,
    max_pages: u32,
) -> Vec<String> {
    let mut visited = HashSet::new();
    let mut queue: VecDeque<String> = seeds.into_iter().collect();
    let mut ordered = Vec::new();

    while let Some(url) = queue.pop_front() {
        if ordered.len() as u32 >= max_pages {
            break;
        }
        if worker.kv.is_crawl_stop_set(bot_id).await.unwrap_or(false) {
            break;
        }
        if !visited.insert(url.clone()) {
            continue;
        }

        let links = match worker.http.get(&url).send().await {
            Ok(resp) => match resp.text().await {
                Ok(body) => extract_links(&url, &body),
                Err(_) => Vec::new(),
            },
            Err(_) => Vec::new(),
        };

        ordered.push(url);
        for link in links {
            if !visited.contains(&link) {
                queue.push_back(link);
            }
        }
    }
    ordered
}

fn extract_links(base: &str, html: &str) -> Vec<String> {
    let Ok(base_url) = Url::parse(base) else {
        return Vec::new();
    };
    let href = regex::Regex::new(r#"href\s*=\s*"([^"]+)""#).expect("static pattern");
    href.captures_iter(html)
        .filter_map(|cap| base_url.join(&cap[1]).ok())
        .filter(|u| u.host() == base_url.host())
        .map(|u| u.to_string())
        .collect()
}

async fn fetch_and_index(
    worker: &IngestWorkerState,
    collection: &str,
    document_id: Uuid,
    url: &str,
) -> Result<usize, String> {
    let resp = worker.http.get(url).send().await.map_err(|e| e.to_string())?;
    let body = resp.text().await.map_err(|e| e.to_string())?;
    let text = extract_text("page.html", body.as_bytes());
    let chunks = chunk_text(&text, CHUNK_TARGET_TOKENS, CHUNK_OVERLAP_TOKENS);

    let records: Vec<RetrievedChunk> = chunks
        .iter()
        .enumerate()
        .map(|(i, text)| RetrievedChunk {
            text: text.clone(),
            document_id: document_id.to_string(),
            web_url: Some(url.to_string()),
            chunk_index: i as i64,
            score: 0.0,
            metadata: serde_json::json!({}),
        })
        .collect();

    let count = records.len();
    worker.vector_store.insert(collection, &records).await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_links_filters_to_same_host() {
        let html = r#"<a href="/about">About</a><a href="https://other.example/x">Ext</a>"#;
        let links = extract_links("https://example.com/", html);
        assert_eq!(links, vec!["https://example.com/about"]);
    }
}
