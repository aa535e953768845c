//! Signed webhook delivery back to the gateway, with capped exponential
//! backoff on transient failures (§6.3).

use conveyor_shared::webhook::{self, SIGNATURE_HEADER};
use serde::Serialize;
use std::time::Duration;
use tracing::warn;

pub async fn post<T: Serialize>(
    client: &reqwest::Client,
    base_url: &str,
    path: &str,
    secret: &str,
    payload: &T,
) {
    let body = match serde_json::to_vec(payload) {
        Ok(b) => b,
        Err(err) => {
            warn!(%err, "failed to serialize webhook payload");
            return;
        }
    };
    let Ok(signature) = webhook::sign(secret, &body) else {
        warn!("failed to sign webhook payload");
        return;
    };

    let url = format!("{base_url}{path}");
    let mut delay = Duration::from_millis(500);
    for attempt in 0..5 {
        let result = client
            .post(&url)
            .header(SIGNATURE_HEADER, &signature)
            .body(body.clone())
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => return,
            _ if attempt < 4 => {
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            _ => warn!(url = %url, "webhook delivery failed after retries"),
        }
    }
}
