//! Optional post-generation groundedness check (§4.5.4). Feature-flagged
//! and off by default: when enabled, a judge prompt scores the response
//! against the retrieved context on 0/1/2 and regenerates a stricter
//! answer while the score stays below threshold, bounded by a loop
//! counter so a stubborn judge can't spin forever.

use conveyor_shared::llm::ChatMessage;

use crate::key_selection::SelectedCredential;
use crate::ChatWorkerState;

/// Tracks regeneration attempts to prevent infinite loops.
struct ReflectionCounter {
    max_loops: u32,
    current_count: u32,
}

impl ReflectionCounter {
    fn new(max_loops: u32) -> Self {
        Self {
            max_loops,
            current_count: 0,
        }
    }

    fn remaining(&self) -> u32 {
        self.max_loops.saturating_sub(self.current_count)
    }

    fn increment(&mut self) {
        self.current_count += 1;
    }
}

pub async fn check_and_regenerate(
    worker: &ChatWorkerState,
    credential: &SelectedCredential,
    model: &str,
    context: &str,
    response: String,
) -> String {
    let cfg = &worker.config.groundedness;
    if !cfg.enabled || context.is_empty() {
        return response;
    }

    let mut counter = ReflectionCounter::new(cfg.max_loops);
    let mut current = response;

    while counter.remaining() > 0 {
        let Some(score) = score(worker, credential, model, context, &current).await else {
            break;
        };
        counter.increment();

        if score >= cfg.threshold {
            return current;
        }
        if counter.remaining() == 0 {
            break;
        }
        match regenerate(worker, credential, model, context, &current).await {
            Some(regenerated) => current = regenerated,
            None => break,
        }
    }
    current
}

async fn score(
    worker: &ChatWorkerState,
    credential: &SelectedCredential,
    model: &str,
    context: &str,
    response: &str,
) -> Option<u8> {
    let messages = vec![
        ChatMessage::system(
            "Score how well the response is grounded in the context, on a scale \
             of 0, 1, or 2. Reply with only the digit.",
        ),
        ChatMessage::user(format!("Context: {context}\n\nResponse: {response}")),
    ];
    let result = worker.llm.complete(&credential.key, model, &messages).await.ok()?;
    for digit in ['2', '1', '0'] {
        if result.content.contains(digit) {
            return Some(digit as u8 - b'0');
        }
    }
    Some(0)
}

async fn regenerate(
    worker: &ChatWorkerState,
    credential: &SelectedCredential,
    model: &str,
    context: &str,
    response: &str,
) -> Option<String> {
    let messages = vec![
        ChatMessage::system(
            "You are a helpful assistant. Generate a response that is grounded in \
             the provided context. Use only information explicitly supported by \
             the context.",
        ),
        ChatMessage::user(format!(
            "Context: {context}\n\nPrevious response (not grounded): {response}\n\n\
             Generate a new, more grounded response:"
        )),
    ];
    worker
        .llm
        .complete(&credential.key, model, &messages)
        .await
        .ok()
        .map(|r| r.content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_remaining_never_goes_negative() {
        let mut counter = ReflectionCounter::new(1);
        counter.increment();
        counter.increment();
        assert_eq!(counter.remaining(), 0);
    }
}
