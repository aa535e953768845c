//! Queue naming and validation.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::{ConveyorError, ConveyorResult};

static VALID_QUEUE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("static regex is valid"));

pub const KNOWN_QUEUES: &[&str] = &[
    "file_processing_queue",
    "chat_processing_queue",
    "visitor_grading_queue",
    "email_queue",
];

/// Reject queue names containing hyphens, spaces, or anything that looks
/// like it was built by concatenating untrusted input (quotes, semicolons).
pub fn validate_queue_name(name: &str) -> ConveyorResult<()> {
    if VALID_QUEUE_NAME.is_match(name) {
        Ok(())
    } else {
        Err(ConveyorError::validation(format!(
            "invalid queue name: {name}"
        )))
    }
}

/// Every durable queue declares a dead-letter target named `<queue>_dlq`.
pub fn dlq_name(queue: &str) -> String {
    format!("{queue}_dlq")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_queues_are_valid() {
        for queue in KNOWN_QUEUES {
            assert!(validate_queue_name(queue).is_ok(), "{queue} should be valid");
        }
    }

    #[test]
    fn rejects_hyphens() {
        assert!(validate_queue_name("chat-processing-queue").is_err());
    }

    #[test]
    fn rejects_spaces_and_injection_looking_names() {
        assert!(validate_queue_name("chat queue").is_err());
        assert!(validate_queue_name("chat_queue'; DROP TABLE x; --").is_err());
    }

    #[test]
    fn dlq_name_appends_suffix() {
        assert_eq!(dlq_name("chat_processing_queue"), "chat_processing_queue_dlq");
    }
}
