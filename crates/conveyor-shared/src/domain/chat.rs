use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum ChatSessionStatus {
    Active,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: Uuid,
    pub bot_id: Uuid,
    pub visitor_id: Uuid,
    pub token: String,
    pub status: ChatSessionStatus,
    pub long_term_memory: Option<String>,
    pub is_contact: bool,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl ChatSession {
    /// `- Contact Requested: Yes` is sticky for the session once set (§4.5.5).
    pub fn mark_contact_requested(&mut self) {
        self.is_contact = true;
    }

    pub fn memory_with_contact_bullet(&self) -> String {
        let base = self.long_term_memory.clone().unwrap_or_default();
        if self.is_contact && !base.contains("Contact Requested: Yes") {
            let mut joined = base;
            if !joined.is_empty() {
                joined.push('\n');
            }
            joined.push_str("- Contact Requested: Yes");
            joined
        } else {
            base
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub query: String,
    pub response: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> ChatSession {
        ChatSession {
            id: Uuid::nil(),
            bot_id: Uuid::nil(),
            visitor_id: Uuid::nil(),
            token: "tok".into(),
            status: ChatSessionStatus::Active,
            long_term_memory: Some("- likes widgets".into()),
            is_contact: false,
            created_at: Utc::now(),
            closed_at: None,
        }
    }

    #[test]
    fn contact_bullet_appended_once_sticky() {
        let mut s = session();
        s.mark_contact_requested();
        let memory = s.memory_with_contact_bullet();
        assert!(memory.contains("Contact Requested: Yes"));
        assert_eq!(memory.matches("Contact Requested: Yes").count(), 1);
    }

    #[test]
    fn no_bullet_when_not_requested() {
        let s = session();
        assert!(!s.memory_with_contact_bullet().contains("Contact Requested"));
    }
}
