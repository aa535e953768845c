use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum BotStatus {
    Created,
    Active,
    Inactive,
    SoftDeleted,
}

/// A single encrypted credential entry in a [`ProviderConfig`]'s key pool.
///
/// `ciphertext` is produced by [`crate::crypto::CredentialCipher::encrypt`];
/// plaintext key material is never stored or serialized alongside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialEntry {
    pub label: String,
    pub ciphertext: String,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: Uuid,
    pub bot_id: Uuid,
    pub provider: String,
    pub model: String,
    pub credentials: Vec<CredentialEntry>,
    pub tuning_params: serde_json::Value,
}

impl ProviderConfig {
    pub fn active_credentials(&self) -> impl Iterator<Item = &CredentialEntry> {
        self.credentials.iter().filter(|c| c.active)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bot {
    pub id: Uuid,
    pub public_key: String,
    pub provider_config_id: Option<Uuid>,
    pub display_config: serde_json::Value,
    pub description: Option<String>,
    pub assessment_questions: Vec<String>,
    pub status: BotStatus,
    pub created_at: DateTime<Utc>,
}

impl Bot {
    /// Collection name derived from the bot id, per §6.5's vector-store naming rule.
    pub fn collection_name(&self) -> String {
        format!("bot_{}", self.id.simple())
    }

    /// A bot may only transition into `Active` once a provider configuration exists.
    pub fn can_activate(&self) -> bool {
        self.provider_config_id.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllowedOrigin {
    pub bot_id: Uuid,
    pub origin_url: String,
    pub crawl_seed_urls: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bot(provider_config_id: Option<Uuid>) -> Bot {
        Bot {
            id: Uuid::nil(),
            public_key: "pk".into(),
            provider_config_id,
            display_config: serde_json::json!({}),
            description: None,
            assessment_questions: vec![],
            status: BotStatus::Created,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn cannot_activate_without_provider_config() {
        assert!(!bot(None).can_activate());
        assert!(bot(Some(Uuid::new_v4())).can_activate());
    }

    #[test]
    fn collection_name_is_hyphen_free() {
        let id = Uuid::new_v4();
        let mut b = bot(None);
        b.id = id;
        assert_eq!(b.collection_name(), format!("bot_{}", id.simple()));
        assert!(!b.collection_name().contains('-'));
    }

    #[test]
    fn active_credentials_filters_inactive() {
        let cfg = ProviderConfig {
            id: Uuid::nil(),
            bot_id: Uuid::nil(),
            provider: "openai".into(),
            model: "gpt".into(),
            credentials: vec![
                CredentialEntry {
                    label: "a".into(),
                    ciphertext: "x".into(),
                    active: true,
                },
                CredentialEntry {
                    label: "b".into(),
                    ciphertext: "y".into(),
                    active: false,
                },
            ],
            tuning_params: serde_json::json!({}),
        };
        assert_eq!(cfg.active_credentials().count(), 1);
    }
}
