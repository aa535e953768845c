use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeadCategory {
    Hot,
    Warm,
    Cold,
}

impl LeadCategory {
    /// Categorize a score using the configured hot/warm thresholds (§4.7).
    pub fn from_score(score: f32, hot_threshold: f32, warm_threshold: f32) -> Self {
        if score >= hot_threshold {
            LeadCategory::Hot
        } else if score >= warm_threshold {
            LeadCategory::Warm
        } else {
            LeadCategory::Cold
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Visitor {
    pub id: Uuid,
    pub bot_id: Uuid,
    pub client_ip: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub lead_score: Option<f32>,
    pub lead_category: Option<LeadCategory>,
    pub assessment: Option<serde_json::Value>,
    pub is_new: bool,
    pub created_at: DateTime<Utc>,
}

impl Visitor {
    /// Merge non-null extracted fields into this profile, returning a diff
    /// of the fields that actually changed (surfaced for observability by
    /// the chat graph's reflection node).
    pub fn merge_extracted_info(&mut self, info: &ExtractedVisitorInfo) -> Vec<VisitorFieldUpdate> {
        let mut updates = Vec::new();
        macro_rules! merge_field {
            ($field:ident, $name:literal) => {
                if let Some(ref new_value) = info.$field {
                    if self.$field.as_deref() != Some(new_value.as_str()) {
                        updates.push(VisitorFieldUpdate {
                            field: $name,
                            previous: self.$field.clone(),
                            new: new_value.clone(),
                        });
                        self.$field = Some(new_value.clone());
                    }
                }
            };
        }
        merge_field!(name, "name");
        merge_field!(email, "email");
        merge_field!(phone, "phone");
        merge_field!(address, "address");
        updates
    }
}

/// Contact fields the reflection node may extract from a single turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedVisitorInfo {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// One field changed by [`Visitor::merge_extracted_info`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitorFieldUpdate {
    pub field: &'static str,
    pub previous: Option<String>,
    pub new: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visitor() -> Visitor {
        Visitor {
            id: Uuid::nil(),
            bot_id: Uuid::nil(),
            client_ip: "127.0.0.1".into(),
            name: None,
            email: None,
            phone: None,
            address: None,
            lead_score: None,
            lead_category: None,
            assessment: None,
            is_new: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn category_thresholds() {
        assert_eq!(LeadCategory::from_score(90.0, 80.0, 50.0), LeadCategory::Hot);
        assert_eq!(LeadCategory::from_score(60.0, 80.0, 50.0), LeadCategory::Warm);
        assert_eq!(LeadCategory::from_score(10.0, 80.0, 50.0), LeadCategory::Cold);
    }

    #[test]
    fn merge_reports_only_changed_fields() {
        let mut v = visitor();
        let info = ExtractedVisitorInfo {
            email: Some("a@b.com".into()),
            ..Default::default()
        };
        let updates = v.merge_extracted_info(&info);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].field, "email");
        assert_eq!(updates[0].previous, None);
        assert_eq!(v.email.as_deref(), Some("a@b.com"));
    }

    #[test]
    fn merge_is_noop_when_value_unchanged() {
        let mut v = visitor();
        v.email = Some("a@b.com".into());
        let info = ExtractedVisitorInfo {
            email: Some("a@b.com".into()),
            ..Default::default()
        };
        assert!(v.merge_extracted_info(&info).is_empty());
    }
}
