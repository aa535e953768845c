//! Per-component circuit breaker thresholds with a global fallback.

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub cooldown_secs: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            cooldown_secs: 30,
        }
    }
}

impl CircuitBreakerSettings {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerComponentConfig {
    pub default: CircuitBreakerSettings,
    pub database: Option<CircuitBreakerSettings>,
    pub llm_provider: Option<CircuitBreakerSettings>,
    pub vector_store: Option<CircuitBreakerSettings>,
}

impl Default for CircuitBreakerComponentConfig {
    fn default() -> Self {
        Self {
            default: CircuitBreakerSettings::default(),
            database: None,
            llm_provider: None,
            vector_store: None,
        }
    }
}

impl CircuitBreakerComponentConfig {
    pub fn for_database(&self) -> &CircuitBreakerSettings {
        self.database.as_ref().unwrap_or(&self.default)
    }

    pub fn for_llm_provider(&self) -> &CircuitBreakerSettings {
        self.llm_provider.as_ref().unwrap_or(&self.default)
    }

    pub fn for_vector_store(&self) -> &CircuitBreakerSettings {
        self.vector_store.as_ref().unwrap_or(&self.default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_default_when_unset() {
        let cfg = CircuitBreakerComponentConfig::default();
        assert_eq!(cfg.for_database().failure_threshold, 5);
    }

    #[test]
    fn component_override_wins() {
        let mut cfg = CircuitBreakerComponentConfig::default();
        cfg.llm_provider = Some(CircuitBreakerSettings {
            failure_threshold: 3,
            success_threshold: 1,
            cooldown_secs: 15,
        });
        assert_eq!(cfg.for_llm_provider().failure_threshold, 3);
        assert_eq!(cfg.for_database().failure_threshold, 5);
    }
}
