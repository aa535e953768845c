mod behavior;
mod metrics;

pub use behavior::{CircuitBreakerBehavior, CircuitState};
pub use metrics::{CircuitBreakerMetrics, MetricsCollector, TracingMetricsCollector};
