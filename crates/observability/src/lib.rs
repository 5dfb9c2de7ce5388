use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, histogram};
use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceCell<()> = OnceCell::new();

/// Process-wide counters. Every update is mirrored to the `metrics` facade so an
/// installed recorder (if any) sees the same numbers as `/health`.
#[derive(Debug, Default)]
pub struct AppMetrics {
    queries_total: AtomicU64,
    clarifications_total: AtomicU64,
    degraded_total: AtomicU64,
    external_failures_total: AtomicU64,
    recognition_failures_total: AtomicU64,
    synthesis_failures_total: AtomicU64,
    cache_hits_total: AtomicU64,
    total_latency_millis: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub queries_total: u64,
    pub clarifications_total: u64,
    pub degraded_total: u64,
    pub external_failures_total: u64,
    pub recognition_failures_total: u64,
    pub synthesis_failures_total: u64,
    pub cache_hits_total: u64,
    pub avg_latency_millis: f64,
}

impl AppMetrics {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_query(&self, intent: &'static str) {
        self.queries_total.fetch_add(1, Ordering::Relaxed);
        counter!("aura_queries_total", "intent" => intent).increment(1);
    }

    pub fn inc_clarification(&self) {
        self.clarifications_total.fetch_add(1, Ordering::Relaxed);
        counter!("aura_clarifications_total").increment(1);
    }

    pub fn inc_degraded(&self) {
        self.degraded_total.fetch_add(1, Ordering::Relaxed);
        counter!("aura_degraded_answers_total").increment(1);
    }

    pub fn inc_external_failure(&self, source: &'static str) {
        self.external_failures_total.fetch_add(1, Ordering::Relaxed);
        counter!("aura_external_failures_total", "source" => source).increment(1);
    }

    pub fn inc_recognition_failure(&self) {
        self.recognition_failures_total
            .fetch_add(1, Ordering::Relaxed);
        counter!("aura_recognition_failures_total").increment(1);
    }

    pub fn inc_synthesis_failure(&self) {
        self.synthesis_failures_total.fetch_add(1, Ordering::Relaxed);
        counter!("aura_synthesis_failures_total").increment(1);
    }

    pub fn inc_cache_hit(&self) {
        self.cache_hits_total.fetch_add(1, Ordering::Relaxed);
        counter!("aura_lookup_cache_hits_total").increment(1);
    }

    pub fn observe_latency(&self, duration: Duration) {
        self.total_latency_millis
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
        histogram!("aura_query_latency_seconds").record(duration.as_secs_f64());
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let queries = self.queries_total.load(Ordering::Relaxed);
        let latency = self.total_latency_millis.load(Ordering::Relaxed);

        MetricsSnapshot {
            queries_total: queries,
            clarifications_total: self.clarifications_total.load(Ordering::Relaxed),
            degraded_total: self.degraded_total.load(Ordering::Relaxed),
            external_failures_total: self.external_failures_total.load(Ordering::Relaxed),
            recognition_failures_total: self.recognition_failures_total.load(Ordering::Relaxed),
            synthesis_failures_total: self.synthesis_failures_total.load(Ordering::Relaxed),
            cache_hits_total: self.cache_hits_total.load(Ordering::Relaxed),
            avg_latency_millis: if queries == 0 {
                0.0
            } else {
                latency as f64 / queries as f64
            },
        }
    }
}

pub fn init_tracing(service_name: &str) {
    TRACING_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}=info,aura_pipeline=info,aura_api=info,aura_providers=info",
                service_name
            ))
        });

        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .with_span_list(true)
            .init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averages_latency_over_queries() {
        let metrics = AppMetrics::default();
        assert_eq!(metrics.snapshot().avg_latency_millis, 0.0);

        metrics.inc_query("nearest_stop");
        metrics.inc_query("route");
        metrics.observe_latency(Duration::from_millis(30));
        metrics.observe_latency(Duration::from_millis(50));
        metrics.inc_degraded();
        metrics.inc_external_failure("routing");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.queries_total, 2);
        assert_eq!(snapshot.degraded_total, 1);
        assert_eq!(snapshot.external_failures_total, 1);
        assert_eq!(snapshot.avg_latency_millis, 40.0);
    }
}
