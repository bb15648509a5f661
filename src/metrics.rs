// src/metrics.rs
use anyhow::Context;
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("resolver_tier_attempts_total", "Fetch attempts per tier.");
        describe_counter!("resolver_tier_success_total", "Attempts that produced usable content, per tier.");
        describe_counter!(
            "resolver_provider_errors_total",
            "Rate-limit and availability failures per provider."
        );
        describe_counter!("resolver_cache_hits_total", "Content cache hits.");
        describe_counter!("resolver_cache_misses_total", "Content cache misses (incl. expired).");
        describe_counter!("resolver_not_found_total", "Loans that exhausted every candidate URL.");
        describe_histogram!("resolver_resolve_ms", "Wall time to resolve one loan in milliseconds.");
        describe_gauge!(
            "resolver_active_cooldowns",
            "Providers currently in cooldown or with an open breaker."
        );
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Installs the global Prometheus recorder. Call once per process.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        ensure_metrics_described();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
