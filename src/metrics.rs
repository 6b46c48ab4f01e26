// src/metrics.rs
//! Prometheus exposition for the notice bot: metric names, their help text,
//! and the `/metrics` route.

use anyhow::Context;
use axum::{http::header, response::IntoResponse, routing::get, Router};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub const POLL_CYCLES: &str = "notice_poll_cycles_total";
pub const STORE_ERRORS: &str = "notice_store_errors_total";
pub const DELIVERED: &str = "notice_delivered_total";
pub const DELIVERY_FAILED: &str = "notice_delivery_failed_total";
pub const SUPPRESSED: &str = "notice_suppressed_total";
pub const WATERMARK_ID: &str = "notice_watermark_id";
pub const BROADCAST_ENABLED: &str = "notice_broadcast_enabled";

/// Register `# HELP` text for every series. Idempotent.
pub fn describe_notice_metrics() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(POLL_CYCLES, "Poll cycles started.");
        describe_counter!(
            STORE_ERRORS,
            "Cycles aborted because the notice store was unavailable."
        );
        describe_counter!(DELIVERED, "Messages accepted by the chat transport.");
        describe_counter!(
            DELIVERY_FAILED,
            "Messages the chat transport rejected (dropped, not retried)."
        );
        describe_counter!(
            SUPPRESSED,
            "New notices skipped because broadcast was disabled."
        );
        describe_gauge!(WATERMARK_ID, "Highest notice id processed.");
        describe_gauge!(BROADCAST_ENABLED, "1 when auto broadcast is on.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder. Call once, before the gate or
    /// the poller record anything.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        describe_notice_metrics();
        Ok(Self { handle })
    }

    /// `/metrics` in the Prometheus text format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move {
                    (
                        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
                        h.render(),
                    )
                        .into_response()
                }
            }),
        )
    }
}
