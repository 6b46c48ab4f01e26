// tests/metrics_poller.rs
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusBuilder;

use ctf_notice_bot::error::{RelayError, Result};
use ctf_notice_bot::notice::NoticeSource;
use ctf_notice_bot::{
    BootPolicy, BroadcastGate, Notice, NoticeKind, Poller, RecordingSink, WatermarkTracker,
};

struct Flaky {
    fail: bool,
}

#[async_trait::async_trait]
impl NoticeSource for Flaky {
    async fn fetch_notices_since(&self, lower_bound: DateTime<Utc>) -> Result<Vec<Notice>> {
        if self.fail {
            return Err(RelayError::StoreUnavailable("timeout".into()));
        }
        Ok(vec![Notice {
            id: 11,
            kind: NoticeKind::ThirdBlood,
            payload: r#"["rev-2"]"#.into(),
            published_at: lower_bound + chrono::Duration::seconds(1),
        }])
    }

    fn name(&self) -> &'static str {
        "flaky"
    }
}

#[tokio::test]
async fn poller_metrics_are_exposed() {
    // Install a local recorder for this test binary
    let handle = PrometheusBuilder::new().install_recorder().expect("recorder");

    let started = Utc::now();
    let mk = |fail: bool| {
        Poller::new(
            Arc::new(Flaky { fail }),
            Arc::new(RecordingSink::new()),
            BroadcastGate::new(true),
            WatermarkTracker::new(BootPolicy::Suppress, started, chrono::Duration::seconds(10)),
            vec![1],
            Duration::from_secs(10),
        )
    };
    mk(false).run_cycle().await;
    mk(true).run_cycle().await;

    let out = handle.render();
    assert!(out.contains("notice_poll_cycles_total"), "{out}");
    assert!(out.contains("notice_delivered_total"), "{out}");
    assert!(out.contains("notice_store_errors_total"), "{out}");
    assert!(out.contains("notice_watermark_id"), "{out}");
    assert!(out.contains("notice_broadcast_enabled"), "{out}");
    assert!(
        out.contains("# HELP notice_delivered_total Messages accepted by the chat transport."),
        "{out}"
    );
}
