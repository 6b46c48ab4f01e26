//! Demo that pushes a few sample notices through one poll cycle into the log sink.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ctf_notice_bot::error::Result;
use ctf_notice_bot::notice::NoticeSource;
use ctf_notice_bot::{
    BootPolicy, BroadcastGate, LogSink, Notice, NoticeKind, Poller, WatermarkTracker,
};

struct SampleNotices(Vec<Notice>);

#[async_trait::async_trait]
impl NoticeSource for SampleNotices {
    async fn fetch_notices_since(&self, lower_bound: DateTime<Utc>) -> Result<Vec<Notice>> {
        let mut out: Vec<Notice> = self
            .0
            .iter()
            .filter(|n| n.published_at > lower_bound)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "samples"
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_target(false).init();

    let now = Utc::now();
    let samples = [
        (0, "Welcome to the game, good luck!"),
        (5, r#"["baby-rsa"]"#),
        (1, r#"["baby-rsa"]"#),
        (4, r#"["heap-master"]"#),
        (9, "future notice type"),
    ];
    let notices = samples
        .iter()
        .enumerate()
        .map(|(i, (code, payload))| Notice {
            id: i as i64 + 1,
            kind: NoticeKind::from_code(*code),
            payload: payload.to_string(),
            published_at: now - chrono::Duration::seconds(5 - i as i64),
        })
        .collect();

    let mut poller = Poller::new(
        Arc::new(SampleNotices(notices)),
        Arc::new(LogSink),
        BroadcastGate::new(true),
        WatermarkTracker::new(BootPolicy::Deliver, now, chrono::Duration::seconds(10)),
        vec![10001],
        Duration::from_secs(10),
    );

    let report = poller.run_cycle().await;
    println!("notice-demo done: {report:?}");
}
