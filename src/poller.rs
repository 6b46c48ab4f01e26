// src/poller.rs
//! Notice broadcast poller: fetch → dedup → gate → format → deliver, on a fixed tick.

use metrics::{counter, gauge};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::gate::BroadcastGate;
use crate::metrics::{
    describe_notice_metrics, DELIVERED, DELIVERY_FAILED, POLL_CYCLES, STORE_ERRORS, SUPPRESSED,
    WATERMARK_ID,
};
use crate::notice::format::challenge_name;
use crate::notice::{format_notice_with, Challenge, GameCatalog, Notice, NoticeSource};
use crate::notify::DeliverySink;
use crate::watermark::{Watermark, WatermarkTracker};

/// What one cycle did. Counts are per message (notice × destination) for sends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub fresh: usize,
    pub delivered: usize,
    pub failed: usize,
    pub suppressed: usize,
    pub store_error: bool,
}

pub struct Poller {
    source: Arc<dyn NoticeSource>,
    sink: Arc<dyn DeliverySink>,
    catalog: Option<Arc<dyn GameCatalog>>,
    gate: BroadcastGate,
    tracker: WatermarkTracker,
    destinations: Vec<i64>,
    interval: Duration,
}

impl Poller {
    pub fn new(
        source: Arc<dyn NoticeSource>,
        sink: Arc<dyn DeliverySink>,
        gate: BroadcastGate,
        tracker: WatermarkTracker,
        destinations: Vec<i64>,
        interval: Duration,
    ) -> Self {
        describe_notice_metrics();
        if destinations.is_empty() {
            tracing::warn!(target: "poller", "no destination groups bound; notices will only advance the watermark");
        }
        Self {
            source,
            sink,
            catalog: None,
            gate,
            tracker,
            destinations,
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    /// Enrich challenge-related notices with their category.
    pub fn with_catalog(mut self, catalog: Arc<dyn GameCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn watermark(&self) -> Watermark {
        self.tracker.watermark()
    }

    async fn lookup_challenge(&self, notice: &Notice) -> Option<Challenge> {
        let catalog = self.catalog.as_ref()?;
        if !notice.kind.refers_to_challenge() {
            return None;
        }
        let name = challenge_name(&notice.payload);
        if name.is_empty() {
            return None;
        }
        match catalog.challenge_by_name(&name).await {
            Ok(found) => found,
            Err(e) => {
                tracing::debug!(target: "poller", error = %e, id = notice.id, "challenge lookup failed");
                None
            }
        }
    }

    /// One fetch-filter-gate-format-send pass.
    pub async fn run_cycle(&mut self) -> CycleReport {
        counter!(POLL_CYCLES).increment(1);
        let enabled = self.gate.get();
        let mut report = CycleReport::default();

        let lower_bound = self.tracker.lower_bound();
        let fetched = match self.source.fetch_notices_since(lower_bound).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(target: "poller", source = self.source.name(), error = %e, "notice fetch failed; retrying next tick");
                counter!(STORE_ERRORS).increment(1);
                report.store_error = true;
                return report;
            }
        };
        report.fetched = fetched.len();

        let fresh = self.tracker.filter_new(fetched);
        report.fresh = fresh.len();

        if !enabled {
            for notice in &fresh {
                self.tracker.advance(notice);
            }
            report.suppressed = fresh.len();
            counter!(SUPPRESSED).increment(fresh.len() as u64);
            if !fresh.is_empty() {
                tracing::info!(target: "poller", skipped = fresh.len(), "broadcast disabled, notices marked seen");
            }
            self.publish_watermark();
            return report;
        }

        for notice in &fresh {
            let challenge = self.lookup_challenge(notice).await;
            let text = format_notice_with(notice, challenge.as_ref());
            for &dest in &self.destinations {
                match self.sink.deliver(dest, &text).await {
                    Ok(()) => {
                        report.delivered += 1;
                        counter!(DELIVERED).increment(1);
                    }
                    Err(e) => {
                        report.failed += 1;
                        counter!(DELIVERY_FAILED).increment(1);
                        tracing::warn!(target: "poller", id = notice.id, destination = dest, error = %e, "notice delivery failed, dropping");
                    }
                }
            }
            // at-most-once: advance past the notice even if a send failed
            self.tracker.advance(notice);
        }

        if report.fresh > 0 {
            tracing::info!(
                target: "poller",
                fresh = report.fresh,
                delivered = report.delivered,
                failed = report.failed,
                last_seen_id = ?self.tracker.watermark().last_seen_id,
                "poll cycle delivered notices"
            );
        } else {
            tracing::trace!(target: "poller", fetched = report.fetched, "no new notices");
        }
        self.publish_watermark();
        report
    }

    fn publish_watermark(&self) {
        if let Some(id) = self.tracker.watermark().last_seen_id {
            gauge!(WATERMARK_ID).set(id as f64);
        }
    }

    /// Poll until `shutdown` turns true (or its sender is dropped).
    ///
    /// Cycles run inline in this loop, so they never overlap; ticks missed
    /// while a cycle runs are skipped rather than queued. A shutdown request
    /// arriving mid-cycle is observed once the cycle completes.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Watermark {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(target: "poller", interval = ?self.interval, lower_bound = %self.tracker.lower_bound(), "notice poller started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }
            self.run_cycle().await;
        }

        let mark = self.tracker.watermark();
        tracing::info!(target: "poller", last_seen_id = ?mark.last_seen_id, "notice poller stopped");
        mark
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<Watermark> {
        tokio::spawn(self.run(shutdown))
    }
}

/// Signal the poller to stop and wait up to `grace` for the in-flight cycle.
/// On timeout the task is aborted and `None` is returned.
pub async fn shutdown_within(
    mut handle: JoinHandle<Watermark>,
    shutdown: &watch::Sender<bool>,
    grace: Duration,
) -> Option<Watermark> {
    // Err only means the task already ended; the join below reports how.
    let _ = shutdown.send(true);
    match tokio::time::timeout(grace, &mut handle).await {
        Ok(Ok(mark)) => {
            tracing::info!(target: "poller", last_seen_id = ?mark.last_seen_id, "poller stopped cleanly");
            Some(mark)
        }
        Ok(Err(e)) => {
            tracing::warn!(target: "poller", error = %e, "poller task ended abnormally");
            None
        }
        Err(_) => {
            tracing::warn!(target: "poller", ?grace, "poller did not stop in time, aborting");
            handle.abort();
            None
        }
    }
}
