// src/watermark.rs
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use crate::notice::Notice;

/// What to do with notices already published when the process boots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BootPolicy {
    /// Seed the watermark to the boot instant: only notices published after
    /// start-up are delivered.
    #[default]
    Suppress,
    /// Start one poll interval in the past and deliver that window.
    Deliver,
}

/// Highest notice already processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Watermark {
    pub last_seen_id: Option<i64>,
    pub last_seen_at: Option<DateTime<Utc>>,
}

/// In-memory dedup state owned by the poller. Never persisted.
///
/// - `filter_new` keeps notices with `id > last_seen_id`, oldest first.
/// - `advance` only moves forward; an older notice never lowers the mark.
#[derive(Debug, Clone)]
pub struct WatermarkTracker {
    mark: Watermark,
    initial_bound: DateTime<Utc>,
}

impl WatermarkTracker {
    pub fn new(policy: BootPolicy, started_at: DateTime<Utc>, lookback: ChronoDuration) -> Self {
        let initial_bound = match policy {
            BootPolicy::Suppress => started_at,
            BootPolicy::Deliver => started_at - lookback,
        };
        Self {
            mark: Watermark::default(),
            initial_bound,
        }
    }

    pub fn watermark(&self) -> Watermark {
        self.mark
    }

    /// Lower bound for the next store query.
    pub fn lower_bound(&self) -> DateTime<Utc> {
        self.mark.last_seen_at.unwrap_or(self.initial_bound)
    }

    /// Notices not yet processed, sorted by ascending id, duplicates removed.
    pub fn filter_new(&self, notices: Vec<Notice>) -> Vec<Notice> {
        let mut fresh: Vec<Notice> = notices
            .into_iter()
            .filter(|n| self.mark.last_seen_id.map_or(true, |last| n.id > last))
            .collect();
        fresh.sort_by_key(|n| n.id);
        fresh.dedup_by_key(|n| n.id);
        fresh
    }

    /// Record `notice` as processed, whether or not delivery succeeded.
    pub fn advance(&mut self, notice: &Notice) {
        if self.mark.last_seen_id.map_or(true, |last| notice.id > last) {
            self.mark.last_seen_id = Some(notice.id);
        }
        if self
            .mark
            .last_seen_at
            .map_or(true, |at| notice.published_at > at)
        {
            self.mark.last_seen_at = Some(notice.published_at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notice::NoticeKind;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 6, 9, 0, 0).unwrap()
    }

    fn n(id: i64, secs: i64) -> Notice {
        Notice {
            id,
            kind: NoticeKind::Announcement,
            payload: format!("notice {id}"),
            published_at: t0() + ChronoDuration::seconds(secs),
        }
    }

    #[test]
    fn boot_policy_sets_initial_bound() {
        let lookback = ChronoDuration::seconds(10);
        let s = WatermarkTracker::new(BootPolicy::Suppress, t0(), lookback);
        assert_eq!(s.lower_bound(), t0());
        let d = WatermarkTracker::new(BootPolicy::Deliver, t0(), lookback);
        assert_eq!(d.lower_bound(), t0() - lookback);
        assert_eq!(d.watermark(), Watermark::default());
    }

    #[test]
    fn filter_sorts_oldest_first_and_drops_dups() {
        let tr = WatermarkTracker::new(BootPolicy::Suppress, t0(), ChronoDuration::seconds(10));
        let out = tr.filter_new(vec![n(9, 3), n(7, 1), n(9, 3), n(8, 2)]);
        let ids: Vec<i64> = out.iter().map(|x| x.id).collect();
        assert_eq!(ids, vec![7, 8, 9]);
    }

    #[test]
    fn advance_is_monotone() {
        let mut tr =
            WatermarkTracker::new(BootPolicy::Suppress, t0(), ChronoDuration::seconds(10));
        tr.advance(&n(5, 5));
        tr.advance(&n(3, 2));
        assert_eq!(tr.watermark().last_seen_id, Some(5));
        assert_eq!(tr.lower_bound(), t0() + ChronoDuration::seconds(5));
        assert!(tr.filter_new(vec![n(5, 5), n(4, 4), n(1, 0)]).is_empty());
        let ids: Vec<i64> = tr
            .filter_new(vec![n(6, 6), n(5, 5)])
            .iter()
            .map(|x| x.id)
            .collect();
        assert_eq!(ids, vec![6]);
    }
}
