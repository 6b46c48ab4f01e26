// src/notice/mod.rs
//! Notice data model shared by the store adapter, formatter and poller.

pub mod format;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use format::{decode_payload, format_notice, format_notice_with};
pub use store::{GameCatalog, NoticeSource, PgNoticeStore};

/// Kind of game notice, keyed by the upstream integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoticeKind {
    Announcement,
    FirstBlood,
    SecondBlood,
    ThirdBlood,
    HintUpdate,
    NewChallenge,
    /// Any code this bot does not know about. Rendered with a generic label.
    Unknown(i32),
}

impl NoticeKind {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => NoticeKind::Announcement,
            1 => NoticeKind::FirstBlood,
            2 => NoticeKind::SecondBlood,
            3 => NoticeKind::ThirdBlood,
            4 => NoticeKind::HintUpdate,
            5 => NoticeKind::NewChallenge,
            other => NoticeKind::Unknown(other),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            NoticeKind::Announcement => 0,
            NoticeKind::FirstBlood => 1,
            NoticeKind::SecondBlood => 2,
            NoticeKind::ThirdBlood => 3,
            NoticeKind::HintUpdate => 4,
            NoticeKind::NewChallenge => 5,
            NoticeKind::Unknown(c) => c,
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            NoticeKind::Announcement => "📢",
            NoticeKind::FirstBlood => "🥇",
            NoticeKind::SecondBlood => "🥈",
            NoticeKind::ThirdBlood => "🥉",
            NoticeKind::HintUpdate => "💡",
            NoticeKind::NewChallenge => "🆕",
            NoticeKind::Unknown(_) => "❓",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            NoticeKind::Announcement => "Announcement",
            NoticeKind::FirstBlood => "First Blood",
            NoticeKind::SecondBlood => "Second Blood",
            NoticeKind::ThirdBlood => "Third Blood",
            NoticeKind::HintUpdate => "Hint Update",
            NoticeKind::NewChallenge => "New Challenge Released",
            NoticeKind::Unknown(_) => "Unknown",
        }
    }

    /// Kinds whose payload names a challenge and can be enriched with its category.
    pub fn refers_to_challenge(self) -> bool {
        matches!(
            self,
            NoticeKind::FirstBlood
                | NoticeKind::SecondBlood
                | NoticeKind::ThirdBlood
                | NoticeKind::HintUpdate
                | NoticeKind::NewChallenge
        )
    }
}

/// One row of the upstream notice table. Read-only from this crate's side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub id: i64,
    pub kind: NoticeKind,
    /// Raw `Values` column: either plain text or a JSON array of strings.
    pub payload: String,
    pub published_at: DateTime<Utc>,
}

/// Challenge record used to enrich blood / release notices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub title: String,
    pub category: i32,
}

impl Challenge {
    pub fn category_label(&self) -> &'static str {
        match self.category {
            0 => "Misc",
            1 => "Crypto",
            2 => "Pwn",
            3 => "Web",
            4 => "Reverse",
            5 => "Blockchain",
            6 => "Forensics",
            7 => "Hardware",
            8 => "Mobile",
            9 => "PPC",
            10 => "AI",
            11 => "Pentest",
            12 => "OSINT",
            _ => "Unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_roundtrip_and_unknown_is_kept() {
        for code in 0..=5 {
            assert_eq!(NoticeKind::from_code(code).code(), code);
        }
        assert_eq!(NoticeKind::from_code(42), NoticeKind::Unknown(42));
        assert_eq!(NoticeKind::from_code(-1).label(), "Unknown");
    }

    #[test]
    fn category_table() {
        let c = Challenge {
            title: "baby-web".into(),
            category: 3,
        };
        assert_eq!(c.category_label(), "Web");
        let odd = Challenge {
            title: "x".into(),
            category: 99,
        };
        assert_eq!(odd.category_label(), "Unknown");
    }
}
