// src/notice/store.rs
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, instrument};

use super::{Challenge, Notice, NoticeKind};
use crate::error::{RelayError, Result};

/// Read side of the upstream notice table.
#[async_trait::async_trait]
pub trait NoticeSource: Send + Sync {
    /// Notices published strictly after `lower_bound`, newest first.
    /// An empty vector is a normal result, not an error.
    async fn fetch_notices_since(&self, lower_bound: DateTime<Utc>) -> Result<Vec<Notice>>;
    fn name(&self) -> &'static str;
}

/// Game metadata lookups used by chat commands and notice enrichment.
#[async_trait::async_trait]
pub trait GameCatalog: Send + Sync {
    async fn game_title(&self) -> Result<String>;
    async fn challenge_by_name(&self, name: &str) -> Result<Option<Challenge>>;
}

const NOTICES_SINCE_SQL: &str = r#"
SELECT gn."Id", gn."Type", gn."Values", gn."PublishTimeUtc"
FROM "GameNotices" gn
WHERE gn."GameId" = $1
  AND gn."PublishTimeUtc" > $2
ORDER BY gn."PublishTimeUtc" DESC
"#;

const GAME_TITLE_SQL: &str = r#"SELECT "Title" FROM "Games" WHERE "Id" = $1"#;

const CHALLENGE_BY_NAME_SQL: &str = r#"
SELECT gc."Title", gc."Category"
FROM "GameChallenges" gc
WHERE gc."GameId" = $1 AND gc."Title" = $2
LIMIT 1
"#;

/// Postgres adapter for the competition platform's tables.
///
/// The pool is connected lazily; every query borrows one connection for the
/// duration of the call and returns it when the call ends.
#[derive(Clone)]
pub struct PgNoticeStore {
    pool: PgPool,
    game_id: i32,
    timeout: Duration,
}

impl PgNoticeStore {
    pub fn connect_lazy(
        dsn: &str,
        game_id: i32,
        max_connections: u32,
        timeout: Duration,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(timeout)
            .connect_lazy(dsn)?;
        Ok(Self {
            pool,
            game_id,
            timeout,
        })
    }

    /// Bound a query by the store timeout and map failures to `StoreUnavailable`.
    async fn bounded<T, F>(&self, what: &str, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(res) => res.map_err(|e| RelayError::StoreUnavailable(format!("{what}: {e}"))),
            Err(_) => Err(RelayError::StoreUnavailable(format!(
                "{what}: timed out after {:?}",
                self.timeout
            ))),
        }
    }
}

fn notice_from_row(row: &PgRow) -> std::result::Result<Notice, sqlx::Error> {
    let id: i32 = row.try_get("Id")?;
    let code: i32 = row.try_get("Type")?;
    let payload: Option<String> = row.try_get("Values")?;
    let published_at: DateTime<Utc> = row.try_get("PublishTimeUtc")?;
    Ok(Notice {
        id: i64::from(id),
        kind: NoticeKind::from_code(code),
        payload: payload.unwrap_or_default(),
        published_at,
    })
}

#[async_trait::async_trait]
impl NoticeSource for PgNoticeStore {
    #[instrument(skip(self), target = "store")]
    async fn fetch_notices_since(&self, lower_bound: DateTime<Utc>) -> Result<Vec<Notice>> {
        let rows = self
            .bounded(
                "fetch notices",
                sqlx::query(NOTICES_SINCE_SQL)
                    .bind(self.game_id)
                    .bind(lower_bound)
                    .fetch_all(&self.pool),
            )
            .await?;

        let notices = rows
            .iter()
            .map(notice_from_row)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| RelayError::StoreUnavailable(format!("decode notice row: {e}")))?;
        debug!(target: "store", count = notices.len(), "fetched notices");
        Ok(notices)
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

#[async_trait::async_trait]
impl GameCatalog for PgNoticeStore {
    async fn game_title(&self) -> Result<String> {
        let row = self
            .bounded(
                "fetch game title",
                sqlx::query(GAME_TITLE_SQL)
                    .bind(self.game_id)
                    .fetch_optional(&self.pool),
            )
            .await?;
        let row = row.ok_or_else(|| {
            RelayError::StoreUnavailable(format!("game {} not found", self.game_id))
        })?;
        row.try_get::<String, _>("Title").map_err(RelayError::from)
    }

    async fn challenge_by_name(&self, name: &str) -> Result<Option<Challenge>> {
        let row = self
            .bounded(
                "fetch challenge",
                sqlx::query(CHALLENGE_BY_NAME_SQL)
                    .bind(self.game_id)
                    .bind(name)
                    .fetch_optional(&self.pool),
            )
            .await?;
        match row {
            None => Ok(None),
            Some(r) => Ok(Some(Challenge {
                title: r.try_get("Title")?,
                category: r.try_get("Category")?,
            })),
        }
    }
}
