// src/notify/onebot.rs
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::DeliverySink;
use crate::config::{OneBotConfig, MAX_ONEBOT_RETRIES};
use crate::error::{RelayError, Result};

/// OneBot v11 HTTP API client (`/send_group_msg`).
///
/// Each message is retried with exponential backoff up to `max_retries`
/// attempts (at most `MAX_ONEBOT_RETRIES`, each wait at most `MAX_BACKOFF`);
/// after that the failure is reported and the caller moves on.
#[derive(Clone)]
pub struct OneBotSink {
    api_url: String,
    access_token: Option<String>,
    client: Client,
    timeout: Duration,
    max_retries: u8,
    backoff_base: Duration,
}

pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Wait before retry number `attempt` (1-based): `base * 2^(attempt-1)`, capped.
fn backoff_delay(base: Duration, attempt: u8) -> Duration {
    let factor = 1u32
        .checked_shl(u32::from(attempt.saturating_sub(1)))
        .unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(MAX_BACKOFF)
}

#[derive(Serialize)]
struct SendGroupMsg<'a> {
    group_id: i64,
    message: &'a str,
}

#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    retcode: i64,
}

impl OneBotSink {
    pub fn new(api_url: String) -> Self {
        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            access_token: None,
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
            backoff_base: Duration::from_millis(500),
        }
    }

    /// Build from config; `None` when no API URL is configured.
    pub fn from_config(cfg: &OneBotConfig) -> Option<Self> {
        let url = cfg.api_url.clone()?;
        let mut sink = Self::new(url)
            .with_timeout(cfg.timeout_secs)
            .with_retries(cfg.max_retries);
        sink.access_token = cfg.access_token.clone().filter(|t| !t.is_empty());
        Some(sink)
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs.max(1));
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.clamp(1, MAX_ONEBOT_RETRIES);
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    async fn send_once(&self, group_id: i64, text: &str) -> std::result::Result<(), String> {
        let mut req = self
            .client
            .post(format!("{}/send_group_msg", self.api_url))
            .timeout(self.timeout)
            .json(&SendGroupMsg {
                group_id,
                message: text,
            });
        if let Some(token) = &self.access_token {
            req = req.bearer_auth(token);
        }

        let rsp = req.send().await.map_err(|e| format!("request failed: {e}"))?;
        let rsp = rsp
            .error_for_status()
            .map_err(|e| format!("HTTP error: {e}"))?;
        let body: ApiResponse = rsp
            .json()
            .await
            .map_err(|e| format!("bad response body: {e}"))?;
        if body.status == "failed" || body.retcode != 0 {
            return Err(format!(
                "API rejected message (status={}, retcode={})",
                body.status, body.retcode
            ));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl DeliverySink for OneBotSink {
    async fn deliver(&self, destination: i64, text: &str) -> Result<()> {
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            match self.send_once(destination, text).await {
                Ok(()) => return Ok(()),
                Err(reason) => {
                    if attempt < self.max_retries {
                        tracing::debug!(target: "notify", destination, attempt, %reason, "send_group_msg failed, retrying");
                        tokio::time::sleep(backoff_delay(self.backoff_base, attempt)).await;
                        continue;
                    }
                    return Err(RelayError::DeliveryFailed {
                        destination,
                        reason,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_then_caps() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(500));
        assert_eq!(backoff_delay(base, 2), Duration::from_secs(1));
        assert_eq!(backoff_delay(base, 4), Duration::from_secs(4));
        assert_eq!(backoff_delay(base, 10), MAX_BACKOFF);
        assert_eq!(backoff_delay(base, u8::MAX), MAX_BACKOFF);
        assert_eq!(backoff_delay(Duration::ZERO, 200), Duration::ZERO);
    }

    #[test]
    fn retries_are_clamped() {
        let sink = OneBotSink::new("http://127.0.0.1:5700".into()).with_retries(40);
        assert_eq!(sink.max_retries, MAX_ONEBOT_RETRIES);
        let sink = sink.with_retries(0);
        assert_eq!(sink.max_retries, 1);
    }
}
