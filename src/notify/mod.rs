// src/notify/mod.rs
//! Outbound chat transport: where finished notice messages go.

pub mod onebot;

use std::collections::HashSet;
use std::sync::Mutex;

use crate::error::{RelayError, Result};

pub use onebot::OneBotSink;

/// Chat transport seen by the poller and the command layer.
#[async_trait::async_trait]
pub trait DeliverySink: Send + Sync {
    /// Place `text` in front of the users of `destination` (a group id).
    async fn deliver(&self, destination: i64, text: &str) -> Result<()>;
}

/// Dry-run sink: logs every message instead of sending it.
#[derive(Debug, Clone, Default)]
pub struct LogSink;

#[async_trait::async_trait]
impl DeliverySink for LogSink {
    async fn deliver(&self, destination: i64, text: &str) -> Result<()> {
        tracing::info!(target: "notify", destination, text, "dry-run delivery");
        Ok(())
    }
}

/// In-memory sink that records every call. Destinations listed in
/// `failing` reject delivery (the call is still recorded).
#[derive(Debug, Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<(i64, String)>>,
    failing: Mutex<HashSet<i64>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, destination: i64, fail: bool) {
        let mut f = self.failing.lock().expect("sink mutex poisoned");
        if fail {
            f.insert(destination);
        } else {
            f.remove(&destination);
        }
    }

    pub fn calls(&self) -> Vec<(i64, String)> {
        self.calls.lock().expect("sink mutex poisoned").clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("sink mutex poisoned").len()
    }
}

#[async_trait::async_trait]
impl DeliverySink for RecordingSink {
    async fn deliver(&self, destination: i64, text: &str) -> Result<()> {
        self.calls
            .lock()
            .expect("sink mutex poisoned")
            .push((destination, text.to_string()));
        if self
            .failing
            .lock()
            .expect("sink mutex poisoned")
            .contains(&destination)
        {
            return Err(RelayError::DeliveryFailed {
                destination,
                reason: "rejected by recording sink".into(),
            });
        }
        Ok(())
    }
}
