// src/gate.rs
use metrics::gauge;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::metrics::BROADCAST_ENABLED;

/// Outcome of an enable/disable request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateChange {
    Changed,
    Unchanged,
}

/// Operator-controlled switch deciding whether new notices are delivered.
///
/// Cheap to clone; all clones share the same flag. The poller reads it once
/// per cycle, command handlers write it.
#[derive(Debug, Clone)]
pub struct BroadcastGate {
    enabled: Arc<AtomicBool>,
}

impl BroadcastGate {
    pub fn new(enabled: bool) -> Self {
        gauge!(BROADCAST_ENABLED).set(if enabled { 1.0 } else { 0.0 });
        Self {
            enabled: Arc::new(AtomicBool::new(enabled)),
        }
    }

    pub fn get(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Store `enabled`; reports whether the value actually changed.
    pub fn set(&self, enabled: bool) -> GateChange {
        let prev = self.enabled.swap(enabled, Ordering::AcqRel);
        gauge!(BROADCAST_ENABLED).set(if enabled { 1.0 } else { 0.0 });
        if prev == enabled {
            GateChange::Unchanged
        } else {
            tracing::info!(target: "gate", enabled, "broadcast gate changed");
            GateChange::Changed
        }
    }

    pub fn enable(&self) -> GateChange {
        self.set(true)
    }

    pub fn disable(&self) -> GateChange {
        self.set(false)
    }
}
