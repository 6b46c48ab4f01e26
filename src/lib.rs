// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod commands;
pub mod config;
pub mod error;
pub mod gate;
pub mod metrics;
pub mod notice;
pub mod notify;
pub mod poller;
pub mod watermark;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::error::RelayError;
pub use crate::gate::{BroadcastGate, GateChange};
pub use crate::notice::{Notice, NoticeKind};
pub use crate::notify::{DeliverySink, LogSink, OneBotSink, RecordingSink};
pub use crate::poller::{CycleReport, Poller};
pub use crate::watermark::{BootPolicy, Watermark, WatermarkTracker};
