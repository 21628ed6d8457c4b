// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod category;
pub mod config;
pub mod enrich;
pub mod error;
pub mod ingest;
pub mod item;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod ranking;
pub mod scoring;
pub mod store;
pub mod worker;

// ---- Re-exports for stable public API ----
pub use crate::enrich::ai_adapter;
pub use crate::error::PipelineError;
pub use crate::item::{Category, Item, TrendType};
pub use crate::notify::{Digest, Dispatcher, Notifier, NotifierMux};
pub use crate::pipeline::{CycleReport, CycleStage, Pipeline};
pub use crate::store::{JsonFileStore, TrendStore};
pub use crate::worker::{CycleTrigger, TriggerOutcome, Worker, WorkerHandle};
