use thiserror::Error;

use crate::pipeline::CycleStage;
use crate::store::StoreError;

/// Failures a cycle can run into. Only `Persistence` ever aborts a cycle;
/// the rest are recovered where they occur and surface here for logging.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("ingestion failed: {0}")]
    Ingest(String),

    #[error("enrichment failed for {item_id}: {reason}")]
    Enrichment { item_id: String, reason: String },

    #[error("persistence failed while {stage}: {source}")]
    Persistence {
        stage: CycleStage,
        #[source]
        source: StoreError,
    },

    #[error("dispatch failed: {0}")]
    Dispatch(String),
}

impl PipelineError {
    pub fn persistence(stage: CycleStage, source: StoreError) -> Self {
        PipelineError::Persistence { stage, source }
    }
}
