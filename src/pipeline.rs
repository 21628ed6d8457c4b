//! One pipeline run: ingest, score, persist, select, enrich, dispatch, mark.
//!
//! `notified` is only ever set after a dispatcher confirmed delivery, so a
//! failed or timed-out dispatch leaves the same candidates eligible next
//! cycle. Cycles are serialized by `run_lock`; scheduled and manual runs
//! share it.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use serde::Serialize;
use tokio::sync::{watch, Mutex};

use crate::category::categorize;
use crate::config::PipelineConfig;
use crate::enrich::EnrichmentGateway;
use crate::error::PipelineError;
use crate::ingest::{self, types::TrendSource};
use crate::item::Item;
use crate::metrics::ensure_metrics_described;
use crate::notify::{render, Dispatcher};
use crate::ranking;
use crate::scoring::score_item;
use crate::store::TrendStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStage {
    #[default]
    Idle,
    Ingesting,
    Persisting,
    Selecting,
    Enriching,
    Dispatching,
    Finalizing,
}

impl CycleStage {
    pub fn as_str(self) -> &'static str {
        match self {
            CycleStage::Idle => "idle",
            CycleStage::Ingesting => "ingesting",
            CycleStage::Persisting => "persisting",
            CycleStage::Selecting => "selecting",
            CycleStage::Enriching => "enriching",
            CycleStage::Dispatching => "dispatching",
            CycleStage::Finalizing => "finalizing",
        }
    }
}

impl fmt::Display for CycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a cycle that ran to the end.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub ingested: usize,
    /// Un-notified items scored this cycle.
    pub candidates: usize,
    pub selected: usize,
    pub subject: String,
    pub delivered: bool,
    pub marked: usize,
}

/// Publishes the current stage; falls back to `Idle` however the cycle ends.
struct StageGuard<'a> {
    tx: &'a watch::Sender<CycleStage>,
}

impl<'a> StageGuard<'a> {
    fn enter(tx: &'a watch::Sender<CycleStage>) -> Self {
        Self { tx }
    }

    fn set(&self, stage: CycleStage) {
        self.tx.send_replace(stage);
        tracing::debug!(%stage, "cycle stage");
    }
}

impl Drop for StageGuard<'_> {
    fn drop(&mut self) {
        self.tx.send_replace(CycleStage::Idle);
    }
}

pub struct Pipeline {
    source: Arc<dyn TrendSource>,
    store: Arc<dyn TrendStore>,
    enrichment: EnrichmentGateway,
    dispatcher: Arc<dyn Dispatcher>,
    cfg: PipelineConfig,
    region: String,
    run_lock: Mutex<()>,
    stage_tx: watch::Sender<CycleStage>,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn TrendSource>,
        store: Arc<dyn TrendStore>,
        enrichment: EnrichmentGateway,
        dispatcher: Arc<dyn Dispatcher>,
        region: impl Into<String>,
        cfg: PipelineConfig,
    ) -> Self {
        ensure_metrics_described();
        let (stage_tx, _) = watch::channel(CycleStage::Idle);
        Self {
            source,
            store,
            enrichment,
            dispatcher,
            cfg,
            region: region.into(),
            run_lock: Mutex::new(()),
            stage_tx,
        }
    }

    pub fn store(&self) -> &Arc<dyn TrendStore> {
        &self.store
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn stage(&self) -> CycleStage {
        *self.stage_tx.borrow()
    }

    pub fn subscribe_stage(&self) -> watch::Receiver<CycleStage> {
        self.stage_tx.subscribe()
    }

    pub async fn run_cycle(&self) -> Result<CycleReport, PipelineError> {
        self.run_cycle_at(Utc::now()).await
    }

    /// Run one full cycle with `now` as the scoring clock.
    ///
    /// Only store failures abort; ingestion, enrichment and dispatch
    /// failures are absorbed and reported.
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> Result<CycleReport, PipelineError> {
        let _run = self.run_lock.lock().await;
        let t0 = Instant::now();
        let stage = StageGuard::enter(&self.stage_tx);

        stage.set(CycleStage::Ingesting);
        let mut items =
            ingest::fetch_items(self.source.as_ref(), &self.region, self.cfg.ingest_timeout())
                .await;
        let ingested = items.len();

        stage.set(CycleStage::Persisting);
        for it in items.iter_mut() {
            if it.category.is_none() {
                it.category = Some(categorize(it));
            }
            score_item(it, now);
            it.last_seen_at = Some(now);
        }
        self.store
            .upsert_all(&items)
            .await
            .map_err(|e| PipelineError::persistence(CycleStage::Persisting, e))?;
        for it in items.iter_mut() {
            it.notified = self
                .store
                .is_notified(&it.id)
                .await
                .map_err(|e| PipelineError::persistence(CycleStage::Persisting, e))?;
        }

        stage.set(CycleStage::Selecting);
        let mut batch = ranking::select(&items, self.cfg.top_k);
        gauge!("trend_candidates").set(batch.scored_count as f64);
        counter!("trend_items_selected_total").increment(batch.len() as u64);

        if !batch.is_empty() {
            stage.set(CycleStage::Enriching);
            let selected: Vec<Item> = batch.items().cloned().collect();
            let insights = self.enrichment.enrich_all(&selected).await;
            for (item, insight) in batch.items_mut().zip(insights) {
                item.viral_probability = item.viral_probability.max(insight.viral_score);
                item.insight = Some(insight);
            }
        }

        stage.set(CycleStage::Dispatching);
        let digest = render::build_digest(&batch, &self.region, now);
        let delivered = match tokio::time::timeout(
            self.cfg.dispatch_timeout(),
            self.dispatcher.dispatch(&digest),
        )
        .await
        {
            Ok(ok) => ok,
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.cfg.dispatch_timeout().as_millis() as u64,
                    "dispatch timed out"
                );
                false
            }
        };

        let mut marked = 0usize;
        if delivered {
            stage.set(CycleStage::Finalizing);
            let enriched: Vec<Item> = batch.items().cloned().collect();
            self.store
                .upsert_all(&enriched)
                .await
                .map_err(|e| PipelineError::persistence(CycleStage::Finalizing, e))?;
            for it in &enriched {
                self.store
                    .mark_notified(&it.id)
                    .await
                    .map_err(|e| PipelineError::persistence(CycleStage::Finalizing, e))?;
                marked += 1;
            }
            counter!("trend_items_notified_total").increment(marked as u64);
        } else {
            let err = PipelineError::Dispatch(format!(
                "no channel delivered '{}'; {} item(s) stay eligible",
                digest.subject,
                batch.len()
            ));
            tracing::warn!(error = %err, "digest not delivered");
            counter!("trend_dispatch_failures_total").increment(1);
        }

        let report = CycleReport {
            ingested,
            candidates: batch.scored_count,
            selected: batch.len(),
            subject: digest.subject,
            delivered,
            marked,
        };

        let elapsed_ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("trend_cycle_ms").record(elapsed_ms);
        counter!("trend_cycles_total").increment(1);
        gauge!("trend_last_cycle_ts").set(now.timestamp() as f64);

        tracing::info!(
            ingested = report.ingested,
            candidates = report.candidates,
            selected = report.selected,
            delivered = report.delivered,
            marked = report.marked,
            elapsed_ms = elapsed_ms as u64,
            "cycle finished"
        );
        Ok(report)
    }
}
