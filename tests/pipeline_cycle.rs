// tests/pipeline_cycle.rs
//
// End-to-end cycles against fake collaborators:
// - scoring + persistence of a known item
// - bounded top-K selection and at-most-once marking
// - empty ingestion still produces one "no spikes" digest
// - per-item enrichment degradation
// - dispatch failure leaves candidates eligible
// - persistence failure aborts the cycle
// - concurrent cycles are serialized

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use common::{
    pipeline, trending, FakeSource, ReadOnlyStore, RecordingDispatcher, ScriptedAi, SlowSource,
};
use trend_pulse::enrich::Insight;
use trend_pulse::notify::render::NO_SPIKES_SUBJECT;
use trend_pulse::store::ListQuery;
use trend_pulse::{
    Category, CycleStage, Item, JsonFileStore, PipelineError, TrendStore, TrendType,
};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 27, 11, 0, 0).unwrap()
}

fn tech_items(n: usize) -> Vec<Item> {
    (0..n)
        .map(|i| {
            trending(&format!("t{i}"), &format!("Gadget review {i}"), 5, 1_000 * (i as u64 + 1), now())
                .with_category_hint("28")
        })
        .collect()
}

#[tokio::test]
async fn known_item_is_scored_and_persisted() {
    let item = Item::new("v120k", "Cooking with grandma", "2025-10-27T10:00:00Z")
        .with_counters(120_000, 5_000, 800)
        .with_duration("PT15M");
    let store = Arc::new(JsonFileStore::in_memory());
    let disp = RecordingDispatcher::new(true);
    let p = pipeline(FakeSource::with(vec![item]), store.clone(), ScriptedAi::ok(10), disp.clone());

    let report = p.run_cycle_at(now()).await.expect("cycle");
    assert_eq!(report.ingested, 1);
    assert_eq!(report.selected, 1);
    assert!(report.delivered);

    let stored = store.list(&ListQuery::default()).await.unwrap();
    assert_eq!(stored.len(), 1);
    let it = &stored[0];
    assert_eq!(it.engagement_score, 132_400.0);
    assert_eq!(it.viral_probability, 100);
    assert_eq!(it.trend_type, TrendType::Exploding);
    assert_eq!(it.category, Some(Category::Entertainment));
    assert!(it.notified);
    assert_eq!(it.insight.as_ref().map(|i| i.viral_score), Some(10));
}

#[tokio::test]
async fn repeated_cycles_do_not_duplicate_items() {
    let store = Arc::new(JsonFileStore::in_memory());
    let disp = RecordingDispatcher::new(true);
    let p = pipeline(FakeSource::with(tech_items(3)), store.clone(), ScriptedAi::ok(50), disp.clone());

    p.run_cycle_at(now()).await.unwrap();
    p.run_cycle_at(now()).await.unwrap();

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.total_items, 3);
    assert_eq!(stats.notified_items, 3);
    assert_eq!(disp.count(), 2);
}

#[tokio::test]
async fn selects_exactly_k_and_never_renotifies() {
    let store = Arc::new(JsonFileStore::in_memory());
    let disp = RecordingDispatcher::new(true);
    let p = pipeline(FakeSource::with(tech_items(8)), store.clone(), ScriptedAi::ok(50), disp.clone());

    let first = p.run_cycle_at(now()).await.unwrap();
    assert_eq!(first.candidates, 8);
    assert_eq!(first.selected, 5);
    assert_eq!(first.marked, 5);

    // the five best by engagement, in rank order
    let digest = &disp.digests()[0];
    let positions: Vec<usize> = ["t7", "t6", "t5", "t4", "t3"]
        .iter()
        .map(|id| digest.text.find(&format!("youtu.be/{id}")).expect("id in digest"))
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
    assert!(!digest.text.contains("youtu.be/t2"));

    // remaining three go out next cycle, then nothing is left
    let second = p.run_cycle_at(now()).await.unwrap();
    assert_eq!(second.selected, 3);
    let third = p.run_cycle_at(now()).await.unwrap();
    assert_eq!(third.selected, 0);
    assert_eq!(third.subject, NO_SPIKES_SUBJECT);
    assert_eq!(store.stats().await.unwrap().notified_items, 8);
}

#[tokio::test]
async fn empty_ingestion_sends_one_no_spikes_digest() {
    let store = Arc::new(JsonFileStore::in_memory());
    let disp = RecordingDispatcher::new(true);
    let p = pipeline(FakeSource::with(Vec::new()), store.clone(), ScriptedAi::ok(50), disp.clone());

    let report = p.run_cycle_at(now()).await.unwrap();
    assert_eq!(report.ingested, 0);
    assert_eq!(report.selected, 0);
    assert_eq!(disp.count(), 1);
    assert_eq!(disp.digests()[0].subject, NO_SPIKES_SUBJECT);
    assert_eq!(disp.digests()[0].item_count, 0);
    assert_eq!(store.stats().await.unwrap().total_items, 0);
}

#[tokio::test]
async fn one_enrichment_failure_degrades_only_that_item() {
    let items = vec![
        trending("good", "Gadget review", 5, 9_000, now()).with_category_hint("28"),
        trending("bad", "Gadget unboxing", 5, 8_000, now()).with_category_hint("28"),
    ];
    let store = Arc::new(JsonFileStore::in_memory());
    let disp = RecordingDispatcher::new(true);
    let p = pipeline(
        FakeSource::with(items),
        store.clone(),
        ScriptedAi::failing_for(60, &["bad"]),
        disp.clone(),
    );

    let report = p.run_cycle_at(now()).await.unwrap();
    assert!(report.delivered);
    assert_eq!(report.marked, 2);

    let stored = store.list(&ListQuery::default()).await.unwrap();
    let by_id = |id: &str| stored.iter().find(|i| i.id == id).unwrap().clone();
    assert_eq!(by_id("bad").insight, Some(Insight::degraded()));
    assert_eq!(by_id("good").insight.unwrap().why_trending, "why good");
}

#[tokio::test]
async fn ai_score_raises_viral_probability_but_never_lowers_it() {
    let items = vec![trending("slow", "Quiet vlog", 48, 100, now())];
    let store = Arc::new(JsonFileStore::in_memory());
    let disp = RecordingDispatcher::new(true);
    let p = pipeline(FakeSource::with(items), store.clone(), ScriptedAi::ok(87), disp.clone());

    p.run_cycle_at(now()).await.unwrap();
    let stored = store.list(&ListQuery::default()).await.unwrap();
    assert_eq!(stored[0].viral_probability, 87);

    let hot = Item::new("hot", "Cooking", "2025-10-27T10:00:00Z").with_counters(120_000, 5_000, 800);
    let store = Arc::new(JsonFileStore::in_memory());
    let p = pipeline(FakeSource::with(vec![hot]), store.clone(), ScriptedAi::ok(5), disp.clone());
    p.run_cycle_at(now()).await.unwrap();
    let stored = store.list(&ListQuery::default()).await.unwrap();
    assert_eq!(stored[0].viral_probability, 100);
}

#[tokio::test]
async fn dispatch_failure_leaves_items_eligible() {
    let store = Arc::new(JsonFileStore::in_memory());
    let disp = RecordingDispatcher::new(false);
    let p = pipeline(FakeSource::with(tech_items(2)), store.clone(), ScriptedAi::ok(50), disp.clone());

    let failed = p.run_cycle_at(now()).await.unwrap();
    assert!(!failed.delivered);
    assert_eq!(failed.marked, 0);
    assert_eq!(store.stats().await.unwrap().notified_items, 0);
    assert!(!store.is_notified("t0").await.unwrap());

    disp.set_ok(true);
    let retried = p.run_cycle_at(now()).await.unwrap();
    assert_eq!(retried.selected, 2);
    assert_eq!(retried.marked, 2);
    assert!(store.is_notified("t0").await.unwrap());
}

#[tokio::test]
async fn notified_state_survives_reopening_the_state_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state").join("trends.json");
    let disp = RecordingDispatcher::new(true);

    {
        let store = Arc::new(JsonFileStore::open(&path).await.unwrap());
        let p = pipeline(FakeSource::with(tech_items(2)), store, ScriptedAi::ok(50), disp.clone());
        assert_eq!(p.run_cycle_at(now()).await.unwrap().marked, 2);
    }

    // "restart"
    let store = Arc::new(JsonFileStore::open(&path).await.unwrap());
    let p = pipeline(FakeSource::with(tech_items(2)), store, ScriptedAi::ok(50), disp.clone());
    let report = p.run_cycle_at(now()).await.unwrap();
    assert_eq!(report.selected, 0);
    assert_eq!(report.subject, NO_SPIKES_SUBJECT);
}

#[tokio::test]
async fn persistence_failure_aborts_before_dispatch() {
    let disp = RecordingDispatcher::new(true);
    let p = pipeline(
        FakeSource::with(tech_items(2)),
        Arc::new(ReadOnlyStore),
        ScriptedAi::ok(50),
        disp.clone(),
    );

    let err = p.run_cycle_at(now()).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Persistence {
            stage: CycleStage::Persisting,
            ..
        }
    ));
    assert_eq!(disp.count(), 0);
    assert_eq!(p.stage(), CycleStage::Idle);
}

#[tokio::test]
async fn stage_is_idle_between_cycles() {
    let store = Arc::new(JsonFileStore::in_memory());
    let disp = RecordingDispatcher::new(true);
    let p = pipeline(FakeSource::with(tech_items(1)), store, ScriptedAi::ok(50), disp);
    assert_eq!(p.stage(), CycleStage::Idle);
    p.run_cycle_at(now()).await.unwrap();
    assert_eq!(p.stage(), CycleStage::Idle);
}

#[tokio::test]
async fn concurrent_cycles_run_one_at_a_time() {
    let store = Arc::new(JsonFileStore::in_memory());
    let disp = RecordingDispatcher::new(true);
    let source = SlowSource::with(tech_items(3), Duration::from_millis(50));
    let p = pipeline(source.clone(), store.clone(), ScriptedAi::ok(50), disp.clone());

    let (a, b) = tokio::join!(p.run_cycle_at(now()), p.run_cycle_at(now()));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(source.peak(), 1);
    let mut selected = [a.selected, b.selected];
    selected.sort();
    assert_eq!(selected, [0, 3]);
    assert_eq!(store.stats().await.unwrap().notified_items, 3);
    assert_eq!(disp.count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cycle_runs_inside_a_spawned_task() {
    let store = Arc::new(JsonFileStore::in_memory());
    let disp = RecordingDispatcher::new(true);
    let ai = ScriptedAi::failing_for(40, &["t1"]);
    let p = Arc::new(pipeline(FakeSource::with(tech_items(2)), store, ai, disp));

    let task = tokio::spawn({
        let p = p.clone();
        async move { p.run_cycle().await }
    });
    let report = task.await.expect("join").expect("cycle");
    assert_eq!(report.ingested, 2);
}
