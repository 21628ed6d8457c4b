//! Renders a digest from a few built-in items and sends it through the
//! configured channels (log-only when none is set).

use chrono::Utc;
use trend_pulse::category::categorize;
use trend_pulse::enrich::Insight;
use trend_pulse::notify::render::build_digest;
use trend_pulse::ranking::{select, DEFAULT_TOP_K};
use trend_pulse::scoring::score_item;
use trend_pulse::{Dispatcher, Item, NotifierMux};

fn sample_items() -> Vec<Item> {
    let now = Utc::now();
    let hours_ago = |h: i64| (now - chrono::Duration::hours(h)).to_rfc3339();
    vec![
        Item::new("dQw4w9WgXcQ", "Minecraft hardcore day 100", hours_ago(2))
            .with_channel("BlockCraft")
            .with_counters(480_000, 31_000, 2_900)
            .with_duration("PT24M10S"),
        Item::new("k4xGqY5IDBE", "New phone AI features explained", hours_ago(6))
            .with_channel("Tech Desk")
            .with_counters(210_000, 9_400, 1_100)
            .with_duration("PT11M2S")
            .with_category_hint("28"),
        Item::new("3JZ_D3ELwOQ", "Election results live", hours_ago(3))
            .with_channel("Daily News")
            .with_counters(95_000, 2_100, 4_800)
            .with_duration("PT58M0S")
            .with_category_hint("25"),
        Item::new("aqz-KE-bpKQ", "Wait for the end", hours_ago(1))
            .with_channel("Quick Laughs")
            .with_counters(150_000, 12_000, 300)
            .with_duration("PT41S"),
    ]
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let now = Utc::now();
    let mut items = sample_items();
    for it in items.iter_mut() {
        it.category = Some(categorize(it));
        score_item(it, now);
    }

    let mut batch = select(&items, DEFAULT_TOP_K);
    for it in batch.items_mut() {
        let mut insight = Insight::degraded();
        insight.why_trending = "Demo digest, no AI call made.".into();
        it.insight = Some(insight);
    }

    let digest = build_digest(&batch, "IN", now);
    let mux = NotifierMux::from_env()?;
    let ok = mux.dispatch(&digest).await;

    println!(
        "digest-demo done: subject={:?} items={} delivered={ok}",
        digest.subject, digest.item_count
    );
    Ok(())
}
