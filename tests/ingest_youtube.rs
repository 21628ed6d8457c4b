// tests/ingest_youtube.rs
//
// YouTube provider in fixture mode through the fail-soft ingest entry point:
// counters, categories, duplicate ids, and a broken payload.

use std::time::Duration;

use chrono::{TimeZone, Utc};

use trend_pulse::category::categorize;
use trend_pulse::ingest::fetch_items;
use trend_pulse::ingest::providers::YouTubeProvider;
use trend_pulse::scoring::score_item;
use trend_pulse::{Category, TrendType};

const FIXTURE: &str = r#"{
  "kind": "youtube#videoListResponse",
  "items": [
    {
      "id": "vid-gaming",
      "snippet": {
        "title": "GTA 6 trailer   breakdown",
        "channelTitle": "Rockstar Fans",
        "publishedAt": "2025-10-27T09:00:00Z",
        "description": "Every detail &amp; easter egg",
        "categoryId": "24",
        "thumbnails": {"high": {"url": "https://i.ytimg.com/hq.jpg"}}
      },
      "statistics": {"viewCount": "900000", "likeCount": "40000", "commentCount": "6000"},
      "contentDetails": {"duration": "PT14M2S"}
    },
    {
      "id": "vid-short",
      "snippet": {
        "title": "Wait for it",
        "channelTitle": "Quick",
        "publishedAt": "2025-10-27T10:30:00Z"
      },
      "statistics": {"viewCount": "5000"},
      "contentDetails": {"duration": "PT45S"}
    },
    {
      "id": "vid-gaming",
      "snippet": {"title": "duplicate entry", "publishedAt": "2025-10-27T09:00:00Z"},
      "statistics": {},
      "contentDetails": {}
    },
    {
      "id": "",
      "snippet": {"title": "no id"},
      "statistics": {},
      "contentDetails": {}
    }
  ]
}"#;

#[tokio::test]
async fn fixture_chart_is_normalized_and_deduplicated() {
    let provider = YouTubeProvider::from_fixture(FIXTURE);
    let items = fetch_items(&provider, "IN", Duration::from_secs(1)).await;

    let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["vid-gaming", "vid-short"]);

    let g = &items[0];
    assert_eq!(g.title, "GTA 6 trailer breakdown");
    assert_eq!(g.description, "Every detail &amp; easter egg");
    assert_eq!(g.views, 900_000);
    assert_eq!(g.thumbnail_url, "https://i.ytimg.com/hq.jpg");

    let s = &items[1];
    assert_eq!(s.likes, 0);
    assert_eq!(s.comments, 0);
    assert_eq!(s.thumbnail_url, "");
}

#[tokio::test]
async fn fixture_items_classify_and_score() {
    let now = Utc.with_ymd_and_hms(2025, 10, 27, 11, 0, 0).unwrap();
    let provider = YouTubeProvider::from_fixture(FIXTURE);
    let mut items = fetch_items(&provider, "IN", Duration::from_secs(1)).await;
    for it in items.iter_mut() {
        it.category = Some(categorize(it));
        score_item(it, now);
    }

    // vocabulary beats the entertainment hint
    assert_eq!(items[0].category, Some(Category::Gaming));
    assert_eq!(items[0].viral_probability, 100);
    assert_eq!(items[0].trend_type, TrendType::ViralGaming);

    assert_eq!(items[1].category, Some(Category::Shorts));
    assert_eq!(items[1].trend_type, TrendType::ViralShort);
}

#[tokio::test]
async fn broken_payload_yields_empty_list() {
    let provider = YouTubeProvider::from_fixture("<html>quota exceeded</html>");
    let items = fetch_items(&provider, "IN", Duration::from_secs(1)).await;
    assert!(items.is_empty());
}
