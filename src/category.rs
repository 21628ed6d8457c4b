//! # Category Classifier
//!
//! Maps an item's title, description, tags, provider category hint and
//! duration to one [`Category`]. Pure and deterministic.
//!
//! Precedence:
//! 1. Short-form duration (0 < secs < 60) → Shorts.
//! 2. Gaming vocabulary anywhere in the text → Gaming.
//! 3. Provider category hint (20/28/25/27/24).
//! 4. Keyword table, scanned in table order, first whitespace-bounded hit wins.
//! 5. Entertainment.

use once_cell::sync::OnceCell;
use regex::Regex;

use crate::item::{Category, Item};

/// Titles matching these (plain substring) are always Gaming.
pub const GAMING_VOCABULARY: &[&str] = &["gta", "minecraft", "bgmi", "valorant", "free fire"];

/// Ordered association list. Order is part of the contract.
pub const KEYWORD_TABLE: &[(Category, &[&str])] = &[
    (
        Category::Gaming,
        &[
            "gaming", "game", "gameplay", "walkthrough", "ps5", "xbox", "nintendo", "esports",
            "minecraft", "gta", "bgmi", "valorant", "free fire", "roblox",
        ],
    ),
    (
        Category::Technology,
        &[
            "tech", "technology", "review", "unboxing", "smartphone", "iphone", "android",
            "laptop", "pc", "gadget", "software", "ai", "robot",
        ],
    ),
    (
        Category::NewsPolitics,
        &[
            "news", "politics", "breaking", "update", "report", "live", "election",
            "government", "modi", "rahul", "bjp", "congress",
        ],
    ),
    (
        Category::Finance,
        &[
            "finance", "money", "stock", "market", "invest", "crypto", "bitcoin", "business",
            "economy", "trading", "bank", "loan", "tax",
        ],
    ),
    (
        Category::Education,
        &[
            "education", "tutorial", "learn", "how to", "class", "lecture", "study", "exam",
            "school", "college", "university", "coding", "course",
        ],
    ),
    (
        Category::Entertainment,
        &[
            "entertainment", "comedy", "funny", "prank", "challenge", "vlog", "movie",
            "trailer", "song", "dance", "music", "serial", "episode",
        ],
    ),
];

/// Seconds below which a video counts as short-form.
pub const SHORTS_MAX_SECS: u64 = 60;

/// Parse an ISO 8601 `PT#H#M#S` duration into seconds. Anything else is 0.
pub fn parse_duration_secs(duration: &str) -> u64 {
    static RE: OnceCell<Regex> = OnceCell::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"^PT(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?").expect("duration regex")
    });
    let Some(caps) = re.captures(duration.trim()) else {
        return 0;
    };
    let part = |i: usize, mul: u64| {
        caps.get(i)
            .and_then(|m| m.as_str().parse::<u64>().ok())
            .map_or(0, |v| v.saturating_mul(mul))
    };
    part(1, 3600)
        .saturating_add(part(2, 60))
        .saturating_add(part(3, 1))
}

fn category_from_hint(hint: &str) -> Option<Category> {
    match hint.trim() {
        "20" => Some(Category::Gaming),
        "28" => Some(Category::Technology),
        "25" => Some(Category::NewsPolitics),
        "27" => Some(Category::Education),
        "24" => Some(Category::Entertainment),
        _ => None,
    }
}

fn searchable_text(item: &Item) -> String {
    let mut text = String::with_capacity(item.title.len() + item.description.len() + 64);
    text.push_str(&item.title);
    text.push(' ');
    text.push_str(&item.description);
    text.push(' ');
    text.push_str(&item.tags.join(" "));
    text.to_lowercase()
}

/// Classify one item. Never fails; unmatched input resolves to Entertainment.
pub fn categorize(item: &Item) -> Category {
    let secs = parse_duration_secs(&item.duration);
    if secs > 0 && secs < SHORTS_MAX_SECS {
        return Category::Shorts;
    }

    let text = searchable_text(item);

    if GAMING_VOCABULARY.iter().any(|kw| text.contains(kw)) {
        return Category::Gaming;
    }

    if let Some(cat) = item.category_hint.as_deref().and_then(category_from_hint) {
        return cat;
    }

    // Pad so that keywords at either end are still whitespace-bounded.
    let padded = format!(" {text} ");
    for (category, keywords) in KEYWORD_TABLE {
        if keywords
            .iter()
            .any(|kw| padded.contains(&format!(" {kw} ")))
        {
            return *category;
        }
    }

    Category::Entertainment
}
