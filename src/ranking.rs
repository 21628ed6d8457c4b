//! Top-K per category selection over freshly scored items.
//!
//! This is the only gate deciding who gets enriched and notified: notified
//! items are never selected and no category exceeds K.

use serde::Serialize;

use crate::item::{Category, Item};

/// Default digest size per category.
pub const DEFAULT_TOP_K: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryGroup {
    pub category: Category,
    /// Ranked, best first.
    pub items: Vec<Item>,
}

/// Per-cycle selection; never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NotificationBatch {
    /// In [`Category::DIGEST_ORDER`], empty categories omitted.
    pub groups: Vec<CategoryGroup>,
    /// Items scored this cycle that were not yet notified.
    pub scored_count: usize,
}

impl NotificationBatch {
    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(|g| g.items.is_empty())
    }

    pub fn len(&self) -> usize {
        self.groups.iter().map(|g| g.items.len()).sum()
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.groups.iter().flat_map(|g| g.items.iter())
    }

    pub fn items_mut(&mut self) -> impl Iterator<Item = &mut Item> {
        self.groups.iter_mut().flat_map(|g| g.items.iter_mut())
    }

    pub fn group(&self, category: Category) -> Option<&CategoryGroup> {
        self.groups.iter().find(|g| g.category == category)
    }
}

/// Bucket un-notified items by category and keep the best `k` of each.
///
/// The sort is stable, so equal scores keep ingestion order.
pub fn select(items: &[Item], k: usize) -> NotificationBatch {
    let candidates: Vec<&Item> = items.iter().filter(|it| !it.notified).collect();
    let scored_count = candidates.len();

    let groups = Category::DIGEST_ORDER
        .iter()
        .filter_map(|&category| {
            let mut bucket: Vec<&Item> = candidates
                .iter()
                .copied()
                .filter(|it| it.category_or_default() == category)
                .collect();
            if bucket.is_empty() {
                return None;
            }
            bucket.sort_by(|a, b| b.engagement_score.total_cmp(&a.engagement_score));
            Some(CategoryGroup {
                category,
                items: bucket.into_iter().take(k).cloned().collect(),
            })
        })
        .collect();

    NotificationBatch {
        groups,
        scored_count,
    }
}
