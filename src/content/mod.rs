use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The four content modules served by the platform. Fixed set, no dynamic
/// route discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentModule {
    Article,
    Thread,
    Guide,
    Catalog,
}

impl ContentModule {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentModule::Article => "article",
            ContentModule::Thread => "thread",
            ContentModule::Guide => "guide",
            ContentModule::Catalog => "catalog",
        }
    }

    /// Cache tags invalidated after a mutation in this module
    pub fn cache_tags(&self) -> [String; 3] {
        let name = self.as_str();
        [
            format!("{}s", name),
            format!("{} stats", name),
            format!("{} categories", name),
        ]
    }
}

impl std::fmt::Display for ContentModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Draft,
    Published,
    Archived,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Draft => "draft",
            ItemStatus::Published => "published",
            ItemStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(ItemStatus::Draft),
            "published" => Some(ItemStatus::Published),
            "archived" => Some(ItemStatus::Archived),
            _ => None,
        }
    }
}

/// Toggleable per-user interaction kinds. Views are deliberately absent:
/// they are counted on fetch and carry no per-user record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Like,
    Bookmark,
    Helpful,
    Share,
}

impl InteractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::Like => "like",
            InteractionKind::Bookmark => "bookmark",
            InteractionKind::Helpful => "helpful",
            InteractionKind::Share => "share",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "like" => Some(InteractionKind::Like),
            "bookmark" => Some(InteractionKind::Bookmark),
            "helpful" => Some(InteractionKind::Helpful),
            "share" => Some(InteractionKind::Share),
            _ => None,
        }
    }

    pub const ALL: [InteractionKind; 4] = [
        InteractionKind::Like,
        InteractionKind::Bookmark,
        InteractionKind::Helpful,
        InteractionKind::Share,
    ];
}

/// Caller-specified list ordering. Ties always break by item id ascending
/// so page boundaries are reproducible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    #[default]
    Newest,
    Oldest,
    MostViewed,
    MostLiked,
}

impl SortBy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "newest" => Some(SortBy::Newest),
            "oldest" => Some(SortBy::Oldest),
            "most_viewed" => Some(SortBy::MostViewed),
            "most_liked" => Some(SortBy::MostLiked),
            _ => None,
        }
    }
}

/// Cached aggregate counters embedded in each item. Derived from the
/// active interaction records, never authoritative on their own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemStats {
    pub views_count: i64,
    pub likes_count: i64,
    pub bookmarks_count: i64,
    pub helpfuls_count: i64,
    pub shares_count: i64,
}

impl ItemStats {
    pub fn count_for(&self, kind: InteractionKind) -> i64 {
        match kind {
            InteractionKind::Like => self.likes_count,
            InteractionKind::Bookmark => self.bookmarks_count,
            InteractionKind::Helpful => self.helpfuls_count,
            InteractionKind::Share => self.shares_count,
        }
    }

    pub fn adjust(&mut self, kind: InteractionKind, delta: i64) {
        let slot = match kind {
            InteractionKind::Like => &mut self.likes_count,
            InteractionKind::Bookmark => &mut self.bookmarks_count,
            InteractionKind::Helpful => &mut self.helpfuls_count,
            InteractionKind::Share => &mut self.shares_count,
        };
        *slot = (*slot + delta).max(0);
    }
}

/// A unit of content in one of the four modules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub id: Uuid,
    pub module: ContentModule,
    /// Unique within the module, URL-safe, immutable once published
    pub slug: String,
    pub title: String,
    pub body: String,
    pub author_id: Uuid,
    pub author_display_name: String,
    pub category: String,
    pub status: ItemStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    pub stats: ItemStats,
}

/// Per-user, per-item, per-kind marker. At most one active record per
/// `(user_id, item_id, kind)` tuple; created on toggle-on, destroyed on
/// toggle-off, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionRecord {
    pub user_id: Uuid,
    pub item_id: Uuid,
    pub kind: InteractionKind,
    pub created_at: DateTime<Utc>,
}

/// A reply within a forum thread. Append-only; `reply_to_id` references a
/// strictly earlier reply in the same thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub id: Uuid,
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub author_display_name: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Small, rarely-mutated reference set per module. `posts_count` is a
/// cached aggregate maintained on item creation and status/category change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub order: i32,
    pub posts_count: i64,
}

/// Module-level aggregates returned by the gateway's stats operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleStats {
    pub published_count: i64,
    pub draft_count: i64,
    pub views_count: i64,
    pub likes_count: i64,
    pub bookmarks_count: i64,
    pub helpfuls_count: i64,
    pub shares_count: i64,
}

/// Derive a URL-safe slug from a title: lowercase, alphanumeric runs
/// joined by single hyphens.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_was_sep = true;
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            slug.push('-');
            last_was_sep = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("untitled");
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Hello,  World!"), "hello-world");
        assert_eq!(slugify("Rust 2024 — what's new?"), "rust-2024-what-s-new");
        assert_eq!(slugify("---"), "untitled");
    }

    #[test]
    fn stats_adjust_never_goes_negative() {
        let mut stats = ItemStats::default();
        stats.adjust(InteractionKind::Like, -1);
        assert_eq!(stats.likes_count, 0);
        stats.adjust(InteractionKind::Like, 1);
        assert_eq!(stats.likes_count, 1);
    }

    #[test]
    fn interaction_kind_round_trips() {
        for kind in InteractionKind::ALL {
            assert_eq!(InteractionKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(InteractionKind::parse("view"), None);
    }

    #[test]
    fn module_cache_tags() {
        let tags = ContentModule::Guide.cache_tags();
        assert_eq!(tags[0], "guides");
        assert_eq!(tags[1], "guide stats");
        assert_eq!(tags[2], "guide categories");
    }
}
