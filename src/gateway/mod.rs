pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::content::{
    Category, ContentItem, ContentModule, InteractionKind, ItemStatus, ModuleStats, Reply, SortBy,
};

/// Errors from the persistent-store façade
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Validated pagination input: `page >= 1`, `limit` capped by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Pagination {
    /// Clamp raw caller input to the configured bounds.
    pub fn clamp(page: Option<i64>, limit: Option<i64>, default_limit: u32, max_limit: u32) -> Self {
        let page = page.unwrap_or(1).max(1) as u32;
        let limit = limit
            .unwrap_or(default_limit as i64)
            .clamp(1, max_limit as i64) as u32;
        Self { page, limit }
    }

    pub fn offset(&self) -> u32 {
        (self.page - 1) * self.limit
    }
}

/// Pagination metadata returned with every list result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

impl PageMeta {
    pub fn compute(pagination: Pagination, total: u64) -> Self {
        let limit = pagination.limit.max(1);
        Self {
            page: pagination.page,
            limit,
            total,
            total_pages: (total + limit as u64 - 1) / limit as u64,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPage {
    pub items: Vec<ContentItem>,
    pub pagination: PageMeta,
}

/// Which drafts the viewer may see, decided by the permission layer before
/// the gateway is called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftVisibility {
    /// Published content only
    PublishedOnly,
    /// Published content plus the given author's own drafts
    Own(Uuid),
    /// All drafts (view-drafts capability)
    All,
}

impl DraftVisibility {
    pub fn allows(&self, item: &ContentItem) -> bool {
        match item.status {
            ItemStatus::Published | ItemStatus::Archived => true,
            ItemStatus::Draft => match self {
                DraftVisibility::PublishedOnly => false,
                DraftVisibility::Own(viewer) => item.author_id == *viewer,
                DraftVisibility::All => true,
            },
        }
    }
}

/// List filters and ordering. `category = None` (or "all" upstream) means
/// no category filter; absent status defaults to published.
#[derive(Debug, Clone)]
pub struct ListQuery {
    pub category: Option<String>,
    pub status: Option<ItemStatus>,
    pub sort_by: SortBy,
    pub pagination: Pagination,
    pub drafts: DraftVisibility,
}

#[derive(Debug, Clone)]
pub struct CreateContent {
    pub title: String,
    pub body: String,
    pub category: String,
    /// Explicit slug; generated from the title when absent
    pub slug: Option<String>,
    /// Defaults to published when omitted
    pub status: Option<ItemStatus>,
    pub author_id: Uuid,
    pub author_display_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateContent {
    pub title: Option<String>,
    pub body: Option<String>,
    pub category: Option<String>,
    pub status: Option<ItemStatus>,
}

#[derive(Debug, Clone)]
pub struct NewReply {
    pub author_id: Uuid,
    pub author_display_name: String,
    pub content: String,
    pub reply_to_id: Option<Uuid>,
}

/// Result of one toggle: `is_new` reports the transition direction, `item`
/// carries refreshed stats.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleOutcome {
    pub is_new: bool,
    pub item: ContentItem,
}

/// Capability-scoped façade over the persistent store. Business functions
/// perform every store operation through this seam, which keeps handlers
/// testable against the in-memory implementation.
#[async_trait]
pub trait ContentGateway: Send + Sync {
    async fn list(&self, module: ContentModule, query: ListQuery) -> Result<ListPage, GatewayError>;

    async fn get_by_slug(
        &self,
        module: ContentModule,
        slug: &str,
        drafts: DraftVisibility,
    ) -> Result<Option<ContentItem>, GatewayError>;

    async fn get_by_id(
        &self,
        module: ContentModule,
        id: Uuid,
    ) -> Result<Option<ContentItem>, GatewayError>;

    async fn create(&self, module: ContentModule, input: CreateContent)
        -> Result<Uuid, GatewayError>;

    async fn update(
        &self,
        module: ContentModule,
        id: Uuid,
        input: UpdateContent,
    ) -> Result<(), GatewayError>;

    async fn get_stats(&self, module: ContentModule) -> Result<ModuleStats, GatewayError>;

    async fn get_categories(&self, module: ContentModule) -> Result<Vec<Category>, GatewayError>;

    /// Toggle the `(user, item, kind)` interaction record. Implementations
    /// must serialize concurrent toggles for the same tuple so the cached
    /// counter never drifts from the active-record count.
    async fn record_interaction(
        &self,
        module: ContentModule,
        user_id: Uuid,
        item_id: Uuid,
        kind: InteractionKind,
    ) -> Result<ToggleOutcome, GatewayError>;

    /// Count one view of the item and return the refreshed views count.
    /// Views have no per-user record.
    async fn record_view(&self, module: ContentModule, item_id: Uuid)
        -> Result<i64, GatewayError>;

    async fn list_replies(&self, post_id: Uuid) -> Result<Vec<Reply>, GatewayError>;

    async fn add_reply(&self, post_id: Uuid, input: NewReply) -> Result<Reply, GatewayError>;

    /// Liveness ping for the /health endpoint
    async fn health(&self) -> Result<(), GatewayError>;
}
