use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::content::{
    slugify, Category, ContentItem, ContentModule, InteractionKind, InteractionRecord, ItemStats,
    ItemStatus, ModuleStats, Reply, SortBy,
};
use crate::gateway::{
    ContentGateway, CreateContent, DraftVisibility, GatewayError, ListPage, ListQuery, NewReply,
    PageMeta, ToggleOutcome, UpdateContent,
};
use crate::time::SharedClock;

#[derive(Default)]
struct Store {
    items: HashMap<Uuid, ContentItem>,
    interactions: HashMap<(Uuid, Uuid, InteractionKind), InteractionRecord>,
    replies: HashMap<Uuid, Vec<Reply>>,
    categories: HashMap<ContentModule, Vec<Category>>,
}

/// In-memory gateway backing deterministic tests and database-free
/// development. The whole store sits behind one async mutex, which trivially
/// serializes concurrent toggles for the same `(user, item, kind)` tuple.
pub struct MemoryGateway {
    store: Mutex<Store>,
    clock: SharedClock,
}

impl MemoryGateway {
    pub fn new(clock: SharedClock) -> Self {
        Self { store: Mutex::new(Store::default()), clock }
    }

    /// Test/seed helper: insert a fully-formed item, registering its
    /// category.
    pub async fn seed_item(&self, item: ContentItem) {
        let mut store = self.store.lock().await;
        bump_category(
            &mut store.categories,
            item.module,
            &item.category,
            if item.status == ItemStatus::Published { 1 } else { 0 },
        );
        store.items.insert(item.id, item);
    }
}

fn bump_category(
    categories: &mut HashMap<ContentModule, Vec<Category>>,
    module: ContentModule,
    name: &str,
    delta: i64,
) {
    let list = categories.entry(module).or_default();
    if let Some(cat) = list.iter_mut().find(|c| c.name == name) {
        cat.posts_count = (cat.posts_count + delta).max(0);
        return;
    }
    let order = list.len() as i32;
    list.push(Category {
        id: Uuid::new_v4(),
        name: name.to_string(),
        slug: slugify(name),
        order,
        posts_count: delta.max(0),
    });
}

fn matches_filters(item: &ContentItem, query: &ListQuery) -> bool {
    if let Some(category) = &query.category {
        if &item.category != category {
            return false;
        }
    }
    match query.status {
        Some(status) => item.status == status && query.drafts.allows(item),
        // No status filter: published plus whatever drafts the viewer may see
        None => match item.status {
            ItemStatus::Published => true,
            ItemStatus::Draft => query.drafts.allows(item),
            ItemStatus::Archived => false,
        },
    }
}

fn sort_items(items: &mut [ContentItem], sort_by: SortBy) {
    // Every order tie-breaks by id for a stable, reproducible sequence
    items.sort_by(|a, b| {
        let primary = match sort_by {
            SortBy::Newest => b.created_at.cmp(&a.created_at),
            SortBy::Oldest => a.created_at.cmp(&b.created_at),
            SortBy::MostViewed => b.stats.views_count.cmp(&a.stats.views_count),
            SortBy::MostLiked => b.stats.likes_count.cmp(&a.stats.likes_count),
        };
        primary.then(a.id.cmp(&b.id))
    });
}

#[async_trait]
impl ContentGateway for MemoryGateway {
    async fn list(&self, module: ContentModule, query: ListQuery) -> Result<ListPage, GatewayError> {
        let store = self.store.lock().await;
        let mut matched: Vec<ContentItem> = store
            .items
            .values()
            .filter(|item| item.module == module && matches_filters(item, &query))
            .cloned()
            .collect();

        sort_items(&mut matched, query.sort_by);

        let total = matched.len() as u64;
        let offset = query.pagination.offset() as usize;
        let items: Vec<ContentItem> = matched
            .into_iter()
            .skip(offset)
            .take(query.pagination.limit as usize)
            .collect();

        Ok(ListPage { items, pagination: PageMeta::compute(query.pagination, total) })
    }

    async fn get_by_slug(
        &self,
        module: ContentModule,
        slug: &str,
        drafts: DraftVisibility,
    ) -> Result<Option<ContentItem>, GatewayError> {
        let store = self.store.lock().await;
        Ok(store
            .items
            .values()
            .find(|item| item.module == module && item.slug == slug && drafts.allows(item))
            .cloned())
    }

    async fn get_by_id(
        &self,
        module: ContentModule,
        id: Uuid,
    ) -> Result<Option<ContentItem>, GatewayError> {
        let store = self.store.lock().await;
        Ok(store.items.get(&id).filter(|item| item.module == module).cloned())
    }

    async fn create(
        &self,
        module: ContentModule,
        input: CreateContent,
    ) -> Result<Uuid, GatewayError> {
        let mut store = self.store.lock().await;
        let now = self.clock.now();

        let taken: Vec<String> = store
            .items
            .values()
            .filter(|item| item.module == module)
            .map(|item| item.slug.clone())
            .collect();

        let slug = match input.slug {
            Some(slug) => {
                if taken.iter().any(|s| s == &slug) {
                    return Err(GatewayError::Conflict(format!("Slug already in use: {}", slug)));
                }
                slug
            }
            None => {
                let base = slugify(&input.title);
                let mut candidate = base.clone();
                let mut suffix = 2;
                while taken.iter().any(|s| s == &candidate) {
                    candidate = format!("{}-{}", base, suffix);
                    suffix += 1;
                }
                candidate
            }
        };

        let status = input.status.unwrap_or(ItemStatus::Published);
        let item = ContentItem {
            id: Uuid::new_v4(),
            module,
            slug,
            title: input.title,
            body: input.body,
            author_id: input.author_id,
            author_display_name: input.author_display_name,
            category: input.category,
            status,
            created_at: now,
            updated_at: now,
            published_at: (status == ItemStatus::Published).then_some(now),
            stats: ItemStats::default(),
        };

        let id = item.id;
        bump_category(
            &mut store.categories,
            module,
            &item.category,
            if status == ItemStatus::Published { 1 } else { 0 },
        );
        store.items.insert(id, item);
        Ok(id)
    }

    async fn update(
        &self,
        module: ContentModule,
        id: Uuid,
        input: UpdateContent,
    ) -> Result<(), GatewayError> {
        let mut store = self.store.lock().await;
        let now = self.clock.now();

        let item = store
            .items
            .get(&id)
            .filter(|item| item.module == module)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("{} not found", module)))?;

        let old_published = item.status == ItemStatus::Published;
        let old_category = item.category.clone();

        let mut updated = item;
        if let Some(title) = input.title {
            updated.title = title;
        }
        if let Some(body) = input.body {
            updated.body = body;
        }
        if let Some(category) = input.category {
            updated.category = category;
        }
        if let Some(status) = input.status {
            updated.status = status;
            if status == ItemStatus::Published && updated.published_at.is_none() {
                updated.published_at = Some(now);
            }
        }
        updated.updated_at = now;

        // Keep category posts_count aligned with published membership
        let new_published = updated.status == ItemStatus::Published;
        if old_published {
            bump_category(&mut store.categories, module, &old_category, -1);
        }
        if new_published {
            bump_category(&mut store.categories, module, &updated.category, 1);
        } else {
            // Ensure the new category exists even for drafts
            bump_category(&mut store.categories, module, &updated.category, 0);
        }

        store.items.insert(id, updated);
        Ok(())
    }

    async fn get_stats(&self, module: ContentModule) -> Result<ModuleStats, GatewayError> {
        let store = self.store.lock().await;
        let mut stats = ModuleStats::default();
        for item in store.items.values().filter(|item| item.module == module) {
            match item.status {
                ItemStatus::Published => stats.published_count += 1,
                ItemStatus::Draft => stats.draft_count += 1,
                ItemStatus::Archived => {}
            }
            stats.views_count += item.stats.views_count;
            stats.likes_count += item.stats.likes_count;
            stats.bookmarks_count += item.stats.bookmarks_count;
            stats.helpfuls_count += item.stats.helpfuls_count;
            stats.shares_count += item.stats.shares_count;
        }
        Ok(stats)
    }

    async fn get_categories(&self, module: ContentModule) -> Result<Vec<Category>, GatewayError> {
        let store = self.store.lock().await;
        let mut categories = store.categories.get(&module).cloned().unwrap_or_default();
        categories.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.name.cmp(&b.name)));
        Ok(categories)
    }

    async fn record_interaction(
        &self,
        module: ContentModule,
        user_id: Uuid,
        item_id: Uuid,
        kind: InteractionKind,
    ) -> Result<ToggleOutcome, GatewayError> {
        // One lock covers the record flip and the counter adjustment, so the
        // counter cannot drift from the active-record count.
        let mut store = self.store.lock().await;
        let now = self.clock.now();

        if !store.items.get(&item_id).map(|item| item.module == module).unwrap_or(false) {
            return Err(GatewayError::NotFound(format!("{} not found", module)));
        }

        let key = (user_id, item_id, kind);
        let is_new = if store.interactions.contains_key(&key) {
            store.interactions.remove(&key);
            false
        } else {
            store
                .interactions
                .insert(key, InteractionRecord { user_id, item_id, kind, created_at: now });
            true
        };

        let item = store
            .items
            .get_mut(&item_id)
            .ok_or_else(|| GatewayError::NotFound(format!("{} not found", module)))?;
        item.stats.adjust(kind, if is_new { 1 } else { -1 });

        Ok(ToggleOutcome { is_new, item: item.clone() })
    }

    async fn record_view(&self, module: ContentModule, item_id: Uuid) -> Result<i64, GatewayError> {
        let mut store = self.store.lock().await;
        match store.items.get_mut(&item_id) {
            Some(item) if item.module == module => {
                item.stats.views_count += 1;
                Ok(item.stats.views_count)
            }
            _ => Err(GatewayError::NotFound(format!("{} not found", module))),
        }
    }

    async fn list_replies(&self, post_id: Uuid) -> Result<Vec<Reply>, GatewayError> {
        let store = self.store.lock().await;
        Ok(store.replies.get(&post_id).cloned().unwrap_or_default())
    }

    async fn add_reply(&self, post_id: Uuid, input: NewReply) -> Result<Reply, GatewayError> {
        let mut store = self.store.lock().await;
        let now = self.clock.now();

        if !store
            .items
            .get(&post_id)
            .map(|item| item.module == ContentModule::Thread)
            .unwrap_or(false)
        {
            return Err(GatewayError::NotFound("thread not found".to_string()));
        }

        let replies = store.replies.entry(post_id).or_default();
        if let Some(parent) = input.reply_to_id {
            // Replies are append-only and may only reference earlier replies
            // in the same thread
            if !replies.iter().any(|r| r.id == parent) {
                return Err(GatewayError::Conflict(
                    "reply_to_id does not reference a reply in this thread".to_string(),
                ));
            }
        }

        let reply = Reply {
            id: Uuid::new_v4(),
            post_id,
            author_id: input.author_id,
            author_display_name: input.author_display_name,
            content: input.content,
            reply_to_id: input.reply_to_id,
            created_at: now,
        };
        replies.push(reply.clone());
        Ok(reply)
    }

    async fn health(&self) -> Result<(), GatewayError> {
        Ok(())
    }
}
