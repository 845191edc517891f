use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::content::{
    slugify, Category, ContentItem, ContentModule, InteractionKind, ItemStats, ItemStatus,
    ModuleStats, Reply, SortBy,
};
use crate::gateway::{
    ContentGateway, CreateContent, DraftVisibility, GatewayError, ListPage, ListQuery, NewReply,
    PageMeta, ToggleOutcome, UpdateContent,
};
use crate::time::SharedClock;

/// sqlx/Postgres implementation of the gateway. Interaction toggles run in
/// a single transaction that locks the item row, so concurrent toggles for
/// the same `(user, item, kind)` tuple serialize and the cached counters
/// stay equal to the active-record count.
pub struct PostgresGateway {
    pool: PgPool,
    clock: SharedClock,
}

impl PostgresGateway {
    pub fn new(pool: PgPool, clock: SharedClock) -> Self {
        Self { pool, clock }
    }

    /// Connect using DATABASE_URL-style connection string and pool settings
    /// from config.
    pub async fn connect(
        database_url: &str,
        config: &DatabaseConfig,
        clock: SharedClock,
    ) -> Result<Self, GatewayError> {
        let url = url::Url::parse(database_url)
            .map_err(|e| GatewayError::Unavailable(format!("invalid DATABASE_URL: {}", e)))?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(std::time::Duration::from_secs(config.connection_timeout_secs))
            .connect(url.as_str())
            .await?;
        Ok(Self::new(pool, clock))
    }

    /// Create tables and constraints when they do not exist yet. The unique
    /// constraint on `(user_id, item_id, kind)` backs the toggle semantics.
    pub async fn ensure_schema(&self) -> Result<(), GatewayError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS content_items (
                id UUID PRIMARY KEY,
                module TEXT NOT NULL,
                slug TEXT NOT NULL,
                title TEXT NOT NULL,
                body TEXT NOT NULL,
                author_id UUID NOT NULL,
                author_display_name TEXT NOT NULL,
                category TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                published_at TIMESTAMPTZ,
                views_count BIGINT NOT NULL DEFAULT 0,
                likes_count BIGINT NOT NULL DEFAULT 0,
                bookmarks_count BIGINT NOT NULL DEFAULT 0,
                helpfuls_count BIGINT NOT NULL DEFAULT 0,
                shares_count BIGINT NOT NULL DEFAULT 0,
                UNIQUE (module, slug)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS interactions (
                user_id UUID NOT NULL,
                item_id UUID NOT NULL REFERENCES content_items (id),
                kind TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (user_id, item_id, kind)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS replies (
                id UUID PRIMARY KEY,
                post_id UUID NOT NULL REFERENCES content_items (id),
                author_id UUID NOT NULL,
                author_display_name TEXT NOT NULL,
                content TEXT NOT NULL,
                reply_to_id UUID REFERENCES replies (id),
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS categories (
                id UUID PRIMARY KEY,
                module TEXT NOT NULL,
                name TEXT NOT NULL,
                slug TEXT NOT NULL,
                ord INT NOT NULL,
                posts_count BIGINT NOT NULL DEFAULT 0,
                UNIQUE (module, name)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

const ITEM_COLUMNS: &str = "id, module, slug, title, body, author_id, author_display_name, \
     category, status, created_at, updated_at, published_at, views_count, likes_count, \
     bookmarks_count, helpfuls_count, shares_count";

fn item_from_row(row: &PgRow) -> Result<ContentItem, GatewayError> {
    let module_str: String = row.try_get("module")?;
    let status_str: String = row.try_get("status")?;
    let module = parse_module(&module_str)?;
    let status = ItemStatus::parse(&status_str)
        .ok_or_else(|| GatewayError::Unavailable(format!("corrupt status value: {}", status_str)))?;

    Ok(ContentItem {
        id: row.try_get("id")?,
        module,
        slug: row.try_get("slug")?,
        title: row.try_get("title")?,
        body: row.try_get("body")?,
        author_id: row.try_get("author_id")?,
        author_display_name: row.try_get("author_display_name")?,
        category: row.try_get("category")?,
        status,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        published_at: row.try_get("published_at")?,
        stats: ItemStats {
            views_count: row.try_get("views_count")?,
            likes_count: row.try_get("likes_count")?,
            bookmarks_count: row.try_get("bookmarks_count")?,
            helpfuls_count: row.try_get("helpfuls_count")?,
            shares_count: row.try_get("shares_count")?,
        },
    })
}

fn parse_module(s: &str) -> Result<ContentModule, GatewayError> {
    match s {
        "article" => Ok(ContentModule::Article),
        "thread" => Ok(ContentModule::Thread),
        "guide" => Ok(ContentModule::Guide),
        "catalog" => Ok(ContentModule::Catalog),
        other => Err(GatewayError::Unavailable(format!("corrupt module value: {}", other))),
    }
}

/// Counter column for a toggle kind. Fixed set, never caller-supplied.
fn counter_column(kind: InteractionKind) -> &'static str {
    match kind {
        InteractionKind::Like => "likes_count",
        InteractionKind::Bookmark => "bookmarks_count",
        InteractionKind::Helpful => "helpfuls_count",
        InteractionKind::Share => "shares_count",
    }
}

fn order_clause(sort_by: SortBy) -> &'static str {
    // Ties break by id for a reproducible order
    match sort_by {
        SortBy::Newest => "created_at DESC, id ASC",
        SortBy::Oldest => "created_at ASC, id ASC",
        SortBy::MostViewed => "views_count DESC, id ASC",
        SortBy::MostLiked => "likes_count DESC, id ASC",
    }
}

/// Append the visibility/filter conditions shared by the count and page
/// queries.
fn push_list_filters<'a>(
    builder: &mut sqlx::QueryBuilder<'a, sqlx::Postgres>,
    module: ContentModule,
    query: &'a ListQuery,
) {
    builder.push(" WHERE module = ").push_bind(module.as_str());

    if let Some(category) = &query.category {
        builder.push(" AND category = ").push_bind(category.as_str());
    }

    match query.status {
        Some(status) => {
            builder.push(" AND status = ").push_bind(status.as_str());
            if status == ItemStatus::Draft {
                match query.drafts {
                    DraftVisibility::PublishedOnly => {
                        builder.push(" AND FALSE");
                    }
                    DraftVisibility::Own(viewer) => {
                        builder.push(" AND author_id = ").push_bind(viewer);
                    }
                    DraftVisibility::All => {}
                }
            }
        }
        None => match query.drafts {
            DraftVisibility::PublishedOnly => {
                builder.push(" AND status = 'published'");
            }
            DraftVisibility::Own(viewer) => {
                builder
                    .push(" AND (status = 'published' OR (status = 'draft' AND author_id = ")
                    .push_bind(viewer)
                    .push("))");
            }
            DraftVisibility::All => {
                builder.push(" AND status IN ('published', 'draft')");
            }
        },
    }
}

fn map_insert_conflict(err: sqlx::Error, slug: &str) -> GatewayError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return GatewayError::Conflict(format!("Slug already in use: {}", slug));
        }
    }
    GatewayError::Sqlx(err)
}

#[async_trait]
impl ContentGateway for PostgresGateway {
    async fn list(&self, module: ContentModule, query: ListQuery) -> Result<ListPage, GatewayError> {
        let mut count_builder =
            sqlx::QueryBuilder::new("SELECT COUNT(*) AS total FROM content_items");
        push_list_filters(&mut count_builder, module, &query);
        let total: i64 = count_builder
            .build()
            .fetch_one(&self.pool)
            .await?
            .try_get("total")?;

        let mut page_builder =
            sqlx::QueryBuilder::new(format!("SELECT {} FROM content_items", ITEM_COLUMNS));
        push_list_filters(&mut page_builder, module, &query);
        page_builder
            .push(format!(" ORDER BY {}", order_clause(query.sort_by)))
            .push(" LIMIT ")
            .push_bind(query.pagination.limit as i64)
            .push(" OFFSET ")
            .push_bind(query.pagination.offset() as i64);

        let rows = page_builder.build().fetch_all(&self.pool).await?;
        let items = rows
            .iter()
            .map(item_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ListPage { items, pagination: PageMeta::compute(query.pagination, total.max(0) as u64) })
    }

    async fn get_by_slug(
        &self,
        module: ContentModule,
        slug: &str,
        drafts: DraftVisibility,
    ) -> Result<Option<ContentItem>, GatewayError> {
        let sql = format!(
            "SELECT {} FROM content_items WHERE module = $1 AND slug = $2",
            ITEM_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(module.as_str())
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let item = item_from_row(&row)?;
                Ok(drafts.allows(&item).then_some(item))
            }
            None => Ok(None),
        }
    }

    async fn get_by_id(
        &self,
        module: ContentModule,
        id: Uuid,
    ) -> Result<Option<ContentItem>, GatewayError> {
        let sql = format!(
            "SELECT {} FROM content_items WHERE module = $1 AND id = $2",
            ITEM_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(module.as_str())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(item_from_row).transpose()
    }

    async fn create(
        &self,
        module: ContentModule,
        input: CreateContent,
    ) -> Result<Uuid, GatewayError> {
        let now = self.clock.now();
        let status = input.status.unwrap_or(ItemStatus::Published);
        let published_at: Option<DateTime<Utc>> =
            (status == ItemStatus::Published).then_some(now);

        let slug = match &input.slug {
            Some(slug) => slug.clone(),
            None => {
                let base = slugify(&input.title);
                let taken: Vec<String> = sqlx::query(
                    "SELECT slug FROM content_items WHERE module = $1 AND slug LIKE $2 || '%'",
                )
                .bind(module.as_str())
                .bind(&base)
                .fetch_all(&self.pool)
                .await?
                .iter()
                .map(|row| row.try_get::<String, _>("slug"))
                .collect::<Result<_, _>>()?;

                let mut candidate = base.clone();
                let mut suffix = 2;
                while taken.iter().any(|s| s == &candidate) {
                    candidate = format!("{}-{}", base, suffix);
                    suffix += 1;
                }
                candidate
            }
        };

        let id = Uuid::new_v4();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO content_items
                (id, module, slug, title, body, author_id, author_display_name,
                 category, status, created_at, updated_at, published_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10, $11)
            "#,
        )
        .bind(id)
        .bind(module.as_str())
        .bind(&slug)
        .bind(&input.title)
        .bind(&input.body)
        .bind(input.author_id)
        .bind(&input.author_display_name)
        .bind(&input.category)
        .bind(status.as_str())
        .bind(now)
        .bind(published_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_insert_conflict(e, &slug))?;

        let delta: i64 = if status == ItemStatus::Published { 1 } else { 0 };
        sqlx::query(
            r#"
            INSERT INTO categories (id, module, name, slug, ord, posts_count)
            VALUES ($1, $2, $3, $4,
                    (SELECT COUNT(*) FROM categories WHERE module = $2), $5)
            ON CONFLICT (module, name)
            DO UPDATE SET posts_count = GREATEST(categories.posts_count + $5, 0)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(module.as_str())
        .bind(&input.category)
        .bind(slugify(&input.category))
        .bind(delta)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(id)
    }

    async fn update(
        &self,
        module: ContentModule,
        id: Uuid,
        input: UpdateContent,
    ) -> Result<(), GatewayError> {
        let now = self.clock.now();
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "SELECT {} FROM content_items WHERE module = $1 AND id = $2 FOR UPDATE",
            ITEM_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(module.as_str())
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("{} not found", module)))?;
        let current = item_from_row(&row)?;

        let title = input.title.unwrap_or_else(|| current.title.clone());
        let body = input.body.unwrap_or_else(|| current.body.clone());
        let category = input.category.unwrap_or_else(|| current.category.clone());
        let status = input.status.unwrap_or(current.status);
        let published_at = match (current.published_at, status) {
            (None, ItemStatus::Published) => Some(now),
            (existing, _) => existing,
        };

        sqlx::query(
            r#"
            UPDATE content_items
            SET title = $1, body = $2, category = $3, status = $4,
                published_at = $5, updated_at = $6
            WHERE id = $7
            "#,
        )
        .bind(&title)
        .bind(&body)
        .bind(&category)
        .bind(status.as_str())
        .bind(published_at)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        // Keep category posts_count aligned with published membership
        let was_published = current.status == ItemStatus::Published;
        let is_published = status == ItemStatus::Published;
        if was_published {
            sqlx::query(
                "UPDATE categories SET posts_count = GREATEST(posts_count - 1, 0) \
                 WHERE module = $1 AND name = $2",
            )
            .bind(module.as_str())
            .bind(&current.category)
            .execute(&mut *tx)
            .await?;
        }
        if is_published {
            sqlx::query(
                r#"
                INSERT INTO categories (id, module, name, slug, ord, posts_count)
                VALUES ($1, $2, $3, $4,
                        (SELECT COUNT(*) FROM categories WHERE module = $2), 1)
                ON CONFLICT (module, name)
                DO UPDATE SET posts_count = categories.posts_count + 1
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(module.as_str())
            .bind(&category)
            .bind(slugify(&category))
            .execute(&mut *tx)
            .await?;
        } else {
            // Register the category even for drafts, without counting it
            sqlx::query(
                r#"
                INSERT INTO categories (id, module, name, slug, ord, posts_count)
                VALUES ($1, $2, $3, $4,
                        (SELECT COUNT(*) FROM categories WHERE module = $2), 0)
                ON CONFLICT (module, name) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(module.as_str())
            .bind(&category)
            .bind(slugify(&category))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_stats(&self, module: ContentModule) -> Result<ModuleStats, GatewayError> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'published') AS published_count,
                COUNT(*) FILTER (WHERE status = 'draft') AS draft_count,
                COALESCE(SUM(views_count), 0) AS views_count,
                COALESCE(SUM(likes_count), 0) AS likes_count,
                COALESCE(SUM(bookmarks_count), 0) AS bookmarks_count,
                COALESCE(SUM(helpfuls_count), 0) AS helpfuls_count,
                COALESCE(SUM(shares_count), 0) AS shares_count
            FROM content_items
            WHERE module = $1
            "#,
        )
        .bind(module.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(ModuleStats {
            published_count: row.try_get("published_count")?,
            draft_count: row.try_get("draft_count")?,
            views_count: row.try_get("views_count")?,
            likes_count: row.try_get("likes_count")?,
            bookmarks_count: row.try_get("bookmarks_count")?,
            helpfuls_count: row.try_get("helpfuls_count")?,
            shares_count: row.try_get("shares_count")?,
        })
    }

    async fn get_categories(&self, module: ContentModule) -> Result<Vec<Category>, GatewayError> {
        let rows = sqlx::query(
            "SELECT id, name, slug, ord, posts_count FROM categories \
             WHERE module = $1 ORDER BY ord ASC, name ASC",
        )
        .bind(module.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(Category {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    slug: row.try_get("slug")?,
                    order: row.try_get("ord")?,
                    posts_count: row.try_get("posts_count")?,
                })
            })
            .collect()
    }

    async fn record_interaction(
        &self,
        module: ContentModule,
        user_id: Uuid,
        item_id: Uuid,
        kind: InteractionKind,
    ) -> Result<ToggleOutcome, GatewayError> {
        let now = self.clock.now();
        let mut tx = self.pool.begin().await?;

        // Lock the item row first: concurrent toggles for the same item
        // serialize here, and the counter adjustment below commits with the
        // record flip or not at all.
        let lock_sql = format!(
            "SELECT {} FROM content_items WHERE module = $1 AND id = $2 FOR UPDATE",
            ITEM_COLUMNS
        );
        sqlx::query(&lock_sql)
            .bind(module.as_str())
            .bind(item_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("{} not found", module)))?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO interactions (user_id, item_id, kind, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, item_id, kind) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(item_id)
        .bind(kind.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let is_new = inserted == 1;
        if !is_new {
            sqlx::query(
                "DELETE FROM interactions WHERE user_id = $1 AND item_id = $2 AND kind = $3",
            )
            .bind(user_id)
            .bind(item_id)
            .bind(kind.as_str())
            .execute(&mut *tx)
            .await?;
        }

        let column = counter_column(kind);
        let delta = if is_new { 1i64 } else { -1i64 };
        let update_sql = format!(
            "UPDATE content_items SET {col} = GREATEST({col} + $1, 0) WHERE id = $2 \
             RETURNING {columns}",
            col = column,
            columns = ITEM_COLUMNS
        );
        let row = sqlx::query(&update_sql)
            .bind(delta)
            .bind(item_id)
            .fetch_one(&mut *tx)
            .await?;
        let item = item_from_row(&row)?;

        tx.commit().await?;
        Ok(ToggleOutcome { is_new, item })
    }

    async fn record_view(&self, module: ContentModule, item_id: Uuid) -> Result<i64, GatewayError> {
        let row = sqlx::query(
            "UPDATE content_items SET views_count = views_count + 1 \
             WHERE module = $1 AND id = $2 RETURNING views_count",
        )
        .bind(module.as_str())
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| GatewayError::NotFound(format!("{} not found", module)))?;

        Ok(row.try_get("views_count")?)
    }

    async fn list_replies(&self, post_id: Uuid) -> Result<Vec<Reply>, GatewayError> {
        let rows = sqlx::query(
            "SELECT id, post_id, author_id, author_display_name, content, reply_to_id, created_at \
             FROM replies WHERE post_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(Reply {
                    id: row.try_get("id")?,
                    post_id: row.try_get("post_id")?,
                    author_id: row.try_get("author_id")?,
                    author_display_name: row.try_get("author_display_name")?,
                    content: row.try_get("content")?,
                    reply_to_id: row.try_get("reply_to_id")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    async fn add_reply(&self, post_id: Uuid, input: NewReply) -> Result<Reply, GatewayError> {
        let now = self.clock.now();
        let mut tx = self.pool.begin().await?;

        let thread_exists: bool = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM content_items WHERE id = $1 AND module = 'thread') AS ok",
        )
        .bind(post_id)
        .fetch_one(&mut *tx)
        .await?
        .try_get("ok")?;
        if !thread_exists {
            return Err(GatewayError::NotFound("thread not found".to_string()));
        }

        if let Some(parent) = input.reply_to_id {
            let parent_ok: bool = sqlx::query(
                "SELECT EXISTS (SELECT 1 FROM replies WHERE id = $1 AND post_id = $2) AS ok",
            )
            .bind(parent)
            .bind(post_id)
            .fetch_one(&mut *tx)
            .await?
            .try_get("ok")?;
            if !parent_ok {
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

        sqlx::query(
            r#"
            INSERT INTO replies
                (id, post_id, author_id, author_display_name, content, reply_to_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(reply.id)
        .bind(reply.post_id)
        .bind(reply.author_id)
        .bind(&reply.author_display_name)
        .bind(&reply.content)
        .bind(reply.reply_to_id)
        .bind(reply.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(reply)
    }

    async fn health(&self) -> Result<(), GatewayError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
