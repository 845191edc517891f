use axum::extract::{ConnectInfo, Extension, Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use uuid::Uuid;

use crate::auth::permissions::{can_perform, Capability};
use crate::auth::Principal;
use crate::content::{
    Category, ContentItem, ContentModule, InteractionKind, ItemStatus, ModuleStats, SortBy,
};
use crate::error::ApiError;
use crate::gateway::{
    CreateContent, DraftVisibility, ListPage, ListQuery, Pagination, ToggleOutcome, UpdateContent,
};
use crate::pipeline::schema::{Field, FieldKind, Shape};
use crate::pipeline::{self, AuthMode, BusinessContext, RequestParts, RouteConfig};
use crate::response::{ApiResponse, ApiResult};
use crate::state::AppState;

use super::{input_i64, input_str, params_to_payload};

static LIST_SHAPE: Shape = Shape {
    fields: &[
        Field { name: "page", kind: FieldKind::Int { min: 1, max: 1_000_000 }, required: false },
        Field { name: "limit", kind: FieldKind::Int { min: 1, max: 1_000 }, required: false },
        Field { name: "category", kind: FieldKind::Text { max_len: 100 }, required: false },
        Field {
            name: "status",
            kind: FieldKind::Enum(&["draft", "published", "archived"]),
            required: false,
        },
        Field {
            name: "sort_by",
            kind: FieldKind::Enum(&["newest", "oldest", "most_viewed", "most_liked"]),
            required: false,
        },
    ],
};

static CREATE_SHAPE: Shape = Shape {
    fields: &[
        Field { name: "title", kind: FieldKind::Text { max_len: 200 }, required: true },
        Field { name: "body", kind: FieldKind::Text { max_len: 100_000 }, required: true },
        Field { name: "category", kind: FieldKind::Text { max_len: 100 }, required: true },
        Field { name: "slug", kind: FieldKind::Slug { max_len: 200 }, required: false },
        Field {
            name: "status",
            kind: FieldKind::Enum(&["draft", "published"]),
            required: false,
        },
    ],
};

static UPDATE_SHAPE: Shape = Shape {
    fields: &[
        Field { name: "title", kind: FieldKind::Text { max_len: 200 }, required: false },
        Field { name: "body", kind: FieldKind::Text { max_len: 100_000 }, required: false },
        Field { name: "category", kind: FieldKind::Text { max_len: 100 }, required: false },
        Field {
            name: "status",
            kind: FieldKind::Enum(&["draft", "published", "archived"]),
            required: false,
        },
    ],
};

static INTERACT_SHAPE: Shape = Shape {
    fields: &[Field {
        name: "action",
        kind: FieldKind::Enum(&["like", "bookmark", "helpful", "share"]),
        required: true,
    }],
};

/// Draft visibility for this viewer: view-drafts capability opens all
/// drafts, otherwise authors see their own, anonymous callers none.
pub(super) fn draft_visibility(
    principal: Option<&Principal>,
    module: ContentModule,
) -> DraftVisibility {
    if can_perform(principal, Capability::ViewDrafts, module, None) {
        DraftVisibility::All
    } else if let Some(p) = principal {
        DraftVisibility::Own(p.user_id)
    } else {
        DraftVisibility::PublishedOnly
    }
}

/// GET /api/<module> - paginated, filtered listing
pub async fn list(
    State(state): State<AppState>,
    Extension(module): Extension<ContentModule>,
    headers: HeaderMap,
    connect: Option<ConnectInfo<SocketAddr>>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<ListPage> {
    let config = RouteConfig {
        route: "list",
        module: Some(module),
        auth: AuthMode::Optional,
        rate_limit: Some(state.config.api.read_rate_limit),
        schema: Some(&LIST_SHAPE),
        mutation: false,
    };
    let req = RequestParts {
        headers,
        remote_addr: connect.map(|c| c.0),
        payload: params_to_payload(params),
    };
    let default_limit = state.config.api.default_page_limit;
    let max_limit = state.config.api.max_page_limit;

    pipeline::handle(&state, config, req, move |ctx: BusinessContext| {
        async move {
            let pagination = Pagination::clamp(
                input_i64(&ctx.input, "page"),
                input_i64(&ctx.input, "limit"),
                default_limit,
                max_limit,
            );
            // "all" and absence both mean no category filter
            let category = input_str(&ctx.input, "category")
                .filter(|c| *c != "all")
                .map(str::to_string);
            let status = input_str(&ctx.input, "status").and_then(ItemStatus::parse);
            let sort_by = input_str(&ctx.input, "sort_by")
                .and_then(SortBy::parse)
                .unwrap_or_default();

            let query = ListQuery {
                category,
                status,
                sort_by,
                pagination,
                drafts: draft_visibility(ctx.principal.as_ref(), module),
            };
            let page = ctx.gateway.list(module, query).await?;
            Ok(ApiResponse::success(page))
        }
        .boxed()
    })
    .await
}

/// GET /api/<module>/:slug - single item, counting the view
pub async fn get_by_slug(
    State(state): State<AppState>,
    Extension(module): Extension<ContentModule>,
    Path(slug): Path<String>,
    headers: HeaderMap,
    connect: Option<ConnectInfo<SocketAddr>>,
) -> ApiResult<ContentItem> {
    let config = RouteConfig {
        route: "get",
        module: Some(module),
        auth: AuthMode::Optional,
        rate_limit: Some(state.config.api.read_rate_limit),
        schema: None,
        mutation: false,
    };
    let req = RequestParts { headers, remote_addr: connect.map(|c| c.0), payload: Value::Null };

    pipeline::handle(&state, config, req, move |ctx: BusinessContext| {
        async move {
            let drafts = draft_visibility(ctx.principal.as_ref(), module);
            let mut item = ctx
                .gateway
                .get_by_slug(module, &slug, drafts)
                .await?
                .ok_or_else(|| ApiError::not_found(format!("{} not found", module)))?;

            // Report the store's refreshed count, not a local guess
            item.stats.views_count = ctx.gateway.record_view(module, item.id).await?;
            Ok(ApiResponse::success(item))
        }
        .boxed()
    })
    .await
}

/// POST /api/<module> - create an item; defaults to published
pub async fn create(
    State(state): State<AppState>,
    Extension(module): Extension<ContentModule>,
    headers: HeaderMap,
    connect: Option<ConnectInfo<SocketAddr>>,
    body: Option<Json<Value>>,
) -> ApiResult<ContentItem> {
    let config = RouteConfig {
        route: "create",
        module: Some(module),
        auth: AuthMode::Required,
        rate_limit: Some(state.config.api.write_rate_limit),
        schema: Some(&CREATE_SHAPE),
        mutation: true,
    };
    let req = RequestParts {
        headers,
        remote_addr: connect.map(|c| c.0),
        payload: body.map(|Json(v)| v).unwrap_or(Value::Null),
    };

    pipeline::handle(&state, config, req, move |ctx: BusinessContext| {
        async move {
            let principal = ctx
                .principal
                .as_ref()
                .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;
            if !can_perform(Some(principal), Capability::Create, module, None) {
                return Err(ApiError::forbidden(format!(
                    "Not allowed to create {} content",
                    module
                )));
            }

            let input = CreateContent {
                title: input_str(&ctx.input, "title").unwrap_or_default().to_string(),
                body: input_str(&ctx.input, "body").unwrap_or_default().to_string(),
                category: input_str(&ctx.input, "category").unwrap_or_default().to_string(),
                slug: input_str(&ctx.input, "slug").map(str::to_string),
                status: input_str(&ctx.input, "status").and_then(ItemStatus::parse),
                author_id: principal.user_id,
                author_display_name: principal.display_name.clone(),
            };

            let id = ctx.gateway.create(module, input).await?;
            let item = ctx
                .gateway
                .get_by_id(module, id)
                .await?
                .ok_or_else(|| ApiError::internal_server_error("Created item not readable"))?;
            Ok(ApiResponse::created(item))
        }
        .boxed()
    })
    .await
}

/// PUT /api/<module>/id/:id - update an item (author or role-gated)
pub async fn update(
    State(state): State<AppState>,
    Extension(module): Extension<ContentModule>,
    Path(id): Path<String>,
    headers: HeaderMap,
    connect: Option<ConnectInfo<SocketAddr>>,
    body: Option<Json<Value>>,
) -> ApiResult<ContentItem> {
    let config = RouteConfig {
        route: "update",
        module: Some(module),
        auth: AuthMode::Required,
        rate_limit: Some(state.config.api.write_rate_limit),
        schema: Some(&UPDATE_SHAPE),
        mutation: true,
    };
    let req = RequestParts {
        headers,
        remote_addr: connect.map(|c| c.0),
        payload: body.map(|Json(v)| v).unwrap_or(Value::Null),
    };

    pipeline::handle(&state, config, req, move |ctx: BusinessContext| {
        async move {
            let id = Uuid::parse_str(&id)
                .map_err(|_| ApiError::bad_request("Invalid item id"))?;
            let existing = ctx
                .gateway
                .get_by_id(module, id)
                .await?
                .ok_or_else(|| ApiError::not_found(format!("{} not found", module)))?;

            if !can_perform(ctx.principal.as_ref(), Capability::Edit, module, Some(&existing)) {
                return Err(ApiError::forbidden(format!(
                    "Not allowed to edit this {}",
                    module
                )));
            }

            let input = UpdateContent {
                title: input_str(&ctx.input, "title").map(str::to_string),
                body: input_str(&ctx.input, "body").map(str::to_string),
                category: input_str(&ctx.input, "category").map(str::to_string),
                status: input_str(&ctx.input, "status").and_then(ItemStatus::parse),
            };
            ctx.gateway.update(module, id, input).await?;

            let item = ctx
                .gateway
                .get_by_id(module, id)
                .await?
                .ok_or_else(|| ApiError::internal_server_error("Updated item not readable"))?;
            Ok(ApiResponse::with_message(item, "Updated"))
        }
        .boxed()
    })
    .await
}

/// POST /api/<module>/:slug/interactions - toggle a per-user interaction.
///
/// This is a strict toggle, not an idempotent set: two identical calls
/// alternate the state, and `isNew` reports the direction.
pub async fn interact(
    State(state): State<AppState>,
    Extension(module): Extension<ContentModule>,
    Path(slug): Path<String>,
    headers: HeaderMap,
    connect: Option<ConnectInfo<SocketAddr>>,
    body: Option<Json<Value>>,
) -> ApiResult<ToggleOutcome> {
    let config = RouteConfig {
        route: "interact",
        module: Some(module),
        auth: AuthMode::Required,
        rate_limit: Some(state.config.api.write_rate_limit),
        schema: Some(&INTERACT_SHAPE),
        mutation: true,
    };
    let req = RequestParts {
        headers,
        remote_addr: connect.map(|c| c.0),
        payload: body.map(|Json(v)| v).unwrap_or(Value::Null),
    };

    pipeline::handle(&state, config, req, move |ctx: BusinessContext| {
        async move {
            let principal = ctx
                .principal
                .as_ref()
                .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;
            let kind = input_str(&ctx.input, "action")
                .and_then(InteractionKind::parse)
                .ok_or_else(|| ApiError::bad_request("Unknown interaction action"))?;

            let drafts = draft_visibility(Some(principal), module);
            let item = ctx
                .gateway
                .get_by_slug(module, &slug, drafts)
                .await?
                .ok_or_else(|| ApiError::not_found(format!("{} not found", module)))?;

            let outcome = ctx
                .gateway
                .record_interaction(module, principal.user_id, item.id, kind)
                .await?;

            let message = if outcome.is_new { "Added" } else { "Removed" };
            Ok(ApiResponse::with_message(outcome, message))
        }
        .boxed()
    })
    .await
}

/// GET /api/<module>/categories
pub async fn categories(
    State(state): State<AppState>,
    Extension(module): Extension<ContentModule>,
    headers: HeaderMap,
    connect: Option<ConnectInfo<SocketAddr>>,
) -> ApiResult<Vec<Category>> {
    let config = RouteConfig {
        route: "categories",
        module: Some(module),
        auth: AuthMode::None,
        rate_limit: Some(state.config.api.read_rate_limit),
        schema: None,
        mutation: false,
    };
    let req = RequestParts { headers, remote_addr: connect.map(|c| c.0), payload: Value::Null };

    pipeline::handle(&state, config, req, move |ctx: BusinessContext| {
        async move {
            let categories = ctx.gateway.get_categories(module).await?;
            Ok(ApiResponse::success(categories))
        }
        .boxed()
    })
    .await
}

/// GET /api/<module>/stats
pub async fn stats(
    State(state): State<AppState>,
    Extension(module): Extension<ContentModule>,
    headers: HeaderMap,
    connect: Option<ConnectInfo<SocketAddr>>,
) -> ApiResult<ModuleStats> {
    let config = RouteConfig {
        route: "stats",
        module: Some(module),
        auth: AuthMode::None,
        rate_limit: Some(state.config.api.read_rate_limit),
        schema: None,
        mutation: false,
    };
    let req = RequestParts { headers, remote_addr: connect.map(|c| c.0), payload: Value::Null };

    pipeline::handle(&state, config, req, move |ctx: BusinessContext| {
        async move {
            let stats = ctx.gateway.get_stats(module).await?;
            Ok(ApiResponse::success(stats))
        }
        .boxed()
    })
    .await
}
