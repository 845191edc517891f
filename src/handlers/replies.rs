use axum::extract::{ConnectInfo, Extension, Path, State};
use axum::http::HeaderMap;
use axum::Json;
use futures::FutureExt;
use serde_json::Value;
use std::net::SocketAddr;
use uuid::Uuid;

use crate::content::{ContentModule, Reply};
use crate::error::ApiError;
use crate::gateway::NewReply;
use crate::pipeline::schema::{Field, FieldKind, Shape};
use crate::pipeline::{self, AuthMode, BusinessContext, RequestParts, RouteConfig};
use crate::response::{ApiResponse, ApiResult};
use crate::state::AppState;

use super::content::draft_visibility;
use super::input_str;

static REPLY_SHAPE: Shape = Shape {
    fields: &[
        Field { name: "content", kind: FieldKind::Text { max_len: 10_000 }, required: true },
        Field { name: "reply_to_id", kind: FieldKind::Text { max_len: 36 }, required: false },
    ],
};

/// GET /api/threads/:slug/replies
pub async fn list(
    State(state): State<AppState>,
    Extension(module): Extension<ContentModule>,
    Path(slug): Path<String>,
    headers: HeaderMap,
    connect: Option<ConnectInfo<SocketAddr>>,
) -> ApiResult<Vec<Reply>> {
    let config = RouteConfig {
        route: "replies:list",
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
            let thread = ctx
                .gateway
                .get_by_slug(module, &slug, drafts)
                .await?
                .ok_or_else(|| ApiError::not_found("thread not found"))?;

            let replies = ctx.gateway.list_replies(thread.id).await?;
            Ok(ApiResponse::success(replies))
        }
        .boxed()
    })
    .await
}

/// POST /api/threads/:slug/replies - append a reply; any authenticated
/// caller may participate
pub async fn create(
    State(state): State<AppState>,
    Extension(module): Extension<ContentModule>,
    Path(slug): Path<String>,
    headers: HeaderMap,
    connect: Option<ConnectInfo<SocketAddr>>,
    body: Option<Json<Value>>,
) -> ApiResult<Reply> {
    let config = RouteConfig {
        route: "replies:create",
        module: Some(module),
        auth: AuthMode::Required,
        rate_limit: Some(state.config.api.write_rate_limit),
        schema: Some(&REPLY_SHAPE),
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

            let reply_to_id = match input_str(&ctx.input, "reply_to_id") {
                Some(raw) => Some(
                    Uuid::parse_str(raw)
                        .map_err(|_| ApiError::bad_request("Invalid reply_to_id"))?,
                ),
                None => None,
            };

            let drafts = draft_visibility(Some(principal), module);
            let thread = ctx
                .gateway
                .get_by_slug(module, &slug, drafts)
                .await?
                .ok_or_else(|| ApiError::not_found("thread not found"))?;

            let reply = ctx
                .gateway
                .add_reply(
                    thread.id,
                    NewReply {
                        author_id: principal.user_id,
                        author_display_name: principal.display_name.clone(),
                        content: input_str(&ctx.input, "content").unwrap_or_default().to_string(),
                        reply_to_id,
                    },
                )
                .await?;
            Ok(ApiResponse::created(reply))
        }
        .boxed()
    })
    .await
}
