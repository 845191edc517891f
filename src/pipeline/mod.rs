pub mod rate_limit;
pub mod schema;

use axum::http::HeaderMap;
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::auth::{resolve_identity, Principal};
use crate::config::RateLimitSettings;
use crate::content::ContentModule;
use crate::error::ApiError;
use crate::gateway::ContentGateway;
use crate::response::{ApiResponse, ApiResult};
use crate::state::AppState;

use rate_limit::limiter_key;
use schema::Shape;

/// Identity requirement for a route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// A resolvable principal is mandatory; absence is a 401
    Required,
    /// A principal is attached when present; absence is fine
    Optional,
    /// Identity is not consulted at all
    None,
}

/// Per-route pipeline declaration
#[derive(Debug, Clone, Copy)]
pub struct RouteConfig {
    /// Operation name; combined with the module it forms the rate-limit key
    /// namespace, so one route's budget never starves another
    pub route: &'static str,
    pub module: Option<ContentModule>,
    pub auth: AuthMode,
    pub rate_limit: Option<RateLimitSettings>,
    pub schema: Option<&'static Shape>,
    /// Publish the module's cache tags after a successful business stage
    pub mutation: bool,
}

impl RouteConfig {
    fn namespace(&self) -> String {
        match self.module {
            Some(module) => format!("{}:{}", module, self.route),
            None => self.route.to_string(),
        }
    }
}

/// Raw request material the pipeline consumes before any business logic
pub struct RequestParts {
    pub headers: HeaderMap,
    pub remote_addr: Option<SocketAddr>,
    /// Query or body payload, validated against the declared shape
    pub payload: Value,
}

/// Everything a business function receives: resolved identity, validated
/// input, and the request-scoped gateway handle.
pub struct BusinessContext {
    pub principal: Option<Principal>,
    pub input: Value,
    pub gateway: Arc<dyn ContentGateway>,
}

/// Run a request through the shared pipeline.
///
/// Stages execute in fixed order and short-circuit on first failure:
/// rate limiting, identity enforcement, schema validation, then the
/// business function. The first three stages never touch persistent state;
/// side effects are confined to the business stage, which is bounded by the
/// configured gateway timeout. Cache tags are published only after a
/// successful mutation.
pub async fn handle<T, F>(
    state: &AppState,
    config: RouteConfig,
    req: RequestParts,
    business: F,
) -> ApiResult<T>
where
    T: Serialize,
    F: FnOnce(BusinessContext) -> BoxFuture<'static, ApiResult<T>>,
{
    // Identity is resolved leniently up front so the rate limiter can key on
    // it; strictness is applied at the enforcement stage below.
    let identity = match config.auth {
        AuthMode::None => Ok(None),
        AuthMode::Required | AuthMode::Optional => {
            resolve_identity(&req.headers, &state.config.security.jwt_secret)
        }
    };

    // Stage 1: rate limiting, before any other work
    if let Some(settings) = config.rate_limit {
        let caller = caller_key(state, &req, &identity);
        let admission = state.limiter.admit(&limiter_key(&config.namespace(), &caller), settings);
        if !admission.allowed {
            tracing::warn!(route = config.route, caller = %caller, "rate limit exceeded");
            return Err(ApiError::too_many_requests(
                "Rate limit exceeded",
                admission.retry_after_secs.unwrap_or(1),
            ));
        }
    }

    // Stage 2: identity enforcement
    let principal = match (config.auth, identity) {
        (AuthMode::None, _) => None,
        (_, Err(err)) => return Err(err),
        (AuthMode::Required, Ok(None)) => {
            return Err(ApiError::unauthorized("Authentication required"));
        }
        (_, Ok(principal)) => principal,
    };

    // Stage 3: schema validation
    let input = match config.schema {
        Some(shape) => shape.validate(&req.payload)?,
        None => req.payload,
    };

    // Stage 4: business function with a request-scoped gateway handle,
    // bounded by the configured timeout
    let context =
        BusinessContext { principal, input, gateway: state.gateway.clone() };
    let timeout = std::time::Duration::from_millis(state.config.api.gateway_timeout_ms);
    let result = match tokio::time::timeout(timeout, business(context)).await {
        Ok(result) => result,
        Err(_) => {
            tracing::error!(route = config.route, "business stage timed out");
            return Err(ApiError::internal_server_error("Request processing timed out"));
        }
    };

    // Stage 5: invalidation signal, only after a successful mutation
    if result.is_ok() && config.mutation {
        if let Some(module) = config.module {
            state.cache.invalidate(module.cache_tags());
        }
    }

    result
}

/// Rate-limit caller key: the resolved identity when available, else the
/// caller's network address. X-Forwarded-For is honored only when the
/// config trusts the fronting proxy.
fn caller_key(
    state: &AppState,
    req: &RequestParts,
    identity: &Result<Option<Principal>, ApiError>,
) -> String {
    if let Ok(Some(principal)) = identity {
        return format!("user:{}", principal.user_id);
    }

    if state.config.api.trust_proxy {
        if let Some(forwarded) = req
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
        {
            let hop = forwarded.trim();
            if !hop.is_empty() {
                return format!("ip:{}", hop);
            }
        }
    }

    match req.remote_addr {
        Some(addr) => format!("ip:{}", addr.ip()),
        None => "ip:unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{issue_token, Role};
    use crate::config::AppConfig;
    use crate::gateway::memory::MemoryGateway;
    use crate::pipeline::schema::{Field, FieldKind};
    use crate::time::ManualClock;
    use axum::http::HeaderValue;
    use chrono::TimeZone;
    use futures::FutureExt;
    use serde_json::json;
    use uuid::Uuid;

    const SECRET: &str = "pipeline-test-secret";

    fn test_state() -> (Arc<ManualClock>, AppState) {
        let clock = Arc::new(ManualClock::new(
            chrono::Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
        ));
        let mut config = AppConfig::from_env();
        config.security.jwt_secret = SECRET.to_string();
        let gateway = Arc::new(MemoryGateway::new(clock.clone()));
        (clock.clone(), AppState::new(config, gateway, clock))
    }

    fn bare_request(payload: Value) -> RequestParts {
        RequestParts { headers: HeaderMap::new(), remote_addr: None, payload }
    }

    fn authed_request(payload: Value, roles: Vec<Role>) -> RequestParts {
        let principal = Principal {
            user_id: Uuid::new_v4(),
            display_name: "Tester".to_string(),
            roles,
        };
        let token = issue_token(&principal, SECRET, 1);
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        RequestParts { headers, remote_addr: None, payload }
    }

    static REQUIRED_TITLE: Shape = Shape {
        fields: &[Field {
            name: "title",
            kind: FieldKind::Text { max_len: 100 },
            required: true,
        }],
    };

    fn open_route() -> RouteConfig {
        RouteConfig {
            route: "test",
            module: None,
            auth: AuthMode::None,
            rate_limit: None,
            schema: None,
            mutation: false,
        }
    }

    #[tokio::test]
    async fn missing_identity_beats_invalid_payload() {
        let (_, state) = test_state();
        let config = RouteConfig {
            auth: AuthMode::Required,
            schema: Some(&REQUIRED_TITLE),
            ..open_route()
        };

        // Simultaneously invalid input and no identity: expect 401, not 400
        let result: ApiResult<Value> = handle(
            &state,
            config,
            bare_request(json!({"bogus": 1})),
            |_| async { Ok(ApiResponse::success(json!(null))) }.boxed(),
        )
        .await;

        assert_eq!(result.unwrap_err().status_code(), 401);
    }

    #[tokio::test]
    async fn rate_limit_rejects_before_business_runs() {
        let (_, state) = test_state();
        let config = RouteConfig {
            rate_limit: Some(RateLimitSettings { requests: 1, window_secs: 60 }),
            ..open_route()
        };

        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        for expected_status in [None, Some(429)] {
            let calls = calls.clone();
            let result: ApiResult<Value> = handle(
                &state,
                config,
                bare_request(Value::Null),
                move |_| {
                    async move {
                        calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                        Ok(ApiResponse::success(json!(null)))
                    }
                    .boxed()
                },
            )
            .await;

            match expected_status {
                None => assert!(result.is_ok()),
                Some(status) => {
                    assert_eq!(result.unwrap_err().status_code(), status);
                }
            }
        }

        // The second request was rejected before the business stage
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rate_limit_window_reset_readmits() {
        let (clock, state) = test_state();
        let config = RouteConfig {
            rate_limit: Some(RateLimitSettings { requests: 1, window_secs: 60 }),
            ..open_route()
        };

        let run = |state: AppState| async move {
            handle::<Value, _>(&state, config, bare_request(Value::Null), |_| {
                async { Ok(ApiResponse::success(json!(null))) }.boxed()
            })
            .await
        };

        assert!(run(state.clone()).await.is_ok());
        assert!(run(state.clone()).await.is_err());
        clock.advance(chrono::Duration::seconds(61));
        assert!(run(state).await.is_ok());
    }

    #[tokio::test]
    async fn optional_auth_passes_none_without_error() {
        let (_, state) = test_state();
        let config = RouteConfig { auth: AuthMode::Optional, ..open_route() };

        let result: ApiResult<bool> = handle(
            &state,
            config,
            bare_request(Value::Null),
            |ctx| async move { Ok(ApiResponse::success(ctx.principal.is_none())) }.boxed(),
        )
        .await;

        assert!(result.unwrap().data);
    }

    #[tokio::test]
    async fn optional_auth_still_rejects_invalid_tokens() {
        let (_, state) = test_state();
        let config = RouteConfig { auth: AuthMode::Optional, ..open_route() };

        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer not-a-token"));
        let req = RequestParts { headers, remote_addr: None, payload: Value::Null };

        let result: ApiResult<Value> = handle(&state, config, req, |_| {
            async { Ok(ApiResponse::success(json!(null))) }.boxed()
        })
        .await;

        assert_eq!(result.unwrap_err().status_code(), 401);
    }

    #[tokio::test]
    async fn schema_failures_stop_before_business() {
        let (_, state) = test_state();
        let config = RouteConfig { schema: Some(&REQUIRED_TITLE), ..open_route() };

        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let calls_in = calls.clone();
        let result: ApiResult<Value> = handle(
            &state,
            config,
            bare_request(json!({})),
            move |_| {
                async move {
                    calls_in.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    Ok(ApiResponse::success(json!(null)))
                }
                .boxed()
            },
        )
        .await;

        assert_eq!(result.unwrap_err().status_code(), 400);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn validated_input_reaches_business() {
        let (_, state) = test_state();
        let config = RouteConfig {
            auth: AuthMode::Required,
            schema: Some(&REQUIRED_TITLE),
            ..open_route()
        };

        let result: ApiResult<String> = handle(
            &state,
            config,
            authed_request(json!({"title": "Hello", "junk": true}), vec![Role::Member]),
            |ctx| {
                async move {
                    assert!(ctx.principal.is_some());
                    assert!(ctx.input.get("junk").is_none());
                    Ok(ApiResponse::success(
                        ctx.input["title"].as_str().unwrap().to_string(),
                    ))
                }
                .boxed()
            },
        )
        .await;

        assert_eq!(result.unwrap().data, "Hello");
    }

    #[tokio::test]
    async fn mutation_success_publishes_cache_tags() {
        let (_, state) = test_state();
        let mut rx = state.cache.subscribe();
        let config = RouteConfig {
            module: Some(ContentModule::Guide),
            mutation: true,
            ..open_route()
        };

        let _: ApiResult<Value> = handle(&state, config, bare_request(Value::Null), |_| {
            async { Ok(ApiResponse::success(json!(null))) }.boxed()
        })
        .await;

        assert_eq!(rx.try_recv().unwrap()[0], "guides");
    }

    #[tokio::test]
    async fn mutation_failure_publishes_nothing() {
        let (_, state) = test_state();
        let mut rx = state.cache.subscribe();
        let config = RouteConfig {
            module: Some(ContentModule::Guide),
            mutation: true,
            ..open_route()
        };

        let _: ApiResult<Value> = handle(&state, config, bare_request(Value::Null), |_| {
            async { Err(ApiError::not_found("gone")) }.boxed()
        })
        .await;

        assert!(rx.try_recv().is_err());
    }
}
