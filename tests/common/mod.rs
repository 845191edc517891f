// Not every test binary uses every helper
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::TimeZone;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use commons_api::auth::{issue_token, Principal, Role};
use commons_api::config::AppConfig;
use commons_api::content::{Category, ContentModule, InteractionKind, ModuleStats, Reply};
use commons_api::gateway::memory::MemoryGateway;
use commons_api::gateway::{
    ContentGateway, CreateContent, DraftVisibility, GatewayError, ListPage, ListQuery, NewReply,
    ToggleOutcome, UpdateContent,
};
use commons_api::state::AppState;
use commons_api::time::ManualClock;

pub const JWT_SECRET: &str = "integration-test-secret";

/// Gateway wrapper counting every store call, used to assert that
/// short-circuited requests never reach the store.
pub struct CountingGateway {
    inner: MemoryGateway,
    calls: AtomicUsize,
}

impl CountingGateway {
    pub fn new(inner: MemoryGateway) -> Self {
        Self { inner, calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn tick(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &MemoryGateway {
        &self.inner
    }
}

#[async_trait]
impl ContentGateway for CountingGateway {
    async fn list(
        &self,
        module: ContentModule,
        query: ListQuery,
    ) -> Result<ListPage, GatewayError> {
        self.tick();
        self.inner.list(module, query).await
    }

    async fn get_by_slug(
        &self,
        module: ContentModule,
        slug: &str,
        drafts: DraftVisibility,
    ) -> Result<Option<commons_api::content::ContentItem>, GatewayError> {
        self.tick();
        self.inner.get_by_slug(module, slug, drafts).await
    }

    async fn get_by_id(
        &self,
        module: ContentModule,
        id: Uuid,
    ) -> Result<Option<commons_api::content::ContentItem>, GatewayError> {
        self.tick();
        self.inner.get_by_id(module, id).await
    }

    async fn create(
        &self,
        module: ContentModule,
        input: CreateContent,
    ) -> Result<Uuid, GatewayError> {
        self.tick();
        self.inner.create(module, input).await
    }

    async fn update(
        &self,
        module: ContentModule,
        id: Uuid,
        input: UpdateContent,
    ) -> Result<(), GatewayError> {
        self.tick();
        self.inner.update(module, id, input).await
    }

    async fn get_stats(&self, module: ContentModule) -> Result<ModuleStats, GatewayError> {
        self.tick();
        self.inner.get_stats(module).await
    }

    async fn get_categories(&self, module: ContentModule) -> Result<Vec<Category>, GatewayError> {
        self.tick();
        self.inner.get_categories(module).await
    }

    async fn record_interaction(
        &self,
        module: ContentModule,
        user_id: Uuid,
        item_id: Uuid,
        kind: InteractionKind,
    ) -> Result<ToggleOutcome, GatewayError> {
        self.tick();
        self.inner.record_interaction(module, user_id, item_id, kind).await
    }

    async fn record_view(&self, module: ContentModule, item_id: Uuid) -> Result<i64, GatewayError> {
        self.tick();
        self.inner.record_view(module, item_id).await
    }

    async fn list_replies(&self, post_id: Uuid) -> Result<Vec<Reply>, GatewayError> {
        self.tick();
        self.inner.list_replies(post_id).await
    }

    async fn add_reply(&self, post_id: Uuid, input: NewReply) -> Result<Reply, GatewayError> {
        self.tick();
        self.inner.add_reply(post_id, input).await
    }

    async fn health(&self) -> Result<(), GatewayError> {
        self.tick();
        self.inner.health().await
    }
}

pub struct TestApp {
    pub router: Router,
    pub gateway: Arc<CountingGateway>,
    pub clock: Arc<ManualClock>,
}

pub fn test_app() -> TestApp {
    test_app_with(|_| {})
}

pub fn test_app_with(customize: impl FnOnce(&mut AppConfig)) -> TestApp {
    let clock = Arc::new(ManualClock::new(
        chrono::Utc.with_ymd_and_hms(2024, 7, 1, 10, 0, 0).unwrap(),
    ));
    let mut config = AppConfig::from_env();
    config.security.jwt_secret = JWT_SECRET.to_string();
    customize(&mut config);

    let gateway = Arc::new(CountingGateway::new(MemoryGateway::new(clock.clone())));
    let state = AppState::new(config, gateway.clone(), clock.clone());
    TestApp { router: commons_api::app(state), gateway, clock }
}

pub fn principal_with(roles: Vec<Role>) -> Principal {
    Principal { user_id: Uuid::new_v4(), display_name: "Test User".to_string(), roles }
}

pub fn token_for(principal: &Principal) -> String {
    issue_token(principal, JWT_SECRET, 1)
}

/// Drive one request through the router and decode the JSON envelope.
pub async fn request(
    router: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

/// Seed a published item and return its slug and id.
pub async fn seed_post(
    app: &TestApp,
    module: ContentModule,
    author: &Principal,
    title: &str,
) -> (String, Uuid) {
    let id = app
        .gateway
        .inner()
        .create(
            module,
            CreateContent {
                title: title.to_string(),
                body: "seeded".to_string(),
                category: "general".to_string(),
                slug: None,
                status: None,
                author_id: author.user_id,
                author_display_name: author.display_name.clone(),
            },
        )
        .await
        .unwrap();
    let item = app.gateway.inner().get_by_id(module, id).await.unwrap().unwrap();
    (item.slug, id)
}
