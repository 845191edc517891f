use std::sync::Arc;

use crate::cache::CacheInvalidator;
use crate::config::AppConfig;
use crate::gateway::ContentGateway;
use crate::pipeline::rate_limit::FixedWindowLimiter;
use crate::time::SharedClock;

/// Injected dependency bundle shared by every route.
///
/// Constructed once at startup (or per test) and handed to the router; no
/// component reaches for a global. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub gateway: Arc<dyn ContentGateway>,
    pub limiter: Arc<FixedWindowLimiter>,
    pub clock: SharedClock,
    pub cache: CacheInvalidator,
}

impl AppState {
    pub fn new(config: AppConfig, gateway: Arc<dyn ContentGateway>, clock: SharedClock) -> Self {
        Self {
            config: Arc::new(config),
            limiter: Arc::new(FixedWindowLimiter::new(clock.clone())),
            gateway,
            clock,
            cache: CacheInvalidator::default(),
        }
    }
}
