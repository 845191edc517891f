use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Default page size when the caller omits `limit`
    pub default_page_limit: u32,
    /// Hard cap applied to any caller-supplied `limit`
    pub max_page_limit: u32,
    /// Default rate-limit budget for read routes
    pub read_rate_limit: RateLimitSettings,
    /// Default rate-limit budget for write routes (create/update/interact)
    pub write_rate_limit: RateLimitSettings,
    /// Upper bound on a single gateway call, milliseconds
    pub gateway_timeout_ms: u64,
    /// Honor the first X-Forwarded-For hop when keying anonymous callers.
    /// Only enable behind a proxy that strips client-supplied values.
    pub trust_proxy: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitSettings {
    pub requests: u32,
    pub window_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub connection_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub jwt_secret: String,
    pub cors_origins: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = env::var("API_DEFAULT_PAGE_LIMIT") {
            self.api.default_page_limit = v.parse().unwrap_or(self.api.default_page_limit);
        }
        if let Ok(v) = env::var("API_MAX_PAGE_LIMIT") {
            self.api.max_page_limit = v.parse().unwrap_or(self.api.max_page_limit);
        }
        if let Ok(v) = env::var("API_READ_RATE_LIMIT_REQUESTS") {
            self.api.read_rate_limit.requests = v.parse().unwrap_or(self.api.read_rate_limit.requests);
        }
        if let Ok(v) = env::var("API_READ_RATE_LIMIT_WINDOW_SECS") {
            self.api.read_rate_limit.window_secs =
                v.parse().unwrap_or(self.api.read_rate_limit.window_secs);
        }
        if let Ok(v) = env::var("API_WRITE_RATE_LIMIT_REQUESTS") {
            self.api.write_rate_limit.requests =
                v.parse().unwrap_or(self.api.write_rate_limit.requests);
        }
        if let Ok(v) = env::var("API_WRITE_RATE_LIMIT_WINDOW_SECS") {
            self.api.write_rate_limit.window_secs =
                v.parse().unwrap_or(self.api.write_rate_limit.window_secs);
        }
        if let Ok(v) = env::var("API_GATEWAY_TIMEOUT_MS") {
            self.api.gateway_timeout_ms = v.parse().unwrap_or(self.api.gateway_timeout_ms);
        }
        if let Ok(v) = env::var("API_TRUST_PROXY") {
            self.api.trust_proxy = v.parse().unwrap_or(self.api.trust_proxy);
        }

        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout_secs =
                v.parse().unwrap_or(self.database.connection_timeout_secs);
        }

        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            api: ApiConfig {
                default_page_limit: 20,
                max_page_limit: 100,
                read_rate_limit: RateLimitSettings { requests: 1000, window_secs: 60 },
                write_rate_limit: RateLimitSettings { requests: 120, window_secs: 60 },
                gateway_timeout_ms: 10_000,
                trust_proxy: false,
            },
            database: DatabaseConfig { max_connections: 10, connection_timeout_secs: 30 },
            security: SecurityConfig {
                jwt_secret: "dev-secret-do-not-use".to_string(),
                cors_origins: vec![
                    "http://localhost:3000".to_string(),
                    "http://localhost:5173".to_string(),
                ],
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            api: ApiConfig {
                default_page_limit: 20,
                max_page_limit: 100,
                read_rate_limit: RateLimitSettings { requests: 300, window_secs: 60 },
                write_rate_limit: RateLimitSettings { requests: 60, window_secs: 60 },
                gateway_timeout_ms: 5_000,
                trust_proxy: true,
            },
            database: DatabaseConfig { max_connections: 20, connection_timeout_secs: 10 },
            security: SecurityConfig {
                jwt_secret: String::new(),
                cors_origins: vec!["https://staging.example.com".to_string()],
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            api: ApiConfig {
                default_page_limit: 20,
                max_page_limit: 50,
                read_rate_limit: RateLimitSettings { requests: 120, window_secs: 60 },
                write_rate_limit: RateLimitSettings { requests: 30, window_secs: 60 },
                gateway_timeout_ms: 5_000,
                trust_proxy: true,
            },
            database: DatabaseConfig { max_connections: 50, connection_timeout_secs: 5 },
            security: SecurityConfig {
                jwt_secret: String::new(),
                cors_origins: vec!["https://app.example.com".to_string()],
            },
        }
    }
}
