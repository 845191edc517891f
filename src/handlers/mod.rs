pub mod content;
pub mod replies;

use axum::extract::Extension;
use axum::routing::{get, post, put};
use axum::Router;
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::content::ContentModule;
use crate::state::AppState;

/// Build the route set for one content module. All four modules share the
/// same handler functions; the module rides along as an extension.
pub fn module_router(module: ContentModule) -> Router<AppState> {
    let router = Router::new()
        .route("/", get(content::list).post(content::create))
        .route("/categories", get(content::categories))
        .route("/stats", get(content::stats))
        .route("/:slug", get(content::get_by_slug))
        .route("/:slug/interactions", post(content::interact))
        .route("/id/:id", put(content::update));

    let router = if module == ContentModule::Thread {
        router.route("/:slug/replies", get(replies::list).post(replies::create))
    } else {
        router
    };

    router.layer(Extension(module))
}

/// Convert query parameters into the pipeline's payload shape. Values stay
/// strings; the schema stage coerces them.
pub fn params_to_payload(params: HashMap<String, String>) -> Value {
    let mut map = Map::new();
    for (k, v) in params {
        map.insert(k, Value::String(v));
    }
    Value::Object(map)
}

pub fn input_str<'a>(input: &'a Value, field: &str) -> Option<&'a str> {
    input.get(field).and_then(Value::as_str)
}

pub fn input_i64(input: &Value, field: &str) -> Option<i64> {
    input.get(field).and_then(Value::as_i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn params_become_string_fields() {
        let mut params = HashMap::new();
        params.insert("page".to_string(), "2".to_string());
        let payload = params_to_payload(params);
        assert_eq!(payload, json!({"page": "2"}));
    }
}
