pub mod permissions;

use axum::http::HeaderMap;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;

/// Platform roles carried in the token. Capability gating over these lives
/// in [`permissions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Editor,
    Moderator,
    Member,
}

/// JWT claims issued by the (external) auth provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id
    pub sub: Uuid,
    /// Display name shown alongside authored content
    pub name: String,
    pub roles: Vec<Role>,
    pub exp: i64,
}

/// Resolved caller identity attached to a request
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: Uuid,
    pub display_name: String,
    pub roles: Vec<Role>,
}

impl Principal {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

impl From<Claims> for Principal {
    fn from(claims: Claims) -> Self {
        Self { user_id: claims.sub, display_name: claims.name, roles: claims.roles }
    }
}

/// Resolve an optional principal from request headers.
///
/// Absence of an Authorization header is not a failure: it yields
/// `Ok(None)`. A header that is present but malformed or carries an invalid
/// token is a distinct condition and yields `Err(Unauthorized)`.
pub fn resolve_identity(
    headers: &HeaderMap,
    jwt_secret: &str,
) -> Result<Option<Principal>, ApiError> {
    let auth_header = match headers.get("authorization").or_else(|| headers.get("Authorization")) {
        Some(h) => h,
        None => return Ok(None),
    };

    let auth_str = auth_header
        .to_str()
        .map_err(|_| ApiError::unauthorized("Invalid Authorization header format"))?;

    let token = auth_str
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::unauthorized("Authorization header must use Bearer token format"))?;
    if token.trim().is_empty() {
        return Err(ApiError::unauthorized("Empty bearer token"));
    }

    if jwt_secret.is_empty() {
        return Err(ApiError::unauthorized("Identity verification not configured"));
    }

    let decoding_key = DecodingKey::from_secret(jwt_secret.as_bytes());
    let validation = Validation::default();

    let token_data = decode::<Claims>(token, &decoding_key, &validation)
        .map_err(|e| ApiError::unauthorized(format!("Invalid token: {}", e)))?;

    Ok(Some(Principal::from(token_data.claims)))
}

/// Issue a token for the given principal. Used by tests and local tooling;
/// production tokens come from the auth provider.
pub fn issue_token(principal: &Principal, jwt_secret: &str, expiry_hours: i64) -> String {
    let claims = Claims {
        sub: principal.user_id,
        name: principal.display_name.clone(),
        roles: principal.roles.clone(),
        exp: (chrono::Utc::now() + chrono::Duration::hours(expiry_hours)).timestamp(),
    };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .expect("JWT encoding cannot fail with HMAC keys")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &str = "test-secret";

    fn member() -> Principal {
        Principal {
            user_id: Uuid::new_v4(),
            display_name: "Alice".to_string(),
            roles: vec![Role::Member],
        }
    }

    #[test]
    fn absent_header_resolves_to_none() {
        let headers = HeaderMap::new();
        let resolved = resolve_identity(&headers, SECRET).unwrap();
        assert!(resolved.is_none());
    }

    #[test]
    fn valid_token_resolves_principal() {
        let principal = member();
        let token = issue_token(&principal, SECRET, 1);
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );

        let resolved = resolve_identity(&headers, SECRET).unwrap().unwrap();
        assert_eq!(resolved.user_id, principal.user_id);
        assert!(resolved.has_role(Role::Member));
    }

    #[test]
    fn malformed_header_is_an_error_not_none() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Token abc"));
        assert!(resolve_identity(&headers, SECRET).is_err());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = issue_token(&member(), "other-secret", 1);
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        assert!(resolve_identity(&headers, SECRET).is_err());
    }
}
