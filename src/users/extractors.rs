use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::warn;

use crate::{
    error::ApiError,
    state::AppState,
    users::{jwt::JwtKeys, repo_types::User},
};

/// The authenticated caller, resolved from the `Authorization` header.
pub struct AuthUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| {
                ApiError::Unauthorized("Authentication credentials were not provided.".into())
            })?;

        let token = bearer_token(auth)
            .ok_or_else(|| ApiError::Unauthorized("Invalid authorization scheme.".into()))?;

        let claims = JwtKeys::from_ref(state).verify(token).map_err(|e| {
            warn!(error = %e, "invalid or expired token");
            ApiError::Unauthorized("Invalid or expired token.".into())
        })?;

        match User::find_by_id(&state.db, claims.sub).await? {
            Some(user) if user.is_active => Ok(AuthUser(user)),
            _ => {
                warn!(user_id = claims.sub, "token for unknown or inactive user");
                Err(ApiError::Unauthorized("User not found or inactive.".into()))
            }
        }
    }
}

fn bearer_token(header: &str) -> Option<&str> {
    ["Bearer ", "bearer ", "Token "]
        .iter()
        .find_map(|prefix| header.strip_prefix(prefix))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::bearer_token;

    #[test]
    fn accepts_known_schemes() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("bearer abc"), Some("abc"));
        assert_eq!(bearer_token("Token abc"), Some("abc"));
    }

    #[test]
    fn rejects_other_schemes_and_empty_tokens() {
        assert_eq!(bearer_token("Basic dXNlcjpwYXNz"), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("abc"), None);
    }
}
