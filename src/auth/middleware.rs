use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Response},
};

use super::AuthContext;
use crate::error::ApiError;

/// Header carrying the authenticated user id.
pub const X_USER_ID: &str = "x-user-id";

/// Extractor that requires a caller identity
///
/// Example:
/// ```ignore
/// async fn protected_route(user: RequireUser) -> impl IntoResponse {
///     format!("Hello, user {}", user.user_id)
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RequireUser(pub AuthContext);

impl std::ops::Deref for RequireUser {
    type Target = AuthContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum AuthError {
    MissingUser,
    InvalidUser,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let message = match &self {
            AuthError::MissingUser => "Missing user identity",
            AuthError::InvalidUser => "Invalid user identity",
        };

        ApiError::Unauthorized(message.to_string()).into_response()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequireUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(X_USER_ID)
            .ok_or(AuthError::MissingUser)?
            .to_str()
            .map_err(|_| AuthError::InvalidUser)?;

        if header.trim().is_empty() {
            return Err(AuthError::MissingUser);
        }

        let context = AuthContext::from_header(header).map_err(|e| {
            tracing::warn!(error = %e, "Rejected user identity header");
            AuthError::InvalidUser
        })?;

        Ok(RequireUser(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use uuid::Uuid;

    async fn extract(header: Option<&str>) -> Result<RequireUser, AuthError> {
        let mut builder = Request::builder().uri("/plans");
        if let Some(value) = header {
            builder = builder.header(X_USER_ID, value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        RequireUser::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn extracts_the_user_id_header() {
        let id = Uuid::new_v4();
        let user = extract(Some(&id.to_string())).await.unwrap();
        assert_eq!(user.user_id, id);
    }

    #[tokio::test]
    async fn missing_or_malformed_identity_is_rejected() {
        assert_eq!(extract(None).await.unwrap_err(), AuthError::MissingUser);
        assert_eq!(extract(Some("  ")).await.unwrap_err(), AuthError::MissingUser);
        assert_eq!(extract(Some("admin")).await.unwrap_err(), AuthError::InvalidUser);
    }
}
