use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use storechat_services::auth::Principal;

use crate::error::ApiError;
use crate::state::AppState;

/// Authenticated caller for REST handlers, extracted from the
/// `Authorization: Bearer` header.
pub struct AuthUser {
    pub principal: Principal,
}

impl AuthUser {
    pub fn require_staff(&self) -> Result<(), ApiError> {
        if self.principal.is_staff() {
            Ok(())
        } else {
            Err(ApiError::Forbidden("Staff only".to_string()))
        }
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))?;

        let principal = state.auth.verify_token(token)?;
        Ok(AuthUser { principal })
    }
}
