use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;

use super::{claims::Claims, jwt::TokenService, policy::Actor};
use crate::error::AppError;

/// Verified bearer token of the caller.
pub struct AuthUser {
    pub claims: Claims,
    pub token: String,
}

impl AuthUser {
    pub fn actor(&self) -> Actor {
        Actor {
            id: self.claims.sub,
            role: self.claims.role,
        }
    }
}

pub(crate) fn bearer_token(parts: &Parts) -> Result<&str, AppError> {
    let header = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(AppError::MissingToken)?;

    // Expect "Bearer <token>"
    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AppError::MissingToken)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    TokenService: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let tokens = TokenService::from_ref(state);
        let token = bearer_token(parts)?.to_string();

        let claims = tokens.verify(&token).map_err(|e| {
            if matches!(e, AppError::InvalidToken) {
                warn!("invalid or expired token");
            }
            e
        })?;

        Ok(AuthUser { claims, token })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with(header: Option<&str>) -> Parts {
        let mut req = Request::builder().uri("/");
        if let Some(h) = header {
            req = req.header("authorization", h);
        }
        req.body(()).unwrap().into_parts().0
    }

    #[test]
    fn extracts_bearer_token() {
        let parts = parts_with(Some("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&parts).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn missing_or_foreign_scheme_is_missing_token() {
        assert!(matches!(
            bearer_token(&parts_with(None)),
            Err(AppError::MissingToken)
        ));
        assert!(matches!(
            bearer_token(&parts_with(Some("Basic dXNlcjpwdw=="))),
            Err(AppError::MissingToken)
        ));
        assert!(matches!(
            bearer_token(&parts_with(Some("Bearer "))),
            Err(AppError::MissingToken)
        ));
    }
}
