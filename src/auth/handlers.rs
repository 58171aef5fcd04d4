use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{
            AuthResponse, LoginRequest, ProfileResponse, RefreshResponse, RegisterRequest,
            TokenSubject, VerifyResponse,
        },
        extractors::AuthUser,
        password::{hash_password, verify_against_dummy, verify_password},
        services::{normalize_email, normalize_name, required, validate_password},
    },
    error::AppError,
    extract::AppJson,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/verify", get(verify))
        .route("/auth/profile", get(profile))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let email = normalize_email(required(&payload.email, "email")?)?;
    let password = required(&payload.password, "password")?;
    let name = normalize_name(required(&payload.name, "name")?)?;
    validate_password(password)?;

    // refuse before creating an account we could not hand a token for
    if !state.tokens.is_configured() {
        return Err(AppError::Config("JWT_SECRET is not set"));
    }

    let hash = hash_password(password)?;
    let user = state
        .store
        .insert(&email, &hash, &name)
        .await
        .map_err(|e| {
            if matches!(e, AppError::DuplicateEmail) {
                warn!(email = %email, "email already registered");
            }
            e
        })?;
    let token = state.tokens.issue(&user)?;

    info!(user_id = user.id, email = %user.email, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            message: "user created",
            user,
            token,
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let email = required(&payload.email, "email")?.trim().to_lowercase();
    let password = required(&payload.password, "password")?;

    if !state.tokens.is_configured() {
        return Err(AppError::Config("JWT_SECRET is not set"));
    }

    let Some(user) = state.store.find_by_email(&email).await? else {
        verify_against_dummy(password);
        warn!(email = %email, "login unknown email");
        return Err(AppError::InvalidCredentials);
    };

    if !verify_password(password, &user.password_hash)? {
        warn!(user_id = user.id, "login invalid password");
        return Err(AppError::InvalidCredentials);
    }

    let token = state.tokens.issue(&user)?;
    info!(user_id = user.id, email = %user.email, "user logged in");
    Ok(Json(AuthResponse {
        message: "login successful",
        user,
        token,
    }))
}

#[instrument(skip(state, auth))]
pub async fn refresh(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<RefreshResponse>, AppError> {
    let (token, user) = state
        .tokens
        .refresh(&auth.token, state.store.as_ref())
        .await?;
    info!(user_id = user.id, role = %user.role, "token refreshed");
    Ok(Json(RefreshResponse {
        message: "token refreshed",
        token,
        user,
    }))
}

#[instrument(skip(auth))]
pub async fn verify(auth: AuthUser) -> Result<Json<VerifyResponse>, AppError> {
    let claims = auth.claims;
    Ok(Json(VerifyResponse {
        valid: true,
        issued_at: rfc3339(claims.iat)?,
        expires_at: rfc3339(claims.exp)?,
        user: TokenSubject {
            id: claims.sub,
            email: claims.email,
            role: claims.role,
        },
    }))
}

#[instrument(skip(state, auth))]
pub async fn profile(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ProfileResponse>, AppError> {
    let user = state
        .store
        .find_by_id(auth.claims.sub)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(ProfileResponse { user }))
}

fn rfc3339(unix: i64) -> Result<String, AppError> {
    let ts = OffsetDateTime::from_unix_timestamp(unix).map_err(anyhow::Error::from)?;
    Ok(ts.format(&Rfc3339).map_err(anyhow::Error::from)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_seconds_render_as_rfc3339() {
        assert_eq!(rfc3339(0).unwrap(), "1970-01-01T00:00:00Z");
    }
}
