use axum::{
    extract::State,
    routing::{get, patch},
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        extractors::AuthUser,
        password::hash_password,
        policy::{evaluate, Action, Actor, Decision},
        services::{normalize_email, normalize_name, parse_role, validate_password},
    },
    error::AppError,
    extract::{AppJson, AppPath, AppQuery},
    state::AppState,
    store::{Role, UserPatch},
};

use super::dto::{
    MessageResponse, PageInfo, Pagination, UpdateUserRequest, UserChangedResponse,
    UserListResponse, UserResponse,
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/me", get(get_me))
        .route(
            "/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/users/:id/promote", patch(promote_user))
}

fn authorize(actor: &Actor, owner: Option<i64>, action: Action) -> Result<(), AppError> {
    match evaluate(actor, owner, action) {
        Decision::Allow => Ok(()),
        Decision::Deny(reason) => {
            warn!(actor_id = actor.id, ?owner, ?action, %reason, "access denied");
            Err(AppError::Denied(reason))
        }
    }
}

#[instrument(skip(state, auth))]
pub async fn list_users(
    State(state): State<AppState>,
    auth: AuthUser,
    AppQuery(p): AppQuery<Pagination>,
) -> Result<Json<UserListResponse>, AppError> {
    authorize(&auth.actor(), None, Action::List)?;
    let (page, limit) = p.normalized();
    let (users, total) = state.store.list(page, limit).await?;
    Ok(Json(UserListResponse {
        users,
        pagination: PageInfo::new(page, limit, total),
    }))
}

#[instrument(skip(state, auth))]
pub async fn get_me(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<UserResponse>, AppError> {
    let user = state
        .store
        .find_by_id(auth.claims.sub)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(UserResponse { user }))
}

#[instrument(skip(state, auth))]
pub async fn get_user(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(id): AppPath<i64>,
) -> Result<Json<UserResponse>, AppError> {
    authorize(&auth.actor(), Some(id), Action::Read)?;
    let user = state.store.find_by_id(id).await?.ok_or(AppError::NotFound)?;
    Ok(Json(UserResponse { user }))
}

#[instrument(skip(state, auth, body))]
pub async fn update_user(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(id): AppPath<i64>,
    AppJson(body): AppJson<UpdateUserRequest>,
) -> Result<Json<UserChangedResponse>, AppError> {
    let actor = auth.actor();
    authorize(&actor, Some(id), Action::Update)?;
    if body.role.as_deref().is_some_and(|r| !r.trim().is_empty()) {
        authorize(&actor, Some(id), Action::UpdateRole)?;
    }

    let patch = build_patch(body)?;
    let user = state.store.update(id, patch).await?;

    info!(actor_id = actor.id, user_id = user.id, "user updated");
    Ok(Json(UserChangedResponse {
        message: "user updated",
        user,
    }))
}

/// Validate every present field; blank strings count as absent.
fn build_patch(body: UpdateUserRequest) -> Result<UserPatch, AppError> {
    let present = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

    let mut patch = UserPatch::default();
    if let Some(name) = present(body.name) {
        patch.display_name = Some(normalize_name(&name)?);
    }
    if let Some(email) = present(body.email) {
        patch.email = Some(normalize_email(&email)?);
    }
    if let Some(password) = present(body.password) {
        validate_password(&password)?;
        patch.password_hash = Some(hash_password(&password)?);
    }
    if let Some(role) = present(body.role) {
        patch.role = Some(parse_role(&role)?);
    }
    if patch.is_empty() {
        return Err(AppError::validation("no fields provided for update"));
    }
    Ok(patch)
}

#[instrument(skip(state, auth))]
pub async fn delete_user(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(id): AppPath<i64>,
) -> Result<Json<MessageResponse>, AppError> {
    let actor = auth.actor();
    authorize(&actor, Some(id), Action::Delete)?;
    state.store.delete(id).await?;
    info!(actor_id = actor.id, user_id = id, "user deleted");
    Ok(Json(MessageResponse {
        message: "user deleted",
    }))
}

#[instrument(skip(state, auth))]
pub async fn promote_user(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(id): AppPath<i64>,
) -> Result<Json<UserChangedResponse>, AppError> {
    let actor = auth.actor();
    authorize(&actor, Some(id), Action::UpdateRole)?;

    let target = state.store.find_by_id(id).await?.ok_or(AppError::NotFound)?;
    if target.role == Role::Admin {
        return Err(AppError::validation("user is already an administrator"));
    }

    let user = state
        .store
        .update(
            id,
            UserPatch {
                role: Some(Role::Admin),
                ..Default::default()
            },
        )
        .await?;

    info!(actor_id = actor.id, user_id = user.id, "user promoted to admin");
    Ok(Json(UserChangedResponse {
        message: "user promoted to administrator",
        user,
    }))
}
