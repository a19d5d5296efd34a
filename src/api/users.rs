//! User, login and subscription handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, IntoActiveModel, QueryFilter, Set, SqlErr};

use super::auth::{hash_password, verify_password};
use super::extract::ApiJson;
use super::handlers::AppState;
use super::types::{
    AvatarRequest, AvatarResponse, LoginRequest, RegisterRequest, SetPasswordRequest,
    ShortRecipeResponse, SubscriptionQuery, SubscriptionResponse, TokenResponse, UserListQuery,
    UserResponse,
};
use crate::catalog;
use crate::db::entities::user;
use crate::error::{Result, ServerError};
use crate::ledger::{RelationLedger, ViewerRelations};

fn require_field(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ServerError::invalid(field, "This field is required"));
    }
    Ok(())
}

/// Letters, digits and `@.+-_`
fn valid_username(username: &str) -> bool {
    !username.is_empty()
        && username
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
}

/// POST /api/users/
pub async fn register(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>)> {
    require_field("email", &request.email)?;
    require_field("first_name", &request.first_name)?;
    require_field("last_name", &request.last_name)?;
    require_field("password", &request.password)?;
    if !valid_username(&request.username) {
        return Err(ServerError::invalid(
            "username",
            "Username may contain only letters, digits and @.+-_",
        ));
    }

    let new_user = user::ActiveModel {
        email: Set(request.email.trim().to_string()),
        username: Set(request.username),
        first_name: Set(request.first_name),
        last_name: Set(request.last_name),
        password_hash: Set(hash_password(&request.password)),
        created_at: Set(crate::db::now()),
        ..Default::default()
    };

    let created = match new_user.insert(state.db.as_ref()).await {
        Ok(created) => created,
        Err(err) => {
            return Err(match err.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => {
                    ServerError::invalid("email", "A user with this email or username already exists")
                }
                _ => err.into(),
            })
        }
    };

    tracing::info!("Registered user {} ({})", created.username, created.id);
    Ok((
        StatusCode::CREATED,
        Json(UserResponse::new(&created, &ViewerRelations::default())),
    ))
}

/// POST /api/auth/token/login/
pub async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<Json<TokenResponse>> {
    let found = user::Entity::find()
        .filter(user::Column::Email.eq(request.email.trim()))
        .one(state.db.as_ref())
        .await?
        .ok_or(ServerError::AuthFailed)?;

    if !verify_password(&request.password, &found.password_hash) {
        return Err(ServerError::AuthFailed);
    }

    state.auth.cleanup_expired_tokens();
    let token = state.auth.issue_token(found.id);
    Ok(Json(TokenResponse {
        auth_token: token.token,
    }))
}

/// POST /api/auth/token/logout/
pub async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<StatusCode> {
    state.auth.revoke_from_headers(&headers)?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/users/me/
pub async fn me(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<Json<UserResponse>> {
    let user_id = state.auth.require_user(&headers)?;
    let found = catalog::get_user(state.db.as_ref(), user_id).await?;
    Ok(Json(UserResponse::new(&found, &ViewerRelations::default())))
}

/// GET /api/users/
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserListQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<UserResponse>>> {
    let db = state.db.as_ref();
    let viewer = ViewerRelations::load(db, state.auth.user_from_headers(&headers)).await?;
    let users = catalog::list_users(db, query.limit).await?;
    Ok(Json(users.iter().map(|u| UserResponse::new(u, &viewer)).collect()))
}

/// GET /api/users/:id/
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    headers: HeaderMap,
) -> Result<Json<UserResponse>> {
    let db = state.db.as_ref();
    let found = catalog::get_user(db, id).await?;

    let mut viewer = ViewerRelations::default();
    if let Some(viewer_id) = state.auth.user_from_headers(&headers) {
        if RelationLedger::subscriptions().contains(db, viewer_id, found.id).await? {
            viewer.subscriptions.insert(found.id);
        }
    }
    Ok(Json(UserResponse::new(&found, &viewer)))
}

/// POST /api/users/set_password/
pub async fn set_password(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<SetPasswordRequest>,
) -> Result<StatusCode> {
    let user_id = state.auth.require_user(&headers)?;
    require_field("new_password", &request.new_password)?;

    let db = state.db.as_ref();
    let found = catalog::get_user(db, user_id).await?;
    if !verify_password(&request.current_password, &found.password_hash) {
        return Err(ServerError::invalid("current_password", "Invalid password"));
    }

    let mut active = found.into_active_model();
    active.password_hash = Set(hash_password(&request.new_password));
    active.update(db).await?;

    tracing::info!("User {} changed their password", user_id);
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/users/me/avatar/
pub async fn set_avatar(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<AvatarRequest>,
) -> Result<Json<AvatarResponse>> {
    let user_id = state.auth.require_user(&headers)?;
    let avatar = request
        .avatar
        .filter(|avatar| !avatar.trim().is_empty())
        .ok_or_else(|| ServerError::invalid("avatar", "This field is required"))?;

    let db = state.db.as_ref();
    let mut active = catalog::get_user(db, user_id).await?.into_active_model();
    active.avatar = Set(Some(avatar.clone()));
    active.update(db).await?;

    Ok(Json(AvatarResponse { avatar }))
}

/// DELETE /api/users/me/avatar/
pub async fn delete_avatar(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<StatusCode> {
    let user_id = state.auth.require_user(&headers)?;
    let db = state.db.as_ref();

    let found = catalog::get_user(db, user_id).await?;
    if found.avatar.is_none() {
        return Err(ServerError::invalid("avatar", "No avatar to delete"));
    }

    let mut active = found.into_active_model();
    active.avatar = Set(None);
    active.update(db).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn subscription_response(
    state: &AppState,
    author: &user::Model,
    recipes_limit: Option<usize>,
) -> Result<SubscriptionResponse> {
    let recipes = catalog::recipes_by_author(state.db.as_ref(), author.id).await?;
    let recipes_count = recipes.len() as u64;
    let shown = recipes_limit.unwrap_or(recipes.len());

    let mut viewer = ViewerRelations::default();
    viewer.subscriptions.insert(author.id);

    Ok(SubscriptionResponse {
        user: UserResponse::new(author, &viewer),
        recipes: recipes.iter().take(shown).map(ShortRecipeResponse::from).collect(),
        recipes_count,
    })
}

/// GET /api/users/subscriptions/
pub async fn list_subscriptions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SubscriptionQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<SubscriptionResponse>>> {
    let user_id = state.auth.require_user(&headers)?;
    let db = state.db.as_ref();

    let author_ids = RelationLedger::subscriptions().objects_of(db, user_id).await?;
    let mut authors = catalog::users_by_id(db, author_ids.iter().copied()).await?;

    let mut responses = Vec::with_capacity(author_ids.len());
    for author_id in author_ids {
        if let Some(author) = authors.remove(&author_id) {
            responses.push(subscription_response(&state, &author, query.recipes_limit).await?);
        }
    }
    Ok(Json(responses))
}

/// POST /api/users/:id/subscribe/
pub async fn subscribe(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Query(query): Query<SubscriptionQuery>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<SubscriptionResponse>)> {
    let user_id = state.auth.require_user(&headers)?;
    let db = state.db.as_ref();

    let author = catalog::get_user(db, id).await?;
    RelationLedger::subscriptions().add(db, user_id, author.id).await?;

    let response = subscription_response(&state, &author, query.recipes_limit).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// DELETE /api/users/:id/subscribe/
pub async fn unsubscribe(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    headers: HeaderMap,
) -> Result<StatusCode> {
    let user_id = state.auth.require_user(&headers)?;
    let db = state.db.as_ref();

    catalog::get_user(db, id).await?;
    RelationLedger::subscriptions().remove(db, user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
