use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use sea_orm::{ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect};

use super::auth::AuthManager;
use super::extract::ApiJson;
use super::types::{
    flag_set, CreateRecipeRequest, IngredientQuery, IngredientResponse, RecipeListQuery,
    RecipeResponse, ShortLinkResponse, ShortRecipeResponse, UpdateRecipeRequest,
};
use crate::catalog;
use crate::config::ServerConfig;
use crate::db::entities::recipe;
use crate::error::{Result, ServerError};
use crate::ledger::{RelationLedger, ViewerRelations};
use crate::shopping::{self, SHOPPING_LIST_FILENAME};
use crate::shortlink;
use crate::writer::{self, NewRecipe, RecipePatch};

/// Application state shared across handlers
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub auth: AuthManager,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(db: Arc<DatabaseConnection>, config: ServerConfig) -> Self {
        Self {
            db,
            auth: AuthManager::new(config.token_ttl),
            config,
        }
    }
}

/// Health check
pub async fn health() -> &'static str {
    "OK"
}

// ============================================================================
// Ingredients
// ============================================================================

/// GET /api/ingredients/?name=<prefix>
pub async fn list_ingredients(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IngredientQuery>,
) -> Result<Json<Vec<IngredientResponse>>> {
    let ingredients = catalog::search_ingredients(state.db.as_ref(), query.name.as_deref()).await?;
    Ok(Json(ingredients.into_iter().map(Into::into).collect()))
}

/// GET /api/ingredients/:id/
pub async fn get_ingredient(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<IngredientResponse>> {
    let ingredient = catalog::get_ingredient(state.db.as_ref(), id).await?;
    Ok(Json(ingredient.into()))
}

// ============================================================================
// Recipes
// ============================================================================

/// Full representation of one recipe as seen by `viewer`
async fn recipe_response<C: ConnectionTrait>(
    conn: &C,
    recipe: recipe::Model,
    viewer: &ViewerRelations,
) -> Result<RecipeResponse> {
    let author = catalog::get_user(conn, recipe.author_id).await?;
    let ingredients = catalog::ingredients_of(conn, recipe.id).await?;
    Ok(RecipeResponse::new(recipe, &author, ingredients, viewer))
}

/// GET /api/recipes/ - newest first
pub async fn list_recipes(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecipeListQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<RecipeResponse>>> {
    let db = state.db.as_ref();
    let viewer_id = state.auth.user_from_headers(&headers);
    let viewer = ViewerRelations::load(db, viewer_id).await?;

    let mut select = recipe::Entity::find();
    if let Some(author) = query.author {
        select = select.filter(recipe::Column::AuthorId.eq(author));
    }
    // Relation filters only apply to signed-in users
    if viewer_id.is_some() {
        if flag_set(query.is_favorited.as_deref()) {
            select = select.filter(recipe::Column::Id.is_in(viewer.favorites.iter().copied()));
        }
        if flag_set(query.is_in_shopping_cart.as_deref()) {
            select = select.filter(recipe::Column::Id.is_in(viewer.cart.iter().copied()));
        }
    }
    if let Some(limit) = query.limit {
        select = select.limit(limit);
    }
    let recipes = select.order_by_desc(recipe::Column::Id).all(db).await?;

    let authors = catalog::users_by_id(db, recipes.iter().map(|r| r.author_id)).await?;
    let mut ingredients = catalog::ingredients_of_many(db, recipes.iter().map(|r| r.id)).await?;

    let mut responses = Vec::with_capacity(recipes.len());
    for recipe in recipes {
        let author = authors.get(&recipe.author_id).ok_or_else(|| {
            ServerError::Internal(format!("recipe {} has no author", recipe.id))
        })?;
        let rows = ingredients.remove(&recipe.id).unwrap_or_default();
        responses.push(RecipeResponse::new(recipe, author, rows, &viewer));
    }

    Ok(Json(responses))
}

/// GET /api/recipes/:id/
pub async fn get_recipe(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    headers: HeaderMap,
) -> Result<Json<RecipeResponse>> {
    let db = state.db.as_ref();
    let viewer = ViewerRelations::load(db, state.auth.user_from_headers(&headers)).await?;
    let recipe = catalog::get_recipe(db, id).await?;
    Ok(Json(recipe_response(db, recipe, &viewer).await?))
}

/// POST /api/recipes/
pub async fn create_recipe(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<CreateRecipeRequest>,
) -> Result<(StatusCode, Json<RecipeResponse>)> {
    let user_id = state.auth.require_user(&headers)?;
    let db = state.db.as_ref();

    let recipe = writer::create_recipe(
        db,
        user_id,
        NewRecipe {
            name: request.name,
            image: request.image,
            text: request.text,
            cooking_time: request.cooking_time,
        },
        request.ingredients,
    )
    .await?;

    let viewer = ViewerRelations::load(db, Some(user_id)).await?;
    Ok((StatusCode::CREATED, Json(recipe_response(db, recipe, &viewer).await?)))
}

/// PATCH /api/recipes/:id/
pub async fn update_recipe(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<UpdateRecipeRequest>,
) -> Result<Json<RecipeResponse>> {
    let user_id = state.auth.require_user(&headers)?;
    let db = state.db.as_ref();

    let patch = RecipePatch {
        name: request.name,
        image: request.image,
        text: request.text,
        cooking_time: request.cooking_time,
        ingredients: request.ingredients,
    };
    let recipe = writer::update_recipe(db, id, user_id, patch).await?;

    let viewer = ViewerRelations::load(db, Some(user_id)).await?;
    Ok(Json(recipe_response(db, recipe, &viewer).await?))
}

/// DELETE /api/recipes/:id/
pub async fn delete_recipe(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    headers: HeaderMap,
) -> Result<StatusCode> {
    let user_id = state.auth.require_user(&headers)?;
    writer::delete_recipe(state.db.as_ref(), id, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Favorites and shopping cart
// ============================================================================

async fn add_recipe_edge(
    state: &AppState,
    ledger: RelationLedger,
    recipe_id: i32,
    headers: &HeaderMap,
) -> Result<(StatusCode, Json<ShortRecipeResponse>)> {
    let user_id = state.auth.require_user(headers)?;
    let db = state.db.as_ref();

    let recipe = catalog::get_recipe(db, recipe_id).await?;
    ledger.add(db, user_id, recipe.id).await?;

    Ok((StatusCode::CREATED, Json(ShortRecipeResponse::from(&recipe))))
}

async fn remove_recipe_edge(
    state: &AppState,
    ledger: RelationLedger,
    recipe_id: i32,
    headers: &HeaderMap,
) -> Result<StatusCode> {
    let user_id = state.auth.require_user(headers)?;
    let db = state.db.as_ref();

    catalog::get_recipe(db, recipe_id).await?;
    ledger.remove(db, user_id, recipe_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/recipes/:id/favorite/
pub async fn add_favorite(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<ShortRecipeResponse>)> {
    add_recipe_edge(&state, RelationLedger::favorites(), id, &headers).await
}

/// DELETE /api/recipes/:id/favorite/
pub async fn remove_favorite(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    headers: HeaderMap,
) -> Result<StatusCode> {
    remove_recipe_edge(&state, RelationLedger::favorites(), id, &headers).await
}

/// POST /api/recipes/:id/shopping_cart/
pub async fn add_to_cart(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<ShortRecipeResponse>)> {
    add_recipe_edge(&state, RelationLedger::cart(), id, &headers).await
}

/// DELETE /api/recipes/:id/shopping_cart/
pub async fn remove_from_cart(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    headers: HeaderMap,
) -> Result<StatusCode> {
    remove_recipe_edge(&state, RelationLedger::cart(), id, &headers).await
}

/// GET /api/recipes/download_shopping_cart/
pub async fn download_shopping_cart(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response> {
    let user_id = state.auth.require_user(&headers)?;
    let entries = shopping::aggregate_cart(state.db.as_ref(), user_id).await?;
    let body = shopping::render_shopping_list(&entries);

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", SHOPPING_LIST_FILENAME),
            ),
        ],
        body,
    )
        .into_response())
}

// ============================================================================
// Short links
// ============================================================================

/// GET /api/recipes/:id/get-link/
pub async fn get_short_link(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ShortLinkResponse>> {
    let recipe = catalog::get_recipe(state.db.as_ref(), id).await?;
    let recipe_id = u64::try_from(recipe.id)
        .map_err(|_| ServerError::Internal(format!("negative recipe id {}", recipe.id)))?;

    Ok(Json(ShortLinkResponse {
        short_link: format!("{}/s/{}", state.config.public_url, shortlink::encode(recipe_id)),
    }))
}

/// GET /s/:token - redirect to the recipe page
pub async fn resolve_short_link(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Redirect> {
    let decoded = shortlink::decode(&token)?;
    let recipe_id = i32::try_from(decoded)
        .map_err(|_| ServerError::NotFound(format!("recipe {}", decoded)))?;
    let recipe = catalog::get_recipe(state.db.as_ref(), recipe_id).await?;

    tracing::debug!("Short link {} -> recipe {}", token, recipe.id);
    Ok(Redirect::to(&format!("/recipes/{}/", recipe.id)))
}
