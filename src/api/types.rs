//! API request and response types.

use serde::{Deserialize, Serialize};

use crate::catalog::ResolvedIngredient;
use crate::db::entities::{ingredient, recipe, user};
use crate::ledger::ViewerRelations;
use crate::writer::IngredientItem;

// ============================================================================
// Request Types
// ============================================================================

/// POST /api/users/ request body
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

/// POST /api/auth/token/login/ request body
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// POST /api/recipes/ request body
#[derive(Debug, Deserialize)]
pub struct CreateRecipeRequest {
    pub name: String,
    pub image: Option<String>,
    pub text: String,
    pub cooking_time: i32,
    #[serde(default)]
    pub ingredients: Vec<IngredientItem>,
}

/// PATCH /api/recipes/:id/ request body
#[derive(Debug, Deserialize, Default)]
pub struct UpdateRecipeRequest {
    pub name: Option<String>,
    pub image: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<i32>,
    pub ingredients: Option<Vec<IngredientItem>>,
}

/// Query params for ingredient search
#[derive(Debug, Deserialize, Default)]
pub struct IngredientQuery {
    pub name: Option<String>,
}

/// Query params for recipe listing
#[derive(Debug, Deserialize, Default)]
pub struct RecipeListQuery {
    pub author: Option<i32>,
    pub is_favorited: Option<String>,
    pub is_in_shopping_cart: Option<String>,
    pub limit: Option<u64>,
}

/// POST /api/users/set_password/ request body
#[derive(Debug, Deserialize)]
pub struct SetPasswordRequest {
    pub new_password: String,
    pub current_password: String,
}

/// PUT /api/users/me/avatar/ request body
#[derive(Debug, Deserialize)]
pub struct AvatarRequest {
    pub avatar: Option<String>,
}

/// Query params for user listing
#[derive(Debug, Deserialize, Default)]
pub struct UserListQuery {
    pub limit: Option<u64>,
}

/// Query params for subscription listings
#[derive(Debug, Deserialize, Default)]
pub struct SubscriptionQuery {
    pub recipes_limit: Option<usize>,
}

/// `1` and `true` switch a filter on
pub fn flag_set(value: Option<&str>) -> bool {
    matches!(value, Some("1") | Some("true") | Some("True"))
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub auth_token: String,
}

#[derive(Debug, Serialize)]
pub struct AvatarResponse {
    pub avatar: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i32,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,
    pub avatar: Option<String>,
}

impl UserResponse {
    pub fn new(user: &user::Model, viewer: &ViewerRelations) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            is_subscribed: viewer.is_subscribed(user.id),
            avatar: user.avatar.clone(),
        }
    }
}

/// An author as listed under the viewer's subscriptions
#[derive(Debug, Serialize)]
pub struct SubscriptionResponse {
    #[serde(flatten)]
    pub user: UserResponse,
    pub recipes: Vec<ShortRecipeResponse>,
    pub recipes_count: u64,
}

#[derive(Debug, Serialize)]
pub struct IngredientResponse {
    pub id: i32,
    pub name: String,
    pub measurement_unit: String,
}

impl From<ingredient::Model> for IngredientResponse {
    fn from(model: ingredient::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            measurement_unit: model.measurement_unit,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecipeIngredientResponse {
    pub id: i32,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

impl From<ResolvedIngredient> for RecipeIngredientResponse {
    fn from(row: ResolvedIngredient) -> Self {
        Self {
            id: row.ingredient_id,
            name: row.name,
            measurement_unit: row.measurement_unit,
            amount: row.amount,
        }
    }
}

/// Compact recipe, returned by favorite/cart toggles and subscription lists
#[derive(Debug, Serialize)]
pub struct ShortRecipeResponse {
    pub id: i32,
    pub name: String,
    pub image: String,
    pub cooking_time: i32,
}

impl From<&recipe::Model> for ShortRecipeResponse {
    fn from(model: &recipe::Model) -> Self {
        Self {
            id: model.id,
            name: model.name.clone(),
            image: model.image_ref.clone(),
            cooking_time: model.cooking_time,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecipeResponse {
    pub id: i32,
    pub author: UserResponse,
    pub ingredients: Vec<RecipeIngredientResponse>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: i32,
}

impl RecipeResponse {
    pub fn new(
        recipe: recipe::Model,
        author: &user::Model,
        ingredients: Vec<ResolvedIngredient>,
        viewer: &ViewerRelations,
    ) -> Self {
        Self {
            id: recipe.id,
            author: UserResponse::new(author, viewer),
            ingredients: ingredients.into_iter().map(Into::into).collect(),
            is_favorited: viewer.is_favorited(recipe.id),
            is_in_shopping_cart: viewer.is_in_shopping_cart(recipe.id),
            name: recipe.name,
            image: recipe.image_ref,
            text: recipe.description,
            cooking_time: recipe.cooking_time,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ShortLinkResponse {
    #[serde(rename = "short-link")]
    pub short_link: String,
}
