pub mod auth;
pub mod extract;
pub mod handlers;
pub mod types;
pub mod users;

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};

pub use handlers::AppState;

/// Create the API router.
///
/// Static segments such as `/api/recipes/download_shopping_cart/` take
/// precedence over the `:id` captures next to them.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        // Users and auth
        .route("/api/users/", get(users::list_users).post(users::register))
        .route("/api/users/me/", get(users::me))
        .route(
            "/api/users/me/avatar/",
            put(users::set_avatar).delete(users::delete_avatar),
        )
        .route("/api/users/set_password/", post(users::set_password))
        .route("/api/users/subscriptions/", get(users::list_subscriptions))
        .route("/api/users/:id/", get(users::get_user))
        .route(
            "/api/users/:id/subscribe/",
            post(users::subscribe).delete(users::unsubscribe),
        )
        .route("/api/auth/token/login/", post(users::login))
        .route("/api/auth/token/logout/", post(users::logout))
        // Ingredient catalog
        .route("/api/ingredients/", get(handlers::list_ingredients))
        .route("/api/ingredients/:id/", get(handlers::get_ingredient))
        // Recipes
        .route(
            "/api/recipes/",
            get(handlers::list_recipes).post(handlers::create_recipe),
        )
        .route(
            "/api/recipes/download_shopping_cart/",
            get(handlers::download_shopping_cart),
        )
        .route(
            "/api/recipes/:id/",
            get(handlers::get_recipe)
                .patch(handlers::update_recipe)
                .delete(handlers::delete_recipe),
        )
        .route(
            "/api/recipes/:id/favorite/",
            post(handlers::add_favorite).delete(handlers::remove_favorite),
        )
        .route(
            "/api/recipes/:id/shopping_cart/",
            post(handlers::add_to_cart).delete(handlers::remove_from_cart),
        )
        .route("/api/recipes/:id/get-link/", get(handlers::get_short_link))
        // Short links
        .route("/s/:token", get(handlers::resolve_short_link))
        // Health check
        .route("/health", get(handlers::health))
}
