//! Read side of the ingredient catalog and recipe store.
//!
//! Every lookup is generic over `ConnectionTrait` so the writer can run the
//! same queries inside its transaction.

use std::collections::HashMap;

use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect};

use crate::db::entities::{ingredient, recipe, recipe_ingredient, user};
use crate::error::{Result, ServerError};

/// A recipe ingredient row resolved against the catalog.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedIngredient {
    pub ingredient_id: i32,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

pub async fn get_ingredient<C: ConnectionTrait>(conn: &C, id: i32) -> Result<ingredient::Model> {
    ingredient::Entity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("ingredient {}", id)))
}

/// Ingredients whose name starts with `prefix`, ordered by name.
pub async fn search_ingredients<C: ConnectionTrait>(
    conn: &C,
    prefix: Option<&str>,
) -> Result<Vec<ingredient::Model>> {
    let mut query = ingredient::Entity::find();
    if let Some(prefix) = prefix.map(str::trim).filter(|p| !p.is_empty()) {
        query = query.filter(ingredient::Column::Name.starts_with(prefix));
    }
    Ok(query
        .order_by_asc(ingredient::Column::Name)
        .order_by_asc(ingredient::Column::Id)
        .all(conn)
        .await?)
}

pub async fn get_recipe<C: ConnectionTrait>(conn: &C, id: i32) -> Result<recipe::Model> {
    recipe::Entity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("recipe {}", id)))
}

/// Recipes authored by `author_id`, newest first.
pub async fn recipes_by_author<C: ConnectionTrait>(
    conn: &C,
    author_id: i32,
) -> Result<Vec<recipe::Model>> {
    Ok(recipe::Entity::find()
        .filter(recipe::Column::AuthorId.eq(author_id))
        .order_by_desc(recipe::Column::Id)
        .all(conn)
        .await?)
}

pub async fn get_user<C: ConnectionTrait>(conn: &C, id: i32) -> Result<user::Model> {
    user::Entity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("user {}", id)))
}

/// All users ordered by id, optionally capped at `limit`.
pub async fn list_users<C: ConnectionTrait>(conn: &C, limit: Option<u64>) -> Result<Vec<user::Model>> {
    let mut query = user::Entity::find().order_by_asc(user::Column::Id);
    if let Some(limit) = limit {
        query = query.limit(limit);
    }
    Ok(query.all(conn).await?)
}

/// Users by id, for rendering authors of a page of recipes in one query.
pub async fn users_by_id<C: ConnectionTrait>(
    conn: &C,
    ids: impl IntoIterator<Item = i32>,
) -> Result<HashMap<i32, user::Model>> {
    let ids: Vec<i32> = ids.into_iter().collect();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let users = user::Entity::find()
        .filter(user::Column::Id.is_in(ids))
        .all(conn)
        .await?;
    Ok(users.into_iter().map(|u| (u.id, u)).collect())
}

pub async fn ingredients_of<C: ConnectionTrait>(
    conn: &C,
    recipe_id: i32,
) -> Result<Vec<ResolvedIngredient>> {
    let mut grouped = ingredients_of_many(conn, [recipe_id]).await?;
    Ok(grouped.remove(&recipe_id).unwrap_or_default())
}

/// Resolved ingredient rows for several recipes, grouped by recipe id.
/// Rows within a recipe are ordered by ingredient id.
pub async fn ingredients_of_many<C: ConnectionTrait>(
    conn: &C,
    recipe_ids: impl IntoIterator<Item = i32>,
) -> Result<HashMap<i32, Vec<ResolvedIngredient>>> {
    let recipe_ids: Vec<i32> = recipe_ids.into_iter().collect();
    if recipe_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = recipe_ingredient::Entity::find()
        .filter(recipe_ingredient::Column::RecipeId.is_in(recipe_ids))
        .order_by_asc(recipe_ingredient::Column::RecipeId)
        .order_by_asc(recipe_ingredient::Column::IngredientId)
        .find_also_related(ingredient::Entity)
        .all(conn)
        .await?;

    let mut grouped: HashMap<i32, Vec<ResolvedIngredient>> = HashMap::new();
    for (row, ingredient) in rows {
        // The foreign key is RESTRICT, so a missing ingredient means a broken database
        let ingredient = ingredient.ok_or_else(|| {
            ServerError::Internal(format!(
                "recipe {} references missing ingredient {}",
                row.recipe_id, row.ingredient_id
            ))
        })?;
        grouped.entry(row.recipe_id).or_default().push(ResolvedIngredient {
            ingredient_id: ingredient.id,
            name: ingredient.name,
            measurement_unit: ingredient.measurement_unit,
            amount: row.amount,
        });
    }
    Ok(grouped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::*;

    #[tokio::test]
    async fn test_search_ingredients_by_prefix() {
        let (_dir, db) = test_db().await;
        seed_ingredient(&db, "Sugar", "g").await;
        seed_ingredient(&db, "Salt", "g").await;
        seed_ingredient(&db, "Flour", "g").await;

        let found = search_ingredients(&db, Some("S")).await.unwrap();
        let names: Vec<_> = found.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Salt", "Sugar"]);

        let all = search_ingredients(&db, None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].name, "Flour");
    }

    #[tokio::test]
    async fn test_missing_rows_are_not_found() {
        let (_dir, db) = test_db().await;
        assert!(matches!(get_ingredient(&db, 42).await, Err(ServerError::NotFound(_))));
        assert!(matches!(get_recipe(&db, 42).await, Err(ServerError::NotFound(_))));
        assert!(matches!(get_user(&db, 42).await, Err(ServerError::NotFound(_))));
        assert!(ingredients_of(&db, 42).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_users_in_id_order() {
        let (_dir, db) = test_db().await;
        let zoe = seed_user(&db, "zoe").await;
        let adam = seed_user(&db, "adam").await;

        let ids: Vec<_> = list_users(&db, None).await.unwrap().iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![zoe.id, adam.id]);

        let first = list_users(&db, Some(1)).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].username, "zoe");
    }
}
