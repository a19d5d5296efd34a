//! Recipe writer: creates, replaces and deletes recipes together with their
//! ingredient rows.
//!
//! Every write runs in one `DatabaseTransaction`. A recipe and its ingredient
//! set are committed together or not at all.

use std::collections::HashSet;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use serde::Deserialize;

use crate::catalog;
use crate::db::entities::{ingredient, recipe, recipe_ingredient};
use crate::error::{Result, ServerError};
use crate::ledger::RelationLedger;

/// One `{id, amount}` entry of a recipe's ingredient list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct IngredientItem {
    pub id: i32,
    pub amount: i32,
}

#[derive(Clone, Debug, Default)]
pub struct NewRecipe {
    pub name: String,
    pub image: Option<String>,
    pub text: String,
    pub cooking_time: i32,
}

/// Attributes to change. `None` leaves the stored value alone; in particular
/// `ingredients: None` keeps the current ingredient set.
#[derive(Clone, Debug, Default)]
pub struct RecipePatch {
    pub name: Option<String>,
    pub image: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<i32>,
    pub ingredients: Option<Vec<IngredientItem>>,
}

/// Check an ingredient list: non-empty, no repeated ids, amounts of at least
/// one, every id known to the catalog. Structural checks run before the
/// catalog query.
pub async fn validate_ingredient_list<C: ConnectionTrait>(
    conn: &C,
    items: &[IngredientItem],
) -> Result<()> {
    if items.is_empty() {
        return Err(ServerError::EmptyIngredientList);
    }

    let mut seen = HashSet::with_capacity(items.len());
    for item in items {
        if !seen.insert(item.id) {
            return Err(ServerError::DuplicateIngredient(item.id));
        }
    }

    if let Some(item) = items.iter().find(|item| item.amount < 1) {
        return Err(ServerError::NonPositiveAmount(item.id));
    }

    let known: HashSet<i32> = ingredient::Entity::find()
        .filter(ingredient::Column::Id.is_in(seen.iter().copied()))
        .all(conn)
        .await?
        .into_iter()
        .map(|i| i.id)
        .collect();

    match items.iter().find(|item| !known.contains(&item.id)) {
        Some(item) => Err(ServerError::UnknownIngredient(item.id)),
        None => Ok(()),
    }
}

fn check_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(ServerError::invalid("name", "This field may not be blank"));
    }
    Ok(())
}

fn check_cooking_time(minutes: i32) -> Result<()> {
    if minutes < 1 {
        return Err(ServerError::InvalidCookingTime);
    }
    Ok(())
}

async fn insert_ingredients<C: ConnectionTrait>(
    conn: &C,
    recipe_id: i32,
    items: &[IngredientItem],
) -> Result<()> {
    let rows = items.iter().map(|item| recipe_ingredient::ActiveModel {
        recipe_id: Set(recipe_id),
        ingredient_id: Set(item.id),
        amount: Set(item.amount),
    });
    recipe_ingredient::Entity::insert_many(rows)
        .exec_without_returning(conn)
        .await?;
    Ok(())
}

/// Create a recipe owned by `author_id` with the given ingredient set.
pub async fn create_recipe(
    db: &DatabaseConnection,
    author_id: i32,
    recipe: NewRecipe,
    items: Vec<IngredientItem>,
) -> Result<recipe::Model> {
    let image = recipe
        .image
        .filter(|image| !image.trim().is_empty())
        .ok_or(ServerError::MissingImage)?;
    check_name(&recipe.name)?;
    check_cooking_time(recipe.cooking_time)?;

    let txn = db.begin().await?;

    validate_ingredient_list(&txn, &items).await?;

    let created = recipe::ActiveModel {
        author_id: Set(author_id),
        name: Set(recipe.name),
        image_ref: Set(image),
        description: Set(recipe.text),
        cooking_time: Set(recipe.cooking_time),
        created_at: Set(crate::db::now()),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    insert_ingredients(&txn, created.id, &items).await?;

    txn.commit().await?;

    tracing::info!(
        "Created recipe {} ({} ingredients) by user {}",
        created.id,
        items.len(),
        author_id
    );
    Ok(created)
}

/// Apply `patch` to a recipe. Only its author may change it.
pub async fn update_recipe(
    db: &DatabaseConnection,
    recipe_id: i32,
    actor_id: i32,
    patch: RecipePatch,
) -> Result<recipe::Model> {
    if let Some(name) = &patch.name {
        check_name(name)?;
    }
    if let Some(minutes) = patch.cooking_time {
        check_cooking_time(minutes)?;
    }
    if patch.image.as_deref().is_some_and(|image| image.trim().is_empty()) {
        return Err(ServerError::invalid("image", "This field may not be blank"));
    }

    let txn = db.begin().await?;

    let existing = catalog::get_recipe(&txn, recipe_id).await?;
    if existing.author_id != actor_id {
        return Err(ServerError::PermissionDenied);
    }

    if let Some(items) = &patch.ingredients {
        validate_ingredient_list(&txn, items).await?;
    }

    let mut active: recipe::ActiveModel = existing.clone().into();
    if let Some(name) = patch.name {
        active.name = Set(name);
    }
    if let Some(image) = patch.image {
        active.image_ref = Set(image);
    }
    if let Some(text) = patch.text {
        active.description = Set(text);
    }
    if let Some(minutes) = patch.cooking_time {
        active.cooking_time = Set(minutes);
    }
    let updated = if active.is_changed() {
        active.update(&txn).await?
    } else {
        existing
    };

    if let Some(items) = &patch.ingredients {
        recipe_ingredient::Entity::delete_many()
            .filter(recipe_ingredient::Column::RecipeId.eq(recipe_id))
            .exec(&txn)
            .await?;
        insert_ingredients(&txn, recipe_id, items).await?;
    }

    txn.commit().await?;

    tracing::info!(
        "Updated recipe {}{}",
        recipe_id,
        if patch.ingredients.is_some() { " and replaced its ingredients" } else { "" }
    );
    Ok(updated)
}

/// Delete a recipe, its ingredient rows and every favorite/cart edge that
/// points at it. Only its author may delete it.
pub async fn delete_recipe(db: &DatabaseConnection, recipe_id: i32, actor_id: i32) -> Result<()> {
    let txn = db.begin().await?;

    let existing = catalog::get_recipe(&txn, recipe_id).await?;
    if existing.author_id != actor_id {
        return Err(ServerError::PermissionDenied);
    }

    RelationLedger::favorites().remove_all_to(&txn, recipe_id).await?;
    RelationLedger::cart().remove_all_to(&txn, recipe_id).await?;
    // recipe_ingredients rows go with the recipe (ON DELETE CASCADE)
    recipe::Entity::delete_by_id(recipe_id).exec(&txn).await?;

    txn.commit().await?;

    tracing::info!("Deleted recipe {}", recipe_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::*;
    use sea_orm::PaginatorTrait;

    fn item(id: i32, amount: i32) -> IngredientItem {
        IngredientItem { id, amount }
    }

    fn soup() -> NewRecipe {
        NewRecipe {
            name: "Soup".to_string(),
            image: Some("soup.png".to_string()),
            text: "Boil everything".to_string(),
            cooking_time: 30,
        }
    }

    async fn row_count(db: &DatabaseConnection, recipe_id: i32) -> u64 {
        recipe_ingredient::Entity::find()
            .filter(recipe_ingredient::Column::RecipeId.eq(recipe_id))
            .count(db)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_validate_ingredient_list() {
        let (_dir, db) = test_db().await;
        let salt = seed_ingredient(&db, "Salt", "g").await;

        assert!(matches!(
            validate_ingredient_list(&db, &[]).await,
            Err(ServerError::EmptyIngredientList)
        ));
        assert!(matches!(
            validate_ingredient_list(&db, &[item(salt.id, 2), item(salt.id, 3)]).await,
            Err(ServerError::DuplicateIngredient(id)) if id == salt.id
        ));
        assert!(matches!(
            validate_ingredient_list(&db, &[item(salt.id, 0)]).await,
            Err(ServerError::NonPositiveAmount(_))
        ));
        assert!(matches!(
            validate_ingredient_list(&db, &[item(salt.id, 1), item(999, 1)]).await,
            Err(ServerError::UnknownIngredient(999))
        ));
        validate_ingredient_list(&db, &[item(salt.id, 1)]).await.unwrap();
    }

    #[tokio::test]
    async fn test_create_recipe_writes_all_rows() {
        let (_dir, db) = test_db().await;
        let alice = seed_user(&db, "alice").await;
        let salt = seed_ingredient(&db, "Salt", "g").await;
        let water = seed_ingredient(&db, "Water", "ml").await;

        let recipe = create_recipe(&db, alice.id, soup(), vec![item(salt.id, 5), item(water.id, 500)])
            .await
            .unwrap();
        assert_eq!(recipe.author_id, alice.id);
        assert_eq!(recipe.image_ref, "soup.png");

        let rows = catalog::ingredients_of(&db, recipe.id).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "Salt");
        assert_eq!(rows[0].amount, 5);
        assert_eq!(rows[1].measurement_unit, "ml");
    }

    #[tokio::test]
    async fn test_create_recipe_rejects_bad_input_without_writing() {
        let (_dir, db) = test_db().await;
        let alice = seed_user(&db, "alice").await;
        let salt = seed_ingredient(&db, "Salt", "g").await;

        let duplicate = create_recipe(&db, alice.id, soup(), vec![item(salt.id, 2), item(salt.id, 3)]).await;
        assert!(matches!(duplicate, Err(ServerError::DuplicateIngredient(_))));

        let zero = create_recipe(&db, alice.id, soup(), vec![item(salt.id, 0)]).await;
        assert!(matches!(zero, Err(ServerError::NonPositiveAmount(_))));

        let empty = create_recipe(&db, alice.id, soup(), vec![]).await;
        assert!(matches!(empty, Err(ServerError::EmptyIngredientList)));

        let unknown = create_recipe(&db, alice.id, soup(), vec![item(404, 1)]).await;
        assert!(matches!(unknown, Err(ServerError::UnknownIngredient(404))));

        let no_image = NewRecipe { image: None, ..soup() };
        let missing = create_recipe(&db, alice.id, no_image, vec![item(salt.id, 1)]).await;
        assert!(matches!(missing, Err(ServerError::MissingImage)));

        let instant = NewRecipe { cooking_time: 0, ..soup() };
        let result = create_recipe(&db, alice.id, instant, vec![item(salt.id, 1)]).await;
        assert!(matches!(result, Err(ServerError::InvalidCookingTime)));

        let count = recipe::Entity::find().count(&db).await.unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_update_replaces_ingredient_set() {
        let (_dir, db) = test_db().await;
        let alice = seed_user(&db, "alice").await;
        let salt = seed_ingredient(&db, "Salt", "g").await;
        let pepper = seed_ingredient(&db, "Pepper", "g").await;

        let recipe = create_recipe(&db, alice.id, soup(), vec![item(salt.id, 5)])
            .await
            .unwrap();

        let patch = RecipePatch {
            ingredients: Some(vec![item(pepper.id, 1)]),
            ..Default::default()
        };
        update_recipe(&db, recipe.id, alice.id, patch).await.unwrap();

        let rows = catalog::ingredients_of(&db, recipe.id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].ingredient_id, pepper.id);
        assert_eq!(rows[0].amount, 1);
    }

    #[tokio::test]
    async fn test_update_without_items_keeps_ingredients() {
        let (_dir, db) = test_db().await;
        let alice = seed_user(&db, "alice").await;
        let salt = seed_ingredient(&db, "Salt", "g").await;

        let recipe = create_recipe(&db, alice.id, soup(), vec![item(salt.id, 5)])
            .await
            .unwrap();

        let patch = RecipePatch {
            name: Some("Better soup".to_string()),
            cooking_time: Some(45),
            ..Default::default()
        };
        let updated = update_recipe(&db, recipe.id, alice.id, patch).await.unwrap();
        assert_eq!(updated.name, "Better soup");
        assert_eq!(updated.cooking_time, 45);
        assert_eq!(updated.image_ref, "soup.png");
        assert_eq!(row_count(&db, recipe.id).await, 1);
    }

    #[tokio::test]
    async fn test_failed_update_changes_nothing() {
        let (_dir, db) = test_db().await;
        let alice = seed_user(&db, "alice").await;
        let salt = seed_ingredient(&db, "Salt", "g").await;

        let recipe = create_recipe(&db, alice.id, soup(), vec![item(salt.id, 5)])
            .await
            .unwrap();

        let patch = RecipePatch {
            name: Some("Renamed".to_string()),
            ingredients: Some(vec![item(salt.id, 1), item(777, 1)]),
            ..Default::default()
        };
        let result = update_recipe(&db, recipe.id, alice.id, patch).await;
        assert!(matches!(result, Err(ServerError::UnknownIngredient(777))));

        let stored = catalog::get_recipe(&db, recipe.id).await.unwrap();
        assert_eq!(stored.name, "Soup");
        let rows = catalog::ingredients_of(&db, recipe.id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].amount, 5);
    }

    #[tokio::test]
    async fn test_only_author_may_write() {
        let (_dir, db) = test_db().await;
        let alice = seed_user(&db, "alice").await;
        let bob = seed_user(&db, "bob").await;
        let salt = seed_ingredient(&db, "Salt", "g").await;

        let recipe = create_recipe(&db, alice.id, soup(), vec![item(salt.id, 5)])
            .await
            .unwrap();

        let patch = RecipePatch {
            name: Some("Mine now".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            update_recipe(&db, recipe.id, bob.id, patch).await,
            Err(ServerError::PermissionDenied)
        ));
        assert!(matches!(
            delete_recipe(&db, recipe.id, bob.id).await,
            Err(ServerError::PermissionDenied)
        ));
        assert!(matches!(
            update_recipe(&db, 999, alice.id, RecipePatch::default()).await,
            Err(ServerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let (_dir, db) = test_db().await;
        let alice = seed_user(&db, "alice").await;
        let bob = seed_user(&db, "bob").await;
        let salt = seed_ingredient(&db, "Salt", "g").await;

        let recipe = create_recipe(&db, alice.id, soup(), vec![item(salt.id, 5)])
            .await
            .unwrap();
        RelationLedger::cart().add(&db, bob.id, recipe.id).await.unwrap();
        RelationLedger::favorites().add(&db, bob.id, recipe.id).await.unwrap();

        delete_recipe(&db, recipe.id, alice.id).await.unwrap();

        assert_eq!(row_count(&db, recipe.id).await, 0);
        assert!(RelationLedger::cart().objects_of(&db, bob.id).await.unwrap().is_empty());
        assert!(RelationLedger::favorites().objects_of(&db, bob.id).await.unwrap().is_empty());
        // The ingredient itself stays in the catalog
        catalog::get_ingredient(&db, salt.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_blank_image_patch_is_rejected() {
        let (_dir, db) = test_db().await;
        let alice = seed_user(&db, "alice").await;
        let salt = seed_ingredient(&db, "Salt", "g").await;

        let recipe = create_recipe(&db, alice.id, soup(), vec![item(salt.id, 5)])
            .await
            .unwrap();

        let patch = RecipePatch {
            image: Some("  ".to_string()),
            ..Default::default()
        };
        let result = update_recipe(&db, recipe.id, alice.id, patch).await;
        assert!(matches!(&result, Err(err) if err.field() == Some("image")));

        let stored = catalog::get_recipe(&db, recipe.id).await.unwrap();
        assert_eq!(stored.image_ref, "soup.png");
    }

    /// Make every ingredient row insert fail at the storage layer
    async fn break_ingredient_inserts(db: &DatabaseConnection) {
        db.execute_unprepared(
            "CREATE TRIGGER reject_recipe_ingredients BEFORE INSERT ON recipe_ingredients \
             BEGIN SELECT RAISE(ABORT, 'ingredient rows rejected'); END",
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_create_rolls_back_recipe_when_ingredient_rows_fail() {
        let (_dir, db) = test_db().await;
        let alice = seed_user(&db, "alice").await;
        let salt = seed_ingredient(&db, "Salt", "g").await;
        break_ingredient_inserts(&db).await;

        let result = create_recipe(&db, alice.id, soup(), vec![item(salt.id, 5)]).await;
        assert!(matches!(result, Err(ServerError::Database(_))));

        let count = recipe::Entity::find().count(&db).await.unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_update_rolls_back_when_replacement_rows_fail() {
        let (_dir, db) = test_db().await;
        let alice = seed_user(&db, "alice").await;
        let salt = seed_ingredient(&db, "Salt", "g").await;
        let pepper = seed_ingredient(&db, "Pepper", "g").await;

        let recipe = create_recipe(&db, alice.id, soup(), vec![item(salt.id, 5)])
            .await
            .unwrap();
        break_ingredient_inserts(&db).await;

        let patch = RecipePatch {
            name: Some("Pepper soup".to_string()),
            ingredients: Some(vec![item(pepper.id, 2)]),
            ..Default::default()
        };
        let result = update_recipe(&db, recipe.id, alice.id, patch).await;
        assert!(matches!(result, Err(ServerError::Database(_))));

        let stored = catalog::get_recipe(&db, recipe.id).await.unwrap();
        assert_eq!(stored.name, "Soup");
        let rows = catalog::ingredients_of(&db, recipe.id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].ingredient_id, salt.id);
    }
}
