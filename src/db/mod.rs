//! Database module for SQLite persistence using SeaORM

pub mod entities;

use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbErr, Statement};
use std::path::Path;

/// Initialize database connection and create tables
pub async fn init_database(db_path: &Path) -> Result<DatabaseConnection, DbErr> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());
    tracing::info!("Connecting to database: {}", db_url);

    let db = Database::connect(&db_url).await?;

    create_tables(&db).await?;

    Ok(db)
}

/// Current unix time in seconds
pub fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

async fn execute(db: &DatabaseConnection, sql: &str) -> Result<(), DbErr> {
    db.execute(Statement::from_string(db.get_database_backend(), sql.to_string()))
        .await?;
    Ok(())
}

/// Create all tables if they don't exist
async fn create_tables(db: &DatabaseConnection) -> Result<(), DbErr> {
    execute(
        db,
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT NOT NULL UNIQUE,
            username TEXT NOT NULL UNIQUE,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            password_hash TEXT NOT NULL DEFAULT '',
            avatar TEXT,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .await?;

    // Ingredient catalog, one row per (name, unit)
    execute(
        db,
        r#"
        CREATE TABLE IF NOT EXISTS ingredients (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            measurement_unit TEXT NOT NULL,
            UNIQUE(name, measurement_unit)
        )
        "#,
    )
    .await?;
    execute(
        db,
        r#"CREATE INDEX IF NOT EXISTS idx_ingredients_name ON ingredients(name)"#,
    )
    .await?;

    execute(
        db,
        r#"
        CREATE TABLE IF NOT EXISTS recipes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            author_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            image_ref TEXT NOT NULL,
            description TEXT NOT NULL,
            cooking_time INTEGER NOT NULL CHECK (cooking_time >= 1),
            created_at INTEGER NOT NULL,
            FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE CASCADE
        )
        "#,
    )
    .await?;
    execute(
        db,
        r#"CREATE INDEX IF NOT EXISTS idx_recipes_author ON recipes(author_id)"#,
    )
    .await?;

    // Referenced ingredients cannot be deleted out from under a recipe
    execute(
        db,
        r#"
        CREATE TABLE IF NOT EXISTS recipe_ingredients (
            recipe_id INTEGER NOT NULL,
            ingredient_id INTEGER NOT NULL,
            amount INTEGER NOT NULL CHECK (amount >= 1),
            PRIMARY KEY (recipe_id, ingredient_id),
            FOREIGN KEY (recipe_id) REFERENCES recipes(id) ON DELETE CASCADE,
            FOREIGN KEY (ingredient_id) REFERENCES ingredients(id) ON DELETE RESTRICT
        )
        "#,
    )
    .await?;
    execute(
        db,
        r#"CREATE INDEX IF NOT EXISTS idx_recipe_ingredients_ingredient ON recipe_ingredients(ingredient_id)"#,
    )
    .await?;

    // Favorite, cart and subscription edges
    execute(
        db,
        r#"
        CREATE TABLE IF NOT EXISTS relation_edges (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL CHECK (kind IN ('favorite', 'cart', 'subscription')),
            subject_id INTEGER NOT NULL,
            object_id INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (subject_id) REFERENCES users(id) ON DELETE CASCADE,
            CHECK (kind <> 'subscription' OR subject_id <> object_id)
        )
        "#,
    )
    .await?;
    execute(
        db,
        r#"CREATE UNIQUE INDEX IF NOT EXISTS idx_relation_edges_unique ON relation_edges(subject_id, object_id, kind)"#,
    )
    .await?;
    execute(
        db,
        r#"CREATE INDEX IF NOT EXISTS idx_relation_edges_object ON relation_edges(object_id, kind)"#,
    )
    .await?;

    tracing::info!("Database tables initialized");
    Ok(())
}
