//! Database entities

pub mod ingredient;
pub mod recipe;
pub mod recipe_ingredient;
pub mod relation_edge;
pub mod user;
