//! Shopping list aggregation over a user's cart.

use std::collections::HashMap;

use sea_orm::ConnectionTrait;
use serde::Serialize;

use crate::catalog::{self, ResolvedIngredient};
use crate::error::{Result, ServerError};
use crate::ledger::RelationLedger;

pub const SHOPPING_LIST_FILENAME: &str = "shopping_list.txt";

/// Total amount of one ingredient across every recipe in the cart.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ShoppingListEntry {
    pub ingredient_id: i32,
    pub name: String,
    pub measurement_unit: String,
    pub total_amount: i64,
}

/// Sum amounts per ingredient id. Two ingredients sharing a name but not a
/// unit stay separate. Output is sorted by name, then by ingredient id.
pub fn merge_ingredients<I>(rows: I) -> Vec<ShoppingListEntry>
where
    I: IntoIterator<Item = ResolvedIngredient>,
{
    let mut totals: HashMap<i32, ShoppingListEntry> = HashMap::new();
    for row in rows {
        totals
            .entry(row.ingredient_id)
            .or_insert_with(|| ShoppingListEntry {
                ingredient_id: row.ingredient_id,
                name: row.name,
                measurement_unit: row.measurement_unit,
                total_amount: 0,
            })
            .total_amount += i64::from(row.amount);
    }

    let mut entries: Vec<ShoppingListEntry> = totals.into_values().collect();
    entries.sort_by(|a, b| {
        a.name
            .cmp(&b.name)
            .then_with(|| a.ingredient_id.cmp(&b.ingredient_id))
    });
    entries
}

/// Consolidated shopping list for `user_id`. Read-only.
pub async fn aggregate_cart<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
) -> Result<Vec<ShoppingListEntry>> {
    let recipe_ids = RelationLedger::cart().objects_of(conn, user_id).await?;
    if recipe_ids.is_empty() {
        return Err(ServerError::EmptyCart);
    }

    let grouped = catalog::ingredients_of_many(conn, recipe_ids.iter().copied()).await?;
    let entries = merge_ingredients(grouped.into_values().flatten());
    if entries.is_empty() {
        return Err(ServerError::EmptyCart);
    }

    tracing::debug!(
        "Aggregated {} recipes into {} shopping list entries for user {}",
        recipe_ids.len(),
        entries.len(),
        user_id
    );
    Ok(entries)
}

/// One `"{name} ({unit}) - {total}"` line per entry.
pub fn render_shopping_list(entries: &[ShoppingListEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("{} ({}) - {}", e.name, e.measurement_unit, e.total_amount))
        .collect::<Vec<_>>()
        .join("\n")
}
