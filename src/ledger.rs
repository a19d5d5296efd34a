//! Relation ledger: favorite, cart and subscription edges.
//!
//! An edge exists at most once per (subject, object, kind). Duplicates are
//! rejected by the unique index on `relation_edges` and surfaced as
//! `Conflict`, so two concurrent identical requests cannot both succeed.

use std::collections::HashSet;

use sea_orm::{
    ActiveEnum, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, SqlErr,
};

use crate::db::entities::relation_edge::{self, RelationKind};
use crate::error::{Result, ServerError};

/// Edge operations for one relation kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RelationLedger {
    kind: RelationKind,
}

impl RelationLedger {
    const fn new(kind: RelationKind) -> Self {
        Self { kind }
    }

    /// user -> recipe
    pub const fn favorites() -> Self {
        Self::new(RelationKind::Favorite)
    }

    /// user -> recipe
    pub const fn cart() -> Self {
        Self::new(RelationKind::Cart)
    }

    /// user -> user
    pub const fn subscriptions() -> Self {
        Self::new(RelationKind::Subscription)
    }

    /// Create the edge `subject -> object`.
    pub async fn add<C: ConnectionTrait>(
        &self,
        conn: &C,
        subject: i32,
        object: i32,
    ) -> Result<relation_edge::Model> {
        if self.kind == RelationKind::Subscription && subject == object {
            return Err(ServerError::InvalidRelation);
        }

        let edge = relation_edge::ActiveModel {
            kind: Set(self.kind),
            subject_id: Set(subject),
            object_id: Set(object),
            created_at: Set(crate::db::now()),
            ..Default::default()
        };

        match edge.insert(conn).await {
            Ok(edge) => {
                tracing::debug!(
                    "Added {} edge {} -> {}",
                    self.kind.to_value(),
                    subject,
                    object
                );
                Ok(edge)
            }
            Err(err) => match err.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => Err(ServerError::Conflict(format!(
                    "{} {} -> {}",
                    self.kind.to_value(),
                    subject,
                    object
                ))),
                _ => Err(err.into()),
            },
        }
    }

    /// Delete the edge `subject -> object`.
    pub async fn remove<C: ConnectionTrait>(&self, conn: &C, subject: i32, object: i32) -> Result<()> {
        let result = relation_edge::Entity::delete_many()
            .filter(relation_edge::Column::Kind.eq(self.kind))
            .filter(relation_edge::Column::SubjectId.eq(subject))
            .filter(relation_edge::Column::ObjectId.eq(object))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServerError::NotFound(format!(
                "{} {} -> {}",
                self.kind.to_value(),
                subject,
                object
            )));
        }

        tracing::debug!(
            "Removed {} edge {} -> {}",
            self.kind.to_value(),
            subject,
            object
        );
        Ok(())
    }

    pub async fn contains<C: ConnectionTrait>(&self, conn: &C, subject: i32, object: i32) -> Result<bool> {
        let found = relation_edge::Entity::find()
            .filter(relation_edge::Column::Kind.eq(self.kind))
            .filter(relation_edge::Column::SubjectId.eq(subject))
            .filter(relation_edge::Column::ObjectId.eq(object))
            .one(conn)
            .await?;
        Ok(found.is_some())
    }

    /// Object ids of `subject`, in insertion order.
    pub async fn objects_of<C: ConnectionTrait>(&self, conn: &C, subject: i32) -> Result<Vec<i32>> {
        let ids = relation_edge::Entity::find()
            .select_only()
            .column(relation_edge::Column::ObjectId)
            .filter(relation_edge::Column::Kind.eq(self.kind))
            .filter(relation_edge::Column::SubjectId.eq(subject))
            .order_by_asc(relation_edge::Column::Id)
            .into_tuple::<i32>()
            .all(conn)
            .await?;
        Ok(ids)
    }

    /// Object ids of `subject` as a set. Anonymous callers get an empty set.
    pub async fn object_set<C: ConnectionTrait>(
        &self,
        conn: &C,
        subject: Option<i32>,
    ) -> Result<HashSet<i32>> {
        match subject {
            Some(subject) => Ok(self.objects_of(conn, subject).await?.into_iter().collect()),
            None => Ok(HashSet::new()),
        }
    }

    /// Drop every edge of this kind pointing at `object`.
    pub async fn remove_all_to<C: ConnectionTrait>(&self, conn: &C, object: i32) -> Result<u64> {
        let result = relation_edge::Entity::delete_many()
            .filter(relation_edge::Column::Kind.eq(self.kind))
            .filter(relation_edge::Column::ObjectId.eq(object))
            .exec(conn)
            .await?;
        Ok(result.rows_affected)
    }
}

/// The requesting user's relation sets, fetched once per request so that
/// rendering a list of recipes or users is a set lookup per item.
#[derive(Clone, Debug, Default)]
pub struct ViewerRelations {
    pub favorites: HashSet<i32>,
    pub cart: HashSet<i32>,
    pub subscriptions: HashSet<i32>,
}

impl ViewerRelations {
    pub async fn load<C: ConnectionTrait>(conn: &C, viewer: Option<i32>) -> Result<Self> {
        if viewer.is_none() {
            return Ok(Self::default());
        }
        Ok(Self {
            favorites: RelationLedger::favorites().object_set(conn, viewer).await?,
            cart: RelationLedger::cart().object_set(conn, viewer).await?,
            subscriptions: RelationLedger::subscriptions().object_set(conn, viewer).await?,
        })
    }

    pub fn is_favorited(&self, recipe_id: i32) -> bool {
        self.favorites.contains(&recipe_id)
    }

    pub fn is_in_shopping_cart(&self, recipe_id: i32) -> bool {
        self.cart.contains(&recipe_id)
    }

    pub fn is_subscribed(&self, user_id: i32) -> bool {
        self.subscriptions.contains(&user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::*;

    #[tokio::test]
    async fn test_add_twice_conflicts() {
        let (_dir, db) = test_db().await;
        let alice = seed_user(&db, "alice").await;
        let ledger = RelationLedger::favorites();

        let edge = ledger.add(&db, alice.id, 7).await.unwrap();
        assert_eq!(edge.subject_id, alice.id);
        assert_eq!(edge.object_id, 7);
        assert_eq!(edge.kind, RelationKind::Favorite);

        let second = ledger.add(&db, alice.id, 7).await;
        assert!(matches!(second, Err(ServerError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_kinds_are_independent() {
        let (_dir, db) = test_db().await;
        let alice = seed_user(&db, "alice").await;

        RelationLedger::favorites().add(&db, alice.id, 7).await.unwrap();
        RelationLedger::cart().add(&db, alice.id, 7).await.unwrap();

        assert!(RelationLedger::cart().contains(&db, alice.id, 7).await.unwrap());
        RelationLedger::cart().remove(&db, alice.id, 7).await.unwrap();
        assert!(RelationLedger::favorites().contains(&db, alice.id, 7).await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_missing_edge_is_not_found() {
        let (_dir, db) = test_db().await;
        let alice = seed_user(&db, "alice").await;

        let result = RelationLedger::cart().remove(&db, alice.id, 1).await;
        assert!(matches!(result, Err(ServerError::NotFound(_))));

        RelationLedger::cart().add(&db, alice.id, 1).await.unwrap();
        RelationLedger::cart().remove(&db, alice.id, 1).await.unwrap();
        let again = RelationLedger::cart().remove(&db, alice.id, 1).await;
        assert!(matches!(again, Err(ServerError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_self_subscription_is_invalid() {
        let (_dir, db) = test_db().await;
        let alice = seed_user(&db, "alice").await;
        let bob = seed_user(&db, "bob").await;
        let ledger = RelationLedger::subscriptions();

        assert!(matches!(
            ledger.add(&db, alice.id, alice.id).await,
            Err(ServerError::InvalidRelation)
        ));

        ledger.add(&db, alice.id, bob.id).await.unwrap();
        assert!(matches!(
            ledger.add(&db, alice.id, alice.id).await,
            Err(ServerError::InvalidRelation)
        ));
    }

    #[tokio::test]
    async fn test_objects_in_insertion_order() {
        let (_dir, db) = test_db().await;
        let alice = seed_user(&db, "alice").await;
        let bob = seed_user(&db, "bob").await;
        let ledger = RelationLedger::cart();

        for recipe in [5, 2, 9] {
            ledger.add(&db, alice.id, recipe).await.unwrap();
        }
        ledger.add(&db, bob.id, 4).await.unwrap();

        assert_eq!(ledger.objects_of(&db, alice.id).await.unwrap(), vec![5, 2, 9]);
        // Listing is read-only and can be repeated
        assert_eq!(ledger.objects_of(&db, alice.id).await.unwrap(), vec![5, 2, 9]);
        assert_eq!(ledger.objects_of(&db, bob.id).await.unwrap(), vec![4]);
    }

    #[tokio::test]
    async fn test_viewer_relations() {
        let (_dir, db) = test_db().await;
        let alice = seed_user(&db, "alice").await;
        let bob = seed_user(&db, "bob").await;
        RelationLedger::favorites().add(&db, alice.id, 3).await.unwrap();
        RelationLedger::subscriptions().add(&db, alice.id, bob.id).await.unwrap();

        let viewer = ViewerRelations::load(&db, Some(alice.id)).await.unwrap();
        assert!(viewer.is_favorited(3));
        assert!(!viewer.is_in_shopping_cart(3));
        assert!(viewer.is_subscribed(bob.id));

        let anonymous = ViewerRelations::load(&db, None).await.unwrap();
        assert!(!anonymous.is_favorited(3));
        assert!(!anonymous.is_subscribed(bob.id));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_identical_adds_have_one_winner() {
        let (_dir, db) = test_db().await;
        let alice_id = seed_user(&db, "alice").await.id;

        let mut handles = Vec::new();
        for _ in 0..16 {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                RelationLedger::cart().add(&db, alice_id, 42).await
            }));
        }

        let mut added = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => added += 1,
                Err(ServerError::Conflict(_)) => conflicts += 1,
                Err(other) => panic!("unexpected error: {}", other),
            }
        }
        assert_eq!(added, 1);
        assert_eq!(conflicts, 15);
        assert_eq!(RelationLedger::cart().objects_of(&db, alice_id).await.unwrap(), vec![42]);
    }
}
