//! Relation edge entity - favorite, cart and subscription edges
//!
//! `subject_id` is always a user. `object_id` is a recipe for favorite and
//! cart edges and a user for subscriptions, so it carries no foreign key.
//! Uniqueness of (subject_id, object_id, kind) and the self-subscription ban
//! are enforced by the schema in `db::create_tables`.

use sea_orm::entity::prelude::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum RelationKind {
    #[sea_orm(string_value = "favorite")]
    Favorite,
    #[sea_orm(string_value = "cart")]
    Cart,
    #[sea_orm(string_value = "subscription")]
    Subscription,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "relation_edges")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub kind: RelationKind,
    pub subject_id: i32,
    pub object_id: i32,
    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::SubjectId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    Subject,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Subject.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
