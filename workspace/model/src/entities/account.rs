use super::{account_role, role};
use sea_orm::entity::prelude::*;

/// A registered login identity.
///
/// The `email` doubles as the login name and is mirrored into `user_name`
/// when the account is created.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    /// Opaque unique key (UUID v4 string).
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub user_name: String,
    #[sea_orm(unique)]
    pub email: String,
    pub phone_number: String,
    /// Single display role label. Membership rows in `account_roles` are
    /// what authorization checks look at.
    pub role: Option<String>,
    /// Argon2 PHC string.
    pub password_hash: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Relation for the many-to-many relationship with Roles.
    #[sea_orm(has_many = "super::account_role::Entity")]
    AccountRole,
}

impl Related<account_role::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AccountRole.def()
    }
}

impl Related<role::Entity> for Entity {
    fn to() -> RelationDef {
        account_role::Relation::Role.def()
    }

    fn via() -> Option<RelationDef> {
        Some(account_role::Relation::Account.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
