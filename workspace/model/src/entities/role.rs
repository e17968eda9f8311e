use super::{account, account_role};
use sea_orm::entity::prelude::*;

/// A named permission label, e.g. "User" or "Admin".
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "roles")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub name: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::account_role::Entity")]
    AccountRole,
}

impl Related<account_role::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AccountRole.def()
    }
}

impl Related<account::Entity> for Entity {
    fn to() -> RelationDef {
        account_role::Relation::Account.def()
    }

    fn via() -> Option<RelationDef> {
        Some(account_role::Relation::Role.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
