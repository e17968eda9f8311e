//! This file serves as the root for all SeaORM entity modules.
//! Accounts and roles are linked through the `account_roles` join table.

pub mod account;
pub mod account_role;
pub mod role;

pub mod prelude {
    //! A prelude module for easy importing of all entities.
    pub use super::account::Entity as Account;
    pub use super::account_role::Entity as AccountRole;
    pub use super::role::Entity as Role;
}
