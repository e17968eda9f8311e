//! Identity provider for authdesk: account and role persistence, password
//! handling, and the self-service and administration flows built on top.

pub mod admin;
pub mod error;
pub mod manager;
pub mod memory_store;
pub mod password;
pub mod sea_orm_store;
pub mod seed;
pub mod self_service;
pub mod store;
pub mod validation;

pub use admin::{
    AccountAdministration, AccountPage, AccountUpdate, AccountView, AdminError, AssignOutcome,
    EditOutcome,
};
pub use error::{IdentityError, Result};
pub use manager::{IdentityManager, NewAccount};
pub use memory_store::InMemoryIdentityStore;
pub use password::{HashingSettings, PasswordHasher, PasswordPolicy};
pub use sea_orm_store::SeaOrmIdentityStore;
pub use seed::{SeedReport, SeedSettings, seed_defaults};
pub use self_service::{AccountSelfService, LoginOutcome, LoginRequest, RegisterRequest, SelfServiceError};
pub use store::{Account, IdentityStore, RoleReplacement};

/// Role every new account receives.
pub const ROLE_USER: &str = "User";
/// Role gating the administration flow.
pub const ROLE_ADMIN: &str = "Admin";
