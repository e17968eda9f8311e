use async_trait::async_trait;
use std::fmt::Debug;

use crate::error::Result;

/// Account record as persisted by the identity store.
pub type Account = model::entities::account::Model;

/// Result of replacing an account's memberships with a single role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleReplacement {
    /// The target role did not exist and was created as part of the replacement.
    pub role_created: bool,
}

/// Persistence capabilities the identity layer needs.
///
/// Role arguments are role *names*; implementations resolve them to their
/// own keys. Operations that the store refuses (unknown role, duplicate
/// membership) fail with [`crate::IdentityError::Rejected`].
#[async_trait]
pub trait IdentityStore: Send + Sync + Debug {
    async fn insert_account(&self, account: Account) -> Result<Account>;

    /// Inserts the account together with its first membership, creating the
    /// role when it is missing. Both are written or neither is.
    async fn insert_account_with_role(&self, account: Account, role: &str) -> Result<Account>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Account>>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>>;

    /// Overwrites email, user name, phone number, role label and password hash.
    async fn update_account(&self, account: Account) -> Result<Account>;

    async fn delete_account(&self, id: &str) -> Result<()>;

    /// One page of accounts in natural storage order; `page_index` is zero based.
    async fn list_accounts(&self, page_index: u64, page_size: u64) -> Result<Vec<Account>>;

    async fn count_accounts(&self) -> Result<u64>;

    /// Role names the account is a member of.
    async fn roles_for(&self, account_id: &str) -> Result<Vec<String>>;

    async fn role_exists(&self, name: &str) -> Result<bool>;

    async fn create_role(&self, name: &str) -> Result<()>;

    async fn add_to_role(&self, account_id: &str, role: &str) -> Result<()>;

    /// Removes every listed membership or none of them.
    async fn remove_from_roles(&self, account_id: &str, roles: &[String]) -> Result<()>;

    /// Overwrites the account like [`IdentityStore::update_account`] and, when
    /// `role` is given, makes it the only membership, creating the role when
    /// it is missing. Either everything is written or nothing is.
    async fn update_account_with_role(
        &self,
        account: Account,
        role: Option<&str>,
    ) -> Result<(Account, Option<RoleReplacement>)>;
}
