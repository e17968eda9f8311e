//! Role-bound account administration: listing, details, edit with role
//! synchronization, and deletion with role cleanup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, trace, warn};
use utoipa::ToSchema;
use validator::Validate;

use crate::error::IdentityError;
use crate::manager::IdentityManager;
use crate::store::Account;
use crate::validation::{collect_messages, validate_phone};
use crate::{ROLE_ADMIN, ROLE_USER};

/// Failures of the administration flow
#[derive(Error, Debug)]
pub enum AdminError {
    #[error("Account not found")]
    NotFound,

    #[error("Invalid request, ID mismatch")]
    IdMismatch,

    #[error("Invalid input: {}", .0.join(", "))]
    Validation(Vec<String>),

    #[error("You cannot change your own administrator role")]
    SelfDemotion,

    #[error("Edit failed: Email '{0}' is already taken")]
    EmailTaken(String),

    /// The identity store rejected the operation
    #[error("{context}: {}", .reasons.join(", "))]
    Provider {
        context: &'static str,
        reasons: Vec<String>,
    },
}

fn provider(context: &'static str) -> impl FnOnce(IdentityError) -> AdminError {
    move |err| AdminError::Provider {
        context,
        reasons: err.reasons(),
    }
}

/// Proposed values for an account edit.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, Validate)]
pub struct AccountUpdate {
    /// Must equal the id in the request path
    pub id: String,
    #[validate(email(message = "Please enter a valid email address"))]
    pub email: String,
    #[validate(
        length(
            min = 10,
            max = 15,
            message = "Phone number must be between 10 and 15 characters"
        ),
        custom(function = "validate_phone")
    )]
    pub phone_number: String,
    #[validate(length(min = 1, max = 64, message = "Role must be between 1 and 64 characters"))]
    pub role: String,
}

/// Account as shown to administrators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AccountView {
    pub id: String,
    pub email: String,
    pub phone_number: String,
    pub role: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Account> for AccountView {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            email: account.email,
            phone_number: account.phone_number,
            role: account.role,
            created_at: account.created_at,
        }
    }
}

/// One page of the account listing
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AccountPage {
    pub accounts: Vec<AccountView>,
    pub current_page: u64,
    pub page_size: u64,
    /// ceil(total_accounts / page_size)
    pub total_pages: u64,
    pub total_accounts: u64,
}

/// What an edit changed besides the account fields
#[derive(Debug, Clone)]
pub struct EditOutcome {
    pub account: AccountView,
    pub role_changed: bool,
    pub role_created: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOutcome {
    Assigned { role_created: bool },
    AlreadyInRole,
}

/// The administration flow. Callers are expected to have checked that the
/// acting account holds the "Admin" role.
#[derive(Debug, Clone)]
pub struct AccountAdministration {
    identity: Arc<IdentityManager>,
}

impl AccountAdministration {
    pub fn new(identity: Arc<IdentityManager>) -> Self {
        Self { identity }
    }

    #[instrument(skip(self))]
    pub async fn list_accounts(&self, page: u64, page_size: u64) -> Result<AccountPage, AdminError> {
        if page == 0 || page_size == 0 {
            return Err(AdminError::Validation(vec![
                "Page and page size must be at least 1".to_string(),
            ]));
        }

        let store = self.identity.store();
        let total_accounts = store
            .count_accounts()
            .await
            .map_err(provider("Listing failed"))?;
        // Pages past the last account are empty; skipping the store also
        // keeps huge page numbers from overflowing the offset
        let past_end = (page - 1)
            .checked_mul(page_size)
            .is_none_or(|offset| offset >= total_accounts);
        let accounts = if past_end {
            trace!("Page {} is past the last account", page);
            Vec::new()
        } else {
            store
                .list_accounts(page - 1, page_size)
                .await
                .map_err(provider("Listing failed"))?
        };
        debug!("Fetched {} of {} accounts", accounts.len(), total_accounts);

        Ok(AccountPage {
            accounts: accounts.into_iter().map(AccountView::from).collect(),
            current_page: page,
            page_size,
            total_pages: total_accounts.div_ceil(page_size),
            total_accounts,
        })
    }

    pub async fn account_details(&self, id: &str) -> Result<AccountView, AdminError> {
        self.find(id).await.map(AccountView::from)
    }

    /// Load an account for editing, filling an unset role label from the
    /// account's memberships.
    #[instrument(skip(self))]
    pub async fn load_for_edit(&self, id: &str) -> Result<AccountView, AdminError> {
        let mut account = self.find(id).await?;

        if account.role.as_deref().is_none_or(str::is_empty) {
            let roles = self
                .identity
                .roles_for(id)
                .await
                .map_err(provider("Loading roles failed"))?;
            let backfill = roles
                .into_iter()
                .next()
                .unwrap_or_else(|| ROLE_USER.to_string());
            debug!("Backfilled role label for {} with {}", id, backfill);
            account.role = Some(backfill);
        }

        Ok(account.into())
    }

    /// Apply an edit submitted by `caller_id`.
    ///
    /// Nothing is written when the caller would remove their own admin role.
    #[instrument(skip(self, update), fields(role = %update.role))]
    pub async fn edit_account(
        &self,
        caller_id: &str,
        id: &str,
        update: AccountUpdate,
    ) -> Result<EditOutcome, AdminError> {
        if id != update.id {
            warn!("Path id {} does not match payload id {}", id, update.id);
            return Err(AdminError::IdMismatch);
        }

        let mut account = self.find(id).await?;

        if let Err(errors) = update.validate() {
            let messages = collect_messages(&errors);
            debug!("Edit rejected by validation: {:?}", messages);
            return Err(AdminError::Validation(messages));
        }

        account.email = update.email.clone();
        account.user_name = update.email.clone();
        account.phone_number = update.phone_number.clone();
        account.role = Some(update.role.clone());

        if caller_id == account.id && update.role != ROLE_ADMIN {
            warn!("Account {} tried to drop its own admin role", caller_id);
            return Err(AdminError::SelfDemotion);
        }

        let current_roles = self
            .identity
            .roles_for(id)
            .await
            .map_err(provider("Edit failed"))?;
        trace!("Current roles of {}: {:?}", id, current_roles);
        let new_role = (!current_roles.contains(&update.role)).then_some(update.role.as_str());

        let (updated, replacement) = self
            .identity
            .store()
            .update_account_with_role(account, new_role)
            .await
            .map_err(|err| match err {
                IdentityError::DuplicateEmail(email) => AdminError::EmailTaken(email),
                other => provider("Edit failed")(other),
            })?;

        let role_changed = replacement.is_some();
        let role_created = replacement.is_some_and(|r| r.role_created);
        if role_changed {
            info!(
                "Account {} moved from {:?} to role {}",
                id, current_roles, update.role
            );
        }
        info!("Account {} updated", updated.id);

        Ok(EditOutcome {
            account: updated.into(),
            role_changed,
            role_created,
        })
    }

    /// Remove every membership, then the account. A failed membership
    /// removal leaves the account in place.
    #[instrument(skip(self))]
    pub async fn delete_account(&self, id: &str) -> Result<(), AdminError> {
        let account = self.find(id).await?;

        let roles = self
            .identity
            .roles_for(&account.id)
            .await
            .map_err(provider("Unable to remove roles"))?;
        if !roles.is_empty() {
            self.identity
                .remove_from_roles(&account.id, &roles)
                .await
                .map_err(provider("Unable to remove roles"))?;
            debug!("Removed {} role(s) from {}", roles.len(), account.id);
        }

        self.identity
            .delete(&account.id)
            .await
            .map_err(provider("Delete failed"))?;
        info!("Account {} ({}) deleted", account.id, account.email);
        Ok(())
    }

    /// Add the account with this email to `role`, creating the role if needed.
    #[instrument(skip(self))]
    pub async fn assign_role(&self, email: &str, role: &str) -> Result<AssignOutcome, AdminError> {
        let account = self
            .identity
            .find_by_email(email)
            .await
            .map_err(provider("Assign role failed"))?
            .ok_or(AdminError::NotFound)?;

        if self
            .identity
            .is_in_role(&account.id, role)
            .await
            .map_err(provider("Assign role failed"))?
        {
            return Ok(AssignOutcome::AlreadyInRole);
        }

        let role_created = self
            .identity
            .ensure_role(role)
            .await
            .map_err(provider("Assign role failed"))?;
        self.identity
            .add_to_role(&account.id, role)
            .await
            .map_err(provider("Assign role failed"))?;
        info!("Assigned {} to role {}", email, role);
        Ok(AssignOutcome::Assigned { role_created })
    }

    async fn find(&self, id: &str) -> Result<Account, AdminError> {
        match self.identity.find_by_id(id).await {
            Ok(Some(account)) => Ok(account),
            Ok(None) => {
                warn!("Account {} not found", id);
                Err(AdminError::NotFound)
            }
            Err(err) => Err(provider("Lookup failed")(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::InMemoryIdentityStore;
    use crate::password::{HashingSettings, PasswordHasher, PasswordPolicy};
    use crate::store::IdentityStore;

    struct Fixture {
        store: Arc<InMemoryIdentityStore>,
        admin: AccountAdministration,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryIdentityStore::new());
        let hasher = PasswordHasher::new(&HashingSettings {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        })
        .unwrap();
        let manager = IdentityManager::new(store.clone(), hasher, PasswordPolicy::default());
        Fixture {
            store,
            admin: AccountAdministration::new(Arc::new(manager)),
        }
    }

    async fn seed_account(store: &InMemoryIdentityStore, id: &str, email: &str, role: &str) {
        store
            .insert_account(Account {
                id: id.to_string(),
                user_name: email.to_string(),
                email: email.to_string(),
                phone_number: "0912345678".to_string(),
                role: Some(role.to_string()),
                password_hash: "hash".to_string(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        if !store.role_exists(role).await.unwrap() {
            store.create_role(role).await.unwrap();
        }
        store.add_to_role(id, role).await.unwrap();
    }

    fn update(id: &str, email: &str, role: &str) -> AccountUpdate {
        AccountUpdate {
            id: id.to_string(),
            email: email.to_string(),
            phone_number: "0912345678".to_string(),
            role: role.to_string(),
        }
    }

    #[tokio::test]
    async fn test_page_count_and_size_hold_for_all_inputs() {
        for total in 0..=12u64 {
            let f = fixture();
            for i in 0..total {
                seed_account(&f.store, &format!("id-{}", i), &format!("u{}@x.com", i), "User").await;
            }
            for page_size in 1..=5u64 {
                for page in 1..=4u64 {
                    let result = f.admin.list_accounts(page, page_size).await.unwrap();
                    assert_eq!(result.total_pages, total.div_ceil(page_size));
                    assert!(result.accounts.len() as u64 <= page_size);
                    assert_eq!(result.total_accounts, total);
                }
            }
        }
    }

    #[tokio::test]
    async fn test_list_rejects_zero_page() {
        let f = fixture();
        assert!(matches!(
            f.admin.list_accounts(0, 10).await,
            Err(AdminError::Validation(_))
        ));
        assert!(matches!(
            f.admin.list_accounts(1, 0).await,
            Err(AdminError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_details_not_found() {
        let f = fixture();
        assert!(matches!(
            f.admin.account_details("nope").await,
            Err(AdminError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_load_for_edit_backfills_role() {
        let f = fixture();
        seed_account(&f.store, "7", "g@x.com", "Admin").await;
        let mut stored = f.store.find_by_id("7").await.unwrap().unwrap();
        stored.role = None;
        f.store.update_account(stored).await.unwrap();

        let view = f.admin.load_for_edit("7").await.unwrap();
        assert_eq!(view.role.as_deref(), Some("Admin"));

        // No memberships at all falls back to "User"
        f.store.remove_from_roles("7", &["Admin".to_string()]).await.unwrap();
        let mut stored = f.store.find_by_id("7").await.unwrap().unwrap();
        stored.role = Some(String::new());
        f.store.update_account(stored).await.unwrap();
        let view = f.admin.load_for_edit("7").await.unwrap();
        assert_eq!(view.role.as_deref(), Some("User"));
    }

    #[tokio::test]
    async fn test_id_mismatch_persists_nothing() {
        let f = fixture();
        seed_account(&f.store, "42", "a@x.com", "User").await;

        let err = f
            .admin
            .edit_account("1", "42", update("43", "changed@x.com", "Admin"))
            .await
            .unwrap_err();
        assert!(matches!(err, AdminError::IdMismatch));

        let stored = f.store.find_by_id("42").await.unwrap().unwrap();
        assert_eq!(stored.email, "a@x.com");
        assert_eq!(f.store.roles_for("42").await.unwrap(), vec!["User"]);
    }

    #[tokio::test]
    async fn test_edit_missing_account() {
        let f = fixture();
        let err = f
            .admin
            .edit_account("1", "42", update("42", "a@x.com", "User"))
            .await
            .unwrap_err();
        assert!(matches!(err, AdminError::NotFound));
    }

    #[tokio::test]
    async fn test_edit_validation_lists_each_field() {
        let f = fixture();
        seed_account(&f.store, "42", "a@x.com", "User").await;

        let mut bad = update("42", "not-an-email", "");
        bad.phone_number = "12ab".to_string();
        let err = f.admin.edit_account("1", "42", bad).await.unwrap_err();
        let AdminError::Validation(messages) = err else {
            panic!("expected validation error");
        };
        assert!(messages.contains(&"Please enter a valid email address".to_string()));
        assert!(messages.contains(&"Phone number must be between 10 and 15 characters".to_string()));
        assert!(messages.contains(&"Please enter a valid phone number".to_string()));
        assert!(messages.contains(&"Role must be between 1 and 64 characters".to_string()));
    }

    #[tokio::test]
    async fn test_promote_other_account_to_admin() {
        let f = fixture();
        seed_account(&f.store, "1", "root@x.com", "User").await;
        seed_account(&f.store, "42", "a@x.com", "User").await;
        assert!(!f.store.role_exists("Admin").await.unwrap());

        let outcome = f
            .admin
            .edit_account("1", "42", update("42", "a@x.com", "Admin"))
            .await
            .unwrap();

        assert!(outcome.role_changed);
        assert!(outcome.role_created);
        assert_eq!(outcome.account.role.as_deref(), Some("Admin"));
        assert_eq!(f.store.roles_for("42").await.unwrap(), vec!["Admin"]);
    }

    #[tokio::test]
    async fn test_self_demotion_is_blocked() {
        let f = fixture();
        seed_account(&f.store, "42", "a@x.com", "Admin").await;

        let err = f
            .admin
            .edit_account("42", "42", update("42", "new@x.com", "User"))
            .await
            .unwrap_err();
        assert!(matches!(err, AdminError::SelfDemotion));

        let stored = f.store.find_by_id("42").await.unwrap().unwrap();
        assert_eq!(stored.role.as_deref(), Some("Admin"));
        assert_eq!(stored.email, "a@x.com");
        assert_eq!(f.store.roles_for("42").await.unwrap(), vec!["Admin"]);
    }

    #[tokio::test]
    async fn test_self_edit_keeping_admin_is_allowed() {
        let f = fixture();
        seed_account(&f.store, "42", "a@x.com", "Admin").await;

        let outcome = f
            .admin
            .edit_account("42", "42", update("42", "new@x.com", "Admin"))
            .await
            .unwrap();
        assert!(!outcome.role_changed);
        assert_eq!(outcome.account.email, "new@x.com");
    }

    #[tokio::test]
    async fn test_new_role_is_created_exactly_once() {
        let f = fixture();
        seed_account(&f.store, "1", "a@x.com", "User").await;
        seed_account(&f.store, "2", "b@x.com", "User").await;

        let first = f
            .admin
            .edit_account("9", "1", update("1", "a@x.com", "Auditor"))
            .await
            .unwrap();
        let second = f
            .admin
            .edit_account("9", "2", update("2", "b@x.com", "Auditor"))
            .await
            .unwrap();

        assert!(first.role_created);
        assert!(!second.role_created);
        let auditors = f
            .store
            .role_names()
            .await
            .into_iter()
            .filter(|r| r == "Auditor")
            .count();
        assert_eq!(auditors, 1);
        assert_eq!(f.store.roles_for("2").await.unwrap(), vec!["Auditor"]);
    }

    #[tokio::test]
    async fn test_edit_rejects_email_of_another_account() {
        let f = fixture();
        seed_account(&f.store, "1", "a@x.com", "User").await;
        seed_account(&f.store, "2", "b@x.com", "User").await;

        let err = f
            .admin
            .edit_account("9", "2", update("2", "a@x.com", "Admin"))
            .await
            .unwrap_err();
        assert!(matches!(err, AdminError::EmailTaken(ref email) if email == "a@x.com"));
        assert_eq!(err.to_string(), "Edit failed: Email 'a@x.com' is already taken");
        assert_eq!(f.store.roles_for("2").await.unwrap(), vec!["User"]);
    }

    #[tokio::test]
    async fn test_update_failure_aggregates_reasons() {
        let f = fixture();
        seed_account(&f.store, "1", "a@x.com", "User").await;
        f.store.fail_updates(true);

        let err = f
            .admin
            .edit_account("9", "1", update("1", "a@x.com", "User"))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Edit failed: Optimistic concurrency failure, object has been modified, Update rejected by store"
        );
    }

    #[tokio::test]
    async fn test_failed_update_keeps_previous_role() {
        let f = fixture();
        seed_account(&f.store, "1", "a@x.com", "User").await;
        f.store.fail_updates(true);

        let err = f
            .admin
            .edit_account("9", "1", update("1", "new@x.com", "Admin"))
            .await
            .unwrap_err();
        assert!(matches!(err, AdminError::Provider { context: "Edit failed", .. }));

        let stored = f.store.find_by_id("1").await.unwrap().unwrap();
        assert_eq!(stored.email, "a@x.com");
        assert_eq!(stored.role.as_deref(), Some("User"));
        assert_eq!(f.store.roles_for("1").await.unwrap(), vec!["User"]);
        assert_eq!(f.store.role_names().await, vec!["User"]);
    }

    #[tokio::test]
    async fn test_huge_page_number_returns_empty_page() {
        let f = fixture();
        seed_account(&f.store, "1", "a@x.com", "User").await;

        let result = f.admin.list_accounts(u64::MAX, 10).await.unwrap();
        assert!(result.accounts.is_empty());
        assert_eq!(result.current_page, u64::MAX);
        assert_eq!(result.total_accounts, 1);
        assert_eq!(result.total_pages, 1);
    }

    #[tokio::test]
    async fn test_huge_page_number_against_database_store() {
        use crate::sea_orm_store::SeaOrmIdentityStore;
        use migration::{Migrator, MigratorTrait};

        let db = sea_orm::Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        let store = Arc::new(SeaOrmIdentityStore::new(db));
        let hasher = PasswordHasher::new(&HashingSettings {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        })
        .unwrap();
        let admin = AccountAdministration::new(Arc::new(IdentityManager::new(
            store.clone(),
            hasher,
            PasswordPolicy::default(),
        )));
        store
            .insert_account(Account {
                id: "1".to_string(),
                user_name: "a@x.com".to_string(),
                email: "a@x.com".to_string(),
                phone_number: "0912345678".to_string(),
                role: Some("User".to_string()),
                password_hash: "hash".to_string(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        for page in [u64::MAX, u64::MAX / 10, 2] {
            let result = admin.list_accounts(page, 10).await.unwrap();
            assert!(result.accounts.is_empty(), "page {page} should be empty");
            assert_eq!(result.total_accounts, 1);
        }
        assert_eq!(admin.list_accounts(1, 100).await.unwrap().accounts.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_removes_roles_then_account() {
        let f = fixture();
        seed_account(&f.store, "1", "a@x.com", "User").await;
        f.store.create_role("Admin").await.unwrap();
        f.store.add_to_role("1", "Admin").await.unwrap();

        f.admin.delete_account("1").await.unwrap();
        assert!(f.store.find_by_id("1").await.unwrap().is_none());
        assert!(f.store.roles_for("1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_role_removal_keeps_account() {
        let f = fixture();
        seed_account(&f.store, "1", "a@x.com", "User").await;
        f.store.fail_role_removal(true);

        let err = f.admin.delete_account("1").await.unwrap_err();
        assert_eq!(err.to_string(), "Unable to remove roles: Role store is unavailable");
        assert!(f.store.find_by_id("1").await.unwrap().is_some());
        assert_eq!(f.store.roles_for("1").await.unwrap(), vec!["User"]);
    }

    #[tokio::test]
    async fn test_delete_missing_account() {
        let f = fixture();
        assert!(matches!(
            f.admin.delete_account("nope").await,
            Err(AdminError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_assign_role_by_email() {
        let f = fixture();
        seed_account(&f.store, "1", "a@x.com", "User").await;

        let outcome = f.admin.assign_role("a@x.com", "Admin").await.unwrap();
        assert_eq!(outcome, AssignOutcome::Assigned { role_created: true });
        assert_eq!(
            f.admin.assign_role("a@x.com", "Admin").await.unwrap(),
            AssignOutcome::AlreadyInRole
        );
        assert_eq!(f.store.roles_for("1").await.unwrap(), vec!["Admin", "User"]);
        assert!(matches!(
            f.admin.assign_role("ghost@x.com", "Admin").await,
            Err(AdminError::NotFound)
        ));
    }
}
