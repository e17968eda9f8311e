use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::error::{IdentityError, Result};
use crate::store::{Account, IdentityStore, RoleReplacement};

#[derive(Debug, Default)]
struct MemoryState {
    /// Kept in insertion order, which is the natural order for listing.
    accounts: Vec<Account>,
    roles: Vec<String>,
    /// (account id, role name)
    memberships: Vec<(String, String)>,
}

/// Identity store held entirely in memory.
///
/// Failure switches let tests exercise the provider-failure paths of the
/// administration flow.
#[derive(Debug, Default)]
pub struct InMemoryIdentityStore {
    state: RwLock<MemoryState>,
    fail_role_removal: AtomicBool,
    fail_updates: AtomicBool,
    fail_role_assignment: AtomicBool,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `remove_from_roles` call fail.
    pub fn fail_role_removal(&self, fail: bool) {
        self.fail_role_removal.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent account update fail, with or without a role change.
    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent membership insert fail, including the first
    /// membership written when an account is created.
    pub fn fail_role_assignment(&self, fail: bool) {
        self.fail_role_assignment.store(fail, Ordering::SeqCst);
    }

    fn update_rejection(&self) -> Option<IdentityError> {
        self.fail_updates.load(Ordering::SeqCst).then(|| {
            IdentityError::Rejected(vec![
                "Optimistic concurrency failure, object has been modified".to_string(),
                "Update rejected by store".to_string(),
            ])
        })
    }

    fn assignment_rejection(&self) -> Option<IdentityError> {
        self.fail_role_assignment
            .load(Ordering::SeqCst)
            .then(|| IdentityError::rejected("Role store is unavailable"))
    }

    /// All role names in creation order.
    pub async fn role_names(&self) -> Vec<String> {
        self.state.read().await.roles.clone()
    }
}

impl MemoryState {
    fn check_update(&self, account: &Account) -> Result<()> {
        if self
            .accounts
            .iter()
            .any(|a| a.email == account.email && a.id != account.id)
        {
            return Err(IdentityError::DuplicateEmail(account.email.clone()));
        }
        if !self.accounts.iter().any(|a| a.id == account.id) {
            return Err(IdentityError::AccountNotFound(account.id.clone()));
        }
        Ok(())
    }

    /// Callers run [`MemoryState::check_update`] first.
    fn overwrite(&mut self, account: Account) -> Account {
        let stored = self
            .accounts
            .iter_mut()
            .find(|a| a.id == account.id);
        match stored {
            Some(stored) => {
                *stored = Account {
                    created_at: stored.created_at,
                    ..account
                };
                stored.clone()
            }
            None => account,
        }
    }

    fn ensure_role(&mut self, role: &str) -> bool {
        let created = !self.roles.iter().any(|r| r == role);
        if created {
            self.roles.push(role.to_string());
        }
        created
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn insert_account(&self, account: Account) -> Result<Account> {
        let mut state = self.state.write().await;
        if state.accounts.iter().any(|a| a.email == account.email) {
            return Err(IdentityError::DuplicateEmail(account.email));
        }
        state.accounts.push(account.clone());
        Ok(account)
    }

    async fn insert_account_with_role(&self, account: Account, role: &str) -> Result<Account> {
        let mut state = self.state.write().await;
        if state.accounts.iter().any(|a| a.email == account.email) {
            return Err(IdentityError::DuplicateEmail(account.email));
        }
        if let Some(err) = self.assignment_rejection() {
            return Err(err);
        }

        state.ensure_role(role);
        state
            .memberships
            .push((account.id.clone(), role.to_string()));
        state.accounts.push(account.clone());
        Ok(account)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Account>> {
        let state = self.state.read().await;
        Ok(state.accounts.iter().find(|a| a.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        let state = self.state.read().await;
        Ok(state.accounts.iter().find(|a| a.email == email).cloned())
    }

    async fn update_account(&self, account: Account) -> Result<Account> {
        if let Some(err) = self.update_rejection() {
            return Err(err);
        }

        let mut state = self.state.write().await;
        state.check_update(&account)?;
        Ok(state.overwrite(account))
    }

    async fn update_account_with_role(
        &self,
        account: Account,
        role: Option<&str>,
    ) -> Result<(Account, Option<RoleReplacement>)> {
        let mut state = self.state.write().await;
        if let Some(err) = self.update_rejection() {
            return Err(err);
        }
        state.check_update(&account)?;
        if role.is_some() {
            if let Some(err) = self.assignment_rejection() {
                return Err(err);
            }
        }

        let replacement = role.map(|role| {
            let role_created = state.ensure_role(role);
            state.memberships.retain(|(id, _)| *id != account.id);
            state
                .memberships
                .push((account.id.clone(), role.to_string()));
            RoleReplacement { role_created }
        });
        Ok((state.overwrite(account), replacement))
    }

    async fn delete_account(&self, id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let before = state.accounts.len();
        state.accounts.retain(|a| a.id != id);
        if state.accounts.len() == before {
            return Err(IdentityError::AccountNotFound(id.to_string()));
        }
        state.memberships.retain(|(account_id, _)| account_id != id);
        Ok(())
    }

    async fn list_accounts(&self, page_index: u64, page_size: u64) -> Result<Vec<Account>> {
        let state = self.state.read().await;
        let skip = usize::try_from(page_index.saturating_mul(page_size)).unwrap_or(usize::MAX);
        let take = usize::try_from(page_size).unwrap_or(usize::MAX);
        Ok(state.accounts.iter().skip(skip).take(take).cloned().collect())
    }

    async fn count_accounts(&self) -> Result<u64> {
        Ok(self.state.read().await.accounts.len() as u64)
    }

    async fn roles_for(&self, account_id: &str) -> Result<Vec<String>> {
        let state = self.state.read().await;
        let mut roles: Vec<String> = state
            .memberships
            .iter()
            .filter(|(id, _)| id == account_id)
            .map(|(_, role)| role.clone())
            .collect();
        roles.sort();
        Ok(roles)
    }

    async fn role_exists(&self, name: &str) -> Result<bool> {
        Ok(self.state.read().await.roles.iter().any(|r| r == name))
    }

    async fn create_role(&self, name: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if state.roles.iter().any(|r| r == name) {
            return Err(IdentityError::rejected(format!(
                "Role name '{}' is already taken",
                name
            )));
        }
        state.roles.push(name.to_string());
        Ok(())
    }

    async fn add_to_role(&self, account_id: &str, role: &str) -> Result<()> {
        if let Some(err) = self.assignment_rejection() {
            return Err(err);
        }

        let mut state = self.state.write().await;
        if !state.roles.iter().any(|r| r == role) {
            return Err(IdentityError::rejected(format!("Role '{}' does not exist", role)));
        }
        if state
            .memberships
            .iter()
            .any(|(id, r)| id == account_id && r == role)
        {
            return Err(IdentityError::rejected(format!(
                "Account is already in role '{}'",
                role
            )));
        }
        state
            .memberships
            .push((account_id.to_string(), role.to_string()));
        Ok(())
    }

    async fn remove_from_roles(&self, account_id: &str, roles: &[String]) -> Result<()> {
        if self.fail_role_removal.load(Ordering::SeqCst) {
            return Err(IdentityError::rejected("Role store is unavailable"));
        }

        let mut state = self.state.write().await;
        let reasons: Vec<String> = roles
            .iter()
            .filter(|role| {
                !state
                    .memberships
                    .iter()
                    .any(|(id, r)| id == account_id && r == *role)
            })
            .map(|role| format!("Account is not in role '{}'", role))
            .collect();
        if !reasons.is_empty() {
            return Err(IdentityError::Rejected(reasons));
        }

        state
            .memberships
            .retain(|(id, r)| !(id == account_id && roles.contains(r)));
        Ok(())
    }
}
