use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, instrument, trace, warn};
use uuid::Uuid;

use crate::error::{IdentityError, Result};
use crate::password::{PasswordHasher, PasswordPolicy};
use crate::store::{Account, IdentityStore};

/// Fields needed to create an account; the password travels separately.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub phone_number: String,
    pub role: String,
}

/// Account and credential operations on top of an [`IdentityStore`].
#[derive(Debug, Clone)]
pub struct IdentityManager {
    store: Arc<dyn IdentityStore>,
    hasher: PasswordHasher,
    policy: PasswordPolicy,
}

impl IdentityManager {
    pub fn new(store: Arc<dyn IdentityStore>, hasher: PasswordHasher, policy: PasswordPolicy) -> Self {
        Self {
            store,
            hasher,
            policy,
        }
    }

    pub fn store(&self) -> &dyn IdentityStore {
        self.store.as_ref()
    }

    pub fn policy(&self) -> &PasswordPolicy {
        &self.policy
    }

    /// Create an account after checking the password against the policy.
    ///
    /// The account and its membership in `new_account.role` are written
    /// together; a failure leaves neither behind.
    #[instrument(skip(self, new_account, password), fields(email = %new_account.email))]
    pub async fn create_account(&self, new_account: NewAccount, password: &str) -> Result<Account> {
        trace!("Checking password policy");
        let violations = self.policy.check(password);
        if !violations.is_empty() {
            debug!("Password rejected by policy: {:?}", violations);
            return Err(IdentityError::WeakPassword(violations));
        }

        if self.store.find_by_email(&new_account.email).await?.is_some() {
            warn!("Email {} is already registered", new_account.email);
            return Err(IdentityError::DuplicateEmail(new_account.email));
        }

        let account = Account {
            id: Uuid::new_v4().to_string(),
            user_name: new_account.email.clone(),
            email: new_account.email,
            phone_number: new_account.phone_number,
            role: Some(new_account.role.clone()),
            password_hash: self.hash_password(password).await?,
            created_at: Utc::now(),
        };

        let created = self
            .store
            .insert_account_with_role(account, &new_account.role)
            .await?;
        info!("Account {} created for {}", created.id, created.email);
        Ok(created)
    }

    /// The account matching the email and password, if any.
    #[instrument(skip(self, password))]
    pub async fn verify_credentials(&self, email: &str, password: &str) -> Result<Option<Account>> {
        let Some(account) = self.store.find_by_email(email).await? else {
            debug!("No account registered for {}", email);
            return Ok(None);
        };

        if self
            .verify_password(password, account.password_hash.clone())
            .await?
        {
            Ok(Some(account))
        } else {
            debug!("Password mismatch for {}", email);
            Ok(None)
        }
    }

    // Argon2 is CPU bound; keep it off the async workers
    async fn hash_password(&self, password: &str) -> Result<String> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| IdentityError::Hashing(e.to_string()))?
    }

    async fn verify_password(&self, password: &str, stored_hash: String) -> Result<bool> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &stored_hash))
            .await
            .map_err(|e| IdentityError::Hashing(e.to_string()))
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Account>> {
        self.store.find_by_id(id).await
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        self.store.find_by_email(email).await
    }

    pub async fn roles_for(&self, account_id: &str) -> Result<Vec<String>> {
        self.store.roles_for(account_id).await
    }

    pub async fn is_in_role(&self, account_id: &str, role: &str) -> Result<bool> {
        Ok(self
            .store
            .roles_for(account_id)
            .await?
            .iter()
            .any(|r| r == role))
    }

    /// Create the role unless it exists. Returns whether it was created.
    pub async fn ensure_role(&self, role: &str) -> Result<bool> {
        if self.store.role_exists(role).await? {
            return Ok(false);
        }
        self.store.create_role(role).await?;
        info!("Created role {}", role);
        Ok(true)
    }

    pub async fn add_to_role(&self, account_id: &str, role: &str) -> Result<()> {
        self.store.add_to_role(account_id, role).await
    }

    pub async fn remove_from_roles(&self, account_id: &str, roles: &[String]) -> Result<()> {
        self.store.remove_from_roles(account_id, roles).await
    }

    pub async fn delete(&self, account_id: &str) -> Result<()> {
        self.store.delete_account(account_id).await
    }
}
