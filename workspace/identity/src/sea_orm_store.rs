use async_trait::async_trait;
use model::entities::{account, account_role, role};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Unchanged, ColumnTrait, ConnectionTrait, DatabaseConnection,
    DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use tracing::{debug, instrument, trace, warn};
use uuid::Uuid;

use crate::error::{IdentityError, Result};
use crate::store::{Account, IdentityStore, RoleReplacement};

/// Identity store backed by the relational schema from the `migration` crate.
#[derive(Clone, Debug)]
pub struct SeaOrmIdentityStore {
    db: DatabaseConnection,
}

impl SeaOrmIdentityStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

async fn find_role<C: ConnectionTrait>(conn: &C, name: &str) -> Result<Option<role::Model>> {
    Ok(role::Entity::find()
        .filter(role::Column::Name.eq(name))
        .one(conn)
        .await?)
}

async fn insert_role<C: ConnectionTrait>(conn: &C, name: &str) -> Result<role::Model> {
    let new_role = role::ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        name: Set(name.to_string()),
    };
    Ok(new_role.insert(conn).await?)
}

async fn find_membership<C: ConnectionTrait>(
    conn: &C,
    account_id: &str,
    role_id: &str,
) -> Result<Option<account_role::Model>> {
    Ok(
        account_role::Entity::find_by_id((account_id.to_string(), role_id.to_string()))
            .one(conn)
            .await?,
    )
}

async fn find_account_by_email<C: ConnectionTrait>(conn: &C, email: &str) -> Result<Option<Account>> {
    Ok(account::Entity::find()
        .filter(account::Column::Email.eq(email))
        .one(conn)
        .await?)
}

async fn insert_account_in<C: ConnectionTrait>(conn: &C, account: Account) -> Result<Account> {
    trace!("Checking email uniqueness before insert");
    if find_account_by_email(conn, &account.email).await?.is_some() {
        warn!("Email {} is already registered", account.email);
        return Err(IdentityError::DuplicateEmail(account.email));
    }

    let new_account = account::ActiveModel {
        id: Set(account.id),
        user_name: Set(account.user_name),
        email: Set(account.email),
        phone_number: Set(account.phone_number),
        role: Set(account.role),
        password_hash: Set(account.password_hash),
        created_at: Set(account.created_at),
    };

    let inserted = new_account.insert(conn).await?;
    debug!("Inserted account {}", inserted.id);
    Ok(inserted)
}

async fn update_account_in<C: ConnectionTrait>(conn: &C, account: Account) -> Result<Account> {
    if let Some(other) = find_account_by_email(conn, &account.email).await? {
        if other.id != account.id {
            warn!("Email {} belongs to account {}", account.email, other.id);
            return Err(IdentityError::DuplicateEmail(account.email));
        }
    }

    let id = account.id.clone();
    let active = account::ActiveModel {
        id: Unchanged(account.id),
        user_name: Set(account.user_name),
        email: Set(account.email),
        phone_number: Set(account.phone_number),
        role: Set(account.role),
        password_hash: Set(account.password_hash),
        created_at: Unchanged(account.created_at),
    };

    match active.update(conn).await {
        Ok(updated) => {
            debug!("Updated account {}", updated.id);
            Ok(updated)
        }
        Err(DbErr::RecordNotUpdated) => Err(IdentityError::AccountNotFound(id)),
        Err(db_error) => Err(db_error.into()),
    }
}

/// Make `role` the only membership of the account
async fn replace_roles_in<C: ConnectionTrait>(
    conn: &C,
    account_id: &str,
    role: &str,
) -> Result<RoleReplacement> {
    let (role_model, role_created) = match find_role(conn, role).await? {
        Some(existing) => (existing, false),
        None => (insert_role(conn, role).await?, true),
    };

    let removed = account_role::Entity::delete_many()
        .filter(account_role::Column::AccountId.eq(account_id))
        .exec(conn)
        .await?;
    trace!("Cleared {} membership(s)", removed.rows_affected);

    account_role::ActiveModel {
        account_id: Set(account_id.to_string()),
        role_id: Set(role_model.id),
    }
    .insert(conn)
    .await?;

    Ok(RoleReplacement { role_created })
}

#[async_trait]
impl IdentityStore for SeaOrmIdentityStore {
    #[instrument(skip(self, account), fields(account_id = %account.id))]
    async fn insert_account(&self, account: Account) -> Result<Account> {
        insert_account_in(&self.db, account).await
    }

    #[instrument(skip(self, account), fields(account_id = %account.id))]
    async fn insert_account_with_role(&self, account: Account, role: &str) -> Result<Account> {
        let txn = self.db.begin().await?;

        let inserted = insert_account_in(&txn, account).await?;
        let role_model = match find_role(&txn, role).await? {
            Some(existing) => existing,
            None => {
                debug!("Creating missing role {}", role);
                insert_role(&txn, role).await?
            }
        };
        account_role::ActiveModel {
            account_id: Set(inserted.id.clone()),
            role_id: Set(role_model.id),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;
        debug!("Account {} created in role {}", inserted.id, role);
        Ok(inserted)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Account>> {
        Ok(account::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        find_account_by_email(&self.db, email).await
    }

    #[instrument(skip(self, account), fields(account_id = %account.id))]
    async fn update_account(&self, account: Account) -> Result<Account> {
        update_account_in(&self.db, account).await
    }

    #[instrument(skip(self, account), fields(account_id = %account.id))]
    async fn update_account_with_role(
        &self,
        account: Account,
        role: Option<&str>,
    ) -> Result<(Account, Option<RoleReplacement>)> {
        let txn = self.db.begin().await?;

        // Dropping the transaction on an early return rolls the role change back
        let replacement = match role {
            Some(role) => Some(replace_roles_in(&txn, &account.id, role).await?),
            None => None,
        };
        let updated = update_account_in(&txn, account).await?;

        txn.commit().await?;
        if let (Some(role), Some(replacement)) = (role, replacement) {
            debug!(
                "Account {} now holds only role {} (created: {})",
                updated.id, role, replacement.role_created
            );
        }
        Ok((updated, replacement))
    }

    #[instrument(skip(self))]
    async fn delete_account(&self, id: &str) -> Result<()> {
        let result = account::Entity::delete_by_id(id.to_string())
            .exec(&self.db)
            .await?;
        debug!("Delete operation completed. Rows affected: {}", result.rows_affected);

        if result.rows_affected == 0 {
            return Err(IdentityError::AccountNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn list_accounts(&self, page_index: u64, page_size: u64) -> Result<Vec<Account>> {
        trace!("Fetching account page {} (size {})", page_index, page_size);
        let in_range = page_index
            .checked_mul(page_size)
            .is_some_and(|offset| i64::try_from(offset).is_ok());
        if !in_range {
            debug!("Page {} is beyond any stored account", page_index);
            return Ok(Vec::new());
        }

        Ok(account::Entity::find()
            .order_by_asc(account::Column::CreatedAt)
            .order_by_asc(account::Column::Id)
            .paginate(&self.db, page_size)
            .fetch_page(page_index)
            .await?)
    }

    async fn count_accounts(&self) -> Result<u64> {
        Ok(account::Entity::find().count(&self.db).await?)
    }

    async fn roles_for(&self, account_id: &str) -> Result<Vec<String>> {
        let rows = account_role::Entity::find()
            .filter(account_role::Column::AccountId.eq(account_id))
            .find_also_related(role::Entity)
            .order_by_asc(role::Column::Name)
            .all(&self.db)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(_, role)| role.map(|r| r.name))
            .collect())
    }

    async fn role_exists(&self, name: &str) -> Result<bool> {
        Ok(find_role(&self.db, name).await?.is_some())
    }

    #[instrument(skip(self))]
    async fn create_role(&self, name: &str) -> Result<()> {
        if find_role(&self.db, name).await?.is_some() {
            return Err(IdentityError::rejected(format!(
                "Role name '{}' is already taken",
                name
            )));
        }
        let created = insert_role(&self.db, name).await?;
        debug!("Created role {} with ID {}", created.name, created.id);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn add_to_role(&self, account_id: &str, role: &str) -> Result<()> {
        let Some(role_model) = find_role(&self.db, role).await? else {
            return Err(IdentityError::rejected(format!("Role '{}' does not exist", role)));
        };

        if find_membership(&self.db, account_id, &role_model.id)
            .await?
            .is_some()
        {
            return Err(IdentityError::rejected(format!(
                "Account is already in role '{}'",
                role
            )));
        }

        account_role::ActiveModel {
            account_id: Set(account_id.to_string()),
            role_id: Set(role_model.id),
        }
        .insert(&self.db)
        .await?;
        debug!("Added account {} to role {}", account_id, role);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_from_roles(&self, account_id: &str, roles: &[String]) -> Result<()> {
        let txn = self.db.begin().await?;

        let mut reasons = Vec::new();
        let mut role_ids = Vec::new();
        for name in roles {
            match find_role(&txn, name).await? {
                None => reasons.push(format!("Role '{}' does not exist", name)),
                Some(role_model) => {
                    if find_membership(&txn, account_id, &role_model.id)
                        .await?
                        .is_none()
                    {
                        reasons.push(format!("Account is not in role '{}'", name));
                    } else {
                        role_ids.push(role_model.id);
                    }
                }
            }
        }

        if !reasons.is_empty() {
            warn!("Refusing role removal for account {}: {:?}", account_id, reasons);
            return Err(IdentityError::Rejected(reasons));
        }

        account_role::Entity::delete_many()
            .filter(account_role::Column::AccountId.eq(account_id))
            .filter(account_role::Column::RoleId.is_in(role_ids))
            .exec(&txn)
            .await?;
        txn.commit().await?;

        debug!("Removed account {} from {} role(s)", account_id, roles.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use migration::{Migrator, MigratorTrait};
    use sea_orm::Database;

    async fn setup_store() -> SeaOrmIdentityStore {
        let db = Database::connect("sqlite::memory:")
            .await
            .expect("Failed to connect to in-memory database");
        Migrator::up(&db, None)
            .await
            .expect("Failed to run migrations");
        SeaOrmIdentityStore::new(db)
    }

    fn account(id: &str, email: &str) -> Account {
        Account {
            id: id.to_string(),
            user_name: email.to_string(),
            email: email.to_string(),
            phone_number: "0912345678".to_string(),
            role: Some("User".to_string()),
            password_hash: "hash".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_email() {
        let store = setup_store().await;
        store.insert_account(account("1", "a@x.com")).await.unwrap();

        let err = store
            .insert_account(account("2", "a@x.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::DuplicateEmail(_)));
        assert_eq!(store.count_accounts().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_missing_account_is_not_found() {
        let store = setup_store().await;
        let err = store
            .update_account(account("missing", "m@x.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::AccountNotFound(_)));
    }

    #[tokio::test]
    async fn test_pages_follow_creation_order() {
        let store = setup_store().await;
        for i in 0..5 {
            let mut a = account(&format!("id-{}", i), &format!("u{}@x.com", i));
            a.created_at = Utc::now() + chrono::Duration::seconds(i);
            store.insert_account(a).await.unwrap();
        }

        let first = store.list_accounts(0, 2).await.unwrap();
        let last = store.list_accounts(2, 2).await.unwrap();
        assert_eq!(
            first.iter().map(|a| a.id.as_str()).collect::<Vec<_>>(),
            vec!["id-0", "id-1"]
        );
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].id, "id-4");
        assert!(store.list_accounts(3, 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_role_membership_lifecycle() {
        let store = setup_store().await;
        store.insert_account(account("1", "a@x.com")).await.unwrap();

        // Unknown roles are refused
        assert!(matches!(
            store.add_to_role("1", "User").await,
            Err(IdentityError::Rejected(_))
        ));

        store.create_role("User").await.unwrap();
        store.create_role("Admin").await.unwrap();
        assert!(store.create_role("User").await.is_err());

        store.add_to_role("1", "User").await.unwrap();
        store.add_to_role("1", "Admin").await.unwrap();
        assert!(store.add_to_role("1", "User").await.is_err());
        assert_eq!(store.roles_for("1").await.unwrap(), vec!["Admin", "User"]);

        store
            .remove_from_roles("1", &["User".to_string()])
            .await
            .unwrap();
        assert_eq!(store.roles_for("1").await.unwrap(), vec!["Admin"]);
    }

    #[tokio::test]
    async fn test_remove_from_roles_is_all_or_nothing() {
        let store = setup_store().await;
        store.insert_account(account("1", "a@x.com")).await.unwrap();
        store.create_role("User").await.unwrap();
        store.add_to_role("1", "User").await.unwrap();

        let err = store
            .remove_from_roles("1", &["User".to_string(), "Ghost".to_string()])
            .await
            .unwrap_err();
        assert_eq!(err.reasons(), vec!["Role 'Ghost' does not exist"]);
        assert_eq!(store.roles_for("1").await.unwrap(), vec!["User"]);
    }

    #[tokio::test]
    async fn test_role_change_creates_missing_role_once() {
        let store = setup_store().await;
        store.insert_account(account("1", "a@x.com")).await.unwrap();
        store.insert_account(account("2", "b@x.com")).await.unwrap();
        store.create_role("User").await.unwrap();
        store.add_to_role("1", "User").await.unwrap();

        let (_, first) = store
            .update_account_with_role(account("1", "a@x.com"), Some("Auditor"))
            .await
            .unwrap();
        assert!(first.unwrap().role_created);
        assert_eq!(store.roles_for("1").await.unwrap(), vec!["Auditor"]);

        let (_, second) = store
            .update_account_with_role(account("2", "b@x.com"), Some("Auditor"))
            .await
            .unwrap();
        assert!(!second.unwrap().role_created);
        assert_eq!(store.roles_for("2").await.unwrap(), vec!["Auditor"]);

        let (_, untouched) = store
            .update_account_with_role(account("2", "b@x.com"), None)
            .await
            .unwrap();
        assert!(untouched.is_none());
        assert_eq!(store.roles_for("2").await.unwrap(), vec!["Auditor"]);
    }

    #[tokio::test]
    async fn test_failed_update_rolls_back_role_change() {
        let store = setup_store().await;
        store.insert_account(account("1", "a@x.com")).await.unwrap();
        store.insert_account(account("2", "b@x.com")).await.unwrap();
        store.create_role("User").await.unwrap();
        store.add_to_role("2", "User").await.unwrap();

        let mut clash = account("2", "a@x.com");
        clash.role = Some("Admin".to_string());
        let err = store
            .update_account_with_role(clash, Some("Admin"))
            .await
            .unwrap_err();

        assert!(matches!(err, IdentityError::DuplicateEmail(_)));
        assert_eq!(store.roles_for("2").await.unwrap(), vec!["User"]);
        assert!(!store.role_exists("Admin").await.unwrap());
        let stored = store.find_by_id("2").await.unwrap().unwrap();
        assert_eq!(stored.email, "b@x.com");
        assert_eq!(stored.role.as_deref(), Some("User"));
    }

    #[tokio::test]
    async fn test_insert_with_role_creates_account_and_membership() {
        let store = setup_store().await;
        store
            .insert_account_with_role(account("1", "a@x.com"), "User")
            .await
            .unwrap();
        store
            .insert_account_with_role(account("2", "b@x.com"), "User")
            .await
            .unwrap();
        assert_eq!(store.roles_for("1").await.unwrap(), vec!["User"]);
        assert_eq!(store.roles_for("2").await.unwrap(), vec!["User"]);

        let err = store
            .insert_account_with_role(account("3", "a@x.com"), "Admin")
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::DuplicateEmail(_)));
        assert_eq!(store.count_accounts().await.unwrap(), 2);
        assert!(!store.role_exists("Admin").await.unwrap());
    }

    #[tokio::test]
    async fn test_page_index_past_u64_range_is_empty() {
        let store = setup_store().await;
        store.insert_account(account("1", "a@x.com")).await.unwrap();

        assert!(store.list_accounts(u64::MAX, 10).await.unwrap().is_empty());
        assert!(store.list_accounts(u64::MAX / 10, 10).await.unwrap().is_empty());
        assert_eq!(store.list_accounts(0, 10).await.unwrap().len(), 1);
    }
}
