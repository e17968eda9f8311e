use anyhow::{Context, Result};
use identity::{
    AccountAdministration, AccountSelfService, HashingSettings, IdentityManager, PasswordHasher,
    PasswordPolicy, SeaOrmIdentityStore, SeedSettings,
};
use sea_orm::{Database, DatabaseConnection};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::schemas::AppState;
use crate::session::SessionStore;

/// Session cookie and store settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Sessions expire after this many idle minutes; every request resets the timer
    pub idle_timeout_minutes: u64,
    pub max_sessions: u64,
    /// Add the `Secure` attribute to the session cookie
    pub cookie_secure: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_timeout_minutes: 30,
            max_sessions: 10_000,
            cookie_secure: false,
        }
    }
}

impl SessionSettings {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_minutes * 60)
    }
}

/// Settings layered from defaults, an optional `authdesk.toml` and
/// `AUTHDESK__*` environment variables
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub password: PasswordPolicy,
    pub hashing: HashingSettings,
    pub session: SessionSettings,
    pub seed: SeedSettings,
}

impl AppSettings {
    /// Load settings, e.g. `AUTHDESK__SEED__ADMIN_PASSWORD=...` or
    /// `AUTHDESK__PASSWORD__REQUIRED_LENGTH=8`
    pub fn load() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("authdesk").required(false))
            .add_source(
                config::Environment::with_prefix("AUTHDESK")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("seed.roles")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }
}

/// Build application state on top of an existing connection
pub fn build_app_state(db: DatabaseConnection, settings: AppSettings) -> Result<AppState> {
    let store = Arc::new(SeaOrmIdentityStore::new(db.clone()));
    let hasher = PasswordHasher::new(&settings.hashing)
        .context("Invalid password hashing parameters")?;
    let identity = Arc::new(IdentityManager::new(
        store,
        hasher,
        settings.password.clone(),
    ));
    debug!("Password policy: {:?}", identity.policy());

    let sessions = SessionStore::new(settings.session.idle_timeout(), settings.session.max_sessions);

    Ok(AppState {
        db,
        admin: AccountAdministration::new(identity.clone()),
        self_service: AccountSelfService::new(identity.clone()),
        identity,
        sessions,
        settings: Arc::new(settings),
    })
}

/// Initialize application state with a specific database URL
pub async fn initialize_app_state_with_url(
    database_url: &str,
    settings: AppSettings,
) -> Result<AppState> {
    info!("Connecting to database: {}", database_url);
    let db = Database::connect(database_url)
        .await
        .context("Failed to connect to database")?;

    build_app_state(db, settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_policy() {
        let settings = AppSettings::default();
        assert_eq!(settings.password.required_length, 6);
        assert!(settings.password.require_digit);
        assert!(!settings.password.require_uppercase);
        assert_eq!(settings.session.idle_timeout(), Duration::from_secs(30 * 60));
        assert_eq!(settings.seed.roles, vec!["User", "Admin"]);
        assert!(settings.seed.admin_password.is_none());
    }
}
