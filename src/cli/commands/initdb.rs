use anyhow::{Context, Result};
use identity::seed_defaults;
use migration::{Migrator, MigratorTrait};
use tracing::{debug, error, info, trace};

use crate::config::{initialize_app_state_with_url, AppSettings};
use crate::schemas::AppState;

pub async fn init_database(database_url: &str, settings: AppSettings) -> Result<()> {
    trace!("Entering init_database function");
    info!("Initializing database");
    debug!("Database URL: {}", database_url);

    let state = initialize_app_state_with_url(database_url, settings).await?;
    migrate_and_seed(&state).await?;

    info!("Database initialization completed successfully!");
    Ok(())
}

/// Apply pending migrations, then create the seed roles and administrator
pub async fn migrate_and_seed(state: &AppState) -> Result<()> {
    info!("Running database migrations");
    if let Err(e) = Migrator::up(&state.db, None).await {
        error!("Failed to run database migrations: {}", e);
        return Err(e.into());
    }
    debug!("All pending migrations have been applied");

    let report = seed_defaults(&state.identity, &state.settings.seed)
        .await
        .context("Failed to seed roles and administrator")?;
    if !report.roles_created.is_empty() {
        info!("Created roles: {}", report.roles_created.join(", "));
    }
    if report.admin_created {
        info!("Created administrator {}", state.settings.seed.admin_email);
    }

    Ok(())
}
