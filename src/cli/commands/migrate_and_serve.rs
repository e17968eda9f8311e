use anyhow::Result;
use tracing::{debug, info, trace};

use super::initdb::migrate_and_seed;
use super::serve::run_server;
use crate::config::{initialize_app_state_with_url, AppSettings};

pub async fn migrate_and_serve(
    database_url: &str,
    bind_address: &str,
    settings: AppSettings,
) -> Result<()> {
    trace!("Entering migrate_and_serve function");
    info!("Applying database migrations and starting server");
    debug!("Database URL: {}", database_url);

    let state = initialize_app_state_with_url(database_url, settings).await?;
    migrate_and_seed(&state).await?;

    run_server(state, bind_address).await
}
