use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::manager::{IdentityManager, NewAccount};
use crate::{ROLE_ADMIN, ROLE_USER};

/// Roles and administrator created on first start.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SeedSettings {
    pub roles: Vec<String>,
    pub admin_email: String,
    /// No administrator is seeded while this is unset.
    pub admin_password: Option<String>,
    pub admin_phone: String,
}

impl Default for SeedSettings {
    fn default() -> Self {
        Self {
            roles: vec![ROLE_USER.to_string(), ROLE_ADMIN.to_string()],
            admin_email: "admin@authdesk.local".to_string(),
            admin_password: None,
            admin_phone: "0900000000".to_string(),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedReport {
    pub roles_created: Vec<String>,
    pub admin_created: bool,
}

/// Create missing seed roles and the administrator. Safe to run repeatedly.
#[instrument(skip(identity, settings))]
pub async fn seed_defaults(identity: &IdentityManager, settings: &SeedSettings) -> Result<SeedReport> {
    let mut report = SeedReport::default();

    for role in settings.roles.iter().map(String::as_str).chain([ROLE_ADMIN]) {
        if identity.ensure_role(role).await? {
            report.roles_created.push(role.to_string());
        }
    }

    let Some(password) = settings.admin_password.as_deref() else {
        warn!("No administrator password configured; skipping administrator seed");
        return Ok(report);
    };

    let admin = match identity.find_by_email(&settings.admin_email).await? {
        Some(existing) => existing,
        None => {
            let created = identity
                .create_account(
                    NewAccount {
                        email: settings.admin_email.clone(),
                        phone_number: settings.admin_phone.clone(),
                        role: ROLE_ADMIN.to_string(),
                    },
                    password,
                )
                .await?;
            report.admin_created = true;
            info!("Seeded administrator {}", created.email);
            created
        }
    };

    if !identity.is_in_role(&admin.id, ROLE_ADMIN).await? {
        identity.add_to_role(&admin.id, ROLE_ADMIN).await?;
    }

    Ok(report)
}
