use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::Json,
};
use identity::{Account, ROLE_ADMIN};
use tracing::{debug, error, warn};

use crate::schemas::{AppState, ErrorResponse};
use crate::session::{Session, ACCOUNT_KEY};

type Rejection = (StatusCode, Json<ErrorResponse>);

fn unauthenticated() -> Rejection {
    (
        StatusCode::UNAUTHORIZED,
        Json(
            ErrorResponse::new("Please log in to continue", "AUTHENTICATION_REQUIRED")
                .with_redirect("/account/login"),
        ),
    )
}

fn store_failure(err: identity::IdentityError) -> Rejection {
    error!("Failed to resolve signed-in account: {}", err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new(
            "Internal server error while checking the session",
            "DATABASE_ERROR",
        )),
    )
}

/// The account signed in on the current session.
#[derive(Debug, Clone)]
pub struct CurrentAccount(pub Account);

#[async_trait]
impl FromRequestParts<AppState> for CurrentAccount {
    type Rejection = Rejection;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Ok(session) = Session::from_request_parts(parts, state).await;
        let Some(account_id) = session.read(ACCOUNT_KEY).await else {
            debug!("Request without a signed-in session");
            return Err(unauthenticated());
        };

        match state.identity.find_by_id(&account_id).await {
            Ok(Some(account)) => Ok(CurrentAccount(account)),
            Ok(None) => {
                warn!("Session refers to missing account {}", account_id);
                session.clear().await;
                Err(unauthenticated())
            }
            Err(err) => Err(store_failure(err)),
        }
    }
}

/// A signed-in account that currently holds the "Admin" role. Membership is
/// checked against the store on every request.
#[derive(Debug, Clone)]
pub struct AdminAccount(pub Account);

#[async_trait]
impl FromRequestParts<AppState> for AdminAccount {
    type Rejection = Rejection;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let CurrentAccount(account) = CurrentAccount::from_request_parts(parts, state).await?;

        match state.identity.is_in_role(&account.id, ROLE_ADMIN).await {
            Ok(true) => Ok(AdminAccount(account)),
            Ok(false) => {
                warn!("Account {} is not an administrator", account.id);
                Err((
                    StatusCode::FORBIDDEN,
                    Json(ErrorResponse::new(
                        "Administrator role required",
                        "ADMIN_ROLE_REQUIRED",
                    )),
                ))
            }
            Err(err) => Err(store_failure(err)),
        }
    }
}
