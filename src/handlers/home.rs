use axum::{extract::State, http::StatusCode, response::Json};
use tracing::{error, instrument, trace};

use crate::auth::CurrentAccount;
use crate::handlers::HandlerError;
use crate::schemas::{ApiResponse, AppState, ErrorResponse, HomeResponse};

/// Landing page; reports who is signed in, if anyone
#[utoipa::path(
    get,
    path = "/",
    tag = "home",
    responses(
        (status = 200, description = "Session state", body = ApiResponse<HomeResponse>),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(state, current))]
pub async fn home(
    State(state): State<AppState>,
    current: Option<CurrentAccount>,
) -> Result<Json<ApiResponse<HomeResponse>>, HandlerError> {
    let Some(CurrentAccount(account)) = current else {
        trace!("Anonymous visit");
        let anonymous = HomeResponse {
            signed_in: false,
            account: None,
            roles: Vec::new(),
        };
        return Ok(Json(ApiResponse::ok(anonymous, "Not signed in")));
    };

    let roles = state.identity.roles_for(&account.id).await.map_err(|err| {
        error!("Failed to load roles for {}: {}", account.id, err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(
                "Internal server error while loading roles",
                "DATABASE_ERROR",
            )),
        )
    })?;

    let signed_in = HomeResponse {
        signed_in: true,
        account: Some(account.into()),
        roles,
    };
    Ok(Json(ApiResponse::ok(signed_in, "Signed in")))
}
