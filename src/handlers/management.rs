//! Account administration endpoints. Every route here requires the "Admin"
//! role except the role check, which only needs a signed-in account.

use axum::{
    extract::{Path, Query, State},
    http::{
        header::{HeaderName, SET_COOKIE},
        HeaderValue,
    },
    response::{Json, Redirect},
};
use axum_valid::Valid;
use identity::{AccountPage, AccountUpdate, AccountView, ROLE_ADMIN};
use tracing::{debug, error, info, instrument, trace};

use crate::auth::{AdminAccount, CurrentAccount};
use crate::handlers::account::LOGIN_PATH;
use crate::handlers::{admin_error_response, HandlerError};
use crate::schemas::{AccountListQuery, ApiResponse, AppState, EditResponse, ErrorResponse};
use crate::session::{Session, SessionStore};

/// List accounts one page at a time
#[utoipa::path(
    get,
    path = "/management/user/index",
    tag = "management",
    params(AccountListQuery),
    responses(
        (status = 200, description = "Page of accounts", body = ApiResponse<AccountPage>),
        (status = 400, description = "Invalid paging parameters"),
        (status = 401, description = "Not logged in", body = ErrorResponse),
        (status = 403, description = "Administrator role required", body = ErrorResponse)
    )
)]
#[instrument(skip(state, _admin))]
pub async fn list_accounts(
    State(state): State<AppState>,
    _admin: AdminAccount,
    Valid(Query(query)): Valid<Query<AccountListQuery>>,
) -> Result<Json<ApiResponse<AccountPage>>, HandlerError> {
    trace!("Entering list_accounts function");

    let page = state
        .admin
        .list_accounts(query.page, query.page_size)
        .await
        .map_err(admin_error_response)?;
    debug!(
        "Listing page {} of {} ({} accounts in total)",
        page.current_page, page.total_pages, page.total_accounts
    );

    Ok(Json(ApiResponse::ok(page, "Accounts retrieved successfully")))
}

/// Show one account
#[utoipa::path(
    get,
    path = "/management/user/details/{id}",
    tag = "management",
    params(("id" = String, Path, description = "Account id")),
    responses(
        (status = 200, description = "Account found", body = ApiResponse<AccountView>),
        (status = 404, description = "Account not found", body = ErrorResponse)
    )
)]
#[instrument(skip(state, _admin))]
pub async fn account_details(
    State(state): State<AppState>,
    _admin: AdminAccount,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<AccountView>>, HandlerError> {
    let account = state
        .admin
        .account_details(&id)
        .await
        .map_err(admin_error_response)?;
    Ok(Json(ApiResponse::ok(account, "Account retrieved successfully")))
}

/// Load an account for editing, filling in a missing role label
#[utoipa::path(
    get,
    path = "/management/user/edit/{id}",
    tag = "management",
    params(("id" = String, Path, description = "Account id")),
    responses(
        (status = 200, description = "Account ready for editing", body = ApiResponse<AccountView>),
        (status = 404, description = "Account not found", body = ErrorResponse)
    )
)]
#[instrument(skip(state, _admin))]
pub async fn edit_form(
    State(state): State<AppState>,
    _admin: AdminAccount,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<AccountView>>, HandlerError> {
    let account = state
        .admin
        .load_for_edit(&id)
        .await
        .map_err(admin_error_response)?;
    Ok(Json(ApiResponse::ok(account, "Account retrieved successfully")))
}

/// Update email, phone number and role. The role membership follows the
/// submitted role.
#[utoipa::path(
    post,
    path = "/management/user/edit/{id}",
    tag = "management",
    params(("id" = String, Path, description = "Account id")),
    request_body = AccountUpdate,
    responses(
        (status = 200, description = "Account updated", body = ApiResponse<EditResponse>),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 403, description = "Administrators cannot remove their own Admin role", body = ErrorResponse),
        (status = 404, description = "Account not found or id mismatch", body = ErrorResponse),
        (status = 409, description = "Email already taken", body = ErrorResponse),
        (status = 500, description = "Identity store failure", body = ErrorResponse)
    )
)]
#[instrument(skip(state, admin, update), fields(caller = %admin.0.id))]
pub async fn edit_account(
    State(state): State<AppState>,
    admin: AdminAccount,
    Path(id): Path<String>,
    Json(update): Json<AccountUpdate>,
) -> Result<Json<ApiResponse<EditResponse>>, HandlerError> {
    trace!("Entering edit_account function");
    let AdminAccount(caller) = admin;

    let outcome = state
        .admin
        .edit_account(&caller.id, &id, update)
        .await
        .map_err(admin_error_response)?;

    let message = if outcome.role_changed {
        format!(
            "Account updated, role set to {}",
            outcome.account.role.as_deref().unwrap_or_default()
        )
    } else {
        "Account updated".to_string()
    };
    info!("{} by {}", message, caller.id);

    Ok(Json(ApiResponse::ok(
        EditResponse {
            account: outcome.account,
            role_changed: outcome.role_changed,
            role_created: outcome.role_created,
        },
        message,
    )))
}

/// Delete an account and its role memberships
#[utoipa::path(
    post,
    path = "/management/user/delete/{id}",
    tag = "management",
    params(("id" = String, Path, description = "Account id")),
    responses(
        (status = 200, description = "Account deleted", body = ApiResponse<String>),
        (status = 404, description = "Account not found", body = ErrorResponse),
        (status = 500, description = "Identity store failure", body = ErrorResponse)
    )
)]
#[instrument(skip(state, admin), fields(caller = %admin.0.id))]
pub async fn delete_account(
    State(state): State<AppState>,
    admin: AdminAccount,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<String>>, HandlerError> {
    if let Err(err) = state.admin.delete_account(&id).await {
        error!("Failed to delete account {}: {}", id, err);
        return Err(admin_error_response(err));
    }
    Ok(Json(ApiResponse::ok(id, "Account deleted")))
}

/// End the administrator session
#[utoipa::path(
    post,
    path = "/management/user/logout",
    tag = "management",
    responses(
        (status = 303, description = "Session ended, redirect to login"),
        (status = 401, description = "Not logged in", body = ErrorResponse),
        (status = 403, description = "Administrator role required", body = ErrorResponse)
    )
)]
#[instrument(skip(admin, session), fields(caller = %admin.0.id))]
pub async fn admin_logout(
    admin: AdminAccount,
    mut session: Session,
) -> ([(HeaderName, HeaderValue); 1], Redirect) {
    session.clear().await;
    session.invalidate().await;
    info!("Administrator {} logged out", admin.0.email);
    (
        [(SET_COOKIE, SessionStore::expired_cookie())],
        Redirect::to(LOGIN_PATH),
    )
}

/// Report whether the signed-in account holds the "Admin" role
#[utoipa::path(
    get,
    path = "/management/user/test-role",
    tag = "management",
    responses(
        (status = 200, description = "Role check", body = String),
        (status = 401, description = "Not logged in", body = ErrorResponse)
    )
)]
#[instrument(skip(state, current))]
pub async fn test_role(
    State(state): State<AppState>,
    current: CurrentAccount,
) -> Result<String, HandlerError> {
    let CurrentAccount(account) = current;
    let is_admin = state
        .identity
        .is_in_role(&account.id, ROLE_ADMIN)
        .await
        .map_err(|err| {
            error!("Role lookup failed for {}: {}", account.id, err);
            (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(
                    "Internal server error while checking roles",
                    "DATABASE_ERROR",
                )),
            )
        })?;
    Ok(format!("Is Admin: {}", is_admin))
}
