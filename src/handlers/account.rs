use axum::{
    extract::State,
    http::{
        header::{HeaderName, SET_COOKIE},
        HeaderValue, StatusCode,
    },
    response::{Json, Redirect},
};
use axum_valid::Valid;
use identity::{AccountView, AssignOutcome, LoginRequest, RegisterRequest};
use tracing::{debug, info, instrument, trace};

use crate::auth::AdminAccount;
use crate::handlers::{
    admin_error_response, self_service_error_response, session_cookie_failure, HandlerError,
    HOME_PATH, LISTING_PATH,
};
use crate::schemas::{ApiResponse, AppState, AssignRoleRequest, ErrorResponse, LoginResponse};
use crate::session::{Session, SessionStore, ACCOUNT_KEY};

pub const LOGIN_PATH: &str = "/account/login";

/// Register a new account with the "User" role
#[utoipa::path(
    post,
    path = "/account/register",
    tag = "account",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account registered", body = ApiResponse<AccountView>),
        (status = 400, description = "Invalid input or password policy violation", body = ErrorResponse),
        (status = 409, description = "Email already taken", body = ErrorResponse),
        (status = 500, description = "Identity store failure", body = ErrorResponse)
    )
)]
#[instrument(skip(state, request), fields(email = %request.email))]
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AccountView>>), HandlerError> {
    trace!("Entering register function");

    let account = state
        .self_service
        .register(request)
        .await
        .map_err(self_service_error_response)?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(
            AccountView::from(account),
            "Registration successful, please log in",
        )),
    ))
}

/// Log in and start a session
#[utoipa::path(
    post,
    path = "/account/login",
    tag = "account",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in, session cookie set", body = ApiResponse<LoginResponse>),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 401, description = "Wrong email or password", body = ErrorResponse)
    )
)]
#[instrument(skip(state, session, request), fields(email = %request.email))]
pub async fn login(
    State(state): State<AppState>,
    mut session: Session,
    Json(request): Json<LoginRequest>,
) -> Result<([(HeaderName, HeaderValue); 1], Json<ApiResponse<LoginResponse>>), HandlerError> {
    trace!("Entering login function");
    let remember_me = request.remember_me;

    let outcome = state
        .self_service
        .login(request)
        .await
        .map_err(self_service_error_response)?;

    let session_id = session.renew().await;
    session.insert(ACCOUNT_KEY, outcome.account.id.clone()).await;
    let cookie = state
        .sessions
        .cookie(&session_id, remember_me, state.settings.session.cookie_secure)
        .map_err(session_cookie_failure)?;
    debug!("Session started for {} (persistent: {})", outcome.account.id, remember_me);

    let redirect_to = if outcome.is_admin() { LISTING_PATH } else { HOME_PATH };
    let response = LoginResponse {
        redirect_to: redirect_to.to_string(),
        roles: outcome.roles,
        account: outcome.account.into(),
    };

    Ok((
        [(SET_COOKIE, cookie)],
        Json(ApiResponse::ok(response, "Login successful")),
    ))
}

/// End the session and return to the login page
#[utoipa::path(
    post,
    path = "/account/logout",
    tag = "account",
    responses(
        (status = 303, description = "Session ended, redirect to login")
    )
)]
#[instrument(skip(session))]
pub async fn logout(mut session: Session) -> ([(HeaderName, HeaderValue); 1], Redirect) {
    session.clear().await;
    session.invalidate().await;
    info!("User logged out");
    (
        [(SET_COOKIE, SessionStore::expired_cookie())],
        Redirect::to(LOGIN_PATH),
    )
}

/// Add an account, found by email, to a role
#[utoipa::path(
    post,
    path = "/account/assign-role",
    tag = "account",
    request_body = AssignRoleRequest,
    responses(
        (status = 200, description = "Role assigned", body = ApiResponse<String>),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Not logged in", body = ErrorResponse),
        (status = 403, description = "Administrator role required", body = ErrorResponse),
        (status = 404, description = "No account with that email", body = ErrorResponse)
    )
)]
#[instrument(skip(state, caller))]
pub async fn assign_role(
    State(state): State<AppState>,
    AdminAccount(caller): AdminAccount,
    Valid(Json(request)): Valid<Json<AssignRoleRequest>>,
) -> Result<Json<ApiResponse<String>>, HandlerError> {
    debug!("Account {} assigning {} to {}", caller.id, request.email, request.role);

    let outcome = state
        .admin
        .assign_role(&request.email, &request.role)
        .await
        .map_err(admin_error_response)?;

    let message = match outcome {
        AssignOutcome::Assigned { role_created } => {
            if role_created {
                info!("Role {} created while assigning", request.role);
            }
            format!("Assigned {} to {}", request.email, request.role)
        }
        AssignOutcome::AlreadyInRole => {
            format!("{} is already in role {}", request.email, request.role)
        }
    };

    Ok(Json(ApiResponse::ok(message.clone(), message)))
}
