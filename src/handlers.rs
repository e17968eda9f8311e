pub mod account;
pub mod health;
pub mod home;
pub mod management;

use axum::{http::StatusCode, response::Json};
use identity::{AdminError, SelfServiceError};
use tracing::error;

use crate::schemas::ErrorResponse;

pub type HandlerError = (StatusCode, Json<ErrorResponse>);

/// Where failed administration requests send the client back to
pub const LISTING_PATH: &str = "/management/user/index";

/// Where signed-in accounts without the Admin role land
pub const HOME_PATH: &str = "/";

pub fn admin_error_response(err: AdminError) -> HandlerError {
    let message = err.to_string();
    match err {
        AdminError::NotFound => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(message, "ACCOUNT_NOT_FOUND").with_redirect(LISTING_PATH)),
        ),
        AdminError::IdMismatch => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(message, "ID_MISMATCH").with_redirect(LISTING_PATH)),
        ),
        AdminError::Validation(details) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(message, "VALIDATION_ERROR").with_details(details)),
        ),
        AdminError::SelfDemotion => (
            StatusCode::FORBIDDEN,
            Json(ErrorResponse::new(message, "SELF_DEMOTION_FORBIDDEN")),
        ),
        AdminError::EmailTaken(_) => (
            StatusCode::CONFLICT,
            Json(ErrorResponse::new(message, "EMAIL_TAKEN")),
        ),
        AdminError::Provider { reasons, .. } => {
            error!("Identity store failure: {}", message);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(message, "PROVIDER_FAILURE").with_details(reasons)),
            )
        }
    }
}

pub fn self_service_error_response(err: SelfServiceError) -> HandlerError {
    let message = err.to_string();
    match err {
        SelfServiceError::Validation(details) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(message, "VALIDATION_ERROR").with_details(details)),
        ),
        SelfServiceError::EmailTaken(_) => (
            StatusCode::CONFLICT,
            Json(ErrorResponse::new(message, "EMAIL_TAKEN")),
        ),
        SelfServiceError::InvalidCredentials => (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new(message, "INVALID_CREDENTIALS")),
        ),
        SelfServiceError::Provider(reasons) => {
            error!("Identity store failure: {}", message);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(message, "PROVIDER_FAILURE").with_details(reasons)),
            )
        }
    }
}

pub fn session_cookie_failure(err: impl std::fmt::Display) -> HandlerError {
    error!("Failed to build session cookie: {}", err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new(
            "Internal server error while starting the session",
            "SESSION_ERROR",
        )),
    )
}
