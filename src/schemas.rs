use identity::{
    AccountAdministration, AccountPage, AccountSelfService, AccountUpdate, AccountView,
    IdentityManager, LoginRequest, RegisterRequest,
};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, OpenApi, ToSchema};
use validator::Validate;

use crate::config::AppSettings;
use crate::session::SessionStore;

/// Application state shared across handlers
#[derive(Clone, Debug)]
pub struct AppState {
    /// Database connection
    pub db: DatabaseConnection,
    pub identity: Arc<IdentityManager>,
    pub admin: AccountAdministration,
    pub self_service: AccountSelfService,
    /// Server-side sessions keyed by the session cookie
    pub sessions: SessionStore,
    pub settings: Arc<AppSettings>,
}

/// Query parameters for the account listing
#[derive(Debug, Deserialize, ToSchema, IntoParams, Validate)]
pub struct AccountListQuery {
    /// Page number, starting at 1
    #[serde(default = "default_page")]
    #[validate(range(min = 1, message = "Page must be at least 1"))]
    pub page: u64,
    /// Accounts per page
    #[serde(default = "default_page_size")]
    #[validate(range(min = 1, max = 100, message = "Page size must be between 1 and 100"))]
    pub page_size: u64,
}

fn default_page() -> u64 {
    1
}

fn default_page_size() -> u64 {
    10
}

/// Request body for assigning a role by email
#[derive(Debug, Deserialize, Serialize, ToSchema, Validate)]
pub struct AssignRoleRequest {
    #[validate(email(message = "Please enter a valid email address"))]
    pub email: String,
    #[validate(length(min = 1, max = 64, message = "Role must be between 1 and 64 characters"))]
    pub role: String,
}

/// Successful login
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub account: AccountView,
    pub roles: Vec<String>,
    /// Where the client should go next
    pub redirect_to: String,
}

/// Landing page state for the current session
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HomeResponse {
    pub signed_in: bool,
    /// Present while signed in
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<AccountView>,
    /// Present while signed in
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
}

/// Result of an edit submission
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EditResponse {
    pub account: AccountView,
    pub role_changed: bool,
    pub role_created: bool,
}

/// API response wrapper
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    /// Response data
    pub data: T,
    /// Response message
    pub message: String,
    /// Success status
    pub success: bool,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self {
            data,
            message: message.into(),
            success: true,
        }
    }
}

/// Error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
    /// Error code
    pub code: String,
    /// Success status (always false for errors)
    pub success: bool,
    /// Individual field messages for validation failures
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
    /// Page the client should return to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_to: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: &str) -> Self {
        Self {
            error: error.into(),
            code: code.to_string(),
            success: false,
            details: Vec::new(),
            redirect_to: None,
        }
    }

    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = details;
        self
    }

    pub fn with_redirect(mut self, redirect_to: &str) -> Self {
        self.redirect_to = Some(redirect_to.to_string());
        self
    }
}

/// Health check response
#[derive(Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Service version
    pub version: String,
    /// Database connection status
    pub database: String,
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::health::health_check,
        crate::handlers::home::home,
        crate::handlers::account::register,
        crate::handlers::account::login,
        crate::handlers::account::logout,
        crate::handlers::account::assign_role,
        crate::handlers::management::list_accounts,
        crate::handlers::management::account_details,
        crate::handlers::management::edit_form,
        crate::handlers::management::edit_account,
        crate::handlers::management::delete_account,
        crate::handlers::management::admin_logout,
        crate::handlers::management::test_role,
    ),
    components(
        schemas(
            ApiResponse<AccountView>,
            ApiResponse<AccountPage>,
            ApiResponse<LoginResponse>,
            ApiResponse<EditResponse>,
            ApiResponse<HomeResponse>,
            ApiResponse<String>,
            ErrorResponse,
            HealthResponse,
            AccountListQuery,
            AssignRoleRequest,
            LoginResponse,
            HomeResponse,
            EditResponse,
            AccountView,
            AccountPage,
            AccountUpdate,
            RegisterRequest,
            LoginRequest,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "home", description = "Landing page"),
        (name = "account", description = "Registration, login and logout"),
        (name = "management", description = "Account administration, Admin role required"),
    ),
    info(
        title = "authdesk API",
        description = "Account administration service with role-bound access",
        version = "0.1.0",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
pub struct ApiDoc;
