use crate::handlers::{
    account::{assign_role, login, logout, register},
    health::health_check,
    home::home,
    management::{
        account_details, admin_logout, delete_account, edit_account, edit_form, list_accounts,
        test_role,
    },
};
use crate::schemas::{ApiDoc, AppState};
use axum::{
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Create application router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Landing page
        .route("/", get(home))
        // Self-service
        .route("/account/register", post(register))
        .route("/account/login", post(login))
        .route("/account/logout", post(logout))
        .route("/account/assign-role", post(assign_role))
        // Administration
        .route("/management/user/index", get(list_accounts))
        .route("/management/user/details/:id", get(account_details))
        .route("/management/user/edit/:id", get(edit_form).post(edit_account))
        .route("/management/user/delete/:id", post(delete_account))
        .route("/management/user/logout", post(admin_logout))
        .route("/management/user/test-role", get(test_role))
        // Swagger UI
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(TimeoutLayer::new(Duration::from_secs(30)))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
