#[cfg(test)]
pub mod test_utils {
    use crate::config::{build_app_state, AppSettings};
    use crate::router::create_router;
    use crate::schemas::{ApiResponse, AppState, LoginResponse};
    use axum::http::{header::SET_COOKIE, HeaderValue, StatusCode};
    use axum_test::TestServer;
    use identity::{seed_defaults, AccountView, HashingSettings, LoginRequest, RegisterRequest, SeedSettings};
    use migration::{Migrator, MigratorTrait};
    use sea_orm::{Database, DatabaseConnection};
    use tracing::Level;
    use tracing_subscriber::FmtSubscriber;

    pub const ADMIN_EMAIL: &str = "admin@test.local";
    pub const ADMIN_PASSWORD: &str = "admin123";

    /// Create an in-memory SQLite database for testing
    pub async fn setup_test_db() -> DatabaseConnection {
        let db = Database::connect("sqlite::memory:")
            .await
            .expect("Failed to connect to in-memory database");

        Migrator::up(&db, None)
            .await
            .expect("Failed to run migrations");

        db
    }

    /// Settings with cheap hashing and a known administrator
    pub fn test_settings() -> AppSettings {
        AppSettings {
            hashing: HashingSettings {
                memory_kib: 8,
                iterations: 1,
                parallelism: 1,
            },
            seed: SeedSettings {
                admin_email: ADMIN_EMAIL.to_string(),
                admin_password: Some(ADMIN_PASSWORD.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Create AppState for testing, seeded with the default roles and administrator
    pub async fn setup_test_app_state() -> AppState {
        let db = setup_test_db().await;
        let state = build_app_state(db, test_settings()).expect("Failed to build app state");

        seed_defaults(&state.identity, &state.settings.seed)
            .await
            .expect("Failed to seed test data");

        state
    }

    /// Initialize tracing for tests with output to STDERR.
    ///
    /// The log level comes from RUST_LOG and defaults to WARN.
    fn init_test_tracing() -> tracing::subscriber::DefaultGuard {
        let log_level = std::env::var("RUST_LOG")
            .ok()
            .and_then(|level| level.parse::<Level>().ok())
            .unwrap_or(Level::WARN);

        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_writer(std::io::stderr)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    /// Start a test server; the returned state shares the server's store
    pub async fn setup_test_server() -> (TestServer, AppState) {
        let _guard = init_test_tracing();

        let state = setup_test_app_state().await;
        let server = TestServer::new(create_router(state.clone())).expect("Failed to start test server");
        (server, state)
    }

    pub fn register_request(email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
            confirm_password: password.to_string(),
            phone: "0912345678".to_string(),
        }
    }

    /// Register an account through the API
    pub async fn register(server: &TestServer, email: &str, password: &str) -> AccountView {
        let response = server
            .post("/account/register")
            .json(&register_request(email, password))
            .await;
        response.assert_status(StatusCode::CREATED);
        response.json::<ApiResponse<AccountView>>().data
    }

    /// Log in and return the `Cookie` header value carrying the session
    pub async fn login(server: &TestServer, email: &str, password: &str) -> HeaderValue {
        let response = server
            .post("/account/login")
            .json(&LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
                remember_me: false,
            })
            .await;
        response.assert_status_ok();
        let body: ApiResponse<LoginResponse> = response.json();
        assert!(body.success);

        session_cookie(&response.header(SET_COOKIE))
    }

    pub async fn login_as_admin(server: &TestServer) -> HeaderValue {
        login(server, ADMIN_EMAIL, ADMIN_PASSWORD).await
    }

    /// Turn a `Set-Cookie` value into the matching `Cookie` request value
    pub fn session_cookie(set_cookie: &HeaderValue) -> HeaderValue {
        let pair = set_cookie
            .to_str()
            .expect("Set-Cookie is not ASCII")
            .split(';')
            .next()
            .expect("Empty Set-Cookie");
        HeaderValue::from_str(pair).expect("Invalid cookie pair")
    }
}
