//! Registration and login for end users.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use validator::Validate;

use crate::error::IdentityError;
use crate::manager::{IdentityManager, NewAccount};
use crate::store::Account;
use crate::validation::{collect_messages, validate_alphanumeric_password, validate_phone};
use crate::{ROLE_ADMIN, ROLE_USER};

/// Failures of registration and login
#[derive(Error, Debug)]
pub enum SelfServiceError {
    #[error("Invalid input: {}", .0.join(", "))]
    Validation(Vec<String>),

    #[error("Email '{0}' is already taken")]
    EmailTaken(String),

    #[error("Login failed, please check your account or password")]
    InvalidCredentials,

    #[error("{}", .0.join(", "))]
    Provider(Vec<String>),
}

impl From<IdentityError> for SelfServiceError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::DuplicateEmail(email) => SelfServiceError::EmailTaken(email),
            IdentityError::WeakPassword(rules) => SelfServiceError::Validation(rules),
            other => SelfServiceError::Provider(other.reasons()),
        }
    }
}

/// Request body for registering a new account
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Please enter a valid email address"))]
    pub email: String,
    #[validate(custom(function = "validate_alphanumeric_password"))]
    pub password: String,
    #[validate(must_match(other = "password", message = "Password and confirmation do not match"))]
    pub confirm_password: String,
    #[validate(
        length(
            min = 10,
            max = 15,
            message = "Phone number must be between 10 and 15 characters"
        ),
        custom(function = "validate_phone")
    )]
    pub phone: String,
}

/// Request body for logging in
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Please enter a valid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
}

/// A successful login
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub account: Account,
    pub roles: Vec<String>,
}

impl LoginOutcome {
    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|r| r == ROLE_ADMIN)
    }
}

/// Registration and credential checks for end users.
#[derive(Debug, Clone)]
pub struct AccountSelfService {
    identity: Arc<IdentityManager>,
}

impl AccountSelfService {
    pub fn new(identity: Arc<IdentityManager>) -> Self {
        Self { identity }
    }

    /// Create an account with the default "User" role.
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn register(&self, request: RegisterRequest) -> Result<Account, SelfServiceError> {
        if let Err(errors) = request.validate() {
            let messages = collect_messages(&errors);
            debug!("Registration rejected by validation: {:?}", messages);
            return Err(SelfServiceError::Validation(messages));
        }

        let account = self
            .identity
            .create_account(
                NewAccount {
                    email: request.email,
                    phone_number: request.phone,
                    role: ROLE_USER.to_string(),
                },
                &request.password,
            )
            .await?;

        info!("Registered account {} ({})", account.id, account.email);
        Ok(account)
    }

    /// Check credentials. No lockout is applied on failure.
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn login(&self, request: LoginRequest) -> Result<LoginOutcome, SelfServiceError> {
        if let Err(errors) = request.validate() {
            return Err(SelfServiceError::Validation(collect_messages(&errors)));
        }

        let Some(account) = self
            .identity
            .verify_credentials(&request.email, &request.password)
            .await
            .map_err(|err| SelfServiceError::Provider(err.reasons()))?
        else {
            warn!("Failed login for {}", request.email);
            return Err(SelfServiceError::InvalidCredentials);
        };

        let roles = self
            .identity
            .roles_for(&account.id)
            .await
            .map_err(|err| SelfServiceError::Provider(err.reasons()))?;
        info!("Account {} logged in with roles {:?}", account.id, roles);
        Ok(LoginOutcome { account, roles })
    }
}
