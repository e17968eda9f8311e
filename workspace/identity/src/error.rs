use thiserror::Error;

/// Error types for the identity provider
#[derive(Error, Debug)]
pub enum IdentityError {
    /// Error from the database operations
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// No account with the given id or email
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Another account already uses this email
    #[error("Email '{0}' is already taken")]
    DuplicateEmail(String),

    /// The store refused the operation, one entry per reason
    #[error("{}", .0.join(", "))]
    Rejected(Vec<String>),

    /// The password breaks the configured policy, one entry per rule
    #[error("{}", .0.join(", "))]
    WeakPassword(Vec<String>),

    /// Password hashing failed
    #[error("Password hashing error: {0}")]
    Hashing(String),
}

impl IdentityError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        IdentityError::Rejected(vec![reason.into()])
    }

    /// Every underlying reason, ready to be joined into one message.
    pub fn reasons(&self) -> Vec<String> {
        match self {
            IdentityError::Rejected(reasons) | IdentityError::WeakPassword(reasons) => {
                reasons.clone()
            }
            other => vec![other.to_string()],
        }
    }
}

/// Type alias for Result with IdentityError
pub type Result<T> = std::result::Result<T, IdentityError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_joins_every_reason() {
        let err = IdentityError::Rejected(vec!["first".to_string(), "second".to_string()]);
        assert_eq!(err.to_string(), "first, second");
        assert_eq!(err.reasons(), vec!["first", "second"]);
    }

    #[test]
    fn other_errors_have_a_single_reason() {
        let err = IdentityError::DuplicateEmail("a@x.com".to_string());
        assert_eq!(err.reasons(), vec!["Email 'a@x.com' is already taken"]);
    }
}
