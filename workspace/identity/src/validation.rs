//! Field checks shared by the request models, plus flattening of
//! `validator` errors into user-facing messages.

use validator::{ValidationError, ValidationErrors};

/// Accepts digits with an optional leading `+` and the usual separators.
pub fn validate_phone(value: &str) -> Result<(), ValidationError> {
    let body = value.strip_prefix('+').unwrap_or(value);
    let allowed = body
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '-' | '(' | ')' | '.'));
    if body.is_empty() || !allowed || !body.chars().any(|c| c.is_ascii_digit()) {
        let mut error = ValidationError::new("phone");
        error.message = Some("Please enter a valid phone number".into());
        return Err(error);
    }
    Ok(())
}

/// Passwords may only contain ASCII letters and digits.
pub fn validate_alphanumeric_password(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_alphanumeric()) {
        let mut error = ValidationError::new("alphanumeric");
        error.message = Some("Password may only contain letters and digits".into());
        return Err(error);
    }
    Ok(())
}

/// One message per failed rule, ordered by field name.
pub fn collect_messages(errors: &ValidationErrors) -> Vec<String> {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));

    fields
        .into_iter()
        .flat_map(|(field, field_errors)| {
            field_errors.iter().map(move |e| match &e.message {
                Some(message) => message.to_string(),
                None => format!("{} is invalid", field),
            })
        })
        .collect()
}
