use crate::error::{AppError, Result};
use crate::models::credentials::Credentials;

/// Maximum length of a session id.
pub const MAX_SESSION_ID_LEN: usize = 128;

/// Validates a session id before it is used as key derivation salt.
///
/// # Arguments
///
/// * `session_id` - The session id to validate.
///
/// # Returns
///
/// A `Result<()>` indicating whether the session id is valid.
pub fn validate_session_id(session_id: &str) -> Result<()> {
    if session_id.is_empty() {
        return Err(AppError::InvalidSessionId(
            "Session id cannot be empty".to_string(),
        ));
    }

    if session_id.len() > MAX_SESSION_ID_LEN {
        return Err(AppError::InvalidSessionId(format!(
            "Session id must be at most {} characters",
            MAX_SESSION_ID_LEN
        )));
    }

    if !session_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(AppError::InvalidSessionId(
            "Session id can only contain letters, numbers, underscores, and hyphens".to_string(),
        ));
    }

    Ok(())
}

/// Validates that every credential field carries a value.
///
/// # Arguments
///
/// * `credentials` - The credentials presented at login.
///
/// # Returns
///
/// A `Result<()>` indicating whether the credentials are usable.
pub fn validate_credentials(credentials: &Credentials) -> Result<()> {
    let fields = [
        ("accountId", &credentials.account_id),
        ("accessKeyId", &credentials.access_key_id),
        ("secretAccessKey", &credentials.secret_access_key),
        ("bucketName", &credentials.bucket_name),
    ];

    for (name, value) in fields {
        if value.trim().is_empty() {
            return Err(AppError::Validation(format!("{} cannot be empty", name)));
        }
    }

    Ok(())
}
