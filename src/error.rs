use thiserror::Error;

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// The bearer token is malformed, unsigned, tampered with or expired.
    #[error("Invalid token")]
    InvalidToken,

    /// The session record is absent or expired.
    #[error("Session not found")]
    SessionNotFound,

    /// No candidate key could decrypt the payload.
    #[error("Decryption failed")]
    DecryptionFailed,

    /// No key metadata exists for the requested version.
    #[error("Key version not found: {0}")]
    KeyVersionNotFound(u32),

    /// The key registry could not be read or written.
    #[error("Key registry unavailable: {0}")]
    RegistryUnavailable(String),

    /// Credentials could not be encrypted.
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// A new session could not be created or persisted.
    #[error("Session creation failed: {0}")]
    SessionCreationFailed(String),

    /// The session id is empty or malformed.
    #[error("Invalid session id: {0}")]
    InvalidSessionId(String),

    /// Master key material failed validation.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// The operation is not supported at this layer.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// A validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The key-value store failed.
    #[error("Store error: {0}")]
    Store(String),

    /// A record could not be serialized or deserialized.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Whether retrying the same call may succeed once infrastructure recovers.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Store(_) | AppError::RegistryUnavailable(_))
    }

    /// Whether the failure was caused by the caller's input.
    ///
    /// Token and session failures are deliberately indistinguishable to the
    /// caller: both mean "reauthenticate".
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AppError::InvalidToken
                | AppError::SessionNotFound
                | AppError::InvalidSessionId(_)
                | AppError::Validation(_)
        )
    }
}

impl From<redis::RedisError> for AppError {
    fn from(e: redis::RedisError) -> Self {
        AppError::Store(e.to_string())
    }
}

impl From<sonic_rs::Error> for AppError {
    fn from(e: sonic_rs::Error) -> Self {
        AppError::Serialization(e.to_string())
    }
}
