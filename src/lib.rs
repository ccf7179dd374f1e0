//! Short-lived session tokens standing in for long-lived object-storage
//! credentials.
//!
//! Credentials are sealed per session with AES-256-GCM under a PBKDF2
//! subkey derived from a versioned master key. The [`crypto::registry`]
//! owns master key lifecycle (rotation, deprecation, revocation), the
//! [`crypto::engine`] seals and opens credential payloads with ordered
//! fallback across usable keys, and [`services::session`] ties both to the
//! store and to signed bearer tokens.

pub mod config;
pub mod error;
pub mod state;

pub mod crypto {
    pub mod aes;
    pub mod engine;
    pub mod kdf;
    pub mod registry;
    pub mod token;
}

pub mod models {
    pub mod credentials;
    pub mod key;
    pub mod payload;
    pub mod session;
}

pub mod store {
    pub mod kv;
    pub mod memory;
    pub mod redis_store;
}

pub mod services {
    pub mod session;
}

pub mod validation {
    pub mod keys;
    pub mod session;
}

pub use config::Config;
pub use crypto::engine::CredentialEncryptionEngine;
pub use crypto::registry::MasterKeyRegistry;
pub use error::{AppError, Result};
pub use models::credentials::Credentials;
pub use models::payload::EncryptedPayload;
pub use models::session::{IssuedToken, SessionData};
pub use services::session::SessionTokenService;
pub use state::AppState;
pub use store::kv::SessionStore;
pub use store::memory::MemoryStore;
pub use store::redis_store::RedisStore;
