//! Key material and derivation.
//!
//! Master keys never encrypt data directly. Credential payloads are sealed
//! under a per-session subkey:
//!
//! ```text
//! PBKDF2-HMAC-SHA256(
//!     password   = master_key,
//!     salt       = master_key || session_id || CREDENTIAL_KEY_DOMAIN,
//!     iterations = configured rounds,
//! ) -> 32 bytes
//! ```
//!
//! The registry's wrapping key and the token signing secret are derived from
//! the primary master key with single SHA-256 passes under their own domain
//! strings, so none of the three derivations can collide.

use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::crypto::aes::{KEY_SIZE, SecureKey};
use crate::error::{AppError, Result};
use crate::validation::session::validate_session_id;

/// Domain separation string mixed into every session subkey salt.
pub const CREDENTIAL_KEY_DOMAIN: &[u8] = b"r2-session-vault/credential-key/v1";
/// Domain separation string for the registry wrapping key.
const KEY_WRAP_DOMAIN: &[u8] = b"r2-session-vault/key-wrap/v1";
/// Domain separation string for the token signing secret.
const TOKEN_SIGNING_DOMAIN: &[u8] = b"r2-session-vault/token-signing/v1";

/// Master key material.
///
/// Not `Clone`, zeroized on drop, and never printed.
pub struct MasterKey {
    material: Zeroizing<Vec<u8>>,
}

impl MasterKey {
    /// Wraps raw key material.
    pub fn from_bytes(material: Vec<u8>) -> Self {
        Self {
            material: Zeroizing::new(material),
        }
    }

    /// Borrows the raw key material.
    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.material
    }

    /// Short, non-reversible identifier for logs.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.material)
    }
}

impl PartialEq for MasterKey {
    fn eq(&self, other: &Self) -> bool {
        use subtle::ConstantTimeEq;
        self.material.as_slice().ct_eq(other.material.as_slice()).into()
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MasterKey({})", self.fingerprint())
    }
}

/// First 8 bytes of SHA-256 over the material, hex encoded.
pub fn fingerprint(material: &[u8]) -> String {
    let digest = Sha256::digest(material);
    hex::encode(&digest[..8])
}

/// Derives the subkey that seals one session's credentials.
///
/// # Arguments
///
/// * `master` - The master key version the payload is bound to.
/// * `session_id` - The session the payload belongs to.
/// * `iterations` - PBKDF2 round count.
///
/// # Returns
///
/// A `Result` containing the derived key, or `InvalidSessionId`.
pub fn derive_session_key(master: &MasterKey, session_id: &str, iterations: u32) -> Result<SecureKey> {
    validate_session_id(session_id)?;

    if iterations == 0 {
        return Err(AppError::Config("KDF iterations must be positive".to_string()));
    }

    let mut salt = Zeroizing::new(Vec::with_capacity(
        master.as_bytes().len() + session_id.len() + CREDENTIAL_KEY_DOMAIN.len(),
    ));
    salt.extend_from_slice(master.as_bytes());
    salt.extend_from_slice(session_id.as_bytes());
    salt.extend_from_slice(CREDENTIAL_KEY_DOMAIN);

    let mut key = [0u8; KEY_SIZE];
    pbkdf2::pbkdf2_hmac::<Sha256>(master.as_bytes(), &salt, iterations, &mut key);
    let derived = SecureKey::new(key);
    zeroize::Zeroize::zeroize(&mut key);

    Ok(derived)
}

fn domain_hash(domain: &[u8], material: &[u8]) -> [u8; KEY_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    hasher.update(material);
    hasher.finalize().into()
}

/// Derives the key that seals master key material inside registry records.
pub fn wrapping_key(primary: &[u8]) -> SecureKey {
    SecureKey::new(domain_hash(KEY_WRAP_DOMAIN, primary))
}

/// Derives the token signing secret from the primary master key.
pub fn token_signing_secret(primary: &[u8]) -> Zeroizing<Vec<u8>> {
    Zeroizing::new(domain_hash(TOKEN_SIGNING_DOMAIN, primary).to_vec())
}
