use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use rand::rngs::OsRng;
use zeroize::{Zeroize, ZeroizeOnDrop};
use crate::error::{AppError, Result};

/// The size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// The size of the AES-GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// The size of the AES-GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// A secure key wrapper that ensures the key is zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecureKey([u8; KEY_SIZE]);

impl SecureKey {
    /// Creates a new `SecureKey` from a byte array.
    ///
    /// # Arguments
    ///
    /// * `key` - A 32-byte array representing the AES-256 key.
    pub fn new(key: [u8; KEY_SIZE]) -> Self {
        Self(key)
    }

    /// Returns a reference to the key as a byte slice.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

/// Generates a new random AES-GCM nonce.
///
/// # Returns
///
/// A 12-byte array representing the nonce.
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Encrypts a plaintext using AES-256-GCM under a fresh random nonce.
///
/// # Arguments
///
/// * `key` - The AES-256 key.
/// * `plaintext` - The data to encrypt.
///
/// # Returns
///
/// A tuple containing the ciphertext (tag appended) and the nonce used.
pub fn encrypt(key: &SecureKey, plaintext: &[u8]) -> Result<(Vec<u8>, [u8; NONCE_SIZE])> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let nonce_bytes = generate_nonce();
    let nonce = Nonce::from(nonce_bytes);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| AppError::EncryptionFailed(format!("AES-GCM seal: {}", e)))?;

    Ok((ciphertext, nonce_bytes))
}

/// Decrypts a ciphertext using AES-256-GCM.
///
/// Wrong keys, tampered ciphertexts and malformed nonces all fail the same way.
///
/// # Arguments
///
/// * `key` - The AES-256 key.
/// * `ciphertext` - The data to decrypt, tag appended.
/// * `nonce` - The nonce used for encryption.
///
/// # Returns
///
/// The decrypted plaintext.
pub fn decrypt(key: &SecureKey, ciphertext: &[u8], nonce: &[u8]) -> Result<Vec<u8>> {
    let nonce: [u8; NONCE_SIZE] = nonce
        .try_into()
        .map_err(|_| AppError::DecryptionFailed)?;

    if ciphertext.len() < TAG_SIZE {
        return Err(AppError::DecryptionFailed);
    }

    let cipher = Aes256Gcm::new(key.as_bytes().into());
    cipher
        .decrypt(&Nonce::from(nonce), ciphertext)
        .map_err(|_| AppError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> SecureKey {
        SecureKey::new([byte; KEY_SIZE])
    }

    #[test]
    fn seal_and_open() {
        let (ciphertext, nonce) = encrypt(&key(7), b"secret").unwrap();
        assert_eq!(ciphertext.len(), b"secret".len() + TAG_SIZE);
        assert_eq!(decrypt(&key(7), &ciphertext, &nonce).unwrap(), b"secret");
    }

    #[test]
    fn nonces_are_fresh() {
        let (first, nonce_a) = encrypt(&key(7), b"secret").unwrap();
        let (second, nonce_b) = encrypt(&key(7), b"secret").unwrap();
        assert_ne!(nonce_a, nonce_b);
        assert_ne!(first, second);
    }

    #[test]
    fn wrong_key_and_tampering_fail() {
        let (mut ciphertext, nonce) = encrypt(&key(7), b"secret").unwrap();
        assert!(matches!(decrypt(&key(8), &ciphertext, &nonce), Err(AppError::DecryptionFailed)));

        ciphertext[0] ^= 0x01;
        assert!(matches!(decrypt(&key(7), &ciphertext, &nonce), Err(AppError::DecryptionFailed)));
    }

    #[test]
    fn malformed_nonce_fails() {
        let (ciphertext, _) = encrypt(&key(7), b"secret").unwrap();
        assert!(decrypt(&key(7), &ciphertext, &[0u8; 8]).is_err());
        assert!(decrypt(&key(7), &[0u8; 4], &[0u8; NONCE_SIZE]).is_err());
    }
}
