use aes_gcm::Aes256Gcm;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use rand::RngCore;
use thiserror::Error;

/// Length of the AES-GCM nonce used throughout the group call protocol.
pub const NONCE_LEN: usize = 12;
/// Length of the AES-GCM authentication tag.
pub const TAG_LEN: usize = 16;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GcmError {
    #[error("Invalid key or nonce size for AES-GCM")]
    InvalidSize,
    #[error("AES-GCM cipher operation failed")]
    CipherError,
    #[error("Sealed box too short: {0} bytes")]
    TooShort(usize),
}

type Result<T> = std::result::Result<T, GcmError>;

/// Prepares an AES-256-GCM cipher instance from a secret key.
pub fn prepare(secret_key: &[u8]) -> Result<Aes256Gcm> {
    Aes256Gcm::new_from_slice(secret_key).map_err(|_| GcmError::InvalidSize)
}

/// Encrypts plaintext using AES-256-GCM.
pub fn encrypt(
    secret_key: &[u8],
    iv: &[u8],
    plaintext: &[u8],
    additional_data: &[u8],
) -> Result<Vec<u8>> {
    if iv.len() != NONCE_LEN {
        return Err(GcmError::InvalidSize);
    }
    let cipher = prepare(secret_key)?;
    let nonce = aes_gcm::Nonce::from_slice(iv);
    let payload = Payload {
        msg: plaintext,
        aad: additional_data,
    };
    cipher
        .encrypt(nonce, payload)
        .map_err(|_| GcmError::CipherError)
}

/// Decrypts ciphertext using AES-256-GCM.
pub fn decrypt(
    secret_key: &[u8],
    iv: &[u8],
    ciphertext: &[u8],
    additional_data: &[u8],
) -> Result<Vec<u8>> {
    if iv.len() != NONCE_LEN {
        return Err(GcmError::InvalidSize);
    }
    let cipher = prepare(secret_key)?;
    let nonce = aes_gcm::Nonce::from_slice(iv);
    let payload = Payload {
        msg: ciphertext,
        aad: additional_data,
    };
    cipher
        .decrypt(nonce, payload)
        .map_err(|_| GcmError::CipherError)
}

/// Encrypts under a fresh random nonce and returns `nonce || ciphertext`.
pub fn seal(secret_key: &[u8], plaintext: &[u8], additional_data: &[u8]) -> Result<Vec<u8>> {
    let mut nonce = [0u8; NONCE_LEN];
    rand::rng().fill_bytes(&mut nonce);
    seal_with_nonce(secret_key, &nonce, plaintext, additional_data)
}

/// Encrypts under the given nonce and returns `nonce || ciphertext`.
pub fn seal_with_nonce(
    secret_key: &[u8],
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
    additional_data: &[u8],
) -> Result<Vec<u8>> {
    let ciphertext = encrypt(secret_key, nonce, plaintext, additional_data)?;
    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Splits a `nonce || ciphertext` box and decrypts it.
pub fn open(secret_key: &[u8], sealed: &[u8], additional_data: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < NONCE_LEN + TAG_LEN {
        return Err(GcmError::TooShort(sealed.len()));
    }
    let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
    decrypt(secret_key, nonce, ciphertext, additional_data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open() {
        let key = [7u8; 32];
        let sealed = seal(&key, b"hello", b"aad").unwrap();
        assert_eq!(sealed.len(), NONCE_LEN + 5 + TAG_LEN);
        assert_eq!(open(&key, &sealed, b"aad").unwrap(), b"hello");
    }

    #[test]
    fn test_open_rejects_wrong_aad() {
        let key = [7u8; 32];
        let sealed = seal(&key, b"hello", b"aad").unwrap();
        assert_eq!(open(&key, &sealed, b"other"), Err(GcmError::CipherError));
    }

    #[test]
    fn test_open_rejects_short_box() {
        assert_eq!(open(&[0u8; 32], &[0u8; 10], b""), Err(GcmError::TooShort(10)));
    }

    #[test]
    fn test_invalid_key_size() {
        assert_eq!(
            encrypt(&[0u8; 5], &[0u8; NONCE_LEN], b"x", b"").unwrap_err(),
            GcmError::InvalidSize
        );
    }
}
