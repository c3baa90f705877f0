//! `.dat` container: an AES-256-GCM encrypted workbook.
//!
//! Layout is `salt(16) || iv(12) || ciphertext+tag`; the key is derived with
//! PBKDF2-HMAC-SHA256 over the passphrase and the stored salt.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;

use crate::error::{Error, Result};

pub const SALT_SIZE: usize = 16;
pub const IV_SIZE: usize = 12;
pub const KEY_SIZE: usize = 32;
pub const PBKDF2_ITERATIONS: u32 = 100_000;

const ZIP_SIGNATURE: &[u8; 2] = b"PK";

pub fn derive_key(passphrase: &str, salt: &[u8]) -> Result<[u8; KEY_SIZE]> {
    if salt.len() != SALT_SIZE {
        return Err(Error::Crypto("Invalid .dat format (salt missing/corrupt).".to_string()));
    }
    let mut key = [0u8; KEY_SIZE];
    pbkdf2::pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key);
    Ok(key)
}

/// Encrypts with a fresh random salt and iv.
pub fn encrypt(data: &[u8], passphrase: &str) -> Result<Vec<u8>> {
    let mut salt = [0u8; SALT_SIZE];
    let mut iv = [0u8; IV_SIZE];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut iv);
    encrypt_with(data, passphrase, &salt, &iv)
}

pub fn encrypt_with(data: &[u8], passphrase: &str, salt: &[u8; SALT_SIZE], iv: &[u8; IV_SIZE]) -> Result<Vec<u8>> {
    let key = derive_key(passphrase, salt)?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(iv), data)
        .map_err(|e| Error::Crypto(format!("Encryption failed: {}", e)))?;

    let mut out = Vec::with_capacity(SALT_SIZE + IV_SIZE + ciphertext.len());
    out.extend_from_slice(salt);
    out.extend_from_slice(iv);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

pub fn decrypt(file_bytes: &[u8], passphrase: &str) -> Result<Vec<u8>> {
    if file_bytes.len() <= SALT_SIZE + IV_SIZE {
        return Err(Error::Crypto("Invalid .dat format (file too short).".to_string()));
    }
    let (salt, rest) = file_bytes.split_at(SALT_SIZE);
    let (iv, ciphertext) = rest.split_at(IV_SIZE);

    let key = derive_key(passphrase, salt)?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    cipher
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| Error::Crypto("Unable to decrypt .dat file. Check password.".to_string()))
}

pub fn looks_like_xlsx(bytes: &[u8]) -> bool {
    bytes.starts_with(ZIP_SIGNATURE)
}

/// Returns raw workbook bytes: plain `.xlsx` passes through, anything else is
/// decrypted and must yield a workbook.
pub fn decrypt_or_load_excel_bytes(file_bytes: &[u8], passphrase: &str) -> Result<Vec<u8>> {
    if looks_like_xlsx(file_bytes) {
        return Ok(file_bytes.to_vec());
    }
    let decrypted = decrypt(file_bytes, passphrase)?;
    if !looks_like_xlsx(&decrypted) {
        return Err(Error::BadRequest(
            "Decrypted file content is not a readable Excel file.".to_string(),
        ));
    }
    Ok(decrypted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn layout_is_salt_iv_then_ciphertext_with_tag() {
        let salt = [7u8; SALT_SIZE];
        let iv = [9u8; IV_SIZE];
        let data = b"PK\x03\x04workbook";
        let out = encrypt_with(data, "secret", &salt, &iv).unwrap();
        assert_eq!(&out[..SALT_SIZE], &salt);
        assert_eq!(&out[SALT_SIZE..SALT_SIZE + IV_SIZE], &iv);
        // 16-byte GCM tag
        assert_eq!(out.len(), SALT_SIZE + IV_SIZE + data.len() + 16);
    }

    #[test]
    fn wrong_passphrase_is_rejected() {
        let out = encrypt(b"PK payload", "right").unwrap();
        let err = decrypt(&out, "wrong").unwrap_err();
        assert!(matches!(err, Error::Crypto(_)));
    }

    #[test]
    fn plain_xlsx_passes_through() {
        let bytes = b"PK\x03\x04rest".to_vec();
        assert_eq!(decrypt_or_load_excel_bytes(&bytes, "any").unwrap(), bytes);
    }

    #[test]
    fn decrypted_non_workbook_is_refused() {
        let out = encrypt(b"not a zip", "pw").unwrap();
        assert!(matches!(
            decrypt_or_load_excel_bytes(&out, "pw"),
            Err(Error::BadRequest(_))
        ));
    }

    #[test]
    fn truncated_file_is_refused() {
        assert!(decrypt(&[0u8; 20], "pw").is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(8))]

        #[test]
        fn decrypt_recovers_exact_bytes(
            data in proptest::collection::vec(any::<u8>(), 0..512),
            salt in any::<[u8; SALT_SIZE]>(),
            iv in any::<[u8; IV_SIZE]>(),
        ) {
            let sealed = encrypt_with(&data, "converter-pass", &salt, &iv).unwrap();
            prop_assert_eq!(decrypt(&sealed, "converter-pass").unwrap(), data);
        }
    }
}
