//! Candidate secret verification against the stored hash.

use std::ffi::CStr;

use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::warn;
use zeroize::Zeroizing;

use super::privilege::Credential;

/// Room for `struct crypt_data` of both glibc (~128 KiB) and libxcrypt (32 KiB).
const CRYPT_DATA_SIZE: usize = 256 * 1024;

#[link(name = "crypt")]
extern "C" {
    fn crypt_r(
        key: *const libc::c_char,
        salt: *const libc::c_char,
        data: *mut libc::c_void,
    ) -> *mut libc::c_char;
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Candidate secret contains a NUL byte")]
    EmbeddedNul,

    #[error("Stored hash cannot be used as a crypt(3) salt")]
    BadSalt,

    #[error("crypt(3) failed")]
    Crypt,
}

/// Compares a candidate secret with a captured credential.
pub trait CredentialVerifier {
    fn verify(&self, candidate: &[u8], credential: &Credential) -> Result<bool, AuthError>;
}

/// crypt_r(3) from the system library, so every scheme the system can store
/// (DES, MD5, SHA-crypt, bcrypt, yescrypt) verifies the same way `login` does.
pub struct CryptVerifier;

impl CryptVerifier {
    /// Hash `secret` with `salt` (a full stored hash works as salt).
    pub fn hash(secret: &[u8], salt: &str) -> Result<Zeroizing<Vec<u8>>, AuthError> {
        if secret.contains(&0) {
            return Err(AuthError::EmbeddedNul);
        }
        if salt.as_bytes().contains(&0) {
            return Err(AuthError::BadSalt);
        }

        let mut key = Zeroizing::new(Vec::with_capacity(secret.len() + 1));
        key.extend_from_slice(secret);
        key.push(0);
        let mut salt_c = Vec::with_capacity(salt.len() + 1);
        salt_c.extend_from_slice(salt.as_bytes());
        salt_c.push(0);

        // The scratch area holds intermediate key material; wiped on drop.
        // crypt_r() returns a pointer into it, or NULL / a "*" prefixed token
        // on failure.
        let mut scratch = Zeroizing::new(vec![0u8; CRYPT_DATA_SIZE]);
        unsafe {
            let out = crypt_r(
                key.as_ptr() as *const libc::c_char,
                salt_c.as_ptr() as *const libc::c_char,
                scratch.as_mut_ptr() as *mut libc::c_void,
            );
            if out.is_null() {
                return Err(AuthError::Crypt);
            }
            let hashed = CStr::from_ptr(out).to_bytes();
            if hashed.first() == Some(&b'*') {
                return Err(AuthError::Crypt);
            }
            Ok(Zeroizing::new(hashed.to_vec()))
        }
    }
}

impl CredentialVerifier for CryptVerifier {
    fn verify(&self, candidate: &[u8], credential: &Credential) -> Result<bool, AuthError> {
        let stored = credential.secret_hash().as_bytes();
        let hashed = match Self::hash(candidate, credential.secret_hash()) {
            Ok(hashed) => hashed,
            // A NUL can never be part of a real password
            Err(AuthError::EmbeddedNul) => return Ok(false),
            // Nothing can match a hash crypt(3) refuses, e.g. a "!" locked account
            Err(e @ (AuthError::BadSalt | AuthError::Crypt)) => {
                warn!("Stored hash for {} not usable: {}", credential.username(), e);
                return Ok(false);
            }
        };
        Ok(hashed.len() == stored.len() && bool::from(hashed.as_slice().ct_eq(stored)))
    }
}
