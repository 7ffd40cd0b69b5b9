//! Credential capture and privilege drop
//!
//! The lock needs the invoking user's password hash, which usually lives in
//! the shadow database and is only readable by root. The binary is therefore
//! installed set-uid; it reads the hash while elevated and then gives the
//! elevation up for good before touching anything the user controls.
//!
//! Privilege state is a typed value: [`Elevated`] is required to read
//! credentials and is consumed by [`Elevated::drop_privileges`], which hands
//! back a [`Dropped`] token. Code that reads user files takes `&Dropped`.

use std::ffi::{CStr, CString};
use std::fmt;

use nix::unistd::{self, Gid, Uid, User};
use thiserror::Error;
use tracing::{debug, info};
use zeroize::{Zeroize, Zeroizing};

use super::verify::CryptVerifier;

/// Shortest encoding any crypt(3) scheme produces (traditional DES).
pub const MIN_HASH_LEN: usize = 13;

#[derive(Error, Debug)]
pub enum PrivilegeError {
    #[error("I need to be SUID for VT locking.")]
    NotElevated,

    #[error("getpwuid({uid}) failed: {source}")]
    Lookup {
        uid: u32,
        #[source]
        source: nix::Error,
    },

    #[error("getpwuid({0}) failed: no such user")]
    UnknownUser(u32),

    #[error("The password for {0} is invalid, I can't lock the screen.")]
    UnusableHash(String),

    #[error("Failed to drop privileges: {0}")]
    Drop(#[source] nix::Error),

    #[error("Privileges still held after drop (euid {euid}, uid {uid})")]
    StillElevated { euid: u32, uid: u32 },
}

/// Proof that the process currently runs with root rights.
///
/// Only [`Privileges::detect`] creates one, and it cannot be cloned, so there
/// is at most one live token and it can be dropped at most once.
#[derive(Debug)]
pub struct Elevated {
    _priv: (),
}

/// Proof that elevated rights have been given up (or were never held).
#[derive(Debug)]
pub struct Dropped {
    _priv: (),
}

/// Privilege state observed at startup.
#[derive(Debug)]
pub enum Privileges {
    Elevated(Elevated),
    Unprivileged(Dropped),
}

impl Privileges {
    /// Inspect the effective uid of the process
    pub fn detect() -> Self {
        if unistd::geteuid().is_root() {
            Privileges::Elevated(Elevated { _priv: () })
        } else {
            Privileges::Unprivileged(Dropped { _priv: () })
        }
    }

    /// Drop whatever is held. Safe to call whether or not we are elevated.
    pub fn drop_privileges(self) -> Result<Dropped, PrivilegeError> {
        match self {
            Privileges::Elevated(token) => token.drop_privileges(),
            Privileges::Unprivileged(dropped) => Ok(dropped),
        }
    }

    pub fn elevated(&self) -> Option<&Elevated> {
        match self {
            Privileges::Elevated(token) => Some(token),
            Privileges::Unprivileged(_) => None,
        }
    }
}

impl Elevated {
    /// Give up set-uid/set-gid rights permanently.
    ///
    /// The group is reset first; once the uid is gone the process would no
    /// longer be allowed to change it.
    pub fn drop_privileges(self) -> Result<Dropped, PrivilegeError> {
        let (uid, gid) = (unistd::getuid(), unistd::getgid());
        unistd::setgid(gid).map_err(PrivilegeError::Drop)?;
        unistd::setuid(uid).map_err(PrivilegeError::Drop)?;

        let euid = unistd::geteuid();
        if euid != uid || unistd::getegid() != gid {
            return Err(PrivilegeError::StillElevated {
                euid: euid.as_raw(),
                uid: uid.as_raw(),
            });
        }

        info!("Dropped privileges to uid {} gid {}", uid, gid);
        Ok(Dropped { _priv: () })
    }

    #[cfg(test)]
    pub(crate) fn assume() -> Self {
        Elevated { _priv: () }
    }
}

#[cfg(test)]
impl Dropped {
    pub(crate) fn assume() -> Self {
        Dropped { _priv: () }
    }
}

/// The locking user's name and password hash.
///
/// Captured once while elevated and never changed afterwards. The hash is
/// wiped from memory when the credential is dropped.
pub struct Credential {
    username: String,
    secret_hash: Zeroizing<String>,
}

impl Credential {
    /// Build a credential, rejecting hashes too short to be a real encoding.
    pub fn new(username: impl Into<String>, secret_hash: String) -> Result<Self, PrivilegeError> {
        let username = username.into();
        let secret_hash = Zeroizing::new(secret_hash);
        if secret_hash.len() < MIN_HASH_LEN {
            return Err(PrivilegeError::UnusableHash(username));
        }
        Ok(Self { username, secret_hash })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn secret_hash(&self) -> &str {
        &self.secret_hash
    }
}

// Never print the hash, not even in debug output.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("secret_hash", &"<redacted>")
            .finish()
    }
}

/// A user record as seen in the public user database.
pub struct UserRecord {
    pub name: String,
    /// Password field of the public record; often a placeholder such as `x`.
    pub passwd: Zeroizing<String>,
}

/// Access to the system user and shadow databases.
pub trait CredentialStore {
    /// Public user record for a uid, `None` if no such user exists.
    fn user_by_uid(&self, uid: Uid) -> Result<Option<UserRecord>, PrivilegeError>;

    /// Hash from the protected shadow record, if there is one.
    fn shadow_hash(&self, username: &str) -> Option<Zeroizing<String>>;

    /// Whether the hash is something a password could ever verify against.
    fn hash_usable(&self, _hash: &str) -> bool {
        true
    }
}

/// The real passwd/shadow databases.
pub struct SystemCredentialStore;

impl CredentialStore for SystemCredentialStore {
    fn user_by_uid(&self, uid: Uid) -> Result<Option<UserRecord>, PrivilegeError> {
        let user = User::from_uid(uid).map_err(|source| PrivilegeError::Lookup {
            uid: uid.as_raw(),
            source,
        })?;

        Ok(user.map(|mut user| {
            let passwd = Zeroizing::new(user.passwd.to_string_lossy().into_owned());
            // The CString inside `User` holds the same bytes; wipe it too.
            let mut raw = std::mem::take(&mut user.passwd).into_bytes();
            raw.zeroize();
            UserRecord {
                name: user.name,
                passwd,
            }
        }))
    }

    fn shadow_hash(&self, username: &str) -> Option<Zeroizing<String>> {
        let name = CString::new(username).ok()?;

        // getspnam returns a pointer into static storage; copy it out before
        // endspent() releases it.
        let hash = unsafe {
            let entry = libc::getspnam(name.as_ptr());
            let hash = if entry.is_null() || (*entry).sp_pwdp.is_null() {
                None
            } else {
                let value = CStr::from_ptr((*entry).sp_pwdp);
                Some(Zeroizing::new(value.to_string_lossy().into_owned()))
            };
            libc::endspent();
            hash
        };

        if hash.is_none() {
            debug!("No shadow entry for {}", username);
        }
        hash
    }

    fn hash_usable(&self, hash: &str) -> bool {
        CryptVerifier::hash(b"", hash).is_ok()
    }
}

/// Reads the credential of the user that launched the process.
pub struct PrivilegeManager<S: CredentialStore = SystemCredentialStore> {
    store: S,
}

impl PrivilegeManager<SystemCredentialStore> {
    pub fn system() -> Self {
        Self {
            store: SystemCredentialStore,
        }
    }
}

impl<S: CredentialStore> PrivilegeManager<S> {
    #[cfg(test)]
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Capture the credential for `uid`.
    ///
    /// Requires the elevation token: the shadow database is unreadable
    /// otherwise, and holding the token proves the drop has not happened yet.
    pub fn acquire_credential(&self, uid: Uid, _elevated: &Elevated) -> Result<Credential, PrivilegeError> {
        let record = self
            .store
            .user_by_uid(uid)?
            .ok_or(PrivilegeError::UnknownUser(uid.as_raw()))?;

        // The public record may only carry a placeholder
        let hash = match self.store.shadow_hash(&record.name) {
            Some(shadow) => shadow,
            None => record.passwd,
        };

        let credential = Credential::new(record.name, hash.to_string())?;
        if !self.store.hash_usable(credential.secret_hash()) {
            return Err(PrivilegeError::UnusableHash(credential.username().to_string()));
        }
        info!("Captured credential for {}", credential.username());
        Ok(credential)
    }
}

/// Real user and group of the process, used to decide whom to lock for.
pub fn invoking_user() -> (Uid, Gid) {
    (unistd::getuid(), unistd::getgid())
}
