//! Terminal locking and authentication.
//!
//! - **privilege**: privilege tokens, credential capture, privilege drop
//! - **vt**: process-controlled VT switching on the console
//! - **signals**: signal mask and handlers while locked
//! - **termmode**: terminal attribute snapshot and secure input mode
//! - **lockout**: escalating delay after failures
//! - **audit**: syslog records for failed attempts
//! - **verify**: crypt(3) hashing and constant-time comparison
//! - **prompt**: timed password entry
//! - **session**: the lock state machine tying it all together
//!
//! # Architecture
//!
//! ```text
//! Session
//! ├── Credential (captured while Elevated)
//! ├── VtSessionController
//! │   ├── VtDevice (/dev/tty ioctls)
//! │   └── SignalRouting (mask + SIGUSR1 flag)
//! ├── TerminalModeManager
//! │   └── TermiosPort (stdin tcgetattr/tcsetattr)
//! ├── LockoutPolicy
//! │   └── AuditSink (syslog)
//! └── AuthPrompt
//!     ├── LockScreen (password box)
//!     └── CredentialVerifier (crypt_r)
//! ```

pub mod audit;
pub mod clock;
pub mod error;
pub mod lockout;
pub mod privilege;
pub mod prompt;
pub mod session;
pub mod signals;
pub mod termmode;
pub mod verify;
pub mod vt;

#[cfg(test)]
pub(crate) mod testing;

pub use clock::SystemClock;
pub use error::LockError;
pub use privilege::{invoking_user, Dropped, PrivilegeManager, Privileges};
pub use prompt::{Key, LockScreen};
pub use session::{DisplayDriver, SystemSession};
pub use verify::CryptVerifier;
pub use vt::Console;
