//! Errors surfaced by the lock subsystem.
//!
//! Components report what went wrong; only the session decides whether it is
//! fatal. Wrong secrets and timeouts are outcomes, not errors, and never show
//! up here.

use std::io;

use thiserror::Error;

use super::privilege::PrivilegeError;
use super::prompt::PromptError;
use super::termmode::TermModeError;
use super::vt::VtError;

#[derive(Error, Debug)]
pub enum LockError {
    #[error(transparent)]
    Privilege(#[from] PrivilegeError),

    #[error(transparent)]
    Vt(#[from] VtError),

    #[error(transparent)]
    TermMode(#[from] TermModeError),

    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error("Display failed: {0}")]
    Display(#[from] io::Error),

    #[error("This terminal is currently too small ({width}x{height}).")]
    TooSmall { width: u16, height: u16 },

    #[error("No credential captured; the session was never locked")]
    NotLocked,

    #[error("Session already released; it cannot be locked again")]
    Released,
}
