//! Terminal attribute snapshot and secure input mode
//!
//! In secure mode no input byte is interpreted by the line discipline:
//! Ctrl+C, Ctrl+Z, Ctrl+\ and BREAK all arrive as plain input instead of
//! signals, and nothing is echoed.

use std::io;

use nix::sys::termios::{self, InputFlags, LocalFlags, SetArg, Termios};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum TermModeError {
    #[error("tcgetattr failed: {0}")]
    Get(#[source] nix::Error),

    #[error("tcsetattr failed: {0}")]
    Set(#[source] nix::Error),
}

/// Where terminal attributes are read from and written to.
pub trait TermiosPort {
    fn get(&self) -> Result<Termios, TermModeError>;
    fn set(&self, termios: &Termios) -> Result<(), TermModeError>;
}

/// Standard input of the process.
pub struct StdinTermios;

impl TermiosPort for StdinTermios {
    fn get(&self) -> Result<Termios, TermModeError> {
        termios::tcgetattr(io::stdin()).map_err(TermModeError::Get)
    }

    fn set(&self, termios: &Termios) -> Result<(), TermModeError> {
        termios::tcsetattr(io::stdin(), SetArg::TCSANOW, termios).map_err(TermModeError::Set)
    }
}

/// Attributes in effect before the lock changed them.
#[derive(Clone)]
pub struct TerminalSnapshot {
    termios: Termios,
}

/// Owns the terminal attribute snapshot for the lock's lifetime.
pub struct TerminalModeManager<P: TermiosPort> {
    port: P,
    snapshot: Option<TerminalSnapshot>,
    secure: bool,
}

impl<P: TermiosPort> TerminalModeManager<P> {
    pub fn new(port: P) -> Self {
        Self {
            port,
            snapshot: None,
            secure: false,
        }
    }

    /// Record the current attributes. A second call keeps the first snapshot.
    pub fn snapshot(&mut self) -> Result<TerminalSnapshot, TermModeError> {
        if let Some(existing) = &self.snapshot {
            return Ok(existing.clone());
        }
        let snapshot = TerminalSnapshot {
            termios: self.port.get()?,
        };
        self.snapshot = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Switch input to uninterpreted mode.
    pub fn apply_secure_mode(&mut self) -> Result<(), TermModeError> {
        let base = match &self.snapshot {
            Some(snapshot) => snapshot.termios.clone(),
            None => self.snapshot()?.termios,
        };
        let secure = secure_attributes(&base);
        self.port.set(&secure)?;
        self.secure = true;
        debug!("Terminal switched to secure input mode");
        Ok(())
    }

    /// Put the snapshot back.
    ///
    /// Safe without a snapshot, without [`apply_secure_mode`](Self::apply_secure_mode),
    /// and when called repeatedly.
    pub fn restore(&mut self) -> Result<(), TermModeError> {
        if !self.secure {
            return Ok(());
        }
        let Some(snapshot) = &self.snapshot else {
            return Ok(());
        };
        if let Err(e) = self.port.set(&snapshot.termios) {
            warn!("Failed to restore terminal attributes: {}", e);
            return Err(e);
        }
        self.secure = false;
        debug!("Terminal attributes restored");
        Ok(())
    }
}

/// Attributes derived from `base` with signal keys, BREAK, flow control,
/// canonical framing and echo disabled.
pub fn secure_attributes(base: &Termios) -> Termios {
    let mut secure = base.clone();
    secure.input_flags.remove(InputFlags::BRKINT | InputFlags::IXON);
    secure.input_flags.insert(InputFlags::IGNBRK);
    secure
        .local_flags
        .remove(LocalFlags::ISIG | LocalFlags::ICANON | LocalFlags::ECHO | LocalFlags::IEXTEN);
    secure
}
