//! Password prompt shown when someone tries to wake a locked screen
//!
//! Input is collected one key at a time into a fixed-capacity buffer that is
//! wiped on every way out of [`AuthPrompt::prompt`]. The attempt is abandoned
//! once the timeout elapses, measured against the wall clock on every tick
//! rather than trusting any single blocking read.

use std::io;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};
use zeroize::Zeroize;

use super::clock::Clock;
use super::privilege::Credential;
use super::verify::{AuthError, CredentialVerifier};
use super::vt::VtError;

/// Largest secret accepted, in bytes.
pub const MAX_SECRET_LEN: usize = 1024;

/// Time given to type the secret.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How long each input poll may block.
pub const POLL_TICK: Duration = Duration::from_millis(50);

#[derive(Error, Debug)]
pub enum PromptError {
    #[error("Terminal detached during authentication")]
    Detached,

    #[error("Lock screen I/O failed: {0}")]
    Screen(#[from] io::Error),

    #[error(transparent)]
    Verify(#[from] AuthError),

    #[error(transparent)]
    Vt(#[from] VtError),
}

/// Result of one authentication attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
    /// Timed out before Enter; nothing was compared
    Abandoned,
}

/// A key as far as the prompt is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
    Backspace,
    /// Discard everything typed so far
    ClearLine,
    Char(char),
    Other,
}

/// What the prompt needs from the screen.
pub trait LockScreen {
    /// Discard anything typed before the prompt appeared.
    fn flush_input(&mut self) -> io::Result<()>;
    /// Draw the box with the locking user's name and an empty secret field.
    fn draw_prompt(&mut self, username: &str) -> io::Result<()>;
    fn draw_countdown(&mut self, elapsed: Duration, timeout: Duration) -> io::Result<()>;
    fn show_rejection(&mut self) -> io::Result<()>;
    fn clear(&mut self) -> io::Result<()>;
    /// Wait up to `wait` for a key.
    fn poll_key(&mut self, wait: Duration) -> io::Result<Option<Key>>;
    /// Whether input still comes from an interactive terminal.
    fn is_attached(&self) -> bool;
}

/// Work that must keep happening while the prompt waits for input.
pub trait Housekeeping {
    fn on_tick(&mut self) -> Result<(), VtError>;
}

/// Bounded secret storage, allocated once and never reallocated.
pub struct SecretBuffer {
    bytes: Box<[u8]>,
    len: usize,
}

impl Default for SecretBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretBuffer {
    pub fn new() -> Self {
        Self {
            bytes: vec![0u8; MAX_SECRET_LEN].into_boxed_slice(),
            len: 0,
        }
    }

    /// Append a character; refused (returns `false`) when it does not fit.
    pub fn push(&mut self, ch: char) -> bool {
        let mut encoded = [0u8; 4];
        let width = ch.encode_utf8(&mut encoded).len();
        let fits = self.len + width <= self.bytes.len();
        if fits {
            self.bytes[self.len..self.len + width].copy_from_slice(&encoded[..width]);
            self.len += width;
        }
        encoded.zeroize();
        fits
    }

    /// Remove the last character. No-op when empty.
    pub fn pop(&mut self) {
        if self.len == 0 {
            return;
        }
        let mut start = self.len - 1;
        // Step back over UTF-8 continuation bytes
        while start > 0 && self.bytes[start] & 0xC0 == 0x80 {
            start -= 1;
        }
        self.bytes[start..self.len].zeroize();
        self.len = start;
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn wipe(&mut self) {
        self.bytes.zeroize();
        self.len = 0;
    }

    /// True when no trace of any secret remains in the storage.
    #[cfg(test)]
    pub fn is_wiped(&self) -> bool {
        self.len == 0 && self.bytes.iter().all(|&b| b == 0)
    }
}

impl Drop for SecretBuffer {
    fn drop(&mut self) {
        self.wipe();
    }
}

/// Collects and checks one candidate secret per call.
pub struct AuthPrompt {
    buffer: SecretBuffer,
    timeout: Duration,
}

impl AuthPrompt {
    pub fn new(timeout: Duration) -> Self {
        Self {
            buffer: SecretBuffer::new(),
            timeout,
        }
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Storage used for the candidate secret.
    #[cfg(test)]
    pub fn buffer(&self) -> &SecretBuffer {
        &self.buffer
    }

    /// Run one attempt. The candidate is wiped before this returns, whatever
    /// the outcome.
    pub fn prompt(
        &mut self,
        screen: &mut dyn LockScreen,
        verifier: &dyn CredentialVerifier,
        credential: &Credential,
        clock: &dyn Clock,
        housekeeping: &mut dyn Housekeeping,
    ) -> Result<Outcome, PromptError> {
        self.buffer.wipe();
        let result = self.attempt(screen, verifier, credential, clock, housekeeping);
        self.buffer.wipe();
        result
    }

    fn attempt(
        &mut self,
        screen: &mut dyn LockScreen,
        verifier: &dyn CredentialVerifier,
        credential: &Credential,
        clock: &dyn Clock,
        housekeeping: &mut dyn Housekeeping,
    ) -> Result<Outcome, PromptError> {
        screen.flush_input()?;
        screen.draw_prompt(credential.username())?;

        let started = clock.now();
        loop {
            housekeeping.on_tick()?;
            if !screen.is_attached() {
                return Err(PromptError::Detached);
            }

            let elapsed = clock.now().saturating_duration_since(started);
            if elapsed >= self.timeout {
                info!("Unlock attempt abandoned after {:?}", elapsed);
                return Ok(Outcome::Abandoned);
            }
            screen.draw_countdown(elapsed, self.timeout)?;

            match screen.poll_key(POLL_TICK)? {
                Some(Key::Enter) => break,
                Some(Key::Backspace) => self.buffer.pop(),
                Some(Key::ClearLine) => self.buffer.wipe(),
                Some(Key::Char(ch)) => {
                    if !self.buffer.push(ch) {
                        debug!("Secret buffer full, input ignored");
                    }
                }
                Some(Key::Other) | None => {}
            }
        }

        let matched = verifier.verify(self.buffer.as_bytes(), credential);
        self.buffer.wipe();

        // A vanished terminal is never an authentication signal
        if !screen.is_attached() {
            return Err(PromptError::Detached);
        }

        Ok(if matched? { Outcome::Success } else { Outcome::Failure })
    }
}
