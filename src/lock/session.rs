//! Lock session state machine
//!
//! ```text
//! Unlocked -> Locking -> Locked <-> Authenticating -> Unlocking -> Released
//! ```
//!
//! `Locking` captures the credential, seizes VT switching and secures the
//! terminal, in that order. `Unlocking` gives VT switching back and restores
//! the terminal. Any failure while locking unwinds whatever already
//! succeeded. A session dropped while still holding the terminal (error
//! return, panic) unwinds the same way.

use std::io;
use std::time::Duration;

use nix::unistd::Uid;
use tracing::{error, info, warn};

use super::audit::{AuditSink, SyslogAudit};
use super::clock::Clock;
use super::error::LockError;
use super::lockout::LockoutPolicy;
#[cfg(test)]
use super::lockout::LockoutState;
use super::privilege::{Credential, CredentialStore, Elevated, PrivilegeManager};
use super::prompt::{AuthPrompt, Housekeeping, LockScreen, Outcome};
use super::signals::{ProcessSignals, SignalRouting};
use super::termmode::{StdinTermios, TermiosPort, TerminalModeManager};
use super::verify::CredentialVerifier;
use super::vt::{Console, VtDevice, VtError, VtSessionController};

/// How long the rejection message stays up after the lockout delay.
pub const REJECTION_HOLD: Duration = Duration::from_secs(1);

/// The screensaver (or whatever runs while locked), as seen by the session.
pub trait DisplayDriver {
    /// Stop drawing and clear the screen for the prompt.
    fn pause_rendering(&mut self) -> io::Result<()>;
    /// Redraw from scratch after the prompt.
    fn resume_rendering(&mut self) -> io::Result<()>;
    /// Advance and draw one frame.
    fn draw_frame(&mut self) -> io::Result<()>;
    /// Wait up to one frame for input; `true` when a key was pressed.
    fn poll_wake_input(&mut self) -> io::Result<bool>;
    /// Hand the screen back. Runs before the terminal attributes are
    /// restored, which would otherwise be overwritten.
    fn shutdown(&mut self) -> io::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Unlocked,
    Locking,
    Locked,
    Authenticating,
    Unlocking,
    /// Unlocked again; terminal state
    Released,
}

/// Session wired to the real console, termios, signals and syslog.
pub type SystemSession = Session<Console, ProcessSignals, StdinTermios, SyslogAudit>;

impl SystemSession {
    pub fn system(prompt_timeout: Duration) -> Self {
        Session::new(
            ProcessSignals::new(),
            StdinTermios,
            SyslogAudit::connect(),
            prompt_timeout,
        )
    }
}

pub struct Session<D: VtDevice, S: SignalRouting, P: TermiosPort, A: AuditSink> {
    state: LockState,
    credential: Option<Credential>,
    vt: VtSessionController<D, S>,
    terminal: TerminalModeManager<P>,
    lockout: LockoutPolicy<A>,
    prompt: AuthPrompt,
}

impl<D: VtDevice, S: SignalRouting> Housekeeping for VtSessionController<D, S> {
    fn on_tick(&mut self) -> Result<(), VtError> {
        self.service_switch_requests()
    }
}

impl<D: VtDevice, S: SignalRouting, P: TermiosPort, A: AuditSink> Session<D, S, P, A> {
    pub fn new(signals: S, termios: P, audit: A, prompt_timeout: Duration) -> Self {
        Self {
            state: LockState::Unlocked,
            credential: None,
            vt: VtSessionController::new(signals),
            terminal: TerminalModeManager::new(termios),
            lockout: LockoutPolicy::new(audit),
            prompt: AuthPrompt::new(prompt_timeout),
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> LockState {
        self.state
    }

    #[cfg(test)]
    pub fn lockout_state(&self) -> LockoutState {
        self.lockout.state()
    }

    pub fn failed_attempts(&self) -> u64 {
        self.lockout.failed_count()
    }

    #[cfg(test)]
    pub fn prompt(&self) -> &AuthPrompt {
        &self.prompt
    }

    /// Configuration is only read once privileges are gone, after locking.
    pub fn set_prompt_timeout(&mut self, timeout: Duration) {
        self.prompt.set_timeout(timeout);
    }

    #[cfg(test)]
    pub fn username(&self) -> Option<&str> {
        self.credential.as_ref().map(Credential::username)
    }

    /// Unlocked -> Locking -> Locked.
    ///
    /// `open_device` is only called once the credential is in hand. Locking an
    /// already locked session does nothing; a released one is an error.
    pub fn lock<C, F>(
        &mut self,
        privileges: &PrivilegeManager<C>,
        uid: Uid,
        elevated: &Elevated,
        open_device: F,
    ) -> Result<(), LockError>
    where
        C: CredentialStore,
        F: FnOnce() -> Result<D, VtError>,
    {
        match self.state {
            LockState::Unlocked => {}
            LockState::Locked | LockState::Authenticating => return Ok(()),
            LockState::Locking | LockState::Unlocking | LockState::Released => {
                return Err(LockError::Released);
            }
        }
        self.state = LockState::Locking;

        match self.acquire_all(privileges, uid, elevated, open_device) {
            Ok(()) => {
                self.state = LockState::Locked;
                info!("Session locked");
                Ok(())
            }
            Err(e) => {
                error!("Locking failed: {}", e);
                self.unwind();
                self.state = LockState::Unlocked;
                Err(e)
            }
        }
    }

    fn acquire_all<C, F>(
        &mut self,
        privileges: &PrivilegeManager<C>,
        uid: Uid,
        elevated: &Elevated,
        open_device: F,
    ) -> Result<(), LockError>
    where
        C: CredentialStore,
        F: FnOnce() -> Result<D, VtError>,
    {
        self.credential = Some(privileges.acquire_credential(uid, elevated)?);
        self.vt.acquire(open_device()?)?;
        self.terminal.snapshot()?;
        self.terminal.apply_secure_mode()?;
        Ok(())
    }

    /// Drive the display until the right secret is entered, then unlock.
    pub fn run(
        &mut self,
        display: &mut dyn DisplayDriver,
        screen: &mut dyn LockScreen,
        verifier: &dyn CredentialVerifier,
        clock: &dyn Clock,
    ) -> Result<(), LockError> {
        loop {
            match self.state {
                LockState::Locked => {
                    self.vt.service_switch_requests()?;
                    display.draw_frame()?;
                    if display.poll_wake_input()? {
                        self.state = LockState::Authenticating;
                    }
                }
                LockState::Authenticating => {
                    self.authenticate(display, screen, verifier, clock)?;
                }
                LockState::Unlocking => break,
                LockState::Unlocked | LockState::Locking | LockState::Released => {
                    return Err(LockError::NotLocked);
                }
            }
        }
        let shutdown = display.shutdown();
        self.unlock()?;
        Ok(shutdown?)
    }

    /// Authenticating -> Locked | Unlocking.
    fn authenticate(
        &mut self,
        display: &mut dyn DisplayDriver,
        screen: &mut dyn LockScreen,
        verifier: &dyn CredentialVerifier,
        clock: &dyn Clock,
    ) -> Result<(), LockError> {
        let credential = self.credential.as_ref().ok_or(LockError::NotLocked)?;
        display.pause_rendering()?;

        let outcome = self
            .prompt
            .prompt(screen, verifier, credential, clock, &mut self.vt)?;

        match outcome {
            Outcome::Success => {
                info!("Unlocked by {}", credential.username());
                screen.clear()?;
                self.state = LockState::Unlocking;
                return Ok(());
            }
            Outcome::Failure => {
                let delay = self.lockout.on_failure(credential.username());
                self.serve(clock, Duration::from_secs(delay))?;
                screen.show_rejection()?;
                self.serve(clock, REJECTION_HOLD)?;
            }
            Outcome::Abandoned => {}
        }

        screen.clear()?;
        display.resume_rendering()?;
        self.state = LockState::Locked;
        Ok(())
    }

    /// Sleep for `delay`, answering VT switch requests on either side.
    fn serve(&mut self, clock: &dyn Clock, delay: Duration) -> Result<(), LockError> {
        self.vt.service_switch_requests()?;
        clock.sleep(delay);
        self.vt.service_switch_requests()?;
        Ok(())
    }

    /// Unlocking -> Released: VT switching first, then terminal attributes.
    pub fn unlock(&mut self) -> Result<(), LockError> {
        if matches!(self.state, LockState::Unlocked | LockState::Released) {
            return Ok(());
        }
        self.state = LockState::Unlocking;

        let vt = self.vt.release();
        let terminal = self.terminal.restore();
        self.credential = None;
        self.state = LockState::Released;
        info!("Session released");

        vt?;
        terminal?;
        Ok(())
    }

    /// Best-effort restore on abnormal exit. Errors are logged, not returned.
    pub fn unwind(&mut self) {
        if let Err(e) = self.vt.force_release() {
            warn!("VT restore during unwind failed: {}", e);
        }
        if let Err(e) = self.terminal.restore() {
            warn!("Terminal restore during unwind failed: {}", e);
        }
        self.credential = None;
        if self.state != LockState::Unlocked {
            self.state = LockState::Released;
        }
    }
}

impl<D: VtDevice, S: SignalRouting, P: TermiosPort, A: AuditSink> Drop for Session<D, S, P, A> {
    fn drop(&mut self) {
        if matches!(
            self.state,
            LockState::Locking | LockState::Locked | LockState::Authenticating | LockState::Unlocking
        ) {
            warn!("Session dropped while locked, unwinding");
            self.unwind();
        }
    }
}
