//! Virtual terminal ownership
//!
//! While locked, the console is put into process-controlled switching mode:
//! the kernel asks us (by signal) before switching away, and we always say
//! no. The previous mode is kept in a [`VtOwnershipToken`] and written back
//! on release.
//!
//! ```text
//! Unowned --acquire--> Owned --release--> ReleasedGracefully
//!                        \--force_release--> ReleasedByForce
//! ```

use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::path::Path;

use nix::sys::signal::Signal;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::signals::{SignalRouting, VT_SWITCH_SIGNAL};

const VT_GETMODE: libc::c_ulong = 0x5601;
const VT_SETMODE: libc::c_ulong = 0x5602;
const VT_RELDISP: libc::c_ulong = 0x5605;

/// Kernel switches VTs on its own
#[cfg(test)]
pub const VT_AUTO: libc::c_char = 0x00;
/// Owning process acknowledges each switch
pub const VT_PROCESS: libc::c_char = 0x01;

nix::ioctl_read_bad!(vt_getmode, VT_GETMODE, VtMode);
nix::ioctl_write_ptr_bad!(vt_setmode, VT_SETMODE, VtMode);
nix::ioctl_write_int_bad!(vt_reldisp, VT_RELDISP);

#[derive(Error, Debug)]
pub enum VtError {
    #[error("Could not open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("I can't lock this TTY: {0}")]
    NotLockable(#[source] nix::Error),

    #[error("VT_SETMODE failed: {0}")]
    SetMode(#[source] nix::Error),

    #[error("VT_RELDISP failed: {0}")]
    Release(#[source] nix::Error),

    #[error("Failed to route {0:?}: {1}")]
    Signals(Signal, #[source] nix::Error),
}

/// Mirror of the kernel's `struct vt_mode`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VtMode {
    pub mode: libc::c_char,
    pub waitv: libc::c_char,
    pub relsig: libc::c_short,
    pub acqsig: libc::c_short,
    pub frsig: libc::c_short,
}

impl VtMode {
    /// Process-controlled mode delivering every request as `signal`.
    pub fn process_controlled(from: &VtMode, signal: Signal) -> Self {
        let signo = signal as libc::c_short;
        Self {
            mode: VT_PROCESS,
            waitv: from.waitv,
            relsig: signo,
            acqsig: signo,
            frsig: signo,
        }
    }
}

/// Switch mode found on the console before we took it over.
#[derive(Debug)]
pub struct VtOwnershipToken {
    original: VtMode,
}

#[cfg(test)]
impl VtOwnershipToken {
    pub fn original_mode(&self) -> &VtMode {
        &self.original
    }
}

/// The console operations the controller needs.
pub trait VtDevice {
    fn get_mode(&self) -> Result<VtMode, VtError>;
    fn set_mode(&self, mode: &VtMode) -> Result<(), VtError>;
    /// Answer a pending release request; `false` refuses the switch.
    fn release_display(&self, allow: bool) -> Result<(), VtError>;
}

/// The controlling terminal device.
pub struct Console {
    file: File,
}

impl Console {
    pub const CONTROLLING_TTY: &'static str = "/dev/tty";

    pub fn open() -> Result<Self, VtError> {
        Self::open_path(Path::new(Self::CONTROLLING_TTY))
    }

    pub fn open_path(path: &Path) -> Result<Self, VtError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| VtError::Open {
                path: path.display().to_string(),
                source,
            })?;
        Ok(Self { file })
    }
}

impl VtDevice for Console {
    fn get_mode(&self) -> Result<VtMode, VtError> {
        let mut mode = VtMode::default();
        unsafe { vt_getmode(self.file.as_raw_fd(), &mut mode) }.map_err(VtError::NotLockable)?;
        Ok(mode)
    }

    fn set_mode(&self, mode: &VtMode) -> Result<(), VtError> {
        unsafe { vt_setmode(self.file.as_raw_fd(), mode) }.map_err(VtError::SetMode)?;
        Ok(())
    }

    fn release_display(&self, allow: bool) -> Result<(), VtError> {
        unsafe { vt_reldisp(self.file.as_raw_fd(), allow as libc::c_int) }.map_err(VtError::Release)?;
        Ok(())
    }
}

/// Lifecycle of VT ownership
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VtState {
    Unowned,
    Owned,
    ReleasedGracefully,
    ReleasedByForce,
}

/// Holds exclusive control of VT switching for the lock's lifetime.
pub struct VtSessionController<D: VtDevice, S: SignalRouting> {
    device: Option<D>,
    signals: S,
    token: Option<VtOwnershipToken>,
    state: VtState,
    refused_switches: u64,
}

impl<D: VtDevice, S: SignalRouting> VtSessionController<D, S> {
    pub fn new(signals: S) -> Self {
        Self {
            device: None,
            signals,
            token: None,
            state: VtState::Unowned,
            refused_switches: 0,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> VtState {
        self.state
    }

    /// Number of switch requests refused so far.
    #[cfg(test)]
    pub fn refused_switches(&self) -> u64 {
        self.refused_switches
    }

    /// Take over VT switching on `device`.
    ///
    /// On failure whatever was set up is undone before the error is returned.
    pub fn acquire(&mut self, device: D) -> Result<&VtOwnershipToken, VtError> {
        let original = device.get_mode()?;
        debug!("Original VT mode: {:?}", original);

        if let Err(e) = self.signals.isolate() {
            if let Err(restore_err) = self.signals.restore() {
                warn!("Failed to restore signals after partial isolation: {}", restore_err);
            }
            return Err(e);
        }

        let locked = VtMode::process_controlled(&original, VT_SWITCH_SIGNAL);
        if let Err(e) = device.set_mode(&locked) {
            if let Err(restore_err) = self.signals.restore() {
                warn!("Failed to restore signals after VT_SETMODE error: {}", restore_err);
            }
            return Err(e);
        }

        self.device = Some(device);
        self.state = VtState::Owned;
        info!("VT switching is now process controlled");
        Ok(&*self.token.insert(VtOwnershipToken { original }))
    }

    /// Refuse any switch request recorded since the last tick.
    pub fn service_switch_requests(&mut self) -> Result<(), VtError> {
        if self.state != VtState::Owned || !self.signals.switch_requested() {
            return Ok(());
        }
        if let Some(device) = &self.device {
            device.release_display(false)?;
            self.refused_switches += 1;
            debug!("Refused VT switch request ({} so far)", self.refused_switches);
        }
        Ok(())
    }

    /// Restore the original switch mode, then the original signal setup.
    ///
    /// Idempotent: calling it again, or without a successful acquire, does
    /// nothing further.
    pub fn release(&mut self) -> Result<(), VtError> {
        self.release_as(VtState::ReleasedGracefully)
    }

    /// Same as [`release`](Self::release) but marks the unwinding as forced.
    pub fn force_release(&mut self) -> Result<(), VtError> {
        self.release_as(VtState::ReleasedByForce)
    }

    fn release_as(&mut self, end: VtState) -> Result<(), VtError> {
        if self.state != VtState::Owned {
            return Ok(());
        }
        self.state = end;

        let mut first_error = None;
        if let (Some(device), Some(token)) = (&self.device, self.token.take()) {
            if let Err(e) = device.set_mode(&token.original) {
                warn!("Failed to restore VT mode: {}", e);
                first_error = Some(e);
            }
        }
        if let Err(e) = self.signals.restore() {
            warn!("Failed to restore signals: {}", e);
            first_error.get_or_insert(e);
        }
        self.device = None;

        match first_error {
            Some(err) => Err(err),
            None => {
                info!("VT switching restored ({:?})", end);
                Ok(())
            }
        }
    }
}
