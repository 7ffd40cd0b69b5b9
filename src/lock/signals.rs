//! Signal routing while the terminal is locked
//!
//! Handlers never touch session state. The VT handoff handler flips one
//! atomic flag; the main loop notices it between ticks and answers the kernel.
//! Signals that could break the lock (job control, hangup, keyboard
//! interrupts, child notifications) are blocked and, should one slip through,
//! land on a handler that does nothing.

use std::sync::atomic::{AtomicBool, Ordering};

use nix::sys::signal::{
    sigaction, sigprocmask, SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal,
};
use tracing::debug;

use super::vt::VtError;

/// Signal the kernel sends when someone wants to switch away from our VT.
pub const VT_SWITCH_SIGNAL: Signal = Signal::SIGUSR1;

/// Signals blocked for the duration of the lock.
const BLOCKED: [Signal; 7] = [
    Signal::SIGTSTP,
    Signal::SIGTTIN,
    Signal::SIGTTOU,
    Signal::SIGHUP,
    Signal::SIGCHLD,
    Signal::SIGQUIT,
    Signal::SIGINT,
];

/// Signals that stay deliverable.
const UNBLOCKED: [Signal; 2] = [Signal::SIGUSR1, Signal::SIGUSR2];

/// Signals rerouted to the no-op handler.
const NEUTRALIZED: [Signal; 4] = [Signal::SIGHUP, Signal::SIGQUIT, Signal::SIGINT, Signal::SIGTSTP];

static SWITCH_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_vt_switch(_: libc::c_int) {
    SWITCH_REQUESTED.store(true, Ordering::SeqCst);
}

extern "C" fn ignore_signal(_: libc::c_int) {}

/// Consume a pending VT switch request, if the handler recorded one.
pub fn take_switch_request() -> bool {
    SWITCH_REQUESTED.swap(false, Ordering::SeqCst)
}

/// Process-wide signal setup used by the VT controller.
pub trait SignalRouting {
    /// Install lock-time handlers and mask, remembering what was there.
    fn isolate(&mut self) -> Result<(), VtError>;

    /// Put back the original mask, then the original handlers.
    /// A no-op when nothing is isolated.
    fn restore(&mut self) -> Result<(), VtError>;

    /// Whether a VT switch request arrived since the last call.
    fn switch_requested(&mut self) -> bool;
}

/// Real signal routing through sigaction/sigprocmask.
#[derive(Default)]
pub struct ProcessSignals {
    saved_mask: Option<SigSet>,
    saved_actions: Vec<(Signal, SigAction)>,
}

impl ProcessSignals {
    pub fn new() -> Self {
        Self::default()
    }

    fn install(&mut self, signal: Signal, handler: extern "C" fn(libc::c_int)) -> Result<(), VtError> {
        let action = SigAction::new(SigHandler::Handler(handler), SaFlags::SA_RESTART, SigSet::empty());
        // Safety: both handlers only touch an atomic or nothing at all
        let previous = unsafe { sigaction(signal, &action) }.map_err(|e| VtError::Signals(signal, e))?;
        self.saved_actions.push((signal, previous));
        Ok(())
    }
}

impl SignalRouting for ProcessSignals {
    fn isolate(&mut self) -> Result<(), VtError> {
        if self.saved_mask.is_some() {
            return Ok(());
        }

        let mut original = SigSet::empty();
        sigprocmask(SigmaskHow::SIG_SETMASK, None, Some(&mut original))
            .map_err(|e| VtError::Signals(VT_SWITCH_SIGNAL, e))?;

        let mut locked = original;
        for signal in UNBLOCKED {
            locked.remove(signal);
        }
        for signal in BLOCKED {
            locked.add(signal);
        }
        sigprocmask(SigmaskHow::SIG_SETMASK, Some(&locked), None)
            .map_err(|e| VtError::Signals(VT_SWITCH_SIGNAL, e))?;
        self.saved_mask = Some(original);

        SWITCH_REQUESTED.store(false, Ordering::SeqCst);
        self.install(VT_SWITCH_SIGNAL, handle_vt_switch)?;
        for signal in NEUTRALIZED {
            self.install(signal, ignore_signal)?;
        }

        debug!("Signal routing isolated");
        Ok(())
    }

    fn restore(&mut self) -> Result<(), VtError> {
        // Mask first: anything pending is delivered to the no-op handlers.
        if let Some(mask) = self.saved_mask.take() {
            sigprocmask(SigmaskHow::SIG_SETMASK, Some(&mask), None)
                .map_err(|e| VtError::Signals(VT_SWITCH_SIGNAL, e))?;
        }

        let mut first_error = None;
        for (signal, action) in self.saved_actions.drain(..).rev() {
            if let Err(e) = unsafe { sigaction(signal, &action) } {
                first_error.get_or_insert(VtError::Signals(signal, e));
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn switch_requested(&mut self) -> bool {
        take_switch_request()
    }
}
